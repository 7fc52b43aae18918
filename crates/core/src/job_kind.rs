//! Closed set of generation job kinds and the artifacts they produce.
//!
//! Every kind-dependent decision (which artifact kind a produced image gets,
//! how long an orchestrated job may poll, whether the engine queue is cleared
//! on timeout) is answered by [`JobKind::policy`] instead of matching on
//! strings at each call site.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// The workflow family a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Prompt-driven generation with an optional base image.
    Generate,
    /// Resolution upscale of a previously produced image.
    Upscale,
    /// Multi-reference composition edit.
    Edit,
    /// Outfit extraction followed by outfit transfer.
    #[serde(rename = "tryon")]
    TryOn,
    /// Edit of a flattened canvas export.
    CanvasEdit,
    /// Masked repaint of part of an image.
    Inpaint,
    /// Background removal.
    RemoveBackground,
    /// Prompt-guided img2img pass over a single image.
    EnhanceComposition,
    /// Model-based 4x upscale of an uploaded image, no diffusion.
    UpscaleSimple,
}

impl JobKind {
    /// Every kind, in declaration order.
    pub const ALL: [JobKind; 9] = [
        JobKind::Generate,
        JobKind::Upscale,
        JobKind::Edit,
        JobKind::TryOn,
        JobKind::CanvasEdit,
        JobKind::Inpaint,
        JobKind::RemoveBackground,
        JobKind::EnhanceComposition,
        JobKind::UpscaleSimple,
    ];

    /// The value stored in `jobs.kind`.
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Generate => "generate",
            JobKind::Upscale => "upscale",
            JobKind::Edit => "edit",
            JobKind::TryOn => "tryon",
            JobKind::CanvasEdit => "canvas_edit",
            JobKind::Inpaint => "inpaint",
            JobKind::RemoveBackground => "remove_background",
            JobKind::EnhanceComposition => "enhance_composition",
            JobKind::UpscaleSimple => "upscale_simple",
        }
    }

    /// Parse from the database `kind` column.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| CoreError::Validation(format!("Unknown job kind '{name}'")))
    }

    /// Kind-dependent behaviour table.
    pub fn policy(self) -> &'static KindPolicy {
        &KIND_POLICIES[self as usize]
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ArtifactKind
// ---------------------------------------------------------------------------

/// What a persisted image row represents (`images.kind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Generated,
    Upscaled,
    CanvasEdit,
    VirtualTryon,
    Inpainted,
    BackgroundRemoved,
}

impl ArtifactKind {
    /// The value stored in `images.kind`.
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Generated => "generated",
            ArtifactKind::Upscaled => "upscaled",
            ArtifactKind::CanvasEdit => "canvas_edit",
            ArtifactKind::VirtualTryon => "virtual_tryon",
            ArtifactKind::Inpainted => "inpainted",
            ArtifactKind::BackgroundRemoved => "background_removed",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Policy table
// ---------------------------------------------------------------------------

/// Per-kind orchestration and persistence settings.
#[derive(Debug)]
pub struct KindPolicy {
    pub kind: JobKind,
    /// Artifact kind assigned to every image the job produces.
    pub artifact_kind: ArtifactKind,
    /// Wall-clock budget for the polling loop.
    pub poll_timeout: Duration,
    /// Ask the engine to drop its backlog when the budget is exceeded.
    pub clear_queue_on_timeout: bool,
}

/// Indexed by `JobKind as usize`; order must follow the enum declaration.
static KIND_POLICIES: [KindPolicy; 9] = [
    KindPolicy {
        kind: JobKind::Generate,
        artifact_kind: ArtifactKind::Generated,
        poll_timeout: Duration::from_secs(180),
        clear_queue_on_timeout: false,
    },
    KindPolicy {
        kind: JobKind::Upscale,
        artifact_kind: ArtifactKind::Upscaled,
        poll_timeout: Duration::from_secs(120),
        clear_queue_on_timeout: false,
    },
    KindPolicy {
        kind: JobKind::Edit,
        artifact_kind: ArtifactKind::Generated,
        poll_timeout: Duration::from_secs(180),
        clear_queue_on_timeout: false,
    },
    KindPolicy {
        kind: JobKind::TryOn,
        artifact_kind: ArtifactKind::VirtualTryon,
        poll_timeout: Duration::from_secs(200),
        clear_queue_on_timeout: true,
    },
    KindPolicy {
        kind: JobKind::CanvasEdit,
        artifact_kind: ArtifactKind::CanvasEdit,
        poll_timeout: Duration::from_secs(120),
        clear_queue_on_timeout: false,
    },
    KindPolicy {
        kind: JobKind::Inpaint,
        artifact_kind: ArtifactKind::Inpainted,
        poll_timeout: Duration::from_secs(120),
        clear_queue_on_timeout: false,
    },
    KindPolicy {
        kind: JobKind::RemoveBackground,
        artifact_kind: ArtifactKind::BackgroundRemoved,
        poll_timeout: Duration::from_secs(60),
        clear_queue_on_timeout: false,
    },
    KindPolicy {
        kind: JobKind::EnhanceComposition,
        artifact_kind: ArtifactKind::Generated,
        poll_timeout: Duration::from_secs(180),
        clear_queue_on_timeout: false,
    },
    KindPolicy {
        kind: JobKind::UpscaleSimple,
        artifact_kind: ArtifactKind::Upscaled,
        poll_timeout: Duration::from_secs(120),
        clear_queue_on_timeout: false,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn policy_table_is_indexed_by_kind() {
        for kind in JobKind::ALL {
            assert_eq!(kind.policy().kind, kind);
        }
    }

    #[test]
    fn names_round_trip_through_from_name() {
        for kind in JobKind::ALL {
            assert_eq!(JobKind::from_name(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_name_is_a_validation_error() {
        assert_matches!(JobKind::from_name("video"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn serde_names_match_column_values() {
        let json = serde_json::to_value(JobKind::TryOn).unwrap();
        assert_eq!(json, "tryon");
        let kind: JobKind = serde_json::from_value(serde_json::json!("canvas_edit")).unwrap();
        assert_eq!(kind, JobKind::CanvasEdit);
        let kind: JobKind = serde_json::from_value(serde_json::json!("enhance_composition")).unwrap();
        assert_eq!(kind, JobKind::EnhanceComposition);
        assert_eq!(JobKind::UpscaleSimple.as_str(), "upscale_simple");
    }

    #[test]
    fn upscale_variants_share_the_upscaled_artifact() {
        assert_eq!(JobKind::Upscale.policy().artifact_kind, ArtifactKind::Upscaled);
        assert_eq!(JobKind::UpscaleSimple.policy().artifact_kind, ArtifactKind::Upscaled);
        assert_eq!(JobKind::EnhanceComposition.policy().artifact_kind, ArtifactKind::Generated);
    }

    #[test]
    fn only_tryon_clears_the_queue_on_timeout() {
        let clearing: Vec<_> = JobKind::ALL
            .into_iter()
            .filter(|k| k.policy().clear_queue_on_timeout)
            .collect();
        assert_eq!(clearing, vec![JobKind::TryOn]);
    }

    #[test]
    fn poll_timeouts_stay_within_five_minutes() {
        for kind in JobKind::ALL {
            let t = kind.policy().poll_timeout;
            assert!(t >= Duration::from_secs(60) && t <= Duration::from_secs(300));
        }
    }
}
