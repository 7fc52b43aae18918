//! Interpretation of `GET /history/{id}` documents.
//!
//! The engine answers with `{}` until it has started recording a prompt,
//! then with `{ "<id>": { "status": {...}, "outputs": {...} } }`. Nothing in
//! here performs I/O so the same classification backs both the polling loop
//! and the reconciliation worker.

use std::cmp::Ordering;

use atelier_core::job_kind::JobKind;
use serde::Serialize;
use serde_json::Value;

/// One file produced by an output node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputAsset {
    pub node_id: String,
    pub filename: String,
    pub subfolder: String,
    /// `output` for saved files, `temp` for previews.
    pub folder_type: String,
}

/// Engine-side state of one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollState {
    /// Not in history yet.
    Pending,
    /// Recorded but not finished, or finished without any outputs.
    Running,
    /// Finished with at least one output.
    Completed,
    /// The engine reported an execution error.
    Error { messages: Vec<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct PollResult {
    #[serde(flatten)]
    pub state: PollState,
    pub assets: Vec<OutputAsset>,
}

impl PollResult {
    pub fn pending() -> Self {
        Self {
            state: PollState::Pending,
            assets: Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == PollState::Completed
    }

    pub fn filenames(&self) -> Vec<&str> {
        self.assets.iter().map(|a| a.filename.as_str()).collect()
    }
}

/// Classify the history document returned for `prompt_id`.
pub fn classify(prompt_id: &str, history: &Value) -> PollResult {
    let Some(entry) = history.get(prompt_id) else {
        return PollResult::pending();
    };

    let assets = entry.get("outputs").map(extract_assets).unwrap_or_default();
    let status = entry.get("status");
    let status_str = status
        .and_then(|s| s.get("status_str"))
        .and_then(Value::as_str);
    let completed = status
        .and_then(|s| s.get("completed"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let state = if status_str == Some("error") {
        PollState::Error {
            messages: error_messages(status),
        }
    } else if completed && !assets.is_empty() {
        PollState::Completed
    } else {
        PollState::Running
    };

    PollResult { state, assets }
}

/// Every non-empty filename from every output node, temp previews
/// included. Numeric node ids come first in ascending order, then other
/// ids lexicographically; files keep their order within a node.
pub fn extract_assets(outputs: &Value) -> Vec<OutputAsset> {
    let Some(nodes) = outputs.as_object() else {
        return Vec::new();
    };

    let mut node_ids: Vec<&String> = nodes.keys().collect();
    node_ids.sort_by(|a, b| compare_node_ids(a, b));

    let mut assets = Vec::new();
    for node_id in node_ids {
        let Some(images) = nodes[node_id.as_str()].get("images").and_then(Value::as_array) else {
            continue;
        };
        for image in images {
            let filename = image.get("filename").and_then(Value::as_str).unwrap_or("");
            if filename.trim().is_empty() {
                continue;
            }
            assets.push(OutputAsset {
                node_id: node_id.clone(),
                filename: filename.to_string(),
                subfolder: str_field(image, "subfolder"),
                folder_type: match str_field(image, "type") {
                    t if t.is_empty() => "output".to_string(),
                    t => t,
                },
            });
        }
    }
    assets
}

fn compare_node_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn error_messages(status: Option<&Value>) -> Vec<String> {
    let messages: Vec<String> = status
        .and_then(|s| s.get("messages"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|m| {
            let [name, data] = m.as_array()?.as_slice() else {
                return None;
            };
            if name.as_str()? != "execution_error" {
                return None;
            }
            let message = data.get("exception_message").and_then(Value::as_str)?;
            Some(match data.get("node_type").and_then(Value::as_str) {
                Some(node_type) => format!("{node_type}: {}", message.trim()),
                None => message.trim().to_string(),
            })
        })
        .collect();

    if messages.is_empty() {
        vec!["Engine reported an execution error".to_string()]
    } else {
        messages
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Output node of the try-on extraction stage.
const TRYON_EXTRACT_NODE: &str = "85";
/// Output node of the try-on transfer stage.
const TRYON_TRANSFER_NODE: &str = "140";

/// Stage label for multi-stage kinds, derived from which output nodes have
/// produced files so far.
pub fn progress_step(kind: JobKind, assets: &[OutputAsset]) -> Option<&'static str> {
    let produced = |node: &str| assets.iter().any(|a| a.node_id == node);
    match kind {
        JobKind::TryOn if produced(TRYON_TRANSFER_NODE) => Some("done"),
        JobKind::TryOn if produced(TRYON_EXTRACT_NODE) => Some("transfer"),
        JobKind::TryOn => Some("extract"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn image(name: &str, kind: &str) -> Value {
        json!({ "filename": name, "subfolder": "", "type": kind })
    }

    #[test]
    fn absent_prompt_is_pending() {
        assert_eq!(classify("abc", &json!({})).state, PollState::Pending);
        assert_eq!(
            classify("abc", &json!({ "other": { "outputs": {} } })).state,
            PollState::Pending
        );
    }

    #[test]
    fn completed_without_outputs_is_still_running() {
        let history = json!({
            "abc": { "status": { "status_str": "success", "completed": true }, "outputs": {} }
        });
        let result = classify("abc", &history);
        assert_eq!(result.state, PollState::Running);
        assert!(result.assets.is_empty());
    }

    #[test]
    fn outputs_without_completion_are_running() {
        let history = json!({
            "abc": {
                "status": { "status_str": "success", "completed": false },
                "outputs": { "9": { "images": [image("partial.png", "output")] } }
            }
        });
        assert_eq!(classify("abc", &history).state, PollState::Running);
    }

    #[test]
    fn completed_with_outputs_lists_filenames() {
        let history = json!({
            "abc": {
                "status": { "status_str": "success", "completed": true },
                "outputs": { "9": { "images": [image("result1.png", "output")] } }
            }
        });
        let result = classify("abc", &history);
        assert!(result.is_completed());
        assert_eq!(result.filenames(), vec!["result1.png"]);
    }

    #[test]
    fn error_status_surfaces_engine_messages() {
        let history = json!({
            "abc": {
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [
                        ["execution_start", { "prompt_id": "abc" }],
                        ["execution_error", {
                            "node_type": "KSampler",
                            "exception_message": "CUDA out of memory\n"
                        }]
                    ]
                },
                "outputs": {}
            }
        });
        assert_matches!(
            classify("abc", &history).state,
            PollState::Error { messages } if messages == vec!["KSampler: CUDA out of memory".to_string()]
        );
    }

    #[test]
    fn error_without_details_gets_generic_message() {
        let history = json!({ "abc": { "status": { "status_str": "error" } } });
        assert_matches!(
            classify("abc", &history).state,
            PollState::Error { messages } if messages.len() == 1
        );
    }

    #[test]
    fn extraction_orders_numeric_ids_before_named_ids() {
        let outputs = json!({
            "save": { "images": [image("named.png", "output")] },
            "10": { "images": [image("ten_a.png", "output"), image("ten_b.png", "output")] },
            "9": { "images": [image("preview.png", "temp")] },
            "1297": { "images": [image("", "temp")] },
            "alpha": { "text": ["not an image"] }
        });
        let assets = extract_assets(&outputs);
        let names: Vec<(&str, &str, &str)> = assets
            .iter()
            .map(|a| (a.node_id.as_str(), a.filename.as_str(), a.folder_type.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("9", "preview.png", "temp"),
                ("10", "ten_a.png", "output"),
                ("10", "ten_b.png", "output"),
                ("save", "named.png", "output"),
            ]
        );
    }

    #[test]
    fn extraction_is_deterministic() {
        let outputs = json!({
            "140": { "images": [image("final.png", "output")] },
            "85": { "images": [image("extracted.png", "output")] },
        });
        let first = extract_assets(&outputs);
        for _ in 0..5 {
            assert_eq!(extract_assets(&outputs), first);
        }
        assert_eq!(first[0].filename, "extracted.png");
    }

    #[test]
    fn missing_type_defaults_to_output() {
        let assets = extract_assets(&json!({ "3": { "images": [{ "filename": "x.png" }] } }));
        assert_eq!(assets[0].folder_type, "output");
        assert_eq!(assets[0].subfolder, "");
    }

    #[test]
    fn tryon_step_follows_stage_outputs() {
        let asset = |node: &str| OutputAsset {
            node_id: node.into(),
            filename: format!("{node}.png"),
            subfolder: String::new(),
            folder_type: "output".into(),
        };
        assert_eq!(progress_step(JobKind::TryOn, &[]), Some("extract"));
        assert_eq!(progress_step(JobKind::TryOn, &[asset("85")]), Some("transfer"));
        assert_eq!(
            progress_step(JobKind::TryOn, &[asset("85"), asset("140")]),
            Some("done")
        );
        assert_eq!(progress_step(JobKind::Generate, &[asset("18")]), None);
    }
}
