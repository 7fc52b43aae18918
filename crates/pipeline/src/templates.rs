//! Per-kind workflow templates and the builders that fill them.
//!
//! Each [`JobKind`] maps to one [`KindSpec`]: the template document, the
//! parameter → slot bindings, the optional subgraph dropped when its input
//! is missing, the img2img path and the output nodes the graph must keep.

use atelier_core::error::CoreError;
use atelier_core::job_kind::JobKind;
use atelier_core::workflow_template::{
    apply, Img2ImgRewire, NodeLink, SlotPath, SlotValue, Substitution, WorkflowGraph,
};
use rand::Rng;

use crate::request::{GenerationRequest, JobParameters, ParamType};

/// Exclusive upper bound for generated sampler seeds.
const SEED_RANGE: i64 = 1_000_000_000;

/// Parameter that overrides randomized sampler seeds.
const SEED_PARAM: &str = "seed";

// ---------------------------------------------------------------------------
// Kind table types
// ---------------------------------------------------------------------------

/// Writes request parameter `param` into `node_id.input`.
#[derive(Debug)]
pub struct SlotBinding {
    pub param: &'static str,
    pub node_id: &'static str,
    pub input: &'static str,
    pub ty: ParamType,
    pub required: bool,
    /// Parameter used when `param` is absent.
    pub fallback: Option<&'static str>,
}

const fn required(param: &'static str, node_id: &'static str, input: &'static str) -> SlotBinding {
    SlotBinding {
        param,
        node_id,
        input,
        ty: ParamType::Text,
        required: true,
        fallback: None,
    }
}

const fn optional(
    param: &'static str,
    node_id: &'static str,
    input: &'static str,
    ty: ParamType,
) -> SlotBinding {
    SlotBinding {
        param,
        node_id,
        input,
        ty,
        required: false,
        fallback: None,
    }
}

const fn with_fallback(
    param: &'static str,
    node_id: &'static str,
    input: &'static str,
    fallback: &'static str,
) -> SlotBinding {
    SlotBinding {
        param,
        node_id,
        input,
        ty: ParamType::Text,
        required: false,
        fallback: Some(fallback),
    }
}

/// Nodes deleted when `param` is not supplied.
#[derive(Debug)]
pub struct OptionalSubgraph {
    pub param: &'static str,
    pub node_ids: &'static [&'static str],
}

/// Image-to-image path taken when `param` is supplied.
#[derive(Debug)]
pub struct Img2ImgBinding {
    pub param: &'static str,
    pub encode_node_id: &'static str,
    pub pixels_node: &'static str,
    pub vae_node: &'static str,
    pub sampler_node_id: &'static str,
    pub denoise: f64,
    /// Conditioning input that receives the base image as a reference.
    pub reference_slot: Option<(&'static str, &'static str)>,
}

#[derive(Debug)]
pub struct KindSpec {
    pub kind: JobKind,
    source: &'static str,
    pub bindings: &'static [SlotBinding],
    pub optional_subgraph: Option<OptionalSubgraph>,
    pub img2img: Option<Img2ImgBinding>,
    /// Samplers whose seed is randomized unless `seed` is given.
    pub seed_nodes: &'static [&'static str],
    /// Parameter naming a previous engine output that must be re-uploaded
    /// as an input before building.
    pub reupload_param: Option<&'static str>,
    /// Save nodes that must survive building.
    pub output_nodes: &'static [&'static str],
}

impl KindSpec {
    /// Parse the template document.
    pub fn template(&self) -> Result<WorkflowGraph, CoreError> {
        WorkflowGraph::parse(self.source).map_err(|e| {
            CoreError::Internal(format!("Broken {} template: {e}", self.kind.as_str()))
        })
    }

    /// First required parameter missing from `params`.
    pub fn missing_required(&self, params: &JobParameters) -> Option<&'static str> {
        self.bindings
            .iter()
            .find(|b| b.required && !params.is_present(b.param))
            .map(|b| b.param)
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

const EDIT_IMAGE4_SUBGRAPH: [&str; 5] = ["1292", "1293", "1294", "1295", "1297"];

/// Indexed by `JobKind as usize`; order must follow the enum declaration.
static KIND_SPECS: [KindSpec; 9] = [
    KindSpec {
        kind: JobKind::Generate,
        source: include_str!("../templates/generate.json"),
        bindings: &[
            required("prompt", "9", "prompt"),
            optional("image", "1", "image", ParamType::Text),
            optional("steps", "10", "value", ParamType::Int),
            optional("cfg", "11", "value", ParamType::Float),
            optional("width", "12", "value", ParamType::Int),
            optional("height", "13", "value", ParamType::Int),
        ],
        optional_subgraph: Some(OptionalSubgraph {
            param: "image",
            node_ids: &["1"],
        }),
        img2img: Some(Img2ImgBinding {
            param: "image",
            encode_node_id: "1_encode",
            pixels_node: "1",
            vae_node: "2",
            sampler_node_id: "16",
            denoise: 0.75,
            reference_slot: Some(("9", "image1")),
        }),
        seed_nodes: &["16"],
        reupload_param: None,
        output_nodes: &["18"],
    },
    KindSpec {
        kind: JobKind::Upscale,
        source: include_str!("../templates/upscale.json"),
        bindings: &[
            required("image", "16", "image"),
            optional("resolution", "10", "resolution", ParamType::Int),
            optional("resolution", "10", "max_resolution", ParamType::Int),
            optional("seed", "10", "seed", ParamType::Int),
        ],
        optional_subgraph: None,
        img2img: None,
        seed_nodes: &[],
        reupload_param: Some("image"),
        output_nodes: &["11"],
    },
    KindSpec {
        kind: JobKind::Edit,
        source: include_str!("../templates/edit.json"),
        bindings: &[
            required("image1", "213", "image"),
            required("image2", "1284", "image"),
            optional("image3", "1285", "image", ParamType::Text),
            optional("image4", "1292", "image", ParamType::Text),
            optional("prompt", "1199", "prompt", ParamType::Text),
            optional("closeup_prompt", "1323", "prompt", ParamType::Text),
            optional("steps", "844", "value", ParamType::Int),
            optional("cfg", "850", "value", ParamType::Float),
            optional("width", "1298", "value", ParamType::Int),
            optional("height", "1299", "value", ParamType::Int),
        ],
        optional_subgraph: Some(OptionalSubgraph {
            param: "image4",
            node_ids: &EDIT_IMAGE4_SUBGRAPH,
        }),
        img2img: Some(Img2ImgBinding {
            param: "image1",
            encode_node_id: "200_encode",
            pixels_node: "213",
            vae_node: "549",
            sampler_node_id: "199",
            denoise: 0.75,
            reference_slot: None,
        }),
        seed_nodes: &["199", "1324"],
        reupload_param: None,
        output_nodes: &["202", "1326"],
    },
    KindSpec {
        kind: JobKind::TryOn,
        source: include_str!("../templates/tryon.json"),
        bindings: &[
            required("person_image", "39", "image"),
            required("clothing_image", "104", "image"),
            with_fallback("pose_image", "130", "image", "person_image"),
            optional("extract_prompt", "128", "prompt", ParamType::Text),
            optional("transfer_prompt", "135", "prompt", ParamType::Text),
        ],
        optional_subgraph: None,
        img2img: None,
        seed_nodes: &["127", "137"],
        reupload_param: None,
        output_nodes: &["85", "140"],
    },
    KindSpec {
        kind: JobKind::CanvasEdit,
        source: include_str!("../templates/canvas_edit.json"),
        bindings: &[
            required("background_image", "1", "image"),
            optional("prompt", "8", "prompt", ParamType::Text),
        ],
        optional_subgraph: None,
        img2img: None,
        seed_nodes: &["14"],
        reupload_param: None,
        output_nodes: &["16"],
    },
    KindSpec {
        kind: JobKind::Inpaint,
        source: include_str!("../templates/inpaint.json"),
        bindings: &[
            required("image", "1", "image"),
            required("mask", "2", "image"),
            required("prompt", "4", "text"),
        ],
        optional_subgraph: None,
        img2img: None,
        seed_nodes: &["8"],
        reupload_param: None,
        output_nodes: &["10"],
    },
    KindSpec {
        kind: JobKind::RemoveBackground,
        source: include_str!("../templates/remove_background.json"),
        bindings: &[required("image", "1", "image")],
        optional_subgraph: None,
        img2img: None,
        seed_nodes: &[],
        reupload_param: None,
        output_nodes: &["3"],
    },
    KindSpec {
        kind: JobKind::EnhanceComposition,
        source: include_str!("../templates/enhance_composition.json"),
        bindings: &[
            required("image", "1", "image"),
            required("prompt", "5", "text"),
            optional("steps", "7", "steps", ParamType::Int),
            optional("cfg", "7", "cfg", ParamType::Float),
            optional("denoise", "7", "denoise", ParamType::Float),
        ],
        optional_subgraph: None,
        // The template encodes its input itself; no rewiring needed.
        img2img: None,
        seed_nodes: &["7"],
        reupload_param: None,
        output_nodes: &["9"],
    },
    KindSpec {
        kind: JobKind::UpscaleSimple,
        source: include_str!("../templates/upscale_simple.json"),
        bindings: &[
            required("image", "1", "image"),
            optional("model_name", "3", "model_name", ParamType::Text),
        ],
        optional_subgraph: None,
        img2img: None,
        seed_nodes: &[],
        reupload_param: None,
        output_nodes: &["4"],
    },
];

pub fn spec_for(kind: JobKind) -> &'static KindSpec {
    &KIND_SPECS[kind as usize]
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Check required parameters without touching the template.
pub fn validate(request: &GenerationRequest) -> Result<(), CoreError> {
    match spec_for(request.kind).missing_required(&request.parameters) {
        Some(param) => Err(CoreError::Validation(format!("{param} is required"))),
        None => Ok(()),
    }
}

/// Build the workflow graph for `request` with freshly drawn seeds.
pub fn build(request: &GenerationRequest) -> Result<WorkflowGraph, CoreError> {
    let seed = rand::rng().random_range(0..SEED_RANGE);
    build_with_seed(request, seed)
}

/// Build the workflow graph for `request`, using `seed` for every
/// randomized sampler unless the request carries its own `seed`.
pub fn build_with_seed(request: &GenerationRequest, seed: i64) -> Result<WorkflowGraph, CoreError> {
    let spec = spec_for(request.kind);
    let params = &request.parameters;
    validate(request)?;

    let mut subs = Vec::with_capacity(spec.bindings.len() + spec.seed_nodes.len() + 1);
    for binding in spec.bindings {
        let mut value = params.slot_value(binding.param, binding.ty)?;
        if value.is_none() {
            if let Some(fallback) = binding.fallback {
                value = params.slot_value(fallback, binding.ty)?;
            }
        }
        let slot = SlotPath::new(binding.node_id, binding.input);
        subs.push(if binding.required {
            Substitution::required(binding.param, slot, value)
        } else {
            Substitution::optional(binding.param, slot, value)
        });
    }

    if !spec.seed_nodes.is_empty() {
        let seed = params
            .slot_value(SEED_PARAM, ParamType::Int)?
            .unwrap_or(SlotValue::Int(seed));
        for node in spec.seed_nodes {
            subs.push(Substitution::optional(
                SEED_PARAM,
                SlotPath::new(*node, "seed"),
                Some(seed.clone()),
            ));
        }
    }

    let img2img = spec
        .img2img
        .as_ref()
        .filter(|binding| params.is_present(binding.param));
    if let Some(binding) = img2img {
        if let Some((node, input)) = binding.reference_slot {
            subs.push(Substitution::optional(
                binding.param,
                SlotPath::new(node, input),
                Some(SlotValue::Link(NodeLink::new(binding.pixels_node, 0))),
            ));
        }
    }

    let mut graph = apply(&spec.template()?, &subs)?;

    if let Some(subgraph) = &spec.optional_subgraph {
        if !params.is_present(subgraph.param) {
            let removed = graph.remove_subgraph(subgraph.node_ids);
            tracing::debug!(
                kind = %request.kind,
                param = subgraph.param,
                removed,
                "Dropped optional subgraph"
            );
        }
    }

    if let Some(binding) = img2img {
        graph.apply_img2img(&Img2ImgRewire {
            encode_node_id: binding.encode_node_id.to_string(),
            pixels: NodeLink::new(binding.pixels_node, 0),
            vae: NodeLink::new(binding.vae_node, 0),
            sampler_node_id: binding.sampler_node_id.to_string(),
            denoise: binding.denoise,
        })?;
    }

    for node in spec.output_nodes {
        if !graph.contains_node(node) {
            return Err(CoreError::Internal(format!(
                "{} template lost output node {node}",
                request.kind
            )));
        }
    }

    Ok(graph)
}
