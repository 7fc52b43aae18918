//! Generic workflow graph manipulation.
//!
//! A workflow is a JSON object keyed by node id, where each node carries a
//! `class_type` and an `inputs` map. Inputs are either literal values or
//! links of the form `["<node_id>", <output_index>]`.
//!
//! Templates are never mutated in place: [`apply`] returns a deep copy with
//! the substitutions written into it, and the structural edits
//! ([`WorkflowGraph::remove_subgraph`], [`WorkflowGraph::apply_img2img`])
//! operate on that copy.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use crate::error::CoreError;

/// Sampler inputs that only [`Img2ImgRewire`] may change.
const LINKED_SAMPLER_INPUTS: [&str; 2] = ["latent_image", "denoise"];

// ---------------------------------------------------------------------------
// Slot addressing
// ---------------------------------------------------------------------------

/// Address of one node input inside a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPath {
    pub node_id: String,
    pub input: String,
}

impl SlotPath {
    pub fn new(node_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            input: input.into(),
        }
    }
}

impl std::fmt::Display for SlotPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node_id, self.input)
    }
}

/// Reference to one output of another node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLink {
    pub node_id: String,
    pub output: u32,
}

impl NodeLink {
    pub fn new(node_id: impl Into<String>, output: u32) -> Self {
        Self {
            node_id: node_id.into(),
            output,
        }
    }

    fn to_value(&self) -> Value {
        json!([self.node_id, self.output])
    }
}

/// Value written into a slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    Text(String),
    Int(i64),
    Float(f64),
    Link(NodeLink),
}

impl SlotValue {
    fn is_blank(&self) -> bool {
        matches!(self, SlotValue::Text(s) if s.trim().is_empty())
    }

    fn to_value(&self) -> Value {
        match self {
            SlotValue::Text(s) => Value::String(s.clone()),
            SlotValue::Int(n) => json!(n),
            SlotValue::Float(n) => json!(n),
            SlotValue::Link(link) => link.to_value(),
        }
    }
}

impl From<&str> for SlotValue {
    fn from(s: &str) -> Self {
        SlotValue::Text(s.to_string())
    }
}

impl From<String> for SlotValue {
    fn from(s: String) -> Self {
        SlotValue::Text(s)
    }
}

impl From<i64> for SlotValue {
    fn from(n: i64) -> Self {
        SlotValue::Int(n)
    }
}

impl From<f64> for SlotValue {
    fn from(n: f64) -> Self {
        SlotValue::Float(n)
    }
}

/// One slot write. A `None` value leaves the template default in place.
#[derive(Debug, Clone)]
pub struct Substitution {
    /// Caller-facing name of the value, used in validation messages.
    pub label: String,
    pub slot: SlotPath,
    pub value: Option<SlotValue>,
    pub required: bool,
}

impl Substitution {
    pub fn optional(label: impl Into<String>, slot: SlotPath, value: Option<SlotValue>) -> Self {
        Self {
            label: label.into(),
            slot,
            value,
            required: false,
        }
    }

    pub fn required(label: impl Into<String>, slot: SlotPath, value: Option<SlotValue>) -> Self {
        Self {
            label: label.into(),
            slot,
            value,
            required: true,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// Node-keyed workflow document accepted by the engine's submit endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowGraph {
    nodes: Map<String, Value>,
}

impl WorkflowGraph {
    /// Parse a template document. Every node must be an object with a
    /// string `class_type`.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| CoreError::Validation(format!("Invalid workflow JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let Value::Object(nodes) = value else {
            return Err(CoreError::Validation(
                "Workflow must be a JSON object keyed by node id".into(),
            ));
        };
        for (id, node) in &nodes {
            if node.get("class_type").and_then(Value::as_str).is_none() {
                return Err(CoreError::Validation(format!(
                    "Node '{id}' has no class_type"
                )));
            }
        }
        Ok(Self { nodes })
    }

    /// Set of node ids, sorted.
    pub fn node_ids(&self) -> BTreeSet<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn class_type(&self, node_id: &str) -> Option<&str> {
        self.nodes.get(node_id)?.get("class_type")?.as_str()
    }

    pub fn input(&self, slot: &SlotPath) -> Option<&Value> {
        self.nodes.get(&slot.node_id)?.get("inputs")?.get(&slot.input)
    }

    /// Write a value into a slot. Returns `false` when the node (or its
    /// `inputs` map) does not exist.
    fn set_input(&mut self, slot: &SlotPath, value: Value) -> bool {
        match self
            .nodes
            .get_mut(&slot.node_id)
            .and_then(|node| node.get_mut("inputs"))
            .and_then(Value::as_object_mut)
        {
            Some(inputs) => {
                inputs.insert(slot.input.clone(), value);
                true
            }
            None => false,
        }
    }

    /// Delete the listed nodes. Ids that are not present are ignored.
    /// Returns the number of nodes removed.
    pub fn remove_subgraph(&mut self, node_ids: &[&str]) -> usize {
        node_ids
            .iter()
            .filter(|id| self.nodes.remove(**id).is_some())
            .count()
    }

    /// Inject a pixel encoder and rewire a sampler to start from it.
    pub fn apply_img2img(&mut self, rewire: &Img2ImgRewire) -> Result<(), CoreError> {
        for source in [&rewire.pixels.node_id, &rewire.vae.node_id, &rewire.sampler_node_id] {
            if !self.contains_node(source) {
                return Err(CoreError::Internal(format!(
                    "img2img rewire references missing node '{source}'"
                )));
            }
        }

        self.nodes.insert(
            rewire.encode_node_id.clone(),
            json!({
                "class_type": "VAEEncode",
                "inputs": {
                    "pixels": rewire.pixels.to_value(),
                    "vae": rewire.vae.to_value(),
                },
            }),
        );

        let latent = SlotPath::new(&rewire.sampler_node_id, "latent_image");
        let denoise = SlotPath::new(&rewire.sampler_node_id, "denoise");
        let linked = NodeLink::new(&rewire.encode_node_id, 0).to_value();
        if !self.set_input(&latent, linked) || !self.set_input(&denoise, json!(rewire.denoise)) {
            return Err(CoreError::Internal(format!(
                "Sampler '{}' has no inputs",
                rewire.sampler_node_id
            )));
        }
        Ok(())
    }

    /// Links whose target node does not exist, as `(node, input, target)`.
    pub fn dangling_links(&self) -> Vec<(String, String, String)> {
        let mut dangling = Vec::new();
        for (id, node) in &self.nodes {
            let Some(inputs) = node.get("inputs").and_then(Value::as_object) else {
                continue;
            };
            for (name, value) in inputs {
                let Some([Value::String(target), Value::Number(_)]) =
                    value.as_array().map(Vec::as_slice)
                else {
                    continue;
                };
                if !self.nodes.contains_key(target) {
                    dangling.push((id.clone(), name.clone(), target.clone()));
                }
            }
        }
        dangling
    }

    pub fn as_json(&self) -> &Map<String, Value> {
        &self.nodes
    }

    pub fn into_json(self) -> Value {
        Value::Object(self.nodes)
    }
}

// ---------------------------------------------------------------------------
// Img2Img
// ---------------------------------------------------------------------------

/// Start a sampler from encoded pixels instead of an empty latent.
///
/// Writing the sampler's `latent_image` without `denoise` (or the reverse)
/// produces either a full re-noise of the base image or a partial denoise of
/// an empty latent, so both are only changed through this type.
#[derive(Debug, Clone)]
pub struct Img2ImgRewire {
    pub encode_node_id: String,
    pub pixels: NodeLink,
    pub vae: NodeLink,
    pub sampler_node_id: String,
    pub denoise: f64,
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// Copy `template` and write each substitution into the copy.
///
/// Optional substitutions with no value, or whose node is absent from the
/// template, are skipped. Required substitutions fail with
/// [`CoreError::Validation`] when the value is missing or blank.
pub fn apply(template: &WorkflowGraph, subs: &[Substitution]) -> Result<WorkflowGraph, CoreError> {
    for sub in subs.iter().filter(|s| s.required) {
        match &sub.value {
            Some(v) if !v.is_blank() => {}
            _ => return Err(CoreError::Validation(format!("{} is required", sub.label))),
        }
    }

    let mut graph = template.clone();
    for sub in subs {
        let Some(value) = &sub.value else { continue };

        if LINKED_SAMPLER_INPUTS.contains(&sub.slot.input.as_str())
            && graph
                .class_type(&sub.slot.node_id)
                .is_some_and(|c| c.starts_with("KSampler"))
        {
            return Err(CoreError::Internal(format!(
                "{} can only be changed through an img2img rewire",
                sub.slot
            )));
        }

        let written = graph.set_input(&sub.slot, value.to_value());
        if !written && sub.required {
            return Err(CoreError::Internal(format!(
                "Template has no slot {} for {}",
                sub.slot, sub.label
            )));
        }
    }
    Ok(graph)
}
