//! Caller-facing description of one generation.

use atelier_core::error::CoreError;
use atelier_core::job_kind::JobKind;
use atelier_core::workflow_template::SlotValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a parameter is written into its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Text,
    Int,
    Float,
}

/// Free-form parameter bag (prompts, image names, dimensions, seeds, steps,
/// cfg). Stored verbatim on the job row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobParameters(Map<String, Value>);

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            _ => Err(CoreError::Validation("parameters must be a JSON object".into())),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.0.insert(name.to_string(), value.into());
    }

    /// Non-blank string value of `name`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Whether `name` carries a usable value. Blank strings and nulls count
    /// as absent.
    pub fn is_present(&self, name: &str) -> bool {
        match self.0.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }

    /// Convert `name` into a slot value of type `ty`.
    ///
    /// Absent or blank values yield `Ok(None)`. Numbers may arrive either as
    /// JSON numbers or numeric strings (form posts).
    pub fn slot_value(&self, name: &str, ty: ParamType) -> Result<Option<SlotValue>, CoreError> {
        if !self.is_present(name) {
            return Ok(None);
        }
        let Some(raw) = self.0.get(name) else {
            return Ok(None);
        };

        let value = match ty {
            ParamType::Text => match raw {
                Value::String(s) => SlotValue::Text(s.clone()),
                other => SlotValue::Text(other.to_string()),
            },
            ParamType::Int => SlotValue::Int(as_int(raw).ok_or_else(|| invalid(name, "an integer"))?),
            ParamType::Float => SlotValue::Float(as_float(raw).ok_or_else(|| invalid(name, "a number"))?),
        };
        Ok(Some(value))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

fn invalid(name: &str, expected: &str) -> CoreError {
    CoreError::Validation(format!("{name} must be {expected}"))
}

fn as_int(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_float(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One generation request as submitted by a client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationRequest {
    pub kind: JobKind,
    #[serde(default)]
    pub parameters: JobParameters,
}

impl GenerationRequest {
    pub fn new(kind: JobKind, parameters: JobParameters) -> Self {
        Self { kind, parameters }
    }
}
