//! Rewrite an inbound Anthropic-shaped body into a Bedrock-ready one.
//!
//! Normalization is a pure transform: the caller keeps the original body
//! untouched and receives a new value with `model` and `stream` stripped
//! and the Bedrock version marker injected.

use crate::error::{GatewayError, Result};
use crate::models::ModelTable;
use serde_json::{Map, Value};

/// Version marker Bedrock requires on every Anthropic model invocation.
/// A backend-contract constant, not configurable per request.
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// The two inbound request shapes, distinguished only by their required
/// fields and by whether the `model` field is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    /// Legacy `/v1/complete` shape.
    LegacyComplete,
    /// `/v1/messages` shape.
    Messages,
}

impl RequestShape {
    #[must_use]
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::LegacyComplete => &["prompt", "max_tokens_to_sample"],
            Self::Messages => &["model", "messages", "max_tokens"],
        }
    }

    /// Whether an unmapped model name is a hard error. The legacy shape
    /// never treats `model` as authoritative and falls back to the
    /// default backend id.
    #[must_use]
    pub fn validates_model(self) -> bool {
        matches!(self, Self::Messages)
    }
}

/// A backend-ready request: resolved model id, rewritten body, and the
/// extracted streaming flag.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub model_id: String,
    pub body: Map<String, Value>,
    pub stream: bool,
}

impl NormalizedRequest {
    /// The body as a JSON value, ready to serialize onto the wire.
    #[must_use]
    pub fn body_value(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

/// Validate and rewrite an inbound body for the given shape.
///
/// # Errors
/// Returns `GatewayError::Validation` when a required field is absent
/// (carrying the offending body for diagnostics), and
/// `GatewayError::UnknownModel` when the messages shape names a model
/// outside the table. No backend call happens on either failure.
pub fn normalize(
    raw: &Value,
    shape: RequestShape,
    models: &ModelTable,
) -> Result<NormalizedRequest> {
    let obj = raw.as_object().ok_or_else(|| {
        GatewayError::validation(shape.required_fields()[0], raw.clone())
    })?;

    for field in shape.required_fields() {
        if !obj.contains_key(*field) {
            return Err(GatewayError::validation(*field, raw.clone()));
        }
    }

    let mut body = obj.clone();

    // A non-string model can never resolve; where the model field is
    // authoritative that is an error, not a silent default.
    let model_name = match body.remove("model") {
        Some(Value::String(s)) => Some(s),
        Some(other) if shape.validates_model() => {
            return Err(GatewayError::unknown_model(other.to_string()));
        }
        _ => None,
    };

    let model_id = if shape.validates_model() {
        models.resolve(model_name.as_deref())?.to_string()
    } else {
        models.resolve_or_default(model_name.as_deref()).to_string()
    };

    let stream = body
        .remove("stream")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    // Idempotent: re-inserting the same constant is a no-op.
    body.insert(
        "anthropic_version".to_string(),
        Value::String(ANTHROPIC_VERSION.to_string()),
    );

    Ok(NormalizedRequest {
        model_id,
        body,
        stream,
    })
}
