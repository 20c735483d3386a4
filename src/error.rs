//! Error types for the gateway.

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// A required field was missing from the inbound body. Carries the
    /// offending body so callers can echo it back for diagnosis.
    #[error("Invalid request body: missing required field '{field}'")]
    Validation {
        field: String,
        body: serde_json::Value,
    },

    #[error("Unknown model '{model}'")]
    UnknownModel { model: String },

    #[error("Backend error (status {status:?}): {message}")]
    Backend {
        status: Option<u16>,
        message: String,
    },

    #[error("Malformed backend chunk: {message}")]
    MalformedChunk { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl GatewayError {
    pub fn validation(field: impl Into<String>, body: serde_json::Value) -> Self {
        Self::Validation {
            field: field.into(),
            body,
        }
    }

    pub fn unknown_model(model: impl Into<String>) -> Self {
        Self::UnknownModel {
            model: model.into(),
        }
    }

    pub fn backend(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: msg.into(),
        }
    }

    pub fn malformed_chunk(msg: impl Into<String>) -> Self {
        Self::MalformedChunk {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// The HTTP status this error maps to at the gateway edge.
    /// Client-caused errors are 4xx; everything else surfaces as a bad
    /// gateway since the failure happened between us and the backend.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::UnknownModel { .. } => 400,
            Self::Config { .. } => 500,
            _ => 502,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
