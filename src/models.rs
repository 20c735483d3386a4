//! Model identifier resolution.
//!
//! Maps public Anthropic model names to Bedrock model identifiers via a
//! fixed table built once at startup. The table is immutable afterwards,
//! so it can be shared across request tasks without synchronization.

use crate::error::{GatewayError, Result};
use std::collections::HashMap;

/// Built-in public-name → Bedrock-id pairs. Config entries may extend or
/// override these.
const BUILTIN_MODELS: &[(&str, &str)] = &[
    ("claude-instant-1.2", "anthropic.claude-instant-v1"),
    ("claude-2.0", "anthropic.claude-v2"),
    ("claude-2.1", "anthropic.claude-v2:1"),
    (
        "claude-3-sonnet-20240229",
        "anthropic.claude-3-sonnet-20240229-v1:0",
    ),
    (
        "claude-3-haiku-20240307",
        "anthropic.claude-3-haiku-20240307-v1:0",
    ),
];

pub const DEFAULT_BACKEND_MODEL: &str = "anthropic.claude-3-haiku-20240307-v1:0";

/// Immutable public-name → backend-id table plus the default backend id
/// used when a caller supplies no model at all.
#[derive(Debug, Clone)]
pub struct ModelTable {
    entries: HashMap<String, String>,
    default_id: String,
}

impl ModelTable {
    /// Build the table from the built-in pairs, config overrides applied on top.
    pub fn new(overrides: &HashMap<String, String>, default_id: Option<&str>) -> Self {
        let mut entries: HashMap<String, String> = BUILTIN_MODELS
            .iter()
            .map(|(name, id)| ((*name).to_string(), (*id).to_string()))
            .collect();
        for (name, id) in overrides {
            entries.insert(name.clone(), id.clone());
        }

        Self {
            entries,
            default_id: default_id.unwrap_or(DEFAULT_BACKEND_MODEL).to_string(),
        }
    }

    /// Resolve a public model name to a backend id.
    ///
    /// An absent name yields the default backend id; a present but unmapped
    /// name is a hard error.
    ///
    /// # Errors
    /// Returns `GatewayError::UnknownModel` if `name` is not in the table.
    pub fn resolve(&self, name: Option<&str>) -> Result<&str> {
        match name {
            None => Ok(&self.default_id),
            Some(name) => self
                .entries
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| GatewayError::unknown_model(name)),
        }
    }

    /// Resolve with fallback: an unmapped or absent name yields the default
    /// backend id. Used by the legacy completion shape, which never treats
    /// the model field as authoritative.
    pub fn resolve_or_default(&self, name: Option<&str>) -> &str {
        name.and_then(|n| self.entries.get(n))
            .map_or(&self.default_id, String::as_str)
    }

    #[must_use]
    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    /// Public names known to the table, for the `/v1/models` listing.
    pub fn public_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Default for ModelTable {
    fn default() -> Self {
        Self::new(&HashMap::new(), None)
    }
}
