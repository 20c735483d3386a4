use crate::error::{GatewayError, Result};
use crate::models::ModelTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub backend: BackendConfig,
    /// Public-name → Bedrock-id overrides layered over the built-in table.
    #[serde(default)]
    pub models: HashMap<String, String>,
    /// Backend id used when a caller supplies no model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// AWS region used to derive the Bedrock Runtime endpoint.
    #[serde(default = "default_region")]
    pub region: String,
    /// Full endpoint override; takes precedence over `region`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the Bedrock API key (bearer token).
    #[serde(default = "default_credential_env")]
    pub credential_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable holding the admin key for /keys management.
    #[serde(default = "default_admin_key_env")]
    pub admin_key_env: String,
    /// Where issued API keys are persisted (JSON array).
    #[serde(default = "default_keys_file")]
    pub keys_file: PathBuf,
}

fn default_port() -> u16 {
    8742
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_credential_env() -> String {
    "AWS_BEARER_TOKEN_BEDROCK".to_string()
}

fn default_admin_key_env() -> String {
    "ADMIN_API_KEY".to_string()
}

fn default_keys_file() -> PathBuf {
    PathBuf::from("bedrock-gateway-keys.json")
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            base_url: None,
            credential_env: default_credential_env(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_key_env: default_admin_key_env(),
            keys_file: default_keys_file(),
        }
    }
}

impl GatewayConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file, falling back to
    /// defaults when none exists.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(&candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self {
            port: default_port(),
            backend: BackendConfig::default(),
            models: HashMap::new(),
            default_model: None,
            auth: AuthConfig::default(),
        })
    }

    /// Resolve the effective Bedrock Runtime endpoint (override or derived
    /// from the region).
    #[must_use]
    pub fn effective_base_url(&self) -> String {
        if let Some(ref url) = self.backend.base_url {
            return url.trim_end_matches('/').to_string();
        }
        format!(
            "https://bedrock-runtime.{}.amazonaws.com",
            self.backend.region
        )
    }

    /// Resolve the backend credential from the configured environment variable.
    pub fn resolve_credential(&self) -> Result<String> {
        std::env::var(&self.backend.credential_env).map_err(|_| {
            GatewayError::config(format!(
                "Environment variable '{}' not set. Set it with your Bedrock API key.",
                self.backend.credential_env
            ))
        })
    }

    /// Resolve the admin key guarding the /keys endpoints.
    pub fn resolve_admin_key(&self) -> Result<String> {
        std::env::var(&self.auth.admin_key_env).map_err(|_| {
            GatewayError::config(format!(
                "Environment variable '{}' not set. Set it to enable key management.",
                self.auth.admin_key_env
            ))
        })
    }

    /// Build the immutable model table from the built-ins plus this
    /// config's overrides.
    #[must_use]
    pub fn model_table(&self) -> ModelTable {
        ModelTable::new(&self.models, self.default_model.as_deref())
    }
}

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("bedrock-gateway.toml"));

    // XDG / platform config dir
    if cfg!(target_os = "macos") {
        if let Some(home) = home_dir() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("bedrock-gateway")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(
                PathBuf::from(xdg)
                    .join("bedrock-gateway")
                    .join("config.toml"),
            );
        }
        if let Some(home) = home_dir() {
            paths.push(
                home.join(".config")
                    .join("bedrock-gateway")
                    .join("config.toml"),
            );
        }
    }

    // Home directory fallback
    if let Some(home) = home_dir() {
        paths.push(home.join(".bedrock-gateway.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
