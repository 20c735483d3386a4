//! Issued API keys, persisted as a JSON array on disk.
//!
//! A stand-in for a managed secret store: the gateway only needs
//! membership checks on the hot path and list/issue/revoke for the admin
//! endpoints. A missing file reads as an empty key set and is created on
//! first save.

use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Clone)]
pub struct KeyStore {
    keys: Arc<RwLock<Vec<String>>>,
    file_path: PathBuf,
}

impl KeyStore {
    /// Load the key set from `path`, or start empty if the file does not
    /// exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();

        let keys = if file_path.exists() {
            let content = std::fs::read_to_string(&file_path)?;
            serde_json::from_str(&content)?
        } else {
            tracing::info!(path = %file_path.display(), "No key file found, starting with an empty key set");
            Vec::new()
        };

        Ok(Self {
            keys: Arc::new(RwLock::new(keys)),
            file_path,
        })
    }

    /// Whether `key` has been issued. The only call on the request path.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys
            .read()
            .map(|keys| keys.iter().any(|k| k == key))
            .unwrap_or(false)
    }

    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.keys.read().map(|k| k.clone()).unwrap_or_default()
    }

    /// Issue a fresh key, persist, and return it.
    pub fn issue(&self) -> Result<String> {
        let key = format!("bedrock-sk-{}", Uuid::new_v4());
        {
            let mut keys = self
                .keys
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            keys.push(key.clone());
        }
        self.save()?;
        Ok(key)
    }

    /// Revoke a key. Returns false when the key was never issued.
    pub fn revoke(&self, key: &str) -> Result<bool> {
        let removed = {
            let mut keys = self
                .keys
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let before = keys.len();
            keys.retain(|k| k != key);
            keys.len() < before
        };
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    fn save(&self) -> Result<()> {
        let keys = self.list();
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.file_path, serde_json::to_string_pretty(&keys)?)?;
        Ok(())
    }
}
