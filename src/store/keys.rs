use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JsonFile;

/// Stored credentials for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ProviderKey {
    pub key: String,
    /// Models this key may be used with.
    pub models: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Provider credentials, persisted as `api_keys.json`.
pub(crate) struct KeyStore {
    file: JsonFile,
    keys: Mutex<BTreeMap<String, ProviderKey>>,
}

impl KeyStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let file = JsonFile::new(path);
        let keys: BTreeMap<String, ProviderKey> = file.load()?;
        tracing::info!(
            path = %file.path().display(),
            providers = keys.len(),
            "loaded API key configurations"
        );
        Ok(Self {
            file,
            keys: Mutex::new(keys),
        })
    }

    pub fn get(&self, provider_id: &str) -> Option<ProviderKey> {
        self.lock().get(provider_id).cloned()
    }

    /// Configured providers and their allowed models. Keys are not exposed.
    pub fn list(&self) -> BTreeMap<String, Vec<String>> {
        self.lock()
            .iter()
            .map(|(provider, key)| (provider.clone(), key.models.clone()))
            .collect()
    }

    /// Insert or replace the key for a provider and persist.
    pub fn insert(&self, provider_id: &str, key: ProviderKey) -> Result<()> {
        let mut keys = self.lock();
        self.file.commit(&mut *keys, |keys| {
            keys.insert(provider_id.to_string(), key);
        })
    }

    /// Remove a provider's key. Returns `false` if none was stored.
    pub fn remove(&self, provider_id: &str) -> Result<bool> {
        let mut keys = self.lock();
        if !keys.contains_key(provider_id) {
            return Ok(false);
        }
        self.file.commit(&mut *keys, |keys| {
            keys.remove(provider_id);
        })?;
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ProviderKey>> {
        self.keys.lock().unwrap_or_else(|e| e.into_inner())
    }
}
