// JSON-file persistence for credentials and chat transcripts.
//
// Each store keeps its whole map in memory behind a mutex and rewrites the
// file on every change. Writes go to a temp file first and are renamed into
// place, so a crash never leaves a half-written file behind.

pub(crate) mod keys;
pub(crate) mod sessions;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

pub(crate) use keys::{KeyStore, ProviderKey};
pub(crate) use sessions::{ChatSession, SessionStore, SessionSummary, TranscriptMessage};

/// A JSON document on disk.
#[derive(Debug, Clone)]
pub(crate) struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file; a missing file yields `T::default()`.
    pub fn load<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no data file yet");
            return Ok(T::default());
        }
        let data = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let value = serde_json::from_str(&data)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(value)
    }

    /// Save atomically (write to a temp file, then rename).
    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating data directory {}", dir.display()))?;

        let tmp_path = dir.join(format!(".store-{}.tmp", Uuid::new_v4()));
        let data = serde_json::to_string_pretty(value).context("serializing store")?;

        std::fs::write(&tmp_path, &data)
            .with_context(|| format!("writing temp file {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming temp file to {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), "saved");
        Ok(())
    }

    /// Apply `change` to a copy of `current` and save the copy. `current` is
    /// only replaced once the save succeeded.
    pub fn commit<T, R>(&self, current: &mut T, change: impl FnOnce(&mut T) -> R) -> Result<R>
    where
        T: Serialize + Clone,
    {
        let mut next = current.clone();
        let out = change(&mut next);
        self.save(&next)?;
        *current = next;
        Ok(out)
    }
}
