use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// In-memory copy of the local state file.
///
/// Read from disk at most once; every `set` rewrites the whole file.
pub struct LocalState {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    loaded: bool,
}

impl LocalState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LocalState {
            path: path.into(),
            entries: BTreeMap::new(),
            loaded: false,
        }
    }

    /// Populate the snapshot from disk. No-op after the first call.
    pub async fn load(&mut self) {
        if self.loaded {
            return;
        }
        self.entries = read_snapshot(&self.path).await;
        self.loaded = true;
    }

    pub async fn get(&mut self, key: &str) -> Option<String> {
        self.load().await;
        self.entries.get(key).cloned()
    }

    /// Update the snapshot, then persist it. On error the in-memory value is kept.
    pub async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.load().await;
        self.entries.insert(key.to_string(), value.to_string());
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

async fn read_snapshot(path: &Path) -> BTreeMap<String, String> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No state file at {}, starting empty", path.display());
            return BTreeMap::new();
        }
        Err(e) => {
            warn!("Unreadable state file {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };
    if raw.trim().is_empty() {
        return BTreeMap::new();
    }

    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect(),
        Ok(_) => {
            warn!("State file {} is not a JSON object, ignoring", path.display());
            BTreeMap::new()
        }
        Err(e) => {
            warn!("Malformed state file {}: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}
