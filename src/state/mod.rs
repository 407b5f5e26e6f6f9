pub mod local;
pub mod sheets;

use std::path::PathBuf;

use tracing::{info, warn};

use crate::settings::StateSettings;
use local::LocalState;
use sheets::{BackendError, SheetsClient, TabularStore};

/// Sheet tab holding the key/value table. Row 1 is data, there is no header.
pub const STATE_SHEET: &str = "State";
pub const STATE_RANGE: &str = "State!A:B";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Stored in the sheet or written to the local file.
    Persisted,
    /// Only the in-memory snapshot holds the value.
    Degraded,
}

/// Cross-run key/value state.
///
/// Uses the sheet when one is configured and falls back to the local file
/// whenever it is not or a sheet call fails. `get` and `set` never fail.
pub struct StateStore {
    remote: Option<Box<dyn TabularStore>>,
    local: LocalState,
}

impl StateStore {
    pub fn local_only(path: impl Into<PathBuf>) -> Self {
        StateStore {
            remote: None,
            local: LocalState::new(path),
        }
    }

    pub fn with_remote(remote: Box<dyn TabularStore>, path: impl Into<PathBuf>) -> Self {
        StateStore {
            remote: Some(remote),
            local: LocalState::new(path),
        }
    }

    pub fn from_settings(settings: &StateSettings) -> Self {
        match (&settings.sheet_id, &settings.access_token) {
            (Some(id), Some(token)) if settings.remote_configured() => {
                info!("State backend: sheet {} (local fallback {})", id, settings.file.display());
                let client = SheetsClient::new(id, token).with_base_url(&settings.api_base);
                Self::with_remote(Box::new(client), &settings.file)
            }
            _ => {
                info!("State backend: local file {}", settings.file.display());
                Self::local_only(&settings.file)
            }
        }
    }

    pub fn remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn get(&mut self, key: &str) -> Option<String> {
        if let Some(remote) = &self.remote {
            match remote_get(remote.as_ref(), key).await {
                Ok(value) => return value,
                Err(e) => warn!(key = %key, "State sheet read failed, using local file: {}", e),
            }
        }
        self.local.get(key).await
    }

    /// Look up several keys with a single sheet read.
    pub async fn get_many(&mut self, keys: &[String]) -> Vec<Option<String>> {
        if let Some(remote) = &self.remote {
            match remote.read_range(STATE_RANGE).await {
                Ok(rows) => return keys.iter().map(|k| lookup(&rows, k)).collect(),
                Err(e) => warn!("State sheet read failed, using local file: {}", e),
            }
        }
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.local.get(key).await);
        }
        values
    }

    pub async fn set(&mut self, key: &str, value: &str) -> SetOutcome {
        if let Some(remote) = &self.remote {
            match remote_set(remote.as_ref(), key, value).await {
                Ok(()) => return SetOutcome::Persisted,
                Err(e) => warn!(key = %key, "State sheet write failed, using local file: {}", e),
            }
        }
        match self.local.set(key, value).await {
            Ok(()) => SetOutcome::Persisted,
            Err(e) => {
                warn!(key = %key, "State kept in memory only: {:#}", e);
                SetOutcome::Degraded
            }
        }
    }
}

fn find_row(rows: &[Vec<String>], key: &str) -> Option<usize> {
    rows.iter()
        .position(|row| row.first().is_some_and(|cell| cell == key))
}

/// Column B of the first row keyed `key`; a row without a second cell reads as "".
fn lookup(rows: &[Vec<String>], key: &str) -> Option<String> {
    find_row(rows, key).map(|i| rows[i].get(1).cloned().unwrap_or_default())
}

async fn remote_get(remote: &dyn TabularStore, key: &str) -> Result<Option<String>, BackendError> {
    let rows = remote.read_range(STATE_RANGE).await?;
    Ok(lookup(&rows, key))
}

async fn remote_set(remote: &dyn TabularStore, key: &str, value: &str) -> Result<(), BackendError> {
    let rows = remote.read_range(STATE_RANGE).await?;
    match find_row(&rows, key) {
        Some(i) => {
            let cell = format!("{}!B{}", STATE_SHEET, i + 1);
            remote.write_range(&cell, vec![vec![value.to_string()]]).await
        }
        None => {
            remote
                .append_rows(STATE_RANGE, vec![vec![key.to_string(), value.to_string()]])
                .await
        }
    }
}

// ── Tests ──
