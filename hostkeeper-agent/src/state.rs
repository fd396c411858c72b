//! Persisted status snapshot
//!
//! A flat JSON object `name -> "online" | "offline" | "unknown"`, rewritten
//! as a whole after every cycle. Keys are kept sorted so equal snapshots are
//! byte-identical on disk.

use crate::error::{MonitorError, MonitorResult};
use crate::models::HealthStatus;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

pub type StateSnapshot = BTreeMap<String, HealthStatus>;

pub struct StateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exclusive access for a load → mutate → save sequence
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Read the snapshot; a missing or corrupt file is an empty snapshot
    pub async fn load(&self) -> StateSnapshot {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting empty", self.path.display());
                return StateSnapshot::new();
            }
            Err(e) => {
                warn!("Could not read state file {}: {}", self.path.display(), e);
                return StateSnapshot::new();
            }
        };
        parse_snapshot(&content, &self.path)
    }

    /// Replace the snapshot on disk (temp file + rename)
    pub async fn save(&self, snapshot: &StateSnapshot) -> MonitorResult<()> {
        let persistence = |source: std::io::Error| MonitorError::StatePersistence {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| persistence(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(persistence)?;
            }
        }

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, format!("{}\n", json))
            .await
            .map_err(persistence)?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(persistence)?;

        debug!("Saved {} states to {}", snapshot.len(), self.path.display());
        Ok(())
    }
}

fn parse_snapshot(content: &str, path: &Path) -> StateSnapshot {
    if content.trim().is_empty() {
        return StateSnapshot::new();
    }

    let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(content) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("State file {} is corrupt ({}), starting empty", path.display(), e);
            return StateSnapshot::new();
        }
    };

    raw.into_iter()
        .filter_map(|(name, value)| match serde_json::from_value::<HealthStatus>(value.clone()) {
            Ok(status) => Some((name, status)),
            Err(_) => {
                warn!("Ignoring invalid state record {} = {}", name, value);
                None
            }
        })
        .collect()
}
