//! Per-peer ghost counts.
//!
//! A ghost is one protocol violation: an unrecognized, unexpected, or
//! malformed message, or a response from a peer with no standing to send it.
//! Counts only ever grow. Nothing here acts on them yet.

use dashmap::DashMap;
use hive_core::NodeId;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Registry of ghost counts.
///
/// When constructed with a `persist_path`, counts are written to disk on
/// every mutation and reloaded on startup.
#[derive(Clone, Default)]
pub struct ReputationLedger {
    ghosts: Arc<DashMap<NodeId, u64>>,
    persist_path: Arc<Option<PathBuf>>,
}

impl ReputationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger that persists counts to the given file path.
    /// Loads existing counts from disk if the file exists.
    pub fn with_persistence(path: PathBuf) -> Self {
        let ledger = Self {
            ghosts: Arc::new(DashMap::new()),
            persist_path: Arc::new(Some(path)),
        };
        ledger.load_from_disk();
        ledger
    }

    /// Count one violation against `peer`. Returns the new count.
    pub fn record_ghost(&self, peer: NodeId) -> u64 {
        let count = {
            let mut entry = self.ghosts.entry(peer).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };
        self.save_to_disk();
        tracing::warn!(peer = %peer.short(), ghosts = count, "ghost recorded");
        count
    }

    pub fn ghosts(&self, peer: &NodeId) -> u64 {
        self.ghosts.get(peer).map(|c| *c).unwrap_or(0)
    }

    /// All peers with at least one ghost, ordered by id.
    pub fn list(&self) -> BTreeMap<NodeId, u64> {
        self.ghosts.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    pub fn total(&self) -> u64 {
        self.ghosts.iter().map(|e| *e.value()).sum()
    }
}

impl ReputationLedger {
    /// Serialize all counts to disk as JSON. Best-effort, logs on failure.
    fn save_to_disk(&self) {
        let path = match self.persist_path.as_ref() {
            Some(p) => p,
            None => return,
        };
        match serde_json::to_string_pretty(&self.list()) {
            Ok(json) => {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!(error = %e, path = %path.display(), "failed to persist ghost counts");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize ghost counts");
            }
        }
    }

    /// Load counts from disk. Called once during construction.
    fn load_from_disk(&self) {
        let path = match self.persist_path.as_ref() {
            Some(p) => p,
            None => return,
        };
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "failed to read ghost counts");
                return;
            }
        };
        let map: BTreeMap<NodeId, u64> = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "failed to parse ghost counts");
                return;
            }
        };
        let loaded = map.len();
        for (peer, count) in map {
            self.ghosts.insert(peer, count);
        }
        if loaded > 0 {
            tracing::info!(count = loaded, path = %path.display(), "loaded persisted ghost counts");
        }
    }
}
