//! Last statistics each validator reported per worker.
//!
//! Entries are replaced wholesale; last writer wins. Nothing is evicted.

use dashmap::DashMap;
use hive_core::NodeId;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct WorkerEntry {
    /// Opaque statistics blob as broadcast.
    pub stats: Value,
    /// Validator whose broadcast carried this entry.
    pub reported_by: NodeId,
    pub last_seen: Instant,
}

#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: Arc<DashMap<NodeId, WorkerEntry>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any prior entry for `worker`.
    pub fn record(&self, worker: NodeId, stats: Value, reported_by: NodeId) {
        self.workers.insert(
            worker,
            WorkerEntry {
                stats,
                reported_by,
                last_seen: Instant::now(),
            },
        );
    }

    /// Merge one `WORKERS` broadcast. Returns the number of entries written.
    pub fn merge(&self, from: NodeId, broadcast: BTreeMap<NodeId, Value>) -> usize {
        let n = broadcast.len();
        for (worker, stats) in broadcast {
            self.record(worker, stats, from);
        }
        n
    }

    pub fn get(&self, worker: &NodeId) -> Option<WorkerEntry> {
        self.workers.get(worker).map(|e| e.clone())
    }

    /// Snapshot: worker id → statistics.
    pub fn get_all(&self) -> BTreeMap<NodeId, Value> {
        self.workers
            .iter()
            .map(|e| (*e.key(), e.value().stats.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
