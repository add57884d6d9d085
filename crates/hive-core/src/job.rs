//! The job record and its module descriptors.
//!
//! A `Job` is built once per request, hashed into its `JobId`, and then only
//! mutated in its binding fields (`active`, `workers`, module worker lists).
//! The id is never recomputed after construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{JobId, NodeId};

// ── Module descriptors ────────────────────────────────────────────────────────

/// How a module is executed. Only `Offloaded` modules are orchestrated here.
///
/// Unknown type strings are kept verbatim so a descriptor round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModuleType {
    Offloaded,
    Local,
    Other(String),
}

impl ModuleType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Offloaded => "offloaded",
            Self::Local => "local",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ModuleType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "offloaded" => Self::Offloaded,
            "local" => Self::Local,
            _ => Self::Other(s),
        }
    }
}

impl From<ModuleType> for String {
    fn from(t: ModuleType) -> String {
        t.as_str().to_string()
    }
}

/// One partition of the workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    #[serde(rename = "type")]
    pub module_type: ModuleType,

    /// Capacity cost of one replica of this module.
    #[serde(default)]
    pub size: u64,

    /// Workers bound to this module, in binding order.
    #[serde(default)]
    pub workers: Vec<NodeId>,

    /// Caller-supplied descriptor fields this layer does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ModuleDescriptor {
    pub fn new(module_type: ModuleType, size: u64) -> Self {
        Self {
            module_type,
            size,
            workers: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn offloaded(size: u64) -> Self {
        Self::new(ModuleType::Offloaded, size)
    }

    pub fn is_offloaded(&self) -> bool {
        self.module_type == ModuleType::Offloaded
    }

    fn digest_into(&self, h: &mut blake3::Hasher) {
        update_str(h, self.module_type.as_str());
        h.update(&self.size.to_le_bytes());
        h.update(&(self.workers.len() as u64).to_le_bytes());
        for worker in &self.workers {
            h.update(worker.as_bytes());
        }
        // serde_json::Map is key-ordered, so this rendering is canonical.
        update_str(h, &Value::Object(self.extra.clone()).to_string());
    }
}

/// Caller's requested split: module id → descriptor, any module type.
pub type DistributionSpec = BTreeMap<String, ModuleDescriptor>;

/// Keep only offloaded modules. Other types run locally and never enter a job.
pub fn offloaded_only(spec: DistributionSpec) -> BTreeMap<String, ModuleDescriptor> {
    spec.into_iter().filter(|(_, m)| m.is_offloaded()).collect()
}

/// Σ module sizes × pipelines. `dp_factor` does not scale capacity.
pub fn required_capacity(distribution: &BTreeMap<String, ModuleDescriptor>, n_pipelines: u32) -> u64 {
    distribution
        .values()
        .map(|m| m.size)
        .sum::<u64>()
        .saturating_mul(n_pipelines as u64)
}

// ── Job ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Content hash of every other field, frozen at construction.
    pub id: JobId,

    /// Requesting peer.
    pub author: NodeId,

    /// Set once a validator has accepted and workers are bound.
    pub active: bool,

    pub capacity: u64,
    pub n_pipelines: u32,
    pub dp_factor: u32,

    /// Offloaded modules only.
    pub distribution: BTreeMap<String, ModuleDescriptor>,

    /// Expected worker count: pipelines × offloaded modules.
    pub n_workers: u32,

    /// Validators asked to oversee this job. Only the first is contacted.
    pub seed_validators: Vec<NodeId>,

    /// One slot per pipeline: worker → module id.
    pub workers: Vec<BTreeMap<NodeId, String>>,
}

impl Job {
    /// Build a job from an already-filtered distribution and freeze its id.
    pub fn new(
        author: NodeId,
        n_pipelines: u32,
        dp_factor: u32,
        distribution: BTreeMap<String, ModuleDescriptor>,
        seed_validators: Vec<NodeId>,
    ) -> Self {
        let capacity = required_capacity(&distribution, n_pipelines);
        let n_workers = n_pipelines.saturating_mul(distribution.len() as u32);
        let mut job = Self {
            id: JobId::default(),
            author,
            active: false,
            capacity,
            n_pipelines,
            dp_factor,
            distribution,
            n_workers,
            seed_validators,
            workers: vec![BTreeMap::new(); n_pipelines as usize],
        };
        job.id = job.compute_id();
        job
    }

    /// BLAKE3 over every field except `id`.
    ///
    /// Fields are fed in declaration order with explicit lengths, so equal
    /// records always hash equally regardless of how they were serialized.
    pub fn compute_id(&self) -> JobId {
        let mut h = blake3::Hasher::new();
        h.update(b"hive.job.v1");
        h.update(self.author.as_bytes());
        h.update(&[self.active as u8]);
        h.update(&self.capacity.to_le_bytes());
        h.update(&self.n_pipelines.to_le_bytes());
        h.update(&self.dp_factor.to_le_bytes());

        h.update(&(self.distribution.len() as u64).to_le_bytes());
        for (module_id, module) in &self.distribution {
            update_str(&mut h, module_id);
            module.digest_into(&mut h);
        }

        h.update(&self.n_workers.to_le_bytes());

        h.update(&(self.seed_validators.len() as u64).to_le_bytes());
        for validator in &self.seed_validators {
            h.update(validator.as_bytes());
        }

        h.update(&(self.workers.len() as u64).to_le_bytes());
        for slot in &self.workers {
            h.update(&(slot.len() as u64).to_le_bytes());
            for (worker, module_id) in slot {
                h.update(worker.as_bytes());
                update_str(&mut h, module_id);
            }
        }

        JobId(*h.finalize().as_bytes())
    }

    pub fn is_seed_validator(&self, peer: &NodeId) -> bool {
        self.seed_validators.contains(peer)
    }

    /// Total workers bound across all pipeline slots.
    pub fn bound_workers(&self) -> usize {
        self.workers.iter().map(|slot| slot.len()).sum()
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            author: self.author,
            active: self.active,
            capacity: self.capacity,
            n_pipelines: self.n_pipelines,
            dp_factor: self.dp_factor,
            n_workers: self.n_workers,
            bound_workers: self.bound_workers(),
            modules: self.distribution.keys().cloned().collect(),
            seed_validators: self.seed_validators.clone(),
        }
    }
}

fn update_str(h: &mut blake3::Hasher, s: &str) {
    h.update(&(s.len() as u64).to_le_bytes());
    h.update(s.as_bytes());
}

/// Compact view of a job for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub author: NodeId,
    pub active: bool,
    pub capacity: u64,
    pub n_pipelines: u32,
    pub dp_factor: u32,
    pub n_workers: u32,
    pub bound_workers: usize,
    pub modules: Vec<String>,
    pub seed_validators: Vec<NodeId>,
}

// ── Allocation returned to the caller ─────────────────────────────────────────

/// Per-module configuration handed back to the requester.
///
/// The queues are placeholders for runtime tensor exchange; this layer
/// creates them empty and never reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(flatten)]
    pub descriptor: ModuleDescriptor,
    #[serde(default)]
    pub forward_queue: BTreeMap<String, Value>,
    #[serde(default)]
    pub backward_queue: BTreeMap<String, Value>,
}

impl From<ModuleDescriptor> for ModuleConfig {
    fn from(descriptor: ModuleDescriptor) -> Self {
        Self {
            descriptor,
            forward_queue: BTreeMap::new(),
            backward_queue: BTreeMap::new(),
        }
    }
}

/// Result of a successful job request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAllocation {
    pub job_id: JobId,
    pub modules: BTreeMap<String, ModuleConfig>,
}

impl JobAllocation {
    /// Modules the validator accepted but for which no worker could be reached.
    pub fn unallocated_modules(&self) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|(_, m)| m.descriptor.workers.is_empty())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn worker_count(&self) -> usize {
        self.modules.values().map(|m| m.descriptor.workers.len()).sum()
    }
}
