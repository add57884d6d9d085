//! hive-core — shared identifiers, job model, wire format, and configuration.
//! All other Hive crates depend on this one.

pub mod config;
pub mod id;
pub mod job;
pub mod wire;

pub use id::{IdError, JobId, NodeId};
pub use job::{
    DistributionSpec, Job, JobAllocation, JobSummary, ModuleConfig, ModuleDescriptor, ModuleType,
};
pub use wire::{Message, Tag, WireError};
