//! Append-only job history plus the live module table.
//!
//! The current job is the last one appended. Jobs are never removed; only
//! their binding fields change after construction. Module entries are kept
//! per job, so jobs that share module ids bind independently.

use dashmap::DashMap;
use hive_core::{Job, JobId, ModuleDescriptor, NodeId};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct JobBook {
    history: Arc<RwLock<Vec<Job>>>,
    /// (job id, module id) → descriptor with the workers bound so far
    modules: Arc<DashMap<(JobId, String), ModuleDescriptor>>,
}

impl JobBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, job: Job) {
        self.history.write().await.push(job);
    }

    pub async fn current(&self) -> Option<Job> {
        self.history.read().await.last().cloned()
    }

    pub async fn get(&self, job_id: &JobId) -> Option<Job> {
        self.history
            .read()
            .await
            .iter()
            .find(|j| j.id == *job_id)
            .cloned()
    }

    pub async fn all(&self) -> Vec<Job> {
        self.history.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.history.read().await.len()
    }

    /// Apply `f` to the job with `job_id`. Returns false if no such job.
    pub async fn update<F>(&self, job_id: &JobId, f: F) -> bool
    where
        F: FnOnce(&mut Job),
    {
        let mut history = self.history.write().await;
        match history.iter_mut().rev().find(|j| j.id == *job_id) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }

    /// Register a job's module for binding, resetting any workers bound
    /// earlier.
    pub fn record_module(&self, job_id: &JobId, module_id: &str, descriptor: &ModuleDescriptor) {
        let mut fresh = descriptor.clone();
        fresh.workers.clear();
        self.modules.insert((*job_id, module_id.to_string()), fresh);
    }

    /// Append a worker to a recorded module. Returns its position among the
    /// module's workers, or None if the module is unknown.
    pub fn bind_module_worker(&self, job_id: &JobId, module_id: &str, worker: NodeId) -> Option<usize> {
        let mut module = self.modules.get_mut(&(*job_id, module_id.to_string()))?;
        module.workers.push(worker);
        Some(module.workers.len() - 1)
    }

    pub fn module(&self, job_id: &JobId, module_id: &str) -> Option<ModuleDescriptor> {
        self.modules
            .get(&(*job_id, module_id.to_string()))
            .map(|m| m.clone())
    }

    /// Drop every module entry of a job that will never be bound.
    pub fn forget_modules(&self, job_id: &JobId) {
        self.modules.retain(|(id, _), _| id != job_id);
    }
}
