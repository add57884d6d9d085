//! Job orchestrator — turns a local job request into a live, bound job.
//!
//! `submit_job` picks a validator, makes sure it can be reached, builds and
//! records the job, hands it to the liaison and, once the validator's binding
//! has completed, returns the per-module configuration.

use bytes::Bytes;
use hive_core::job::offloaded_only;
use hive_core::{DistributionSpec, Job, JobAllocation, Message, ModuleConfig, NodeId};
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::OrchestrationError;
use crate::jobs::JobBook;
use crate::liaison::ValidatorLiaison;
use crate::substrate::PeerSubstrate;

/// Upper bounds on a job request. Both sizes drive per-job allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobLimits {
    pub max_pipelines: u32,
    pub max_dp_factor: u32,
}

impl Default for JobLimits {
    fn default() -> Self {
        Self {
            max_pipelines: 1024,
            max_dp_factor: 1024,
        }
    }
}

impl JobLimits {
    fn check(&self, n_pipelines: u32, dp_factor: u32) -> Result<(), OrchestrationError> {
        if n_pipelines == 0 {
            return Err(OrchestrationError::InvalidRequest(
                "n_pipelines must be at least 1".to_string(),
            ));
        }
        if n_pipelines > self.max_pipelines {
            return Err(OrchestrationError::InvalidRequest(format!(
                "n_pipelines {n_pipelines} exceeds the limit of {}",
                self.max_pipelines
            )));
        }
        if dp_factor == 0 || dp_factor > self.max_dp_factor {
            return Err(OrchestrationError::InvalidRequest(format!(
                "dp_factor must be between 1 and {}",
                self.max_dp_factor
            )));
        }
        Ok(())
    }
}

pub struct JobOrchestrator {
    substrate: Arc<dyn PeerSubstrate>,
    jobs: JobBook,
    liaison: ValidatorLiaison,
    validators: Vec<NodeId>,
    limits: JobLimits,
}

impl JobOrchestrator {
    pub fn new(
        substrate: Arc<dyn PeerSubstrate>,
        jobs: JobBook,
        liaison: ValidatorLiaison,
        validators: Vec<NodeId>,
    ) -> Self {
        Self {
            substrate,
            jobs,
            liaison,
            validators,
            limits: JobLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: JobLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn validators(&self) -> &[NodeId] {
        &self.validators
    }

    pub fn liaison(&self) -> &ValidatorLiaison {
        &self.liaison
    }

    pub async fn submit_job(
        &self,
        n_pipelines: u32,
        dp_factor: u32,
        spec: DistributionSpec,
    ) -> Result<JobAllocation, OrchestrationError> {
        self.limits.check(n_pipelines, dp_factor)?;

        // Non-offloaded modules run locally and are never announced.
        let distribution = offloaded_only(spec);
        if distribution.is_empty() {
            return Err(OrchestrationError::InvalidRequest(
                "no offloaded modules in distribution".to_string(),
            ));
        }

        let validator = self.select_validator()?;

        self.connect_validator(&validator).await?;

        let job = Job::new(
            self.substrate.local_id(),
            n_pipelines,
            dp_factor,
            distribution,
            vec![validator],
        );
        for (module_id, module) in &job.distribution {
            self.jobs.record_module(&job.id, module_id, module);
        }
        tracing::info!(
            job_id = %job.id.short(),
            validator = %validator.short(),
            capacity = job.capacity,
            n_workers = job.n_workers,
            "job created"
        );
        self.jobs.append(job.clone()).await;

        if let Err(e) = self.liaison.announce(validator, &job).await {
            self.jobs.forget_modules(&job.id);
            return Err(e);
        }

        let allocation = self.finalize(&job).await;
        if let Err(e) = self.send_status_update(&job).await {
            tracing::warn!(job_id = %job.id.short(), error = %e, "job status update not sent");
        }

        let missing = allocation.unallocated_modules();
        if !missing.is_empty() {
            tracing::warn!(job_id = %job.id.short(), modules = ?missing, "job under-allocated");
        }
        Ok(allocation)
    }

    /// Uniform random choice among known validators.
    fn select_validator(&self) -> Result<NodeId, OrchestrationError> {
        self.validators
            .choose(&mut rand::thread_rng())
            .copied()
            .ok_or(OrchestrationError::NoValidators)
    }

    /// Resolve and connect, purging the peer entry on either failure.
    async fn connect_validator(&self, validator: &NodeId) -> Result<(), OrchestrationError> {
        if self.substrate.is_connected(validator) {
            return Ok(());
        }

        let Some(addr) = self.substrate.resolve(validator).await else {
            self.substrate.forget(validator);
            tracing::warn!(validator = %validator.short(), "validator lookup failed");
            return Err(OrchestrationError::ValidatorNotFound(*validator));
        };

        if !self.substrate.connect(validator, &addr.host, addr.port).await {
            self.substrate.forget(validator);
            tracing::warn!(
                validator = %validator.short(),
                host = %addr.host,
                port = addr.port,
                "validator connection failed"
            );
            return Err(OrchestrationError::ConnectFailed(*validator));
        }
        Ok(())
    }

    /// Copy the bound module table into the job and build the allocation.
    async fn finalize(&self, job: &Job) -> JobAllocation {
        let mut modules = BTreeMap::new();
        for (module_id, original) in &job.distribution {
            let descriptor = self
                .jobs
                .module(&job.id, module_id)
                .unwrap_or_else(|| original.clone());
            modules.insert(module_id.clone(), ModuleConfig::from(descriptor));
        }

        let bound: BTreeMap<String, Vec<NodeId>> = modules
            .iter()
            .map(|(id, m)| (id.clone(), m.descriptor.workers.clone()))
            .collect();
        self.jobs
            .update(&job.id, move |j| {
                for (module_id, workers) in bound {
                    if let Some(m) = j.distribution.get_mut(&module_id) {
                        m.workers = workers;
                    }
                }
                j.active = true;
            })
            .await;

        JobAllocation {
            job_id: job.id,
            modules,
        }
    }

    /// Send the stored state of `job` to its seed validators as `JOB-UPDATE`.
    pub async fn send_status_update(&self, job: &Job) -> Result<(), OrchestrationError> {
        let current = self.jobs.get(&job.id).await.unwrap_or_else(|| job.clone());
        let frame = Bytes::from(Message::JobUpdate(current.clone()).encode()?);
        for validator in &current.seed_validators {
            self.substrate
                .send(validator, frame.clone())
                .await
                .map_err(|e| OrchestrationError::SendFailed {
                    peer: *validator,
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Ask every known validator for a worker broadcast. Individual failures
    /// are logged. Returns how many validators were asked.
    pub async fn request_worker_info(&self) -> usize {
        let frame = match Message::UserGetWorkers.encode() {
            Ok(f) => Bytes::from(f),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode worker request");
                return 0;
            }
        };

        let mut asked = 0;
        for validator in &self.validators {
            if let Err(e) = self.connect_validator(validator).await {
                tracing::debug!(error = %e, "skipping validator");
                continue;
            }
            match self.substrate.send(validator, frame.clone()).await {
                Ok(()) => asked += 1,
                Err(e) => tracing::warn!(
                    validator = %validator.short(),
                    error = %e,
                    "worker request not sent"
                ),
            }
        }
        asked
    }
}
