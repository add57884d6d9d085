//! Validator liaison — announcing a job and binding the workers a validator
//! assigns to it.
//!
//! `announce` sends `JOB-REQ` and waits, re-sending on each timeout up to
//! `max_attempts`. The wait ends only when the job id leaves the pending
//! ledger, which happens when an accepted binding finishes (`spawn_binding`)
//! or when attempts run out. Declines are recorded but do not end the wait.
//!
//! The first accept claims the job. From then on the attempt clock no longer
//! applies: `announce` neither re-sends nor gives up, it waits for that
//! binding to finish. Later accepts for the same job are ignored.

use bytes::Bytes;
use hive_core::wire::JobBinding;
use hive_core::{Job, JobId, Message, NodeId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::OrchestrationError;
use crate::jobs::JobBook;
use crate::ledger::PendingLedger;
use crate::substrate::PeerSubstrate;

#[derive(Debug, Clone)]
pub struct LiaisonSettings {
    /// Wait per announcement attempt.
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    /// Max binding tasks running at once.
    pub accept_concurrency: usize,
}

impl Default for LiaisonSettings {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(100),
            max_attempts: 3,
            accept_concurrency: 4,
        }
    }
}

#[derive(Clone)]
pub struct ValidatorLiaison {
    substrate: Arc<dyn PeerSubstrate>,
    ledger: PendingLedger,
    jobs: JobBook,
    settings: LiaisonSettings,
    accept_permits: Arc<Semaphore>,
}

impl ValidatorLiaison {
    pub fn new(
        substrate: Arc<dyn PeerSubstrate>,
        ledger: PendingLedger,
        jobs: JobBook,
        settings: LiaisonSettings,
    ) -> Self {
        let accept_permits = Arc::new(Semaphore::new(settings.accept_concurrency.max(1)));
        Self {
            substrate,
            ledger,
            jobs,
            settings,
            accept_permits,
        }
    }

    pub fn settings(&self) -> &LiaisonSettings {
        &self.settings
    }

    /// Announce `job` to `validator` and wait until a binding for it has
    /// completed. Returns the number of attempts used.
    pub async fn announce(&self, validator: NodeId, job: &Job) -> Result<u32, OrchestrationError> {
        let frame = Bytes::from(Message::JobRequest(job.clone()).encode()?);
        let max_attempts = self.settings.max_attempts.max(1);

        // Stored once: a retry must not re-insert an entry an accept has
        // already cleared.
        self.ledger.store(validator, job.id)?;

        for attempt in 1..=max_attempts {
            if self.ledger.is_claimed(&job.id) {
                return Ok(self.await_binding(validator, job, attempt).await);
            }

            if attempt > 1 && !self.substrate.is_connected(&validator) {
                self.reconnect(&validator).await;
            }
            match self.substrate.send(&validator, frame.clone()).await {
                Ok(()) => tracing::info!(
                    validator = %validator.short(),
                    job_id = %job.id.short(),
                    attempt,
                    "job announced"
                ),
                Err(e) => tracing::warn!(
                    validator = %validator.short(),
                    job_id = %job.id.short(),
                    attempt,
                    error = %e,
                    "announcement not sent"
                ),
            }

            if self
                .ledger
                .wait_resolved(&validator, &job.id, self.settings.attempt_timeout)
                .await
            {
                self.ledger.take_decline(&job.id);
                return Ok(attempt);
            }
            if self.ledger.is_claimed(&job.id) {
                return Ok(self.await_binding(validator, job, attempt).await);
            }

            tracing::warn!(
                validator = %validator.short(),
                job_id = %job.id.short(),
                attempt,
                max_attempts,
                "no answer from validator"
            );
        }

        if !self.ledger.abandon(&validator, &job.id) {
            // Claimed or bound since the last check.
            return Ok(self.await_binding(validator, job, max_attempts).await);
        }
        Err(OrchestrationError::AnnounceExhausted {
            validator,
            job_id: job.id,
            attempts: max_attempts,
            last_decline: self.ledger.take_decline(&job.id),
        })
    }

    async fn await_binding(&self, validator: NodeId, job: &Job, attempt: u32) -> u32 {
        tracing::debug!(
            validator = %validator.short(),
            job_id = %job.id.short(),
            attempt,
            "binding in progress, waiting for it to finish"
        );
        self.ledger.wait_released(&validator, &job.id).await;
        self.ledger.take_decline(&job.id);
        attempt
    }

    /// Redial a validator whose connection dropped. Failures are logged; the
    /// following send reports them again.
    async fn reconnect(&self, validator: &NodeId) {
        let Some(addr) = self.substrate.resolve(validator).await else {
            tracing::warn!(validator = %validator.short(), "validator lookup failed on retry");
            return;
        };
        if self.substrate.connect(validator, &addr.host, addr.port).await {
            tracing::info!(validator = %validator.short(), "validator reconnected");
        }
    }

    /// The job an `ACCEPT-JOB` from `sender` refers to, if `sender` is one of
    /// its seed validators.
    pub async fn accepting_job(&self, sender: &NodeId, job_id: &JobId) -> Option<Job> {
        self.jobs
            .get(job_id)
            .await
            .filter(|job| job.is_seed_validator(sender))
    }

    /// Bind the workers in `binding` on a pooled task. The task resolves
    /// with the number of workers bound.
    pub fn spawn_binding(&self, validator: NodeId, job: Job, binding: JobBinding) -> JoinHandle<usize> {
        let this = self.clone();
        tokio::spawn(async move {
            let _permit = match this.accept_permits.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return 0,
            };
            this.bind_workers(validator, job, binding).await
        })
    }

    async fn bind_workers(&self, validator: NodeId, job: Job, binding: JobBinding) -> usize {
        if !self.ledger.claim(&validator, &job.id) {
            tracing::info!(
                validator = %validator.short(),
                job_id = %job.id.short(),
                "accept for a job that is not pending or already binding, ignored"
            );
            return 0;
        }

        let pipelines = job.n_pipelines.max(1) as usize;
        let mut bound = 0usize;

        for (module_id, module) in binding.distribution {
            if !job.distribution.contains_key(&module_id) {
                tracing::warn!(
                    validator = %validator.short(),
                    job_id = %job.id.short(),
                    module = %module_id,
                    "binding names a module outside the job"
                );
                continue;
            }

            for candidate in module.workers {
                if !self
                    .substrate
                    .connect(&candidate.id, &candidate.host, candidate.port)
                    .await
                {
                    tracing::warn!(
                        worker = %candidate.id.short(),
                        host = %candidate.host,
                        port = candidate.port,
                        module = %module_id,
                        "worker unreachable, skipped"
                    );
                    continue;
                }

                let Some(position) = self.jobs.bind_module_worker(&job.id, &module_id, candidate.id) else {
                    continue;
                };
                let slot = position % pipelines;
                let worker = candidate.id;
                let module_name = module_id.clone();
                self.jobs
                    .update(&job.id, move |j| {
                        if let Some(s) = j.workers.get_mut(slot) {
                            s.insert(worker, module_name);
                        }
                    })
                    .await;
                bound += 1;

                tracing::info!(
                    worker = %worker.short(),
                    module = %module_id,
                    pipeline = slot,
                    "worker bound"
                );
            }
        }

        self.ledger.resolve(&validator, &job.id);
        tracing::info!(
            validator = %validator.short(),
            job_id = %job.id.short(),
            bound,
            expected = job.n_workers,
            "job accepted"
        );
        bound
    }
}
