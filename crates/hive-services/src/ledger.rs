//! Which job announcements await which validator.
//!
//! Presence of a job id under a validator is the only in-flight signal.
//! Removal by the accept handler is the only thing that ends an announcer's
//! wait; it also fires the job's `Notify` so the waiter re-checks at once.
//!
//! An accept first `claim`s the job. A claimed job belongs to that binding
//! until it resolves: further accepts are turned away and the announcer can
//! no longer `abandon` it.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hive_core::{JobId, NodeId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("job {0} already pending under another validator")]
    AlreadyPending(JobId),
}

#[derive(Clone, Default)]
pub struct PendingLedger {
    /// validator → job ids awaiting its answer
    requests: Arc<DashMap<NodeId, HashSet<JobId>>>,
    /// job id → wake-up for its announcer
    signals: Arc<DashMap<JobId, Arc<Notify>>>,
    /// job id → most recent decline reason
    declines: Arc<DashMap<JobId, String>>,
    /// job id → validator whose accept is being bound
    claims: Arc<DashMap<JobId, NodeId>>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `job_id` as awaiting `validator`. Re-storing under the same
    /// validator is a no-op; storing under a second validator is refused.
    pub fn store(&self, validator: NodeId, job_id: JobId) -> Result<(), LedgerError> {
        let elsewhere = self
            .requests
            .iter()
            .any(|e| *e.key() != validator && e.value().contains(&job_id));
        if elsewhere {
            return Err(LedgerError::AlreadyPending(job_id));
        }
        self.requests.entry(validator).or_default().insert(job_id);
        self.signals.entry(job_id).or_default();
        Ok(())
    }

    pub fn is_pending(&self, validator: &NodeId, job_id: &JobId) -> bool {
        self.requests
            .get(validator)
            .map(|jobs| jobs.contains(job_id))
            .unwrap_or(false)
    }

    /// Mark `job_id` as being bound for `validator`. Succeeds for exactly
    /// one caller while the job is pending; every later call gets false.
    pub fn claim(&self, validator: &NodeId, job_id: &JobId) -> bool {
        // The claims shard stays locked across the pending check, so this
        // cannot interleave with `abandon`.
        match self.claims.entry(*job_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                if !self.is_pending(validator, job_id) {
                    return false;
                }
                slot.insert(*validator);
                true
            }
        }
    }

    pub fn is_claimed(&self, job_id: &JobId) -> bool {
        self.claims.contains_key(job_id)
    }

    /// Remove the entry and wake the announcer. Returns whether it was pending.
    pub fn resolve(&self, validator: &NodeId, job_id: &JobId) -> bool {
        let removed = self.remove(validator, job_id);
        self.claims.remove(job_id);
        if let Some((_, signal)) = self.signals.remove(job_id) {
            // notify_one stores a permit, so a waiter that has not yet
            // polled its Notified future still wakes.
            signal.notify_one();
        }
        removed
    }

    /// Give up on a job nobody has claimed. Returns false, leaving the
    /// entry in place, if a binding has claimed it or already resolved it.
    pub fn abandon(&self, validator: &NodeId, job_id: &JobId) -> bool {
        match self.claims.entry(*job_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(_) => {
                let removed = self.remove(validator, job_id);
                self.signals.remove(job_id);
                removed
            }
        }
    }

    fn remove(&self, validator: &NodeId, job_id: &JobId) -> bool {
        let removed = match self.requests.get_mut(validator) {
            Some(mut jobs) => jobs.remove(job_id),
            None => false,
        };
        self.requests.remove_if(validator, |_, jobs| jobs.is_empty());
        removed
    }

    pub fn record_decline(&self, job_id: JobId, reason: String) {
        self.declines.insert(job_id, reason);
    }

    pub fn last_decline(&self, job_id: &JobId) -> Option<String> {
        self.declines.get(job_id).map(|r| r.clone())
    }

    pub fn take_decline(&self, job_id: &JobId) -> Option<String> {
        self.declines.remove(job_id).map(|(_, r)| r)
    }

    pub fn pending_for(&self, validator: &NodeId) -> Vec<JobId> {
        self.requests
            .get(validator)
            .map(|jobs| jobs.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.requests.iter().map(|e| e.value().len()).sum()
    }

    /// Wait up to `budget` for `job_id` to leave `validator`'s pending set.
    /// Returns true if it was resolved, false on timeout.
    pub async fn wait_resolved(&self, validator: &NodeId, job_id: &JobId, budget: Duration) -> bool {
        self.wait(validator, job_id, Some(Instant::now() + budget)).await
    }

    /// Wait, without a deadline, for `job_id` to leave `validator`'s pending
    /// set. Used once a binding has claimed the job.
    pub async fn wait_released(&self, validator: &NodeId, job_id: &JobId) {
        self.wait(validator, job_id, None).await;
    }

    async fn wait(&self, validator: &NodeId, job_id: &JobId, deadline: Option<Instant>) -> bool {
        let signal = match self.signals.get(job_id) {
            Some(s) => s.clone(),
            None => return !self.is_pending(validator, job_id),
        };
        loop {
            if !self.is_pending(validator, job_id) {
                return true;
            }
            match deadline {
                Some(at) => {
                    if tokio::time::timeout_at(at, signal.notified()).await.is_err() {
                        return !self.is_pending(validator, job_id);
                    }
                }
                None => signal.notified().await,
            }
        }
    }
}
