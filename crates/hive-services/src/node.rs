//! Wires the User role's collections and services together.

use hive_core::config::HiveConfig;
use hive_core::{JobSummary, NodeId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::command::CommandProcessor;
use crate::dispatch::MessageDispatcher;
use crate::jobs::JobBook;
use crate::ledger::PendingLedger;
use crate::liaison::{LiaisonSettings, ValidatorLiaison};
use crate::orchestrator::{JobLimits, JobOrchestrator};
use crate::reputation::ReputationLedger;
use crate::substrate::PeerSubstrate;
use crate::workers::WorkerRegistry;

#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub validators: Vec<NodeId>,
    pub liaison: LiaisonSettings,
    pub limits: JobLimits,
    pub command_poll: Duration,
    pub workers_settle: Duration,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            validators: Vec::new(),
            liaison: LiaisonSettings::default(),
            limits: JobLimits::default(),
            command_poll: Duration::from_millis(3000),
            workers_settle: Duration::from_millis(1000),
        }
    }
}

impl NodeSettings {
    pub fn from_config(config: &HiveConfig) -> Result<Self, hive_core::config::ConfigError> {
        Ok(Self {
            validators: config.validator_ids()?,
            liaison: LiaisonSettings {
                attempt_timeout: Duration::from_secs(config.job.announce_timeout_secs),
                max_attempts: config.job.max_announce_attempts,
                accept_concurrency: config.job.accept_concurrency,
            },
            limits: JobLimits {
                max_pipelines: config.job.max_pipelines,
                max_dp_factor: config.job.max_dp_factor,
            },
            command_poll: Duration::from_millis(config.job.command_poll_ms),
            workers_settle: Duration::from_millis(config.job.workers_settle_ms),
        })
    }
}

/// Status report for `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub role: &'static str,
    pub validators: Vec<NodeId>,
    pub connected_peers: Vec<NodeId>,
    pub jobs: usize,
    pub current_job: Option<JobSummary>,
    pub pending_announcements: usize,
    pub workers_known: usize,
    pub ghosts_total: u64,
}

#[derive(Clone)]
pub struct UserNode {
    pub substrate: Arc<dyn PeerSubstrate>,
    pub jobs: JobBook,
    pub ledger: PendingLedger,
    pub workers: WorkerRegistry,
    pub reputation: ReputationLedger,
    pub orchestrator: Arc<JobOrchestrator>,
    pub dispatcher: Arc<MessageDispatcher>,
    settings: NodeSettings,
}

impl UserNode {
    pub fn new(
        substrate: Arc<dyn PeerSubstrate>,
        reputation: ReputationLedger,
        settings: NodeSettings,
    ) -> Self {
        let jobs = JobBook::new();
        let ledger = PendingLedger::new();
        let workers = WorkerRegistry::new();

        let liaison = ValidatorLiaison::new(
            substrate.clone(),
            ledger.clone(),
            jobs.clone(),
            settings.liaison.clone(),
        );
        let orchestrator = Arc::new(
            JobOrchestrator::new(
                substrate.clone(),
                jobs.clone(),
                liaison.clone(),
                settings.validators.clone(),
            )
            .with_limits(settings.limits),
        );
        let dispatcher = Arc::new(MessageDispatcher::new(
            substrate.clone(),
            liaison,
            jobs.clone(),
            ledger.clone(),
            workers.clone(),
            reputation.clone(),
        ));

        Self {
            substrate,
            jobs,
            ledger,
            workers,
            reputation,
            orchestrator,
            dispatcher,
            settings,
        }
    }

    pub fn command_processor(&self) -> CommandProcessor {
        CommandProcessor::new(
            self.orchestrator.clone(),
            self.workers.clone(),
            self.settings.command_poll,
            self.settings.workers_settle,
        )
    }

    pub async fn self_info(&self) -> NodeInfo {
        NodeInfo {
            node_id: self.substrate.local_id(),
            role: "user",
            validators: self.settings.validators.clone(),
            connected_peers: self.substrate.connected_peers(),
            jobs: self.jobs.len().await,
            current_job: self.jobs.current().await.map(|j| j.summary()),
            pending_announcements: self.ledger.total(),
            workers_known: self.workers.len(),
            ghosts_total: self.reputation.total(),
        }
    }
}
