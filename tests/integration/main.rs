//! Hive integration test harness.
//!
//! Each test runs a full `UserNode` over the in-process substrate and plays
//! the validators and workers itself: it reads what the node sends from the
//! outbox and feeds replies through the node's dispatcher.
//!
//!   cargo test --test integration

mod announce;
mod jobs;
mod peers;
mod workers;

use std::sync::Arc;
use std::time::Duration;

use hive_core::wire::{JobBinding, ModuleBinding, WorkerCandidate};
use hive_core::{DistributionSpec, JobId, Message, ModuleDescriptor, ModuleType, NodeId, Tag};
use hive_services::substrate::memory::{MemorySubstrate, Outbound};
use hive_services::{Disposition, LiaisonSettings, NodeSettings, ReputationLedger, UserNode};
use tokio::sync::mpsc;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const USER: NodeId = NodeId([0x01; 32]);
pub const VALIDATOR: NodeId = NodeId([0x0a; 32]);
pub const OTHER_VALIDATOR: NodeId = NodeId([0x0b; 32]);
pub const WORKER: NodeId = NodeId([0x0c; 32]);
pub const STRANGER: NodeId = NodeId([0x0e; 32]);

/// How long a test waits for the node to send something.
pub const RECV_BUDGET: Duration = Duration::from_secs(5);

pub struct Harness {
    pub node: UserNode,
    pub substrate: Arc<MemorySubstrate>,
    pub outbox: mpsc::UnboundedReceiver<Outbound>,
}

impl Harness {
    /// A node that knows `validators`, all reachable.
    pub fn new(validators: &[NodeId], liaison: LiaisonSettings) -> Self {
        let (substrate, outbox) = MemorySubstrate::new(USER);
        for (i, v) in validators.iter().enumerate() {
            substrate.add_peer(*v, "10.0.0.1", 5026 + i as u16);
        }
        let settings = NodeSettings {
            validators: validators.to_vec(),
            liaison,
            command_poll: Duration::from_millis(50),
            workers_settle: Duration::from_millis(200),
            ..NodeSettings::default()
        };
        let node = UserNode::new(substrate.clone(), ReputationLedger::new(), settings);
        Self {
            node,
            substrate,
            outbox,
        }
    }

    /// A node with one reachable validator and short retry timing.
    pub fn single_validator() -> Self {
        Self::new(&[VALIDATOR], quick_liaison(3))
    }

    /// Next message the node sent, decoded. Panics if nothing arrives.
    pub async fn next_sent(&mut self) -> (NodeId, Message) {
        let out = tokio::time::timeout(RECV_BUDGET, self.outbox.recv())
            .await
            .expect("node sent nothing in time")
            .expect("outbox closed");
        let msg = Message::decode(&out.payload)
            .unwrap_or_else(|e| panic!("node sent undecodable frame: {e}"));
        (out.to, msg)
    }

    /// Wait for the node to announce a job to `validator` and return its id.
    pub async fn expect_job_request(&mut self, validator: NodeId) -> JobId {
        match self.next_sent().await {
            (to, Message::JobRequest(job)) => {
                assert_eq!(to, validator, "job announced to the wrong peer");
                job.id
            }
            (to, other) => panic!("expected JOB-REQ, got {:?} to {}", other.tag(), to),
        }
    }

    /// Everything still queued in the outbox.
    pub fn drain_sent(&mut self) -> Vec<(NodeId, Message)> {
        let mut sent = Vec::new();
        while let Ok(out) = self.outbox.try_recv() {
            if let Ok(msg) = Message::decode(&out.payload) {
                sent.push((out.to, msg));
            }
        }
        sent
    }

    pub async fn deliver(&self, from: NodeId, message: Message) -> Disposition {
        let data = message.encode().expect("encode");
        self.node.dispatcher.dispatch(from, &data).await
    }

    pub async fn deliver_raw(&self, from: NodeId, data: &[u8]) -> Disposition {
        self.node.dispatcher.dispatch(from, data).await
    }

    /// Have `validator` accept `job_id`, assigning `workers` to `module`.
    pub async fn accept(
        &self,
        validator: NodeId,
        job_id: JobId,
        module: &str,
        workers: &[NodeId],
    ) -> Disposition {
        let mut binding = JobBinding::default();
        binding.distribution.insert(
            module.to_string(),
            ModuleBinding {
                workers: workers
                    .iter()
                    .enumerate()
                    .map(|(i, id)| WorkerCandidate {
                        id: *id,
                        host: "10.0.1.1".to_string(),
                        port: 6000 + i as u16,
                    })
                    .collect(),
            },
        );
        self.deliver(validator, Message::AcceptJob { job_id, binding })
            .await
    }
}

pub fn quick_liaison(max_attempts: u32) -> LiaisonSettings {
    LiaisonSettings {
        attempt_timeout: Duration::from_secs(2),
        max_attempts,
        accept_concurrency: 2,
    }
}

/// One offloaded module `A` of the given size.
pub fn one_module(size: u64) -> DistributionSpec {
    let mut spec = DistributionSpec::new();
    spec.insert("A".to_string(), ModuleDescriptor::offloaded(size));
    spec
}

/// `A` offloaded plus a local module `L` the validator never hears about.
pub fn mixed_modules() -> DistributionSpec {
    let mut spec = one_module(4);
    spec.insert("L".to_string(), ModuleDescriptor::new(ModuleType::Local, 2));
    spec
}

pub fn tags(sent: &[(NodeId, Message)]) -> Vec<Tag> {
    sent.iter().map(|(_, m)| m.tag()).collect()
}
