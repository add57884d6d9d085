//! Inbound message dispatch for the User role.
//!
//! Every message a peer sends ends in exactly one `Disposition`. Base
//! protocol goes to the substrate; `ACCEPT-JOB`, `DECLINE-JOB` and `WORKERS`
//! go to the liaison, pending ledger and worker registry. Everything else,
//! including messages that fail to decode, counts as a ghost.

use hive_core::{Message, NodeId, Tag, WireError};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::jobs::JobBook;
use crate::ledger::PendingLedger;
use crate::liaison::ValidatorLiaison;
use crate::reputation::ReputationLedger;
use crate::substrate::{InboundMessage, PeerSubstrate};
use crate::workers::WorkerRegistry;

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Consumed by the substrate (PING/PONG).
    Base,
    /// Accepted job; worker binding started.
    Accepted,
    Declined,
    Workers,
    /// Protocol violation recorded against the sender.
    Ghost,
}

pub struct MessageDispatcher {
    substrate: Arc<dyn PeerSubstrate>,
    liaison: ValidatorLiaison,
    jobs: JobBook,
    ledger: PendingLedger,
    workers: WorkerRegistry,
    reputation: ReputationLedger,
}

impl MessageDispatcher {
    pub fn new(
        substrate: Arc<dyn PeerSubstrate>,
        liaison: ValidatorLiaison,
        jobs: JobBook,
        ledger: PendingLedger,
        workers: WorkerRegistry,
        reputation: ReputationLedger,
    ) -> Self {
        Self {
            substrate,
            liaison,
            jobs,
            ledger,
            workers,
            reputation,
        }
    }

    pub async fn dispatch(&self, peer: NodeId, data: &[u8]) -> Disposition {
        if self.substrate.handle_base(&peer, data).await {
            return Disposition::Base;
        }

        let message = match Message::decode(data) {
            Ok(m) => m,
            Err(WireError::UnknownTag) => {
                return self.ghost(peer, "unrecognized message");
            }
            Err(e) => {
                tracing::debug!(peer = %peer.short(), error = %e, "undecodable message");
                return self.ghost(peer, "malformed message");
            }
        };

        match message {
            Message::AcceptJob { job_id, binding } => {
                match self.liaison.accepting_job(&peer, &job_id).await {
                    Some(job) => {
                        tracing::info!(peer = %peer.short(), job_id = %job_id.short(), "job accepted by validator");
                        // Binding dials workers; keep it off the receive path.
                        drop(self.liaison.spawn_binding(peer, job, binding));
                        Disposition::Accepted
                    }
                    None => self.ghost(peer, "accept from a peer that is not a seed validator of the job"),
                }
            }
            Message::DeclineJob { reason } => {
                let current = self.jobs.current().await;
                match current.filter(|job| job.is_seed_validator(&peer)) {
                    Some(job) => {
                        tracing::info!(
                            peer = %peer.short(),
                            job_id = %job.id.short(),
                            reason = %reason,
                            "job declined"
                        );
                        self.ledger.record_decline(job.id, reason);
                        Disposition::Declined
                    }
                    None => self.ghost(peer, "decline from a peer that is not a seed validator"),
                }
            }
            Message::Workers(broadcast) => {
                let n = self.workers.merge(peer, broadcast);
                tracing::debug!(peer = %peer.short(), workers = n, "worker stats merged");
                Disposition::Workers
            }
            other => {
                debug_assert!(!other.tag().inbound_for_user());
                self.ghost(peer, unexpected(other.tag()))
            }
        }
    }

    fn ghost(&self, peer: NodeId, why: &'static str) -> Disposition {
        tracing::warn!(peer = %peer.short(), why, "protocol violation");
        self.reputation.record_ghost(peer);
        Disposition::Ghost
    }

    /// Drain `inbound` until it closes or shutdown fires.
    pub async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!("message dispatcher started");
        loop {
            tokio::select! {
                msg = inbound.recv() => {
                    let Some(msg) = msg else { break };
                    self.dispatch(msg.peer, &msg.payload).await;
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!("message dispatcher stopped");
    }
}

fn unexpected(tag: Tag) -> &'static str {
    match tag {
        Tag::JobRequest => "unexpected JOB-REQ",
        Tag::JobUpdate => "unexpected JOB-UPDATE",
        Tag::UserGetWorkers => "unexpected USER-GET-WORKERS",
        _ => "unexpected message",
    }
}
