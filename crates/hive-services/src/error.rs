use hive_core::{JobId, NodeId, WireError};

use crate::ledger::LedgerError;

/// Failures reported to whoever asked for a job.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("no validators known")]
    NoValidators,

    #[error("invalid job request: {0}")]
    InvalidRequest(String),

    #[error("validator {0:?} not found")]
    ValidatorNotFound(NodeId),

    #[error("could not connect to validator {0:?}")]
    ConnectFailed(NodeId),

    #[error("failed to send to {peer:?}: {reason}")]
    SendFailed { peer: NodeId, reason: String },

    #[error("failed to encode message: {0}")]
    Encode(#[from] WireError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(
        "validator {validator:?} did not accept job {job_id:?} after {attempts} attempts{}",
        decline_suffix(.last_decline)
    )]
    AnnounceExhausted {
        validator: NodeId,
        job_id: JobId,
        attempts: u32,
        last_decline: Option<String>,
    },
}

fn decline_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(" (last decline: {r})"),
        None => String::new(),
    }
}
