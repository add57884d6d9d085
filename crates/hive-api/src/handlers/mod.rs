//! HTTP API handlers — exposes the User node's state and command loop as JSON.

pub mod jobs;
pub mod reputation;
pub mod status;
pub mod workers;

use axum::http::StatusCode;
use axum::Json;

use hive_services::{Command, CommandHandle, CommandResponse, UserNode};

#[derive(Clone)]
pub struct ApiState {
    pub node: UserNode,
    /// Queue into the node's command loop.
    pub commands: CommandHandle,
    /// Fires graceful daemon shutdown.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Run `command` through the command loop. An `ERROR` response keeps its
/// body but is returned as 422.
async fn run_command(
    state: &ApiState,
    command: Command,
) -> Result<(StatusCode, Json<CommandResponse>), (StatusCode, String)> {
    let response = state
        .commands
        .request(command)
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    let code = if response.is_success() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((code, Json(response)))
}

// Re-export handler functions for use in router setup.
pub use jobs::{handle_job_submit, handle_jobs};
pub use reputation::handle_reputation;
pub use status::{handle_shutdown, handle_status};
pub use workers::{handle_workers, handle_workers_refresh};
