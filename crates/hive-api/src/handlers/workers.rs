//! /workers handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use hive_services::{Command, CommandResponse};

use super::{run_command, ApiState};

// ── /workers (GET) ────────────────────────────────────────────────────────────

pub async fn handle_workers(
    State(state): State<ApiState>,
) -> Result<(StatusCode, Json<CommandResponse>), (StatusCode, String)> {
    run_command(&state, Command::CheckWorkers).await
}

// ── /workers/refresh (POST) ───────────────────────────────────────────────────

pub async fn handle_workers_refresh(
    State(state): State<ApiState>,
) -> Result<(StatusCode, Json<CommandResponse>), (StatusCode, String)> {
    run_command(&state, Command::RequestWorkers).await
}
