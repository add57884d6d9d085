//! /jobs handlers: job history and job submission.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use hive_core::{DistributionSpec, JobSummary};
use hive_services::{Command, CommandResponse};

use super::{run_command, ApiState};

// ── /jobs (GET) ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobSummary>,
}

pub async fn handle_jobs(State(state): State<ApiState>) -> Json<JobsResponse> {
    let jobs = state
        .node
        .jobs
        .all()
        .await
        .iter()
        .map(|j| j.summary())
        .collect();
    Json(JobsResponse { jobs })
}

// ── /jobs (POST) ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct JobSubmitRequest {
    pub n_pipelines: u32,
    #[serde(default = "default_dp_factor")]
    pub dp_factor: u32,
    pub distribution: DistributionSpec,
}

fn default_dp_factor() -> u32 {
    1
}

/// Blocks until the job is bound or its announcement fails.
pub async fn handle_job_submit(
    State(state): State<ApiState>,
    Json(req): Json<JobSubmitRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), (StatusCode, String)> {
    tracing::info!(
        n_pipelines = req.n_pipelines,
        dp_factor = req.dp_factor,
        modules = req.distribution.len(),
        "job submitted via API"
    );
    run_command(
        &state,
        Command::RequestJob {
            n_pipelines: req.n_pipelines,
            dp_factor: req.dp_factor,
            distribution: req.distribution,
        },
    )
    .await
}
