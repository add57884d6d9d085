//! Job history and submission commands.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, post_json_body, CommandResponse};

#[derive(Deserialize)]
struct JobsResponse {
    jobs: Vec<JobSummary>,
}

#[derive(Deserialize)]
struct JobSummary {
    id: String,
    active: bool,
    capacity: u64,
    n_pipelines: u32,
    dp_factor: u32,
    n_workers: u32,
    bound_workers: usize,
    modules: Vec<String>,
}

#[derive(Serialize)]
struct JobSubmitRequest {
    n_pipelines: u32,
    dp_factor: u32,
    distribution: serde_json::Value,
}

pub async fn cmd_jobs(port: u16) -> Result<()> {
    let resp: JobsResponse = get_json(&format!("{}/jobs", base_url(port))).await?;

    if resp.jobs.is_empty() {
        println!("No jobs submitted yet.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Jobs ({})", resp.jobs.len());
    println!("═══════════════════════════════════════");

    for j in &resp.jobs {
        println!("  ┌─ {}", &j.id[..16]);
        println!("  │  active    : {}", j.active);
        println!("  │  capacity  : {}", j.capacity);
        println!("  │  pipelines : {} (dp {})", j.n_pipelines, j.dp_factor);
        println!("  │  modules   : {}", j.modules.join(", "));
        println!("  └─ workers   : {}/{}", j.bound_workers, j.n_workers);
    }

    Ok(())
}

pub async fn cmd_job_submit(port: u16, pipelines: &str, dp_factor: &str, distribution: &str) -> Result<()> {
    let req = JobSubmitRequest {
        n_pipelines: pipelines.parse().context("pipelines must be a number")?,
        dp_factor: dp_factor.parse().context("dp_factor must be a number")?,
        distribution: serde_json::from_str(distribution).context("distribution must be a JSON object")?,
    };

    println!("Submitting job, waiting for a validator to accept...");
    let resp: CommandResponse = post_json_body(&format!("{}/jobs", base_url(port)), &req).await?;
    let allocation = resp.into_result()?;

    println!("═══════════════════════════════════════");
    println!("  Job {}", allocation["job_id"].as_str().unwrap_or("?"));
    println!("═══════════════════════════════════════");

    if let Some(modules) = allocation["modules"].as_object() {
        for (module_id, config) in modules {
            let workers = config["workers"].as_array().map(|w| w.len()).unwrap_or(0);
            println!("  {:<20} {} worker(s)", module_id, workers);
        }
    }

    Ok(())
}
