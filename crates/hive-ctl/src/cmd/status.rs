//! Node status and shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

#[derive(Deserialize)]
struct StatusResponse {
    node_id: String,
    role: String,
    validators: Vec<String>,
    connected_peers: Vec<String>,
    jobs: usize,
    current_job: Option<JobSummary>,
    pending_announcements: usize,
    workers_known: usize,
    ghosts_total: u64,
}

#[derive(Deserialize)]
struct JobSummary {
    id: String,
    active: bool,
    capacity: u64,
    n_workers: u32,
    bound_workers: usize,
}

#[derive(Deserialize)]
struct ShutdownResponse {
    message: String,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Hive Node Status");
    println!("═══════════════════════════════════════");
    println!("  Node id          : {}", &resp.node_id[..16]);
    println!("  Role             : {}", resp.role);
    println!("  Validators       : {}", resp.validators.len());
    println!("  Connected peers  : {}", resp.connected_peers.len());
    println!("  Jobs             : {}", resp.jobs);
    println!("  Pending announce : {}", resp.pending_announcements);
    println!("  Workers known    : {}", resp.workers_known);
    println!("  Ghosts recorded  : {}", resp.ghosts_total);

    match resp.current_job {
        None => println!("\n  No current job."),
        Some(job) => {
            println!("\n  Current job:");
            println!("  ┌─ {}", &job.id[..16]);
            println!("  │  active   : {}", job.active);
            println!("  │  capacity : {}", job.capacity);
            println!("  └─ workers  : {}/{}", job.bound_workers, job.n_workers);
        }
    }

    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    let resp: ShutdownResponse = post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}
