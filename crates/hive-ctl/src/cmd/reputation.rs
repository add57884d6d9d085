//! Reputation command.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct ReputationResponse {
    peers: Vec<GhostCount>,
    total: u64,
}

#[derive(Deserialize)]
struct GhostCount {
    peer: String,
    ghosts: u64,
}

pub async fn cmd_reputation(port: u16) -> Result<()> {
    let resp: ReputationResponse = get_json(&format!("{}/reputation", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No protocol violations recorded.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Ghosts ({} total)", resp.total);
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        println!("  {}  {}", &p.peer[..16], p.ghosts);
    }

    Ok(())
}
