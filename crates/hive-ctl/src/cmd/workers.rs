//! Worker registry commands.

use anyhow::Result;

use super::http::{base_url, get_json, post_json, CommandResponse};

pub async fn cmd_workers(port: u16) -> Result<()> {
    let resp: CommandResponse = get_json(&format!("{}/workers", base_url(port))).await?;
    let workers = resp.into_result()?;

    let Some(map) = workers.as_object().filter(|m| !m.is_empty()) else {
        println!("No workers reported yet. Try `hive-ctl workers refresh`.");
        return Ok(());
    };

    println!("═══════════════════════════════════════");
    println!("  Known Workers ({})", map.len());
    println!("═══════════════════════════════════════");

    for (id, stats) in map {
        println!("  ┌─ {}", &id[..16.min(id.len())]);
        println!("  └─ stats : {}", stats);
    }

    Ok(())
}

pub async fn cmd_workers_refresh(port: u16) -> Result<()> {
    let resp: CommandResponse = post_json(&format!("{}/workers/refresh", base_url(port))).await?;
    resp.into_result()?;
    println!("Worker broadcast requested from all validators.");
    Ok(())
}
