//! hive-ctl — command-line interface for the Hive daemon.

mod cmd;

use anyhow::{Context, Result};

use cmd::jobs::{cmd_job_submit, cmd_jobs};
use cmd::reputation::cmd_reputation;
use cmd::status::{cmd_shutdown, cmd_status};
use cmd::workers::{cmd_workers, cmd_workers_refresh};

const DEFAULT_PORT: u16 = 5029;

fn print_usage() {
    println!("hive-ctl — control a running hived");
    println!();
    println!("USAGE:");
    println!("  hive-ctl [--port <port>] <command>");
    println!();
    println!("COMMANDS:");
    println!("  status                                       Node status and current job");
    println!("  jobs                                         Job history");
    println!("  job submit <pipelines> <dp_factor> <json>    Request a job; blocks until bound");
    println!("  workers                                      Known workers and their stats");
    println!("  workers refresh                              Ask validators for a worker broadcast");
    println!("  reputation                                   Ghost counts per peer");
    println!("  shutdown                                     Stop the daemon");
    println!();
    println!("OPTIONS:");
    println!("  --port <port>   API port (default {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd_status(port).await,
        ["jobs"] => cmd_jobs(port).await,
        ["job", "submit", pipelines, dp, dist] => cmd_job_submit(port, pipelines, dp, dist).await,
        ["workers"] => cmd_workers(port).await,
        ["workers", "refresh"] => cmd_workers_refresh(port).await,
        ["reputation"] => cmd_reputation(port).await,
        ["shutdown"] => cmd_shutdown(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
