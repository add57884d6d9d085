//! hived — the Hive User-role daemon.
//!
//! Loads config, opens the peer listener, and runs the dispatch loop, the
//! command loop and the local API until ctrl-c or `POST /api/daemon/shutdown`.

mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use hive_core::config::HiveConfig;
use hive_core::NodeId;
use hive_services::{command_channel, NodeSettings, PeerAddr, ReputationLedger, UserNode};
use transport::TcpSubstrate;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = HiveConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = HiveConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        HiveConfig::default()
    });

    let local = match config.node_id().context("invalid identity.node_id")? {
        Some(id) => id,
        None => NodeId::random(),
    };
    let settings = NodeSettings::from_config(&config).context("invalid job.validators")?;
    tracing::info!(
        node_id = %local,
        validators = settings.validators.len(),
        "hived starting"
    );

    // ── Shutdown signal ──────────────────────────────────────────────────────

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut shutdown_rx = shutdown_tx.subscribe();

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Substrate ────────────────────────────────────────────────────────────

    let (inbound_tx, inbound_rx) = mpsc::channel(1024);
    let substrate = Arc::new(TcpSubstrate::new(
        local,
        inbound_tx,
        Duration::from_secs(config.network.connect_timeout_secs),
        shutdown_tx.clone(),
    ));
    for record in &config.network.peers {
        match record.node_id() {
            Ok(id) => substrate.add_peer(
                id,
                PeerAddr {
                    host: record.host.clone(),
                    port: record.port,
                },
            ),
            Err(e) => tracing::warn!(error = %e, "skipping peer table entry"),
        }
    }

    let listen_addr = format!("{}:{}", config.network.listen_host, config.network.listen_port);
    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind peer listener on {}", listen_addr))?;

    // ── Node ─────────────────────────────────────────────────────────────────

    let reputation = if config.reputation.persist {
        ReputationLedger::with_persistence(config.reputation.persist_path.clone())
    } else {
        ReputationLedger::new()
    };
    let node = UserNode::new(substrate.clone(), reputation, settings);

    let listen_task = tokio::spawn(substrate.clone().listen(listener, shutdown_tx.subscribe()));
    let dispatch_task = tokio::spawn(node.dispatcher.clone().run(inbound_rx, shutdown_tx.subscribe()));

    let (commands, command_rx) = command_channel(64);
    let command_task = tokio::spawn(node.command_processor().run(command_rx, shutdown_tx.subscribe()));

    let api_task = {
        let state = hive_api::ApiState {
            node: node.clone(),
            commands,
            shutdown_tx: shutdown_tx.clone(),
        };
        let api_port = config.network.api_port;
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = hive_api::serve(state, api_port, shutdown).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let _ = shutdown_rx.recv().await;
    tracing::info!("shutting down");

    substrate.close_all().await;
    // In-flight job requests can hold an API connection open for a full
    // announcement cycle; do not wait on them past the grace period.
    let joined = tokio::time::timeout(
        SHUTDOWN_GRACE,
        async { tokio::join!(listen_task, dispatch_task, command_task, api_task) },
    )
    .await;
    match joined {
        Ok((listen, dispatch, command, api)) => {
            for (name, result) in [
                ("listener", listen),
                ("dispatcher", dispatch),
                ("command loop", command),
                ("api", api),
            ] {
                if let Err(e) = result {
                    tracing::error!(task = name, error = %e, "task did not stop cleanly");
                }
            }
        }
        Err(_) => tracing::warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "tasks still running at exit"),
    }

    tracing::info!("node stopped");
    Ok(())
}
