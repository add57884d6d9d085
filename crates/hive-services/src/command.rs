//! Local command loop.
//!
//! Local callers (the HTTP API) enqueue a `Command` with a reply slot. The
//! processor polls its queue with a short timeout, handles each command on
//! its own task, and answers `{"status": "SUCCESS" | "ERROR", "return": ...}`.

use hive_core::DistributionSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::orchestrator::JobOrchestrator;
use crate::workers::WorkerRegistry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "snake_case")]
pub enum Command {
    RequestJob {
        n_pipelines: u32,
        dp_factor: u32,
        distribution: DistributionSpec,
    },
    RequestWorkers,
    CheckWorkers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: CommandStatus,
    #[serde(rename = "return")]
    pub ret: Value,
}

impl CommandResponse {
    pub fn success(ret: Value) -> Self {
        Self {
            status: CommandStatus::Success,
            ret,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            ret: Value::String(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

pub struct CommandRequest {
    pub command: Command,
    pub reply: oneshot::Sender<CommandResponse>,
}

/// Sending half of the command queue.
#[derive(Clone)]
pub struct CommandHandle {
    tx: mpsc::Sender<CommandRequest>,
}

impl CommandHandle {
    /// Enqueue `command` and wait for its response.
    pub async fn request(&self, command: Command) -> anyhow::Result<CommandResponse> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CommandRequest { command, reply })
            .await
            .map_err(|_| anyhow::anyhow!("command loop is not running"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("command dropped without a response"))
    }
}

pub fn command_channel(capacity: usize) -> (CommandHandle, mpsc::Receiver<CommandRequest>) {
    let (tx, rx) = mpsc::channel(capacity);
    (CommandHandle { tx }, rx)
}

#[derive(Clone)]
pub struct CommandProcessor {
    orchestrator: Arc<JobOrchestrator>,
    workers: WorkerRegistry,
    poll: Duration,
    settle: Duration,
}

impl CommandProcessor {
    pub fn new(
        orchestrator: Arc<JobOrchestrator>,
        workers: WorkerRegistry,
        poll: Duration,
        settle: Duration,
    ) -> Self {
        Self {
            orchestrator,
            workers,
            poll,
            settle,
        }
    }

    pub async fn handle(&self, command: Command) -> CommandResponse {
        match command {
            Command::RequestJob {
                n_pipelines,
                dp_factor,
                distribution,
            } => match self
                .orchestrator
                .submit_job(n_pipelines, dp_factor, distribution)
                .await
            {
                Ok(allocation) => match serde_json::to_value(&allocation) {
                    Ok(v) => CommandResponse::success(v),
                    Err(e) => CommandResponse::error(format!("failed to encode allocation: {e}")),
                },
                Err(e) => {
                    tracing::warn!(error = %e, "job request failed");
                    CommandResponse::error(e.to_string())
                }
            },
            Command::RequestWorkers => {
                let asked = self.orchestrator.request_worker_info().await;
                tracing::debug!(validators = asked, "worker broadcast requested");
                // Give validators a moment to answer before the caller reads.
                tokio::time::sleep(self.settle).await;
                CommandResponse::success(Value::Null)
            }
            Command::CheckWorkers => match serde_json::to_value(self.workers.get_all()) {
                Ok(v) => CommandResponse::success(v),
                Err(e) => CommandResponse::error(format!("failed to encode workers: {e}")),
            },
        }
    }

    /// Poll the queue until shutdown. An empty poll is not an error.
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<CommandRequest>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(poll_ms = self.poll.as_millis() as u64, "command loop started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                polled = tokio::time::timeout(self.poll, rx.recv()) => {
                    let request = match polled {
                        Err(_) => continue,
                        Ok(None) => break,
                        Ok(Some(r)) => r,
                    };
                    let this = self.clone();
                    tokio::spawn(async move {
                        let response = this.handle(request.command).await;
                        let _ = request.reply.send(response);
                    });
                }
            }
        }
        tracing::info!("command loop stopped");
    }
}
