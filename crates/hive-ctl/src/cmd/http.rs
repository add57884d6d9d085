//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to hived at {}, is it running?", url))?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn post_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::Client::new()
        .post(url)
        .send()
        .await
        .with_context(|| format!("failed to connect to hived at {}, is it running?", url))?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn post_json_body<T, R>(url: &str, body: &T) -> Result<R>
where
    T: Serialize,
    R: for<'de> Deserialize<'de>,
{
    reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("failed to connect to hived at {}, is it running?", url))?
        .json::<R>()
        .await
        .context("failed to parse response")
}

/// `{"status": ..., "return": ...}` as produced by the node's command loop.
#[derive(Deserialize)]
pub struct CommandResponse {
    pub status: String,
    #[serde(rename = "return")]
    pub ret: serde_json::Value,
}

impl CommandResponse {
    /// The `return` value, or an error carrying it when status is not SUCCESS.
    pub fn into_result(self) -> Result<serde_json::Value> {
        if self.status == "SUCCESS" {
            Ok(self.ret)
        } else {
            match self.ret {
                serde_json::Value::String(msg) => anyhow::bail!("{}", msg),
                other => anyhow::bail!("command failed: {}", other),
            }
        }
    }
}
