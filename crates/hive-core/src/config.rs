//! Configuration system for Hive.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $HIVE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/hive/config.toml
//!   3. ~/.config/hive/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::id::{IdError, NodeId};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub job: JobSettings,
    pub reputation: ReputationConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Node id as 64 hex chars. Empty = random per start.
    pub node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub listen_host: String,
    /// TCP port for peer connections.
    pub listen_port: u16,
    /// Local HTTP API port (bound to 127.0.0.1).
    pub api_port: u16,
    pub connect_timeout_secs: u64,
    /// Static peer table used for id → address lookup.
    pub peers: Vec<PeerRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Validator ids (hex) this node may submit jobs to.
    pub validators: Vec<String>,
    /// Wait per announcement attempt.
    pub announce_timeout_secs: u64,
    pub max_announce_attempts: u32,
    /// Max accept-handling tasks running at once.
    pub accept_concurrency: usize,
    pub command_poll_ms: u64,
    /// Pause after asking validators for a worker broadcast.
    pub workers_settle_ms: u64,
    /// Largest `n_pipelines` a job request may ask for.
    pub max_pipelines: u32,
    /// Largest `dp_factor` a job request may ask for.
    pub max_dp_factor: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    /// If true, ghost counts are written to `persist_path` on every change.
    pub persist: bool,
    pub persist_path: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: 5026,
            api_port: 5029,
            connect_timeout_secs: 5,
            peers: Vec::new(),
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            validators: Vec::new(),
            announce_timeout_secs: 100,
            max_announce_attempts: 3,
            accept_concurrency: 4,
            command_poll_ms: 3000,
            workers_settle_ms: 1000,
            max_pipelines: 1024,
            max_dp_factor: 1024,
        }
    }
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            persist: false,
            persist_path: data_dir().join("reputation.json"),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("hive")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("hive")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid node id {0:?}: {1}")]
    InvalidId(String, IdError),
}

// ── Peer records ──────────────────────────────────────────────────────────────

impl PeerRecord {
    /// Parse `hex@host:port`.
    pub fn parse(s: &str) -> Option<Self> {
        let (id, addr) = s.trim().split_once('@')?;
        let (host, port) = addr.rsplit_once(':')?;
        Some(Self {
            id: id.to_string(),
            host: host.to_string(),
            port: port.parse().ok()?,
        })
    }

    pub fn node_id(&self) -> Result<NodeId, ConfigError> {
        NodeId::from_hex(&self.id).map_err(|e| ConfigError::InvalidId(self.id.clone(), e))
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl HiveConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            HiveConfig::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("HIVE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&HiveConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Configured identity, if any.
    pub fn node_id(&self) -> Result<Option<NodeId>, ConfigError> {
        let raw = self.identity.node_id.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        NodeId::from_hex(raw)
            .map(Some)
            .map_err(|e| ConfigError::InvalidId(raw.to_string(), e))
    }

    pub fn validator_ids(&self) -> Result<Vec<NodeId>, ConfigError> {
        self.job
            .validators
            .iter()
            .map(|v| NodeId::from_hex(v).map_err(|e| ConfigError::InvalidId(v.clone(), e)))
            .collect()
    }

    /// Apply HIVE_* overrides. `lookup` is `std::env::var` outside tests.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("HIVE_IDENTITY__NODE_ID") {
            self.identity.node_id = v;
        }
        if let Some(v) = lookup("HIVE_NETWORK__LISTEN_HOST") {
            self.network.listen_host = v;
        }
        if let Some(p) = lookup("HIVE_NETWORK__LISTEN_PORT").and_then(|v| v.parse().ok()) {
            self.network.listen_port = p;
        }
        if let Some(p) = lookup("HIVE_NETWORK__API_PORT").and_then(|v| v.parse().ok()) {
            self.network.api_port = p;
        }
        if let Some(n) = lookup("HIVE_NETWORK__CONNECT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.network.connect_timeout_secs = n;
        }
        if let Some(v) = lookup("HIVE_NETWORK__PEERS") {
            self.network.peers = v.split(',').filter_map(PeerRecord::parse).collect();
        }
        if let Some(v) = lookup("HIVE_JOB__VALIDATORS") {
            self.job.validators = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(n) = lookup("HIVE_JOB__ANNOUNCE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.job.announce_timeout_secs = n;
        }
        if let Some(n) = lookup("HIVE_JOB__MAX_ANNOUNCE_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.job.max_announce_attempts = n;
        }
        if let Some(n) = lookup("HIVE_JOB__ACCEPT_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.job.accept_concurrency = n;
        }
        if let Some(n) = lookup("HIVE_JOB__COMMAND_POLL_MS").and_then(|v| v.parse().ok()) {
            self.job.command_poll_ms = n;
        }
        if let Some(n) = lookup("HIVE_JOB__WORKERS_SETTLE_MS").and_then(|v| v.parse().ok()) {
            self.job.workers_settle_ms = n;
        }
        if let Some(n) = lookup("HIVE_JOB__MAX_PIPELINES").and_then(|v| v.parse().ok()) {
            self.job.max_pipelines = n;
        }
        if let Some(n) = lookup("HIVE_JOB__MAX_DP_FACTOR").and_then(|v| v.parse().ok()) {
            self.job.max_dp_factor = n;
        }
        if let Some(v) = lookup("HIVE_REPUTATION__PERSIST") {
            self.reputation.persist = v == "true" || v == "1";
        }
        if let Some(v) = lookup("HIVE_REPUTATION__PERSIST_PATH") {
            self.reputation.persist_path = PathBuf::from(v);
        }
    }
}
