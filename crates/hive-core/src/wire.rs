//! Tag-prefixed messages exchanged between peers.
//!
//! Every message is an ASCII tag followed immediately by its payload, with no
//! delimiter. Payloads are JSON except where noted. The transport frames each
//! message with a 4-byte big-endian length; see `MAX_FRAME`.
//!
//! Tags are part of the protocol. Changing a prefix is a breaking change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{JobId, NodeId};
use crate::job::Job;

// ── Constants ────────────────────────────────────────────────────────────────

/// Width of the raw job id that follows the `ACCEPT-JOB` tag.
pub const JOB_ID_LEN: usize = 32;

/// Largest frame a peer may send. Larger frames close the connection.
pub const MAX_FRAME: usize = 16 * 1024 * 1024;

/// Base-protocol liveness check, handled by the substrate.
pub const PING: &[u8] = b"PING";
pub const PONG: &[u8] = b"PONG";

/// First frame on every connection: tag + 32 raw node id bytes.
pub const HELLO: &[u8] = b"HELLO";

pub fn encode_hello(id: &NodeId) -> Vec<u8> {
    let mut out = Vec::with_capacity(HELLO.len() + 32);
    out.extend_from_slice(HELLO);
    out.extend_from_slice(id.as_bytes());
    out
}

pub fn decode_hello(data: &[u8]) -> Result<NodeId, WireError> {
    let rest = data.strip_prefix(HELLO).ok_or(WireError::UnknownTag)?;
    let arr: [u8; 32] = rest.try_into().map_err(|_| WireError::Truncated {
        tag: "HELLO",
        needed: 32,
    })?;
    Ok(NodeId(arr))
}

// ── Tags ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// User → Validator: announce a new job.
    JobRequest,
    /// Validator → User: job accepted, workers assigned.
    AcceptJob,
    /// Validator → User: job declined.
    DeclineJob,
    /// User → Validator: job state changed.
    JobUpdate,
    /// Validator → User: worker statistics broadcast.
    Workers,
    /// User → Validator: ask for a worker broadcast.
    UserGetWorkers,
}

impl Tag {
    const ALL: [Tag; 6] = [
        Tag::JobRequest,
        Tag::AcceptJob,
        Tag::DeclineJob,
        Tag::JobUpdate,
        Tag::UserGetWorkers,
        Tag::Workers,
    ];

    pub const fn prefix(self) -> &'static [u8] {
        match self {
            Tag::JobRequest => b"JOB-REQ",
            Tag::AcceptJob => b"ACCEPT-JOB",
            Tag::DeclineJob => b"DECLINE-JOB",
            Tag::JobUpdate => b"JOB-UPDATE",
            Tag::Workers => b"WORKERS",
            Tag::UserGetWorkers => b"USER-GET-WORKERS",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tag::JobRequest => "JOB-REQ",
            Tag::AcceptJob => "ACCEPT-JOB",
            Tag::DeclineJob => "DECLINE-JOB",
            Tag::JobUpdate => "JOB-UPDATE",
            Tag::Workers => "WORKERS",
            Tag::UserGetWorkers => "USER-GET-WORKERS",
        }
    }

    /// Identify the tag a message starts with, if any.
    pub fn classify(data: &[u8]) -> Option<Tag> {
        Self::ALL.into_iter().find(|t| data.starts_with(t.prefix()))
    }

    /// Whether a User is ever meant to receive this tag.
    pub fn inbound_for_user(self) -> bool {
        matches!(self, Tag::AcceptJob | Tag::DeclineJob | Tag::Workers)
    }
}

// ── Payload schemas ──────────────────────────────────────────────────────────

/// Worker assignment carried by `ACCEPT-JOB`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobBinding {
    pub distribution: BTreeMap<String, ModuleBinding>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleBinding {
    #[serde(default)]
    pub workers: Vec<WorkerCandidate>,
}

/// A worker the validator proposes for a module, with its dial address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCandidate {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
}

// ── Messages ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    JobRequest(Job),
    AcceptJob { job_id: JobId, binding: JobBinding },
    DeclineJob { reason: String },
    JobUpdate(Job),
    Workers(BTreeMap<NodeId, Value>),
    UserGetWorkers,
}

impl Message {
    pub fn tag(&self) -> Tag {
        match self {
            Message::JobRequest(_) => Tag::JobRequest,
            Message::AcceptJob { .. } => Tag::AcceptJob,
            Message::DeclineJob { .. } => Tag::DeclineJob,
            Message::JobUpdate(_) => Tag::JobUpdate,
            Message::Workers(_) => Tag::Workers,
            Message::UserGetWorkers => Tag::UserGetWorkers,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let tag = self.tag();
        let mut out = tag.prefix().to_vec();
        match self {
            Message::JobRequest(job) | Message::JobUpdate(job) => {
                serde_json::to_writer(&mut out, job).map_err(|e| malformed(tag, e))?;
            }
            Message::AcceptJob { job_id, binding } => {
                out.extend_from_slice(job_id.as_bytes());
                serde_json::to_writer(&mut out, binding).map_err(|e| malformed(tag, e))?;
            }
            Message::DeclineJob { reason } => out.extend_from_slice(reason.as_bytes()),
            Message::Workers(map) => {
                serde_json::to_writer(&mut out, map).map_err(|e| malformed(tag, e))?;
            }
            Message::UserGetWorkers => {}
        }
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let tag = Tag::classify(data).ok_or(WireError::UnknownTag)?;
        let body = &data[tag.prefix().len()..];
        match tag {
            Tag::JobRequest => Ok(Message::JobRequest(from_json(tag, body)?)),
            Tag::JobUpdate => Ok(Message::JobUpdate(from_json(tag, body)?)),
            Tag::AcceptJob => {
                if body.len() < JOB_ID_LEN {
                    return Err(WireError::Truncated {
                        tag: tag.name(),
                        needed: JOB_ID_LEN,
                    });
                }
                let (id_bytes, rest) = body.split_at(JOB_ID_LEN);
                let job_id = JobId::from_slice(id_bytes).ok_or(WireError::Truncated {
                    tag: tag.name(),
                    needed: JOB_ID_LEN,
                })?;
                let binding = from_json(tag, rest)?;
                Ok(Message::AcceptJob { job_id, binding })
            }
            Tag::DeclineJob => Ok(Message::DeclineJob {
                reason: String::from_utf8_lossy(body).into_owned(),
            }),
            Tag::Workers => Ok(Message::Workers(from_json(tag, body)?)),
            Tag::UserGetWorkers => Ok(Message::UserGetWorkers),
        }
    }
}

fn from_json<T: serde::de::DeserializeOwned>(tag: Tag, body: &[u8]) -> Result<T, WireError> {
    serde_json::from_slice(body).map_err(|e| malformed(tag, e))
}

fn malformed(tag: Tag, e: serde_json::Error) -> WireError {
    WireError::Malformed {
        tag: tag.name(),
        reason: e.to_string(),
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unrecognized message tag")]
    UnknownTag,

    #[error("{tag} payload truncated: need {needed} bytes")]
    Truncated { tag: &'static str, needed: usize },

    #[error("malformed {tag} payload: {reason}")]
    Malformed { tag: &'static str, reason: String },

    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
}
