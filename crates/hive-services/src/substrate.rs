//! Peer substrate — the connection layer orchestration runs on top of.
//!
//! The daemon provides a TCP implementation; `memory::MemorySubstrate` is an
//! in-process one for tests and simulations. Inbound messages do not pass
//! through this trait: implementations push `InboundMessage`s onto the channel
//! the dispatch loop drains.

use async_trait::async_trait;
use bytes::Bytes;
use hive_core::NodeId;

pub mod memory;

/// Dial address of a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

/// One message received from a connected peer.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub peer: NodeId,
    pub payload: Bytes,
}

#[async_trait]
pub trait PeerSubstrate: Send + Sync + 'static {
    fn local_id(&self) -> NodeId;

    /// Look up a peer's address. `None` on a miss.
    async fn resolve(&self, peer: &NodeId) -> Option<PeerAddr>;

    /// Open (or reuse) a connection. Returns false on failure.
    async fn connect(&self, peer: &NodeId, host: &str, port: u16) -> bool;

    /// Send one message to a connected peer.
    async fn send(&self, peer: &NodeId, payload: Bytes) -> anyhow::Result<()>;

    /// Drop any partial or live state kept for a peer.
    fn forget(&self, peer: &NodeId);

    fn is_connected(&self, peer: &NodeId) -> bool;

    fn connected_peers(&self) -> Vec<NodeId>;

    /// Handle base-protocol traffic (PING/PONG). Returns true if consumed.
    async fn handle_base(&self, peer: &NodeId, data: &[u8]) -> bool;
}
