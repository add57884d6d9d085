//! In-process substrate. Peers exist only as table entries; every send lands
//! on an outbox channel the test (or simulator) reads.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use hive_core::wire::{PING, PONG};
use hive_core::NodeId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{PeerAddr, PeerSubstrate};

/// A message this node sent.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: NodeId,
    pub payload: Bytes,
}

pub struct MemorySubstrate {
    local: NodeId,
    /// Lookup table standing in for the DHT.
    table: DashMap<NodeId, PeerAddr>,
    /// Peers whose connect attempts succeed.
    reachable: DashSet<NodeId>,
    connected: DashSet<NodeId>,
    forgotten: DashSet<NodeId>,
    /// Time each connect attempt takes, in milliseconds.
    dial_delay_ms: AtomicU64,
    outbox: mpsc::UnboundedSender<Outbound>,
}

impl MemorySubstrate {
    pub fn new(local: NodeId) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let substrate = Arc::new(Self {
            local,
            table: DashMap::new(),
            reachable: DashSet::new(),
            connected: DashSet::new(),
            forgotten: DashSet::new(),
            dial_delay_ms: AtomicU64::new(0),
            outbox,
        });
        (substrate, rx)
    }

    /// Make a peer resolvable and connectable.
    pub fn add_peer(&self, peer: NodeId, host: &str, port: u16) {
        self.table.insert(
            peer,
            PeerAddr {
                host: host.to_string(),
                port,
            },
        );
        self.reachable.insert(peer);
    }

    /// Make a peer resolvable but refuse connections to it.
    pub fn add_unreachable_peer(&self, peer: NodeId, host: &str, port: u16) {
        self.add_peer(peer, host, port);
        self.reachable.remove(&peer);
    }

    /// Accept connections to a peer that has no table entry (workers are
    /// dialled by address, not looked up).
    pub fn allow_connect(&self, peer: NodeId) {
        self.reachable.insert(peer);
    }

    /// Make every later connect attempt take `delay`.
    pub fn set_dial_delay(&self, delay: Duration) {
        self.dial_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Drop the connection to `peer` as if the remote end closed it. The
    /// peer stays resolvable and reachable.
    pub fn disconnect(&self, peer: &NodeId) {
        self.connected.remove(peer);
    }

    pub fn was_forgotten(&self, peer: &NodeId) -> bool {
        self.forgotten.contains(peer)
    }
}

#[async_trait]
impl PeerSubstrate for MemorySubstrate {
    fn local_id(&self) -> NodeId {
        self.local
    }

    async fn resolve(&self, peer: &NodeId) -> Option<PeerAddr> {
        self.table.get(peer).map(|a| a.clone())
    }

    async fn connect(&self, peer: &NodeId, _host: &str, _port: u16) -> bool {
        let delay = self.dial_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.reachable.contains(peer) {
            self.connected.insert(*peer);
            true
        } else {
            false
        }
    }

    async fn send(&self, peer: &NodeId, payload: Bytes) -> anyhow::Result<()> {
        if !self.connected.contains(peer) {
            anyhow::bail!("peer {} not connected", peer.short());
        }
        self.outbox.send(Outbound { to: *peer, payload })?;
        Ok(())
    }

    fn forget(&self, peer: &NodeId) {
        self.table.remove(peer);
        self.connected.remove(peer);
        self.forgotten.insert(*peer);
    }

    fn is_connected(&self, peer: &NodeId) -> bool {
        self.connected.contains(peer)
    }

    fn connected_peers(&self) -> Vec<NodeId> {
        self.connected.iter().map(|p| *p).collect()
    }

    async fn handle_base(&self, peer: &NodeId, data: &[u8]) -> bool {
        if data == PING {
            if let Err(e) = self.send(peer, Bytes::from_static(PONG)).await {
                tracing::debug!(peer = %peer.short(), error = %e, "pong not sent");
            }
            true
        } else {
            data == PONG
        }
    }
}
