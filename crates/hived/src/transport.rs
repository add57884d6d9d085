//! TCP peer substrate.
//!
//! Every message travels as one frame: a 4-byte big-endian length followed by
//! the message bytes. The first frame in each direction is `HELLO` + the
//! sender's raw node id; after that, frames are handed to the dispatch loop
//! as `InboundMessage`s. Peer lookup is a static table loaded from config.
//!
//! There is no authentication: a peer is whoever its HELLO says it is.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use dashmap::DashMap;
use hive_core::wire::{decode_hello, encode_hello, WireError, MAX_FRAME, PING, PONG};
use hive_core::NodeId;
use hive_services::{InboundMessage, PeerAddr, PeerSubstrate};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

const HEADER_SIZE: usize = 4;

type Connections = Arc<DashMap<NodeId, Connection>>;

struct Connection {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    addr: SocketAddr,
}

pub struct TcpSubstrate {
    local: NodeId,
    table: DashMap<NodeId, PeerAddr>,
    connections: Connections,
    inbound_tx: mpsc::Sender<InboundMessage>,
    /// Per-connection tasks, joined on shutdown.
    readers: DashMap<u64, JoinHandle<()>>,
    next_reader: AtomicU64,
    connect_timeout: Duration,
    shutdown: broadcast::Sender<()>,
}

impl TcpSubstrate {
    pub fn new(
        local: NodeId,
        inbound_tx: mpsc::Sender<InboundMessage>,
        connect_timeout: Duration,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            local,
            table: DashMap::new(),
            connections: Arc::new(DashMap::new()),
            inbound_tx,
            readers: DashMap::new(),
            next_reader: AtomicU64::new(0),
            connect_timeout,
            shutdown,
        }
    }

    pub fn add_peer(&self, peer: NodeId, addr: PeerAddr) {
        self.table.insert(peer, addr);
    }

    /// Accept inbound connections until shutdown. Dropping the listener on
    /// return releases the port.
    pub async fn listen(self: Arc<Self>, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "peer listener started");
        }
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let this = self.clone();
                    self.track(async move {
                        if let Err(e) = this.handle_inbound(stream, addr).await {
                            tracing::debug!(%addr, error = %e, "inbound connection ended");
                        }
                    });
                }
            }
        }
        drop(listener);
        tracing::info!("peer listener stopped");
    }

    async fn handle_inbound(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let mut buf = BytesMut::with_capacity(4096);

        let hello = tokio::time::timeout(self.connect_timeout, read_frame(&mut reader, &mut buf))
            .await
            .context("no HELLO before timeout")??
            .context("closed before HELLO")?;
        let peer = decode_hello(&hello)?;
        writer.write_all(&encode_frame(&encode_hello(&self.local))?).await?;
        writer.flush().await?;

        let writer = Arc::new(Mutex::new(writer));
        if !self.connections.contains_key(&peer) {
            self.connections.insert(
                peer,
                Connection {
                    writer: writer.clone(),
                    addr,
                },
            );
        }
        tracing::info!(peer = %peer.short(), %addr, "peer connected (inbound)");

        self.read_loop(peer, reader, buf, writer).await
    }

    /// Deliver frames from `reader` until EOF, error, or shutdown.
    async fn read_loop(
        &self,
        peer: NodeId,
        mut reader: OwnedReadHalf,
        mut buf: BytesMut,
        writer: Arc<Mutex<OwnedWriteHalf>>,
    ) -> Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        let result = loop {
            tokio::select! {
                _ = shutdown.recv() => break Ok(()),
                frame = read_frame(&mut reader, &mut buf) => match frame {
                    Ok(Some(payload)) => {
                        if self.inbound_tx.send(InboundMessage { peer, payload }).await.is_err() {
                            break Ok(());
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                },
            }
        };
        // Only drop the entry if it still belongs to this connection.
        self.connections
            .remove_if(&peer, |_, c| Arc::ptr_eq(&c.writer, &writer));
        tracing::info!(peer = %peer.short(), "peer disconnected");
        result
    }

    fn track<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let id = self.next_reader.fetch_add(1, Ordering::Relaxed);
        self.readers.insert(id, tokio::spawn(fut));
        self.readers.retain(|_, h| !h.is_finished());
    }

    /// Close every connection and join every per-connection task.
    pub async fn close_all(&self) {
        let _ = self.shutdown.send(());

        let writers: Vec<(NodeId, SocketAddr, Arc<Mutex<OwnedWriteHalf>>)> = self
            .connections
            .iter()
            .map(|e| (*e.key(), e.value().addr, e.value().writer.clone()))
            .collect();
        self.connections.clear();
        for (peer, addr, writer) in writers {
            if let Err(e) = writer.lock().await.shutdown().await {
                tracing::debug!(peer = %peer.short(), %addr, error = %e, "shutdown of write half failed");
            }
        }

        let ids: Vec<u64> = self.readers.iter().map(|e| *e.key()).collect();
        let handles: Vec<JoinHandle<()>> = ids
            .into_iter()
            .filter_map(|id| self.readers.remove(&id).map(|(_, h)| h))
            .collect();
        let joined = handles.len();
        futures::future::join_all(handles).await;
        tracing::info!(connections = joined, "peer connections closed");
    }
}

#[async_trait]
impl PeerSubstrate for TcpSubstrate {
    fn local_id(&self) -> NodeId {
        self.local
    }

    async fn resolve(&self, peer: &NodeId) -> Option<PeerAddr> {
        self.table.get(peer).map(|a| a.clone())
    }

    async fn connect(&self, peer: &NodeId, host: &str, port: u16) -> bool {
        if self.connections.contains_key(peer) {
            return true;
        }
        match self.dial(*peer, host, port).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(peer = %peer.short(), host, port, error = %e, "connect failed");
                false
            }
        }
    }

    async fn send(&self, peer: &NodeId, payload: Bytes) -> Result<()> {
        let writer = self
            .connections
            .get(peer)
            .map(|c| c.writer.clone())
            .with_context(|| format!("peer {} not connected", peer.short()))?;

        let frame = encode_frame(&payload)?;
        let mut w = writer.lock().await;
        let sent = async {
            w.write_all(&frame).await?;
            w.flush().await
        }
        .await;
        if let Err(e) = sent {
            drop(w);
            self.connections
                .remove_if(peer, |_, c| Arc::ptr_eq(&c.writer, &writer));
            return Err(e).with_context(|| format!("send to {} failed", peer.short()));
        }
        Ok(())
    }

    fn forget(&self, peer: &NodeId) {
        self.table.remove(peer);
        self.connections.remove(peer);
    }

    fn is_connected(&self, peer: &NodeId) -> bool {
        self.connections.contains_key(peer)
    }

    fn connected_peers(&self) -> Vec<NodeId> {
        self.connections.iter().map(|e| *e.key()).collect()
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

impl TcpSubstrate {
    async fn dial(&self, peer: NodeId, host: &str, port: u16) -> Result<()> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .context("connect timed out")??;
        let addr = stream.peer_addr()?;
        let (mut reader, mut writer) = stream.into_split();

        writer.write_all(&encode_frame(&encode_hello(&self.local))?).await?;
        writer.flush().await?;

        let mut buf = BytesMut::with_capacity(4096);
        let hello = tokio::time::timeout(self.connect_timeout, read_frame(&mut reader, &mut buf))
            .await
            .context("no HELLO before timeout")??
            .context("closed before HELLO")?;
        let remote = decode_hello(&hello)?;
        if remote != peer {
            anyhow::bail!("dialled {} but peer is {}", peer.short(), remote.short());
        }

        let writer = Arc::new(Mutex::new(writer));
        self.connections.insert(
            peer,
            Connection {
                writer: writer.clone(),
                addr,
            },
        );
        tracing::info!(peer = %peer.short(), %addr, "peer connected (outbound)");

        // The read loop borrows self; run it on a task holding its own handles.
        let dialled = DialledConnection {
            peer,
            writer,
            connections: self.connections.clone(),
        };
        let inbound_tx = self.inbound_tx.clone();
        let shutdown = self.shutdown.subscribe();
        self.track(outbound_reader(dialled, reader, buf, inbound_tx, shutdown));
        Ok(())
    }
}

struct DialledConnection {
    peer: NodeId,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    connections: Connections,
}

/// Reader for a dialled connection. When it ends, the connection entry goes
/// with it unless a newer connection to the same peer has replaced it.
async fn outbound_reader(
    dialled: DialledConnection,
    mut reader: OwnedReadHalf,
    mut buf: BytesMut,
    inbound_tx: mpsc::Sender<InboundMessage>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let peer = dialled.peer;
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            frame = read_frame(&mut reader, &mut buf) => match frame {
                Ok(Some(payload)) => {
                    if inbound_tx.send(InboundMessage { peer, payload }).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(peer = %peer.short(), error = %e, "read failed");
                    break;
                }
            },
        }
    }
    dialled
        .connections
        .remove_if(&peer, |_, c| Arc::ptr_eq(&c.writer, &dialled.writer));
    tracing::info!(peer = %peer.short(), "peer disconnected");
}

fn encode_frame(payload: &[u8]) -> Result<BytesMut, WireError> {
    if payload.len() > MAX_FRAME {
        return Err(WireError::FrameTooLarge(payload.len()));
    }
    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Next complete frame, or None on a clean EOF.
async fn read_frame(reader: &mut OwnedReadHalf, buf: &mut BytesMut) -> Result<Option<Bytes>> {
    loop {
        if buf.len() >= HEADER_SIZE {
            let len = (&buf[..HEADER_SIZE]).get_u32() as usize;
            if len > MAX_FRAME {
                return Err(WireError::FrameTooLarge(len).into());
            }
            if buf.len() >= HEADER_SIZE + len {
                buf.advance(HEADER_SIZE);
                return Ok(Some(buf.split_to(len).freeze()));
            }
        }
        if reader.read_buf(buf).await? == 0 {
            return Ok(None);
        }
    }
}
