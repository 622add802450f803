//! Per-connection client session
//!
//! A `ClientSession` is owned by the connection's reader task and handed to
//! every handler by `&mut`. Outbound frames go through a `PacketWriter`; on
//! real sockets that is a `ChannelWriter` feeding the connection's writer
//! task.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::bucket::Bucket;
use super::dcp::DcpConnection;
use super::error::{MemdError, Result};
use super::handler_context::HandlerContext;
use super::protocol::Packet;
use super::topology::ClusterNode;

/// Sink for frames destined to one client
pub trait PacketWriter: Send + Sync {
    /// Queue a frame for the client
    ///
    /// # Errors
    /// `TransportClosed` once the connection can no longer be written to
    fn write_packet(&self, packet: Packet) -> Result<()>;
}

/// `PacketWriter` backed by the connection's outbound channel
///
/// The writer task cancels `closed` when a socket write fails, so frames
/// queued after that are refused instead of piling up in the channel.
pub struct ChannelWriter {
    tx: UnboundedSender<Packet>,
    closed: CancellationToken,
}

impl ChannelWriter {
    pub fn new(tx: UnboundedSender<Packet>, closed: CancellationToken) -> Self {
        Self { tx, closed }
    }
}

impl PacketWriter for ChannelWriter {
    fn write_packet(&self, packet: Packet) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(MemdError::TransportClosed);
        }
        self.tx
            .send(packet)
            .map_err(|_| MemdError::TransportClosed)
    }
}

pub struct ClientSession {
    id: u64,
    ctx: Arc<HandlerContext>,
    writer: Arc<dyn PacketWriter>,
    selected_bucket: Option<Arc<Bucket>>,
    features: Vec<u16>,
    user: Option<String>,
    agent: Option<String>,
    dcp: DcpConnection,
}

impl ClientSession {
    pub fn new(id: u64, ctx: Arc<HandlerContext>, writer: Arc<dyn PacketWriter>) -> Self {
        Self {
            id,
            ctx,
            writer,
            selected_bucket: None,
            features: Vec::new(),
            user: None,
            agent: None,
            dcp: DcpConnection::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.ctx
    }

    /// Node this connection was accepted on
    pub fn node(&self) -> &ClusterNode {
        &self.ctx.node
    }

    pub fn writer(&self) -> Arc<dyn PacketWriter> {
        Arc::clone(&self.writer)
    }

    pub fn write_packet(&self, packet: Packet) -> Result<()> {
        self.writer.write_packet(packet)
    }

    pub fn selected_bucket(&self) -> Option<&Arc<Bucket>> {
        self.selected_bucket.as_ref()
    }

    pub fn select_bucket(&mut self, bucket: Arc<Bucket>) {
        self.selected_bucket = Some(bucket);
    }

    /// Features acknowledged in the last HELLO
    pub fn features(&self) -> &[u16] {
        &self.features
    }

    pub fn set_features(&mut self, features: Vec<u16>) {
        self.features = features;
    }

    pub fn has_feature(&self, feature: u16) -> bool {
        self.features.contains(&feature)
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn authenticate(&mut self, user: String) {
        self.user = Some(user);
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn agent(&self) -> Option<&str> {
        self.agent.as_deref()
    }

    pub fn set_agent(&mut self, agent: String) {
        self.agent = Some(agent);
    }

    pub fn dcp(&self) -> &DcpConnection {
        &self.dcp
    }

    pub fn dcp_mut(&mut self) -> &mut DcpConnection {
        &mut self.dcp
    }
}
