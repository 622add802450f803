//! Test helper functions
//!
//! Sessions wired to recording writers, small clusters, and builders for
//! the request frames handler tests send.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;

use crate::memd::cluster::Cluster;
use crate::memd::constants::{
    CMD_DCP_CONTROL, CMD_DCP_OPEN_CONNECTION, CMD_DCP_STREAM_REQ, CMD_SELECT_BUCKET,
    DCP_OPEN_PRODUCER, TEST_HOST,
};
use crate::memd::error::{MemdError, Result};
use crate::memd::handler_context::{HandlerContext, HandlerSettings};
use crate::memd::partitioner::vbucket_for_key;
use crate::memd::protocol::Packet;
use crate::memd::session::{ClientSession, PacketWriter};
use crate::memd::topology::ClusterNode;

/// Writer that keeps every packet it is given
#[derive(Default)]
pub struct RecordingWriter {
    packets: Mutex<Vec<Packet>>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the packets written so far, in order
    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().clone()
    }

    /// Drain the recorded packets
    pub fn take(&self) -> Vec<Packet> {
        std::mem::take(&mut *self.packets.lock())
    }
}

impl PacketWriter for RecordingWriter {
    fn write_packet(&self, packet: Packet) -> Result<()> {
        self.packets.lock().push(packet);
        Ok(())
    }
}

/// Writer that accepts `limit` packets and then behaves like a closed
/// connection
pub struct LimitedWriter {
    limit: usize,
    attempts: AtomicUsize,
    packets: Mutex<Vec<Packet>>,
}

impl LimitedWriter {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            attempts: AtomicUsize::new(0),
            packets: Mutex::new(Vec::new()),
        }
    }

    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().clone()
    }

    /// Number of write calls, refused ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl PacketWriter for LimitedWriter {
    fn write_packet(&self, packet: Packet) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.limit {
            return Err(MemdError::TransportClosed);
        }
        self.packets.lock().push(packet);
        Ok(())
    }
}

/// Cluster of `num_nodes` nodes on fake ports, without buckets
pub fn test_cluster(num_nodes: usize, num_vbuckets: u16) -> Arc<Cluster> {
    let nodes = (0..num_nodes)
        .map(|i| ClusterNode::new(TEST_HOST, 11210 + i as u16))
        .collect();
    Arc::new(Cluster::new(nodes, num_vbuckets))
}

/// Session accepted on node `node_index` of `cluster`, default settings
pub fn session_on_node(
    cluster: &Arc<Cluster>,
    node_index: usize,
) -> (ClientSession, Arc<RecordingWriter>) {
    session_with_settings(cluster, node_index, HandlerSettings::default())
}

pub fn session_with_settings(
    cluster: &Arc<Cluster>,
    node_index: usize,
    settings: HandlerSettings,
) -> (ClientSession, Arc<RecordingWriter>) {
    let node = cluster.nodes()[node_index].clone();
    let ctx = Arc::new(HandlerContext::new(Arc::clone(cluster), node, settings));
    let writer = Arc::new(RecordingWriter::new());
    let session = ClientSession::new(1, ctx, writer.clone());
    (session, writer)
}

/// Session on a single-node cluster without buckets
pub fn mock_session() -> (ClientSession, Arc<RecordingWriter>) {
    session_on_node(&test_cluster(1, 4), 0)
}

pub fn select_bucket_request(name: &str, opaque: u32) -> Packet {
    Packet::request(CMD_SELECT_BUCKET)
        .with_opaque(opaque)
        .with_key(name.as_bytes().to_vec())
}

/// DCP_OPEN_CONNECTION for a producer named `name`
pub fn open_request(name: &str, opaque: u32) -> Packet {
    let mut extras = BytesMut::with_capacity(8);
    extras.put_u32(0);
    extras.put_u32(DCP_OPEN_PRODUCER);
    Packet::request(CMD_DCP_OPEN_CONNECTION)
        .with_opaque(opaque)
        .with_extras(extras.freeze())
        .with_key(name.as_bytes().to_vec())
}

pub fn control_request(key: &str, value: &str, opaque: u32) -> Packet {
    Packet::request(CMD_DCP_CONTROL)
        .with_opaque(opaque)
        .with_key(key.as_bytes().to_vec())
        .with_value(value.as_bytes().to_vec())
}

/// DCP_STREAM_REQ for `vbucket` covering `start..=end`
pub fn stream_request(vbucket: u16, opaque: u32, start: u64, end: u64) -> Packet {
    let mut extras = BytesMut::with_capacity(48);
    extras.put_u32(0); // flags
    extras.put_u32(0); // reserved
    extras.put_u64(start);
    extras.put_u64(end);
    extras.put_u64(0); // vbucket uuid
    extras.put_u64(start);
    extras.put_u64(start);
    Packet::request(CMD_DCP_STREAM_REQ)
        .with_opaque(opaque)
        .with_vbucket(vbucket)
        .with_extras(extras.freeze())
}

/// SET/ADD/REPLACE style request with zero flags and expiry
pub fn store_request(opcode: u8, vbucket: u16, key: &str, value: &str, opaque: u32) -> Packet {
    Packet::request(opcode)
        .with_opaque(opaque)
        .with_vbucket(vbucket)
        .with_extras(vec![0u8; 8])
        .with_key(key.as_bytes().to_vec())
        .with_value(value.as_bytes().to_vec())
}

/// `count` distinct keys starting with `prefix` that hash to `vbucket`
pub fn keys_in_vbucket(prefix: &str, vbucket: u16, num_vbuckets: u16, count: usize) -> Vec<String> {
    (0u32..)
        .map(|i| format!("{}-{}", prefix, i))
        .filter(|key| vbucket_for_key(key.as_bytes(), num_vbuckets) == vbucket)
        .take(count)
        .collect()
}

/// First key starting with `prefix` that hashes to `vbucket`
pub fn key_in_vbucket(prefix: &str, vbucket: u16, num_vbuckets: u16) -> String {
    keys_in_vbucket(prefix, vbucket, num_vbuckets, 1).remove(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limited_writer_refuses_after_limit() {
        let writer = LimitedWriter::new(1);
        assert!(writer.write_packet(Packet::request(0x0a)).is_ok());
        assert!(matches!(
            writer.write_packet(Packet::request(0x0a)),
            Err(MemdError::TransportClosed)
        ));
        assert_eq!(writer.packets().len(), 1);
        assert_eq!(writer.attempts(), 2);
    }

    #[test]
    fn test_keys_in_vbucket_hash_to_target() {
        let keys = keys_in_vbucket("doc", 5, 8, 4);
        assert_eq!(keys.len(), 4);
        for key in &keys {
            assert_eq!(vbucket_for_key(key.as_bytes(), 8), 5);
        }
        assert_eq!(key_in_vbucket("doc", 5, 8), keys[0]);
    }

    #[test]
    fn test_stream_request_layout() {
        let pkt = stream_request(3, 7, 1, 9);
        assert_eq!(pkt.extras.len(), 48);
        assert_eq!(pkt.vbucket, 3);
        assert_eq!(&pkt.extras[8..16], &1u64.to_be_bytes());
        assert_eq!(&pkt.extras[16..24], &9u64.to_be_bytes());
    }
}
