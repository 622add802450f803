// Test helpers for integration tests
//
// A small memd client over a real TCP connection, plus builders for the
// requests the tests send. Included by the other test files with
// `mod helpers;`.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use memd_mock::config::{ClusterConfig, Config};
use memd_mock::memd::constants::*;
use memd_mock::memd::partitioner::vbucket_for_key;
use memd_mock::memd::protocol::{InboundFrame, MemdCodec, Packet};

/// How long a test waits for any single frame
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Config for an in-process cluster: ephemeral ports, 8 vbuckets
pub fn test_config(num_nodes: usize) -> Config {
    Config {
        cluster: ClusterConfig {
            num_nodes,
            host: TEST_HOST.to_string(),
            base_port: 0,
            num_vbuckets: 8,
        },
        shutdown_timeout_ms: 1000,
        ..Default::default()
    }
}

/// `count` distinct keys that hash to `vbucket` of a `test_config` bucket
pub fn keys_in_vbucket(vbucket: u16, count: usize) -> Vec<String> {
    (0u32..)
        .map(|i| format!("key-{}", i))
        .filter(|key| vbucket_for_key(key.as_bytes(), 8) == vbucket)
        .take(count)
        .collect()
}

pub struct TestClient {
    framed: Framed<TcpStream, MemdCodec>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to mock node");
        Self {
            framed: Framed::new(stream, MemdCodec::default()),
        }
    }

    pub async fn send(&mut self, packet: Packet) {
        self.framed.send(packet).await.expect("send packet");
    }

    /// Write raw bytes, bypassing the codec
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.framed
            .get_mut()
            .write_all(bytes)
            .await
            .expect("send raw bytes");
    }

    /// Next frame, or None once the server closed the connection
    pub async fn recv(&mut self) -> Option<Packet> {
        let next = tokio::time::timeout(RECV_TIMEOUT, self.framed.next())
            .await
            .expect("timed out waiting for a frame");
        match next {
            Some(Ok(InboundFrame::Packet(packet))) => Some(packet),
            Some(Ok(InboundFrame::Malformed { reason, .. })) => {
                panic!("server sent a malformed frame: {}", reason)
            }
            Some(Err(_)) | None => None,
        }
    }

    /// Send `packet` and wait for its response
    pub async fn request(&mut self, packet: Packet) -> Packet {
        self.send(packet).await;
        self.recv().await.expect("connection closed before response")
    }

    /// SASL PLAIN with the default credentials, then SELECT_BUCKET
    pub async fn login(&mut self, bucket: &str) {
        let mut creds = Vec::new();
        creds.push(0);
        creds.extend_from_slice(DEFAULT_USERNAME.as_bytes());
        creds.push(0);
        creds.extend_from_slice(DEFAULT_PASSWORD.as_bytes());
        let auth = self
            .request(
                Packet::request(CMD_SASL_AUTH)
                    .with_key(SASL_MECH_PLAIN)
                    .with_value(creds),
            )
            .await;
        assert_eq!(auth.status, STATUS_SUCCESS, "SASL auth failed");

        let select = self
            .request(Packet::request(CMD_SELECT_BUCKET).with_key(bucket.as_bytes().to_vec()))
            .await;
        assert_eq!(select.status, STATUS_SUCCESS, "select bucket failed");
    }

    /// Collect frames until a STREAM_END (or an error response) for `opaque`
    pub async fn recv_stream(&mut self, opaque: u32) -> Vec<Packet> {
        let mut frames = Vec::new();
        while let Some(packet) = self.recv().await {
            assert_eq!(packet.opaque, opaque);
            let done = packet.opcode == CMD_DCP_STREAM_END
                || (packet.opcode == CMD_DCP_STREAM_REQ && packet.status != STATUS_SUCCESS);
            frames.push(packet);
            if done {
                break;
            }
        }
        frames
    }
}

pub fn set_request(vbucket: u16, key: &str, value: &str, opaque: u32) -> Packet {
    Packet::request(CMD_SET)
        .with_opaque(opaque)
        .with_vbucket(vbucket)
        .with_extras(vec![0u8; 8])
        .with_key(key.as_bytes().to_vec())
        .with_value(value.as_bytes().to_vec())
}

pub fn open_request(name: &str, opaque: u32) -> Packet {
    let mut extras = BytesMut::with_capacity(8);
    extras.put_u32(0);
    extras.put_u32(DCP_OPEN_PRODUCER);
    Packet::request(CMD_DCP_OPEN_CONNECTION)
        .with_opaque(opaque)
        .with_extras(extras.freeze())
        .with_key(name.as_bytes().to_vec())
}

pub fn stream_request(vbucket: u16, opaque: u32, start: u64, end: u64) -> Packet {
    let mut extras = BytesMut::with_capacity(48);
    extras.put_u32(0);
    extras.put_u32(0);
    extras.put_u64(start);
    extras.put_u64(end);
    extras.put_u64(0);
    extras.put_u64(start);
    extras.put_u64(start);
    Packet::request(CMD_DCP_STREAM_REQ)
        .with_opaque(opaque)
        .with_vbucket(vbucket)
        .with_extras(extras.freeze())
}
