// Memcached binary protocol / DCP mock server
//
// This module contains everything the simulated cluster is made of:
// - Binary protocol framing (24-byte header, alt magic, xattr blocks)
// - Cluster model: nodes, buckets, vbucket topology and document storage
// - Handler registry and the command handlers
// - DCP engine: stream request parsing and replay
// - TCP listener serving one simulated node
//
// Architecture Overview:
// =====================
//
// Every node gets its own listener. Each accepted connection is served by
// two tasks:
//
//   socket → [reader: decode, dispatch to handler] → session writer
//          → [outbound channel] → [writer task] → socket
//
// Handlers run synchronously on the reader, one frame at a time, so a
// connection's responses and DCP pushes leave in the order they were
// produced. State shared between connections (buckets, vbucket maps,
// documents) lives behind Arc and is safe to read from any connection while
// the topology is being replaced.

pub mod bucket;
pub mod cluster;
pub mod constants;
pub mod dcp;
pub mod dispatch;
pub mod error;
pub mod handler_context;
pub mod handlers;
pub mod listener;
pub mod partitioner;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod topology;

// Re-export commonly used types for convenience
pub use bucket::{Bucket, BucketType, NewBucketOptions};
pub use cluster::Cluster;
pub use dispatch::HandlerRegistry;
pub use error::{MemdError, Result};
pub use handlers::{default_registry, register_all};
pub use listener::run as run_listener;
pub use protocol::{InboundFrame, MemdCodec, Packet};
pub use session::{ClientSession, PacketWriter};
pub use topology::{ClusterNode, Topology};
