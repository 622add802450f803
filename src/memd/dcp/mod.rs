// DCP (change-stream) engine
//
// A DCP connection is a normal memd connection that sent DCP_OPEN_CONNECTION.
// After that the client asks for one vbucket at a time with DCP_STREAM_REQ
// and we push back, using request-magic frames tagged with the stream opaque:
//
//   snapshot marker -> mutation/deletion* -> stream end
//
// Replay is synchronous on the connection's reader task, so at most one
// stream is active per connection and it is always finished (or aborted)
// before the next request frame is read.
//
// State machine:
//
//   Closed --open--> Opened --stream req--> Streaming --end--> Ended
//                                                ^               |
//                                                +--stream req---+

pub mod frames;
pub mod replay;

use std::collections::HashMap;

use bytes::Buf;
use serde::Deserialize;

use super::constants::{DCP_OPEN_PRODUCER, DCP_STREAM_REQ_EXTRAS_LEN};
use super::error::{MemdError, Result};
use super::protocol::Packet;

pub use replay::{replay_stream, ReplaySummary};

/// Where a connection is in the DCP lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DcpState {
    /// DCP_OPEN_CONNECTION not received yet
    #[default]
    Closed,
    /// Open, no stream requested yet
    Opened,
    /// Replaying one vbucket
    Streaming {
        vbucket: u16,
        opaque: u32,
        end_seqno: u64,
    },
    /// Last stream finished; new stream requests are accepted
    Ended,
}

/// Per-connection DCP state
#[derive(Debug, Default)]
pub struct DcpConnection {
    state: DcpState,
    name: Option<String>,
    flags: u32,
    controls: HashMap<String, String>,
}

impl DcpConnection {
    pub fn state(&self) -> DcpState {
        self.state
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Whether the client opened us as a producer (it consumes)
    pub fn is_producer(&self) -> bool {
        self.flags & DCP_OPEN_PRODUCER != 0
    }

    /// Record DCP_OPEN_CONNECTION
    ///
    /// Re-opening an open connection resets it.
    pub fn open(&mut self, name: String, flags: u32) {
        self.name = Some(name);
        self.flags = flags;
        self.controls.clear();
        self.state = DcpState::Opened;
    }

    /// Record a DCP_CONTROL key/value pair
    pub fn set_control(&mut self, key: String, value: String) {
        self.controls.insert(key, value);
    }

    pub fn control(&self, key: &str) -> Option<&str> {
        self.controls.get(key).map(String::as_str)
    }

    /// Stream requests are only valid between streams
    pub fn can_stream(&self) -> bool {
        matches!(self.state, DcpState::Opened | DcpState::Ended)
    }

    pub fn begin_stream(&mut self, vbucket: u16, opaque: u32, end_seqno: u64) {
        self.state = DcpState::Streaming {
            vbucket,
            opaque,
            end_seqno,
        };
    }

    pub fn end_stream(&mut self) {
        if matches!(self.state, DcpState::Streaming { .. }) {
            self.state = DcpState::Ended;
        }
    }
}

/// Decoded DCP_STREAM_REQ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub vbucket: u16,
    pub opaque: u32,
    pub flags: u32,
    pub start_seqno: u64,
    pub end_seqno: u64,
    pub vbucket_uuid: u64,
    pub snap_start_seqno: u64,
    pub snap_end_seqno: u64,
}

impl StreamRequest {
    /// Parse and validate the 48 byte stream request extras
    ///
    /// # Errors
    /// * `InvalidArguments` if the extras are not exactly 48 bytes
    /// * `InvalidRange` if start_seqno > end_seqno
    pub fn parse(packet: &Packet) -> Result<Self> {
        if packet.extras.len() != DCP_STREAM_REQ_EXTRAS_LEN {
            return Err(MemdError::invalid_args(format!(
                "stream request extras must be {} bytes, got {}",
                DCP_STREAM_REQ_EXTRAS_LEN,
                packet.extras.len()
            )));
        }

        let mut extras = packet.extras.clone();
        let flags = extras.get_u32();
        let _reserved = extras.get_u32();
        let req = Self {
            vbucket: packet.vbucket,
            opaque: packet.opaque,
            flags,
            start_seqno: extras.get_u64(),
            end_seqno: extras.get_u64(),
            vbucket_uuid: extras.get_u64(),
            snap_start_seqno: extras.get_u64(),
            snap_end_seqno: extras.get_u64(),
        };

        if req.start_seqno > req.end_seqno {
            return Err(MemdError::InvalidRange {
                start: req.start_seqno,
                end: req.end_seqno,
            });
        }
        Ok(req)
    }
}

/// How the snapshot marker of a stream reports its bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotBounds {
    /// Start at the client's requested snapshot start
    #[default]
    Requested,
    /// Always start the snapshot at 0
    ZeroStart,
}

impl SnapshotBounds {
    /// (start, end) advertised in the snapshot marker of `req`
    ///
    /// The end is the requested end seqno clamped to `high_seqno`, so an
    /// open-ended request (`end_seqno = u64::MAX`) advertises what the
    /// vbucket actually holds. It never drops below the start.
    pub fn for_request(&self, req: &StreamRequest, high_seqno: u64) -> (u64, u64) {
        let start = match self {
            SnapshotBounds::Requested => req.snap_start_seqno,
            SnapshotBounds::ZeroStart => 0,
        };
        let end = req.end_seqno.min(high_seqno).max(start);
        (start, end)
    }
}
