// Memd binary protocol framing
//
// This module handles the memcached binary wire format:
// [24 bytes: Header] [framing extras] [extras] [key] [value]
//
// Header layout (big-endian):
//   0      magic
//   1      opcode
//   2..4   key length            (alt frames: 2 = framing extras len, 3 = key len)
//   4      extras length
//   5      datatype
//   6..8   vbucket (requests) / status (responses)
//   8..12  total body length
//   12..16 opaque
//   16..24 cas
//
// Decoding and encoding are plain functions over BytesMut; codec.rs wraps them
// for tokio_util::codec::Framed sockets.

pub mod codec;
pub mod decoding;
pub mod encoding;
pub mod xattrs;

use bytes::Bytes;

use super::constants::{
    MAGIC_ALT_REQUEST, MAGIC_ALT_RESPONSE, MAGIC_REQUEST, MAGIC_RESPONSE, STATUS_SUCCESS,
};

pub use codec::MemdCodec;
pub use decoding::{decode_frame, InboundFrame};
pub use encoding::encode_packet;

/// Frame direction discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Magic {
    #[default]
    Request,
    Response,
    AltRequest,
    AltResponse,
}

impl Magic {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            MAGIC_REQUEST => Some(Self::Request),
            MAGIC_RESPONSE => Some(Self::Response),
            MAGIC_ALT_REQUEST => Some(Self::AltRequest),
            MAGIC_ALT_RESPONSE => Some(Self::AltResponse),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Request => MAGIC_REQUEST,
            Self::Response => MAGIC_RESPONSE,
            Self::AltRequest => MAGIC_ALT_REQUEST,
            Self::AltResponse => MAGIC_ALT_RESPONSE,
        }
    }

    /// Alt frames carry a framing-extras section and a one byte key length
    pub fn is_alt(self) -> bool {
        matches!(self, Self::AltRequest | Self::AltResponse)
    }

    /// Responses carry a status in bytes 6..8 instead of a vbucket
    pub fn is_response(self) -> bool {
        matches!(self, Self::Response | Self::AltResponse)
    }
}

/// One decoded frame
///
/// `vbucket` is meaningful for request-direction frames and `status` for
/// response-direction frames; the other field is zero on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    pub magic: Magic,
    pub opcode: u8,
    pub datatype: u8,
    pub vbucket: u16,
    pub status: u16,
    pub opaque: u32,
    pub cas: u64,
    pub framing_extras: Bytes,
    pub extras: Bytes,
    pub key: Bytes,
    pub value: Bytes,
}

impl Packet {
    /// Request-direction frame, used for client requests in tests and for
    /// server-initiated DCP pushes
    pub fn request(opcode: u8) -> Self {
        Self {
            magic: Magic::Request,
            opcode,
            ..Default::default()
        }
    }

    /// Response correlated to `request` (same opcode and opaque)
    pub fn response_to(request: &Packet, status: u16) -> Self {
        Self {
            magic: Magic::Response,
            opcode: request.opcode,
            status,
            opaque: request.opaque,
            ..Default::default()
        }
    }

    /// Success response correlated to `request`
    pub fn success_for(request: &Packet) -> Self {
        Self::response_to(request, STATUS_SUCCESS)
    }

    pub fn with_opaque(mut self, opaque: u32) -> Self {
        self.opaque = opaque;
        self
    }

    pub fn with_vbucket(mut self, vbucket: u16) -> Self {
        self.vbucket = vbucket;
        self
    }

    pub fn with_datatype(mut self, datatype: u8) -> Self {
        self.datatype = datatype;
        self
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn with_extras(mut self, extras: impl Into<Bytes>) -> Self {
        self.extras = extras.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = value.into();
        self
    }

    /// Body length as written in the header
    pub fn body_len(&self) -> usize {
        self.framing_extras.len() + self.extras.len() + self.key.len() + self.value.len()
    }
}
