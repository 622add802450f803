//! tokio_util codec adapter
//!
//! Lets the listener wrap a socket in `Framed<TcpStream, MemdCodec>` and
//! split it into a frame stream and a packet sink.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::decoding::{decode_frame, InboundFrame};
use super::encoding::encode_packet;
use super::Packet;
use crate::memd::constants::MAX_BODY_LEN;
use crate::memd::error::MemdError;

#[derive(Debug, Clone, Copy)]
pub struct MemdCodec {
    max_body_len: usize,
}

impl MemdCodec {
    pub fn new(max_body_len: usize) -> Self {
        Self { max_body_len }
    }
}

impl Default for MemdCodec {
    fn default() -> Self {
        Self::new(MAX_BODY_LEN)
    }
}

impl Decoder for MemdCodec {
    type Item = InboundFrame;
    type Error = MemdError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, self.max_body_len)
    }
}

impl Encoder<Packet> for MemdCodec {
    type Error = MemdError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_packet(&item, dst)
    }
}
