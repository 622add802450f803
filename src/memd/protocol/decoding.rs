// Frame decoding
//
// Splits complete frames off an inbound buffer. Two failure classes exist:
// - the header itself is unusable (oversized body): returned as Err, the
//   connection cannot resynchronize and must be closed;
// - the header is readable but the frame is nonsense (unknown magic,
//   section lengths overflowing the body): the whole frame is consumed and
//   surfaced as InboundFrame::Malformed so the caller can answer it and keep
//   serving.

use bytes::{Buf, Bytes, BytesMut};

use super::{Magic, Packet};
use crate::memd::constants::HEADER_LEN;
use crate::memd::error::{MemdError, Result};

/// Result of decoding one complete frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Well-formed frame
    Packet(Packet),
    /// Readable header, unusable frame; opcode/opaque let the caller answer it
    Malformed {
        opcode: u8,
        opaque: u32,
        reason: String,
    },
}

/// Decode one frame from the front of `src`
///
/// Returns `Ok(None)` when `src` does not yet hold a complete frame. On
/// success the frame's bytes are removed from `src`.
pub fn decode_frame(src: &mut BytesMut, max_body_len: usize) -> Result<Option<InboundFrame>> {
    if src.len() < HEADER_LEN {
        return Ok(None);
    }

    let body_len = u32::from_be_bytes([src[8], src[9], src[10], src[11]]) as usize;
    if body_len > max_body_len {
        return Err(MemdError::FrameTooLarge(body_len));
    }

    let frame_len = HEADER_LEN + body_len;
    if src.len() < frame_len {
        src.reserve(frame_len - src.len());
        return Ok(None);
    }

    let mut frame = src.split_to(frame_len).freeze();

    let magic_byte = frame.get_u8();
    let opcode = frame.get_u8();
    let len_hi = frame.get_u8();
    let len_lo = frame.get_u8();
    let extras_len = frame.get_u8() as usize;
    let datatype = frame.get_u8();
    let vb_or_status = frame.get_u16();
    let _body_len = frame.get_u32();
    let opaque = frame.get_u32();
    let cas = frame.get_u64();

    let magic = match Magic::from_byte(magic_byte) {
        Some(m) => m,
        None => {
            return Ok(Some(InboundFrame::Malformed {
                opcode,
                opaque,
                reason: format!("unknown magic 0x{:02x}", magic_byte),
            }))
        }
    };

    let (framing_len, key_len) = if magic.is_alt() {
        (len_hi as usize, len_lo as usize)
    } else {
        (0, u16::from_be_bytes([len_hi, len_lo]) as usize)
    };

    if framing_len + extras_len + key_len > body_len {
        return Ok(Some(InboundFrame::Malformed {
            opcode,
            opaque,
            reason: format!(
                "section lengths (framing {}, extras {}, key {}) exceed body length {}",
                framing_len, extras_len, key_len, body_len
            ),
        }));
    }

    let framing_extras = take(&mut frame, framing_len);
    let extras = take(&mut frame, extras_len);
    let key = take(&mut frame, key_len);
    let value = frame;

    let (vbucket, status) = if magic.is_response() {
        (0, vb_or_status)
    } else {
        (vb_or_status, 0)
    };

    Ok(Some(InboundFrame::Packet(Packet {
        magic,
        opcode,
        datatype,
        vbucket,
        status,
        opaque,
        cas,
        framing_extras,
        extras,
        key,
        value,
    })))
}

fn take(buf: &mut Bytes, len: usize) -> Bytes {
    buf.split_to(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memd::constants::MAX_BODY_LEN;
    use crate::memd::protocol::encode_packet;

    fn encode(pkt: &Packet) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_packet(pkt, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x80u8, 0x00, 0x00][..]);
        assert!(decode_frame(&mut buf, MAX_BODY_LEN).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_decode_waits_for_full_body() {
        let pkt = Packet::request(0x01).with_key("key").with_value("value");
        let full = encode(&pkt);
        let mut partial = BytesMut::from(&full[..full.len() - 2]);
        assert!(decode_frame(&mut partial, MAX_BODY_LEN).unwrap().is_none());
    }

    #[test]
    fn test_decode_request_sections() {
        let pkt = Packet::request(0x53)
            .with_vbucket(42)
            .with_opaque(9)
            .with_extras(vec![1u8; 48])
            .with_key("name")
            .with_value("body");
        let mut buf = encode(&pkt);
        match decode_frame(&mut buf, MAX_BODY_LEN).unwrap() {
            Some(InboundFrame::Packet(decoded)) => assert_eq!(decoded, pkt),
            other => panic!("unexpected {:?}", other),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_two_frames_back_to_back() {
        let a = Packet::request(0x0a).with_opaque(1);
        let b = Packet::request(0x0a).with_opaque(2);
        let mut buf = encode(&a);
        buf.extend_from_slice(&encode(&b));

        let first = decode_frame(&mut buf, MAX_BODY_LEN).unwrap();
        let second = decode_frame(&mut buf, MAX_BODY_LEN).unwrap();
        assert!(matches!(first, Some(InboundFrame::Packet(p)) if p.opaque == 1));
        assert!(matches!(second, Some(InboundFrame::Packet(p)) if p.opaque == 2));
    }

    #[test]
    fn test_decode_unknown_magic_is_malformed_and_consumed() {
        let pkt = Packet::request(0x00).with_opaque(33).with_key("k");
        let mut buf = encode(&pkt);
        buf[0] = 0x42;
        match decode_frame(&mut buf, MAX_BODY_LEN).unwrap() {
            Some(InboundFrame::Malformed { opcode, opaque, .. }) => {
                assert_eq!(opcode, 0x00);
                assert_eq!(opaque, 33);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_key_overflowing_body_is_malformed() {
        let pkt = Packet::request(0x00).with_key("abc");
        let mut buf = encode(&pkt);
        // claim a 200 byte key inside a 3 byte body
        buf[2] = 0x00;
        buf[3] = 200;
        assert!(matches!(
            decode_frame(&mut buf, MAX_BODY_LEN).unwrap(),
            Some(InboundFrame::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_oversized_body_is_fatal() {
        let mut buf = BytesMut::from(&[0u8; HEADER_LEN][..]);
        buf[0] = 0x80;
        buf[8..12].copy_from_slice(&1_000u32.to_be_bytes());
        assert!(matches!(
            decode_frame(&mut buf, 100),
            Err(MemdError::FrameTooLarge(1000))
        ));
    }

    #[test]
    fn test_decode_alt_request_framing_extras() {
        let mut pkt = Packet::request(0x01).with_key("doc").with_value("v");
        pkt.magic = Magic::AltRequest;
        pkt.framing_extras = Bytes::from_static(&[0x11, 0x02]);
        let mut buf = encode(&pkt);
        match decode_frame(&mut buf, MAX_BODY_LEN).unwrap() {
            Some(InboundFrame::Packet(decoded)) => {
                assert_eq!(decoded.framing_extras.as_ref(), &[0x11, 0x02]);
                assert_eq!(decoded.key.as_ref(), b"doc");
                assert_eq!(decoded.value.as_ref(), b"v");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_response_status() {
        let req = Packet::request(0x00).with_opaque(4);
        let resp = Packet::response_to(&req, 0x01);
        let mut buf = encode(&resp);
        match decode_frame(&mut buf, MAX_BODY_LEN).unwrap() {
            Some(InboundFrame::Packet(decoded)) => {
                assert_eq!(decoded.status, 0x01);
                assert_eq!(decoded.vbucket, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
