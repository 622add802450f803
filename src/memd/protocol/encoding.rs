// Frame encoding
//
// Serializes a Packet into the binary wire format. Lengths are validated
// against the header field widths before anything is written, so a failed
// encode leaves the destination buffer untouched.

use bytes::{BufMut, BytesMut};

use super::Packet;
use crate::memd::constants::HEADER_LEN;
use crate::memd::error::{MemdError, Result};

/// Encode a packet (header + body) onto the end of `dst`
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) -> Result<()> {
    let alt = packet.magic.is_alt();

    if packet.extras.len() > u8::MAX as usize {
        return Err(MemdError::InvalidFrame(format!(
            "extras length {} exceeds 255",
            packet.extras.len()
        )));
    }
    let max_key = if alt {
        u8::MAX as usize
    } else {
        u16::MAX as usize
    };
    if packet.key.len() > max_key {
        return Err(MemdError::InvalidFrame(format!(
            "key length {} exceeds {}",
            packet.key.len(),
            max_key
        )));
    }
    if !alt && !packet.framing_extras.is_empty() {
        return Err(MemdError::InvalidFrame(
            "framing extras require an alt magic".to_string(),
        ));
    }
    if packet.framing_extras.len() > u8::MAX as usize {
        return Err(MemdError::InvalidFrame(format!(
            "framing extras length {} exceeds 255",
            packet.framing_extras.len()
        )));
    }
    let body_len = packet.body_len();
    if body_len > u32::MAX as usize {
        return Err(MemdError::FrameTooLarge(body_len));
    }

    dst.reserve(HEADER_LEN + body_len);
    dst.put_u8(packet.magic.as_byte());
    dst.put_u8(packet.opcode);
    if alt {
        dst.put_u8(packet.framing_extras.len() as u8);
        dst.put_u8(packet.key.len() as u8);
    } else {
        dst.put_u16(packet.key.len() as u16);
    }
    dst.put_u8(packet.extras.len() as u8);
    dst.put_u8(packet.datatype);
    if packet.magic.is_response() {
        dst.put_u16(packet.status);
    } else {
        dst.put_u16(packet.vbucket);
    }
    dst.put_u32(body_len as u32);
    dst.put_u32(packet.opaque);
    dst.put_u64(packet.cas);

    dst.put_slice(&packet.framing_extras);
    dst.put_slice(&packet.extras);
    dst.put_slice(&packet.key);
    dst.put_slice(&packet.value);

    Ok(())
}
