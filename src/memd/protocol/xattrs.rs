//! Extended-attribute value framing
//!
//! When a document carries xattrs, the value on the wire is:
//!
//! ```text
//! [u32 total xattr bytes]
//!   repeated: [u32 chunk length] key \0 value \0
//! [document body]
//! ```
//!
//! and the frame's datatype must have `DATATYPE_XATTR` set.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::memd::error::{MemdError, Result};

/// Prefix `body` with the xattr block for `xattrs`
///
/// An empty map still produces a (zero length) block; callers decide whether
/// to use the framing at all.
pub fn encode_xattr_value(xattrs: &BTreeMap<String, Vec<u8>>, body: &[u8]) -> Bytes {
    let mut block = BytesMut::new();
    for (key, value) in xattrs {
        let chunk_len = key.len() + 1 + value.len() + 1;
        block.put_u32(chunk_len as u32);
        block.put_slice(key.as_bytes());
        block.put_u8(0);
        block.put_slice(value);
        block.put_u8(0);
    }

    let mut out = BytesMut::with_capacity(4 + block.len() + body.len());
    out.put_u32(block.len() as u32);
    out.put_slice(&block);
    out.put_slice(body);
    out.freeze()
}

/// Split an xattr-framed value back into its attribute map and body
pub fn decode_xattr_value(value: &[u8]) -> Result<(BTreeMap<String, Vec<u8>>, Bytes)> {
    let total = read_u32(value, 0)? as usize;
    let block_end = 4 + total;
    if block_end > value.len() {
        return Err(MemdError::InvalidFrame(format!(
            "xattr block length {} exceeds value length {}",
            total,
            value.len()
        )));
    }

    let mut xattrs = BTreeMap::new();
    let mut pos = 4;
    while pos < block_end {
        let chunk_len = read_u32(value, pos)? as usize;
        pos += 4;
        let chunk_end = pos + chunk_len;
        if chunk_end > block_end {
            return Err(MemdError::InvalidFrame(
                "xattr chunk overruns xattr block".to_string(),
            ));
        }
        let chunk = &value[pos..chunk_end];
        let (key, val) = split_chunk(chunk)?;
        xattrs.insert(key, val);
        pos = chunk_end;
    }

    Ok((xattrs, Bytes::copy_from_slice(&value[block_end..])))
}

fn read_u32(buf: &[u8], at: usize) -> Result<u32> {
    buf.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| MemdError::InvalidFrame("truncated xattr length".to_string()))
}

fn split_chunk(chunk: &[u8]) -> Result<(String, Vec<u8>)> {
    let key_end = chunk
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| MemdError::InvalidFrame("xattr key not terminated".to_string()))?;
    let rest = &chunk[key_end + 1..];
    match rest.split_last() {
        Some((0, val)) => {
            let key = String::from_utf8(chunk[..key_end].to_vec())
                .map_err(|_| MemdError::InvalidFrame("xattr key is not UTF-8".to_string()))?;
            Ok((key, val.to_vec()))
        }
        _ => Err(MemdError::InvalidFrame(
            "xattr value not terminated".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_xattr_layout() {
        let mut xattrs = BTreeMap::new();
        xattrs.insert("x".to_string(), b"1".to_vec());
        let value = encode_xattr_value(&xattrs, br#"{"a":1}"#);

        // chunk = "x\01\0" (4 bytes) + 4 byte length prefix
        assert_eq!(&value[0..4], &8u32.to_be_bytes());
        assert_eq!(&value[4..8], &4u32.to_be_bytes());
        assert_eq!(&value[8..12], b"x\x001\x00");
        assert_eq!(&value[12..], br#"{"a":1}"#);
    }

    #[test]
    fn test_decode_restores_map_and_body() {
        let mut xattrs = BTreeMap::new();
        xattrs.insert("_sync".to_string(), br#"{"rev":"1-a"}"#.to_vec());
        xattrs.insert("meta".to_string(), b"42".to_vec());
        let value = encode_xattr_value(&xattrs, b"body");

        let (decoded, body) = decode_xattr_value(&value).unwrap();
        assert_eq!(decoded, xattrs);
        assert_eq!(body.as_ref(), b"body");
    }

    #[test]
    fn test_decode_rejects_truncated_block() {
        let mut value = vec![];
        value.extend_from_slice(&100u32.to_be_bytes());
        value.extend_from_slice(b"short");
        assert!(decode_xattr_value(&value).is_err());
    }

    #[test]
    fn test_decode_rejects_unterminated_value() {
        let mut value = vec![];
        value.extend_from_slice(&7u32.to_be_bytes());
        value.extend_from_slice(&3u32.to_be_bytes());
        value.extend_from_slice(b"k\0v");
        assert!(decode_xattr_value(&value).is_err());
    }
}
