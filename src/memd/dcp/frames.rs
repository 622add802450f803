//! Builders for the frames a DCP producer pushes
//!
//! All push frames use request magic and carry the opaque of the stream
//! request they belong to.

use bytes::{BufMut, Bytes, BytesMut};

use crate::memd::constants::{
    CMD_DCP_DELETION, CMD_DCP_MUTATION, CMD_DCP_SNAPSHOT_MARKER, CMD_DCP_STREAM_END,
    DATATYPE_XATTR, DCP_DELETION_EXTRAS_LEN, DCP_MUTATION_EXTRAS_LEN,
    DCP_SNAPSHOT_MARKER_EXTRAS_LEN, DCP_SNAPSHOT_MEMORY, DCP_STREAM_END_EXTRAS_LEN,
};
use crate::memd::protocol::xattrs::encode_xattr_value;
use crate::memd::protocol::Packet;
use crate::memd::storage::Document;

pub fn snapshot_marker(vbucket: u16, opaque: u32, start_seqno: u64, end_seqno: u64) -> Packet {
    let mut extras = BytesMut::with_capacity(DCP_SNAPSHOT_MARKER_EXTRAS_LEN);
    extras.put_u64(start_seqno);
    extras.put_u64(end_seqno);
    extras.put_u32(DCP_SNAPSHOT_MEMORY);

    Packet::request(CMD_DCP_SNAPSHOT_MARKER)
        .with_vbucket(vbucket)
        .with_opaque(opaque)
        .with_extras(extras.freeze())
}

/// Mutation frame for a live document
///
/// Documents with xattrs get the xattr value framing and the XATTR datatype bit.
pub fn mutation(opaque: u32, doc: &Document) -> Packet {
    let mut extras = BytesMut::with_capacity(DCP_MUTATION_EXTRAS_LEN);
    extras.put_u64(doc.seqno);
    extras.put_u64(doc.rev_seqno);
    extras.put_u32(doc.flags);
    extras.put_u32(doc.expiry);
    extras.put_u32(0); // lock time

    let (datatype, value) = if doc.xattrs.is_empty() {
        (doc.datatype, Bytes::copy_from_slice(&doc.value))
    } else {
        (
            doc.datatype | DATATYPE_XATTR,
            encode_xattr_value(&doc.xattrs, &doc.value),
        )
    };

    Packet::request(CMD_DCP_MUTATION)
        .with_vbucket(doc.vbucket)
        .with_opaque(opaque)
        .with_cas(doc.cas)
        .with_datatype(datatype)
        .with_extras(extras.freeze())
        .with_key(Bytes::copy_from_slice(&doc.key))
        .with_value(value)
}

/// Deletion frame for a tombstone
pub fn deletion(opaque: u32, doc: &Document) -> Packet {
    let mut extras = BytesMut::with_capacity(DCP_DELETION_EXTRAS_LEN);
    extras.put_u64(doc.seqno);
    extras.put_u64(doc.rev_seqno);
    extras.put_u16(0); // extended meta length

    Packet::request(CMD_DCP_DELETION)
        .with_vbucket(doc.vbucket)
        .with_opaque(opaque)
        .with_cas(doc.cas)
        .with_extras(extras.freeze())
        .with_key(Bytes::copy_from_slice(&doc.key))
}

pub fn stream_end(vbucket: u16, opaque: u32, flags: u32) -> Packet {
    let mut extras = BytesMut::with_capacity(DCP_STREAM_END_EXTRAS_LEN);
    extras.put_u32(flags);

    Packet::request(CMD_DCP_STREAM_END)
        .with_vbucket(vbucket)
        .with_opaque(opaque)
        .with_extras(extras.freeze())
}

/// Failover log as carried in stream request and GET_FAILOVER_LOG responses:
/// repeated `(vbucket uuid u64, seqno u64)`
pub fn failover_log_value(entries: &[(u64, u64)]) -> Bytes {
    let mut value = BytesMut::with_capacity(entries.len() * 16);
    for (uuid, seqno) in entries {
        value.put_u64(*uuid);
        value.put_u64(*seqno);
    }
    value.freeze()
}
