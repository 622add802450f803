// Key/value handlers
//
// GET / GET_REPLICA / SET / ADD / REPLACE / DELETE against the selected
// bucket. Each command first checks that this node holds the addressed
// vbucket in the role the command needs (primary for reads and writes,
// replica for GET_REPLICA) and that the key hashes to that vbucket, and
// answers NOT_MY_VBUCKET otherwise.

use std::collections::BTreeMap;
use std::time::Instant;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::helpers::{
    check_key_vbucket, check_vbucket_owner, error_response, require_bucket, VbucketRole,
};
use crate::memd::bucket::Bucket;
use crate::memd::constants::{
    CMD_ADD, CMD_DELETE, CMD_GET, CMD_GET_REPLICA, CMD_REPLACE, CMD_SET, DATATYPE_XATTR,
    FEATURE_MUTATION_SEQNO,
};
use crate::memd::dispatch::{dispatch_response, HandlerRegistry};
use crate::memd::error::{MemdError, Result};
use crate::memd::protocol::xattrs::decode_xattr_value;
use crate::memd::protocol::Packet;
use crate::memd::session::ClientSession;
use crate::memd::storage::{Document, DocumentWrite, WriteMode};

/// Extras of a store command: flags u32, expiry u32
const STORE_EXTRAS_LEN: usize = 8;

pub fn register(registry: &mut HandlerRegistry) {
    registry.register(CMD_GET, handle_get);
    registry.register(CMD_GET_REPLICA, handle_get_replica);
    registry.register(CMD_SET, handle_set);
    registry.register(CMD_ADD, handle_add);
    registry.register(CMD_REPLACE, handle_replace);
    registry.register(CMD_DELETE, handle_delete);
}

pub fn handle_get(session: &mut ClientSession, req: &Packet, start: Instant) {
    read_document("Get", session, req, start, VbucketRole::Primary);
}

pub fn handle_get_replica(session: &mut ClientSession, req: &Packet, start: Instant) {
    read_document("GetReplica", session, req, start, VbucketRole::Replica);
}

pub fn handle_set(session: &mut ClientSession, req: &Packet, start: Instant) {
    store_document("Set", session, req, start, WriteMode::Upsert);
}

pub fn handle_add(session: &mut ClientSession, req: &Packet, start: Instant) {
    store_document("Add", session, req, start, WriteMode::Insert);
}

pub fn handle_replace(session: &mut ClientSession, req: &Packet, start: Instant) {
    store_document("Replace", session, req, start, WriteMode::Replace);
}

pub fn handle_delete(session: &mut ClientSession, req: &Packet, start: Instant) {
    let session = &*session;
    dispatch_response(
        "Delete",
        session.writer(),
        start,
        || {
            let bucket = require_bucket(session)?;
            check_vbucket_owner(session, &bucket, req.vbucket, VbucketRole::Primary)?;
            check_key_vbucket(&bucket, &req.key, req.vbucket)?;

            let vbucket = bucket.store().vbucket(req.vbucket)?;
            let tombstone = vbucket.delete(&req.key, req.cas)?;
            Ok(mutation_response(session, &bucket, req, &tombstone))
        },
        |e| error_response(session, req, e),
    );
}

fn read_document(
    name: &str,
    session: &ClientSession,
    req: &Packet,
    start: Instant,
    role: VbucketRole,
) {
    dispatch_response(
        name,
        session.writer(),
        start,
        || {
            let bucket = require_bucket(session)?;
            check_vbucket_owner(session, &bucket, req.vbucket, role)?;
            check_key_vbucket(&bucket, &req.key, req.vbucket)?;

            let vbucket = bucket.store().vbucket(req.vbucket)?;
            let doc = vbucket.get(&req.key)?.ok_or(MemdError::KeyNotFound)?;

            let mut extras = BytesMut::with_capacity(4);
            extras.put_u32(doc.flags);
            Ok(Packet::success_for(req)
                .with_cas(doc.cas)
                .with_datatype(doc.datatype)
                .with_extras(extras.freeze())
                .with_value(Bytes::from(doc.value)))
        },
        |e| error_response(session, req, e),
    );
}

fn store_document(
    name: &str,
    session: &ClientSession,
    req: &Packet,
    start: Instant,
    mode: WriteMode,
) {
    dispatch_response(
        name,
        session.writer(),
        start,
        || {
            let bucket = require_bucket(session)?;
            check_vbucket_owner(session, &bucket, req.vbucket, VbucketRole::Primary)?;
            check_key_vbucket(&bucket, &req.key, req.vbucket)?;

            let write = parse_store_request(req, mode)?;
            let vbucket = bucket.store().vbucket(req.vbucket)?;
            let stored = vbucket.write(write)?;
            Ok(mutation_response(session, &bucket, req, &stored))
        },
        |e| error_response(session, req, e),
    );
}

fn parse_store_request(req: &Packet, mode: WriteMode) -> Result<DocumentWrite> {
    if req.extras.len() != STORE_EXTRAS_LEN {
        return Err(MemdError::invalid_args(format!(
            "store extras must be {} bytes, got {}",
            STORE_EXTRAS_LEN,
            req.extras.len()
        )));
    }
    if req.key.is_empty() {
        return Err(MemdError::invalid_args("empty key"));
    }

    let mut extras = req.extras.clone();
    let flags = extras.get_u32();
    let expiry = extras.get_u32();

    let (xattrs, value) = if req.datatype & DATATYPE_XATTR != 0 {
        decode_xattr_value(&req.value)?
    } else {
        (BTreeMap::new(), req.value.clone())
    };

    Ok(DocumentWrite {
        key: req.key.to_vec(),
        value: value.to_vec(),
        xattrs,
        flags,
        datatype: req.datatype & !DATATYPE_XATTR,
        expiry,
        cas: req.cas,
        mode,
    })
}

/// Success response of a mutation; carries `(vbucket uuid, seqno)` extras
/// when the client negotiated mutation seqnos
fn mutation_response(
    session: &ClientSession,
    bucket: &Bucket,
    req: &Packet,
    doc: &Document,
) -> Packet {
    let response = Packet::success_for(req).with_cas(doc.cas);
    if !session.has_feature(FEATURE_MUTATION_SEQNO) {
        return response;
    }

    let mut extras = BytesMut::with_capacity(16);
    extras.put_u64(bucket.vbucket_uuid(doc.vbucket).unwrap_or_default());
    extras.put_u64(doc.seqno);
    response.with_extras(extras.freeze())
}
