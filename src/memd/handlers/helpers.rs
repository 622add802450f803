// Handler helper functions
//
// Common checks shared by the KV and DCP handlers: bucket selection,
// vbucket ownership, key placement and error response construction.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::memd::bucket::{Bucket, BucketType};
use crate::memd::constants::DATATYPE_JSON;
use crate::memd::error::{MemdError, Result};
use crate::memd::protocol::Packet;
use crate::memd::session::ClientSession;

/// Role a node must hold for a vbucket to serve a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VbucketRole {
    /// Slot 0
    Primary,
    /// Any slot > 0
    Replica,
    /// Any slot
    Any,
}

/// The bucket selected on this connection
pub fn require_bucket(session: &ClientSession) -> Result<Arc<Bucket>> {
    session.selected_bucket().cloned().ok_or(MemdError::NoBucket)
}

/// The selected bucket, which must be a Couchbase bucket
pub fn require_couchbase_bucket(session: &ClientSession, command: &str) -> Result<Arc<Bucket>> {
    let bucket = require_bucket(session)?;
    if bucket.bucket_type() != BucketType::Couchbase {
        return Err(MemdError::NotSupported(format!(
            "{} requires a couchbase bucket",
            command
        )));
    }
    Ok(bucket)
}

/// Verify this session's node holds `vbucket` of `bucket` in `role`
pub fn check_vbucket_owner(
    session: &ClientSession,
    bucket: &Bucket,
    vbucket: u16,
    role: VbucketRole,
) -> Result<()> {
    let ownership = bucket.vbucket_ownership(session.node());
    let slot = ownership
        .get(vbucket as usize)
        .copied()
        .ok_or(MemdError::NotMyVbucket(vbucket))?;

    let owns = match role {
        VbucketRole::Primary => slot == 0,
        VbucketRole::Replica => slot > 0,
        VbucketRole::Any => slot >= 0,
    };
    if owns {
        Ok(())
    } else {
        Err(MemdError::NotMyVbucket(vbucket))
    }
}

/// Verify `key` hashes to `vbucket`; a document only ever lives in the
/// vbucket its key hashes to
pub fn check_key_vbucket(bucket: &Bucket, key: &[u8], vbucket: u16) -> Result<()> {
    let expected = bucket.vbucket_for_key(key);
    if expected == vbucket {
        return Ok(());
    }
    debug!(
        "Key '{}' belongs to vbucket {}, request addressed vbucket {}",
        String::from_utf8_lossy(key),
        expected,
        vbucket
    );
    Err(MemdError::NotMyVbucket(vbucket))
}

/// Error response for `request`
///
/// NOT_MY_VBUCKET responses carry the current bucket config so the client
/// can refresh its map without another round trip.
pub fn error_response(session: &ClientSession, request: &Packet, err: &MemdError) -> Packet {
    let response = Packet::response_to(request, err.to_status_code());
    if !matches!(err, MemdError::NotMyVbucket(_)) {
        return response;
    }

    let Some(bucket) = session.selected_bucket() else {
        return response;
    };
    let config = bucket.config_json(session.node(), session.context().cluster.nodes());
    match serde_json::to_vec(&config) {
        Ok(body) => response
            .with_datatype(DATATYPE_JSON)
            .with_value(Bytes::from(body)),
        Err(e) => {
            warn!("Failed to serialize bucket config: {}", e);
            response
        }
    }
}

/// Serialize a JSON payload into a success response for `request`
pub fn json_response(request: &Packet, payload: &serde_json::Value) -> Result<Packet> {
    let body = serde_json::to_vec(payload)?;
    Ok(Packet::success_for(request)
        .with_datatype(DATATYPE_JSON)
        .with_value(Bytes::from(body)))
}
