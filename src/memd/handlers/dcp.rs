// DCP handlers
//
// Request/response side of the change-stream protocol. The push side
// (snapshot markers, mutations, stream ends) lives in memd::dcp.

use std::sync::Arc;
use std::time::Instant;

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, info};

use super::helpers::{
    check_vbucket_owner, error_response, require_couchbase_bucket, VbucketRole,
};
use crate::memd::constants::{
    CMD_DCP_CLOSE_STREAM, CMD_DCP_CONTROL, CMD_DCP_GET_FAILOVER_LOG, CMD_DCP_OPEN_CONNECTION,
    CMD_DCP_STREAM_REQ, CMD_GET_ALL_VB_SEQNOS, STATUS_KEY_ENOENT,
};
use crate::memd::dcp::frames::failover_log_value;
use crate::memd::dcp::{replay_stream, StreamRequest};
use crate::memd::dispatch::{dispatch_infallible, dispatch_response, HandlerRegistry};
use crate::memd::error::{MemdError, Result};
use crate::memd::protocol::Packet;
use crate::memd::session::ClientSession;
use crate::memd::storage::VbucketStore;

/// Extras of DCP_OPEN_CONNECTION: seqno u32, flags u32
const OPEN_EXTRAS_LEN: usize = 8;

pub fn register(registry: &mut HandlerRegistry) {
    registry.register(CMD_DCP_OPEN_CONNECTION, handle_open_connection);
    registry.register(CMD_DCP_CONTROL, handle_control);
    registry.register(CMD_DCP_STREAM_REQ, handle_stream_request);
    registry.register(CMD_DCP_CLOSE_STREAM, handle_close_stream);
    registry.register(CMD_DCP_GET_FAILOVER_LOG, handle_get_failover_log);
    registry.register(CMD_GET_ALL_VB_SEQNOS, handle_get_all_vb_seqnos);
}

/// DCP_OPEN_CONNECTION: key is the connection name
pub fn handle_open_connection(session: &mut ClientSession, req: &Packet, start: Instant) {
    let writer = session.writer();
    dispatch_response(
        "DcpOpenConnection",
        writer,
        start,
        || {
            if req.extras.len() != OPEN_EXTRAS_LEN {
                return Err(MemdError::invalid_args(format!(
                    "open connection extras must be {} bytes, got {}",
                    OPEN_EXTRAS_LEN,
                    req.extras.len()
                )));
            }
            let mut extras = req.extras.clone();
            let _seqno = extras.get_u32();
            let flags = extras.get_u32();

            let name = String::from_utf8_lossy(&req.key).into_owned();
            info!(
                "DCP connection '{}' opened on session {} (flags 0x{:x})",
                name,
                session.id(),
                flags
            );
            session.dcp_mut().open(name, flags);
            Ok(Packet::success_for(req))
        },
        |e| Packet::response_to(req, e.to_status_code()),
    );
}

/// DCP_CONTROL: key/value toggle, accepted in any state
pub fn handle_control(session: &mut ClientSession, req: &Packet, start: Instant) {
    let key = String::from_utf8_lossy(&req.key).into_owned();
    let value = String::from_utf8_lossy(&req.value).into_owned();
    debug!("DCP control on session {}: {}={}", session.id(), key, value);
    session.dcp_mut().set_control(key, value);

    dispatch_infallible("DcpControl", session.writer(), start, || {
        Packet::success_for(req)
    });
}

/// DCP_STREAM_REQ: acknowledge, then replay the vbucket synchronously
pub fn handle_stream_request(session: &mut ClientSession, req: &Packet, start: Instant) {
    let mut accepted: Option<(StreamRequest, Arc<dyn VbucketStore>)> = None;

    {
        let session = &*session;
        dispatch_response(
            "DcpStreamReq",
            session.writer(),
            start,
            || {
                let (stream, vbucket, failover_log) = prepare_stream(session, req)?;
                accepted = Some((stream, vbucket));
                Ok(Packet::success_for(req).with_value(failover_log_value(&failover_log)))
            },
            |e| error_response(session, req, e),
        );
    }

    let Some((stream, vbucket)) = accepted else {
        return;
    };

    let snapshot = session
        .context()
        .settings
        .snapshot_bounds
        .for_request(&stream, vbucket.high_seqno());
    debug!(
        "Session {} streaming vbucket {} seqnos {}..{} (uuid 0x{:x}, client snapshot {}..{}, marker {}..{})",
        session.id(),
        stream.vbucket,
        stream.start_seqno,
        stream.end_seqno,
        stream.vbucket_uuid,
        stream.snap_start_seqno,
        stream.snap_end_seqno,
        snapshot.0,
        snapshot.1
    );
    session
        .dcp_mut()
        .begin_stream(stream.vbucket, stream.opaque, stream.end_seqno);

    let writer = session.writer();
    match replay_stream(writer.as_ref(), vbucket.as_ref(), &stream, snapshot) {
        Ok(summary) => debug!(
            "Session {} streamed vbucket {} ({} mutations, {} deletions) in {:?}",
            session.id(),
            stream.vbucket,
            summary.mutations,
            summary.deletions,
            start.elapsed()
        ),
        Err(e) => debug!(
            "Session {} stream for vbucket {} aborted: {}",
            session.id(),
            stream.vbucket,
            e
        ),
    }

    session.dcp_mut().end_stream();
}

fn prepare_stream(
    session: &ClientSession,
    req: &Packet,
) -> Result<(StreamRequest, Arc<dyn VbucketStore>, Vec<(u64, u64)>)> {
    if !session.dcp().can_stream() {
        return Err(MemdError::invalid_args(format!(
            "stream request in DCP state {:?}",
            session.dcp().state()
        )));
    }

    let bucket = require_couchbase_bucket(session, "DCP stream request")?;
    check_vbucket_owner(session, &bucket, req.vbucket, VbucketRole::Any)?;
    let stream = StreamRequest::parse(req)?;

    let vbucket = bucket.store().vbucket(req.vbucket)?;
    let failover_log = bucket
        .failover_log(req.vbucket)
        .ok_or(MemdError::NotMyVbucket(req.vbucket))?;
    Ok((stream, vbucket, failover_log))
}

/// DCP_CLOSE_STREAM: replay never leaves a stream open, so there is never
/// anything to close
pub fn handle_close_stream(session: &mut ClientSession, req: &Packet, start: Instant) {
    dispatch_infallible("DcpCloseStream", session.writer(), start, || {
        Packet::response_to(req, STATUS_KEY_ENOENT)
    });
}

pub fn handle_get_failover_log(session: &mut ClientSession, req: &Packet, start: Instant) {
    let session = &*session;
    dispatch_response(
        "DcpGetFailoverLog",
        session.writer(),
        start,
        || {
            let bucket = require_couchbase_bucket(session, "DCP failover log")?;
            check_vbucket_owner(session, &bucket, req.vbucket, VbucketRole::Any)?;
            let log = bucket
                .failover_log(req.vbucket)
                .ok_or(MemdError::NotMyVbucket(req.vbucket))?;
            Ok(Packet::success_for(req).with_value(failover_log_value(&log)))
        },
        |e| error_response(session, req, e),
    );
}

/// GET_ALL_VB_SEQNOS: `(vbucket u16, high seqno u64)` for every vbucket
/// this node is primary for
pub fn handle_get_all_vb_seqnos(session: &mut ClientSession, req: &Packet, start: Instant) {
    let session = &*session;
    dispatch_response(
        "GetAllVbSeqnos",
        session.writer(),
        start,
        || {
            let bucket = require_couchbase_bucket(session, "GET_ALL_VB_SEQNOS")?;
            let ownership = bucket.vbucket_ownership(session.node());

            let mut value = BytesMut::new();
            for (vb, slot) in ownership.iter().enumerate() {
                if *slot != 0 {
                    continue;
                }
                let vb = vb as u16;
                value.put_u16(vb);
                value.put_u64(bucket.store().vbucket(vb)?.high_seqno());
            }
            Ok(Packet::success_for(req).with_value(value.freeze()))
        },
        |e| error_response(session, req, e),
    );
}
