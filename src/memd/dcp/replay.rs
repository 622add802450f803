// Stream replay
//
// Pushes the history of one vbucket to a DCP client:
//   1. a snapshot marker
//   2. every stored version with start_seqno < seqno <= end_seqno, ascending,
//      live documents as mutations and tombstones as deletions
//   3. a stream end
//
// A write failure means the client is gone: replay stops on the spot and
// nothing else is written. A storage failure ends the stream with the
// backfill-failure flag instead of OK.

use tracing::{debug, warn};

use super::frames;
use super::StreamRequest;
use crate::memd::constants::{DCP_STREAM_END_BACKFILL_FAIL, DCP_STREAM_END_OK};
use crate::memd::error::Result;
use crate::memd::session::PacketWriter;
use crate::memd::storage::VbucketStore;

/// What a completed replay sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaySummary {
    pub mutations: usize,
    pub deletions: usize,
    /// Flags of the stream end frame
    pub end_flags: u32,
}

/// Replay `vbucket` to `writer` for `req`
///
/// `snapshot` is the (start, end) pair advertised in the snapshot marker.
///
/// # Errors
/// `TransportClosed` (or whatever the writer reports) when a frame could not
/// be written; the stream is abandoned without a stream end.
pub fn replay_stream(
    writer: &dyn PacketWriter,
    vbucket: &dyn VbucketStore,
    req: &StreamRequest,
    snapshot: (u64, u64),
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    writer.write_packet(frames::snapshot_marker(
        req.vbucket,
        req.opaque,
        snapshot.0,
        snapshot.1,
    ))?;

    let docs = match vbucket.get_all_mutations(req.start_seqno, 0) {
        Ok(docs) => docs,
        Err(e) => {
            warn!(
                "Backfill of vbucket {} failed, ending stream: {}",
                req.vbucket, e
            );
            summary.end_flags = DCP_STREAM_END_BACKFILL_FAIL;
            writer.write_packet(frames::stream_end(
                req.vbucket,
                req.opaque,
                DCP_STREAM_END_BACKFILL_FAIL,
            ))?;
            return Ok(summary);
        }
    };

    for doc in docs.iter().take_while(|doc| doc.seqno <= req.end_seqno) {
        if doc.is_deleted {
            writer.write_packet(frames::deletion(req.opaque, doc))?;
            summary.deletions += 1;
        } else {
            writer.write_packet(frames::mutation(req.opaque, doc))?;
            summary.mutations += 1;
        }
    }

    summary.end_flags = DCP_STREAM_END_OK;
    writer.write_packet(frames::stream_end(
        req.vbucket,
        req.opaque,
        DCP_STREAM_END_OK,
    ))?;

    debug!(
        "Stream for vbucket {} done: {} mutations, {} deletions",
        req.vbucket, summary.mutations, summary.deletions
    );
    Ok(summary)
}
