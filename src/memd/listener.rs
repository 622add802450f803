// TCP listener for one simulated node
//
// Accepts client connections and serves each one with a reader/writer task
// pair:
// - Reader (the connection task): decodes frames and runs the handlers
//   bound to their opcode, synchronously, in arrival order
// - Writer: drains the connection's outbound channel into the socket
//
// Handlers never touch the socket. They push packets through the session's
// ChannelWriter, so responses and DCP pushes leave in the order they were
// produced. When a socket write fails the writer cancels the connection's
// token and every later write (e.g. the rest of a stream replay) is refused.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::constants::{opcode_name, STATUS_EINVAL, STATUS_UNKNOWN_COMMAND};
use super::dispatch::HandlerRegistry;
use super::error::Result;
use super::handler_context::HandlerContext;
use super::protocol::{InboundFrame, MemdCodec, Packet};
use super::session::{ChannelWriter, ClientSession};

/// How long a closing connection waits for its writer to flush
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Per-listener connection settings
#[derive(Debug, Clone, Copy)]
pub struct ListenerOptions {
    pub log_connections: bool,
    pub max_body_len: usize,
}

/// Run the accept loop of one node until `shutdown_rx` flips to true
///
/// # Arguments
/// * `listener` - Pre-bound listener (bound in worker.rs)
/// * `registry` - Handler registry shared by all nodes
/// * `ctx` - Context of the node this listener serves
/// * `options` - Connection settings
/// * `shutdown_rx` - Shutdown signal
pub async fn run(
    listener: TcpListener,
    registry: Arc<HandlerRegistry>,
    ctx: Arc<HandlerContext>,
    options: ListenerOptions,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    info!(
        "Node {} listening on {}",
        ctx.node.id,
        listener.local_addr()?
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Node {} listener received shutdown signal", ctx.node.id);
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, addr)) => {
                        if options.log_connections {
                            info!("Accepted connection from {} on node {}", addr, ctx.node.id);
                        } else {
                            debug!("Accepted connection from {}", addr);
                        }

                        let registry = Arc::clone(&registry);
                        let ctx = Arc::clone(&ctx);
                        let shutdown_rx = shutdown_rx.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(socket, addr, registry, ctx, options, shutdown_rx).await
                            {
                                warn!("Error handling connection from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => warn!("Error accepting connection: {}", e),
                }
            }
        }
    }

    Ok(())
}

/// Serve one client connection
async fn handle_connection(
    socket: TcpStream,
    addr: SocketAddr,
    registry: Arc<HandlerRegistry>,
    ctx: Arc<HandlerContext>,
    options: ListenerOptions,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    socket.set_nodelay(true)?;
    let framed = Framed::new(socket, MemdCodec::new(options.max_body_len));
    let (mut sink, mut frames) = framed.split();

    let (response_tx, mut response_rx) = tokio::sync::mpsc::unbounded_channel::<Packet>();
    let closed = CancellationToken::new();

    let writer_closed = closed.clone();
    let writer_handle = tokio::spawn(async move {
        while let Some(packet) = response_rx.recv().await {
            if let Err(e) = sink.send(packet).await {
                warn!("Failed to write to {}: {}", addr, e);
                writer_closed.cancel();
                break;
            }
        }
    });

    let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
    let writer = Arc::new(ChannelWriter::new(response_tx, closed.clone()));
    let mut session = ClientSession::new(session_id, ctx, writer);

    loop {
        let next = tokio::select! {
            next = frames.next() => next,
            _ = shutdown_rx.changed() => break,
            _ = closed.cancelled() => break,
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!("Closing connection from {}: {}", addr, e);
                break;
            }
            None => break,
        };

        let start = Instant::now();
        match frame {
            InboundFrame::Packet(packet) => {
                debug!(
                    "Session {} received {} (opaque {})",
                    session_id,
                    opcode_name(packet.opcode),
                    packet.opaque
                );
                if !registry.dispatch(&mut session, &packet, start) {
                    debug!("No handler for opcode 0x{:02x}", packet.opcode);
                    let response = Packet::response_to(&packet, STATUS_UNKNOWN_COMMAND);
                    if let Err(e) = session.write_packet(response) {
                        debug!("Failed to send UNKNOWN_COMMAND to {}: {}", addr, e);
                    }
                }
            }
            InboundFrame::Malformed {
                opcode,
                opaque,
                reason,
            } => {
                debug!("Malformed frame from {}: {}", addr, reason);
                let request = Packet::request(opcode).with_opaque(opaque);
                if let Err(e) = session.write_packet(Packet::response_to(&request, STATUS_EINVAL)) {
                    debug!("Failed to send EINVAL to {}: {}", addr, e);
                }
            }
        }
    }

    // Dropping the session drops the last sender; the writer drains and exits
    drop(session);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer_handle)
        .await
        .is_err()
    {
        debug!("Writer for {} did not drain within {:?}", addr, WRITER_DRAIN_TIMEOUT);
    }

    debug!("Connection from {} closed", addr);
    Ok(())
}
