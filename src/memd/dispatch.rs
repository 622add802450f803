// Opcode dispatch for memd handlers
//
// HandlerRegistry maps an opcode to the ordered list of handlers bound to
// it. It is built once at startup (handlers::register_all) and then shared
// read-only by every connection.
//
// Most handlers follow the same pattern:
// 1. Run the command logic, producing a response packet or an error
// 2. On success: write the response
// 3. On error: log, write an error response carrying the mapped status
//
// dispatch_response() encapsulates that pattern.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::error::MemdError;
use super::protocol::Packet;
use super::session::{ClientSession, PacketWriter};

/// A command handler
pub type KvHandler = Arc<dyn Fn(&mut ClientSession, &Packet, Instant) + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<u8, Vec<KvHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the handlers bound to `opcode`
    pub fn register<F>(&mut self, opcode: u8, handler: F)
    where
        F: Fn(&mut ClientSession, &Packet, Instant) + Send + Sync + 'static,
    {
        self.handlers
            .entry(opcode)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Run every handler bound to `packet.opcode`, in registration order
    ///
    /// Returns false when no handler is bound; the caller answers with
    /// UNKNOWN_COMMAND.
    pub fn dispatch(&self, session: &mut ClientSession, packet: &Packet, start: Instant) -> bool {
        match self.handlers.get(&packet.opcode) {
            Some(handlers) if !handlers.is_empty() => {
                for handler in handlers {
                    handler(session, packet, start);
                }
                true
            }
            _ => false,
        }
    }

    pub fn handler_count(&self, opcode: u8) -> usize {
        self.handlers.get(&opcode).map_or(0, Vec::len)
    }
}

/// Dispatch a handler result to the client.
///
/// # Arguments
/// * `handler_name` - Name of the handler for logging
/// * `writer` - Outbound frame sink of the connection
/// * `start` - When the request frame was decoded
/// * `handler` - The command logic
/// * `wrap_error` - Builds the error response for a failed command
pub fn dispatch_response<F, E>(
    handler_name: &str,
    writer: Arc<dyn PacketWriter>,
    start: Instant,
    handler: F,
    wrap_error: E,
) where
    F: FnOnce() -> Result<Packet, MemdError>,
    E: FnOnce(&MemdError) -> Packet,
{
    let response = match handler() {
        Ok(response) => response,
        Err(e) => {
            if e.is_server_error() {
                warn!("Failed to handle {} request: {}", handler_name, e);
            } else {
                debug!("{} request rejected: {}", handler_name, e);
            }
            wrap_error(&e)
        }
    };

    match writer.write_packet(response) {
        Ok(()) => debug!("{} handled in {:?}", handler_name, start.elapsed()),
        Err(e) => warn!("Failed to send {} response: {}", handler_name, e),
    }
}

/// Dispatch a handler that cannot fail.
pub fn dispatch_infallible<F>(
    handler_name: &str,
    writer: Arc<dyn PacketWriter>,
    start: Instant,
    handler: F,
) where
    F: FnOnce() -> Packet,
{
    match writer.write_packet(handler()) {
        Ok(()) => debug!("{} handled in {:?}", handler_name, start.elapsed()),
        Err(e) => warn!("Failed to send {} response: {}", handler_name, e),
    }
}
