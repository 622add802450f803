// Memd command handlers
//
// Handlers are plain functions with the registry's handler signature:
//
//   fn(&mut ClientSession, &Packet, Instant)
//
// They read and write through the session (selected bucket, DCP state,
// outbound writer) and the shared HandlerContext it carries. Every handler
// writes its own response(s); dispatch_response() covers the common
// one-request/one-response shape.
//
// Module organization:
// - helpers: bucket/vbucket checks and error responses
// - connection: HELLO, SASL, SELECT_BUCKET, cluster config, manifest, NOOP
// - kv: GET, GET_REPLICA, SET, ADD, REPLACE, DELETE
// - dcp: open, control, stream request, close stream, failover log, vb seqnos

mod connection;
mod dcp;
mod helpers;
mod kv;


use super::dispatch::HandlerRegistry;

pub use connection::{
    handle_get_cluster_config, handle_get_collections_manifest, handle_hello, handle_noop,
    handle_sasl_auth, handle_sasl_list_mechs, handle_select_bucket,
};
pub use dcp::{
    handle_close_stream, handle_control, handle_get_all_vb_seqnos, handle_get_failover_log,
    handle_open_connection, handle_stream_request,
};
pub use kv::{
    handle_add, handle_delete, handle_get, handle_get_replica, handle_replace, handle_set,
};

/// Build the registry with every command this server implements
pub fn register_all(registry: &mut HandlerRegistry) {
    connection::register(registry);
    kv::register(registry);
    dcp::register(registry);
}

/// Convenience constructor for a fully populated registry
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    register_all(&mut registry);
    registry
}
