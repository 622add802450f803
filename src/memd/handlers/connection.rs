// Connection setup handlers
//
// The commands an SDK sends right after connecting, before any data
// traffic: HELLO, SASL, SELECT_BUCKET, config and manifest fetches, NOOP.

use std::time::Instant;

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, info};

use super::helpers::{error_response, json_response, require_bucket};
use crate::memd::constants::{
    CMD_GET_CLUSTER_CONFIG, CMD_GET_COLLECTIONS_MANIFEST, CMD_HELLO, CMD_NOOP, CMD_SASL_AUTH,
    CMD_SASL_LIST_MECHS, CMD_SELECT_BUCKET, SASL_MECH_PLAIN, SUPPORTED_FEATURES,
};
use crate::memd::dispatch::{dispatch_infallible, dispatch_response, HandlerRegistry};
use crate::memd::error::{MemdError, Result};
use crate::memd::protocol::Packet;
use crate::memd::session::ClientSession;

pub fn register(registry: &mut HandlerRegistry) {
    registry.register(CMD_HELLO, handle_hello);
    registry.register(CMD_SASL_LIST_MECHS, handle_sasl_list_mechs);
    registry.register(CMD_SASL_AUTH, handle_sasl_auth);
    registry.register(CMD_SELECT_BUCKET, handle_select_bucket);
    registry.register(CMD_GET_CLUSTER_CONFIG, handle_get_cluster_config);
    registry.register(CMD_GET_COLLECTIONS_MANIFEST, handle_get_collections_manifest);
    registry.register(CMD_NOOP, handle_noop);
}

/// HELLO: key is the agent name, value a list of u16 feature codes
///
/// Replies with the supported subset, in request order.
pub fn handle_hello(session: &mut ClientSession, req: &Packet, start: Instant) {
    let writer = session.writer();
    dispatch_response(
        "Hello",
        writer,
        start,
        || {
            if req.value.len() % 2 != 0 {
                return Err(MemdError::invalid_args("odd HELLO feature list length"));
            }

            let mut requested = req.value.clone();
            let mut enabled = Vec::new();
            while requested.has_remaining() {
                let feature = requested.get_u16();
                if SUPPORTED_FEATURES.contains(&feature) && !enabled.contains(&feature) {
                    enabled.push(feature);
                }
            }

            let agent = String::from_utf8_lossy(&req.key).into_owned();
            debug!(
                "HELLO from '{}' (session {}): features {:?}",
                agent,
                session.id(),
                enabled
            );

            let mut value = BytesMut::with_capacity(enabled.len() * 2);
            for feature in &enabled {
                value.put_u16(*feature);
            }
            session.set_agent(agent);
            session.set_features(enabled);

            Ok(Packet::success_for(req).with_value(value.freeze()))
        },
        |e| Packet::response_to(req, e.to_status_code()),
    );
}

pub fn handle_sasl_list_mechs(session: &mut ClientSession, req: &Packet, start: Instant) {
    dispatch_infallible("SaslListMechs", session.writer(), start, || {
        Packet::success_for(req).with_value(SASL_MECH_PLAIN)
    });
}

/// SASL_AUTH: key is the mechanism, value `[authzid] \0 user \0 password`
pub fn handle_sasl_auth(session: &mut ClientSession, req: &Packet, start: Instant) {
    let writer = session.writer();
    dispatch_response(
        "SaslAuth",
        writer,
        start,
        || {
            if req.key.as_ref() != SASL_MECH_PLAIN.as_bytes() {
                return Err(MemdError::NotSupported(format!(
                    "SASL mechanism '{}'",
                    String::from_utf8_lossy(&req.key)
                )));
            }

            let (user, password) = parse_plain_credentials(&req.value)?;
            let expected = &session.context().settings.credentials;
            if user != expected.username || password != expected.password {
                return Err(MemdError::AuthFailed(format!("bad credentials for '{}'", user)));
            }

            info!("Session {} authenticated as '{}'", session.id(), user);
            session.authenticate(user);
            Ok(Packet::success_for(req).with_value("Authenticated"))
        },
        |e| Packet::response_to(req, e.to_status_code()),
    );
}

fn parse_plain_credentials(value: &[u8]) -> Result<(String, String)> {
    let parts: Vec<&[u8]> = value.split(|b| *b == 0).collect();
    match parts.as_slice() {
        [_authzid, user, password] => Ok((
            String::from_utf8_lossy(user).into_owned(),
            String::from_utf8_lossy(password).into_owned(),
        )),
        _ => Err(MemdError::AuthFailed(
            "malformed PLAIN credentials".to_string(),
        )),
    }
}

/// SELECT_BUCKET: key is the bucket name
pub fn handle_select_bucket(session: &mut ClientSession, req: &Packet, start: Instant) {
    let writer = session.writer();
    dispatch_response(
        "SelectBucket",
        writer,
        start,
        || {
            if session.context().settings.require_auth && !session.is_authenticated() {
                return Err(MemdError::AuthFailed(
                    "authentication required before selecting a bucket".to_string(),
                ));
            }

            let name = String::from_utf8_lossy(&req.key).into_owned();
            let bucket = session
                .context()
                .cluster
                .get_bucket(&name)
                .ok_or_else(|| MemdError::BucketNotFound(name.clone()))?;

            debug!("Session {} selected bucket '{}'", session.id(), name);
            session.select_bucket(bucket);
            Ok(Packet::success_for(req))
        },
        |e| Packet::response_to(req, e.to_status_code()),
    );
}

/// GET_CLUSTER_CONFIG: bucket config when a bucket is selected, cluster
/// config otherwise
pub fn handle_get_cluster_config(session: &mut ClientSession, req: &Packet, start: Instant) {
    let session = &*session;
    dispatch_response(
        "GetClusterConfig",
        session.writer(),
        start,
        || {
            let cluster = &session.context().cluster;
            let config = match session.selected_bucket() {
                Some(bucket) => bucket.config_json(session.node(), cluster.nodes()),
                None => cluster.config_json(session.node()),
            };
            json_response(req, &config)
        },
        |e| error_response(session, req, e),
    );
}

pub fn handle_get_collections_manifest(session: &mut ClientSession, req: &Packet, start: Instant) {
    let session = &*session;
    dispatch_response(
        "GetCollectionsManifest",
        session.writer(),
        start,
        || {
            let bucket = require_bucket(session)?;
            let manifest = serde_json::to_value(bucket.collection_manifest())?;
            json_response(req, &manifest)
        },
        |e| error_response(session, req, e),
    );
}

pub fn handle_noop(session: &mut ClientSession, req: &Packet, start: Instant) {
    dispatch_infallible("Noop", session.writer(), start, || Packet::success_for(req));
}
