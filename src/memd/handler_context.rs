//! Shared handler context
//!
//! One `HandlerContext` exists per simulated node. Every session accepted on
//! that node holds an `Arc` to it, so handlers reach the cluster, the node
//! identity and the server settings without threading extra parameters
//! through the registry's handler signature.

use std::sync::Arc;

use super::cluster::Cluster;
use super::constants::{DEFAULT_PASSWORD, DEFAULT_USERNAME};
use super::dcp::SnapshotBounds;
use super::topology::ClusterNode;

/// SASL credentials accepted by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

/// Behaviour switches handlers consult
#[derive(Debug, Clone, Default)]
pub struct HandlerSettings {
    pub credentials: Credentials,
    /// SELECT_BUCKET is refused until SASL_AUTH succeeded
    pub require_auth: bool,
    pub snapshot_bounds: SnapshotBounds,
}

pub struct HandlerContext {
    pub cluster: Arc<Cluster>,
    pub node: ClusterNode,
    pub settings: HandlerSettings,
}

impl HandlerContext {
    pub fn new(cluster: Arc<Cluster>, node: ClusterNode, settings: HandlerSettings) -> Self {
        Self {
            cluster,
            node,
            settings,
        }
    }
}
