//! Buckets of the mock cluster
//!
//! A bucket is either a plain memcached bucket (one vbucket, no topology) or
//! a Couchbase bucket whose key space is split into vbuckets spread over the
//! cluster's nodes. Both kinds own a document store and a configuration
//! revision that clients use to decide whether a topology payload is newer
//! than the one they hold.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::Result;
use super::partitioner::vbucket_for_key;
use super::storage::{DocumentStore, MemoryStore};
use super::topology::{ClusterNode, Topology, VbServerInfo, VbucketOwners};

/// Wire names of the bucket kinds
pub const BUCKET_TYPE_MEMCACHED: &str = "memcached";
pub const BUCKET_TYPE_COUCHBASE: &str = "membase";

/// Kind of bucket, without its kind-specific state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum BucketType {
    Memcached,
    #[default]
    Couchbase,
}

impl BucketType {
    /// Name used in bucket config payloads
    pub fn name(&self) -> &'static str {
        match self {
            BucketType::Memcached => BUCKET_TYPE_MEMCACHED,
            BucketType::Couchbase => BUCKET_TYPE_COUCHBASE,
        }
    }

    /// Parse a wire name; anything unrecognised is a Couchbase bucket
    pub fn from_name(name: &str) -> Self {
        match name {
            BUCKET_TYPE_MEMCACHED => BucketType::Memcached,
            _ => BucketType::Couchbase,
        }
    }
}

impl From<String> for BucketType {
    fn from(name: String) -> Self {
        BucketType::from_name(&name)
    }
}

/// Options for creating a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBucketOptions {
    pub name: String,
    pub bucket_type: BucketType,
    pub num_replicas: usize,
}

/// Collection manifest of a bucket
///
/// Only the default scope and collection exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionManifest {
    pub uid: String,
    pub scopes: Vec<ManifestScope>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestScope {
    pub name: String,
    pub uid: String,
    pub collections: Vec<ManifestCollection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestCollection {
    pub name: String,
    pub uid: String,
}

impl Default for CollectionManifest {
    fn default() -> Self {
        Self {
            uid: "0".to_string(),
            scopes: vec![ManifestScope {
                name: "_default".to_string(),
                uid: "0".to_string(),
                collections: vec![ManifestCollection {
                    name: "_default".to_string(),
                    uid: "0".to_string(),
                }],
            }],
        }
    }
}

/// Kind-specific bucket state
pub enum BucketKind {
    Memcached,
    Couchbase {
        topology: Topology,
        /// Failover branch id of every vbucket
        vbucket_uuids: Vec<u64>,
    },
}

/// One bucket of the cluster
pub struct Bucket {
    id: String,
    name: String,
    num_replicas: usize,
    config_rev: AtomicU64,
    kind: BucketKind,
    store: Arc<dyn DocumentStore>,
    manifest: CollectionManifest,
}

impl Bucket {
    /// Create a bucket backed by a fresh in-memory store
    ///
    /// Memcached buckets always have a single vbucket.
    pub fn new(opts: NewBucketOptions, num_vbuckets: u16) -> Self {
        let num_vbuckets = match opts.bucket_type {
            BucketType::Memcached => 1,
            BucketType::Couchbase => num_vbuckets,
        };
        Self::with_store(opts, Arc::new(MemoryStore::new(num_vbuckets)))
    }

    /// Create a bucket on top of an existing store
    pub fn with_store(opts: NewBucketOptions, store: Arc<dyn DocumentStore>) -> Self {
        let kind = match opts.bucket_type {
            BucketType::Memcached => BucketKind::Memcached,
            BucketType::Couchbase => {
                let num_vbuckets = store.num_vbuckets();
                BucketKind::Couchbase {
                    topology: Topology::new(num_vbuckets, opts.num_replicas),
                    vbucket_uuids: (0..num_vbuckets).map(|_| rand::random::<u64>()).collect(),
                }
            }
        };

        Self {
            id: Uuid::new_v4().to_string(),
            name: opts.name,
            num_replicas: opts.num_replicas,
            config_rev: AtomicU64::new(0),
            kind,
            store,
            manifest: CollectionManifest::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bucket_type(&self) -> BucketType {
        match self.kind {
            BucketKind::Memcached => BucketType::Memcached,
            BucketKind::Couchbase { .. } => BucketType::Couchbase,
        }
    }

    pub fn kind(&self) -> &BucketKind {
        &self.kind
    }

    pub fn num_replicas(&self) -> usize {
        self.num_replicas
    }

    pub fn num_vbuckets(&self) -> u16 {
        self.store.num_vbuckets()
    }

    pub fn config_rev(&self) -> u64 {
        self.config_rev.load(Ordering::Acquire)
    }

    pub fn collection_manifest(&self) -> &CollectionManifest {
        &self.manifest
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Drop every document, keeping identity and topology
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// Assign all vbuckets across `nodes` (vb % L, replicas following) and
    /// bump the configuration revision
    pub fn update_vbmap(&self, nodes: Vec<ClusterNode>) {
        if let BucketKind::Couchbase { topology, .. } = &self.kind {
            topology.assign_all(nodes);
        }
        self.config_rev.fetch_add(1, Ordering::AcqRel);
    }

    /// Per vbucket slot held by `node` (-1 = none)
    ///
    /// Every node serves the single vbucket of a memcached bucket.
    pub fn vbucket_ownership(&self, node: &ClusterNode) -> Vec<i32> {
        match &self.kind {
            BucketKind::Memcached => vec![0],
            BucketKind::Couchbase { topology, .. } => topology.replica_indices_for(&node.id),
        }
    }

    pub fn vbucket_server_info(&self, node: &ClusterNode) -> Option<VbServerInfo> {
        match &self.kind {
            BucketKind::Memcached => None,
            BucketKind::Couchbase { topology, .. } => Some(topology.server_info_for(node)),
        }
    }

    pub fn owners_of(&self, vbucket: u16) -> Option<VbucketOwners> {
        match &self.kind {
            BucketKind::Memcached => None,
            BucketKind::Couchbase { topology, .. } => topology.owners_of(vbucket),
        }
    }

    /// Failover branch id of `vbucket` (0 for memcached buckets)
    pub fn vbucket_uuid(&self, vbucket: u16) -> Option<u64> {
        match &self.kind {
            BucketKind::Memcached => (vbucket == 0).then_some(0),
            BucketKind::Couchbase { vbucket_uuids, .. } => {
                vbucket_uuids.get(vbucket as usize).copied()
            }
        }
    }

    /// Failover log entries `(vbucket uuid, seqno)`, newest first
    ///
    /// Nothing ever fails over in the mock so there is exactly one entry.
    pub fn failover_log(&self, vbucket: u16) -> Option<Vec<(u64, u64)>> {
        self.vbucket_uuid(vbucket).map(|uuid| vec![(uuid, 0)])
    }

    pub fn vbucket_for_key(&self, key: &[u8]) -> u16 {
        vbucket_for_key(key, self.num_vbuckets())
    }

    /// Terse bucket configuration as served to KV clients
    ///
    /// `cluster_nodes` is used for memcached buckets, which have no vbucket map.
    pub fn config_json(&self, this_node: &ClusterNode, cluster_nodes: &[ClusterNode]) -> Value {
        let mut config = json!({
            "rev": self.config_rev(),
            "name": self.name,
            "uuid": self.id,
            "bucketType": self.bucket_type().name(),
            "collectionsManifestUid": self.manifest.uid,
        });

        match self.vbucket_server_info(this_node) {
            Some(info) => {
                config["nodeLocator"] = json!("vbucket");
                config["nodes"] = nodes_json(&info.all_nodes);
                config["nodesExt"] = nodes_ext_json(&info.all_nodes, this_node);
                config["bucketCapabilities"] =
                    json!(["couchapi", "dcp", "cbhello", "xattr", "collections", "nodesExt"]);
                config["vBucketServerMap"] = json!({
                    "hashAlgorithm": "CRC",
                    "numReplicas": self.num_replicas,
                    "serverList": info
                        .server_nodes
                        .iter()
                        .map(ClusterNode::address)
                        .collect::<Vec<_>>(),
                    "vBucketMap": info.vbucket_map_indices,
                });
            }
            None => {
                config["nodeLocator"] = json!("ketama");
                config["nodes"] = nodes_json(cluster_nodes);
                config["nodesExt"] = nodes_ext_json(cluster_nodes, this_node);
                config["bucketCapabilities"] = json!(["cbhello", "nodesExt"]);
            }
        }

        config
    }
}

pub(crate) fn nodes_json(nodes: &[ClusterNode]) -> Value {
    Value::Array(
        nodes
            .iter()
            .map(|n| {
                json!({
                    "hostname": n.hostname,
                    "ports": { "direct": n.kv_port },
                })
            })
            .collect(),
    )
}

pub(crate) fn nodes_ext_json(nodes: &[ClusterNode], this_node: &ClusterNode) -> Value {
    Value::Array(
        nodes
            .iter()
            .map(|n| {
                let mut ext = json!({
                    "hostname": n.hostname,
                    "services": { "kv": n.kv_port },
                });
                if n.id == this_node.id {
                    ext["thisNode"] = json!(true);
                }
                ext
            })
            .collect(),
    )
}
