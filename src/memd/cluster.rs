//! The simulated cluster: its nodes and its buckets
//!
//! Nodes are fixed for the lifetime of the cluster. Buckets can be added and
//! removed at runtime; every new bucket is immediately spread over all nodes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::bucket::{nodes_ext_json, nodes_json, Bucket, NewBucketOptions};
use super::error::{MemdError, Result};
use super::storage::DocumentStore;
use super::topology::ClusterNode;

pub struct Cluster {
    id: String,
    nodes: Vec<ClusterNode>,
    num_vbuckets: u16,
    buckets: RwLock<HashMap<String, Arc<Bucket>>>,
}

impl Cluster {
    pub fn new(nodes: Vec<ClusterNode>, num_vbuckets: u16) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            nodes,
            num_vbuckets,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&ClusterNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn num_vbuckets(&self) -> u16 {
        self.num_vbuckets
    }

    /// Create a bucket backed by an in-memory store and assign it to all nodes
    pub fn add_bucket(&self, opts: NewBucketOptions) -> Result<Arc<Bucket>> {
        let bucket = Bucket::new(opts, self.num_vbuckets);
        self.insert_bucket(bucket)
    }

    /// Create a bucket on a caller-provided store and assign it to all nodes
    pub fn add_bucket_with_store(
        &self,
        opts: NewBucketOptions,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Arc<Bucket>> {
        self.insert_bucket(Bucket::with_store(opts, store))
    }

    fn insert_bucket(&self, bucket: Bucket) -> Result<Arc<Bucket>> {
        let mut buckets = self.buckets.write();
        if buckets.contains_key(bucket.name()) {
            return Err(MemdError::invalid_args(format!(
                "bucket '{}' already exists",
                bucket.name()
            )));
        }

        bucket.update_vbmap(self.nodes.clone());
        let bucket = Arc::new(bucket);
        buckets.insert(bucket.name().to_string(), Arc::clone(&bucket));

        info!(
            "Created {} bucket '{}' ({} vbuckets, {} replicas)",
            bucket.bucket_type().name(),
            bucket.name(),
            bucket.num_vbuckets(),
            bucket.num_replicas()
        );
        Ok(bucket)
    }

    pub fn get_bucket(&self, name: &str) -> Option<Arc<Bucket>> {
        self.buckets.read().get(name).cloned()
    }

    pub fn remove_bucket(&self, name: &str) -> bool {
        self.buckets.write().remove(name).is_some()
    }

    /// Bucket names, sorted
    pub fn bucket_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buckets.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Cluster-level configuration served before a bucket is selected
    pub fn config_json(&self, this_node: &ClusterNode) -> Value {
        json!({
            "rev": 1,
            "nodes": nodes_json(&self.nodes),
            "nodesExt": nodes_ext_json(&self.nodes, this_node),
            "clusterCapabilitiesVer": [1, 0],
            "clusterCapabilities": { "n1ql": ["enhancedPreparedStatements"] },
        })
    }
}
