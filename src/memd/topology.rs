//! vbucket topology model
//!
//! Maps every vbucket of a bucket to the ordered list of nodes owning it:
//! slot 0 is the primary, slot i the i-th replica. Assignment is explicit
//! and deterministic so tests can predict it:
//!
//! ```text
//! primary(vb)    = nodes[vb % L]
//! replica(vb, i) = nodes[(vb + i) % L]      for i in 1..=R
//! ```
//!
//! With more nodes than replicas the owners of a vbucket are pairwise
//! distinct; with L <= R owners repeat.
//!
//! Tables are immutable once built. `assign_all` builds a fresh table and
//! publishes it through `arc_swap::ArcSwap`, so readers on other connections
//! always observe either the whole old table or the whole new one.

use std::sync::Arc;

use arc_swap::ArcSwap;
use uuid::Uuid;

/// One simulated node of the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterNode {
    pub id: String,
    pub hostname: String,
    pub kv_port: u16,
}

impl ClusterNode {
    /// Create a node with a fresh random id
    pub fn new(hostname: impl Into<String>, kv_port: u16) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            hostname: hostname.into(),
            kv_port,
        }
    }

    /// `host:port` as advertised in topology payloads
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.kv_port)
    }
}

/// Owners of one vbucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VbucketOwners {
    pub primary: ClusterNode,
    pub replicas: Vec<ClusterNode>,
}

/// Everything a bucket config payload needs about the vbucket layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VbServerInfo {
    /// Nodes holding vbuckets, in assignment order
    pub server_nodes: Vec<ClusterNode>,
    /// Per vbucket, its owners (primary first)
    pub vbucket_map: Vec<Vec<ClusterNode>>,
    /// Per vbucket, owner positions in `server_nodes` (-1 = no owner)
    pub vbucket_map_indices: Vec<Vec<i32>>,
    /// `server_nodes` plus the requesting node when it holds no vbuckets
    pub all_nodes: Vec<ClusterNode>,
}

/// Immutable snapshot of an assignment
#[derive(Debug, Default)]
struct VbucketTable {
    nodes: Vec<ClusterNode>,
    /// owners[vb][slot] = index into `nodes`
    owners: Vec<Vec<usize>>,
}

impl VbucketTable {
    fn build(nodes: Vec<ClusterNode>, num_vbuckets: u16, num_replicas: usize) -> Self {
        if nodes.is_empty() {
            return Self::default();
        }

        let len = nodes.len();
        let owners = (0..num_vbuckets as usize)
            .map(|vb| (0..=num_replicas).map(|slot| (vb + slot) % len).collect())
            .collect();

        Self { nodes, owners }
    }
}

/// Partition table of one bucket
pub struct Topology {
    num_vbuckets: u16,
    num_replicas: usize,
    table: ArcSwap<VbucketTable>,
}

impl Topology {
    /// Create an empty topology (no owners until `assign_all`)
    pub fn new(num_vbuckets: u16, num_replicas: usize) -> Self {
        Self {
            num_vbuckets,
            num_replicas,
            table: ArcSwap::from_pointee(VbucketTable::default()),
        }
    }

    pub fn num_vbuckets(&self) -> u16 {
        self.num_vbuckets
    }

    pub fn num_replicas(&self) -> usize {
        self.num_replicas
    }

    /// Reassign every vbucket across `nodes` and publish the new table
    pub fn assign_all(&self, nodes: Vec<ClusterNode>) {
        let table = VbucketTable::build(nodes, self.num_vbuckets, self.num_replicas);
        self.table.store(Arc::new(table));
    }

    /// Nodes of the current assignment, in order
    pub fn nodes(&self) -> Vec<ClusterNode> {
        self.table.load().nodes.clone()
    }

    /// Owners of `vbucket`, or `None` if it is out of range or unassigned
    pub fn owners_of(&self, vbucket: u16) -> Option<VbucketOwners> {
        let table = self.table.load();
        let slots = table.owners.get(vbucket as usize)?;
        let (primary, replicas) = slots.split_first()?;
        Some(VbucketOwners {
            primary: table.nodes[*primary].clone(),
            replicas: replicas.iter().map(|i| table.nodes[*i].clone()).collect(),
        })
    }

    /// Per vbucket, the slot `node_id` holds (0 = primary, i = replica i)
    /// or -1 when it holds none
    ///
    /// When owners repeat (L <= R) the first slot wins.
    pub fn replica_indices_for(&self, node_id: &str) -> Vec<i32> {
        let table = self.table.load();
        let position = table.nodes.iter().position(|n| n.id == node_id);

        (0..self.num_vbuckets as usize)
            .map(|vb| {
                let slot = position.and_then(|pos| {
                    table
                        .owners
                        .get(vb)
                        .and_then(|slots| slots.iter().position(|s| *s == pos))
                });
                slot.map(|s| s as i32).unwrap_or(-1)
            })
            .collect()
    }

    /// Topology as seen from `requesting`
    pub fn server_info_for(&self, requesting: &ClusterNode) -> VbServerInfo {
        let table = self.table.load();
        let width = self.num_replicas + 1;

        let vbucket_map_indices = (0..self.num_vbuckets as usize)
            .map(|vb| match table.owners.get(vb) {
                Some(slots) => slots.iter().map(|s| *s as i32).collect(),
                None => vec![-1; width],
            })
            .collect();

        let vbucket_map = table
            .owners
            .iter()
            .map(|slots| slots.iter().map(|s| table.nodes[*s].clone()).collect())
            .collect();

        let mut all_nodes = table.nodes.clone();
        if !all_nodes.iter().any(|n| n.id == requesting.id) {
            all_nodes.push(requesting.clone());
        }

        VbServerInfo {
            server_nodes: table.nodes.clone(),
            vbucket_map,
            vbucket_map_indices,
            all_nodes,
        }
    }
}
