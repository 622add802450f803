// Storage abstraction layer for the mock cluster
//
// This module defines the DocumentStore / VbucketStore traits that abstract
// document persistence. Protocol logic (handlers, the DCP engine) only ever
// talks to these traits, which gives us:
// 1. Testability - handlers can be tested with mock stores
// 2. Clean separation - the DCP engine only reads ordered mutation history
// 3. Swappable backends - the in-memory store is one implementation
//
// Implementations must be safe for concurrent readers and writers: many
// connections read the same vbucket while others write to it.

pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use super::error::Result;

pub use memory::MemoryStore;

/// One version of a document as stored in a vbucket's history
///
/// Every write (including deletes) produces a new version with a fresh,
/// strictly increasing `seqno` scoped to the vbucket.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    /// Owning vbucket
    pub vbucket: u16,
    /// Document key
    pub key: Vec<u8>,
    /// Document body (empty for tombstones)
    pub value: Vec<u8>,
    /// Extended attributes, ordered by key
    pub xattrs: BTreeMap<String, Vec<u8>>,
    /// Client item flags
    pub flags: u32,
    /// Datatype bits of `value` (raw/JSON/snappy); the XATTR bit is derived on the wire
    pub datatype: u8,
    /// Expiry (seconds), 0 = never
    pub expiry: u32,
    /// Compare-and-swap token
    pub cas: u64,
    /// By-sequence number within the vbucket
    pub seqno: u64,
    /// Revision sequence number (number of times this key was mutated)
    pub rev_seqno: u64,
    /// Tombstone marker
    pub is_deleted: bool,
}

/// Store semantics requested by a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Create or overwrite
    #[default]
    Upsert,
    /// Fail with KeyExists if a live document exists
    Insert,
    /// Fail with KeyNotFound if no live document exists
    Replace,
}

/// A document write request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentWrite {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub xattrs: BTreeMap<String, Vec<u8>>,
    pub flags: u32,
    pub datatype: u8,
    pub expiry: u32,
    /// Expected CAS of the current version, 0 = don't care
    pub cas: u64,
    pub mode: WriteMode,
}

/// Abstract storage interface for one bucket's documents
///
/// This is the "GetPartition" side of the storage collaborator.
pub trait DocumentStore: Send + Sync {
    /// Number of vbuckets this store was created with
    fn num_vbuckets(&self) -> u16;

    /// Get the handle of one vbucket
    ///
    /// # Errors
    /// `InvalidArguments` if `index >= num_vbuckets()`
    fn vbucket(&self, index: u16) -> Result<Arc<dyn VbucketStore>>;

    /// Remove every document from every vbucket
    fn flush(&self) -> Result<()>;
}

/// Handle to one vbucket's ordered mutation history
pub trait VbucketStore: Send + Sync {
    /// Index of this vbucket
    fn index(&self) -> u16;

    /// Mutations with `seqno > since_seqno` in ascending seqno order
    ///
    /// `limit == 0` means unlimited.
    fn get_all_mutations(&self, since_seqno: u64, limit: usize) -> Result<Vec<Document>>;

    /// Highest seqno assigned so far (0 if nothing was ever written)
    fn high_seqno(&self) -> u64;

    /// Latest live version of `key`
    fn get(&self, key: &[u8]) -> Result<Option<Document>>;

    /// Apply a write, returning the stored version
    fn write(&self, write: DocumentWrite) -> Result<Document>;

    /// Write a tombstone for `key`, returning the tombstone
    ///
    /// `cas` = 0 skips the CAS check.
    fn delete(&self, key: &[u8], cas: u64) -> Result<Document>;
}
