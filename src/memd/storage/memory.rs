//! In-memory document store
//!
//! Every vbucket keeps its full append-only history plus an index from key
//! to the position of the key's latest version. A `parking_lot::RwLock` per
//! vbucket lets streams read history while other connections write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use super::{Document, DocumentStore, DocumentWrite, VbucketStore, WriteMode};
use crate::memd::error::{MemdError, Result};

/// Memory-backed `DocumentStore`
pub struct MemoryStore {
    vbuckets: Vec<Arc<MemoryVbucket>>,
}

impl MemoryStore {
    pub fn new(num_vbuckets: u16) -> Self {
        // CAS values only need to be unique and increasing; seed from wall clock
        // so they look like real hybrid logical clock values to clients.
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
        let cas_source = Arc::new(AtomicU64::new(seed));

        let vbuckets = (0..num_vbuckets)
            .map(|index| {
                Arc::new(MemoryVbucket {
                    index,
                    cas_source: Arc::clone(&cas_source),
                    state: RwLock::new(VbucketState::default()),
                })
            })
            .collect();

        Self { vbuckets }
    }
}

impl DocumentStore for MemoryStore {
    fn num_vbuckets(&self) -> u16 {
        self.vbuckets.len() as u16
    }

    fn vbucket(&self, index: u16) -> Result<Arc<dyn VbucketStore>> {
        self.vbuckets
            .get(index as usize)
            .map(|vb| Arc::clone(vb) as Arc<dyn VbucketStore>)
            .ok_or_else(|| {
                MemdError::invalid_args(format!(
                    "vbucket {} out of range (0..{})",
                    index,
                    self.vbuckets.len()
                ))
            })
    }

    fn flush(&self) -> Result<()> {
        for vb in &self.vbuckets {
            vb.clear();
        }
        Ok(())
    }
}

#[derive(Default)]
struct VbucketState {
    history: Vec<Document>,
    latest: HashMap<Vec<u8>, usize>,
    high_seqno: u64,
}

impl VbucketState {
    fn latest_version(&self, key: &[u8]) -> Option<&Document> {
        self.latest.get(key).map(|idx| &self.history[*idx])
    }

    fn live(&self, key: &[u8]) -> Option<&Document> {
        self.latest_version(key).filter(|doc| !doc.is_deleted)
    }

    fn append(&mut self, mut doc: Document) -> Document {
        self.high_seqno += 1;
        doc.seqno = self.high_seqno;
        self.latest.insert(doc.key.clone(), self.history.len());
        self.history.push(doc.clone());
        doc
    }
}

/// One vbucket of a `MemoryStore`
pub struct MemoryVbucket {
    index: u16,
    cas_source: Arc<AtomicU64>,
    state: RwLock<VbucketState>,
}

impl MemoryVbucket {
    fn next_cas(&self) -> u64 {
        self.cas_source.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Drop all documents; the seqno counter keeps counting from where it was
    fn clear(&self) {
        let mut state = self.state.write();
        state.history.clear();
        state.latest.clear();
    }
}

fn check_cas(current: Option<&Document>, expected: u64) -> Result<()> {
    if expected == 0 {
        return Ok(());
    }
    match current {
        None => Err(MemdError::KeyNotFound),
        Some(doc) if doc.cas != expected => Err(MemdError::KeyExists),
        Some(_) => Ok(()),
    }
}

impl VbucketStore for MemoryVbucket {
    fn index(&self) -> u16 {
        self.index
    }

    fn get_all_mutations(&self, since_seqno: u64, limit: usize) -> Result<Vec<Document>> {
        let state = self.state.read();
        let iter = state
            .history
            .iter()
            .filter(|doc| doc.seqno > since_seqno)
            .cloned();
        Ok(if limit == 0 {
            iter.collect()
        } else {
            iter.take(limit).collect()
        })
    }

    fn high_seqno(&self) -> u64 {
        self.state.read().high_seqno
    }

    fn get(&self, key: &[u8]) -> Result<Option<Document>> {
        Ok(self.state.read().live(key).cloned())
    }

    fn write(&self, write: DocumentWrite) -> Result<Document> {
        let cas = self.next_cas();
        let mut state = self.state.write();

        let live = state.live(&write.key);
        match write.mode {
            WriteMode::Insert if live.is_some() => return Err(MemdError::KeyExists),
            WriteMode::Replace if live.is_none() => return Err(MemdError::KeyNotFound),
            _ => {}
        }
        check_cas(live, write.cas)?;

        let rev_seqno = state
            .latest_version(&write.key)
            .map(|doc| doc.rev_seqno + 1)
            .unwrap_or(1);

        let doc = Document {
            vbucket: self.index,
            key: write.key,
            value: write.value,
            xattrs: write.xattrs,
            flags: write.flags,
            datatype: write.datatype,
            expiry: write.expiry,
            cas,
            seqno: 0,
            rev_seqno,
            is_deleted: false,
        };
        Ok(state.append(doc))
    }

    fn delete(&self, key: &[u8], cas: u64) -> Result<Document> {
        let new_cas = self.next_cas();
        let mut state = self.state.write();

        let live = state.live(key).ok_or(MemdError::KeyNotFound)?;
        check_cas(Some(live), cas)?;

        let tombstone = Document {
            vbucket: self.index,
            key: key.to_vec(),
            cas: new_cas,
            rev_seqno: live.rev_seqno + 1,
            is_deleted: true,
            ..Default::default()
        };
        Ok(state.append(tombstone))
    }
}
