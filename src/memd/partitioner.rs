//! Smart-client compatible key partitioner
//!
//! Maps a document key to its vbucket the same way Couchbase SDKs do before
//! sending a request: CRC32 of the key, take bits 16..31, mask to 15 bits,
//! modulo the vbucket count.
//!
//! Uses the `crc32fast` crate (IEEE polynomial), matching the "CRC" hash
//! algorithm advertised in the bucket's vBucketServerMap.

/// Compute the vbucket owning `key`
///
/// # Arguments
/// * `key` - Document key bytes
/// * `num_vbuckets` - Number of vbuckets in the bucket (must be > 0)
///
/// # Returns
/// vbucket index in `0..num_vbuckets`
pub fn vbucket_for_key(key: &[u8], num_vbuckets: u16) -> u16 {
    debug_assert!(num_vbuckets > 0, "num_vbuckets must be positive");
    let crc = crc32fast::hash(key);
    let hashed = (crc >> 16) & 0x7fff;
    (hashed % num_vbuckets as u32) as u16
}
