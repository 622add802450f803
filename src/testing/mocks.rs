//! Mock implementations of the storage traits and a test Config
//!
//! The storage mocks let DCP and handler tests script exactly what a
//! vbucket returns (including failures) without building real documents.

use std::sync::Arc;

use mockall::mock;

use crate::config::{AuthConfig, ClusterConfig, Config};
use crate::memd::constants::{DEFAULT_SHUTDOWN_TIMEOUT_MS, TEST_HOST};
use crate::memd::error::Result;
use crate::memd::storage::{Document, DocumentStore, DocumentWrite, VbucketStore};

mock! {
    pub VbucketStore {}

    impl VbucketStore for VbucketStore {
        fn index(&self) -> u16;
        fn get_all_mutations(&self, since_seqno: u64, limit: usize) -> Result<Vec<Document>>;
        fn high_seqno(&self) -> u64;
        fn get(&self, key: &[u8]) -> Result<Option<Document>>;
        fn write(&self, write: DocumentWrite) -> Result<Document>;
        fn delete(&self, key: &[u8], cas: u64) -> Result<Document>;
    }
}

mock! {
    pub DocumentStore {}

    impl DocumentStore for DocumentStore {
        fn num_vbuckets(&self) -> u16;
        fn vbucket(&self, index: u16) -> Result<Arc<dyn VbucketStore>>;
        fn flush(&self) -> Result<()>;
    }
}

/// Returns a Config suitable for in-process servers: ephemeral ports,
/// small vbucket count, auth not required
pub fn mock_config() -> Config {
    Config {
        cluster: ClusterConfig {
            num_nodes: 3,
            host: TEST_HOST.to_string(),
            base_port: 0,
            num_vbuckets: 8,
        },
        auth: AuthConfig {
            require_auth: false,
            ..Default::default()
        },
        log_connections: false,
        shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_config_is_valid() {
        let config = mock_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.cluster.base_port, 0);
        assert_eq!(config.cluster.host, TEST_HOST);
        assert_eq!(config.buckets.len(), 1);
        assert!(!config.auth.require_auth);
        assert!(!config.handler_settings().require_auth);
    }
}
