// Configuration module for memd_mock
//
// Settings are read from a YAML file (all sections optional). Missing values
// fall back to the defaults in memd::constants, so an empty document yields a
// three node cluster with one "default" Couchbase bucket.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::memd::bucket::{BucketType, NewBucketOptions};
use crate::memd::constants::{
    DEFAULT_HOST, DEFAULT_KV_PORT, DEFAULT_NUM_NODES, DEFAULT_NUM_REPLICAS,
    DEFAULT_NUM_VBUCKETS, DEFAULT_PASSWORD, DEFAULT_SHUTDOWN_TIMEOUT_MS, DEFAULT_USERNAME,
    HEADER_LEN, MAX_BODY_LEN, MIN_SHUTDOWN_TIMEOUT_MS,
};
use crate::memd::dcp::SnapshotBounds;
use crate::memd::handler_context::{Credentials, HandlerSettings};

/// Highest replica count a bucket may be configured with
pub const MAX_REPLICAS: usize = 3;

/// Top-level configuration
#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    /// Buckets created at startup
    #[serde(default = "default_buckets")]
    pub buckets: Vec<BucketConfig>,

    #[serde(default)]
    pub dcp: DcpConfig,

    /// Log every accepted connection at info level
    #[serde(default)]
    pub log_connections: bool,

    /// How long shutdown waits for listeners to exit
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Largest frame body accepted from clients
    #[serde(default = "default_max_body_len")]
    pub max_body_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Number of simulated nodes (one listener each)
    #[serde(default = "default_num_nodes")]
    pub num_nodes: usize,

    /// Bind and advertise host
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the first node; node i listens on base_port + i.
    /// 0 binds every node to an ephemeral port.
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// vbuckets per Couchbase bucket
    #[serde(default = "default_num_vbuckets")]
    pub num_vbuckets: u16,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            num_nodes: default_num_nodes(),
            host: default_host(),
            base_port: default_base_port(),
            num_vbuckets: default_num_vbuckets(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password")]
    pub password: String,

    /// Refuse SELECT_BUCKET until SASL_AUTH succeeded
    #[serde(default = "default_true")]
    pub require_auth: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
            require_auth: true,
        }
    }
}

/// Custom Debug implementation that redacts the password
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("require_auth", &self.require_auth)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    pub name: String,

    /// "membase" (Couchbase) or "memcached"
    #[serde(rename = "type", default)]
    pub bucket_type: BucketType,

    #[serde(default = "default_num_replicas")]
    pub replicas: usize,
}

impl BucketConfig {
    pub fn to_options(&self) -> NewBucketOptions {
        NewBucketOptions {
            name: self.name.clone(),
            bucket_type: self.bucket_type,
            num_replicas: self.replicas,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DcpConfig {
    /// `requested` or `zero_start`
    #[serde(default)]
    pub snapshot_bounds: SnapshotBounds,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("cluster", &self.cluster)
            .field("auth", &self.auth)
            .field("buckets", &self.buckets)
            .field("dcp", &self.dcp)
            .field("log_connections", &self.log_connections)
            .field("shutdown_timeout_ms", &self.shutdown_timeout_ms)
            .field("max_body_len", &self.max_body_len)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            auth: AuthConfig::default(),
            buckets: default_buckets(),
            dcp: DcpConfig::default(),
            log_connections: false,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            max_body_len: default_max_body_len(),
        }
    }
}

// --- Defaults ---

fn default_num_nodes() -> usize {
    DEFAULT_NUM_NODES
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_base_port() -> u16 {
    DEFAULT_KV_PORT
}
fn default_num_vbuckets() -> u16 {
    DEFAULT_NUM_VBUCKETS
}
fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}
fn default_password() -> String {
    DEFAULT_PASSWORD.to_string()
}
fn default_true() -> bool {
    true
}
fn default_num_replicas() -> usize {
    DEFAULT_NUM_REPLICAS
}
fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}
fn default_max_body_len() -> usize {
    MAX_BODY_LEN
}
fn default_buckets() -> Vec<BucketConfig> {
    vec![BucketConfig {
        name: "default".to_string(),
        bucket_type: BucketType::Couchbase,
        replicas: DEFAULT_NUM_REPLICAS,
    }]
}

// --- Loading ---

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Validate that configuration values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.num_nodes == 0 {
            return Err(ConfigError::Invalid("cluster.num_nodes must be > 0".into()));
        }
        if self.cluster.num_vbuckets == 0 {
            return Err(ConfigError::Invalid(
                "cluster.num_vbuckets must be > 0".into(),
            ));
        }
        if self.cluster.base_port != 0
            && self.cluster.base_port as usize + self.cluster.num_nodes - 1 > u16::MAX as usize
        {
            return Err(ConfigError::Invalid(format!(
                "cluster.base_port {} leaves no room for {} nodes",
                self.cluster.base_port, self.cluster.num_nodes
            )));
        }
        if self.shutdown_timeout_ms < MIN_SHUTDOWN_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "shutdown_timeout_ms ({}) must be >= {}",
                self.shutdown_timeout_ms, MIN_SHUTDOWN_TIMEOUT_MS
            )));
        }
        if self.max_body_len < HEADER_LEN {
            return Err(ConfigError::Invalid(format!(
                "max_body_len ({}) must be >= {}",
                self.max_body_len, HEADER_LEN
            )));
        }

        let mut names = HashSet::new();
        for bucket in &self.buckets {
            if bucket.name.is_empty() {
                return Err(ConfigError::Invalid("bucket name must not be empty".into()));
            }
            if !names.insert(bucket.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate bucket '{}'",
                    bucket.name
                )));
            }
            if bucket.replicas > MAX_REPLICAS {
                return Err(ConfigError::Invalid(format!(
                    "bucket '{}' replicas ({}) must be <= {}",
                    bucket.name, bucket.replicas, MAX_REPLICAS
                )));
            }
        }
        Ok(())
    }

    /// Settings handed to every handler
    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            credentials: Credentials {
                username: self.auth.username.clone(),
                password: self.auth.password.clone(),
            },
            require_auth: self.auth.require_auth,
            snapshot_bounds: self.dcp.snapshot_bounds,
        }
    }
}

/// Load a `Config` from a YAML file path.
pub fn load_from_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    load_from_str(&contents)
}

/// Load a `Config` from a YAML string.
pub fn load_from_str(yaml: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}
