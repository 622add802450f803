//! Memcached binary protocol constants
//!
//! This module centralizes all magic numbers used by the memd protocol
//! implementation: frame magics, opcodes, status codes, datatype bits,
//! HELLO feature codes, DCP flags and the server defaults.
//!
//! # Terminology
//! - **Opcode**: Identifies which command a frame carries (e.g., 0x00 = Get, 0x53 = DcpStreamReq)
//! - **Opaque**: Client-chosen 32-bit value echoed back on every related response/push frame
//! - **vbucket**: One of the fixed partitions of a bucket's key space

// ===== Frame layout =====

/// Size of the fixed frame header (requests and responses alike)
pub const HEADER_LEN: usize = 24;

/// Largest frame body accepted from a client (20MB document + metadata headroom)
pub const MAX_BODY_LEN: usize = 21 * 1024 * 1024;

// ===== Magic bytes =====

/// Client → server request, and server-initiated push frames on DCP streams
pub const MAGIC_REQUEST: u8 = 0x80;

/// Server → client response
pub const MAGIC_RESPONSE: u8 = 0x81;

/// Request carrying flexible framing extras (alt request)
pub const MAGIC_ALT_REQUEST: u8 = 0x08;

/// Response carrying flexible framing extras (alt response)
pub const MAGIC_ALT_RESPONSE: u8 = 0x18;

// ===== Opcodes: key/value =====

/// Fetch a document
pub const CMD_GET: u8 = 0x00;

/// Unconditionally store a document
pub const CMD_SET: u8 = 0x01;

/// Store a document only if the key does not exist
pub const CMD_ADD: u8 = 0x02;

/// Store a document only if the key already exists
pub const CMD_REPLACE: u8 = 0x03;

/// Remove a document (writes a tombstone)
pub const CMD_DELETE: u8 = 0x04;

/// Keepalive
pub const CMD_NOOP: u8 = 0x0a;

/// Feature negotiation
pub const CMD_HELLO: u8 = 0x1f;

/// List supported SASL mechanisms
pub const CMD_SASL_LIST_MECHS: u8 = 0x20;

/// SASL authentication
pub const CMD_SASL_AUTH: u8 = 0x21;

/// High seqno of every vbucket owned by the node
pub const CMD_GET_ALL_VB_SEQNOS: u8 = 0x48;

/// Fetch a document from a replica vbucket
pub const CMD_GET_REPLICA: u8 = 0x83;

/// Bind the connection to a bucket
pub const CMD_SELECT_BUCKET: u8 = 0x89;

/// Fetch the cluster/bucket topology JSON
pub const CMD_GET_CLUSTER_CONFIG: u8 = 0xb5;

/// Fetch the bucket's collection manifest JSON
pub const CMD_GET_COLLECTIONS_MANIFEST: u8 = 0xba;

// ===== Opcodes: DCP =====

/// Open a DCP connection (producer or consumer)
pub const CMD_DCP_OPEN_CONNECTION: u8 = 0x50;

/// Close an open stream
pub const CMD_DCP_CLOSE_STREAM: u8 = 0x52;

/// Request a stream for one vbucket
pub const CMD_DCP_STREAM_REQ: u8 = 0x53;

/// Fetch the failover log of a vbucket
pub const CMD_DCP_GET_FAILOVER_LOG: u8 = 0x54;

/// Server push: stream finished
pub const CMD_DCP_STREAM_END: u8 = 0x55;

/// Server push: snapshot boundaries of the following mutations
pub const CMD_DCP_SNAPSHOT_MARKER: u8 = 0x56;

/// Server push: document mutation
pub const CMD_DCP_MUTATION: u8 = 0x57;

/// Server push: document deletion
pub const CMD_DCP_DELETION: u8 = 0x58;

/// Control negotiation (flow control, noops, feature toggles)
pub const CMD_DCP_CONTROL: u8 = 0x5e;

// ===== Status codes =====

pub const STATUS_SUCCESS: u16 = 0x00;
pub const STATUS_KEY_ENOENT: u16 = 0x01;
pub const STATUS_KEY_EEXISTS: u16 = 0x02;
pub const STATUS_TOO_BIG: u16 = 0x03;
pub const STATUS_EINVAL: u16 = 0x04;
pub const STATUS_NOT_STORED: u16 = 0x05;
pub const STATUS_NOT_MY_VBUCKET: u16 = 0x07;
pub const STATUS_NO_BUCKET: u16 = 0x08;
pub const STATUS_AUTH_ERROR: u16 = 0x20;
pub const STATUS_ERANGE: u16 = 0x22;
pub const STATUS_UNKNOWN_COMMAND: u16 = 0x81;
pub const STATUS_NOT_SUPPORTED: u16 = 0x83;
pub const STATUS_INTERNAL_ERROR: u16 = 0x84;

// ===== Datatype bits =====

pub const DATATYPE_RAW: u8 = 0x00;
pub const DATATYPE_JSON: u8 = 0x01;
pub const DATATYPE_SNAPPY: u8 = 0x02;

/// Value is prefixed with an extended-attribute block
pub const DATATYPE_XATTR: u8 = 0x04;

// ===== HELLO features =====

pub const FEATURE_DATATYPE: u16 = 0x01;
pub const FEATURE_TCP_NODELAY: u16 = 0x03;
pub const FEATURE_MUTATION_SEQNO: u16 = 0x04;
pub const FEATURE_XATTR: u16 = 0x06;
pub const FEATURE_XERROR: u16 = 0x07;
pub const FEATURE_SELECT_BUCKET: u16 = 0x08;
pub const FEATURE_JSON: u16 = 0x0b;
pub const FEATURE_DUPLEX: u16 = 0x0c;
pub const FEATURE_ALT_REQUESTS: u16 = 0x10;

/// Features this server acknowledges in HELLO responses
pub const SUPPORTED_FEATURES: &[u16] = &[
    FEATURE_DATATYPE,
    FEATURE_TCP_NODELAY,
    FEATURE_MUTATION_SEQNO,
    FEATURE_XATTR,
    FEATURE_XERROR,
    FEATURE_SELECT_BUCKET,
    FEATURE_JSON,
    FEATURE_DUPLEX,
    FEATURE_ALT_REQUESTS,
];

// ===== DCP =====

/// Extras length of a stream request
pub const DCP_STREAM_REQ_EXTRAS_LEN: usize = 48;

/// Extras length of a snapshot marker
pub const DCP_SNAPSHOT_MARKER_EXTRAS_LEN: usize = 20;

/// Extras length of a mutation
pub const DCP_MUTATION_EXTRAS_LEN: usize = 28;

/// Extras length of a deletion
pub const DCP_DELETION_EXTRAS_LEN: usize = 18;

/// Extras length of a stream end
pub const DCP_STREAM_END_EXTRAS_LEN: usize = 4;

/// Open-connection flag: the client wants to consume from us (we produce)
pub const DCP_OPEN_PRODUCER: u32 = 0x01;

/// Snapshot marker type: in-memory snapshot
pub const DCP_SNAPSHOT_MEMORY: u32 = 0x01;

/// Stream end flag: stream finished normally
pub const DCP_STREAM_END_OK: u32 = 0x00;

/// Stream end flag: reading the backfill from storage failed
pub const DCP_STREAM_END_BACKFILL_FAIL: u32 = 0x05;

// ===== Defaults =====

/// Default KV port of the first node
pub const DEFAULT_KV_PORT: u16 = 11210;

/// Default bind/advertise host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Host used by test configurations
pub const TEST_HOST: &str = "127.0.0.1";

/// Default number of simulated nodes
pub const DEFAULT_NUM_NODES: usize = 3;

/// Conventional vbucket count of a Couchbase bucket
pub const DEFAULT_NUM_VBUCKETS: u16 = 1024;

/// Default replica count of provisioned buckets
pub const DEFAULT_NUM_REPLICAS: usize = 1;

/// Default graceful shutdown timeout
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// Minimum shutdown timeout accepted by config validation
pub const MIN_SHUTDOWN_TIMEOUT_MS: u64 = 100;

/// Default SASL credentials
pub const DEFAULT_USERNAME: &str = "Administrator";
pub const DEFAULT_PASSWORD: &str = "password";

/// The only SASL mechanism offered
pub const SASL_MECH_PLAIN: &str = "PLAIN";

/// Human readable name of an opcode, for logs
pub fn opcode_name(opcode: u8) -> &'static str {
    match opcode {
        CMD_GET => "Get",
        CMD_SET => "Set",
        CMD_ADD => "Add",
        CMD_REPLACE => "Replace",
        CMD_DELETE => "Delete",
        CMD_NOOP => "Noop",
        CMD_HELLO => "Hello",
        CMD_SASL_LIST_MECHS => "SaslListMechs",
        CMD_SASL_AUTH => "SaslAuth",
        CMD_GET_ALL_VB_SEQNOS => "GetAllVbSeqnos",
        CMD_GET_REPLICA => "GetReplica",
        CMD_SELECT_BUCKET => "SelectBucket",
        CMD_GET_CLUSTER_CONFIG => "GetClusterConfig",
        CMD_GET_COLLECTIONS_MANIFEST => "GetCollectionsManifest",
        CMD_DCP_OPEN_CONNECTION => "DcpOpenConnection",
        CMD_DCP_CLOSE_STREAM => "DcpCloseStream",
        CMD_DCP_STREAM_REQ => "DcpStreamReq",
        CMD_DCP_GET_FAILOVER_LOG => "DcpGetFailoverLog",
        CMD_DCP_STREAM_END => "DcpStreamEnd",
        CMD_DCP_SNAPSHOT_MARKER => "DcpSnapshotMarker",
        CMD_DCP_MUTATION => "DcpMutation",
        CMD_DCP_DELETION => "DcpDeletion",
        CMD_DCP_CONTROL => "DcpControl",
        _ => "Unknown",
    }
}
