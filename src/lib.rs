// memd_mock: a mock cluster speaking the memcached binary protocol and its
// DCP change-stream extension, for exercising clients without a real server.

pub mod config; // Configuration (YAML file + defaults)
pub mod memd; // Protocol, cluster model, handlers, listener
pub mod worker; // Server lifecycle (bind, spawn listeners, shutdown)

// Test utilities (only compiled in test builds)
#[cfg(test)]
pub mod testing;

pub use config::Config;
pub use worker::MockServer;
