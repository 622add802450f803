//! Testing utilities for memd_mock
//!
//! Only compiled when running tests.
//!
//! # Organization
//! - `mocks.rs` - mockall doubles of the storage traits, test Config
//! - `helpers.rs` - recording writers, test clusters/sessions, request builders

#![cfg(test)]

pub mod helpers;
pub mod mocks;

// Re-export commonly used items
pub use helpers::{mock_session, session_on_node, test_cluster, RecordingWriter};
pub use mocks::mock_config;
