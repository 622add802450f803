//! memd-mock: runs a simulated cluster speaking the memcached binary
//! protocol with DCP.
//!
//! Usage: `memd-mock [config.yaml]`. Without an argument the built-in
//! defaults are used (three nodes on 127.0.0.1:11210.., one "default"
//! bucket). Log verbosity follows `RUST_LOG`, defaulting to `info`.

use std::path::Path;

use memd_mock::config::{self, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => config::load_from_file(Path::new(&path))?,
        None => Config::default(),
    };
    tracing::info!("Starting memd-mock with {:?}", config);

    memd_mock::worker::run(config).await?;
    Ok(())
}
