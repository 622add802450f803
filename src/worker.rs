// Server lifecycle for memd_mock
//
// Builds the simulated cluster from a Config and runs one listener task per
// node. The startup order matters:
// 1. Bind every node's listener first, so ephemeral ports are known
// 2. Create the ClusterNodes from the bound addresses
// 3. Create the cluster and its buckets (vbucket maps reference the nodes)
// 4. Spawn the listeners
//
// Shutdown flips a watch channel observed by every accept loop and every
// connection, then waits (bounded by shutdown_timeout_ms) for the listener
// tasks to finish.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::memd::cluster::Cluster;
use crate::memd::error::{MemdError, Result};
use crate::memd::handler_context::HandlerContext;
use crate::memd::handlers::default_registry;
use crate::memd::listener::{self, ListenerOptions};
use crate::memd::topology::ClusterNode;

/// A running mock cluster
pub struct MockServer {
    cluster: Arc<Cluster>,
    node_addrs: Vec<SocketAddr>,
    shutdown_tx: watch::Sender<bool>,
    listeners: Vec<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl MockServer {
    /// Bind all nodes, create the configured buckets and start serving
    pub async fn start(config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| MemdError::InvalidConfig(e.to_string()))?;

        let host = config.cluster.host.as_str();
        let mut bound = Vec::with_capacity(config.cluster.num_nodes);
        for i in 0..config.cluster.num_nodes {
            let port = if config.cluster.base_port == 0 {
                0
            } else {
                config.cluster.base_port + i as u16
            };
            let listener = TcpListener::bind((host, port)).await?;
            let addr = listener.local_addr()?;
            bound.push((listener, ClusterNode::new(host, addr.port()), addr));
        }

        let nodes: Vec<ClusterNode> = bound.iter().map(|(_, node, _)| node.clone()).collect();
        let cluster = Arc::new(Cluster::new(nodes, config.cluster.num_vbuckets));
        for bucket in &config.buckets {
            cluster.add_bucket(bucket.to_options())?;
        }

        let registry = Arc::new(default_registry());
        let settings = config.handler_settings();
        let options = ListenerOptions {
            log_connections: config.log_connections,
            max_body_len: config.max_body_len,
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut node_addrs = Vec::with_capacity(bound.len());
        let mut listeners = Vec::with_capacity(bound.len());
        for (tcp, node, addr) in bound {
            let ctx = Arc::new(HandlerContext::new(
                Arc::clone(&cluster),
                node,
                settings.clone(),
            ));
            let registry = Arc::clone(&registry);
            let shutdown_rx = shutdown_rx.clone();
            listeners.push(tokio::spawn(async move {
                if let Err(e) = listener::run(tcp, registry, ctx, options, shutdown_rx).await {
                    error!("Listener on {} failed: {}", addr, e);
                }
            }));
            node_addrs.push(addr);
        }

        info!(
            "memd mock started: {} nodes, buckets {:?}",
            node_addrs.len(),
            cluster.bucket_names()
        );

        Ok(Self {
            cluster,
            node_addrs,
            shutdown_tx,
            listeners,
            shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
        })
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    /// Bound address of every node, in node order
    pub fn node_addrs(&self) -> &[SocketAddr] {
        &self.node_addrs
    }

    /// Signal every listener and wait for them, up to the shutdown timeout
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        let all = futures::future::join_all(self.listeners);
        match tokio::time::timeout(self.shutdown_timeout, all).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!("Listener task failed during shutdown: {:?}", e);
                    }
                }
                info!("memd mock shut down cleanly");
            }
            Err(_) => warn!("memd mock shutdown timed out"),
        }
    }
}

/// Run until ctrl-c, then shut down
pub async fn run(config: Config) -> Result<()> {
    let server = MockServer::start(&config).await?;
    for (i, addr) in server.node_addrs().iter().enumerate() {
        info!("Node {} serving on {}", i, addr);
    }

    tokio::signal::ctrl_c().await?;
    info!("Received ctrl-c, shutting down");
    server.shutdown().await;
    Ok(())
}
