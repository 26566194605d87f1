//! Node Runtime
//!
//! Wires one node together and supervises its activities: the HTTP
//! listener, the startup election, the heartbeat monitor and the one-shot
//! synchronizer. A fatal error from any of them stops the whole node.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::{AppState, HttpServer};
use crate::config::BullyScaleConfig;
use crate::error::{Error, Result};
use crate::heartbeat::HeartbeatMonitor;
use crate::network::{HttpTransport, PeerTimeouts, Transport};
use crate::replication::{Replicator, Synchronizer};
use crate::state::{ElectionConfig, ElectionCoordinator, NodeStore, StateFile};

/// A node that has loaded its state but is not running yet
pub struct Node {
    config: BullyScaleConfig,
    store: Arc<NodeStore>,
    transport: Arc<dyn Transport>,
    election: Arc<ElectionCoordinator>,
    replicator: Arc<Replicator>,
}

impl Node {
    /// Open a node talking HTTP to its peers.
    ///
    /// Fails if the configuration is invalid or the persisted state cannot
    /// be loaded; the process must not start in that case.
    pub fn open(config: BullyScaleConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(PeerTimeouts::from(&config.timing))?);
        Self::with_transport(config, transport)
    }

    /// Open a node with a custom transport
    pub fn with_transport(config: BullyScaleConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let file = StateFile::new(config.state_file());
        let store = Arc::new(NodeStore::open(config.node.id, config.peer_map(), file)?);

        let election = Arc::new(ElectionCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            ElectionConfig {
                answer_timeout: config.timing.election_timeout(),
            },
        ));
        let replicator = Arc::new(Replicator::new(Arc::clone(&store), Arc::clone(&transport)));

        Ok(Self {
            config,
            store,
            transport,
            election,
            replicator,
        })
    }

    pub fn store(&self) -> Arc<NodeStore> {
        Arc::clone(&self.store)
    }

    /// Bind this node's own peer-map address
    pub async fn bind(&self) -> Result<TcpListener> {
        let address = self
            .config
            .listen_address()
            .ok_or(Error::UnknownPeer(self.config.node.id))?;
        Ok(TcpListener::bind(address).await?)
    }

    /// Start every activity of the node on an already bound listener
    pub fn start(self, listener: TcpListener) -> Result<NodeHandle> {
        let local_addr = listener.local_addr()?;
        let id = self.store.id();
        let timing = &self.config.timing;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        let server = HttpServer::new(Arc::new(AppState {
            store: Arc::clone(&self.store),
            election: Arc::clone(&self.election),
            replicator: Arc::clone(&self.replicator),
            fatal_tx: fatal_tx.clone(),
            started_at: Utc::now(),
        }));
        let server = tokio::spawn(server.serve(listener, async move {
            let _ = shutdown_rx.changed().await;
        }));

        let mut tasks = Vec::new();

        // The listener is bound, so answers to our own challenges can arrive
        let election = Arc::clone(&self.election);
        tasks.push(tokio::spawn(async move {
            tracing::info!("Node {}: announcing presence with an election", id);
            election.start_election().await;
        }));

        let monitor = HeartbeatMonitor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.transport),
            Arc::clone(&self.election),
            timing.startup_grace(),
            timing.heartbeat_interval(),
        );
        tasks.push(tokio::spawn(async move { monitor.run().await }));

        let synchronizer = Synchronizer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.transport),
            timing.sync_delay(),
        );
        tasks.push(tokio::spawn(async move {
            if let Err(e) = synchronizer.run().await {
                tracing::error!("Node {}: state sync failed: {}", id, e);
                let _ = fatal_tx.send(e);
            }
        }));

        tracing::info!("Node {} started on {}", id, local_addr);

        Ok(NodeHandle {
            store: self.store,
            local_addr,
            shutdown_tx,
            server: Some(server),
            tasks,
            fatal_rx,
        })
    }
}

/// Handle to a running node
pub struct NodeHandle {
    store: Arc<NodeStore>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    server: Option<JoinHandle<Result<()>>>,
    tasks: Vec<JoinHandle<()>>,
    fatal_rx: mpsc::UnboundedReceiver<Error>,
}

impl NodeHandle {
    pub fn store(&self) -> Arc<NodeStore> {
        Arc::clone(&self.store)
    }

    /// Address the HTTP API is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run until the HTTP server exits or a fatal error is reported, then
    /// stop everything. A fatal error is returned.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(server) = self.server.as_mut() else {
            return Ok(());
        };

        let (result, server_done) = tokio::select! {
            joined = server => {
                let result = joined
                    .map_err(|e| Error::Internal(format!("HTTP server task failed: {}", e)))
                    .and_then(|r| r);
                (result, true)
            }
            Some(e) = self.fatal_rx.recv() => (Err(e), false),
        };

        if server_done {
            self.server = None;
        }
        self.shutdown().await;
        result
    }

    /// Stop every task and close the listener
    pub async fn shutdown(&mut self) {
        let id = self.store.id();
        tracing::info!("Node {}: shutting down", id);

        let _ = self.shutdown_tx.send(true);

        for task in &self.tasks {
            task.abort();
        }
        futures::future::join_all(self.tasks.drain(..)).await;

        if let Some(server) = self.server.take() {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Node {}: HTTP server error: {}", id, e),
                Err(e) => tracing::warn!("Node {}: HTTP server task failed: {}", id, e),
            }
        }
    }
}
