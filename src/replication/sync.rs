//! Startup catch-up: a secondary pulls the primary's full state once.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::network::Transport;
use crate::state::{NodeId, NodeStore};

/// Result of one synchronization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// This node is primary and never pulls
    Primary,
    /// No usable primary is known
    NoPrimary,
    /// Local state replaced by the primary's
    Synced { primary_id: NodeId, sequence_number: u64 },
    /// The fetch failed; nothing changed
    Failed { primary_id: NodeId },
}

/// One-shot state synchronizer
pub struct Synchronizer {
    store: Arc<NodeStore>,
    transport: Arc<dyn Transport>,
    /// Delay before the attempt, to let the startup election settle
    delay: Duration,
}

impl Synchronizer {
    pub fn new(store: Arc<NodeStore>, transport: Arc<dyn Transport>, delay: Duration) -> Self {
        Self {
            store,
            transport,
            delay,
        }
    }

    /// Wait, then sync once. Only a persistence failure is returned.
    pub async fn run(&self) -> Result<SyncOutcome> {
        tokio::time::sleep(self.delay).await;
        self.sync_once().await
    }

    /// Replace local state with the primary's. No retry on failure; the
    /// heartbeat monitor takes care of establishing a primary.
    pub async fn sync_once(&self) -> Result<SyncOutcome> {
        let id = self.store.id();
        let role = self.store.role().await;

        if role.is_primary {
            tracing::debug!("Node {}: primary, skipping state sync", id);
            return Ok(SyncOutcome::Primary);
        }

        let address = match role.primary_id {
            0 => None,
            primary if primary == id => None,
            primary => self.store.peer_address(primary),
        };
        let Some(address) = address else {
            tracing::warn!(
                "Node {}: no usable primary (known: {}), skipping state sync",
                id,
                role.primary_id
            );
            return Ok(SyncOutcome::NoPrimary);
        };

        tracing::info!("Node {}: syncing state from primary {}", id, role.primary_id);

        let state = match self.transport.fetch_state(address).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    "Node {}: state sync from primary {} failed: {}",
                    id,
                    role.primary_id,
                    e
                );
                return Ok(SyncOutcome::Failed {
                    primary_id: role.primary_id,
                });
            }
        };

        let sequence_number = state.sequence_number;
        self.store.set_state(state).await?;

        tracing::info!(
            "Node {}: synced with primary {}, sequence number {}",
            id,
            role.primary_id,
            sequence_number
        );
        Ok(SyncOutcome::Synced {
            primary_id: role.primary_id,
            sequence_number,
        })
    }
}
