//! Leader Election
//!
//! Bully algorithm: a campaign challenges every higher node; if none of
//! them answers in time this node wins and announces itself as
//! coordinator, otherwise it steps back and lets the higher node carry
//! on. Only identifier magnitude decides, there are no terms.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::network::Transport;
use crate::state::{CampaignTicket, NodeId, NodeStore};

/// Election configuration
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// How long to wait for any higher node to answer
    pub answer_timeout: Duration,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            answer_timeout: Duration::from_secs(3),
        }
    }
}

/// How a call to [`ElectionCoordinator::start_election`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// No higher node answered; this node is now primary
    Won,
    /// A higher node answered and continues the election
    Deferred { responder: NodeId },
    /// A coordinator announcement arrived while waiting for answers
    Superseded,
    /// Another campaign was already running on this node
    AlreadyRunning,
}

/// Runs Bully campaigns for one node
pub struct ElectionCoordinator {
    store: Arc<NodeStore>,
    transport: Arc<dyn Transport>,
    config: ElectionConfig,
}

impl ElectionCoordinator {
    /// Create a new election coordinator
    pub fn new(
        store: Arc<NodeStore>,
        transport: Arc<dyn Transport>,
        config: ElectionConfig,
    ) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    /// Run one campaign to completion.
    ///
    /// Concurrent triggers collapse into the campaign already running:
    /// they return [`ElectionOutcome::AlreadyRunning`] and neither restart
    /// nor extend it.
    pub async fn start_election(&self) -> ElectionOutcome {
        let Some(ticket) = self.store.begin_election() else {
            tracing::debug!(
                "Node {}: election already in progress, not starting another",
                self.store.id()
            );
            return ElectionOutcome::AlreadyRunning;
        };

        let outcome = self.campaign(ticket).await;

        // No-op when an announcement already took the guard away
        self.store.end_election(ticket);

        tracing::debug!("Node {}: election finished: {:?}", self.store.id(), outcome);
        outcome
    }

    /// Start a campaign in the background
    pub fn spawn_election(self: &Arc<Self>) -> JoinHandle<ElectionOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.start_election().await })
    }

    /// Inbound ELECTION from a lower node. The HTTP answer itself is the
    /// "I am alive" reply; here we start our own campaign.
    pub fn on_election_message(self: &Arc<Self>) {
        tracing::info!("Node {}: received ELECTION message", self.store.id());
        self.spawn_election();
    }

    /// Inbound COORDINATOR announcement
    pub async fn on_coordinator_message(&self, primary_id: NodeId) {
        self.store.adopt_primary(primary_id).await;
    }

    async fn campaign(&self, ticket: CampaignTicket) -> ElectionOutcome {
        let id = self.store.id();

        // Resolves as soon as a coordinator announcement releases our guard
        let superseded = self.store.election_superseded(ticket);
        tokio::pin!(superseded);

        let higher = self.store.higher_peers();
        if higher.is_empty() {
            tracing::info!("Node {}: no node with a higher ID, declaring victory", id);
            self.announce_victory().await;
            return ElectionOutcome::Won;
        }

        tracing::info!(
            "Node {}: starting election, challenging nodes {:?}",
            id,
            higher.iter().map(|(peer_id, _)| *peer_id).collect::<Vec<_>>()
        );

        // Answers that arrive after the campaign resolved are dropped
        let (answer_tx, mut answer_rx) = mpsc::channel::<NodeId>(higher.len());
        for (peer_id, address) in higher {
            let transport = Arc::clone(&self.transport);
            let answer_tx = answer_tx.clone();
            tokio::spawn(async move {
                match transport.election(&address).await {
                    Ok(()) => {
                        let _ = answer_tx.send(peer_id).await;
                    }
                    Err(e) => {
                        tracing::debug!("Node {} did not answer ELECTION: {}", peer_id, e);
                    }
                }
            });
        }
        drop(answer_tx);

        let deadline = tokio::time::sleep(self.config.answer_timeout);
        tokio::pin!(deadline);
        let mut answers_open = true;

        loop {
            tokio::select! {
                biased;

                _ = &mut superseded => {
                    tracing::info!("Node {}: coordinator announced during campaign, standing down", id);
                    return ElectionOutcome::Superseded;
                }
                answer = answer_rx.recv(), if answers_open => match answer {
                    Some(responder) => {
                        tracing::info!(
                            "Node {}: node {} answered, leaving the election to it",
                            id,
                            responder
                        );
                        return ElectionOutcome::Deferred { responder };
                    }
                    // Every challenge failed; still wait out the full timeout
                    None => answers_open = false,
                },
                _ = &mut deadline => break,
            }
        }

        tracing::info!(
            "Node {}: no higher node answered within {:?}, declaring victory",
            id,
            self.config.answer_timeout
        );
        self.announce_victory().await;
        ElectionOutcome::Won
    }

    /// Become primary and tell everyone, without waiting for acknowledgments
    async fn announce_victory(&self) {
        let id = self.store.id();
        self.store.set_primary(true).await;

        tracing::info!("Node {}: won the election, announcing COORDINATOR", id);

        for (peer_id, address) in self.store.other_peers() {
            let transport = Arc::clone(&self.transport);
            tokio::spawn(async move {
                if let Err(e) = transport.coordinator(&address, id).await {
                    tracing::warn!("Could not announce coordinator to node {}: {}", peer_id, e);
                }
            });
        }
    }
}
