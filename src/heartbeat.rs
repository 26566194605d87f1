//! Heartbeat Monitor
//!
//! Secondaries probe the primary on a fixed tick and start an election
//! when it does not answer. A slow primary and a dead one are treated
//! the same.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::network::Transport;
use crate::state::{ElectionCoordinator, NodeId, NodeStore};

/// What a single tick decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// This node is primary, nothing to watch
    Primary,
    /// No primary known; an election was triggered without probing
    NoPrimary,
    /// Known primary is this node itself while not primary
    SelfPrimary,
    /// Primary is not in the peer map; nothing to probe
    UnknownAddress(NodeId),
    /// Primary answered the probe
    Healthy(NodeId),
    /// Probe failed; an election was triggered
    PrimaryUnreachable(NodeId),
}

/// Periodic liveness check of the current primary
pub struct HeartbeatMonitor {
    store: Arc<NodeStore>,
    transport: Arc<dyn Transport>,
    election: Arc<ElectionCoordinator>,
    /// Delay before the first tick
    grace: Duration,
    /// Time between ticks
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(
        store: Arc<NodeStore>,
        transport: Arc<dyn Transport>,
        election: Arc<ElectionCoordinator>,
        grace: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            election,
            grace,
            interval,
        }
    }

    /// Run forever. Cancelled by aborting the task.
    pub async fn run(&self) {
        tokio::time::sleep(self.grace).await;
        tracing::debug!(
            "Node {}: heartbeat monitor started, interval {:?}",
            self.store.id(),
            self.interval
        );

        // First tick completes at once: probe right after the grace period
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One probe. Never retries; the next chance is the next tick.
    pub async fn tick(&self) -> TickOutcome {
        let id = self.store.id();
        let role = self.store.role().await;

        if role.is_primary {
            return TickOutcome::Primary;
        }

        if role.primary_id == 0 {
            tracing::info!("Node {}: no known primary, starting election", id);
            self.election.spawn_election();
            return TickOutcome::NoPrimary;
        }

        if role.primary_id == id {
            return TickOutcome::SelfPrimary;
        }

        let Some(address) = self.store.peer_address(role.primary_id) else {
            tracing::warn!("Node {}: primary {} is not in the peer map", id, role.primary_id);
            return TickOutcome::UnknownAddress(role.primary_id);
        };

        match self.transport.heartbeat(address).await {
            Ok(()) => {
                tracing::trace!("Node {}: primary {} is alive", id, role.primary_id);
                TickOutcome::Healthy(role.primary_id)
            }
            Err(e) => {
                tracing::warn!(
                    "Node {}: primary {} failed heartbeat ({}), starting election",
                    id,
                    role.primary_id,
                    e
                );
                self.election.spawn_election();
                TickOutcome::PrimaryUnreachable(role.primary_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::{Call, MockTransport};
    use crate::state::{ElectionConfig, StateFile};
    use std::collections::BTreeMap;
    use std::time::Instant;
    use tempfile::{tempdir, TempDir};

    fn addr(id: NodeId) -> String {
        format!("127.0.0.1:{}", 9090 + id)
    }

    fn setup(id: NodeId) -> (TempDir, Arc<NodeStore>, Arc<MockTransport>, HeartbeatMonitor) {
        let dir = tempdir().unwrap();
        let peers: BTreeMap<NodeId, String> = (1..=3).map(|p| (p, addr(p))).collect();
        let file = StateFile::new(dir.path().join("state.json"));
        let store = Arc::new(NodeStore::open(id, peers, file).unwrap());
        let mock = Arc::new(MockTransport::new());
        let transport = mock.clone() as Arc<dyn Transport>;
        let election = Arc::new(ElectionCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            ElectionConfig {
                answer_timeout: Duration::from_millis(50),
            },
        ));
        let monitor = HeartbeatMonitor::new(
            Arc::clone(&store),
            transport,
            election,
            Duration::from_millis(10),
            Duration::from_millis(20),
        );
        (dir, store, mock, monitor)
    }

    #[tokio::test]
    async fn test_primary_does_not_probe() {
        let (_dir, store, mock, monitor) = setup(3);
        store.set_primary(true).await;

        assert_eq!(monitor.tick().await, TickOutcome::Primary);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_healthy_primary() {
        let (_dir, store, mock, monitor) = setup(1);

        assert_eq!(monitor.tick().await, TickOutcome::Healthy(3));
        assert_eq!(mock.calls(), vec![Call::Heartbeat(addr(3))]);
        assert_eq!(store.primary_id().await, 3);
        assert!(!store.election_in_progress());
    }

    #[tokio::test]
    async fn test_unreachable_primary_triggers_election() {
        let (_dir, store, mock, monitor) = setup(2);
        mock.set_down(&addr(3));

        assert_eq!(monitor.tick().await, TickOutcome::PrimaryUnreachable(3));

        // Node 2 is the highest live node, so its campaign wins
        assert!(mock.wait_for(1, |c| matches!(c, Call::Coordinator(_, 2))).await);
        assert!(store.is_primary().await);
    }

    #[tokio::test]
    async fn test_unknown_primary_skips_probe() {
        let (_dir, store, mock, monitor) = setup(1);
        store.set_primary_id(0).await;
        mock.set_election_delay(Duration::from_millis(100));

        assert_eq!(monitor.tick().await, TickOutcome::NoPrimary);
        assert!(mock.wait_for(2, |c| matches!(c, Call::Election(_))).await);
        assert_eq!(mock.count(|c| matches!(c, Call::Heartbeat(_))), 0);
    }

    #[tokio::test]
    async fn test_self_as_primary_is_noop() {
        let (_dir, store, mock, monitor) = setup(2);
        store.set_primary_id(2).await;

        assert_eq!(monitor.tick().await, TickOutcome::SelfPrimary);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_primary_missing_from_peer_map() {
        let (_dir, store, mock, monitor) = setup(1);
        store.set_primary_id(42).await;

        assert_eq!(monitor.tick().await, TickOutcome::UnknownAddress(42));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_first_heartbeat_follows_grace_then_interval() {
        let (_dir, _store, mock, monitor) = setup(1);
        let monitor = HeartbeatMonitor {
            grace: Duration::from_millis(50),
            interval: Duration::from_millis(600),
            ..monitor
        };

        let started = Instant::now();
        let task = tokio::spawn(async move { monitor.run().await });

        assert!(mock.wait_for(1, |c| matches!(c, Call::Heartbeat(_))).await);
        let first = started.elapsed();
        assert!(first >= Duration::from_millis(50), "heartbeat during grace: {:?}", first);
        assert!(first < Duration::from_millis(400), "first heartbeat late: {:?}", first);

        assert!(mock.wait_for(2, |c| matches!(c, Call::Heartbeat(_))).await);
        let gap = started.elapsed() - first;
        assert!(gap >= Duration::from_millis(500), "heartbeats too close: {:?}", gap);
        assert!(gap < Duration::from_millis(1000), "heartbeats too far apart: {:?}", gap);

        task.abort();
    }

    #[tokio::test]
    async fn test_run_probes_repeatedly() {
        let (_dir, _store, mock, monitor) = setup(1);

        let task = tokio::spawn(async move { monitor.run().await });
        assert!(mock.wait_for(3, |c| matches!(c, Call::Heartbeat(_))).await);
        task.abort();
    }
}
