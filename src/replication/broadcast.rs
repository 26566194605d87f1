//! Replication Broadcaster
//!
//! The primary appends client writes locally and pushes its entire state
//! to every secondary. Delivery is best-effort: the client is answered as
//! soon as the local append is durable.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::network::Transport;
use crate::state::{Event, NodeStore, ReplicatedState};

/// Accepts client writes on the primary and full-state pushes on secondaries
pub struct Replicator {
    store: Arc<NodeStore>,
    transport: Arc<dyn Transport>,
}

impl Replicator {
    pub fn new(store: Arc<NodeStore>, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    /// Handle a client write.
    ///
    /// Rejected without mutation on a non-primary ([`Error::NotPrimary`])
    /// or when `value` is missing ([`Error::InvalidRequest`]). A
    /// persistence error is fatal and returned as-is. On success returns
    /// the new event and the resulting sequence number; the broadcast runs
    /// in the background.
    pub async fn submit_event(&self, value: Option<String>) -> Result<(Event, u64)> {
        // Cheap early answer so a secondary never reports a payload error;
        // the append below checks the role again under the write lock
        if !self.store.is_primary().await {
            return Err(Error::NotPrimary(self.store.primary_id().await));
        }

        let value = value.ok_or_else(|| Error::InvalidRequest("field 'value' is required".into()))?;

        let (event, state) = self.store.add_event_as_primary(value).await?;
        let sequence_number = state.sequence_number;

        self.broadcast(state);
        Ok((event, sequence_number))
    }

    /// Handle a full-state push from the primary
    ///
    /// Refused with [`Error::InvalidRequest`] while this node is primary.
    pub async fn apply_state(&self, state: ReplicatedState) -> Result<()> {
        tracing::info!(
            "Node {}: received state from primary, sequence number {}",
            self.store.id(),
            state.sequence_number
        );
        self.store.set_state_as_secondary(state).await
    }

    /// Send `state` to every other peer in parallel, without waiting
    fn broadcast(&self, state: ReplicatedState) {
        let state = Arc::new(state);

        for (peer_id, address) in self.store.other_peers() {
            let transport = Arc::clone(&self.transport);
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                match transport.replicate(&address, &state).await {
                    Ok(()) => tracing::debug!(
                        "Replicated sequence number {} to node {}",
                        state.sequence_number,
                        peer_id
                    ),
                    Err(e) => tracing::warn!("Failed to replicate to node {}: {}", peer_id, e),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::{Call, MockTransport};
    use crate::state::{NodeId, StateFile};
    use std::collections::BTreeMap;
    use tempfile::{tempdir, TempDir};

    fn addr(id: NodeId) -> String {
        format!("127.0.0.1:{}", 7070 + id)
    }

    fn setup(id: NodeId) -> (TempDir, Arc<NodeStore>, Arc<MockTransport>, Replicator) {
        let dir = tempdir().unwrap();
        let peers: BTreeMap<NodeId, String> = (1..=3).map(|p| (p, addr(p))).collect();
        let file = StateFile::new(dir.path().join("state.json"));
        let store = Arc::new(NodeStore::open(id, peers, file).unwrap());
        let mock = Arc::new(MockTransport::new());
        let replicator = Replicator::new(Arc::clone(&store), mock.clone() as Arc<dyn Transport>);
        (dir, store, mock, replicator)
    }

    #[tokio::test]
    async fn test_submit_on_primary_broadcasts_full_state() {
        let (_dir, store, mock, replicator) = setup(3);
        store.set_primary(true).await;

        let (event, seq) = replicator.submit_event(Some("hello".into())).await.unwrap();
        assert_eq!(event, Event { id: 1, value: "hello".into() });
        assert_eq!(seq, 1);

        assert!(mock.wait_for(2, |c| matches!(c, Call::Replicate(..))).await);
        let expected = store.snapshot().await;
        for call in mock.calls() {
            match call {
                Call::Replicate(address, state) => {
                    assert_ne!(address, addr(3));
                    assert_eq!(state, expected);
                }
                other => panic!("unexpected call {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_submit_succeeds_with_secondaries_down() {
        let (_dir, store, mock, replicator) = setup(3);
        store.set_primary(true).await;
        mock.set_down(&addr(1));
        mock.set_down(&addr(2));

        replicator.submit_event(Some("a".into())).await.unwrap();
        let (_, seq) = replicator.submit_event(Some("b".into())).await.unwrap();
        assert_eq!(seq, 2);
        assert_eq!(store.snapshot().await.event_log.len(), 2);
    }

    #[tokio::test]
    async fn test_submit_on_secondary_is_rejected() {
        let (_dir, store, mock, replicator) = setup(1);

        let err = replicator.submit_event(Some("x".into())).await.unwrap_err();
        assert!(matches!(err, Error::NotPrimary(3)));
        assert_eq!(store.snapshot().await, ReplicatedState::default());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_role_checked_before_payload() {
        let (_dir, _store, _mock, replicator) = setup(1);

        let err = replicator.submit_event(None).await.unwrap_err();
        assert!(matches!(err, Error::NotPrimary(_)));
    }

    #[tokio::test]
    async fn test_missing_value_is_rejected() {
        let (_dir, store, _mock, replicator) = setup(3);
        store.set_primary(true).await;

        let err = replicator.submit_event(None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(store.sequence_number().await, 0);
    }

    #[tokio::test]
    async fn test_demoted_primary_rejects_writes() {
        let (_dir, store, mock, replicator) = setup(3);
        store.set_primary(true).await;
        replicator.submit_event(Some("before".into())).await.unwrap();
        assert!(mock.wait_for(2, |c| matches!(c, Call::Replicate(..))).await);

        store.adopt_primary(2).await;
        let err = replicator.submit_event(Some("late".into())).await.unwrap_err();
        assert!(matches!(err, Error::NotPrimary(2)));
        assert_eq!(store.sequence_number().await, 1);
        assert_eq!(mock.count(|c| matches!(c, Call::Replicate(..))), 2);
    }

    #[tokio::test]
    async fn test_apply_state() {
        let (_dir, store, _mock, replicator) = setup(1);

        let mut state = ReplicatedState::default();
        state.append("one".into());
        state.append("two".into());

        replicator.apply_state(state.clone()).await.unwrap();
        assert_eq!(store.snapshot().await, state);
    }

    #[tokio::test]
    async fn test_primary_rejects_state_update() {
        let (_dir, store, _mock, replicator) = setup(3);
        store.set_primary(true).await;

        let mut state = ReplicatedState::default();
        state.append("stale".into());

        let err = replicator.apply_state(state).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(store.sequence_number().await, 0);
    }
}
