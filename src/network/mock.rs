//! In-memory transport for tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::Transport;
use crate::error::{Error, Result};
use crate::state::{NodeId, ReplicatedState};

/// A call observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Heartbeat(String),
    Election(String),
    Coordinator(String, NodeId),
    Replicate(String, ReplicatedState),
    FetchState(String),
}

/// Records every call and answers according to which addresses are down
#[derive(Default)]
pub(crate) struct MockTransport {
    down: Mutex<HashSet<String>>,
    election_delay: Mutex<Option<Duration>>,
    remote_state: Mutex<Option<ReplicatedState>>,
    calls: Mutex<Vec<Call>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_down(&self, address: &str) {
        self.down.lock().unwrap().insert(address.to_string());
    }

    /// Delay every ELECTION answer
    pub(crate) fn set_election_delay(&self, delay: Duration) {
        *self.election_delay.lock().unwrap() = Some(delay);
    }

    /// State returned by `fetch_state`
    pub(crate) fn set_remote_state(&self, state: ReplicatedState) {
        *self.remote_state.lock().unwrap() = Some(state);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|&c| pred(c)).count()
    }

    /// Poll until `pred` matches at least `n` recorded calls
    pub(crate) async fn wait_for(&self, n: usize, pred: impl Fn(&Call) -> bool) -> bool {
        for _ in 0..200 {
            if self.count(&pred) >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, address: &str) -> Result<()> {
        if self.down.lock().unwrap().contains(address) {
            return Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn heartbeat(&self, address: &str) -> Result<()> {
        self.record(Call::Heartbeat(address.to_string()));
        self.check(address)
    }

    async fn election(&self, address: &str) -> Result<()> {
        self.record(Call::Election(address.to_string()));
        let delay = *self.election_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(address)
    }

    async fn coordinator(&self, address: &str, primary_id: NodeId) -> Result<()> {
        self.record(Call::Coordinator(address.to_string(), primary_id));
        self.check(address)
    }

    async fn replicate(&self, address: &str, state: &ReplicatedState) -> Result<()> {
        self.record(Call::Replicate(address.to_string(), state.clone()));
        self.check(address)
    }

    async fn fetch_state(&self, address: &str) -> Result<ReplicatedState> {
        self.record(Call::FetchState(address.to_string()));
        self.check(address)?;
        self.remote_state
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::UnexpectedStatus {
                address: address.to_string(),
                status: 503,
            })
    }
}
