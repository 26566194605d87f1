//! Network Module
//!
//! Outbound calls from one node to its peers. The protocol components
//! only see the [`Transport`] trait; [`HttpTransport`] is the real
//! implementation speaking to the peers' HTTP API.

mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use client::{HttpTransport, PeerTimeouts};

use async_trait::async_trait;

use crate::error::Result;
use crate::state::{NodeId, ReplicatedState};

/// Messages a node sends to its peers.
///
/// Every call carries its own timeout. Any error (unreachable peer,
/// timeout, non-success status) means the call did not succeed; callers
/// decide whether that is "peer down" or just something to log.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Liveness probe against the primary
    async fn heartbeat(&self, address: &str) -> Result<()>;

    /// ELECTION challenge to a higher peer. `Ok` means it answered and
    /// will carry on the election itself.
    async fn election(&self, address: &str) -> Result<()>;

    /// COORDINATOR announcement
    async fn coordinator(&self, address: &str, primary_id: NodeId) -> Result<()>;

    /// Push the full replicated state to a secondary
    async fn replicate(&self, address: &str, state: &ReplicatedState) -> Result<()>;

    /// Fetch the full replicated state from the primary
    async fn fetch_state(&self, address: &str) -> Result<ReplicatedState>;
}
