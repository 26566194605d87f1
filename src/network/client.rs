//! Network Client
//!
//! HTTP client for the peer endpoints.

use std::time::Duration;

use async_trait::async_trait;

use super::Transport;
use crate::config::TimingConfig;
use crate::error::{Error, Result};
use crate::replication::protocol::{
    peer_url, CoordinatorMessage, COORDINATOR_PATH, ELECTION_PATH, HEARTBEAT_PATH, STATE_PATH,
    STATE_UPDATE_PATH,
};
use crate::state::{NodeId, ReplicatedState};

/// Per-call timeouts
#[derive(Debug, Clone, Copy)]
pub struct PeerTimeouts {
    /// Heartbeat probe
    pub heartbeat: Duration,
    /// Election, coordinator and state-replacement calls
    pub request: Duration,
    /// State fetch by the synchronizer
    pub fetch: Duration,
}

impl From<&TimingConfig> for PeerTimeouts {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            heartbeat: timing.heartbeat_timeout(),
            request: timing.request_timeout(),
            fetch: timing.sync_timeout(),
        }
    }
}

/// [`Transport`] over HTTP
pub struct HttpTransport {
    client: reqwest::Client,
    timeouts: PeerTimeouts,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(timeouts: PeerTimeouts) -> Result<Self> {
        // No idle connection reuse: a probe must open a fresh connection,
        // otherwise a pooled socket can outlive the peer's listener.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeouts })
    }

    async fn send(
        &self,
        address: &str,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_error(address, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                address: address.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

fn map_error(address: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::ConnectionTimeout(address.to_string())
    } else if e.is_connect() {
        Error::ConnectionFailed {
            address: address.to_string(),
            reason: e.to_string(),
        }
    } else {
        Error::Network(format!("{}: {}", address, e))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn heartbeat(&self, address: &str) -> Result<()> {
        let request = self.client.get(peer_url(address, HEARTBEAT_PATH));
        self.send(address, request, self.timeouts.heartbeat).await?;
        Ok(())
    }

    async fn election(&self, address: &str) -> Result<()> {
        let request = self.client.post(peer_url(address, ELECTION_PATH));
        self.send(address, request, self.timeouts.request).await?;
        Ok(())
    }

    async fn coordinator(&self, address: &str, primary_id: NodeId) -> Result<()> {
        let request = self
            .client
            .post(peer_url(address, COORDINATOR_PATH))
            .json(&CoordinatorMessage { primary_id });
        self.send(address, request, self.timeouts.request).await?;
        Ok(())
    }

    async fn replicate(&self, address: &str, state: &ReplicatedState) -> Result<()> {
        let request = self
            .client
            .post(peer_url(address, STATE_UPDATE_PATH))
            .json(state);
        self.send(address, request, self.timeouts.request).await?;
        Ok(())
    }

    async fn fetch_state(&self, address: &str) -> Result<ReplicatedState> {
        let request = self.client.get(peer_url(address, STATE_PATH));
        let response = self.send(address, request, self.timeouts.fetch).await?;
        response
            .json::<ReplicatedState>()
            .await
            .map_err(|e| map_error(address, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeouts() -> PeerTimeouts {
        PeerTimeouts {
            heartbeat: Duration::from_millis(200),
            request: Duration::from_millis(200),
            fetch: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_timeouts_from_config() {
        let t = PeerTimeouts::from(&TimingConfig::default());
        assert_eq!(t.heartbeat, Duration::from_secs(2));
        assert_eq!(t.request, Duration::from_secs(2));
        assert_eq!(t.fetch, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let transport = HttpTransport::new(timeouts()).unwrap();
        let err = transport.heartbeat(&address).await.unwrap_err();
        assert!(err.is_transport());
        assert!(transport.fetch_state(&address).await.is_err());
    }
}
