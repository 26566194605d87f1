//! Wire Protocol
//!
//! Paths and JSON bodies exchanged between nodes and with clients.
//! The replicated state itself travels as [`crate::state::ReplicatedState`].

use serde::{Deserialize, Serialize};

use crate::state::{Event, NodeId};

/// Liveness probe, `GET`
pub const HEARTBEAT_PATH: &str = "/heartbeat";
/// Election challenge from a lower node, `POST`
pub const ELECTION_PATH: &str = "/election";
/// Victory announcement, `POST` with [`CoordinatorMessage`]
pub const COORDINATOR_PATH: &str = "/coordinator";
/// Client write, `POST` with [`EventRequest`]
pub const EVENT_PATH: &str = "/event";
/// Full state push from the primary, `POST` with [`crate::state::ReplicatedState`]
pub const STATE_UPDATE_PATH: &str = "/state-update";
/// Full state fetch from the primary, `GET`
pub const STATE_PATH: &str = "/state";
/// Node status, `GET`
pub const STATUS_PATH: &str = "/status";

/// Body of the coordinator announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorMessage {
    pub primary_id: NodeId,
}

/// Body of a client write. `value` is optional on the wire so that a
/// missing field is reported as a protocol error, not a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventRequest {
    #[serde(default)]
    pub value: Option<String>,
}

/// Answer to an accepted client write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResponse {
    pub success: bool,
    pub event: Event,
    pub sequence_number: u64,
}

/// Node status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: NodeId,
    pub is_primary: bool,
    pub primary_id: NodeId,
    pub election_in_progress: bool,
    pub sequence_number: u64,
    pub event_count: usize,
    pub peers: Vec<PeerEntry>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// One entry of the static peer map, as reported by `/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    pub id: NodeId,
    pub address: String,
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Build a URL for a peer address (`host:port`) and a path
pub fn peer_url(address: &str, path: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        format!("{}{}", address.trim_end_matches('/'), path)
    } else {
        format!("http://{}{}", address, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_url() {
        assert_eq!(peer_url("10.0.0.1:8081", HEARTBEAT_PATH), "http://10.0.0.1:8081/heartbeat");
        assert_eq!(peer_url("http://node-2:8082/", STATE_PATH), "http://node-2:8082/state");
    }

    #[test]
    fn test_event_request_without_value() {
        let req: EventRequest = serde_json::from_str(r#"{"other": 1}"#).unwrap();
        assert!(req.value.is_none());

        let req: EventRequest = serde_json::from_str(r#"{"value": "hello"}"#).unwrap();
        assert_eq!(req.value.as_deref(), Some("hello"));
    }

    #[test]
    fn test_coordinator_body() {
        let msg: CoordinatorMessage = serde_json::from_str(r#"{"primary_id": 3}"#).unwrap();
        assert_eq!(msg.primary_id, 3);
        assert!(serde_json::from_str::<CoordinatorMessage>(r#"{"primary": 3}"#).is_err());
    }
}
