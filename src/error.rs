//! BullyScale Error Types

use std::path::PathBuf;
use thiserror::Error;

use crate::state::NodeId;

/// Result type alias for BullyScale operations
pub type Result<T> = std::result::Result<T, Error>;

/// BullyScale error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Persistence errors
    #[error("Persistence failure on {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("State file {path} is corrupted: {reason}")]
    StateCorrupted { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("Peer {address} answered with status {status}")]
    UnexpectedStatus { address: String, status: u16 },

    // Role and protocol errors
    #[error("Not primary: current primary is node {0}")]
    NotPrimary(NodeId),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown peer: node {0}")]
    UnknownPeer(NodeId),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error means durable state can no longer be trusted.
    /// The node must stop rather than keep serving.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Persistence { .. } | Error::StateCorrupted { .. }
        )
    }

    /// Check if this error came from talking to a peer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Network(_)
                | Error::ConnectionFailed { .. }
                | Error::ConnectionTimeout(_)
                | Error::UnexpectedStatus { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let persist = Error::Persistence {
            path: PathBuf::from("/tmp/node-1.json"),
            reason: "disk full".into(),
        };
        assert!(persist.is_fatal());
        assert!(!persist.is_transport());

        let timeout = Error::ConnectionTimeout("127.0.0.1:8083".into());
        assert!(timeout.is_transport());
        assert!(!timeout.is_fatal());

        assert!(!Error::NotPrimary(3).is_fatal());
        assert!(!Error::InvalidRequest("value".into()).is_transport());
    }
}
