//! BullyScale - Primary/Secondary Node Coordination
//!
//! Keeps a small, fixed set of nodes agreed on a single write-accepting
//! primary and replicates an append-only event log from it.
//!
//! # Architecture
//!
//! Every node runs the same program. The primary is chosen with the Bully
//! algorithm: the highest reachable node ID wins. Secondaries watch the
//! primary with heartbeats and start an election when it stops answering.
//! Client writes go to the primary, which persists them and pushes its
//! entire state to every secondary; a restarted node pulls the primary's
//! state once at startup.
//!
//! # Features
//!
//! - Bully leader election with automatic failover
//! - Heartbeat-based failure detection
//! - Best-effort full-state replication
//! - Startup catch-up for rejoining nodes
//! - Durable JSON state file per node
//! - HTTP API for writes and status

pub mod api;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod network;
pub mod node;
pub mod replication;
pub mod state;

pub use config::BullyScaleConfig;
pub use error::{Error, Result};
pub use node::{Node, NodeHandle};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::BullyScaleConfig;
    pub use crate::error::{Error, Result};
    pub use crate::node::{Node, NodeHandle};
    pub use crate::replication::protocol::{EventResponse, StatusResponse};
    pub use crate::state::{Event, NodeId, NodeStore, ReplicatedState, RoleState};
}
