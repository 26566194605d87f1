//! State Management Module
//!
//! Everything a node owns: its role, its copy of the replicated event
//! log, the file that log is persisted to, and the election logic that
//! decides the role.

mod log;
mod store;
mod tracker;
pub mod election;

pub use election::{ElectionConfig, ElectionCoordinator, ElectionOutcome};
pub use log::{Event, ReplicatedState};
pub use store::{CampaignTicket, NodeId, NodeStore, RoleState};
pub use tracker::StateFile;
