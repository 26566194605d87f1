//! Replication Module
//!
//! Full-state replication from the primary to its secondaries, the
//! startup catch-up of a rejoining node, and the wire types both use.

pub mod protocol;
mod broadcast;
mod sync;

pub use broadcast::Replicator;
pub use sync::{SyncOutcome, Synchronizer};
