//! Node State Store
//!
//! The single shared state object of a node: its identity, its role in
//! the cluster and the replicated log. Every other component holds an
//! `Arc<NodeStore>` and goes through the methods below.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};

use super::log::{Event, ReplicatedState};
use super::tracker::StateFile;
use crate::error::{Error, Result};

/// Numeric node identifier. `0` means "unknown".
pub type NodeId = u64;

/// Role of this node as currently believed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleState {
    pub is_primary: bool,
    /// Known primary, `0` when unknown
    pub primary_id: NodeId,
}

impl std::fmt::Display for RoleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_primary {
            write!(f, "PRIMARY")
        } else {
            write!(f, "SECONDARY (primary: {})", self.primary_id)
        }
    }
}

/// Identifies the campaign that holds the election guard.
///
/// Only the holder's ticket can release the guard on completion, so a
/// campaign that was superseded never frees a newer campaign's guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignTicket(u64);

/// Guard value when no campaign runs
const NO_CAMPAIGN: u64 = 0;

/// Everything guarded by the reader/writer lock
struct Inner {
    role: RoleState,
    log: ReplicatedState,
}

/// Shared per-node state
pub struct NodeStore {
    /// This node's ID
    id: NodeId,
    /// Static ID -> address map of the whole cluster, self included
    peers: BTreeMap<NodeId, String>,
    /// Role and replicated log
    inner: RwLock<Inner>,
    /// Ticket of the running campaign, `NO_CAMPAIGN` when idle. Every
    /// change is a read-modify-write under the channel's lock, and a
    /// campaign waits on it to learn that it was superseded.
    election_owner: watch::Sender<u64>,
    /// Source of campaign tickets
    next_ticket: AtomicU64,
    /// Durable copy of the replicated log
    file: StateFile,
}

impl NodeStore {
    /// Build the store and load the persisted log.
    ///
    /// The node starts as a secondary that assumes the highest configured
    /// ID is primary. Any load failure is returned and must stop startup.
    pub fn open(id: NodeId, peers: BTreeMap<NodeId, String>, file: StateFile) -> Result<Self> {
        let highest = peers.keys().next_back().copied().unwrap_or(0);
        let log = file.load_or_init()?;

        tracing::info!(
            "Node {} initialized with {} peers, assumed primary is node {}",
            id,
            peers.len(),
            highest
        );

        Ok(Self {
            id,
            peers,
            inner: RwLock::new(Inner {
                role: RoleState {
                    is_primary: false,
                    primary_id: highest,
                },
                log,
            }),
            election_owner: watch::Sender::new(NO_CAMPAIGN),
            next_ticket: AtomicU64::new(NO_CAMPAIGN + 1),
            file,
        })
    }

    /// This node's ID
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The full peer map, self included
    pub fn peers(&self) -> &BTreeMap<NodeId, String> {
        &self.peers
    }

    /// Address of a node, if it is part of the cluster
    pub fn peer_address(&self, id: NodeId) -> Option<&str> {
        self.peers.get(&id).map(String::as_str)
    }

    /// Every peer except this node
    pub fn other_peers(&self) -> Vec<(NodeId, String)> {
        self.peers
            .iter()
            .filter(|(id, _)| **id != self.id)
            .map(|(id, addr)| (*id, addr.clone()))
            .collect()
    }

    /// Peers that out-rank this node
    pub fn higher_peers(&self) -> Vec<(NodeId, String)> {
        self.peers
            .range((Excluded(self.id), Unbounded))
            .map(|(id, addr)| (*id, addr.clone()))
            .collect()
    }

    /// Path of the persisted state file
    pub fn state_file(&self) -> &std::path::Path {
        self.file.path()
    }

    // ============ Role ============

    /// Current role snapshot
    pub async fn role(&self) -> RoleState {
        self.inner.read().await.role
    }

    pub async fn is_primary(&self) -> bool {
        self.inner.read().await.role.is_primary
    }

    pub async fn primary_id(&self) -> NodeId {
        self.inner.read().await.role.primary_id
    }

    /// Record the known primary. Naming another node also drops our own
    /// primary role, keeping `is_primary => primary_id == self`.
    pub async fn set_primary_id(&self, primary_id: NodeId) {
        let mut inner = self.inner.write().await;
        inner.role.primary_id = primary_id;
        if primary_id != self.id {
            inner.role.is_primary = false;
        }
        tracing::info!("Node {}: primary is now node {}", self.id, primary_id);
    }

    /// Set whether this node is primary; becoming primary names self
    pub async fn set_primary(&self, is_primary: bool) {
        let mut inner = self.inner.write().await;
        inner.role.is_primary = is_primary;
        if is_primary {
            inner.role.primary_id = self.id;
        }
        tracing::info!("Node {}: now {}", self.id, inner.role);
    }

    /// Apply a coordinator announcement.
    ///
    /// Adopts the announced primary unconditionally, then releases the
    /// campaign guard, which also stops any campaign still waiting for
    /// answers.
    pub async fn adopt_primary(&self, primary_id: NodeId) {
        {
            let mut inner = self.inner.write().await;
            inner.role.primary_id = primary_id;
            inner.role.is_primary = primary_id == self.id;
            tracing::info!(
                "Node {}: coordinator announced node {}, now {}",
                self.id,
                primary_id,
                inner.role
            );
        }
        self.set_election_in_progress(false);
    }

    // ============ Election guard ============

    /// Try to enter (`true`) or leave (`false`) a campaign.
    ///
    /// Entering returns `false` without any effect when a campaign is
    /// already running. Leaving always succeeds and supersedes whichever
    /// campaign holds the guard.
    pub fn set_election_in_progress(&self, want: bool) -> bool {
        if want {
            return self.begin_election().is_some();
        }
        let released = self.election_owner.send_if_modified(|owner| {
            let running = *owner != NO_CAMPAIGN;
            *owner = NO_CAMPAIGN;
            running
        });
        if released {
            tracing::debug!("Node {}: election guard released", self.id);
        }
        true
    }

    /// Take the guard for a new campaign, `None` if one is running
    pub fn begin_election(&self) -> Option<CampaignTicket> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let acquired = self.election_owner.send_if_modified(|owner| {
            if *owner != NO_CAMPAIGN {
                return false;
            }
            *owner = ticket;
            true
        });
        if acquired {
            tracing::debug!("Node {}: election in progress (campaign {})", self.id, ticket);
            Some(CampaignTicket(ticket))
        } else {
            None
        }
    }

    /// Release the guard if `ticket` still holds it
    pub fn end_election(&self, ticket: CampaignTicket) -> bool {
        let released = self.election_owner.send_if_modified(|owner| {
            if *owner != ticket.0 {
                return false;
            }
            *owner = NO_CAMPAIGN;
            true
        });
        if released {
            tracing::debug!("Node {}: election finished (campaign {})", self.id, ticket.0);
        }
        released
    }

    pub fn election_in_progress(&self) -> bool {
        *self.election_owner.borrow() != NO_CAMPAIGN
    }

    /// Resolves once `ticket` no longer holds the guard
    pub async fn election_superseded(&self, ticket: CampaignTicket) {
        let mut owner = self.election_owner.subscribe();
        loop {
            let current = *owner.borrow_and_update();
            if current != ticket.0 {
                return;
            }
            if owner.changed().await.is_err() {
                return;
            }
        }
    }

    // ============ Replicated log ============

    /// Append an event and persist the result.
    ///
    /// Returns the new event and the state snapshot it produced. Does not
    /// look at the role; writes arriving over the API go through
    /// [`add_event_as_primary`](Self::add_event_as_primary).
    pub async fn add_event(&self, value: String) -> Result<(Event, ReplicatedState)> {
        let mut inner = self.inner.write().await;
        self.append_locked(&mut inner, value)
    }

    /// Same as [`add_event`](Self::add_event), refused with
    /// [`Error::NotPrimary`] unless this node is primary. The role is
    /// checked under the same write lock as the append.
    pub async fn add_event_as_primary(&self, value: String) -> Result<(Event, ReplicatedState)> {
        let mut inner = self.inner.write().await;
        if !inner.role.is_primary {
            return Err(Error::NotPrimary(inner.role.primary_id));
        }
        self.append_locked(&mut inner, value)
    }

    /// Replace the whole replicated log and persist it. No comparison with
    /// what was there before: the last writer wins.
    pub async fn set_state(&self, state: ReplicatedState) -> Result<()> {
        let mut inner = self.inner.write().await;
        self.overwrite_locked(&mut inner, state)
    }

    /// Same as [`set_state`](Self::set_state), refused with
    /// [`Error::InvalidRequest`] while this node is primary
    pub async fn set_state_as_secondary(&self, state: ReplicatedState) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.role.is_primary {
            return Err(Error::InvalidRequest(
                "primary does not accept state updates".into(),
            ));
        }
        self.overwrite_locked(&mut inner, state)
    }

    fn append_locked(&self, inner: &mut Inner, value: String) -> Result<(Event, ReplicatedState)> {
        let mut next = inner.log.clone();
        let event = next.append(value);
        self.file.save(&next)?;
        inner.log = next;

        tracing::info!(
            "Node {}: appended event {} ({:?})",
            self.id,
            event.id,
            event.value
        );
        Ok((event, inner.log.clone()))
    }

    fn overwrite_locked(&self, inner: &mut Inner, state: ReplicatedState) -> Result<()> {
        self.file.save(&state)?;
        inner.log = state;

        tracing::info!(
            "Node {}: state overwritten, sequence number {}",
            self.id,
            inner.log.sequence_number
        );
        Ok(())
    }

    /// Copy of the current replicated log
    pub async fn snapshot(&self) -> ReplicatedState {
        self.inner.read().await.log.clone()
    }

    pub async fn sequence_number(&self) -> u64 {
        self.inner.read().await.log.sequence_number
    }
}
