//! Replication/Gossip Layer
//!
//! Locally committed changes become [`DhtOp`]s. The [`Publisher`] pushes
//! them to every peer instance of the same DNA in commit order, retrying
//! unreachable peers with backoff. On the receiving side the [`Replicator`]
//! re-validates each op, parks ops whose dependencies have not arrived yet,
//! and applies the rest through the instance's normal write path.

pub mod network;
pub mod publisher;

pub use network::{InMemoryNetwork, PeerId, Transport};
pub use publisher::{GossipConfig, Publisher, PublisherStats};

use crate::entry::{ChainHeader, Entry};
use crate::error::CoreError;
use crate::instance::Instance;
use crate::links::Link;
use crate::types::{Address, DnaAddress};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Unit of replicated change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DhtOp {
    StoreEntry {
        entry: Entry,
        header: ChainHeader,
    },
    UpdateEntry {
        old: Address,
        entry: Entry,
        header: ChainHeader,
    },
    RemoveEntry {
        deleted: Address,
        deletion: Entry,
        header: ChainHeader,
    },
    AddLink {
        entry: Entry,
        header: ChainHeader,
    },
    RemoveLink {
        entry: Entry,
        header: ChainHeader,
    },
}

impl DhtOp {
    /// Build the op for a committed entry from its header
    pub fn new(entry: Entry, header: ChainHeader) -> Self {
        match (&entry, header.replaced.clone()) {
            (Entry::Deletion(deleted), _) => DhtOp::RemoveEntry {
                deleted: deleted.clone(),
                deletion: entry,
                header,
            },
            (Entry::LinkAdd(_), _) => DhtOp::AddLink { entry, header },
            (Entry::LinkRemove(_), _) => DhtOp::RemoveLink { entry, header },
            (_, Some(old)) => DhtOp::UpdateEntry { old, entry, header },
            (_, None) => DhtOp::StoreEntry { entry, header },
        }
    }

    pub fn entry(&self) -> &Entry {
        match self {
            DhtOp::StoreEntry { entry, .. }
            | DhtOp::UpdateEntry { entry, .. }
            | DhtOp::AddLink { entry, .. }
            | DhtOp::RemoveLink { entry, .. } => entry,
            DhtOp::RemoveEntry { deletion, .. } => deletion,
        }
    }

    pub fn header(&self) -> &ChainHeader {
        match self {
            DhtOp::StoreEntry { header, .. }
            | DhtOp::UpdateEntry { header, .. }
            | DhtOp::RemoveEntry { header, .. }
            | DhtOp::AddLink { header, .. }
            | DhtOp::RemoveLink { header, .. } => header,
        }
    }

    pub fn link(&self) -> Option<&Link> {
        match self.entry() {
            Entry::LinkAdd(link) | Entry::LinkRemove(link) => Some(link),
            _ => None,
        }
    }

    /// Identity of this op: the hash of its header
    pub fn id(&self) -> Address {
        self.header().id()
    }

    /// Addresses that must be held locally before the op can be applied
    pub fn dependencies(&self) -> Vec<Address> {
        match self {
            DhtOp::StoreEntry { .. } => Vec::new(),
            DhtOp::UpdateEntry { old, .. } => vec![old.clone()],
            DhtOp::RemoveEntry { deleted, .. } => vec![deleted.clone()],
            DhtOp::AddLink { .. } | DhtOp::RemoveLink { .. } => self
                .link()
                .map(|l| vec![l.base.clone(), l.target.clone()])
                .unwrap_or_default(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DhtOp::StoreEntry { .. } => "store_entry",
            DhtOp::UpdateEntry { .. } => "update_entry",
            DhtOp::RemoveEntry { .. } => "remove_entry",
            DhtOp::AddLink { .. } => "add_link",
            DhtOp::RemoveLink { .. } => "remove_link",
        }
    }
}

/// Envelope for an op travelling between peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipMessage {
    pub dna: DnaAddress,
    pub from: PeerId,
    pub op: DhtOp,
}

/// Replication state of an entry as seen by one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaState {
    /// Never heard of
    Unseen,
    /// Received, waiting for dependencies
    Propagating,
    /// Stored and indexed
    Applied,
    /// Failed validation; dropped
    Rejected,
}

/// Rejected entry addresses remembered for state queries
const MAX_REJECTED: usize = 1024;

/// Receive side of replication for one instance.
///
/// Applied ops are recognised by their journaled header id, so the only
/// in-memory state is the ops still waiting for dependencies plus a bounded
/// record of recent rejections.
#[derive(Debug, Default)]
pub struct Replicator {
    inner: Mutex<ReplicatorState>,
}

#[derive(Debug, Default)]
struct ReplicatorState {
    parked: Vec<DhtOp>,
    rejected: VecDeque<Address>,
}

impl Replicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// State known only to the replicator: parked or recently rejected.
    /// Applied entries are answered by the store.
    pub fn pending_state(&self, address: &Address) -> Option<ReplicaState> {
        let inner = self.inner.lock();
        if inner
            .parked
            .iter()
            .any(|op| &op.header().entry_address == address)
        {
            return Some(ReplicaState::Propagating);
        }
        if inner.rejected.contains(address) {
            return Some(ReplicaState::Rejected);
        }
        None
    }

    /// Number of ops waiting for dependencies
    pub fn parked(&self) -> usize {
        self.inner.lock().parked.len()
    }

    /// Handle an op received from a peer.
    ///
    /// Ops already in the journal are ignored. Ops with missing dependencies
    /// are parked; after every successful apply the parked set is retried
    /// until no more progress is made.
    pub fn receive(&self, instance: &Instance, op: DhtOp) -> Result<ReplicaState, CoreError> {
        let state = self.process(instance, op)?;
        if state == ReplicaState::Applied {
            self.drain_parked(instance)?;
        }
        Ok(state)
    }

    fn process(&self, instance: &Instance, op: DhtOp) -> Result<ReplicaState, CoreError> {
        let id = op.id();
        let entry_address = op.header().entry_address.clone();
        if instance.is_journaled(&id)? {
            return Ok(ReplicaState::Applied);
        }

        if !instance.missing_dependencies(&op)?.is_empty() {
            debug!(
                instance = %instance.id(),
                op = op.kind(),
                entry = %entry_address,
                "Parking op until dependencies arrive"
            );
            let mut inner = self.inner.lock();
            if !inner.parked.iter().any(|p| p.id() == id) {
                inner.parked.push(op);
            }
            return Ok(ReplicaState::Propagating);
        }

        match instance.apply_remote(&op) {
            Ok(_) => {
                self.inner.lock().rejected.retain(|a| a != &entry_address);
                Ok(ReplicaState::Applied)
            }
            Err(err) if err.is_recoverable() => {
                warn!(
                    instance = %instance.id(),
                    op = op.kind(),
                    entry = %entry_address,
                    error = %err.kind,
                    "Rejected remote op"
                );
                let mut inner = self.inner.lock();
                if !inner.rejected.contains(&entry_address) {
                    if inner.rejected.len() >= MAX_REJECTED {
                        inner.rejected.pop_front();
                    }
                    inner.rejected.push_back(entry_address);
                }
                Ok(ReplicaState::Rejected)
            }
            Err(err) => Err(err),
        }
    }

    fn drain_parked(&self, instance: &Instance) -> Result<(), CoreError> {
        loop {
            let parked = std::mem::take(&mut self.inner.lock().parked);
            let mut ready = Vec::new();
            let mut waiting = Vec::new();
            for op in parked {
                if instance.missing_dependencies(&op)?.is_empty() {
                    ready.push(op);
                } else {
                    waiting.push(op);
                }
            }
            self.inner.lock().parked.extend(waiting);
            if ready.is_empty() {
                return Ok(());
            }
            for op in ready {
                self.process(instance, op)?;
            }
        }
    }
}
