//! Instance: one agent running one DNA
//!
//! An instance exclusively owns its entry store and link index. Every write
//! (local commit or remote op) validates and then mutates store and index
//! while holding the state write lock, so readers never observe a link
//! whose target is not yet stored. Replication tasks are attached by
//! [`Instance::start`] and detached by [`Instance::stop`].

mod api;

pub use api::ZomeApi;

use crate::agent::AgentId;
use crate::dna::Dna;
use crate::entry::{ChainHeader, Entry, EntryWithMeta};
use crate::error::{ApiError, CoreError, ErrorKind};
use crate::links::{Link, LinkIndex};
use crate::replication::{
    DhtOp, GossipConfig, InMemoryNetwork, Publisher, PublisherStats, ReplicaState, Replicator,
};
use crate::store::EntryStore;
use crate::types::{Address, AgentAddress, DnaAddress, InstanceId};
use crate::validation::{EntryLookup, Validator};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

struct InstanceState {
    store: EntryStore,
    links: LinkIndex,
}

/// Store view that also sees entries staged earlier in the same batch
struct BatchView<'a> {
    store: &'a EntryStore,
    staged: HashMap<Address, Entry>,
    removed: HashSet<Address>,
}

impl<'a> BatchView<'a> {
    fn new(store: &'a EntryStore) -> Self {
        Self {
            store,
            staged: HashMap::new(),
            removed: HashSet::new(),
        }
    }

    fn stage(&mut self, entry: &Entry) {
        if let Entry::Deletion(deleted) = entry {
            self.removed.insert(deleted.clone());
            self.staged.remove(deleted);
        }
        self.staged.insert(entry.address(), entry.clone());
    }
}

impl EntryLookup for BatchView<'_> {
    fn lookup(&self, address: &Address) -> Result<Option<Entry>, CoreError> {
        if self.removed.contains(address) {
            return Ok(None);
        }
        if let Some(entry) = self.staged.get(address) {
            return Ok(Some(entry.clone()));
        }
        self.store.get(address)
    }
}

/// Replication attachments of a running instance
struct Session {
    network: Arc<InMemoryNetwork>,
    publisher: Arc<Publisher>,
    inbox: JoinHandle<()>,
}

/// Summary of an instance for listings
#[derive(Debug, Clone, Serialize)]
pub struct InstanceInfo {
    pub id: InstanceId,
    pub agent: String,
    pub agent_address: AgentAddress,
    pub dna: String,
    pub dna_address: DnaAddress,
    pub running: bool,
    pub entries: usize,
}

pub struct Instance {
    id: InstanceId,
    agent: AgentId,
    dna: Arc<Dna>,
    dna_address: DnaAddress,
    state: RwLock<InstanceState>,
    replicator: Replicator,
    session: Mutex<Option<Session>>,
}

impl Instance {
    /// Bind `agent` to `dna` over `store`. The link index is rebuilt from
    /// whatever the store already holds.
    pub fn new(id: &str, agent: AgentId, dna: Dna, store: EntryStore) -> Result<Self, CoreError> {
        let links = LinkIndex::rebuild(&store)?;
        let dna_address = dna.address();
        Ok(Self {
            id: id.to_string(),
            agent,
            dna: Arc::new(dna),
            dna_address,
            state: RwLock::new(InstanceState { store, links }),
            replicator: Replicator::new(),
            session: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    pub fn agent_address(&self) -> AgentAddress {
        self.agent.address()
    }

    pub fn dna(&self) -> &Dna {
        &self.dna
    }

    pub fn dna_address(&self) -> &DnaAddress {
        &self.dna_address
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn info(&self) -> Result<InstanceInfo, CoreError> {
        Ok(InstanceInfo {
            id: self.id.clone(),
            agent: self.agent.nick.clone(),
            agent_address: self.agent_address(),
            dna: self.dna.name.clone(),
            dna_address: self.dna_address.clone(),
            running: self.is_running(),
            entries: self.state.read().store.addresses()?.len(),
        })
    }

    /// Commit the agent's identity entry unless it is already held
    pub fn initialize(&self) -> Result<Address, CoreError> {
        let address = self.agent_address();
        if self.state.read().store.is_live(&address)? {
            return Ok(address);
        }
        self.commit_entry(Entry::AgentId(self.agent.clone()))
    }

    /// Attach replication: join the network, start the inbox task and the
    /// publisher. Peers already on the network are backfilled from the
    /// journal, including ops authored in a previous run.
    pub fn start(
        self: &Arc<Self>,
        network: Arc<InMemoryNetwork>,
        gossip: GossipConfig,
    ) -> Result<(), ApiError> {
        let runtime = Handle::try_current().map_err(|e| ApiError::Runtime(e.to_string()))?;
        if self.is_running() {
            return Ok(());
        }
        self.initialize()?;

        let publisher = Arc::new(Publisher::new(
            self.id.clone(),
            self.dna_address.clone(),
            network.clone(),
            gossip,
            runtime.clone(),
        ));
        let mut receiver = network.join(&self.dna_address, &self.id);
        let weak: Weak<Instance> = Arc::downgrade(self);
        let inbox = runtime.spawn(async move {
            while let Some(message) = receiver.recv().await {
                let Some(instance) = weak.upgrade() else {
                    break;
                };
                if let Err(err) = instance.receive(message.op) {
                    error!(instance = %instance.id, from = %message.from, error = %err, "Failed to apply remote op");
                }
            }
        });

        *self.session.lock() = Some(Session {
            network,
            publisher,
            inbox,
        });
        info!(instance = %self.id, agent = %self.agent.nick, dna = %self.dna.name, "Instance started");
        self.sync_peers()?;
        Ok(())
    }

    /// Detach replication. Peers see this instance as unreachable and keep
    /// retrying until it is started again.
    pub fn stop(&self) {
        if let Some(session) = self.session.lock().take() {
            session
                .network
                .set_reachable(&self.dna_address, &self.id, false);
            session.publisher.stop();
            session.inbox.abort();
            info!(instance = %self.id, "Instance stopped");
        }
    }

    /// Connect peers that joined since the last sync and backfill them
    /// with this agent's journaled ops. Commits are held off meanwhile, so
    /// a new peer sees every op exactly once, in commit order.
    pub fn sync_peers(&self) -> Result<(), CoreError> {
        let state = self.state.read();
        let author = self.agent_address();
        if let Some(session) = self.session.lock().as_ref() {
            let connected = session
                .publisher
                .sync_peers(|| Self::authored_ops(&state, &author))?;
            if connected > 0 {
                debug!(instance = %self.id, connected, "Backfilled new peers");
            }
        }
        Ok(())
    }

    pub fn publisher_stats(&self) -> Option<PublisherStats> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.publisher.stats())
    }

    /// Route a zome call: zome, then function, then capability grant
    pub fn call(
        &self,
        zome: &str,
        capability: &str,
        function: &str,
        params: Value,
    ) -> Result<Value, CoreError> {
        let zome_def = self
            .dna
            .zome(zome)
            .ok_or_else(|| CoreError::new(ErrorKind::ZomeNotFound(zome.to_string())))?;
        let handler = zome_def.function(function).ok_or_else(|| {
            CoreError::new(ErrorKind::ZomeFunctionNotFound(function.to_string()))
        })?;
        let granted = zome_def
            .capability(capability)
            .map(|cap| cap.grants(function))
            .unwrap_or(false);
        if !granted {
            return Err(CoreError::new(ErrorKind::CapabilityCheckFailed));
        }
        debug!(instance = %self.id, zome, capability, function, "Zome call");
        handler(&ZomeApi::new(self, zome), params)
    }

    pub fn commit_entry(&self, entry: Entry) -> Result<Address, CoreError> {
        let mut addresses = self.commit_batch(vec![entry])?;
        addresses
            .pop()
            .ok_or_else(|| CoreError::generic("Empty commit"))
    }

    /// Validate every entry, then write them all. Later entries may refer
    /// to earlier ones. On a validation failure nothing is written.
    pub fn commit_batch(&self, entries: Vec<Entry>) -> Result<Vec<Address>, CoreError> {
        let validator = Validator::new(&self.dna);
        let mut state = self.state.write();
        {
            let mut view = BatchView::new(&state.store);
            for entry in &entries {
                validator.validate(entry, &view)?;
                view.stage(entry);
            }
        }

        let author = self.agent_address();
        let mut addresses = Vec::with_capacity(entries.len());
        for entry in entries {
            let replaced = match &entry {
                Entry::Deletion(deleted) => Some(deleted.clone()),
                _ => None,
            };
            let header = ChainHeader::new(&entry, &author, replaced);
            let op = DhtOp::new(entry, header);
            addresses.push(Self::apply(&mut state, &op)?);
            self.publish(op);
        }
        Ok(addresses)
    }

    /// Replace `old` with `new_entry`; returns the new address
    pub fn update_entry(&self, old: &Address, new_entry: Entry) -> Result<Address, CoreError> {
        let validator = Validator::new(&self.dna);
        let mut state = self.state.write();
        let old_entry = state
            .store
            .get(old)?
            .ok_or_else(|| CoreError::generic("Entry to update not found"))?;
        validator.validate_update(&old_entry, &new_entry, &BatchView::new(&state.store))?;
        if &new_entry.address() == old {
            return Ok(old.clone());
        }

        let header = ChainHeader::new(&new_entry, &self.agent_address(), Some(old.clone()));
        let op = DhtOp::new(new_entry, header);
        let address = Self::apply(&mut state, &op)?;
        self.publish(op);
        Ok(address)
    }

    /// Tombstone an entry; returns the address of the deletion marker
    pub fn remove_entry(&self, address: &Address) -> Result<Address, CoreError> {
        self.commit_entry(Entry::Deletion(address.clone()))
    }

    pub fn link_entries(&self, base: &Address, target: &Address, tag: &str) -> Result<Address, CoreError> {
        self.commit_entry(Entry::LinkAdd(Link::new(base, target, tag)))
    }

    pub fn remove_link(&self, base: &Address, target: &Address, tag: &str) -> Result<Address, CoreError> {
        self.commit_entry(Entry::LinkRemove(Link::new(base, target, tag)))
    }

    pub fn get_entry(&self, address: &Address) -> Result<Option<Entry>, CoreError> {
        self.state.read().store.get(address)
    }

    pub fn get_entry_with_meta(&self, address: &Address) -> Result<Option<EntryWithMeta>, CoreError> {
        self.state.read().store.get_with_meta(address)
    }

    pub fn get_links(&self, base: &Address, tag: &str) -> Vec<Address> {
        self.state.read().links.links_from(base, tag)
    }

    /// Parked or rejected ops take precedence; otherwise an entry held
    /// locally is applied
    pub fn replication_state(&self, address: &Address) -> Result<ReplicaState, CoreError> {
        if let Some(state) = self.replicator.pending_state(address) {
            return Ok(state);
        }
        if self.state.read().store.contains(address)? {
            Ok(ReplicaState::Applied)
        } else {
            Ok(ReplicaState::Unseen)
        }
    }

    /// Handle an op delivered by a peer
    pub fn receive(&self, op: DhtOp) -> Result<ReplicaState, CoreError> {
        self.replicator.receive(self, op)
    }

    pub(crate) fn is_journaled(&self, id: &Address) -> Result<bool, CoreError> {
        self.state.read().store.is_journaled(id)
    }

    pub(crate) fn missing_dependencies(&self, op: &DhtOp) -> Result<Vec<Address>, CoreError> {
        let state = self.state.read();
        let mut missing = Vec::new();
        for dependency in op.dependencies() {
            if !state.store.contains(&dependency)? {
                missing.push(dependency);
            }
        }
        Ok(missing)
    }

    /// Validate a remote op against local state and apply it
    pub(crate) fn apply_remote(&self, op: &DhtOp) -> Result<Address, CoreError> {
        let validator = Validator::new(&self.dna);
        let mut state = self.state.write();
        if state.store.is_journaled(&op.id())? {
            return Ok(op.header().entry_address.clone());
        }
        {
            let view = BatchView::new(&state.store);
            match op {
                DhtOp::StoreEntry { entry, .. }
                | DhtOp::AddLink { entry, .. }
                | DhtOp::RemoveLink { entry, .. } => validator.validate(entry, &view)?,
                DhtOp::UpdateEntry { old, entry, .. } => match state.store.fetch_raw(old)? {
                    Some(old_entry) => validator.validate_update(&old_entry, entry, &view)?,
                    None => validator.validate(entry, &view)?,
                },
                DhtOp::RemoveEntry {
                    deleted, deletion, ..
                } => {
                    if state.store.is_live(deleted)? {
                        validator.validate(deletion, &view)?;
                    }
                }
            }
        }
        Self::apply(&mut state, op)
    }

    /// Write an already validated op to store and index, and journal it.
    /// An accepted commit makes its address live again even if it was
    /// deleted or superseded before.
    fn apply(state: &mut InstanceState, op: &DhtOp) -> Result<Address, CoreError> {
        let address = match op {
            DhtOp::StoreEntry { entry, .. } => state.store.put_live(entry)?,
            DhtOp::UpdateEntry { old, entry, .. } => {
                if state.store.is_live(old)? {
                    let new = state.store.update(old, entry)?;
                    state.links.retarget(old, &new);
                    new
                } else {
                    state.store.put_live(entry)?
                }
            }
            DhtOp::RemoveEntry {
                deleted, deletion, ..
            } => {
                let marker = state.store.put(deletion)?;
                if state.store.contains(deleted)? {
                    state.store.delete(deleted)?;
                }
                state.links.purge(deleted);
                marker
            }
            DhtOp::AddLink { entry, .. } => {
                let address = state.store.put_live(entry)?;
                if let Entry::LinkAdd(link) = entry {
                    state.links.add_link(link);
                }
                address
            }
            DhtOp::RemoveLink { entry, .. } => {
                let address = state.store.put_live(entry)?;
                if let Entry::LinkRemove(link) = entry {
                    state.links.remove_link(link);
                }
                address
            }
        };
        state.store.append_journal(op.header())?;
        Ok(address)
    }

    fn publish(&self, op: DhtOp) {
        if let Some(session) = self.session.lock().as_ref() {
            session.publisher.publish(op);
        }
    }

    /// Ops for every journaled header `author` wrote
    fn authored_ops(state: &InstanceState, author: &AgentAddress) -> Result<Vec<DhtOp>, CoreError> {
        let mut ops = Vec::new();
        for header in state.store.journal()? {
            if &header.author != author {
                continue;
            }
            if let Some(entry) = state.store.fetch_raw(&header.entry_address)? {
                ops.push(DhtOp::new(entry, header));
            }
        }
        Ok(ops)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.publisher.stop();
            session.inbox.abort();
        }
    }
}
