//! Host API available to zome functions

use super::Instance;
use crate::agent::AgentId;
use crate::dna::Dna;
use crate::entry::Entry;
use crate::error::CoreError;
use crate::links::Link;
use crate::types::{Address, AgentAddress, DnaAddress};

/// Handle passed to a zome function for the duration of one call
pub struct ZomeApi<'a> {
    instance: &'a Instance,
    zome: &'a str,
}

impl<'a> ZomeApi<'a> {
    pub(crate) fn new(instance: &'a Instance, zome: &'a str) -> Self {
        Self { instance, zome }
    }

    pub fn zome_name(&self) -> &str {
        self.zome
    }

    pub fn instance_id(&self) -> &str {
        self.instance.id()
    }

    pub fn agent(&self) -> &AgentId {
        self.instance.agent()
    }

    pub fn agent_address(&self) -> AgentAddress {
        self.instance.agent_address()
    }

    pub fn dna(&self) -> &Dna {
        self.instance.dna()
    }

    pub fn dna_address(&self) -> &DnaAddress {
        self.instance.dna_address()
    }

    pub fn commit_entry(&self, entry: Entry) -> Result<Address, CoreError> {
        self.instance.commit_entry(entry)
    }

    /// Commit several entries atomically
    pub fn commit_batch(&self, entries: Vec<Entry>) -> Result<Vec<Address>, CoreError> {
        self.instance.commit_batch(entries)
    }

    pub fn get_entry(&self, address: &Address) -> Result<Option<Entry>, CoreError> {
        self.instance.get_entry(address)
    }

    pub fn update_entry(&self, old: &Address, entry: Entry) -> Result<Address, CoreError> {
        self.instance.update_entry(old, entry)
    }

    pub fn remove_entry(&self, address: &Address) -> Result<(), CoreError> {
        self.instance.remove_entry(address).map(|_| ())
    }

    /// Link entry for use in a batch
    pub fn link_entry(&self, base: &Address, target: &Address, tag: &str) -> Entry {
        Entry::LinkAdd(Link::new(base, target, tag))
    }

    pub fn link_entries(&self, base: &Address, target: &Address, tag: &str) -> Result<Address, CoreError> {
        self.instance.link_entries(base, target, tag)
    }

    pub fn remove_link(&self, base: &Address, target: &Address, tag: &str) -> Result<(), CoreError> {
        self.instance.remove_link(base, target, tag).map(|_| ())
    }

    pub fn get_links(&self, base: &Address, tag: &str) -> Vec<Address> {
        self.instance.get_links(base, tag)
    }
}
