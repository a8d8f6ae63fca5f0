//! In-memory store backends

use super::{ContentStore, MetaStore};
use crate::crud::EntryMeta;
use crate::entry::{ChainHeader, Entry};
use crate::error::StorageError;
use crate::types::Address;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct MemoryContentStore {
    entries: RwLock<HashMap<Address, Entry>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContentStore for MemoryContentStore {
    fn put(&self, entry: &Entry) -> Result<Address, StorageError> {
        let address = entry.address();
        self.entries
            .write()
            .entry(address.clone())
            .or_insert_with(|| entry.clone());
        Ok(address)
    }

    fn fetch(&self, address: &Address) -> Result<Option<Entry>, StorageError> {
        Ok(self.entries.read().get(address).cloned())
    }

    fn contains(&self, address: &Address) -> Result<bool, StorageError> {
        Ok(self.entries.read().contains_key(address))
    }

    fn addresses(&self) -> Result<Vec<Address>, StorageError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryMetaStore {
    meta: RwLock<HashMap<Address, EntryMeta>>,
    journal: RwLock<Vec<ChainHeader>>,
    journal_ids: RwLock<HashSet<Address>>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetaStore for MemoryMetaStore {
    fn get_meta(&self, address: &Address) -> Result<Option<EntryMeta>, StorageError> {
        Ok(self.meta.read().get(address).cloned())
    }

    fn put_meta(&self, address: &Address, meta: &EntryMeta) -> Result<(), StorageError> {
        self.meta.write().insert(address.clone(), meta.clone());
        Ok(())
    }

    fn append_journal(&self, header: &ChainHeader) -> Result<(), StorageError> {
        self.journal_ids.write().insert(header.id());
        self.journal.write().push(header.clone());
        Ok(())
    }

    fn journal(&self) -> Result<Vec<ChainHeader>, StorageError> {
        Ok(self.journal.read().clone())
    }

    fn is_journaled(&self, id: &Address) -> Result<bool, StorageError> {
        Ok(self.journal_ids.read().contains(id))
    }
}
