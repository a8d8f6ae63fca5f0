//! Entry Store
//!
//! Content-addressed storage for entries, plus lifecycle metadata and a
//! commit journal. Backends implement [`ContentStore`] and [`MetaStore`];
//! [`EntryStore`] composes them into put / get / update / delete semantics.

pub mod memory;
pub mod persistence;

use crate::crud::{EntryMeta, UpdatePolicy, MAX_REDIRECT_HOPS};
use crate::entry::{ChainHeader, Entry, EntryWithMeta};
use crate::error::{CoreError, StorageError};
use crate::types::Address;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub use memory::{MemoryContentStore, MemoryMetaStore};
pub use persistence::{SledContentStore, SledMetaStore};

/// Content-addressable storage
pub trait ContentStore: Send + Sync {
    /// Store an entry under its address. Idempotent.
    fn put(&self, entry: &Entry) -> Result<Address, StorageError>;
    fn fetch(&self, address: &Address) -> Result<Option<Entry>, StorageError>;
    fn contains(&self, address: &Address) -> Result<bool, StorageError> {
        Ok(self.fetch(address)?.is_some())
    }
    fn addresses(&self) -> Result<Vec<Address>, StorageError>;
}

/// Lifecycle metadata and commit journal
pub trait MetaStore: Send + Sync {
    fn get_meta(&self, address: &Address) -> Result<Option<EntryMeta>, StorageError>;
    fn put_meta(&self, address: &Address, meta: &EntryMeta) -> Result<(), StorageError>;
    /// Append a header to the commit journal
    fn append_journal(&self, header: &ChainHeader) -> Result<(), StorageError>;
    /// All journaled headers in commit order
    fn journal(&self) -> Result<Vec<ChainHeader>, StorageError>;
    /// True if a header with this id has been journaled
    fn is_journaled(&self, id: &Address) -> Result<bool, StorageError>;
}

/// Entry store: content plus lifecycle
#[derive(Clone)]
pub struct EntryStore {
    content: Arc<dyn ContentStore>,
    meta: Arc<dyn MetaStore>,
    policy: UpdatePolicy,
}

impl EntryStore {
    pub fn new(
        content: Arc<dyn ContentStore>,
        meta: Arc<dyn MetaStore>,
        policy: UpdatePolicy,
    ) -> Self {
        Self {
            content,
            meta,
            policy,
        }
    }

    /// In-memory store
    pub fn memory(policy: UpdatePolicy) -> Self {
        Self::new(
            Arc::new(MemoryContentStore::new()),
            Arc::new(MemoryMetaStore::new()),
            policy,
        )
    }

    /// Sled-backed store rooted at `path`
    pub fn open(path: &Path, policy: UpdatePolicy) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self::new(
            Arc::new(SledContentStore::new(&db)?),
            Arc::new(SledMetaStore::new(&db)?),
            policy,
        ))
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    /// Persist an entry and return its content address.
    ///
    /// Addresses seen for the first time are marked live; existing lifecycle
    /// state is left alone, so re-putting a deleted entry does not revive it.
    pub fn put(&self, entry: &Entry) -> Result<Address, CoreError> {
        let address = self.content.put(entry)?;
        if self.meta.get_meta(&address)?.is_none() {
            self.meta.put_meta(&address, &EntryMeta::live())?;
        }
        Ok(address)
    }

    /// Persist an accepted commit and mark its address live, whatever
    /// lifecycle state it had before.
    ///
    /// Entries are addressed by content, so recreating a deleted entry or
    /// reverting an update lands on an address that already has history.
    pub fn put_live(&self, entry: &Entry) -> Result<Address, CoreError> {
        let address = self.content.put(entry)?;
        let live = self
            .meta
            .get_meta(&address)?
            .map(|meta| meta.is_live())
            .unwrap_or(false);
        if !live {
            self.meta.put_meta(&address, &EntryMeta::live())?;
            debug!(address = %address, "Entry live");
        }
        Ok(address)
    }

    /// Read an entry. Absent, deleted and (under `Retire`) superseded
    /// addresses resolve to `None`.
    pub fn get(&self, address: &Address) -> Result<Option<Entry>, CoreError> {
        match self.resolve(address)? {
            Some(live) => Ok(self.content.fetch(&live)?),
            None => Ok(None),
        }
    }

    /// Resolve an address to the live address a read should return
    pub fn resolve(&self, address: &Address) -> Result<Option<Address>, CoreError> {
        let mut current = address.clone();
        for _ in 0..MAX_REDIRECT_HOPS {
            let Some(meta) = self.meta.get_meta(&current)? else {
                return Ok(None);
            };
            if meta.is_live() {
                return Ok(Some(current));
            }
            match (self.policy, meta.crud_link) {
                (UpdatePolicy::Redirect, Some(next)) => current = next,
                _ => return Ok(None),
            }
        }
        Err(CoreError::generic(format!(
            "Update chain from {} exceeds {} hops",
            address, MAX_REDIRECT_HOPS
        )))
    }

    /// True if the address holds a live entry
    pub fn is_live(&self, address: &Address) -> Result<bool, CoreError> {
        Ok(self
            .meta
            .get_meta(address)?
            .map(|meta| meta.is_live())
            .unwrap_or(false))
    }

    /// True if the content store holds the address, whatever its status
    pub fn contains(&self, address: &Address) -> Result<bool, CoreError> {
        Ok(self.content.contains(address)?)
    }

    /// Supersede `old` with `new_entry`. Returns the new address.
    pub fn update(&self, old: &Address, new_entry: &Entry) -> Result<Address, CoreError> {
        if !self.is_live(old)? {
            return Err(CoreError::generic("Entry to update not found"));
        }
        let new_address = new_entry.address();
        if &new_address == old {
            return Ok(new_address);
        }
        self.put_live(new_entry)?;
        self.meta
            .put_meta(old, &EntryMeta::modified(new_address.clone()))?;
        debug!(old = %old, new = %new_address, "Entry superseded");
        Ok(new_address)
    }

    /// Tombstone an address
    pub fn delete(&self, address: &Address) -> Result<(), CoreError> {
        match self.meta.get_meta(address)? {
            None => Err(CoreError::generic("Entry to delete not found")),
            Some(meta) if meta.crud_status == crate::crud::CrudStatus::Deleted => Ok(()),
            Some(_) => {
                self.meta.put_meta(address, &EntryMeta::deleted())?;
                debug!(address = %address, "Entry tombstoned");
                Ok(())
            }
        }
    }

    /// Entry and lifecycle metadata regardless of status
    pub fn get_with_meta(&self, address: &Address) -> Result<Option<EntryWithMeta>, CoreError> {
        let Some(entry) = self.content.fetch(address)? else {
            return Ok(None);
        };
        let meta = self.meta.get_meta(address)?.unwrap_or_else(EntryMeta::live);
        Ok(Some(EntryWithMeta {
            entry,
            crud_status: meta.crud_status,
            crud_link: meta.crud_link,
        }))
    }

    pub fn meta(&self, address: &Address) -> Result<Option<EntryMeta>, CoreError> {
        Ok(self.meta.get_meta(address)?)
    }

    /// Fetch an entry without lifecycle filtering
    pub fn fetch_raw(&self, address: &Address) -> Result<Option<Entry>, CoreError> {
        Ok(self.content.fetch(address)?)
    }

    pub fn append_journal(&self, header: &ChainHeader) -> Result<(), CoreError> {
        Ok(self.meta.append_journal(header)?)
    }

    pub fn journal(&self) -> Result<Vec<ChainHeader>, CoreError> {
        Ok(self.meta.journal()?)
    }

    pub fn is_journaled(&self, id: &Address) -> Result<bool, CoreError> {
        Ok(self.meta.is_journaled(id)?)
    }

    pub fn addresses(&self) -> Result<Vec<Address>, CoreError> {
        Ok(self.content.addresses()?)
    }
}
