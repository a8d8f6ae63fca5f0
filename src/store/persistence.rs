//! Sled-backed store backends
//!
//! Entries are stored as canonical JSON (their payloads are arbitrary JSON
//! values); lifecycle metadata and journal headers use bincode. Journal keys
//! are big-endian sled-generated ids, so iteration order is commit order.

use super::{ContentStore, MetaStore};
use crate::crud::EntryMeta;
use crate::entry::{address, ChainHeader, Entry};
use crate::error::StorageError;
use crate::types::Address;

const ENTRIES_TREE: &str = "entries";
const META_TREE: &str = "meta";
const JOURNAL_TREE: &str = "journal";
const JOURNAL_IDS_TREE: &str = "journal_ids";

pub struct SledContentStore {
    tree: sled::Tree,
}

impl SledContentStore {
    pub fn new(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            tree: db.open_tree(ENTRIES_TREE)?,
        })
    }
}

impl ContentStore for SledContentStore {
    fn put(&self, entry: &Entry) -> Result<Address, StorageError> {
        let address = entry.address();
        let bytes = address::canonical_bytes(entry)?;
        self.tree.insert(address.as_str().as_bytes(), bytes)?;
        self.tree.flush()?;
        Ok(address)
    }

    fn fetch(&self, address: &Address) -> Result<Option<Entry>, StorageError> {
        match self.tree.get(address.as_str().as_bytes())? {
            Some(bytes) => {
                let entry: Entry = serde_json::from_slice(&bytes).map_err(|e| {
                    StorageError::Corrupt {
                        address: address.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    fn contains(&self, address: &Address) -> Result<bool, StorageError> {
        Ok(self.tree.contains_key(address.as_str().as_bytes())?)
    }

    fn addresses(&self) -> Result<Vec<Address>, StorageError> {
        let mut addresses = Vec::new();
        for key in self.tree.iter().keys() {
            let key = key?;
            let text = String::from_utf8(key.to_vec()).map_err(|e| StorageError::Corrupt {
                address: format!("{:?}", key),
                reason: e.to_string(),
            })?;
            addresses.push(Address::new(text));
        }
        Ok(addresses)
    }
}

pub struct SledMetaStore {
    db: sled::Db,
    meta: sled::Tree,
    journal: sled::Tree,
    journal_ids: sled::Tree,
}

impl SledMetaStore {
    pub fn new(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            db: db.clone(),
            meta: db.open_tree(META_TREE)?,
            journal: db.open_tree(JOURNAL_TREE)?,
            journal_ids: db.open_tree(JOURNAL_IDS_TREE)?,
        })
    }
}

impl MetaStore for SledMetaStore {
    fn get_meta(&self, address: &Address) -> Result<Option<EntryMeta>, StorageError> {
        match self.meta.get(address.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_meta(&self, address: &Address, meta: &EntryMeta) -> Result<(), StorageError> {
        let bytes = bincode::serialize(meta)?;
        self.meta.insert(address.as_str().as_bytes(), bytes)?;
        self.meta.flush()?;
        Ok(())
    }

    fn append_journal(&self, header: &ChainHeader) -> Result<(), StorageError> {
        let seq = self.db.generate_id()?;
        let bytes = bincode::serialize(header)?;
        self.journal.insert(seq.to_be_bytes(), bytes)?;
        self.journal_ids
            .insert(header.id().as_str().as_bytes(), seq.to_be_bytes().to_vec())?;
        self.journal.flush()?;
        self.journal_ids.flush()?;
        Ok(())
    }

    fn journal(&self) -> Result<Vec<ChainHeader>, StorageError> {
        let mut headers = Vec::new();
        for item in self.journal.iter().values() {
            headers.push(bincode::deserialize(&item?)?);
        }
        Ok(headers)
    }

    fn is_journaled(&self, id: &Address) -> Result<bool, StorageError> {
        Ok(self.journal_ids.contains_key(id.as_str().as_bytes())?)
    }
}
