//! Links and the link index
//!
//! A link is a directed, tagged relation from a base address to a target
//! address. The index answers "all targets linked from base under tag" in
//! insertion order, and keeps a reverse map so tombstoned or updated
//! addresses can be removed or repointed without a full scan.

use crate::entry::Entry;
use crate::error::CoreError;
use crate::store::EntryStore;
use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Characters that may not appear in a link tag
const FORBIDDEN_TAG_CHARS: &[char] = &['/', ':', '*', '?', '<', '>', '"', '\'', '\\', '|', '+'];

/// Directed relation (base, tag, target)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub base: Address,
    pub target: Address,
    pub tag: String,
}

impl Link {
    pub fn new(base: &Address, target: &Address, tag: &str) -> Self {
        Link {
            base: base.clone(),
            target: target.clone(),
            tag: tag.to_string(),
        }
    }
}

/// Reject tags containing path or glob characters
pub fn validate_tag(tag: &str) -> Result<(), CoreError> {
    if tag.is_empty() || tag.contains(FORBIDDEN_TAG_CHARS) {
        return Err(CoreError::generic("Attribute name invalid"));
    }
    Ok(())
}

/// Link index: (base, tag) -> ordered targets
#[derive(Debug, Default, Clone)]
pub struct LinkIndex {
    forward: HashMap<(Address, String), Vec<Address>>,
    /// Tags in use per base, for purging a base
    tags_by_base: HashMap<Address, BTreeSet<String>>,
    /// Reverse index: target -> (base, tag) keys that reference it
    reverse: HashMap<Address, BTreeSet<(Address, String)>>,
}

impl LinkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a link. Returns false if it was already present.
    pub fn add_link(&mut self, link: &Link) -> bool {
        let key = (link.base.clone(), link.tag.clone());
        let targets = self.forward.entry(key.clone()).or_default();
        if targets.contains(&link.target) {
            return false;
        }
        targets.push(link.target.clone());
        self.tags_by_base
            .entry(link.base.clone())
            .or_default()
            .insert(link.tag.clone());
        self.reverse
            .entry(link.target.clone())
            .or_default()
            .insert(key);
        true
    }

    /// Remove a link. Returns false if it was not present.
    pub fn remove_link(&mut self, link: &Link) -> bool {
        let key = (link.base.clone(), link.tag.clone());
        let removed = match self.forward.get_mut(&key) {
            Some(targets) => {
                let before = targets.len();
                targets.retain(|t| t != &link.target);
                before != targets.len()
            }
            None => false,
        };
        if removed {
            self.drop_empty_key(&key);
            if let Some(keys) = self.reverse.get_mut(&link.target) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.reverse.remove(&link.target);
                }
            }
        }
        removed
    }

    /// Targets linked from `base` under `tag`, in insertion order
    pub fn links_from(&self, base: &Address, tag: &str) -> Vec<Address> {
        self.forward
            .get(&(base.clone(), tag.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Remove every link whose base or target is `address`.
    ///
    /// Returns the number of links removed.
    pub fn purge(&mut self, address: &Address) -> usize {
        let mut removed = 0;

        if let Some(tags) = self.tags_by_base.remove(address) {
            for tag in tags {
                let key = (address.clone(), tag);
                if let Some(targets) = self.forward.remove(&key) {
                    for target in &targets {
                        if let Some(keys) = self.reverse.get_mut(target) {
                            keys.remove(&key);
                            if keys.is_empty() {
                                self.reverse.remove(target);
                            }
                        }
                    }
                    removed += targets.len();
                }
            }
        }

        if let Some(keys) = self.reverse.remove(address) {
            for key in keys {
                if let Some(targets) = self.forward.get_mut(&key) {
                    let before = targets.len();
                    targets.retain(|t| t != address);
                    removed += before - targets.len();
                }
                self.drop_empty_key(&key);
            }
        }

        removed
    }

    /// Point links targeting `old` at `new`, keeping their position, and
    /// move links based on `old` over to `new`.
    ///
    /// Returns the number of links repointed or moved.
    pub fn retarget(&mut self, old: &Address, new: &Address) -> usize {
        if old == new {
            return 0;
        }
        let mut moved = self.move_targets(old, new);
        moved += self.move_base(old, new);
        moved
    }

    fn move_targets(&mut self, old: &Address, new: &Address) -> usize {
        let Some(keys) = self.reverse.remove(old) else {
            return 0;
        };
        let mut moved = 0;
        for key in keys {
            if let Some(targets) = self.forward.get_mut(&key) {
                if targets.contains(new) {
                    targets.retain(|t| t != old);
                } else {
                    for target in targets.iter_mut() {
                        if target == old {
                            *target = new.clone();
                        }
                    }
                }
                moved += 1;
            }
            self.reverse.entry(new.clone()).or_default().insert(key);
        }
        moved
    }

    /// Appends `old`'s targets after any `new` already has under the same tag
    fn move_base(&mut self, old: &Address, new: &Address) -> usize {
        let Some(tags) = self.tags_by_base.remove(old) else {
            return 0;
        };
        let mut moved = 0;
        for tag in tags {
            let old_key = (old.clone(), tag.clone());
            let new_key = (new.clone(), tag.clone());
            let Some(targets) = self.forward.remove(&old_key) else {
                continue;
            };
            for target in targets {
                if let Some(keys) = self.reverse.get_mut(&target) {
                    keys.remove(&old_key);
                }
                let existing = self.forward.entry(new_key.clone()).or_default();
                if !existing.contains(&target) {
                    existing.push(target.clone());
                    moved += 1;
                }
                self.reverse
                    .entry(target)
                    .or_default()
                    .insert(new_key.clone());
            }
            self.tags_by_base.entry(new.clone()).or_default().insert(tag);
        }
        moved
    }

    /// Rebuild an index by replaying the store's commit journal
    pub fn rebuild(store: &EntryStore) -> Result<Self, CoreError> {
        let mut index = Self::new();
        for header in store.journal()? {
            let Some(entry) = store.fetch_raw(&header.entry_address)? else {
                continue;
            };
            match (&entry, &header.replaced) {
                (Entry::LinkAdd(link), _) => {
                    index.add_link(link);
                }
                (Entry::LinkRemove(link), _) => {
                    index.remove_link(link);
                }
                (Entry::Deletion(deleted), _) => {
                    index.purge(deleted);
                }
                (_, Some(old)) => {
                    index.retarget(old, &header.entry_address);
                }
                _ => {}
            }
        }
        Ok(index)
    }

    /// Number of (base, tag) keys with at least one target
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Iterate over all links
    pub fn iter(&self) -> impl Iterator<Item = Link> + '_ {
        self.forward.iter().flat_map(|((base, tag), targets)| {
            targets.iter().map(move |target| Link::new(base, target, tag))
        })
    }

    fn drop_empty_key(&mut self, key: &(Address, String)) {
        let empty = self.forward.get(key).map(|t| t.is_empty()).unwrap_or(false);
        if empty {
            self.forward.remove(key);
            if let Some(tags) = self.tags_by_base.get_mut(&key.0) {
                tags.remove(&key.1);
                if tags.is_empty() {
                    self.tags_by_base.remove(&key.0);
                }
            }
        }
    }
}
