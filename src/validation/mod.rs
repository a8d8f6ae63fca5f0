//! Validation Engine
//!
//! Runs before any write is acknowledged. Application entries are checked
//! against the rules declared for their type in the DNA; link and deletion
//! entries are checked for referential integrity. Every failure is a
//! [`CoreError`] value and nothing is written.

pub mod rules;

pub use rules::ValidationRule;

use crate::dna::Dna;
use crate::entry::Entry;
use crate::error::CoreError;
use crate::links::{validate_tag, Link};
use crate::types::Address;
use tracing::debug;

/// Read access to live entries, as seen by a validation run
pub trait EntryLookup {
    fn lookup(&self, address: &Address) -> Result<Option<Entry>, CoreError>;
}

/// Validates candidate entries against one DNA
pub struct Validator<'a> {
    dna: &'a Dna,
}

impl<'a> Validator<'a> {
    pub fn new(dna: &'a Dna) -> Self {
        Self { dna }
    }

    /// Validate a new entry
    pub fn validate(&self, entry: &Entry, lookup: &dyn EntryLookup) -> Result<(), CoreError> {
        let result = match entry {
            Entry::App(entry_type, payload) => {
                let def = self.dna.entry_def(entry_type).ok_or_else(|| {
                    CoreError::validation_failed(format!("Unknown entry type: '{}'", entry_type))
                })?;
                def.rules
                    .iter()
                    .try_for_each(|rule| rule.check(payload, lookup))
            }
            Entry::AgentId(_) => Ok(()),
            Entry::LinkAdd(link) | Entry::LinkRemove(link) => self.validate_link(link, lookup),
            Entry::Deletion(deleted) => match lookup.lookup(deleted)? {
                Some(_) => Ok(()),
                None => Err(CoreError::generic("Entry to delete not found")),
            },
        };
        if let Err(ref err) = result {
            debug!(entry_type = %entry.entry_type(), error = %err.kind, "Entry rejected");
        }
        result
    }

    /// Validate an entry replacing `old`
    pub fn validate_update(
        &self,
        old: &Entry,
        new: &Entry,
        lookup: &dyn EntryLookup,
    ) -> Result<(), CoreError> {
        if old.entry_type() != new.entry_type() {
            return Err(CoreError::validation_failed(format!(
                "Entry type mismatch on update: '{}' to '{}'",
                old.entry_type(),
                new.entry_type()
            )));
        }
        self.validate(new, lookup)
    }

    fn validate_link(&self, link: &Link, lookup: &dyn EntryLookup) -> Result<(), CoreError> {
        validate_tag(&link.tag)?;
        let base = lookup
            .lookup(&link.base)?
            .ok_or_else(|| CoreError::generic("Base for link not found"))?;
        let target = lookup
            .lookup(&link.target)?
            .ok_or_else(|| CoreError::generic("Target for link not found"))?;

        let base_type = base.entry_type();
        let target_type = target.entry_type();
        if self
            .dna
            .link_allowed(base_type.name(), &link.tag, target_type.name())
        {
            Ok(())
        } else {
            Err(CoreError::validation_failed(format!(
                "Link tag '{}' not defined for base type '{}'",
                link.tag,
                base_type.name()
            )))
        }
    }
}
