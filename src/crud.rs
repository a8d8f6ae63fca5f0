//! Entry lifecycle
//!
//! Entries are never mutated. An update writes a new entry and marks the old
//! address `Modified` with a link to its successor; a delete marks the address
//! `Deleted`. The content itself stays in the content store.

use crate::types::Address;
use serde::{Deserialize, Serialize};

/// Upper bound on successor hops followed by a redirecting read
pub const MAX_REDIRECT_HOPS: usize = 64;

/// Lifecycle status of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrudStatus {
    Live,
    Modified,
    Deleted,
}

/// Lifecycle metadata stored alongside an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub crud_status: CrudStatus,
    /// Successor address when `Modified`
    pub crud_link: Option<Address>,
}

impl EntryMeta {
    pub fn live() -> Self {
        Self {
            crud_status: CrudStatus::Live,
            crud_link: None,
        }
    }

    pub fn modified(successor: Address) -> Self {
        Self {
            crud_status: CrudStatus::Modified,
            crud_link: Some(successor),
        }
    }

    pub fn deleted() -> Self {
        Self {
            crud_status: CrudStatus::Deleted,
            crud_link: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.crud_status == CrudStatus::Live
    }
}

/// What a plain read of an updated address returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    /// The superseded address resolves to nothing
    #[default]
    Retire,
    /// The superseded address resolves to its latest live successor
    Redirect,
}
