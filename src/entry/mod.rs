//! Entries
//!
//! Immutable, content-addressed values. Application data, agent identities,
//! link assertions and deletion markers are all entries; each one is addressed
//! by the hash of its canonical serialization.

pub mod address;

use crate::agent::AgentId;
use crate::crud::CrudStatus;
use crate::error::CoreError;
use crate::links::Link;
use crate::types::{Address, AgentAddress};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Entry type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    App(String),
    AgentId,
    LinkAdd,
    LinkRemove,
    Deletion,
}

impl EntryType {
    /// Stable name used in link definitions and headers
    pub fn name(&self) -> &str {
        match self {
            EntryType::App(name) => name,
            EntryType::AgentId => "%agent_id",
            EntryType::LinkAdd => "%link_add",
            EntryType::LinkRemove => "%link_remove",
            EntryType::Deletion => "%deletion",
        }
    }

    pub fn is_app(&self) -> bool {
        matches!(self, EntryType::App(_))
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entry {
    /// Application entry: declared type name and JSON payload
    App(String, Value),
    AgentId(AgentId),
    LinkAdd(Link),
    LinkRemove(Link),
    /// Tombstone marker naming the deleted address
    Deletion(Address),
}

impl Entry {
    pub fn app(entry_type: impl Into<String>, value: Value) -> Self {
        Entry::App(entry_type.into(), value)
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            Entry::App(name, _) => EntryType::App(name.clone()),
            Entry::AgentId(_) => EntryType::AgentId,
            Entry::LinkAdd(_) => EntryType::LinkAdd,
            Entry::LinkRemove(_) => EntryType::LinkRemove,
            Entry::Deletion(_) => EntryType::Deletion,
        }
    }

    /// Content address of this entry.
    ///
    /// An agent identity entry is addressed by the agent's public key.
    pub fn address(&self) -> Address {
        match self {
            Entry::AgentId(agent) => agent.address(),
            // Entry serialization cannot fail (string keys only); the debug
            // fallback keeps this total.
            other => address::address_of(other)
                .unwrap_or_else(|_| address::address_of_bytes(format!("{:?}", other).as_bytes())),
        }
    }

    /// Application payload, if this is an app entry
    pub fn app_value(&self) -> Option<&Value> {
        match self {
            Entry::App(_, value) => Some(value),
            _ => None,
        }
    }

    /// Retrieval envelope: `{"App": [type, "<serialized payload>"]}` for app
    /// entries, the plain serialization otherwise.
    pub fn to_envelope(&self) -> Result<Value, CoreError> {
        match self {
            Entry::App(name, value) => Ok(serde_json::json!({
                "App": [name, serde_json::to_string(value)?]
            })),
            other => Ok(serde_json::to_value(other)?),
        }
    }
}

/// Provenance record for a committed entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHeader {
    pub entry_type: EntryType,
    pub entry_address: Address,
    pub author: AgentAddress,
    /// RFC 3339 commit time
    pub timestamp: String,
    /// Address superseded by this entry (updates and deletions)
    pub replaced: Option<Address>,
}

impl ChainHeader {
    pub fn new(entry: &Entry, author: &AgentAddress, replaced: Option<Address>) -> Self {
        ChainHeader {
            entry_type: entry.entry_type(),
            entry_address: entry.address(),
            author: author.clone(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            replaced,
        }
    }

    /// Identity of the commit: the hash of the header
    pub fn id(&self) -> Address {
        address::address_of(self).unwrap_or_else(|_| self.entry_address.clone())
    }
}

/// Entry together with its lifecycle metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryWithMeta {
    pub entry: Entry,
    pub crud_status: CrudStatus,
    pub crud_link: Option<Address>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_app_entry_address_is_deterministic() {
        let a = Entry::app("post", json!({"content": "hi", "date_created": "now"}));
        let b = Entry::app("post", json!({"date_created": "now", "content": "hi"}));
        assert_eq!(a.address(), b.address());
        assert_eq!(a.address().as_str().len(), address::ADDRESS_LEN);
    }

    #[test]
    fn test_entry_type_participates_in_address() {
        let a = Entry::app("post", json!({"content": "hi"}));
        let b = Entry::app("comment", json!({"content": "hi"}));
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn test_agent_entry_addressed_by_key() {
        let agent = AgentId::generate_fake("alice");
        let entry = Entry::AgentId(agent.clone());
        assert_eq!(entry.address(), agent.address());
        assert_eq!(entry.entry_type().name(), "%agent_id");
    }

    #[test]
    fn test_envelope_serializes_payload_as_string() {
        let entry = Entry::app("post", json!({"content": "hi"}));
        let envelope = entry.to_envelope().unwrap();
        let parts = envelope["App"].as_array().unwrap();
        assert_eq!(parts[0], "post");
        let payload: Value = serde_json::from_str(parts[1].as_str().unwrap()).unwrap();
        assert_eq!(payload["content"], "hi");
    }
}
