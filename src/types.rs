//! Core types for the dhtcell entry store and replication system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address: content hash of an entry's canonical serialization.
///
/// Rendered as a base58 multihash string (BLAKE3-256), always 46 characters
/// for addresses computed by [`crate::entry::address`]. Agent keys share the
/// same format.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Address(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address(value.to_string())
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Address(value)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Agent address: the agent's public key, in address format
pub type AgentAddress = Address;

/// DNA address: content address of an application package summary
pub type DnaAddress = Address;

/// Instance identifier as used in container configuration and calls
pub type InstanceId = String;

/// Hash: raw 256-bit digest
pub type Hash = [u8; 32];
