//! Agents
//!
//! An agent is the identity under which entries are authored. Each running
//! instance binds exactly one agent to one application package.

mod registry;

pub use registry::{AgentRegistry, ValidationResult};

use crate::entry::address;
use crate::types::AgentAddress;
use serde::{Deserialize, Serialize};

/// Agent identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId {
    /// Human readable name
    pub nick: String,
    /// Public signing key, in address format
    pub pub_sign_key: String,
}

impl AgentId {
    pub fn new(nick: impl Into<String>, pub_sign_key: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            pub_sign_key: pub_sign_key.into(),
        }
    }

    /// Deterministic identity derived from a name.
    ///
    /// Stands in for key generation: distinct names always give distinct keys.
    pub fn generate_fake(nick: &str) -> Self {
        let key = address::address_of_bytes(format!("dhtcell/agent/{}", nick).as_bytes());
        Self::new(nick, key.as_str())
    }

    /// The agent's address is its public key
    pub fn address(&self) -> AgentAddress {
        AgentAddress::new(self.pub_sign_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_keys_are_stable_per_name() {
        assert_eq!(
            AgentId::generate_fake("alice"),
            AgentId::generate_fake("alice")
        );
    }

    #[test]
    fn test_distinct_agents_distinct_addresses() {
        let alice = AgentId::generate_fake("alice");
        let bob = AgentId::generate_fake("bob");
        assert_ne!(alice.address(), bob.address());
        assert!(address::is_well_formed(&alice.address()));
    }
}
