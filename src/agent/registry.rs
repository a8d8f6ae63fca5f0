//! Agent registry: the agents a container knows, by configuration id.

use crate::agent::AgentId;
use crate::container::config::AgentConfiguration;
use crate::entry::address;
use crate::error::ApiError;
use std::collections::HashMap;

/// Agent registry
pub struct AgentRegistry {
    agents: HashMap<String, AgentId>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Build a registry from configured agents. Duplicate ids are an error.
    pub fn from_config(agents: &[AgentConfiguration]) -> Result<Self, ApiError> {
        let mut registry = Self::new();
        for agent in agents {
            if registry.get(&agent.id).is_some() {
                return Err(ApiError::ConfigError(format!(
                    "Duplicate agent id: {}",
                    agent.id
                )));
            }
            registry.register(&agent.id, agent.to_agent_id());
        }
        Ok(registry)
    }

    pub fn register(&mut self, id: &str, agent: AgentId) {
        self.agents.insert(id.to_string(), agent);
    }

    pub fn get(&self, id: &str) -> Option<&AgentId> {
        self.agents.get(id)
    }

    pub fn get_or_error(&self, id: &str) -> Result<&AgentId, ApiError> {
        self.get(id)
            .ok_or_else(|| ApiError::ConfigError(format!("Agent not found: {}", id)))
    }

    /// All agents, sorted by id
    pub fn list_all(&self) -> Vec<(&str, &AgentId)> {
        let mut agents: Vec<_> = self
            .agents
            .iter()
            .map(|(id, agent)| (id.as_str(), agent))
            .collect();
        agents.sort_by(|a, b| a.0.cmp(b.0));
        agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Check one agent's identity
    pub fn validate_agent(&self, id: &str) -> ValidationResult {
        let mut result = ValidationResult::new(id.to_string());
        let Some(agent) = self.get(id) else {
            result.add_error("Agent not found in registry".to_string());
            return result;
        };

        result.add_check("Nick is not empty", !agent.nick.trim().is_empty());
        result.add_check(
            "Public key is a well-formed address",
            address::is_well_formed(&agent.address()),
        );
        let shared = self
            .agents
            .iter()
            .filter(|(other_id, other)| *other_id != id && other.pub_sign_key == agent.pub_sign_key)
            .count();
        result.add_check("Public key is unique", shared == 0);
        result
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of an agent validation
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub agent_id: String,
    pub checks: Vec<(String, bool)>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new(agent_id: String) -> Self {
        Self {
            agent_id,
            checks: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn add_check(&mut self, description: &str, passed: bool) {
        self.checks.push((description.to_string(), passed));
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.checks.iter().all(|(_, passed)| *passed)
    }

    pub fn total_checks(&self) -> usize {
        self.checks.len()
    }

    pub fn passed_checks(&self) -> usize {
        self.checks.iter().filter(|(_, passed)| *passed).count()
    }
}
