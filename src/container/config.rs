//! Container configuration
//!
//! Which agents exist, which application packages they run, and how each
//! instance stores its data. Loaded from TOML (see [`crate::config`]) or
//! built in code with [`make_config`].

use crate::agent::AgentId;
use crate::config::StorageConfig;
use crate::crud::UpdatePolicy;
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::replication::GossipConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfiguration {
    pub id: String,
    pub name: String,
    /// Public key; derived from the name when absent
    #[serde(default)]
    pub public_address: Option<String>,
}

impl AgentConfiguration {
    pub fn to_agent_id(&self) -> AgentId {
        match &self.public_address {
            Some(key) => AgentId::new(self.name.clone(), key.clone()),
            None => AgentId::generate_fake(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnaConfiguration {
    pub id: String,
    /// Name of a registered application package
    pub app: String,
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Where an instance keeps its entries
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InstanceStorage {
    #[default]
    Memory,
    /// Sled database; defaults to a directory under the data dir
    File {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfiguration {
    pub id: String,
    pub agent: String,
    pub dna: String,
    #[serde(default)]
    pub storage: InstanceStorage,
}

/// Complete container configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default)]
    pub agents: Vec<AgentConfiguration>,
    #[serde(default)]
    pub dnas: Vec<DnaConfiguration>,
    #[serde(default)]
    pub instances: Vec<InstanceConfiguration>,
    #[serde(default)]
    pub network: GossipConfig,
    #[serde(default)]
    pub update_policy: UpdatePolicy,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ContainerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ApiError> {
        toml::from_str(source).map_err(|e| ApiError::ConfigError(format!("Invalid TOML: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    pub fn agent(&self, id: &str) -> Option<&AgentConfiguration> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn dna(&self, id: &str) -> Option<&DnaConfiguration> {
        self.dnas.iter().find(|d| d.id == id)
    }

    pub fn instance(&self, id: &str) -> Option<&InstanceConfiguration> {
        self.instances.iter().find(|i| i.id == id)
    }

    /// Verify ids are unique and every instance references a known agent
    /// and DNA. All problems are reported together.
    pub fn check_consistency(&self) -> Result<(), ApiError> {
        let mut problems = Vec::new();

        for (kind, ids) in [
            ("agent", self.agents.iter().map(|a| a.id.as_str()).collect::<Vec<_>>()),
            ("dna", self.dnas.iter().map(|d| d.id.as_str()).collect()),
            ("instance", self.instances.iter().map(|i| i.id.as_str()).collect()),
        ] {
            let mut seen = HashSet::new();
            for id in ids {
                if id.trim().is_empty() {
                    problems.push(format!("Empty {} id", kind));
                } else if !seen.insert(id) {
                    problems.push(format!("Duplicate {} id: {}", kind, id));
                }
            }
        }

        for instance in &self.instances {
            if self.agent(&instance.agent).is_none() {
                problems.push(format!(
                    "Instance '{}' references unknown agent '{}'",
                    instance.id, instance.agent
                ));
            }
            if self.dna(&instance.dna).is_none() {
                problems.push(format!(
                    "Instance '{}' references unknown dna '{}'",
                    instance.id, instance.dna
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ApiError::ConfigError(problems.join("; ")))
        }
    }
}

/// Build a configuration from `(agent name, app name)` pairs. Each pair
/// becomes an in-memory instance with id `"<agent>::<app>"`.
pub fn make_config(instances: &[(&str, &str)]) -> ContainerConfig {
    let mut config = ContainerConfig::default();
    for (agent, app) in instances {
        if config.agent(agent).is_none() {
            config.agents.push(AgentConfiguration {
                id: agent.to_string(),
                name: agent.to_string(),
                public_address: None,
            });
        }
        if config.dna(app).is_none() {
            config.dnas.push(DnaConfiguration {
                id: app.to_string(),
                app: app.to_string(),
                uuid: None,
            });
        }
        config.instances.push(InstanceConfiguration {
            id: instance_id(agent, app),
            agent: agent.to_string(),
            dna: app.to_string(),
            storage: InstanceStorage::Memory,
        });
    }
    config
}

pub fn instance_id(agent: &str, dna: &str) -> String {
    format!("{}::{}", agent, dna)
}
