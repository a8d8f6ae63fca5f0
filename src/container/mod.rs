//! Container
//!
//! Hosts the instances named in a [`ContainerConfig`], wires them to one
//! in-process network, and routes zome calls. Domain failures come back as
//! [`ZomeCallResult::Err`]; `ApiError` is reserved for infrastructure
//! faults such as an unknown or stopped instance.

pub mod config;

pub use config::{make_config, ContainerConfig};

use crate::agent::AgentRegistry;
use crate::container::config::InstanceStorage;
use crate::dna::DnaRegistry;
use crate::entry::Entry;
use crate::error::{ApiError, CoreError};
use crate::instance::{Instance, InstanceInfo};
use crate::poll::{self, PollConfig};
use crate::replication::InMemoryNetwork;
use crate::store::EntryStore;
use crate::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Error payload of a failed zome call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallError {
    /// JSON string of the [`CoreError`]
    Internal(String),
}

/// Result of a zome call: `{"Ok": value}` or `{"Err": {"Internal": "..."}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ZomeCallResult {
    Ok(Value),
    Err(CallError),
}

impl ZomeCallResult {
    pub fn from_result(result: Result<Value, CoreError>) -> Self {
        match result {
            Ok(value) => ZomeCallResult::Ok(value),
            Err(err) => ZomeCallResult::Err(CallError::Internal(
                serde_json::to_string(&err).unwrap_or_else(|_| err.to_string()),
            )),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ZomeCallResult::Ok(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            ZomeCallResult::Ok(value) => Some(value),
            ZomeCallResult::Err(_) => None,
        }
    }

    /// Decoded error, if the call failed
    pub fn core_error(&self) -> Option<CoreError> {
        match self {
            ZomeCallResult::Err(CallError::Internal(json)) => serde_json::from_str(json).ok(),
            ZomeCallResult::Ok(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub struct Container {
    config: ContainerConfig,
    agents: AgentRegistry,
    network: Arc<InMemoryNetwork>,
    instances: BTreeMap<String, Arc<Instance>>,
}

impl Container {
    /// Build every configured instance using the built-in DNAs
    pub fn from_config(config: ContainerConfig) -> Result<Self, ApiError> {
        Self::with_registry(config, &DnaRegistry::builtin())
    }

    pub fn with_registry(config: ContainerConfig, dnas: &DnaRegistry) -> Result<Self, ApiError> {
        config.check_consistency()?;
        let agents = AgentRegistry::from_config(&config.agents)?;

        let mut instances = BTreeMap::new();
        for instance_config in &config.instances {
            let agent = agents.get_or_error(&instance_config.agent)?.clone();
            let dna_config = config.dna(&instance_config.dna).ok_or_else(|| {
                ApiError::ConfigError(format!("Unknown dna id: {}", instance_config.dna))
            })?;
            let mut dna = dnas
                .get(&dna_config.app)
                .cloned()
                .ok_or_else(|| ApiError::UnknownDna(dna_config.app.clone()))?;
            if let Some(uuid) = &dna_config.uuid {
                dna = dna.with_uuid(uuid);
            }

            let store = match &instance_config.storage {
                InstanceStorage::Memory => EntryStore::memory(config.update_policy),
                InstanceStorage::File { path } => {
                    let path = match path {
                        Some(path) => path.clone(),
                        None => config.storage.instance_path(&instance_config.id)?,
                    };
                    std::fs::create_dir_all(&path).map_err(crate::error::StorageError::from)?;
                    EntryStore::open(&path, config.update_policy)?
                }
            };

            let instance = Instance::new(&instance_config.id, agent, dna, store)?;
            instances.insert(instance_config.id.clone(), Arc::new(instance));
        }

        info!(instances = instances.len(), "Container configured");
        Ok(Self {
            config,
            agents,
            network: Arc::new(InMemoryNetwork::new()),
            instances,
        })
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn network(&self) -> &Arc<InMemoryNetwork> {
        &self.network
    }

    pub fn instance(&self, id: &str) -> Result<&Arc<Instance>, ApiError> {
        self.instances
            .get(id)
            .ok_or_else(|| ApiError::InstanceNotFound(id.to_string()))
    }

    pub fn instances(&self) -> impl Iterator<Item = &Arc<Instance>> {
        self.instances.values()
    }

    pub fn instance_infos(&self) -> Result<Vec<InstanceInfo>, ApiError> {
        self.instances()
            .map(|instance| instance.info().map_err(ApiError::from))
            .collect()
    }

    /// Start every instance, then connect all of them to each other
    pub fn start_all_instances(&self) -> Result<(), ApiError> {
        for instance in self.instances.values() {
            instance.start(self.network.clone(), self.config.network.clone())?;
        }
        self.sync_peers()
    }

    pub fn start_instance(&self, id: &str) -> Result<(), ApiError> {
        self.instance(id)?
            .start(self.network.clone(), self.config.network.clone())?;
        self.sync_peers()
    }

    pub fn stop_instance(&self, id: &str) -> Result<(), ApiError> {
        self.instance(id)?.stop();
        Ok(())
    }

    pub fn stop(&self) {
        for instance in self.instances.values() {
            instance.stop();
        }
    }

    fn sync_peers(&self) -> Result<(), ApiError> {
        for instance in self.instances.values() {
            instance.sync_peers()?;
        }
        Ok(())
    }

    /// Call a zome function on a running instance
    pub fn call(
        &self,
        instance_id: &str,
        zome: &str,
        capability: &str,
        function: &str,
        params: Value,
    ) -> Result<ZomeCallResult, ApiError> {
        let instance = self.instance(instance_id)?;
        if !instance.is_running() {
            return Err(ApiError::InstanceNotRunning(instance_id.to_string()));
        }
        let result = instance.call(zome, capability, function, params);
        if let Err(err) = &result {
            if !err.is_recoverable() {
                warn!(instance = instance_id, zome, function, error = %err, "Zome call failed");
            }
        }
        Ok(ZomeCallResult::from_result(result))
    }

    /// Wait until `address` is readable on an instance
    pub async fn wait_for_entry(
        &self,
        instance_id: &str,
        address: &Address,
        config: &PollConfig,
    ) -> Result<Entry, ApiError> {
        let instance = self.instance(instance_id)?;
        poll::try_wait_for(config, || instance.get_entry(address).map_err(ApiError::from)).await
    }

    /// Wait until at least `count` links exist from `base` under `tag`
    pub async fn wait_for_links(
        &self,
        instance_id: &str,
        base: &Address,
        tag: &str,
        count: usize,
        config: &PollConfig,
    ) -> Result<Vec<Address>, ApiError> {
        let instance = self.instance(instance_id)?;
        Ok(poll::wait_for(config, || {
            let links = instance.get_links(base, tag);
            (links.len() >= count).then_some(links)
        })
        .await?)
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_call_result_shapes() {
        let ok = ZomeCallResult::from_result(Ok(json!("QmAddress")));
        assert_eq!(ok.to_json(), json!({ "Ok": "QmAddress" }));

        let err = ZomeCallResult::from_result(Err(CoreError::validation_failed(
            "Content too long",
        )));
        let value = err.to_json();
        let internal = value["Err"]["Internal"].as_str().unwrap();
        let decoded: CoreError = serde_json::from_str(internal).unwrap();
        assert_eq!(
            decoded.kind,
            ErrorKind::ValidationFailed("Content too long".to_string())
        );
        assert_eq!(err.core_error(), Some(decoded));
    }

    #[test]
    fn test_unknown_app_is_rejected() {
        let config = make_config(&[("alice", "chat")]);
        assert!(matches!(
            Container::from_config(config),
            Err(ApiError::UnknownDna(app)) if app == "chat"
        ));
    }

    #[tokio::test]
    async fn test_call_requires_running_instance() {
        let container = Container::from_config(make_config(&[("alice", "blog")])).unwrap();
        assert!(matches!(
            container.call("alice::blog", "blog", "main", "whoami", json!({})),
            Err(ApiError::InstanceNotRunning(_))
        ));
        assert!(matches!(
            container.call("nobody::blog", "blog", "main", "whoami", json!({})),
            Err(ApiError::InstanceNotFound(_))
        ));
        container.start_all_instances().unwrap();
        let result = container
            .call("alice::blog", "blog", "main", "whoami", json!({}))
            .unwrap();
        assert!(result.is_ok());
    }
}
