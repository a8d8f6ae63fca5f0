//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use crate::container::config::ContainerConfig;
use config::ConfigError;
use std::path::{Path, PathBuf};

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Path of the global configuration file
    pub fn global_config_path() -> Option<PathBuf> {
        super::xdg::config_home()
            .ok()
            .map(|home| home.join("dhtcell").join("config.toml"))
    }

    /// Load configuration from the global file, an optional container
    /// file and the environment.
    pub fn load(container_file: Option<&Path>) -> Result<ContainerConfig, ConfigError> {
        MergeService::load(container_file)
    }

    /// Load configuration from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<ContainerConfig, ConfigError> {
        MergeService::load_from_file(path)
    }

    pub fn default() -> ContainerConfig {
        ContainerConfig::default()
    }
}
