//! StorageConfig and path resolution for file-backed instances.

use crate::config::xdg;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for instance databases; `$XDG_DATA_HOME/dhtcell` when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn data_dir(&self) -> Result<PathBuf, ApiError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => xdg::dhtcell_data_dir(),
        }
    }

    /// Default database directory of an instance
    pub fn instance_path(&self, instance_id: &str) -> Result<PathBuf, ApiError> {
        Ok(self
            .data_dir()?
            .join("instances")
            .join(xdg::instance_dir_name(instance_id)))
    }
}
