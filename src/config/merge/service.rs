//! MergeService: orchestrates sources and deserializes to ContainerConfig.

use super::merge_policy;
use crate::config::sources::{container_file, environment, global_file};
use crate::container::config::ContainerConfig;
use config::ConfigError;
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Precedence: defaults (lowest) -> global file -> container file -> environment (highest).
    pub fn load(container: Option<&Path>) -> Result<ContainerConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = match container {
            Some(path) => container_file::add_to_builder(builder, path)?,
            None => builder,
        };
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }

    /// Load one file with environment overlay, ignoring the global file.
    pub fn load_from_file(path: &Path) -> Result<ContainerConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = container_file::add_to_builder(builder, path)?;
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crud::UpdatePolicy;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
            [[agents]]
            id = "alice"
            name = "alice"

            [[dnas]]
            id = "blog"
            app = "blog"

            [[instances]]
            id = "alice::blog"
            agent = "alice"
            dna = "blog"
            "#,
        );
        let config = MergeService::load_from_file(file.path()).unwrap();
        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.instances[0].id, "alice::blog");
        assert_eq!(config.update_policy, UpdatePolicy::Retire);
        assert!(config.check_consistency().is_ok());
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config("update_policy = \"retire\"\n");
        std::env::set_var("DHTCELL__UPDATE_POLICY", "redirect");
        let result = MergeService::load_from_file(file.path());
        std::env::remove_var("DHTCELL__UPDATE_POLICY");
        assert_eq!(result.unwrap().update_policy, UpdatePolicy::Redirect);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MergeService::load_from_file(&dir.path().join("absent.toml")).is_err());
    }
}
