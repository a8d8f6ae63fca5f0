//! Defaults applied beneath every configuration source.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};

/// Builder seeded with the scalar defaults every configuration starts from
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    config::Config::builder()
        .set_default("update_policy", "retire")?
        .set_default("network.initial_backoff_ms", 10)?
        .set_default("network.max_backoff_ms", 1000)?
        .set_default("network.backoff_factor", 2.0)?
        .set_default("logging.level", "info")
}
