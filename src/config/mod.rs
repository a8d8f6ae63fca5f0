//! Configuration
//!
//! Container configuration is layered with the `config` crate: built-in
//! defaults, then the global file (`$XDG_CONFIG_HOME/dhtcell/config.toml`),
//! then the container file given on the command line, then `DHTCELL__*`
//! environment variables (`__` separates nested keys, e.g.
//! `DHTCELL__NETWORK__MAX_BACKOFF_MS=500`).

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;
mod storage;

pub use facade::ConfigLoader;
pub use paths::xdg_root as xdg;
pub use storage::StorageConfig;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "DHTCELL";
