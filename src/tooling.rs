//! Tooling & Integration Layer
//!
//! Command-line access to containers: inspect configuration, compute
//! addresses, and run zome calls against configured instances.

pub mod cli;

pub use cli::{CallRequest, Cli, CliContext, Commands};
