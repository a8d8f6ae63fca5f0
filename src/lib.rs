//! dhtcell: Content-Addressed Entry Store with Peer Replication
//!
//! Agents run application packages (DNAs) as instances. Each instance owns
//! a content-addressed entry store with per-type validation, CRUD status
//! tracking and typed links, and gossips its authored operations to every
//! other instance of the same DNA until all replicas converge.

pub mod agent;
pub mod config;
pub mod container;
pub mod crud;
pub mod dna;
pub mod entry;
pub mod error;
pub mod instance;
pub mod links;
pub mod logging;
pub mod poll;
pub mod replication;
pub mod store;
pub mod tooling;
pub mod types;
pub mod validation;

pub use container::{Container, ContainerConfig, ZomeCallResult};
pub use entry::{ChainHeader, Entry};
pub use error::{ApiError, CoreError, ErrorKind};
pub use instance::Instance;
pub use types::Address;
