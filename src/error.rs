//! Error types
//!
//! Two families live here. [`CoreError`] is a domain failure value: it is
//! returned inside call results (validation rejections, missing link bases,
//! capability checks) and is serializable so it can cross the call boundary.
//! [`StorageError`], [`NetworkError`] and [`ApiError`] describe
//! infrastructure faults that escalate outside the result channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Tagged kind of a domain failure.
///
/// Serializes externally tagged, e.g. `{"ValidationFailed": "Content too long"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ErrorKind {
    #[error("{0}")]
    ValidationFailed(String),

    #[error("{0}")]
    ErrorGeneric(String),

    #[error("Capability check failed")]
    CapabilityCheckFailed,

    #[error("Zome not found: {0}")]
    ZomeNotFound(String),

    #[error("Zome function not found: {0}")]
    ZomeFunctionNotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Timeout")]
    Timeout,
}

/// Structured domain error carrying the source location that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub file: String,
    pub line: u32,
}

impl CoreError {
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        let location = Location::caller();
        CoreError {
            kind,
            file: location.file().to_string(),
            line: location.line(),
        }
    }

    #[track_caller]
    pub fn validation_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed(reason.into()))
    }

    #[track_caller]
    pub fn generic(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ErrorGeneric(reason.into()))
    }

    /// True for failures the caller can fix by changing its input.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ValidationFailed(_) | ErrorKind::ErrorGeneric(_)
        )
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.kind, self.file, self.line)
    }
}

impl std::error::Error for CoreError {}

impl From<StorageError> for CoreError {
    #[track_caller]
    fn from(err: StorageError) -> Self {
        CoreError::new(ErrorKind::Storage(err.to_string()))
    }
}

impl From<serde_json::Error> for CoreError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        CoreError::new(ErrorKind::SerializationError(err.to_string()))
    }
}

/// Storage backend errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt record at {address}: {reason}")]
    Corrupt { address: String, reason: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Gossip transport errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Top-level infrastructure error for the container, configuration and CLI
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Network error: {0}")]
    NetworkError(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Instance not running: {0}")]
    InstanceNotRunning(String),

    #[error("Unknown application package: {0}")]
    UnknownDna(String),

    #[error("Async runtime unavailable: {0}")]
    Runtime(String),

    #[error("Convergence failed: {0}")]
    Convergence(#[from] crate::poll::ConvergenceError),

    #[error("{0}")]
    Core(#[from] CoreError),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::ConfigError(format!("Invalid JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_records_caller_location() {
        let err = CoreError::validation_failed("Content too long");
        assert!(err.file.ends_with("error.rs"));
        assert!(err.line > 0);
        assert_eq!(
            err.kind,
            ErrorKind::ValidationFailed("Content too long".to_string())
        );
    }

    #[test]
    fn test_error_kind_serializes_externally_tagged() {
        let json = serde_json::to_value(ErrorKind::ErrorGeneric(
            "Base for link not found".to_string(),
        ))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "ErrorGeneric": "Base for link not found" })
        );
    }

    #[test]
    fn test_core_error_shape() {
        let err = CoreError::generic("boom");
        let value = serde_json::to_value(&err).unwrap();
        assert!(value.get("kind").is_some());
        assert!(value.get("file").is_some());
        assert!(value.get("line").is_some());
        assert!(err.is_recoverable());
        assert!(!CoreError::new(ErrorKind::Timeout).is_recoverable());
    }
}
