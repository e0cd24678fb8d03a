use std::path::PathBuf;

use thiserror::Error;

/// Per-cycle error taxonomy. Everything here is caught and logged at the
/// lane loop boundary; nothing crosses it.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("network error from {context}: {message}")]
    Network {
        context: &'static str,
        message: String,
    },
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("recognition error: {0}")]
    Recognition(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("snapshot write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Startup-only failures. Fatal: the loop never starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("no lanes configured")]
    NoLanes,
}
