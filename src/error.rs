//! Error types for configuration loading and the running engine.

use thiserror::Error;

/// Failures while reading and validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("missing required directive `{0}`")]
    MissingDirective(&'static str),
    #[error("directive `{directive}` given more than once")]
    DuplicateDirective { directive: &'static str },
    #[error("invalid router-id `{0}`: must be a non-negative integer")]
    InvalidRouterId(String),
    #[error("invalid port `{0}`: must be in range 1024-64000")]
    InvalidPort(String),
    #[error("invalid link spec `{0}`: expected `port-cost-id`")]
    InvalidLink(String),
    #[error("invalid link cost `{0}` in link spec: must be in range 1-15")]
    InvalidLinkCost(String),
    #[error("invalid timeout `{0}`: must be a positive integer")]
    InvalidTimeout(String),
    #[error("unrecognized directive `{0}`")]
    UnknownDirective(String),
    #[error("no input ports configured")]
    NoInputPorts,
}

/// Failures while the engine is running.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to bind input socket on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode outbound packet: {0}")]
    Encode(#[source] std::io::Error),
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}
