//! Error types for the receiver adapter

use thiserror::Error;

/// Errors from a single command exchange with the receiver
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No host or port is configured for the device
    #[error("Receiver address not configured")]
    NotConfigured,

    /// The receiver is disconnected and the retry interval has not elapsed
    #[error("Reconnect backoff active")]
    BackoffActive,

    /// The TCP connect did not complete in time
    #[error("Connection to {host}:{port} timed out")]
    ConnectTimeout { host: String, port: u16 },

    /// The TCP connect was refused or the host is unreachable
    #[error("Connection to {host}:{port} failed: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Writing the frame or reading the response failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The adapter is stopping
    #[error("Operation cancelled")]
    Cancelled,
}

/// Errors surfaced by the adapter handle
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The adapter task has already stopped
    #[error("Adapter is stopped")]
    Stopped,

    /// The adapter task ended abnormally
    #[error("Adapter task failed: {0}")]
    TaskFailed(String),

    /// Invalid adapter configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failures of the standalone reachability probe
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Host is required")]
    HostRequired,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("No response from receiver")]
    NoResponse,

    #[error("Empty response from receiver")]
    EmptyResponse,

    #[error("Unexpected response from receiver")]
    UnexpectedResponse,

    /// The owning adapter is stopping
    #[error("Probe cancelled")]
    Cancelled,
}

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;
