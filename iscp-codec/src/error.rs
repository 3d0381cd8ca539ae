//! Error types for the ISCP codec

use thiserror::Error;

/// Errors that can occur while building ISCP commands
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Command codes are exactly three ASCII uppercase letters
    #[error("Invalid command code: {0:?}")]
    InvalidCode(String),

    /// Parameters are printable ASCII without line terminators
    #[error("Invalid command parameter: {0:?}")]
    InvalidParameter(String),
}

/// Convenience Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
