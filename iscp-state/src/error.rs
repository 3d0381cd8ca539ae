//! Error types for iscp-state

use thiserror::Error;

/// Result type for iscp-state operations
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors raised while translating channel values
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    /// The requested value cannot be expressed as a receiver command
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The channel id is not one this receiver exposes
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// The channel exists but cannot be written
    #[error("Channel is read-only: {0}")]
    ReadOnly(String),

    /// Command construction failed in the codec layer
    #[error("Codec error: {0}")]
    Codec(#[from] iscp_codec::CodecError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_error_display() {
        let error = StateError::InvalidArgument("Volume must be numeric".to_string());
        assert_eq!(error.to_string(), "Invalid argument: Volume must be numeric");

        let error = StateError::UnknownChannel("bass".to_string());
        assert_eq!(error.to_string(), "Unknown channel: bass");
    }

    #[test]
    fn test_conversion_from_codec_error() {
        let codec = iscp_codec::CodecError::InvalidCode("xx".to_string());
        let error: StateError = codec.into();
        assert!(matches!(error, StateError::Codec(_)));
    }
}
