//! Domain error types

use crate::stream::assembler::StreamDecodeError;
use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    StreamDecode(#[from] StreamDecodeError),

    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_decode_error_is_transparent() {
        let error = DomainError::from(StreamDecodeError::new(2, "unexpected end of input"));
        assert_eq!(
            error.to_string(),
            "Tool call #2 could not be decoded: unexpected end of input"
        );
    }

    #[test]
    fn invalid_arguments_display() {
        let error = DomainError::InvalidArguments {
            tool: "roll_dice".to_string(),
            reason: "expected object".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid arguments for tool 'roll_dice': expected object"
        );
    }
}
