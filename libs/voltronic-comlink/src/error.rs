//! Communication Link Error Types
//!
//! Core error taxonomy for the Voltronic command stack.

use thiserror::Error;

/// Result type for voltronic-comlink operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Communication link errors
///
/// `Clone` is required: the caching layer stores failed results and
/// re-raises them until their TTL expires. I/O causes are therefore
/// carried as strings rather than as `std::io::Error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Frame failed structural validation (terminator, length, marker)
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Frame checksum did not match the recomputed CRC-16/XMODEM
    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// Device answered with the NAK sentinel frame
    #[error("Device rejected the command (NAK)")]
    NegativeAcknowledgement,

    /// Response payload did not match the caller-supplied pattern
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No complete frame arrived within the per-attempt deadline
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Every attempt of the retry loop failed
    #[error("Too many attempts ({0})")]
    TooManyAttempts(u32),

    /// Port auto-discovery found no usable serial port
    #[error("No RS232 port available")]
    NoPort,

    /// Command contains bytes that cannot go on the wire
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}

// Helper methods for creating errors
impl LinkError {
    pub fn invalid_message(msg: impl Into<String>) -> Self {
        LinkError::InvalidMessage(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        LinkError::Validation(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        LinkError::Encoding(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        LinkError::Io(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        LinkError::Config(msg.into())
    }

    /// Stable label for error counters
    pub fn kind(&self) -> &'static str {
        match self {
            LinkError::InvalidMessage(_) => "invalid_message",
            LinkError::ChecksumMismatch { .. } => "checksum_mismatch",
            LinkError::NegativeAcknowledgement => "nak",
            LinkError::Validation(_) => "validation",
            LinkError::Timeout(_) => "timeout",
            LinkError::TooManyAttempts(_) => "too_many_attempts",
            LinkError::NoPort => "no_port",
            LinkError::Encoding(_) => "encoding",
            LinkError::Io(_) => "io",
            LinkError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts_to_string_payload() {
        let err: LinkError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "Broken pipe").into();
        assert_eq!(err, LinkError::Io("Broken pipe".to_string()));
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn checksum_mismatch_display_is_hex() {
        let err = LinkError::ChecksumMismatch {
            expected: 0xBEAC,
            actual: 0x0001,
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch: expected 0xbeac, got 0x0001"
        );
    }

    #[test]
    fn errors_are_cloneable_for_caching() {
        let err = LinkError::Timeout(1000);
        let copy = err.clone();
        assert_eq!(err, copy);
    }
}
