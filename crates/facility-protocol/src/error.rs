//! Protocol error types.

use facility_core::TimeError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding datagrams.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The datagram or a field inside it ended early.
    #[error("truncated message: expected {expected} bytes, got {received}")]
    Truncated { expected: usize, received: usize },

    /// The header parsed but names no known opcode.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u32),

    /// Status word that is not a known status code.
    #[error("unknown status code {0}")]
    UnknownStatus(u32),

    /// A day byte that is neither `0..=6` nor `'0'..='6'`.
    #[error("invalid day byte: {0:#04x}")]
    InvalidDay(u8),

    /// An HHMM byte that is neither an ASCII digit nor a raw digit value.
    #[error("invalid time digit: {0:#04x}")]
    InvalidTimeDigit(u8),

    /// Out-of-range time or empty interval.
    #[error("invalid time: {0}")]
    InvalidTime(#[from] TimeError),

    /// Facility name is not UTF-8.
    #[error("facility name is not valid UTF-8")]
    InvalidUtf8,

    /// Declared or encoded payload does not fit in a datagram.
    #[error("payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
}
