//! Error types for the chat protocol core.

use thiserror::Error;

/// Aggregating error type for code that spans the wire codec and the crypto
/// layer. Transport, registry, store, and chat-level errors stay local to
/// the crates that own those concerns; they don't fold into this enum.
#[derive(Debug, Error)]
pub enum Error {
    /// Frame parsing error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Cryptographic error.
    #[error("crypto error: {0}")]
    Crypto(#[from] chat_crypto::CryptoError),
}

/// Wire codec errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Frame too short to parse.
    #[error("frame too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Expected minimum size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// Invalid direction discriminant byte.
    #[error("invalid frame direction: 0x{0:02X}")]
    InvalidDirection(u8),

    /// Invalid opcode byte.
    #[error("invalid opcode: 0x{0:02X}")]
    InvalidOpCode(u8),

    /// Payload length exceeds the maximum datagram size.
    #[error("payload length exceeds maximum datagram size")]
    PayloadOverflow,

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid utf-8 in length-prefixed string")]
    InvalidUtf8,
}
