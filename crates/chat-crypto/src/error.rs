//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure).
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// The peer's public key is a low-order point; the exchange was rejected.
    #[error("key exchange rejected: low-order point")]
    WeakPublicKey,

    /// Random number generation failed.
    #[error("random number generation failed")]
    RandomFailed,

    /// Nonce counter exhausted; the session must rehandshake.
    #[error("nonce counter exhausted, rehandshake required")]
    NonceOverflow,

    /// A received nonce counter fell below the replay window.
    #[error("nonce rejected as a replay")]
    ReplayRejected,

    /// Argon2 parameters were out of the accepted bounds.
    #[error("invalid argon2 parameters: {0}")]
    InvalidParameter(String),

    /// Password hash derivation failed.
    #[error("password hashing failed")]
    HashingFailed,
}
