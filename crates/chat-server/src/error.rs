//! Error types for the server-side components: registry, user store, and
//! chatroom state.

use thiserror::Error;

/// Session registry errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Credentials did not match a stored record.
    #[error("credential invalid")]
    CredentialInvalid,
    /// The peer's session has not authenticated yet.
    #[error("not authenticated")]
    NotAuthenticated,
    /// The peer's session is already authenticated as a (possibly
    /// different) user.
    #[error("already authenticated")]
    AlreadyAuthenticated,
    /// No session exists for the given peer address.
    #[error("unknown session")]
    UnknownSession,
}

/// User store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `register` was called with an already-taken username.
    #[error("user already exists")]
    UserExists,
    /// Credentials did not match (wrong password or unknown user).
    #[error("credential invalid")]
    CredentialInvalid,
    /// The on-disk store file exists but could not be parsed.
    #[error("user store corrupt: {0}")]
    StoreCorrupt(String),
    /// An I/O error occurred reading or writing the store file.
    #[error("user store I/O error: {0}")]
    StoreIoError(#[from] std::io::Error),
    /// A cryptographic operation (hashing/verification) failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] chat_crypto::CryptoError),
}

/// Chatroom state errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChatError {
    /// `to` does not name a registered user.
    #[error("recipient unknown")]
    RecipientUnknown,
    /// `to` is registered but has no authenticated session.
    #[error("recipient offline")]
    RecipientOffline,
    /// The message text was empty.
    #[error("message text is empty")]
    EmptyMessage,
}

impl RegistryError {
    /// Machine-readable error taxonomy name, per the error handling design.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CredentialInvalid => "CredentialInvalid",
            Self::NotAuthenticated => "NotAuthenticated",
            Self::AlreadyAuthenticated => "AlreadyAuthenticated",
            Self::UnknownSession => "UnknownSession",
        }
    }
}

impl StoreError {
    /// Machine-readable error taxonomy name, per the error handling design.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserExists => "UserExists",
            Self::CredentialInvalid => "CredentialInvalid",
            Self::StoreCorrupt(_) => "StoreCorrupt",
            Self::StoreIoError(_) => "StoreIoError",
            Self::Crypto(_) => "StoreIoError",
        }
    }
}

impl ChatError {
    /// Machine-readable error taxonomy name, per the error handling design.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RecipientUnknown => "RecipientUnknown",
            Self::RecipientOffline => "RecipientOffline",
            Self::EmptyMessage => "EmptyMessage",
        }
    }
}
