//! Client-observable errors: local state-machine violations, transport
//! failures, and structured failures forwarded from the server's `kind`
//! taxonomy (see the error handling design).

use chat_core::request_table::RequestError;
use chat_transport::transport::TransportError;
use thiserror::Error;

/// Errors an application driving a [`crate::session::ClientSession`] may
/// observe.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An operation that requires a live session was attempted before
    /// `connect` or after `disconnect`.
    #[error("not connected")]
    NotConnected,
    /// `login`/`register` was attempted on a session already authenticated.
    #[error("already authenticated")]
    AlreadyAuthenticated,
    /// An authenticated-only operation was attempted before `login`.
    #[error("not authenticated")]
    NotAuthenticated,
    /// Credentials did not match a stored record.
    #[error("credential invalid")]
    CredentialInvalid,
    /// `register` was called with an already-taken username.
    #[error("user already exists")]
    UserExists,
    /// `say`'s recipient does not name a registered user.
    #[error("recipient unknown")]
    RecipientUnknown,
    /// `say`'s recipient is registered but not currently online.
    #[error("recipient offline")]
    RecipientOffline,
    /// `say` was called with empty message text.
    #[error("message text is empty")]
    EmptyMessage,
    /// No response arrived within the request timeout.
    #[error("request timed out")]
    RequestTimeout,
    /// The session was torn down while a request was outstanding.
    #[error("endpoint closed")]
    EndpointClosed,
    /// The handshake did not complete within its timeout.
    #[error("handshake timed out")]
    HandshakeTimeout,
    /// This session's send nonce counter would wrap; the session is closed
    /// and a fresh `connect` (rehandshake) is required.
    #[error("nonce counter exhausted, reconnect required")]
    NonceExhausted,
    /// The server's handshake public key was rejected (low-order point).
    #[error("handshake rejected: weak server public key")]
    WeakServerKey,
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The server replied with a shape the client did not expect for the
    /// request it sent (a protocol mismatch, not a taxonomy failure).
    #[error("unexpected response from server")]
    UnexpectedResponse,
    /// A structured failure reported by the server whose `kind` does not
    /// map to one of the variants above.
    #[error("server error ({kind}): {message}")]
    Server {
        /// Machine-readable taxonomy name, as sent by the server.
        kind: String,
        /// Human-readable detail.
        message: String,
    },
}

impl From<RequestError> for ClientError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::RequestTimeout => Self::RequestTimeout,
            RequestError::EndpointClosed => Self::EndpointClosed,
        }
    }
}

impl ClientError {
    /// Convert a server-reported `{ kind, message }` failure into the
    /// matching typed variant, falling back to [`Self::Server`] for an
    /// unrecognized kind.
    #[must_use]
    pub fn from_server(kind: String, message: String) -> Self {
        match kind.as_str() {
            "NotAuthenticated" => Self::NotAuthenticated,
            "AlreadyAuthenticated" => Self::AlreadyAuthenticated,
            "CredentialInvalid" => Self::CredentialInvalid,
            "UserExists" => Self::UserExists,
            "RecipientUnknown" => Self::RecipientUnknown,
            "RecipientOffline" => Self::RecipientOffline,
            "EmptyMessage" => Self::EmptyMessage,
            _ => Self::Server { kind, message },
        }
    }
}
