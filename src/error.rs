//! Unified SDK error types.

use thiserror::Error;

/// Top-level SDK error.
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("twin directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("transport error: {0}")]
    Ws(#[from] WsError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("{0}")]
    Other(String),
}

/// Pre-flight identity errors. Fatal to the client instance.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("invalid mnemonic: {0}")]
    BadMnemonic(String),

    #[error("invalid key type '{0}', should be one of ed25519 or sr25519")]
    UnknownKeyType(String),

    #[error("failed to create identity: {0}")]
    CreationFailed(String),
}

/// Twin directory errors. Lookup failures are transient and retryable.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("twin {0} not found")]
    TwinNotFound(u32),

    #[error("no twin registered for public key")]
    TwinNotFoundByKey,

    #[error("twin lookup failed: {0}")]
    Lookup(#[from] reqwest::Error),

    #[error("malformed twin record: {0}")]
    BadRecord(String),

    #[error("failed to update twin record: {0}")]
    UpdateFailed(String),
}

/// Per-envelope errors. On the async/server side the envelope is dropped;
/// on the synchronous call side they are returned to the caller.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("could not verify signature")]
    BadSignature,

    #[error("unrecognized signature prefix {0:#04x}")]
    UnknownSignaturePrefix(u8),

    #[error("received an invalid envelope: {0}")]
    Malformed(String),

    #[error("invalid schema received '{got}', expecting '{want}'")]
    SchemaMismatch { got: String, want: String },

    #[error("received a non response envelope")]
    UnexpectedKind,

    #[error("invalid cipher: {0}")]
    BadCipher(String),

    #[error("relay error: {0}")]
    Relay(String),

    #[error("failed to decode envelope: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Relay transport errors. Reported on writes while the connection is
/// re-establishing; the reader channel stays silent across reconnects.
#[derive(Error, Debug)]
pub enum WsError {
    #[error("not connected")]
    NotConnected,

    #[error("transport disconnected")]
    Disconnected,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

/// Local broker errors (peer-mediated path).
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("{0}")]
    Other(String),
}

/// An error reported by the remote peer application, surfaced verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub code: u32,
    pub message: String,
}

/// Server-side dispatch errors. Surfaced to the caller as a
/// [`RemoteError`] with code 255.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("function not found")]
    FunctionNotFound,

    #[error("handler panicked with: {0}")]
    Panic(String),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// A handler failure with the given message.
    pub fn new(message: impl std::fmt::Display) -> Self {
        HandlerError::Failed(message.to_string())
    }
}
