//! Error types for the ASR tool.
//!
//! Protocol errors (a non-zero `code` from the server) and malformed server
//! messages are not represented here: they are logged and the session keeps
//! accumulating text. Everything in [`IatError`] is either returned before a
//! session opens or attached to a [`RecognitionOutcome`](crate::RecognitionOutcome).

use thiserror::Error;

/// Errors produced while preparing or driving a recognition session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IatError {
    /// The caller supplied something that is not usable audio.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The audio source failed while the session was streaming.
    #[error("Failed to read audio: {0}")]
    AudioRead(String),

    /// Invalid configuration, missing credentials, or a signing failure.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The WebSocket handshake failed; no session was ever opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport failed after the session opened.
    #[error("Network error: {0}")]
    Network(String),

    /// The overall session deadline elapsed.
    #[error("Session timed out: {0}")]
    Timeout(String),

    /// A session task panicked or was lost.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IatError {
    /// Whether the error happened before any audio could reach the server.
    pub fn is_pre_session(&self) -> bool {
        matches!(
            self,
            IatError::InvalidInput(_) | IatError::Configuration(_) | IatError::ConnectionFailed(_)
        )
    }
}

pub type IatResult<T> = Result<T, IatError>;
