//! Error types for the load-test engine.

use thiserror::Error;

/// Errors produced by the engine.
///
/// Expected per-endpoint failures never cross the engine boundary as `Err`
/// from a fan-out operation; they are folded into that endpoint's
/// [`CallOutcome`](crate::result::CallOutcome) so the harness decides what
/// counts as a test failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad or missing unit setup. Fatal: aborts setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Endpoint unreachable. Fatal at setup, a failed result thereafter.
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed caller input or ABI encoding failure. Detected before nonce
    /// assignment, so no nonce is consumed.
    #[error("build error: {0}")]
    Build(String),

    /// The node rejected a transaction synchronously. The nonce is already
    /// consumed and is not rolled back.
    #[error("submission error: {0}")]
    Submission(String),

    /// Confirmation or poll exceeded its bound.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl EngineError {
    /// Configuration error from anything displayable.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Configuration(msg.to_string())
    }

    /// Connection error from anything displayable.
    pub fn connection(msg: impl std::fmt::Display) -> Self {
        Self::Connection(msg.to_string())
    }

    /// Build error from anything displayable.
    pub fn build(msg: impl std::fmt::Display) -> Self {
        Self::Build(msg.to_string())
    }

    /// Submission error from anything displayable.
    pub fn submission(msg: impl std::fmt::Display) -> Self {
        Self::Submission(msg.to_string())
    }

    /// Timeout error from anything displayable.
    pub fn timeout(msg: impl std::fmt::Display) -> Self {
        Self::Timeout(msg.to_string())
    }
}

/// Engine result alias.
pub type Result<T> = std::result::Result<T, EngineError>;
