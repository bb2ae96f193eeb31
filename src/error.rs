//! Error Taxonomy
//!
//! Typed errors for the navigation core. Only transport-level failures are
//! retried (inside the inference client); everything else surfaces
//! synchronously to the step orchestrator.

use std::time::Duration;

use thiserror::Error;

use crate::types::OutputMode;

/// A single failed transport round trip. Every variant is transient: the
/// inference client retries these up to its attempt cap.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response body is not valid JSON: {0}")]
    Body(String),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced by the navigation core.
#[derive(Debug, Error)]
pub enum NavError {
    /// Transport kept failing until the retry budget ran out. Fatal for the
    /// step; carries the last transport failure.
    #[error("inference transport failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The endpoint answered, but the body does not have the required shape
    /// (missing `choices`, missing `usage.total_tokens`, ...). Never retried.
    #[error("malformed inference response: {0}")]
    Protocol(String),

    /// Too many images for a single request. Raised before any network call.
    #[error("request carries {count} images, limit is {limit}")]
    ImageLimit { count: usize, limit: usize },

    /// The model's answer does not match the action grammar. Recoverable:
    /// the agent substitutes the stop action.
    #[error("model output does not match the action grammar: {0}")]
    Parse(String),

    /// The simulator's reported state disagrees with the expected target.
    /// Fatal for the episode.
    #[error("simulator desynchronized: expected viewpoint {expected}, got {actual}")]
    Desync { expected: String, actual: String },

    /// The requested model / output-mode pairing is not one of the two
    /// supported combinations.
    #[error("unsupported pairing: model {model} with {mode:?} output")]
    UnsupportedPairing { model: String, mode: OutputMode },

    #[error("configuration error: {0}")]
    Config(String),

    /// Precondition violation on caller-supplied input.
    #[error("{0}")]
    Input(String),

    /// A simulator port operation failed at the adapter level.
    #[error("simulator port failure: {0}")]
    Simulator(anyhow::Error),

    /// A prompt/memory port operation failed at the adapter level.
    #[error("prompt port failure: {0}")]
    Prompt(anyhow::Error),
}

/// Convenience alias for core operations.
pub type NavResult<T> = std::result::Result<T, NavError>;
