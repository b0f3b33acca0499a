//! Error types for the scanning core
//!
//! Decode errors never leave a scan session; they are logged and the frame
//! is treated as "no record". Only engine initialization failures surface.

use thiserror::Error;

/// Errors raised by engine lifecycle and session setup
#[derive(Debug, Error)]
pub enum ScanError {
    /// The recognition engine reported a non-zero init status
    #[error("recognition engine init failed with status {status}")]
    EngineInit {
        /// Raw status code returned by the engine
        status: i32,
    },
    /// Identity recognition requested before the engine was initialized
    #[error("recognition engine is not initialized")]
    EngineUnavailable,
}

/// Reasons a raw engine buffer did not yield a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Engine returned a non-positive length
    #[error("engine returned no data")]
    Empty,
    /// Buffer layout or counts failed validation
    #[error("malformed engine output: {0}")]
    Malformed(String),
    /// Text bytes could not be represented
    #[error("undecodable text in {field}")]
    Encoding {
        /// Field whose bytes were rejected
        field: &'static str,
    },
}

impl DecodeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}
