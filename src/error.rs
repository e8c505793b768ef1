//! # Engine Error Types
//!
//! Error taxonomy for the decode/render core, grouped by the kinds
//! described in the error handling design: configuration, source,
//! resource, and internal/invariant errors.

use thiserror::Error;

/// Errors produced by the decode/render engine.
#[derive(Error, Debug)]
pub enum EngineError {
    // ========================================================================
    // Configuration errors — rejected synchronously at the façade.
    // ========================================================================
    /// The decoder's processing format does not match the engine's fixed
    /// rendering format. No implicit sample-rate conversion is performed.
    #[error("decoder format does not match rendering format: {0}")]
    FormatNotSupported(String),

    /// An `EngineConfig` value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ========================================================================
    // Source errors — posted to the event ring, decoder is abandoned.
    // ========================================================================
    /// The decoder failed to open.
    #[error("failed to open decoder: {0}")]
    DecoderOpenFailed(String),

    /// The decoder returned an error while decoding.
    #[error("decode failed: {0}")]
    DecodeFailed(String),

    /// The decoder failed to seek.
    #[error("seek failed: {0}")]
    SeekFailed(String),

    // ========================================================================
    // Resource errors.
    // ========================================================================
    /// A scratch or ring buffer allocation failed.
    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    // ========================================================================
    // Invariant violations — internal-only, never surfaced to the realtime
    // path, logged as faults by whichever component observes them.
    // ========================================================================
    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl EngineError {
    /// Returns `true` if retrying the same operation might succeed, e.g.
    /// a transient source failure as opposed to a configuration mismatch.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::DecoderOpenFailed(_) | EngineError::DecodeFailed(_)
        )
    }

    /// Returns `true` if this error originates from the decoder source
    /// rather than from the engine's own configuration or bookkeeping.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            EngineError::DecoderOpenFailed(_)
                | EngineError::DecodeFailed(_)
                | EngineError::SeekFailed(_)
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
