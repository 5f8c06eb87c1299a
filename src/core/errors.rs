//! Error types for the compile/interpolate pipeline
//!
//! Every failure the orchestration layer can hand back to a caller is one of
//! these variants. Compute unit failures arrive as structured
//! [`EngineErrorKind`](crate::engine::protocol::EngineErrorKind) values and are
//! translated here, so callers can tell a superseded preview request apart from
//! a real compiler problem.

use std::time::Duration;
use thiserror::Error;

/// Result alias used by the pipeline components.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The compute unit failed to start, or a required capability is missing.
    ///
    /// Fatal to every further request until the proxy is retried.
    #[error("compiler engine failed to initialize: {0}")]
    Initialization(String),

    /// A request was made before the engine finished initializing.
    #[error("compiler engine is not ready")]
    NotReady,

    /// Interpolation needs a stored font and none is cached in the worker.
    #[error("no font cached in the compiler engine")]
    NoCachedFont,

    /// Compile requested with a target name outside the preset table.
    #[error("unknown target: '{0}'")]
    UnknownTarget(String),

    /// The engine reported a failure while compiling.
    #[error("compilation failed: {0}")]
    Compilation(String),

    /// The engine could not interpolate the requested glyph.
    #[error("interpolation of '{glyph}' failed: {message}")]
    Interpolation { glyph: String, message: String },

    /// A newer request for the same glyph replaced this one.
    ///
    /// Not a real failure; callers usually ignore it.
    #[error("interpolation of '{glyph}' was superseded by a newer request")]
    Cancelled { glyph: String },

    /// No response arrived within the allowed window.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The compute unit went away while a request was outstanding.
    #[error("compiler engine worker is no longer running")]
    WorkerGone,

    /// A payload could not be encoded or decoded.
    #[error("malformed engine payload: {0}")]
    Protocol(String),
}

impl PipelineError {
    /// True for the superseded-request outcome, which callers should treat as
    /// "nothing to do" rather than an error to surface.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }

    /// Errors after which the worker session should be considered suspect and
    /// reinitialization offered to the user.
    pub fn suggests_restart(&self) -> bool {
        matches!(
            self,
            PipelineError::Timeout { .. }
                | PipelineError::WorkerGone
                | PipelineError::Initialization(_)
        )
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::Protocol(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinct_from_engine_errors() {
        let cancelled = PipelineError::Cancelled {
            glyph: "A".to_string(),
        };
        let failed = PipelineError::Compilation("bad outline".to_string());

        assert!(cancelled.is_cancelled());
        assert!(!failed.is_cancelled());
    }

    #[test]
    fn test_restart_hint() {
        let timeout = PipelineError::Timeout {
            operation: "compile",
            after: Duration::from_secs(1),
        };
        assert!(timeout.suggests_restart());
        assert!(PipelineError::WorkerGone.suggests_restart());
        assert!(!PipelineError::NoCachedFont.suggests_restart());
        assert!(!PipelineError::UnknownTarget("x".into()).suggests_restart());
    }

    #[test]
    fn test_messages_carry_context() {
        let error = PipelineError::UnknownTarget("nonexistent".to_string());
        assert_eq!(error.to_string(), "unknown target: 'nonexistent'");
    }
}
