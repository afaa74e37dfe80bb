//! Crate-wide error hierarchy for the reconciliation engine.
//!
//! Goals:
//! - Single root `Error` for the few fallible public functions.
//! - Every engine error is file- or comment-scoped: the orchestrator turns
//!   them into skipped items and keeps going, nothing here aborts a run.
//! - Ergonomic `?` via `From` impls.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type ReconcileResult<T> = Result<T, Error>;

/// Root error type for the reconcile crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Unified diff parsing failure (file-scoped).
    #[error(transparent)]
    Diff(#[from] DiffError),

    /// Configuration problems (bad env values).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Input validation errors (bad JSON shapes and the like).
    #[error("validation error: {0}")]
    Validation(String),
}

/// Unified diff parser errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiffError {
    /// `@@ -a,b +c,d @@` header could not be parsed.
    #[error("malformed hunk header at patch line {line}: {header:?}")]
    MalformedHunkHeader { line: usize, header: String },

    /// Line counter ran past `u32::MAX`.
    #[error("line number overflow at patch line {0}")]
    Overflow(usize),
}

/// Configuration errors raised while reading env overrides.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A number failed to parse or is outside the accepted range.
    #[error("invalid number in {var}: {reason}")]
    InvalidNumber {
        var: &'static str,
        reason: &'static str,
    },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Validation(e.to_string())
    }
}
