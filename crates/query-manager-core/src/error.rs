//! Error types for the query-manager layer.
//!
//! Errors split into two families. Compile-time errors
//! ([`UnresolvedPath`](Error::UnresolvedPath),
//! [`UnknownOperator`](Error::UnknownOperator),
//! [`InvalidValueShape`](Error::InvalidValueShape),
//! [`ConflictingJoinKind`](Error::ConflictingJoinKind),
//! [`UnknownModel`](Error::UnknownModel)) are raised while a filter/order
//! specification is being compiled, before any transactional resource is
//! touched. They indicate a caller mistake, are never coerced, and are not
//! retryable. Resource and execution errors
//! ([`NoResourceConfigured`](Error::NoResourceConfigured),
//! [`Connection`](Error::Connection), [`Database`](Error::Database)) surface
//! at session acquisition or from the storage engine; the layer adds no retry
//! policy of its own.

use thiserror::Error;

/// The primary error type for the query-manager layer.
#[derive(Error, Debug)]
pub enum Error {
    /// A segment of a dotted path did not resolve to a relation or field.
    #[error("cannot resolve segment '{segment}' on model '{model}'")]
    UnresolvedPath {
        /// The model the segment was looked up on.
        model: String,
        /// The first segment that failed to resolve.
        segment: String,
    },

    /// A filter key carried a suffix that is not a known operator.
    #[error("unknown filter operator '{operator}'")]
    UnknownOperator {
        /// The unrecognized suffix.
        operator: String,
    },

    /// A filter value did not have the shape its operator requires.
    #[error("operator '{operator}' requires {expected}, got {actual}")]
    InvalidValueShape {
        /// The operator whose contract was violated.
        operator: String,
        /// Human-readable description of the required shape.
        expected: &'static str,
        /// Debug rendering of the offending value.
        actual: String,
    },

    /// The same join path was declared with two different explicit kinds.
    #[error("join path '{path}' declared as both {first} and {second}")]
    ConflictingJoinKind {
        /// The dotted relation path.
        path: String,
        /// The kind from the earlier declaration.
        first: &'static str,
        /// The kind from the conflicting declaration.
        second: &'static str,
    },

    /// A model name was not present in the model graph.
    #[error("model '{model}' is not registered in the model graph")]
    UnknownModel {
        /// The missing model name.
        model: String,
    },

    /// No session, shared session, or session factory was configured.
    #[error("no transactional resource configured: supply a session, a shared session, or a session factory")]
    NoResourceConfigured,

    /// A session could not be opened or closed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The storage engine reported a failure during execution.
    #[error("database error: {0}")]
    Database(String),
}

impl Error {
    /// Returns `true` for errors raised during specification compilation,
    /// before any resource is acquired.
    pub const fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedPath { .. }
                | Self::UnknownOperator { .. }
                | Self::InvalidValueShape { .. }
                | Self::ConflictingJoinKind { .. }
                | Self::UnknownModel { .. }
        )
    }
}

/// A convenience type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
