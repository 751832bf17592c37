//! Error taxonomy shared by the resolver, converter, and planner.
//!
//! Every error is returned to the caller; nothing in this crate retries.
//! Callers add operation context with [`Error::context`], and
//! [`Error::kind`] classifies an error regardless of how many context
//! layers wrap it.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadInput,
    Transform,
    Storage,
    Cancelled,
}

#[derive(Error, Debug)]
pub enum Error {
    /// A scope, scope config, or top-level record does not exist.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// Request parameters were rejected before any storage access.
    #[error("bad input: {0}")]
    BadInput(String),

    /// A single raw row failed semantic conversion.
    #[error("subtask {subtask} failed to convert row {row}: {source}")]
    Transform {
        subtask: String,
        row: String,
        #[source]
        source: TransformError,
    },

    /// Read or write failure against raw, scope, or domain tables.
    #[error("storage error while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("conversion cancelled")]
    Cancelled,

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput(message.into())
    }

    pub fn storage(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Wrap this error with a description of the operation that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classify the error, looking through any [`Error::Context`] layers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::BadInput(_) => ErrorKind::BadInput,
            Self::Transform { .. } => ErrorKind::Transform,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// The innermost error beneath all context layers.
    pub fn root(&self) -> &Error {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Failure reported by a row transform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("{0}")]
    Other(String),
}
