//! Error types for wirepack operations.

use crate::Kind;
use thiserror::Error;

/// Main error type for wirepack operations.
///
/// Every fallible operation in the crate reports one of these variants;
/// nothing panics on bad input and there is no global error state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A kind-specific operation was applied to a value of the wrong kind,
    /// e.g. indexing a string or asking a boolean for its integer value.
    #[error("type error: expected {expected}, got {actual}")]
    Type {
        /// What the operation required, e.g. "object" or "object or array"
        expected: &'static str,
        /// Kind the value actually had
        actual: Kind,
    },

    /// An operation was applied to a value in the wrong form, e.g. a
    /// mutation on a finalized value.
    #[error("state error: {0}")]
    State(&'static str),

    /// A strict accessor was handed an index past the end or a key that is
    /// not present. (`get` returns a null value in those cases instead.)
    #[error("range error: {0}")]
    Range(String),

    /// Malformed JSON on ingest, or a byte buffer that failed validation.
    /// `offset` locates the problem within the input.
    #[error("parse error at offset {offset}: {reason}")]
    Parse {
        /// Byte offset of the offending data
        offset: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Allocation failure and other exceptional conditions.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A contract violation, e.g. inserting a duplicate key through an API
    /// that forbids it.
    #[error("logic error: {0}")]
    Logic(String),
}

impl Error {
    pub(crate) fn wrong_kind(expected: &'static str, actual: Kind) -> Error {
        Error::Type { expected, actual }
    }

    pub(crate) fn out_of_range(index: usize, len: usize) -> Error {
        Error::Range(format!("index {} out of range for length {}", index, len))
    }

    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Error {
        Error::Parse {
            offset,
            reason: reason.into(),
        }
    }
}

/// Result type alias for wirepack operations.
pub type Result<T> = std::result::Result<T, Error>;
