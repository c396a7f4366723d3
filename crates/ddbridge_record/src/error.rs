//! Error types for the record crate.

use crate::record::RecordKind;
use thiserror::Error;

/// Result type for record introspection.
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors raised when a record is inspected as something it is not.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The record's variant differs from the one requested.
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Variant the caller asked for.
        expected: RecordKind,
        /// Variant the record actually has.
        actual: RecordKind,
    },

    /// Index outside `[0, len)`.
    #[error("index {index} out of range for size {len}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of elements available.
        len: usize,
    },

    /// A map entry was not a 2-tuple.
    #[error("map entry {index} is not a (key, value) pair")]
    NotAPair {
        /// Position of the offending entry.
        index: usize,
    },
}

impl RecordError {
    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: RecordKind, actual: RecordKind) -> Self {
        Self::TypeMismatch { expected, actual }
    }

    /// Creates an index out of range error.
    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }
}
