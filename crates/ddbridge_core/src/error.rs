//! Error types for ddbridge core.

use ddbridge_record::RecordError;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while driving an engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The engine failed to start or to execute an operation.
    ///
    /// Failures during `start` are fatal to that handle.
    #[error("engine error: {message}")]
    Engine {
        /// Description of the failure.
        message: String,
    },

    /// A change, delta or dump handler panicked.
    #[error("{context} handler panicked")]
    CallbackPanicked {
        /// Which delivery was running.
        context: &'static str,
    },

    /// Transaction state machine misuse.
    #[error("{operation} not allowed in state {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state the controller was in.
        state: &'static str,
    },

    /// Record introspection misuse.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// A table name that the engine does not know.
    #[error("unknown table: {name}")]
    UnknownTable {
        /// Name that failed to resolve.
        name: String,
    },

    /// The operation needs a feature that was disabled at start.
    #[error("feature disabled: {feature}")]
    FeatureDisabled {
        /// Description of the missing feature.
        feature: &'static str,
    },

    /// Recording or snapshot file error.
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// Failed to encode or decode a recording, snapshot or buffer.
    #[error("encoding error: {message}")]
    Encoding {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an engine error.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    /// Creates a callback panicked error.
    pub fn callback_panicked(context: &'static str) -> Self {
        Self::CallbackPanicked { context }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Creates an unknown table error.
    pub fn unknown_table(name: impl Into<String>) -> Self {
        Self::UnknownTable { name: name.into() }
    }

    /// Creates a feature disabled error.
    pub fn feature_disabled(feature: &'static str) -> Self {
        Self::FeatureDisabled { feature }
    }

    /// Creates an I/O failure error for `path`.
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Creates an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddbridge_record::RecordKind;

    #[test]
    fn messages() {
        let err = CoreError::invalid_state("transaction_commit", "idle");
        assert_eq!(err.to_string(), "transaction_commit not allowed in state idle");

        let err = CoreError::unknown_table("Edge");
        assert_eq!(err.to_string(), "unknown table: Edge");

        let err = CoreError::io(
            Path::new("/tmp/x.rec"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "I/O failure on /tmp/x.rec: gone");
    }

    #[test]
    fn record_errors_convert() {
        let err: CoreError =
            RecordError::type_mismatch(RecordKind::Bool, RecordKind::String).into();
        assert!(matches!(err, CoreError::Record(_)));
    }
}
