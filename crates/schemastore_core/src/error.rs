//! Error types for SchemaStore core.

use schemastore_codec::CodecError;
use schemastore_engine::EngineError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required record does not exist.
    NotFound,
    /// Stored bytes could not be decoded.
    Decode,
    /// A value could not be encoded.
    Encode,
    /// The engine failed.
    BackendIo,
    /// An index entry points at a missing record.
    IndexInconsistency,
    /// Invalid or conflicting schema declaration, or an unknown index.
    Schema,
    /// A bounded retry budget ran out.
    TransactionConflict,
    /// Operation not permitted in the current state.
    InvalidOperation,
}

/// Errors that can occur in SchemaStore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Engine error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Record not found.
    #[error("record not found: {schema}:{key}")]
    NotFound {
        /// Schema name.
        schema: String,
        /// Logical key.
        key: String,
    },

    /// A typed operation failed for a specific record.
    #[error("{op} failed for {schema}:{key}: {source}")]
    Record {
        /// The operation that failed.
        op: &'static str,
        /// Schema name.
        schema: String,
        /// Logical key.
        key: String,
        /// Underlying error.
        #[source]
        source: Box<CoreError>,
    },

    /// An index entry refers to a record that does not exist.
    #[error("index {schema}.{index} entry {index_key} refers to missing record {data_key}")]
    IndexInconsistency {
        /// Schema name.
        schema: String,
        /// Index name.
        index: String,
        /// The dangling index key.
        index_key: String,
        /// The data key it refers to.
        data_key: String,
    },

    /// The schema declares no index with this name.
    #[error("schema {schema} has no index named {index}")]
    UnknownIndex {
        /// Schema name.
        schema: String,
        /// Requested index name.
        index: String,
    },

    /// An index value contains the key separator and cannot be encoded
    /// unambiguously.
    #[error("index {schema}.{index} value {value:?} contains ':'")]
    InvalidIndexValue {
        /// Schema name.
        schema: String,
        /// Index name.
        index: String,
        /// The rejected value.
        value: String,
    },

    /// The schema declaration is invalid.
    #[error("invalid schema {schema}: {message}")]
    InvalidSchema {
        /// Schema name.
        schema: String,
        /// What is wrong with it.
        message: String,
    },

    /// Another type is already registered under this name.
    #[error("schema name {schema} is already registered by {existing}")]
    SchemaConflict {
        /// Schema name.
        schema: String,
        /// Type name of the existing registration.
        existing: &'static str,
    },

    /// The schema is not registered and auto-registration is disabled.
    #[error("schema not registered: {schema}")]
    SchemaNotRegistered {
        /// Schema name.
        schema: String,
    },

    /// Optimistic retries were exhausted.
    #[error("transaction conflict on {schema}:{key} after {attempts} attempts")]
    TransactionConflict {
        /// Schema name.
        schema: String,
        /// Logical key.
        key: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(schema: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            schema: schema.into(),
            key: key.into(),
        }
    }

    /// Wraps `source` with the operation, schema and key it failed for.
    ///
    /// Errors that already carry record context are returned unchanged.
    pub fn record(
        op: &'static str,
        schema: impl Into<String>,
        key: impl Into<String>,
        source: CoreError,
    ) -> Self {
        match source {
            Self::Record { .. } | Self::NotFound { .. } | Self::TransactionConflict { .. } => source,
            other => Self::Record {
                op,
                schema: schema.into(),
                key: key.into(),
                source: Box::new(other),
            },
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(schema: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            schema: schema.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Classifies the error, looking through record context.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Engine(EngineError::InvalidOperation { .. }) => ErrorKind::InvalidOperation,
            Self::Engine(_) => ErrorKind::BackendIo,
            Self::Codec(CodecError::Encode { .. }) => ErrorKind::Encode,
            Self::Codec(_) => ErrorKind::Decode,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Record { source, .. } => source.kind(),
            Self::IndexInconsistency { .. } => ErrorKind::IndexInconsistency,
            Self::UnknownIndex { .. }
            | Self::InvalidSchema { .. }
            | Self::SchemaConflict { .. }
            | Self::SchemaNotRegistered { .. } => ErrorKind::Schema,
            Self::TransactionConflict { .. } => ErrorKind::TransactionConflict,
            Self::InvalidOperation { .. } | Self::InvalidIndexValue { .. } => {
                ErrorKind::InvalidOperation
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_sees_through_record() {
        let err = CoreError::record(
            "find",
            "Player",
            "alice",
            CodecError::UnsupportedVersion {
                version: 9,
                current: 1,
            }
            .into(),
        );
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().contains("Player:alice"));
    }

    #[test]
    fn record_does_not_double_wrap() {
        let inner = CoreError::record("put", "S", "k", EngineError::Closed.into());
        let outer = CoreError::record("update", "S", "k", inner);
        match outer {
            CoreError::Record { op, source, .. } => {
                assert_eq!(op, "put");
                assert!(matches!(*source, CoreError::Engine(EngineError::Closed)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn engine_kinds() {
        assert_eq!(CoreError::from(EngineError::Locked).kind(), ErrorKind::BackendIo);
        assert_eq!(
            CoreError::from(EngineError::invalid_operation("done")).kind(),
            ErrorKind::InvalidOperation
        );
    }
}
