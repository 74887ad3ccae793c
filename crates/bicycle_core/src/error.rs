//! Error types for the Bicycle engine.

use bicycle_codec::CodecError;
use bicycle_storage::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the engine.
///
/// Every variant maps to one machine-readable [`ErrorKind`]. Messages name
/// models, indexes, and fields; encoded key bytes never appear in them.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Model registration or lookup failed.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A value does not fit its declared field type.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// An index query cannot be resolved.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// A write conflicts with existing data.
    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// The storage layer failed or is closed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        Self::Storage(StorageError::IoFailure(err))
    }
}

impl CoreError {
    /// Returns the machine-readable kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(_) => ErrorKind::Schema,
            Self::Codec(_) => ErrorKind::Codec,
            Self::Query(_) => ErrorKind::Query,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Storage(StorageError::Closed) => ErrorKind::StorageClosed,
            Self::Storage(_) => ErrorKind::StorageIo,
        }
    }

    /// Returns true for a unique index violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Conflict(ConflictError::UniqueViolation { .. }))
    }

    /// Returns true if the engine was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Closed))
    }
}

/// Machine-readable error tag carried by [`crate::Response::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown model, conflicting or immutable layout.
    Schema,
    /// Type mismatch or malformed value.
    Codec,
    /// The query cannot be planned.
    Query,
    /// Unique index violation.
    Conflict,
    /// The storage medium failed.
    StorageIo,
    /// The engine was closed.
    StorageClosed,
    /// The request envelope carries an unsupported protocol version.
    Protocol,
}

impl ErrorKind {
    /// Returns the tag as it appears on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Codec => "codec",
            Self::Query => "query",
            Self::Conflict => "conflict",
            Self::StorageIo => "storage_io",
            Self::StorageClosed => "storage_closed",
            Self::Protocol => "protocol",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model registration and lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// No model is registered under this name.
    #[error("unknown model `{model}`")]
    UnknownModel {
        /// Requested model name.
        model: String,
    },

    /// The model already holds records, so its layout cannot change.
    #[error("model `{model}` has live records and its layout cannot change")]
    Immutable {
        /// Model name.
        model: String,
    },

    /// The name is already registered in this process with another layout.
    #[error("model `{model}` is already registered with a different layout")]
    Conflict {
        /// Model name.
        model: String,
    },

    /// The definition itself is invalid.
    #[error("invalid definition for model `{model}`: {reason}")]
    InvalidDefinition {
        /// Model name.
        model: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl SchemaError {
    /// Creates an unknown model error.
    pub fn unknown_model(model: impl Into<String>) -> Self {
        Self::UnknownModel {
            model: model.into(),
        }
    }

    /// Creates an invalid definition error.
    pub fn invalid(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

/// Index query errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// No index has the constrained fields as a leading prefix.
    #[error("no index of `{model}` covers fields [{}]", fields.join(", "))]
    NoMatchingIndex {
        /// Model name.
        model: String,
        /// Constrained fields in query order.
        fields: Vec<String>,
    },

    /// A constraint or constraint combination is malformed.
    #[error("invalid constraint on `{field}`: {reason}")]
    InvalidConstraint {
        /// Constrained field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The query names a field the model does not declare.
    #[error("model `{model}` has no field `{field}`")]
    UnknownField {
        /// Model name.
        model: String,
        /// Undeclared field.
        field: String,
    },

    /// The requested order cannot be produced by the chosen index.
    #[error("cannot order by `{field}` with the given constraints")]
    UnsupportedOrder {
        /// Requested order field.
        field: String,
    },
}

impl QueryError {
    /// Creates an invalid constraint error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConstraint {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Write conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    /// A unique index already maps the new key to another record.
    #[error("unique index `{index}` of `{model}` already holds this key")]
    UniqueViolation {
        /// Model name.
        model: String,
        /// Index name.
        index: String,
    },
}
