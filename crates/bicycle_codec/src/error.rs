//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while validating, encoding, or decoding values.
///
/// Messages name fields and value kinds. They never carry encoded key bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A value does not match the declared type.
    #[error("type mismatch for `{field}`: expected {expected}, found {found}")]
    TypeMismatch {
        /// Field name, or a position for anonymous tuples.
        field: String,
        /// Declared type.
        expected: String,
        /// Kind of the supplied value.
        found: String,
    },

    /// A nested record was used where only primitives are allowed.
    #[error("nested records cannot be part of a key")]
    UnsupportedNested,

    /// NaN has no place in a total order.
    #[error("NaN cannot be stored in a key")]
    NotANumber,

    /// Key bytes do not follow the key encoding.
    #[error("malformed key: {0}")]
    MalformedKey(String),

    /// A record names a field the model does not declare.
    #[error("unknown field `{field}`")]
    UnknownField {
        /// The undeclared field.
        field: String,
    },

    /// A primary-key field is absent or null.
    #[error("primary key field `{field}` is missing or null")]
    MissingPrimaryKey {
        /// The offending key field.
        field: String,
    },

    /// Serialization failed.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the failure.
        message: String,
    },

    /// Deserialization failed.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the failure.
        message: String,
    },
}

impl CodecError {
    /// Creates a type mismatch error.
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates a malformed key error.
    pub fn malformed_key(message: impl Into<String>) -> Self {
        Self::MalformedKey(message.into())
    }

    /// Creates an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Creates a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }
}
