//! Error types and result types for model, query and collection operations.
//!
//! Use [`ModelResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use std::{convert::Infallible, fmt};
use thiserror::Error;

/// Represents all possible errors raised while defining schemas, building documents
/// and talking to a collection service.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A schema or type descriptor is malformed. Raised when the schema is compiled,
    /// never per document.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A value cannot be converted to the declared field type.
    #[error("Cannot coerce {found} to {expected}")]
    CoercionMismatch {
        /// Name of the declared type.
        expected: &'static str,
        /// Description of the offending value.
        found: String,
    },
    /// A field that the schema does not declare was assigned.
    #[error("Unknown field: {0}")]
    UnknownField(String),
    /// A fluent query was assembled incorrectly.
    #[error("Invalid query: {0}")]
    Query(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during backend construction or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given id already exists in the collection.
    /// The first argument is the document id, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DuplicateKey(String, String),
    /// The collection service rejected or failed an operation.
    #[error("Store error: {0}")]
    Store(String),
}

/// A specialized `Result` type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

impl ModelError {
    pub(crate) fn mismatch(expected: &'static str, found: &impl fmt::Debug) -> Self {
        ModelError::CoercionMismatch {
            expected,
            found: format!("{found:?}"),
        }
    }
}

impl From<Infallible> for ModelError {
    fn from(err: Infallible) -> Self {
        match err {}
    }
}

impl From<BsonError> for ModelError {
    fn from(err: BsonError) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for ModelError {
    fn from(err: SerdeJsonError) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
