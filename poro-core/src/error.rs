//! Error types and result types for persistence operations.
//!
//! Use [`PoroResult<T>`] as the return type for fallible operations. Keypath
//! resolution, filtering, sorting and paging never fail; everything that
//! touches a store, the class catalog or the codec does.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised while persisting or loading objects.
#[derive(Error, Debug)]
pub enum PoroError {
    /// Conversion between the value model and a store's wire format failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The object could not be saved: it has no assignable identity field,
    /// or the store rejected the write.
    #[error("Save failed for {0}: {1}")]
    SaveFailure(String, String),
    /// The object could not be removed.
    #[error("Remove failed for {0}: {1}")]
    RemoveFailure(String, String),
    /// A class tag found in a document names no class known to the registry.
    #[error("Unresolvable class: {0}")]
    UnresolvableClass(String),
    /// Missing or inconsistent setup: no database given to a factory, a class
    /// that is not flagged for persistence, a re-entrant context build.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A value could not be converted into a typed field: expected kind, found kind.
    #[error("Invalid value: expected {0}, found {1}")]
    InvalidValue(String, String),
    /// Find options that cannot be normalized or pushed down to a store.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for persistence operations.
pub type PoroResult<T> = Result<T, PoroError>;

impl From<BsonError> for PoroError {
    fn from(err: BsonError) -> Self {
        PoroError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for PoroError {
    fn from(err: SerdeJsonError) -> Self {
        PoroError::Serialization(err.to_string())
    }
}
