//! Error types for the vector database
//!
//! Validation failures are reported to the caller and never retried. Storage
//! failures carry the path that failed so operators can act on them.

use crate::storage::StorageError;
use thiserror::Error;

/// Main error type for collection and database operations
#[derive(Error, Debug)]
pub enum VdbError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure every vector in a collection has the same length"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Vector with ID '{id}' already exists in collection '{collection}'")]
    DuplicateId { collection: String, id: String },

    #[error("Vector with ID '{id}' does not exist in collection '{collection}'")]
    VectorNotFound { collection: String, id: String },

    #[error("Collection '{0}' does not exist")]
    CollectionNotFound(String),

    #[error("Collection '{0}' already exists")]
    CollectionExists(String),

    #[error("Index '{index}' does not exist on collection '{collection}'")]
    IndexNotFound { collection: String, index: String },

    #[error("Index '{index}' already exists on collection '{collection}'")]
    IndexExists { collection: String, index: String },

    #[error(
        "Payload key '{key}' holds a {found} value\nSuggestion: Only integer, float and string values can be indexed"
    )]
    UnsupportedIndexValue { key: String, found: &'static str },

    #[error("Unsupported payload value: {0}\nSuggestion: Use integers, floats, strings, booleans, arrays or objects")]
    UnsupportedPayloadValue(String),

    #[error("Invalid operator: {0}\nSuggestion: Use one of eq, ne, gt, ge, lt, le")]
    InvalidOperator(String),

    #[error("Invalid search parameters: {0}")]
    InvalidSearchParams(String),

    #[error("Invalid collection name '{0}'\nSuggestion: Use letters, digits, '-' and '_' only")]
    InvalidCollectionName(String),

    #[error("Batch insert stopped at point {position}: {source}")]
    BatchFailed {
        position: usize,
        source: Box<VdbError>,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl VdbError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that an API layer can put in responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::InvalidDimension { .. } => "INVALID_DIMENSION",
            Self::DuplicateId { .. } => "DUPLICATE_ID",
            Self::VectorNotFound { .. } => "VECTOR_NOT_FOUND",
            Self::CollectionNotFound(_) => "COLLECTION_NOT_FOUND",
            Self::CollectionExists(_) => "COLLECTION_EXISTS",
            Self::IndexNotFound { .. } => "INDEX_NOT_FOUND",
            Self::IndexExists { .. } => "INDEX_EXISTS",
            Self::UnsupportedIndexValue { .. } => "UNSUPPORTED_INDEX_VALUE",
            Self::UnsupportedPayloadValue(_) => "UNSUPPORTED_PAYLOAD_VALUE",
            Self::InvalidOperator(_) => "INVALID_OPERATOR",
            Self::InvalidSearchParams(_) => "INVALID_SEARCH_PARAMS",
            Self::InvalidCollectionName(_) => "INVALID_COLLECTION_NAME",
            Self::BatchFailed { source, .. } => source.status_code(),
            Self::Storage(_) => "STORAGE_ERROR",
            Self::SearchFailed(_) => "SEARCH_FAILED",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether this error was caused by the caller's input.
    ///
    /// Validation errors map to a non-success response; everything else is
    /// an internal failure.
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Storage(_) | Self::SearchFailed(_) | Self::Config(_) => false,
            Self::BatchFailed { source, .. } => source.is_validation(),
            _ => true,
        }
    }

    /// Whether the error leaves a collection's store unusable.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_fatal(),
            Self::BatchFailed { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

/// Result type alias for database operations
pub type VdbResult<T> = Result<T, VdbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validation_errors_are_not_fatal() {
        let err = VdbError::DuplicateId {
            collection: "points".to_string(),
            id: "a".to_string(),
        };
        assert!(err.is_validation());
        assert!(!err.is_fatal());
        assert_eq!(err.status_code(), "DUPLICATE_ID");
    }

    #[test]
    fn test_storage_io_error_is_fatal() {
        let err: VdbError = StorageError::Io {
            path: PathBuf::from("collections/points.bin"),
            source: std::io::Error::other("disk gone"),
        }
        .into();
        assert!(!err.is_validation());
        assert!(err.is_fatal());
        assert_eq!(err.status_code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_batch_failure_reports_inner_code() {
        let err = VdbError::BatchFailed {
            position: 2,
            source: Box::new(VdbError::DimensionMismatch {
                expected: 3,
                actual: 2,
            }),
        };
        assert_eq!(err.status_code(), "DIMENSION_MISMATCH");
        assert!(err.is_validation());
        assert!(err.to_string().contains("point 2"));
    }
}
