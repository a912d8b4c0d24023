//! Error taxonomy of the core.

use crate::model::AggregateType;
use crate::storage::StorageError;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by `Palisade::execute` and `Palisade::query`.
///
/// Business rule failures are surfaced as-is. Nothing in the core retries;
/// `is_retryable` tells the caller which errors are worth another attempt.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "Concurrency conflict on {aggregate_type}/{aggregate_id}: expected sequence {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_type: AggregateType,
        aggregate_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Stale read: projection '{projection}' at {observed}, required {required}")]
    StaleRead {
        projection: String,
        required: u64,
        observed: u64,
    },

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl Error {
    /// Whether the caller may retry the same request.
    ///
    /// Conflicts need a reload before retrying; stale reads can be retried
    /// as they are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConcurrencyConflict { .. } | Error::StaleRead { .. }
        )
    }

    pub(crate) fn not_found(aggregate_type: AggregateType, id: &str) -> Self {
        Error::NotFound(format!("{aggregate_type} {id}"))
    }

    pub(crate) fn already_exists(aggregate_type: AggregateType, id: &str) -> Self {
        Error::AlreadyExists(format!("{aggregate_type} {id}"))
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConcurrencyConflict {
                aggregate_type,
                aggregate_id,
                expected,
                actual,
            } => Error::ConcurrencyConflict {
                aggregate_type,
                aggregate_id,
                expected,
                actual,
            },
            other => Error::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_conflict_maps_to_concurrency_conflict() {
        let err: Error = StorageError::ConcurrencyConflict {
            aggregate_type: AggregateType::Group,
            aggregate_id: "g1".to_string(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert!(matches!(err, Error::ConcurrencyConflict { expected: 1, actual: 2, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_storage_errors_are_wrapped() {
        let err: Error = StorageError::Unavailable("down".to_string()).into();
        assert!(matches!(err, Error::Storage(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_kinds() {
        let stale = Error::StaleRead {
            projection: "p".to_string(),
            required: 2,
            observed: 1,
        };
        assert!(stale.is_retryable());
        assert!(!Error::NotFound("x".to_string()).is_retryable());
        assert!(!Error::PermissionDenied("x".to_string()).is_retryable());
        assert!(!Error::Unimplemented("x".to_string()).is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }
}
