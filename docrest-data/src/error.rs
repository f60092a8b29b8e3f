/// Errors that can occur in the data layer.
///
/// Storage backends map their own failures onto this taxonomy. Anything a
/// backend does not explicitly own is carried unchanged in
/// [`DataError::Database`].
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// The targeted record does not exist.
    #[error("Not found")]
    NotFound,
    /// The record exists but its version tag differs from the one supplied,
    /// or an insert collided with an existing identifier.
    #[error("Conflict")]
    Conflict,
    /// The backend cannot express the requested filter expression.
    #[error("Not implemented")]
    NotImplemented,
    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,
    /// The caller's deadline passed before the operation completed.
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    /// A query, sort or projection could not be built from caller input.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// Unmapped error reported by the storage engine or its driver.
    #[error("Database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DataError {
    /// Construct a `Database` variant from any error type.
    ///
    /// Used by backend crates (e.g. `docrest-data-mongo`) to wrap
    /// driver-specific errors.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Database(Box::new(err))
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        DataError::InvalidQuery(message.into())
    }

    /// Whether this error comes from the call context rather than storage.
    pub fn is_context_error(&self) -> bool {
        matches!(self, DataError::Cancelled | DataError::DeadlineExceeded)
    }
}
