//! Service port error types.
//!
//! Every resource service reports failures through [`ServiceError`]. The
//! engine only branches on [`ServiceError::NotFound`]; everything else is
//! carried through to the caller.

use thiserror::Error;

/// Result type for service port operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error returned by a resource service port.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The requested resource does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// A resource with the same identity already exists.
    #[error("{resource} already exists: {name}")]
    Conflict { resource: &'static str, name: String },

    /// The backing store is temporarily unreachable.
    #[error("service unavailable: {message}")]
    Unavailable { message: String },

    /// Any other backend failure.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ServiceError {
    /// Shorthand for a not-found error.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// True when the error means the resource does not exist, as opposed
    /// to the lookup itself failing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classification() {
        let err = ServiceError::not_found("bucket", "abc");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "bucket not found: abc");

        let err = ServiceError::Unavailable {
            message: "connection refused".to_string(),
        };
        assert!(!err.is_not_found());
    }
}
