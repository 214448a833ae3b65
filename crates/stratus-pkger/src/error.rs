//! Engine error types.
//!
//! Errors are split into the classes the callers branch on: document
//! decode failures, resource-level validation failures (which a dry run
//! can carry alongside a still-valid diff), missing secret preconditions,
//! service port failures, and the aggregated apply failure that triggers
//! a rollback.

use std::fmt;

use thiserror::Error;

use stratus_core::ServiceError;

/// Result type for package engine operations.
pub type PkgerResult<T> = Result<T, PkgerError>;

/// Error returned by the package engine.
#[derive(Debug, Error)]
pub enum PkgerError {
    /// The package document could not be decoded at all.
    #[error("unable to decode package document: {message}")]
    Decode { message: String },

    /// The package could not be encoded back into document form.
    #[error("unable to encode package document: {message}")]
    Encode { message: String },

    /// Resource-level validation failures. A dry run carries this class
    /// alongside the diff; apply rejects it outright.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Secret keys referenced by the package are absent from the
    /// organization's secret store.
    #[error("secrets do not exist for secret reference keys: {}", keys.join(", "))]
    SecretsMissing { keys: Vec<String> },

    /// An operation that requires an organization was handed the zero ID.
    #[error("org id provided must not be zero")]
    OrgIdRequired,

    /// The service builder was finalized without a required port.
    #[error("{0} service not configured")]
    MissingService(&'static str),

    /// A resource service failed outside the apply loop.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// One or more resources failed to apply. Every completed mutation
    /// has been rolled back by the time this is returned.
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl PkgerError {
    /// True for the validation class that a dry run may carry alongside
    /// its diff instead of aborting.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, PkgerError::Validation(_))
    }
}

/// A single resource-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Document kind of the offending resource.
    pub kind: String,
    /// Index of the resource within the document.
    pub idx: usize,
    /// Offending field, empty when the whole resource failed to decode.
    pub field: String,
    pub reason: String,
}

/// Aggregated validation failures for a package document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub failures: Vec<ValidationFailure>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "package failed validation")?;
        for failure in &self.failures {
            write!(
                f,
                "\n\tkind={:?} idx={} field={:?} reason={:?}",
                failure.kind, failure.idx, failure.field, failure.reason
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// One failed item within an apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyErrBody {
    pub name: String,
    pub msg: String,
}

/// All failures of one resource kind within an apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    pub resource: &'static str,
    pub errors: Vec<ApplyErrBody>,
}

/// Aggregated per-kind apply failures, ordered by kind name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyError {
    pub failures: Vec<ApplyFailure>,
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for failure in &self.failures {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(
                f,
                "resource_type={:?} err=\"failed to create\"",
                failure.resource
            )?;
            for err in &failure.errors {
                write!(f, "\n\tname={:?} err_msg={:?}", err.name, err.msg)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ApplyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_error_lists_every_failure() {
        let err = ApplyError {
            failures: vec![
                ApplyFailure {
                    resource: "bucket",
                    errors: vec![ApplyErrBody {
                        name: "b1".to_string(),
                        msg: "boom".to_string(),
                    }],
                },
                ApplyFailure {
                    resource: "label",
                    errors: vec![
                        ApplyErrBody {
                            name: "l1".to_string(),
                            msg: "nope".to_string(),
                        },
                        ApplyErrBody {
                            name: "l2".to_string(),
                            msg: "also nope".to_string(),
                        },
                    ],
                },
            ],
        };

        let text = err.to_string();
        assert!(text.contains("resource_type=\"bucket\""));
        assert!(text.contains("name=\"b1\" err_msg=\"boom\""));
        assert!(text.contains("resource_type=\"label\""));
        assert!(text.contains("name=\"l2\" err_msg=\"also nope\""));
    }

    #[test]
    fn validation_error_names_the_offending_resource() {
        let err = ValidationError {
            failures: vec![ValidationFailure {
                kind: "Bucket".to_string(),
                idx: 2,
                field: "name".to_string(),
                reason: "must not be empty".to_string(),
            }],
        };
        let text = err.to_string();
        assert!(text.contains("idx=2"));
        assert!(text.contains("field=\"name\""));
    }

    #[test]
    fn secrets_missing_lists_sorted_keys() {
        let err = PkgerError::SecretsMissing {
            keys: vec!["a-token".to_string(), "b-routing-key".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "secrets do not exist for secret reference keys: a-token, b-routing-key"
        );
    }
}
