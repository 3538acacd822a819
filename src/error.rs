use std::sync::Arc;

use thiserror::Error;

/// Represents a result type for operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors returned by [`FeatureAssignmentService`] and the assignment
/// engine.
///
/// [`FeatureAssignmentService`]: crate::FeatureAssignmentService
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Input is malformed. Always fixable by the caller and never worth retrying.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// The requested feature does not exist.
    #[error("feature {id} not found")]
    NotFound {
        /// Identifier that was looked up.
        id: i64,
    },

    /// The persistence collaborator failed. `operation` names the service operation that was
    /// running.
    #[error("{operation}: {source}")]
    Repository {
        /// Service operation during which the repository failed.
        operation: &'static str,
        /// Underlying repository error.
        #[source]
        source: RepositoryError,
    },

    /// Programmer error: the engine was asked to assign on a feature that cannot be assigned.
    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),

    /// Indicates that the cache sweeper thread panicked. This should normally never happen.
    #[error("cache sweeper thread panicked")]
    SweeperThreadPanicked,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<ValidationErrors> for Error {
    fn from(value: ValidationErrors) -> Self {
        Self::Validation(value)
    }
}

impl From<ValidationError> for Error {
    fn from(value: ValidationError) -> Self {
        Self::Validation(ValidationErrors::from(value))
    }
}

impl Error {
    /// Wrap a repository error with the operation name.
    pub(crate) fn repository(operation: &'static str, source: RepositoryError) -> Self {
        Error::Repository { operation, source }
    }

    /// Wrap a repository error with the operation name, keeping "not found" distinguishable from
    /// generic failures.
    pub(crate) fn from_repository(operation: &'static str, id: i64, err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Error::NotFound { id },
            source => Error::Repository { operation, source },
        }
    }
}

/// A single reason why a feature, variant, event or user is malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// Feature name is empty.
    #[error("name is required")]
    NameRequired,
    /// Variant name is empty.
    #[error("variant name is required")]
    VariantNameRequired,
    /// Adding weights together would go over the maximum.
    #[error("maximum weight exceeded (total {total})")]
    WeightExceeded {
        /// Total weight the set would have.
        total: u32,
    },
    /// Another variant in the same feature already uses this name.
    #[error("variant with the same name exists: {name}")]
    VariantAlreadyExists {
        /// Duplicated variant name.
        name: String,
    },
    /// Identifiers must be positive.
    #[error("invalid feature id {id}")]
    InvalidFeatureId {
        /// Offending identifier.
        id: i64,
    },
    /// Event type is empty.
    #[error("event type is required")]
    EventTypeRequired,
    /// Both the authenticated and the anonymous user ids are zero.
    #[error("user has no id")]
    UserIdRequired,
}

/// A non-empty list of validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// Return `Ok(())` if `errors` is empty.
    pub(crate) fn check(errors: Vec<ValidationError>) -> std::result::Result<(), ValidationErrors> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    /// Individual violations in the order they were found.
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    /// Return `true` if `error` is one of the violations.
    pub fn contains(&self, error: &ValidationError) -> bool {
        self.0.contains(error)
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(value: ValidationError) -> Self {
        ValidationErrors(vec![value])
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Errors reported by [`FeatureRepository`](crate::FeatureRepository) and
/// [`EventRepository`](crate::EventRepository) implementations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum RepositoryError {
    /// The referenced row does not exist.
    #[error("not found")]
    NotFound,
    /// The caller-supplied deadline passed before the repository was invoked or while it was
    /// working.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// Opaque backend failure.
    #[error(transparent)]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl RepositoryError {
    /// Wrap any backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        RepositoryError::Backend(Arc::new(err))
    }
}

/// Assignment was requested on a feature that has no assignable variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Feature has no variants at all.
    #[error("feature {feature:?} has no variants")]
    NoVariants {
        /// Feature name.
        feature: String,
    },
    /// All variants of the feature have zero weight.
    #[error("feature {feature:?} has zero total weight")]
    ZeroTotalWeight {
        /// Feature name.
        feature: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_joined() {
        let errors = ValidationErrors(vec![
            ValidationError::NameRequired,
            ValidationError::WeightExceeded { total: 120 },
        ]);

        assert_eq!(
            Error::from(errors).to_string(),
            "validation failed: name is required; maximum weight exceeded (total 120)"
        );
    }

    #[test]
    fn repository_not_found_maps_to_not_found() {
        let err = Error::from_repository("get feature", 7, RepositoryError::NotFound);
        assert!(matches!(err, Error::NotFound { id: 7 }));
    }

    #[test]
    fn repository_errors_carry_operation_name() {
        let err = Error::from_repository("update feature", 7, RepositoryError::DeadlineExceeded);
        assert_eq!(err.to_string(), "update feature: deadline exceeded");
    }
}
