use cqrs_es::{persist::PersistenceError, AggregateError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Entity not found: {entity}")]
    NotFound { entity: String },

    #[error("Uniqueness conflict: {field}")]
    Uniqueness { field: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl From<AggregateError<Error>> for Error {
    fn from(err: AggregateError<Error>) -> Self {
        match err {
            AggregateError::UserError(err) => err,
            AggregateError::AggregateConflict => Error::Conflict {
                message: "prescription was modified concurrently".to_string(),
            },
            other => Error::Persistence {
                message: other.to_string(),
            },
        }
    }
}

impl From<PersistenceError> for Error {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::OptimisticLockError => Error::Conflict {
                message: "prescription was modified concurrently".to_string(),
            },
            other => Error::Persistence {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_user_error_is_unwrapped() {
        let err: Error = AggregateError::UserError(Error::not_found("Prescription")).into();
        assert!(matches!(err, Error::NotFound { entity } if entity == "Prescription"));
    }

    #[test]
    fn aggregate_conflict_maps_to_conflict() {
        let err: Error = AggregateError::<Error>::AggregateConflict.into();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn optimistic_lock_maps_to_conflict() {
        let err: Error = PersistenceError::OptimisticLockError.into();
        assert!(matches!(err, Error::Conflict { .. }));
    }
}
