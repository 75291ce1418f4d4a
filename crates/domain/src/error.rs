//! Domain error types.

use thiserror::Error;

/// Failure reported by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not complete the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A record with the same key already exists.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// The requested change is not allowed from the current state.
    #[error("Transition rejected: {0}")]
    Rejected(String),
}

/// Errors surfaced by bridge and configuration operations.
#[derive(Debug, Error)]
pub enum AlarmError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Covers both conflicting records and invalid state transitions.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AlarmError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => AlarmError::Internal(msg),
            StoreError::Duplicate(msg) => AlarmError::Conflict(msg),
            StoreError::Rejected(msg) => AlarmError::Conflict(msg),
        }
    }
}

impl From<validator::ValidationErrors> for AlarmError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field))
                })
            })
            .collect();

        AlarmError::Validation(messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            AlarmError::from(StoreError::Unavailable("db down".into())),
            AlarmError::Internal(_)
        ));
        assert!(matches!(
            AlarmError::from(StoreError::Duplicate("sensor S1".into())),
            AlarmError::Conflict(_)
        ));
        assert!(matches!(
            AlarmError::from(StoreError::Rejected("triggered".into())),
            AlarmError::Conflict(_)
        ));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            AlarmError::Forbidden("admin role required".into()).to_string(),
            "Forbidden: admin role required"
        );
        assert_eq!(
            StoreError::Unavailable("timeout".into()).to_string(),
            "Store unavailable: timeout"
        );
    }
}
