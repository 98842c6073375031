//! Error types and result handling for webhook operations.
//!
//! Defines the storage-level error used by every store implementation and
//! the coded taxonomy the HTTP layer maps to status codes. Storage errors keep
//! "not found", "conflict" and "I/O failure" apart because callers react
//! differently to each.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for store operations.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Database operation failed (connectivity, I/O, unexpected SQL error).
    #[error("Database error: {0}")]
    Database(String),

    /// Entity not found, or not in the state the operation requires.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Constraint violation, such as a duplicate `event_id`.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl CoreError {
    /// Returns true if the error came from storage I/O rather than from the
    /// state of the data.
    pub const fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                Self::ConstraintViolation(format!("check constraint violation: {db_err}"))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

/// Paywire error types with stable codes for API clients.
#[derive(Debug, Error)]
pub enum PaywireError {
    // Ingestion Errors (E1001-E1003)
    /// Request body is not a valid payment webhook document (E1001).
    #[error("[E1001] Invalid request body: {reason}")]
    InvalidRequestBody {
        /// Parser message
        reason: String,
    },

    /// One or more required fields are empty (E1002).
    #[error("[E1002] Missing required fields: {}", fields.join(", "))]
    MissingRequiredFields {
        /// Names of the empty fields
        fields: Vec<&'static str>,
    },

    /// Store rejected a duplicate business event identifier (E1003).
    #[error("[E1003] Duplicate event: {event_id} already recorded")]
    DuplicateEvent {
        /// The caller-supplied event identifier
        event_id: String,
    },

    // System Errors (E3002)
    /// Store failed to persist or read an event (E3002).
    #[error("[E3002] Storage failure: {0}")]
    Storage(#[from] CoreError),
}

impl PaywireError {
    /// Returns the error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequestBody { .. } => "E1001",
            Self::MissingRequiredFields { .. } => "E1002",
            Self::DuplicateEvent { .. } => "E1003",
            Self::Storage(_) => "E3002",
        }
    }

    /// HTTP status the ingestion endpoint answers with.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequestBody { .. } | Self::MissingRequiredFields { .. } => 400,
            Self::DuplicateEvent { .. } => 409,
            Self::Storage(_) => 500,
        }
    }

    /// Short message for API clients. Never leaks storage details.
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidRequestBody { .. } => "Invalid request body",
            Self::MissingRequiredFields { .. } => "Missing required fields",
            Self::DuplicateEvent { .. } => "Duplicate event",
            Self::Storage(_) => "Failed to process webhook",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(PaywireError::InvalidRequestBody { reason: String::new() }.code(), "E1001");
        assert_eq!(PaywireError::MissingRequiredFields { fields: vec!["amount"] }.code(), "E1002");
        assert_eq!(PaywireError::DuplicateEvent { event_id: "evt_1".into() }.code(), "E1003");
        assert_eq!(PaywireError::Storage(CoreError::Database("down".into())).code(), "E3002");
    }

    #[test]
    fn validation_and_storage_map_to_distinct_statuses() {
        assert_eq!(PaywireError::InvalidRequestBody { reason: "eof".into() }.status_code(), 400);
        assert_eq!(PaywireError::MissingRequiredFields { fields: vec!["type"] }.status_code(), 400);
        assert_eq!(PaywireError::Storage(CoreError::Database("down".into())).status_code(), 500);
        assert_eq!(
            PaywireError::Storage(CoreError::Database("down".into())).public_message(),
            "Failed to process webhook"
        );
    }

    #[test]
    fn missing_fields_are_listed() {
        let error = PaywireError::MissingRequiredFields { fields: vec!["amount", "currency"] };
        assert_eq!(error.to_string(), "[E1002] Missing required fields: amount, currency");
    }

    #[test]
    fn only_database_errors_are_storage_failures() {
        assert!(CoreError::Database("timeout".into()).is_storage_failure());
        assert!(!CoreError::NotFound("x".into()).is_storage_failure());
        assert!(!CoreError::ConstraintViolation("x".into()).is_storage_failure());
    }
}
