//! Error types for the storage layer

use thiserror::Error;

/// Storage layer error types
#[derive(Error, Debug)]
pub enum DbError {
    /// `SQLite` error from the underlying driver
    #[error("SQLite error: {0}")]
    Sqlite(String),

    /// Hard constraint violation (primary key / uniqueness)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Record not found
    #[error("{entity} not found: {identifier}")]
    NotFound {
        entity: &'static str,
        identifier: String,
    },

    /// Invalid argument
    #[error("Invalid {field}: {message}")]
    InvalidArgument {
        field: &'static str,
        message: String,
    },

    /// Schema/migration error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cooperative cancellation before commit; transaction rolled back
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for storage operations
pub type DbResult<T> = std::result::Result<T, DbError>;

impl DbError {
    /// Create a not found error
    pub fn not_found(entity: &'static str, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            identifier: identifier.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Constraint(e.to_string())
            }
            _ => Self::Sqlite(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<DbError> for hive_mail_core::Error {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Cancelled => Self::Cancelled,
            DbError::Constraint(message) => Self::Conflict {
                key: "storage".to_string(),
                message,
            },
            other => Self::Storage(other.to_string()),
        }
    }
}
