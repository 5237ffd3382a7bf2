//! # Database Error Types
//!
//! Error types for database operations and the engines built on them.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          Rule violation (CoreError)        │
//! │       │                                     │                           │
//! │       ▼                                     │                           │
//! │  DbError ← Adds categorization              │                           │
//! │       │                                     │                           │
//! │       └──────────────┬──────────────────────┘                           │
//! │                      ▼                                                  │
//! │  UpliftError ← What ledger and engine callers see                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  code() → "INSUFFICIENT_STOCK", "NOT_FOUND", "DATABASE_ERROR", ...     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use uplift_core::{CoreError, ValidationError};

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and retry decisions.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - A row vanished between two statements of one unit of work
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Stock row for a client or product that was deleted concurrently
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation.
    ///
    /// ## When This Occurs
    /// - A write would have left `client_stock.quantity` negative. The
    ///   guarded statements make this unreachable; the constraint is the
    ///   last line.
    #[error("Check constraint violation: {message}")]
    CheckViolation { message: String },

    /// Another connection held the write lock past the busy timeout.
    #[error("Database is busy")]
    Busy,

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Busy | DbError::PoolExhausted)
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite reports constraints as "<KIND> constraint failed: <detail>"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("database is locked") || msg.contains("database is busy") {
                    DbError::Busy
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Uplift Error
// =============================================================================

/// Error returned by the stock ledger and the engines.
///
/// Either a business rule said no ([`CoreError`]) or storage failed
/// ([`DbError`]). Every variant has a stable [`code`](UpliftError::code).
#[derive(Debug, Error)]
pub enum UpliftError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl UpliftError {
    /// Stable machine-readable code for the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            UpliftError::Core(err) => err.code(),
            UpliftError::Db(DbError::NotFound { .. }) => "NOT_FOUND",
            UpliftError::Db(_) => "DATABASE_ERROR",
        }
    }

    /// Whether the caller may retry the whole operation unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpliftError::Core(err) => err.is_retryable(),
            UpliftError::Db(err) => err.is_transient(),
        }
    }

    /// Returns the core error, if this is a rule violation.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            UpliftError::Core(err) => Some(err),
            UpliftError::Db(_) => None,
        }
    }
}

impl From<sqlx::Error> for UpliftError {
    fn from(err: sqlx::Error) -> Self {
        UpliftError::Db(err.into())
    }
}

impl From<ValidationError> for UpliftError {
    fn from(err: ValidationError) -> Self {
        UpliftError::Core(err.into())
    }
}

/// Result type for ledger and engine operations.
pub type UpliftResult<T> = Result<T, UpliftError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_pass_through_core() {
        let err: UpliftError = CoreError::InsufficientStock {
            client_id: 1,
            product_id: 2,
            available: 0,
            requested: 1,
        }
        .into();
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
        assert!(err.as_core().is_some());
    }

    #[test]
    fn test_db_codes() {
        let missing: UpliftError = DbError::not_found("Uplift sale", 4).into();
        assert_eq!(missing.code(), "NOT_FOUND");
        assert_eq!(missing.to_string(), "Uplift sale not found: 4");

        let busy: UpliftError = DbError::Busy.into();
        assert_eq!(busy.code(), "DATABASE_ERROR");
        assert!(busy.is_retryable());
    }

    #[test]
    fn test_validation_maps_to_validation_code() {
        let err: UpliftError = ValidationError::Required {
            field: "items".to_string(),
        }
        .into();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
