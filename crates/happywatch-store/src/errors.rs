//! Error types for the store.
//!
//! [`StoreError`] covers both failure classes callers must distinguish:
//! storage failures (unavailable database, failed query, unreadable row)
//! and validation failures (bad caller parameters). Quota exhaustion is not
//! an error; see [`crate::RateDecision`].

use happywatch_core::ValidationError;
use thiserror::Error;

/// Errors returned by store, limiter and aggregation operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error (checkout timeout, failed connection setup).
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Which migration failed and why.
        message: String,
    },

    /// A stored row could not be decoded.
    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    /// Filesystem error preparing the database location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller-supplied parameters were rejected before touching storage.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl StoreError {
    /// Persistence is unavailable or a query failed.
    pub fn is_storage(&self) -> bool {
        !self.is_validation()
    }

    /// The caller passed parameters that violate a constraint.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
