//! Process-level error type.

use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors that stop the `market` process.
#[derive(Debug, Error)]
pub enum AppError {
    /// The connection pool could not be created.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying migrations failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A store call failed outside the domain.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A domain operation failed.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The metrics recorder could not be installed.
    #[error("Metrics error: {0}")]
    Metrics(String),
}
