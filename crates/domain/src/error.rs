//! Domain error types.

use store::StoreError;
use thiserror::Error;

use common::UserId;

use crate::order::OrderError;
use crate::review::ReviewError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An order placement or transition was rejected.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// A review operation was rejected.
    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    /// The user does not exist.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Caller-facing classification of a [`DomainError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    InsufficientStock,
    IllegalStateTransition,
    PermissionDenied,
    DuplicateReview,
    /// A concurrent writer changed the record first; the caller may reload and retry.
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::IllegalStateTransition => "illegal_state_transition",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::DuplicateReview => "duplicate_review",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DomainError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Order(e) => e.kind(),
            DomainError::Review(e) => e.kind(),
            DomainError::UserNotFound(_) => ErrorKind::NotFound,
            DomainError::Store(e) => store_error_kind(e),
        }
    }
}

fn store_error_kind(error: &StoreError) -> ErrorKind {
    match error {
        StoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
        StoreError::ConcurrencyConflict { .. } => ErrorKind::Conflict,
        StoreError::OrderNotFound(_)
        | StoreError::ProductNotFound(_)
        | StoreError::ReviewNotFound(_) => ErrorKind::NotFound,
        StoreError::DuplicateReview { .. } => ErrorKind::DuplicateReview,
        StoreError::InvalidData(_)
        | StoreError::Unavailable(_)
        | StoreError::Database(_)
        | StoreError::Migration(_) => ErrorKind::Internal,
    }
}
