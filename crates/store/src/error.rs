use common::{OrderId, ProductId, ReviewId, Version};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional stock decrement matched no row; nothing was persisted.
    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock { product_id: ProductId },

    /// The order row was changed by someone else since it was read.
    #[error("Concurrency conflict for order {order_id}: expected version {expected}")]
    ConcurrencyConflict { order_id: OrderId, expected: Version },

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The review does not exist.
    #[error("Review not found: {0}")]
    ReviewNotFound(ReviewId),

    /// A review for this order and product already exists.
    #[error("Review already exists for order {order_id} and product {product_id}")]
    DuplicateReview {
        order_id: OrderId,
        product_id: ProductId,
    },

    /// A stored value could not be mapped back to the model.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// A collaborator backend refused the call.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
