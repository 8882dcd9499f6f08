//! Review creation, rating aggregation and moderation.

mod gate;
mod moderation;

pub use gate::{CreateReview, ReviewGate};
pub use moderation::ReviewModeration;

use common::{OrderId, OrderStatus, ProductId, ReviewId, UserId};
use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur during review operations.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Rating outside 1 to 5.
    #[error("Invalid rating: {0} (must be between 1 and 5)")]
    InvalidRating(u8),

    /// The reviewed order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The author did not place the order.
    #[error("User {author_id} did not place order {order_id}")]
    NotOrderOwner { order_id: OrderId, author_id: UserId },

    /// Only completed orders can be reviewed.
    #[error("Order {order_id} is {status}, reviews require a completed order")]
    OrderNotCompleted {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// The product is not one of the order's items.
    #[error("Product {product_id} is not part of order {order_id}")]
    ProductNotInOrder {
        order_id: OrderId,
        product_id: ProductId,
    },

    /// The order and product pair already has a review.
    #[error("Product {product_id} was already reviewed for order {order_id}")]
    DuplicateReview {
        order_id: OrderId,
        product_id: ProductId,
    },

    /// The review does not exist.
    #[error("Review not found: {0}")]
    ReviewNotFound(ReviewId),

    /// The reviewed product no longer exists.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Moderation actions need an admin.
    #[error("User {0} is not an admin")]
    AdminRequired(UserId),
}

impl ReviewError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReviewError::InvalidRating(_) | ReviewError::ProductNotInOrder { .. } => {
                ErrorKind::InvalidInput
            }
            ReviewError::OrderNotFound(_)
            | ReviewError::ReviewNotFound(_)
            | ReviewError::ProductNotFound(_) => ErrorKind::NotFound,
            ReviewError::NotOrderOwner { .. } | ReviewError::AdminRequired(_) => {
                ErrorKind::PermissionDenied
            }
            ReviewError::OrderNotCompleted { .. } => ErrorKind::IllegalStateTransition,
            ReviewError::DuplicateReview { .. } => ErrorKind::DuplicateReview,
        }
    }
}
