//! Order placement and the order status lifecycle.

mod builder;
mod machine;
mod transitions;

pub use builder::{OrderBuilder, OrderLine, PlaceOrder};
pub use machine::OrderStateMachine;
pub use transitions::{ActorRule, OrderAction, SideEffect, TRANSITIONS, Transition};

use common::{OrderId, OrderStatus, ProductId, UserId};
use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request contained no lines.
    #[error("Order has no items")]
    EmptyOrder,

    /// A line asked for zero units.
    #[error("Invalid quantity {quantity} for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// The shipping address was empty or blank.
    #[error("Shipping address is required")]
    MissingShippingAddress,

    /// The buyer placing the order does not exist.
    #[error("Buyer not found: {0}")]
    BuyerNotFound(UserId),

    /// A requested product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Not enough units left to cover the order.
    #[error("Insufficient stock for product {product_name}")]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
    },

    /// The order total does not fit the money type.
    #[error("Order total overflows")]
    TotalOverflow,

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The action is not allowed from the order's current status.
    #[error("Invalid state transition: cannot {action} from {from} state")]
    IllegalTransition {
        action: OrderAction,
        from: OrderStatus,
    },

    /// The actor may not perform the action on this order.
    #[error("User {user_id} is not permitted to {action} this order")]
    PermissionDenied { action: OrderAction, user_id: UserId },

    /// The order changed between read and write.
    #[error("Order {0} was modified concurrently")]
    Conflict(OrderId),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::EmptyOrder
            | OrderError::InvalidQuantity { .. }
            | OrderError::MissingShippingAddress
            | OrderError::TotalOverflow => ErrorKind::InvalidInput,
            OrderError::BuyerNotFound(_)
            | OrderError::ProductNotFound(_)
            | OrderError::OrderNotFound(_) => ErrorKind::NotFound,
            OrderError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            OrderError::IllegalTransition { .. } => ErrorKind::IllegalStateTransition,
            OrderError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            OrderError::Conflict(_) => ErrorKind::Conflict,
        }
    }
}
