//! Shared types for the marketplace order core.
//!
//! Identifiers, money, the optimistic-lock [`Version`] and the persisted data
//! model live here so that both the storage adapters and the domain layer can
//! depend on them without depending on each other.

pub mod model;
pub mod money;
pub mod types;

pub use model::{
    NotificationCategory, Order, OrderItem, OrderStatus, PRODUCT_RATING_SCALE, ParseEnumError,
    Product, ProductStatus, RatingSummary, Review, Role, SELLER_RATING_SCALE, User,
};
pub use money::Money;
pub use types::{OrderId, ProductId, ReviewId, UserId, Version};
