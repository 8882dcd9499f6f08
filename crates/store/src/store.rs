use async_trait::async_trait;
use common::{
    NotificationCategory, Order, OrderId, OrderStatus, Product, ProductId, RatingSummary, Review,
    ReviewId, User, UserId, Version,
};

use crate::{OrderQuery, Result};

/// A change of a product's stock by `quantity` units.
///
/// Passed to [`OrderRepository::place_order`] as a reservation (decrement)
/// and to [`OrderRepository::update_status`] as a restock (increment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockMovement {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl StockMovement {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A version-guarded status update of one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: OrderId,
    /// Version the caller read; the update fails if the row moved on.
    pub expected_version: Version,
    pub status: OrderStatus,
    /// Replaces the stored reason when `Some`.
    pub cancellation_reason: Option<String>,
}

/// Product and seller ratings as stored after a review was recorded or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingUpdate {
    pub product_id: ProductId,
    pub seller_id: UserId,
    pub product: RatingSummary,
    pub seller: RatingSummary,
}

/// Read access to accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
}

/// Product lookup and persistence.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Inserts a product or updates its listing fields.
    ///
    /// Stock and rating are written on insert only. Afterwards stock changes
    /// through [`StockMovement`]s and the rating through
    /// [`ReviewRepository::record_review`] and
    /// [`ReviewRepository::remove_review`].
    async fn save_product(&self, product: &Product) -> Result<()>;
}

/// Order persistence, including the stock movements tied to it.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Reserves stock for every movement and persists the order with its
    /// items, atomically.
    ///
    /// Each reservation is a conditional decrement that only succeeds while
    /// the stock covers the quantity. If any reservation fails the call
    /// returns [`StoreError::InsufficientStock`](crate::StoreError) and no
    /// stock or order change survives.
    async fn place_order(&self, order: &Order, reservations: &[StockMovement]) -> Result<()>;

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Applies a status change and restocks the given products, atomically.
    ///
    /// Fails with `ConcurrencyConflict` if the stored version differs from
    /// `change.expected_version`. Returns the new version.
    async fn update_status(&self, change: &StatusChange, restock: &[StockMovement])
    -> Result<Version>;

    /// Lists orders matching the query, newest first.
    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;
}

/// Review persistence together with the ratings derived from it.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Inserts a review and recomputes the product's and its seller's
    /// ratings from the full review set, atomically.
    ///
    /// Only the rating fields of the product and seller are written. Fails
    /// with `DuplicateReview` if a review already exists for the same order
    /// and product, and with `ProductNotFound` if the product is unknown.
    async fn record_review(&self, review: &Review) -> Result<RatingUpdate>;

    /// Deletes a review and recomputes the affected ratings, atomically.
    async fn remove_review(&self, id: ReviewId) -> Result<RatingUpdate>;

    async fn review_exists(&self, order_id: OrderId, product_id: ProductId) -> Result<bool>;

    async fn find_review(&self, id: ReviewId) -> Result<Option<Review>>;

    /// All reviews of a product, newest first.
    async fn reviews_for_product(&self, product_id: ProductId) -> Result<Vec<Review>>;

    /// Reviews flagged by users, newest first.
    async fn reported_reviews(&self) -> Result<Vec<Review>>;

    async fn set_reported(&self, id: ReviewId, reported: bool) -> Result<()>;
}

/// Delivery of user notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        user_id: UserId,
        message: &str,
        category: NotificationCategory,
    ) -> Result<()>;
}

/// The buyer's shopping cart.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn clear_cart(&self, buyer_id: UserId) -> Result<()>;
}
