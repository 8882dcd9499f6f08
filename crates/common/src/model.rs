//! Persisted data model shared by the store and domain layers.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{Money, OrderId, ProductId, ReviewId, UserId, Version};

/// Error returned when a stored enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl std::fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {} value: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

/// Account role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Buyer,
    Seller,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "BUYER",
            Role::Seller => "SELLER",
            Role::Admin => "ADMIN",
        }
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUYER" => Ok(Role::Buyer),
            "SELLER" => Ok(Role::Seller),
            "ADMIN" => Ok(Role::Admin),
            other => Err(ParseEnumError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Moderation status of a product listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Pending,
    Active,
    Rejected,
    Draft,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Pending => "PENDING",
            ProductStatus::Active => "ACTIVE",
            ProductStatus::Rejected => "REJECTED",
            ProductStatus::Draft => "DRAFT",
        }
    }
}

impl FromStr for ProductStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ProductStatus::Pending),
            "ACTIVE" => Ok(ProductStatus::Active),
            "REJECTED" => Ok(ProductStatus::Rejected),
            "DRAFT" => Ok(ProductStatus::Draft),
            other => Err(ParseEnumError {
                kind: "product status",
                value: other.to_string(),
            }),
        }
    }
}

/// The status of an order in its lifecycle.
///
/// ```text
/// Paid ──► Shipped ──► Completed
///   │         ├──────► Disputed
///   └─────────┴──────► Cancelled
/// ```
///
/// `Delivered` is kept for stored data; no transition enters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Paid,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
    Disputed,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Disputed,
    ];

    /// Returns true if no further transition is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Disputed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Paid => "PAID",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Disputed => "DISPUTED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

/// Category attached to a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationCategory {
    Order,
    Product,
    Message,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Order => "ORDER",
            NotificationCategory::Product => "PRODUCT",
            NotificationCategory::Message => "MESSAGE",
        }
    }
}

/// Average rating and number of reviews behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RatingSummary {
    pub average: Decimal,
    pub count: u32,
}

/// Decimal places kept for a product's average rating.
pub const PRODUCT_RATING_SCALE: u32 = 1;

/// Decimal places kept for a seller's average rating.
pub const SELLER_RATING_SCALE: u32 = 2;

impl RatingSummary {
    /// Averages ratings, rounding half away from zero to `scale` places.
    ///
    /// An empty set summarizes to zero reviews with a zero average.
    pub fn from_ratings(ratings: &[u8], scale: u32) -> Self {
        if ratings.is_empty() {
            return Self::default();
        }

        let sum: u64 = ratings.iter().map(|&r| u64::from(r)).sum();
        let count = ratings.len() as u64;
        let mean = Decimal::from(sum) / Decimal::from(count);

        Self {
            average: mean.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero),
            count: u32::try_from(ratings.len()).unwrap_or(u32::MAX),
        }
    }
}

/// A marketplace account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    /// Seller rating across all of the seller's products.
    pub rating: RatingSummary,
}

impl User {
    /// Creates a user with no ratings.
    pub fn new(email: impl Into<String>, full_name: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            full_name: full_name.into(),
            role,
            rating: RatingSummary::default(),
        }
    }
}

/// A product listing.
///
/// `stock_quantity` is only ever changed through stock movements applied by
/// the order store, never by saving the product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub name: String,
    pub price: Money,
    pub stock_quantity: u32,
    pub status: ProductStatus,
    pub rating: RatingSummary,
}

impl Product {
    /// Creates an active listing with no ratings.
    pub fn new(seller_id: UserId, name: impl Into<String>, price: Money, stock_quantity: u32) -> Self {
        Self {
            id: ProductId::new(),
            seller_id,
            name: name.into(),
            price,
            stock_quantity,
            status: ProductStatus::Active,
            rating: RatingSummary::default(),
        }
    }
}

/// One line of an order. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    /// Seller of the product at purchase time.
    pub seller_id: UserId,
    pub product_name: String,
    pub quantity: u32,
    /// Snapshot of the product price when the order was placed.
    pub price_at_purchase: Money,
}

impl OrderItem {
    /// Returns `price_at_purchase * quantity`.
    pub fn line_total(&self) -> Money {
        self.price_at_purchase.multiply(self.quantity)
    }
}

/// An order together with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub shipping_address: String,
    pub cancellation_reason: Option<String>,
    pub items: Vec<OrderItem>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the distinct sellers with at least one item in the order.
    pub fn seller_ids(&self) -> BTreeSet<UserId> {
        self.items.iter().map(|item| item.seller_id).collect()
    }

    /// Returns true if `seller_id` sells at least one item in the order.
    pub fn has_seller(&self, seller_id: UserId) -> bool {
        self.items.iter().any(|item| item.seller_id == seller_id)
    }

    /// Returns true if the product appears among the order's items.
    pub fn contains_product(&self, product_id: ProductId) -> bool {
        self.items.iter().any(|item| item.product_id == product_id)
    }
}

/// A buyer's review of one product from one completed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub author_id: UserId,
    pub rating: u8,
    pub comment: Option<String>,
    pub is_reported: bool,
    pub created_at: DateTime<Utc>,
}
