use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    NotificationCategory, Order, OrderId, PRODUCT_RATING_SCALE, Product, ProductId, RatingSummary,
    Review, ReviewId, SELLER_RATING_SCALE, User, UserId, Version,
};
use tokio::sync::RwLock;

use crate::{
    OrderQuery, Result, StoreError,
    store::{
        CartStore, NotificationSink, OrderRepository, ProductCatalog, RatingUpdate,
        ReviewRepository, StatusChange, StockMovement, UserDirectory,
    },
};

/// A notification captured by the in-memory sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub user_id: UserId,
    pub message: String,
    pub category: NotificationCategory,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MarketState {
    users: HashMap<UserId, User>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    reviews: Vec<Review>,
    notifications: Vec<NotificationRecord>,
    carts: HashMap<UserId, Vec<StockMovement>>,
    fail_notifications: bool,
    fail_cart_clear: bool,
}

impl MarketState {
    fn seller_of(&self, product_id: ProductId) -> Result<UserId> {
        self.products
            .get(&product_id)
            .map(|p| p.seller_id)
            .ok_or(StoreError::ProductNotFound(product_id))
    }

    /// Recomputes the product and seller ratings from the stored reviews.
    fn rerate(&mut self, product_id: ProductId, seller_id: UserId) -> RatingUpdate {
        let product_ratings: Vec<u8> = self
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id)
            .map(|r| r.rating)
            .collect();
        let seller_ratings: Vec<u8> = self
            .reviews
            .iter()
            .filter(|r| {
                self.products
                    .get(&r.product_id)
                    .is_some_and(|p| p.seller_id == seller_id)
            })
            .map(|r| r.rating)
            .collect();

        let product = RatingSummary::from_ratings(&product_ratings, PRODUCT_RATING_SCALE);
        let seller = RatingSummary::from_ratings(&seller_ratings, SELLER_RATING_SCALE);

        if let Some(p) = self.products.get_mut(&product_id) {
            p.rating = product;
        }
        if let Some(u) = self.users.get_mut(&seller_id) {
            u.rating = seller;
        }

        RatingUpdate {
            product_id,
            seller_id,
            product,
            seller,
        }
    }
}

/// In-memory store implementation for testing.
///
/// Every trait method runs under one write lock, which gives it the same
/// all-or-nothing behaviour as a database transaction in the Postgres
/// implementation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MarketState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user.
    pub async fn add_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// Registers a product with its initial stock.
    pub async fn add_product(&self, product: Product) {
        self.state.write().await.products.insert(product.id, product);
    }

    /// Returns the current stock of a product.
    pub async fn stock_of(&self, product_id: ProductId) -> Option<u32> {
        self.state
            .read()
            .await
            .products
            .get(&product_id)
            .map(|p| p.stock_quantity)
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the notifications delivered to a user, oldest first.
    pub async fn notifications_for(&self, user_id: UserId) -> Vec<NotificationRecord> {
        self.state
            .read()
            .await
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Puts a product into a buyer's cart.
    pub async fn add_to_cart(&self, buyer_id: UserId, product_id: ProductId, quantity: u32) {
        self.state
            .write()
            .await
            .carts
            .entry(buyer_id)
            .or_default()
            .push(StockMovement::new(product_id, quantity));
    }

    /// Returns the number of lines in a buyer's cart.
    pub async fn cart_len(&self, buyer_id: UserId) -> usize {
        self.state
            .read()
            .await
            .carts
            .get(&buyer_id)
            .map_or(0, Vec::len)
    }

    /// Makes every subsequent notification fail.
    pub async fn set_fail_notifications(&self, fail: bool) {
        self.state.write().await.fail_notifications = fail;
    }

    /// Makes every subsequent cart clear fail.
    pub async fn set_fail_cart_clear(&self, fail: bool) {
        self.state.write().await.fail_cart_clear = fail;
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }
}

#[async_trait]
impl ProductCatalog for InMemoryStore {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn save_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.write().await;
        match state.products.get_mut(&product.id) {
            Some(existing) => {
                existing.name = product.name.clone();
                existing.price = product.price;
                existing.status = product.status;
            }
            None => {
                state.products.insert(product.id, product.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn place_order(&self, order: &Order, reservations: &[StockMovement]) -> Result<()> {
        let mut state = self.state.write().await;

        if state.orders.contains_key(&order.id) {
            return Err(StoreError::InvalidData(format!(
                "order {} already exists",
                order.id
            )));
        }

        // Check every reservation against a scratch copy first so a late
        // failure leaves the stored stock untouched.
        let mut remaining: HashMap<ProductId, u32> = HashMap::new();
        for movement in reservations {
            let available = match remaining.get(&movement.product_id) {
                Some(stock) => *stock,
                None => state
                    .products
                    .get(&movement.product_id)
                    .map_or(0, |p| p.stock_quantity),
            };
            if available < movement.quantity {
                return Err(StoreError::InsufficientStock {
                    product_id: movement.product_id,
                });
            }
            remaining.insert(movement.product_id, available - movement.quantity);
        }

        for (product_id, stock) in remaining {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.stock_quantity = stock;
            }
        }
        state.orders.insert(order.id, order.clone());

        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn update_status(
        &self,
        change: &StatusChange,
        restock: &[StockMovement],
    ) -> Result<Version> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let order = state
            .orders
            .get_mut(&change.order_id)
            .ok_or(StoreError::OrderNotFound(change.order_id))?;

        if order.version != change.expected_version {
            return Err(StoreError::ConcurrencyConflict {
                order_id: change.order_id,
                expected: change.expected_version,
            });
        }

        order.status = change.status;
        if let Some(reason) = &change.cancellation_reason {
            order.cancellation_reason = Some(reason.clone());
        }
        order.version = order.version.next();
        order.updated_at = Utc::now();
        let new_version = order.version;

        for movement in restock {
            if let Some(product) = state.products.get_mut(&movement.product_id) {
                product.stock_quantity = product.stock_quantity.saturating_add(movement.quantity);
            }
        }

        Ok(new_version)
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl ReviewRepository for InMemoryStore {
    async fn record_review(&self, review: &Review) -> Result<RatingUpdate> {
        let mut state = self.state.write().await;
        let seller_id = state.seller_of(review.product_id)?;
        if state
            .reviews
            .iter()
            .any(|r| r.order_id == review.order_id && r.product_id == review.product_id)
        {
            return Err(StoreError::DuplicateReview {
                order_id: review.order_id,
                product_id: review.product_id,
            });
        }
        state.reviews.push(review.clone());
        Ok(state.rerate(review.product_id, seller_id))
    }

    async fn remove_review(&self, id: ReviewId) -> Result<RatingUpdate> {
        let mut state = self.state.write().await;
        let position = state
            .reviews
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::ReviewNotFound(id))?;
        let product_id = state.reviews[position].product_id;
        let seller_id = state.seller_of(product_id)?;
        state.reviews.remove(position);
        Ok(state.rerate(product_id, seller_id))
    }

    async fn review_exists(&self, order_id: OrderId, product_id: ProductId) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .reviews
            .iter()
            .any(|r| r.order_id == order_id && r.product_id == product_id))
    }

    async fn find_review(&self, id: ReviewId) -> Result<Option<Review>> {
        Ok(self
            .state
            .read()
            .await
            .reviews
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn reviews_for_product(&self, product_id: ProductId) -> Result<Vec<Review>> {
        let state = self.state.read().await;
        let mut reviews: Vec<_> = state
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    async fn reported_reviews(&self) -> Result<Vec<Review>> {
        let state = self.state.read().await;
        let mut reviews: Vec<_> = state
            .reviews
            .iter()
            .filter(|r| r.is_reported)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    async fn set_reported(&self, id: ReviewId, reported: bool) -> Result<()> {
        let mut state = self.state.write().await;
        let review = state
            .reviews
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::ReviewNotFound(id))?;
        review.is_reported = reported;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for InMemoryStore {
    async fn notify(
        &self,
        user_id: UserId,
        message: &str,
        category: NotificationCategory,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_notifications {
            return Err(StoreError::Unavailable(
                "notification delivery disabled".to_string(),
            ));
        }
        state.notifications.push(NotificationRecord {
            user_id,
            message: message.to_string(),
            category,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn clear_cart(&self, buyer_id: UserId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_cart_clear {
            return Err(StoreError::Unavailable("cart store disabled".to_string()));
        }
        state.carts.remove(&buyer_id);
        Ok(())
    }
}
