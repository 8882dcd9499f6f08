//! The marketplace facade wiring the order core to one store.

use common::{Order, OrderId, ProductId, Review, ReviewId, UserId};
use store::{
    CartStore, NotificationSink, OrderQuery, OrderRepository, ProductCatalog, ReviewRepository,
    UserDirectory,
};

use crate::order::{OrderBuilder, OrderError, OrderStateMachine, PlaceOrder};
use crate::review::{CreateReview, ReviewGate, ReviewModeration};
use crate::stats::{MarketplaceStats, OrderStats, SellerStats};
use crate::{Actor, DomainError};

/// Every storage port the core needs, served by one backend.
pub trait MarketStore:
    UserDirectory + ProductCatalog + OrderRepository + ReviewRepository + CartStore + Clone
{
}

impl<T> MarketStore for T where
    T: UserDirectory + ProductCatalog + OrderRepository + ReviewRepository + CartStore + Clone
{
}

/// Service for the order lifecycle, reviews and reporting.
///
/// Provides a single entry point over the builder, state machine, review
/// gate, moderation and statistics components.
pub struct Marketplace<S, N> {
    store: S,
    builder: OrderBuilder<S>,
    machine: OrderStateMachine<S, N>,
    reviews: ReviewGate<S>,
    moderation: ReviewModeration<S>,
    stats: OrderStats<S>,
}

impl<S, N> Marketplace<S, N>
where
    S: MarketStore,
    N: NotificationSink,
{
    /// Creates a marketplace over `store`, delivering notifications to `notifier`.
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            builder: OrderBuilder::new(store.clone()),
            machine: OrderStateMachine::new(store.clone(), notifier),
            reviews: ReviewGate::new(store.clone()),
            moderation: ReviewModeration::new(store.clone()),
            stats: OrderStats::new(store.clone()),
            store,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn place_order(&self, buyer: &Actor, cmd: PlaceOrder) -> Result<Order, DomainError> {
        self.builder.place(buyer, cmd).await
    }

    /// Loads an order with its items.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, DomainError> {
        Ok(self
            .store
            .find_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?)
    }

    /// Orders placed by a buyer, newest first.
    pub async fn purchases(&self, buyer_id: UserId) -> Result<Vec<Order>, DomainError> {
        Ok(self
            .store
            .list_orders(&OrderQuery::for_buyer(buyer_id))
            .await?)
    }

    /// Orders holding at least one of the seller's items, newest first.
    pub async fn sales(&self, seller_id: UserId) -> Result<Vec<Order>, DomainError> {
        Ok(self
            .store
            .list_orders(&OrderQuery::for_seller(seller_id))
            .await?)
    }

    pub async fn mark_shipped(&self, actor: &Actor, order_id: OrderId) -> Result<Order, DomainError> {
        self.machine.mark_shipped(actor, order_id).await
    }

    pub async fn confirm_delivered(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<Order, DomainError> {
        self.machine.confirm_delivered(actor, order_id).await
    }

    pub async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<Order, DomainError> {
        self.machine.cancel(actor, order_id, reason).await
    }

    pub async fn open_dispute(&self, actor: &Actor, order_id: OrderId) -> Result<Order, DomainError> {
        self.machine.open_dispute(actor, order_id).await
    }

    pub async fn create_review(
        &self,
        author: &Actor,
        cmd: CreateReview,
    ) -> Result<Review, DomainError> {
        self.reviews.create_review(author, cmd).await
    }

    pub async fn product_reviews(&self, product_id: ProductId) -> Result<Vec<Review>, DomainError> {
        self.moderation.product_reviews(product_id).await
    }

    pub async fn report_review(&self, actor: &Actor, review_id: ReviewId) -> Result<(), DomainError> {
        self.moderation.report(actor, review_id).await
    }

    pub async fn reported_reviews(&self, admin: &Actor) -> Result<Vec<Review>, DomainError> {
        self.moderation.reported(admin).await
    }

    pub async fn ignore_report(&self, admin: &Actor, review_id: ReviewId) -> Result<(), DomainError> {
        self.moderation.ignore_report(admin, review_id).await
    }

    pub async fn delete_review(&self, admin: &Actor, review_id: ReviewId) -> Result<(), DomainError> {
        self.moderation.delete(admin, review_id).await
    }

    pub async fn seller_stats(&self, seller_id: UserId) -> Result<SellerStats, DomainError> {
        self.stats.seller_stats(seller_id).await
    }

    pub async fn marketplace_stats(&self) -> Result<MarketplaceStats, DomainError> {
        self.stats.marketplace_stats().await
    }
}
