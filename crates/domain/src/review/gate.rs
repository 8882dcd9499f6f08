use chrono::Utc;
use common::{OrderId, OrderStatus, ProductId, Review, ReviewId};
use store::{OrderRepository, ReviewRepository, StoreError};

use super::ReviewError;
use crate::{Actor, DomainError};

/// Command to review one product of a completed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReview {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub rating: u8,
    pub comment: Option<String>,
}

impl CreateReview {
    pub fn new(order_id: OrderId, product_id: ProductId, rating: u8) -> Self {
        Self {
            order_id,
            product_id,
            rating,
            comment: None,
        }
    }

    /// Attaches a comment. Blank comments are dropped.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        self.comment = (!comment.trim().is_empty()).then_some(comment);
        self
    }
}

/// Decides whether a buyer may review a product and, if so, records the
/// review together with the refreshed product and seller ratings.
pub struct ReviewGate<S> {
    store: S,
}

impl<S> ReviewGate<S>
where
    S: OrderRepository + ReviewRepository,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates a review authored by `author`.
    ///
    /// Guards run in a fixed order and the first failure wins: rating range,
    /// order exists, author placed it, order completed, product in order,
    /// no earlier review.
    #[tracing::instrument(skip(self, cmd), fields(author_id = %author.user_id, order_id = %cmd.order_id, product_id = %cmd.product_id))]
    pub async fn create_review(
        &self,
        author: &Actor,
        cmd: CreateReview,
    ) -> Result<Review, DomainError> {
        if !(1..=5).contains(&cmd.rating) {
            return Err(ReviewError::InvalidRating(cmd.rating).into());
        }

        let order = self
            .store
            .find_order(cmd.order_id)
            .await?
            .ok_or(ReviewError::OrderNotFound(cmd.order_id))?;

        if !author.is_buyer_of(&order) {
            return Err(ReviewError::NotOrderOwner {
                order_id: order.id,
                author_id: author.user_id,
            }
            .into());
        }
        if order.status != OrderStatus::Completed {
            return Err(ReviewError::OrderNotCompleted {
                order_id: order.id,
                status: order.status,
            }
            .into());
        }
        if !order.contains_product(cmd.product_id) {
            return Err(ReviewError::ProductNotInOrder {
                order_id: order.id,
                product_id: cmd.product_id,
            }
            .into());
        }
        if self
            .store
            .review_exists(cmd.order_id, cmd.product_id)
            .await?
        {
            return Err(duplicate(cmd.order_id, cmd.product_id));
        }

        let review = Review {
            id: ReviewId::new(),
            order_id: cmd.order_id,
            product_id: cmd.product_id,
            author_id: author.user_id,
            rating: cmd.rating,
            comment: cmd.comment,
            is_reported: false,
            created_at: Utc::now(),
        };

        // The unique constraint still catches a concurrent duplicate.
        let ratings = self
            .store
            .record_review(&review)
            .await
            .map_err(|e| match e {
                StoreError::DuplicateReview {
                    order_id,
                    product_id,
                } => duplicate(order_id, product_id),
                StoreError::ProductNotFound(id) => ReviewError::ProductNotFound(id).into(),
                other => DomainError::from(other),
            })?;

        metrics::counter!("reviews_created_total").increment(1);
        tracing::info!(
            review_id = %review.id,
            rating = review.rating,
            product_average = %ratings.product.average,
            seller_average = %ratings.seller.average,
            "review created"
        );

        Ok(review)
    }
}

fn duplicate(order_id: OrderId, product_id: ProductId) -> DomainError {
    ReviewError::DuplicateReview {
        order_id,
        product_id,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use common::{Money, Order, Product, ReviewId, Role, User, UserId, Version};
    use rust_decimal::Decimal;
    use store::{
        InMemoryStore, OrderQuery, ProductCatalog, RatingUpdate, StatusChange, StockMovement,
        UserDirectory,
    };
    use tokio::sync::Mutex;

    use super::*;
    use crate::ErrorKind;
    use crate::order::{OrderBuilder, OrderStateMachine, PlaceOrder};

    struct Fixture {
        store: InMemoryStore,
        gate: ReviewGate<InMemoryStore>,
        buyer: Actor,
        seller: Actor,
        product: Product,
        other: Product,
        order_id: OrderId,
    }

    async fn fixture(complete: bool) -> Fixture {
        let store = InMemoryStore::new();
        let seller = User::new("carver@example.com", "Cai Carver", Role::Seller);
        let buyer = User::new("buyer@example.com", "Lee Buyer", Role::Buyer);
        let product = Product::new(seller.id, "Spoon", Money::from_cents(1200), 10);
        let other = Product::new(seller.id, "Ladle", Money::from_cents(1800), 10);
        let (buyer_actor, seller_actor) = (Actor::from(&buyer), Actor::from(&seller));
        store.add_user(buyer).await;
        store.add_user(seller).await;
        store.add_product(product.clone()).await;
        store.add_product(other.clone()).await;

        let order = OrderBuilder::new(store.clone())
            .place(
                &buyer_actor,
                PlaceOrder::new("4 Oak Yard", vec![]).line(product.id, 1),
            )
            .await
            .unwrap();

        if complete {
            let machine = OrderStateMachine::new(store.clone(), store.clone());
            machine.mark_shipped(&seller_actor, order.id).await.unwrap();
            machine
                .confirm_delivered(&buyer_actor, order.id)
                .await
                .unwrap();
        }

        Fixture {
            gate: ReviewGate::new(store.clone()),
            store,
            buyer: buyer_actor,
            seller: seller_actor,
            product,
            other,
            order_id: order.id,
        }
    }

    #[tokio::test]
    async fn review_updates_product_and_seller_ratings() {
        let f = fixture(true).await;

        let review = f
            .gate
            .create_review(
                &f.buyer,
                CreateReview::new(f.order_id, f.product.id, 5).comment("Lovely grain"),
            )
            .await
            .unwrap();

        assert_eq!(review.comment.as_deref(), Some("Lovely grain"));
        let product = f.store.find_product(f.product.id).await.unwrap().unwrap();
        assert_eq!(product.rating.count, 1);
        assert_eq!(product.rating.average, Decimal::from(5));
        let seller = f.store.find_user(f.seller.user_id).await.unwrap().unwrap();
        assert_eq!(seller.rating.count, 1);
        assert_eq!(seller.rating.average, Decimal::from(5));
    }

    #[tokio::test]
    async fn rating_out_of_range() {
        let f = fixture(true).await;
        for rating in [0, 6] {
            let err = f
                .gate
                .create_review(&f.buyer, CreateReview::new(f.order_id, f.product.id, rating))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
    }

    #[tokio::test]
    async fn guards_fail_in_order() {
        let f = fixture(false).await;

        let err = f
            .gate
            .create_review(&f.buyer, CreateReview::new(OrderId::new(), f.product.id, 4))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Review(ReviewError::OrderNotFound(_))));

        // Not the owner wins over not completed.
        let err = f
            .gate
            .create_review(&f.seller, CreateReview::new(f.order_id, f.product.id, 4))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Review(ReviewError::NotOrderOwner { .. })
        ));

        // Not completed wins over product not in order.
        let err = f
            .gate
            .create_review(&f.buyer, CreateReview::new(f.order_id, f.other.id, 4))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Review(ReviewError::OrderNotCompleted {
                status: OrderStatus::Paid,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn product_must_be_in_order() {
        let f = fixture(true).await;
        let err = f
            .gate
            .create_review(&f.buyer, CreateReview::new(f.order_id, f.other.id, 4))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Review(ReviewError::ProductNotInOrder { .. })
        ));
    }

    #[tokio::test]
    async fn second_review_is_duplicate() {
        let f = fixture(true).await;
        f.gate
            .create_review(&f.buyer, CreateReview::new(f.order_id, f.product.id, 4))
            .await
            .unwrap();

        let err = f
            .gate
            .create_review(&f.buyer, CreateReview::new(f.order_id, f.product.id, 2))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DuplicateReview);
        let product = f.store.find_product(f.product.id).await.unwrap().unwrap();
        assert_eq!(product.rating.count, 1);
        assert_eq!(product.rating.average, Decimal::from(4));
    }

    #[test]
    fn blank_comment_is_dropped() {
        let cmd = CreateReview::new(OrderId::new(), ProductId::new(), 3).comment("  ");
        assert_eq!(cmd.comment, None);
    }

    /// A write by another session that lands just before ours.
    enum ConcurrentWrite {
        Reprice(ProductId, Money),
        Review(Review),
    }

    /// Store that applies a [`ConcurrentWrite`] right before the next review
    /// is recorded.
    #[derive(Clone)]
    struct Interleaved {
        inner: InMemoryStore,
        pending: Arc<Mutex<Option<ConcurrentWrite>>>,
    }

    impl Interleaved {
        fn new(inner: InMemoryStore, write: ConcurrentWrite) -> Self {
            Self {
                inner,
                pending: Arc::new(Mutex::new(Some(write))),
            }
        }
    }

    #[async_trait]
    impl OrderRepository for Interleaved {
        async fn place_order(
            &self,
            order: &Order,
            reservations: &[StockMovement],
        ) -> store::Result<()> {
            self.inner.place_order(order, reservations).await
        }

        async fn find_order(&self, id: OrderId) -> store::Result<Option<Order>> {
            self.inner.find_order(id).await
        }

        async fn update_status(
            &self,
            change: &StatusChange,
            restock: &[StockMovement],
        ) -> store::Result<Version> {
            self.inner.update_status(change, restock).await
        }

        async fn list_orders(&self, query: &OrderQuery) -> store::Result<Vec<Order>> {
            self.inner.list_orders(query).await
        }
    }

    #[async_trait]
    impl ReviewRepository for Interleaved {
        async fn record_review(&self, review: &Review) -> store::Result<RatingUpdate> {
            match self.pending.lock().await.take() {
                Some(ConcurrentWrite::Reprice(product_id, price)) => {
                    let mut product = self.inner.find_product(product_id).await?.unwrap();
                    product.price = price;
                    self.inner.save_product(&product).await?;
                }
                Some(ConcurrentWrite::Review(other)) => {
                    self.inner.record_review(&other).await?;
                }
                None => {}
            }
            self.inner.record_review(review).await
        }

        async fn remove_review(&self, id: ReviewId) -> store::Result<RatingUpdate> {
            self.inner.remove_review(id).await
        }

        async fn review_exists(
            &self,
            order_id: OrderId,
            product_id: ProductId,
        ) -> store::Result<bool> {
            self.inner.review_exists(order_id, product_id).await
        }

        async fn find_review(&self, id: ReviewId) -> store::Result<Option<Review>> {
            self.inner.find_review(id).await
        }

        async fn reviews_for_product(&self, product_id: ProductId) -> store::Result<Vec<Review>> {
            self.inner.reviews_for_product(product_id).await
        }

        async fn reported_reviews(&self) -> store::Result<Vec<Review>> {
            self.inner.reported_reviews().await
        }

        async fn set_reported(&self, id: ReviewId, reported: bool) -> store::Result<()> {
            self.inner.set_reported(id, reported).await
        }
    }

    #[tokio::test]
    async fn review_keeps_concurrent_price_change() {
        let f = fixture(true).await;
        let gate = ReviewGate::new(Interleaved::new(
            f.store.clone(),
            ConcurrentWrite::Reprice(f.product.id, Money::from_cents(9999)),
        ));

        gate.create_review(&f.buyer, CreateReview::new(f.order_id, f.product.id, 5))
            .await
            .unwrap();

        let product = f.store.find_product(f.product.id).await.unwrap().unwrap();
        assert_eq!(product.price, Money::from_cents(9999));
        assert_eq!(product.rating.count, 1);
        assert_eq!(product.rating.average, Decimal::from(5));
    }

    #[tokio::test]
    async fn concurrent_reviews_are_both_counted() {
        let f = fixture(true).await;
        let other = Review {
            id: ReviewId::new(),
            order_id: OrderId::new(),
            product_id: f.product.id,
            author_id: UserId::new(),
            rating: 2,
            comment: None,
            is_reported: false,
            created_at: Utc::now(),
        };
        let gate = ReviewGate::new(Interleaved::new(
            f.store.clone(),
            ConcurrentWrite::Review(other),
        ));

        gate.create_review(&f.buyer, CreateReview::new(f.order_id, f.product.id, 5))
            .await
            .unwrap();

        let reviews = f.store.reviews_for_product(f.product.id).await.unwrap();
        assert_eq!(reviews.len(), 2);
        // 7 / 2 = 3.5
        let product = f.store.find_product(f.product.id).await.unwrap().unwrap();
        assert_eq!(product.rating.count, 2);
        assert_eq!(product.rating.average, Decimal::new(35, 1));
        let seller = f.store.find_user(f.seller.user_id).await.unwrap().unwrap();
        assert_eq!(seller.rating.count, 2);
        assert_eq!(seller.rating.average, Decimal::new(350, 2));
    }
}
