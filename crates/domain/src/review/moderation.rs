use common::{ProductId, Review, ReviewId};
use store::{ReviewRepository, StoreError};

use super::ReviewError;
use crate::{Actor, DomainError};

/// Flagging of reviews by users and their resolution by admins.
pub struct ReviewModeration<S> {
    store: S,
}

impl<S> ReviewModeration<S>
where
    S: ReviewRepository,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Lists a product's reviews, newest first.
    pub async fn product_reviews(&self, product_id: ProductId) -> Result<Vec<Review>, DomainError> {
        Ok(self.store.reviews_for_product(product_id).await?)
    }

    /// Flags a review for admin attention. Any user may report.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn report(&self, actor: &Actor, review_id: ReviewId) -> Result<(), DomainError> {
        self.store
            .set_reported(review_id, true)
            .await
            .map_err(|e| not_found(e, review_id))?;
        tracing::info!(%review_id, "review reported");
        Ok(())
    }

    /// Lists reported reviews, newest first.
    pub async fn reported(&self, admin: &Actor) -> Result<Vec<Review>, DomainError> {
        require_admin(admin)?;
        Ok(self.store.reported_reviews().await?)
    }

    /// Clears the report flag and keeps the review.
    #[tracing::instrument(skip(self), fields(user_id = %admin.user_id))]
    pub async fn ignore_report(&self, admin: &Actor, review_id: ReviewId) -> Result<(), DomainError> {
        require_admin(admin)?;
        self.store
            .set_reported(review_id, false)
            .await
            .map_err(|e| not_found(e, review_id))?;
        Ok(())
    }

    /// Removes a review and recomputes the affected ratings.
    #[tracing::instrument(skip(self), fields(user_id = %admin.user_id))]
    pub async fn delete(&self, admin: &Actor, review_id: ReviewId) -> Result<(), DomainError> {
        require_admin(admin)?;

        let ratings = self
            .store
            .remove_review(review_id)
            .await
            .map_err(|e| not_found(e, review_id))?;
        tracing::info!(
            %review_id,
            product_id = %ratings.product_id,
            product_average = %ratings.product.average,
            "review deleted"
        );
        Ok(())
    }
}

fn require_admin(actor: &Actor) -> Result<(), ReviewError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ReviewError::AdminRequired(actor.user_id))
    }
}

fn not_found(error: StoreError, review_id: ReviewId) -> DomainError {
    match error {
        StoreError::ReviewNotFound(_) => ReviewError::ReviewNotFound(review_id).into(),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use common::{Money, OrderId, Product, Role, User, UserId};
    use rust_decimal::Decimal;
    use store::{InMemoryStore, ProductCatalog, UserDirectory};

    use super::*;
    use crate::ErrorKind;

    async fn seeded() -> (InMemoryStore, Product, User, Vec<Review>) {
        let store = InMemoryStore::new();
        let seller = User::new("smith@example.com", "Sol Smith", Role::Seller);
        let product = Product::new(seller.id, "Hook", Money::from_cents(500), 3);
        store.add_user(seller.clone()).await;
        store.add_product(product.clone()).await;

        let mut reviews = Vec::new();
        for (age, rating) in [(2, 5u8), (1, 2u8)] {
            let review = Review {
                id: ReviewId::new(),
                order_id: OrderId::new(),
                product_id: product.id,
                author_id: UserId::new(),
                rating,
                comment: None,
                is_reported: false,
                created_at: Utc::now() - Duration::minutes(age),
            };
            store.record_review(&review).await.unwrap();
            reviews.push(review);
        }
        (store, product, seller, reviews)
    }

    #[tokio::test]
    async fn anyone_reports_only_admins_resolve() {
        let (store, _, _, reviews) = seeded().await;
        let moderation = ReviewModeration::new(store.clone());
        let buyer = Actor::buyer(UserId::new());
        let admin = Actor::admin(UserId::new());

        moderation.report(&buyer, reviews[1].id).await.unwrap();

        let err = moderation.reported(&buyer).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let reported = moderation.reported(&admin).await.unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].id, reviews[1].id);

        moderation.ignore_report(&admin, reviews[1].id).await.unwrap();
        assert!(moderation.reported(&admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_recomputes_ratings() {
        let (store, product, seller, reviews) = seeded().await;
        let moderation = ReviewModeration::new(store.clone());
        let admin = Actor::admin(UserId::new());

        moderation.delete(&admin, reviews[1].id).await.unwrap();

        let product = store.find_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.rating.count, 1);
        assert_eq!(product.rating.average, Decimal::from(5));
        let seller = store.find_user(seller.id).await.unwrap().unwrap();
        assert_eq!(seller.rating.count, 1);

        let err = moderation.delete(&admin, reviews[1].id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn product_reviews_are_newest_first() {
        let (store, product, _, reviews) = seeded().await;
        let moderation = ReviewModeration::new(store);

        let listed = moderation.product_reviews(product.id).await.unwrap();

        assert_eq!(
            listed.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![reviews[1].id, reviews[0].id]
        );
    }

    #[tokio::test]
    async fn reporting_unknown_review() {
        let (store, _, _, _) = seeded().await;
        let moderation = ReviewModeration::new(store);
        let err = moderation
            .report(&Actor::buyer(UserId::new()), ReviewId::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Review(ReviewError::ReviewNotFound(_))
        ));
    }
}
