use std::collections::HashMap;

use async_trait::async_trait;
use common::{
    Money, NotificationCategory, Order, OrderId, OrderItem, PRODUCT_RATING_SCALE, Product,
    ProductId, RatingSummary, Review, ReviewId, SELLER_RATING_SCALE, User, UserId, Version,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderQuery, Result, StoreError,
    store::{
        CartStore, NotificationSink, OrderRepository, ProductCatalog, RatingUpdate,
        ReviewRepository, StatusChange, StockMovement, UserDirectory,
    },
};

const ORDER_COLUMNS: &str = "id, buyer_id, status, total_amount_cents, shipping_address, \
     cancellation_reason, version, created_at, updated_at";

const REVIEW_COLUMNS: &str =
    "id, order_id, product_id, author_id, rating, comment, is_reported, created_at";

/// PostgreSQL-backed store implementation.
///
/// Every mutating trait method runs in its own transaction.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Inserts a user account.
    pub async fn add_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, full_name, role, average_rating, reviews_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(user.rating.average)
        .bind(to_i32(user.rating.count, "reviews_count")?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_user(row: PgRow) -> Result<User> {
        Ok(User {
            id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
            email: row.try_get("email")?,
            full_name: row.try_get("full_name")?,
            role: parse(row.try_get::<String, _>("role")?)?,
            rating: rating_from_row(&row)?,
        })
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock_quantity: to_u32(row.try_get("stock_quantity")?, "stock_quantity")?,
            status: parse(row.try_get::<String, _>("status")?)?,
            rating: rating_from_row(&row)?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
            product_name: row.try_get("product_name")?,
            quantity: to_u32(row.try_get("quantity")?, "quantity")?,
            price_at_purchase: Money::from_cents(row.try_get("price_at_purchase_cents")?),
        })
    }

    fn row_to_order(row: PgRow, items: Vec<OrderItem>) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
            status: parse(row.try_get::<String, _>("status")?)?,
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            shipping_address: row.try_get("shipping_address")?,
            cancellation_reason: row.try_get("cancellation_reason")?,
            items,
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_review(row: PgRow) -> Result<Review> {
        let rating: i16 = row.try_get("rating")?;
        Ok(Review {
            id: ReviewId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            author_id: UserId::from_uuid(row.try_get::<Uuid, _>("author_id")?),
            rating: u8::try_from(rating)
                .map_err(|_| StoreError::InvalidData(format!("rating out of range: {rating}")))?,
            comment: row.try_get("comment")?,
            is_reported: row.try_get("is_reported")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Loads the items of several orders in one round trip, keyed by order.
    async fn items_for_orders(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, seller_id, product_name, quantity, price_at_purchase_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id: Uuid = row.try_get("order_id")?;
            items
                .entry(order_id)
                .or_default()
                .push(Self::row_to_item(&row)?);
        }
        Ok(items)
    }
}

#[async_trait]
impl UserDirectory for PostgresStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        sqlx::query(
            "SELECT id, email, full_name, role, average_rating, reviews_count FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_user)
        .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        sqlx::query(
            "SELECT id, email, full_name, role, average_rating, reviews_count FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_user)
        .transpose()
    }
}

#[async_trait]
impl ProductCatalog for PostgresStore {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>> {
        sqlx::query(
            r#"
            SELECT id, seller_id, name, price_cents, stock_quantity, status, average_rating, reviews_count
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_product)
        .transpose()
    }

    async fn save_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, seller_id, name, price_cents, stock_quantity, status, average_rating, reviews_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.seller_id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(to_i32(product.stock_quantity, "stock_quantity")?)
        .bind(product.status.as_str())
        .bind(product.rating.average)
        .bind(to_i32(product.rating.count, "reviews_count")?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn place_order(&self, order: &Order, reservations: &[StockMovement]) -> Result<()> {
        // Dropping the transaction on any early return rolls back the
        // reservations already applied.
        let mut tx = self.pool.begin().await?;

        for movement in reservations {
            let result = sqlx::query(
                r#"
                UPDATE products
                SET stock_quantity = stock_quantity - $1, updated_at = NOW()
                WHERE id = $2 AND stock_quantity >= $1
                "#,
            )
            .bind(to_i32(movement.quantity, "quantity")?)
            .bind(movement.product_id.as_uuid())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::InsufficientStock {
                    product_id: movement.product_id,
                });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, buyer_id, status, total_amount_cents, shipping_address, cancellation_reason, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.buyer_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total_amount.cents())
        .bind(&order.shipping_address)
        .bind(&order.cancellation_reason)
        .bind(order.version.as_i64())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for (line_no, item) in order.items.iter().enumerate() {
            let line_no = i32::try_from(line_no)
                .map_err(|_| StoreError::InvalidData("too many order lines".to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, line_no, product_id, seller_id, product_name, quantity, price_at_purchase_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(line_no)
            .bind(item.product_id.as_uuid())
            .bind(item.seller_id.as_uuid())
            .bind(&item.product_name)
            .bind(to_i32(item.quantity, "quantity")?)
            .bind(item.price_at_purchase.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> =
            sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => {
                let mut items = self.items_for_orders(&[id.as_uuid()]).await?;
                let items = items.remove(&id.as_uuid()).unwrap_or_default();
                Ok(Some(Self::row_to_order(row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        change: &StatusChange,
        restock: &[StockMovement],
    ) -> Result<Version> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1,
                cancellation_reason = COALESCE($2, cancellation_reason),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $3 AND version = $4
            "#,
        )
        .bind(change.status.as_str())
        .bind(&change.cancellation_reason)
        .bind(change.order_id.as_uuid())
        .bind(change.expected_version.as_i64())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
                    .bind(change.order_id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await?;
            return Err(if exists {
                StoreError::ConcurrencyConflict {
                    order_id: change.order_id,
                    expected: change.expected_version,
                }
            } else {
                StoreError::OrderNotFound(change.order_id)
            });
        }

        for movement in restock {
            sqlx::query(
                r#"
                UPDATE products
                SET stock_quantity = stock_quantity + $1, updated_at = NOW()
                WHERE id = $2
                "#,
            )
            .bind(to_i32(movement.quantity, "quantity")?)
            .bind(movement.product_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(change.expected_version.next())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.buyer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.buyer_id = ${param_count}"));
        }
        if query.seller_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM order_items i WHERE i.order_id = o.id AND i.seller_id = ${param_count})"
            ));
        }
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.status = ${param_count}"));
        }

        sql.push_str(" ORDER BY o.created_at DESC, o.id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(buyer_id) = query.buyer_id {
            sqlx_query = sqlx_query.bind(buyer_id.as_uuid());
        }
        if let Some(seller_id) = query.seller_id {
            sqlx_query = sqlx_query.bind(seller_id.as_uuid());
        }
        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.items_for_orders(&ids).await?;

        rows.into_iter()
            .zip(ids)
            .map(|(row, id)| Self::row_to_order(row, items.remove(&id).unwrap_or_default()))
            .collect()
    }
}

#[async_trait]
impl ReviewRepository for PostgresStore {
    async fn record_review(&self, review: &Review) -> Result<RatingUpdate> {
        let mut tx = self.pool.begin().await?;
        let seller_id = lock_rated_rows(&mut tx, review.product_id).await?;

        sqlx::query(
            r#"
            INSERT INTO reviews (id, order_id, product_id, author_id, rating, comment, is_reported, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(review.id.as_uuid())
        .bind(review.order_id.as_uuid())
        .bind(review.product_id.as_uuid())
        .bind(review.author_id.as_uuid())
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .bind(review.is_reported)
        .bind(review.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_review_per_order_product")
            {
                return StoreError::DuplicateReview {
                    order_id: review.order_id,
                    product_id: review.product_id,
                };
            }
            StoreError::Database(e)
        })?;

        let update = rerate(&mut tx, review.product_id, seller_id).await?;
        tx.commit().await?;
        Ok(update)
    }

    async fn remove_review(&self, id: ReviewId) -> Result<RatingUpdate> {
        let mut tx = self.pool.begin().await?;

        let product_id: Uuid = sqlx::query_scalar("SELECT product_id FROM reviews WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::ReviewNotFound(id))?;
        let product_id = ProductId::from_uuid(product_id);
        let seller_id = lock_rated_rows(&mut tx, product_id).await?;

        // A concurrent delete may have won while we waited for the locks.
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ReviewNotFound(id));
        }

        let update = rerate(&mut tx, product_id, seller_id).await?;
        tx.commit().await?;
        Ok(update)
    }

    async fn review_exists(&self, order_id: OrderId, product_id: ProductId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reviews WHERE order_id = $1 AND product_id = $2)",
        )
        .bind(order_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn find_review(&self, id: ReviewId) -> Result<Option<Review>> {
        sqlx::query(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_review)
            .transpose()
    }

    async fn reviews_for_product(&self, product_id: ProductId) -> Result<Vec<Review>> {
        let rows = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE product_id = $1 ORDER BY created_at DESC"
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_review).collect()
    }

    async fn reported_reviews(&self) -> Result<Vec<Review>> {
        let rows = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE is_reported = TRUE ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_review).collect()
    }

    async fn set_reported(&self, id: ReviewId, reported: bool) -> Result<()> {
        let result = sqlx::query("UPDATE reviews SET is_reported = $1 WHERE id = $2")
            .bind(reported)
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ReviewNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for PostgresStore {
    async fn notify(
        &self,
        user_id: UserId,
        message: &str,
        category: NotificationCategory,
    ) -> Result<()> {
        sqlx::query("INSERT INTO notifications (user_id, message, category) VALUES ($1, $2, $3)")
            .bind(user_id.as_uuid())
            .bind(message)
            .bind(category.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn clear_cart(&self, buyer_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE buyer_id = $1")
            .bind(buyer_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Locks the product row and its seller's row for a rating recompute.
///
/// Concurrent review writers on the same product or seller queue here, so
/// each recompute sees every review committed before it.
async fn lock_rated_rows(
    tx: &mut Transaction<'_, Postgres>,
    product_id: ProductId,
) -> Result<UserId> {
    let seller_id: Uuid =
        sqlx::query_scalar("SELECT seller_id FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(StoreError::ProductNotFound(product_id))?;

    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(seller_id)
        .execute(&mut **tx)
        .await?;

    Ok(UserId::from_uuid(seller_id))
}

/// Recomputes the product and seller ratings from the review table. Only
/// the rating columns are written.
async fn rerate(
    tx: &mut Transaction<'_, Postgres>,
    product_id: ProductId,
    seller_id: UserId,
) -> Result<RatingUpdate> {
    let product_row = sqlx::query(
        r#"
        UPDATE products p
        SET average_rating = s.average, reviews_count = s.total, updated_at = NOW()
        FROM (
            SELECT COALESCE(ROUND(AVG(rating), $2), 0) AS average, COUNT(*)::INTEGER AS total
            FROM reviews
            WHERE product_id = $1
        ) s
        WHERE p.id = $1
        RETURNING p.average_rating, p.reviews_count
        "#,
    )
    .bind(product_id.as_uuid())
    .bind(to_i32(PRODUCT_RATING_SCALE, "rating scale")?)
    .fetch_one(&mut **tx)
    .await?;

    let seller_row = sqlx::query(
        r#"
        UPDATE users u
        SET average_rating = s.average, reviews_count = s.total, updated_at = NOW()
        FROM (
            SELECT COALESCE(ROUND(AVG(r.rating), $2), 0) AS average, COUNT(*)::INTEGER AS total
            FROM reviews r
            JOIN products p ON p.id = r.product_id
            WHERE p.seller_id = $1
        ) s
        WHERE u.id = $1
        RETURNING u.average_rating, u.reviews_count
        "#,
    )
    .bind(seller_id.as_uuid())
    .bind(to_i32(SELLER_RATING_SCALE, "rating scale")?)
    .fetch_one(&mut **tx)
    .await?;

    Ok(RatingUpdate {
        product_id,
        seller_id,
        product: rating_from_row(&product_row)?,
        seller: rating_from_row(&seller_row)?,
    })
}

fn rating_from_row(row: &PgRow) -> Result<RatingSummary> {
    Ok(RatingSummary {
        average: row.try_get("average_rating")?,
        count: to_u32(row.try_get("reviews_count")?, "reviews_count")?,
    })
}

fn parse<T>(value: String) -> Result<T>
where
    T: std::str::FromStr<Err = common::ParseEnumError>,
{
    value
        .parse()
        .map_err(|e: common::ParseEnumError| StoreError::InvalidData(e.to_string()))
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::InvalidData(format!("negative {column}: {value}")))
}

fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{column} out of range: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_conversions_reject_out_of_range_values() {
        assert_eq!(to_u32(7, "stock_quantity").unwrap(), 7);
        assert!(matches!(
            to_u32(-1, "stock_quantity"),
            Err(StoreError::InvalidData(_))
        ));
        assert!(to_i32(u32::MAX, "quantity").is_err());
    }

    #[test]
    fn parse_maps_unknown_enum_values_to_invalid_data() {
        let status: common::OrderStatus = parse("SHIPPED".to_string()).unwrap();
        assert_eq!(status, common::OrderStatus::Shipped);

        let err = parse::<common::Role>("ROOT".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid stored data: unknown role value: ROOT");
    }
}
