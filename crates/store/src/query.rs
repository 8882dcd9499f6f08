use common::{Order, OrderStatus, UserId};

/// Builder for constructing order listing queries.
///
/// Results are always ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by the buyer who placed the order.
    pub buyer_id: Option<UserId>,

    /// Filter to orders containing at least one item from this seller.
    pub seller_id: Option<UserId>,

    /// Filter by current status.
    pub status: Option<OrderStatus>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    /// Creates a new empty query matching every order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for the orders a buyer placed.
    pub fn for_buyer(buyer_id: UserId) -> Self {
        Self {
            buyer_id: Some(buyer_id),
            ..Default::default()
        }
    }

    /// Creates a query for the orders containing a seller's items.
    pub fn for_seller(seller_id: UserId) -> Self {
        Self {
            seller_id: Some(seller_id),
            ..Default::default()
        }
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Limits the number of orders returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips this many orders before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the order passes every filter (ignores paging).
    pub fn matches(&self, order: &Order) -> bool {
        self.buyer_id.is_none_or(|buyer| order.buyer_id == buyer)
            && self.seller_id.is_none_or(|seller| order.has_seller(seller))
            && self.status.is_none_or(|status| order.status == status)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::{Money, OrderId, OrderItem, ProductId, Version};

    use super::*;

    fn order(buyer_id: UserId, seller_id: UserId, status: OrderStatus) -> Order {
        Order {
            id: OrderId::new(),
            buyer_id,
            status,
            total_amount: Money::from_cents(500),
            shipping_address: "1 Main St".to_string(),
            cancellation_reason: None,
            items: vec![OrderItem {
                product_id: ProductId::new(),
                seller_id,
                product_name: "Mug".to_string(),
                quantity: 1,
                price_at_purchase: Money::from_cents(500),
            }],
            version: Version::first(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_query_matches_everything() {
        let o = order(UserId::new(), UserId::new(), OrderStatus::Paid);
        assert!(OrderQuery::new().matches(&o));
    }

    #[test]
    fn buyer_and_seller_filters() {
        let buyer = UserId::new();
        let seller = UserId::new();
        let o = order(buyer, seller, OrderStatus::Shipped);

        assert!(OrderQuery::for_buyer(buyer).matches(&o));
        assert!(!OrderQuery::for_buyer(seller).matches(&o));
        assert!(OrderQuery::for_seller(seller).matches(&o));
        assert!(!OrderQuery::for_seller(buyer).matches(&o));
    }

    #[test]
    fn query_builder_chain() {
        let buyer = UserId::new();
        let query = OrderQuery::for_buyer(buyer)
            .status(OrderStatus::Completed)
            .limit(10)
            .offset(5);

        assert_eq!(query.buyer_id, Some(buyer));
        assert_eq!(query.status, Some(OrderStatus::Completed));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(5));
        assert!(!query.matches(&order(buyer, UserId::new(), OrderStatus::Paid)));
    }
}
