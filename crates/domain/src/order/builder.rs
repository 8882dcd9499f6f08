use std::time::Instant;

use chrono::Utc;
use common::{Money, Order, OrderId, OrderItem, OrderStatus, ProductId, Version};
use store::{CartStore, OrderRepository, ProductCatalog, StoreError, UserDirectory};

use super::OrderError;
use crate::{Actor, DomainError, StockLedger};

/// One requested line of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Command to turn a cart into an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrder {
    pub shipping_address: String,
    pub lines: Vec<OrderLine>,
}

impl PlaceOrder {
    pub fn new(shipping_address: impl Into<String>, lines: Vec<OrderLine>) -> Self {
        Self {
            shipping_address: shipping_address.into(),
            lines,
        }
    }

    /// Adds a line to the command.
    pub fn line(mut self, product_id: ProductId, quantity: u32) -> Self {
        self.lines.push(OrderLine::new(product_id, quantity));
        self
    }

    fn validate(&self) -> Result<(), OrderError> {
        if self.lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        if let Some(line) = self.lines.iter().find(|line| line.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            });
        }
        if self.shipping_address.trim().is_empty() {
            return Err(OrderError::MissingShippingAddress);
        }
        Ok(())
    }
}

/// Validates a cart against current stock and prices and persists the
/// resulting order in status `PAID`.
pub struct OrderBuilder<S> {
    store: S,
}

impl<S> OrderBuilder<S>
where
    S: UserDirectory + ProductCatalog + OrderRepository + CartStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Places an order for `buyer`.
    ///
    /// Either every line is reserved and the order is persisted, or nothing
    /// changes. Clearing the buyer's cart afterwards is best effort.
    #[tracing::instrument(skip(self, cmd), fields(buyer_id = %buyer.user_id, lines = cmd.lines.len()))]
    pub async fn place(&self, buyer: &Actor, cmd: PlaceOrder) -> Result<Order, DomainError> {
        let start = Instant::now();

        let result = self.try_place(buyer, cmd).await;
        match &result {
            Ok(order) => {
                metrics::counter!("orders_placed_total").increment(1);
                metrics::histogram!("order_placement_duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %order.id,
                    total = %order.total_amount,
                    items = order.items.len(),
                    "order placed"
                );
            }
            Err(e) => {
                metrics::counter!("orders_rejected_total", "reason" => e.kind().as_str())
                    .increment(1);
                tracing::info!(error = %e, "order rejected");
            }
        }
        let order = result?;

        if let Err(e) = self.store.clear_cart(order.buyer_id).await {
            tracing::warn!(buyer_id = %order.buyer_id, error = %e, "failed to clear cart");
        }

        Ok(order)
    }

    async fn try_place(&self, buyer: &Actor, cmd: PlaceOrder) -> Result<Order, DomainError> {
        cmd.validate()?;

        self.store
            .find_user(buyer.user_id)
            .await?
            .ok_or(OrderError::BuyerNotFound(buyer.user_id))?;

        let mut ledger = StockLedger::new();
        let mut items = Vec::with_capacity(cmd.lines.len());
        let mut total = Money::zero();

        for line in &cmd.lines {
            let product = self
                .store
                .find_product(line.product_id)
                .await?
                .ok_or(OrderError::ProductNotFound(line.product_id))?;

            ledger
                .reserve(&product, line.quantity)
                .map_err(|_| OrderError::InsufficientStock {
                    product_id: product.id,
                    product_name: product.name.clone(),
                })?;

            let item = OrderItem {
                product_id: product.id,
                seller_id: product.seller_id,
                product_name: product.name,
                quantity: line.quantity,
                price_at_purchase: product.price,
            };
            total = item
                .price_at_purchase
                .checked_mul(item.quantity)
                .and_then(|line_total| total.checked_add(line_total))
                .ok_or(OrderError::TotalOverflow)?;
            items.push(item);
        }

        let now = Utc::now();
        let order = Order {
            id: OrderId::new(),
            buyer_id: buyer.user_id,
            status: OrderStatus::Paid,
            total_amount: total,
            shipping_address: cmd.shipping_address.trim().to_string(),
            cancellation_reason: None,
            items,
            version: Version::first(),
            created_at: now,
            updated_at: now,
        };

        self.store
            .place_order(&order, &ledger.into_reservations())
            .await
            .map_err(|e| match e {
                // Another order took the stock after our read.
                StoreError::InsufficientStock { product_id } => {
                    let product_name = order
                        .items
                        .iter()
                        .find(|item| item.product_id == product_id)
                        .map(|item| item.product_name.clone())
                        .unwrap_or_default();
                    DomainError::from(OrderError::InsufficientStock {
                        product_id,
                        product_name,
                    })
                }
                other => DomainError::from(other),
            })?;

        Ok(order)
    }
}
