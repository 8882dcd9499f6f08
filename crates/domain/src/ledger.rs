//! Stock reservation and release planning.
//!
//! The ledger never touches storage itself. It tallies what an operation
//! wants to take from or give back to each product, fails fast when a
//! product's last known stock cannot cover the tally, and hands the result
//! to the store as [`StockMovement`]s. The store applies them as conditional
//! decrements inside the same transaction as the order write, so the ledger's
//! check is advisory and the store's is authoritative.

use std::collections::BTreeMap;

use common::{OrderItem, Product, ProductId};
use store::StockMovement;

/// The requested quantity exceeds what the product has left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub product_id: ProductId,
    pub requested: u32,
    pub available: u32,
}

/// Accumulates the reservations of one order-creation attempt.
#[derive(Debug, Default)]
pub struct StockLedger {
    reserved: BTreeMap<ProductId, u32>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `quantity` units of `product` on top of anything already
    /// reserved for it in this attempt.
    pub fn reserve(&mut self, product: &Product, quantity: u32) -> Result<(), Shortfall> {
        let already = self.reserved.get(&product.id).copied().unwrap_or(0);
        let requested = already.saturating_add(quantity);

        if requested > product.stock_quantity {
            return Err(Shortfall {
                product_id: product.id,
                requested,
                available: product.stock_quantity,
            });
        }

        self.reserved.insert(product.id, requested);
        Ok(())
    }

    /// Returns the quantity reserved so far for a product.
    pub fn reserved(&self, product_id: ProductId) -> u32 {
        self.reserved.get(&product_id).copied().unwrap_or(0)
    }

    /// Consumes the ledger, yielding one decrement per product.
    ///
    /// Movements are sorted by product id so concurrent transactions lock
    /// product rows in the same order.
    pub fn into_reservations(self) -> Vec<StockMovement> {
        self.reserved
            .into_iter()
            .map(|(product_id, quantity)| StockMovement::new(product_id, quantity))
            .collect()
    }

    /// Plans the restock of every item of an order, one increment per product.
    pub fn releases(items: &[OrderItem]) -> Vec<StockMovement> {
        let mut totals: BTreeMap<ProductId, u32> = BTreeMap::new();
        for item in items {
            let total = totals.entry(item.product_id).or_insert(0);
            *total = total.saturating_add(item.quantity);
        }
        totals
            .into_iter()
            .map(|(product_id, quantity)| StockMovement::new(product_id, quantity))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use common::{Money, UserId};

    use super::*;

    fn product(stock: u32) -> Product {
        Product::new(UserId::new(), "Candle", Money::from_cents(800), stock)
    }

    #[test]
    fn reserve_within_stock() {
        let candle = product(5);
        let mut ledger = StockLedger::new();

        ledger.reserve(&candle, 2).unwrap();

        assert_eq!(ledger.reserved(candle.id), 2);
        assert_eq!(
            ledger.into_reservations(),
            vec![StockMovement::new(candle.id, 2)]
        );
    }

    #[test]
    fn reserve_exact_stock_is_allowed() {
        let candle = product(3);
        let mut ledger = StockLedger::new();
        assert!(ledger.reserve(&candle, 3).is_ok());
    }

    #[test]
    fn reserve_beyond_stock_fails_and_keeps_tally() {
        let candle = product(5);
        let mut ledger = StockLedger::new();

        let shortfall = ledger.reserve(&candle, 6).unwrap_err();

        assert_eq!(shortfall.requested, 6);
        assert_eq!(shortfall.available, 5);
        assert_eq!(ledger.reserved(candle.id), 0);
    }

    #[test]
    fn repeated_lines_are_cumulative() {
        let candle = product(4);
        let mut ledger = StockLedger::new();

        ledger.reserve(&candle, 3).unwrap();
        let shortfall = ledger.reserve(&candle, 2).unwrap_err();

        assert_eq!(shortfall.requested, 5);
        assert_eq!(ledger.reserved(candle.id), 3);
    }

    #[test]
    fn releases_merge_items_per_product() {
        let candle = product(1);
        let seller = candle.seller_id;
        let item = |quantity| OrderItem {
            product_id: candle.id,
            seller_id: seller,
            product_name: candle.name.clone(),
            quantity,
            price_at_purchase: candle.price,
        };

        let releases = StockLedger::releases(&[item(1), item(4)]);

        assert_eq!(releases, vec![StockMovement::new(candle.id, 5)]);
    }
}
