//! Seller and marketplace reporting over stored orders.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use common::{Money, Order, OrderStatus, ProductId, RatingSummary, UserId};
use store::{OrderQuery, OrderRepository, UserDirectory};

use crate::DomainError;

/// Number of entries in [`SellerStats::top_products`].
pub const TOP_PRODUCTS: usize = 5;

/// Revenue earned on one calendar day (UTC, by order creation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Money,
}

/// Units of one product sold in completed orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSales {
    pub product_id: ProductId,
    pub product_name: String,
    pub units_sold: u64,
}

/// A seller's dashboard figures.
///
/// Revenue, history and top products only count completed orders.
/// `sales_count` counts every order holding one of the seller's items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellerStats {
    pub seller_id: UserId,
    pub revenue: Money,
    pub sales_count: usize,
    pub rating: RatingSummary,
    /// Ascending by date.
    pub revenue_history: Vec<DailyRevenue>,
    pub top_products: Vec<ProductSales>,
}

/// Platform-wide figures for admins.
///
/// Money sums saturate at the bounds of the cent range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceStats {
    /// Sum of completed order totals.
    pub gmv: Money,
    pub open_disputes: usize,
    pub orders_by_status: BTreeMap<OrderStatus, usize>,
}

impl MarketplaceStats {
    pub fn total_orders(&self) -> usize {
        self.orders_by_status.values().sum()
    }
}

/// Computes [`SellerStats`] and [`MarketplaceStats`].
pub struct OrderStats<S> {
    store: S,
}

impl<S> OrderStats<S>
where
    S: OrderRepository + UserDirectory,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn seller_stats(&self, seller_id: UserId) -> Result<SellerStats, DomainError> {
        let seller = self
            .store
            .find_user(seller_id)
            .await?
            .ok_or(DomainError::UserNotFound(seller_id))?;

        let orders = self
            .store
            .list_orders(&OrderQuery::for_seller(seller_id))
            .await?;

        Ok(seller_stats_from(seller_id, seller.rating, &orders))
    }

    #[tracing::instrument(skip(self))]
    pub async fn marketplace_stats(&self) -> Result<MarketplaceStats, DomainError> {
        let orders = self.store.list_orders(&OrderQuery::new()).await?;
        Ok(marketplace_stats_from(&orders))
    }
}

fn seller_stats_from(seller_id: UserId, rating: RatingSummary, orders: &[Order]) -> SellerStats {
    let mut revenue = Money::zero();
    let mut by_day: BTreeMap<NaiveDate, Money> = BTreeMap::new();
    let mut units: HashMap<ProductId, ProductSales> = HashMap::new();

    for order in orders.iter().filter(|o| o.status == OrderStatus::Completed) {
        let day = order.created_at.date_naive();
        for item in order.items.iter().filter(|i| i.seller_id == seller_id) {
            let line = item.line_total();
            revenue = revenue.saturating_add(line);
            let daily = by_day.entry(day).or_insert_with(Money::zero);
            *daily = daily.saturating_add(line);

            units
                .entry(item.product_id)
                .or_insert_with(|| ProductSales {
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    units_sold: 0,
                })
                .units_sold += u64::from(item.quantity);
        }
    }

    let mut top_products: Vec<ProductSales> = units.into_values().collect();
    top_products.sort_by(|a, b| {
        b.units_sold
            .cmp(&a.units_sold)
            .then_with(|| a.product_name.cmp(&b.product_name))
    });
    top_products.truncate(TOP_PRODUCTS);

    SellerStats {
        seller_id,
        revenue,
        sales_count: orders.iter().filter(|o| o.has_seller(seller_id)).count(),
        rating,
        revenue_history: by_day
            .into_iter()
            .map(|(date, revenue)| DailyRevenue { date, revenue })
            .collect(),
        top_products,
    }
}

fn marketplace_stats_from(orders: &[Order]) -> MarketplaceStats {
    let mut orders_by_status = BTreeMap::new();
    for order in orders {
        *orders_by_status.entry(order.status).or_insert(0) += 1;
    }

    MarketplaceStats {
        gmv: orders
            .iter()
            .filter(|o| o.status == OrderStatus::Completed)
            .fold(Money::zero(), |gmv, o| gmv.saturating_add(o.total_amount)),
        open_disputes: orders_by_status
            .get(&OrderStatus::Disputed)
            .copied()
            .unwrap_or(0),
        orders_by_status,
    }
}
