//! Order lifecycle and inventory consistency core of the marketplace.
//!
//! This crate provides:
//! - [`StockLedger`] for planning stock reservations and releases
//! - [`OrderBuilder`] turning a cart into a priced, stock-backed order
//! - [`OrderStateMachine`] driven by a declarative transition table
//! - [`ReviewGate`] and [`ReviewModeration`] for reviews and ratings
//! - [`OrderStats`] for seller and marketplace reporting
//! - [`Marketplace`], a facade over all of the above

pub mod actor;
pub mod error;
pub mod ledger;
pub mod order;
pub mod review;
pub mod service;
pub mod stats;

pub use actor::Actor;
pub use error::{DomainError, ErrorKind};
pub use ledger::{Shortfall, StockLedger};
pub use order::{
    ActorRule, OrderAction, OrderBuilder, OrderError, OrderLine, OrderStateMachine, PlaceOrder,
    SideEffect, TRANSITIONS, Transition,
};
pub use review::{CreateReview, ReviewError, ReviewGate, ReviewModeration};
pub use service::{MarketStore, Marketplace};
pub use stats::{DailyRevenue, MarketplaceStats, OrderStats, ProductSales, SellerStats};
