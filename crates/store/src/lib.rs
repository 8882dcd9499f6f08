//! Storage layer for the marketplace order core.
//!
//! The traits in [`store`] are the narrow ports the domain consumes. Every
//! mutating method is atomic: it either applies all of its changes or none.
//! [`InMemoryStore`] backs the tests; [`PostgresStore`] is the production
//! adapter.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, NotificationRecord};
pub use postgres::PostgresStore;
pub use query::OrderQuery;
pub use store::{
    CartStore, NotificationSink, OrderRepository, ProductCatalog, RatingUpdate, ReviewRepository,
    StatusChange, StockMovement, UserDirectory,
};
