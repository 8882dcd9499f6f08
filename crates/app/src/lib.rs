//! Process wiring for the marketplace order core.
//!
//! Builds a [`Marketplace`] over Postgres from [`Config`] and produces the
//! periodic marketplace report logged by the `market` binary.

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{Config, LogFormat};
pub use error::AppError;

use domain::{MarketStore, Marketplace, MarketplaceStats};
use sqlx::postgres::PgPoolOptions;
use store::{NotificationSink, PostgresStore};

/// The production marketplace: one Postgres store for every port.
pub type PgMarketplace = Marketplace<PostgresStore, PostgresStore>;

/// Connects to Postgres and applies pending migrations.
#[tracing::instrument(skip(config), fields(max_connections = config.max_connections))]
pub async fn connect(config: &Config) -> Result<PostgresStore, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    let store = PostgresStore::new(pool);
    store.run_migrations().await?;
    tracing::info!("database migrations applied");

    Ok(store)
}

/// Creates the marketplace over a connected store.
pub fn marketplace(store: PostgresStore) -> PgMarketplace {
    Marketplace::new(store.clone(), store)
}

/// Computes the marketplace statistics, logs them and publishes gauges.
pub async fn report<S, N>(market: &Marketplace<S, N>) -> Result<MarketplaceStats, AppError>
where
    S: MarketStore,
    N: NotificationSink,
{
    let stats = market.marketplace_stats().await?;

    metrics::gauge!("marketplace_gmv_cents").set(stats.gmv.cents() as f64);
    metrics::gauge!("marketplace_open_disputes").set(stats.open_disputes as f64);
    for (status, count) in &stats.orders_by_status {
        metrics::gauge!("marketplace_orders", "status" => status.as_str()).set(*count as f64);
    }

    tracing::info!(
        gmv = %stats.gmv,
        open_disputes = stats.open_disputes,
        total_orders = stats.total_orders(),
        "marketplace report"
    );
    for (status, count) in &stats.orders_by_status {
        tracing::debug!(status = status.as_str(), count, "orders by status");
    }

    Ok(stats)
}
