//! `market` entry point: connects, migrates and reports.

use tokio::signal;

use app::Config;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, shutting down");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

async fn run(config: Config) -> Result<(), app::AppError> {
    let metrics = app::telemetry::init_metrics()?;

    let store = app::connect(&config).await?;
    let market = app::marketplace(store);

    app::report(&market).await?;

    let Some(period) = config.report_interval else {
        tracing::debug!(metrics = %metrics.render(), "metrics snapshot");
        return Ok(());
    };

    tracing::info!(period_secs = period.as_secs(), "reporting until shutdown");
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately and the initial report already ran.
    ticker.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                if let Err(e) = app::report(&market).await {
                    tracing::warn!(error = %e, "marketplace report failed");
                }
                tracing::debug!(metrics = %metrics.render(), "metrics snapshot");
            }
        }
    }

    market.store().pool().close().await;
    tracing::info!("shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    app::telemetry::init_tracing(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "market failed");
        std::process::exit(1);
    }
}
