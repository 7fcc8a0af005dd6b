//! Work ticker demo
//!
//! Polls a simulated order source, processes orders on a small pool and
//! prints every reported error. Stop with Ctrl-C.
//!
//! Configure via environment variables (or a `.env` file):
//! - `WORKTICKER_*`: pool settings, see `PoolConfig::from_env`
//! - `RUST_LOG` or `LOG_LEVEL`: log filter (default: "workticker=debug,ticker_demo=info")
//! - `LOG_FORMAT=json`: JSON log lines
//!
//! Run with: cargo run -p workticker --example ticker_demo

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use workticker::prelude::*;
use workticker::telemetry::{init_telemetry, TelemetryConfig};

/// Orders with an id divisible by this fail to process
const POISON_EVERY: u64 = 7;

/// The source runs dry after this many orders
const TOTAL_ORDERS: u64 = 40;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut telemetry_config = TelemetryConfig::from_env();
    telemetry_config.service_name = "ticker-demo".to_string();
    if telemetry_config.log_filter.is_none() {
        telemetry_config.log_filter = Some("workticker=debug,ticker_demo=info".to_string());
    }
    init_telemetry(telemetry_config).context("Failed to initialize telemetry")?;

    let config = PoolConfig::from_env()
        .context("Invalid WORKTICKER_* configuration")?
        .with_name("orders");

    tracing::info!(
        num_workers = config.num_workers,
        rate_limit_per_second = config.rate_limit_per_second,
        tick_ms = config.tick_frequency.as_millis() as u64,
        "Starting ticker demo"
    );

    let (errors_tx, mut errors_rx) = tokio::sync::mpsc::channel(64);
    let pool = Arc::new(WorkTicker::<u64>::new(config).with_error_channel(errors_tx));

    let next_order = Arc::new(AtomicU64::new(1));
    pool.add_work_configuration(WorkConfiguration::new(
        work_retriever(move |handler| {
            let next_order = Arc::clone(&next_order);
            async move {
                let order_id = next_order.fetch_add(1, Ordering::Relaxed);
                if order_id > TOTAL_ORDERS {
                    return Err(RetrieveError::NoWorkAvailable);
                }
                Ok(WorkItem::new(order_id, handler))
            }
        }),
        work_handler(|worker_id, order_id: u64, limiter| async move {
            // Two rate-limited "API calls" per order
            limiter.take().await;
            tokio::time::sleep(Duration::from_millis(150)).await;
            limiter.take().await;

            if order_id % POISON_EVERY == 0 {
                anyhow::bail!("order {order_id} was rejected by the payment provider");
            }

            tracing::info!(worker_id, order_id, "Order processed");
            Ok(())
        }),
    ))?;

    // Resubmit anything the dispatcher could not place in time
    let submitter = pool.submitter();
    let error_drain = tokio::spawn(async move {
        while let Some(err) = errors_rx.recv().await {
            match err {
                WorkError::NoAvailableWorkers { item, .. } => {
                    tracing::warn!(order_id = item.data, "No worker available, resubmitting");
                    if let Err(e) = submitter.submit(item).await {
                        tracing::warn!(error = %e, "Could not resubmit order");
                    }
                }
                other => tracing::error!(error = %other, "Work error"),
            }
        }
    });

    let cancel = CancellationToken::new();
    let running = tokio::spawn({
        let pool = Arc::clone(&pool);
        let cancel = cancel.clone();
        async move { pool.run(cancel).await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Received shutdown signal");
    cancel.cancel();

    running.await.context("Work ticker task panicked")??;
    error_drain.abort();

    let stats = pool.stats();
    tracing::info!(
        stats = %serde_json::to_string(&stats)?,
        "Ticker demo stopped"
    );
    Ok(())
}
