use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use labelgen::api::{start_server, AppState, ServerConfig};
use labelgen::metrics::Metrics;
use labelgen::service::{format_serial, CounterDefaults, CounterStore};
use labelgen::storage::{RocksDbStore, StoreOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("labelgen=info".parse()?))
        .init();

    tracing::info!("labelgen starting...");

    let data_dir = std::env::var("LABELGEN_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let options = StoreOptions::from_env();
    let store = Arc::new(RocksDbStore::open_with_options(&data_dir, options.clone())?);
    tracing::info!(sync_writes = options.sync_writes, "Opened RocksDB at {}", data_dir);

    // Defaults only apply to a fresh store; an existing counter is kept.
    let defaults = CounterDefaults::from_env();
    let counter = CounterStore::new(Arc::clone(&store), defaults.clone()).get_or_init()?;
    tracing::info!(
        next_serial = %format_serial(counter.current_serial, counter.serial_digits),
        serial_digits = counter.serial_digits,
        "Serial counter ready"
    );

    let state = Arc::new(AppState::new(store, defaults, Arc::new(Metrics::new())));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
    };

    start_server(ServerConfig::from_env(), state, shutdown).await?;

    tracing::info!("labelgen stopped");
    Ok(())
}
