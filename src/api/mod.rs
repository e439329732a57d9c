mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use crate::contracts::InventoryStore;

pub use handlers::{
    AllocateResponse, ApiError, AppState, BulkScanRequest, ConfigResponse, ErrorResponse,
    PairRequest, RawQuantity, SerialResponse, UploadCsvResponse,
};

/// Creates the API router.
pub fn create_router<S: InventoryStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics::<S>))
        // Counter and label settings
        .route(
            "/config",
            get(handlers::get_config::<S>).put(handlers::update_config::<S>),
        )
        .route(
            "/config/labels",
            get(handlers::get_label_settings::<S>).put(handlers::update_label_settings::<S>),
        )
        // Allocation
        .route("/api/allocate", post(handlers::allocate::<S>))
        .route(
            "/api/process-bulk-scans",
            post(handlers::process_bulk_scans::<S>),
        )
        .route("/api/scans", post(handlers::process_scan_text::<S>))
        // Lookup and reprint
        .route("/api/lookup-serial", get(handlers::lookup_serial::<S>))
        .route("/api/labels/:serial", get(handlers::serial_label::<S>))
        // Part and UPC management
        .route("/parts", get(handlers::list_parts::<S>))
        .route("/parts/:part/upc", put(handlers::set_upc::<S>))
        .route(
            "/parts/:part",
            axum::routing::delete(handlers::delete_part::<S>),
        )
        .route("/api/admin-upload-csv", post(handlers::upload_csv::<S>))
        .route(
            "/admin-download-template",
            get(handlers::download_template),
        )
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    /// Reads `LABELGEN_HOST` and `LABELGEN_PORT`, falling back to the defaults.
    pub fn from_env() -> Self {
        let default = Self::default();

        let host = std::env::var("LABELGEN_HOST").unwrap_or(default.host);
        let port = std::env::var("LABELGEN_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.port);

        Self { host, port }
    }
}

/// Starts the HTTP server.
pub async fn start_server<S, F>(
    config: ServerConfig,
    state: Arc<AppState<S>>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: InventoryStore + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
