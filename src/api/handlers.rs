use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::contracts::{
    Counter, CounterSettings, InventoryStore, LabelError, LabelSettings, Part, SerialRecord,
    StorageError,
};
use crate::metrics::Metrics;
use crate::service::{
    csv_template, format_serial, parse_scan_input, parse_upc_csv, render_label, validate_pair,
    Allocator, BatchCoordinator, BatchResult, CounterDefaults, CounterStore, ImportSummary,
    LabelData, PartCatalog, PartSummary, ScanPair,
};

/// Application state shared across handlers.
pub struct AppState<S: InventoryStore> {
    pub counters: CounterStore<S>,
    pub allocator: Allocator<S>,
    pub batch: BatchCoordinator<S>,
    pub catalog: PartCatalog<S>,
    pub metrics: Arc<Metrics>,
}

impl<S: InventoryStore> AppState<S> {
    pub fn new(store: Arc<S>, defaults: CounterDefaults, metrics: Arc<Metrics>) -> Self {
        let counters = CounterStore::new(Arc::clone(&store), defaults);
        let allocator = Allocator::new(counters.clone());
        Self {
            batch: BatchCoordinator::new(allocator.clone()),
            catalog: PartCatalog::new(store),
            counters,
            allocator,
            metrics,
        }
    }
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    Label(LabelError),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, error) = match self {
            ApiError::Label(e) => {
                let (status, code) = match &e {
                    LabelError::InvalidQuantity(_) => {
                        (StatusCode::BAD_REQUEST, "INVALID_QUANTITY")
                    }
                    LabelError::InvalidPartNumber => {
                        (StatusCode::BAD_REQUEST, "INVALID_PART_NUMBER")
                    }
                    LabelError::MalformedInput(_) => (StatusCode::BAD_REQUEST, "MALFORMED_INPUT"),
                    LabelError::InvalidSettings(_) => {
                        (StatusCode::BAD_REQUEST, "INVALID_SETTINGS")
                    }
                    LabelError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    LabelError::InitializationConflict => {
                        (StatusCode::CONFLICT, "INITIALIZATION_CONFLICT")
                    }
                    LabelError::PartInUse(_) => (StatusCode::CONFLICT, "PART_IN_USE"),
                    LabelError::Storage(StorageError::DuplicateSerial(_)) => {
                        (StatusCode::CONFLICT, "DUPLICATE_SERIAL")
                    }
                    LabelError::SerialOverflow { .. } => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "SERIAL_OVERFLOW")
                    }
                    LabelError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
                };
                (status, code, e.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.into(),
            }),
        )
            .into_response()
    }
}

impl From<LabelError> for ApiError {
    fn from(e: LabelError) -> Self {
        ApiError::Label(e)
    }
}

/// Runs store work on the blocking pool. Allocations wait on the counter
/// lock and sync the WAL, neither of which may stall the async runtime.
async fn run_blocking<S, T, F>(state: &Arc<AppState<S>>, f: F) -> Result<T, ApiError>
where
    S: InventoryStore + 'static,
    T: Send + 'static,
    F: FnOnce(&AppState<S>) -> Result<T, LabelError> + Send + 'static,
{
    let task_state = Arc::clone(state);
    let result = tokio::task::spawn_blocking(move || f(&task_state))
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {}", e)))
        .and_then(|r| r.map_err(ApiError::from));

    if let Err(e) = &result {
        state.metrics.record_error();
        if let ApiError::Label(label) = e {
            if !label.is_expected() {
                tracing::error!(error = %label, "Request failed");
            }
        }
    }
    result
}

fn elapsed_us(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

/// A quantity as sent by scanners and forms: a JSON number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawQuantity {
    Number(i64),
    Text(String),
}

impl Default for RawQuantity {
    fn default() -> Self {
        RawQuantity::Text(String::new())
    }
}

impl RawQuantity {
    fn as_text(&self) -> String {
        match self {
            RawQuantity::Number(n) => n.to_string(),
            RawQuantity::Text(s) => s.clone(),
        }
    }
}

/// One part/quantity pair as submitted.
#[derive(Debug, Clone, Deserialize)]
pub struct PairRequest {
    #[serde(default)]
    pub part_number: String,
    #[serde(default)]
    pub quantity: RawQuantity,
}

impl PairRequest {
    fn validate(&self) -> ScanPair {
        validate_pair(&self.part_number, &self.quantity.as_text())
    }
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy"
    }))
}

/// GET /metrics
/// Returns metrics in Prometheus text exposition format.
pub async fn metrics<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let next_serial = match state.counters.store().counter() {
        Ok(counter) => counter.map(|c| c.current_serial),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read counter for metrics");
            None
        }
    };

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.format_prometheus(next_serial),
    )
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub serial_start: u64,
    pub serial_digits: usize,
    pub current_serial: u64,
    /// `current_serial` as it will be printed.
    pub next_serial: String,
}

impl From<&Counter> for ConfigResponse {
    fn from(counter: &Counter) -> Self {
        Self {
            serial_start: counter.serial_start,
            serial_digits: counter.serial_digits,
            current_serial: counter.current_serial,
            next_serial: format_serial(counter.current_serial, counter.serial_digits),
        }
    }
}

/// GET /config
pub async fn get_config<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ConfigResponse>, ApiError> {
    let counter = run_blocking(&state, |s| s.counters.get_or_init()).await?;
    Ok(Json(ConfigResponse::from(&counter)))
}

/// PUT /config
pub async fn update_config<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(settings): Json<CounterSettings>,
) -> Result<Json<ConfigResponse>, ApiError> {
    let counter = run_blocking(&state, move |s| s.counters.update_settings(&settings)).await?;
    tracing::info!(
        serial_digits = counter.serial_digits,
        current_serial = counter.current_serial,
        "Updated counter settings"
    );
    Ok(Json(ConfigResponse::from(&counter)))
}

/// GET /config/labels
pub async fn get_label_settings<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<LabelSettings>, ApiError> {
    let counter = run_blocking(&state, |s| s.counters.get_or_init()).await?;
    Ok(Json(counter.labels))
}

/// PUT /config/labels
pub async fn update_label_settings<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(labels): Json<LabelSettings>,
) -> Result<Json<LabelSettings>, ApiError> {
    let counter = run_blocking(&state, move |s| s.counters.update_labels(labels)).await?;
    Ok(Json(counter.labels))
}

#[derive(Debug, Serialize)]
pub struct AllocateResponse {
    pub part_number: String,
    pub quantity: u64,
    pub serial_range: String,
    pub first: String,
    pub last: String,
    pub serials: Vec<String>,
    pub upc: Option<String>,
}

/// POST /api/allocate
/// Allocates one block of serials for a part.
pub async fn allocate<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<PairRequest>,
) -> Result<Json<AllocateResponse>, ApiError> {
    let pair = request.validate();
    if !pair.valid {
        state.metrics.record_error();
        return Err(ApiError::BadRequest(
            pair.error.unwrap_or_else(|| "Invalid input".into()),
        ));
    }
    let quantity = pair.quantity.unwrap_or(0);

    let start = Instant::now();
    let allocation = run_blocking(&state, move |s| {
        s.allocator.allocate(&pair.part_number, quantity)
    })
    .await?;
    state.metrics.record_allocation(&allocation, elapsed_us(start));

    Ok(Json(AllocateResponse {
        serial_range: allocation.range(),
        part_number: allocation.part.part_number,
        quantity: allocation.quantity,
        first: allocation.first,
        last: allocation.last,
        serials: allocation.serials,
        upc: allocation.upc,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BulkScanRequest {
    #[serde(default)]
    pub pairs: Vec<PairRequest>,
}

async fn run_batch<S: InventoryStore + 'static>(
    state: &Arc<AppState<S>>,
    pairs: Vec<ScanPair>,
) -> Result<Json<BatchResult>, ApiError> {
    let start = Instant::now();
    let result = run_blocking(state, move |s| s.batch.process_batch(&pairs)).await?;
    state.metrics.record_batch(&result, elapsed_us(start));
    Ok(Json(result))
}

/// POST /api/process-bulk-scans
/// Validates each submitted pair and runs the batch.
pub async fn process_bulk_scans<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<BulkScanRequest>,
) -> Result<Json<BatchResult>, ApiError> {
    let pairs = request.pairs.iter().map(PairRequest::validate).collect();
    run_batch(&state, pairs).await
}

/// POST /api/scans
/// Accepts raw scanner text, one scan per line.
pub async fn process_scan_text<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: String,
) -> Result<Json<BatchResult>, ApiError> {
    let pairs = parse_scan_input(&body).map_err(|e| {
        state.metrics.record_error();
        ApiError::from(e)
    })?;
    run_batch(&state, pairs).await
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    #[serde(default)]
    pub serial: String,
}

#[derive(Debug, Serialize)]
pub struct SerialResponse {
    pub serial_number: String,
    pub part_number: String,
    pub upc: Option<String>,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl From<SerialRecord> for SerialResponse {
    fn from(record: SerialRecord) -> Self {
        let created_at = Utc
            .timestamp_millis_opt(record.created_at_ms)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        Self {
            serial_number: record.serial_number,
            part_number: record.part_number,
            upc: record.upc,
            created_at,
        }
    }
}

/// GET /api/lookup-serial?serial=000500
pub async fn lookup_serial<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<SerialResponse>, ApiError> {
    state.metrics.record_lookup();
    let record = run_blocking(&state, move |s| s.catalog.lookup_serial(&query.serial)).await?;
    Ok(Json(SerialResponse::from(record)))
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub enum LabelKind {
    #[default]
    #[serde(rename = "serial")]
    Serial,
    #[serde(rename = "box")]
    Carton,
}

#[derive(Debug, Deserialize)]
pub struct LabelQuery {
    #[serde(default)]
    pub kind: LabelKind,
}

/// GET /api/labels/:serial?kind=serial|box
/// Returns the ZPL for an issued serial, for reprinting.
pub async fn serial_label<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(serial): Path<String>,
    Query(query): Query<LabelQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let zpl = run_blocking(&state, move |s| {
        let record = s.catalog.lookup_serial(&serial)?;
        let labels = s.counters.get_or_init()?.labels;
        let template = match query.kind {
            LabelKind::Serial => &labels.serial_label,
            LabelKind::Carton => &labels.box_label,
        };
        Ok(render_label(&template.zpl, &LabelData::from(&record)))
    })
    .await?;

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], zpl))
}

/// GET /parts
pub async fn list_parts<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<PartSummary>>, ApiError> {
    let parts = run_blocking(&state, |s| s.catalog.list_parts()).await?;
    Ok(Json(parts))
}

#[derive(Debug, Deserialize)]
pub struct UpcRequest {
    pub upc: Option<String>,
}

/// PUT /parts/:part/upc
/// Sets or clears a part's UPC; serials already issued keep theirs.
pub async fn set_upc<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(part_number): Path<String>,
    Json(request): Json<UpcRequest>,
) -> Result<Json<Part>, ApiError> {
    let part = run_blocking(&state, move |s| {
        s.catalog.set_upc(&part_number, request.upc.as_deref())
    })
    .await?;
    Ok(Json(part))
}

/// DELETE /parts/:part
pub async fn delete_part<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(part_number): Path<String>,
) -> Result<StatusCode, ApiError> {
    run_blocking(&state, move |s| s.catalog.delete_part(&part_number)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct UploadCsvResponse {
    #[serde(flatten)]
    pub summary: ImportSummary,
    pub errors: Vec<String>,
}

/// POST /api/admin-upload-csv
/// Imports `part,upc` rows from a CSV body. Bad rows are reported and skipped.
pub async fn upload_csv<S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: String,
) -> Result<Json<UploadCsvResponse>, ApiError> {
    let import = parse_upc_csv(&body);
    if !import.errors.is_empty() {
        tracing::warn!(rejected = import.errors.len(), "CSV rows rejected");
    }

    let rows = import.rows;
    let summary = run_blocking(&state, move |s| s.catalog.import_upcs(&rows)).await?;
    state.metrics.record_import();

    Ok(Json(UploadCsvResponse {
        summary,
        errors: import.errors,
    }))
}

/// GET /admin-download-template
pub async fn download_template() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"upc_template.csv\"",
            ),
        ],
        csv_template(),
    )
}
