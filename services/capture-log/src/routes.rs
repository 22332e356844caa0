use crate::capture::{capture_route, CaptureFile, CaptureWriter, CAPTURES_ROUTE};
use crate::config::{ApiConfig, StorageConfig};
use crate::detection_log::DetectionLogWriter;
use crate::error::IngestError;
use crate::provision::OutputDirs;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

/// Route prefix detection logs are served under
pub const LOGS_ROUTE: &str = "/logs";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub detection_log: Arc<DetectionLogWriter>,
    pub captures: Arc<CaptureWriter>,
}

impl AppState {
    /// Wire writers over already provisioned directories
    pub fn new(service_name: impl Into<String>, dirs: &OutputDirs) -> Self {
        Self {
            service_name: service_name.into(),
            detection_log: Arc::new(DetectionLogWriter::new(&dirs.logs_dir)),
            captures: Arc::new(CaptureWriter::new(&dirs.captures_dir)),
        }
    }
}

/// Detection log acknowledgement
#[derive(Debug, Serialize)]
pub struct LogDetectionResponse {
    pub ok: bool,
    /// Filesystem path of the written entry
    pub file: String,
}

/// Capture upload acknowledgement
#[derive(Debug, Serialize)]
pub struct UploadCaptureResponse {
    pub ok: bool,
    pub filename: String,
    /// Retrieval route, not a filesystem path
    pub path: String,
}

/// Parse a request body as untyped JSON.
///
/// Empty or whitespace-only bodies read as `{}`; anything else must be
/// well-formed JSON but may have any shape.
pub fn parse_json_body(raw: &[u8]) -> Result<Value, IngestError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(raw).map_err(IngestError::InvalidBody)
}

/// Parse an `application/x-www-form-urlencoded` body into a flat JSON object.
///
/// Every value is a string. A repeated key keeps its last value.
pub fn parse_form_body(raw: &[u8]) -> Result<Value, IngestError> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(raw).map_err(IngestError::InvalidForm)?;

    let fields: Map<String, Value> = pairs
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    Ok(Value::Object(fields))
}

/// Parse a request body by its declared content type; JSON unless it is a form
pub fn parse_body(headers: &HeaderMap, raw: &[u8]) -> Result<Value, IngestError> {
    if is_form(headers) {
        parse_form_body(raw)
    } else {
        parse_json_body(raw)
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig, storage: &StorageConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let captures_dir = ServeDir::new(state.captures.dir()).append_index_html_on_directories(false);
    let logs_dir = ServeDir::new(state.detection_log.dir()).append_index_html_on_directories(false);

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/log-detection", post(log_detection))
        .route("/upload-capture", post(upload_capture))
        .nest_service(CAPTURES_ROUTE, captures_dir)
        .nest_service(LOGS_ROUTE, logs_dir);

    if let Some(public_dir) = &storage.public_dir {
        let shell = ServeDir::new(public_dir)
            .fallback(ServeFile::new(public_dir.join("index.html")));
        router = router.fallback_service(shell);
    }

    router
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.service_name
    }))
}

/// Persist an arbitrary JSON payload as a detection log entry
#[instrument(skip(state, headers, body))]
async fn log_detection(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<LogDetectionResponse>, IngestError> {
    let payload = parse_body(&headers, &body?)?;
    let stored = state.detection_log.write(payload).await?;

    metrics::counter!("capture_log_detection_logs_written_total").increment(1);
    info!(file = %stored.path.display(), "Saved detection log");

    Ok(Json(LogDetectionResponse {
        ok: true,
        file: stored.path.display().to_string(),
    }))
}

/// Decode a data URL upload and persist it as a capture file
#[instrument(skip(state, headers, body))]
async fn upload_capture(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<UploadCaptureResponse>, IngestError> {
    let upload = parse_body(&headers, &body?)?;
    let capture = CaptureFile::from_upload(&upload)?;
    let stored = state.captures.write(capture).await?;

    metrics::counter!("capture_log_captures_written_total").increment(1);
    metrics::counter!("capture_log_capture_bytes_total").increment(stored.size_bytes as u64);
    info!(file = %stored.path.display(), "Saved capture");

    Ok(Json(UploadCaptureResponse {
        ok: true,
        path: capture_route(&stored.file_name),
        filename: stored.file_name,
    }))
}

/// Start the ingestion API server
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    storage: &StorageConfig,
) -> Result<()> {
    let router = create_router(state, config, storage);
    let addr = config.listen_addr();

    info!(address = %addr, "Starting capture log API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
