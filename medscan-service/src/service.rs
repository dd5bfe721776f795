use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{sample::sample_analysis, store::BlobStore};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Room for the multipart boundaries and part headers around the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn error_response(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

fn bad_request_error(message: &str) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, message)
}

fn not_found_error(message: &str, blob_name: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "blob_name": blob_name
        })),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServiceConfig {
    /// `PORT` and `MEDSCAN_MAX_UPLOAD_BYTES`; unset or unparsable values keep
    /// the defaults.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            port: lookup("PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            max_upload_bytes: lookup("MEDSCAN_MAX_UPLOAD_BYTES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<BlobStore>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            store: Arc::new(BlobStore::new()),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub fn create_app(config: &ServiceConfig) -> Router {
    build_router(AppState::new(config))
}

pub fn build_router(app_state: AppState) -> Router {
    let body_limit = app_state.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/upload", post(upload_image))
        .route("/analyze", post(analyze_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "MedScan Prescription Analysis Service",
        "version": "1.0.0",
        "description": "Stores prescription images and returns a structured analysis",
        "endpoints": {
            "POST /upload": "Upload a prescription image (multipart field 'file')",
            "POST /analyze": "Analyze a stored image by blob_name",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn upload_image(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Value> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("image").to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        validate_content_type(&content_type)?;

        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.is_empty() {
            return Err(bad_request_error("Uploaded file is empty"));
        }
        if bytes.len() > state.max_upload_bytes {
            warn!(
                "Rejecting {}: {} bytes exceeds limit of {}",
                file_name,
                bytes.len(),
                state.max_upload_bytes
            );
            return Err(error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Uploaded file is too large",
            ));
        }

        let size = bytes.len();
        let blob_name = state.store.put(&file_name, &content_type, bytes);
        info!("Stored {} ({} bytes) as {}", file_name, size, blob_name);

        return Ok(Json(json!({
            "message": "File uploaded successfully",
            "blob_name": blob_name
        })));
    }

    Err(bad_request_error("No file uploaded"))
}

fn validate_content_type(content_type: &str) -> Result<(), ApiError> {
    if !content_type.starts_with("image/") {
        return Err(error_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Only image uploads are accepted",
        ));
    }
    Ok(())
}

fn multipart_error(e: MultipartError) -> ApiError {
    error!("Failed to read upload: {}", e);
    error_response(e.status(), &e.body_text())
}

#[derive(Debug, Deserialize)]
struct AnalyzeImageRequest {
    #[serde(default)]
    blob_name: Option<String>,
}

async fn analyze_image(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeImageRequest>,
) -> ApiResult<Value> {
    let blob_name = request
        .blob_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| bad_request_error("Missing blob_name in request."))?;

    let Some(blob) = state.store.get(&blob_name) else {
        return Err(not_found_error("No image stored under this name", &blob_name));
    };

    info!(
        "Analyzing {} ({}, {} bytes, uploaded {})",
        blob_name,
        blob.content_type,
        blob.bytes.len(),
        blob.uploaded_at.to_rfc3339()
    );

    let analysis = sample_analysis();
    serde_json::to_value(&analysis).map(Json).map_err(|e| {
        error!("Failed to encode analysis for {}: {}", blob_name, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Analysis failed.")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use medscan_client::{AnalysisResult, RiskLevel};
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn analyze_request(body: Value) -> Request<Body> {
        Request::post("/analyze")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn config_reads_port_and_limit() {
        let config = ServiceConfig::from_env_with(|key| match key {
            "PORT" => Some("9100".to_string()),
            "MEDSCAN_MAX_UPLOAD_BYTES" => Some("2048".to_string()),
            _ => None,
        });
        assert_eq!(config.port, 9100);
        assert_eq!(config.max_upload_bytes, 2048);

        let fallback = ServiceConfig::from_env_with(|_| Some("not a number".to_string()));
        assert_eq!(fallback, ServiceConfig::default());
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let app = create_app(&ServiceConfig::default());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn analyze_returns_sample_for_stored_blob() {
        let state = AppState::new(&ServiceConfig::default());
        let blob_name = state
            .store
            .put("rx.jpg", "image/jpeg", axum::body::Bytes::from_static(b"jpeg"));
        let app = build_router(state);

        let response = app
            .oneshot(analyze_request(json!({ "blob_name": blob_name })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let result: AnalysisResult = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(result.medicines.len(), 3);
        assert_eq!(result.interactions.len(), 1);
        assert_eq!(result.recommendations.len(), 5);
        assert_eq!(result.overall_risk, RiskLevel::Low);
    }

    #[tokio::test]
    async fn analyze_rejects_missing_and_unknown_names() {
        let app = create_app(&ServiceConfig::default());

        let missing = app.clone().oneshot(analyze_request(json!({}))).await.unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let unknown = app
            .oneshot(analyze_request(json!({ "blob_name": "prescription_0_rx.jpg" })))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(unknown).await["blob_name"], "prescription_0_rx.jpg");
    }
}
