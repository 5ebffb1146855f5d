//! HTTP Server for the DataFlex API.
//!
//! Every request maps to one pipeline function over a held session table.
//!
//! # API Endpoints
//!
//! | Method | Path                        | Description                        |
//! |--------|-----------------------------|------------------------------------|
//! | GET    | `/health`                   | Health check                       |
//! | POST   | `/api/upload`               | Upload CSV/XLSX files (multipart)  |
//! | GET    | `/api/files`                | List open file sessions            |
//! | GET    | `/api/files/{id}`           | Session details and preview        |
//! | DELETE | `/api/files/{id}`           | Close a session                    |
//! | POST   | `/api/files/{id}/clean`     | Remove duplicates / fill missing   |
//! | PUT    | `/api/files/{id}/columns`   | Select columns                     |
//! | GET    | `/api/files/{id}/chart`     | Chart series of numeric columns    |
//! | GET    | `/api/files/{id}/convert`   | Download as `?format=csv\|xlsx`    |
//! | GET    | `/api/logs`                 | SSE stream for real-time logs      |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post, put},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_error, log_info, log_warning, LOG_BROADCASTER};
use super::types::{
    error_response, ChartResponse, CleanRequest, CleanResponse, ColumnsRequest, ConvertQuery,
    FileDetails, FileOutcomeResponse, UploadResponse,
};
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::models::UploadedFile;
use crate::parser::ParseOptions;
use crate::session::{SessionInfo, SessionLimits, SessionStore};

/// Default listening port
pub const DEFAULT_PORT: u16 = 3000;

/// Default upload limit, in megabytes
pub const DEFAULT_MAX_UPLOAD_MB: usize = 200;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
    /// Rows shown in previews
    pub preview_rows: usize,
    pub parse: ParseOptions,
    pub sessions: SessionLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            preview_rows: 5,
            parse: ParseOptions::default(),
            sessions: SessionLimits::default(),
        }
    }
}

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            sessions: SessionStore::with_limits(config.sessions),
            config: Arc::new(config),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/upload", post(upload_files))
        .route("/api/files", get(list_files))
        .route("/api/files/{id}", get(file_details).delete(close_file))
        .route("/api/files/{id}/clean", post(clean_file))
        .route("/api/files/{id}/columns", put(select_columns))
        .route("/api/files/{id}/chart", get(chart_file))
        .route("/api/files/{id}/convert", get(convert_file))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(limit))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let limit_mb = config.max_upload_bytes / (1024 * 1024);
    let app = router(AppState::new(config));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 DataFlex server running on http://localhost:{}", port);
    println!("   POST /api/upload            - Upload CSV/XLSX files (max {} MB)", limit_mb);
    println!("   GET  /api/files             - Open file sessions");
    println!("   GET  /api/files/{{id}}/convert - Download as CSV or Excel");
    println!("   GET  /api/logs              - SSE log stream");
    println!("   GET  /health                - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// =============================================================================
// Error responses
// =============================================================================

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Pipeline(e) => match e {
                PipelineError::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                PipelineError::ParseFailure { .. } | PipelineError::EmptyTable(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                PipelineError::ColumnNotFound(_) | PipelineError::Table(_) => StatusCode::BAD_REQUEST,
                PipelineError::SerializeFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log_error(format!("❌ {}", self));
        }
        (status, Json(error_response(&self.to_string()))).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "dataflex",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /api/upload",
            "files": "GET /api/files",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming, replaying recent history first
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();
    let history = tokio_stream::iter(LOG_BROADCASTER.recent());
    let live = BroadcastStream::new(rx).filter_map(|result| result.ok());

    let stream = history.chain(live).filter_map(|entry| {
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload endpoint: every multipart field carrying a file name is a file
async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ServerResult<Json<UploadResponse>> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
        files.push(UploadedFile::new(file_name, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(ServerError::BadRequest("No file provided".into()));
    }

    Ok(Json(ingest_upload(&state, &files).await))
}

/// Open a session per file. A failing file is reported and skipped.
pub async fn ingest_upload(state: &AppState, files: &[UploadedFile]) -> UploadResponse {
    println!("\n{}", "=".repeat(70));
    println!("📄 NEW UPLOAD: {} file(s)", files.len());
    println!("{}\n", "=".repeat(70));

    let mut outcomes = Vec::with_capacity(files.len());
    for file in files {
        let opened = state
            .sessions
            .open(file, &state.config.parse, state.config.preview_rows)
            .await;
        let outcome = match opened {
            Ok((session, preview)) => FileOutcomeResponse::opened(session, preview),
            Err(e) => {
                if e.is_warning() {
                    log_warning(format!("⚠ {}", e));
                } else {
                    log_error(format!("❌ {}", e));
                }
                FileOutcomeResponse::failed(&file.name, &e)
            }
        };
        outcomes.push(outcome);
    }

    let response = UploadResponse::new(outcomes);
    log_info(format!(
        "🎉 Upload done: {} opened, {} skipped",
        response.summary.succeeded, response.summary.failed
    ));
    response
}

async fn list_files(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.sessions.list().await)
}

async fn file_details(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ServerResult<Json<FileDetails>> {
    let session = state.sessions.get(id).await?;
    let preview = state.sessions.preview(id, state.config.preview_rows).await?;
    Ok(Json(FileDetails { session, preview }))
}

async fn close_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ServerResult<Json<SessionInfo>> {
    Ok(Json(state.sessions.remove(id).await?))
}

async fn clean_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(options): Json<CleanRequest>,
) -> ServerResult<Json<CleanResponse>> {
    let report = state.sessions.clean(id, options).await?;
    let session = state.sessions.get(id).await?;
    let preview = state.sessions.preview(id, state.config.preview_rows).await?;
    Ok(Json(CleanResponse {
        report,
        session,
        preview,
    }))
}

async fn select_columns(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ColumnsRequest>,
) -> ServerResult<Json<FileDetails>> {
    if request.columns.is_empty() {
        return Err(ServerError::BadRequest("Select at least one column".into()));
    }
    let session = state.sessions.select_columns(id, request.columns).await?;
    let preview = state.sessions.preview(id, state.config.preview_rows).await?;
    Ok(Json(FileDetails { session, preview }))
}

async fn chart_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ServerResult<Json<ChartResponse>> {
    Ok(Json(state.sessions.chart(id).await?.into()))
}

async fn convert_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ConvertQuery>,
) -> ServerResult<Response> {
    let result = state.sessions.convert(id, query.format).await?;
    log_info(format!("📥 {} ready for download ({} bytes)", result.filename, result.bytes.len()));

    let disposition = format!("attachment; filename=\"{}\"", result.filename.replace('"', "'"));
    Ok((
        [
            (header::CONTENT_TYPE, result.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        result.bytes,
    )
        .into_response())
}
