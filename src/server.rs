//! HTTP front end: upload a PDF, get the dark-mode PDF back.
//!
//! The router is built by [`build_router`] so integration tests can drive it
//! with `tower::ServiceExt::oneshot` exactly as production serves it.
//!
//! | Route | Method | Response |
//! |-------|--------|----------|
//! | `/convert` | POST (multipart, field `pdf`) | `application/pdf` attachment |
//! | `/health`  | GET | `OK` |
//! | anything else | GET | static files from [`ServerConfig::static_dir`] |

use crate::config::InversionConfig;
use crate::convert::invert_bytes_with;
use crate::error::ApiError;
use crate::pipeline::assemble::{LopdfWriter, OutputWriter};
use crate::pipeline::rasterize::Rasterizer;
use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};

/// Multipart field carrying the uploaded PDF.
pub const UPLOAD_FIELD: &str = "pdf";

/// File name suggested to the client for the converted document.
pub const OUTPUT_FILENAME: &str = "dark_mode.pdf";

/// Default request body ceiling (64 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub rasterizer: Arc<dyn Rasterizer>,
    pub writer: Arc<dyn OutputWriter>,
    pub config: InversionConfig,
}

impl AppState {
    /// State with the lopdf writer configured from `config`.
    pub fn new(rasterizer: Arc<dyn Rasterizer>, config: InversionConfig) -> Self {
        let writer: Arc<dyn OutputWriter> = Arc::new(LopdfWriter::new(config.compress_output));
        Self {
            rasterizer,
            writer,
            config,
        }
    }

    pub fn with_writer(mut self, writer: Arc<dyn OutputWriter>) -> Self {
        self.writer = writer;
        self
    }
}

/// Listener and routing settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Served for every path that is not an API route, when it exists.
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            static_dir: PathBuf::from("public"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Build the router with all endpoints and middleware.
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/convert", post(handle_convert))
        .route("/health", get(|| async { "OK" }))
        .with_state(state);

    if server.static_dir.is_dir() {
        debug!("Serving static files from {}", server.static_dir.display());
        router = router.fallback_service(ServeDir::new(&server.static_dir));
    } else {
        debug!(
            "Static directory {} not found, static files disabled",
            server.static_dir.display()
        );
    }

    router
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
}

/// Bind `server.bind` and serve until Ctrl-C.
pub async fn serve(state: AppState, server: &ServerConfig) -> std::io::Result<()> {
    let app = build_router(state, server);
    let listener = tokio::net::TcpListener::bind(server.bind).await?;
    info!(addr = %server.bind, "darkpdf server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn handle_convert(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::InvalidUpload(e.body_text()))?;

    let (file_name, bytes) = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::InvalidUpload(e.body_text()))?;
        let Some(field) = field else {
            return Err(ApiError::MissingUpload);
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(ApiError::InvalidUpload("empty filename".into()));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidUpload(e.body_text()))?;
        break (file_name, bytes);
    };

    info!("Converting upload '{}' ({} bytes)", file_name, bytes.len());
    let output = invert_bytes_with(
        Arc::clone(&state.rasterizer),
        Arc::clone(&state.writer),
        &bytes,
        &state.config,
    )
    .await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={OUTPUT_FILENAME}"),
        )
        .body(Body::from(output.pdf))
        .map_err(|e| ApiError::Internal(e.to_string()))
}
