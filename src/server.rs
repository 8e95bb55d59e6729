//! HTTP surface: `POST /api/v1/upload` and friends.
//!
//! The handler decodes a multipart body into a [`RawBatch`], binds it, runs
//! the batch and answers with the correlated records:
//!
//! ```text
//! multipart ──FormCollector──▶ RawBatch ──bind──▶ requests ──Coordinator──▶ BatchResult
//!                                                                              │
//!                          200 {"convertedImageData": [...]} ◀──correlate──────┘
//! ```
//!
//! ## Form fields
//!
//! | Part | Meaning |
//! |---|---|
//! | `files` (repeated) | image payloads, in order |
//! | `formats[i]` `widths[i]` `heights[i]` `fits[i]` `strips[i]` | parameters of file `i` |
//!
//! Un-indexed names (`formats`, `formats[]`) are appended in arrival order.
//! A list must use one style or the other; duplicate or sparse indices make
//! the batch malformed.
//!
//! ## Status codes
//!
//! | Case | Status |
//! |---|---|
//! | batch ran (even if every file failed) | 200 |
//! | malformed batch or multipart body | 400 (413 when the body is too large) |
//! | request deadline expired | 504 |

use crate::batch::{BatchError, Coordinator};
use crate::binder::{BindError, BindLimits, RawBatch, bind};
use crate::config::{AppConfig, StorageBackend};
use crate::correlate::{UploadResponse, correlate};
use crate::types::UploadedFile;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{debug, error, info, instrument, warn};

/// Extra room in the body limit for multipart framing and text parts.
const BODY_SLACK: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Batch(#[from] BatchError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Bind(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ServerError::Multipart(e) => (e.status(), e.body_text()),
            ServerError::Timeout(_) => {
                warn!(error = %self, "upload deadline expired");
                (StatusCode::GATEWAY_TIMEOUT, self.to_string())
            }
            ServerError::Batch(e) => {
                error!(error = %e, "batch did not complete");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// Shared handler state.
pub struct AppState {
    pub coordinator: Coordinator,
    pub limits: BindLimits,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(coordinator: Coordinator, config: &AppConfig) -> Self {
        Self {
            coordinator,
            limits: BindLimits::from_config(&config.limits),
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
        }
    }
}

// ============================================================================
// Form decoding
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListField {
    Formats,
    Widths,
    Heights,
    Fits,
    Strips,
}

impl ListField {
    const ALL: [ListField; 5] = [
        ListField::Formats,
        ListField::Widths,
        ListField::Heights,
        ListField::Fits,
        ListField::Strips,
    ];

    fn from_base(base: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == base)
    }

    fn name(self) -> &'static str {
        match self {
            Self::Formats => "formats",
            Self::Widths => "widths",
            Self::Heights => "heights",
            Self::Fits => "fits",
            Self::Strips => "strips",
        }
    }
}

/// Split `formats[3]` into `("formats", Some(3))`; `formats` and `formats[]`
/// have no index.
fn split_field_name(name: &str) -> Result<(&str, Option<usize>), BindError> {
    let Some((base, rest)) = name.split_once('[') else {
        return Ok((name, None));
    };
    let inner = rest
        .strip_suffix(']')
        .ok_or_else(|| BindError::MalformedBatch(format!("bad field name '{name}'")))?;
    if inner.is_empty() {
        return Ok((base, None));
    }
    inner
        .parse::<usize>()
        .map(|i| (base, Some(i)))
        .map_err(|_| BindError::MalformedBatch(format!("bad index in field '{name}'")))
}

#[derive(Debug, Default)]
struct ListValues {
    indexed: BTreeMap<usize, String>,
    appended: Vec<String>,
}

impl ListValues {
    fn insert(&mut self, field: ListField, index: Option<usize>, value: String) -> Result<(), BindError> {
        match index {
            None => self.appended.push(value),
            Some(i) => {
                if self.indexed.insert(i, value).is_some() {
                    return Err(BindError::MalformedBatch(format!(
                        "{}[{i}] given more than once",
                        field.name()
                    )));
                }
            }
        }
        Ok(())
    }

    fn finish(self, field: ListField) -> Result<Vec<String>, BindError> {
        if self.indexed.is_empty() {
            return Ok(self.appended);
        }
        if !self.appended.is_empty() {
            return Err(BindError::MalformedBatch(format!(
                "{} mixes indexed and plain entries",
                field.name()
            )));
        }
        let len = self.indexed.len();
        if let Some((&last, _)) = self.indexed.last_key_value() {
            if last + 1 != len {
                return Err(BindError::MalformedBatch(format!(
                    "{} has gaps in its indices",
                    field.name()
                )));
            }
        }
        Ok(self.indexed.into_values().collect())
    }
}

/// Accumulates multipart parts into a [`RawBatch`].
#[derive(Debug, Default)]
pub struct FormCollector {
    files: Vec<UploadedFile>,
    lists: [ListValues; 5],
}

impl FormCollector {
    pub fn add_file(&mut self, file: UploadedFile) {
        self.files.push(file);
    }

    /// Record a text part. Unknown field names are ignored.
    pub fn add_text(&mut self, name: &str, value: String) -> Result<(), BindError> {
        let (base, index) = split_field_name(name)?;
        match ListField::from_base(base) {
            Some(field) => self.lists[field as usize].insert(field, index, value),
            None => {
                debug!(field = name, "ignoring unknown form field");
                Ok(())
            }
        }
    }

    pub fn finish(self) -> Result<RawBatch, BindError> {
        let [formats, widths, heights, fits, strips] = self.lists;
        Ok(RawBatch {
            files: self.files,
            formats: formats.finish(ListField::Formats)?,
            widths: widths.finish(ListField::Widths)?,
            heights: heights.finish(ListField::Heights)?,
            fits: fits.finish(ListField::Fits)?,
            strips: strips.finish(ListField::Strips)?,
        })
    }
}

fn is_file_field(name: &str) -> bool {
    matches!(name, "files" | "files[]" | "file")
}

async fn read_form(mut multipart: Multipart) -> Result<RawBatch, ServerError> {
    let mut form = FormCollector::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if is_file_field(&name) {
            let original_name = field.file_name().unwrap_or("image").to_string();
            let bytes = field.bytes().await?;
            form.add_file(UploadedFile::new(original_name, bytes));
        } else {
            let value = field.text().await?;
            form.add_text(&name, value)?;
        }
    }
    Ok(form.finish()?)
}

// ============================================================================
// Handlers
// ============================================================================

async fn root() -> &'static str {
    "API is running...."
}

async fn health() -> &'static str {
    "ok"
}

#[instrument(skip_all)]
async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let raw = read_form(multipart).await?;
    let names: Vec<String> = raw.files.iter().map(|f| f.original_name.clone()).collect();
    let requests = bind(raw, &state.limits)?;
    info!(files = requests.len(), "upload accepted");

    // Dropping the handler (client gone, deadline hit) cancels queued work.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let result = tokio::time::timeout(
        state.request_timeout,
        state.coordinator.run(requests, cancel),
    )
    .await
    .map_err(|_| ServerError::Timeout(state.request_timeout))??;

    Ok(Json(UploadResponse {
        converted_image_data: correlate(&names, &result),
    }))
}

// ============================================================================
// Router
// ============================================================================

fn cors_layer(origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if origin.trim() == "*" {
        return base.allow_origin(Any);
    }
    match origin.trim().parse::<HeaderValue>() {
        Ok(value) => base
            .allow_origin(AllowOrigin::exact(value))
            .allow_credentials(true),
        Err(e) => {
            warn!(origin, error = %e, "invalid CORS origin, cross-origin requests disabled");
            base
        }
    }
}

fn body_limit(limits: &BindLimits) -> usize {
    limits
        .max_files
        .saturating_mul(limits.max_file_bytes)
        .saturating_add(BODY_SLACK)
}

pub fn router(state: Arc<AppState>, config: &AppConfig) -> Router {
    let limit = body_limit(&state.limits);

    let mut app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/v1/upload", post(upload))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state);

    if config.storage.backend == StorageBackend::Local {
        app = app.nest_service("/uploads", ServeDir::new(&config.storage.local.root));
    }

    app.layer(cors_layer(&config.server.allowed_origin))
}

/// Bind the configured address and serve until Ctrl-C or SIGTERM.
pub async fn serve(state: Arc<AppState>, config: &AppConfig) -> std::io::Result<()> {
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, backend = ?config.storage.backend, "listening");

    axum::serve(listener, router(state, config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
