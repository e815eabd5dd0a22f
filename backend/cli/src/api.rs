use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use futures::stream::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, error, info};

use labelscan_core::{AnalysisMode, ImageOrigin, PipelineState, ScanError};
use labelscan_media::ImageSource;
use labelscan_pipeline::PipelineController;

/// Headroom for the `data:` prefix and stray whitespace on top of the encoded image.
const BODY_SLACK: usize = 64 * 1024;

/// Largest accepted request body: an image at the size cap, base64-encoded
/// into a data URI.
fn body_limit(max_image_bytes: usize) -> usize {
    max_image_bytes
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(BODY_SLACK)
}

/// Shared application state for API handlers.
pub struct AppState {
    pub controller: Arc<PipelineController>,
}

/// Maps pipeline errors onto HTTP statuses.
#[derive(Debug)]
pub struct ApiError(pub ScanError);

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ScanError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ScanError::NoImage | ScanError::RunInProgress | ScanError::RequestInProgress => {
                StatusCode::CONFLICT
            }
            ScanError::SessionNotReady | ScanError::EngineInit(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            debug!(error = %self.0, "Request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Build the Axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let limit = body_limit(state.controller.max_image_bytes());
    Router::new()
        .route("/api/health", get(health))
        .route("/api/state", get(get_state))
        .route(
            "/api/image",
            post(upload_image)
                .delete(clear_image)
                .layer(DefaultBodyLimit::max(limit)),
        )
        .route("/api/mode", put(set_mode))
        .route("/api/run", post(start_run))
        .route("/api/ws", get(ws_handler))
        .with_state(state)
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "labelscan",
        "version": env!("CARGO_PKG_VERSION"),
        "session": state.controller.state().session,
    }))
}

async fn get_state(State(state): State<Arc<AppState>>) -> Json<PipelineState> {
    Json(state.controller.state())
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    pub name: Option<String>,
    pub origin: Option<String>,
}

/// Accepts either raw image bytes or a `data:` URI as the body.
async fn upload_image(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let origin = match params.origin.as_deref() {
        Some(raw) => raw
            .parse::<ImageOrigin>()
            .map_err(ScanError::InvalidInput)?,
        None => ImageOrigin::Select,
    };

    let source = if body.starts_with(b"data:") {
        let uri = String::from_utf8(body.to_vec())
            .map_err(|_| ScanError::InvalidInput("data URI is not valid UTF-8".into()))?;
        ImageSource::DataUri(uri)
    } else {
        ImageSource::bytes(params.name, body)
    };

    let info = state.controller.select_image(source, origin).await?;
    Ok(Json(json!({ "status": "selected", "image": info })))
}

async fn clear_image(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.controller.select_new_image();
    Json(json!({ "status": "cleared" }))
}

#[derive(Debug, Deserialize)]
pub struct ModeBody {
    pub mode: String,
}

async fn set_mode(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ModeBody>,
) -> Result<Json<Value>, ApiError> {
    let mode: AnalysisMode = body.mode.parse().map_err(ScanError::InvalidInput)?;
    state.controller.set_mode(mode);
    Ok(Json(json!({ "mode": mode })))
}

/// Start extract-and-analyze in the background; progress arrives over `/api/ws`.
async fn start_run(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let ticket = state.controller.begin_run()?;
    let run_id = ticket.run_id();
    let mode = ticket.mode();

    let controller = Arc::clone(&state.controller);
    tokio::spawn(async move {
        let outcome = controller.drive_run(ticket).await;
        info!(run_id = %run_id, outcome = ?outcome, "Run finished");
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "started", "run_id": run_id, "mode": mode })),
    ))
}

/// WebSocket handler for real-time events.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut stream = BroadcastStream::new(state.controller.events());

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(event) => {
                let Ok(json) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                debug!(skipped, "WebSocket client lagged behind events");
            }
        }
    }
}
