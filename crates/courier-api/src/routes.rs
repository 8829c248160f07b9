use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use courier_core::{JsonFileStore, MemoryStore, Message, SyncEngine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, StorageBackend};
use crate::error::AppError;

const INVALID_MESSAGE: &str = "invalid message";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    engine: Arc<SyncEngine>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let engine = match &config.storage {
            StorageBackend::File(path) => SyncEngine::new(JsonFileStore::new(path)),
            StorageBackend::Memory => SyncEngine::new(MemoryStore::new()),
        };
        Self {
            engine: Arc::new(engine),
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/messages", get(list_messages).post(create_message))
        .route("/sync", post(sync))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    storage: &'static str,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        storage: state.engine.storage_kind(),
    })
}

async fn list_messages(State(state): State<AppState>) -> Result<Json<Vec<Message>>, AppError> {
    let messages = with_engine(&state, SyncEngine::messages).await?;
    Ok(Json(messages))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    #[serde(default)]
    local_messages: Option<Vec<Value>>,
    #[serde(default)]
    last_sync_time: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    success: bool,
    server_messages: Vec<Message>,
}

async fn sync(State(state): State<AppState>, body: Bytes) -> Result<Json<SyncResponse>, AppError> {
    let request = match parse_json_body(&body)? {
        Some(value) => serde_json::from_value::<SyncRequest>(value)
            .map_err(|e| AppError::bad_request(format!("invalid sync request: {e}")))?,
        None => SyncRequest::default(),
    };

    let raw_messages = request.local_messages.unwrap_or_default();
    let submitted = raw_messages.len();
    let local_messages: Vec<Message> = raw_messages
        .into_iter()
        .filter_map(|value| Message::try_from(value).ok())
        .collect();
    if local_messages.len() < submitted {
        tracing::debug!(
            dropped = submitted - local_messages.len(),
            "Dropped malformed records from sync batch"
        );
    }

    let watermark = request.last_sync_time;
    let outcome = with_engine(&state, move |engine| {
        engine.sync(local_messages, watermark.as_deref())
    })
    .await?;

    Ok(Json(SyncResponse {
        success: true,
        server_messages: outcome.server_messages,
    }))
}

#[derive(Debug, Serialize)]
struct CreateMessageResponse {
    success: bool,
    message: Message,
}

async fn create_message(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateMessageResponse>), AppError> {
    let message = parse_json_body(&body)?
        .and_then(|value| Message::try_from(value).ok())
        .filter(|message| message.key().is_some())
        .ok_or_else(|| AppError::bad_request(INVALID_MESSAGE))?;

    let submitted = message.clone();
    with_engine(&state, move |engine| engine.submit(submitted)).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateMessageResponse {
            success: true,
            message,
        }),
    ))
}

/// Parse a JSON request body; a blank body yields `None`.
fn parse_json_body(body: &[u8]) -> Result<Option<Value>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| AppError::bad_request(format!("invalid JSON body: {e}")))
}

/// Run blocking storage work off the async workers.
async fn with_engine<T, F>(state: &AppState, work: F) -> Result<T, AppError>
where
    F: FnOnce(&SyncEngine) -> courier_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || work(&engine))
        .await
        .map_err(|e| AppError::internal(format!("storage task failed: {e}")))?
        .map_err(AppError::from)
}
