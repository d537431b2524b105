//! HTTP service
//!
//! - `POST /api/generate` multipart upload (`image`, `email`) → `{taskId}`
//! - `GET /api/generate?taskId=` → poll report
//! - `GET /api/model?url=` → transcoded GLB, or a redirect to the original
//! - `POST /api/notify` → send the "model ready" email
//!
//! Provider calls, transcoding and email delivery block, so handlers run
//! them on tokio's blocking pool.

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use petcast_core::{PetcastConfig, PetcastError};
use petcast_gen::notify::notifier_from_config;
use petcast_gen::{
    ImagePayload, Notifier, NotifyOutcome, PollReport, ProviderStatus, ReadyNotification,
    SubmitOutcome, TaskManager,
};
use petcast_transcode::{AssetPipeline, TranscodeOutcome};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared state behind every handler
pub struct AppState {
    pub manager: TaskManager,
    pub pipeline: AssetPipeline,
    pub notifier: Arc<dyn Notifier>,
    /// Public origin for view links; the request's Host header otherwise
    pub base_url: Option<String>,
}

impl AppState {
    pub fn from_config(config: &PetcastConfig) -> Result<Self> {
        let manager = TaskManager::from_config(config).context("Failed to set up task manager")?;
        match manager.provider_status() {
            ProviderStatus::Available => {
                log::info!("Provider {} available", manager.provider_name().unwrap_or_default())
            }
            ProviderStatus::NoApiKey => {
                log::warn!("No provider credential configured, submissions will return the demo task")
            }
            ProviderStatus::Unavailable(reason) => log::warn!(
                "Provider {} unavailable: {}",
                manager.provider_name().unwrap_or_default(),
                reason
            ),
        }
        Ok(Self {
            manager,
            pipeline: AssetPipeline::from_config(&config.transcode),
            notifier: notifier_from_config(&config.notify),
            base_url: config.notify.base_url.clone(),
        })
    }
}

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/generate", post(submit_generation).get(poll_generation))
        .route("/api/model", get(serve_model))
        .route("/api/notify", post(send_notification))
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    api_routes()
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(config: PetcastConfig, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let state = Arc::new(AppState::from_config(&config)?);
    let app = router(state, config.server.max_upload_bytes);

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    log::info!("PetCast listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}

/// An error response with a JSON `{error}` body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<PetcastError> for ApiError {
    fn from(err: PetcastError) -> Self {
        if err.is_client_error() {
            return match err {
                PetcastError::MissingInput(msg) => Self::bad_request(msg),
                PetcastError::InvalidSource(_) => Self::bad_request("Invalid model URL"),
                other => Self::bad_request(other.to_string()),
            };
        }
        match err {
            PetcastError::TaskNotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                message: err.to_string(),
            },
            PetcastError::ProviderRejected(msg) | PetcastError::TransientProvider(msg) => Self {
                status: StatusCode::BAD_GATEWAY,
                message: msg,
            },
            PetcastError::NoCredential(_) => Self::internal("No API key"),
            other => {
                log::error!("Request failed: {}", other);
                Self::internal(format!("Server error: {}", other))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Run blocking work off the async executor
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> petcast_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::internal(format!("Server error: {}", e)))?
        .map_err(ApiError::from)
}

async fn submit_generation(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<SubmitOutcome>, ApiError> {
    let mut image = None;
    let mut email = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid form data: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let is_file = field.file_name().is_some();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid image upload: {}", e)))?;
                if data.is_empty() {
                    continue;
                }
                // browsers send either a file part or the data URL as text
                image = Some(if is_file {
                    ImagePayload::from_bytes(data.to_vec(), content_type.as_deref())?
                } else {
                    ImagePayload::from_data_url(&String::from_utf8_lossy(&data))?
                });
            }
            Some("email") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid email field: {}", e)))?;
                email = Some(text);
            }
            _ => {}
        }
    }

    let outcome = blocking(move || state.manager.submit(image, email.as_deref())).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct PollQuery {
    #[serde(rename = "taskId")]
    task_id: Option<String>,
}

async fn poll_generation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollReport>, ApiError> {
    let task_id = query
        .task_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing taskId"))?;
    let report = blocking(move || state.manager.poll(&task_id)).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct ModelQuery {
    url: Option<String>,
}

async fn serve_model(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ModelQuery>,
) -> Result<Response, ApiError> {
    let url = query
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("Invalid model URL"))?;

    let outcome = blocking(move || state.pipeline.transcode(&url)).await?;
    let response = match outcome {
        TranscodeOutcome::Transcoded(asset) => {
            let compressed = asset.compressed_size().to_string();
            (
                [
                    (header::CONTENT_TYPE, asset.content_type.to_string()),
                    (header::CONTENT_LENGTH, compressed.clone()),
                    (header::CACHE_CONTROL, asset.cache_control.clone()),
                    (
                        HeaderName::from_static("x-original-size"),
                        asset.original_size.to_string(),
                    ),
                    (HeaderName::from_static("x-compressed-size"), compressed),
                ],
                asset.bytes,
            )
                .into_response()
        }
        TranscodeOutcome::Redirect { url, .. } => Redirect::temporary(&url).into_response(),
    };
    Ok(response)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotifyRequest {
    email: Option<String>,
    task_id: Option<String>,
    model_url: Option<String>,
    thumbnail_url: Option<String>,
}

async fn send_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<NotifyRequest>,
) -> Response {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(email), Some(task_id)) = (non_empty(request.email), non_empty(request.task_id)) else {
        return ApiError::bad_request("Missing email or taskId").into_response();
    };

    let base_url = state.base_url.clone().unwrap_or_else(|| {
        let host = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("localhost");
        format!("http://{}", host)
    });
    let notification = ReadyNotification::new(&email, &task_id, &base_url)
        .with_model_url(request.model_url)
        .with_thumbnail_url(request.thumbnail_url);

    let notifier = Arc::clone(&state.notifier);
    match tokio::task::spawn_blocking(move || notifier.notify(&notification)).await {
        Ok(Ok(NotifyOutcome::Sent)) => Json(json!({ "sent": true })).into_response(),
        Ok(Ok(NotifyOutcome::Skipped { reason })) => {
            Json(json!({ "sent": false, "reason": reason })).into_response()
        }
        Ok(Err(e)) => {
            log::warn!("Notification for {} failed: {}", task_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "sent": false, "error": e.to_string() })),
            )
                .into_response()
        }
        Err(e) => ApiError::internal(format!("Server error: {}", e)).into_response(),
    }
}
