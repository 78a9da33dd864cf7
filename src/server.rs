//! HTTP surface: routes, multipart handling, and error responses.

use crate::app::App;
use crate::models::{
    ErrorBody, GenerationRequest, GenerationResponse, StatusResponse, TrainingResponse,
    DEFAULT_TRIGGER_WORD,
};
use crate::Error;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Request body cap, sized for photo archives.
const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    app: Arc<App>,
}

impl AppState {
    pub fn new(app: App) -> Self {
        Self { app: Arc::new(app) }
    }
}

/// Error response with the uniform `{detail}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn unprocessable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: detail.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::unprocessable(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::unprocessable(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::unprocessable(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("Request failed ({}): {}", self.status, self.detail);
        }
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/generate-image", post(generate_image))
        .route("/train-user", post(train_user))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn home() -> Json<StatusResponse> {
    Json(StatusResponse::default())
}

async fn generate_image(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GenerationResponse>, ApiError> {
    let Json(request) = payload?;
    let response = state.app.generate_image(&request).await?;
    Ok(Json(response))
}

#[derive(Debug, Default, Deserialize)]
struct TrainUserQuery {
    trigger_word: Option<String>,
}

async fn train_user(
    State(state): State<AppState>,
    query: Result<Query<TrainUserQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<TrainingResponse>, ApiError> {
    let Query(query) = query?;
    let mut multipart = multipart?;
    let mut staged = None;
    let mut trigger_word = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::unprocessable(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload.zip").to_string();
                // Dropping the transient file on an early return deletes it.
                let mut transient = state.app.stage_upload(&filename)?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::unprocessable(e.to_string()))?
                {
                    transient.write_chunk(&chunk).await?;
                }
                transient.finish().await?;
                staged = Some(transient);
            }
            Some("trigger_word") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::unprocessable(e.to_string()))?;
                trigger_word = Some(value);
            }
            _ => {}
        }
    }

    let staged =
        staged.ok_or_else(|| ApiError::from(Error::InvalidRequest("Missing file field".into())))?;
    if staged.is_empty() {
        return Err(Error::InvalidRequest("Uploaded file is empty".into()).into());
    }

    let trigger_word = trigger_word
        .or(query.trigger_word)
        .map(|word| word.trim().to_string())
        .filter(|word| !word.is_empty())
        .unwrap_or_else(|| DEFAULT_TRIGGER_WORD.to_string());

    let response = state.app.train_staged(staged, &trigger_word).await?;
    Ok(Json(response))
}
