//! HTTP route handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use monitor_service::{ControllerStatus, MonitorService};
use replybot_core::{CoreError, ErrorExt, ErrorReporter, Interaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Keywords arrive either as a JSON array or as one comma-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum KeywordsInput {
    List(Vec<String>),
    Text(String),
}

impl Default for KeywordsInput {
    fn default() -> Self {
        KeywordsInput::List(Vec::new())
    }
}

impl KeywordsInput {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            KeywordsInput::List(list) => list,
            KeywordsInput::Text(text) => text.split(',').map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MonitorRequest {
    #[serde(default)]
    pub subreddit_name: String,
    #[serde(default)]
    pub keywords: KeywordsInput,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct InteractionsResponse {
    pub interactions: Vec<Interaction>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(e: CoreError) -> ApiError {
    ErrorReporter::default().report_warning(&e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.user_friendly_message(),
        }),
    )
}

pub async fn start_monitoring(
    State(service): State<Arc<MonitorService>>,
    payload: Result<Json<MonitorRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        internal_error(CoreError::InvalidInput {
            message: rejection.body_text(),
        })
    })?;

    service
        .start_monitoring(&request.subreddit_name, request.keywords.into_vec())
        .await
        .map_err(internal_error)?;

    Ok(Json(MessageResponse {
        message: "Monitoring initiated successfully.",
    }))
}

pub async fn stop_monitoring(State(service): State<Arc<MonitorService>>) -> Json<MessageResponse> {
    service.stop_monitoring();
    info!("Stop requested over HTTP");

    Json(MessageResponse {
        message: "Monitoring stopped successfully.",
    })
}

pub async fn interactions(
    State(service): State<Arc<MonitorService>>,
) -> Result<Json<InteractionsResponse>, ApiError> {
    let interactions = service.get_history().await.map_err(internal_error)?;
    Ok(Json(InteractionsResponse { interactions }))
}

pub async fn status(State(service): State<Arc<MonitorService>>) -> Json<ControllerStatus> {
    Json(service.status())
}

pub async fn health() -> &'static str {
    "ok"
}
