//! REST API handlers.
//!
//! Each handler goes through `ConfigRegistry` and returns the JSON envelope
//! `{success, data?, error?}`.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::error;

use nidavellir_config::{Clock, ConfigError, ConfigValue, SystemClock};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
pub(crate) struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

/// HTTP status for a registry failure.
pub fn status_for(err: &ConfigError) -> StatusCode {
    match err {
        ConfigError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ConfigError::MalformedItem { .. } | ConfigError::Serialize(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ConfigError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ConfigError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
    }
}

pub(crate) fn config_error(err: ConfigError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, "request failed");
    }
    error_response(&err.to_string(), status)
}

// ── Health ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct Health {
    status: &'static str,
    timestamp: i64,
    service: &'static str,
}

/// GET /api/v1/health
pub async fn health() -> impl IntoResponse {
    ApiResponse::ok(Health {
        status: "ok",
        timestamp: SystemClock.now(),
        service: "nidavellir",
    })
}

// ── Configs ────────────────────────────────────────────────────

/// Body of a set request.
#[derive(Debug, Deserialize)]
pub struct SetConfigRequest {
    /// `None` only when the field is missing; JSON `null` is a value.
    #[serde(default, deserialize_with = "present")]
    pub value: Option<ConfigValue>,
    #[serde(default)]
    pub description: String,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<ConfigValue>, D::Error> {
    ConfigValue::deserialize(deserializer).map(Some)
}

/// PUT /api/v1/configs/{service}/{key}
pub async fn set_config(
    State(state): State<ApiState>,
    Path((service, key)): Path<(String, String)>,
    body: Result<Json<SetConfigRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return error_response(&rejection.body_text(), StatusCode::BAD_REQUEST),
    };
    let Some(value) = req.value else {
        return error_response("value is required", StatusCode::BAD_REQUEST);
    };

    if let Err(e) = state
        .registry
        .set_config(&service, &key, value, &req.description)
        .await
    {
        return config_error(e);
    }
    match state.registry.get_config(&service, &key).await {
        Ok(Some(item)) => ApiResponse::ok(item).into_response(),
        // Deleted again between the write and the read.
        Ok(None) => error_response("config not found", StatusCode::NOT_FOUND),
        Err(e) => config_error(e),
    }
}

/// GET /api/v1/configs/{service}/{key}
pub async fn get_config(
    State(state): State<ApiState>,
    Path((service, key)): Path<(String, String)>,
) -> Response {
    match state.registry.get_config(&service, &key).await {
        Ok(Some(item)) => ApiResponse::ok(item).into_response(),
        Ok(None) => error_response("config not found", StatusCode::NOT_FOUND),
        Err(e) => config_error(e),
    }
}

/// GET /api/v1/configs/{service}
pub async fn get_service_configs(
    State(state): State<ApiState>,
    Path(service): Path<String>,
) -> Response {
    match state.registry.get_service_configs(&service).await {
        Ok(items) => ApiResponse::ok(items).into_response(),
        Err(e) => config_error(e),
    }
}

/// DELETE /api/v1/configs/{service}/{key}
pub async fn delete_config(
    State(state): State<ApiState>,
    Path((service, key)): Path<(String, String)>,
) -> Response {
    match state.registry.delete_config(&service, &key).await {
        Ok(()) => ApiResponse::ok("deleted").into_response(),
        Err(e) => config_error(e),
    }
}

#[derive(Serialize)]
struct Deleted {
    deleted: u64,
}

/// DELETE /api/v1/configs/{service}
pub async fn delete_service_configs(
    State(state): State<ApiState>,
    Path(service): Path<String>,
) -> Response {
    match state.registry.delete_service_configs(&service).await {
        Ok(deleted) => ApiResponse::ok(Deleted { deleted }).into_response(),
        Err(e) => config_error(e),
    }
}

// ── Services ───────────────────────────────────────────────────

/// GET /api/v1/services
pub async fn list_services(State(state): State<ApiState>) -> Response {
    match state.registry.list_services().await {
        Ok(services) => ApiResponse::ok(services).into_response(),
        Err(e) => config_error(e),
    }
}
