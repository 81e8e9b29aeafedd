//! Server-Sent-Events front-end for configuration watches.
//!
//! Each request opens its own watch. Events are named after the change
//! kind (`created`, `updated`, `deleted`) and carry the change as JSON.
//! A store failure is sent as a final `error` event. The watch is
//! cancelled when the client disconnects.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tracing::{info, warn};

use nidavellir_config::{ChangeEvent, ConfigResult};

use crate::ApiState;
use crate::handlers::config_error;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

fn to_sse(next: ConfigResult<ChangeEvent>) -> Event {
    match next {
        Ok(change) => match Event::default().event(change.kind.as_str()).json_data(&change) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "failed to encode change event");
                Event::default().event("error").data(e.to_string())
            }
        },
        Err(e) => Event::default().event("error").data(e.to_string()),
    }
}

async fn open(state: ApiState, service: String, key: Option<String>) -> Response {
    match state.watcher.watch(&service, key.as_deref()).await {
        Ok(handle) => {
            info!(target_key = handle.target(), "sse watch opened");
            let events = handle.map(|next| Ok::<_, Infallible>(to_sse(next)));
            Sse::new(events)
                .keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
                .into_response()
        }
        Err(e) => config_error(e),
    }
}

/// GET /api/v1/watch/{service}
pub async fn watch_service(
    State(state): State<ApiState>,
    Path(service): Path<String>,
) -> Response {
    open(state, service, None).await
}

/// GET /api/v1/watch/{service}/{key}
pub async fn watch_config(
    State(state): State<ApiState>,
    Path((service, key)): Path<(String, String)>,
) -> Response {
    open(state, service, Some(key)).await
}
