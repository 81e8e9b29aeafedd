//! nidavellir-api: REST API for the Nidavellir configuration store.
//!
//! Provides axum route handlers for reading and writing configuration
//! items, plus Server-Sent-Events streams for watching them.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/health` | Liveness |
//! | PUT | `/api/v1/configs/{service}/{key}` | Set an item |
//! | GET | `/api/v1/configs/{service}/{key}` | Get an item |
//! | DELETE | `/api/v1/configs/{service}/{key}` | Delete an item |
//! | GET | `/api/v1/configs/{service}` | All items of a service |
//! | DELETE | `/api/v1/configs/{service}` | Delete all items of a service |
//! | GET | `/api/v1/services` | List services |
//! | GET | `/api/v1/watch/{service}` | Watch a service (SSE) |
//! | GET | `/api/v1/watch/{service}/{key}` | Watch an item (SSE) |

pub mod handlers;
pub mod middleware;
pub mod sse;

use std::time::Duration;

use axum::Router;
use axum::routing::get;

use nidavellir_config::{ConfigRegistry, ConfigWatcher};
use nidavellir_store::RedbStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: ConfigRegistry<RedbStore>,
    pub watcher: ConfigWatcher<RedbStore>,
}

impl ApiState {
    /// Registry and watcher over `store`, both bounded by `timeout`.
    pub fn new(store: RedbStore, timeout: Duration) -> Self {
        Self {
            registry: ConfigRegistry::new(store.clone()).with_timeout(timeout),
            watcher: ConfigWatcher::new(store).with_timeout(timeout),
        }
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/configs/{service}",
            get(handlers::get_service_configs).delete(handlers::delete_service_configs),
        )
        .route(
            "/configs/{service}/{key}",
            get(handlers::get_config)
                .put(handlers::set_config)
                .delete(handlers::delete_config),
        )
        .route("/services", get(handlers::list_services))
        .route("/watch/{service}", get(sse::watch_service))
        .route("/watch/{service}/{key}", get(sse::watch_config))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(axum::middleware::from_fn(middleware::log_requests))
        .layer(middleware::cors())
}
