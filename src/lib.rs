pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod forms;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod rate_limit;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
pub mod validation;
pub mod views;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::{Config, StorageBackend};
use crate::middleware::auth_redirect::redirect_unauthorized;
use crate::rate_limit::LoginRateLimiter;
use crate::state::{AppState, SharedState};
use crate::storage::{ImageStorage, LocalDiskStorage, MemoryStorage};

/// Build the router and the state behind it. The state is returned so that
/// callers (tests, background jobs) can reach the pool and storage directly.
pub fn build_app(pool: PgPool, config: Config) -> (Router, SharedState) {
    let storage: Arc<dyn ImageStorage> = match &config.storage {
        StorageBackend::Disk(root) => {
            tracing::info!("Storing uploads under {}", root.display());
            Arc::new(LocalDiskStorage::new(root.clone()))
        }
        StorageBackend::Memory => {
            tracing::warn!("Uploads are kept in memory and lost on restart");
            Arc::new(MemoryStorage::new())
        }
    };
    build_app_with_storage(pool, config, storage)
}

pub fn build_app_with_storage(
    pool: PgPool,
    config: Config,
    storage: Arc<dyn ImageStorage>,
) -> (Router, SharedState) {
    let max_upload_size = config.max_upload_size;
    let uploads = match &config.storage {
        StorageBackend::Disk(root) => Some(ServeDir::new(root.clone())),
        StorageBackend::Memory => None,
    };

    let state: SharedState = Arc::new(AppState {
        pool,
        config,
        storage,
        login_limiter: LoginRateLimiter::new(),
    });

    let mut router = Router::new()
        .merge(routes::api_routes())
        .merge(views::view_routes().layer(axum::middleware::from_fn(redirect_unauthorized)))
        .nest_service("/static", ServeDir::new("static"))
        .route("/health", axum::routing::get(health));
    if let Some(uploads) = uploads {
        router = router.nest_service("/storage", uploads);
    }

    let app = router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_upload_size))
                // Security headers
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("x-content-type-options"),
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("x-frame-options"),
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("referrer-policy"),
                    HeaderValue::from_static("strict-origin-when-cross-origin"),
                )),
        )
        .with_state(state.clone());

    (app, state)
}

async fn health() -> &'static str {
    "ok"
}
