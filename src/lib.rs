//! Storefront API: the order-placement backend for a small clothing brand.
//!
//! The heart of the service is [`services::checkout::CheckoutService`], which
//! runs the whole checkout sequence in one database transaction. Around it
//! sit the promo ledger, the inventory adapter, the order query service, and
//! a thin axum HTTP surface.

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod request_id;
pub mod services;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{checkout::CheckoutService, orders::OrderService},
};
use axum::{
    http::{HeaderValue, Method},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub checkout: CheckoutService,
    pub orders: OrderService,
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: Arc<AppConfig>, event_sender: EventSender) -> Self {
        let checkout = CheckoutService::new(db.clone(), event_sender.clone(), &config);
        let orders = OrderService::new(db.clone(), event_sender.clone());
        Self {
            db,
            config,
            event_sender,
            checkout,
            orders,
        }
    }
}

async fn health_check(axum::extract::State(state): axum::extract::State<AppState>) -> impl IntoResponse {
    match db::check_connection(state.db.as_ref()).await {
        Ok(()) => Json(json!({ "status": "ok", "database": "up" })).into_response(),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "down" })),
            )
                .into_response()
        }
    }
}

async fn status_check() -> impl IntoResponse {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    match config.cors_allowed_origins.as_deref() {
        Some(origins) => {
            let parsed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| {
                    let origin = origin.trim();
                    match origin.parse::<HeaderValue>() {
                        Ok(value) => Some(value),
                        Err(_) => {
                            warn!(%origin, "Ignoring unparseable CORS origin");
                            None
                        }
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(parsed))
                .allow_methods(methods)
                .allow_headers(Any)
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any),
    }
}

/// Builds the full application router, middleware included.
pub fn app_router(state: AppState) -> Router {
    let api_v1 = Router::new()
        .nest("/orders", handlers::orders::routes())
        .route("/health", get(health_check))
        .route("/status", get(status_check));

    // Root-level aliases for load balancer probes.
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status_check))
        .nest("/api/v1", api_v1)
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config))
        .with_state(state)
}
