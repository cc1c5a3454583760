use axum::{
    http::{header, header::InvalidHeaderValue, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use common::metrics;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(metrics) => (StatusCode::OK, metrics),
        Err(e) => {
            tracing::error!("Failed to gather metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::from("Failed to gather metrics"))
        }
    }
}

fn cors_layer(front_origin: &str) -> Result<CorsLayer, InvalidHeaderValue> {
    Ok(CorsLayer::new()
        .allow_origin(front_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]))
}

pub fn create_router(state: AppState, front_origin: &str) -> Result<Router, InvalidHeaderValue> {
    Ok(Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(metrics_handler))

        // Order lookup
        .route("/order/:order_uid", get(handlers::get_order::get_order_handler))
        .route("/order", get(handlers::get_order::missing_order_uid_handler))
        .route("/order/", get(handlers::get_order::missing_order_uid_handler))

        // Middleware
        .layer(cors_layer(front_origin)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
