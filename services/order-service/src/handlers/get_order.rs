use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common::metrics::record_http_query;
use domain::Order;
use order_store::StoreError;
use tracing::{error, info};

use super::ErrorResponse;
use crate::state::AppState;

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn reject(status: StatusCode, message: impl Into<String>) -> HandlerError {
    record_http_query(status.as_u16());
    (status, Json(ErrorResponse::new(message)))
}

/// Get a single order aggregate by its uid
pub async fn get_order_handler(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Result<Json<Order>, HandlerError> {
    // Blank means missing; anything else is looked up verbatim.
    if order_uid.trim().is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "order_uid is required"));
    }

    info!("Fetching order: {}", order_uid);

    match state.service.get_order(&order_uid).await {
        Ok(order) => {
            record_http_query(StatusCode::OK.as_u16());
            Ok(Json(order))
        }
        Err(StoreError::NotFound(uid)) => Err(reject(
            StatusCode::NOT_FOUND,
            format!("Order not found: {}", uid),
        )),
        Err(e) => {
            error!("Failed to fetch order {}: {}", order_uid, e);
            Err(reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch order",
            ))
        }
    }
}

/// `/order` and `/order/` carry no identifier
pub async fn missing_order_uid_handler() -> HandlerError {
    reject(StatusCode::BAD_REQUEST, "order_uid is required")
}
