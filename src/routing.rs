//! Application router configuration.

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::{
    AppState,
    analytics::ask_endpoint,
    endpoints,
    extraction::{analyze_image_endpoint, analyze_text_endpoint},
    transaction::{create_transaction_endpoint, list_transactions_endpoint},
};

/// Return a router with all the app's routes.
///
/// Request bodies, including receipt uploads, are limited to
/// `max_upload_bytes`.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .route(endpoints::ANALYZE_TEXT, post(analyze_text_endpoint))
        .route(endpoints::ANALYZE_IMAGE, post(analyze_image_endpoint))
        .route(
            endpoints::TRANSACTIONS,
            get(list_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(
            endpoints::TRANSACTIONS_NO_SLASH,
            get(list_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(endpoints::ANALYTICS_ASK, post(ask_endpoint))
        .fallback(get_404_not_found)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn get_health() -> &'static str {
    "ok"
}

async fn get_404_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "the requested resource could not be found" })),
    )
        .into_response()
}
