pub mod ogp;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::state::AppState;

/// Every API route, without middleware. The binary layers metrics, CORS and
/// tracing on top; integration tests drive this router directly.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/ogp", get(ogp::get_ogp))
        .route("/api/actions/fetch-ogp", post(ogp::fetch_ogp))
}

pub async fn health_check() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "linkbox-server",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
