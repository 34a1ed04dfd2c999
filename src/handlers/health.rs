use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::error;

use crate::state::AppState;
use crate::utils::timing::start_request_timer;

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let mut timer = start_request_timer("GET /health", None);
    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "style-synth",
                "version": env!("CARGO_PKG_VERSION"),
                "advice_model": state.advice.name(),
                "image_generator": state.images.name(),
            })),
        ),
        Err(err) => {
            error!("Health check failed: {err:#}");
            timer.mark_status("error", Some(err.to_string()));
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": "database unreachable" })),
            )
        }
    }
}
