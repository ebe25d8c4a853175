use crate::model::HealthResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::warn;

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Reports whether the storage backend is reachable.
pub async fn ping_handler(State(state): State<AppState>) -> StatusCode {
    match state.shortener().ping(&state.context()).await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            warn!(error = %err, "storage ping failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
