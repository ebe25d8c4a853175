use crate::error::Result;
use crate::identity::Owner;
use crate::model::UserUrlResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use snip_core::ShortId;
use tracing::{debug, warn};

/// `GET /api/user/urls`: the caller's active URLs, 204 when there are none.
pub async fn list_user_urls_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
) -> Result<Response> {
    let records = state
        .shortener()
        .get_urls_by_owner(&state.context(), owner.0)
        .await?;

    if records.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let urls: Vec<_> = records
        .into_iter()
        .map(|record| UserUrlResponse {
            short_url: state.short_url(&record.id),
            original_url: record.original_url,
        })
        .collect();

    Ok(Json(urls).into_response())
}

/// `DELETE /api/user/urls` with a JSON array of ids.
///
/// Deletion runs in the background; the response only acknowledges it.
/// Ids that cannot exist are dropped up front.
pub async fn delete_user_urls_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Json(ids): Json<Vec<String>>,
) -> StatusCode {
    let ids: Vec<ShortId> = ids
        .into_iter()
        .filter_map(|id| ShortId::new(id).ok())
        .collect();

    if ids.is_empty() {
        return StatusCode::ACCEPTED;
    }

    let shortener = state.shortener_handle();
    let ctx = state.context();
    tokio::spawn(async move {
        match shortener.delete_urls(&ctx, &ids, owner.0).await {
            Ok(()) => debug!(owner = %owner.0, count = ids.len(), "deleted urls"),
            Err(err) => warn!(owner = %owner.0, error = %err, "failed to delete urls"),
        }
    });

    StatusCode::ACCEPTED
}
