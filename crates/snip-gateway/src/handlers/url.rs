use crate::error::{AppError, Result};
use crate::identity::Owner;
use crate::model::{BatchShortenRequest, BatchShortenResponse, ShortenRequest, ShortenResponse};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use snip_core::{BatchItem, ShortId, StorageError};
use url::Url;

/// Accepts absolute http(s) URLs and returns them trimmed of surrounding
/// whitespace. The URL is stored as given, not normalized.
fn validate_url(raw: &str) -> Result<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidUrl("url cannot be empty".to_string()));
    }

    let parsed =
        Url::parse(trimmed).map_err(|e| AppError::InvalidUrl(format!("{trimmed}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || !parsed.has_host() {
        return Err(AppError::InvalidUrl(format!(
            "{trimmed}: expected an http or https url"
        )));
    }

    Ok(trimmed)
}

/// Shortens `raw` for `owner`. A URL the owner already shortened answers
/// 409 with the existing short URL, a new one answers 201.
async fn shorten(state: &AppState, raw: &str, owner: Owner) -> Result<(StatusCode, String)> {
    let original_url = validate_url(raw)?;
    let ctx = state.context();

    match state
        .shortener()
        .get_by_original_url_for_owner(&ctx, original_url, owner.0)
        .await
    {
        Ok(id) => return Ok((StatusCode::CONFLICT, state.short_url(&id))),
        Err(StorageError::NotFound(_)) => {}
        Err(err) => return Err(err.into()),
    }

    let id = state.shortener().add(&ctx, original_url, owner.0).await?;
    Ok((StatusCode::CREATED, state.short_url(&id)))
}

/// `POST /` with the URL as a plain-text body.
pub async fn shorten_text_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    body: String,
) -> Result<(StatusCode, String)> {
    shorten(&state, &body, owner).await
}

/// `POST /api/shorten` with `{"url": ...}`.
pub async fn shorten_json_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Json(request): Json<ShortenRequest>,
) -> Result<(StatusCode, Json<ShortenResponse>)> {
    let (status, result) = shorten(&state, &request.url, owner).await?;
    Ok((status, Json(ShortenResponse { result })))
}

/// `POST /api/shorten/batch`. Either every URL is shortened or none.
pub async fn shorten_batch_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Json(request): Json<Vec<BatchShortenRequest>>,
) -> Result<(StatusCode, Json<Vec<BatchShortenResponse>>)> {
    if request.is_empty() {
        return Err(AppError::InvalidUrl("batch cannot be empty".to_string()));
    }

    let items = request
        .into_iter()
        .map(|item| -> Result<BatchItem> {
            let original_url = validate_url(&item.original_url)?;
            Ok(BatchItem::new(original_url, Some(item.correlation_id)))
        })
        .collect::<Result<Vec<_>>>()?;

    let entries = state
        .shortener()
        .add_batch(&state.context(), items, owner.0)
        .await?;

    let response = entries
        .into_iter()
        .map(|entry| BatchShortenResponse {
            short_url: state.short_url(&entry.id),
            correlation_id: entry.correlation_id.unwrap_or_default(),
        })
        .collect();

    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /{id}`: 307 to the original URL, 410 once deleted.
pub async fn redirect_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id =
        ShortId::new(id).map_err(|_| StorageError::NotFound("unknown short id".to_string()))?;
    let record = state.shortener().get_by_id(&state.context(), &id).await?;

    if record.deleted {
        return Ok(StatusCode::GONE.into_response());
    }

    let location = location_header(&record.original_url)?;
    Ok((StatusCode::TEMPORARY_REDIRECT, [(LOCATION, location)]).into_response())
}

/// Non-ASCII URLs are sent in their percent-encoded form.
fn location_header(original_url: &str) -> Result<HeaderValue> {
    let encoded = if original_url.is_ascii() {
        HeaderValue::from_str(original_url).ok()
    } else {
        Url::parse(original_url)
            .ok()
            .and_then(|url| HeaderValue::from_str(url.as_str()).ok())
    };

    encoded.ok_or_else(|| {
        AppError::Storage(StorageError::Unavailable(format!(
            "stored url is not a valid location: {original_url}"
        )))
    })
}
