use crate::model::ErrorResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use snip_core::StorageError;
use snip_identity::IdentityError;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Storage(StorageError::InvalidArgument(_)) => StatusCode::BAD_REQUEST,
            AppError::Storage(StorageError::Conflict(_)) => StatusCode::CONFLICT,
            AppError::Storage(StorageError::Canceled(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Storage(StorageError::Unavailable(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Identity(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { message })).into_response()
    }
}
