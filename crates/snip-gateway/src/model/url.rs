use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct ShortenRequest {
    pub url: String,
}

#[derive(Serialize)]
pub struct ShortenResponse {
    pub result: String,
}

#[derive(Deserialize)]
pub struct BatchShortenRequest {
    pub correlation_id: String,
    pub original_url: String,
}

#[derive(Serialize)]
pub struct BatchShortenResponse {
    pub correlation_id: String,
    pub short_url: String,
}

#[derive(Serialize)]
pub struct UserUrlResponse {
    pub short_url: String,
    pub original_url: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}
