use axum::{http::StatusCode, response::IntoResponse};

/// Capability discovery. The tus headers are applied at the tus service level
/// (see src/tus_service.rs) for every request.
pub async fn info_handler() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}
