pub mod creation;
pub mod file_info_handler;
pub mod info;
pub mod termination;
pub mod upload_handler;

use axum::{
    extract::DefaultBodyLimit,
    routing::{head, post},
    Router,
};
use uuid::Uuid;

use crate::{TusError, TusState};

/// The tus endpoint with routes relative to its own root.
pub fn tus_routes(state: TusState) -> Router {
    // a single chunk may carry the whole upload
    let body_limit = match usize::try_from(state.config.max_file_size) {
        Ok(limit) => DefaultBodyLimit::max(limit),
        Err(_) => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route(
            "/",
            post(creation::creation_handler).options(info::info_handler),
        )
        .route(
            "/:resource_id",
            head(file_info_handler::file_info_handler)
                .patch(upload_handler::upload_handler)
                .delete(termination::termination_handler)
                .options(info::info_handler),
        )
        .layer(body_limit)
        .with_state(state)
}

/// The tus endpoint mounted under the configured `upload_url`.
pub fn tus_app(state: TusState) -> Router {
    let mount_point = state.config.upload_url.trim_end_matches('/').to_string();
    let routes = tus_routes(state);

    if mount_point.is_empty() {
        routes
    } else {
        Router::new().nest(&mount_point, routes)
    }
}

pub(crate) fn parse_resource_id(raw: &str) -> Result<Uuid, TusError> {
    Uuid::parse_str(raw).map_err(|_| TusError::InvalidResourceId(raw.to_string()))
}
