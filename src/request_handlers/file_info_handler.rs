use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::parse_resource_id;
use crate::{TusError, TusHeaderMap, TusState};

/// Reports how far an upload has progressed so the client can resume it.
pub async fn file_info_handler(
    State(state): State<TusState>,
    Path(resource_id): Path<String>,
) -> Result<Response, TusError> {
    let resource_id = parse_resource_id(&resource_id)?;
    let file = state.files.load(resource_id).await?;

    let upload_metadata = Some(file.metadata.to_header_value()).filter(|m| !m.is_empty());
    let headers = TusHeaderMap {
        upload_offset: Some(file.offset),
        upload_length: Some(file.file_size),
        upload_metadata,
        ..Default::default()
    };

    let mut response = StatusCode::OK.into_response();
    headers.apply(response.headers_mut());

    Ok(response)
}
