use axum::{
    extract::{Path, State},
    http::StatusCode,
};

use super::parse_resource_id;
use crate::{TusError, TusState};

pub async fn termination_handler(
    State(state): State<TusState>,
    Path(resource_id): Path<String>,
) -> Result<StatusCode, TusError> {
    let resource_id = parse_resource_id(&resource_id)?;

    state.files.terminate(resource_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
