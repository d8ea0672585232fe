use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, OriginalUri, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use base64::Engine as _;

use crate::config::ExistingFilePolicy;
use crate::filesystem::filename::{is_valid_filename, random_string, FileNameFormat};
use crate::filesystem::metadata::{Metadata, MetadataValue};
use crate::{TusError, TusHeaderMap, TusState};

const GENERATED_NAME_LENGTH: usize = 16;

pub struct CreationRequest {
    upload_length: u64,
    metadata: Metadata,
}

pub async fn creation_handler(
    State(state): State<TusState>,
    OriginalUri(uri): OriginalUri,
    req: CreationRequest,
) -> Result<Response, TusError> {
    let CreationRequest {
        upload_length,
        mut metadata,
    } = req;

    let filename = validate_filename(&metadata);
    metadata.insert("filename", MetadataValue::Text(filename.clone()));

    let config = &state.config;

    if upload_length > config.max_file_size {
        return Err(TusError::FileTooLarge {
            declared: upload_length,
            max: config.max_file_size,
        });
    }

    if config.existing_file == ExistingFilePolicy::Error
        && config.file_name_format == FileNameFormat::Keep
        && state.files.destination_exists(&filename).await
    {
        return Err(TusError::NameConflict(filename));
    }

    let resource_id = state.files.create(metadata, upload_length).await?;

    let location = format!("{}/{}", uri.path().trim_end_matches('/'), resource_id);

    Ok((StatusCode::CREATED, [(header::LOCATION, location)]).into_response())
}

/// The client supplied filename, or a random one if it is not a safe file name.
fn validate_filename(metadata: &Metadata) -> String {
    match metadata.filename() {
        Some(filename) if is_valid_filename(filename) => filename.to_string(),
        _ => random_string(GENERATED_NAME_LENGTH),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CreationRequest
where
    S: Send + Sync,
{
    type Rejection = TusError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_map = TusHeaderMap::from_headers(&parts.headers);

        // A missing or unparseable length declares an empty upload.
        let upload_length = header_map.upload_length.unwrap_or(0);

        let mut metadata = match header_map.upload_metadata.as_deref() {
            Some(metadata) => Metadata::try_from(metadata)?,
            None => Metadata::default(),
        };

        if let Some(message_id) = header_map.message_id {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(message_id)
                .map_err(|_| TusError::InvalidHeader("Message-Id"))?;
            metadata.insert("message_id", MetadataValue::Bytes(decoded));
        }

        Ok(CreationRequest {
            upload_length,
            metadata,
        })
    }
}
