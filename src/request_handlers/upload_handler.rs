use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Path, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    BoxError,
};
use bytes::Bytes;

use super::parse_resource_id;
use crate::events::UploadFinished;
use crate::{TusError, TusHeaderMap, TusState};

const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

pub struct UploadRequest {
    upload_offset: u64,
    upload_bytes: Bytes,
}

/// Appends a chunk to an upload, finalizing the upload once its last byte arrived.
pub async fn upload_handler(
    State(state): State<TusState>,
    Path(resource_id): Path<String>,
    req: UploadRequest,
) -> Result<Response, TusError> {
    let resource_id = parse_resource_id(&resource_id)?;
    let files = &state.files;

    let mut file = files.load(resource_id).await.map_err(TusError::into_gone)?;

    if !files.is_valid(&file).await? {
        return Err(TusError::Gone(resource_id));
    }

    let offset = files
        .write_chunk(&mut file, req.upload_offset, &req.upload_bytes)
        .await
        .map_err(TusError::into_gone)?;

    if file.is_complete() {
        // file transfer complete, rename from resource id to actual filename
        let final_filename = files.finalize(&mut file).await.map_err(TusError::into_gone)?;

        let event = UploadFinished {
            upload_file_path: files.destination_path(&final_filename),
            destination_folder: files.destination_dir().to_path_buf(),
            upload_url: state.config.upload_url.clone(),
            file_size: file.file_size,
            metadata: file.metadata,
            resource_id,
            final_filename,
        };
        state.notifier.upload_finished(event).await;
    }

    let headers = TusHeaderMap {
        upload_offset: Some(offset),
        ..Default::default()
    };
    let mut response = StatusCode::NO_CONTENT.into_response();
    headers.apply(response.headers_mut());

    Ok(response)
}

#[async_trait]
impl<S, B> FromRequest<S, B> for UploadRequest
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
    S: Send + Sync,
{
    type Rejection = TusError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let headers = req.headers();

        let header_map = TusHeaderMap::from_headers(headers);
        let upload_offset = header_map
            .upload_offset
            .ok_or(TusError::InvalidHeader("Upload-Offset"))?;

        match headers.get(header::CONTENT_TYPE) {
            Some(content_type) if content_type == OFFSET_OCTET_STREAM => {}
            Some(_) => return Err(TusError::UnsupportedMediaType),
            None => return Err(TusError::InvalidHeader("Content-Type")),
        }

        let declared_length = match headers.get(header::CONTENT_LENGTH) {
            Some(value) => Some(
                value
                    .to_str()
                    .ok()
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .ok_or(TusError::InvalidHeader("Content-Length"))?,
            ),
            None => None,
        };

        let upload_bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| TusError::InvalidBody(e.to_string()))?;

        // The chunk length the offset advances by must be the one the client declared.
        if let Some(declared) = declared_length {
            let actual = upload_bytes.len() as u64;
            if declared != actual {
                return Err(TusError::ContentLengthMismatch { declared, actual });
            }
        }

        Ok(UploadRequest {
            upload_offset,
            upload_bytes,
        })
    }
}
