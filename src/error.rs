use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::filesystem::metadata::MetadataError;
use crate::store::StoreError;

/// Errors surfaced by the upload engine and the protocol handlers.
///
/// Every variant maps onto exactly one tus status code, see [`TusError::status`].
#[derive(Error, Debug)]
pub enum TusError {
    #[error("upload {0} not found")]
    ResourceNotFound(Uuid),

    #[error("upload {0} is gone")]
    Gone(Uuid),

    #[error("no upload with id {0}")]
    InvalidResourceId(String),

    #[error("offset mismatch: expected {expected}, received {received}")]
    OffsetConflict { expected: u64, received: u64 },

    #[error("chunk at offset {offset} with length {length} exceeds upload length {declared}")]
    SizeExceeded {
        offset: u64,
        length: u64,
        declared: u64,
    },

    #[error("upload length {declared} exceeds maximum of {max} bytes")]
    FileTooLarge { declared: u64, max: u64 },

    #[error("file with same name already exists: {0}")]
    NameConflict(String),

    #[error("storage fault for upload {resource_id} at {}: {source}", .path.display())]
    StorageFault {
        resource_id: Uuid,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    #[error("invalid upload metadata: {0}")]
    InvalidMetadata(#[from] MetadataError),

    #[error("unable to read request body: {0}")]
    InvalidBody(String),

    #[error("unsupported media type")]
    UnsupportedMediaType,

    #[error("content length {declared} does not match body length {actual}")]
    ContentLengthMismatch { declared: u64, actual: u64 },

    #[error("metadata store error: {0}")]
    Store(#[from] StoreError),
}

impl TusError {
    pub fn status(&self) -> StatusCode {
        match self {
            TusError::ResourceNotFound(_) | TusError::InvalidResourceId(_) => StatusCode::NOT_FOUND,
            TusError::Gone(_) => StatusCode::GONE,
            TusError::OffsetConflict { .. } | TusError::NameConflict(_) => StatusCode::CONFLICT,
            TusError::SizeExceeded { .. } | TusError::FileTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            TusError::InvalidHeader(_)
            | TusError::InvalidMetadata(_)
            | TusError::InvalidBody(_)
            | TusError::ContentLengthMismatch { .. } => StatusCode::BAD_REQUEST,
            TusError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            TusError::StorageFault { .. } | TusError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Turns a missing resource into the `410 Gone` answer the PATCH verb uses.
    pub fn into_gone(self) -> Self {
        match self {
            TusError::ResourceNotFound(id) => TusError::Gone(id),
            other => other,
        }
    }
}

impl IntoResponse for TusError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            match &self {
                // the engine already logged it with the upload's context
                TusError::StorageFault { .. } => tracing::debug!("{}", self),
                _ => tracing::error!(error = ?self, "{}", self),
            }
            return (status, "Internal Server Error").into_response();
        }

        tracing::debug!(status = status.as_u16(), "{}", self);
        (status, self.to_string()).into_response()
    }
}

/// Startup failures while reading [`crate::config::TusConfig`].
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("TUS_UPLOAD_DIR is not set")]
    MissingUploadDir,

    #[error("TUS_DESTINATION_DIR is not set")]
    MissingDestinationDir,

    #[error("unknown file name format: {0}")]
    UnknownFileNameFormat(String),

    #[error("unknown existing file policy: {0}")]
    UnknownExistingFilePolicy(String),

    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} is {value}, the maximum is {max}")]
    OutOfRange { var: &'static str, value: u64, max: u64 },
}
