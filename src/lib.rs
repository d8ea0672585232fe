pub mod config;
pub mod error;
pub mod events;
pub mod filesystem;
pub mod store;
mod request_handlers;
mod tus_service;

pub use config::{ExistingFilePolicy, TusConfig};
pub use error::{ConfigError, TusError};
pub use events::{ChannelNotifier, CompletionNotifier, LogNotifier, UploadFinished};
pub use filesystem::file_store::{TusFile, TusFileStore};
pub use filesystem::filename::FileNameFormat;
pub use filesystem::metadata::{Metadata, MetadataValue};
pub use request_handlers::{tus_app, tus_routes};
pub use store::{MemoryStore, MetadataStore, StoreError};
pub use tus_service::{cors_layer, TusLayer, TusService};

use http::header::HeaderMap;
use http::header::HeaderValue;
use std::str::FromStr;
use std::sync::Arc;

pub const TUS_VERSION: &str = "1.0.0";
pub const TUS_SUPPORTED_VERSIONS: &[&str] = &["1.0.0"];
pub const TUS_EXTENSIONS: &[&str] = &["creation", "termination"];

// TUS Headers for its protocol
#[derive(Debug)]
pub enum AxumTusHeaders {
    MaxSize,
    Extensions,
    Version,
    Resumable,
    UploadLength,
    UploadOffset,
    UploadMetadata,
    MessageId,
    MethodOverride,
}

impl AxumTusHeaders {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MaxSize => "Tus-Max-Size",
            Self::Extensions => "Tus-Extension",
            Self::Version => "Tus-Version",
            Self::Resumable => "Tus-Resumable",
            Self::UploadLength => "Upload-Length",
            Self::UploadOffset => "Upload-Offset",
            Self::UploadMetadata => "Upload-Metadata",
            Self::MessageId => "Message-Id",
            Self::MethodOverride => "X-HTTP-Method-Override",
        }
    }
}

/// The tus headers of a request or response.
///
/// Parsing is lenient: a header that is missing or malformed is simply `None`,
/// the handlers decide which ones they require.
#[derive(Debug, Default)]
pub struct TusHeaderMap {
    pub(crate) max_size: Option<u64>,
    pub(crate) extensions: Option<Vec<String>>,
    pub(crate) version: Option<Vec<String>>,
    pub(crate) resumable: Option<String>,
    pub(crate) upload_length: Option<u64>,
    pub(crate) upload_metadata: Option<String>,
    pub(crate) upload_offset: Option<u64>,
    pub(crate) message_id: Option<String>,
}

impl TusHeaderMap {
    /// The headers every response of this server carries.
    pub fn with_tus_version(max_size: u64) -> Self {
        Self {
            max_size: Some(max_size),
            extensions: Some(TUS_EXTENSIONS.iter().map(|e| e.to_string()).collect()),
            version: Some(TUS_SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect()),
            resumable: Some(TUS_VERSION.to_string()),
            ..Default::default()
        }
    }

    /// Reads the tus headers a client sends. The server capability headers are
    /// only ever written, see [`TusHeaderMap::with_tus_version`].
    pub fn from_headers(headers: &HeaderMap) -> TusHeaderMap {
        let text = |header: AxumTusHeaders| {
            headers
                .get(header.name())
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string())
        };
        let number = |header: AxumTusHeaders| text(header).and_then(|value| u64::from_str(&value).ok());

        TusHeaderMap {
            resumable: text(AxumTusHeaders::Resumable),
            upload_length: number(AxumTusHeaders::UploadLength),
            upload_metadata: text(AxumTusHeaders::UploadMetadata),
            upload_offset: number(AxumTusHeaders::UploadOffset),
            message_id: text(AxumTusHeaders::MessageId),
            ..Default::default()
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        if let Some(max_size) = &self.max_size {
            headers.insert(AxumTusHeaders::MaxSize.name(), HeaderValue::from(*max_size));
        }

        if let Some(extensions) = &self.extensions {
            insert_text(headers, AxumTusHeaders::Extensions, &extensions.join(","));
        }

        if let Some(version) = &self.version {
            insert_text(headers, AxumTusHeaders::Version, &version.join(","));
        }

        if let Some(resumable) = &self.resumable {
            insert_text(headers, AxumTusHeaders::Resumable, resumable);
        }

        if let Some(upload_length) = &self.upload_length {
            headers.insert(AxumTusHeaders::UploadLength.name(), HeaderValue::from(*upload_length));
        }

        if let Some(upload_metadata) = &self.upload_metadata {
            insert_text(headers, AxumTusHeaders::UploadMetadata, upload_metadata);
        }

        if let Some(upload_offset) = &self.upload_offset {
            headers.insert(AxumTusHeaders::UploadOffset.name(), HeaderValue::from(*upload_offset));
        }
    }
}

fn insert_text(headers: &mut HeaderMap, header: AxumTusHeaders, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(header.name(), value);
        }
        Err(_) => tracing::warn!(header = header.name(), "Skipping header with invalid value"),
    }
}

/// Everything the request handlers share.
#[derive(Clone)]
pub struct TusState {
    pub files: Arc<TusFileStore>,
    pub notifier: Arc<dyn CompletionNotifier>,
    pub config: Arc<TusConfig>,
}

impl TusState {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        notifier: Arc<dyn CompletionNotifier>,
        config: TusConfig,
    ) -> Self {
        Self {
            files: Arc::new(TusFileStore::new(store, &config)),
            notifier,
            config: Arc::new(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_headers_is_lenient() {
        let mut headers = HeaderMap::new();
        headers.insert("tus-resumable", HeaderValue::from_static("1.0.0"));
        headers.insert("upload-length", HeaderValue::from_static("not-a-number"));
        headers.insert("upload-offset", HeaderValue::from_static(" 42 "));
        headers.insert("tus-version", HeaderValue::from_static("1.0.0, 0.2.2"));
        headers.insert("tus-max-size", HeaderValue::from_static("10"));

        let parsed = TusHeaderMap::from_headers(&headers);

        assert_eq!(parsed.resumable.as_deref(), Some("1.0.0"));
        assert_eq!(parsed.upload_length, None);
        assert_eq!(parsed.upload_offset, Some(42));
        assert_eq!(parsed.upload_metadata, None);

        // capability headers are server-side only
        assert_eq!(parsed.version, None);
        assert_eq!(parsed.max_size, None);
    }

    #[test]
    fn test_apply_server_headers() {
        let mut headers = HeaderMap::new();

        TusHeaderMap::with_tus_version(1024).apply(&mut headers);

        assert_eq!(headers["Tus-Resumable"], "1.0.0");
        assert_eq!(headers["Tus-Version"], "1.0.0");
        assert_eq!(headers["Tus-Extension"], "creation,termination");
        assert_eq!(headers["Tus-Max-Size"], "1024");
        assert!(!headers.contains_key("Upload-Offset"));
    }
}
