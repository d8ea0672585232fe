use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A single `Upload-Metadata` value after base64 decoding.
///
/// Values that decode to valid UTF-8 are kept as text, anything else as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl MetadataValue {
    fn from_decoded(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => MetadataValue::Text(text),
            Err(e) => MetadataValue::Bytes(e.into_bytes()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(text) => Some(text),
            MetadataValue::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MetadataValue::Text(text) => text.as_bytes(),
            MetadataValue::Bytes(bytes) => bytes,
        }
    }
}

/// A struct representing the metadata associated with an uploaded file.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata(HashMap<String, MetadataValue>);

/// An error type representing errors that can occur while dealing with metadata.
#[derive(Error, Debug, PartialEq)]
pub enum MetadataError {
    #[error("value for {key} is not valid base64: {reason}")]
    DecodeError { key: String, reason: String },

    #[error("malformed metadata pair")]
    InvalidMetadataFormat,
}

impl Metadata {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(MetadataValue::as_text)
    }

    pub fn get_raw(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(MetadataValue::as_bytes)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MetadataValue) {
        self.0.insert(key.into(), value);
    }

    pub fn filename(&self) -> Option<&str> {
        self.get_text("filename")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encodes the metadata back into the `Upload-Metadata` header form, keys sorted.
    pub fn to_header_value(&self) -> String {
        let mut keys: Vec<&String> = self.0.keys().collect();
        keys.sort();

        keys.into_iter()
            .map(|key| {
                let value = self.0[key].as_bytes();
                if value.is_empty() {
                    key.clone()
                } else {
                    let encoded = base64::engine::general_purpose::STANDARD.encode(value);
                    format!("{} {}", key, encoded)
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl TryFrom<&str> for Metadata {
    type Error = MetadataError;

    /// Attempts to parse a metadata string into a [`Metadata`] instance.
    ///
    /// The given string should follow the tus [`Upload-Metadata`](https://tus.io/protocols/resumable-upload.html#upload-metadata) definition.
    /// An empty string yields empty metadata.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut metadata = Metadata::new();

        for pair in value.split(',') {
            let pair = pair.trim();

            if pair.is_empty() {
                continue;
            }

            let parts: Vec<&str> = pair.split(' ').filter(|v| !v.is_empty()).collect();

            if parts.is_empty() || parts.len() > 2 {
                return Err(MetadataError::InvalidMetadataFormat);
            }

            let key = parts[0];

            let value = match parts.get(1) {
                Some(encoded) => base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map(MetadataValue::from_decoded)
                    .map_err(|e| MetadataError::DecodeError {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })?,
                None => MetadataValue::Text(String::default()),
            };

            metadata.0.insert(key.to_string(), value);
        }

        Ok(metadata)
    }
}
