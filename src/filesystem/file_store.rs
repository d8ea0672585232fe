use std::{
    fmt,
    io::{ErrorKind, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs,
    io::{AsyncSeekExt, AsyncWriteExt},
};
use uuid::Uuid;

use super::{
    filename::{self, FileNameFormat},
    metadata::Metadata,
};
use crate::config::TusConfig;
use crate::error::TusError;
use crate::store::{MetadataStore, StoreError};

/// One upload as tracked in the metadata store.
#[derive(Debug, Clone, PartialEq)]
pub struct TusFile {
    pub resource_id: Uuid,
    pub filename: String,
    pub file_size: u64,
    pub offset: u64,
    pub metadata: Metadata,
}

impl TusFile {
    pub fn is_complete(&self) -> bool {
        self.offset == self.file_size
    }

    /// Checks that `length` bytes may be written at `offset`.
    ///
    /// Only the next contiguous byte range is writable, and it must fit inside
    /// the declared upload length.
    pub fn validate_chunk(&self, offset: u64, length: u64) -> Result<(), TusError> {
        if offset > self.file_size {
            return Err(TusError::SizeExceeded {
                offset,
                length,
                declared: self.file_size,
            });
        }

        if offset != self.offset {
            return Err(TusError::OffsetConflict {
                expected: self.offset,
                received: offset,
            });
        }

        if length > self.file_size - offset {
            return Err(TusError::SizeExceeded {
                offset,
                length,
                declared: self.file_size,
            });
        }

        Ok(())
    }
}

impl fmt::Display for TusFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.filename, self.resource_id)
    }
}

struct StoreKeys {
    filename: String,
    file_size: String,
    offset: String,
    metadata: String,
}

impl StoreKeys {
    fn new(resource_id: Uuid) -> Self {
        let prefix = format!("tus-uploads/{}", resource_id);
        Self {
            filename: format!("{}/filename", prefix),
            file_size: format!("{}/file_size", prefix),
            offset: format!("{}/offset", prefix),
            metadata: format!("{}/metadata", prefix),
        }
    }

    fn all(&self) -> [&str; 4] {
        [
            self.filename.as_str(),
            self.file_size.as_str(),
            self.offset.as_str(),
            self.metadata.as_str(),
        ]
    }
}

/// Owns the lifecycle of uploads: staging files on local disk, progress in a
/// [`MetadataStore`].
///
/// Staging and destination directories must be on the same filesystem, as
/// finished uploads are renamed rather than copied.
pub struct TusFileStore {
    store: Arc<dyn MetadataStore>,
    upload_dir: PathBuf,
    destination_dir: PathBuf,
    timeout: Duration,
    file_name_format: FileNameFormat,
}

impl TusFileStore {
    pub fn new(store: Arc<dyn MetadataStore>, config: &TusConfig) -> Self {
        Self {
            store,
            upload_dir: config.upload_dir.clone(),
            destination_dir: config.destination_dir.clone(),
            timeout: config.timeout,
            file_name_format: config.file_name_format,
        }
    }

    pub fn staging_path(&self, resource_id: Uuid) -> PathBuf {
        self.upload_dir.join(resource_id.to_string())
    }

    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    pub fn destination_path(&self, filename: &str) -> PathBuf {
        self.destination_dir.join(filename)
    }

    pub async fn destination_exists(&self, filename: &str) -> bool {
        filename::exists(&self.destination_path(filename)).await
    }

    /// Registers a new upload and pre-allocates its staging file.
    ///
    /// If the file cannot be allocated the store entries stay behind and expire
    /// with the configured timeout.
    pub async fn create(&self, metadata: Metadata, file_size: u64) -> Result<Uuid, TusError> {
        let resource_id = Uuid::new_v4();
        let keys = StoreKeys::new(resource_id);

        let filename = metadata.filename().unwrap_or_default().to_string();
        let encoded_metadata =
            serde_json::to_string(&metadata).map_err(|e| StoreError::Corrupt {
                key: keys.metadata.clone(),
                reason: e.to_string(),
            })?;

        self.store.add(&keys.filename, filename.clone(), self.timeout).await?;
        self.store.add(&keys.file_size, file_size.to_string(), self.timeout).await?;
        self.store.add(&keys.offset, "0".to_string(), self.timeout).await?;
        self.store.add(&keys.metadata, encoded_metadata, self.timeout).await?;

        let path = self.staging_path(resource_id);
        if let Err(source) = allocate(&path, file_size).await {
            tracing::error!(
                %resource_id,
                file_size,
                path = %path.display(),
                error = %source,
                "Unable to create file"
            );
            return Err(TusError::StorageFault {
                resource_id,
                path,
                source,
            });
        }

        tracing::info!(%resource_id, %filename, file_size, "Created upload");

        Ok(resource_id)
    }

    pub async fn load(&self, resource_id: Uuid) -> Result<TusFile, TusError> {
        let keys = StoreKeys::new(resource_id);
        let not_found = || TusError::ResourceNotFound(resource_id);

        let filename = self.store.get(&keys.filename).await?.ok_or_else(not_found)?;
        let offset = self.store.get(&keys.offset).await?.ok_or_else(not_found)?;
        let file_size = self.store.get(&keys.file_size).await?.ok_or_else(not_found)?;

        let metadata: Metadata = match self.store.get(&keys.metadata).await? {
            Some(encoded) => serde_json::from_str(&encoded).map_err(|e| StoreError::Corrupt {
                key: keys.metadata.clone(),
                reason: e.to_string(),
            })?,
            None => Metadata::default(),
        };

        Ok(TusFile {
            resource_id,
            filename,
            file_size: parse_counter(&keys.file_size, &file_size)?,
            offset: parse_counter(&keys.offset, &offset)?,
            metadata,
        })
    }

    /// False once the upload expired from the store or its staging file vanished.
    pub async fn is_valid(&self, file: &TusFile) -> Result<bool, TusError> {
        let keys = StoreKeys::new(file.resource_id);

        if self.store.get(&keys.filename).await?.is_none() {
            return Ok(false);
        }

        Ok(filename::exists(&self.staging_path(file.resource_id)).await)
    }

    /// Writes `chunk` at `offset` and advances the stored offset by its length.
    ///
    /// The counter only moves once the bytes are on disk.
    pub async fn write_chunk(
        &self,
        file: &mut TusFile,
        offset: u64,
        chunk: &[u8],
    ) -> Result<u64, TusError> {
        let length = chunk.len() as u64;
        file.validate_chunk(offset, length)?;

        let resource_id = file.resource_id;
        let path = self.staging_path(resource_id);

        if let Err(source) = write_at(&path, offset, chunk).await {
            tracing::error!(
                %resource_id,
                offset,
                length,
                file_size = file.file_size,
                path = %path.display(),
                error = %source,
                "Unable to write chunk"
            );
            return Err(TusError::StorageFault {
                resource_id,
                path,
                source,
            });
        }

        let keys = StoreKeys::new(resource_id);
        let new_offset = self
            .store
            .increment(&keys.offset, length)
            .await?
            .ok_or(TusError::ResourceNotFound(resource_id))?;

        for key in keys.all() {
            self.store.touch(key, self.timeout).await?;
        }

        tracing::debug!(%resource_id, offset = new_offset, "Wrote chunk");

        file.offset = new_offset;
        Ok(new_offset)
    }

    /// Moves a complete upload into the destination directory and forgets it.
    ///
    /// Returns the name the file was given.
    pub async fn finalize(&self, file: &mut TusFile) -> Result<String, TusError> {
        let resource_id = file.resource_id;

        if !self.is_valid(file).await? {
            return Err(TusError::ResourceNotFound(resource_id));
        }

        let final_name = match self.file_name_format {
            FileNameFormat::Keep => {
                if self.destination_exists(&file.filename).await {
                    return Err(TusError::NameConflict(file.filename.clone()));
                }
                file.filename.clone()
            }
            format => filename::resolve(&file.filename, &self.destination_dir, format).await,
        };

        let staging = self.staging_path(resource_id);
        let target = self.destination_path(&final_name);

        if let Err(source) = fs::rename(&staging, &target).await {
            tracing::error!(
                %resource_id,
                from = %staging.display(),
                to = %target.display(),
                error = %source,
                "Unable to move finished upload"
            );
            return Err(TusError::StorageFault {
                resource_id,
                path: target,
                source,
            });
        }

        self.clean(resource_id).await?;

        tracing::info!(%resource_id, filename = %final_name, "Finalized upload");

        file.filename = final_name.clone();
        Ok(final_name)
    }

    /// Abandons an upload, removing its staging file and store entries.
    pub async fn terminate(&self, resource_id: Uuid) -> Result<(), TusError> {
        self.load(resource_id).await?;

        let path = self.staging_path(resource_id);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                tracing::error!(
                    %resource_id,
                    path = %path.display(),
                    error = %source,
                    "Unable to remove staging file"
                );
                return Err(TusError::StorageFault {
                    resource_id,
                    path,
                    source,
                });
            }
        }

        self.clean(resource_id).await?;
        tracing::info!(%resource_id, "Terminated upload");
        Ok(())
    }

    async fn clean(&self, resource_id: Uuid) -> Result<(), TusError> {
        let keys = StoreKeys::new(resource_id);
        let all: Vec<String> = keys.all().iter().map(|k| k.to_string()).collect();
        self.store.delete_many(&all).await?;
        Ok(())
    }
}

async fn allocate(path: &Path, size: u64) -> std::io::Result<()> {
    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.set_len(size).await
}

async fn write_at(path: &Path, offset: u64, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new().write(true).open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    file.write_all(data).await?;
    file.flush().await
}

fn parse_counter(key: &str, value: &str) -> Result<u64, StoreError> {
    value.parse().map_err(|_| StoreError::NotANumber(key.to_string()))
}
