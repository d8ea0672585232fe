use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::filesystem::metadata::Metadata;

/// Emitted once per upload, after its file has been moved into the destination directory.
#[derive(Debug, Clone, Serialize)]
pub struct UploadFinished {
    pub metadata: Metadata,
    pub resource_id: Uuid,
    pub final_filename: String,
    pub upload_file_path: PathBuf,
    pub file_size: u64,
    pub upload_url: String,
    pub destination_folder: PathBuf,
}

/// Receives [`UploadFinished`] events. The PATCH handler awaits delivery before it
/// answers the client, but a failing subscriber never fails the upload.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn upload_finished(&self, event: UploadFinished);
}

/// Writes a log line per finished upload.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl CompletionNotifier for LogNotifier {
    async fn upload_finished(&self, event: UploadFinished) {
        tracing::info!(
            resource_id = %event.resource_id,
            filename = %event.final_filename,
            path = %event.upload_file_path.display(),
            size = event.file_size,
            "Upload finished"
        );
    }
}

/// Forwards events into a bounded channel drained by the application.
///
/// Delivery never waits: an event that finds the channel full or closed is
/// dropped with a warning.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<UploadFinished>,
}

impl ChannelNotifier {
    pub fn new(sender: mpsc::Sender<UploadFinished>) -> Self {
        Self { sender }
    }

    /// Creates a notifier together with the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<UploadFinished>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl CompletionNotifier for ChannelNotifier {
    async fn upload_finished(&self, event: UploadFinished) {
        let resource_id = event.resource_id;
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%resource_id, "Completion channel is full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(%resource_id, "Upload finished but no subscriber is listening");
            }
        }
    }
}
