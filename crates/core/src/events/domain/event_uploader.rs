use std::path::Path;

use crate::events::domain::detection_event::DetectionEvent;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to read event image: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend rejected upload with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upload queue is full")]
    QueueFull,
    #[error("upload worker has stopped")]
    Disconnected,
}

/// Delivers a persisted event image and its metadata to a backend.
pub trait EventUploader: Send {
    fn upload(&self, image_path: &Path, event: &DetectionEvent) -> Result<(), UploadError>;
}

/// Used when no backend is configured.
pub struct NullEventUploader;

impl EventUploader for NullEventUploader {
    fn upload(&self, _image_path: &Path, _event: &DetectionEvent) -> Result<(), UploadError> {
        Ok(())
    }
}
