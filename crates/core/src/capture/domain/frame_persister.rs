use std::path::PathBuf;

use crate::shared::frame::Frame;

/// Writes an event frame to durable storage.
pub trait FramePersister: Send {
    /// Saves `frame` under `file_name` and returns where it landed.
    fn save(&self, frame: &Frame, file_name: &str) -> Result<PathBuf, Box<dyn std::error::Error>>;
}
