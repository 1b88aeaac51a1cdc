use std::path::{Path, PathBuf};

use crate::capture::domain::frame_persister::FramePersister;
use crate::shared::frame::Frame;

/// Saves event frames as image files under a fixed directory using the
/// `image` crate. The format follows the file extension.
pub struct ImageFilePersister {
    output_dir: PathBuf,
}

impl ImageFilePersister {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl FramePersister for ImageFilePersister {
    fn save(&self, frame: &Frame, file_name: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(file_name);

        let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or("Failed to create image from frame data")?;
        img.save(&path)?;
        Ok(path)
    }
}
