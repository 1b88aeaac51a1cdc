use std::fs;
use std::path::{Path, PathBuf};

use crate::capture::infrastructure::image_file_loader::load_rgb_frame;
use crate::detection::domain::face_locator::FaceLocator;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::face_gallery::FaceGallery;
use crate::recognition::domain::face_matcher::FaceMatcher;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Face matcher that locates faces, embeds each crop and looks the
/// embedding up in an enrolled gallery.
///
/// Known faces are enrolled from image files; the file stem is the
/// identity label (`alice.jpg` → `"alice"`).
pub struct EmbeddingFaceMatcher {
    locator: Box<dyn FaceLocator>,
    embedder: Box<dyn FaceEmbedder>,
    gallery: FaceGallery,
    known_faces_dir: Option<PathBuf>,
}

impl EmbeddingFaceMatcher {
    pub fn new(
        locator: Box<dyn FaceLocator>,
        embedder: Box<dyn FaceEmbedder>,
        gallery: FaceGallery,
    ) -> Self {
        Self {
            locator,
            embedder,
            gallery,
            known_faces_dir: None,
        }
    }

    pub fn gallery(&self) -> &FaceGallery {
        &self.gallery
    }

    /// Replaces the gallery with every image in `dir`. Returns how many
    /// images were enrolled.
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize, Box<dyn std::error::Error>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_image(p))
            .collect();
        paths.sort();

        self.gallery.clear();
        self.known_faces_dir = Some(dir.to_path_buf());

        let mut enrolled = 0;
        for path in &paths {
            match self.enroll_image(path) {
                Ok(true) => enrolled += 1,
                Ok(false) => log::warn!("No face found in {}, skipping", path.display()),
                Err(e) => log::warn!("Failed to enroll {}: {e}", path.display()),
            }
        }
        log::info!(
            "Enrolled {enrolled}/{} known face images from {}",
            paths.len(),
            dir.display()
        );
        Ok(enrolled)
    }

    /// Re-reads the directory last passed to [`load_directory`](Self::load_directory).
    pub fn reload(&mut self) -> Result<usize, Box<dyn std::error::Error>> {
        let dir = self
            .known_faces_dir
            .clone()
            .ok_or("No known faces directory loaded")?;
        self.load_directory(&dir)
    }

    /// Enrolls one image under its file stem. Returns `false` when the
    /// image contains no face.
    pub fn enroll_image(&mut self, path: &Path) -> Result<bool, Box<dyn std::error::Error>> {
        let label = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| format!("Invalid file name: {}", path.display()))?
            .to_string();
        let frame = load_rgb_frame(path)?;
        self.enroll_frame(&label, &frame)
    }

    /// Enrolls the largest face in `frame` under `label`.
    pub fn enroll_frame(
        &mut self,
        label: &str,
        frame: &Frame,
    ) -> Result<bool, Box<dyn std::error::Error>> {
        let boxes = self.locator.locate(frame)?;
        let Some(largest) = boxes
            .iter()
            .max_by(|a, b| a.area().partial_cmp(&b.area()).unwrap_or(std::cmp::Ordering::Equal))
        else {
            return Ok(false);
        };
        let Some(crop) = frame.crop(largest) else {
            return Ok(false);
        };
        let embedding = self.embedder.embed(&crop)?;
        self.gallery.add(label, embedding);
        Ok(true)
    }
}

impl FaceMatcher for EmbeddingFaceMatcher {
    fn detect_known_faces(&mut self, frame: &Frame) -> Result<Vec<String>, Box<dyn std::error::Error>> {
        let boxes = self.locator.locate(frame)?;
        let mut labels = Vec::with_capacity(boxes.len());
        for bbox in &boxes {
            let Some(crop) = frame.crop(bbox) else {
                continue;
            };
            let embedding = self.embedder.embed(&crop)?;
            labels.push(self.gallery.identify(&embedding));
        }
        Ok(labels)
    }

    fn refresh(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.known_faces_dir.is_some() {
            self.reload()?;
        }
        Ok(())
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
