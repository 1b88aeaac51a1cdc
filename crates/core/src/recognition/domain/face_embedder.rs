use crate::shared::frame::Frame;

/// Turns a face crop into an L2-normalized identity embedding.
pub trait FaceEmbedder: Send {
    fn embed(&self, face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>>;
}
