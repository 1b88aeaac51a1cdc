use crate::shared::frame::Frame;

/// Domain interface for naming the faces visible in a frame.
///
/// Returns one label per detected face, in a stable order. Faces that
/// match nobody are reported as [`UNKNOWN_LABEL`](crate::shared::constants::UNKNOWN_LABEL);
/// repeats are allowed.
pub trait FaceMatcher: Send {
    fn detect_known_faces(&mut self, frame: &Frame) -> Result<Vec<String>, Box<dyn std::error::Error>>;

    /// Picks up enrollment changes made since the matcher was built.
    fn refresh(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}
