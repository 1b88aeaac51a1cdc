use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::LIVENESS_CLASS_NAMES;
use crate::shared::frame::Frame;

/// Anti-spoofing verdict for a single detected box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LivenessClass {
    Fake,
    Real,
}

impl LivenessClass {
    /// Maps a model output class index to a verdict, following
    /// [`LIVENESS_CLASS_NAMES`].
    pub fn from_index(index: usize) -> Option<Self> {
        match LIVENESS_CLASS_NAMES.get(index) {
            Some(&"fake") => Some(LivenessClass::Fake),
            Some(&"real") => Some(LivenessClass::Real),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LivenessClass::Fake => "fake",
            LivenessClass::Real => "real",
        }
    }
}

/// Raw, unthresholded detector output.
#[derive(Clone, Debug, PartialEq)]
pub struct LivenessCandidate {
    pub confidence: f64,
    pub class: LivenessClass,
    pub bbox: BoundingBox,
}

/// Domain interface for the real/fake classifier.
///
/// Returns every candidate box; deciding what counts as a sighting is
/// left to the caller.
pub trait LivenessDetector: Send {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<LivenessCandidate>, Box<dyn std::error::Error>>;
}
