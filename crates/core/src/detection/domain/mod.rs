pub mod face_locator;
pub mod liveness_detector;
