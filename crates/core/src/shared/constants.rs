pub const FACE_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const FACE_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Output class order of the liveness model.
pub const LIVENESS_CLASS_NAMES: [&str; 2] = ["fake", "real"];

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;
pub const DEFAULT_SAVE_INTERVAL_SECS: u64 = 10;

/// Label reported by the face matcher for a face with no gallery match.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Label attached to uploads for fake detections.
pub const FAKE_EVENT_LABEL: &str = "not recognized";

pub const FAKE_FILE_PREFIX: &str = "fake";

/// Strftime pattern used in persisted file names.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
