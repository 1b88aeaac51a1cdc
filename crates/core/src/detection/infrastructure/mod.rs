pub mod execution_provider;
pub mod onnx_face_locator;
pub mod onnx_liveness_detector;
pub mod yolo;
