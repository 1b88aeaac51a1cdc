/// YOLO face locator using ONNX Runtime via `ort`.
///
/// Rows are `[cx, cy, w, h, conf, keypoints...]`; keypoints are ignored
/// since matching only needs the face crop.
use std::path::Path;

use crate::detection::domain::face_locator::FaceLocator;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

use super::execution_provider::build_session;
use super::yolo::{self, NMS_IOU_THRESH};

/// Default confidence threshold for face boxes.
pub const DEFAULT_FACE_CONFIDENCE: f64 = 0.5;

pub struct OnnxFaceLocator {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxFaceLocator {
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;
        let input_size = yolo::model_input_size(&session);
        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
        let (rows, boxed) = yolo::infer_rows(&mut self.session, frame, self.input_size)?;
        Ok(parse_rows(&rows, self.confidence)
            .into_iter()
            .map(|b| boxed.unmap(b))
            .collect())
    }
}

fn parse_rows(rows: &[Vec<f32>], confidence: f64) -> Vec<BoundingBox> {
    let scored: Vec<(BoundingBox, f64)> = rows
        .iter()
        .filter(|row| row.len() >= 5 && row[4] as f64 >= confidence)
        .map(|row| {
            (
                BoundingBox::from_center(row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64),
                row[4] as f64,
            )
        })
        .collect();

    let mut boxes: Vec<BoundingBox> = yolo::nms(scored, NMS_IOU_THRESH, |d| *d)
        .into_iter()
        .map(|(b, _)| b)
        .collect();
    boxes.sort_by(|a, b| a.x1.partial_cmp(&b.x1).unwrap_or(std::cmp::Ordering::Equal));
    boxes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cx: f32, conf: f32) -> Vec<f32> {
        vec![cx, 100.0, 40.0, 40.0, conf, 0.0, 0.0, 0.0]
    }

    #[test]
    fn test_parse_filters_by_confidence() {
        let boxes = parse_rows(&[row(100.0, 0.9), row(300.0, 0.3)], 0.5);
        assert_eq!(boxes.len(), 1);
    }

    #[test]
    fn test_parse_orders_left_to_right() {
        let boxes = parse_rows(&[row(300.0, 0.9), row(100.0, 0.6)], 0.5);
        assert_eq!(boxes.len(), 2);
        assert!(boxes[0].x1 < boxes[1].x1);
    }

    #[test]
    fn test_parse_suppresses_duplicates() {
        let boxes = parse_rows(&[row(100.0, 0.9), row(101.0, 0.8)], 0.5);
        assert_eq!(boxes.len(), 1);
    }
}
