//! Real/fake face classifier backed by a two-class YOLO ONNX export.
//!
//! Each output row is `[cx, cy, w, h, score_fake, score_real]`. The best
//! scoring class becomes the candidate's verdict.

use std::path::Path;

use crate::detection::domain::liveness_detector::{
    LivenessCandidate, LivenessClass, LivenessDetector,
};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

use super::execution_provider::build_session;
use super::yolo::{self, NMS_IOU_THRESH};

/// Candidates scoring below this are dropped before NMS. Decision
/// thresholds are applied later, on the snapshot.
pub const CANDIDATE_FLOOR: f64 = 0.25;

pub struct OnnxLivenessDetector {
    session: ort::session::Session,
    input_size: u32,
}

impl OnnxLivenessDetector {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;
        let input_size = yolo::model_input_size(&session);
        log::info!(
            "Loaded liveness model {} (input {input_size}px)",
            model_path.display()
        );
        Ok(Self {
            session,
            input_size,
        })
    }
}

impl LivenessDetector for OnnxLivenessDetector {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<LivenessCandidate>, Box<dyn std::error::Error>> {
        let (rows, boxed) = yolo::infer_rows(&mut self.session, frame, self.input_size)?;
        let candidates = parse_rows(&rows, CANDIDATE_FLOOR)
            .into_iter()
            .map(|c| LivenessCandidate {
                bbox: boxed.unmap(c.bbox),
                ..c
            })
            .collect();
        Ok(candidates)
    }
}

/// Decodes raw rows into candidates and runs NMS separately per class.
fn parse_rows(rows: &[Vec<f32>], floor: f64) -> Vec<LivenessCandidate> {
    let mut fakes = Vec::new();
    let mut reals = Vec::new();

    for row in rows {
        if row.len() < 5 {
            continue;
        }
        let Some((class_idx, score)) = row[4..]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        else {
            continue;
        };
        let confidence = *score as f64;
        if confidence < floor {
            continue;
        }
        let Some(class) = LivenessClass::from_index(class_idx) else {
            continue;
        };

        let candidate = LivenessCandidate {
            confidence,
            class,
            bbox: BoundingBox::from_center(
                row[0] as f64,
                row[1] as f64,
                row[2] as f64,
                row[3] as f64,
            ),
        };
        match class {
            LivenessClass::Fake => fakes.push(candidate),
            LivenessClass::Real => reals.push(candidate),
        }
    }

    let key = |c: &LivenessCandidate| (c.bbox, c.confidence);
    let mut kept = yolo::nms(fakes, NMS_IOU_THRESH, key);
    kept.extend(yolo::nms(reals, NMS_IOU_THRESH, key));
    kept
}
