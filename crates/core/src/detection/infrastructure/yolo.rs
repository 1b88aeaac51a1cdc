//! Shared pre/post-processing for YOLO-family ONNX exports.
//!
//! Both the liveness model and the face model take a letterboxed NCHW
//! float tensor and emit one row of features per anchor.

use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Fallback input resolution when the model doesn't specify dimensions.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
pub const NMS_IOU_THRESH: f64 = 0.45;

/// A letterboxed model input plus the transform back to frame coordinates.
pub struct Letterbox {
    pub tensor: ndarray::Array4<f32>,
    pub scale: f64,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Maps a box in model input coordinates back onto the source frame.
    pub fn unmap(&self, bbox: BoundingBox) -> BoundingBox {
        let px = self.pad_x as f64;
        let py = self.pad_y as f64;
        BoundingBox::new(
            (bbox.x1 - px) / self.scale,
            (bbox.y1 - py) / self.scale,
            (bbox.x2 - px) / self.scale,
            (bbox.y2 - py) / self.scale,
        )
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
pub fn letterbox(frame: &Frame, target_size: u32) -> Letterbox {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = (fw * scale).round() as u32;
    let new_h = (fh * scale).round() as u32;
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padded area is 114/255 gray, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    Letterbox {
        tensor,
        scale,
        pad_x,
        pad_y,
    }
}

/// Reads the square input size from an NCHW model input, if static.
pub fn model_input_size(session: &ort::session::Session) -> u32 {
    session
        .inputs()
        .first()
        .and_then(|input| {
            if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                if shape.len() >= 4 && shape[2] > 0 {
                    Some(shape[2] as u32)
                } else {
                    None
                }
            } else {
                None
            }
        })
        .unwrap_or(DEFAULT_INPUT_SIZE)
}

/// Runs one letterboxed inference and returns per-anchor feature rows.
pub fn infer_rows(
    session: &mut ort::session::Session,
    frame: &Frame,
    input_size: u32,
) -> Result<(Vec<Vec<f32>>, Letterbox), Box<dyn std::error::Error>> {
    let boxed = letterbox(frame, input_size);
    let input_value = ort::value::Tensor::from_array(boxed.tensor.clone())?;
    let outputs = session.run(ort::inputs![input_value])?;
    if outputs.len() == 0 {
        return Err("YOLO model produced no outputs".into());
    }
    let tensor = outputs[0].try_extract_array::<f32>()?;
    let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
    let rows = output_rows(tensor.shape(), data)?;
    Ok((rows, boxed))
}

/// Splits a `[1, features, anchors]` or `[1, anchors, features]` output
/// into one row per anchor.
///
/// Exports are usually transposed (features first); the smaller of the
/// two trailing dimensions is taken to be the feature axis.
pub fn output_rows(shape: &[usize], data: &[f32]) -> Result<Vec<Vec<f32>>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if data.len() < num_dets * num_feats {
        return Err(format!(
            "YOLO output has {} values, shape {shape:?} needs {}",
            data.len(),
            num_dets * num_feats
        )
        .into());
    }

    let rows = (0..num_dets)
        .map(|i| {
            if transposed {
                (0..num_feats).map(|f| data[f * num_dets + i]).collect()
            } else {
                data[i * num_feats..(i + 1) * num_feats].to_vec()
            }
        })
        .collect();
    Ok(rows)
}

/// Greedy NMS: sort by score descending, suppress overlapping boxes.
pub fn nms<T, F>(mut items: Vec<T>, iou_thresh: f64, key: F) -> Vec<T>
where
    F: Fn(&T) -> (BoundingBox, f64),
{
    items.sort_by(|a, b| {
        key(b)
            .1
            .partial_cmp(&key(a).1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<T> = Vec::new();
    for item in items {
        let (bbox, _) = key(&item);
        let suppressed = keep.iter().any(|k| key(k).0.iou(&bbox) > iou_thresh);
        if !suppressed {
            keep.push(item);
        }
    }
    keep
}
