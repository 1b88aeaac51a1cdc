/// ArcFace identity embeddings using ONNX Runtime.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::infrastructure::execution_provider::build_session;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::face_gallery::l2_normalize;
use crate::shared::frame::Frame;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct ArcFaceEmbedder {
    session: Mutex<ort::session::Session>,
}

impl ArcFaceEmbedder {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: Mutex::new(build_session(model_path)?),
        })
    }
}

impl FaceEmbedder for ArcFaceEmbedder {
    fn embed(&self, face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        let tensor = preprocess(face.data(), face.width(), face.height());
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        let mut embedding = embedding_slice.to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(rgb_data: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    if src_w == 0 || src_h == 0 {
        return tensor;
    }

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            if offset + 2 < rgb_data.len() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (rgb_data[offset + c] as f32 - NORM_MEAN) / NORM_STD;
                }
            }
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape() {
        let data = vec![0u8; 40 * 30 * 3];
        let t = preprocess(&data, 40, 30);
        assert_eq!(t.shape(), &[1, 3, INPUT_SIZE, INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_normalizes_to_unit_range() {
        let white = preprocess(&vec![255u8; 8 * 8 * 3], 8, 8);
        let black = preprocess(&vec![0u8; 8 * 8 * 3], 8, 8);
        assert!((white[[0, 0, 50, 50]] - 1.0).abs() < 1e-6);
        assert!((black[[0, 2, 50, 50]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_empty_crop_is_zeros() {
        let t = preprocess(&[], 0, 0);
        assert!(t.iter().all(|v| *v == 0.0));
    }
}
