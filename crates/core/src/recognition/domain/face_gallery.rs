use crate::shared::constants::UNKNOWN_LABEL;

/// Default cosine similarity needed to call two embeddings the same person.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.4;

/// Enrolled identities and their reference embeddings.
///
/// A label may be enrolled more than once (several photos of the same
/// person); lookups pick the single closest reference.
pub struct FaceGallery {
    entries: Vec<(String, Vec<f32>)>,
    threshold: f64,
}

impl FaceGallery {
    pub fn new(threshold: f64) -> Self {
        Self {
            entries: Vec::new(),
            threshold,
        }
    }

    pub fn add(&mut self, label: impl Into<String>, embedding: Vec<f32>) {
        self.entries.push((label.into(), embedding));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enrolled labels, deduplicated, in enrollment order.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for (label, _) in &self.entries {
            if !labels.contains(&label.as_str()) {
                labels.push(label.as_str());
            }
        }
        labels
    }

    /// Label of the closest reference at or above the threshold, else
    /// [`UNKNOWN_LABEL`].
    pub fn identify(&self, embedding: &[f32]) -> String {
        self.entries
            .iter()
            .map(|(label, reference)| (label, cosine_similarity(reference, embedding)))
            .filter(|(_, sim)| *sim >= self.threshold)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(label, _)| label.clone())
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
    }
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product of L2-normalized vectors equals cosine similarity.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum()
}
