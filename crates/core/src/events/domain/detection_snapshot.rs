use crate::detection::domain::liveness_detector::{LivenessCandidate, LivenessClass};
use crate::shared::timestamp::Timestamp;

/// Per-frame summary of both classifiers' outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionSnapshot {
    pub timestamp: Timestamp,
    /// At least one box classified "real" above the confidence threshold.
    pub is_real_detected: bool,
    /// At least one box classified "fake" above the confidence threshold.
    pub is_fake_detected: bool,
    /// Identity labels from face matching, in matcher order. Always empty
    /// on fake frames since matching is skipped for them.
    pub faces_seen: Vec<String>,
}

impl DetectionSnapshot {
    /// Thresholds raw detector candidates and ORs them per class.
    ///
    /// A candidate counts only when its confidence is strictly above
    /// `confidence_threshold`.
    pub fn from_candidates(
        timestamp: Timestamp,
        candidates: &[LivenessCandidate],
        confidence_threshold: f64,
    ) -> Self {
        let seen = |class: LivenessClass| {
            candidates
                .iter()
                .any(|c| c.class == class && c.confidence > confidence_threshold)
        };
        Self {
            timestamp,
            is_real_detected: seen(LivenessClass::Real),
            is_fake_detected: seen(LivenessClass::Fake),
            faces_seen: Vec::new(),
        }
    }

    pub fn with_faces(mut self, faces: Vec<String>) -> Self {
        self.faces_seen = faces;
        self
    }

    /// Fake sightings override everything else on the frame.
    pub fn is_fake_priority(&self) -> bool {
        self.is_fake_detected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn ts() -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn candidate(class: LivenessClass, confidence: f64) -> LivenessCandidate {
        LivenessCandidate {
            confidence,
            class,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        }
    }

    #[test]
    fn test_no_candidates() {
        let s = DetectionSnapshot::from_candidates(ts(), &[], 0.6);
        assert!(!s.is_real_detected);
        assert!(!s.is_fake_detected);
        assert!(s.faces_seen.is_empty());
        assert_eq!(s.timestamp, ts());
    }

    #[rstest]
    #[case::below(0.5, false)]
    #[case::at_threshold(0.6, false)]
    #[case::above(0.61, true)]
    fn test_threshold_is_strict(#[case] confidence: f64, #[case] expected: bool) {
        let s = DetectionSnapshot::from_candidates(
            ts(),
            &[candidate(LivenessClass::Real, confidence)],
            0.6,
        );
        assert_eq!(s.is_real_detected, expected);
    }

    #[test]
    fn test_classes_are_independent() {
        let s = DetectionSnapshot::from_candidates(
            ts(),
            &[
                candidate(LivenessClass::Real, 0.9),
                candidate(LivenessClass::Fake, 0.7),
            ],
            0.6,
        );
        assert!(s.is_real_detected);
        assert!(s.is_fake_detected);
        assert!(s.is_fake_priority());
    }

    #[test]
    fn test_any_box_above_threshold_counts() {
        let s = DetectionSnapshot::from_candidates(
            ts(),
            &[
                candidate(LivenessClass::Fake, 0.3),
                candidate(LivenessClass::Fake, 0.8),
            ],
            0.6,
        );
        assert!(s.is_fake_detected);
        assert!(!s.is_real_detected);
    }

    #[test]
    fn test_threshold_is_injectable() {
        let c = [candidate(LivenessClass::Real, 0.5)];
        assert!(!DetectionSnapshot::from_candidates(ts(), &c, 0.6).is_real_detected);
        assert!(DetectionSnapshot::from_candidates(ts(), &c, 0.4).is_real_detected);
    }

    #[test]
    fn test_with_faces() {
        let s = DetectionSnapshot::from_candidates(ts(), &[], 0.6)
            .with_faces(vec!["alice".into(), "Unknown".into()]);
        assert_eq!(s.faces_seen, vec!["alice", "Unknown"]);
    }
}
