use chrono::TimeDelta;

use crate::events::domain::detection_event::DetectionEvent;
use crate::events::domain::detection_snapshot::DetectionSnapshot;
use crate::events::domain::face_presence_tracker::FacePresenceTracker;
use crate::events::domain::fake_episode_tracker::FakeEpisodeTracker;

/// Per-session dedup state for both event kinds.
///
/// Decides at most one [`DetectionEvent`] per frame. Fake-priority frames
/// only reach the fake tracker; identity bookkeeping is left untouched.
#[derive(Debug, Clone)]
pub struct EventDecisionEngine {
    fake: FakeEpisodeTracker,
    faces: FacePresenceTracker,
}

impl EventDecisionEngine {
    pub fn new(save_interval: TimeDelta) -> Self {
        Self {
            fake: FakeEpisodeTracker::new(save_interval),
            faces: FacePresenceTracker::new(save_interval),
        }
    }

    pub fn decide(&mut self, snapshot: &DetectionSnapshot) -> Option<DetectionEvent> {
        if snapshot.is_fake_priority() {
            return self
                .fake
                .observe(snapshot)
                .then(|| DetectionEvent::fake(snapshot.timestamp));
        }

        // Never emits here; lets an open fake episode close.
        self.fake.observe(snapshot);
        self.faces
            .observe(snapshot)
            .map(|label| DetectionEvent::real(label, snapshot.timestamp))
    }

    pub fn fake_tracker(&self) -> &FakeEpisodeTracker {
        &self.fake
    }

    pub fn face_tracker(&self) -> &FacePresenceTracker {
        &self.faces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::domain::detection_event::Classification;
    use crate::shared::timestamp::Timestamp;
    use chrono::NaiveDate;

    fn t(secs: i64) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            + TimeDelta::seconds(secs)
    }

    fn fake(secs: i64) -> DetectionSnapshot {
        DetectionSnapshot {
            timestamp: t(secs),
            is_real_detected: false,
            is_fake_detected: true,
            faces_seen: Vec::new(),
        }
    }

    fn real(secs: i64, faces: &[&str]) -> DetectionSnapshot {
        DetectionSnapshot {
            timestamp: t(secs),
            is_real_detected: true,
            is_fake_detected: false,
            faces_seen: faces.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn engine() -> EventDecisionEngine {
        EventDecisionEngine::new(TimeDelta::seconds(10))
    }

    #[test]
    fn test_fake_event_has_fixed_label() {
        let mut e = engine();
        let event = e.decide(&fake(0)).unwrap();
        assert_eq!(event.label, "not recognized");
        assert_eq!(event.classification, Classification::Fake);
        assert_eq!(event.timestamp, t(0));
    }

    #[test]
    fn test_one_fake_event_per_episode() {
        let mut e = engine();
        let emitted = (0..20).filter_map(|s| e.decide(&fake(s))).count();
        assert_eq!(emitted, 1);
    }

    #[test]
    fn test_fake_after_silence_is_new_event() {
        let mut e = engine();
        assert!(e.decide(&fake(0)).is_some());
        assert!(e.decide(&fake(11)).is_some());
    }

    #[test]
    fn test_real_identity_emits_once_then_again_after_absence() {
        let mut e = engine();
        let first = e.decide(&real(0, &["alice"])).unwrap();
        assert_eq!(first.label, "alice");
        assert_eq!(first.classification, Classification::Real);
        assert!(e.decide(&real(1, &["alice"])).is_none());
        assert_eq!(e.decide(&real(12, &["alice"])).unwrap().label, "alice");
    }

    #[test]
    fn test_fake_frame_does_not_touch_identity_state() {
        let mut e = engine();
        let mut frame = fake(0);
        frame.is_real_detected = true;
        frame.faces_seen = vec!["alice".into()];
        let event = e.decide(&frame).unwrap();
        assert_eq!(event.classification, Classification::Fake);
        assert_eq!(e.face_tracker().last_seen_at("alice"), None);
        assert!(!e.face_tracker().is_saved("alice"));
    }

    #[test]
    fn test_real_frame_during_fake_episode_still_emits_identity() {
        let mut e = engine();
        e.decide(&fake(0));
        assert_eq!(e.decide(&real(1, &["bob"])).unwrap().label, "bob");
        assert!(e.fake_tracker().already_saved());
    }

    #[test]
    fn test_real_frames_close_fake_episode() {
        let mut e = engine();
        e.decide(&fake(0));
        e.decide(&real(11, &[]));
        assert!(!e.fake_tracker().already_saved());
    }

    #[test]
    fn test_two_new_identities_are_emitted_on_consecutive_frames() {
        let mut e = engine();
        assert_eq!(e.decide(&real(0, &["alice", "bob"])).unwrap().label, "alice");
        assert_eq!(e.decide(&real(1, &["alice", "bob"])).unwrap().label, "bob");
        assert!(e.decide(&real(2, &["alice", "bob"])).is_none());
    }
}
