use chrono::TimeDelta;

use crate::events::domain::detection_snapshot::DetectionSnapshot;
use crate::shared::timestamp::Timestamp;

/// Debounces fake sightings into episodes.
///
/// An episode stays open while fake sightings keep arriving less than
/// `save_interval` apart; [`observe`](Self::observe) reports `true` only
/// for the first sighting of each episode.
#[derive(Debug, Clone)]
pub struct FakeEpisodeTracker {
    save_interval: TimeDelta,
    already_saved: bool,
    last_seen_at: Option<Timestamp>,
}

impl FakeEpisodeTracker {
    pub fn new(save_interval: TimeDelta) -> Self {
        Self {
            save_interval,
            already_saved: false,
            last_seen_at: None,
        }
    }

    pub fn observe(&mut self, snapshot: &DetectionSnapshot) -> bool {
        // Sightings more than `save_interval` apart are separate episodes,
        // even with no frames in between.
        if self.already_saved {
            if let Some(last) = self.last_seen_at {
                if snapshot.timestamp - last > self.save_interval {
                    self.already_saved = false;
                }
            }
        }

        if !snapshot.is_fake_detected {
            return false;
        }
        self.last_seen_at = Some(snapshot.timestamp);
        if self.already_saved {
            return false;
        }
        self.already_saved = true;
        true
    }

    /// Whether an episode is currently open.
    pub fn already_saved(&self) -> bool {
        self.already_saved
    }

    pub fn last_seen_at(&self) -> Option<Timestamp> {
        self.last_seen_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(secs: i64) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            + TimeDelta::seconds(secs)
    }

    fn frame(secs: i64, fake: bool) -> DetectionSnapshot {
        DetectionSnapshot {
            timestamp: t(secs),
            is_real_detected: false,
            is_fake_detected: fake,
            faces_seen: Vec::new(),
        }
    }

    fn tracker() -> FakeEpisodeTracker {
        FakeEpisodeTracker::new(TimeDelta::seconds(10))
    }

    #[test]
    fn test_first_sighting_emits() {
        let mut tr = tracker();
        assert!(tr.observe(&frame(0, true)));
        assert!(tr.already_saved());
        assert_eq!(tr.last_seen_at(), Some(t(0)));
    }

    #[test]
    fn test_continuous_sightings_emit_once() {
        let mut tr = tracker();
        let emitted: Vec<bool> = (0..30).map(|s| tr.observe(&frame(s, true))).collect();
        assert_eq!(emitted.iter().filter(|e| **e).count(), 1);
    }

    #[test]
    fn test_sightings_with_short_gaps_stay_one_episode() {
        let mut tr = tracker();
        assert!(tr.observe(&frame(0, true)));
        assert!(!tr.observe(&frame(5, false)));
        assert!(!tr.observe(&frame(9, true)));
        assert!(!tr.observe(&frame(15, false)));
        assert!(!tr.observe(&frame(18, true)));
    }

    #[test]
    fn test_new_episode_after_interval_elapses() {
        let mut tr = tracker();
        assert!(tr.observe(&frame(0, true)));
        assert!(!tr.observe(&frame(11, false)));
        assert!(!tr.already_saved());
        assert!(tr.observe(&frame(11, true)));
    }

    #[test]
    fn test_exactly_interval_does_not_close() {
        let mut tr = tracker();
        tr.observe(&frame(0, true));
        tr.observe(&frame(10, false));
        assert!(tr.already_saved());
    }

    #[test]
    fn test_long_gap_between_consecutive_fake_frames_reopens() {
        let mut tr = tracker();
        assert!(tr.observe(&frame(0, true)));
        assert!(tr.observe(&frame(11, true)));
    }

    #[test]
    fn test_non_fake_before_any_sighting_is_noop() {
        let mut tr = tracker();
        assert!(!tr.observe(&frame(0, false)));
        assert!(!tr.already_saved());
        assert_eq!(tr.last_seen_at(), None);
    }
}
