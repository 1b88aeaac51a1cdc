use std::collections::{HashMap, HashSet};

use chrono::TimeDelta;

use crate::events::domain::detection_snapshot::DetectionSnapshot;
use crate::shared::timestamp::Timestamp;

/// Tracks when each identity was last seen and which ones have already
/// been reported.
///
/// An identity is reported once per continuous sighting. It becomes
/// reportable again only after it has been out of view for longer than
/// `save_interval`.
#[derive(Debug, Clone)]
pub struct FacePresenceTracker {
    save_interval: TimeDelta,
    last_seen_at: HashMap<String, Timestamp>,
    already_saved: HashSet<String>,
}

impl FacePresenceTracker {
    pub fn new(save_interval: TimeDelta) -> Self {
        Self {
            save_interval,
            last_seen_at: HashMap::new(),
            already_saved: HashSet::new(),
        }
    }

    /// Updates recency for every face on the frame, evicts stale reported
    /// identities, then returns the first unreported face if the frame
    /// was classified real.
    ///
    /// Only one identity is returned per frame; other new faces stay
    /// unreported and qualify on the next frame they appear in.
    pub fn observe(&mut self, snapshot: &DetectionSnapshot) -> Option<String> {
        let now = snapshot.timestamp;
        let visible: HashSet<&str> = snapshot.faces_seen.iter().map(String::as_str).collect();

        for name in &snapshot.faces_seen {
            self.last_seen_at.insert(name.clone(), now);
        }

        let interval = self.save_interval;
        let last_seen_at = &self.last_seen_at;
        self.already_saved.retain(|name| {
            if visible.contains(name.as_str()) {
                return true;
            }
            let last = last_seen_at.get(name).copied().unwrap_or(now);
            now - last <= interval
        });

        // Recency of unreported identities never affects a decision.
        let already_saved = &self.already_saved;
        self.last_seen_at
            .retain(|name, last| already_saved.contains(name) || now - *last <= interval);

        if !snapshot.is_real_detected {
            return None;
        }

        let new_face = snapshot
            .faces_seen
            .iter()
            .find(|name| !self.already_saved.contains(name.as_str()))?
            .clone();
        self.already_saved.insert(new_face.clone());
        Some(new_face)
    }

    pub fn is_saved(&self, label: &str) -> bool {
        self.already_saved.contains(label)
    }

    pub fn last_seen_at(&self, label: &str) -> Option<Timestamp> {
        self.last_seen_at.get(label).copied()
    }

    pub fn saved_count(&self) -> usize {
        self.already_saved.len()
    }
}
