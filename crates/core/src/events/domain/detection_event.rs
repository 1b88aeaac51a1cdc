use serde::{Deserialize, Serialize};

use crate::shared::constants::{FAKE_EVENT_LABEL, FAKE_FILE_PREFIX, FILE_TIMESTAMP_FORMAT};
use crate::shared::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Real,
    Fake,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Real => "real",
            Classification::Fake => "fake",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A debounced, noteworthy sighting that gets persisted and uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub label: String,
    pub classification: Classification,
    pub timestamp: Timestamp,
}

impl DetectionEvent {
    pub fn fake(timestamp: Timestamp) -> Self {
        Self {
            label: FAKE_EVENT_LABEL.to_string(),
            classification: Classification::Fake,
            timestamp,
        }
    }

    pub fn real(label: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            label: label.into(),
            classification: Classification::Real,
            timestamp,
        }
    }

    /// `{label}_{time}.jpg` for real events, `fake_{time}.jpg` for fakes.
    ///
    /// Path separators in labels become `_` so a label can never escape
    /// the output directory.
    pub fn file_name(&self) -> String {
        let stem = match self.classification {
            Classification::Fake => FAKE_FILE_PREFIX.to_string(),
            Classification::Real => self.label.replace(['/', '\\'], "_"),
        };
        format!("{stem}_{}.jpg", self.timestamp.format(FILE_TIMESTAMP_FORMAT))
    }

    /// ISO-8601 timestamp truncated to whole seconds, as sent to the backend.
    pub fn upload_timestamp(&self) -> String {
        self.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_milli_opt(9, 3, 7, 250)
            .unwrap()
    }

    #[test]
    fn test_fake_event() {
        let e = DetectionEvent::fake(ts());
        assert_eq!(e.label, "not recognized");
        assert_eq!(e.classification, Classification::Fake);
        assert_eq!(e.file_name(), "fake_2024-05-01_09-03-07.jpg");
    }

    #[test]
    fn test_real_event_file_name() {
        let e = DetectionEvent::real("alice", ts());
        assert_eq!(e.classification, Classification::Real);
        assert_eq!(e.file_name(), "alice_2024-05-01_09-03-07.jpg");
    }

    #[test]
    fn test_unknown_is_a_regular_label() {
        let e = DetectionEvent::real("Unknown", ts());
        assert_eq!(e.file_name(), "Unknown_2024-05-01_09-03-07.jpg");
    }

    #[test]
    fn test_file_name_strips_path_separators() {
        let e = DetectionEvent::real("../etc\\passwd", ts());
        assert_eq!(e.file_name(), ".._etc_passwd_2024-05-01_09-03-07.jpg");
    }

    #[test]
    fn test_upload_timestamp_drops_subseconds() {
        let e = DetectionEvent::real("alice", ts());
        assert_eq!(e.upload_timestamp(), "2024-05-01T09:03:07");
    }

    #[test]
    fn test_classification_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Classification::Fake).unwrap(), "\"fake\"");
        assert_eq!(Classification::Real.to_string(), "real");
    }
}
