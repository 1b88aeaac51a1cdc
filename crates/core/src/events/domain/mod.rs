pub mod detection_event;
pub mod detection_snapshot;
pub mod event_decision_engine;
pub mod event_uploader;
pub mod face_presence_tracker;
pub mod fake_episode_tracker;
