use std::time::Instant;

use chrono::TimeDelta;

use crate::capture::domain::frame_persister::FramePersister;
use crate::detection::domain::liveness_detector::LivenessDetector;
use crate::events::domain::detection_event::DetectionEvent;
use crate::events::domain::detection_snapshot::DetectionSnapshot;
use crate::events::domain::event_decision_engine::EventDecisionEngine;
use crate::events::domain::event_uploader::{EventUploader, UploadError};
use crate::pipeline::monitor_config::MonitorConfig;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::recognition::domain::face_matcher::FaceMatcher;
use crate::shared::frame::Frame;
use crate::shared::timestamp::Timestamp;

/// Per-frame processing: snapshot → decide → persist → upload.
///
/// Owns the collaborators and the session's dedup state. Collaborator
/// failures surface as `Err` before any tracker state changes; persist
/// and upload failures are logged and never undo a decision.
pub struct EventPipeline {
    detector: Box<dyn LivenessDetector>,
    matcher: Box<dyn FaceMatcher>,
    persister: Box<dyn FramePersister>,
    uploader: Box<dyn EventUploader>,
    logger: Box<dyn PipelineLogger>,
    confidence_threshold: f64,
    save_interval: TimeDelta,
    engine: EventDecisionEngine,
}

impl EventPipeline {
    pub fn new(
        detector: Box<dyn LivenessDetector>,
        matcher: Box<dyn FaceMatcher>,
        persister: Box<dyn FramePersister>,
        uploader: Box<dyn EventUploader>,
        config: &MonitorConfig,
    ) -> Self {
        let save_interval = config.save_interval();
        Self {
            detector,
            matcher,
            persister,
            uploader,
            logger: Box::new(NullPipelineLogger),
            confidence_threshold: config.confidence_threshold,
            save_interval,
            engine: EventDecisionEngine::new(save_interval),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Drops all dedup state and refreshes the known-faces gallery.
    pub fn reset_session(&mut self) {
        self.engine = EventDecisionEngine::new(self.save_interval);
        if let Err(e) = self.matcher.refresh() {
            log::warn!("Failed to refresh known faces: {e}");
        }
    }

    /// Runs the detector and, unless fake-priority, the face matcher.
    pub fn snapshot(
        &mut self,
        frame: &Frame,
        timestamp: Timestamp,
    ) -> Result<DetectionSnapshot, Box<dyn std::error::Error>> {
        let t0 = Instant::now();
        let candidates = self.detector.infer(frame)?;
        self.logger.timing("detect", elapsed_ms(t0));

        let snapshot =
            DetectionSnapshot::from_candidates(timestamp, &candidates, self.confidence_threshold);
        if snapshot.is_fake_priority() {
            return Ok(snapshot);
        }

        let t0 = Instant::now();
        let faces = self.matcher.detect_known_faces(frame)?;
        self.logger.timing("match", elapsed_ms(t0));
        Ok(snapshot.with_faces(faces))
    }

    pub fn process_frame(
        &mut self,
        frame: &Frame,
        timestamp: Timestamp,
    ) -> Result<Option<DetectionEvent>, Box<dyn std::error::Error>> {
        let snapshot = self.snapshot(frame, timestamp)?;
        let Some(event) = self.engine.decide(&snapshot) else {
            return Ok(None);
        };

        log::info!(
            "{} event: {} at {}",
            event.classification,
            event.label,
            event.upload_timestamp()
        );
        self.logger.count("events");
        self.dispatch(frame, &event);
        Ok(Some(event))
    }

    fn dispatch(&mut self, frame: &Frame, event: &DetectionEvent) {
        let t0 = Instant::now();
        let saved = self.persister.save(frame, &event.file_name());
        self.logger.timing("persist", elapsed_ms(t0));

        let path = match saved {
            Ok(path) => path,
            Err(e) => {
                log::error!("Failed to save {}: {e}", event.file_name());
                self.logger.count("persist_errors");
                return;
            }
        };

        match self.uploader.upload(&path, event) {
            Ok(()) => {}
            Err(UploadError::QueueFull) => {
                log::warn!("Upload queue full, dropping {}", path.display());
                self.logger.count("uploads_dropped");
            }
            Err(e) => {
                log::error!("Failed to send frame: {e}");
                self.logger.count("upload_errors");
            }
        }
    }

    pub fn engine(&self) -> &EventDecisionEngine {
        &self.engine
    }

    pub fn logger(&mut self) -> &mut dyn PipelineLogger {
        self.logger.as_mut()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
