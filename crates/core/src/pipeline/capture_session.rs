use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::pipeline::event_pipeline::EventPipeline;
use crate::shared::timestamp::{self, Timestamp};

/// Pause after a read that produced no frame, so a stalled source does
/// not spin the loop.
const NO_FRAME_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Running => write!(f, "running"),
            SessionState::Stopping => write!(f, "stopping"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a capture session is already running")]
    AlreadyRunning,
    #[error("no capture session is running")]
    NotRunning,
    #[error("previous session is still stopping")]
    StillStopping,
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("capture worker panicked; the pipeline was lost")]
    WorkerPanicked,
}

/// Why a session's loop exited.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionEnd {
    #[default]
    Stopped,
    EndOfStream,
    DeviceLost(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSummary {
    pub frames_processed: usize,
    pub frames_skipped: usize,
    pub frame_errors: usize,
    pub events_emitted: usize,
    pub end: SessionEnd,
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<(EventPipeline, SessionSummary)>,
}

/// Handle for the single capture loop.
///
/// `start` moves the pipeline onto a worker thread; the worker hands it
/// back when the loop exits, so each session reuses the same collaborators
/// with fresh dedup state. The loop checks the stop flag once per frame
/// and always finishes the frame in hand.
pub struct CaptureSession {
    pipeline: Option<EventPipeline>,
    worker: Option<Worker>,
    state: SessionState,
    clock: fn() -> Timestamp,
    last_summary: Option<SessionSummary>,
}

impl CaptureSession {
    pub fn new(pipeline: EventPipeline) -> Self {
        Self {
            pipeline: Some(pipeline),
            worker: None,
            state: SessionState::Idle,
            clock: timestamp::now,
            last_summary: None,
        }
    }

    /// Replaces the wall clock used to stamp frames.
    pub fn with_clock(mut self, clock: fn() -> Timestamp) -> Self {
        self.clock = clock;
        self
    }

    /// Opens `source` on the calling thread and starts the loop.
    pub fn start(&mut self, mut source: Box<dyn FrameSource>) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Running => return Err(SessionError::AlreadyRunning),
            SessionState::Stopping => return Err(SessionError::StillStopping),
            SessionState::Idle => {}
        }
        let mut pipeline = self.pipeline.take().ok_or(SessionError::WorkerPanicked)?;

        let info = match source.open() {
            Ok(info) => info,
            Err(e) => {
                self.pipeline = Some(pipeline);
                return Err(SessionError::SourceUnavailable(e.to_string()));
            }
        };
        log::info!("Capture started ({}x{})", info.width, info.height);

        pipeline.reset_session();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let clock = self.clock;
        let handle = std::thread::spawn(move || run_loop(pipeline, source, flag, clock));

        self.worker = Some(Worker { running, handle });
        self.state = SessionState::Running;
        Ok(())
    }

    /// Signals the loop to stop without waiting for it.
    pub fn request_stop(&mut self) -> Result<(), SessionError> {
        if self.state() != SessionState::Running {
            return Err(SessionError::NotRunning);
        }
        if let Some(worker) = &self.worker {
            worker.running.store(false, Ordering::Relaxed);
        }
        self.state = SessionState::Stopping;
        Ok(())
    }

    /// Stops the loop, waits for it to release the source and returns the
    /// session's summary.
    pub fn stop(&mut self) -> Result<SessionSummary, SessionError> {
        match self.state() {
            SessionState::Idle => return Err(SessionError::NotRunning),
            SessionState::Running => self.request_stop()?,
            SessionState::Stopping => {}
        }
        self.join().ok_or(SessionError::NotRunning)?
    }

    /// Current state. A loop that ended on its own is reaped back to Idle.
    pub fn state(&mut self) -> SessionState {
        let finished = self
            .worker
            .as_ref()
            .map(|w| w.handle.is_finished())
            .unwrap_or(false);
        if finished {
            if let Some(Err(e)) = self.join() {
                log::error!("{e}");
            }
        }
        self.state
    }

    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.last_summary.as_ref()
    }

    fn join(&mut self) -> Option<Result<SessionSummary, SessionError>> {
        let worker = self.worker.take()?;
        self.state = SessionState::Idle;
        match worker.handle.join() {
            Ok((pipeline, summary)) => {
                self.pipeline = Some(pipeline);
                self.last_summary = Some(summary.clone());
                Some(Ok(summary))
            }
            Err(_) => Some(Err(SessionError::WorkerPanicked)),
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.running.store(false, Ordering::Relaxed);
        }
        if let Some(Err(e)) = self.join() {
            log::error!("{e}");
        }
    }
}

fn run_loop(
    mut pipeline: EventPipeline,
    mut source: Box<dyn FrameSource>,
    running: Arc<AtomicBool>,
    clock: fn() -> Timestamp,
) -> (EventPipeline, SessionSummary) {
    let mut summary = SessionSummary::default();

    while running.load(Ordering::Relaxed) {
        let frame = match source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                summary.frames_skipped += 1;
                pipeline.logger().count("skipped");
                log::debug!("No frame available, skipping");
                std::thread::sleep(NO_FRAME_BACKOFF);
                continue;
            }
            Err(CaptureError::EndOfStream) => {
                log::info!("Stream ended");
                summary.end = SessionEnd::EndOfStream;
                break;
            }
            Err(CaptureError::DeviceLost(reason)) => {
                log::error!("Capture device lost: {reason}");
                summary.end = SessionEnd::DeviceLost(reason);
                break;
            }
        };

        match pipeline.process_frame(&frame, clock()) {
            Ok(Some(_)) => summary.events_emitted += 1,
            Ok(None) => {}
            Err(e) => {
                summary.frame_errors += 1;
                pipeline.logger().count("errors");
                log::warn!("Frame {} failed: {e}", frame.index());
            }
        }
        summary.frames_processed += 1;
        pipeline.logger().progress(summary.frames_processed);
    }

    source.close();
    running.store(false, Ordering::Relaxed);
    log::info!(
        "Capture stopped: {} frames, {} events",
        summary.frames_processed,
        summary.events_emitted
    );
    pipeline.logger().summary();
    (pipeline, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::frame_source::StreamInfo;
    use crate::pipeline::event_pipeline::test_support::*;
    use crate::pipeline::monitor_config::MonitorConfig;
    use crate::shared::frame::Frame;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    type Script = VecDeque<Result<Option<Frame>, CaptureError>>;

    /// Replays `script`, then either ends the stream or repeats frames
    /// forever.
    struct ScriptedSource {
        script: Script,
        endless: bool,
        fail_open: bool,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self) -> Result<StreamInfo, Box<dyn std::error::Error>> {
            self.calls.lock().unwrap().push("open");
            if self.fail_open {
                return Err("no such device".into());
            }
            Ok(StreamInfo {
                width: 4,
                height: 4,
            })
        }

        fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
            match self.script.pop_front() {
                Some(item) => item,
                None if self.endless => Ok(Some(frame())),
                None => Err(CaptureError::EndOfStream),
            }
        }

        fn close(&mut self) {
            self.calls.lock().unwrap().push("close");
        }
    }

    fn source(script: Script, endless: bool) -> (Box<ScriptedSource>, Arc<Mutex<Vec<&'static str>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let source = ScriptedSource {
            script,
            endless,
            fail_open: false,
            calls: calls.clone(),
        };
        (Box::new(source), calls)
    }

    fn endless() -> Box<ScriptedSource> {
        source(VecDeque::new(), true).0
    }

    fn session(faces: &[&str]) -> CaptureSession {
        let (matcher, _) = StubMatcher::new(faces);
        let (persister, _) = RecordingPersister::new();
        let (uploader, _) = RecordingUploader::new(false);
        let pipeline = EventPipeline::new(
            Box::new(ScriptedDetector::always(real())),
            Box::new(matcher),
            Box::new(persister),
            Box::new(uploader),
            &MonitorConfig::default(),
        );
        CaptureSession::new(pipeline)
    }

    fn fixed_clock() -> Timestamp {
        chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn recorded_session(faces: &[&str]) -> (CaptureSession, Arc<Mutex<MatcherLog>>) {
        let (matcher, log) = StubMatcher::new(faces);
        let (persister, _) = RecordingPersister::new();
        let (uploader, _) = RecordingUploader::new(false);
        let pipeline = EventPipeline::new(
            Box::new(ScriptedDetector::always(real())),
            Box::new(matcher),
            Box::new(persister),
            Box::new(uploader),
            &MonitorConfig::default(),
        );
        (CaptureSession::new(pipeline).with_clock(fixed_clock), log)
    }

    fn wait_for_idle(session: &mut CaptureSession) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.state() != SessionState::Idle {
            assert!(Instant::now() < deadline, "session did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_new_session_is_idle() {
        let mut s = session(&[]);
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.last_summary().is_none());
    }

    #[test]
    fn test_start_while_running_is_rejected() {
        let mut s = session(&[]);
        s.start(endless()).unwrap();
        let err = s.start(endless()).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyRunning));
        s.stop().unwrap();
    }

    #[test]
    fn test_stop_while_idle_is_rejected() {
        let mut s = session(&[]);
        assert!(matches!(s.stop().unwrap_err(), SessionError::NotRunning));
    }

    #[test]
    fn test_start_stop_start_is_valid() {
        let mut s = session(&["alice"]);
        s.start(endless()).unwrap();
        let first = s.stop().unwrap();
        assert_eq!(first.end, SessionEnd::Stopped);
        assert_eq!(s.state(), SessionState::Idle);

        s.start(endless()).unwrap();
        assert_eq!(s.state(), SessionState::Running);
        s.stop().unwrap();
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_request_stop_moves_through_stopping() {
        let mut s = session(&[]);
        s.start(endless()).unwrap();
        s.request_stop().unwrap();
        assert_ne!(s.state(), SessionState::Running);
        assert!(matches!(s.request_stop(), Err(SessionError::NotRunning)));
        wait_for_idle(&mut s);
        assert_eq!(s.last_summary().unwrap().end, SessionEnd::Stopped);
    }

    #[test]
    fn test_stop_releases_source() {
        let mut s = session(&[]);
        let (src, calls) = source(VecDeque::new(), true);
        s.start(src).unwrap();
        s.stop().unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["open", "close"]);
    }

    #[test]
    fn test_end_of_stream_returns_to_idle_with_summary() {
        let mut s = session(&["alice"]);
        let script: Script = vec![
            Ok(Some(frame())),
            Ok(None),
            Ok(Some(frame())),
            Ok(Some(frame())),
        ]
        .into();
        let (src, calls) = source(script, false);
        s.start(src).unwrap();
        wait_for_idle(&mut s);

        let summary = s.last_summary().unwrap();
        assert_eq!(summary.frames_processed, 3);
        assert_eq!(summary.frames_skipped, 1);
        assert_eq!(summary.events_emitted, 1);
        assert_eq!(summary.end, SessionEnd::EndOfStream);
        assert_eq!(*calls.lock().unwrap(), vec!["open", "close"]);
    }

    #[test]
    fn test_device_loss_ends_session() {
        let mut s = session(&[]);
        let script: Script = vec![
            Ok(Some(frame())),
            Err(CaptureError::DeviceLost("unplugged".into())),
        ]
        .into();
        s.start(source(script, false).0).unwrap();
        wait_for_idle(&mut s);

        let summary = s.last_summary().unwrap();
        assert_eq!(summary.frames_processed, 1);
        assert_eq!(summary.end, SessionEnd::DeviceLost("unplugged".into()));
    }

    #[test]
    fn test_failed_open_keeps_session_idle_and_usable() {
        let mut s = session(&[]);
        let (mut src, _) = source(VecDeque::new(), true);
        src.fail_open = true;

        let err = s.start(src).unwrap_err();
        assert!(matches!(err, SessionError::SourceUnavailable(_)));
        assert_eq!(s.state(), SessionState::Idle);

        s.start(endless()).unwrap();
        s.stop().unwrap();
    }

    #[test]
    fn test_each_session_starts_with_fresh_state() {
        let mut s = session(&["alice"]);
        let one_frame = || -> Script { vec![Ok(Some(frame()))].into() };

        s.start(source(one_frame(), false).0).unwrap();
        wait_for_idle(&mut s);
        assert_eq!(s.last_summary().unwrap().events_emitted, 1);

        s.start(source(one_frame(), false).0).unwrap();
        wait_for_idle(&mut s);
        assert_eq!(s.last_summary().unwrap().events_emitted, 1);
    }

    #[test]
    fn test_missing_frames_leave_tracker_state_untouched() {
        let (mut s, log) = recorded_session(&["alice"]);
        let script: Script = vec![Ok(None), Ok(None), Ok(None)].into();
        s.start(source(script, false).0).unwrap();
        wait_for_idle(&mut s);

        assert_eq!(s.last_summary().unwrap().frames_skipped, 3);
        assert_eq!(log.lock().unwrap().calls, 0);
        let engine = s.pipeline.as_ref().unwrap().engine();
        assert_eq!(engine.face_tracker().saved_count(), 0);
        assert_eq!(engine.face_tracker().last_seen_at("alice"), None);
        assert!(engine.fake_tracker().last_seen_at().is_none());
        assert!(!engine.fake_tracker().already_saved());
    }

    #[test]
    fn test_missing_frames_after_a_sighting_change_nothing() {
        let (mut s, log) = recorded_session(&["alice"]);
        let script: Script = vec![Ok(Some(frame())), Ok(None), Ok(None)].into();
        s.start(source(script, false).0).unwrap();
        wait_for_idle(&mut s);

        let summary = s.last_summary().unwrap();
        assert_eq!(summary.frames_processed, 1);
        assert_eq!(summary.frames_skipped, 2);
        assert_eq!(summary.events_emitted, 1);
        assert_eq!(log.lock().unwrap().calls, 1);
        let faces = s.pipeline.as_ref().unwrap().engine().face_tracker();
        assert_eq!(faces.saved_count(), 1);
        assert_eq!(faces.last_seen_at("alice"), Some(fixed_clock()));
    }
}
