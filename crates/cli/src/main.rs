use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{Receiver, RecvTimeoutError};

use spoofwatch_core::capture::domain::frame_source::FrameSource;
use spoofwatch_core::capture::infrastructure::ffmpeg_stream_source::FfmpegStreamSource;
use spoofwatch_core::capture::infrastructure::image_file_loader::load_rgb_frame;
use spoofwatch_core::capture::infrastructure::image_file_persister::ImageFilePersister;
use spoofwatch_core::detection::infrastructure::onnx_face_locator::OnnxFaceLocator;
use spoofwatch_core::detection::infrastructure::onnx_liveness_detector::OnnxLivenessDetector;
use spoofwatch_core::events::domain::event_uploader::{EventUploader, NullEventUploader};
use spoofwatch_core::events::infrastructure::background_uploader::{
    BackgroundUploader, UploadStats, UploadStatsHandle,
};
use spoofwatch_core::events::infrastructure::http_event_uploader::HttpEventUploader;
use spoofwatch_core::pipeline::capture_session::{CaptureSession, SessionEnd, SessionState, SessionSummary};
use spoofwatch_core::pipeline::event_pipeline::EventPipeline;
use spoofwatch_core::pipeline::monitor_config::MonitorConfig;
use spoofwatch_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use spoofwatch_core::recognition::domain::face_gallery::FaceGallery;
use spoofwatch_core::recognition::infrastructure::arcface_embedder::ArcFaceEmbedder;
use spoofwatch_core::recognition::infrastructure::embedding_face_matcher::EmbeddingFaceMatcher;
use spoofwatch_core::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, FACE_MODEL_NAME, FACE_MODEL_URL, IMAGE_EXTENSIONS,
};
use spoofwatch_core::shared::model_resolver;

const DEFAULT_KNOWN_FACES_DIR: &str = "data";
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Liveness-aware face event monitoring for camera streams.
#[derive(Parser)]
#[command(name = "spoofwatch")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch a camera or stream and report fake and identity events.
    Watch(WatchArgs),
    /// Add a known face image to the gallery directory.
    Enroll(EnrollArgs),
}

#[derive(Args)]
struct WatchArgs {
    /// Camera device, stream URL or video file.
    source: String,

    /// Two-class (fake/real) YOLO liveness model in ONNX format.
    #[arg(long)]
    liveness_model: PathBuf,

    /// Directory of known face images, one per identity.
    #[arg(long, default_value = DEFAULT_KNOWN_FACES_DIR)]
    known_faces: PathBuf,

    /// Where event frames are written.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Backend endpoint receiving multipart event uploads.
    #[arg(long)]
    backend_url: Option<String>,

    /// Liveness confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Seconds before a repeated sighting counts as a new event.
    #[arg(long)]
    save_interval: Option<u64>,

    /// JSON config file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// ffmpeg input device format for local cameras (v4l2, avfoundation, dshow).
    #[arg(long)]
    input_format: Option<String>,

    /// Directory with pre-downloaded face and embedding models.
    #[arg(long)]
    models_dir: Option<PathBuf>,
}

#[derive(Args)]
struct EnrollArgs {
    /// Image containing the face to enroll.
    image: PathBuf,

    /// Directory of known face images.
    #[arg(long, default_value = DEFAULT_KNOWN_FACES_DIR)]
    known_faces: PathBuf,

    /// Identity label; defaults to the image file name.
    #[arg(long)]
    name: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum ControlCommand {
    Start,
    Stop,
    Status,
    Quit,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Command::Watch(args) => run_watch(args),
        Command::Enroll(args) => run_enroll(args),
    }
}

fn run_watch(args: WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;
    config.validate()?;
    if !args.liveness_model.exists() {
        return Err(format!(
            "Liveness model not found: {}",
            args.liveness_model.display()
        )
        .into());
    }

    let (pipeline, upload_stats) = build_pipeline(&args, &config)?;
    let uploads = upload_stats.as_ref();
    let mut session = CaptureSession::new(pipeline);
    session.start(build_source(&args, &config))?;
    eprintln!("Watching {}. Commands: start, stop, status, quit", args.source);

    let mut commands = Some(spawn_stdin_reader());
    let mut stopped_by_user = false;

    loop {
        let received = match &commands {
            Some(rx) => rx.recv_timeout(POLL_INTERVAL),
            None => {
                std::thread::sleep(POLL_INTERVAL);
                Err(RecvTimeoutError::Timeout)
            }
        };

        match received {
            Ok(line) => match parse_command(&line) {
                Some(ControlCommand::Start) => match session.start(build_source(&args, &config)) {
                    Ok(()) => {
                        stopped_by_user = false;
                        eprintln!("Session started");
                    }
                    Err(e) => eprintln!("Cannot start: {e}"),
                },
                Some(ControlCommand::Stop) => match session.stop() {
                    Ok(summary) => {
                        stopped_by_user = true;
                        print_summary(&summary, uploads);
                    }
                    Err(e) => eprintln!("Cannot stop: {e}"),
                },
                Some(ControlCommand::Status) => eprintln!("Session is {}", session.state()),
                Some(ControlCommand::Quit) => {
                    if session.state() != SessionState::Idle {
                        print_summary(&session.stop()?, uploads);
                    }
                    return Ok(());
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("Unknown command '{}'", line.trim()),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => commands = None,
        }

        if !stopped_by_user && session.state() == SessionState::Idle {
            if let Some(summary) = session.last_summary() {
                print_summary(summary, uploads);
            }
            return match session.last_summary().map(|s| &s.end) {
                Some(SessionEnd::DeviceLost(reason)) => {
                    Err(format!("Capture device lost: {reason}").into())
                }
                _ => Ok(()),
            };
        }
    }
}

fn run_enroll(args: EnrollArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.image.is_file() {
        return Err(format!("Image not found: {}", args.image.display()).into());
    }
    let ext = image_extension(&args.image)
        .ok_or_else(|| format!("Unsupported image type: {}", args.image.display()))?;
    let label = match &args.name {
        Some(name) => name.clone(),
        None => args
            .image
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or("Image file name is not valid UTF-8")?
            .to_string(),
    };
    if label.is_empty() || label.contains(['/', '\\']) {
        return Err(format!("Invalid identity name '{label}'").into());
    }

    // Reject files the matcher would not be able to decode later.
    load_rgb_frame(&args.image)?;

    fs::create_dir_all(&args.known_faces)?;
    let dest = args.known_faces.join(format!("{label}.{ext}"));
    fs::copy(&args.image, &dest)?;
    log::info!("Enrolled '{label}' as {}", dest.display());
    eprintln!("Enrolled '{label}'. Restart the session to pick it up.");
    Ok(())
}

fn build_config(args: &WatchArgs) -> Result<MonitorConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::load_or_default()?,
    };
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(url) = &args.backend_url {
        config.backend_url = Some(url.clone());
    }
    if let Some(confidence) = args.confidence {
        config.confidence_threshold = confidence;
    }
    if let Some(secs) = args.save_interval {
        config.save_interval_secs = secs;
    }
    Ok(config)
}

fn build_pipeline(
    args: &WatchArgs,
    config: &MonitorConfig,
) -> Result<(EventPipeline, Option<UploadStatsHandle>), Box<dyn std::error::Error>> {
    log::info!("Loading liveness model: {}", args.liveness_model.display());
    let detector = OnnxLivenessDetector::new(&args.liveness_model)?;

    let face_model = resolve_model(FACE_MODEL_NAME, FACE_MODEL_URL, args.models_dir.as_deref())?;
    let embedding_model = resolve_model(
        EMBEDDING_MODEL_NAME,
        EMBEDDING_MODEL_URL,
        args.models_dir.as_deref(),
    )?;

    let locator = OnnxFaceLocator::new(&face_model, config.face_confidence)?;
    let embedder = ArcFaceEmbedder::new(&embedding_model)?;
    let mut matcher = EmbeddingFaceMatcher::new(
        Box::new(locator),
        Box::new(embedder),
        FaceGallery::new(config.match_threshold),
    );
    fs::create_dir_all(&args.known_faces)?;
    if matcher.load_directory(&args.known_faces)? == 0 {
        log::warn!(
            "No known faces in {}; every face will be reported as Unknown",
            args.known_faces.display()
        );
    }

    let persister = ImageFilePersister::new(config.output_dir.clone());
    let (uploader, stats) = match &config.backend_url {
        Some(url) => {
            log::info!("Uploading events to {url}");
            let http = HttpEventUploader::new(url.clone())?;
            let background = BackgroundUploader::new(Box::new(http), config.upload_queue_capacity);
            let stats = background.stats_handle();
            (Box::new(background) as Box<dyn EventUploader>, Some(stats))
        }
        None => {
            log::info!("No backend configured; events are only saved locally");
            (Box::new(NullEventUploader) as Box<dyn EventUploader>, None)
        }
    };

    let pipeline = EventPipeline::new(
        Box::new(detector),
        Box::new(matcher),
        Box::new(persister),
        uploader,
        config,
    )
    .with_logger(Box::new(StdoutPipelineLogger::default()));
    Ok((pipeline, stats))
}

fn build_source(args: &WatchArgs, config: &MonitorConfig) -> Box<dyn FrameSource> {
    let mut source = FfmpegStreamSource::new(args.source.clone());
    if let Some(format) = &args.input_format {
        source = source.with_input_format(format.clone());
    }
    if let Some((w, h)) = config.frame_size() {
        source = source.with_frame_size(w, h);
    }
    Box::new(source)
}

fn resolve_model(
    name: &str,
    url: &str,
    models_dir: Option<&Path>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {name}");
    let path = model_resolver::resolve(name, url, models_dir, Some(Box::new(download_progress)))?;
    eprintln!();
    Ok(path)
}

/// Forwards stdin lines until EOF.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn parse_command(line: &str) -> Option<ControlCommand> {
    match line.trim().to_lowercase().as_str() {
        "start" => Some(ControlCommand::Start),
        "stop" => Some(ControlCommand::Stop),
        "status" => Some(ControlCommand::Status),
        "quit" | "exit" => Some(ControlCommand::Quit),
        _ => None,
    }
}

fn print_summary(summary: &SessionSummary, uploads: Option<&UploadStatsHandle>) {
    let end = match &summary.end {
        SessionEnd::Stopped => "stopped".to_string(),
        SessionEnd::EndOfStream => "end of stream".to_string(),
        SessionEnd::DeviceLost(reason) => format!("device lost ({reason})"),
    };
    eprintln!(
        "Session {end}: {} frames, {} skipped, {} errors, {} events",
        summary.frames_processed, summary.frames_skipped, summary.frame_errors, summary.events_emitted
    );
    if let Some(uploads) = uploads {
        eprintln!("{}", format_upload_stats(&uploads.snapshot()));
    }
}

/// Counts are cumulative over the process; queued uploads may still be
/// in flight.
fn format_upload_stats(stats: &UploadStats) -> String {
    format!(
        "Uploads so far: {} sent, {} failed, {} dropped (queue full)",
        stats.sent, stats.failed, stats.dropped
    )
}

fn image_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}
