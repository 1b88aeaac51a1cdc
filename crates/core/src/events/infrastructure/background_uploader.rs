use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, TrySendError};

use crate::events::domain::detection_event::DetectionEvent;
use crate::events::domain::event_uploader::{EventUploader, UploadError};

pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

struct UploadJob {
    image_path: PathBuf,
    event: DetectionEvent,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicUsize,
    failed: AtomicUsize,
    dropped: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadStats {
    pub sent: usize,
    pub failed: usize,
    pub dropped: usize,
}

/// Read-only view of an uploader's counters that outlives the boxed
/// uploader handed to the pipeline.
#[derive(Debug, Clone)]
pub struct UploadStatsHandle(Arc<Counters>);

impl UploadStatsHandle {
    pub fn snapshot(&self) -> UploadStats {
        UploadStats {
            sent: self.0.sent.load(Ordering::Relaxed),
            failed: self.0.failed.load(Ordering::Relaxed),
            dropped: self.0.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Runs another uploader on a worker thread behind a bounded queue.
///
/// `upload` only enqueues and never blocks the caller. Delivery failures
/// are logged on the worker; a full queue is reported as
/// [`UploadError::QueueFull`] and the job is discarded. Dropping the
/// uploader drains the queue and joins the worker.
pub struct BackgroundUploader {
    job_tx: Option<Sender<UploadJob>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl BackgroundUploader {
    pub fn new(inner: Box<dyn EventUploader>, capacity: usize) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<UploadJob>(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);

        let worker = std::thread::spawn(move || {
            for job in job_rx {
                match inner.upload(&job.image_path, &job.event) {
                    Ok(()) => {
                        worker_counters.sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                        log::error!("Failed to send frame: {e}");
                    }
                }
            }
        });

        Self {
            job_tx: Some(job_tx),
            worker: Some(worker),
            counters,
        }
    }

    pub fn stats(&self) -> UploadStats {
        self.stats_handle().snapshot()
    }

    pub fn stats_handle(&self) -> UploadStatsHandle {
        UploadStatsHandle(Arc::clone(&self.counters))
    }
}

impl EventUploader for BackgroundUploader {
    fn upload(&self, image_path: &Path, event: &DetectionEvent) -> Result<(), UploadError> {
        let job_tx = self.job_tx.as_ref().ok_or(UploadError::Disconnected)?;
        let job = UploadJob {
            image_path: image_path.to_path_buf(),
            event: event.clone(),
        };
        job_tx.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                UploadError::QueueFull
            }
            TrySendError::Disconnected(_) => UploadError::Disconnected,
        })
    }
}

impl Drop for BackgroundUploader {
    fn drop(&mut self) {
        self.job_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Upload worker panicked");
            }
        }
    }
}
