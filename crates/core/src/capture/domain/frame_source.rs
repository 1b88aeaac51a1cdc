use thiserror::Error;

use crate::shared::frame::Frame;

/// Conditions that end a capture loop.
///
/// A frame that merely failed to arrive is not an error: sources report
/// it as `Ok(None)` and the loop moves on.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("end of stream")]
    EndOfStream,
    #[error("capture device lost: {0}")]
    DeviceLost(String),
}

/// Dimensions reported by a source once opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
}

/// A live (or replayed) source of frames.
///
/// Implementations handle I/O details (device, codec, container) while the
/// pipeline works with the abstract [`Frame`] type.
pub trait FrameSource: Send {
    /// Acquires the underlying device or stream.
    fn open(&mut self) -> Result<StreamInfo, Box<dyn std::error::Error>>;

    /// Returns the next frame, `Ok(None)` when no frame was available this
    /// time, or an error when capture cannot continue.
    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Releases the device. Safe to call more than once.
    fn close(&mut self);
}
