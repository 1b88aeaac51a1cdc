use crate::capture::domain::frame_source::{CaptureError, FrameSource, StreamInfo};
use crate::shared::frame::Frame;

/// Captures frames from anything ffmpeg can open: a camera device, a
/// network stream (RTSP/HTTP) or a video file.
///
/// Each decoded frame is converted to RGB24 and optionally rescaled.
pub struct FfmpegStreamSource {
    url: String,
    input_format: Option<String>,
    frame_size: Option<(u32, u32)>,
    stream: Option<OpenStream>,
}

// Safety: FfmpegStreamSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegStreamSource {}

impl FfmpegStreamSource {
    /// `url` is a device path, stream URL or file path.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            input_format: None,
            frame_size: None,
            stream: None,
        }
    }

    /// Forces an input device format such as `v4l2`, `avfoundation` or
    /// `dshow`, needed for local cameras.
    pub fn with_input_format(mut self, format: impl Into<String>) -> Self {
        self.input_format = Some(format.into());
        self
    }

    /// Rescales every frame to `width` × `height`.
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some((width, height));
        self
    }

    /// Devices and network streams have no natural end: running out of
    /// input means the source went away.
    fn is_live(&self) -> bool {
        self.input_format.is_some() || is_network_url(&self.url)
    }

    fn open_input(&self) -> Result<ffmpeg_next::format::context::Input, Box<dyn std::error::Error>> {
        match &self.input_format {
            Some(name) => {
                ffmpeg_next::device::register_all();
                let format = ffmpeg_next::device::input::video()
                    .find(|f| f.name() == name)
                    .ok_or_else(|| format!("Unknown capture device format: {name}"))?;
                let mut options = ffmpeg_next::Dictionary::new();
                if let Some((w, h)) = self.frame_size {
                    options.set("video_size", &format!("{w}x{h}"));
                }
                Ok(ffmpeg_next::format::open_with(&self.url, &format, options)?.input())
            }
            None => Ok(ffmpeg_next::format::input(&self.url)?),
        }
    }
}

impl FrameSource for FfmpegStreamSource {
    fn open(&mut self) -> Result<StreamInfo, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let ictx = self.open_input()?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let (width, height) = self
            .frame_size
            .unwrap_or((decoder.width(), decoder.height()));
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        log::info!(
            "Opened {} ({}x{} → {width}x{height})",
            self.url,
            decoder.width(),
            decoder.height()
        );

        self.stream = Some(OpenStream {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
            frame_index: 0,
            flushing: false,
            live: self.is_live(),
            source: self.url.clone(),
        });
        Ok(StreamInfo { width, height })
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        match self.stream.as_mut() {
            Some(stream) => stream.next_frame(),
            None => Err(CaptureError::DeviceLost(format!("{} is not open", self.url))),
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Released {}", self.url);
        }
    }
}

struct OpenStream {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    frame_index: usize,
    flushing: bool,
    live: bool,
    source: String,
}

impl OpenStream {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        loop {
            let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return Ok(self.convert(&decoded));
            }

            if self.flushing {
                return Err(CaptureError::EndOfStream);
            }

            let mut packet = ffmpeg_next::Packet::empty();
            match packet.read(&mut self.ictx) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                    return Ok(None);
                }
                Err(ffmpeg_next::Error::Eof) if !self.live => {
                    let _ = self.decoder.send_eof();
                    self.flushing = true;
                    continue;
                }
                Err(ffmpeg_next::Error::Eof) => {
                    return Err(CaptureError::DeviceLost(format!(
                        "{} stopped delivering data",
                        self.source
                    )));
                }
                Err(e) => {
                    return Err(CaptureError::DeviceLost(format!("{}: {e}", self.source)));
                }
            }
            if packet.stream() != self.stream_index {
                continue;
            }
            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Dropped undecodable packet: {e}");
                return Ok(None);
            }
        }
    }

    fn convert(&mut self, decoded: &ffmpeg_next::util::frame::video::Video) -> Option<Frame> {
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = self.scaler.run(decoded, &mut rgb_frame) {
            log::debug!("Dropped frame {}: {e}", self.frame_index);
            return None;
        }
        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, 3, self.frame_index);
        self.frame_index += 1;
        Some(frame)
    }
}

fn is_network_url(url: &str) -> bool {
    const LIVE_SCHEMES: &[&str] = &["rtsp", "rtsps", "rtmp", "rtmps", "udp", "tcp", "srt", "http", "https"];
    url.split_once("://")
        .map(|(scheme, _)| LIVE_SCHEMES.contains(&scheme.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer.
///
/// ffmpeg frames may have padding bytes at the end of each row (stride > width*3).
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
