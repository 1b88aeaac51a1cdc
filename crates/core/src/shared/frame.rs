use ndarray::ArrayView3;

use crate::shared::bounding_box::BoundingBox;

/// A single captured frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the domain layer
/// treats pixel data as opaque.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Position of the frame in its capture session, starting at 0.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels under `bbox` (clamped to the frame) into a new frame.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<Frame> {
        let (x, y, w, h) = bbox.clamp_to(self.width, self.height)?;
        let ch = self.channels as usize;
        let stride = self.width as usize * ch;
        let mut data = Vec::with_capacity(w as usize * h as usize * ch);
        for row in y as usize..(y + h) as usize {
            let start = row * stride + x as usize * ch;
            data.extend_from_slice(&self.data[start..start + w as usize * ch]);
        }
        Some(Frame::new(data, w, h, self.channels, self.index))
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
