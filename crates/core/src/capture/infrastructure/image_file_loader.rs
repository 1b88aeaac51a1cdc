use std::path::Path;

use crate::shared::frame::Frame;

/// Decodes an image file into an RGB [`Frame`] using the `image` crate.
pub fn load_rgb_frame(path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
    let img = image::open(path)?.to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(img.into_raw(), width, height, 3, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        image::RgbImage::from_pixel(6, 4, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();

        let frame = load_rgb_frame(&path).unwrap();

        assert_eq!((frame.width(), frame.height(), frame.channels()), (6, 4, 3));
        assert_eq!(&frame.data()[..3], &[10, 20, 30]);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(load_rgb_frame(Path::new("/nonexistent/face.png")).is_err());
    }
}
