/// Axis-aligned box in frame pixel coordinates, `[x1, y1]` inclusive to
/// `[x2, y2]` exclusive. Coordinates may lie outside the frame; callers
/// clamp before reading pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Builds a box from YOLO center format `(cx, cy, w, h)`.
    pub fn from_center(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Clamps to a `frame_w` × `frame_h` frame and returns integer
    /// `(x, y, width, height)`, or `None` when nothing is left inside.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.max(0.0).floor() as u32;
        let y1 = self.y1.max(0.0).floor() as u32;
        let x2 = (self.x2.min(frame_w as f64).ceil().max(0.0) as u32).min(frame_w);
        let y2 = (self.y2.min(frame_h as f64).ceil().max(0.0) as u32).min(frame_h);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}
