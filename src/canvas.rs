//! Drawable grayscale surface that feeds the predictor.
//!
//! Strokes are rasterized as capsules: every pixel whose centre lies within
//! half the stroke width of the segment is set to full ink, which gives the
//! round caps and joins of a browser canvas line.

use image::{GrayImage, Luma};

/// Side length of the square drawing surface.
pub const CANVAS_SIDE: u32 = 280;
/// Width of a pen stroke in pixels.
pub const STROKE_WIDTH: f32 = 24.0;
pub const BACKGROUND: u8 = 0;
pub const INK: u8 = 255;

/// Position on the canvas in pixel units, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone)]
pub struct Canvas {
    bitmap: GrayImage,
    last: Point,
    revision: u64,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    /// A blank 280×280 canvas with the pen at the origin.
    pub fn new() -> Self {
        Self::with_side(CANVAS_SIDE)
    }

    pub fn with_side(side: u32) -> Self {
        Self {
            bitmap: GrayImage::from_pixel(side, side, Luma([BACKGROUND])),
            last: Point::default(),
            revision: 0,
        }
    }

    /// Fill the whole surface with the background value.
    pub fn begin_erase(&mut self) {
        for pixel in self.bitmap.pixels_mut() {
            *pixel = Luma([BACKGROUND]);
        }
        self.revision += 1;
    }

    /// Start a gesture at `point` without drawing.
    pub fn set_position(&mut self, point: Point) {
        self.last = point;
    }

    /// Draw from the last position to `point` when the pen is down.
    ///
    /// Returns whether anything was drawn.
    pub fn stroke_to(&mut self, point: Point, pen_down: bool) -> bool {
        if !pen_down {
            return false;
        }
        let from = self.last;
        self.draw_segment(from, point);
        self.last = point;
        self.revision += 1;
        true
    }

    pub fn last_position(&self) -> Point {
        self.last
    }

    pub fn bitmap(&self) -> &GrayImage {
        &self.bitmap
    }

    pub fn side(&self) -> u32 {
        self.bitmap.width()
    }

    /// Counter bumped on every change to the bitmap.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_blank(&self) -> bool {
        self.bitmap.as_raw().iter().all(|&p| p == BACKGROUND)
    }

    fn draw_segment(&mut self, from: Point, to: Point) {
        let radius = STROKE_WIDTH / 2.0;
        let side = self.bitmap.width() as f32;
        let min_x = (from.x.min(to.x) - radius).floor().max(0.0);
        let max_x = (from.x.max(to.x) + radius).ceil().min(side);
        let min_y = (from.y.min(to.y) - radius).floor().max(0.0);
        let max_y = (from.y.max(to.y) + radius).ceil().min(self.bitmap.height() as f32);
        if !(min_x < max_x && min_y < max_y) {
            return;
        }
        for y in min_y as u32..max_y as u32 {
            for x in min_x as u32..max_x as u32 {
                let centre = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                if distance_to_segment(centre, from, to) <= radius {
                    self.bitmap.put_pixel(x, y, Luma([INK]));
                }
            }
        }
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}
