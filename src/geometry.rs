//! Scan geometry
//!
//! Pure helpers for mapping between the sensor buffer, the screen and the
//! on-screen guide frame, plus the crop rectangle derived from recognized
//! character boxes.

use serde::Serialize;

/// Guide frame height as a share of the effective image height
pub const GUIDE_HEIGHT_RATIO: f64 = 0.7;

/// Card height / width ratio used to size the guide frame
pub const CARD_ASPECT_RATIO: f64 = 0.63;

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle with origin at the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }
}

/// A crop rectangle that lies strictly inside the image it was computed for
///
/// Only [`final_crop_rect`] constructs these, which keeps
/// `0 <= x, y` and `x + width < image width`, `y + height < image height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CropRect(Rect);

impl CropRect {
    pub fn rect(&self) -> Rect {
        self.0
    }

    /// Integer pixel bounds (x, y, width, height), truncated toward zero
    pub fn pixel_bounds(&self) -> (u32, u32, u32, u32) {
        let r = self.0;
        (r.x as u32, r.y as u32, r.width as u32, r.height as u32)
    }
}

/// One recognized character and its box in guide-relative pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharacterBox {
    pub code: u16,
    pub rect: Rect,
}

impl CharacterBox {
    pub fn is_space(&self) -> bool {
        self.code == u16::from(b' ')
    }
}

/// Window of the sensor buffer that is actually visible on screen
///
/// The camera preview is aspect-filled, so whichever buffer dimension is
/// relatively longer than the screen gets cropped equally on both sides.
pub fn effective_image_rect(buffer: Size, screen: Size) -> Rect {
    let buffer_ratio = buffer.width / buffer.height;
    let screen_ratio = screen.width / screen.height;

    if buffer_ratio > screen_ratio {
        let width = screen_ratio * buffer.height;
        Rect::new((buffer.width - width) * 0.5, 0.0, width, buffer.height)
    } else {
        let height = screen.height / screen.width * buffer.width;
        Rect::new(0.0, (buffer.height - height) * 0.5, buffer.width, height)
    }
}

/// Guide frame centered in the effective image rect
pub fn guide_frame(effective: Rect) -> Rect {
    let height = (effective.height * GUIDE_HEIGHT_RATIO).min(effective.height);
    let width = height / CARD_ASPECT_RATIO;
    let left = 0.5 * (effective.width - width);
    let top = 0.5 * (effective.height - height);
    Rect::new(left + effective.x, top + effective.y, width, height)
}

/// Smallest rectangle containing both inputs
pub fn union_rect(a: Rect, b: Rect) -> Rect {
    let left = a.x.min(b.x);
    let top = a.y.min(b.y);
    let right = a.max_x().max(b.max_x());
    let bottom = a.max_y().max(b.max_y());
    Rect::new(left, top, right - left, bottom - top)
}

/// Crop rectangle around the recognized characters, in full-image pixels
///
/// Returns `None` only when there are no boxes or the image is empty.
pub fn final_crop_rect(image: Size, guide: Rect, boxes: &[CharacterBox]) -> Option<CropRect> {
    let (first, rest) = boxes.split_first()?;
    if image.width < 1.0 || image.height < 1.0 {
        return None;
    }

    let union = rest.iter().fold(first.rect, |acc, b| union_rect(acc, b.rect));

    // Average over non-space glyphs; fall back to every box if all are spaces.
    let glyphs: Vec<&CharacterBox> = boxes.iter().filter(|b| !b.is_space()).collect();
    let sample: Vec<&CharacterBox> = if glyphs.is_empty() {
        boxes.iter().collect()
    } else {
        glyphs
    };
    let count = sample.len() as f64;
    let avg_w = sample.iter().map(|b| b.rect.width).sum::<f64>() / count;
    let avg_h = sample.iter().map(|b| b.rect.height).sum::<f64>() / count;

    let mut rect = union;
    rect.x += guide.x;
    rect.y += guide.y;

    rect.y -= avg_h;
    rect.height += avg_h * 2.0;
    rect.x -= avg_w;
    rect.width += avg_w * 2.0;

    rect.x = rect.x.clamp(0.0, image.width - 1.0);
    rect.y = rect.y.clamp(0.0, image.height - 1.0);
    if rect.max_x() >= image.width {
        rect.width = image.width - rect.x - 1.0;
    }
    if rect.max_y() >= image.height {
        rect.height = image.height - rect.y - 1.0;
    }
    rect.width = rect.width.max(0.0);
    rect.height = rect.height.max(0.0);

    Some(CropRect(rect))
}
