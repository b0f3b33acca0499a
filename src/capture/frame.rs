//! Frame data structures for camera deliveries

use image::{imageops, GrayImage};
use std::time::Instant;

use crate::geometry::{CropRect, Size};

/// A camera frame borrowed for the duration of one delivery
///
/// Samples are bi-planar 4:2:0: a full-resolution luma plane followed by an
/// interleaved half-resolution chroma plane. Both planes share `row_stride`.
#[derive(Debug, Clone, Copy)]
pub struct CaptureFrame<'a> {
    /// Luma plane, `row_stride * height` bytes
    pub luma: &'a [u8],
    /// Interleaved CbCr plane
    pub chroma: &'a [u8],
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Bytes per row of the luma plane
    pub row_stride: usize,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl<'a> CaptureFrame<'a> {
    /// Create a frame view over borrowed planes
    pub fn new(luma: &'a [u8], chroma: &'a [u8], width: u32, height: u32, row_stride: usize) -> Self {
        Self {
            luma,
            chroma,
            width,
            height,
            row_stride,
            timestamp: Instant::now(),
        }
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn size(&self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }

    /// Copy the luma plane into an owned grayscale image
    ///
    /// Returns `None` if the plane is smaller than its dimensions claim.
    pub fn to_image(&self) -> Option<GrayImage> {
        let width = self.width as usize;
        if self.row_stride < width {
            return None;
        }

        let mut pixels = Vec::with_capacity(width * self.height as usize);
        for row in 0..self.height as usize {
            let start = row * self.row_stride;
            pixels.extend_from_slice(self.luma.get(start..start + width)?);
        }
        GrayImage::from_raw(self.width, self.height, pixels)
    }

    /// Cut the crop rect out of the frame as an owned grayscale image
    pub fn crop(&self, rect: &CropRect) -> Option<GrayImage> {
        let image = self.to_image()?;
        let (x, y, width, height) = rect.pixel_bounds();
        Some(imageops::crop_imm(&image, x, y, width, height).to_image())
    }
}

/// Frame whose planes are owned, used for replay and tests
#[derive(Debug, Clone)]
pub struct OwnedFrame {
    pub luma: Vec<u8>,
    pub chroma: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub row_stride: usize,
}

impl OwnedFrame {
    /// Build a frame from a grayscale image with neutral chroma
    pub fn from_gray(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let row_stride = width as usize;
        let chroma_rows = (height as usize).div_ceil(2);
        Self {
            luma: image.as_raw().clone(),
            chroma: vec![128; row_stride * chroma_rows],
            width,
            height,
            row_stride,
        }
    }

    /// Blank mid-gray frame of the given size
    pub fn blank(width: u32, height: u32) -> Self {
        Self::from_gray(&GrayImage::from_pixel(width, height, image::Luma([128])))
    }

    /// Borrow as a delivery-scoped frame
    pub fn as_frame(&self) -> CaptureFrame<'_> {
        CaptureFrame::new(&self.luma, &self.chroma, self.width, self.height, self.row_stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{final_crop_rect, CharacterBox, Rect};

    #[test]
    fn test_to_image_respects_stride() {
        // 2x2 image stored with 4-byte rows
        let luma = [1u8, 2, 0xee, 0xee, 3, 4, 0xee, 0xee];
        let frame = CaptureFrame::new(&luma, &[], 2, 2, 4);
        let image = frame.to_image().unwrap();
        assert_eq!(image.as_raw(), &vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_to_image_short_plane() {
        let luma = [0u8; 3];
        let frame = CaptureFrame::new(&luma, &[], 2, 2, 2);
        assert!(frame.to_image().is_none());
    }

    #[test]
    fn test_crop_uses_rect_bounds() {
        let owned = OwnedFrame::blank(64, 48);
        let frame = owned.as_frame();
        let boxes = [CharacterBox {
            code: u16::from(b'7'),
            rect: Rect::new(10.0, 10.0, 4.0, 6.0),
        }];
        let crop = final_crop_rect(frame.size(), Rect::default(), &boxes).unwrap();

        let image = frame.crop(&crop).unwrap();
        assert_eq!(image.dimensions(), (12, 18));
    }

    #[test]
    fn test_blank_frame_planes() {
        let owned = OwnedFrame::blank(4, 3);
        assert_eq!(owned.luma.len(), 12);
        assert_eq!(owned.chroma.len(), 8);
        assert_eq!(owned.as_frame().dimensions(), (4, 3));
    }
}
