// THEORY:
// The `BinaryMask` is the most fundamental unit of the engine: a "dumb" data
// container for one frame's thresholded, morphology-filtered motion delta.
// Every byte is an intensity; any non-zero byte is foreground. It knows nothing
// about components or blobs. Its only job is to guarantee, at construction,
// that the grid is single-channel 8-bit and that its buffer matches its
// dimensions, so the labeller can index it without further checks.

use crate::error::{Result, VisionError};
use image::{DynamicImage, GrayImage, Luma};

/// A single-channel 8-bit grid, row-major, non-zero = foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl BinaryMask {
    /// Wraps a raw row-major buffer. The buffer must hold exactly
    /// `width * height` bytes.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != width as usize * height as usize {
            return Err(VisionError::DimensionMismatch {
                width,
                height,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Accepts only `Luma8` images. Colour, alpha or 16-bit masks are a
    /// precondition violation and are rejected before any processing.
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self> {
        match image {
            DynamicImage::ImageLuma8(gray) => Ok(Self::from(gray)),
            other => Err(VisionError::UnsupportedPixelFormat(format!(
                "{:?}",
                other.color()
            ))),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Intensity at (`col`, `row`), or `None` outside the mask.
    pub fn get(&self, col: u32, row: u32) -> Option<u8> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let idx = row as usize * self.width as usize + col as usize;
        self.pixels.get(idx).copied()
    }

    pub fn is_foreground(&self, col: u32, row: u32) -> bool {
        self.get(col, row).is_some_and(|p| p > 0)
    }

    /// The mask as a greyscale image, for writing to disk.
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([self.get(x, y).unwrap_or(0)])
        })
    }

    pub fn foreground_count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p > 0).count()
    }

    /// Builds a mask from rows of text where `#` is foreground.
    #[cfg(test)]
    pub(crate) fn from_ascii(rows: &[&str]) -> Self {
        let height = rows.len() as u32;
        let width = rows.first().map_or(0, |r| r.len()) as u32;
        let pixels = rows
            .iter()
            .flat_map(|r| r.bytes().map(|b| if b == b'#' { 255 } else { 0 }))
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }
}

impl From<&GrayImage> for BinaryMask {
    fn from(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: image.as_raw().clone(),
        }
    }
}

impl From<GrayImage> for BinaryMask {
    fn from(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            pixels: image.into_raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn rejects_buffer_of_wrong_length() {
        let err = BinaryMask::new(4, 4, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            VisionError::DimensionMismatch { width: 4, height: 4, actual: 15 }
        ));
    }

    #[test]
    fn rejects_colour_images() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 3, Rgb([255, 0, 0])));
        let err = BinaryMask::from_dynamic(&rgb).unwrap_err();
        assert!(matches!(err, VisionError::UnsupportedPixelFormat(_)));
    }

    #[test]
    fn accepts_luma8_and_counts_foreground() {
        let mut gray = GrayImage::new(5, 2);
        gray.put_pixel(1, 0, Luma([255]));
        gray.put_pixel(4, 1, Luma([7]));
        let mask = BinaryMask::from_dynamic(&DynamicImage::ImageLuma8(gray)).unwrap();
        assert_eq!(mask.width(), 5);
        assert_eq!(mask.height(), 2);
        assert!(mask.is_foreground(1, 0));
        assert!(mask.is_foreground(4, 1));
        assert!(!mask.is_foreground(0, 0));
        assert_eq!(mask.foreground_count(), 2);
    }

    #[test]
    fn reads_outside_the_mask_are_none() {
        let mask = BinaryMask::from_ascii(&["..", "#."]);
        assert_eq!(mask.get(0, 1), Some(255));
        assert_eq!(mask.get(2, 0), None);
        assert_eq!(mask.get(0, 2), None);
        assert_eq!(mask.get(u32::MAX, u32::MAX), None);
        assert!(!mask.is_foreground(2, 0));
    }

    #[test]
    fn image_copy_keeps_every_pixel() {
        let mask = BinaryMask::from_ascii(&["#..", ".#."]);
        let image = mask.to_image();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.as_raw(), mask.pixels());
    }

    #[test]
    fn ascii_rows_map_to_foreground() {
        let mask = BinaryMask::from_ascii(&["#..", ".#."]);
        assert_eq!((mask.width(), mask.height()), (3, 2));
        assert_eq!(mask.pixels(), &[255, 0, 0, 0, 255, 0]);
    }
}
