// THEORY:
// Thin helpers over `image` and `imageproc` that turn raw frames into motion
// masks and draw results back onto frames. The labelling and tracking code
// never calls these directly; the pipeline composes them and hands the
// resulting `BinaryMask`s and `DeltaProbe` to the engine.

use crate::core_modules::blob::Blob;
use crate::error::{Result, VisionError};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::morphology::{dilate, erode};
use imageproc::rect::Rect;
use std::path::Path;

const OVERLAY_COLOUR: Rgb<u8> = Rgb([255, 50, 0]);

/// Decodes a frame as luma and shrinks it by an integer factor.
pub fn read_frame(path: &Path, shrink: u32) -> Result<GrayImage> {
    let frame = image::open(path)?.to_luma8();
    Ok(shrink_frame(&frame, shrink))
}

/// Decodes a frame in colour at full size, for overlays.
pub fn read_colour_frame(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

pub fn shrink_frame(frame: &GrayImage, shrink: u32) -> GrayImage {
    if shrink <= 1 {
        return frame.clone();
    }
    let width = (frame.width() / shrink).max(1);
    let height = (frame.height() / shrink).max(1);
    imageops::resize(frame, width, height, FilterType::Triangle)
}

/// Pixel-wise absolute difference of two frames of equal size.
pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> Result<GrayImage> {
    if a.dimensions() != b.dimensions() {
        return Err(VisionError::FrameSizeMismatch {
            left: a.dimensions(),
            right: b.dimensions(),
        });
    }
    Ok(GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y).0[0].abs_diff(b.get_pixel(x, y).0[0])])
    }))
}

/// 255 where `low <= p < high`, 0 elsewhere.
pub fn threshold(image: &GrayImage, low: u8, high: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y).0[0];
        Luma([if (low..high).contains(&p) { 255 } else { 0 }])
    })
}

/// Erosion then dilation with disk-shaped structuring elements. A radius of
/// 0 skips that step.
pub fn morphology(image: &GrayImage, erode_radius: u8, dilate_radius: u8) -> GrayImage {
    let eroded = if erode_radius > 0 {
        erode(image, Norm::L2, erode_radius)
    } else {
        image.clone()
    };
    if dilate_radius > 0 {
        dilate(&eroded, Norm::L2, dilate_radius)
    } else {
        eroded
    }
}

/// The part of `image` covered by `region`'s bounding box.
pub fn crop(image: &GrayImage, region: &Blob) -> GrayImage {
    let (x, y, width, height) = region.region();
    imageops::crop_imm(image, x, y, width, height).to_image()
}

/// Outlines `blob` on `frame`.
pub fn draw_blob(frame: &mut RgbImage, blob: &Blob) {
    let (x, y, width, height) = blob.region();
    let rect = Rect::at(x as i32, y as i32).of_size(width.max(1), height.max(1));
    draw_hollow_rect_mut(frame, rect, OVERLAY_COLOUR);
}

pub fn save_gray(image: &GrayImage, path: &Path) -> Result<()> {
    image.save(path)?;
    Ok(())
}

pub fn save_rgb(image: &RgbImage, path: &Path) -> Result<()> {
    image.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::blob::{BoundingBox, FrameSize};

    #[test]
    fn abs_diff_is_symmetric_and_exact() {
        let a = GrayImage::from_pixel(2, 2, Luma([200]));
        let b = GrayImage::from_pixel(2, 2, Luma([50]));
        assert_eq!(abs_diff(&a, &b).unwrap().get_pixel(1, 1).0[0], 150);
        assert_eq!(abs_diff(&b, &a).unwrap().get_pixel(0, 0).0[0], 150);
    }

    #[test]
    fn abs_diff_rejects_mismatched_sizes() {
        let a = GrayImage::new(2, 2);
        let b = GrayImage::new(3, 2);
        assert!(matches!(
            abs_diff(&a, &b),
            Err(VisionError::FrameSizeMismatch { .. })
        ));
    }

    #[test]
    fn threshold_keeps_half_open_band() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([[39, 40, 59, 60][x as usize]]));
        let out = threshold(&img, 40, 60);
        let values: Vec<u8> = out.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 255, 255, 0]);
    }

    #[test]
    fn morphology_removes_speckle_and_keeps_bulk() {
        let mut img = GrayImage::new(30, 30);
        img.put_pixel(2, 2, Luma([255]));
        for y in 10..20 {
            for x in 10..20 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let out = morphology(&img, 1, 1);
        assert_eq!(out.get_pixel(2, 2).0[0], 0);
        assert_eq!(out.get_pixel(15, 15).0[0], 255);
    }

    #[test]
    fn zero_radius_morphology_is_identity() {
        let img = GrayImage::from_fn(5, 5, |x, y| Luma([if x == y { 255 } else { 0 }]));
        assert_eq!(morphology(&img, 0, 0), img);
    }

    #[test]
    fn crop_follows_region() {
        let img = GrayImage::from_fn(20, 20, |x, y| Luma([(x + y) as u8]));
        let region = Blob::new(BoundingBox::new(5, 10, 2, 6), FrameSize::new(20, 20));
        let out = crop(&img, &region);
        assert_eq!(out.dimensions(), (5, 4));
        assert_eq!(out.get_pixel(0, 0).0[0], 7);
    }

    #[test]
    fn shrink_divides_dimensions() {
        let img = GrayImage::new(40, 30);
        assert_eq!(shrink_frame(&img, 2).dimensions(), (20, 15));
        assert_eq!(shrink_frame(&img, 1).dimensions(), (40, 30));
    }

    #[test]
    fn draw_blob_outlines_box() {
        let mut frame = RgbImage::new(20, 20);
        let blob = Blob::new(BoundingBox::new(2, 8, 3, 9), FrameSize::new(20, 20));
        draw_blob(&mut frame, &blob);
        assert_eq!(*frame.get_pixel(2, 3), OVERLAY_COLOUR);
        assert_eq!(*frame.get_pixel(5, 6), Rgb([0, 0, 0]));
    }

    #[test]
    fn frames_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let img = GrayImage::from_fn(8, 6, |x, _| Luma([x as u8 * 30]));
        save_gray(&img, &path).unwrap();
        let loaded = read_frame(&path, 2).unwrap();
        assert_eq!(loaded.dimensions(), (4, 3));
    }
}
