// THEORY:
// A `Blob` is the common currency of the engine. The component aggregator
// produces them, the chunk tracker consumes them, and the imaging collaborators
// crop and draw with them. It represents a single region of motion in a single
// frame as an axis-aligned bounding box over integer pixel coordinates.
//
// Key architectural principles:
// 1.  **Value Semantics**: Blobs are small `Copy` values. The only mutating
//     operation is `shift_over_merged`, which repositions the box in place.
// 2.  **Frame Awareness**: Every blob remembers the dimensions of the frame it
//     was detected in. After any mutation the box is clamped back into
//     [0, width) x [0, height), and `left <= right`, `top <= bottom` hold.
// 3.  **Heuristic Geometry**: `intersects` returns an overlap *area*, and
//     `approx_eq` is a tolerance test ("the same target at rest"), not
//     geometric equality. `PartialEq` stays structural.
// 4.  **Narrow Construction**: Only the component aggregator can attach a
//     centroid, volume and elongation, through `Blob::from_component`.

use std::fmt;
use tracing::warn;

/// Dimensions of the frame a blob was found in, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: i32,
    pub height: i32,
}

impl FrameSize {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Inclusive pixel bounds. Column bounds are `left`/`right`, row bounds are
/// `top`/`bottom`; the origin is the top-left corner of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

impl BoundingBox {
    pub fn new(left: i32, right: i32, top: i32, bottom: i32) -> Self {
        Self {
            left: left.min(right),
            right: left.max(right),
            top: top.min(bottom),
            bottom: top.max(bottom),
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) as f64 / 2.0,
            (self.top + self.bottom) as f64 / 2.0,
        )
    }

    fn corner(&self, corner: Corner) -> (i32, i32) {
        match corner {
            Corner::TopLeft => (self.left, self.top),
            Corner::BottomLeft => (self.left, self.bottom),
            Corner::TopRight => (self.right, self.top),
            Corner::BottomRight => (self.right, self.bottom),
        }
    }
}

/// The corners of a box, in the order `shift_over_merged` searches them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    BottomLeft,
    TopRight,
    BottomRight,
}

const SEARCH_ORDER: [Corner; 4] = [
    Corner::TopLeft,
    Corner::BottomLeft,
    Corner::TopRight,
    Corner::BottomRight,
];

/// Both overlap ratios must exceed this for two blobs to be approximately equal.
const APPROX_MIN_RATIO: f64 = 0.75;
/// The two overlap ratios may differ by less than this.
const APPROX_MAX_RATIO_SPREAD: f64 = 0.25;

/// A detected region of motion in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    bbox: BoundingBox,
    frame: FrameSize,
    /// Mean (column, row) of the component's pixels, if built from one.
    centroid: Option<(f64, f64)>,
    /// Pixel count of the component; 0 for hand-built boxes.
    volume: usize,
    /// Ratio of the principal axes of the component; 1.0 for hand-built boxes.
    elongation: f64,
}

impl Blob {
    /// A bare bounding box inside a frame, clamped to the frame.
    pub fn new(bbox: BoundingBox, frame: FrameSize) -> Self {
        let mut blob = Self {
            bbox,
            frame,
            centroid: None,
            volume: 0,
            elongation: 1.0,
        };
        blob.clamp_to_frame();
        blob
    }

    /// The constructor the component aggregator uses to hand over a finished
    /// measurement.
    pub(crate) fn from_component(
        bbox: BoundingBox,
        frame: FrameSize,
        centroid: (f64, f64),
        volume: usize,
        elongation: f64,
    ) -> Self {
        let mut blob = Self {
            bbox,
            frame,
            centroid: Some(centroid),
            volume,
            elongation,
        };
        blob.clamp_to_frame();
        blob
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn frame(&self) -> FrameSize {
        self.frame
    }

    pub fn left(&self) -> i32 {
        self.bbox.left
    }

    pub fn right(&self) -> i32 {
        self.bbox.right
    }

    pub fn top(&self) -> i32 {
        self.bbox.top
    }

    pub fn bottom(&self) -> i32 {
        self.bbox.bottom
    }

    pub fn centroid(&self) -> Option<(f64, f64)> {
        self.centroid
    }

    pub fn volume(&self) -> usize {
        self.volume
    }

    pub fn elongation(&self) -> f64 {
        self.elongation
    }

    /// `(right - left) * (bottom - top)`. A one-pixel-wide box has zero area.
    pub fn bounding_box_area(&self) -> i64 {
        self.bbox.width() as i64 * self.bbox.height() as i64
    }

    /// Maps a blob found on a shrunk frame back onto the full-size frame.
    /// Factors of 0 and 1 leave the blob unchanged.
    pub fn scale(&self, factor: u32) -> Blob {
        if factor <= 1 {
            return *self;
        }
        let k = i32::try_from(factor).unwrap_or(i32::MAX);
        let mut scaled = Blob {
            bbox: BoundingBox {
                left: self.bbox.left.saturating_mul(k),
                right: self.bbox.right.saturating_mul(k),
                top: self.bbox.top.saturating_mul(k),
                bottom: self.bbox.bottom.saturating_mul(k),
            },
            frame: FrameSize::new(
                self.frame.width.saturating_mul(k),
                self.frame.height.saturating_mul(k),
            ),
            centroid: self
                .centroid
                .map(|(x, y)| (x * factor as f64, y * factor as f64)),
            ..*self
        };
        scaled.clamp_to_frame();
        scaled
    }

    /// Area of overlap with `other`, or 0 when the boxes are disjoint.
    ///
    /// The boxes overlap when, on both axes, the span of their union is
    /// shorter than the sum of their extents.
    pub fn intersects(&self, other: &Blob) -> i64 {
        let a = &self.bbox;
        let b = &other.bbox;
        let span_x = (a.right.max(b.right) - a.left.min(b.left)) as i64;
        let span_y = (a.bottom.max(b.bottom) - a.top.min(b.top)) as i64;
        let extent_x = (a.width() + b.width()) as i64;
        let extent_y = (a.height() + b.height()) as i64;

        if span_x < extent_x && span_y < extent_y {
            (extent_x - span_x) * (extent_y - span_y)
        } else {
            0
        }
    }

    /// `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Blob) -> bool {
        self.intersects(other) == other.bounding_box_area()
    }

    /// Two blobs are "the same target at rest" when their overlap covers more
    /// than three quarters of each and the two coverage ratios are close.
    /// Zero-area blobs are never approximately equal to anything.
    pub fn approx_eq(&self, other: &Blob) -> bool {
        let own_area = self.bounding_box_area();
        let other_area = other.bounding_box_area();
        if own_area == 0 || other_area == 0 {
            return false;
        }

        let overlap = self.intersects(other) as f64;
        let own_ratio = overlap / own_area as f64;
        let other_ratio = overlap / other_area as f64;

        (own_ratio - other_ratio).abs() < APPROX_MAX_RATIO_SPREAD
            && own_ratio > APPROX_MIN_RATIO
            && other_ratio > APPROX_MIN_RATIO
    }

    /// Euclidean distance between the centers of the two boxes.
    pub fn center_distance(&self, other: &Blob) -> f64 {
        let (ax, ay) = self.bbox.center();
        let (bx, by) = other.bbox.center();
        (ax - bx).hypot(ay - by)
    }

    /// The corner of `merged` nearest to the same corner of `self`. Ties go to
    /// the earliest corner in top-left, bottom-left, top-right, bottom-right
    /// order.
    pub fn nearest_corner(&self, merged: &Blob) -> Option<Corner> {
        SEARCH_ORDER.iter().copied().min_by_key(|&corner| {
            let (x1, y1) = self.bbox.corner(corner);
            let (x2, y2) = merged.bbox.corner(corner);
            let (dx, dy) = ((x1 - x2) as i64, (y1 - y2) as i64);
            dx * dx + dy * dy
        })
    }

    /// Repositions this blob after it grew together with its own new position
    /// into the single blob `merged`.
    ///
    /// The corner of `merged` nearest to this blob marks where the target *was*,
    /// so the box is moved diagonally to the opposite corner of the larger of
    /// the two boxes. The new box is a square whose side is the longer side of
    /// the old one, so a target that also turned still fits inside it.
    pub fn shift_over_merged(&mut self, merged: &Blob) {
        let side = self.bbox.width().max(self.bbox.height());

        let (mut smaller, bigger) = if self.bounding_box_area() < merged.bounding_box_area() {
            (*self, *merged)
        } else {
            (*merged, *self)
        };
        let big = bigger.bbox;

        match self.nearest_corner(merged) {
            Some(Corner::TopLeft) => {
                smaller.bbox.right = big.right;
                smaller.bbox.left = big.right - side;
                smaller.bbox.bottom = big.bottom;
                smaller.bbox.top = big.bottom - side;
            }
            Some(Corner::TopRight) => {
                smaller.bbox.left = big.left;
                smaller.bbox.right = big.left + side;
                smaller.bbox.bottom = big.bottom;
                smaller.bbox.top = big.bottom - side;
            }
            Some(Corner::BottomLeft) => {
                smaller.bbox.right = big.right;
                smaller.bbox.left = big.right - side;
                smaller.bbox.top = big.top;
                smaller.bbox.bottom = big.top + side;
            }
            Some(Corner::BottomRight) => {
                smaller.bbox.left = big.left;
                smaller.bbox.right = big.left + side;
                smaller.bbox.top = big.top;
                smaller.bbox.bottom = big.top + side;
            }
            None => {
                // Weak point of the heuristic: fall back to the raw merged box.
                warn!(blob = %self, merged = %merged, "no nearest corner, keeping merged blob");
                smaller = *merged;
            }
        }

        *self = smaller;
        self.clamp_to_frame();
    }

    /// Top-left corner and size, for cropping a region of interest.
    pub fn region(&self) -> (u32, u32, u32, u32) {
        (
            self.bbox.left.max(0) as u32,
            self.bbox.top.max(0) as u32,
            self.bbox.width().max(0) as u32,
            self.bbox.height().max(0) as u32,
        )
    }

    fn clamp_to_frame(&mut self) {
        let max_x = (self.frame.width - 1).max(0);
        let max_y = (self.frame.height - 1).max(0);
        self.bbox.left = self.bbox.left.clamp(0, max_x);
        self.bbox.right = self.bbox.right.clamp(0, max_x);
        self.bbox.top = self.bbox.top.clamp(0, max_y);
        self.bbox.bottom = self.bbox.bottom.clamp(0, max_y);
        let BoundingBox {
            left,
            right,
            top,
            bottom,
        } = self.bbox;
        self.bbox = BoundingBox::new(left, right, top, bottom);
    }
}

impl fmt::Display for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.bbox.left, self.bbox.right, self.bbox.top, self.bbox.bottom
        )
    }
}

#[cfg(test)]
pub(crate) fn boxed(left: i32, right: i32, top: i32, bottom: i32) -> Blob {
    Blob::new(
        BoundingBox::new(left, right, top, bottom),
        FrameSize::new(100, 100),
    )
}
