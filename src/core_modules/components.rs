// THEORY:
// `ConnectedComponents` is the second pass of the labelling and the engine of
// the spatial grouping layer. It takes the disjoint-set forest built by the
// first pass and turns it into a list of measured regions.
//
// Key architectural principles & algorithm steps:
// 1.  **Root Resolution**: Every foreground cell is walked to its root. The
//     first time a root is seen, a `Component` is created for it; every cell
//     then records the index of its component and the label of its root.
// 2.  **Bounded Capacity**: The number of components is capped. Exceeding the
//     cap is reported as `ComponentOverflow`, never truncated silently.
// 3.  **Data Aggregation**: While cells are assigned, each component
//     accumulates its bounding box, pixel count and first and second moments,
//     so centroid and elongation fall out without a second scan.
// 4.  **Stateless Utility**: A `ConnectedComponents` is built for one mask and
//     has no memory of previous frames.

use crate::core_modules::blob::{Blob, BoundingBox, FrameSize};
use crate::core_modules::disjoint_set::DisjointSetLabeller;
use crate::core_modules::mask::BinaryMask;
use crate::error::{Result, VisionError};
use image::{GrayImage, Luma};
use std::fmt;
use tracing::{debug, trace};

/// Default component capacity per mask.
pub const DEFAULT_MAX_COMPONENTS: usize = 1024;

/// Variance of a single unit-square pixel along one axis. Added to both axes so
/// a one-pixel-wide line has a finite elongation equal to its length.
const PIXEL_VARIANCE: f64 = 1.0 / 12.0;

/// A maximal 8-connected region of foreground pixels.
#[derive(Debug, Clone)]
pub struct Component {
    /// Arena index of the disjoint-set root that represents this region.
    pub root: usize,
    /// Label carried by the root after the first pass.
    pub label: u32,
    pub min_col: u32,
    pub max_col: u32,
    pub min_row: u32,
    pub max_row: u32,
    /// Number of pixels in the region.
    pub volume: usize,
    sum_x: u64,
    sum_y: u64,
    sum_xx: u64,
    sum_yy: u64,
    sum_xy: u64,
}

impl Component {
    fn new(root: usize, label: u32, col: u32, row: u32) -> Self {
        Self {
            root,
            label,
            min_col: col,
            max_col: col,
            min_row: row,
            max_row: row,
            volume: 0,
            sum_x: 0,
            sum_y: 0,
            sum_xx: 0,
            sum_yy: 0,
            sum_xy: 0,
        }
    }

    fn include(&mut self, col: u32, row: u32) {
        self.min_col = self.min_col.min(col);
        self.max_col = self.max_col.max(col);
        self.min_row = self.min_row.min(row);
        self.max_row = self.max_row.max(row);

        let (x, y) = (col as u64, row as u64);
        self.volume += 1;
        self.sum_x += x;
        self.sum_y += y;
        self.sum_xx += x * x;
        self.sum_yy += y * y;
        self.sum_xy += x * y;
    }

    /// Mean (column, row) of the region's pixels.
    pub fn centroid(&self) -> (f64, f64) {
        let n = self.volume.max(1) as f64;
        (self.sum_x as f64 / n, self.sum_y as f64 / n)
    }

    /// Ratio of the major to the minor principal axis of the region.
    pub fn elongation(&self) -> f64 {
        let n = self.volume.max(1) as f64;
        let (cx, cy) = self.centroid();
        let mu20 = self.sum_xx as f64 / n - cx * cx + PIXEL_VARIANCE;
        let mu02 = self.sum_yy as f64 / n - cy * cy + PIXEL_VARIANCE;
        let mu11 = self.sum_xy as f64 / n - cx * cy;

        let mean = (mu20 + mu02) / 2.0;
        let spread = (((mu20 - mu02) / 2.0).powi(2) + mu11 * mu11).sqrt();
        let major = mean + spread;
        let minor = (mean - spread).max(f64::EPSILON);
        (major / minor).sqrt()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(
            self.min_col as i32,
            self.max_col as i32,
            self.min_row as i32,
            self.max_row as i32,
        )
    }

    pub fn to_blob(&self, frame: FrameSize) -> Blob {
        Blob::from_component(
            self.bounding_box(),
            frame,
            self.centroid(),
            self.volume,
            self.elongation(),
        )
    }
}

/// The labelled result of one mask.
#[derive(Debug, Clone)]
pub struct ConnectedComponents {
    labeller: DisjointSetLabeller,
    components: Vec<Component>,
    frame: FrameSize,
}

impl ConnectedComponents {
    /// Labels `mask` and aggregates its components, failing if more than
    /// `max_components` regions are found.
    pub fn new(mask: &BinaryMask, max_components: usize) -> Result<Self> {
        let labeller = DisjointSetLabeller::label(mask);
        let frame = FrameSize::new(mask.width() as i32, mask.height() as i32);
        let mut result = Self {
            labeller,
            components: Vec::new(),
            frame,
        };
        result.resolve(max_components)?;
        debug!(
            width = mask.width(),
            height = mask.height(),
            provisional = result.labeller.provisional_labels(),
            components = result.components.len(),
            "labelled mask"
        );
        Ok(result)
    }

    fn resolve(&mut self, max_components: usize) -> Result<()> {
        let width = self.labeller.width();
        for idx in 0..self.labeller.cells().len() {
            if !self.labeller.cells()[idx].is_foreground() {
                continue;
            }
            let root = self.labeller.find(idx);
            let col = (idx % width) as u32;
            let row = (idx / width) as u32;

            let component = match self.labeller.cells()[root].component {
                Some(component) => component,
                None => {
                    if self.components.len() >= max_components {
                        return Err(VisionError::ComponentOverflow {
                            max: max_components,
                        });
                    }
                    let label = self.labeller.cells()[root].label.unwrap_or_default();
                    let component = self.components.len();
                    trace!(root, label, component, "new component");
                    self.components.push(Component::new(root, label, col, row));
                    self.labeller.cells_mut()[root].component = Some(component);
                    component
                }
            };

            let label = self.components[component].label;
            let cell = &mut self.labeller.cells_mut()[idx];
            cell.component = Some(component);
            cell.label = Some(label);
            self.components[component].include(col, row);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn frame(&self) -> FrameSize {
        self.frame
    }

    /// Blobs in order of first appearance in a row-major scan.
    pub fn blobs(&self) -> Vec<Blob> {
        self.components
            .iter()
            .map(|c| c.to_blob(self.frame))
            .collect()
    }

    /// Resolved label of the pixel, or `None` for background.
    pub fn label_at(&self, col: u32, row: u32) -> Option<u32> {
        let idx = self.labeller.checked_index(col as usize, row as usize)?;
        self.labeller.cells().get(idx).and_then(|c| c.label)
    }

    /// Index into `components()` of the pixel's region, or `None` for background.
    pub fn component_at(&self, col: u32, row: u32) -> Option<usize> {
        let idx = self.labeller.checked_index(col as usize, row as usize)?;
        self.labeller.cells().get(idx).and_then(|c| c.component)
    }

    /// Renders each component in its own grey level on a black background.
    pub fn labelled_image(&self) -> GrayImage {
        let width = self.labeller.width();
        GrayImage::from_fn(self.frame.width as u32, self.frame.height as u32, |x, y| {
            let idx = y as usize * width + x as usize;
            match self.labeller.cells()[idx].component {
                Some(c) => Luma([255 - ((c * 37) % 200) as u8]),
                None => Luma([0]),
            }
        })
    }
}

/// Label grid followed by one line per component.
impl fmt::Display for ConnectedComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.labeller.height() {
            for col in 0..self.labeller.width() {
                let cell = &self.labeller.cells()[self.labeller.index(col, row)];
                match cell.label {
                    Some(label) => write!(f, "{label:2}  ")?,
                    None => write!(f, " -  ")?,
                }
            }
            writeln!(f)?;
        }
        for component in &self.components {
            let (cx, cy) = component.centroid();
            writeln!(
                f,
                "{} ({:.1}, {:.1}) volume={} blob={}",
                component.label,
                cx,
                cy,
                component.volume,
                component.to_blob(self.frame)
            )?;
        }
        Ok(())
    }
}

/// Convenience wrapper: label `mask` and return its blobs.
pub fn find_blobs(mask: &BinaryMask, max_components: usize) -> Result<Vec<Blob>> {
    Ok(ConnectedComponents::new(mask, max_components)?.blobs())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(rows: &[&str]) -> ConnectedComponents {
        ConnectedComponents::new(&BinaryMask::from_ascii(rows), DEFAULT_MAX_COMPONENTS).unwrap()
    }

    #[test]
    fn empty_mask_has_no_components() {
        let cc = label(&["....", "....", "...."]);
        assert!(cc.is_empty());
        assert!(cc.blobs().is_empty());
    }

    #[test]
    fn zero_sized_mask_is_empty() {
        let mask = BinaryMask::new(0, 0, Vec::new()).unwrap();
        let cc = ConnectedComponents::new(&mask, DEFAULT_MAX_COMPONENTS).unwrap();
        assert!(cc.is_empty());
    }

    #[test]
    fn two_squares_give_two_blobs() {
        let blobs = label(&[
            "...........",
            ".###.......",
            ".###.......",
            ".###.......",
            "...........",
            "......###..",
            "......###..",
            "......###..",
        ])
        .blobs();

        assert_eq!(blobs.len(), 2);
        assert_eq!(*blobs[0].bbox(), BoundingBox::new(1, 3, 1, 3));
        assert_eq!(*blobs[1].bbox(), BoundingBox::new(6, 8, 5, 7));
        assert_eq!(blobs[0].volume(), 9);
        assert_eq!(blobs[0].centroid(), Some((2.0, 2.0)));
    }

    #[test]
    fn diagonal_touch_is_one_component() {
        let cc = label(&["##..", "##..", "..##", "..##"]);
        assert_eq!(cc.len(), 1);
        assert_eq!(*cc.blobs()[0].bbox(), BoundingBox::new(0, 3, 0, 3));
        assert_eq!(cc.components()[0].volume, 8);
    }

    #[test]
    fn lookups_outside_the_mask_are_background() {
        let cc = label(&["..", "#."]);
        assert!(cc.label_at(0, 1).is_some());
        assert_eq!(cc.label_at(2, 0), None);
        assert_eq!(cc.component_at(2, 0), None);
        assert_eq!(cc.label_at(0, 2), None);
        assert_eq!(cc.component_at(u32::MAX, u32::MAX), None);
    }

    #[test]
    fn every_foreground_pixel_has_a_consistent_label() {
        let rows = ["#.#..#", "#.#..#", "###..#", "......", "##.##."];
        let cc = label(&rows);
        let mask = BinaryMask::from_ascii(&rows);
        for row in 0..mask.height() {
            for col in 0..mask.width() {
                let labelled = cc.label_at(col, row).is_some();
                assert_eq!(labelled, mask.is_foreground(col, row), "({col}, {row})");
            }
        }
        // The U shape resolves to a single label.
        assert_eq!(cc.label_at(0, 0), cc.label_at(2, 0));
        assert_eq!(cc.component_at(0, 0), cc.component_at(1, 2));
        assert_ne!(cc.component_at(0, 0), cc.component_at(5, 0));
        assert_eq!(cc.len(), 4);
    }

    #[test]
    fn bounding_boxes_enclose_their_pixels() {
        let rows = [".#....", "###...", ".#..##", "....##"];
        let cc = label(&rows);
        for row in 0..4 {
            for col in 0..6 {
                if let Some(c) = cc.component_at(col, row) {
                    let comp = &cc.components()[c];
                    assert!(comp.min_col <= col && col <= comp.max_col);
                    assert!(comp.min_row <= row && row <= comp.max_row);
                }
            }
        }
    }

    #[test]
    fn overflow_is_reported() {
        let mask = BinaryMask::from_ascii(&["#.#.#"]);
        let err = ConnectedComponents::new(&mask, 2).unwrap_err();
        assert!(matches!(err, VisionError::ComponentOverflow { max: 2 }));
    }

    #[test]
    fn horizontal_line_elongation_is_its_length() {
        let cc = label(&["........", ".######.", "........"]);
        let elongation = cc.components()[0].elongation();
        assert!((elongation - 6.0).abs() < 1e-9, "got {elongation}");
    }

    #[test]
    fn square_is_not_elongated() {
        let cc = label(&["###", "###", "###"]);
        assert!((cc.components()[0].elongation() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn display_prints_grid_and_summary() {
        let cc = label(&["#.", ".."]);
        let text = cc.to_string();
        assert!(text.starts_with(" 0   -  \n -   -  \n"));
        assert!(text.contains("volume=1"));
    }

    #[test]
    fn labelled_image_marks_foreground_only() {
        let cc = label(&["#.", ".#"]);
        let img = cc.labelled_image();
        assert_ne!(img.get_pixel(0, 0).0[0], 0);
        assert_eq!(img.get_pixel(1, 0).0[0], 0);
    }
}
