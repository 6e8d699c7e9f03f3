// THEORY:
// The `pipeline` module is the top-level API of the engine. It takes a sorted
// list of frame files and a `PipelineConfig`, turns every pair of consecutive
// frames into a motion mask, labels the mask into blobs, and feeds the blobs to
// the chunk tracker. The result is a timeline of chunks, one per visit of the
// target, that can be printed as a report.
//
// Stages per frame `i` (for `i` from 1):
// 1.  **Delta**: |frame[i-1] - frame[i]| on shrunk luma frames, thresholded to
//     a band and cleaned by erosion then dilation.
// 2.  **Spatial Grouping**: two-pass connected-component labelling.
// 3.  **Tracking**: the blobs drive the chunk state machine. When a chunk
//     closes, `FrameDeltas` answers the gap-persistence probe by re-running the
//     delta on a cropped region of two older frames.
// 4.  **Overlay** (optional): once tracking has started, the last known
//     position is drawn on every following full-size frame and saved. The
//     delta masks and the masks compared by the gap probe are saved next to
//     the overlays.

use crate::core_modules::blob::Blob;
use crate::core_modules::chunks::Chunks;
use crate::core_modules::components::{self, DEFAULT_MAX_COMPONENTS};
use crate::core_modules::gap::DeltaProbe;
use crate::core_modules::imaging;
use crate::core_modules::mask::BinaryMask;
use crate::core_modules::tracker::{ChunkTracker, FrameEvent};
use crate::error::{Result, VisionError};
use image::GrayImage;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for the detection pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Lowest delta intensity counted as motion.
    pub threshold_low: u8,
    /// Delta intensities at or above this are ignored as noise (lighting
    /// changes, compression artefacts).
    pub threshold_high: u8,
    /// Erosion radius applied to the thresholded delta; 0 disables it.
    pub erode: u8,
    /// Dilation radius applied after erosion; 0 disables it.
    pub dilate: u8,
    /// Frames are shrunk by this integer factor before differencing.
    pub shrink_factor: u32,
    /// Prefix of every file written by the pipeline.
    pub prefix: String,
    /// Connected components allowed per mask before the run fails.
    pub max_components: usize,
    pub write_overlays: bool,
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold_low: 40,
            threshold_high: 60,
            erode: 2,
            dilate: 20,
            shrink_factor: 1,
            prefix: String::from("test"),
            max_components: DEFAULT_MAX_COMPONENTS,
            write_overlays: false,
            output_dir: PathBuf::from("."),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threshold_low >= self.threshold_high {
            return Err(VisionError::InvalidConfig(format!(
                "threshold range {}..{} is empty",
                self.threshold_low, self.threshold_high
            )));
        }
        if self.shrink_factor < 1 {
            return Err(VisionError::InvalidConfig(
                "shrink factor must be at least 1".into(),
            ));
        }
        if self.prefix.is_empty() || !self.prefix.chars().all(char::is_alphabetic) {
            return Err(VisionError::InvalidConfig(format!(
                "prefix {:?} must be alphabetic",
                self.prefix
            )));
        }
        if self.max_components == 0 {
            return Err(VisionError::InvalidConfig(
                "component capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Computes motion masks between frames of a fixed frame list.
#[derive(Debug, Clone)]
pub struct FrameDeltas {
    frames: Arc<[PathBuf]>,
    threshold_low: u8,
    threshold_high: u8,
    erode: u8,
    dilate: u8,
    shrink_factor: u32,
    max_components: usize,
    mask_output: Option<MaskOutput>,
}

/// Where intermediate masks are written when overlays are enabled.
#[derive(Debug, Clone)]
struct MaskOutput {
    dir: PathBuf,
    prefix: String,
}

impl FrameDeltas {
    pub fn new(config: &PipelineConfig, frames: Vec<PathBuf>) -> Self {
        let mask_output = config.write_overlays.then(|| MaskOutput {
            dir: config.output_dir.clone(),
            prefix: config.prefix.clone(),
        });
        Self {
            frames: frames.into(),
            threshold_low: config.threshold_low,
            threshold_high: config.threshold_high,
            erode: config.erode,
            dilate: config.dilate,
            shrink_factor: config.shrink_factor,
            max_components: config.max_components,
            mask_output,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[PathBuf] {
        &self.frames
    }

    pub fn path(&self, index: usize) -> Result<&Path> {
        self.frames
            .get(index)
            .map(PathBuf::as_path)
            .ok_or(VisionError::FrameIndexOutOfRange {
                index,
                len: self.frames.len(),
            })
    }

    /// File name of frame `index` without its extension.
    pub fn frame_stem(&self, index: usize) -> Result<String> {
        let path = self.path(index)?;
        Ok(path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| index.to_string()))
    }

    /// Writes `mask` as `{prefix}-{name}.png` when overlays are enabled.
    pub fn save_mask(&self, name: &str, mask: &BinaryMask) -> Result<()> {
        let Some(out) = &self.mask_output else {
            return Ok(());
        };
        std::fs::create_dir_all(&out.dir)?;
        let path = out.dir.join(format!("{}-{}.png", out.prefix, name));
        debug!(path = %path.display(), "writing mask");
        imaging::save_gray(&mask.to_image(), &path)
    }

    /// Shrunk luma frame at `index`.
    pub fn frame(&self, index: usize) -> Result<GrayImage> {
        imaging::read_frame(self.path(index)?, self.shrink_factor)
    }

    /// Thresholded, morphology-filtered difference of two loaded frames.
    pub fn mask_between(&self, a: &GrayImage, b: &GrayImage) -> Result<BinaryMask> {
        let diff = imaging::abs_diff(a, b)?;
        let banded = imaging::threshold(&diff, self.threshold_low, self.threshold_high);
        Ok(BinaryMask::from(imaging::morphology(
            &banded,
            self.erode,
            self.dilate,
        )))
    }

    pub fn blobs_in(&self, mask: &BinaryMask) -> Result<Vec<Blob>> {
        components::find_blobs(mask, self.max_components)
    }

    /// Blobs in the delta between frames `a` and `b`.
    pub fn delta_blobs(&self, a: usize, b: usize) -> Result<Vec<Blob>> {
        let mask = self.mask_between(&self.frame(a)?, &self.frame(b)?)?;
        self.blobs_in(&mask)
    }

    /// Whether the delta between frames `a` and `b`, restricted to `region`,
    /// contains a blob.
    pub fn region_has_blob(&self, a: usize, b: usize, region: &Blob) -> Result<bool> {
        let (_, _, width, height) = region.region();
        if width == 0 || height == 0 {
            return Ok(false);
        }
        let first = imaging::crop(&self.frame(a)?, region);
        let second = imaging::crop(&self.frame(b)?, region);
        let mask = self.mask_between(&first, &second)?;
        let name = format!("blob-{}-{}", self.frame_stem(a)?, self.frame_stem(b)?);
        self.save_mask(&name, &mask)?;
        Ok(!self.blobs_in(&mask)?.is_empty())
    }
}

impl DeltaProbe for FrameDeltas {
    fn blob_present(&mut self, a: usize, b: usize, region: &Blob) -> Result<bool> {
        self.region_has_blob(a, b, region)
    }
}

/// The main, top-level struct for chunk detection over a frame list.
pub struct DetectionPipeline {
    config: PipelineConfig,
    deltas: FrameDeltas,
    tracker: ChunkTracker,
}

impl DetectionPipeline {
    pub fn new(config: PipelineConfig, frames: Vec<PathBuf>) -> Result<Self> {
        config.validate()?;
        let deltas = FrameDeltas::new(&config, frames);
        Ok(Self {
            config,
            deltas,
            tracker: ChunkTracker::new(),
        })
    }

    /// Processes every frame in order and returns the finished timeline.
    pub fn run(&mut self) -> Result<&Chunks> {
        if self.deltas.len() < 2 {
            warn!(frames = self.deltas.len(), "need at least two frames for a delta");
            return Ok(self.tracker.chunks());
        }
        if self.config.write_overlays {
            std::fs::create_dir_all(&self.config.output_dir)?;
        }

        let mut previous = self.deltas.frame(0)?;
        for index in 1..self.deltas.len() {
            let current = self.deltas.frame(index)?;

            // Stage 1 & 2: Delta and Spatial Grouping
            let mask = self.deltas.mask_between(&previous, &current)?;
            let blobs = self.deltas.blobs_in(&mask)?;
            debug!(index, blobs = blobs.len(), "frame delta labelled");
            let name = format!("delta-{}", self.deltas.frame_stem(index)?);
            self.deltas.save_mask(&name, &mask)?;

            // Stage 3: Tracking
            let event = self.tracker.observe(index, &blobs, &mut self.deltas)?;
            if let FrameEvent::Closed { chunk, verdict } = event {
                debug!(%chunk, ?verdict, index, "activity ended");
            }

            // Stage 4: Overlay
            if self.config.write_overlays {
                self.write_overlay(index)?;
            }

            previous = current;
        }
        self.tracker.finish(&mut self.deltas)?;

        info!(
            frames = self.deltas.len(),
            chunks = self.tracker.chunks().size(),
            "detection finished"
        );
        Ok(self.tracker.chunks())
    }

    fn write_overlay(&self, index: usize) -> Result<()> {
        let Some(blob) = self.tracker.last_seen() else {
            return Ok(());
        };
        let path = self.deltas.path(index)?;
        let mut frame = imaging::read_colour_frame(path)?;
        imaging::draw_blob(&mut frame, &blob.scale(self.config.shrink_factor));

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{index}.png"));
        let out = self
            .config
            .output_dir
            .join(format!("{}-tracking-{}", self.config.prefix, name));
        imaging::save_rgb(&frame, &out)
    }

    pub fn chunks(&self) -> &Chunks {
        self.tracker.chunks()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn report(&self) -> ChunkReport<'_> {
        ChunkReport {
            chunks: self.tracker.chunks(),
            frames: self.deltas.frames(),
            shrink_factor: self.config.shrink_factor,
        }
    }
}

/// Human-readable summary of a timeline, positions mapped to full-size
/// frame coordinates.
pub struct ChunkReport<'a> {
    pub chunks: &'a Chunks,
    pub frames: &'a [PathBuf],
    pub shrink_factor: u32,
}

impl fmt::Display for ChunkReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |index: usize| {
            self.frames
                .get(index)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| format!("#{index}"))
        };

        if self.chunks.is_empty() {
            return writeln!(f, "no activity");
        }
        for (n, (_, chunk)) in self.chunks.iter().enumerate() {
            writeln!(
                f,
                "chunk {}: frames {}..={} ({} tracks)",
                n + 1,
                chunk.start_index(),
                chunk.end_index(),
                chunk.tracks().len()
            )?;
            writeln!(
                f,
                "  start pos {} at {}",
                chunk.start_pos().scale(self.shrink_factor),
                name(chunk.start_index())
            )?;
            writeln!(
                f,
                "  end pos {} at {}",
                chunk.end_pos().scale(self.shrink_factor),
                name(chunk.end_index())
            )?;
        }
        Ok(())
    }
}
