// THEORY:
// Every fallible operation in the engine reports through `VisionError`. The
// variants map onto the failure taxonomy of the tracker: precondition
// violations on the input grid, capacity exhaustion while aggregating
// components, invalid configuration, and the I/O and decoding failures of the
// imaging collaborators. Anomalous blob counts and ambiguous geometry are NOT
// errors; they are logged branch outcomes inside the tracker.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    /// The mask is not a single-channel 8-bit image.
    #[error("unsupported pixel format {0}: expected single-channel 8-bit intensities")]
    UnsupportedPixelFormat(String),

    #[error("buffer of {actual} bytes does not match a {width}x{height} grid")]
    DimensionMismatch { width: u32, height: u32, actual: usize },

    #[error("frames differ in size: {left:?} vs {right:?}")]
    FrameSizeMismatch { left: (u32, u32), right: (u32, u32) },

    /// More connected components than the configured capacity.
    #[error("component capacity of {max} exceeded")]
    ComponentOverflow { max: usize },

    #[error("cannot open a chunk at frame {index}: no blobs detected")]
    EmptyFrame { index: usize },

    #[error("frame index {index} out of range for {len} frames")]
    FrameIndexOutOfRange { index: usize, len: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker pool error: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, VisionError>;
