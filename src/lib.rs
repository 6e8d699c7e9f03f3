// THEORY:
// This file is the main entry point for the `motion_chunks` library crate.
// It exposes the `DetectionPipeline` and `ParallelSurvey` as the high-level
// interface, together with the engine types a caller needs to feed its own
// masks: `BinaryMask` in, `Blob`s out, and the `Chunks` timeline built by the
// `ChunkTracker`. The supporting modules live under `core_modules`.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use core_modules::blob::{Blob, BoundingBox, FrameSize};
pub use core_modules::chunk::{Chunk, Track, TrackUpdate};
pub use core_modules::chunks::{ChunkId, Chunks};
pub use core_modules::components::{ConnectedComponents, find_blobs};
pub use core_modules::gap::{DeltaProbe, GapVerdict};
pub use core_modules::mask::BinaryMask;
pub use core_modules::tracker::{ChunkTracker, FrameEvent};
pub use error::{Result, VisionError};
pub use parallel_pipeline::ParallelSurvey;
pub use pipeline::{DetectionPipeline, PipelineConfig};
