// THEORY:
// The `tracker` module adds memory to the engine. It takes the stateless blob
// list of each frame delta and turns the stream into a timeline of chunks.
//
// Key architectural principles:
// 1.  **One Open Chunk**: At most one chunk is open at a time. A frame with
//     blobs either opens a chunk (when none is open) or extends the open one.
// 2.  **Lifecycle Management**:
//     - **Birth**: The first active frame after a quiet spell opens a chunk,
//       seeded from the last position the target was seen at, if any.
//     - **Tracking**: Every further active frame updates the chunk's track.
//     - **Closure**: The first quiet frame closes the chunk at the previous
//       index, and the gap in front of it is decided right away. If the target
//       persisted through the gap, the chunk folds into its predecessor.
// 3.  **End of Stream**: `finish` closes a chunk still open when the frames
//     run out, at the last processed index.
// 4.  **Strict Ordering**: Frames are fed in index order. Every decision
//     depends on the last known position, so nothing here is concurrent.

use crate::core_modules::blob::Blob;
use crate::core_modules::chunk::{Chunk, TrackUpdate};
use crate::core_modules::chunks::{ChunkId, Chunks};
use crate::core_modules::gap::{self, DeltaProbe, GapVerdict};
use crate::error::Result;
use tracing::{debug, info};

/// What a frame did to the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// Quiet frame with no chunk open.
    Idle,
    Opened(ChunkId),
    Extended { chunk: ChunkId, update: TrackUpdate },
    /// The open chunk ended. With `GapVerdict::Persists` it has already been
    /// folded into its predecessor and `chunk` is no longer live.
    Closed { chunk: ChunkId, verdict: GapVerdict },
}

/// Drives a `Chunks` timeline from per-frame blob lists.
#[derive(Debug, Default)]
pub struct ChunkTracker {
    /// The timeline built so far.
    chunks: Chunks,
    /// The chunk receiving tracks, if activity is ongoing.
    open: Option<ChunkId>,
    /// Index of the last frame fed to `observe`.
    last_index: Option<usize>,
}

impl ChunkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the blobs found in the delta ending at frame `index`.
    pub fn observe(
        &mut self,
        index: usize,
        blobs: &[Blob],
        probe: &mut impl DeltaProbe,
    ) -> Result<FrameEvent> {
        self.last_index = Some(index);

        match (self.open, blobs.is_empty()) {
            // --- 1. Quiet ---
            (None, true) => Ok(FrameEvent::Idle),

            // --- 2. Birth ---
            (None, false) => {
                let prior = self.last_seen();
                let chunk = Chunk::open(index, blobs, prior.as_ref())?;
                let id = self.chunks.append(chunk);
                self.open = Some(id);
                info!(chunk = %id, index, blob_count = blobs.len(), "chunk opened");
                Ok(FrameEvent::Opened(id))
            }

            // --- 3. Tracking ---
            (Some(id), false) => {
                let update = match self.chunks.get_mut(id) {
                    Some(chunk) => chunk.update(index, blobs),
                    None => TrackUpdate::Anomaly {
                        blob_count: blobs.len(),
                    },
                };
                Ok(FrameEvent::Extended { chunk: id, update })
            }

            // --- 4. Closure ---
            (Some(id), true) => self.close(id, index.saturating_sub(1), probe),
        }
    }

    /// Closes a chunk left open at the end of the stream.
    pub fn finish(&mut self, probe: &mut impl DeltaProbe) -> Result<Option<FrameEvent>> {
        match (self.open, self.last_index) {
            (Some(id), Some(last)) => self.close(id, last, probe).map(Some),
            _ => Ok(None),
        }
    }

    fn close(
        &mut self,
        id: ChunkId,
        end_index: usize,
        probe: &mut impl DeltaProbe,
    ) -> Result<FrameEvent> {
        if let Some(chunk) = self.chunks.get_mut(id) {
            chunk.close(end_index);
            info!(
                chunk = %id,
                start = chunk.start_index(),
                end = chunk.end_index(),
                tracks = chunk.tracks().len(),
                "chunk closed"
            );
        }
        self.open = None;

        let verdict = gap::resolve_gap(&mut self.chunks, id, probe)?;
        debug!(chunk = %id, ?verdict, "gap decided");
        Ok(FrameEvent::Closed { chunk: id, verdict })
    }

    /// Last known position of the target.
    pub fn last_seen(&self) -> Option<Blob> {
        self.chunks.back().map(|c| *c.end_pos())
    }

    pub fn is_tracking(&self) -> bool {
        self.open.is_some()
    }

    pub fn chunks(&self) -> &Chunks {
        &self.chunks
    }

    pub fn into_chunks(self) -> Chunks {
        self.chunks
    }
}
