// THEORY:
// Motion detection only sees change. A target that walks into view and stands
// still disappears from the deltas, and when it moves again a second chunk
// opens. The gap analysis decides whether the quiet interval between two chunks
// hid a persisting target, in which case the chunks describe one visit and are
// merged.
//
// The test samples one frame in the middle of the gap and compares it, inside
// the region where the previous chunk last saw the target, against two
// reference frames:
// 1.  **Before arrival**: the frame just before the target reached that region.
//     If the target is still there at the sample, this comparison shows a blob.
// 2.  **After settling**: the last active frame of the previous chunk. If the
//     target did not move since, this comparison shows nothing.
// A blob against (1) and none against (2) means the target persisted.
//
// The arrival frame is found by walking the previous chunk's tracks backwards
// while they still overlap the region, crossing into earlier chunks of the same
// visit until a chunk whose gap was already examined.
//
// The delta computation is injected through `DeltaProbe`, so this module never
// touches images.

use crate::core_modules::blob::Blob;
use crate::core_modules::chunks::{ChunkId, Chunks};
use crate::error::Result;
use tracing::{debug, info};

/// Answers whether a blob appears in the delta between two frames inside a
/// region of interest.
pub trait DeltaProbe {
    fn blob_present(&mut self, a: usize, b: usize, region: &Blob) -> Result<bool>;
}

impl<F> DeltaProbe for F
where
    F: FnMut(usize, usize, &Blob) -> Result<bool>,
{
    fn blob_present(&mut self, a: usize, b: usize, region: &Blob) -> Result<bool> {
        self(a, b, region)
    }
}

/// The frames and region compared for one gap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapSample {
    /// Frame just before the target arrived at `region`.
    pub reference: usize,
    /// Last active frame before the gap.
    pub settled: usize,
    /// Frame sampled in the middle of the gap.
    pub sample: usize,
    pub region: Blob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapVerdict {
    /// First chunk of the timeline, nothing to compare with.
    NoPredecessor,
    /// The chunks are adjacent; there is no frame to sample.
    TooNarrow,
    /// The target stayed in place through the gap.
    Persists,
    /// The region was empty during the gap.
    Empty,
}

/// Chooses the frames to compare for the gap in front of chunk `id`, or
/// explains why there is nothing to compare.
pub fn sample_gap(chunks: &Chunks, id: ChunkId) -> std::result::Result<GapSample, GapVerdict> {
    let chunk = chunks.get(id).ok_or(GapVerdict::NoPredecessor)?;
    let predecessor_id = chunk.prev().ok_or(GapVerdict::NoPredecessor)?;
    let predecessor = chunks.get(predecessor_id).ok_or(GapVerdict::NoPredecessor)?;

    let settled = predecessor.end_index();
    if chunk.start_index() <= settled + 1 {
        return Err(GapVerdict::TooNarrow);
    }

    let region = *predecessor.end_pos();
    let arrival = arrival_index(chunks, predecessor_id, &region);
    Ok(GapSample {
        reference: arrival.saturating_sub(1),
        settled,
        sample: (settled + chunk.start_index()) / 2,
        region,
    })
}

/// Index of the earliest track, counting back from the end of
/// `predecessor_id`, that still overlaps `region`.
fn arrival_index(chunks: &Chunks, predecessor_id: ChunkId, region: &Blob) -> usize {
    let mut arrival = chunks
        .get(predecessor_id)
        .and_then(|c| c.tracks().last())
        .map_or(0, |t| t.index);
    let mut current = Some(predecessor_id);

    'walk: while let Some(chunk) = current.and_then(|id| chunks.get(id)) {
        for track in chunk.tracks().iter().rev() {
            if track.blob.intersects(region) > 0 {
                arrival = track.index;
            } else {
                break 'walk;
            }
        }
        if chunk.gap_known() {
            break;
        }
        current = chunk.prev();
    }
    arrival
}

/// Runs the persistence test for the gap in front of chunk `id`.
pub fn decide(chunks: &Chunks, id: ChunkId, probe: &mut impl DeltaProbe) -> Result<GapVerdict> {
    let sample = match sample_gap(chunks, id) {
        Ok(sample) => sample,
        Err(verdict) => return Ok(verdict),
    };

    let since_arrival = probe.blob_present(sample.reference, sample.sample, &sample.region)?;
    let since_settled = probe.blob_present(sample.settled, sample.sample, &sample.region)?;
    debug!(
        chunk = %id,
        reference = sample.reference,
        settled = sample.settled,
        sample = sample.sample,
        region = %sample.region,
        since_arrival,
        since_settled,
        "sampled gap"
    );

    Ok(if since_arrival && !since_settled {
        GapVerdict::Persists
    } else {
        GapVerdict::Empty
    })
}

/// Decides the gap in front of chunk `id` and merges the chunk into its
/// predecessor when the target persisted through it.
pub fn resolve_gap(
    chunks: &mut Chunks,
    id: ChunkId,
    probe: &mut impl DeltaProbe,
) -> Result<GapVerdict> {
    let verdict = decide(chunks, id, probe)?;
    match verdict {
        GapVerdict::Persists => {
            if let Some(predecessor) = chunks.get(id).and_then(|c| c.prev()) {
                info!(chunk = %id, into = %predecessor, "target persisted over gap");
                chunks.merge_with_next(predecessor);
            }
        }
        _ => chunks.mark_gap_known(id),
    }
    Ok(verdict)
}
