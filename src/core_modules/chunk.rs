// THEORY:
// A `Chunk` is one contiguous interval of motion activity: the frames from the
// first delta in which blobs appeared up to the last one before the scene went
// quiet. Inside the interval it keeps a `Track` per frame, the single position
// it believes the target occupied.
//
// Key architectural principles:
// 1.  **One Target**: The tracker follows exactly one target. When a frame
//     reports two blobs, one is the target's old position and one its new one,
//     or the target and a bystander; `select_from_pair` picks the better
//     candidate. Frames with more blobs are logged anomalies and skipped.
// 2.  **Shift Over Merge**: When the old and new positions of the target grow
//     together into a single blob, the tracked box is moved across that blob
//     with `Blob::shift_over_merged` instead of adopting the merged box.
// 3.  **Links Not Owned**: A chunk records its neighbors in the timeline only
//     as `ChunkId`s; the `Chunks` arena owns every chunk.

use crate::core_modules::blob::Blob;
use crate::core_modules::chunks::ChunkId;
use crate::error::{Result, VisionError};
use std::fmt;
use tracing::{debug, warn};

/// The target's position in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    /// Frame index the position was observed at.
    pub index: usize,
    pub blob: Blob,
}

/// How a frame changed the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackUpdate {
    /// A new position was recorded.
    Moved,
    /// The single blob matched the last position; the target turned in place.
    Rotated,
    /// Old and new positions merged into one blob and the track was shifted.
    ShiftedOverMerged,
    /// The frame had an unusable number of blobs and was skipped.
    Anomaly { blob_count: usize },
}

#[derive(Debug, Clone)]
pub struct Chunk {
    start_index: usize,
    end_index: usize,
    tracks: Vec<Track>,
    /// Whether the gap before this chunk has been examined.
    pub(crate) gap_known: bool,
    pub(crate) prev: Option<ChunkId>,
    pub(crate) next: Option<ChunkId>,
}

impl Chunk {
    /// Starts a chunk at frame `index` from that frame's blobs.
    ///
    /// `prior` is the last known position of the target from earlier chunks,
    /// used to pick among several blobs. With no prior and two blobs the larger
    /// one is taken. More than two blobs are an anomaly: the blob nearest the
    /// prior (or the largest) seeds the chunk.
    pub fn open(index: usize, blobs: &[Blob], prior: Option<&Blob>) -> Result<Self> {
        let first = match (blobs, prior) {
            ([], _) => return Err(VisionError::EmptyFrame { index }),
            ([only], None) => *only,
            ([only], Some(last)) => follow_single(last, only).0,
            ([a, b], None) => *larger(a, b),
            ([a, b], Some(last)) => select_from_pair(last, a, b),
            (many @ [first, ..], prior) => {
                warn!(index, blob_count = many.len(), "too many blobs to open a chunk cleanly");
                match prior {
                    Some(last) => *nearest(last, first, many),
                    None => *largest(first, many),
                }
            }
        };

        debug!(index, blob = %first, "opened chunk");
        Ok(Self {
            start_index: index,
            end_index: index,
            tracks: vec![Track { index, blob: first }],
            gap_known: false,
            prev: None,
            next: None,
        })
    }

    /// Extends the track with the blobs of frame `index`. A skipped frame
    /// leaves both the tracks and `end_index` untouched.
    pub fn update(&mut self, index: usize, blobs: &[Blob]) -> TrackUpdate {
        let last = *self.end_pos();

        let (blob, outcome) = match blobs {
            [only] => follow_single(&last, only),
            [a, b] => (select_from_pair(&last, a, b), TrackUpdate::Moved),
            _ => {
                warn!(index, blob_count = blobs.len(), "unexpected blob count, frame skipped");
                return TrackUpdate::Anomaly {
                    blob_count: blobs.len(),
                };
            }
        };

        debug!(index, blob = %blob, ?outcome, "track updated");
        self.end_index = self.end_index.max(index);
        self.tracks.push(Track { index, blob });
        outcome
    }

    /// Ends the chunk at frame `end_index`.
    pub fn close(&mut self, end_index: usize) {
        self.end_index = end_index.max(self.start_index);
    }

    pub(crate) fn absorb(&mut self, other: Chunk) {
        self.tracks.extend(other.tracks);
        self.end_index = self.end_index.max(other.end_index);
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn end_index(&self) -> usize {
        self.end_index
    }

    pub fn frame_count(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn gap_known(&self) -> bool {
        self.gap_known
    }

    pub fn prev(&self) -> Option<ChunkId> {
        self.prev
    }

    pub fn next(&self) -> Option<ChunkId> {
        self.next
    }

    /// Position of the target when the chunk began.
    pub fn start_pos(&self) -> &Blob {
        &self.tracks[0].blob
    }

    /// Last recorded position of the target.
    pub fn end_pos(&self) -> &Blob {
        &self.tracks[self.tracks.len() - 1].blob
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "frames {}..={}", self.start_index, self.end_index)?;
        writeln!(f, "start pos {}", self.start_pos())?;
        write!(f, "end pos {}", self.end_pos())
    }
}

/// One blob in the frame: either the target moved, turned in place, or its
/// old and new positions merged.
fn follow_single(last: &Blob, blob: &Blob) -> (Blob, TrackUpdate) {
    if blob.approx_eq(last) {
        (*blob, TrackUpdate::Rotated)
    } else if blob.intersects(last) > 0 {
        let mut shifted = *last;
        shifted.shift_over_merged(blob);
        (shifted, TrackUpdate::ShiftedOverMerged)
    } else {
        (*blob, TrackUpdate::Moved)
    }
}

/// Two blobs in the frame. The one away from the last position is where the
/// target went. If both overlap it, the smaller overlap wins; if neither does,
/// the nearer one.
pub(crate) fn select_from_pair(last: &Blob, a: &Blob, b: &Blob) -> Blob {
    let overlap_a = a.intersects(last);
    let overlap_b = b.intersects(last);
    match (overlap_a > 0, overlap_b > 0) {
        (false, true) => *a,
        (true, false) => *b,
        (true, true) if overlap_a <= overlap_b => *a,
        (true, true) => *b,
        (false, false) => {
            if a.center_distance(last) <= b.center_distance(last) {
                *a
            } else {
                *b
            }
        }
    }
}

fn larger<'a>(a: &'a Blob, b: &'a Blob) -> &'a Blob {
    let key = |blob: &Blob| (blob.volume(), blob.bounding_box_area());
    if key(b) > key(a) { b } else { a }
}

fn largest<'a>(first: &'a Blob, blobs: &'a [Blob]) -> &'a Blob {
    blobs.iter().fold(first, |best, blob| larger(best, blob))
}

fn nearest<'a>(last: &Blob, first: &'a Blob, blobs: &'a [Blob]) -> &'a Blob {
    blobs.iter().fold(first, |best, blob| {
        if blob.center_distance(last) < best.center_distance(last) {
            blob
        } else {
            best
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::blob::boxed;

    #[test]
    fn open_without_blobs_fails() {
        let err = Chunk::open(3, &[], None).unwrap_err();
        assert!(matches!(err, VisionError::EmptyFrame { index: 3 }));
    }

    #[test]
    fn open_with_one_blob_uses_it() {
        let blob = boxed(10, 20, 10, 20);
        let chunk = Chunk::open(4, &[blob], None).unwrap();
        assert_eq!(chunk.start_index(), 4);
        assert_eq!(chunk.end_index(), 4);
        assert_eq!(*chunk.start_pos(), blob);
        assert_eq!(chunk.start_pos(), chunk.end_pos());
    }

    #[test]
    fn open_with_two_blobs_prefers_the_larger() {
        let small = boxed(0, 5, 0, 5);
        let big = boxed(50, 70, 50, 70);
        let chunk = Chunk::open(1, &[small, big], None).unwrap();
        assert_eq!(*chunk.start_pos(), big);
    }

    #[test]
    fn open_with_two_blobs_and_prior_leaves_the_prior() {
        let prior = boxed(10, 20, 10, 20);
        let vacated = boxed(10, 20, 10, 20);
        let arrived = boxed(60, 70, 60, 70);
        let chunk = Chunk::open(9, &[vacated, arrived], Some(&prior)).unwrap();
        assert_eq!(*chunk.start_pos(), arrived);
    }

    #[test]
    fn open_with_many_blobs_picks_nearest_to_prior() {
        let prior = boxed(80, 90, 80, 90);
        let blobs = [boxed(0, 5, 0, 5), boxed(40, 45, 40, 45), boxed(75, 85, 75, 85)];
        let chunk = Chunk::open(2, &blobs, Some(&prior)).unwrap();
        assert_eq!(*chunk.start_pos(), blobs[2]);
    }

    #[test]
    fn open_with_many_blobs_and_no_prior_picks_largest() {
        let blobs = [boxed(0, 5, 0, 5), boxed(40, 60, 40, 60), boxed(75, 85, 75, 85)];
        let chunk = Chunk::open(2, &blobs, None).unwrap();
        assert_eq!(*chunk.start_pos(), blobs[1]);
    }

    #[test]
    fn approx_equal_blob_counts_as_rotation() {
        let mut chunk = Chunk::open(0, &[boxed(10, 30, 10, 30)], None).unwrap();
        let outcome = chunk.update(1, &[boxed(11, 31, 10, 30)]);
        assert_eq!(outcome, TrackUpdate::Rotated);
        assert_eq!(*chunk.end_pos(), boxed(11, 31, 10, 30));
    }

    #[test]
    fn disjoint_blob_counts_as_move() {
        let mut chunk = Chunk::open(0, &[boxed(10, 20, 10, 20)], None).unwrap();
        let outcome = chunk.update(1, &[boxed(50, 60, 50, 60)]);
        assert_eq!(outcome, TrackUpdate::Moved);
        assert_eq!(chunk.end_pos().left(), 50);
    }

    #[test]
    fn overlapping_blob_shifts_over_merged() {
        let mut chunk = Chunk::open(0, &[boxed(0, 10, 0, 10)], None).unwrap();
        let outcome = chunk.update(1, &[boxed(0, 30, 0, 10)]);
        assert_eq!(outcome, TrackUpdate::ShiftedOverMerged);
        assert_eq!(*chunk.end_pos(), boxed(20, 30, 0, 10));
    }

    #[test]
    fn pair_picks_blob_away_from_last_position() {
        let last = boxed(10, 20, 10, 20);
        let stale = boxed(12, 22, 12, 22);
        let fresh = boxed(60, 70, 60, 70);
        assert_eq!(select_from_pair(&last, &stale, &fresh), fresh);
        assert_eq!(select_from_pair(&last, &fresh, &stale), fresh);
    }

    #[test]
    fn pair_with_two_overlaps_takes_smaller_overlap() {
        let last = boxed(10, 30, 10, 30);
        let mostly = boxed(12, 32, 12, 32);
        let barely = boxed(28, 48, 28, 48);
        assert_eq!(select_from_pair(&last, &mostly, &barely), barely);
    }

    #[test]
    fn pair_with_no_overlap_takes_nearest() {
        let last = boxed(10, 20, 10, 20);
        let near = boxed(25, 30, 10, 20);
        let far = boxed(80, 90, 80, 90);
        assert_eq!(select_from_pair(&last, &far, &near), near);
    }

    #[test]
    fn anomalous_frames_are_skipped() {
        let mut chunk = Chunk::open(0, &[boxed(10, 20, 10, 20)], None).unwrap();
        let outcome = chunk.update(1, &[boxed(0, 1, 0, 1), boxed(5, 6, 5, 6), boxed(9, 9, 9, 9)]);
        assert_eq!(outcome, TrackUpdate::Anomaly { blob_count: 3 });
        assert_eq!(chunk.tracks().len(), 1);
        assert_eq!(chunk.end_index(), 1);
    }

    #[test]
    fn blob_count_sequence_yields_expected_tracks() {
        let frames: Vec<Vec<Blob>> = vec![
            vec![boxed(10, 20, 10, 20)],
            vec![boxed(40, 50, 10, 20)],
            vec![boxed(40, 50, 10, 20), boxed(70, 80, 10, 20)],
            vec![boxed(70, 80, 40, 50)],
            vec![],
        ];
        let mut chunk = Chunk::open(0, &frames[0], None).unwrap();
        let updates: Vec<_> = frames
            .iter()
            .enumerate()
            .skip(1)
            .map(|(index, blobs)| chunk.update(index, blobs))
            .collect();

        let anomalies: Vec<_> = updates
            .iter()
            .filter(|u| matches!(u, TrackUpdate::Anomaly { .. }))
            .collect();
        assert_eq!(anomalies, vec![&TrackUpdate::Anomaly { blob_count: 0 }]);
        assert_eq!(updates[3], TrackUpdate::Anomaly { blob_count: 0 });
        assert_eq!(chunk.end_index(), 3);
        chunk.close(3);

        let indices: Vec<_> = chunk.tracks().iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(chunk.start_index(), 0);
        assert_eq!(chunk.end_index(), 3);
        assert_eq!(chunk.end_pos().top(), 40);
    }

    #[test]
    fn close_never_precedes_start() {
        let mut chunk = Chunk::open(5, &[boxed(1, 2, 1, 2)], None).unwrap();
        chunk.close(4);
        assert_eq!(chunk.end_index(), 5);
        assert_eq!(chunk.frame_count(), 1);
    }
}
