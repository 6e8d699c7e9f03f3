// THEORY:
// `Chunks` is the timeline: an ordered, doubly-linked sequence of chunks kept
// in an arena. Chunks are addressed by `ChunkId`, an index into the arena, so
// links in both directions are plain copies and no chunk owns another.
//
// Merging a chunk with its successor absorbs the successor's tracks and end
// index, unlinks it, and frees its slot. Slots are never reused, so an id
// that was merged away stays dead rather than aliasing a newer chunk.
//
// A single cursor supports manual traversal in either direction; it is moved
// onto the survivor when the chunk under it is merged away.

use crate::core_modules::chunk::Chunk;
use std::fmt;
use tracing::info;

/// Handle to a chunk stored in a `Chunks` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(usize);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunks {
    slots: Vec<Option<Chunk>>,
    head: Option<ChunkId>,
    tail: Option<ChunkId>,
    cursor: Option<ChunkId>,
    count: usize,
}

impl Chunks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live chunks.
    pub fn size(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn head(&self) -> Option<ChunkId> {
        self.head
    }

    pub fn tail(&self) -> Option<ChunkId> {
        self.tail
    }

    /// The newest chunk.
    pub fn back(&self) -> Option<&Chunk> {
        self.tail.and_then(|id| self.get(id))
    }

    /// Links `chunk` after the current tail and returns its id.
    pub fn append(&mut self, mut chunk: Chunk) -> ChunkId {
        let id = ChunkId(self.slots.len());
        chunk.prev = self.tail;
        chunk.next = None;
        chunk.gap_known = self.tail.is_none();

        match self.tail.and_then(|tail| self.slots[tail.0].as_mut()) {
            Some(tail) => tail.next = Some(id),
            None => self.head = Some(id),
        }

        self.slots.push(Some(chunk));
        self.tail = Some(id);
        self.count += 1;
        id
    }

    pub fn mark_gap_known(&mut self, id: ChunkId) {
        if let Some(chunk) = self.get_mut(id) {
            chunk.gap_known = true;
        }
    }

    /// Folds the successor of `id` into it. Returns `false`, leaving the
    /// timeline untouched, when `id` is dead or has no successor.
    pub fn merge_with_next(&mut self, id: ChunkId) -> bool {
        let Some(next_id) = self.get(id).and_then(Chunk::next) else {
            return false;
        };
        let Some(removed) = self.slots.get_mut(next_id.0).and_then(Option::take) else {
            return false;
        };

        let after = removed.next;
        let (start, end) = (removed.start_index(), removed.end_index());
        if let Some(survivor) = self.get_mut(id) {
            survivor.absorb(removed);
            survivor.next = after;
        }
        match after.and_then(|a| self.get_mut(a)) {
            Some(following) => following.prev = Some(id),
            None => self.tail = Some(id),
        }
        if self.cursor == Some(next_id) {
            self.cursor = Some(id);
        }
        self.count -= 1;

        info!(survivor = %id, merged = %next_id, start, end, "merged chunks");
        true
    }

    /// Merges every chunk that ends at or before frame `j` into the first
    /// chunk that starts at or after frame `i`. Returns how many chunks were
    /// absorbed.
    pub fn merge_range(&mut self, i: usize, j: usize) -> usize {
        let Some(first) = self
            .iter()
            .find(|(_, chunk)| chunk.start_index() >= i)
            .map(|(id, _)| id)
        else {
            return 0;
        };

        let mut merged = 0;
        while let Some(next_end) = self
            .get(first)
            .and_then(Chunk::next)
            .and_then(|n| self.get(n))
            .map(Chunk::end_index)
        {
            if next_end > j || !self.merge_with_next(first) {
                break;
            }
            merged += 1;
        }
        merged
    }

    /// Chunks in timeline order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            chunks: self,
            current: self.head,
        }
    }

    // --- Cursor ---

    /// Moves the cursor to the first chunk.
    pub fn start(&mut self) -> Option<&Chunk> {
        self.cursor = self.head;
        self.current()
    }

    /// Moves the cursor to the last chunk.
    pub fn end(&mut self) -> Option<&Chunk> {
        self.cursor = self.tail;
        self.current()
    }

    /// Advances the cursor; returns `None` and parks it past the end when
    /// there is no successor.
    pub fn next_chunk(&mut self) -> Option<&Chunk> {
        self.cursor = self.cursor.and_then(|id| self.get(id)).and_then(Chunk::next);
        self.current()
    }

    pub fn prev_chunk(&mut self) -> Option<&Chunk> {
        self.cursor = self.cursor.and_then(|id| self.get(id)).and_then(Chunk::prev);
        self.current()
    }

    pub fn cursor(&self) -> Option<ChunkId> {
        self.cursor
    }

    pub fn current(&self) -> Option<&Chunk> {
        self.cursor.and_then(|id| self.get(id))
    }
}

pub struct Iter<'a> {
    chunks: &'a Chunks,
    current: Option<ChunkId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (ChunkId, &'a Chunk);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        let chunk = self.chunks.get(id)?;
        self.current = chunk.next();
        Some((id, chunk))
    }
}
