// THEORY:
// First pass of the two-pass connected-component labelling. Every pixel of the
// mask becomes a `Cell` in a flat arena; parent links are arena indices, so the
// disjoint-set forest never owns or borrows its nodes.
//
// Scanning row-major, each foreground cell either receives a fresh provisional
// label (no labelled neighbor yet) or adopts the smallest label among its
// labelled 8-neighbors and is unioned with every one of them. After the scan,
// two foreground cells belong to the same set exactly when they are connected
// through 8-adjacent foreground cells.
//
// `union` attaches the root reached by the shallower walk under the root
// reached by the deeper one. `find` does no path compression; the forest is
// read-only after the first pass, and the second pass (see `components.rs`)
// resolves every cell exactly once.

use crate::core_modules::mask::BinaryMask;

/// One pixel of the labelling arena.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    /// Raw mask value; 0 is background.
    pub intensity: u8,
    /// Provisional label from the first pass, later the resolved label.
    pub label: Option<u32>,
    /// Arena index of the parent cell; `None` for a root.
    pub parent: Option<usize>,
    /// Index of the owning component once the second pass resolved it.
    pub component: Option<usize>,
}

impl Cell {
    pub fn is_foreground(&self) -> bool {
        self.intensity > 0
    }
}

// Row/column offsets of the 8-neighborhood.
const NEIGHBORHOOD: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[derive(Debug, Clone)]
pub struct DisjointSetLabeller {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    next_label: u32,
}

impl DisjointSetLabeller {
    /// Builds the arena and runs the first pass over `mask`.
    pub fn label(mask: &BinaryMask) -> Self {
        let mut labeller = Self {
            width: mask.width() as usize,
            height: mask.height() as usize,
            cells: mask
                .pixels()
                .iter()
                .map(|&intensity| Cell {
                    intensity,
                    ..Cell::default()
                })
                .collect(),
            next_label: 0,
        };
        labeller.first_pass();
        labeller
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Number of provisional labels handed out during the first pass.
    pub fn provisional_labels(&self) -> u32 {
        self.next_label
    }

    pub fn index(&self, col: usize, row: usize) -> usize {
        row * self.width + col
    }

    /// Like `index`, but `None` for coordinates outside the grid.
    pub fn checked_index(&self, col: usize, row: usize) -> Option<usize> {
        (col < self.width && row < self.height).then(|| self.index(col, row))
    }

    fn first_pass(&mut self) {
        let mut neighbors = Vec::with_capacity(NEIGHBORHOOD.len());
        for row in 0..self.height {
            for col in 0..self.width {
                let idx = self.index(col, row);
                if !self.cells[idx].is_foreground() {
                    continue;
                }

                self.labelled_neighbors(col, row, &mut neighbors);
                let smallest = neighbors
                    .iter()
                    .copied()
                    .min_by_key(|&n| self.cells[n].label);

                match smallest {
                    None => {
                        self.cells[idx].label = Some(self.next_label);
                        self.next_label += 1;
                    }
                    Some(min) => {
                        self.cells[idx].label = self.cells[min].label;
                        for &n in &neighbors {
                            self.union(idx, n);
                        }
                    }
                }
            }
        }
    }

    /// Collects the in-bounds 8-neighbors of (`col`, `row`) that already carry
    /// a label. The full neighborhood is scanned; only cells visited earlier
    /// can be labelled at this point.
    fn labelled_neighbors(&self, col: usize, row: usize, out: &mut Vec<usize>) {
        out.clear();
        for (dr, dc) in NEIGHBORHOOD {
            let (Some(r), Some(c)) = (row.checked_add_signed(dr), col.checked_add_signed(dc))
            else {
                continue;
            };
            if r >= self.height || c >= self.width {
                continue;
            }
            let n = self.index(c, r);
            if self.cells[n].label.is_some() {
                out.push(n);
            }
        }
    }

    /// Root of the set containing cell `a`.
    pub fn find(&self, mut a: usize) -> usize {
        while let Some(parent) = self.cells[a].parent {
            a = parent;
        }
        a
    }

    /// Root of cell `a` together with the number of links walked to reach it.
    fn root_with_depth(&self, mut a: usize) -> (usize, usize) {
        let mut depth = 0;
        while let Some(parent) = self.cells[a].parent {
            a = parent;
            depth += 1;
        }
        (a, depth)
    }

    /// Joins the sets of cells `a` and `b`.
    pub fn union(&mut self, a: usize, b: usize) {
        let (root_a, depth_a) = self.root_with_depth(a);
        let (root_b, depth_b) = self.root_with_depth(b);
        if root_a == root_b {
            return;
        }
        if depth_a < depth_b {
            self.cells[root_a].parent = Some(root_b);
        } else {
            self.cells[root_b].parent = Some(root_a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeller(rows: &[&str]) -> DisjointSetLabeller {
        DisjointSetLabeller::label(&BinaryMask::from_ascii(rows))
    }

    #[test]
    fn background_cells_stay_unlabelled() {
        let l = labeller(&["...", "...", "..."]);
        assert!(l.cells().iter().all(|c| c.label.is_none() && c.parent.is_none()));
        assert_eq!(l.provisional_labels(), 0);
    }

    #[test]
    fn isolated_pixels_get_distinct_labels() {
        let l = labeller(&["#.#", "...", "#.#"]);
        let labels: Vec<_> = l.cells().iter().filter_map(|c| c.label).collect();
        assert_eq!(labels, vec![0, 1, 2, 3]);
    }

    #[test]
    fn diagonal_neighbors_share_a_root() {
        let l = labeller(&["#..", ".#.", "..#"]);
        let root = l.find(l.index(0, 0));
        assert_eq!(l.find(l.index(1, 1)), root);
        assert_eq!(l.find(l.index(2, 2)), root);
        assert_eq!(l.provisional_labels(), 1);
    }

    #[test]
    fn u_shape_merges_two_provisional_labels() {
        // The two arms get different labels in the first row and are joined
        // through the bottom row.
        let l = labeller(&["#.#", "#.#", "###"]);
        assert_eq!(l.provisional_labels(), 2);
        let left = l.find(l.index(0, 0));
        let right = l.find(l.index(2, 0));
        assert_eq!(left, right);
    }

    #[test]
    fn cell_adopts_smallest_neighbor_label() {
        let l = labeller(&["#.#", ".#."]);
        let center = &l.cells()[l.index(1, 1)];
        assert_eq!(center.label, Some(0));
    }

    #[test]
    fn union_attaches_shallower_root_under_deeper() {
        let mut l = labeller(&["#.#.#"]);
        let (a, b, c) = (l.index(0, 0), l.index(2, 0), l.index(4, 0));
        // Equal depths: b's root goes under a's root.
        l.union(a, b);
        assert_eq!(l.cells()[b].parent, Some(a));
        // c is a root at depth 0, b sits at depth 1: c goes under a.
        l.union(c, b);
        assert_eq!(l.cells()[c].parent, Some(a));
        assert_eq!(l.find(c), a);
    }

    #[test]
    fn union_of_same_set_is_a_no_op() {
        let mut l = labeller(&["##"]);
        let before: Vec<_> = l.cells().iter().map(|c| c.parent).collect();
        l.union(0, 1);
        let after: Vec<_> = l.cells().iter().map(|c| c.parent).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn separate_regions_have_separate_roots() {
        let l = labeller(&["##...", "##...", ".....", "...##"]);
        assert_ne!(l.find(l.index(0, 0)), l.find(l.index(4, 3)));
        assert_eq!(l.find(l.index(0, 0)), l.find(l.index(1, 1)));
    }
}
