//! Segments: named groupings of base indices that produce aggregate rows.
//!
//! For a universe of `n` base indices, the full row layout is
//! `[base 0..n) [user segments] [all]`, where the trailing "all" row exists
//! only when `n > 1` and aggregates every non-excluded base index.

use crate::matrix::{CombineOp, Matrix};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub members: Vec<usize>,
}

impl Segment {
    pub fn new(name: impl Into<String>, members: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.members.contains(&index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSet {
    base: usize,
    segments: Vec<Segment>,
    excluded: Vec<bool>,
}

impl SegmentSet {
    pub fn new(base: usize, segments: Vec<Segment>, excluded: &[usize]) -> Self {
        let mut mask = vec![false; base];
        for &e in excluded {
            if e < base {
                mask[e] = true;
            }
        }
        Self {
            base,
            segments,
            excluded: mask,
        }
    }

    /// A set with no user segments and nothing excluded.
    pub fn plain(base: usize) -> Self {
        Self::new(base, Vec::new(), &[])
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_all_row(&self) -> bool {
        self.base > 1
    }

    pub fn extra_rows(&self) -> usize {
        self.segments.len() + usize::from(self.has_all_row())
    }

    pub fn full_rows(&self) -> usize {
        self.base + self.extra_rows()
    }

    /// Index of the "all" row in the full layout, if there is one.
    pub fn all_row(&self) -> Option<usize> {
        self.has_all_row().then(|| self.full_rows() - 1)
    }

    /// Row standing for the whole universe: "all" when present, else the
    /// single base index.
    pub fn total_row(&self) -> usize {
        self.all_row().unwrap_or(0)
    }

    pub fn is_excluded(&self, index: usize) -> bool {
        self.excluded.get(index).copied().unwrap_or(false)
    }

    /// Full-layout rows an observation on `index` contributes to, besides
    /// `index` itself: the user segments containing it, then the "all" row.
    pub fn aggregate_rows_of(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let user = self
            .segments
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.contains(index))
            .map(move |(s, _)| self.base + s);
        let all = self
            .all_row()
            .filter(|_| !self.is_excluded(index));
        user.chain(all)
    }

    /// Base indices aggregated by extra row `extra` (0-based among extras).
    pub fn members_of_extra(&self, extra: usize) -> Vec<usize> {
        if extra < self.segments.len() {
            self.segments[extra]
                .members
                .iter()
                .copied()
                .filter(|&m| m < self.base)
                .collect()
        } else {
            (0..self.base).filter(|&i| !self.is_excluded(i)).collect()
        }
    }

    /// Display name of a row in the full layout.
    pub fn row_name(&self, row: usize, base_prefix: &str) -> String {
        if row < self.base {
            format!("{base_prefix}{row}")
        } else if row - self.base < self.segments.len() {
            self.segments[row - self.base].name.clone()
        } else {
            "all".to_string()
        }
    }

    /// Aggregate rows for a matrix holding `base` blocks of `block` rows.
    /// The result holds `extra_rows()` blocks, each the element-wise fold
    /// of its member blocks.
    pub fn aggregate_blocks(&self, base_matrix: &Matrix, block: usize, op: CombineOp) -> Matrix {
        let cols = base_matrix.cols();
        let extras = self.extra_rows();
        let mut out = Matrix::filled(extras * block, cols, op.identity());
        for e in 0..extras {
            for m in self.members_of_extra(e) {
                for b in 0..block {
                    let src = m * block + b;
                    let dst = e * block + b;
                    for c in 0..cols {
                        let v = op.combine(out.get(dst, c), base_matrix.get(src, c));
                        out.set(dst, c, v);
                    }
                }
            }
        }
        out
    }

    /// `base_matrix` with its aggregate rows appended.
    pub fn with_aggregates(&self, base_matrix: &Matrix, op: CombineOp) -> Matrix {
        self.with_aggregate_blocks(base_matrix, 1, op)
    }

    pub fn with_aggregate_blocks(&self, base_matrix: &Matrix, block: usize, op: CombineOp) -> Matrix {
        let mut out = base_matrix.clone();
        let extra = self.aggregate_blocks(base_matrix, block, op);
        // Widths agree by construction.
        let _ = out.append_rows(&extra);
        out
    }
}
