//! Dense matrices and the per-measure accumulators.
//!
//! `Matrix` is the plain row-major value type handed between the manager,
//! the reshaping cache and the statistic builders. `MeasureMatrix` is the
//! accumulator mutated by event counters: every value added to it is
//! combined with one fixed operator for the matrix's whole lifetime.

use crate::error::{StatError, StatResult};
use serde::{Deserialize, Serialize};

/// How values are folded into an accumulator cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineOp {
    Sum,
    Max,
}

impl CombineOp {
    pub fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            CombineOp::Sum => a + b,
            CombineOp::Max => a.max(b),
        }
    }

    /// Identity element used to reset and to fold empty sets.
    pub fn identity(self) -> f64 {
        match self {
            CombineOp::Sum => 0.0,
            // Maxima of counts, sizes and waiting times are never negative.
            CombineOp::Max => 0.0,
        }
    }

    /// Fold an iterator of values with this operator.
    pub fn fold<I: IntoIterator<Item = f64>>(self, values: I) -> f64 {
        values
            .into_iter()
            .fold(self.identity(), |acc, v| self.combine(acc, v))
    }
}

/// Row-major dense matrix of `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    /// Build from row vectors; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> StatResult<Self> {
        let n = rows.len();
        let m = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n * m);
        for row in rows {
            if row.len() != m {
                return Err(StatError::DimensionMismatch {
                    context: "Matrix::from_rows",
                    expected_rows: n,
                    expected_cols: m,
                    rows: n,
                    cols: row.len(),
                });
            }
            data.extend(row);
        }
        Ok(Self { rows: n, cols: m, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, col)).collect()
    }

    /// Single-column matrix holding column `col`.
    pub fn column_matrix(&self, col: usize) -> Matrix {
        Matrix::from_fn(self.rows, 1, |r, _| self.get(r, col))
    }

    pub fn same_shape(&self, other: &Matrix) -> bool {
        self.rows == other.rows && self.cols == other.cols
    }

    fn check_shape(&self, other: &Matrix, context: &'static str) -> StatResult<()> {
        if self.same_shape(other) {
            Ok(())
        } else {
            Err(StatError::DimensionMismatch {
                context,
                expected_rows: self.rows,
                expected_cols: self.cols,
                rows: other.rows,
                cols: other.cols,
            })
        }
    }

    /// `self += sign * other`, element-wise.
    pub fn add_scaled(&mut self, other: &Matrix, sign: f64) -> StatResult<()> {
        self.check_shape(other, "Matrix::add_scaled")?;
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += sign * b;
        }
        Ok(())
    }

    /// Divide every value of column `col` by `divisor`.
    pub fn scale_column(&mut self, col: usize, divisor: f64) {
        for r in 0..self.rows {
            let v = self.get(r, col);
            self.set(r, col, v / divisor);
        }
    }

    /// Append rows at the bottom. Row width must match.
    pub fn append_rows(&mut self, extra: &Matrix) -> StatResult<()> {
        if extra.rows > 0 && extra.cols != self.cols {
            return Err(StatError::DimensionMismatch {
                context: "Matrix::append_rows",
                expected_rows: extra.rows,
                expected_cols: self.cols,
                rows: extra.rows,
                cols: extra.cols,
            });
        }
        self.data.extend_from_slice(&extra.data);
        self.rows += extra.rows;
        Ok(())
    }

    /// Matrix made of the selected rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(rows.len() * self.cols);
        for &r in rows {
            data.extend_from_slice(self.row(r));
        }
        Matrix {
            rows: rows.len(),
            cols: self.cols,
            data,
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }
}

/// Two-dimensional accumulator for one measure type.
///
/// In sliding mode the columns form a ring: logical column `cols - 1` is
/// always the newest window and `roll` discards logical column 0.
#[derive(Debug, Clone)]
pub struct MeasureMatrix {
    rows: usize,
    cols: usize,
    op: CombineOp,
    sliding: bool,
    offset: usize,
    data: Vec<f64>,
}

impl MeasureMatrix {
    pub fn new(rows: usize, cols: usize, op: CombineOp) -> Self {
        Self {
            rows,
            cols,
            op,
            sliding: false,
            offset: 0,
            data: vec![op.identity(); rows * cols],
        }
    }

    pub fn sliding(rows: usize, cols: usize, op: CombineOp) -> Self {
        Self {
            sliding: true,
            ..Self::new(rows, cols, op)
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn op(&self) -> CombineOp {
        self.op
    }

    pub fn is_sliding(&self) -> bool {
        self.sliding
    }

    fn physical(&self, col: usize) -> usize {
        if self.sliding {
            (self.offset + col) % self.cols
        } else {
            col
        }
    }

    /// Reset every cell to the operator's identity.
    pub fn init(&mut self) {
        let id = self.op.identity();
        self.data.iter_mut().for_each(|v| *v = id);
        self.offset = 0;
    }

    /// Fold `value` into `(row, col)`. Out-of-range cells are ignored.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        if row >= self.rows || col >= self.cols {
            log::warn!(
                "ignoring update at ({row}, {col}) outside {}x{} accumulator",
                self.rows,
                self.cols
            );
            return;
        }
        let idx = row * self.cols + self.physical(col);
        self.data[idx] = self.op.combine(self.data[idx], value);
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + self.physical(col)]
    }

    /// Overwrite a cell, bypassing the combine operator.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let idx = row * self.cols + self.physical(col);
        self.data[idx] = value;
    }

    /// Sliding mode only: drop the oldest column and open a fresh one.
    pub fn roll(&mut self) {
        if !self.sliding || self.cols == 0 {
            return;
        }
        let oldest = self.physical(0);
        let id = self.op.identity();
        for r in 0..self.rows {
            self.data[r * self.cols + oldest] = id;
        }
        self.offset = (self.offset + 1) % self.cols;
    }

    /// Snapshot in logical column order.
    pub fn to_matrix(&self) -> Matrix {
        Matrix::from_fn(self.rows, self.cols, |r, c| self.get(r, c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_accumulator_keeps_peak() {
        let mut m = MeasureMatrix::new(2, 3, CombineOp::Max);
        m.add(0, 1, 4.0);
        m.add(0, 1, 2.0);
        m.add(1, 2, 7.0);
        assert_eq!(m.get(0, 1), 4.0);
        assert_eq!(m.get(1, 2), 7.0);
        assert_eq!(m.get(1, 0), 0.0);
    }

    #[test]
    fn init_twice_leaves_identity() {
        let mut m = MeasureMatrix::new(2, 2, CombineOp::Sum);
        m.add(1, 1, 3.0);
        m.init();
        m.init();
        assert!(m.to_matrix().values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn sliding_roll_discards_oldest_column() {
        let mut m = MeasureMatrix::sliding(1, 3, CombineOp::Sum);
        m.add(0, 0, 1.0);
        m.add(0, 1, 2.0);
        m.add(0, 2, 3.0);
        m.roll();
        assert_eq!(m.to_matrix().row(0), &[2.0, 3.0, 0.0]);
        m.add(0, 2, 5.0);
        m.roll();
        assert_eq!(m.to_matrix().row(0), &[3.0, 5.0, 0.0]);
    }

    #[test]
    fn add_scaled_rejects_shape_mismatch() {
        let mut a = Matrix::zeros(2, 2);
        let b = Matrix::zeros(3, 2);
        assert!(a.add_scaled(&b, 1.0).is_err());
    }

    #[test]
    fn select_and_append_rows() {
        let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        let mut s = m.select_rows(&[2, 0]);
        assert_eq!(s.row(0), &[5.0, 6.0]);
        s.append_rows(&m.select_rows(&[1])).unwrap();
        assert_eq!(s.rows(), 3);
        assert_eq!(s.row(2), &[3.0, 4.0]);
    }
}
