//! Online estimators fed once per replication (or window).
//!
//! Means and co-moments are updated with Welford's recurrences. Ratio
//! estimators keep numerator and denominator moments apart and divide only
//! when queried; their variance comes from the delta method.

use crate::{
    error::{StatError, StatResult},
    matrix::Matrix,
};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// `x / y`, with `zero_over_zero` standing in for `0 / 0`.
pub fn ratio(x: f64, y: f64, zero_over_zero: f64) -> f64 {
    if x == 0.0 && y == 0.0 {
        zero_over_zero
    } else {
        x / y
    }
}

/// Two-sided Student-t critical value for `n` observations at `level`.
fn t_critical(n: u64, level: f64) -> Option<f64> {
    if n < 2 || !(level > 0.0 && level < 1.0) {
        return None;
    }
    let dist = StudentsT::new(0.0, 1.0, (n - 1) as f64).ok()?;
    let alpha = 1.0 - level;
    let t = dist.inverse_cdf(1.0 - alpha / 2.0);
    t.is_finite().then_some(t)
}

fn interval(center: f64, variance: f64, n: u64, level: f64) -> (f64, f64) {
    match t_critical(n, level) {
        Some(t) if variance.is_finite() => {
            let half = t * (variance / n as f64).sqrt();
            (center - half, center + half)
        }
        _ => (f64::NAN, f64::NAN),
    }
}

// ── Scalar tallies ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Tally {
    n: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for Tally {
    fn default() -> Self {
        Self::new()
    }
}

impl Tally {
    pub fn new() -> Self {
        Self {
            n: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn init(&mut self) {
        *self = Self::new();
    }

    pub fn add(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }

    pub fn num_observations(&self) -> u64 {
        self.n
    }

    pub fn average(&self) -> f64 {
        if self.n == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// Sample variance (n - 1 denominator).
    pub fn variance(&self) -> f64 {
        if self.n < 2 {
            f64::NAN
        } else {
            self.m2 / (self.n - 1) as f64
        }
    }

    pub fn variance_of_average(&self) -> f64 {
        self.variance() / self.n as f64
    }

    pub fn min(&self) -> f64 {
        if self.n == 0 {
            f64::NAN
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.n == 0 {
            f64::NAN
        } else {
            self.max
        }
    }

    pub fn confidence_interval(&self, level: f64) -> (f64, f64) {
        interval(self.average(), self.variance(), self.n, level)
    }
}

/// Estimator of `E[X] / E[Y]`.
#[derive(Debug, Clone)]
pub struct RatioTally {
    n: u64,
    mean_x: f64,
    mean_y: f64,
    m2_x: f64,
    m2_y: f64,
    c_xy: f64,
    min: f64,
    max: f64,
    zero_over_zero: f64,
}

impl RatioTally {
    pub fn new(zero_over_zero: f64) -> Self {
        Self {
            n: 0,
            mean_x: 0.0,
            mean_y: 0.0,
            m2_x: 0.0,
            m2_y: 0.0,
            c_xy: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            zero_over_zero,
        }
    }

    pub fn init(&mut self) {
        *self = Self::new(self.zero_over_zero);
    }

    pub fn add(&mut self, x: f64, y: f64) {
        self.n += 1;
        let n = self.n as f64;
        let dx = x - self.mean_x;
        let dy = y - self.mean_y;
        self.mean_x += dx / n;
        self.mean_y += dy / n;
        self.m2_x += dx * (x - self.mean_x);
        self.m2_y += dy * (y - self.mean_y);
        self.c_xy += dx * (y - self.mean_y);
        let r = ratio(x, y, self.zero_over_zero);
        self.min = self.min.min(r);
        self.max = self.max.max(r);
    }

    pub fn num_observations(&self) -> u64 {
        self.n
    }

    pub fn mean_numerator(&self) -> f64 {
        if self.n == 0 { f64::NAN } else { self.mean_x }
    }

    pub fn mean_denominator(&self) -> f64 {
        if self.n == 0 { f64::NAN } else { self.mean_y }
    }

    pub fn zero_over_zero(&self) -> f64 {
        self.zero_over_zero
    }

    pub fn average(&self) -> f64 {
        if self.n == 0 {
            return f64::NAN;
        }
        ratio(self.mean_x, self.mean_y, self.zero_over_zero)
    }

    /// Delta-method variance of one observation of the ratio:
    /// `(s_x^2 - 2 r s_xy + r^2 s_y^2) / mean_y^2`.
    pub fn variance(&self) -> f64 {
        if self.n < 2 {
            return f64::NAN;
        }
        let d = (self.n - 1) as f64;
        let (sxx, syy, sxy) = (self.m2_x / d, self.m2_y / d, self.c_xy / d);
        if self.mean_y == 0.0 {
            // Constant zero denominators: only degenerate data has a variance.
            return if sxx == 0.0 && syy == 0.0 { 0.0 } else { f64::NAN };
        }
        let r = self.mean_x / self.mean_y;
        ((sxx - 2.0 * r * sxy + r * r * syy) / (self.mean_y * self.mean_y)).max(0.0)
    }

    pub fn variance_of_average(&self) -> f64 {
        self.variance() / self.n as f64
    }

    /// Smallest per-observation ratio.
    pub fn min(&self) -> f64 {
        if self.n == 0 { f64::NAN } else { self.min }
    }

    pub fn max(&self) -> f64 {
        if self.n == 0 { f64::NAN } else { self.max }
    }

    pub fn confidence_interval(&self, level: f64) -> (f64, f64) {
        interval(self.average(), self.variance(), self.n, level)
    }
}

/// Running means and cross co-moments of a vector observation.
#[derive(Debug, Clone)]
pub struct CoMoments {
    n: u64,
    means: Vec<f64>,
    /// Row-major `dim x dim` sums of cross deviations.
    c: Vec<f64>,
}

impl CoMoments {
    pub fn new(dim: usize) -> Self {
        Self {
            n: 0,
            means: vec![0.0; dim],
            c: vec![0.0; dim * dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.means.len()
    }

    pub fn num_observations(&self) -> u64 {
        self.n
    }

    pub fn add(&mut self, x: &[f64]) -> StatResult<()> {
        let dim = self.dim();
        if x.len() != dim {
            return Err(StatError::DimensionMismatch {
                context: "CoMoments::add",
                expected_rows: dim,
                expected_cols: 1,
                rows: x.len(),
                cols: 1,
            });
        }
        self.n += 1;
        let n = self.n as f64;
        let deltas: Vec<f64> = x.iter().zip(&self.means).map(|(v, m)| v - m).collect();
        for (m, d) in self.means.iter_mut().zip(&deltas) {
            *m += d / n;
        }
        for i in 0..dim {
            for j in 0..dim {
                self.c[i * dim + j] += deltas[i] * (x[j] - self.means[j]);
            }
        }
        Ok(())
    }

    pub fn mean(&self, i: usize) -> f64 {
        self.means[i]
    }

    pub fn covariance(&self, i: usize, j: usize) -> f64 {
        if self.n < 2 {
            f64::NAN
        } else {
            self.c[i * self.dim() + j] / (self.n - 1) as f64
        }
    }
}

// ── Matrices of tallies ────────────────────────────────────────────

fn check_dims(context: &'static str, rows: usize, cols: usize, m: &Matrix) -> StatResult<()> {
    if m.rows() == rows && m.cols() == cols {
        Ok(())
    } else {
        Err(StatError::DimensionMismatch {
            context,
            expected_rows: rows,
            expected_cols: cols,
            rows: m.rows(),
            cols: m.cols(),
        })
    }
}

/// One `Tally` per cell.
#[derive(Debug, Clone)]
pub struct TallyMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<Tally>,
}

impl TallyMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Tally::new(); rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn init(&mut self) {
        self.cells.iter_mut().for_each(Tally::init);
    }

    pub fn cell(&self, row: usize, col: usize) -> &Tally {
        &self.cells[row * self.cols + col]
    }

    /// One observation for every cell.
    pub fn add(&mut self, obs: &Matrix) -> StatResult<()> {
        check_dims("TallyMatrix::add", self.rows, self.cols, obs)?;
        for (cell, &x) in self.cells.iter_mut().zip(obs.values()) {
            cell.add(x);
        }
        Ok(())
    }

    /// One observation for the cells of column `col` only.
    pub fn add_column(&mut self, col: usize, obs: &Matrix) -> StatResult<()> {
        check_dims("TallyMatrix::add_column", self.rows, self.cols, obs)?;
        for r in 0..self.rows {
            self.cells[r * self.cols + col].add(obs.get(r, col));
        }
        Ok(())
    }

    pub fn num_observations(&self) -> u64 {
        self.cells.iter().map(Tally::num_observations).max().unwrap_or(0)
    }

    fn map(&self, f: impl Fn(&Tally) -> f64) -> Matrix {
        Matrix::from_fn(self.rows, self.cols, |r, c| f(self.cell(r, c)))
    }

    pub fn average(&self) -> Matrix {
        self.map(Tally::average)
    }

    pub fn variance(&self) -> Matrix {
        self.map(Tally::variance)
    }

    pub fn variance_of_average(&self) -> Matrix {
        self.map(Tally::variance_of_average)
    }

    pub fn min(&self) -> Matrix {
        self.map(Tally::min)
    }

    pub fn max(&self) -> Matrix {
        self.map(Tally::max)
    }

    pub fn confidence_interval(&self, level: f64) -> (Matrix, Matrix) {
        let bounds: Vec<(f64, f64)> = self.cells.iter().map(|t| t.confidence_interval(level)).collect();
        (
            Matrix::from_fn(self.rows, self.cols, |r, c| bounds[r * self.cols + c].0),
            Matrix::from_fn(self.rows, self.cols, |r, c| bounds[r * self.cols + c].1),
        )
    }
}

/// One `RatioTally` per cell.
#[derive(Debug, Clone)]
pub struct RatioTallyMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<RatioTally>,
}

impl RatioTallyMatrix {
    pub fn new(rows: usize, cols: usize, zero_over_zero: f64) -> Self {
        Self {
            rows,
            cols,
            cells: vec![RatioTally::new(zero_over_zero); rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn init(&mut self) {
        self.cells.iter_mut().for_each(RatioTally::init);
    }

    pub fn cell(&self, row: usize, col: usize) -> &RatioTally {
        &self.cells[row * self.cols + col]
    }

    pub fn add(&mut self, num: &Matrix, den: &Matrix) -> StatResult<()> {
        check_dims("RatioTallyMatrix::add", self.rows, self.cols, num)?;
        check_dims("RatioTallyMatrix::add", self.rows, self.cols, den)?;
        for ((cell, &x), &y) in self.cells.iter_mut().zip(num.values()).zip(den.values()) {
            cell.add(x, y);
        }
        Ok(())
    }

    pub fn add_column(&mut self, col: usize, num: &Matrix, den: &Matrix) -> StatResult<()> {
        check_dims("RatioTallyMatrix::add_column", self.rows, self.cols, num)?;
        check_dims("RatioTallyMatrix::add_column", self.rows, self.cols, den)?;
        for r in 0..self.rows {
            self.cells[r * self.cols + col].add(num.get(r, col), den.get(r, col));
        }
        Ok(())
    }

    pub fn num_observations(&self) -> u64 {
        self.cells.iter().map(RatioTally::num_observations).max().unwrap_or(0)
    }

    fn map(&self, f: impl Fn(&RatioTally) -> f64) -> Matrix {
        Matrix::from_fn(self.rows, self.cols, |r, c| f(self.cell(r, c)))
    }

    pub fn mean_numerator(&self) -> Matrix {
        self.map(RatioTally::mean_numerator)
    }

    pub fn mean_denominator(&self) -> Matrix {
        self.map(RatioTally::mean_denominator)
    }

    pub fn average(&self) -> Matrix {
        self.map(RatioTally::average)
    }

    pub fn variance(&self) -> Matrix {
        self.map(RatioTally::variance)
    }

    pub fn variance_of_average(&self) -> Matrix {
        self.map(RatioTally::variance_of_average)
    }

    pub fn min(&self) -> Matrix {
        self.map(RatioTally::min)
    }

    pub fn max(&self) -> Matrix {
        self.map(RatioTally::max)
    }

    pub fn confidence_interval(&self, level: f64) -> (Matrix, Matrix) {
        let bounds: Vec<(f64, f64)> = self.cells.iter().map(|t| t.confidence_interval(level)).collect();
        (
            Matrix::from_fn(self.rows, self.cols, |r, c| bounds[r * self.cols + c].0),
            Matrix::from_fn(self.rows, self.cols, |r, c| bounds[r * self.cols + c].1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_matches_two_pass() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut t = Tally::new();
        xs.iter().for_each(|&x| t.add(x));
        assert_eq!(t.average(), 5.0);
        assert!((t.variance() - 32.0 / 7.0).abs() < 1e-12);
        assert_eq!(t.min(), 2.0);
        assert_eq!(t.max(), 9.0);
    }

    #[test]
    fn interval_contains_mean_and_widens_with_level() {
        let mut t = Tally::new();
        for x in [1.0, 2.0, 3.0, 4.0, 5.0] {
            t.add(x);
        }
        let (lo90, hi90) = t.confidence_interval(0.90);
        let (lo99, hi99) = t.confidence_interval(0.99);
        assert!(lo90 < 3.0 && 3.0 < hi90);
        assert!(lo99 < lo90 && hi99 > hi90);
        // t(0.975, 4) = 2.776; s = sqrt(2.5), n = 5.
        let (lo95, _) = t.confidence_interval(0.95);
        assert!((3.0 - lo95 - 2.776 * (0.5f64).sqrt()).abs() < 1e-2);
    }

    #[test]
    fn single_observation_has_no_variance() {
        let mut t = Tally::new();
        t.add(1.0);
        assert!(t.variance().is_nan());
        assert!(t.confidence_interval(0.95).0.is_nan());
    }

    #[test]
    fn zero_over_zero_uses_fallback() {
        let mut r = RatioTally::new(1.0);
        r.add(0.0, 0.0);
        r.add(0.0, 0.0);
        assert_eq!(r.average(), 1.0);
        assert_eq!(r.min(), 1.0);
        assert_eq!(r.variance(), 0.0);
    }

    #[test]
    fn ratio_of_means_not_mean_of_ratios() {
        let mut r = RatioTally::new(0.0);
        r.add(1.0, 2.0);
        r.add(9.0, 10.0);
        assert!((r.average() - 10.0 / 12.0).abs() < 1e-12);
        assert_eq!(r.min(), 0.5);
        assert_eq!(r.max(), 0.9);
    }

    #[test]
    fn delta_method_is_exact_for_proportional_data() {
        // X = 0.5 Y exactly: the ratio never varies.
        let mut r = RatioTally::new(0.0);
        for y in [2.0, 4.0, 10.0, 6.0] {
            r.add(0.5 * y, y);
        }
        assert!(r.variance().abs() < 1e-12);
    }

    #[test]
    fn co_moments_match_scalar_tally() {
        let mut c = CoMoments::new(2);
        let mut t = Tally::new();
        for (a, b) in [(1.0, 2.0), (2.0, 4.5), (4.0, 7.0)] {
            c.add(&[a, b]).unwrap();
            t.add(a);
        }
        assert!((c.covariance(0, 0) - t.variance()).abs() < 1e-12);
        assert!((c.covariance(0, 1) - c.covariance(1, 0)).abs() < 1e-12);
        assert!(c.add(&[1.0]).is_err());
    }

    #[test]
    fn matrix_tally_checks_shape() {
        let mut m = TallyMatrix::new(2, 2);
        assert!(m.add(&Matrix::zeros(2, 3)).is_err());
        m.add(&Matrix::filled(2, 2, 1.0)).unwrap();
        m.add_column(1, &Matrix::filled(2, 2, 3.0)).unwrap();
        assert_eq!(m.cell(0, 0).num_observations(), 1);
        assert_eq!(m.average().row(0), &[1.0, 2.0]);
    }
}
