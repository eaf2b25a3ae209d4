//! Statistic builders: reshaped measure matrices in, estimators out.
//!
//! RULES:
//!   - A performance measure whose counters were not created is reported
//!     as "not available", never as a configuration error.
//!   - Observations are taken only through the `MatrixCache`. Every pass
//!     starts by clearing it, so matrices from an earlier pass are never
//!     served.

use crate::{
    cache::MatrixCache,
    config::CallCenterConfig,
    error::{StatError, StatResult},
    manager::CallCenterMeasureManager,
    matrix::{CombineOp, Matrix},
    measure_type::{RowType, TimeNormalizeType},
    performance::{
        EstimationKind, Formula, PerformanceMeasure, PerformanceMeasureDef, PerformanceMeasureTable,
    },
    tally::{ratio, CoMoments, RatioTallyMatrix, TallyMatrix},
};
use std::collections::{BTreeMap, BTreeSet};

/// Query side shared by every statistics source.
pub trait CallCenterStatProbes {
    fn performance_measures(&self) -> Vec<PerformanceMeasure>;

    fn has_performance_measure(&self, pm: PerformanceMeasure) -> bool;

    fn num_observations(&self, pm: PerformanceMeasure) -> StatResult<u64>;

    fn average(&self, pm: PerformanceMeasure) -> StatResult<Matrix>;

    fn variance(&self, pm: PerformanceMeasure) -> StatResult<Matrix>;

    fn variance_of_average(&self, pm: PerformanceMeasure) -> StatResult<Matrix>;

    fn min(&self, pm: PerformanceMeasure) -> StatResult<Matrix>;

    fn max(&self, pm: PerformanceMeasure) -> StatResult<Matrix>;

    /// Lower and upper bounds, cell by cell, at confidence `level`.
    fn confidence_interval(&self, pm: PerformanceMeasure, level: f64) -> StatResult<(Matrix, Matrix)>;
}

fn not_available(pm: PerformanceMeasure) -> StatError {
    StatError::NotAvailable {
        measure: pm.name().to_string(),
    }
}

/// Fallback for 0/0, with the configuration's override if any.
pub fn zero_over_zero(def: &PerformanceMeasureDef, config: &CallCenterConfig) -> f64 {
    config
        .zero_over_zero
        .get(&def.measure)
        .copied()
        .unwrap_or(def.zero_over_zero)
}

/// Values of a signed formula with every term shaped as `row_type`.
pub fn evaluate(
    formula: Formula,
    row_type: RowType,
    manager: &CallCenterMeasureManager,
    cache: &mut MatrixCache,
) -> StatResult<Matrix> {
    let mut total: Option<Matrix> = None;
    for &(mt, sign) in formula {
        let m = cache.get_matrix(manager, mt, row_type)?;
        match &mut total {
            Some(acc) => acc.add_scaled(m, sign)?,
            None => {
                let mut acc = Matrix::zeros(m.rows(), m.cols());
                acc.add_scaled(m, sign)?;
                total = Some(acc);
            }
        }
    }
    total.ok_or_else(|| StatError::InvalidConfig("empty formula".into()))
}

/// One observation of `def`: numerator, and denominator for ratio kinds.
pub fn observe(
    def: &PerformanceMeasureDef,
    manager: &CallCenterMeasureManager,
    cache: &mut MatrixCache,
) -> StatResult<(Matrix, Option<Matrix>)> {
    let num = evaluate(def.numerator, def.row_type, manager, cache)?;
    if def.kind == EstimationKind::Expectation {
        return Ok((num, None));
    }
    let den = evaluate(def.denominator, def.row_type, manager, cache)?;
    Ok((num, Some(den)))
}

fn cell_ratios(num: &Matrix, den: &Matrix, zero_over_zero: f64) -> Matrix {
    Matrix::from_fn(num.rows(), num.cols(), |r, c| {
        ratio(num.get(r, c), den.get(r, c), zero_over_zero)
    })
}

/// Whether any term of `def` is divided by elapsed time.
fn is_time_normalized(def: &PerformanceMeasureDef, config: &CallCenterConfig) -> bool {
    def.measure_types().any(|mt| match mt.normalize() {
        TimeNormalizeType::Always => true,
        TimeNormalizeType::Conditional => config.normalize_to_default_unit,
        TimeNormalizeType::Never => false,
    })
}

// ── SimCallCenterStat ──────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Estimator {
    Mean(TallyMatrix),
    MeanOfRatio(TallyMatrix, f64),
    Ratio(RatioTallyMatrix),
}

impl Estimator {
    fn query(&self, mean: impl Fn(&TallyMatrix) -> Matrix, ratio: impl Fn(&RatioTallyMatrix) -> Matrix) -> Matrix {
        match self {
            Estimator::Mean(t) | Estimator::MeanOfRatio(t, _) => mean(t),
            Estimator::Ratio(r) => ratio(r),
        }
    }

    fn num_observations(&self) -> u64 {
        match self {
            Estimator::Mean(t) | Estimator::MeanOfRatio(t, _) => t.num_observations(),
            Estimator::Ratio(r) => r.num_observations(),
        }
    }

    fn init(&mut self) {
        match self {
            Estimator::Mean(t) | Estimator::MeanOfRatio(t, _) => t.init(),
            Estimator::Ratio(r) => r.init(),
        }
    }

    fn add(&mut self, col: Option<usize>, num: &Matrix, den: Option<&Matrix>) -> StatResult<()> {
        let missing = || StatError::InvalidConfig("ratio estimator without denominator".into());
        match (self, col) {
            (Estimator::Mean(t), None) => t.add(num),
            (Estimator::Mean(t), Some(c)) => t.add_column(c, num),
            (Estimator::MeanOfRatio(t, z), col) => {
                let r = cell_ratios(num, den.ok_or_else(missing)?, *z);
                match col {
                    None => t.add(&r),
                    Some(c) => t.add_column(c, &r),
                }
            }
            (Estimator::Ratio(r), None) => r.add(num, den.ok_or_else(missing)?),
            (Estimator::Ratio(r), Some(c)) => r.add_column(c, num, den.ok_or_else(missing)?),
        }
    }
}

/// Estimators over independent replications (or successive windows) of
/// one simulation, fed from its measure manager.
#[derive(Debug, Clone)]
pub struct SimCallCenterStat {
    table:       PerformanceMeasureTable,
    estimators:  BTreeMap<PerformanceMeasure, Estimator>,
    unavailable: BTreeSet<PerformanceMeasure>,
    num_columns: usize,
}

impl SimCallCenterStat {
    /// One estimator per requested measure whose counters exist; the rest
    /// are remembered as not available.
    pub fn new(
        manager: &CallCenterMeasureManager,
        table: &PerformanceMeasureTable,
        pms: &[PerformanceMeasure],
    ) -> Self {
        let cols = manager.num_stat_columns();
        let mut estimators = BTreeMap::new();
        let mut unavailable = BTreeSet::new();
        for &pm in pms {
            let def = table.get(pm);
            if !def.measure_types().all(|mt| manager.has_measure(mt)) {
                log::debug!("{pm}: counters missing, not available");
                unavailable.insert(pm);
                continue;
            }
            let rows = manager.layout().rows(def.row_type);
            let z = zero_over_zero(def, manager.config());
            let estimator = match def.kind {
                EstimationKind::Expectation => Estimator::Mean(TallyMatrix::new(rows, cols)),
                EstimationKind::ExpectationOfRatio => {
                    Estimator::MeanOfRatio(TallyMatrix::new(rows, cols), z)
                }
                EstimationKind::RatioOfExpectations => {
                    Estimator::Ratio(RatioTallyMatrix::new(rows, cols, z))
                }
            };
            estimators.insert(pm, estimator);
        }
        Self {
            table: table.clone(),
            estimators,
            unavailable,
            num_columns: cols,
        }
    }

    pub fn init(&mut self) {
        self.estimators.values_mut().for_each(Estimator::init);
    }

    pub fn is_not_available(&self, pm: PerformanceMeasure) -> bool {
        self.unavailable.contains(&pm)
    }

    /// One observation for every column.
    pub fn add_observations(
        &mut self,
        manager: &CallCenterMeasureManager,
        cache: &mut MatrixCache,
    ) -> StatResult<()> {
        self.add_observations_range(manager, cache, 0, self.num_columns)
    }

    /// One observation for columns `[start, end)`. The whole matrix is
    /// added at once when the range covers every column.
    pub fn add_observations_range(
        &mut self,
        manager: &CallCenterMeasureManager,
        cache: &mut MatrixCache,
        start: usize,
        end: usize,
    ) -> StatResult<()> {
        if start >= end || end > self.num_columns {
            return Err(StatError::InvalidConfig(format!(
                "observation range {start}..{end} outside 0..{}",
                self.num_columns
            )));
        }
        cache.clear();
        let whole = start == 0 && end == self.num_columns;
        for (&pm, estimator) in self.estimators.iter_mut() {
            let def = self.table.get(pm);
            let (num, den) = observe(def, manager, cache)?;
            if whole {
                estimator.add(None, &num, den.as_ref())?;
            } else {
                for col in start..end {
                    estimator.add(Some(col), &num, den.as_ref())?;
                }
            }
        }
        Ok(())
    }

    fn estimator(&self, pm: PerformanceMeasure) -> StatResult<&Estimator> {
        self.estimators.get(&pm).ok_or_else(|| not_available(pm))
    }

    /// Averages with the total column rebuilt from the per-period means:
    /// a duration-weighted mean for time-normalized measures, a plain sum
    /// otherwise. Maxima and expectations of ratios are left as observed.
    pub fn average_with_total(
        &self,
        manager: &CallCenterMeasureManager,
        pm: PerformanceMeasure,
    ) -> StatResult<Matrix> {
        let estimator = self.estimator(pm)?;
        let mut avg = self.average(pm)?;
        let strategy = manager.strategy();
        let Some(total) = strategy.total_column() else {
            return Ok(avg);
        };
        let main = strategy.main_columns();
        let def = self.table.get(pm);
        if def.measure_types().any(|mt| mt.op() == CombineOp::Max) {
            return Ok(avg);
        }
        let weights = is_time_normalized(def, manager.config())
            .then(|| manager.stat_column_durations());
        let combine = |m: &Matrix, row: usize| -> f64 {
            match &weights {
                Some(w) => {
                    let sum_w: f64 = w[..main].iter().sum();
                    (0..main).map(|c| w[c] * m.get(row, c)).sum::<f64>() / sum_w
                }
                None => (0..main).map(|c| m.get(row, c)).sum(),
            }
        };
        match estimator {
            Estimator::Mean(t) => {
                let means = t.average();
                for r in 0..avg.rows() {
                    avg.set(r, total, combine(&means, r));
                }
            }
            Estimator::Ratio(rt) => {
                let (num, den) = (rt.mean_numerator(), rt.mean_denominator());
                let z = zero_over_zero(def, manager.config());
                for r in 0..avg.rows() {
                    avg.set(r, total, ratio(combine(&num, r), combine(&den, r), z));
                }
            }
            Estimator::MeanOfRatio(..) => {}
        }
        Ok(avg)
    }
}

impl CallCenterStatProbes for SimCallCenterStat {
    fn performance_measures(&self) -> Vec<PerformanceMeasure> {
        self.estimators.keys().copied().collect()
    }

    fn has_performance_measure(&self, pm: PerformanceMeasure) -> bool {
        self.estimators.contains_key(&pm)
    }

    fn num_observations(&self, pm: PerformanceMeasure) -> StatResult<u64> {
        Ok(self.estimator(pm)?.num_observations())
    }

    fn average(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        Ok(self.estimator(pm)?.query(TallyMatrix::average, RatioTallyMatrix::average))
    }

    fn variance(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        Ok(self.estimator(pm)?.query(TallyMatrix::variance, RatioTallyMatrix::variance))
    }

    fn variance_of_average(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        Ok(self
            .estimator(pm)?
            .query(TallyMatrix::variance_of_average, RatioTallyMatrix::variance_of_average))
    }

    fn min(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        Ok(self.estimator(pm)?.query(TallyMatrix::min, RatioTallyMatrix::min))
    }

    fn max(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        Ok(self.estimator(pm)?.query(TallyMatrix::max, RatioTallyMatrix::max))
    }

    fn confidence_interval(&self, pm: PerformanceMeasure, level: f64) -> StatResult<(Matrix, Matrix)> {
        Ok(match self.estimator(pm)? {
            Estimator::Mean(t) | Estimator::MeanOfRatio(t, _) => t.confidence_interval(level),
            Estimator::Ratio(r) => r.confidence_interval(level),
        })
    }
}

// ── StatCallCenterStat ─────────────────────────────────────────────

/// Tallies over the averages reported by other sources, e.g. one source
/// per independent run or per batch.
#[derive(Debug, Clone, Default)]
pub struct StatCallCenterStat {
    pms: Vec<PerformanceMeasure>,
    tallies: BTreeMap<PerformanceMeasure, TallyMatrix>,
}

impl StatCallCenterStat {
    pub fn new(pms: &[PerformanceMeasure]) -> Self {
        Self {
            pms: pms.to_vec(),
            tallies: BTreeMap::new(),
        }
    }

    pub fn init(&mut self) {
        self.tallies.clear();
    }

    /// Add the current averages of `source` as one observation.
    pub fn add_source(&mut self, source: &dyn CallCenterStatProbes) -> StatResult<()> {
        for &pm in &self.pms {
            if !source.has_performance_measure(pm) {
                continue;
            }
            let avg = source.average(pm)?;
            self.tallies
                .entry(pm)
                .or_insert_with(|| TallyMatrix::new(avg.rows(), avg.cols()))
                .add(&avg)?;
        }
        Ok(())
    }

    fn tally(&self, pm: PerformanceMeasure) -> StatResult<&TallyMatrix> {
        self.tallies.get(&pm).ok_or_else(|| not_available(pm))
    }
}

impl CallCenterStatProbes for StatCallCenterStat {
    fn performance_measures(&self) -> Vec<PerformanceMeasure> {
        self.tallies.keys().copied().collect()
    }

    fn has_performance_measure(&self, pm: PerformanceMeasure) -> bool {
        self.tallies.contains_key(&pm)
    }

    fn num_observations(&self, pm: PerformanceMeasure) -> StatResult<u64> {
        Ok(self.tally(pm)?.num_observations())
    }

    fn average(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        Ok(self.tally(pm)?.average())
    }

    fn variance(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        Ok(self.tally(pm)?.variance())
    }

    fn variance_of_average(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        Ok(self.tally(pm)?.variance_of_average())
    }

    fn min(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        Ok(self.tally(pm)?.min())
    }

    fn max(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        Ok(self.tally(pm)?.max())
    }

    fn confidence_interval(&self, pm: PerformanceMeasure, level: f64) -> StatResult<(Matrix, Matrix)> {
        Ok(self.tally(pm)?.confidence_interval(level))
    }
}

// ── ChainCallCenterStat ────────────────────────────────────────────

/// Looks each measure up in its sources, in order.
pub struct ChainCallCenterStat<'a> {
    sources: Vec<&'a dyn CallCenterStatProbes>,
}

impl<'a> ChainCallCenterStat<'a> {
    pub fn new(sources: Vec<&'a dyn CallCenterStatProbes>) -> Self {
        Self { sources }
    }

    fn source(&self, pm: PerformanceMeasure) -> StatResult<&'a dyn CallCenterStatProbes> {
        self.sources
            .iter()
            .copied()
            .find(|s| s.has_performance_measure(pm))
            .ok_or_else(|| not_available(pm))
    }
}

impl CallCenterStatProbes for ChainCallCenterStat<'_> {
    fn performance_measures(&self) -> Vec<PerformanceMeasure> {
        let all: BTreeSet<PerformanceMeasure> = self
            .sources
            .iter()
            .flat_map(|s| s.performance_measures())
            .collect();
        all.into_iter().collect()
    }

    fn has_performance_measure(&self, pm: PerformanceMeasure) -> bool {
        self.sources.iter().any(|s| s.has_performance_measure(pm))
    }

    fn num_observations(&self, pm: PerformanceMeasure) -> StatResult<u64> {
        self.source(pm)?.num_observations(pm)
    }

    fn average(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        self.source(pm)?.average(pm)
    }

    fn variance(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        self.source(pm)?.variance(pm)
    }

    fn variance_of_average(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        self.source(pm)?.variance_of_average(pm)
    }

    fn min(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        self.source(pm)?.min(pm)
    }

    fn max(&self, pm: PerformanceMeasure) -> StatResult<Matrix> {
        self.source(pm)?.max(pm)
    }

    fn confidence_interval(&self, pm: PerformanceMeasure, level: f64) -> StatResult<(Matrix, Matrix)> {
        self.source(pm)?.confidence_interval(pm, level)
    }
}

// ── CovFMMCallCenterStat ───────────────────────────────────────────

/// Co-moments of (numerator, denominator) pairs of two measures, per cell.
/// Expectations use a constant denominator of 1.
const PAIR_DIM: usize = 4;

/// Cell-wise covariances between performance measures, each treated as a
/// function of multiple means and linearized with the delta method.
#[derive(Debug, Clone)]
pub struct CovFMMCallCenterStat {
    table: PerformanceMeasureTable,
    shapes: BTreeMap<PerformanceMeasure, (usize, usize)>,
    zero_over_zero: BTreeMap<PerformanceMeasure, f64>,
    pairs: BTreeMap<(PerformanceMeasure, PerformanceMeasure), Vec<CoMoments>>,
}

impl CovFMMCallCenterStat {
    pub fn new(
        manager: &CallCenterMeasureManager,
        table: &PerformanceMeasureTable,
        pms: &[PerformanceMeasure],
    ) -> Self {
        let cols = manager.num_stat_columns();
        let mut shapes = BTreeMap::new();
        let mut zz = BTreeMap::new();
        for &pm in pms {
            let def = table.get(pm);
            if def.measure_types().all(|mt| manager.has_measure(mt)) {
                shapes.insert(pm, (manager.layout().rows(def.row_type), cols));
                zz.insert(pm, zero_over_zero(def, manager.config()));
            }
        }
        let mut pairs = BTreeMap::new();
        for (&a, &sa) in &shapes {
            for (&b, &sb) in shapes.range(a..) {
                if sa == sb {
                    pairs.insert((a, b), vec![CoMoments::new(PAIR_DIM); sa.0 * sa.1]);
                }
            }
        }
        Self {
            table: table.clone(),
            shapes,
            zero_over_zero: zz,
            pairs,
        }
    }

    pub fn performance_measures(&self) -> Vec<PerformanceMeasure> {
        self.shapes.keys().copied().collect()
    }

    pub fn has_performance_measure(&self, pm: PerformanceMeasure) -> bool {
        self.shapes.contains_key(&pm)
    }

    pub fn add_observations(
        &mut self,
        manager: &CallCenterMeasureManager,
        cache: &mut MatrixCache,
    ) -> StatResult<()> {
        cache.clear();
        let mut obs: BTreeMap<PerformanceMeasure, (Matrix, Matrix)> = BTreeMap::new();
        for &pm in self.shapes.keys() {
            let def = self.table.get(pm);
            let (num, den) = observe(def, manager, cache)?;
            let ones = || Matrix::filled(num.rows(), num.cols(), 1.0);
            let pair = match (def.kind, den) {
                (EstimationKind::ExpectationOfRatio, Some(den)) => {
                    (cell_ratios(&num, &den, self.zero_over_zero[&pm]), ones())
                }
                (_, Some(den)) => (num, den),
                (_, None) => {
                    let d = ones();
                    (num, d)
                }
            };
            obs.insert(pm, pair);
        }
        for ((a, b), cells) in self.pairs.iter_mut() {
            let (na, da) = &obs[a];
            let (nb, db) = &obs[b];
            for (i, cell) in cells.iter_mut().enumerate() {
                cell.add(&[na.values()[i], da.values()[i], nb.values()[i], db.values()[i]])?;
            }
        }
        Ok(())
    }

    fn pair(&self, a: PerformanceMeasure, b: PerformanceMeasure) -> StatResult<(&[CoMoments], (usize, usize))> {
        for pm in [a, b] {
            if !self.has_performance_measure(pm) {
                return Err(not_available(pm));
            }
        }
        let key = if a <= b { (a, b) } else { (b, a) };
        match self.pairs.get(&key) {
            Some(cells) => Ok((cells.as_slice(), self.shapes[&a])),
            None => {
                let (sa, sb) = (self.shapes[&a], self.shapes[&b]);
                Err(StatError::DimensionMismatch {
                    context: "CovFMMCallCenterStat::covariance",
                    expected_rows: sa.0,
                    expected_cols: sa.1,
                    rows: sb.0,
                    cols: sb.1,
                })
            }
        }
    }

    /// Per-observation delta-method covariance of `a` and `b`, cell by cell.
    pub fn covariance(&self, a: PerformanceMeasure, b: PerformanceMeasure) -> StatResult<Matrix> {
        let (cells, (rows, cols)) = self.pair(a, b)?;
        let (ia, ib) = if a <= b { (0, 2) } else { (2, 0) };
        Ok(Matrix::from_fn(rows, cols, |r, c| {
            delta_covariance(&cells[r * cols + c], ia, ib)
        }))
    }

    pub fn correlation(&self, a: PerformanceMeasure, b: PerformanceMeasure) -> StatResult<Matrix> {
        let (cells, (rows, cols)) = self.pair(a, b)?;
        Ok(Matrix::from_fn(rows, cols, |r, c| {
            let cell = &cells[r * cols + c];
            let cov = delta_covariance(cell, 0, 2);
            let var_a = delta_covariance(cell, 0, 0);
            let var_b = delta_covariance(cell, 2, 2);
            cov / (var_a * var_b).sqrt()
        }))
    }

    pub fn num_observations(&self) -> u64 {
        self.pairs
            .values()
            .flat_map(|cells| cells.first())
            .map(CoMoments::num_observations)
            .max()
            .unwrap_or(0)
    }
}

/// Gradient of `mean(i) / mean(i + 1)` with respect to both means.
fn ratio_gradient(cell: &CoMoments, i: usize) -> Option<[f64; 2]> {
    let (x, y) = (cell.mean(i), cell.mean(i + 1));
    (y != 0.0).then(|| [1.0 / y, -x / (y * y)])
}

/// `grad_i' * Sigma * grad_j` for the ratios starting at components i and j.
fn delta_covariance(cell: &CoMoments, i: usize, j: usize) -> f64 {
    let sigma = |p: usize, q: usize| cell.covariance(p, q);
    match (ratio_gradient(cell, i), ratio_gradient(cell, j)) {
        (Some(gi), Some(gj)) => {
            let mut total = 0.0;
            for (p, gp) in gi.iter().enumerate() {
                for (q, gq) in gj.iter().enumerate() {
                    total += gp * gq * sigma(i + p, j + q);
                }
            }
            total
        }
        _ => {
            let flat = (0..2).all(|p| (0..2).all(|q| sigma(i + p, j + q) == 0.0));
            if flat { 0.0 } else { f64::NAN }
        }
    }
}
