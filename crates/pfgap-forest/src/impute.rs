//! Initial imputers and the proximity-weighted imputation loop.
//!
//! The loop fills every originally-missing slot with a simple estimate, then
//! alternates training a fresh forest, computing out-of-bag proximities and
//! re-estimating each slot from its proximity-weighted neighbours.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pfgap_distance::Dtw;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::ForestConfig;
use crate::dataset::Dataset;
use crate::error::ForestError;
use crate::forest::{ProximityForest, task_seed};
use crate::kernel::{KernelError, KernelRegistry};
use crate::proximity::{ProximityConfig, ProximityMatrix};
use crate::series::{Cell, MissingIndex, SeriesValue};

/// A non-adaptive strategy that fills every missing slot of a dataset.
///
/// Implementations read the slots to fill from [`Dataset::missing`] when set,
/// or detect them otherwise, and leave every other slot untouched.
pub trait InitialImputer: Send + Sync + fmt::Debug {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Fill the missing slots of `data` in place.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::Imputer`] when the strategy does not apply to
    /// the data.
    fn impute(&self, data: &mut Dataset) -> Result<(), ForestError>;
}

/// The built-in initial imputers.
///
/// Per-series strategies use the other values in the same row of the same
/// instance; `Global*` strategies use the same position across instances.
/// A slot with nothing to estimate from becomes 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InitialImputerKind {
    /// Row mean.
    #[default]
    Mean,
    /// Row median.
    Median,
    /// Most frequent value in the row; numeric or categorical.
    Mode,
    /// Linear interpolation between the nearest known neighbours in the row.
    Linear,
    /// Mean of the position across instances.
    GlobalMean,
    /// Median of the position across instances.
    GlobalMedian,
    /// Most frequent value of the position across instances.
    GlobalMode,
}

impl InitialImputerKind {
    /// Every built-in imputer.
    pub const ALL: [Self; 7] = [
        Self::Mean,
        Self::Median,
        Self::Mode,
        Self::Linear,
        Self::GlobalMean,
        Self::GlobalMedian,
        Self::GlobalMode,
    ];

    /// Canonical name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Mode => "mode",
            Self::Linear => "linear",
            Self::GlobalMean => "global-mean",
            Self::GlobalMedian => "global-median",
            Self::GlobalMode => "global-mode",
        }
    }

    fn accepts_categorical(self) -> bool {
        matches!(self, Self::Mode | Self::GlobalMode)
    }
}

impl FromStr for InitialImputerKind {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ForestError::UnknownImputer { name: s.to_owned() })
    }
}

impl fmt::Display for InitialImputerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InitialImputer for InitialImputerKind {
    fn name(&self) -> &str {
        self.as_str()
    }

    #[instrument(skip_all, fields(imputer = self.as_str(), n = data.len()))]
    fn impute(&self, data: &mut Dataset) -> Result<(), ForestError> {
        if !self.accepts_categorical() {
            if let Some(s) = data.series().iter().find(|s| !s.kind().is_numeric()) {
                return Err(ForestError::Imputer {
                    imputer: self.as_str().to_owned(),
                    reason: format!("cannot impute {} series", s.kind()),
                });
            }
        }
        let missing = missing_index(data);
        let fills = match self {
            Self::Mean | Self::Median | Self::Mode | Self::Linear => row_fills(*self, data.series(), &missing),
            Self::GlobalMean | Self::GlobalMedian | Self::GlobalMode => {
                column_fills(*self, data.series(), &missing)
            }
        };
        debug!(n_filled = fills.len(), "initial imputation complete");
        apply_fills(data.series_mut(), fills);
        Ok(())
    }
}

/// One estimate for a missing slot: instance, row, column and value.
type Fill = (usize, usize, usize, Cell);

fn missing_index(data: &Dataset) -> MissingIndex {
    data.missing()
        .cloned()
        .unwrap_or_else(|| MissingIndex::detect(data.series()))
}

/// Known value of a slot, or `None` when it is missing.
fn known_value(series: &SeriesValue, missing: &MissingIndex, n: usize, row: usize, col: usize) -> Option<Cell> {
    if missing.contains(n, row, col) {
        return None;
    }
    if series.kind().is_numeric() {
        series.numeric_at(row, col).map(Cell::Num)
    } else {
        series.cell_at(row, col).filter(|c| !c.is_missing()).cloned()
    }
}

fn apply_fills(series: &mut [SeriesValue], fills: Vec<Fill>) {
    for (n, row, col, cell) in fills {
        match cell {
            Cell::Num(v) => series[n].set_numeric(row, col, v),
            other => series[n].set_cell(row, col, other),
        }
    }
}

fn numbers(cells: &[Cell]) -> Vec<f64> {
    cells
        .iter()
        .filter_map(|c| match c {
            Cell::Num(v) => Some(*v),
            _ => None,
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Highest-weight value; the first one seen wins ties.
fn weighted_mode(weighted: impl IntoIterator<Item = (Cell, f64)>) -> Option<Cell> {
    let mut tally: Vec<(Cell, f64)> = Vec::new();
    for (cell, w) in weighted {
        match tally.iter_mut().find(|(c, _)| *c == cell) {
            Some((_, total)) => *total += w,
            None => tally.push((cell, w)),
        }
    }
    let mut best: Option<(Cell, f64)> = None;
    for (cell, w) in tally {
        if best.as_ref().is_none_or(|(_, b)| w > *b) {
            best = Some((cell, w));
        }
    }
    best.map(|(c, _)| c)
}

fn estimate(kind: InitialImputerKind, known: &[Cell]) -> Cell {
    match kind {
        InitialImputerKind::Mean | InitialImputerKind::GlobalMean => Cell::Num(mean(&numbers(known))),
        InitialImputerKind::Median | InitialImputerKind::GlobalMedian => Cell::Num(median(&numbers(known))),
        _ => weighted_mode(known.iter().cloned().map(|c| (c, 1.0))).unwrap_or(Cell::Num(0.0)),
    }
}

fn interpolate(row: &[Option<f64>]) -> Vec<f64> {
    let known: Vec<(usize, f64)> = row
        .iter()
        .enumerate()
        .filter_map(|(c, v)| v.map(|v| (c, v)))
        .collect();
    (0..row.len())
        .map(|c| {
            if let Some(v) = row[c] {
                return v;
            }
            let before = known.iter().rev().find(|&&(k, _)| k < c);
            let after = known.iter().find(|&&(k, _)| k > c);
            match (before, after) {
                (Some(&(k0, v0)), Some(&(k1, v1))) => v0 + (v1 - v0) * (c - k0) as f64 / (k1 - k0) as f64,
                (Some(&(_, v)), None) | (None, Some(&(_, v))) => v,
                (None, None) => 0.0,
            }
        })
        .collect()
}

fn row_fills(kind: InitialImputerKind, series: &[SeriesValue], missing: &MissingIndex) -> Vec<Fill> {
    let mut fills = Vec::new();
    for (n, s) in series.iter().enumerate() {
        let positions = missing.positions(n);
        if positions.is_empty() {
            continue;
        }
        for row in 0..s.n_rows() {
            let targets: Vec<usize> = positions.iter().filter(|&&(r, _)| r == row).map(|&(_, c)| c).collect();
            if targets.is_empty() {
                continue;
            }
            let values: Vec<Option<Cell>> = (0..s.row_len(row))
                .map(|col| known_value(s, missing, n, row, col))
                .collect();
            if kind == InitialImputerKind::Linear {
                let numeric: Vec<Option<f64>> = values
                    .iter()
                    .map(|v| match v {
                        Some(Cell::Num(x)) => Some(*x),
                        _ => None,
                    })
                    .collect();
                let filled = interpolate(&numeric);
                fills.extend(targets.iter().map(|&c| (n, row, c, Cell::Num(filled[c]))));
            } else {
                let known: Vec<Cell> = values.into_iter().flatten().collect();
                let value = estimate(kind, &known);
                fills.extend(targets.iter().map(|&c| (n, row, c, value.clone())));
            }
        }
    }
    fills
}

fn column_fills(kind: InitialImputerKind, series: &[SeriesValue], missing: &MissingIndex) -> Vec<Fill> {
    let mut fills = Vec::new();
    for n in 0..series.len() {
        for (row, col) in missing.positions(n) {
            let known: Vec<Cell> = series
                .iter()
                .enumerate()
                .filter_map(|(j, s)| known_value(s, missing, j, row, col))
                .collect();
            fills.push((n, row, col, estimate(kind, &known)));
        }
    }
    fills
}

/// Settings for [`ImputationLoop`].
///
/// # Defaults
///
/// | Parameter     | Default                     |
/// |---------------|-----------------------------|
/// | `initial`     | `mean`                      |
/// | `num_imputes` | 5                           |
/// | `dtw_aware`   | `false`                     |
/// | `forest`      | [`ForestConfig::default`]   |
/// | `proximity`   | [`ProximityConfig::default`]|
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ImputeConfig {
    initial: InitialImputerKind,
    num_imputes: usize,
    dtw_aware: bool,
    forest: ForestConfig,
    proximity: ProximityConfig,
}

impl Default for ImputeConfig {
    fn default() -> Self {
        Self {
            initial: InitialImputerKind::Mean,
            num_imputes: 5,
            dtw_aware: false,
            forest: ForestConfig::default(),
            proximity: ProximityConfig::default(),
        }
    }
}

impl ImputeConfig {
    /// Create a config running `num_imputes` rounds.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidImputeRounds`] when `num_imputes` is 0.
    pub fn new(num_imputes: usize) -> Result<Self, ForestError> {
        let config = Self {
            num_imputes,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    // --- Setters ---

    /// Set the built-in initial imputer.
    #[must_use]
    pub fn with_initial(mut self, initial: InitialImputerKind) -> Self {
        self.initial = initial;
        self
    }

    /// Follow DTW alignment paths to find corresponding neighbour positions.
    #[must_use]
    pub fn with_dtw_aware(mut self, dtw_aware: bool) -> Self {
        self.dtw_aware = dtw_aware;
        self
    }

    /// Set the forest trained in each round.
    #[must_use]
    pub fn with_forest(mut self, forest: ForestConfig) -> Self {
        self.forest = forest;
        self
    }

    /// Set the proximity layout and threshold.
    #[must_use]
    pub fn with_proximity(mut self, proximity: ProximityConfig) -> Self {
        self.proximity = proximity;
        self
    }

    // --- Getters ---

    /// Return the initial imputer.
    #[must_use]
    pub fn initial(&self) -> InitialImputerKind {
        self.initial
    }

    /// Return the number of rounds.
    #[must_use]
    pub fn num_imputes(&self) -> usize {
        self.num_imputes
    }

    /// Return whether re-imputation follows DTW paths.
    #[must_use]
    pub fn dtw_aware(&self) -> bool {
        self.dtw_aware
    }

    /// Return the per-round forest config.
    #[must_use]
    pub fn forest(&self) -> &ForestConfig {
        &self.forest
    }

    /// Return the proximity config.
    #[must_use]
    pub fn proximity(&self) -> &ProximityConfig {
        &self.proximity
    }

    /// Check the round count and the forest config.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidImputeRounds`] or any error of
    /// [`ForestConfig::validate`].
    pub fn validate(&self) -> Result<(), ForestError> {
        if self.num_imputes == 0 {
            return Err(ForestError::InvalidImputeRounds { rounds: 0 });
        }
        self.forest.validate()
    }
}

/// Summary of one imputation run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImputeReport {
    /// Number of originally-missing slots.
    pub n_missing: usize,
    /// Rounds of re-imputation run.
    pub rounds: usize,
    /// Largest absolute change of a numeric slot, per round.
    pub max_change: Vec<f64>,
    /// Slots that kept their previous estimate for lack of neighbours, per round.
    pub fallbacks: Vec<usize>,
    /// Wall-clock time of the whole run.
    pub elapsed: Duration,
}

impl ImputeReport {
    fn empty(elapsed: Duration) -> Self {
        Self {
            n_missing: 0,
            rounds: 0,
            max_change: Vec::new(),
            fallbacks: Vec::new(),
            elapsed,
        }
    }
}

/// Alternates forest training, proximities and weighted re-imputation.
#[derive(Debug, Clone)]
pub struct ImputationLoop {
    config: ImputeConfig,
    imputer: Arc<dyn InitialImputer>,
    registry: KernelRegistry,
}

impl ImputationLoop {
    /// Create a loop using the built-in kernels and the configured imputer.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`ImputeConfig::validate`].
    pub fn new(config: ImputeConfig) -> Result<Self, ForestError> {
        config.validate()?;
        Ok(Self {
            imputer: Arc::new(config.initial),
            config,
            registry: KernelRegistry::with_builtins(),
        })
    }

    /// Use a custom initial imputer instead of the configured built-in.
    #[must_use]
    pub fn with_imputer(mut self, imputer: Arc<dyn InitialImputer>) -> Self {
        self.imputer = imputer;
        self
    }

    /// Resolve distance names through `registry`.
    #[must_use]
    pub fn with_registry(mut self, registry: KernelRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Return the config.
    #[must_use]
    pub fn config(&self) -> &ImputeConfig {
        &self.config
    }

    /// Impute a labelled training set in place.
    ///
    /// Round `r` trains its forest with seed `task_seed(seed, r)`. A dataset
    /// with no missing slots is returned unchanged without training.
    ///
    /// # Errors
    ///
    /// Returns imputer errors, training errors, or [`ForestError::Kernel`]
    /// from DTW alignment.
    #[instrument(skip_all, fields(n = data.len(), rounds = self.config.num_imputes))]
    pub fn impute_train(&self, data: &mut Dataset) -> Result<ImputeReport, ForestError> {
        let start = Instant::now();
        let missing = missing_index(data);
        let n_missing = missing.count();
        if n_missing == 0 {
            info!("no missing values, nothing to impute");
            return Ok(ImputeReport::empty(start.elapsed()));
        }
        info!(n_missing, imputer = self.imputer.name(), "starting imputation");
        self.imputer.impute(data)?;

        let mut report = ImputeReport {
            n_missing,
            ..ImputeReport::empty(Duration::ZERO)
        };
        for round in 0..self.config.num_imputes {
            let round_start = Instant::now();
            let forest_config = self
                .config
                .forest
                .clone()
                .with_seed(task_seed(self.config.forest.seed(), round as u64));
            let forest = forest_config.fit_with_registry(data, &self.registry)?;
            let prox = forest.train_proximities(&self.config.proximity)?;
            let outcome = reimpute(
                data.series(),
                &missing,
                data.series(),
                &missing,
                &prox,
                true,
                self.config.dtw_aware,
                &self.config.proximity,
            )?;
            let stats = outcome.apply(data.series_mut());
            info!(
                round,
                max_change = stats.0,
                fallbacks = stats.1,
                elapsed_ms = round_start.elapsed().as_millis() as u64,
                "imputation round finished"
            );
            report.max_change.push(stats.0);
            report.fallbacks.push(stats.1);
            report.rounds += 1;
        }
        report.elapsed = start.elapsed();
        Ok(report)
    }

    /// Impute `test` in place from the training set of `forest`.
    ///
    /// `train` must be the (already imputed) data `forest` was trained on;
    /// neighbour values always come from it, never from other test instances.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::LengthMismatch`] when `train` does not match
    /// the forest, plus the errors of [`impute_train`][Self::impute_train].
    #[instrument(skip_all, fields(n_test = test.len(), n_train = train.len()))]
    pub fn impute_test(
        &self,
        test: &mut Dataset,
        forest: &ProximityForest,
        train: &Dataset,
    ) -> Result<ImputeReport, ForestError> {
        if train.len() != forest.n_train() {
            return Err(ForestError::LengthMismatch {
                what: "training set",
                expected: forest.n_train(),
                got: train.len(),
            });
        }
        let start = Instant::now();
        let missing = missing_index(test);
        let n_missing = missing.count();
        if n_missing == 0 {
            info!("no missing test values, nothing to impute");
            return Ok(ImputeReport::empty(start.elapsed()));
        }
        self.imputer.impute(test)?;
        let train_missing = missing_index(train);

        let mut report = ImputeReport {
            n_missing,
            ..ImputeReport::empty(Duration::ZERO)
        };
        for round in 0..self.config.num_imputes {
            let prox = forest.test_proximities(test, &self.config.proximity)?;
            let outcome = reimpute(
                test.series(),
                &missing,
                train.series(),
                &train_missing,
                &prox,
                false,
                self.config.dtw_aware,
                &self.config.proximity,
            )?;
            let stats = outcome.apply(test.series_mut());
            info!(round, max_change = stats.0, fallbacks = stats.1, "test imputation round finished");
            report.max_change.push(stats.0);
            report.fallbacks.push(stats.1);
            report.rounds += 1;
        }
        report.elapsed = start.elapsed();
        Ok(report)
    }
}

/// New estimates computed from a snapshot, applied together.
struct Reimputation {
    fills: Vec<Fill>,
    fallbacks: usize,
}

impl Reimputation {
    /// Write the estimates; returns the largest numeric change and the fallback count.
    fn apply(self, series: &mut [SeriesValue]) -> (f64, usize) {
        let max_change = self
            .fills
            .iter()
            .filter_map(|(n, r, c, cell)| match cell {
                Cell::Num(v) => series[*n].numeric_at(*r, *c).map(|old| (v - old).abs()).or(Some(0.0)),
                _ => None,
            })
            .fold(0.0, f64::max);
        apply_fills(series, self.fills);
        (max_change, self.fallbacks)
    }
}

/// Proximity-weighted estimates for every missing slot of `targets`.
///
/// Row `n` of `prox` weighs the instances of `sources`; neighbours at or
/// below `proximity.epsilon()` do not contribute. With `exclude_self` the
/// diagonal is skipped, as for training proximities.
#[allow(clippy::too_many_arguments)]
fn reimpute(
    targets: &[SeriesValue],
    target_missing: &MissingIndex,
    sources: &[SeriesValue],
    source_missing: &MissingIndex,
    prox: &ProximityMatrix,
    exclude_self: bool,
    dtw_aware: bool,
    proximity: &ProximityConfig,
) -> Result<Reimputation, ForestError> {
    let min_weight = proximity.epsilon();
    if dtw_aware && targets.iter().chain(sources).any(|s| !matches!(s, SeriesValue::Numeric(_))) {
        warn!("DTW-aware imputation needs 1-D numeric series, using same-position neighbours");
    }
    let one_instance = |n: usize| -> Result<(Vec<Fill>, usize), ForestError> {
        let positions = target_missing.positions(n);
        if positions.is_empty() {
            return Ok((Vec::new(), 0));
        }
        let neighbours: Vec<(usize, f64)> = prox
            .row(n)
            .into_iter()
            .filter(|&(j, w)| w > min_weight && !(exclude_self && j == n) && j < sources.len())
            .collect();
        let paths = if dtw_aware {
            alignments(&targets[n], &neighbours, sources)?
        } else {
            None
        };

        let mut fills = Vec::with_capacity(positions.len());
        let mut fallbacks = 0;
        for (row, col) in positions {
            let mut contributions: Vec<(Cell, f64)> = Vec::new();
            for (k, &(j, w)) in neighbours.iter().enumerate() {
                match &paths {
                    Some(paths) => contributions.extend(
                        paths[k]
                            .iter()
                            .filter(|&&(a, _)| a == col)
                            .filter_map(|&(_, b)| known_value(&sources[j], source_missing, j, 0, b))
                            .map(|cell| (cell, w)),
                    ),
                    None => {
                        if let Some(cell) = known_value(&sources[j], source_missing, j, row, col) {
                            contributions.push((cell, w));
                        }
                    }
                }
            }
            match combine(contributions) {
                Some(cell) => fills.push((n, row, col, cell)),
                None => {
                    trace!(instance = n, row, col, "no weighted neighbours, keeping previous estimate");
                    fallbacks += 1;
                }
            }
        }
        Ok((fills, fallbacks))
    };

    let per_instance: Vec<(Vec<Fill>, usize)> = if proximity.parallel() {
        (0..targets.len()).into_par_iter().map(one_instance).collect::<Result<_, _>>()?
    } else {
        (0..targets.len()).map(one_instance).collect::<Result<_, _>>()?
    };
    let mut out = Reimputation {
        fills: Vec::new(),
        fallbacks: 0,
    };
    for (fills, fallbacks) in per_instance {
        out.fills.extend(fills);
        out.fallbacks += fallbacks;
    }
    Ok(out)
}

/// Aligned index pairs from `target` to each neighbour, for 1-D numeric data.
fn alignments(
    target: &SeriesValue,
    neighbours: &[(usize, f64)],
    sources: &[SeriesValue],
) -> Result<Option<Vec<Vec<(usize, usize)>>>, ForestError> {
    let SeriesValue::Numeric(a) = target else {
        return Ok(None);
    };
    let dtw = Dtw::unconstrained();
    let mut paths = Vec::with_capacity(neighbours.len());
    for &(j, _) in neighbours {
        let SeriesValue::Numeric(b) = &sources[j] else {
            return Ok(None);
        };
        let (_, path) = dtw.distance_and_path(a, b).map_err(|e| ForestError::Kernel {
            kernel: "dtw".to_owned(),
            source: KernelError::Distance(e),
        })?;
        paths.push(path.steps().iter().map(|s| (s.a, s.b)).collect());
    }
    Ok(Some(paths))
}

/// Weighted mean when every contribution is numeric, weighted mode otherwise.
fn combine(contributions: Vec<(Cell, f64)>) -> Option<Cell> {
    let total: f64 = contributions.iter().map(|(_, w)| w).sum();
    if contributions.is_empty() || total <= 0.0 {
        return None;
    }
    if contributions.iter().all(|(c, _)| matches!(c, Cell::Num(_))) {
        let sum: f64 = contributions
            .iter()
            .map(|(c, w)| match c {
                Cell::Num(v) => v * w,
                _ => 0.0,
            })
            .sum();
        return Some(Cell::Num(sum / total));
    }
    weighted_mode(contributions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::Label;

    fn numeric(rows: &[&[f64]]) -> Vec<SeriesValue> {
        rows.iter().map(|r| SeriesValue::Numeric(r.to_vec())).collect()
    }

    fn make_gappy_data() -> Dataset {
        let mut labels = Vec::new();
        let mut series = Vec::new();
        for i in 0..12 {
            let x = f64::from(i) * 0.05;
            labels.push(Label::Int(0));
            series.push(SeriesValue::Numeric(vec![x, 1.0 + x, 2.0 + x, 1.0, x]));
            labels.push(Label::Int(1));
            series.push(SeriesValue::Numeric(vec![10.0 + x, 8.0, 6.0 - x, 8.0, 10.0]));
        }
        if let SeriesValue::Numeric(v) = &mut series[0] {
            v[2] = f64::NAN;
        }
        if let SeriesValue::Numeric(v) = &mut series[1] {
            v[1] = f64::NAN;
        }
        let missing = MissingIndex::detect(&series);
        Dataset::labelled(labels, series).unwrap().with_missing(missing).unwrap()
    }

    fn fast_config() -> ImputeConfig {
        ImputeConfig::new(2).unwrap().with_forest(
            ForestConfig::new(25)
                .unwrap()
                .with_measures(["euclidean"])
                .with_random_tie_break(false)
                .with_seed(3),
        )
    }

    #[test]
    fn parses_imputer_names() {
        assert_eq!("global-mean".parse::<InitialImputerKind>().unwrap(), InitialImputerKind::GlobalMean);
        assert_eq!("Global_Mode".parse::<InitialImputerKind>().unwrap(), InitialImputerKind::GlobalMode);
        assert!(matches!(
            "knn".parse::<InitialImputerKind>(),
            Err(ForestError::UnknownImputer { .. })
        ));
    }

    #[test]
    fn mean_fills_row_mean() {
        let mut data =
            Dataset::labelled(vec![Label::Int(0)], numeric(&[&[1.0, f64::NAN, 5.0]])).unwrap();
        InitialImputerKind::Mean.impute(&mut data).unwrap();
        assert_eq!(data.series()[0], SeriesValue::Numeric(vec![1.0, 3.0, 5.0]));
    }

    #[test]
    fn median_and_linear_fill_rows() {
        let rows: &[&[f64]] = &[&[1.0, f64::NAN, 2.0, 10.0, f64::NAN]];
        let mut data = Dataset::labelled(vec![Label::Int(0)], numeric(rows)).unwrap();
        InitialImputerKind::Median.impute(&mut data).unwrap();
        assert_eq!(data.series()[0], SeriesValue::Numeric(vec![1.0, 2.0, 2.0, 10.0, 2.0]));

        let rows: &[&[f64]] = &[&[f64::NAN, 0.0, f64::NAN, 4.0, f64::NAN]];
        let mut data = Dataset::labelled(vec![Label::Int(0)], numeric(rows)).unwrap();
        InitialImputerKind::Linear.impute(&mut data).unwrap();
        assert_eq!(data.series()[0], SeriesValue::Numeric(vec![0.0, 0.0, 2.0, 4.0, 4.0]));
    }

    #[test]
    fn global_mean_uses_column() {
        let rows: &[&[f64]] = &[&[1.0, f64::NAN], &[3.0, 4.0], &[5.0, 8.0]];
        let mut data =
            Dataset::labelled(vec![Label::Int(0), Label::Int(0), Label::Int(1)], numeric(rows)).unwrap();
        InitialImputerKind::GlobalMean.impute(&mut data).unwrap();
        assert_eq!(data.series()[0], SeriesValue::Numeric(vec![1.0, 6.0]));
    }

    #[test]
    fn mode_handles_categorical_cells() {
        let cat = |s: &str| Cell::Cat(s.to_owned());
        let series = vec![SeriesValue::Mixed(vec![cat("a"), cat("b"), cat("b"), Cell::Missing])];
        let mut data = Dataset::labelled(vec![Label::Int(0)], series).unwrap();
        InitialImputerKind::Mode.impute(&mut data).unwrap();
        assert_eq!(data.series()[0].cell_at(0, 3), Some(&cat("b")));
    }

    #[test]
    fn numeric_imputer_rejects_mixed_data() {
        let series = vec![SeriesValue::Mixed(vec![Cell::Num(1.0), Cell::Missing])];
        let mut data = Dataset::labelled(vec![Label::Int(0)], series).unwrap();
        let err = InitialImputerKind::Mean.impute(&mut data).unwrap_err();
        assert!(matches!(err, ForestError::Imputer { .. }));
    }

    #[test]
    fn zero_rounds_rejected() {
        assert!(matches!(ImputeConfig::new(0), Err(ForestError::InvalidImputeRounds { rounds: 0 })));
    }

    #[test]
    fn loop_fills_every_missing_slot() {
        let mut data = make_gappy_data();
        let report = ImputationLoop::new(fast_config()).unwrap().impute_train(&mut data).unwrap();
        assert_eq!(report.n_missing, 2);
        assert_eq!(report.rounds, 2);
        assert!(data.series().iter().all(|s| s.missing_positions().is_empty()));
        // Class 0 neighbours hold values near 2.0 at column 2.
        let v = data.series()[0].numeric_at(0, 2).unwrap();
        assert!((1.5..3.0).contains(&v), "imputed {v}");
    }

    /// Fills every missing slot with one value and counts its calls.
    #[derive(Debug, Default)]
    struct ConstantImputer {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl InitialImputer for ConstantImputer {
        fn name(&self) -> &str {
            "constant"
        }

        fn impute(&self, data: &mut Dataset) -> Result<(), ForestError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            for series in data.series_mut() {
                for (row, col) in series.missing_positions() {
                    series.set_numeric(row, col, 2.0);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn custom_imputer_and_registry_are_used() {
        let mut data = make_gappy_data();
        let imputer = Arc::new(ConstantImputer::default());
        let report = ImputationLoop::new(fast_config())
            .unwrap()
            .with_imputer(imputer.clone())
            .impute_train(&mut data)
            .unwrap();
        assert_eq!(report.n_missing, 2);
        assert_eq!(imputer.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(data.series().iter().all(|s| s.missing_positions().is_empty()));

        let mut data = make_gappy_data();
        let result = ImputationLoop::new(fast_config())
            .unwrap()
            .with_registry(KernelRegistry::empty())
            .impute_train(&mut data);
        assert!(matches!(result, Err(ForestError::UnknownMeasure { .. })));
    }

    #[test]
    fn complete_data_unchanged() {
        let mut data = make_gappy_data();
        InitialImputerKind::Mean.impute(&mut data).unwrap();
        let mut complete = Dataset::labelled(
            data.labels().iter().map(|l| l.clone().unwrap()).collect(),
            data.series().to_vec(),
        )
        .unwrap();
        let before = complete.series().to_vec();
        let report = ImputationLoop::new(fast_config()).unwrap().impute_train(&mut complete).unwrap();
        assert_eq!(report.rounds, 0);
        assert_eq!(complete.series(), before.as_slice());
    }

    #[test]
    fn combine_weighs_numeric_and_categorical() {
        let numeric = combine(vec![(Cell::Num(1.0), 1.0), (Cell::Num(4.0), 2.0)]);
        assert_eq!(numeric, Some(Cell::Num(3.0)));
        let cat = |s: &str| Cell::Cat(s.to_owned());
        let mode = combine(vec![(cat("x"), 0.2), (cat("y"), 0.3), (cat("x"), 0.2)]);
        assert_eq!(mode, Some(cat("x")));
        assert_eq!(combine(Vec::new()), None);
    }

    #[test]
    fn dtw_aware_loop_runs() {
        let mut data = make_gappy_data();
        let config = fast_config().with_dtw_aware(true);
        ImputationLoop::new(config).unwrap().impute_train(&mut data).unwrap();
        assert!(data.series().iter().all(|s| s.missing_positions().is_empty()));
    }

    #[test]
    fn test_set_imputation_uses_training_values() {
        let mut train = make_gappy_data();
        let imputer = ImputationLoop::new(fast_config()).unwrap();
        imputer.impute_train(&mut train).unwrap();
        let forest = fast_config().forest().fit(&train).unwrap();

        let mut test = Dataset::new(
            vec![None],
            numeric(&[&[10.1, 8.0, f64::NAN, 8.0, 10.0]]),
        )
        .unwrap();
        let report = imputer.impute_test(&mut test, &forest, &train).unwrap();
        assert_eq!(report.n_missing, 1);
        let v = test.series()[0].numeric_at(0, 2).unwrap();
        assert!((5.0..7.0).contains(&v), "imputed {v}");
    }

    fn dense(rows: Vec<Vec<f64>>) -> ProximityMatrix {
        let n_cols = rows.first().map_or(0, Vec::len);
        ProximityMatrix::Dense { rows, n_cols }
    }

    fn sequential() -> ProximityConfig {
        ProximityConfig::new().with_parallel(false)
    }

    #[test]
    fn dtw_aware_reads_the_aligned_neighbour_position() {
        // the target's current estimate at column 2 lines up with the
        // neighbour's peak one step later
        let targets = numeric(&[&[0.0, 0.0, 9.0, 0.0, 0.0, 0.0]]);
        let sources = numeric(&[&[0.0, 0.0, 0.0, 9.0, 0.0, 0.0]]);
        let target_missing = MissingIndex::Flat(vec![vec![2]]);
        let source_missing = MissingIndex::empty(1);
        let prox = dense(vec![vec![1.0]]);

        let aligned = reimpute(
            &targets,
            &target_missing,
            &sources,
            &source_missing,
            &prox,
            false,
            true,
            &sequential(),
        )
        .unwrap();
        assert_eq!(aligned.fills, vec![(0, 0, 2, Cell::Num(9.0))]);

        let same_position = reimpute(
            &targets,
            &target_missing,
            &sources,
            &source_missing,
            &prox,
            false,
            false,
            &sequential(),
        )
        .unwrap();
        assert_eq!(same_position.fills, vec![(0, 0, 2, Cell::Num(0.0))]);
    }

    #[test]
    fn dtw_aware_skips_originally_missing_neighbour_positions() {
        let targets = numeric(&[&[0.0, 0.0, 9.0, 0.0, 0.0, 0.0]]);
        // neighbour 0 only holds an estimate at its aligned position
        let sources = numeric(&[&[0.0, 0.0, 0.0, 9.0, 0.0, 0.0], &[0.0, 0.0, 0.0, 7.0, 0.0, 0.0]]);
        let target_missing = MissingIndex::Flat(vec![vec![2]]);
        let source_missing = MissingIndex::Flat(vec![vec![3], vec![]]);

        let both = reimpute(
            &targets,
            &target_missing,
            &sources,
            &source_missing,
            &dense(vec![vec![0.5, 0.5]]),
            false,
            true,
            &sequential(),
        )
        .unwrap();
        assert_eq!(both.fills, vec![(0, 0, 2, Cell::Num(7.0))]);
        assert_eq!(both.fallbacks, 0);

        let only_missing = reimpute(
            &targets,
            &target_missing,
            &sources,
            &source_missing,
            &dense(vec![vec![1.0, 0.0]]),
            false,
            true,
            &sequential(),
        )
        .unwrap();
        assert!(only_missing.fills.is_empty());
        assert_eq!(only_missing.fallbacks, 1);
    }

    #[test]
    fn neighbours_at_or_below_epsilon_are_ignored() {
        let targets = numeric(&[&[1.0, 5.0, 1.0]]);
        let sources = numeric(&[&[0.0, 10.0, 0.0], &[0.0, 20.0, 0.0]]);
        let target_missing = MissingIndex::Flat(vec![vec![1]]);
        let source_missing = MissingIndex::empty(2);
        let prox = dense(vec![vec![0.5, 0.01]]);

        let all = reimpute(
            &targets,
            &target_missing,
            &sources,
            &source_missing,
            &prox,
            false,
            false,
            &sequential(),
        )
        .unwrap();
        let Some((_, _, _, Cell::Num(v))) = all.fills.first() else {
            panic!("expected a numeric fill");
        };
        assert!((v - 5.2 / 0.51).abs() < 1e-12, "{v}");

        let strict = sequential().with_epsilon(0.05);
        let near = reimpute(
            &targets,
            &target_missing,
            &sources,
            &source_missing,
            &prox,
            false,
            false,
            &strict,
        )
        .unwrap();
        assert_eq!(near.fills, vec![(0, 0, 1, Cell::Num(10.0))]);
    }
}
