//! Distance kernels: the pluggable trait, the built-in measures and the
//! registry that resolves measure names.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use pfgap_distance::{DistanceError, Dtw};
use rand::{Rng, RngCore};

use crate::dataset::DatasetView;
use crate::error::ForestError;
use crate::series::{Cell, SeriesKind, SeriesValue};

/// Measures enabled when the run names none.
pub const DEFAULT_MEASURES: [&str; 11] = [
    "euclidean", "dtw", "dtwcv", "ddtw", "ddtwcv", "wdtw", "wddtw", "lcss", "erp", "twe", "msm",
];

const TWE_NU: [f64; 10] = [
    0.00001, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
];

/// Errors raised by a distance kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// The numeric routine rejected its input.
    #[error(transparent)]
    Distance(#[from] DistanceError),

    /// The kernel cannot compare this kind of series.
    #[error("{kernel} does not support {kind} series")]
    UnsupportedSeries {
        /// Kernel name.
        kernel: String,
        /// Kind of the rejected series.
        kind: SeriesKind,
    },

    /// The two series differ in kind or row count.
    #[error("cannot compare {left} series with {rows_left} rows to {right} series with {rows_right} rows")]
    ShapeMismatch {
        /// Kind of the first series.
        left: SeriesKind,
        /// Row count of the first series.
        rows_left: usize,
        /// Kind of the second series.
        right: SeriesKind,
        /// Row count of the second series.
        rows_right: usize,
    },

    /// A user-supplied kernel failed.
    #[error("{message}")]
    External {
        /// Description from the kernel.
        message: String,
    },
}

/// Randomised hyper-parameters drawn for one split candidate.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ParamSet {
    /// The kernel has no parameters.
    #[default]
    None,
    /// Sakoe-Chiba window radius.
    Window {
        /// Radius in samples.
        window: usize,
    },
    /// Weighted DTW penalty steepness.
    Weight {
        /// Logistic steepness.
        g: f64,
    },
    /// LCSS match threshold and window.
    Lcss {
        /// Match threshold.
        epsilon: f64,
        /// Window radius.
        window: usize,
    },
    /// ERP gap value and window.
    Erp {
        /// Gap value.
        g: f64,
        /// Window radius.
        window: usize,
    },
    /// MSM split/merge cost.
    Msm {
        /// Split and merge cost.
        cost: f64,
    },
    /// TWE stiffness and penalty.
    Twe {
        /// Stiffness.
        nu: f64,
        /// Edit penalty.
        lambda: f64,
    },
    /// Parameters of a user-supplied kernel.
    Custom(Vec<f64>),
}

/// A distance between two series.
///
/// `distance` may return `f64::INFINITY` once the cost provably exceeds
/// `best_so_far`; a value equal to `best_so_far` must be returned exactly so
/// ties survive.
pub trait DistanceKernel: Send + Sync + fmt::Debug {
    /// Draw hyper-parameters from a candidate sample.
    fn random_params(&self, sample: &DatasetView<'_>, rng: &mut dyn RngCore) -> ParamSet {
        let _ = (sample, rng);
        ParamSet::None
    }

    /// Whether the kernel can compare series of `kind`.
    ///
    /// User kernels handle numeric series unless they say otherwise.
    fn supports(&self, kind: SeriesKind) -> bool {
        kind.is_numeric()
    }

    /// Distance between `a` and `b` under `params`.
    ///
    /// # Errors
    ///
    /// Returns a [`KernelError`] when the inputs cannot be compared.
    fn distance(
        &self,
        a: &SeriesValue,
        b: &SeriesValue,
        params: &ParamSet,
        best_so_far: f64,
    ) -> Result<f64, KernelError>;
}

/// The built-in measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureKind {
    /// Euclidean distance.
    Euclidean,
    /// Manhattan distance.
    Manhattan,
    /// Full-window DTW.
    Dtw,
    /// DTW with a random window.
    DtwCv,
    /// Full-window DTW on derivatives.
    Ddtw,
    /// Derivative DTW with a random window.
    DdtwCv,
    /// Weighted DTW.
    Wdtw,
    /// Weighted DTW on derivatives.
    Wddtw,
    /// Longest common subsequence.
    Lcss,
    /// Edit distance with real penalty.
    Erp,
    /// Move-split-merge.
    Msm,
    /// Time warp edit.
    Twe,
}

impl MeasureKind {
    /// Every built-in measure.
    pub const ALL: [Self; 12] = [
        Self::Euclidean,
        Self::Manhattan,
        Self::Dtw,
        Self::DtwCv,
        Self::Ddtw,
        Self::DdtwCv,
        Self::Wdtw,
        Self::Wddtw,
        Self::Lcss,
        Self::Erp,
        Self::Msm,
        Self::Twe,
    ];

    /// Registry name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::Manhattan => "manhattan",
            Self::Dtw => "dtw",
            Self::DtwCv => "dtwcv",
            Self::Ddtw => "ddtw",
            Self::DdtwCv => "ddtwcv",
            Self::Wdtw => "wdtw",
            Self::Wddtw => "wddtw",
            Self::Lcss => "lcss",
            Self::Erp => "erp",
            Self::Msm => "msm",
            Self::Twe => "twe",
        }
    }

    fn uses_derivative(self) -> bool {
        matches!(self, Self::Ddtw | Self::DdtwCv | Self::Wddtw)
    }

    /// Whether the measure compares point `i` against point `i` only, which
    /// is what mixed-type series support.
    #[must_use]
    pub fn is_lockstep(self) -> bool {
        matches!(self, Self::Euclidean | Self::Manhattan)
    }
}

impl FromStr for MeasureKind {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| ForestError::UnknownMeasure { name: s.to_owned() })
    }
}

impl fmt::Display for MeasureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Longest row and population standard deviation of a sample's numeric values.
fn sample_stats(sample: &DatasetView<'_>) -> (usize, f64) {
    let mut longest = 0usize;
    let (mut n, mut sum, mut sum_sq) = (0usize, 0.0, 0.0);
    for k in 0..sample.len() {
        let Some(instance) = sample.get(k) else {
            continue;
        };
        let Some(rows) = instance.series.numeric_rows() else {
            continue;
        };
        for row in rows {
            longest = longest.max(row.len());
            for &v in row.iter().filter(|v| !v.is_nan()) {
                n += 1;
                sum += v;
                sum_sq += v * v;
            }
        }
    }
    if n == 0 {
        return (longest, 0.0);
    }
    let mean = sum / n as f64;
    let var = (sum_sq / n as f64 - mean * mean).max(0.0);
    (longest, var.sqrt())
}

fn uniform_between(rng: &mut dyn RngCore, lo: f64, hi: f64) -> f64 {
    lo + rng.r#gen::<f64>() * (hi - lo)
}

/// A built-in measure backed by `pfgap-distance`.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinKernel(MeasureKind);

impl BuiltinKernel {
    /// Wrap a built-in measure.
    #[must_use]
    pub fn new(kind: MeasureKind) -> Self {
        Self(kind)
    }

    fn row_distance(
        &self,
        a: &[f64],
        b: &[f64],
        params: &ParamSet,
        cutoff: f64,
    ) -> Result<f64, DistanceError> {
        let (da, db);
        let (a, b) = if self.0.uses_derivative() {
            da = pfgap_distance::derivative(a)?;
            db = pfgap_distance::derivative(b)?;
            (da.as_slice(), db.as_slice())
        } else {
            (a, b)
        };

        match (self.0, params) {
            (MeasureKind::Euclidean, _) => pfgap_distance::euclidean(a, b, cutoff),
            (MeasureKind::Manhattan, _) => pfgap_distance::manhattan(a, b, cutoff),
            (MeasureKind::DtwCv | MeasureKind::DdtwCv, ParamSet::Window { window }) => {
                Dtw::with_sakoe_chiba(*window).distance_with_cutoff(a, b, cutoff)
            }
            (MeasureKind::Wdtw | MeasureKind::Wddtw, ParamSet::Weight { g }) => {
                pfgap_distance::wdtw(a, b, *g, cutoff)
            }
            (MeasureKind::Wdtw | MeasureKind::Wddtw, _) => pfgap_distance::wdtw(a, b, 0.0, cutoff),
            (MeasureKind::Lcss, ParamSet::Lcss { epsilon, window }) => {
                pfgap_distance::lcss(a, b, *epsilon, Some(*window))
            }
            (MeasureKind::Lcss, _) => pfgap_distance::lcss(a, b, 0.0, None),
            (MeasureKind::Erp, ParamSet::Erp { g, window }) => {
                pfgap_distance::erp(a, b, *g, Some(*window))
            }
            (MeasureKind::Erp, _) => pfgap_distance::erp(a, b, 0.0, None),
            (MeasureKind::Msm, ParamSet::Msm { cost }) => pfgap_distance::msm(a, b, *cost),
            (MeasureKind::Msm, _) => pfgap_distance::msm(a, b, 1.0),
            (MeasureKind::Twe, ParamSet::Twe { nu, lambda }) => {
                pfgap_distance::twe(a, b, *nu, *lambda)
            }
            (MeasureKind::Twe, _) => pfgap_distance::twe(a, b, 0.001, 0.0),
            // full window for dtw/ddtw, and for the windowed variants without params
            _ => Dtw::unconstrained().distance_with_cutoff(a, b, cutoff),
        }
    }

    /// Lock-step distance over mixed-type cells; a categorical mismatch costs 1.
    fn cell_distance(&self, a: &[Cell], b: &[Cell]) -> Result<f64, DistanceError> {
        if a.len() != b.len() {
            return Err(DistanceError::LengthMismatch {
                left: a.len(),
                right: b.len(),
            });
        }
        let gaps = a.iter().zip(b).map(|pair| match pair {
            (Cell::Num(x), Cell::Num(y)) => (x - y).abs(),
            (Cell::Cat(x), Cell::Cat(y)) if x == y => 0.0,
            (Cell::Missing, _) | (_, Cell::Missing) => 0.0,
            _ => 1.0,
        });
        Ok(if self.0 == MeasureKind::Euclidean {
            gaps.map(|g| g * g).sum::<f64>().sqrt()
        } else {
            gaps.sum()
        })
    }
}

impl DistanceKernel for BuiltinKernel {
    fn supports(&self, kind: SeriesKind) -> bool {
        kind.is_numeric() || self.0.is_lockstep()
    }

    fn random_params(&self, sample: &DatasetView<'_>, rng: &mut dyn RngCore) -> ParamSet {
        let (longest, sigma) = sample_stats(sample);
        let max_window = (longest + 1) / 4;
        match self.0 {
            MeasureKind::DtwCv | MeasureKind::DdtwCv => ParamSet::Window {
                window: rng.gen_range(0..=max_window),
            },
            MeasureKind::Wdtw | MeasureKind::Wddtw => ParamSet::Weight { g: rng.r#gen() },
            MeasureKind::Lcss => ParamSet::Lcss {
                epsilon: uniform_between(&mut *rng, sigma / 5.0, sigma),
                window: rng.gen_range(0..=max_window),
            },
            MeasureKind::Erp => ParamSet::Erp {
                g: uniform_between(&mut *rng, sigma / 5.0, sigma),
                window: rng.gen_range(0..=max_window),
            },
            MeasureKind::Msm => {
                let k = rng.gen_range(0..100u32);
                ParamSet::Msm {
                    cost: 10f64.powf(-2.0 + 4.0 * f64::from(k) / 99.0),
                }
            }
            MeasureKind::Twe => ParamSet::Twe {
                nu: TWE_NU[rng.gen_range(0..TWE_NU.len())],
                lambda: f64::from(rng.gen_range(0..10u32)) / 90.0,
            },
            _ => ParamSet::None,
        }
    }

    fn distance(
        &self,
        a: &SeriesValue,
        b: &SeriesValue,
        params: &ParamSet,
        best_so_far: f64,
    ) -> Result<f64, KernelError> {
        if a.kind() != b.kind() || a.n_rows() != b.n_rows() {
            return Err(KernelError::ShapeMismatch {
                left: a.kind(),
                rows_left: a.n_rows(),
                right: b.kind(),
                rows_right: b.n_rows(),
            });
        }

        if let (Some(rows_a), Some(rows_b)) = (a.numeric_rows(), b.numeric_rows()) {
            // independent strategy: 2-D distance is the sum of per-row distances.
            // Each row alone is bounded by `best_so_far`; subtracting the
            // running total would round ties onto the wrong side.
            let mut total = 0.0;
            for (ra, rb) in rows_a.into_iter().zip(rows_b) {
                total += self.row_distance(ra, rb, params, best_so_far)?;
                if total > best_so_far {
                    return Ok(f64::INFINITY);
                }
            }
            return Ok(total);
        }

        if !self.0.is_lockstep() {
            return Err(KernelError::UnsupportedSeries {
                kernel: self.0.name().to_owned(),
                kind: a.kind(),
            });
        }
        let (Some(rows_a), Some(rows_b)) = (a.cell_rows(), b.cell_rows()) else {
            return Err(KernelError::UnsupportedSeries {
                kernel: self.0.name().to_owned(),
                kind: a.kind(),
            });
        };
        let mut total = 0.0;
        for (ra, rb) in rows_a.into_iter().zip(rows_b) {
            total += self.cell_distance(ra, rb)?;
        }
        Ok(total)
    }
}

/// Position of a kernel inside a [`KernelTable`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct KernelId(usize);

impl KernelId {
    /// Return the table position.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Named kernels available to a run.
///
/// Built-in measures are registered under their [`MeasureKind::name`];
/// user kernels are added with [`register`][KernelRegistry::register].
#[derive(Debug, Clone)]
pub struct KernelRegistry {
    entries: Vec<(String, Arc<dyn DistanceKernel>)>,
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl KernelRegistry {
    /// A registry with no kernels.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A registry holding every built-in measure.
    #[must_use]
    pub fn with_builtins() -> Self {
        Self {
            entries: MeasureKind::ALL
                .into_iter()
                .map(|k| {
                    let kernel: Arc<dyn DistanceKernel> = Arc::new(BuiltinKernel::new(k));
                    (k.name().to_owned(), kernel)
                })
                .collect(),
        }
    }

    /// Add a user kernel under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::DuplicateMeasure`] when the name is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kernel: Arc<dyn DistanceKernel>,
    ) -> Result<(), ForestError> {
        let name = name.into();
        if self.lookup(&name).is_some() {
            return Err(ForestError::DuplicateMeasure { name });
        }
        self.entries.push((name, kernel));
        Ok(())
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    fn lookup(&self, name: &str) -> Option<&Arc<dyn DistanceKernel>> {
        let wanted = name.trim();
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(wanted))
            .map(|(_, k)| k)
    }

    /// Resolve measure names into a table, in the given order.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::EmptyMeasurePool`] | `names` is empty |
    /// | [`ForestError::UnknownMeasure`] | A name has no registry entry |
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<KernelTable, ForestError> {
        if names.is_empty() {
            return Err(ForestError::EmptyMeasurePool);
        }
        let mut table = KernelTable::default();
        for name in names {
            let name = name.as_ref();
            let kernel = self
                .lookup(name)
                .ok_or_else(|| ForestError::UnknownMeasure {
                    name: name.to_owned(),
                })?;
            table.names.push(name.trim().to_ascii_lowercase());
            table.kernels.push(Arc::clone(kernel));
        }
        Ok(table)
    }
}

/// The resolved kernels of one forest, addressed by [`KernelId`].
#[derive(Debug, Clone, Default)]
pub struct KernelTable {
    names: Vec<String>,
    kernels: Vec<Arc<dyn DistanceKernel>>,
}

impl KernelTable {
    /// Number of kernels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    /// Kernel names in id order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Ids of every kernel.
    pub fn ids(&self) -> impl Iterator<Item = KernelId> {
        (0..self.kernels.len()).map(KernelId)
    }

    /// Name of kernel `id`.
    #[must_use]
    pub fn name(&self, id: KernelId) -> &str {
        self.names.get(id.0).map_or("<unresolved>", String::as_str)
    }

    pub(crate) fn kernel(&self, id: KernelId) -> Option<&Arc<dyn DistanceKernel>> {
        self.kernels.get(id.0)
    }

    /// Split into the kernels that support every kind in `kinds` and the
    /// names of those that do not.
    #[must_use]
    pub fn partition_by_support(self, kinds: &[SeriesKind]) -> (Self, Vec<String>) {
        let mut kept = Self::default();
        let mut dropped = Vec::new();
        for (name, kernel) in self.names.into_iter().zip(self.kernels) {
            if kinds.iter().all(|&k| kernel.supports(k)) {
                kept.names.push(name);
                kept.kernels.push(kernel);
            } else {
                dropped.push(name);
            }
        }
        (kept, dropped)
    }

    /// Pick a kernel uniformly at random.
    pub(crate) fn pick(&self, rng: &mut impl Rng) -> KernelId {
        KernelId(rng.gen_range(0..self.kernels.len()))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::dataset::Dataset;
    use crate::label::Label;

    fn numeric(values: &[f64]) -> SeriesValue {
        SeriesValue::Numeric(values.to_vec())
    }

    #[test]
    fn parse_builtin_names() {
        assert_eq!("DTWCV".parse::<MeasureKind>().unwrap(), MeasureKind::DtwCv);
        assert!(matches!(
            "shapedtw".parse::<MeasureKind>(),
            Err(ForestError::UnknownMeasure { .. })
        ));
    }

    #[test]
    fn select_rejects_unknown_and_empty() {
        let registry = KernelRegistry::with_builtins();
        assert!(matches!(
            registry.select(&["euclidean", "nope"]),
            Err(ForestError::UnknownMeasure { .. })
        ));
        let none: [&str; 0] = [];
        assert!(matches!(
            registry.select(&none),
            Err(ForestError::EmptyMeasurePool)
        ));
        let table = registry.select(&DEFAULT_MEASURES).unwrap();
        assert_eq!(table.len(), 11);
        assert_eq!(table.name(KernelId(1)), "dtw");
    }

    #[test]
    fn register_refuses_duplicates() {
        let mut registry = KernelRegistry::with_builtins();
        let kernel: Arc<dyn DistanceKernel> = Arc::new(BuiltinKernel::new(MeasureKind::Euclidean));
        assert!(registry.register("mine", Arc::clone(&kernel)).is_ok());
        assert!(matches!(
            registry.register("MINE", kernel),
            Err(ForestError::DuplicateMeasure { .. })
        ));
    }

    #[test]
    fn every_builtin_is_zero_on_identical_series() {
        let a = numeric(&[0.0, 1.0, 3.0, 2.0, 1.0, 0.5]);
        let data = Dataset::labelled(vec![Label::Int(0)], vec![a.clone()]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for kind in MeasureKind::ALL {
            let kernel = BuiltinKernel::new(kind);
            let params = kernel.random_params(&data.view(), &mut rng);
            let d = kernel.distance(&a, &a, &params, f64::INFINITY).unwrap();
            assert!(d.abs() < 1e-9, "{kind}: {d}");
        }
    }

    #[test]
    fn windows_stay_within_quarter_length() {
        let series: Vec<SeriesValue> = (0..5).map(|i| numeric(&[i as f64; 15])).collect();
        let data = Dataset::labelled(vec![Label::Int(0); 5], series).unwrap();
        let kernel = BuiltinKernel::new(MeasureKind::DtwCv);
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        for _ in 0..100 {
            match kernel.random_params(&data.view(), &mut rng) {
                ParamSet::Window { window } => assert!(window <= 4),
                other => panic!("unexpected params {other:?}"),
            }
        }
    }

    #[test]
    fn two_dimensional_sums_rows() {
        let a = SeriesValue::Numeric2d(vec![vec![0.0, 0.0], vec![0.0, 0.0]]);
        let b = SeriesValue::Numeric2d(vec![vec![3.0, 4.0], vec![0.0, 1.0]]);
        let d = BuiltinKernel::new(MeasureKind::Euclidean)
            .distance(&a, &b, &ParamSet::None, f64::INFINITY)
            .unwrap();
        assert!((d - 6.0).abs() < 1e-12);
    }

    #[test]
    fn two_dimensional_tie_survives_its_own_cutoff() {
        let query = SeriesValue::Numeric2d(vec![vec![0.0; 3]; 2]);
        let up = SeriesValue::Numeric2d(vec![vec![1.0; 3]; 2]);
        let down = SeriesValue::Numeric2d(vec![vec![-1.0; 3]; 2]);
        for kind in [MeasureKind::Euclidean, MeasureKind::Dtw] {
            let kernel = BuiltinKernel::new(kind);
            let best = kernel.distance(&query, &up, &ParamSet::None, f64::INFINITY).unwrap();
            let tied = kernel.distance(&query, &down, &ParamSet::None, best).unwrap();
            assert_eq!(tied, best, "{kind}");
        }
    }

    #[test]
    fn mixed_rows_count_category_mismatch() {
        let a = SeriesValue::Mixed(vec![Cell::Num(1.0), Cell::Cat("x".into())]);
        let b = SeriesValue::Mixed(vec![Cell::Num(3.0), Cell::Cat("y".into())]);
        let d = BuiltinKernel::new(MeasureKind::Manhattan)
            .distance(&a, &b, &ParamSet::None, f64::INFINITY)
            .unwrap();
        assert!((d - 3.0).abs() < 1e-12);

        let err = BuiltinKernel::new(MeasureKind::Dtw)
            .distance(&a, &b, &ParamSet::None, f64::INFINITY)
            .unwrap_err();
        assert!(matches!(err, KernelError::UnsupportedSeries { .. }));
    }

    #[test]
    fn mixed_series_keep_only_lockstep_kernels() {
        let table = KernelRegistry::with_builtins().select(&DEFAULT_MEASURES).unwrap();
        let (kept, dropped) = table.partition_by_support(&[SeriesKind::Numeric, SeriesKind::Mixed]);
        assert_eq!(kept.names(), ["euclidean".to_owned()]);
        assert_eq!(dropped.len(), 10);
        assert!(dropped.contains(&"msm".to_owned()));

        let table = KernelRegistry::with_builtins().select(&DEFAULT_MEASURES).unwrap();
        let (kept, dropped) = table.partition_by_support(&[SeriesKind::Numeric2d]);
        assert_eq!(kept.len(), 11);
        assert!(dropped.is_empty());
    }

    #[test]
    fn shape_mismatch_reported() {
        let err = BuiltinKernel::new(MeasureKind::Euclidean)
            .distance(
                &numeric(&[1.0]),
                &SeriesValue::Numeric2d(vec![vec![1.0]]),
                &ParamSet::None,
                f64::INFINITY,
            )
            .unwrap_err();
        assert!(matches!(err, KernelError::ShapeMismatch { .. }));
    }
}
