//! Out-of-bag forest proximities.
//!
//! For training instance `i`, let `S(i)` be the trees in which `i` was never
//! drawn and `J(i, t)` the in-bag multiset of the leaf its out-of-bag routing
//! reached in tree `t`. Then
//!
//! ```text
//! prox(i, j) = 1/|S(i)| * sum over t in S(i) of mult(j, t) / |J(i, t)|, for j in J(i, t)
//! ```
//!
//! where `mult(j, t)` is the bootstrap draw count of `j` in tree `t`. A test
//! instance was never drawn by any tree, so every tree contributes and `J` is
//! the in-bag multiset of the leaf the test query routes to.

use std::collections::BTreeMap;
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{info, instrument};

use crate::dataset::Dataset;
use crate::error::ForestError;
use crate::forest::{ProximityForest, task_seed};
use crate::node::NodeIndex;
use crate::tree::ProximityTree;

/// Output layout and threshold for proximity computation.
///
/// # Defaults
///
/// | Parameter  | Default |
/// |------------|---------|
/// | `sparse`   | `true`  |
/// | `epsilon`  | 1e-6    |
/// | `parallel` | `true`  |
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    sparse: bool,
    epsilon: f64,
    parallel: bool,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            sparse: true,
            epsilon: 1e-6,
            parallel: true,
        }
    }
}

impl ProximityConfig {
    /// Create a config with the defaults above.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only entries above epsilon (`true`) or every entry.
    #[must_use]
    pub fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Set the sparse threshold.
    ///
    /// Imputation ignores neighbours whose proximity is at or below it.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Compute rows on the rayon pool.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Return whether output is sparse.
    #[must_use]
    pub fn sparse(&self) -> bool {
        self.sparse
    }

    /// Return the sparse threshold.
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Return whether rows are computed in parallel.
    #[must_use]
    pub fn parallel(&self) -> bool {
        self.parallel
    }

    fn validate(&self) -> Result<(), ForestError> {
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(ForestError::InvalidThreshold {
                name: "epsilon",
                value: self.epsilon,
            });
        }
        Ok(())
    }
}

/// Instance-to-instance forest proximities.
///
/// Rows are query instances, columns are training instances. Proximities are
/// not symmetric in general; see [`symmetrized`][ProximityMatrix::symmetrized].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ProximityMatrix {
    /// Every entry stored.
    Dense {
        /// Row-major values.
        rows: Vec<Vec<f64>>,
        /// Number of columns.
        n_cols: usize,
    },
    /// Only entries above the threshold stored.
    Sparse {
        /// Column to value, per row.
        rows: Vec<BTreeMap<u32, f64>>,
        /// Number of columns.
        n_cols: usize,
    },
}

impl ProximityMatrix {
    fn from_rows(rows: Vec<Vec<f64>>, n_cols: usize, config: &ProximityConfig) -> Self {
        if !config.sparse {
            return Self::Dense { rows, n_cols };
        }
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .enumerate()
                    .filter(|&(_, v)| v > config.epsilon)
                    .map(|(j, v)| (j as u32, v))
                    .collect()
            })
            .collect();
        Self::Sparse { rows, n_cols }
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        match self {
            Self::Dense { rows, .. } => rows.len(),
            Self::Sparse { rows, .. } => rows.len(),
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn n_cols(&self) -> usize {
        match self {
            Self::Dense { n_cols, .. } | Self::Sparse { n_cols, .. } => *n_cols,
        }
    }

    /// Whether entries at or below epsilon were dropped.
    #[must_use]
    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse { .. })
    }

    /// Entry `(i, j)`; 0 when absent or out of range.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        match self {
            Self::Dense { rows, .. } => rows.get(i).and_then(|r| r.get(j)).copied(),
            Self::Sparse { rows, .. } => rows.get(i).and_then(|r| r.get(&(j as u32))).copied(),
        }
        .unwrap_or(0.0)
    }

    /// Non-zero entries of row `i` as `(column, value)`, in column order.
    #[must_use]
    pub fn row(&self, i: usize) -> Vec<(usize, f64)> {
        match self {
            Self::Dense { rows, .. } => rows
                .get(i)
                .map(|r| {
                    r.iter()
                        .enumerate()
                        .filter(|&(_, &v)| v != 0.0)
                        .map(|(j, &v)| (j, v))
                        .collect()
                })
                .unwrap_or_default(),
            Self::Sparse { rows, .. } => rows
                .get(i)
                .map(|r| r.iter().map(|(&j, &v)| (j as usize, v)).collect())
                .unwrap_or_default(),
        }
    }

    /// Number of stored non-zero entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        (0..self.n_rows()).map(|i| self.row(i).len()).sum()
    }

    /// Dense copy of the matrix.
    #[must_use]
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        match self {
            Self::Dense { rows, .. } => rows.clone(),
            Self::Sparse { rows, n_cols } => rows
                .iter()
                .map(|r| {
                    let mut dense = vec![0.0; *n_cols];
                    for (&j, &v) in r {
                        dense[j as usize] = v;
                    }
                    dense
                })
                .collect(),
        }
    }

    /// `0.5 (P + Pᵀ)` for a square matrix, keeping the layout.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::LengthMismatch`] when the matrix is not square.
    pub fn symmetrized(&self) -> Result<Self, ForestError> {
        let n = self.n_rows();
        if self.n_cols() != n {
            return Err(ForestError::LengthMismatch {
                what: "proximity columns",
                expected: n,
                got: self.n_cols(),
            });
        }
        Ok(match self {
            Self::Dense { rows, .. } => Self::Dense {
                rows: (0..n)
                    .map(|i| (0..n).map(|j| 0.5 * (rows[i][j] + rows[j][i])).collect())
                    .collect(),
                n_cols: n,
            },
            Self::Sparse { rows, .. } => {
                let mut out: Vec<BTreeMap<u32, f64>> = vec![BTreeMap::new(); n];
                for (i, row) in rows.iter().enumerate() {
                    for (&j, &v) in row {
                        *out[i].entry(j).or_insert(0.0) += 0.5 * v;
                        *out[j as usize].entry(i as u32).or_insert(0.0) += 0.5 * v;
                    }
                }
                Self::Sparse { rows: out, n_cols: n }
            }
        })
    }
}

/// Add `mult(j) / |J|` for every distinct `j` of the leaf's in-bag multiset.
fn accumulate_leaf(row: &mut [f64], tree: &ProximityTree, leaf: NodeIndex) {
    let Some(node) = tree.node(leaf) else {
        return;
    };
    let size = node.in_bag().len() as f64;
    if size == 0.0 {
        return;
    }
    let mut distinct = node.in_bag().to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    for j in distinct {
        let j = j as usize;
        if let (Some(cell), Some(&m)) = (row.get_mut(j), tree.multiplicities().get(j)) {
            *cell += f64::from(m) / size;
        }
    }
}

fn collect_rows<F>(n_rows: usize, parallel: bool, row: F) -> Result<Vec<Vec<f64>>, ForestError>
where
    F: Fn(usize) -> Result<Vec<f64>, ForestError> + Sync + Send,
{
    if parallel {
        (0..n_rows).into_par_iter().map(row).collect()
    } else {
        (0..n_rows).map(row).collect()
    }
}

impl ProximityForest {
    /// Proximities among the training instances, from out-of-bag routing.
    ///
    /// A row whose instance was in-bag for every tree is all zeros.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidThreshold`] for a negative epsilon.
    #[instrument(skip_all, fields(n_train = self.n_train()))]
    pub fn train_proximities(&self, config: &ProximityConfig) -> Result<ProximityMatrix, ForestError> {
        config.validate()?;
        let start = Instant::now();
        let n = self.n_train();
        let oob_leaves: Vec<Vec<Option<NodeIndex>>> =
            self.trees.iter().map(|t| t.out_of_bag_leaves(n)).collect();

        let rows = collect_rows(n, config.parallel, |i| {
            let mut row = vec![0.0; n];
            let mut n_oob_trees = 0usize;
            for (tree, leaves) in self.trees.iter().zip(&oob_leaves) {
                if let Some(leaf) = leaves[i] {
                    n_oob_trees += 1;
                    accumulate_leaf(&mut row, tree, leaf);
                }
            }
            if n_oob_trees > 0 {
                let scale = 1.0 / n_oob_trees as f64;
                row.iter_mut().for_each(|v| *v *= scale);
            }
            Ok(row)
        })?;

        let matrix = ProximityMatrix::from_rows(rows, n, config);
        info!(
            n_rows = n,
            nnz = matrix.nnz(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "training proximities computed"
        );
        Ok(matrix)
    }

    /// Proximities from each instance of `test` to the training instances.
    ///
    /// Every tree contributes; ties while routing a test query are broken
    /// with the same per-instance seeds as [`predict_batch`][ProximityForest::predict_batch].
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidThreshold`] for a negative epsilon,
    /// [`ForestError::MissingValues`] for an unfilled test instance and
    /// [`ForestError::Kernel`] when a distance fails.
    #[instrument(skip_all, fields(n_test = test.len(), n_train = self.n_train()))]
    pub fn test_proximities(
        &self,
        test: &Dataset,
        config: &ProximityConfig,
    ) -> Result<ProximityMatrix, ForestError> {
        config.validate()?;
        test.ensure_filled()?;
        let start = Instant::now();
        let n = self.n_train();
        let seed = self.config.seed();
        let tie = self.config.random_tie_break();
        let kernels = self.kernels();
        let series = test.series();

        let rows = collect_rows(series.len(), config.parallel, |q| {
            let mut row = vec![0.0; n];
            let query_seed = task_seed(seed, q as u64);
            for tree in &self.trees {
                let mut rng = ChaCha8Rng::seed_from_u64(task_seed(query_seed, tree.id() as u64));
                let leaf = tree.route_to_leaf(kernels, &series[q], None, tie, &mut rng)?;
                accumulate_leaf(&mut row, tree, leaf);
            }
            let scale = 1.0 / self.trees.len().max(1) as f64;
            row.iter_mut().for_each(|v| *v *= scale);
            Ok(row)
        })?;

        let matrix = ProximityMatrix::from_rows(rows, n, config);
        info!(
            n_rows = series.len(),
            nnz = matrix.nnz(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "test/train proximities computed"
        );
        Ok(matrix)
    }
}
