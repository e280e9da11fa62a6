//! Configuration builder for Proximity Forest training.

use std::fmt;
use std::str::FromStr;

use crate::dataset::Dataset;
use crate::error::ForestError;
use crate::forest::ProximityForest;
use crate::kernel::{DEFAULT_MEASURES, KernelRegistry};
use crate::purity::PurityMeasure;

/// Whether labels are classes or regression targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Task {
    /// Predict a class by plurality vote.
    #[default]
    Classification,
    /// Predict a real value by mean or median.
    Regression,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Classification => "classification",
            Self::Regression => "regression",
        })
    }
}

/// How regression leaves and forests aggregate targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Voting {
    /// Arithmetic mean.
    #[default]
    Mean,
    /// Median; the mean of the two middle values for even counts.
    Median,
}

impl FromStr for Voting {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            _ => Err(ForestError::UnknownVoting { name: s.to_owned() }),
        }
    }
}

impl Voting {
    /// Aggregate `values`; `None` when empty.
    #[must_use]
    pub fn aggregate(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Self::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Self::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                Some(if sorted.len() % 2 == 0 {
                    0.5 * (sorted[mid - 1] + sorted[mid])
                } else {
                    sorted[mid]
                })
            }
        }
    }
}

/// Configuration for Proximity Forest training.
///
/// Construct via [`ForestConfig::new`], then chain `with_*` methods. Names
/// of measures are resolved and every field validated when training starts,
/// before any tree is built.
///
/// # Defaults
///
/// | Parameter                  | Default                 |
/// |----------------------------|-------------------------|
/// | `num_candidates_per_split` | 1                       |
/// | `task`                     | `Classification`        |
/// | `purity`                   | `Gini` (`Variance` for regression) |
/// | `purity_threshold`         | 1e-6                    |
/// | `max_depth`                | 0 (unbounded)           |
/// | `measures`                 | the eleven default measures |
/// | `random_dm_per_node`       | `true`                  |
/// | `voting`                   | `Mean`                  |
/// | `random_tie_break`         | `true`                  |
/// | `seed`                     | 42                      |
/// | `parallel_trees`           | `true`                  |
/// | `parallel_predict`         | `true`                  |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub(crate) num_trees: usize,
    pub(crate) num_candidates_per_split: usize,
    pub(crate) task: Task,
    pub(crate) purity: PurityMeasure,
    pub(crate) purity_threshold: f64,
    pub(crate) max_depth: usize,
    pub(crate) measures: Vec<String>,
    pub(crate) random_dm_per_node: bool,
    pub(crate) voting: Voting,
    pub(crate) random_tie_break: bool,
    pub(crate) seed: u64,
    pub(crate) parallel_trees: bool,
    pub(crate) parallel_predict: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_trees: 11,
            num_candidates_per_split: 1,
            task: Task::Classification,
            purity: PurityMeasure::Gini,
            purity_threshold: 1e-6,
            max_depth: 0,
            measures: DEFAULT_MEASURES.iter().map(|&m| m.to_owned()).collect(),
            random_dm_per_node: true,
            voting: Voting::Mean,
            random_tie_break: true,
            seed: 42,
            parallel_trees: true,
            parallel_predict: true,
        }
    }
}

impl ForestConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidTreeCount`] if `num_trees` is zero.
    pub fn new(num_trees: usize) -> Result<Self, ForestError> {
        if num_trees == 0 {
            return Err(ForestError::InvalidTreeCount { num_trees });
        }
        Ok(Self {
            num_trees,
            ..Self::default()
        })
    }

    // --- Setters ---

    /// Set the number of trees; checked by [`validate`][ForestConfig::validate].
    #[must_use]
    pub fn with_num_trees(mut self, num_trees: usize) -> Self {
        self.num_trees = num_trees;
        self
    }

    /// Set the number of split candidates drawn per node.
    #[must_use]
    pub fn with_candidates_per_split(mut self, candidates: usize) -> Self {
        self.num_candidates_per_split = candidates;
        self
    }

    /// Set the task; also resets the purity measure to the task's default.
    #[must_use]
    pub fn with_task(mut self, task: Task) -> Self {
        self.task = task;
        self.purity = match task {
            Task::Classification => PurityMeasure::Gini,
            Task::Regression => PurityMeasure::Variance,
        };
        self
    }

    /// Set the purity measure.
    #[must_use]
    pub fn with_purity(mut self, purity: PurityMeasure) -> Self {
        self.purity = purity;
        self
    }

    /// Set the impurity at or below which a node becomes a leaf.
    #[must_use]
    pub fn with_purity_threshold(mut self, threshold: f64) -> Self {
        self.purity_threshold = threshold;
        self
    }

    /// Set the maximum depth. 0 means unbounded.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Restrict the candidate measures to the given names.
    #[must_use]
    pub fn with_measures<S: Into<String>>(mut self, measures: impl IntoIterator<Item = S>) -> Self {
        self.measures = measures.into_iter().map(Into::into).collect();
        self
    }

    /// Draw a measure per split candidate (`true`) or once per tree (`false`).
    #[must_use]
    pub fn with_random_dm_per_node(mut self, per_node: bool) -> Self {
        self.random_dm_per_node = per_node;
        self
    }

    /// Set the regression voting rule.
    #[must_use]
    pub fn with_voting(mut self, voting: Voting) -> Self {
        self.voting = voting;
        self
    }

    /// Break exact distance ties uniformly at random (`true`) or by first exemplar.
    #[must_use]
    pub fn with_random_tie_break(mut self, random: bool) -> Self {
        self.random_tie_break = random;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Train trees on the rayon pool (`true`) or sequentially.
    #[must_use]
    pub fn with_parallel_trees(mut self, parallel: bool) -> Self {
        self.parallel_trees = parallel;
        self
    }

    /// Predict instances on the rayon pool when trees are not parallel.
    #[must_use]
    pub fn with_parallel_predict(mut self, parallel: bool) -> Self {
        self.parallel_predict = parallel;
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn num_trees(&self) -> usize {
        self.num_trees
    }

    /// Return the number of split candidates per node.
    #[must_use]
    pub fn num_candidates_per_split(&self) -> usize {
        self.num_candidates_per_split
    }

    /// Return the task.
    #[must_use]
    pub fn task(&self) -> Task {
        self.task
    }

    /// Return the purity measure.
    #[must_use]
    pub fn purity(&self) -> PurityMeasure {
        self.purity
    }

    /// Return the purity threshold.
    #[must_use]
    pub fn purity_threshold(&self) -> f64 {
        self.purity_threshold
    }

    /// Return the maximum depth, 0 meaning unbounded.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Return the candidate measure names.
    #[must_use]
    pub fn measures(&self) -> &[String] {
        &self.measures
    }

    /// Return whether measures are drawn per node.
    #[must_use]
    pub fn random_dm_per_node(&self) -> bool {
        self.random_dm_per_node
    }

    /// Return the regression voting rule.
    #[must_use]
    pub fn voting(&self) -> Voting {
        self.voting
    }

    /// Return whether ties are broken at random.
    #[must_use]
    pub fn random_tie_break(&self) -> bool {
        self.random_tie_break
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return whether trees train in parallel.
    #[must_use]
    pub fn parallel_trees(&self) -> bool {
        self.parallel_trees
    }

    /// Return whether instances predict in parallel.
    #[must_use]
    pub fn parallel_predict(&self) -> bool {
        self.parallel_predict
    }

    /// Check every field that does not depend on the data.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::InvalidTreeCount`] | `num_trees` is zero |
    /// | [`ForestError::InvalidCandidateCount`] | `num_candidates_per_split` is zero |
    /// | [`ForestError::InvalidThreshold`] | `purity_threshold` is negative or not finite |
    /// | [`ForestError::PurityTaskMismatch`] | purity measure does not fit the task |
    /// | [`ForestError::EmptyMeasurePool`] | no measures named |
    pub fn validate(&self) -> Result<(), ForestError> {
        if self.num_trees == 0 {
            return Err(ForestError::InvalidTreeCount {
                num_trees: self.num_trees,
            });
        }
        if self.num_candidates_per_split == 0 {
            return Err(ForestError::InvalidCandidateCount {
                candidates: self.num_candidates_per_split,
            });
        }
        if !self.purity_threshold.is_finite() || self.purity_threshold < 0.0 {
            return Err(ForestError::InvalidThreshold {
                name: "purity_threshold",
                value: self.purity_threshold,
            });
        }
        if self.purity.is_regression() != (self.task == Task::Regression) {
            return Err(ForestError::PurityTaskMismatch {
                purity: self.purity.to_string(),
                task: self.task.to_string(),
            });
        }
        if self.measures.is_empty() {
            return Err(ForestError::EmptyMeasurePool);
        }
        Ok(())
    }

    /// Train a forest with the built-in measures.
    ///
    /// Delegates to [`crate::forest::train`].
    ///
    /// # Errors
    ///
    /// Returns configuration errors from [`validate`][ForestConfig::validate]
    /// and measure resolution, invariant errors from training, and kernel
    /// failures.
    pub fn fit(&self, data: &Dataset) -> Result<ProximityForest, ForestError> {
        crate::forest::train(self, data, &KernelRegistry::with_builtins())
    }

    /// Train a forest resolving measure names through `registry`.
    ///
    /// # Errors
    ///
    /// Same as [`fit`][ForestConfig::fit].
    pub fn fit_with_registry(
        &self,
        data: &Dataset,
        registry: &KernelRegistry,
    ) -> Result<ProximityForest, ForestError> {
        crate::forest::train(self, data, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_trees_rejected() {
        assert!(matches!(
            ForestConfig::new(0),
            Err(ForestError::InvalidTreeCount { num_trees: 0 })
        ));
    }

    #[test]
    fn defaults_match_table() {
        let c = ForestConfig::new(11).unwrap();
        assert_eq!(c.num_candidates_per_split(), 1);
        assert_eq!(c.purity(), PurityMeasure::Gini);
        assert_eq!(c.purity_threshold(), 1e-6);
        assert_eq!(c.max_depth(), 0);
        assert_eq!(c.measures().len(), 11);
        assert!(c.random_dm_per_node());
        assert_eq!(c.seed(), 42);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn regression_task_switches_purity() {
        let c = ForestConfig::new(3).unwrap().with_task(Task::Regression);
        assert_eq!(c.purity(), PurityMeasure::Variance);
        assert!(c.validate().is_ok());
        let bad = c.with_purity(PurityMeasure::Entropy);
        assert!(matches!(
            bad.validate(),
            Err(ForestError::PurityTaskMismatch { .. })
        ));
    }

    #[test]
    fn invalid_fields_rejected() {
        let c = ForestConfig::new(3).unwrap().with_candidates_per_split(0);
        assert!(matches!(
            c.validate(),
            Err(ForestError::InvalidCandidateCount { .. })
        ));
        let c = ForestConfig::new(3).unwrap().with_purity_threshold(-1.0);
        assert!(matches!(c.validate(), Err(ForestError::InvalidThreshold { .. })));
        let none: [&str; 0] = [];
        let c = ForestConfig::new(3).unwrap().with_measures(none);
        assert!(matches!(c.validate(), Err(ForestError::EmptyMeasurePool)));
    }

    #[test]
    fn voting_parses_and_aggregates() {
        assert_eq!("Median".parse::<Voting>().unwrap(), Voting::Median);
        assert!(matches!(
            "mode".parse::<Voting>(),
            Err(ForestError::UnknownVoting { .. })
        ));
        assert_eq!(Voting::Mean.aggregate(&[1.0, 2.0, 6.0]), Some(3.0));
        assert_eq!(Voting::Median.aggregate(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(Voting::Median.aggregate(&[]), None);
    }
}
