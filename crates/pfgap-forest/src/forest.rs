//! Proximity Forest training with parallel tree construction.

use std::time::Instant;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument, warn};

use crate::config::{ForestConfig, Task};
use crate::dataset::Dataset;
use crate::error::ForestError;
use crate::kernel::{DEFAULT_MEASURES, KernelRegistry, KernelTable};
use crate::label::{Label, LabelMapping};
use crate::result::TrainingMetadata;
use crate::series::SeriesKind;
use crate::tree::{ProximityTree, train_tree};

/// Seed for task `index` of a run seeded with `seed`.
pub fn task_seed(seed: u64, index: u64) -> u64 {
    seed ^ index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// A trained Proximity Forest.
///
/// Kernels are not serialized; [`ProximityForest::load`] resolves
/// `kernel_names` through a [`KernelRegistry`] again.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProximityForest {
    pub(crate) trees: Vec<ProximityTree>,
    pub(crate) config: ForestConfig,
    pub(crate) kernel_names: Vec<String>,
    #[serde(skip)]
    pub(crate) kernels: KernelTable,
    pub(crate) mapping: Option<LabelMapping>,
    pub(crate) metadata: TrainingMetadata,
}

impl ProximityForest {
    /// The trees, in training order.
    #[must_use]
    pub fn trees(&self) -> &[ProximityTree] {
        &self.trees
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// The configuration the forest was trained with.
    #[must_use]
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Names of the resolved kernels, in [`crate::KernelId`] order.
    #[must_use]
    pub fn kernel_names(&self) -> &[String] {
        &self.kernel_names
    }

    /// Label mapping of the training set, if its labels were reordered.
    #[must_use]
    pub fn mapping(&self) -> Option<&LabelMapping> {
        self.mapping.as_ref()
    }

    /// Return training metadata.
    #[must_use]
    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }

    /// Number of training instances.
    #[must_use]
    pub fn n_train(&self) -> usize {
        self.metadata.n_samples
    }

    /// Map a predicted label back to the original training label.
    ///
    /// Without a mapping, or for regression, the label is returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::UnknownClassCode`] when a class code has no
    /// original label.
    pub fn decode(&self, label: &Label) -> Result<Label, ForestError> {
        let Some(mapping) = &self.mapping else {
            return Ok(label.clone());
        };
        if self.config.task() == Task::Regression {
            return Ok(label.clone());
        }
        let code = match label {
            Label::Int(c) => *c,
            other => return Ok(other.clone()),
        };
        usize::try_from(code)
            .ok()
            .and_then(|c| mapping.decode(c))
            .cloned()
            .ok_or(ForestError::UnknownClassCode { code })
    }

    pub(crate) fn kernels(&self) -> &KernelTable {
        &self.kernels
    }

    /// Re-resolve kernel names after deserialization.
    pub(crate) fn resolve_kernels(&mut self, registry: &KernelRegistry) -> Result<(), ForestError> {
        self.kernels = registry.select(&self.kernel_names)?;
        Ok(())
    }
}

/// Check labels against the task before any tree is built.
fn validate_labels(config: &ForestConfig, data: &Dataset) -> Result<(), ForestError> {
    for (index, label) in data.labels().iter().enumerate() {
        let Some(label) = label else {
            return Err(ForestError::UnlabeledInstance { index });
        };
        if config.task() == Task::Regression && label.as_real().is_none() {
            return Err(ForestError::NonNumericLabel {
                index,
                label: label.to_string(),
            });
        }
    }
    Ok(())
}

/// Resolve the configured measures against what the series can support.
///
/// The default pool is narrowed to the kernels that can compare every series
/// kind present; an explicit list containing an unsupported kernel is
/// rejected.
fn select_kernels(
    config: &ForestConfig,
    data: &Dataset,
    registry: &KernelRegistry,
) -> Result<KernelTable, ForestError> {
    let table = registry.select(config.measures())?;
    let kinds = data.series_kinds();
    let (kept, dropped) = table.partition_by_support(&kinds);
    if dropped.is_empty() {
        return Ok(kept);
    }
    let kind = kinds
        .iter()
        .copied()
        .find(|k| !k.is_numeric())
        .unwrap_or(SeriesKind::Numeric);

    let defaults = config.measures().len() == DEFAULT_MEASURES.len()
        && config
            .measures()
            .iter()
            .zip(DEFAULT_MEASURES)
            .all(|(m, d)| m.trim().eq_ignore_ascii_case(d));
    if !defaults {
        return Err(ForestError::UnsupportedMeasures {
            kind,
            names: dropped,
        });
    }
    if kept.is_empty() {
        return Err(ForestError::EmptyMeasurePool);
    }
    warn!(
        %kind,
        dropped = ?dropped,
        kept = ?kept.names(),
        "default measures narrowed to kernels that support the series"
    );
    Ok(kept)
}

/// Train the Proximity Forest ensemble.
#[instrument(skip_all, fields(n_trees = config.num_trees(), n_samples = data.len()))]
pub(crate) fn train(
    config: &ForestConfig,
    data: &Dataset,
    registry: &KernelRegistry,
) -> Result<ProximityForest, ForestError> {
    // --- Validate config and inputs ---
    config.validate()?;
    if data.is_empty() {
        return Err(ForestError::EmptyDataset);
    }
    let kernels = select_kernels(config, data, registry)?;
    validate_labels(config, data)?;
    data.ensure_filled()?;

    let n_samples = data.len();
    let n_classes = data.class_histogram().len();

    info!(
        n_trees = config.num_trees(),
        n_samples,
        n_classes,
        task = %config.task(),
        purity = %config.purity(),
        measures = ?kernels.names(),
        "training proximity forest"
    );
    let start = Instant::now();

    // Generate per-tree seeds from master RNG.
    let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed());
    let tree_seeds: Vec<u64> = (0..config.num_trees()).map(|_| master_rng.r#gen()).collect();

    let trees: Vec<ProximityTree> = if config.parallel_trees() {
        tree_seeds
            .into_par_iter()
            .enumerate()
            .map(|(id, seed)| train_tree(id, data, &kernels, config, seed))
            .collect::<Result<_, _>>()?
    } else {
        tree_seeds
            .into_iter()
            .enumerate()
            .map(|(id, seed)| train_tree(id, data, &kernels, config, seed))
            .collect::<Result<_, _>>()?
    };

    debug!(n_trees_trained = trees.len(), "tree training complete");

    let elapsed = start.elapsed();
    let metadata = TrainingMetadata {
        n_trees: trees.len(),
        n_samples,
        n_classes,
        n_leaves: trees.iter().map(ProximityTree::n_leaves).sum(),
        train_time: elapsed,
    };

    info!(
        n_leaves = metadata.n_leaves,
        elapsed_ms = elapsed.as_millis() as u64,
        "proximity forest training complete"
    );

    Ok(ProximityForest {
        trees,
        config: config.clone(),
        kernel_names: kernels.names().to_vec(),
        kernels,
        mapping: data.mapping().cloned(),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{Cell, SeriesValue};

    /// Two separable classes of length-4 series.
    fn make_separable_data() -> Dataset {
        let mut labels = Vec::new();
        let mut series = Vec::new();
        for i in 0..12 {
            let x = f64::from(i) * 0.05;
            labels.push(Label::Str("low".into()));
            series.push(SeriesValue::Numeric(vec![x, 0.5, x, 0.5]));
            labels.push(Label::Str("high".into()));
            series.push(SeriesValue::Numeric(vec![10.0 - x, 9.0, 10.0, 9.0 + x]));
        }
        Dataset::labelled(labels, series).unwrap()
    }

    #[test]
    fn trains_requested_number_of_trees() {
        let data = make_separable_data();
        let forest = ForestConfig::new(7).unwrap().fit(&data).unwrap();
        assert_eq!(forest.n_trees(), 7);
        assert_eq!(forest.metadata().n_samples, data.len());
        assert_eq!(forest.kernel_names().len(), 11);
    }

    #[test]
    fn unlabeled_training_instance_is_rejected() {
        let data = Dataset::new(
            vec![Some(Label::Int(0)), None],
            vec![
                SeriesValue::Numeric(vec![0.0]),
                SeriesValue::Numeric(vec![1.0]),
            ],
        )
        .unwrap();
        let err = ForestConfig::new(2).unwrap().fit(&data).unwrap_err();
        assert!(matches!(err, ForestError::UnlabeledInstance { index: 1 }));
    }

    #[test]
    fn regression_rejects_string_labels() {
        let data = make_separable_data();
        let err = ForestConfig::new(2)
            .unwrap()
            .with_task(Task::Regression)
            .fit(&data)
            .unwrap_err();
        assert!(matches!(err, ForestError::NonNumericLabel { index: 0, .. }));
    }

    #[test]
    fn unknown_measure_fails_before_training() {
        let data = make_separable_data();
        let err = ForestConfig::new(2)
            .unwrap()
            .with_measures(["euclidean", "hamming"])
            .fit(&data)
            .unwrap_err();
        assert!(matches!(err, ForestError::UnknownMeasure { ref name } if name == "hamming"));
    }

    #[test]
    fn sequential_and_parallel_training_agree() {
        let data = make_separable_data();
        let config = ForestConfig::new(5).unwrap().with_seed(99);
        let parallel = config.fit(&data).unwrap();
        let sequential = config.clone().with_parallel_trees(false).fit(&data).unwrap();
        assert_eq!(parallel.trees(), sequential.trees());
    }

    #[test]
    fn decode_maps_codes_back() {
        let (data, mapping) = make_separable_data().reorder_labels(None);
        let forest = ForestConfig::new(3).unwrap().fit(&data).unwrap();
        assert_eq!(forest.mapping(), Some(&mapping));
        assert_eq!(
            forest.decode(&Label::Int(1)).unwrap(),
            Label::Str("high".into())
        );
        assert!(matches!(
            forest.decode(&Label::Int(5)),
            Err(ForestError::UnknownClassCode { code: 5 })
        ));
    }

    /// Twenty mixed-type rows: one numeric and one categorical column.
    fn make_mixed_data() -> Dataset {
        let mut labels = Vec::new();
        let mut series = Vec::new();
        for i in 0..10 {
            let x = f64::from(i) * 0.1;
            labels.push(Label::Int(0));
            series.push(SeriesValue::Mixed(vec![Cell::Num(x), Cell::Cat("red".into())]));
            labels.push(Label::Int(1));
            series.push(SeriesValue::Mixed(vec![Cell::Num(5.0 + x), Cell::Cat("blue".into())]));
        }
        Dataset::labelled(labels, series).unwrap()
    }

    #[test]
    fn mixed_data_narrows_default_measures() {
        let data = make_mixed_data();
        let forest = ForestConfig::new(11).unwrap().fit(&data).unwrap();
        assert_eq!(forest.kernel_names(), ["euclidean".to_owned()]);
        let result = forest.test(&data).unwrap();
        assert!(matches!(result.score(), Some(crate::result::Score::Accuracy(a)) if a > 0.9));
    }

    #[test]
    fn mixed_data_rejects_explicit_elastic_measure() {
        let data = make_mixed_data();
        let err = ForestConfig::new(3)
            .unwrap()
            .with_measures(["manhattan", "msm"])
            .fit(&data)
            .unwrap_err();
        assert!(matches!(
            err,
            ForestError::UnsupportedMeasures { kind: SeriesKind::Mixed, ref names } if names == &["msm".to_owned()]
        ));
    }

    #[test]
    fn unfilled_values_are_rejected() {
        let mut data = make_separable_data();
        data.series_mut()[3].set_numeric(0, 1, f64::NAN);
        let err = ForestConfig::new(3).unwrap().fit(&data).unwrap_err();
        assert!(matches!(err, ForestError::MissingValues { index: 3, count: 1 }));

        let mut mixed = make_mixed_data();
        mixed.series_mut()[0] = SeriesValue::Mixed(vec![Cell::Missing, Cell::Cat("red".into())]);
        let err = ForestConfig::new(3).unwrap().fit(&mixed).unwrap_err();
        assert!(matches!(err, ForestError::MissingValues { index: 0, count: 1 }));
    }

    #[test]
    fn task_seeds_differ_per_index() {
        assert_ne!(task_seed(42, 0), task_seed(42, 1));
        assert_ne!(task_seed(42, 0), 42);
    }
}
