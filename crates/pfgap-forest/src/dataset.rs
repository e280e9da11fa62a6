//! The dataset store and borrowed index views over it.

use rand::Rng;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::error::ForestError;
use crate::label::{Label, LabelMapping};
use crate::purity::PurityMeasure;
use crate::series::{MissingIndex, SeriesKind, SeriesValue};

/// One instance borrowed from a [`Dataset`].
#[derive(Debug, Clone, Copy)]
pub struct Instance<'a> {
    /// Label, absent for unlabeled test data.
    pub label: Option<&'a Label>,
    /// The series payload.
    pub series: &'a SeriesValue,
    /// Position of the instance in the file it was loaded from.
    pub original_index: u32,
}

/// Parallel-array store of labelled series.
///
/// Labels, series and original indices always have equal length, and the
/// class histogram always matches the labels. Only the imputers (through
/// [`series_mut`][Dataset::series_mut]) and [`shuffle`][Dataset::shuffle]
/// mutate a dataset in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    labels: Vec<Option<Label>>,
    series: Vec<SeriesValue>,
    indices: Vec<u32>,
    histogram: Vec<(Label, usize)>,
    mapping: Option<LabelMapping>,
    missing: Option<MissingIndex>,
}

impl Dataset {
    /// Build a dataset; original indices are the positions `0..n`.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::LengthMismatch`] when the arrays differ in length.
    pub fn new(labels: Vec<Option<Label>>, series: Vec<SeriesValue>) -> Result<Self, ForestError> {
        if labels.len() != series.len() {
            return Err(ForestError::LengthMismatch {
                what: "labels",
                expected: series.len(),
                got: labels.len(),
            });
        }
        let indices = (0..series.len() as u32).collect();
        let histogram = histogram(&labels);
        Ok(Self {
            labels,
            series,
            indices,
            histogram,
            mapping: None,
            missing: None,
        })
    }

    /// Build a fully labelled dataset.
    ///
    /// # Errors
    ///
    /// Same as [`new`][Dataset::new].
    pub fn labelled(labels: Vec<Label>, series: Vec<SeriesValue>) -> Result<Self, ForestError> {
        Self::new(labels.into_iter().map(Some).collect(), series)
    }

    /// Attach the index of originally-missing slots.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::LengthMismatch`] when the index covers a
    /// different number of instances.
    pub fn with_missing(mut self, missing: MissingIndex) -> Result<Self, ForestError> {
        if missing.len() != self.len() {
            return Err(ForestError::LengthMismatch {
                what: "missing index",
                expected: self.len(),
                got: missing.len(),
            });
        }
        self.missing = Some(missing);
        Ok(self)
    }

    // --- Accessors ---

    /// Number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether the dataset holds no instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// The instance at position `i`.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<Instance<'_>> {
        Some(Instance {
            label: self.labels.get(i)?.as_ref(),
            series: self.series.get(i)?,
            original_index: *self.indices.get(i)?,
        })
    }

    /// Label of instance `i`, if present.
    #[must_use]
    pub fn label(&self, i: usize) -> Option<&Label> {
        self.labels.get(i).and_then(Option::as_ref)
    }

    /// All labels.
    #[must_use]
    pub fn labels(&self) -> &[Option<Label>] {
        &self.labels
    }

    /// All series.
    #[must_use]
    pub fn series(&self) -> &[SeriesValue] {
        &self.series
    }

    /// Mutable series, for imputers replacing missing slots in place.
    pub fn series_mut(&mut self) -> &mut [SeriesValue] {
        &mut self.series
    }

    /// Original file positions.
    #[must_use]
    pub fn original_indices(&self) -> &[u32] {
        &self.indices
    }

    /// Label counts in first-seen order.
    #[must_use]
    pub fn class_histogram(&self) -> &[(Label, usize)] {
        &self.histogram
    }

    /// The class mapping, once [`reorder_labels`][Dataset::reorder_labels] ran.
    #[must_use]
    pub fn mapping(&self) -> Option<&LabelMapping> {
        self.mapping.as_ref()
    }

    /// The index of originally-missing slots.
    #[must_use]
    pub fn missing(&self) -> Option<&MissingIndex> {
        self.missing.as_ref()
    }

    /// Distinct series kinds, in first-seen order.
    #[must_use]
    pub fn series_kinds(&self) -> Vec<SeriesKind> {
        let mut kinds = Vec::new();
        for s in &self.series {
            let kind = s.kind();
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// Whether any slot still holds NaN or a missing cell.
    #[must_use]
    pub fn has_unfilled(&self) -> bool {
        self.series.iter().any(|s| !s.missing_positions().is_empty())
    }

    /// Fail on the first instance that still holds NaN or a missing cell.
    ///
    /// The [`missing`][Dataset::missing] index records where values were
    /// originally absent; this checks the values themselves.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::MissingValues`] for the first unfilled instance.
    pub fn ensure_filled(&self) -> Result<(), ForestError> {
        for (index, s) in self.series.iter().enumerate() {
            let count = s.missing_positions().len();
            if count > 0 {
                return Err(ForestError::MissingValues { index, count });
            }
        }
        Ok(())
    }

    /// Whether every instance carries a label.
    #[must_use]
    pub fn is_fully_labelled(&self) -> bool {
        self.labels.iter().all(Option::is_some)
    }

    /// A view over every instance.
    #[must_use]
    pub fn view(&self) -> DatasetView<'_> {
        DatasetView {
            data: self,
            positions: (0..self.len()).collect(),
        }
    }

    /// A view over the given positions, which may repeat.
    #[must_use]
    pub fn view_of(&self, positions: Vec<usize>) -> DatasetView<'_> {
        DatasetView {
            data: self,
            positions,
        }
    }

    // --- Operations ---

    /// Impurity of the whole dataset under `measure`.
    #[must_use]
    pub fn impurity(&self, measure: PurityMeasure) -> f64 {
        measure.impurity(self.labels.iter().flatten())
    }

    /// Copy of this dataset with labels replaced by contiguous class codes.
    ///
    /// Codes follow first-seen order. Passing the training mapping when
    /// reordering a test set keeps codes shared; labels the training set never
    /// saw receive new codes past the end.
    #[must_use]
    pub fn reorder_labels(&self, existing: Option<&LabelMapping>) -> (Dataset, LabelMapping) {
        let mut mapping = existing.cloned().unwrap_or_default();
        let labels: Vec<Option<Label>> = self
            .labels
            .iter()
            .map(|l| {
                l.as_ref()
                    .map(|l| Label::Int(mapping.encode_or_insert(l) as i64))
            })
            .collect();
        let reordered = Dataset {
            histogram: histogram(&labels),
            labels,
            series: self.series.clone(),
            indices: self.indices.clone(),
            mapping: Some(mapping.clone()),
            missing: self.missing.clone(),
        };
        (reordered, mapping)
    }

    /// Apply a full random permutation to every parallel array.
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(&mut rng);

        self.labels = order.iter().map(|&i| self.labels[i].take()).collect();
        self.series = order
            .iter()
            .map(|&i| std::mem::replace(&mut self.series[i], SeriesValue::Numeric(Vec::new())))
            .collect();
        self.indices = order.iter().map(|&i| self.indices[i]).collect();
        if let Some(missing) = self.missing.as_mut() {
            missing.permute(&order);
        }
        self.histogram = histogram(&self.labels);
    }

    /// Draw `n` positions uniformly with replacement.
    pub fn sample_with_replacement(&self, n: usize, rng: &mut impl Rng) -> Vec<usize> {
        let len = self.len();
        if len == 0 {
            return Vec::new();
        }
        (0..n).map(|_| rng.gen_range(0..len)).collect()
    }
}

fn histogram(labels: &[Option<Label>]) -> Vec<(Label, usize)> {
    let mut counts: Vec<(Label, usize)> = Vec::new();
    for label in labels.iter().flatten() {
        match counts.iter_mut().find(|(l, _)| l == label) {
            Some((_, c)) => *c += 1,
            None => counts.push((label.clone(), 1)),
        }
    }
    counts
}

/// A borrowed multiset of dataset positions.
///
/// Node samples are views: positions may repeat (bootstrap draws) and no
/// series is copied.
#[derive(Debug, Clone)]
pub struct DatasetView<'a> {
    data: &'a Dataset,
    positions: Vec<usize>,
}

impl<'a> DatasetView<'a> {
    /// Number of entries, counting repeats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The underlying dataset.
    #[must_use]
    pub fn dataset(&self) -> &'a Dataset {
        self.data
    }

    /// Dataset positions in view order.
    #[must_use]
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Entry `k` of the view.
    #[must_use]
    pub fn get(&self, k: usize) -> Option<Instance<'a>> {
        self.positions.get(k).and_then(|&p| self.data.get(p))
    }

    /// Labels of the entries, skipping unlabeled ones.
    pub fn labels(&self) -> impl Iterator<Item = &'a Label> + '_ {
        self.positions.iter().filter_map(|&p| self.data.label(p))
    }

    /// Impurity of the entries' labels under `measure`.
    #[must_use]
    pub fn impurity(&self, measure: PurityMeasure) -> f64 {
        measure.impurity(self.labels())
    }

    /// Partition by label, in first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::EmptySplit`] when a non-empty view yields no
    /// partitions, which only happens when no entry is labelled.
    pub fn split_by_class(&self) -> Result<Vec<(Label, DatasetView<'a>)>, ForestError> {
        let mut groups: Vec<(Label, DatasetView<'a>)> = Vec::new();
        for &p in &self.positions {
            let Some(label) = self.data.label(p) else {
                continue;
            };
            match groups.iter_mut().find(|(l, _)| l == label) {
                Some((_, view)) => view.positions.push(p),
                None => groups.push((label.clone(), self.data.view_of(vec![p]))),
            }
        }
        if groups.is_empty() && !self.is_empty() {
            return Err(ForestError::EmptySplit { size: self.len() });
        }
        Ok(groups)
    }
}
