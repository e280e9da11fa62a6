//! Training and test result types.

use std::time::Duration;

use crate::label::Label;

/// Metadata about the training run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrainingMetadata {
    /// Number of trees trained.
    pub n_trees: usize,
    /// Number of training instances.
    pub n_samples: usize,
    /// Number of distinct training labels.
    pub n_classes: usize,
    /// Leaves summed over all trees.
    pub n_leaves: usize,
    /// Wall-clock training time.
    pub train_time: Duration,
}

/// Quality of a set of predictions against ground truth.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Score {
    /// Fraction of labelled instances predicted correctly.
    Accuracy(f64),
    /// Coefficient of determination `1 - SS_res / SS_tot`.
    RSquared(f64),
}

impl Score {
    /// The raw score value.
    #[must_use]
    pub fn value(self) -> f64 {
        match self {
            Self::Accuracy(v) | Self::RSquared(v) => v,
        }
    }
}

/// Accuracy of `predictions` over positions where `truth` is present.
///
/// `None` when no instance is labelled.
pub(crate) fn accuracy(predictions: &[Label], truth: &[Option<Label>]) -> Option<(f64, usize)> {
    let mut labelled = 0usize;
    let mut correct = 0usize;
    for (p, t) in predictions.iter().zip(truth) {
        let Some(t) = t else { continue };
        labelled += 1;
        if p == t {
            correct += 1;
        }
    }
    (labelled > 0).then(|| (correct as f64 / labelled as f64, correct))
}

/// R² of `predictions` over positions where `truth` is present and numeric.
///
/// A constant target gives 1.0 for a perfect fit and 0.0 otherwise. `None`
/// when no instance has a numeric label.
pub(crate) fn r_squared(predictions: &[Label], truth: &[Option<Label>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = predictions
        .iter()
        .zip(truth)
        .filter_map(|(p, t)| Some((p.as_real()?, t.as_ref()?.as_real()?)))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    let mean = pairs.iter().map(|(_, y)| y).sum::<f64>() / pairs.len() as f64;
    let ss_res: f64 = pairs.iter().map(|(p, y)| (y - p).powi(2)).sum();
    let ss_tot: f64 = pairs.iter().map(|(_, y)| (y - mean).powi(2)).sum();
    Some(if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    })
}

/// Result of testing a forest on a dataset.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TestResult {
    predictions: Vec<Label>,
    score: Option<Score>,
    n_labelled: usize,
    n_correct: Option<usize>,
    test_time: Duration,
}

impl TestResult {
    pub(crate) fn new(
        predictions: Vec<Label>,
        score: Option<Score>,
        n_labelled: usize,
        n_correct: Option<usize>,
        test_time: Duration,
    ) -> Self {
        Self {
            predictions,
            score,
            n_labelled,
            n_correct,
            test_time,
        }
    }

    /// Predictions in original label space, one per instance.
    #[must_use]
    pub fn predictions(&self) -> &[Label] {
        &self.predictions
    }

    /// Accuracy or R², when any instance was labelled.
    #[must_use]
    pub fn score(&self) -> Option<Score> {
        self.score
    }

    /// Number of labelled instances scored.
    #[must_use]
    pub fn n_labelled(&self) -> usize {
        self.n_labelled
    }

    /// Number of correct predictions, for classification.
    #[must_use]
    pub fn n_correct(&self) -> Option<usize> {
        self.n_correct
    }

    /// Wall-clock prediction time.
    #[must_use]
    pub fn test_time(&self) -> Duration {
        self.test_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_skips_unlabelled() {
        let preds = vec![Label::Int(0), Label::Int(1), Label::Int(1)];
        let truth = vec![Some(Label::Int(0)), None, Some(Label::Int(0))];
        assert_eq!(accuracy(&preds, &truth), Some((0.5, 1)));
        assert_eq!(accuracy(&preds, &[None, None, None]), None);
    }

    #[test]
    fn r_squared_perfect_and_mean() {
        let truth: Vec<Option<Label>> = [1.0, 2.0, 3.0].iter().map(|&v| Some(Label::Real(v))).collect();
        let perfect: Vec<Label> = [1.0, 2.0, 3.0].iter().map(|&v| Label::Real(v)).collect();
        assert_eq!(r_squared(&perfect, &truth), Some(1.0));
        let mean = vec![Label::Real(2.0); 3];
        assert_eq!(r_squared(&mean, &truth), Some(0.0));
    }

    #[test]
    fn r_squared_constant_target() {
        let truth = vec![Some(Label::Real(4.0)); 2];
        assert_eq!(r_squared(&[Label::Real(4.0), Label::Real(4.0)], &truth), Some(1.0));
        assert_eq!(r_squared(&[Label::Real(3.0), Label::Real(4.0)], &truth), Some(0.0));
    }
}
