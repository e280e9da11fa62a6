//! Prediction and voting for the Proximity Forest ensemble.

use std::time::Instant;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, IntoParallelRefIterator, ParallelIterator};
use tracing::{info, instrument};

use crate::config::{Task, Voting};
use crate::dataset::Dataset;
use crate::error::ForestError;
use crate::forest::{ProximityForest, task_seed};
use crate::label::Label;
use crate::result::{Score, TestResult, accuracy, r_squared};
use crate::series::SeriesValue;

/// Plurality vote with uniform random tie-break, or first-seen tie-break
/// when `random_tie_break` is off.
pub(crate) fn plurality(votes: &[Label], random_tie_break: bool, rng: &mut impl Rng) -> Option<Label> {
    let mut counts: Vec<(&Label, usize)> = Vec::new();
    for label in votes {
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, c)) => *c += 1,
            None => counts.push((label, 1)),
        }
    }
    let max = counts.iter().map(|(_, c)| *c).max()?;
    let tied: Vec<&Label> = counts
        .into_iter()
        .filter(|(_, c)| *c == max)
        .map(|(l, _)| l)
        .collect();
    let pick = if random_tie_break && tied.len() > 1 {
        rng.gen_range(0..tied.len())
    } else {
        0
    };
    Some(tied[pick].clone())
}

fn average(votes: &[Label], voting: Voting) -> Option<Label> {
    let targets: Vec<f64> = votes.iter().filter_map(Label::as_real).collect();
    voting.aggregate(&targets).map(Label::Real)
}

impl ProximityForest {
    /// Predict the label of `query` in training label space.
    ///
    /// Trees vote in parallel when `parallel_predict` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::MissingValues`] when `query` still holds NaN or
    /// a missing cell, and [`ForestError::Kernel`] when a distance fails.
    pub fn predict(&self, query: &SeriesValue) -> Result<Label, ForestError> {
        let count = query.missing_positions().len();
        if count > 0 {
            return Err(ForestError::MissingValues { index: 0, count });
        }
        self.predict_seeded(query, self.config.seed(), self.config.parallel_predict())
    }

    /// Predict with an explicit seed for tie-breaks.
    ///
    /// Each tree draws from its own generator derived from `seed`, so the
    /// result does not depend on `parallel_trees`.
    pub(crate) fn predict_seeded(
        &self,
        query: &SeriesValue,
        seed: u64,
        parallel_trees: bool,
    ) -> Result<Label, ForestError> {
        let tie = self.config.random_tie_break();
        let kernels = self.kernels();
        let vote = |tree: &crate::tree::ProximityTree| {
            let mut rng = ChaCha8Rng::seed_from_u64(task_seed(seed, tree.id() as u64));
            tree.predict(kernels, query, tie, &mut rng).cloned()
        };
        let votes: Vec<Label> = if parallel_trees {
            self.trees.par_iter().map(vote).collect::<Result<_, _>>()?
        } else {
            self.trees.iter().map(vote).collect::<Result<_, _>>()?
        };

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let label = match self.config.task() {
            Task::Classification => plurality(&votes, tie, &mut rng),
            Task::Regression => average(&votes, self.config.voting()),
        };
        label.ok_or(ForestError::EmptyDataset)
    }

    /// Predict every instance of `data` in training label space.
    ///
    /// Instances are predicted in parallel when `parallel_predict` is set;
    /// trees within one instance then vote sequentially.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::MissingValues`] for an unfilled instance and
    /// [`ForestError::Kernel`] when a distance fails.
    pub fn predict_batch(&self, data: &Dataset) -> Result<Vec<Label>, ForestError> {
        data.ensure_filled()?;
        let seed = self.config.seed();
        let series = data.series();
        let one = |i: usize| self.predict_seeded(&series[i], task_seed(seed, i as u64), false);
        if self.config.parallel_predict() {
            (0..series.len()).into_par_iter().map(one).collect()
        } else {
            (0..series.len()).map(one).collect()
        }
    }

    /// Predict every instance and score against the labels that are present.
    ///
    /// `data` must share the training label mapping (see
    /// [`Dataset::reorder_labels`]). Predictions in the result are decoded to
    /// original labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::EmptyDataset`] | `data` is empty |
    /// | [`ForestError::MissingValues`] | an instance still holds NaN or a missing cell |
    /// | [`ForestError::Kernel`] | a distance fails |
    /// | [`ForestError::UnknownClassCode`] | a prediction has no original label |
    #[instrument(skip_all, fields(n_instances = data.len()))]
    pub fn test(&self, data: &Dataset) -> Result<TestResult, ForestError> {
        if data.is_empty() {
            return Err(ForestError::EmptyDataset);
        }
        let start = Instant::now();
        let predictions = self.predict_batch(data)?;
        let truth = data.labels();
        let n_labelled = truth.iter().flatten().count();

        let (score, n_correct) = match self.config.task() {
            Task::Classification => match accuracy(&predictions, truth) {
                Some((acc, correct)) => (Some(Score::Accuracy(acc)), Some(correct)),
                None => (None, None),
            },
            Task::Regression => (r_squared(&predictions, truth).map(Score::RSquared), None),
        };

        let decoded = predictions
            .iter()
            .map(|p| self.decode(p))
            .collect::<Result<Vec<_>, _>>()?;
        let elapsed = start.elapsed();

        info!(
            n_labelled,
            score = score.map(Score::value),
            elapsed_ms = elapsed.as_millis() as u64,
            "forest test complete"
        );
        Ok(TestResult::new(decoded, score, n_labelled, n_correct, elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForestConfig;

    #[test]
    fn plurality_majority_wins() {
        let votes: Vec<Label> = [1, 2, 1, 3, 1].iter().map(|&v| Label::Int(v)).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for _ in 0..10 {
            assert_eq!(plurality(&votes, true, &mut rng), Some(Label::Int(1)));
        }
    }

    #[test]
    fn plurality_tie_is_random_or_first() {
        let votes: Vec<Label> = [4, 7].iter().map(|&v| Label::Int(v)).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut seen_seven = false;
        for _ in 0..50 {
            assert_eq!(plurality(&votes, false, &mut rng), Some(Label::Int(4)));
            seen_seven |= plurality(&votes, true, &mut rng) == Some(Label::Int(7));
        }
        assert!(seen_seven);
        assert_eq!(plurality(&[], true, &mut rng), None);
    }

    #[test]
    fn average_uses_voting_rule() {
        let votes = vec![Label::Real(1.0), Label::Real(2.0), Label::Real(6.0)];
        assert_eq!(average(&votes, Voting::Mean), Some(Label::Real(3.0)));
        assert_eq!(average(&votes, Voting::Median), Some(Label::Real(2.0)));
    }

    #[test]
    fn batch_prediction_matches_single_seeded() {
        let labels: Vec<Label> = (0..8).map(|i| Label::Int(i % 2)).collect();
        let series = (0..8)
            .map(|i| SeriesValue::Numeric(vec![f64::from(i % 2) * 4.0, f64::from(i) * 0.01]))
            .collect();
        let data = Dataset::labelled(labels, series).unwrap();
        let forest = ForestConfig::new(5)
            .unwrap()
            .with_measures(["euclidean"])
            .fit(&data)
            .unwrap();
        let batch = forest.predict_batch(&data).unwrap();
        let seed = forest.config().seed();
        for (i, s) in data.series().iter().enumerate() {
            let single = forest.predict_seeded(s, task_seed(seed, i as u64), true).unwrap();
            assert_eq!(batch[i], single);
        }
        let result = forest.test(&data).unwrap();
        assert_eq!(result.score(), Some(Score::Accuracy(1.0)));
        assert_eq!(result.n_labelled(), 8);
    }

    #[test]
    fn unfilled_queries_are_rejected() {
        let labels: Vec<Label> = (0..6).map(|i| Label::Int(i % 2)).collect();
        let series = (0..6)
            .map(|i| SeriesValue::Numeric(vec![f64::from(i % 2) * 4.0, 1.0]))
            .collect();
        let data = Dataset::labelled(labels, series).unwrap();
        let forest = ForestConfig::new(3).unwrap().fit(&data).unwrap();

        let gappy = SeriesValue::Numeric(vec![f64::NAN, 1.0]);
        assert!(matches!(
            forest.predict(&gappy),
            Err(ForestError::MissingValues { index: 0, count: 1 })
        ));
        let test = Dataset::new(vec![None, None], vec![SeriesValue::Numeric(vec![4.0, 1.0]), gappy]).unwrap();
        assert!(matches!(
            forest.test(&test),
            Err(ForestError::MissingValues { index: 1, count: 1 })
        ));
    }
}
