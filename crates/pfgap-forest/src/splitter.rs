//! Split selection: draw a kernel and exemplars, route to the nearest one,
//! keep the candidate with the lowest weighted impurity.

use rand::Rng;
use tracing::debug;

use crate::config::{ForestConfig, Task};
use crate::dataset::DatasetView;
use crate::error::ForestError;
use crate::kernel::{KernelId, KernelTable};
use crate::node::Exemplar;
use crate::series::SeriesValue;
use crate::slot::DistanceSlot;

/// The kernel, parameters and exemplars of a split.
///
/// Branch `b` of the owning node collects every instance whose nearest
/// exemplar is `exemplars[b]`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SplitRule {
    slot: DistanceSlot,
    exemplars: Vec<Exemplar>,
}

impl SplitRule {
    /// The distance slot.
    #[must_use]
    pub fn slot(&self) -> &DistanceSlot {
        &self.slot
    }

    /// Exemplars in branch order.
    #[must_use]
    pub fn exemplars(&self) -> &[Exemplar] {
        &self.exemplars
    }

    /// Branch of the exemplar nearest to `query`.
    ///
    /// `query_id` is the training position of the query, if it has one; a
    /// query that is itself an exemplar goes straight to that branch.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::Kernel`] when the distance kernel fails.
    pub(crate) fn route<R: Rng>(
        &self,
        kernels: &KernelTable,
        query: &SeriesValue,
        query_id: Option<u32>,
        random_tie_break: bool,
        rng: &mut R,
    ) -> Result<usize, ForestError> {
        nearest(
            kernels,
            &self.slot,
            self.exemplars.iter().map(|e| (e.instance, &e.series)),
            query,
            query_id,
            random_tie_break,
            rng,
        )
    }
}

/// Index of the nearest candidate, with exact ties broken uniformly at
/// random when `random_tie_break` is set and by first candidate otherwise.
fn nearest<'s, R: Rng>(
    kernels: &KernelTable,
    slot: &DistanceSlot,
    candidates: impl Iterator<Item = (u32, &'s SeriesValue)>,
    query: &SeriesValue,
    query_id: Option<u32>,
    random_tie_break: bool,
    rng: &mut R,
) -> Result<usize, ForestError> {
    let mut best = f64::INFINITY;
    let mut ties: Vec<usize> = Vec::new();
    for (branch, (id, series)) in candidates.enumerate() {
        if query_id == Some(id) {
            return Ok(branch);
        }
        let d = slot.distance(kernels, query, series, best)?;
        if d < best {
            best = d;
            ties.clear();
            ties.push(branch);
        } else if d == best {
            ties.push(branch);
        }
    }
    Ok(match ties.len() {
        0 => 0,
        1 => ties[0],
        n if random_tie_break => ties[rng.gen_range(0..n)],
        _ => ties[0],
    })
}

/// Result of [`Splitter::find_best_split`].
#[derive(Debug)]
pub(crate) enum Outcome<'d> {
    /// A split whose children are all non-empty.
    Split {
        rule: SplitRule,
        children: Vec<DatasetView<'d>>,
        weighted_impurity: f64,
    },
    /// No candidate produced a usable partition.
    Reject,
}

/// Split search for one tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Splitter<'a> {
    kernels: &'a KernelTable,
    config: &'a ForestConfig,
    tree_kernel: Option<KernelId>,
}

impl<'a> Splitter<'a> {
    /// `tree_kernel` is reused by every candidate when set.
    pub(crate) fn new(
        kernels: &'a KernelTable,
        config: &'a ForestConfig,
        tree_kernel: Option<KernelId>,
    ) -> Self {
        Self {
            kernels,
            config,
            tree_kernel,
        }
    }

    /// Try `num_candidates_per_split` random splits of `sample` and keep the
    /// one with the lowest size-weighted child impurity.
    ///
    /// Candidates leaving a branch empty are discarded; ties keep the first
    /// candidate found.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::EmptySplit`] when a non-empty classification
    /// sample has no labelled entries, and [`ForestError::Kernel`] when a
    /// distance fails.
    pub(crate) fn find_best_split<'d, R: Rng>(
        &self,
        sample: &DatasetView<'d>,
        rng: &mut R,
    ) -> Result<Outcome<'d>, ForestError> {
        let data = sample.dataset();
        let series = data.series();

        // exemplar pools: one per class, or the whole sample for regression
        let pools: Vec<Vec<usize>> = match self.config.task() {
            Task::Classification => sample
                .split_by_class()?
                .into_iter()
                .map(|(_, view)| view.positions().to_vec())
                .collect(),
            Task::Regression => vec![sample.positions().to_vec()],
        };
        let n_branches = match self.config.task() {
            Task::Classification => pools.len(),
            Task::Regression => 2,
        };
        if n_branches < 2 || sample.len() < 2 {
            return Ok(Outcome::Reject);
        }

        let parent_size = sample.len() as f64;
        let mut best: Option<(f64, DistanceSlot, Vec<usize>, Vec<Vec<usize>>)> = None;

        for candidate in 0..self.config.num_candidates_per_split() {
            let kernel = match self.tree_kernel {
                Some(id) => id,
                None => self.kernels.pick(rng),
            };
            let slot = DistanceSlot::draw(self.kernels, kernel, sample, rng);

            let exemplars: Vec<usize> = match self.config.task() {
                Task::Classification => pools
                    .iter()
                    .map(|pool| pool[rng.gen_range(0..pool.len())])
                    .collect(),
                Task::Regression => {
                    let first = rng.gen_range(0..sample.len());
                    let mut second = rng.gen_range(0..sample.len() - 1);
                    if second >= first {
                        second += 1;
                    }
                    vec![sample.positions()[first], sample.positions()[second]]
                }
            };

            let mut branches: Vec<Vec<usize>> = vec![Vec::new(); exemplars.len()];
            for &p in sample.positions() {
                let branch = nearest(
                    self.kernels,
                    &slot,
                    exemplars.iter().map(|&e| (e as u32, &series[e])),
                    &series[p],
                    Some(p as u32),
                    self.config.random_tie_break(),
                    rng,
                )?;
                branches[branch].push(p);
            }

            if branches.iter().any(Vec::is_empty) {
                debug!(
                    candidate,
                    kernel = self.kernels.name(kernel),
                    "split candidate left a branch empty"
                );
                continue;
            }

            let weighted: f64 = branches
                .iter()
                .map(|b| {
                    let view = data.view_of(b.clone());
                    (b.len() as f64 / parent_size) * view.impurity(self.config.purity())
                })
                .sum();

            if best.as_ref().is_none_or(|(w, ..)| weighted < *w) {
                best = Some((weighted, slot, exemplars, branches));
            }
        }

        let Some((weighted_impurity, slot, exemplars, branches)) = best else {
            return Ok(Outcome::Reject);
        };

        let rule = SplitRule {
            slot,
            exemplars: exemplars
                .into_iter()
                .map(|e| Exemplar {
                    instance: e as u32,
                    series: series[e].clone(),
                })
                .collect(),
        };
        Ok(Outcome::Split {
            rule,
            children: branches.into_iter().map(|b| data.view_of(b)).collect(),
            weighted_impurity,
        })
    }
}
