//! A distance kernel bound to the hyper-parameters of one split.

use rand::Rng;

use crate::dataset::DatasetView;
use crate::error::ForestError;
use crate::kernel::{KernelId, KernelTable, ParamSet};
use crate::series::SeriesValue;

/// One kernel plus the parameters drawn for it.
///
/// Slots are plain data: the kernel is referenced by its [`KernelId`] and
/// resolved through the forest's [`KernelTable`] at call time, so a slot
/// serializes without the kernel itself.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DistanceSlot {
    kernel: KernelId,
    params: ParamSet,
}

impl DistanceSlot {
    /// Draw parameters for `kernel` from `sample`.
    pub(crate) fn draw<R: Rng>(
        kernels: &KernelTable,
        kernel: KernelId,
        sample: &DatasetView<'_>,
        rng: &mut R,
    ) -> Self {
        let params = match kernels.kernel(kernel) {
            Some(k) => k.random_params(sample, rng),
            None => ParamSet::None,
        };
        Self { kernel, params }
    }

    /// The kernel id.
    #[must_use]
    pub fn kernel(&self) -> KernelId {
        self.kernel
    }

    /// The drawn parameters.
    #[must_use]
    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    /// Distance from `a` to `b`, abandoning past `best_so_far`.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::Kernel`] when the kernel fails or the id does
    /// not resolve in `kernels`.
    pub fn distance(
        &self,
        kernels: &KernelTable,
        a: &SeriesValue,
        b: &SeriesValue,
        best_so_far: f64,
    ) -> Result<f64, ForestError> {
        let name = kernels.name(self.kernel);
        let kernel = kernels
            .kernel(self.kernel)
            .ok_or_else(|| ForestError::UnknownMeasure {
                name: name.to_owned(),
            })?;
        kernel
            .distance(a, b, &self.params, best_so_far)
            .map_err(|source| ForestError::Kernel {
                kernel: name.to_owned(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::dataset::Dataset;
    use crate::kernel::KernelRegistry;
    use crate::label::Label;

    #[test]
    fn slot_resolves_through_table() {
        let data = Dataset::labelled(
            vec![Label::Int(0), Label::Int(1)],
            vec![
                SeriesValue::Numeric(vec![0.0, 0.0]),
                SeriesValue::Numeric(vec![3.0, 4.0]),
            ],
        )
        .unwrap();
        let table = KernelRegistry::with_builtins().select(&["euclidean"]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let id = table.pick(&mut rng);
        let slot = DistanceSlot::draw(&table, id, &data.view(), &mut rng);
        assert_eq!(slot.params(), &ParamSet::None);
        let d = slot
            .distance(&table, &data.series()[0], &data.series()[1], f64::INFINITY)
            .unwrap();
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn kernel_failure_is_wrapped() {
        let table = KernelRegistry::with_builtins().select(&["dtw"]).unwrap();
        let slot = DistanceSlot {
            kernel: table.ids().next().unwrap(),
            params: ParamSet::None,
        };
        let err = slot
            .distance(
                &table,
                &SeriesValue::Numeric(vec![]),
                &SeriesValue::Numeric(vec![1.0]),
                f64::INFINITY,
            )
            .unwrap_err();
        assert!(matches!(err, ForestError::Kernel { ref kernel, .. } if kernel == "dtw"));
    }
}
