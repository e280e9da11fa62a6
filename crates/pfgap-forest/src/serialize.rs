//! Binary model files: a versioned bincode header around the forest.
//!
//! Kernels are not stored. A loaded forest looks its distance names up in a
//! [`KernelRegistry`], so a model trained with a user kernel loads only where
//! that kernel is registered again.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::ForestError;
use crate::forest::ProximityForest;
use crate::kernel::KernelRegistry;

const FORMAT_VERSION: u32 = 1;

#[derive(serde::Serialize, serde::Deserialize)]
struct ModelFile {
    format_version: u32,
    n_trees: usize,
    n_train: usize,
    forest: ProximityForest,
}

impl ModelFile {
    /// Check the header against the decoded forest.
    fn check(&self, path: &Path) -> Result<(), ForestError> {
        if self.format_version != FORMAT_VERSION {
            return Err(ForestError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: self.format_version,
                path: path.to_path_buf(),
            });
        }
        if self.forest.n_trees() != self.n_trees {
            return Err(ForestError::LengthMismatch {
                what: "stored trees",
                expected: self.n_trees,
                got: self.forest.n_trees(),
            });
        }
        Ok(())
    }
}

impl ProximityForest {
    /// Write the forest to `path`.
    ///
    /// The label mapping and config travel with the trees.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::SerializeModel`] | bincode encoding failed |
    /// | [`ForestError::WriteModel`] | file write failed |
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ForestError> {
        let path = path.as_ref();
        let file = ModelFile {
            format_version: FORMAT_VERSION,
            n_trees: self.n_trees(),
            n_train: self.n_train(),
            forest: self.clone(),
        };
        let bytes = bincode::serialize(&file).map_err(|source| ForestError::SerializeModel { source })?;
        std::fs::write(path, &bytes).map_err(|source| ForestError::WriteModel {
            path: path.to_path_buf(),
            source,
        })?;
        info!(size_bytes = bytes.len(), n_trees = file.n_trees, "model saved");
        Ok(())
    }

    /// Read a forest from `path` and resolve its distance names through
    /// `registry`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::ReadModel`] | file read failed |
    /// | [`ForestError::DeserializeModel`] | bincode decoding failed |
    /// | [`ForestError::IncompatibleModelVersion`] | format version mismatch |
    /// | [`ForestError::LengthMismatch`] | header tree count disagrees with the trees |
    /// | [`ForestError::UnknownMeasure`] | a stored distance name is not registered |
    #[instrument(skip(registry), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>, registry: &KernelRegistry) -> Result<Self, ForestError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ForestError::ReadModel {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ModelFile =
            bincode::deserialize(&bytes).map_err(|source| ForestError::DeserializeModel {
                path: path.to_path_buf(),
                source,
            })?;
        file.check(path)?;

        let mut forest = file.forest;
        forest.resolve_kernels(registry)?;
        debug!(
            n_trees = file.n_trees,
            n_train = file.n_train,
            kernels = ?forest.kernel_names(),
            "model loaded"
        );
        Ok(forest)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::ForestConfig;
    use crate::dataset::Dataset;
    use crate::label::Label;
    use crate::proximity::ProximityConfig;
    use crate::series::SeriesValue;

    fn train_simple_model() -> (ProximityForest, Dataset) {
        let labels = ["low", "low", "low", "high", "high", "high"]
            .into_iter()
            .map(|l| Label::Str(l.into()))
            .collect();
        let series = vec![
            SeriesValue::Numeric(vec![1.0, 0.0, 1.0]),
            SeriesValue::Numeric(vec![2.0, 0.0, 2.0]),
            SeriesValue::Numeric(vec![3.0, 0.0, 1.0]),
            SeriesValue::Numeric(vec![10.0, 9.0, 10.0]),
            SeriesValue::Numeric(vec![11.0, 9.0, 12.0]),
            SeriesValue::Numeric(vec![12.0, 9.0, 11.0]),
        ];
        let (data, _) = Dataset::labelled(labels, series).unwrap().reorder_labels(None);
        let forest = ForestConfig::new(5)
            .unwrap()
            .with_measures(["euclidean", "dtw", "msm"])
            .with_seed(42)
            .fit(&data)
            .unwrap();
        (forest, data)
    }

    fn write_file(dir: &TempDir, file: &ModelFile) -> std::path::PathBuf {
        let path = dir.path().join("crafted.bin");
        std::fs::write(&path, bincode::serialize(file).unwrap()).unwrap();
        path
    }

    #[test]
    fn loaded_forest_routes_like_the_original() {
        let dir = TempDir::new().unwrap();
        let model_path = dir.path().join("model.bin");
        let (forest, data) = train_simple_model();
        forest.save(&model_path).unwrap();
        let loaded = ProximityForest::load(&model_path, &KernelRegistry::with_builtins()).unwrap();

        assert_eq!(loaded.trees(), forest.trees());
        assert_eq!(loaded.kernel_names(), forest.kernel_names());
        assert_eq!(loaded.mapping(), forest.mapping());

        for sample in [
            SeriesValue::Numeric(vec![1.5, 0.0, 1.0]),
            SeriesValue::Numeric(vec![11.0, 9.0, 11.0]),
            SeriesValue::Numeric(vec![5.0, 4.0, 5.0]),
        ] {
            assert_eq!(
                forest.predict(&sample).unwrap(),
                loaded.predict(&sample).unwrap(),
                "{sample:?}"
            );
        }

        let config = ProximityConfig::new().with_sparse(false);
        assert_eq!(
            forest.train_proximities(&config).unwrap(),
            loaded.train_proximities(&config).unwrap()
        );
        assert_eq!(
            forest.test(&data).unwrap().predictions(),
            loaded.test(&data).unwrap().predictions()
        );
    }

    #[test]
    fn unregistered_kernel_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let model_path = dir.path().join("model.bin");
        let (forest, _) = train_simple_model();
        forest.save(&model_path).unwrap();

        let err = ProximityForest::load(&model_path, &KernelRegistry::empty()).unwrap_err();
        assert!(matches!(err, ForestError::UnknownMeasure { .. }));
    }

    #[test]
    fn header_is_checked() {
        let dir = TempDir::new().unwrap();
        let (forest, _) = train_simple_model();
        let registry = KernelRegistry::with_builtins();

        let future = ModelFile {
            format_version: FORMAT_VERSION + 1,
            n_trees: forest.n_trees(),
            n_train: forest.n_train(),
            forest: forest.clone(),
        };
        let err = ProximityForest::load(write_file(&dir, &future), &registry).unwrap_err();
        assert!(matches!(err, ForestError::IncompatibleModelVersion { found: 2, .. }));

        let truncated = ModelFile {
            format_version: FORMAT_VERSION,
            n_trees: forest.n_trees() + 1,
            n_train: forest.n_train(),
            forest,
        };
        let err = ProximityForest::load(write_file(&dir, &truncated), &registry).unwrap_err();
        assert!(matches!(err, ForestError::LengthMismatch { what: "stored trees", .. }));
    }

    #[test]
    fn unreadable_files_are_reported() {
        let err = ProximityForest::load(
            "/tmp/nonexistent_pfgap_model_abc123.bin",
            &KernelRegistry::with_builtins(),
        )
        .unwrap_err();
        assert!(matches!(err, ForestError::ReadModel { .. }));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.bin");
        std::fs::write(&path, b"not a model").unwrap();
        let err = ProximityForest::load(&path, &KernelRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, ForestError::DeserializeModel { .. }));
    }
}
