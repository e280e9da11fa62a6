//! Result writer for predictions, proximities, outlier scores, imputed data
//! and run summaries.

use std::fs;
use std::path::{Path, PathBuf};

use pfgap_forest::{Cell, Dataset, Label, OutlierScores, ProximityMatrix, Score, SeriesValue};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{ExperimentName, LabelColumn, ReadOptions};

/// Writes run artifacts into one output directory.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{experiment}_{artifact}.{json,csv}`.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

/// One train/test repetition, in plain values.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RepeatSummary {
    /// Zero-based repetition number.
    pub repeat: usize,
    /// Forest seed of this repetition.
    pub seed: u64,
    /// Training wall-clock time in milliseconds.
    pub train_ms: u64,
    /// Testing wall-clock time in milliseconds.
    pub test_ms: u64,
    /// Total leaves over all trees.
    pub n_leaves: usize,
    /// Accuracy or R², when the test set is labelled.
    pub score: Option<f64>,
}

/// A whole run, in plain values.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunSummary {
    /// Training file.
    pub train_file: String,
    /// Test file, if any.
    pub test_file: Option<String>,
    /// Training instances.
    pub n_train: usize,
    /// Test instances.
    pub n_test: usize,
    /// Trees per forest.
    pub n_trees: usize,
    /// `classification` or `regression`.
    pub task: String,
    /// Enabled distance measures.
    pub measures: Vec<String>,
    /// Per-repetition results.
    pub repeats: Vec<RepeatSummary>,
}

impl RunSummary {
    /// Mean score over the repetitions that have one.
    #[must_use]
    pub fn mean_score(&self) -> Option<f64> {
        let scores: Vec<f64> = self.repeats.iter().filter_map(|r| r.score).collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    fn artifact_path(&self, artifact: &str, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{artifact}.{extension}", self.experiment.as_str()))
    }

    fn write_json<T: Serialize>(&self, path: &Path, artifact: &T) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, &json).map_err(|e| IoError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write predictions to `{experiment}_predictions.json`.
    ///
    /// `truth` gives the actual label per instance when known.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all, fields(n = predictions.len()))]
    pub fn write_predictions(
        &self,
        predictions: &[Label],
        truth: Option<&[Option<Label>]>,
        score: Option<Score>,
    ) -> Result<(), IoError> {
        let path = self.artifact_path("predictions", "json");

        let entries: Vec<PredictionEntry> = predictions
            .iter()
            .enumerate()
            .map(|(index, predicted)| PredictionEntry {
                index,
                predicted: predicted.to_string(),
                actual: truth
                    .and_then(|t| t.get(index))
                    .and_then(Option::as_ref)
                    .map(ToString::to_string),
            })
            .collect();

        let artifact = PredictArtifact {
            experiment: self.experiment.as_str(),
            n_instances: predictions.len(),
            score: score.map(ScoreEntry::from),
            predictions: entries,
        };
        self.write_json(&path, &artifact)?;

        info!(path = %path.display(), "predictions written");
        Ok(())
    }

    /// Write a proximity matrix to `{experiment}_{name}_proximities.json`.
    ///
    /// Dense matrices are written as rows; sparse ones as `[row, col, value]`
    /// triples.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all, fields(name = %name, n_rows = matrix.n_rows()))]
    pub fn write_proximities(&self, name: &str, matrix: &ProximityMatrix) -> Result<(), IoError> {
        let path = self.artifact_path(&format!("{name}_proximities"), "json");

        let (rows, entries) = if matrix.is_sparse() {
            let triples: Vec<(usize, usize, f64)> = (0..matrix.n_rows())
                .flat_map(|i| matrix.row(i).into_iter().map(move |(j, v)| (i, j, v)))
                .collect();
            (None, Some(triples))
        } else {
            (Some(matrix.to_dense()), None)
        };

        let artifact = ProximityArtifact {
            experiment: self.experiment.as_str(),
            layout: if matrix.is_sparse() { "sparse" } else { "dense" },
            n_rows: matrix.n_rows(),
            n_cols: matrix.n_cols(),
            rows,
            entries,
        };
        self.write_json(&path, &artifact)?;

        info!(path = %path.display(), nnz = matrix.nnz(), "proximities written");
        Ok(())
    }

    /// Write outlier scores to `{experiment}_outliers.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_outlier_scores(&self, scores: &OutlierScores, labels: &[Option<Label>]) -> Result<(), IoError> {
        let path = self.artifact_path("outliers", "json");

        let entries: Vec<OutlierEntry> = scores
            .raw()
            .iter()
            .zip(scores.normalized())
            .enumerate()
            .map(|(index, (&raw, &normalized))| OutlierEntry {
                index,
                label: labels.get(index).and_then(Option::as_ref).map(ToString::to_string),
                raw,
                normalized,
            })
            .collect();

        let artifact = OutlierArtifact {
            experiment: self.experiment.as_str(),
            n_instances: entries.len(),
            scores: entries,
        };
        self.write_json(&path, &artifact)?;

        info!(path = %path.display(), "outlier scores written");
        Ok(())
    }

    /// Write a dataset to `{experiment}_{name}_imputed.csv`.
    ///
    /// The layout follows `options` so the file reads back with the same
    /// options. Labels are written first (or not at all for
    /// [`LabelColumn::None`]).
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteCsv`] if the file cannot be written.
    #[instrument(skip_all, fields(name = %name, n = data.len()))]
    pub fn write_imputed(&self, name: &str, data: &Dataset, options: &ReadOptions) -> Result<PathBuf, IoError> {
        let path = self.artifact_path(&format!("{name}_imputed"), "csv");
        let csv_error = |e| IoError::WriteCsv {
            path: path.clone(),
            source: e,
        };

        let separator = if options.two_d() {
            options.array_separator()
        } else {
            options.delimiter()
        };
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(separator as u8)
            .flexible(true)
            .from_path(&path)
            .map_err(csv_error)?;

        let entry = options.delimiter().to_string();
        for (label, series) in data.labels().iter().zip(data.series()) {
            let mut record: Vec<String> = Vec::new();
            let values = format_values(series, &entry, options.two_d());
            match options.label_column() {
                LabelColumn::First => {
                    record.push(label.as_ref().map(ToString::to_string).unwrap_or_default());
                    record.extend(values);
                }
                LabelColumn::Last => {
                    record.extend(values);
                    record.push(label.as_ref().map(ToString::to_string).unwrap_or_default());
                }
                LabelColumn::None => record.extend(values),
            }
            wtr.write_record(&record).map_err(csv_error)?;
        }
        wtr.flush().map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        info!(path = %path.display(), "imputed data written");
        Ok(path)
    }

    /// Write a run summary to `{experiment}_summary.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_summary(&self, summary: &RunSummary) -> Result<(), IoError> {
        let path = self.artifact_path("summary", "json");
        let artifact = SummaryArtifact {
            experiment: self.experiment.as_str(),
            mean_score: summary.mean_score(),
            summary,
        };
        self.write_json(&path, &artifact)?;

        info!(path = %path.display(), "run summary written");
        Ok(())
    }

    /// Return the path where the model binary should be saved.
    ///
    /// Computes `{output_dir}/{experiment}_model.bin` without writing anything.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.artifact_path("model", "bin")
    }
}

fn format_cell(cell: &Cell) -> String {
    match cell {
        Cell::Num(v) => v.to_string(),
        Cell::Cat(s) => s.clone(),
        Cell::Missing => String::from("NA"),
    }
}

fn format_number(v: f64) -> String {
    if v.is_nan() { String::from("NA") } else { v.to_string() }
}

/// One field per value for 1-D data; one field per row, entries joined, for 2-D data.
fn format_values(series: &SeriesValue, entry: &str, two_d: bool) -> Vec<String> {
    let rows: Vec<Vec<String>> = match series {
        SeriesValue::Numeric(v) => vec![v.iter().copied().map(format_number).collect()],
        SeriesValue::Numeric2d(rows) => rows
            .iter()
            .map(|r| r.iter().copied().map(format_number).collect())
            .collect(),
        SeriesValue::Mixed(v) => vec![v.iter().map(format_cell).collect()],
        SeriesValue::Mixed2d(rows) => rows.iter().map(|r| r.iter().map(format_cell).collect()).collect(),
    };
    if two_d {
        rows.into_iter().map(|r| r.join(entry)).collect()
    } else {
        rows.into_iter().flatten().collect()
    }
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct ScoreEntry {
    kind: &'static str,
    value: f64,
}

impl From<Score> for ScoreEntry {
    fn from(score: Score) -> Self {
        let kind = match score {
            Score::Accuracy(_) => "accuracy",
            Score::RSquared(_) => "r_squared",
        };
        Self {
            kind,
            value: score.value(),
        }
    }
}

#[derive(Serialize)]
struct PredictArtifact<'a> {
    experiment: &'a str,
    n_instances: usize,
    score: Option<ScoreEntry>,
    predictions: Vec<PredictionEntry>,
}

#[derive(Serialize)]
struct PredictionEntry {
    index: usize,
    predicted: String,
    actual: Option<String>,
}

#[derive(Serialize)]
struct ProximityArtifact<'a> {
    experiment: &'a str,
    layout: &'static str,
    n_rows: usize,
    n_cols: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entries: Option<Vec<(usize, usize, f64)>>,
}

#[derive(Serialize)]
struct OutlierArtifact<'a> {
    experiment: &'a str,
    n_instances: usize,
    scores: Vec<OutlierEntry>,
}

#[derive(Serialize)]
struct OutlierEntry {
    index: usize,
    label: Option<String>,
    raw: f64,
    normalized: f64,
}

#[derive(Serialize)]
struct SummaryArtifact<'a> {
    experiment: &'a str,
    mean_score: Option<f64>,
    #[serde(flatten)]
    summary: &'a RunSummary,
}
