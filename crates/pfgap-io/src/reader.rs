//! Delimited dataset reader with missing-value detection.

use std::path::{Path, PathBuf};

use pfgap_forest::{Cell, Dataset, Label, MissingIndex, SeriesValue};
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{LabelColumn, ReadOptions};

/// Reads a labelled series dataset from a delimited file.
///
/// Each row is one instance. The label sits in the first or last field, or
/// in a separate one-label-per-line file. Missing tokens become NaN for
/// numeric data and [`Cell::Missing`] for mixed data, and the returned
/// dataset carries the [`MissingIndex`] of those slots.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | A file doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed delimited record |
/// | [`IoError::EmptyDataset`] | Zero data rows |
/// | [`IoError::EmptyRow`] | A row holds no values |
/// | [`IoError::MissingLabel`] | A label cell is empty |
/// | [`IoError::InvalidValue`] | A numeric cell does not parse |
/// | [`IoError::NonFiniteValue`] | A numeric cell is infinite |
/// | [`IoError::LabelCountMismatch`] | The label file has the wrong length |
pub struct DatasetReader {
    path: PathBuf,
    label_path: Option<PathBuf>,
    options: ReadOptions,
}

impl DatasetReader {
    /// Create a reader for the given file with default options.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            label_path: None,
            options: ReadOptions::default(),
        }
    }

    /// Use `options` for parsing. Separators must be ASCII.
    #[must_use]
    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    /// Read labels from a separate one-per-line file.
    #[must_use]
    pub fn with_label_file(mut self, path: &Path) -> Self {
        self.label_path = Some(path.to_path_buf());
        self
    }

    /// Read and validate the file, returning a [`Dataset`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Dataset, IoError> {
        let opts = &self.options;
        let separator = if opts.two_d() { opts.array_separator() } else { opts.delimiter() };
        let mut rdr = self.open(&self.path, separator)?;

        let label_column = if self.label_path.is_some() {
            LabelColumn::None
        } else {
            opts.label_column()
        };

        let mut labels: Vec<Option<Label>> = Vec::new();
        let mut series = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(&self.path, e))?;
            let fields: Vec<&str> = record.iter().collect();
            let (label, values) = match label_column {
                LabelColumn::First => match fields.split_first() {
                    Some((l, rest)) => (Some(*l), rest),
                    None => (None, &fields[..]),
                },
                LabelColumn::Last => match fields.split_last() {
                    Some((l, rest)) => (Some(*l), rest),
                    None => (None, &fields[..]),
                },
                LabelColumn::None => (None, &fields[..]),
            };
            if values.is_empty() {
                return Err(IoError::EmptyRow {
                    path: self.path.clone(),
                    row_index,
                });
            }
            if label_column != LabelColumn::None {
                let token = label.unwrap_or("");
                if token.trim().is_empty() {
                    return Err(IoError::MissingLabel {
                        path: self.path.clone(),
                        row_index,
                    });
                }
                labels.push(Some(Label::parse(token)));
            } else {
                labels.push(None);
            }
            series.push(self.parse_series(values, row_index)?);
        }

        if series.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        if let Some(label_path) = &self.label_path {
            labels = self.read_labels(label_path, series.len())?;
        }

        let missing = MissingIndex::detect(&series);
        let n_missing = missing.count();
        let kind = series[0].kind();
        let n_instances = series.len();
        let dataset_error = |source| IoError::Dataset {
            path: self.path.clone(),
            source,
        };
        let mut dataset = Dataset::new(labels, series).map_err(dataset_error)?;
        if n_missing > 0 {
            dataset = dataset.with_missing(missing).map_err(dataset_error)?;
        }

        info!(n_instances, n_missing, kind = %kind, "dataset loaded");
        Ok(dataset)
    }

    fn open(&self, path: &Path, separator: char) -> Result<csv::Reader<std::fs::File>, IoError> {
        let file = std::fs::File::open(path).map_err(|e| IoError::FileNotFound {
            path: path.to_path_buf(),
            source: e,
        })?;
        // Rows may differ in length; validation happens per row.
        Ok(csv::ReaderBuilder::new()
            .has_headers(self.options.has_header())
            .delimiter(separator as u8)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file))
    }

    fn csv_error(&self, path: &Path, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: path.to_path_buf(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }

    fn read_labels(&self, path: &Path, expected: usize) -> Result<Vec<Option<Label>>, IoError> {
        let mut rdr = self.open(path, ',')?;
        let mut labels = Vec::with_capacity(expected);
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(path, e))?;
            let token = record.get(0).unwrap_or("");
            if token.is_empty() {
                return Err(IoError::MissingLabel {
                    path: path.to_path_buf(),
                    row_index,
                });
            }
            labels.push(Some(Label::parse(token)));
        }
        if labels.len() != expected {
            return Err(IoError::LabelCountMismatch {
                path: path.to_path_buf(),
                expected,
                got: labels.len(),
            });
        }
        debug!(n_labels = labels.len(), "label file read");
        Ok(labels)
    }

    fn parse_series(&self, fields: &[&str], row_index: usize) -> Result<SeriesValue, IoError> {
        let opts = &self.options;
        if opts.two_d() {
            let entry = opts.delimiter();
            let mut col_offset = 0;
            if opts.numeric() {
                let mut rows = Vec::with_capacity(fields.len());
                for channel in fields {
                    let tokens: Vec<&str> = channel.split(entry).collect();
                    rows.push(self.parse_numeric(&tokens, row_index, col_offset)?);
                    col_offset += tokens.len();
                }
                Ok(SeriesValue::Numeric2d(rows))
            } else {
                let mut rows = Vec::with_capacity(fields.len());
                for channel in fields {
                    let tokens: Vec<&str> = channel.split(entry).collect();
                    rows.push(self.parse_mixed(&tokens));
                }
                Ok(SeriesValue::Mixed2d(rows))
            }
        } else if opts.numeric() {
            Ok(SeriesValue::Numeric(self.parse_numeric(fields, row_index, 0)?))
        } else {
            Ok(SeriesValue::Mixed(self.parse_mixed(fields)))
        }
    }

    fn parse_numeric(&self, tokens: &[&str], row_index: usize, col_offset: usize) -> Result<Vec<f64>, IoError> {
        let mut values = Vec::with_capacity(tokens.len());
        for (k, raw) in tokens.iter().enumerate() {
            let token = raw.trim();
            if self.options.is_missing(token) {
                values.push(f64::NAN);
                continue;
            }
            let value: f64 = token.parse().map_err(|_| IoError::InvalidValue {
                path: self.path.clone(),
                row_index,
                col_index: col_offset + k,
                raw: token.to_string(),
            })?;
            if value.is_infinite() {
                return Err(IoError::NonFiniteValue {
                    path: self.path.clone(),
                    row_index,
                    col_index: col_offset + k,
                    raw: token.to_string(),
                });
            }
            values.push(value);
        }
        Ok(values)
    }

    fn parse_mixed(&self, tokens: &[&str]) -> Vec<Cell> {
        tokens
            .iter()
            .map(|raw| {
                let token = raw.trim();
                if self.options.is_missing(token) {
                    return Cell::Missing;
                }
                match token.parse::<f64>() {
                    Ok(v) if v.is_finite() => Cell::Num(v),
                    _ => Cell::Cat(token.to_string()),
                }
            })
            .collect()
    }
}
