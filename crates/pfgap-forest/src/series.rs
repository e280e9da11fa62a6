//! Series values and the index of their missing slots.

use std::fmt;

/// One slot of a mixed-type series.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Cell {
    /// A numeric value.
    Num(f64),
    /// A categorical value.
    Cat(String),
    /// A missing value.
    Missing,
}

impl Cell {
    /// Whether the slot holds no value.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(v) => write!(f, "{v}"),
            Self::Cat(s) => f.write_str(s),
            Self::Missing => f.write_str("NaN"),
        }
    }
}

/// Shape of a [`SeriesValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    /// 1-D numeric.
    Numeric,
    /// 2-D numeric (rows of equal or unequal length).
    Numeric2d,
    /// 1-D mixed-type.
    Mixed,
    /// 2-D mixed-type.
    Mixed2d,
}

impl SeriesKind {
    /// Whether every slot is a float.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Numeric | Self::Numeric2d)
    }

    /// Whether the series has rows.
    #[must_use]
    pub fn is_2d(self) -> bool {
        matches!(self, Self::Numeric2d | Self::Mixed2d)
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Numeric => "numeric",
            Self::Numeric2d => "numeric 2-D",
            Self::Mixed => "mixed",
            Self::Mixed2d => "mixed 2-D",
        };
        f.write_str(name)
    }
}

/// The payload of one instance.
///
/// Numeric series mark missing slots with NaN until an imputer fills them;
/// the [`MissingIndex`] remains the record of which slots were missing.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SeriesValue {
    /// 1-D numeric series.
    Numeric(Vec<f64>),
    /// 2-D numeric series, one inner vector per row (channel).
    Numeric2d(Vec<Vec<f64>>),
    /// 1-D mixed-type row.
    Mixed(Vec<Cell>),
    /// 2-D mixed-type rows.
    Mixed2d(Vec<Vec<Cell>>),
}

impl SeriesValue {
    /// Shape of this value.
    #[must_use]
    pub fn kind(&self) -> SeriesKind {
        match self {
            Self::Numeric(_) => SeriesKind::Numeric,
            Self::Numeric2d(_) => SeriesKind::Numeric2d,
            Self::Mixed(_) => SeriesKind::Mixed,
            Self::Mixed2d(_) => SeriesKind::Mixed2d,
        }
    }

    /// Number of rows; 1 for 1-D values.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        match self {
            Self::Numeric(_) | Self::Mixed(_) => 1,
            Self::Numeric2d(rows) => rows.len(),
            Self::Mixed2d(rows) => rows.len(),
        }
    }

    /// Length of row `row`, or 0 when it does not exist.
    #[must_use]
    pub fn row_len(&self, row: usize) -> usize {
        match self {
            Self::Numeric(v) if row == 0 => v.len(),
            Self::Mixed(v) if row == 0 => v.len(),
            Self::Numeric2d(rows) => rows.get(row).map_or(0, Vec::len),
            Self::Mixed2d(rows) => rows.get(row).map_or(0, Vec::len),
            _ => 0,
        }
    }

    /// Numeric rows as slices, `None` for mixed-type values.
    #[must_use]
    pub fn numeric_rows(&self) -> Option<Vec<&[f64]>> {
        match self {
            Self::Numeric(v) => Some(vec![v.as_slice()]),
            Self::Numeric2d(rows) => Some(rows.iter().map(Vec::as_slice).collect()),
            _ => None,
        }
    }

    /// Mixed-type rows as slices, `None` for numeric values.
    #[must_use]
    pub fn cell_rows(&self) -> Option<Vec<&[Cell]>> {
        match self {
            Self::Mixed(v) => Some(vec![v.as_slice()]),
            Self::Mixed2d(rows) => Some(rows.iter().map(Vec::as_slice).collect()),
            _ => None,
        }
    }

    /// The numeric value at `(row, col)`, `None` when absent, missing or categorical.
    #[must_use]
    pub fn numeric_at(&self, row: usize, col: usize) -> Option<f64> {
        let value = match self {
            Self::Numeric(v) if row == 0 => v.get(col).copied(),
            Self::Numeric2d(rows) => rows.get(row).and_then(|r| r.get(col)).copied(),
            Self::Mixed(_) | Self::Mixed2d(_) => match self.cell_at(row, col) {
                Some(Cell::Num(v)) => Some(*v),
                _ => None,
            },
            _ => None,
        };
        value.filter(|v| !v.is_nan())
    }

    /// The mixed-type cell at `(row, col)`.
    #[must_use]
    pub fn cell_at(&self, row: usize, col: usize) -> Option<&Cell> {
        match self {
            Self::Mixed(v) if row == 0 => v.get(col),
            Self::Mixed2d(rows) => rows.get(row).and_then(|r| r.get(col)),
            _ => None,
        }
    }

    /// Overwrite a numeric slot. Out-of-range positions are ignored.
    pub fn set_numeric(&mut self, row: usize, col: usize, value: f64) {
        match self {
            Self::Numeric(v) if row == 0 => {
                if let Some(slot) = v.get_mut(col) {
                    *slot = value;
                }
            }
            Self::Numeric2d(rows) => {
                if let Some(slot) = rows.get_mut(row).and_then(|r| r.get_mut(col)) {
                    *slot = value;
                }
            }
            Self::Mixed(_) | Self::Mixed2d(_) => self.set_cell(row, col, Cell::Num(value)),
            _ => {}
        }
    }

    /// Overwrite a mixed-type slot. Out-of-range positions are ignored.
    pub fn set_cell(&mut self, row: usize, col: usize, cell: Cell) {
        let slot = match self {
            Self::Mixed(v) if row == 0 => v.get_mut(col),
            Self::Mixed2d(rows) => rows.get_mut(row).and_then(|r| r.get_mut(col)),
            _ => None,
        };
        if let Some(slot) = slot {
            *slot = cell;
        }
    }

    /// Positions `(row, col)` holding NaN or [`Cell::Missing`].
    #[must_use]
    pub fn missing_positions(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        match self {
            Self::Numeric(v) => collect_nan(0, v, &mut out),
            Self::Numeric2d(rows) => {
                for (r, row) in rows.iter().enumerate() {
                    collect_nan(r, row, &mut out);
                }
            }
            Self::Mixed(v) => collect_missing(0, v, &mut out),
            Self::Mixed2d(rows) => {
                for (r, row) in rows.iter().enumerate() {
                    collect_missing(r, row, &mut out);
                }
            }
        }
        out
    }
}

fn collect_nan(row: usize, values: &[f64], out: &mut Vec<(usize, usize)>) {
    out.extend(
        values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_nan())
            .map(|(c, _)| (row, c)),
    );
}

fn collect_missing(row: usize, cells: &[Cell], out: &mut Vec<(usize, usize)>) {
    out.extend(
        cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_missing())
            .map(|(c, _)| (row, c)),
    );
}

/// Positions of the originally-missing slots of every instance.
///
/// `Flat` lists missing columns per instance for 1-D data; `Rows` lists them
/// per instance and row for 2-D data. Column lists are kept sorted.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MissingIndex {
    /// Per-instance missing columns.
    Flat(Vec<Vec<usize>>),
    /// Per-instance, per-row missing columns.
    Rows(Vec<Vec<Vec<usize>>>),
}

impl MissingIndex {
    /// Scan a set of series for NaN and [`Cell::Missing`] slots.
    #[must_use]
    pub fn detect(series: &[SeriesValue]) -> Self {
        let two_d = series.iter().any(|s| s.kind().is_2d());
        if two_d {
            Self::Rows(
                series
                    .iter()
                    .map(|s| {
                        let mut rows = vec![Vec::new(); s.n_rows()];
                        for (r, c) in s.missing_positions() {
                            rows[r].push(c);
                        }
                        rows
                    })
                    .collect(),
            )
        } else {
            Self::Flat(
                series
                    .iter()
                    .map(|s| s.missing_positions().into_iter().map(|(_, c)| c).collect())
                    .collect(),
            )
        }
    }

    /// An index with no missing slots for `n` 1-D instances.
    #[must_use]
    pub fn empty(n: usize) -> Self {
        Self::Flat(vec![Vec::new(); n])
    }

    /// Number of instances covered.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Flat(v) => v.len(),
            Self::Rows(v) => v.len(),
        }
    }

    /// Whether the index covers no instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of missing slots.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Flat(v) => v.iter().map(Vec::len).sum(),
            Self::Rows(v) => v.iter().flatten().map(Vec::len).sum(),
        }
    }

    /// Missing `(row, col)` positions of one instance.
    #[must_use]
    pub fn positions(&self, instance: usize) -> Vec<(usize, usize)> {
        match self {
            Self::Flat(v) => v
                .get(instance)
                .map(|cols| cols.iter().map(|&c| (0, c)).collect())
                .unwrap_or_default(),
            Self::Rows(v) => v
                .get(instance)
                .map(|rows| {
                    rows.iter()
                        .enumerate()
                        .flat_map(|(r, cols)| cols.iter().map(move |&c| (r, c)))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Whether `(row, col)` of `instance` was missing.
    #[must_use]
    pub fn contains(&self, instance: usize, row: usize, col: usize) -> bool {
        let cols = match self {
            Self::Flat(v) if row == 0 => v.get(instance),
            Self::Flat(_) => None,
            Self::Rows(v) => v.get(instance).and_then(|rows| rows.get(row)),
        };
        cols.is_some_and(|cols| cols.binary_search(&col).is_ok())
    }

    /// Reorder instances so entry `k` becomes entry `order[k]` of the old index.
    pub(crate) fn permute(&mut self, order: &[usize]) {
        match self {
            Self::Flat(v) => *v = order.iter().map(|&i| std::mem::take(&mut v[i])).collect(),
            Self::Rows(v) => *v = order.iter().map(|&i| std::mem::take(&mut v[i])).collect(),
        }
    }
}
