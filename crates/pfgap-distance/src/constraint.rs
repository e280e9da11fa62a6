//! Band constraint types for elastic distances.

use std::ops::Range;

/// Constraint on the warping window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BandConstraint {
    /// No constraint: the full cost matrix is computed.
    #[default]
    Unconstrained,

    /// Sakoe-Chiba band: cell (i,j) is valid only if |i - j| <= radius.
    SakoeChibaRadius(usize),
}

impl BandConstraint {
    /// Build a constraint from an optional window, `None` meaning unconstrained.
    #[must_use]
    pub fn from_window(window: Option<usize>) -> Self {
        window.map_or(Self::Unconstrained, Self::SakoeChibaRadius)
    }

    /// Widen the radius so the band reaches the final cell of an `n x m` matrix.
    ///
    /// A radius below `|n - m|` would leave `(n-1, m-1)` unreachable.
    #[must_use]
    pub fn reaching(self, n: usize, m: usize) -> Self {
        match self {
            Self::Unconstrained => Self::Unconstrained,
            Self::SakoeChibaRadius(r) => Self::SakoeChibaRadius(r.max(n.abs_diff(m))),
        }
    }

    /// Return the valid column range for a given row in the cost matrix.
    ///
    /// For unconstrained matrices, returns `0..n_cols`.
    /// For Sakoe-Chiba, returns the intersection of `[row - r, row + r]` with `[0, n_cols)`.
    #[must_use]
    pub fn column_range(&self, row: usize, n_cols: usize) -> Range<usize> {
        match self {
            Self::Unconstrained => 0..n_cols,
            Self::SakoeChibaRadius(r) => {
                let start = row.saturating_sub(*r).min(n_cols);
                let end = (row + r + 1).min(n_cols);
                start..end
            }
        }
    }

    /// Return the maximum band width for an `n x m` matrix.
    #[must_use]
    pub fn band_width(&self, _n: usize, m: usize) -> usize {
        match self {
            Self::Unconstrained => m,
            Self::SakoeChibaRadius(r) => (2 * r + 1).min(m),
        }
    }

    /// Whether cell `(i, j)` lies inside the band.
    #[must_use]
    pub fn contains(&self, i: usize, j: usize) -> bool {
        match self {
            Self::Unconstrained => true,
            Self::SakoeChibaRadius(r) => i.abs_diff(j) <= *r,
        }
    }
}
