//! DTW distance computation.

use tracing::instrument;

use crate::constraint::BandConstraint;
use crate::error::DistanceError;
use crate::path::{WarpingPath, WarpingStep};

/// Immutable DTW configuration. Thread-safe and copyable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dtw {
    constraint: BandConstraint,
}

impl Dtw {
    /// Create an unconstrained DTW calculator.
    #[must_use]
    pub fn unconstrained() -> Self {
        Self {
            constraint: BandConstraint::Unconstrained,
        }
    }

    /// Create a DTW calculator with a Sakoe-Chiba band constraint.
    #[must_use]
    pub fn with_sakoe_chiba(radius: usize) -> Self {
        Self {
            constraint: BandConstraint::SakoeChibaRadius(radius),
        }
    }

    /// Create a DTW calculator from an optional window radius.
    #[must_use]
    pub fn with_window(window: Option<usize>) -> Self {
        Self {
            constraint: BandConstraint::from_window(window),
        }
    }

    /// Return the band constraint configuration.
    #[must_use]
    pub fn constraint(&self) -> BandConstraint {
        self.constraint
    }

    /// Compute the DTW distance between two series.
    ///
    /// Uses a rolling two-row buffer rather than the full cost matrix. Runs in
    /// O(n * bw) time and O(bw) space, where `bw` is the band width.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DistanceError::EmptySeries`] | Either input is empty |
    pub fn distance(&self, a: &[f64], b: &[f64]) -> Result<f64, DistanceError> {
        crate::check_non_empty(a, b)?;
        Ok(self.rolling(a, b, None))
    }

    /// Compute DTW distance with early abandoning.
    ///
    /// If the distance would exceed `cutoff`, returns `f64::INFINITY` without
    /// completing the computation. A finite result equals `self.distance(a, b)`.
    /// A distance exactly equal to `cutoff` is returned, not abandoned.
    ///
    /// # Errors
    ///
    /// Same as [`distance`][Dtw::distance].
    pub fn distance_with_cutoff(
        &self,
        a: &[f64],
        b: &[f64],
        cutoff: f64,
    ) -> Result<f64, DistanceError> {
        crate::check_non_empty(a, b)?;
        Ok(self.rolling(a, b, cutoff.is_finite().then_some(cutoff)))
    }

    /// Compute the DTW distance and optimal warping path between two series.
    ///
    /// Allocates the full banded cost matrix and a direction array for traceback.
    ///
    /// # Errors
    ///
    /// Same as [`distance`][Dtw::distance].
    #[instrument(level = "trace", skip_all, fields(n = a.len(), m = b.len()))]
    pub fn distance_and_path(
        &self,
        a: &[f64],
        b: &[f64],
    ) -> Result<(f64, WarpingPath), DistanceError> {
        crate::check_non_empty(a, b)?;
        let (dist, steps) = self.full_band(a, b);
        Ok((dist, WarpingPath::new(steps)))
    }

    /// Rolling DTW with optional early abandoning.
    ///
    /// Costs accumulate squared; every comparison against `cutoff` is made on
    /// the rooted value so a result equal to `cutoff` survives.
    ///
    /// Each row buffer has `bw + 2` slots. Index 0 is the left sentinel and
    /// index `bw + 1` the right sentinel, both INF. Active columns occupy
    /// `1..=bw`; out-of-band reads land on a sentinel.
    fn rolling(&self, a: &[f64], b: &[f64], cutoff: Option<f64>) -> f64 {
        let n = a.len();
        let m = b.len();
        let constraint = self.constraint.reaching(n, m);

        let bw = constraint.band_width(n, m);
        let buf_width = bw + 2;

        let mut prev = vec![f64::INFINITY; buf_width];
        let mut curr = vec![f64::INFINITY; buf_width];
        let mut prev_start: usize = 0;

        for (i, &ai) in a.iter().enumerate() {
            curr.fill(f64::INFINITY);

            let col_range = constraint.column_range(i, m);
            let curr_start = col_range.start;
            let mut row_min = f64::INFINITY;

            for j in col_range {
                let cost = (ai - b[j]).powi(2);
                let cj = j - curr_start + 1;

                if i == 0 && j == 0 {
                    curr[cj] = cost;
                    row_min = row_min.min(cost);
                    continue;
                }

                let left = if j > curr_start {
                    curr[cj - 1]
                } else {
                    f64::INFINITY
                };

                let above = if i > 0 {
                    let pj = j.wrapping_sub(prev_start).wrapping_add(1);
                    if pj < buf_width { prev[pj] } else { f64::INFINITY }
                } else {
                    f64::INFINITY
                };

                let diag = if i > 0 && j > 0 {
                    let pj = (j - 1).wrapping_sub(prev_start).wrapping_add(1);
                    if pj < buf_width { prev[pj] } else { f64::INFINITY }
                } else {
                    f64::INFINITY
                };

                let val = cost + left.min(above).min(diag);
                curr[cj] = val;
                row_min = row_min.min(val);
            }

            // Every path crosses each row once, so the row minimum bounds the
            // final cost from below. The last row is checked at its end cell.
            if let Some(c) = cutoff
                && i < n - 1
                && row_min.sqrt() > c
            {
                return f64::INFINITY;
            }

            prev_start = curr_start;
            std::mem::swap(&mut prev, &mut curr);
        }

        let final_range = constraint.column_range(n - 1, m);
        let final_sq = prev[(m - 1) - final_range.start + 1];

        if let Some(c) = cutoff
            && final_sq.sqrt() > c
        {
            return f64::INFINITY;
        }

        final_sq.sqrt()
    }

    /// Full banded cost matrix DTW, returning the distance and the warping path.
    ///
    /// Direction bits: 0 = diagonal, 1 = above, 2 = left. Cell `(i, j)` maps to
    /// flat index `i * bw + (j - col_range.start)`.
    fn full_band(&self, a: &[f64], b: &[f64]) -> (f64, Vec<WarpingStep>) {
        let n = a.len();
        let m = b.len();
        let constraint = self.constraint.reaching(n, m);
        let bw = constraint.band_width(n, m);

        let mut cost = vec![f64::INFINITY; n * bw];
        let mut dirs = vec![0u8; n * bw];

        for i in 0..n {
            let col_range = constraint.column_range(i, m);
            let prev_range = if i > 0 {
                constraint.column_range(i - 1, m)
            } else {
                0..0
            };

            for j in col_range.clone() {
                let c = (a[i] - b[j]).powi(2);
                let local_j = j - col_range.start;
                let idx = i * bw + local_j;

                if i == 0 && j == 0 {
                    cost[idx] = c;
                    continue;
                }

                let diag = if i > 0 && j > 0 && prev_range.contains(&(j - 1)) {
                    cost[(i - 1) * bw + (j - 1 - prev_range.start)]
                } else {
                    f64::INFINITY
                };

                let above = if i > 0 && prev_range.contains(&j) {
                    cost[(i - 1) * bw + (j - prev_range.start)]
                } else {
                    f64::INFINITY
                };

                let left = if j > col_range.start {
                    cost[idx - 1]
                } else {
                    f64::INFINITY
                };

                let (min_val, dir) = if diag <= above && diag <= left {
                    (diag, 0u8)
                } else if above <= left {
                    (above, 1u8)
                } else {
                    (left, 2u8)
                };

                cost[idx] = c + min_val;
                dirs[idx] = dir;
            }
        }

        let mut path = Vec::with_capacity(n + m);
        let (mut i, mut j) = (n - 1, m - 1);
        loop {
            path.push(WarpingStep { a: i, b: j });
            if i == 0 && j == 0 {
                break;
            }
            let idx = i * bw + (j - constraint.column_range(i, m).start);
            match dirs[idx] {
                0 => {
                    i -= 1;
                    j -= 1;
                }
                1 => i -= 1,
                _ => j -= 1,
            }
        }
        path.reverse();

        let final_local = (m - 1) - constraint.column_range(n - 1, m).start;
        (cost[(n - 1) * bw + final_local].sqrt(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_series_distance_zero() {
        let dtw = Dtw::unconstrained();
        let a = [1.0, 2.0, 3.0];
        assert!(dtw.distance(&a, &a).unwrap().abs() < 1e-10);
    }

    #[test]
    fn hand_computed_2x2() {
        // C = [[1, 1], [1, 2]] so the distance is sqrt(2)
        let dtw = Dtw::unconstrained();
        let dist = dtw.distance(&[0.0, 1.0], &[1.0, 0.0]).unwrap();
        assert!((dist - 2.0_f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn zero_radius_forces_diagonal() {
        let dtw = Dtw::with_sakoe_chiba(0);
        let dist = dtw.distance(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0]).unwrap();
        assert!((dist - 3.0_f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn band_distance_geq_unconstrained() {
        let a = [0.0, 1.0, 0.0, 1.0, 0.0];
        let b = [1.0, 0.0, 1.0, 0.0, 1.0];
        let free = Dtw::unconstrained().distance(&a, &b).unwrap();
        let banded = Dtw::with_sakoe_chiba(1).distance(&a, &b).unwrap();
        assert!(banded >= free - 1e-10);
    }

    #[test]
    fn unequal_lengths_with_narrow_band() {
        let dtw = Dtw::with_sakoe_chiba(0);
        let dist = dtw.distance(&[1.0, 2.0, 3.0, 4.0], &[1.0, 4.0]).unwrap();
        assert!(dist.is_finite());
    }

    #[test]
    fn empty_series_rejected() {
        let err = Dtw::unconstrained().distance(&[], &[1.0]).unwrap_err();
        assert!(matches!(err, DistanceError::EmptySeries));
    }

    #[test]
    fn warping_path_endpoints() {
        let dtw = Dtw::unconstrained();
        let (_, path) = dtw
            .distance_and_path(&[1.0, 2.0, 3.0, 4.0], &[1.0, 3.0, 4.0])
            .unwrap();
        let steps = path.steps();
        assert_eq!(steps.first().unwrap(), &WarpingStep { a: 0, b: 0 });
        assert_eq!(steps.last().unwrap(), &WarpingStep { a: 3, b: 2 });
    }

    #[test]
    fn distance_matches_distance_and_path() {
        let dtw = Dtw::with_sakoe_chiba(2);
        let a = [1.0, 3.0, 5.0, 2.0, 0.5];
        let b = [2.0, 4.0, 1.0, 0.0];
        let d = dtw.distance(&a, &b).unwrap();
        let (dp, _) = dtw.distance_and_path(&a, &b).unwrap();
        assert!((d - dp).abs() < 1e-10);
    }

    #[test]
    fn warping_path_continuity() {
        let dtw = Dtw::unconstrained();
        let (_, path) = dtw
            .distance_and_path(&[1.0, 5.0, 2.0, 8.0, 3.0], &[2.0, 4.0, 7.0])
            .unwrap();
        for pair in path.steps().windows(2) {
            let da = pair[1].a - pair[0].a;
            let db = pair[1].b - pair[0].b;
            assert!(da <= 1 && db <= 1 && da + db >= 1);
        }
    }

    // --- early abandoning ---

    #[test]
    fn early_abandon_returns_inf() {
        let dtw = Dtw::unconstrained();
        let d = dtw
            .distance_with_cutoff(&[0.0; 5], &[10.0; 5], 1.0)
            .unwrap();
        assert_eq!(d, f64::INFINITY);
    }

    #[test]
    fn cutoff_matches_exact_distance() {
        let dtw = Dtw::unconstrained();
        let a = [0.0, 1.0];
        let b = [1.0, 0.0];
        let d = dtw.distance(&a, &b).unwrap();

        let above = dtw.distance_with_cutoff(&a, &b, d + 0.001).unwrap();
        assert!((above - d).abs() < 1e-10);

        let below = dtw.distance_with_cutoff(&a, &b, d - 0.001).unwrap();
        assert_eq!(below, f64::INFINITY);
    }

    #[test]
    fn tie_at_irrational_cutoff_is_kept() {
        let dtw = Dtw::with_sakoe_chiba(1);
        let query = [0.0, 0.0, 0.0];
        let first = dtw.distance(&query, &[1.0, 1.0, 1.0]).unwrap();
        let second = dtw
            .distance_with_cutoff(&query, &[-1.0, -1.0, -1.0], first)
            .unwrap();
        assert!(second.is_finite());
        assert_eq!(second, first);
    }

    #[test]
    fn infinite_cutoff_never_abandons() {
        let dtw = Dtw::with_sakoe_chiba(1);
        let a = [3.0, 1.0, 4.0, 1.0, 5.0];
        let b = [9.0, 2.0, 6.0, 5.0, 3.0];
        let exact = dtw.distance(&a, &b).unwrap();
        let cut = dtw.distance_with_cutoff(&a, &b, f64::INFINITY).unwrap();
        assert!((exact - cut).abs() < 1e-10);
    }
}
