//! Edit-style elastic distances: LCSS, ERP, MSM and TWE.
//!
//! All four use full dynamic-programming tables over `(n+1) x (m+1)` or
//! `n x m` cells. None of them abandons early.

use crate::constraint::BandConstraint;
use crate::error::DistanceError;

/// Longest Common SubSequence distance, `1 - LCSS / min(n, m)`.
///
/// Points match when `|a[i] - b[j]| <= epsilon` and `(i, j)` lies in the band.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`DistanceError::EmptySeries`] | Either input is empty |
pub fn lcss(
    a: &[f64],
    b: &[f64],
    epsilon: f64,
    window: Option<usize>,
) -> Result<f64, DistanceError> {
    crate::check_non_empty(a, b)?;
    let (n, m) = (a.len(), b.len());
    let band = BandConstraint::from_window(window);
    let mut table = vec![vec![0u32; m + 1]; n + 1];

    for i in 0..n {
        for j in 0..m {
            table[i + 1][j + 1] = if band.contains(i, j) && (a[i] - b[j]).abs() <= epsilon {
                table[i][j] + 1
            } else {
                table[i][j + 1].max(table[i + 1][j])
            };
        }
    }

    Ok(1.0 - f64::from(table[n][m]) / n.min(m) as f64)
}

/// Edit distance with Real Penalty, gaps charged against the constant `g`.
///
/// # Errors
///
/// Same as [`lcss`].
pub fn erp(a: &[f64], b: &[f64], g: f64, window: Option<usize>) -> Result<f64, DistanceError> {
    crate::check_non_empty(a, b)?;
    let (n, m) = (a.len(), b.len());
    let band = BandConstraint::from_window(window).reaching(n, m);
    let mut table = vec![vec![f64::INFINITY; m + 1]; n + 1];

    table[0][0] = 0.0;
    for i in 1..=n {
        table[i][0] = table[i - 1][0] + (a[i - 1] - g).abs();
    }
    for j in 1..=m {
        table[0][j] = table[0][j - 1] + (b[j - 1] - g).abs();
    }

    for i in 1..=n {
        for j in 1..=m {
            if !band.contains(i - 1, j - 1) {
                continue;
            }
            let matched = table[i - 1][j - 1] + (a[i - 1] - b[j - 1]).abs();
            let gap_a = table[i - 1][j] + (a[i - 1] - g).abs();
            let gap_b = table[i][j - 1] + (b[j - 1] - g).abs();
            table[i][j] = matched.min(gap_a).min(gap_b);
        }
    }

    Ok(table[n][m])
}

/// Split/merge cost of Move-Split-Merge: `c` when `x` lies between its
/// neighbours `y` and `z`, otherwise `c` plus the distance to the nearer one.
fn msm_cost(x: f64, y: f64, z: f64, c: f64) -> f64 {
    if (y <= x && x <= z) || (y >= x && x >= z) {
        c
    } else {
        c + (x - y).abs().min((x - z).abs())
    }
}

/// Move-Split-Merge distance with split/merge cost `c`.
///
/// # Errors
///
/// Same as [`lcss`].
pub fn msm(a: &[f64], b: &[f64], c: f64) -> Result<f64, DistanceError> {
    crate::check_non_empty(a, b)?;
    let (n, m) = (a.len(), b.len());
    let mut table = vec![vec![0.0; m]; n];

    table[0][0] = (a[0] - b[0]).abs();
    for i in 1..n {
        table[i][0] = table[i - 1][0] + msm_cost(a[i], a[i - 1], b[0], c);
    }
    for j in 1..m {
        table[0][j] = table[0][j - 1] + msm_cost(b[j], a[0], b[j - 1], c);
    }

    for i in 1..n {
        for j in 1..m {
            let moved = table[i - 1][j - 1] + (a[i] - b[j]).abs();
            let split = table[i - 1][j] + msm_cost(a[i], a[i - 1], b[j], c);
            let merge = table[i][j - 1] + msm_cost(b[j], a[i], b[j - 1], c);
            table[i][j] = moved.min(split).min(merge);
        }
    }

    Ok(table[n - 1][m - 1])
}

/// Time Warp Edit distance with stiffness `nu` and edit penalty `lambda`.
///
/// Time stamps are the sample positions, and both series are padded with a
/// leading zero.
///
/// # Errors
///
/// Same as [`lcss`].
pub fn twe(a: &[f64], b: &[f64], nu: f64, lambda: f64) -> Result<f64, DistanceError> {
    crate::check_non_empty(a, b)?;
    let (n, m) = (a.len(), b.len());
    let pa: Vec<f64> = std::iter::once(0.0).chain(a.iter().copied()).collect();
    let pb: Vec<f64> = std::iter::once(0.0).chain(b.iter().copied()).collect();

    let mut table = vec![vec![f64::INFINITY; m + 1]; n + 1];
    table[0][0] = 0.0;

    for i in 1..=n {
        for j in 1..=m {
            let stamp_gap = i.abs_diff(j) as f64;
            let matched = table[i - 1][j - 1]
                + (pa[i] - pb[j]).abs()
                + (pa[i - 1] - pb[j - 1]).abs()
                + nu * 2.0 * stamp_gap;
            let delete_a = table[i - 1][j] + (pa[i] - pa[i - 1]).abs() + nu + lambda;
            let delete_b = table[i][j - 1] + (pb[j] - pb[j - 1]).abs() + nu + lambda;
            table[i][j] = matched.min(delete_a).min(delete_b);
        }
    }

    Ok(table[n][m])
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: [f64; 5] = [0.0, 1.0, 3.0, 2.0, 1.0];
    const B: [f64; 5] = [0.5, 1.5, 2.5, 2.0, 0.0];

    #[test]
    fn identical_series_are_zero() {
        assert!(lcss(&A, &A, 0.1, None).unwrap().abs() < 1e-12);
        assert!(erp(&A, &A, 0.0, None).unwrap().abs() < 1e-12);
        assert!(msm(&A, &A, 0.5).unwrap().abs() < 1e-12);
        assert!(twe(&A, &A, 0.001, 0.01).unwrap().abs() < 1e-12);
    }

    #[test]
    fn lcss_counts_matches_within_epsilon() {
        // every pair within 0.6 except the last
        let d = lcss(&A, &B, 0.6, Some(0)).unwrap();
        assert!((d - 0.2).abs() < 1e-12);
    }

    #[test]
    fn lcss_is_bounded() {
        let d = lcss(&A, &[100.0, 100.0], 0.5, None).unwrap();
        assert!((d - 1.0).abs() < 1e-12);
    }

    #[test]
    fn erp_against_empty_like_gap_sum() {
        // aligning a single point against g costs |x - g| per skipped point
        let d = erp(&[1.0, 2.0], &[1.0], 0.0, None).unwrap();
        assert!((d - 2.0).abs() < 1e-12);
    }

    #[test]
    fn msm_single_move() {
        let d = msm(&[1.0], &[4.0], 0.5).unwrap();
        assert!((d - 3.0).abs() < 1e-12);
    }

    #[test]
    fn distances_are_symmetric_for_equal_lengths() {
        let pairs = [
            (erp(&A, &B, 0.2, None).unwrap(), erp(&B, &A, 0.2, None).unwrap()),
            (msm(&A, &B, 0.5).unwrap(), msm(&B, &A, 0.5).unwrap()),
            (twe(&A, &B, 0.01, 0.1).unwrap(), twe(&B, &A, 0.01, 0.1).unwrap()),
        ];
        for (x, y) in pairs {
            assert!((x - y).abs() < 1e-9, "{x} vs {y}");
        }
    }

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(msm(&[], &A, 1.0), Err(DistanceError::EmptySeries)));
    }
}
