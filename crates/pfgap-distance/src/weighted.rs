//! Weighted DTW (Jeong et al.): a logistic penalty on the warping offset.

use crate::error::DistanceError;

/// Logistic weights `w[k] = 1 / (1 + exp(-g (k - len/2)))` for offsets `0..len`.
#[must_use]
pub fn wdtw_weights(len: usize, g: f64) -> Vec<f64> {
    let half = len as f64 / 2.0;
    (0..len)
        .map(|k| 1.0 / (1.0 + (-g * (k as f64 - half)).exp()))
        .collect()
}

/// Weighted DTW distance with penalty steepness `g`.
///
/// Unconstrained; cell cost is `w[|i - j|] * (a[i] - b[j])²`. Returns the
/// accumulated cost, or `f64::INFINITY` once a whole row exceeds `cutoff`.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`DistanceError::EmptySeries`] | Either input is empty |
pub fn wdtw(a: &[f64], b: &[f64], g: f64, cutoff: f64) -> Result<f64, DistanceError> {
    crate::check_non_empty(a, b)?;
    let m = b.len();
    let weights = wdtw_weights(a.len().max(m), g);

    let mut prev = vec![f64::INFINITY; m];
    let mut curr = vec![f64::INFINITY; m];

    for (i, &ai) in a.iter().enumerate() {
        let mut row_min = f64::INFINITY;
        for (j, &bj) in b.iter().enumerate() {
            let cost = weights[i.abs_diff(j)] * (ai - bj).powi(2);
            let best = match (i, j) {
                (0, 0) => 0.0,
                (0, _) => curr[j - 1],
                (_, 0) => prev[0],
                _ => prev[j - 1].min(prev[j]).min(curr[j - 1]),
            };
            curr[j] = cost + best;
            row_min = row_min.min(curr[j]);
        }
        if row_min > cutoff {
            return Ok(f64::INFINITY);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    Ok(prev[m - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_are_increasing_in_offset() {
        let w = wdtw_weights(10, 0.5);
        assert!(w.windows(2).all(|p| p[0] < p[1]));
        assert!(w.iter().all(|&x| x > 0.0 && x < 1.0));
    }

    #[test]
    fn identical_series_cost_zero() {
        let a = [1.0, 4.0, 2.0, 8.0];
        assert!(wdtw(&a, &a, 0.3, f64::INFINITY).unwrap().abs() < 1e-12);
    }

    #[test]
    fn zero_steepness_halves_squared_cost() {
        // g = 0 gives every weight 0.5, so aligned diagonal cost is half the squared sum
        let d = wdtw(&[0.0], &[2.0], 0.0, f64::INFINITY).unwrap();
        assert!((d - 2.0).abs() < 1e-12);
    }
}
