//! Lock-step distances: point i of one series against point i of the other.

use crate::error::DistanceError;

fn check_pair(a: &[f64], b: &[f64]) -> Result<(), DistanceError> {
    crate::check_non_empty(a, b)?;
    if a.len() != b.len() {
        return Err(DistanceError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(())
}

/// Euclidean distance with early abandoning.
///
/// Returns `f64::INFINITY` once the root of the running squared sum exceeds
/// `cutoff`. The comparison is made on the same rooted value that would be
/// returned, so a distance equal to `cutoff` is always kept.
/// Pass `f64::INFINITY` to disable abandoning.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`DistanceError::EmptySeries`] | Either input is empty |
/// | [`DistanceError::LengthMismatch`] | Inputs differ in length |
pub fn euclidean(a: &[f64], b: &[f64], cutoff: f64) -> Result<f64, DistanceError> {
    check_pair(a, b)?;
    let limit = cutoff * cutoff;
    let mut total = 0.0;
    for (x, y) in a.iter().zip(b) {
        total += (x - y).powi(2);
        // Squared test first; the root settles values that round onto the cutoff.
        if total > limit && total.sqrt() > cutoff {
            return Ok(f64::INFINITY);
        }
    }
    Ok(total.sqrt())
}

/// Manhattan (L1) distance with early abandoning at `cutoff`.
///
/// # Errors
///
/// Same as [`euclidean`].
pub fn manhattan(a: &[f64], b: &[f64], cutoff: f64) -> Result<f64, DistanceError> {
    check_pair(a, b)?;
    let mut total = 0.0;
    for (x, y) in a.iter().zip(b) {
        total += (x - y).abs();
        if total > cutoff {
            return Ok(f64::INFINITY);
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_three_four_five() {
        let d = euclidean(&[0.0, 0.0], &[3.0, 4.0], f64::INFINITY).unwrap();
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn euclidean_equal_to_cutoff_is_kept() {
        let d = euclidean(&[0.0, 0.0], &[3.0, 4.0], 5.0).unwrap();
        assert!((d - 5.0).abs() < 1e-12);
        let abandoned = euclidean(&[0.0, 0.0], &[3.0, 4.0], 4.9).unwrap();
        assert_eq!(abandoned, f64::INFINITY);
    }

    #[test]
    fn euclidean_tie_at_irrational_cutoff_is_kept() {
        let first = euclidean(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], f64::INFINITY).unwrap();
        let second = euclidean(&[0.0, 0.0, 0.0], &[-1.0, -1.0, -1.0], first).unwrap();
        assert!(second.is_finite());
        assert_eq!(second, first);
    }

    #[test]
    fn manhattan_sums_absolute_differences() {
        let d = manhattan(&[1.0, -1.0, 2.0], &[0.0, 1.0, 2.0], f64::INFINITY).unwrap();
        assert!((d - 3.0).abs() < 1e-12);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let err = euclidean(&[1.0], &[1.0, 2.0], f64::INFINITY).unwrap_err();
        assert!(matches!(
            err,
            DistanceError::LengthMismatch { left: 1, right: 2 }
        ));
    }
}
