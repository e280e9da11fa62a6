//! Series transforms.

use crate::error::DistanceError;

/// Compute the Keogh-Pazzani first derivative of a series.
///
/// For interior points (1..n-1): `d[i] = ((x[i] - x[i-1]) + (x[i+1] - x[i-1]) / 2) / 2`.
/// Output length is `n - 2` (drops first and last points).
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`DistanceError::TooShort`] | Series has fewer than 3 elements |
pub fn derivative(series: &[f64]) -> Result<Vec<f64>, DistanceError> {
    let n = series.len();
    if n < 3 {
        return Err(DistanceError::TooShort { len: n });
    }
    Ok(series
        .windows(3)
        .map(|w| ((w[1] - w[0]) + (w[2] - w[0]) / 2.0) / 2.0)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_series_has_constant_derivative() {
        let d = derivative(&[0.0, 2.0, 4.0, 6.0]).unwrap();
        assert_eq!(d.len(), 2);
        for v in d {
            assert!((v - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn short_series_rejected() {
        assert!(matches!(
            derivative(&[1.0, 2.0]),
            Err(DistanceError::TooShort { len: 2 })
        ));
    }
}
