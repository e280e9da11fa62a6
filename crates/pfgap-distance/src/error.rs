//! Error types for distance computation.

/// Errors from distance kernels and series transforms.
#[derive(Debug, thiserror::Error)]
pub enum DistanceError {
    /// Returned when an empty slice is provided as a series.
    #[error("series must be non-empty")]
    EmptySeries,

    /// Returned by lock-step kernels when the two series differ in length.
    #[error("lock-step distance needs equal lengths, got {left} and {right}")]
    LengthMismatch {
        /// Length of the first series.
        left: usize,
        /// Length of the second series.
        right: usize,
    },

    /// Returned when the derivative transform receives fewer than 3 points.
    #[error("derivative needs at least 3 points, got {len}")]
    TooShort {
        /// Length of the offending series.
        len: usize,
    },
}
