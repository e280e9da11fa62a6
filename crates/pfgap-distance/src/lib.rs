//! Distance kernels for series data.
//!
//! Pure math library, zero I/O. Every kernel works on plain `&[f64]` slices:
//! lock-step Euclidean and Manhattan distances, DTW with an optional
//! Sakoe-Chiba band, early abandoning and warping-path extraction, weighted
//! DTW, LCSS, ERP, MSM and TWE, plus the derivative transform used by the
//! derivative DTW variants.

mod constraint;
mod dtw;
mod elastic;
mod error;
mod lockstep;
mod path;
mod preprocess;
mod weighted;

pub use constraint::BandConstraint;
pub use dtw::Dtw;
pub use elastic::{erp, lcss, msm, twe};
pub use error::DistanceError;
pub use lockstep::{euclidean, manhattan};
pub use path::{WarpingPath, WarpingStep};
pub use preprocess::derivative;
pub use weighted::{wdtw, wdtw_weights};

/// Reject empty inputs shared by every kernel.
pub(crate) fn check_non_empty(a: &[f64], b: &[f64]) -> Result<(), DistanceError> {
    if a.is_empty() || b.is_empty() {
        return Err(DistanceError::EmptySeries);
    }
    Ok(())
}
