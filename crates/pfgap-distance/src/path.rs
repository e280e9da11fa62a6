//! Warping path types for DTW alignment.

/// A single step in a DTW warping path, mapping index `a` in the first series
/// to index `b` in the second series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarpingStep {
    /// Index in the first series.
    pub a: usize,
    /// Index in the second series.
    pub b: usize,
}

/// An ordered sequence of warping steps from `(0, 0)` to `(n-1, m-1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct WarpingPath(Vec<WarpingStep>);

impl WarpingPath {
    pub(crate) fn new(steps: Vec<WarpingStep>) -> Self {
        Self(steps)
    }

    /// Return the warping steps as a slice.
    #[must_use]
    pub fn steps(&self) -> &[WarpingStep] {
        &self.0
    }

    /// Return the number of steps in the path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Return true if the path contains no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Indices of the second series aligned with position `a` of the first.
    pub fn aligned_with(&self, a: usize) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().filter(move |s| s.a == a).map(|s| s.b)
    }
}

impl<'a> IntoIterator for &'a WarpingPath {
    type Item = &'a WarpingStep;
    type IntoIter = std::slice::Iter<'a, WarpingStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_with_collects_every_partner() {
        let path = WarpingPath::new(vec![
            WarpingStep { a: 0, b: 0 },
            WarpingStep { a: 1, b: 1 },
            WarpingStep { a: 1, b: 2 },
            WarpingStep { a: 2, b: 3 },
        ]);
        assert_eq!(path.aligned_with(1).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(path.aligned_with(5).count(), 0);
        assert_eq!(path.len(), 4);
    }
}
