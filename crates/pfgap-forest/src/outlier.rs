//! Within-class outlier scores derived from training proximities.

use crate::error::ForestError;
use crate::label::Label;
use crate::proximity::ProximityMatrix;

/// Stand-in for a same-class proximity mass of exactly zero.
const ZERO_MASS_SUBSTITUTE: f64 = 1e-6;

/// Raw and class-normalised outlier scores, one per training instance.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OutlierScores {
    raw: Vec<f64>,
    normalized: Vec<f64>,
}

impl OutlierScores {
    /// `N / sum_j prox(i, j)²` over same-class `j`, with a zero sum read
    /// as 1e-6.
    #[must_use]
    pub fn raw(&self) -> &[f64] {
        &self.raw
    }

    /// `|raw - class median| / class mean absolute deviation`.
    #[must_use]
    pub fn normalized(&self) -> &[f64] {
        &self.normalized
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Outlier scores of the training instances.
///
/// Instances are grouped by label; unlabelled instances form no group and
/// score 0. A class whose deviation is 0 normalises to 0.
///
/// # Errors
///
/// Returns [`ForestError::LengthMismatch`] when `labels` does not match the
/// matrix, or the matrix is not square.
pub fn outlier_scores(
    proximities: &ProximityMatrix,
    labels: &[Option<Label>],
    symmetrize: bool,
) -> Result<OutlierScores, ForestError> {
    let n = proximities.n_rows();
    if labels.len() != n {
        return Err(ForestError::LengthMismatch {
            what: "labels",
            expected: n,
            got: labels.len(),
        });
    }
    let symmetric;
    let prox = if symmetrize {
        symmetric = proximities.symmetrized()?;
        &symmetric
    } else {
        proximities
    };

    let mut raw = vec![0.0; n];
    for (i, label) in labels.iter().enumerate() {
        let Some(label) = label else { continue };
        let mass: f64 = prox
            .row(i)
            .into_iter()
            .filter(|&(j, _)| labels.get(j).and_then(Option::as_ref) == Some(label))
            .map(|(_, v)| v * v)
            .sum();
        let mass = if mass == 0.0 { ZERO_MASS_SUBSTITUTE } else { mass };
        raw[i] = n as f64 / mass;
    }

    let mut classes: Vec<(&Label, Vec<usize>)> = Vec::new();
    for (i, label) in labels.iter().enumerate() {
        let Some(label) = label else { continue };
        match classes.iter_mut().find(|(l, _)| *l == label) {
            Some((_, members)) => members.push(i),
            None => classes.push((label, vec![i])),
        }
    }

    let mut normalized = vec![0.0; n];
    for (_, members) in classes {
        let mut values: Vec<f64> = members.iter().map(|&i| raw[i]).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let deviation = values.iter().map(|v| (v - mean).abs()).sum::<f64>() / values.len() as f64;
        let med = median(&mut values);
        for &i in &members {
            normalized[i] = if deviation > 0.0 {
                (raw[i] - med).abs() / deviation
            } else {
                0.0
            };
        }
    }

    Ok(OutlierScores { raw, normalized })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn sparse(rows: Vec<Vec<(u32, f64)>>) -> ProximityMatrix {
        let n = rows.len();
        ProximityMatrix::Sparse {
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().collect::<BTreeMap<_, _>>())
                .collect(),
            n_cols: n,
        }
    }

    #[test]
    fn isolated_instance_scores_highest() {
        // 0, 1, 2 share class A; 2 has no proximity to its class
        let prox = sparse(vec![
            vec![(1, 0.5)],
            vec![(0, 0.5)],
            vec![(3, 0.9)],
            vec![(2, 0.9)],
        ]);
        let labels = vec![
            Some(Label::Int(0)),
            Some(Label::Int(0)),
            Some(Label::Int(0)),
            Some(Label::Int(1)),
        ];
        let scores = outlier_scores(&prox, &labels, false).unwrap();
        assert!((scores.raw()[0] - 4.0 / 0.25).abs() < 1e-9);
        assert!((scores.raw()[2] - 4.0 / 1e-6).abs() < 1e-3);
        assert!(scores.normalized()[2] > scores.normalized()[0]);
        // class with one member has zero deviation
        assert_eq!(scores.normalized()[3], 0.0);
    }

    #[test]
    fn label_length_is_checked() {
        let prox = sparse(vec![vec![], vec![]]);
        let err = outlier_scores(&prox, &[None], false).unwrap_err();
        assert!(matches!(err, ForestError::LengthMismatch { .. }));
    }

    #[test]
    fn symmetrize_uses_both_directions() {
        let prox = sparse(vec![vec![(1, 1.0)], vec![]]);
        let labels = vec![Some(Label::Int(0)), Some(Label::Int(0))];
        let one_way = outlier_scores(&prox, &labels, false).unwrap();
        let sym = outlier_scores(&prox, &labels, true).unwrap();
        assert!((one_way.raw()[1] - 2.0 / 1e-6).abs() < 1e-3);
        assert!((sym.raw()[1] - 2.0 / 0.25).abs() < 1e-9);
    }

    #[test]
    fn tiny_nonzero_mass_is_not_clamped() {
        // 1e-4 squared is below the zero substitute but still counts as is
        let prox = sparse(vec![vec![(1, 1e-4)], vec![(0, 1e-4)]]);
        let labels = vec![Some(Label::Int(0)), Some(Label::Int(0))];
        let scores = outlier_scores(&prox, &labels, false).unwrap();
        let expected = 2.0 / (1e-4 * 1e-4);
        assert!((scores.raw()[0] - expected).abs() / expected < 1e-12);
        assert!(scores.raw()[0] > 2.0 / 1e-6);
    }
}
