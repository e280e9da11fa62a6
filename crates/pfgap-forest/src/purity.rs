use std::fmt;
use std::str::FromStr;

use crate::error::ForestError;
use crate::label::Label;

/// Measure of label homogeneity at a node.
///
/// Gini and entropy score class labels; variance and MAD score the numeric
/// value of regression targets. Lower is purer; every measure is 0 on an
/// empty or single-valued sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PurityMeasure {
    /// Gini impurity: 1 - Σ(p_i²)
    Gini,
    /// Information entropy in bits: -Σ(p_i · log2(p_i))
    Entropy,
    /// Population variance of the targets.
    Variance,
    /// Mean absolute deviation from the mean of the targets.
    Mad,
}

impl PurityMeasure {
    /// Whether the measure scores regression targets.
    #[must_use]
    pub fn is_regression(self) -> bool {
        matches!(self, Self::Variance | Self::Mad)
    }

    /// Impurity of a multiset of labels.
    ///
    /// Regression measures ignore labels without a numeric value.
    #[must_use]
    pub fn impurity<'a>(self, labels: impl IntoIterator<Item = &'a Label>) -> f64 {
        match self {
            Self::Gini | Self::Entropy => {
                let mut counts: Vec<(&Label, usize)> = Vec::new();
                let mut n = 0usize;
                for label in labels {
                    n += 1;
                    match counts.iter_mut().find(|(l, _)| *l == label) {
                        Some((_, c)) => *c += 1,
                        None => counts.push((label, 1)),
                    }
                }
                if n == 0 {
                    return 0.0;
                }
                let n = n as f64;
                let probs = counts.iter().map(|&(_, c)| c as f64 / n);
                if self == Self::Gini {
                    1.0 - probs.map(|p| p * p).sum::<f64>()
                } else {
                    -probs.map(|p| p * p.log2()).sum::<f64>()
                }
            }
            Self::Variance | Self::Mad => {
                let values: Vec<f64> = labels.into_iter().filter_map(Label::as_real).collect();
                if values.is_empty() {
                    return 0.0;
                }
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                if self == Self::Variance {
                    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
                } else {
                    values.iter().map(|v| (v - mean).abs()).sum::<f64>() / n
                }
            }
        }
    }
}

impl FromStr for PurityMeasure {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gini" => Ok(Self::Gini),
            "entropy" => Ok(Self::Entropy),
            "variance" => Ok(Self::Variance),
            "mad" => Ok(Self::Mad),
            _ => Err(ForestError::UnknownPurity { name: s.to_owned() }),
        }
    }
}

impl fmt::Display for PurityMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gini => "gini",
            Self::Entropy => "entropy",
            Self::Variance => "variance",
            Self::Mad => "mad",
        };
        f.write_str(name)
    }
}
