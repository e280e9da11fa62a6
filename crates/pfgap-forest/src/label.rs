//! Instance labels and the original-to-contiguous class mapping.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A class or regression target.
///
/// `Real` compares and hashes by bit pattern so labels can key maps.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Label {
    /// Integer class.
    Int(i64),
    /// String class.
    Str(String),
    /// Real-valued regression target.
    Real(f64),
}

impl Label {
    /// Numeric value of the label, if it has one.
    ///
    /// Integer classes convert, strings parse when they hold a number.
    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            Self::Str(s) => s.trim().parse().ok(),
        }
    }

    /// Contiguous class code, for labels produced by a [`LabelMapping`].
    #[must_use]
    pub fn as_code(&self) -> Option<usize> {
        match self {
            Self::Int(v) => usize::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Parse a raw token: integers first, then reals, else a string class.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if let Ok(v) = token.parse::<i64>() {
            Self::Int(v)
        } else if let Ok(v) = token.parse::<f64>() {
            Self::Real(v)
        } else {
            Self::Str(token.to_owned())
        }
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Real(a), Self::Real(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Label {}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Int(v) => v.hash(state),
            Self::Str(s) => s.hash(state),
            Self::Real(v) => v.to_bits().hash(state),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Real(v) => write!(f, "{v}"),
        }
    }
}

/// Bidirectional map between original labels and contiguous class codes.
///
/// Codes are assigned in first-seen order starting from zero.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LabelMapping {
    originals: Vec<Label>,
    codes: HashMap<Label, usize>,
}

impl LabelMapping {
    /// Code for an original label.
    #[must_use]
    pub fn encode(&self, label: &Label) -> Option<usize> {
        self.codes.get(label).copied()
    }

    /// Original label for a code.
    #[must_use]
    pub fn decode(&self, code: usize) -> Option<&Label> {
        self.originals.get(code)
    }

    /// Number of distinct classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.originals.len()
    }

    /// Whether the mapping holds no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    /// Original labels in code order.
    #[must_use]
    pub fn originals(&self) -> &[Label] {
        &self.originals
    }

    /// Code for `label`, assigning the next free code when unseen.
    pub(crate) fn encode_or_insert(&mut self, label: &Label) -> usize {
        if let Some(&code) = self.codes.get(label) {
            return code;
        }
        let code = self.originals.len();
        self.originals.push(label.clone());
        self.codes.insert(label.clone(), code);
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_prefers_integers() {
        assert_eq!(Label::parse("3"), Label::Int(3));
        assert_eq!(Label::parse(" 2.5 "), Label::Real(2.5));
        assert_eq!(Label::parse("cat"), Label::Str("cat".into()));
    }

    #[test]
    fn real_labels_hash_by_bits() {
        let mut mapping = LabelMapping::default();
        assert_eq!(mapping.encode_or_insert(&Label::Real(1.5)), 0);
        assert_eq!(mapping.encode_or_insert(&Label::Real(1.5)), 0);
        assert_eq!(mapping.encode_or_insert(&Label::Int(1)), 1);
        assert_eq!(mapping.len(), 2);
    }

    #[test]
    fn mapping_is_first_seen_order() {
        let mut mapping = LabelMapping::default();
        for l in ["b", "a", "b", "c"] {
            mapping.encode_or_insert(&Label::Str(l.into()));
        }
        assert_eq!(mapping.decode(0), Some(&Label::Str("b".into())));
        assert_eq!(mapping.decode(2), Some(&Label::Str("c".into())));
        assert_eq!(mapping.encode(&Label::Str("a".into())), Some(1));
        assert_eq!(mapping.decode(3), None);
    }

    #[test]
    fn as_real_converts_numeric_variants() {
        assert_eq!(Label::Int(4).as_real(), Some(4.0));
        assert_eq!(Label::Str("0.5".into()).as_real(), Some(0.5));
        assert_eq!(Label::Str("x".into()).as_real(), None);
        assert_eq!(Label::Int(-1).as_code(), None);
    }
}
