use std::fmt;

use crate::label::Label;
use crate::series::SeriesValue;
use crate::splitter::SplitRule;

/// Index into a `Vec<Node>` arena, identifying a specific node in a proximity tree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// Create a new node index from a zero-based arena position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Measure-agnostic impurity value (gini, entropy, variance or MAD).
#[derive(
    Debug, Clone, Copy, PartialEq, PartialOrd,
    serde::Serialize, serde::Deserialize,
)]
pub struct Impurity(f64);

impl Impurity {
    /// Create a new impurity value.
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    /// Return the raw impurity value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Impurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// A training instance chosen to represent one branch of a split.
///
/// The series is copied so that a persisted tree can route queries without
/// the training data; `instance` is the training position it came from.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Exemplar {
    pub(crate) instance: u32,
    pub(crate) series: SeriesValue,
}

impl Exemplar {
    /// Training position of the exemplar.
    #[must_use]
    pub fn instance(&self) -> u32 {
        self.instance
    }

    /// The exemplar's series.
    #[must_use]
    pub fn series(&self) -> &SeriesValue {
        &self.series
    }
}

/// Terminal or internal payload of a [`Node`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum NodeKind {
    /// A terminal leaf.
    Leaf {
        /// Majority class, or mean/median target for regression.
        label: Label,
    },
    /// An internal node routing to the nearest exemplar's child.
    Internal {
        /// Kernel, parameters and exemplars of the winning split.
        rule: SplitRule,
        /// One child per exemplar, in exemplar order.
        children: Vec<NodeIndex>,
    },
}

/// A node in a proximity tree arena.
///
/// Every node keeps the bootstrap positions that reached it: `in_bag` may
/// repeat a position, `out_of_bag` holds training positions never drawn for
/// this tree whose routing passed through the node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub(crate) depth: usize,
    pub(crate) impurity: Impurity,
    pub(crate) in_bag: Vec<u32>,
    pub(crate) out_of_bag: Vec<u32>,
    pub(crate) kind: NodeKind,
}

impl Node {
    /// Depth of the node; the root is 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Impurity of the in-bag labels at this node.
    #[must_use]
    pub fn impurity(&self) -> Impurity {
        self.impurity
    }

    /// In-bag positions, with bootstrap repeats.
    #[must_use]
    pub fn in_bag(&self) -> &[u32] {
        &self.in_bag
    }

    /// Out-of-bag positions routed through this node.
    #[must_use]
    pub fn out_of_bag(&self) -> &[u32] {
        &self.out_of_bag
    }

    /// The node payload.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Whether this is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Leaf label, `None` for internal nodes.
    #[must_use]
    pub fn label(&self) -> Option<&Label> {
        match &self.kind {
            NodeKind::Leaf { label } => Some(label),
            NodeKind::Internal { .. } => None,
        }
    }

    /// Child indices, empty for leaves.
    #[must_use]
    pub fn children(&self) -> &[NodeIndex] {
        match &self.kind {
            NodeKind::Leaf { .. } => &[],
            NodeKind::Internal { children, .. } => children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_accessors() {
        let node = Node {
            depth: 2,
            impurity: Impurity::new(0.0),
            in_bag: vec![1, 1, 4],
            out_of_bag: vec![3],
            kind: NodeKind::Leaf {
                label: Label::Int(1),
            },
        };
        assert!(node.is_leaf());
        assert_eq!(node.label(), Some(&Label::Int(1)));
        assert!(node.children().is_empty());
        assert_eq!(node.in_bag(), &[1, 1, 4]);
        assert_eq!(format!("{}", node.impurity()), "0.000000");
    }

    #[test]
    fn node_index_displays_position() {
        assert_eq!(NodeIndex::new(7).to_string(), "7");
        assert_eq!(NodeIndex::new(7).index(), 7);
    }
}
