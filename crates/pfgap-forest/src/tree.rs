//! Proximity tree induction and traversal.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::config::{ForestConfig, Task};
use crate::dataset::{Dataset, DatasetView};
use crate::error::ForestError;
use crate::kernel::{KernelId, KernelTable};
use crate::label::Label;
use crate::node::{Impurity, Node, NodeIndex, NodeKind};
use crate::series::SeriesValue;
use crate::splitter::{Outcome, Splitter};

/// Draw a bootstrap sample of `data.len()` positions and its out-of-bag complement.
///
/// Returns `(in_bag, out_of_bag, multiplicities)`; `in_bag` keeps draw order
/// and repeats, `multiplicities[i]` counts the draws of position `i`.
pub(crate) fn bootstrap_sample(
    data: &Dataset,
    rng: &mut impl Rng,
) -> (Vec<usize>, Vec<usize>, Vec<u32>) {
    let n = data.len();
    let in_bag = data.sample_with_replacement(n, rng);
    let mut multiplicities = vec![0u32; n];
    for &i in &in_bag {
        multiplicities[i] += 1;
    }
    let out_of_bag: Vec<usize> = (0..n).filter(|&i| multiplicities[i] == 0).collect();
    (in_bag, out_of_bag, multiplicities)
}

/// Label of a leaf: majority class with the first-seen maximum winning, or
/// the mean/median of the targets for regression.
fn leaf_label(view: &DatasetView<'_>, config: &ForestConfig) -> Result<Label, ForestError> {
    match config.task() {
        Task::Classification => {
            let mut counts: Vec<(&Label, usize)> = Vec::new();
            for label in view.labels() {
                match counts.iter_mut().find(|(l, _)| *l == label) {
                    Some((_, c)) => *c += 1,
                    None => counts.push((label, 1)),
                }
            }
            let mut best: Option<(&Label, usize)> = None;
            for (label, count) in counts {
                if best.is_none_or(|(_, c)| count > c) {
                    best = Some((label, count));
                }
            }
            best.map(|(l, _)| l.clone())
                .ok_or_else(|| ForestError::UnlabeledInstance {
                    index: view.positions().first().copied().unwrap_or(0),
                })
        }
        Task::Regression => {
            let targets: Vec<f64> = view.labels().filter_map(Label::as_real).collect();
            Ok(Label::Real(config.voting().aggregate(&targets).unwrap_or(0.0)))
        }
    }
}

/// A trained proximity tree.
///
/// Nodes live in an arena with the root at index 0. Each node keeps the
/// in-bag and out-of-bag positions that reached it, and the tree keeps the
/// bootstrap multiplicity of every training position.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProximityTree {
    pub(crate) id: usize,
    pub(crate) nodes: Vec<Node>,
    pub(crate) multiplicities: Vec<u32>,
    pub(crate) tree_kernel: Option<KernelId>,
}

struct TreeBuilder<'a> {
    data: &'a Dataset,
    kernels: &'a KernelTable,
    config: &'a ForestConfig,
    splitter: Splitter<'a>,
    tree_id: usize,
    rng: ChaCha8Rng,
    arena: Vec<Node>,
}

impl TreeBuilder<'_> {
    /// Build the node for `in_bag`/`out_of_bag` and its subtree.
    ///
    /// Returns the [`NodeIndex`] of the node just created in the arena.
    fn build(
        &mut self,
        in_bag: Vec<usize>,
        out_of_bag: Vec<usize>,
        depth: usize,
    ) -> Result<NodeIndex, ForestError> {
        if in_bag.is_empty() {
            return Err(ForestError::EmptyNode {
                tree: self.tree_id,
                depth,
            });
        }

        let view = self.data.view_of(in_bag);
        let impurity = Impurity::new(view.impurity(self.config.purity()));
        let in_bag_ids: Vec<u32> = view.positions().iter().map(|&p| p as u32).collect();
        let oob_ids: Vec<u32> = out_of_bag.iter().map(|&p| p as u32).collect();

        let max_depth = self.config.max_depth();
        let depth_reached = max_depth != 0 && depth >= max_depth;
        if impurity.value() <= self.config.purity_threshold() || depth_reached {
            return self.push_leaf(&view, depth, impurity, in_bag_ids, oob_ids);
        }

        let (rule, children) = match self.splitter.find_best_split(&view, &mut self.rng)? {
            Outcome::Reject => {
                return self.push_leaf(&view, depth, impurity, in_bag_ids, oob_ids);
            }
            Outcome::Split { rule, children, .. } => (rule, children),
        };

        // Trickle the out-of-bag positions down with the winning kernel and exemplars.
        let series = self.data.series();
        let mut child_oob: Vec<Vec<usize>> = vec![Vec::new(); children.len()];
        for &o in &out_of_bag {
            let branch = rule.route(
                self.kernels,
                &series[o],
                Some(o as u32),
                self.config.random_tie_break(),
                &mut self.rng,
            )?;
            child_oob[branch].push(o);
        }

        // Arena pattern: reserve index, recurse, then overwrite with the split.
        let node_idx = self.arena.len();
        self.arena.push(Node {
            depth,
            impurity,
            in_bag: in_bag_ids,
            out_of_bag: oob_ids,
            kind: NodeKind::Leaf {
                label: Label::Int(0),
            },
        });

        let mut child_indices = Vec::with_capacity(children.len());
        for (child, oob) in children.into_iter().zip(child_oob) {
            child_indices.push(self.build(child.positions().to_vec(), oob, depth + 1)?);
        }

        self.arena[node_idx].kind = NodeKind::Internal {
            rule,
            children: child_indices,
        };
        Ok(NodeIndex::new(node_idx))
    }

    fn push_leaf(
        &mut self,
        view: &DatasetView<'_>,
        depth: usize,
        impurity: Impurity,
        in_bag: Vec<u32>,
        out_of_bag: Vec<u32>,
    ) -> Result<NodeIndex, ForestError> {
        let label = leaf_label(view, self.config)?;
        let idx = self.arena.len();
        self.arena.push(Node {
            depth,
            impurity,
            in_bag,
            out_of_bag,
            kind: NodeKind::Leaf { label },
        });
        Ok(NodeIndex::new(idx))
    }
}

/// Train one tree on a bootstrap sample of `data`.
///
/// Every random draw of the tree (bootstrap, kernel, parameters, exemplars,
/// tie-breaks) comes from a `ChaCha8Rng` seeded with `seed`.
#[instrument(skip_all, fields(tree = tree_id, n_samples = data.len()))]
pub(crate) fn train_tree(
    tree_id: usize,
    data: &Dataset,
    kernels: &KernelTable,
    config: &ForestConfig,
    seed: u64,
) -> Result<ProximityTree, ForestError> {
    if data.is_empty() {
        return Err(ForestError::EmptyDataset);
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (in_bag, out_of_bag, multiplicities) = bootstrap_sample(data, &mut rng);
    let tree_kernel = (!config.random_dm_per_node()).then(|| kernels.pick(&mut rng));

    let mut builder = TreeBuilder {
        data,
        kernels,
        config,
        splitter: Splitter::new(kernels, config, tree_kernel),
        tree_id,
        rng,
        arena: Vec::new(),
    };
    builder.build(in_bag, out_of_bag, 0)?;

    let tree = ProximityTree {
        id: tree_id,
        nodes: builder.arena,
        multiplicities,
        tree_kernel,
    };
    debug!(
        n_nodes = tree.n_nodes(),
        n_leaves = tree.n_leaves(),
        height = tree.height(),
        "proximity tree built"
    );
    Ok(tree)
}

impl ProximityTree {
    /// Position of the tree in its forest.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// All nodes; the root is index 0.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node at `idx`.
    #[must_use]
    pub fn node(&self, idx: NodeIndex) -> Option<&Node> {
        self.nodes.get(idx.index())
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> Option<&Node> {
        self.nodes.first()
    }

    /// Bootstrap draw count of every training position.
    #[must_use]
    pub fn multiplicities(&self) -> &[u32] {
        &self.multiplicities
    }

    /// Whether training position `i` was never drawn for this tree.
    #[must_use]
    pub fn is_out_of_bag(&self, i: usize) -> bool {
        self.multiplicities.get(i).is_some_and(|&m| m == 0)
    }

    /// Kernel chosen once for the whole tree, when kernels are not drawn per node.
    #[must_use]
    pub fn tree_kernel(&self) -> Option<KernelId> {
        self.tree_kernel
    }

    /// Number of nodes.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaves.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Number of internal nodes.
    #[must_use]
    pub fn n_internal(&self) -> usize {
        self.n_nodes() - self.n_leaves()
    }

    /// Depth of the deepest node; 0 for a single leaf.
    #[must_use]
    pub fn height(&self) -> usize {
        self.nodes.iter().map(Node::depth).max().unwrap_or(0)
    }

    /// Indices of every leaf.
    pub fn leaves(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_leaf())
            .map(|(i, _)| NodeIndex::new(i))
    }

    /// Leaf reached by each out-of-bag training position during training.
    ///
    /// The result has `n` entries; in-bag positions map to `None`.
    #[must_use]
    pub fn out_of_bag_leaves(&self, n: usize) -> Vec<Option<NodeIndex>> {
        let mut leaves = vec![None; n];
        for leaf in self.leaves() {
            for &o in &self.nodes[leaf.index()].out_of_bag {
                if let Some(slot) = leaves.get_mut(o as usize) {
                    *slot = Some(leaf);
                }
            }
        }
        leaves
    }

    /// Route `query` from the root to a leaf.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::Kernel`] when a distance fails.
    pub(crate) fn route_to_leaf<R: Rng>(
        &self,
        kernels: &KernelTable,
        query: &SeriesValue,
        query_id: Option<u32>,
        random_tie_break: bool,
        rng: &mut R,
    ) -> Result<NodeIndex, ForestError> {
        let mut idx = NodeIndex::new(0);
        while let Some(node) = self.nodes.get(idx.index()) {
            match &node.kind {
                NodeKind::Leaf { .. } => return Ok(idx),
                NodeKind::Internal { rule, children } => {
                    let branch = rule.route(kernels, query, query_id, random_tie_break, rng)?;
                    idx = children[branch];
                }
            }
        }
        Err(ForestError::EmptyNode {
            tree: self.id,
            depth: 0,
        })
    }

    /// Label of the leaf `query` routes to.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::Kernel`] when a distance fails.
    pub(crate) fn predict<R: Rng>(
        &self,
        kernels: &KernelTable,
        query: &SeriesValue,
        random_tie_break: bool,
        rng: &mut R,
    ) -> Result<&Label, ForestError> {
        let leaf = self.route_to_leaf(kernels, query, None, random_tie_break, rng)?;
        self.nodes[leaf.index()]
            .label()
            .ok_or(ForestError::EmptyNode {
                tree: self.id,
                depth: self.nodes[leaf.index()].depth,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelRegistry;

    fn make_separable_data() -> Dataset {
        let mut labels = Vec::new();
        let mut series = Vec::new();
        for i in 0..10 {
            let x = f64::from(i) * 0.1;
            labels.push(Label::Int(0));
            series.push(SeriesValue::Numeric(vec![x, x + 0.2, x]));
            labels.push(Label::Int(1));
            series.push(SeriesValue::Numeric(vec![8.0 + x, 7.0, 8.0 - x]));
        }
        Dataset::labelled(labels, series).unwrap()
    }

    #[test]
    fn bootstrap_is_complete() {
        let data = make_separable_data();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let (in_bag, oob, mult) = bootstrap_sample(&data, &mut rng);
        assert_eq!(in_bag.len(), data.len());
        assert_eq!(mult.iter().sum::<u32>() as usize, data.len());
        for i in 0..data.len() {
            assert_eq!(mult[i] == 0, oob.contains(&i));
        }
    }

    #[test]
    fn tree_partitions_in_bag_at_every_node() {
        let data = make_separable_data();
        let table = KernelRegistry::with_builtins().select(&["euclidean", "dtw"]).unwrap();
        let config = ForestConfig::new(1).unwrap().with_purity_threshold(0.0);
        let tree = train_tree(0, &data, &table, &config, 17).unwrap();

        let root = tree.root().unwrap();
        assert_eq!(root.in_bag().len(), data.len());
        for node in tree.nodes() {
            let children = node.children();
            if children.is_empty() {
                continue;
            }
            let mut parent: Vec<u32> = node.in_bag().to_vec();
            let mut union: Vec<u32> = Vec::new();
            let mut oob_union: Vec<u32> = Vec::new();
            for &c in children {
                let child = tree.node(c).unwrap();
                assert!(!child.in_bag().is_empty());
                assert_eq!(child.depth(), node.depth() + 1);
                union.extend_from_slice(child.in_bag());
                oob_union.extend_from_slice(child.out_of_bag());
            }
            parent.sort_unstable();
            union.sort_unstable();
            assert_eq!(parent, union);
            let mut parent_oob = node.out_of_bag().to_vec();
            parent_oob.sort_unstable();
            oob_union.sort_unstable();
            assert_eq!(parent_oob, oob_union);
        }
        for leaf in tree.leaves() {
            assert_eq!(tree.node(leaf).unwrap().impurity().value(), 0.0);
        }
        assert_eq!(tree.n_internal() + tree.n_leaves(), tree.n_nodes());
    }

    #[test]
    fn out_of_bag_leaves_cover_root_complement() {
        let data = make_separable_data();
        let table = KernelRegistry::with_builtins().select(&["euclidean"]).unwrap();
        let config = ForestConfig::new(1).unwrap();
        let tree = train_tree(0, &data, &table, &config, 3).unwrap();
        let leaves = tree.out_of_bag_leaves(data.len());
        for (i, leaf) in leaves.iter().enumerate() {
            assert_eq!(leaf.is_some(), tree.is_out_of_bag(i));
        }
    }

    #[test]
    fn max_depth_limits_height() {
        let data = make_separable_data();
        let table = KernelRegistry::with_builtins().select(&["euclidean"]).unwrap();
        let config = ForestConfig::new(1)
            .unwrap()
            .with_purity_threshold(0.0)
            .with_max_depth(1);
        let tree = train_tree(0, &data, &table, &config, 8).unwrap();
        assert!(tree.height() <= 1);
    }

    #[test]
    fn tree_wide_kernel_is_recorded() {
        let data = make_separable_data();
        let table = KernelRegistry::with_builtins().select(&["euclidean", "manhattan"]).unwrap();
        let config = ForestConfig::new(1).unwrap().with_random_dm_per_node(false);
        let tree = train_tree(0, &data, &table, &config, 8).unwrap();
        let kernel = tree.tree_kernel().unwrap();
        for node in tree.nodes() {
            if let NodeKind::Internal { rule, .. } = node.kind() {
                assert_eq!(rule.slot().kernel(), kernel);
            }
        }
    }

    #[test]
    fn regression_leaf_uses_voting_rule() {
        let data = Dataset::labelled(
            vec![Label::Real(1.0), Label::Real(2.0), Label::Real(9.0)],
            vec![SeriesValue::Numeric(vec![0.0]); 3],
        )
        .unwrap();
        let view = data.view();
        let mean = ForestConfig::new(1).unwrap().with_task(Task::Regression);
        assert_eq!(leaf_label(&view, &mean).unwrap(), Label::Real(4.0));
        let median = mean.with_voting(crate::config::Voting::Median);
        assert_eq!(leaf_label(&view, &median).unwrap(), Label::Real(2.0));
    }

    #[test]
    fn classification_leaf_prefers_first_seen_on_tie() {
        let data = Dataset::labelled(
            vec![Label::Int(3), Label::Int(1), Label::Int(1), Label::Int(3)],
            vec![SeriesValue::Numeric(vec![0.0]); 4],
        )
        .unwrap();
        let config = ForestConfig::new(1).unwrap();
        assert_eq!(leaf_label(&data.view(), &config).unwrap(), Label::Int(3));
    }
}
