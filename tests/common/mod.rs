//! Shared helpers for integration tests.
//!
//! Provides a direct evaluator over [`TreeNode`] descriptions that the
//! byte-level walker is checked against, and small fixture ensembles.

#![allow(dead_code)]

use compact_trees::codec::{NaSplitDir, SplitCondition, SplitNode, TreeNode};
use compact_trees::model::{Algorithm, EnsembleMeta};

/// Where a row ends up when evaluating a tree description directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Expected {
    pub value: f32,
    pub path: String,
    /// Pre-order id of the leaf over all nodes.
    pub node_id: i32,
}

/// Evaluate a tree description. With `legacy`, categories outside a bitset's
/// range are non-members instead of missing.
pub fn evaluate(tree: &TreeNode, row: &[f64], legacy: bool) -> Expected {
    evaluate_with_domains(tree, row, legacy, &[])
}

/// Like [`evaluate`], with per-column cardinalities. Outside legacy mode a
/// level at or past its column's cardinality is routed as missing on any
/// split.
pub fn evaluate_with_domains(
    tree: &TreeNode,
    row: &[f64],
    legacy: bool,
    domains: &[Option<u32>],
) -> Expected {
    let mut node = tree;
    let mut path = String::new();
    let mut node_id = 0i32;
    loop {
        match node {
            TreeNode::Leaf(value) => {
                return Expected {
                    value: *value,
                    path,
                    node_id,
                }
            }
            TreeNode::Split(split) => {
                let column = usize::from(split.column);
                let cardinality = domains.get(column).copied().flatten();
                if goes_right(split, row[column], legacy, cardinality) {
                    node_id += 1 + n_nodes(&split.left) as i32;
                    path.push('R');
                    node = &split.right;
                } else {
                    node_id += 1;
                    path.push('L');
                    node = &split.left;
                }
            }
        }
    }
}

fn n_nodes(node: &TreeNode) -> usize {
    2 * node.num_splits() + 1
}

fn goes_right(split: &SplitNode, value: f64, legacy: bool, cardinality: Option<u32>) -> bool {
    let na_right = !matches!(split.na_dir, NaSplitDir::NaLeft | NaSplitDir::Left);
    if value.is_nan() {
        return na_right;
    }
    if let (false, Some(cardinality)) = (legacy, cardinality) {
        if i64::from(value as i32) >= i64::from(cardinality) {
            return na_right;
        }
    }
    match &split.condition {
        SplitCondition::NaVsRest => false,
        SplitCondition::Numeric(threshold) => value >= f64::from(*threshold),
        SplitCondition::Categorical(bitset) => {
            let category = value as i32;
            let view = bitset.as_view();
            if !legacy && !view.in_range(category) {
                na_right
            } else {
                view.contains(category)
            }
        }
    }
}

/// The depth-one tree of the reference scenario: column 0, threshold 5.0.
pub fn scenario_tree(na_dir: NaSplitDir) -> TreeNode {
    TreeNode::numeric(0, 5.0, na_dir, TreeNode::leaf(1.0), TreeNode::leaf(2.0))
}

/// Three-level tree over two columns with numeric, categorical and
/// NA-vs-rest splits.
///
/// ```text
///                 c0 >= 5 (NA left)
///               /                  \
///       c1 in {1, 4, 40}          c1 is NA?
///         /        \               /     \
///     c0 >= 2     -1.5           2.5     4.0
///      /   \
///   -3.0   0.5
/// ```
pub fn mixed_tree() -> TreeNode {
    let low = TreeNode::numeric(0, 2.0, NaSplitDir::Right, TreeNode::leaf(-3.0), TreeNode::leaf(0.5));
    let left = TreeNode::categorical(1, &[1, 4, 40], NaSplitDir::NaRight, low, TreeNode::leaf(-1.5));
    let right = TreeNode::na_vs_rest(1, TreeNode::leaf(2.5), TreeNode::leaf(4.0));
    TreeNode::numeric(0, 5.0, NaSplitDir::NaLeft, left, right)
}

pub fn forest_meta(n_tree_groups: usize, n_classes: usize) -> EnsembleMeta {
    EnsembleMeta::builder()
        .n_tree_groups(n_tree_groups)
        .n_classes(n_classes)
        .algorithm(Algorithm::RandomForest)
        .build()
        .expect("valid forest metadata")
}
