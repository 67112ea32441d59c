//! Single-pass traversal of one compressed tree for one row.
//!
//! The walk reads each node header, decodes the split payload, decides a
//! branch and either falls through to the left child (which follows the
//! header immediately) or skips the left subtree to reach the right child.
//! It never backtracks and allocates nothing.
//!
//! # Branch rule
//!
//! - NaN (or an unseen category, see [`BitsetDecoder`]) follows the NA
//!   direction: left for `NaLeft`/`Left`, right otherwise.
//! - NA-vs-rest: any present value goes left.
//! - Numeric: `value >= threshold` goes right.
//! - Categorical: members of the bitset go right.

use std::marker::PhantomData;

use crate::codec::node::mask_is_leaf;
use crate::codec::{
    BitsetDecoder, ByteCursor, CategoryBitset, CodecError, CurrentBitsets, DecisionPath,
    NaSplitDir, NodeType, SkipEncoding, SplitKind, LEAF_SENTINEL, MAX_PATH_DEPTH,
};

/// Split payload of the node being visited.
#[derive(Debug, Clone, Copy)]
enum SplitTest<'a> {
    NaVsRest,
    Threshold(f32),
    Bitset(CategoryBitset<'a>),
}

/// Walks compressed trees for scoring and leaf assignment.
///
/// Holds only configuration; every call is independent and works on the
/// caller's stack, so one walker can be shared across threads.
///
/// # Type Parameters
///
/// - `D`: bitset semantics, [`CurrentBitsets`] unless reading trees that
///   must reproduce the legacy routing of unseen categories.
#[derive(Debug, Clone, Copy)]
pub struct TreeWalker<'m, D: BitsetDecoder = CurrentBitsets> {
    n_classes: usize,
    domain_sizes: Option<&'m [Option<u32>]>,
    _decoder: PhantomData<D>,
}

impl<'m> TreeWalker<'m, CurrentBitsets> {
    /// Walker with the current bitset semantics.
    pub fn new(n_classes: usize) -> Self {
        Self::with_decoder(n_classes)
    }
}

impl<'m, D: BitsetDecoder> TreeWalker<'m, D> {
    /// Walker with an explicit bitset decoder.
    pub fn with_decoder(n_classes: usize) -> Self {
        Self {
            n_classes,
            domain_sizes: None,
            _decoder: PhantomData,
        }
    }

    /// Per-column categorical cardinalities (`None` for numeric columns).
    ///
    /// Category codes at or past a column's cardinality were never seen in
    /// training and are routed as missing.
    pub fn with_domain_sizes(mut self, domain_sizes: &'m [Option<u32>]) -> Self {
        self.domain_sizes = Some(domain_sizes);
        self
    }

    /// Leaf value reached by `row`.
    #[inline]
    pub fn score(&self, tree: &[u8], row: &[f64]) -> Result<f64, CodecError> {
        self.walk(tree, row, false)
    }

    /// Branch history of `row` through the tree.
    #[inline]
    pub fn decision_path(&self, tree: &[u8], row: &[f64]) -> Result<DecisionPath, CodecError> {
        self.walk(tree, row, true).map(DecisionPath::from_f64)
    }

    /// Walk to a leaf and return its value, or with `leaf_assignment` the
    /// decision path in its `f64` carrier.
    pub fn walk(&self, tree: &[u8], row: &[f64], leaf_assignment: bool) -> Result<f64, CodecError> {
        let mut cursor = ByteCursor::new(tree);
        let mut path_bits = 0u64;
        let mut level = 0usize;

        loop {
            let node_offset = cursor.position();
            let node_type = NodeType(cursor.read_u8()?);
            let column = cursor.read_u16()?;
            if column == LEAF_SENTINEL {
                return leaf(&mut cursor, leaf_assignment, path_bits, level);
            }

            let na_byte = cursor.read_u8()?;
            let na_dir = NaSplitDir::from_u8(na_byte).ok_or(CodecError::UnknownNaDirection {
                value: na_byte,
                offset: node_offset,
            })?;
            let kind = node_type.split_kind(node_offset)?;
            let left_skip = SkipEncoding::from_mask(node_type.left_mask(), node_offset)?;

            let test = if na_dir.is_na_vs_rest() {
                SplitTest::NaVsRest
            } else {
                match kind {
                    SplitKind::Numeric => SplitTest::Threshold(cursor.read_f32()?),
                    _ => SplitTest::Bitset(D::decode(kind, &mut cursor)?),
                }
            };
            let left_size = left_skip.read_left_size(&mut cursor, self.n_classes)?;

            let column = usize::from(column);
            let value = *row.get(column).ok_or(CodecError::ColumnOutOfBounds {
                column,
                row_len: row.len(),
            })?;

            let mask = if self.goes_right(column, value, na_dir, &test) {
                cursor.skip(left_size)?;
                if leaf_assignment && level < MAX_PATH_DEPTH {
                    path_bits |= 1u64 << level;
                }
                node_type.right_mask()
            } else {
                node_type.left_mask()
            };

            level += 1;
            if mask_is_leaf(mask) {
                return leaf(&mut cursor, leaf_assignment, path_bits, level);
            }
        }
    }

    #[inline]
    fn goes_right(&self, column: usize, value: f64, na_dir: NaSplitDir, test: &SplitTest<'_>) -> bool {
        if value.is_nan() || self.is_unseen_category(column, value, test) {
            return !na_dir.na_goes_left();
        }
        match test {
            SplitTest::NaVsRest => false,
            SplitTest::Threshold(threshold) => value >= f64::from(*threshold),
            SplitTest::Bitset(bitset) => bitset.contains(value as i32),
        }
    }

    #[inline]
    fn is_unseen_category(&self, column: usize, value: f64, test: &SplitTest<'_>) -> bool {
        if !D::OUT_OF_RANGE_IS_MISSING {
            return false;
        }
        let category = value as i32;
        if let SplitTest::Bitset(bitset) = test {
            if !bitset.in_range(category) {
                return true;
            }
        }
        // Levels past the column's domain were never seen in training.
        match self.domain_sizes.and_then(|sizes| sizes.get(column).copied().flatten()) {
            Some(cardinality) => i64::from(category) >= i64::from(cardinality),
            None => false,
        }
    }
}

/// Terminal state: read the leaf value or close the decision path.
#[inline]
fn leaf(
    cursor: &mut ByteCursor<'_>,
    leaf_assignment: bool,
    path_bits: u64,
    level: usize,
) -> Result<f64, CodecError> {
    if leaf_assignment {
        Ok(DecisionPath::encode(path_bits, level).to_f64())
    } else {
        cursor.read_f32().map(f64::from)
    }
}

/// Score one tree with the current bitset semantics.
///
/// With `leaf_assignment` the result is a [`DecisionPath`] carried as `f64`.
#[inline]
pub fn score_tree(
    tree: &[u8],
    row: &[f64],
    n_classes: usize,
    leaf_assignment: bool,
) -> Result<f64, CodecError> {
    TreeWalker::new(n_classes).walk(tree, row, leaf_assignment)
}

/// Structure summary of a compressed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeShape {
    pub n_splits: usize,
    pub n_leaves: usize,
    /// Maximum number of splits on a root-to-leaf path.
    pub depth: usize,
}

/// Decode every node of a tree without scoring it.
///
/// Visits both children of each split, so any skip size, payload or leaf
/// that runs past its enclosing subtree is reported. Loaders run this once
/// per tree so that malformed bytes never reach the scoring path.
pub fn inspect_tree(tree: &[u8], n_classes: usize) -> Result<TreeShape, CodecError> {
    let mut shape = TreeShape::default();
    inspect_node(&mut ByteCursor::new(tree), n_classes, 0, &mut shape)?;
    Ok(shape)
}

fn inspect_node(
    cursor: &mut ByteCursor<'_>,
    n_classes: usize,
    depth: usize,
    shape: &mut TreeShape,
) -> Result<(), CodecError> {
    let node_offset = cursor.position();
    let node_type = NodeType(cursor.read_u8()?);
    if cursor.read_u16()? == LEAF_SENTINEL {
        cursor.read_f32()?;
        shape.n_leaves += 1;
        return Ok(());
    }

    let na_byte = cursor.read_u8()?;
    let na_dir = NaSplitDir::from_u8(na_byte).ok_or(CodecError::UnknownNaDirection {
        value: na_byte,
        offset: node_offset,
    })?;
    let kind = node_type.split_kind(node_offset)?;
    let left_skip = SkipEncoding::from_mask(node_type.left_mask(), node_offset)?;
    if !na_dir.is_na_vs_rest() {
        match kind {
            SplitKind::Numeric => {
                cursor.read_f32()?;
            }
            _ => {
                CurrentBitsets::decode(kind, cursor)?;
            }
        }
    }
    let left_size = left_skip.read_left_size(cursor, n_classes)?;

    shape.n_splits += 1;
    shape.depth = shape.depth.max(depth + 1);

    let left = cursor.take(left_size)?;
    if mask_is_leaf(node_type.left_mask()) {
        shape.n_leaves += 1;
    } else {
        inspect_node(&mut ByteCursor::new(left), n_classes, depth + 1, shape)?;
    }

    if mask_is_leaf(node_type.right_mask()) {
        cursor.read_f32()?;
        shape.n_leaves += 1;
        Ok(())
    } else {
        inspect_node(cursor, n_classes, depth + 1, shape)
    }
}
