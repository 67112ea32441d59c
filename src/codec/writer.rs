//! Encoder for the compressed tree layout.
//!
//! The writer mirrors the reader byte for byte: whatever [`TreeNode::encode`]
//! emits, the tree walker consumes without reading past the last leaf. Tree
//! descriptions are built bottom-up from [`TreeNode`] constructors.
//!
//! # Example
//!
//! ```
//! use compact_trees::codec::{NaSplitDir, TreeNode};
//!
//! let tree = TreeNode::numeric(0, 5.0, NaSplitDir::Right, TreeNode::leaf(1.0), TreeNode::leaf(2.0));
//! let bytes = tree.encode().unwrap();
//! assert_eq!(bytes.len(), 16);
//! ```

use super::bitset::{bytes_for_bits, OwnedBitset, SMALL_BITSET_BITS};
use super::node::{
    SkipEncoding, SplitKind, LEAF_SENTINEL, LEFT_LEAF_FLAG, RIGHT_LEAF_FLAG,
};
use super::{AuxRecord, NaSplitDir, WriteError};

// =============================================================================
// Tree description
// =============================================================================

/// Training-time statistics of a split, carried into auxiliary records.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SplitStats {
    /// Weighted row count sent left.
    pub n0: f32,
    /// Weighted row count sent right.
    pub n1: f32,
    /// Mean prediction on the left.
    pub p0: f32,
    /// Mean prediction on the right.
    pub p1: f32,
    /// Squared error on the left.
    pub se0: f32,
    /// Squared error on the right.
    pub se1: f32,
}

/// What a split tests.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitCondition {
    /// `value >= threshold` goes right.
    Numeric(f32),
    /// Members of the set go right.
    Categorical(OwnedBitset),
    /// Missing goes right, everything else left. No payload is stored.
    NaVsRest,
}

impl SplitCondition {
    fn name(&self) -> &'static str {
        match self {
            Self::Numeric(_) => "numeric",
            Self::Categorical(_) => "categorical",
            Self::NaVsRest => "NA-vs-rest",
        }
    }

    fn kind(&self) -> SplitKind {
        match self {
            Self::Categorical(bs) if bs.fits_small() => SplitKind::SmallBitset,
            Self::Categorical(_) => SplitKind::LargeBitset,
            _ => SplitKind::Numeric,
        }
    }

    /// Bytes of the payload following the NA direction byte.
    fn payload_size(&self) -> usize {
        match self {
            Self::Numeric(_) => 4,
            Self::Categorical(bs) if bs.fits_small() => 4,
            Self::Categorical(bs) => 2 + 4 + bytes_for_bits(bs.n_bits()),
            Self::NaVsRest => 0,
        }
    }
}

/// An internal node of a tree description.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitNode {
    pub column: u16,
    pub na_dir: NaSplitDir,
    pub condition: SplitCondition,
    pub left: TreeNode,
    pub right: TreeNode,
    pub stats: SplitStats,
}

/// A tree description to encode.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Leaf(f32),
    Split(Box<SplitNode>),
}

impl TreeNode {
    pub fn leaf(value: f32) -> Self {
        Self::Leaf(value)
    }

    /// Numeric split: `value >= threshold` goes right.
    pub fn numeric(
        column: u16,
        threshold: f32,
        na_dir: NaSplitDir,
        left: TreeNode,
        right: TreeNode,
    ) -> Self {
        Self::split(column, na_dir, SplitCondition::Numeric(threshold), left, right)
    }

    /// Categorical split: members of `categories` go right.
    pub fn categorical(
        column: u16,
        categories: &[u32],
        na_dir: NaSplitDir,
        left: TreeNode,
        right: TreeNode,
    ) -> Self {
        let bitset = if categories.iter().all(|&c| c < SMALL_BITSET_BITS) {
            OwnedBitset::with_range(categories, 0, SMALL_BITSET_BITS)
        } else {
            OwnedBitset::from_categories(categories)
        };
        Self::split(column, na_dir, SplitCondition::Categorical(bitset), left, right)
    }

    /// NA-vs-rest split: missing goes right, any present value left.
    pub fn na_vs_rest(column: u16, left: TreeNode, right: TreeNode) -> Self {
        Self::split(column, NaSplitDir::NaVsRest, SplitCondition::NaVsRest, left, right)
    }

    pub fn split(
        column: u16,
        na_dir: NaSplitDir,
        condition: SplitCondition,
        left: TreeNode,
        right: TreeNode,
    ) -> Self {
        Self::Split(Box::new(SplitNode {
            column,
            na_dir,
            condition,
            left,
            right,
            stats: SplitStats::default(),
        }))
    }

    /// Attach training statistics to a split. No-op on leaves.
    pub fn with_stats(mut self, stats: SplitStats) -> Self {
        if let Self::Split(node) = &mut self {
            node.stats = stats;
        }
        self
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Number of internal nodes in this subtree.
    pub fn num_splits(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::Split(node) => 1 + node.left.num_splits() + node.right.num_splits(),
        }
    }

    /// Maximum number of splits on any root-to-leaf path.
    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::Split(node) => 1 + node.left.depth().max(node.right.depth()),
        }
    }

    /// Encoded byte size of this subtree when it is not the root.
    fn encoded_size(&self) -> usize {
        match self {
            Self::Leaf(_) => 4,
            Self::Split(node) => {
                let mut size = 1 + 2 + 1 + node.condition.payload_size();
                let left = node.left.encoded_size();
                if !node.left.is_leaf() {
                    size += SkipEncoding::for_size(left).field_width();
                }
                size + left + node.right.encoded_size()
            }
        }
    }

    /// Encode into the compressed layout.
    pub fn encode(&self) -> Result<Vec<u8>, WriteError> {
        let mut out = Vec::with_capacity(self.encoded_size() + 3);
        if let Self::Leaf(value) = self {
            out.push(0);
            out.extend_from_slice(&LEAF_SENTINEL.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
            return Ok(out);
        }
        write_node(self, &mut out)?;
        Ok(out)
    }

    /// Encode the tree and its auxiliary records.
    ///
    /// Node ids are assigned in pre-order over all nodes, starting at 0 for
    /// the root. A single-leaf tree has no auxiliary records.
    pub fn encode_with_aux(&self) -> Result<(Vec<u8>, Vec<u8>), WriteError> {
        let tree = self.encode()?;
        let mut aux = Vec::with_capacity(self.num_splits() * AuxRecord::SIZE);
        if !self.is_leaf() {
            let mut next_id = 0;
            write_aux(self, &mut aux, &mut next_id);
        }
        Ok((tree, aux))
    }
}

// =============================================================================
// Encoding
// =============================================================================

fn write_node(node: &TreeNode, out: &mut Vec<u8>) -> Result<(), WriteError> {
    let split = match node {
        TreeNode::Leaf(value) => {
            out.extend_from_slice(&value.to_le_bytes());
            return Ok(());
        }
        TreeNode::Split(split) => split,
    };

    if split.column == LEAF_SENTINEL {
        return Err(WriteError::ReservedColumn(split.column));
    }
    let na_vs_rest = matches!(split.condition, SplitCondition::NaVsRest);
    if na_vs_rest != split.na_dir.is_na_vs_rest() || split.na_dir == NaSplitDir::None {
        return Err(WriteError::InvalidNaDirection {
            dir: split.na_dir,
            condition: split.condition.name(),
        });
    }

    let left_size = split.left.encoded_size();
    let skip = if split.left.is_leaf() {
        None
    } else {
        if left_size > i32::MAX as usize {
            return Err(WriteError::SubtreeTooLarge(left_size));
        }
        Some(SkipEncoding::for_size(left_size))
    };

    let mut node_type = split.condition.kind().equality_bits();
    node_type |= skip.map_or(LEFT_LEAF_FLAG, SkipEncoding::mask);
    if split.right.is_leaf() {
        node_type |= RIGHT_LEAF_FLAG;
    }

    out.push(node_type);
    out.extend_from_slice(&split.column.to_le_bytes());
    out.push(split.na_dir as u8);

    match &split.condition {
        SplitCondition::Numeric(threshold) => out.extend_from_slice(&threshold.to_le_bytes()),
        SplitCondition::Categorical(bs) if bs.fits_small() => {
            let mut word = [0u8; 4];
            word[..bs.bytes().len()].copy_from_slice(bs.bytes());
            out.extend_from_slice(&word);
        }
        SplitCondition::Categorical(bs) => {
            let offset = u16::try_from(bs.bit_offset())
                .map_err(|_| WriteError::BitsetOffsetTooLarge(bs.bit_offset()))?;
            let n_bits =
                i32::try_from(bs.n_bits()).map_err(|_| WriteError::BitsetTooLarge(bs.n_bits()))?;
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&n_bits.to_le_bytes());
            out.extend_from_slice(bs.bytes());
        }
        SplitCondition::NaVsRest => {}
    }

    if let Some(SkipEncoding::Explicit { width }) = skip {
        let bytes = (left_size as u32).to_le_bytes();
        out.extend_from_slice(&bytes[..width as usize]);
    }

    write_node(&split.left, out)?;
    write_node(&split.right, out)
}

/// Write pre-order auxiliary records; returns the id assigned to `node`.
fn write_aux(node: &TreeNode, out: &mut Vec<u8>, next_id: &mut i32) -> i32 {
    let id = *next_id;
    *next_id += 1;
    let TreeNode::Split(split) = node else {
        return id;
    };

    // Reserve the record slot; children ids are only known after descending.
    let slot = out.len();
    out.resize(slot + AuxRecord::SIZE, 0);
    let left_id = write_aux(&split.left, out, next_id);
    let right_id = write_aux(&split.right, out, next_id);

    let record = AuxRecord {
        node_id: id,
        left_splits: split.left.num_splits() as i32,
        n0: split.stats.n0,
        n1: split.stats.n1,
        p0: split.stats.p0,
        p1: split.stats.p1,
        se0: split.stats.se0,
        se1: split.stats.se1,
        left_id,
        right_id,
    };
    out[slot..slot + AuxRecord::SIZE].copy_from_slice(&record.to_bytes());
    id
}
