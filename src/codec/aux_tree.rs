//! Auxiliary per-node records.
//!
//! Alongside each compressed tree, training writes one fixed-size record per
//! internal node, in pre-order:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     Node id (i32)
//! 4       4     Internal nodes in the left subtree (i32)
//! 8       4     n0 (f32)
//! 12      4     n1 (f32)
//! 16      4     p0 (f32)
//! 20      4     p1 (f32)
//! 24      4     se0 (f32)
//! 28      4     se1 (f32)
//! 32      4     Left child id (i32)
//! 36      4     Right child id (i32)
//! ```
//!
//! The records carry node ids, which the compressed tree itself does not. A
//! decision path selects a record chain and thereby the id of the leaf.

use super::{ByteCursor, CodecError, DecisionPath};

/// One internal node's auxiliary record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuxRecord {
    pub node_id: i32,
    /// Number of internal nodes in the left subtree.
    pub left_splits: i32,
    pub n0: f32,
    pub n1: f32,
    pub p0: f32,
    pub p1: f32,
    pub se0: f32,
    pub se1: f32,
    pub left_id: i32,
    pub right_id: i32,
}

impl AuxRecord {
    /// Encoded record size in bytes.
    pub const SIZE: usize = 40;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = ByteCursor::new(bytes);
        Ok(Self {
            node_id: cursor.read_i32()?,
            left_splits: cursor.read_i32()?,
            n0: cursor.read_f32()?,
            n1: cursor.read_f32()?,
            p0: cursor.read_f32()?,
            p1: cursor.read_f32()?,
            se0: cursor.read_f32()?,
            se1: cursor.read_f32()?,
            left_id: cursor.read_i32()?,
            right_id: cursor.read_i32()?,
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.node_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.left_splits.to_le_bytes());
        buf[8..12].copy_from_slice(&self.n0.to_le_bytes());
        buf[12..16].copy_from_slice(&self.n1.to_le_bytes());
        buf[16..20].copy_from_slice(&self.p0.to_le_bytes());
        buf[20..24].copy_from_slice(&self.p1.to_le_bytes());
        buf[24..28].copy_from_slice(&self.se0.to_le_bytes());
        buf[28..32].copy_from_slice(&self.se1.to_le_bytes());
        buf[32..36].copy_from_slice(&self.left_id.to_le_bytes());
        buf[36..40].copy_from_slice(&self.right_id.to_le_bytes());
        buf
    }
}

/// Read-only view over a tree's auxiliary records.
#[derive(Debug, Clone, Copy)]
pub struct AuxTree<'a> {
    bytes: &'a [u8],
}

impl<'a> AuxTree<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Number of complete records.
    pub fn len(&self) -> usize {
        self.bytes.len() / AuxRecord::SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record at pre-order position `index`.
    pub fn record(&self, index: usize) -> Result<AuxRecord, CodecError> {
        let start = index.saturating_mul(AuxRecord::SIZE);
        let slice = self
            .bytes
            .get(start..start.saturating_add(AuxRecord::SIZE))
            .ok_or(CodecError::Truncated {
                offset: start,
                needed: AuxRecord::SIZE,
                len: self.bytes.len(),
            })?;
        AuxRecord::from_bytes(slice)
    }

    /// Iterate records in pre-order.
    pub fn records(&self) -> impl Iterator<Item = Result<AuxRecord, CodecError>> + '_ {
        (0..self.len()).map(|i| self.record(i))
    }

    /// Id of the leaf a decision path ends in.
    ///
    /// The empty path (single-leaf tree) maps to node 0.
    pub fn leaf_node_id(&self, path: DecisionPath) -> Result<i32, CodecError> {
        let depth = path.depth();
        let mut index = 0usize;
        for level in 0..depth {
            let record = self.record(index)?;
            let right = path.went_right(level);
            if level + 1 == depth {
                return Ok(if right { record.right_id } else { record.left_id });
            }
            index += 1;
            if right {
                let skip = usize::try_from(record.left_splits).map_err(|_| {
                    CodecError::NegativeLength {
                        what: "left subtree node count",
                        value: record.left_splits,
                        offset: index * AuxRecord::SIZE,
                    }
                })?;
                index += skip;
            }
        }
        Ok(0)
    }
}
