//! Inline node encoding.
//!
//! Nodes are never materialized. Each internal node is laid out as:
//!
//! ```text
//! Offset  Size      Field
//! ------  --------  -----
//! 0       1         Node type (equality kind, left/right skip masks)
//! 1       2         Column id (65535 = leaf sentinel)
//! 3       1         NA split direction
//! 4       0|4|var   Threshold (f32) or bitset, absent for NAvsREST
//! ..      0-4       Byte size of the left subtree (absent if left is a leaf)
//! ..      var       Left subtree, then right subtree
//! ```
//!
//! A leaf reached through a parent's leaf flag is just its 4-byte `f32`
//! value. A single-leaf tree starts with a type byte and the sentinel column.
//!
//! # Node type byte
//!
//! ```text
//! bit   7 6 | 5 4 | 3 2      | 1 0
//!       R R | L L | equality | left skip size
//! ```
//!
//! `L L = 11` marks the left child as a leaf, `R R = 11` the right child.

use super::{ByteCursor, CodecError};

/// Column id marking a leaf where a split header would be.
pub const LEAF_SENTINEL: u16 = u16::MAX;

/// Bits of the type byte selecting the equality kind.
pub const EQUALITY_MASK: u8 = 0x0C;

/// Bits of the type byte forming the left skip mask.
pub const LEFT_MASK: u8 = 0x33;

/// Left child is a leaf.
pub const LEFT_LEAF_FLAG: u8 = 0x30;

/// Right child is a leaf.
pub const RIGHT_LEAF_FLAG: u8 = 0xC0;

/// Bit of a skip mask that flags the child as a leaf.
const LEAF_BIT: u8 = 0x10;

// =============================================================================
// NaSplitDir
// =============================================================================

/// Where missing values go at a split.
///
/// Directions recorded while training differ from ones only chosen for
/// scoring, but both route NaN the same way: left for [`NaLeft`] and
/// [`Left`], right for everything else.
///
/// [`NaLeft`]: NaSplitDir::NaLeft
/// [`Left`]: NaSplitDir::Left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum NaSplitDir {
    /// Never assigned; must not occur in a trained tree.
    None = 0,
    /// The split separates NA (right) from every other value (left).
    NaVsRest = 1,
    /// NAs were seen in training and go left.
    NaLeft = 2,
    /// NAs were seen in training and go right.
    NaRight = 3,
    /// No NAs in training; NAs go left at scoring time.
    Left = 4,
    /// No NAs in training; NAs go right at scoring time.
    #[default]
    Right = 5,
}

impl NaSplitDir {
    /// Decode the on-wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::NaVsRest),
            2 => Some(Self::NaLeft),
            3 => Some(Self::NaRight),
            4 => Some(Self::Left),
            5 => Some(Self::Right),
            _ => None,
        }
    }

    /// Whether a missing value is sent to the left child.
    #[inline]
    pub fn na_goes_left(self) -> bool {
        matches!(self, Self::NaLeft | Self::Left)
    }

    #[inline]
    pub fn is_na_vs_rest(self) -> bool {
        self == Self::NaVsRest
    }
}

// =============================================================================
// SplitKind
// =============================================================================

/// Payload kind of an internal node, from the equality bits of the type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitKind {
    /// `value >= threshold` goes right.
    Numeric,
    /// Inline 32-bit bitset at offset 0.
    SmallBitset,
    /// Length-prefixed bitset with a bit offset.
    LargeBitset,
}

impl SplitKind {
    /// Equality bits written for this kind.
    #[inline]
    pub fn equality_bits(self) -> u8 {
        match self {
            Self::Numeric => 0x00,
            Self::SmallBitset => 0x08,
            Self::LargeBitset => 0x0C,
        }
    }

    #[inline]
    pub fn is_bitset(self) -> bool {
        !matches!(self, Self::Numeric)
    }
}

// =============================================================================
// NodeType
// =============================================================================

/// The leading type byte of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeType(pub u8);

impl NodeType {
    /// Decode the split payload kind.
    ///
    /// `offset` is only used for error reporting. Equality kind 1 ("equals")
    /// is no longer written and is rejected rather than guessed at.
    pub fn split_kind(self, offset: usize) -> Result<SplitKind, CodecError> {
        match self.0 & EQUALITY_MASK {
            0x00 => Ok(SplitKind::Numeric),
            0x08 => Ok(SplitKind::SmallBitset),
            0x0C => Ok(SplitKind::LargeBitset),
            _ => Err(CodecError::RetiredEqualitySplit { offset }),
        }
    }

    /// Skip mask governing the left child (size field width or leaf flag).
    #[inline]
    pub fn left_mask(self) -> u8 {
        self.0 & LEFT_MASK
    }

    /// Skip mask of the right child, aligned with the left mask's leaf bits.
    #[inline]
    pub fn right_mask(self) -> u8 {
        (self.0 & RIGHT_LEAF_FLAG) >> 2
    }
}

/// Whether a skip mask flags its child as a leaf.
#[inline]
pub fn mask_is_leaf(mask: u8) -> bool {
    mask & LEAF_BIT != 0
}

// =============================================================================
// SkipEncoding
// =============================================================================

/// How the byte size of the left subtree is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipEncoding {
    /// Explicit size field of 1 to 4 bytes.
    Explicit { width: u8 },
    /// Legacy compact leaf: 1 byte, or 2 when there are 256+ classes.
    SmallLeaf,
    /// Left child is a plain 4-byte leaf value.
    SkipPrediction,
}

impl SkipEncoding {
    /// Decode a left skip mask.
    pub fn from_mask(mask: u8, offset: usize) -> Result<Self, CodecError> {
        match mask {
            0..=3 => Ok(Self::Explicit { width: mask + 1 }),
            0x10 => Ok(Self::SmallLeaf),
            0x30 => Ok(Self::SkipPrediction),
            _ => Err(CodecError::IllegalSkipMask { mask, offset }),
        }
    }

    /// Smallest explicit encoding able to hold `size`.
    pub fn for_size(size: usize) -> Self {
        let width = if size < 1 << 8 {
            1
        } else if size < 0xFFFF {
            2
        } else if size < 1 << 24 {
            3
        } else {
            4
        };
        Self::Explicit { width }
    }

    /// The mask bits written in the node type byte.
    pub fn mask(self) -> u8 {
        match self {
            Self::Explicit { width } => width - 1,
            Self::SmallLeaf => 0x10,
            Self::SkipPrediction => 0x30,
        }
    }

    /// Bytes occupied by the size field itself.
    #[inline]
    pub fn field_width(self) -> usize {
        match self {
            Self::Explicit { width } => width as usize,
            Self::SmallLeaf | Self::SkipPrediction => 0,
        }
    }

    /// Consume the size field and return how many bytes the left subtree spans.
    pub fn read_left_size(
        self,
        cursor: &mut ByteCursor<'_>,
        n_classes: usize,
    ) -> Result<usize, CodecError> {
        match self {
            Self::Explicit { width: 1 } => cursor.read_u8().map(usize::from),
            Self::Explicit { width: 2 } => cursor.read_u16().map(usize::from),
            Self::Explicit { width: 3 } => Ok(cursor.read_u24()? as usize),
            Self::Explicit { .. } => {
                let offset = cursor.position();
                let size = cursor.read_i32()?;
                usize::try_from(size).map_err(|_| CodecError::NegativeLength {
                    what: "left subtree size",
                    value: size,
                    offset,
                })
            }
            Self::SmallLeaf => Ok(if n_classes < 256 { 1 } else { 2 }),
            Self::SkipPrediction => Ok(4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn na_direction_routing() {
        assert!(NaSplitDir::NaLeft.na_goes_left());
        assert!(NaSplitDir::Left.na_goes_left());
        assert!(!NaSplitDir::Right.na_goes_left());
        assert!(!NaSplitDir::NaRight.na_goes_left());
        assert!(!NaSplitDir::NaVsRest.na_goes_left());
        assert!(!NaSplitDir::None.na_goes_left());
    }

    #[test]
    fn na_direction_wire_values() {
        for dir in [
            NaSplitDir::None,
            NaSplitDir::NaVsRest,
            NaSplitDir::NaLeft,
            NaSplitDir::NaRight,
            NaSplitDir::Left,
            NaSplitDir::Right,
        ] {
            assert_eq!(NaSplitDir::from_u8(dir as u8), Some(dir));
        }
        assert_eq!(NaSplitDir::from_u8(6), None);
    }

    #[test]
    fn split_kind_from_type_byte() {
        assert_eq!(NodeType(0x00).split_kind(0), Ok(SplitKind::Numeric));
        assert_eq!(NodeType(0x08).split_kind(0), Ok(SplitKind::SmallBitset));
        assert_eq!(NodeType(0x0C).split_kind(0), Ok(SplitKind::LargeBitset));
        assert_eq!(NodeType(0xF3).split_kind(0), Ok(SplitKind::Numeric));
    }

    #[test]
    fn retired_equality_is_rejected() {
        assert_eq!(
            NodeType(0x04).split_kind(9),
            Err(CodecError::RetiredEqualitySplit { offset: 9 })
        );
    }

    #[test]
    fn masks() {
        let both_leaves = NodeType(LEFT_LEAF_FLAG | RIGHT_LEAF_FLAG | 0x08);
        assert_eq!(both_leaves.left_mask(), 0x30);
        assert_eq!(both_leaves.right_mask(), 0x30);
        assert!(mask_is_leaf(both_leaves.left_mask()));
        assert!(mask_is_leaf(both_leaves.right_mask()));

        let inner = NodeType(0x02);
        assert_eq!(inner.left_mask(), 2);
        assert_eq!(inner.right_mask(), 0);
        assert!(!mask_is_leaf(inner.left_mask()));
    }

    #[test]
    fn skip_encoding_for_size_boundaries() {
        assert_eq!(SkipEncoding::for_size(255), SkipEncoding::Explicit { width: 1 });
        assert_eq!(SkipEncoding::for_size(256), SkipEncoding::Explicit { width: 2 });
        assert_eq!(SkipEncoding::for_size(65534), SkipEncoding::Explicit { width: 2 });
        // 65535 itself does not fit the 2-byte field.
        assert_eq!(SkipEncoding::for_size(65535), SkipEncoding::Explicit { width: 3 });
        assert_eq!(SkipEncoding::for_size(1 << 24), SkipEncoding::Explicit { width: 4 });
    }

    #[test]
    fn skip_mask_round_trips() {
        for mask in [0u8, 1, 2, 3, 0x10, 0x30] {
            assert_eq!(SkipEncoding::from_mask(mask, 0).unwrap().mask(), mask);
        }
        assert!(matches!(
            SkipEncoding::from_mask(0x20, 4),
            Err(CodecError::IllegalSkipMask { mask: 0x20, offset: 4 })
        ));
    }

    #[test]
    fn small_leaf_depends_on_class_count() {
        let bytes = [];
        let mut cursor = ByteCursor::new(&bytes);
        assert_eq!(SkipEncoding::SmallLeaf.read_left_size(&mut cursor, 3).unwrap(), 1);
        assert_eq!(SkipEncoding::SmallLeaf.read_left_size(&mut cursor, 300).unwrap(), 2);
        assert_eq!(SkipEncoding::SkipPrediction.read_left_size(&mut cursor, 3).unwrap(), 4);
    }

    #[test]
    fn negative_four_byte_size_is_rejected() {
        let bytes = (-1i32).to_le_bytes();
        let mut cursor = ByteCursor::new(&bytes);
        let err = SkipEncoding::Explicit { width: 4 }
            .read_left_size(&mut cursor, 2)
            .unwrap_err();
        assert!(matches!(err, CodecError::NegativeLength { value: -1, .. }));
    }
}
