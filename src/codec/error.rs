//! Errors raised while decoding compressed tree bytes.

use thiserror::Error;

/// A compressed tree could not be decoded.
///
/// Every variant means the byte stream disagrees with the layout the writer
/// produces. None of them are recoverable at scoring time: the bytes must be
/// regenerated or the archive rejected by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A read or skip ran past the end of the tree bytes.
    #[error("tree truncated: need {needed} bytes at offset {offset}, only {len} available")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    /// The node uses the retired "equals" split encoding.
    #[error("node at offset {offset} uses the retired equality split encoding")]
    RetiredEqualitySplit { offset: usize },

    /// The skip-size mask of a node is not one of the known encodings.
    #[error("illegal skip mask {mask:#04x} in node at offset {offset}")]
    IllegalSkipMask { mask: u8, offset: usize },

    /// The NA direction byte does not name a known direction.
    #[error("unknown NA split direction {value} in node at offset {offset}")]
    UnknownNaDirection { value: u8, offset: usize },

    /// A length field decoded to a negative value.
    #[error("negative {what} ({value}) at offset {offset}")]
    NegativeLength {
        what: &'static str,
        value: i32,
        offset: usize,
    },

    /// A split refers to a column the input row does not have.
    #[error("split on column {column} but row has only {row_len} values")]
    ColumnOutOfBounds { column: usize, row_len: usize },
}

/// A tree description cannot be written in the compressed layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// Column id 65535 is reserved for the leaf sentinel.
    #[error("column id {0} is reserved for the leaf sentinel")]
    ReservedColumn(u16),

    /// The NA direction does not match the split condition.
    #[error("NA direction {dir:?} cannot be used with a {condition} split")]
    InvalidNaDirection {
        dir: super::NaSplitDir,
        condition: &'static str,
    },

    /// A bitset's first category does not fit the 16-bit offset field.
    #[error("bitset offset {0} exceeds the 16-bit offset field")]
    BitsetOffsetTooLarge(u32),

    /// A bitset is longer than the signed 32-bit length field allows.
    #[error("bitset of {0} bits exceeds the 32-bit length field")]
    BitsetTooLarge(u32),

    /// A subtree is larger than the 4-byte skip field allows.
    #[error("subtree of {0} bytes exceeds the 4-byte skip field")]
    SubtreeTooLarge(usize),
}
