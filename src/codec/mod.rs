//! Compressed tree byte format.
//!
//! Each tree of an ensemble is one immutable byte blob produced at training
//! time. This module decodes (and, for tooling and tests, encodes) that
//! format:
//!
//! - [`ByteCursor`]: typed little-endian reads over a byte slice
//! - [`node`]: node type byte, NA directions, skip encodings
//! - [`CategoryBitset`] / [`BitsetDecoder`]: categorical split membership
//! - [`DecisionPath`]: bit-packed root-to-leaf branch history
//! - [`TreeNode`]: tree descriptions and the encoder
//! - [`AuxTree`]: auxiliary node records mapping paths to node ids
//!
//! Scoring over these bytes lives in [`crate::inference`].

mod aux_tree;
mod bitset;
mod cursor;
mod error;
pub mod node;
mod path;
mod writer;

pub use aux_tree::{AuxRecord, AuxTree};
pub use bitset::{
    bytes_for_bits, BitsetDecoder, CategoryBitset, CurrentBitsets, LegacyBitsets, OwnedBitset,
    SMALL_BITSET_BITS,
};
pub use cursor::ByteCursor;
pub use error::{CodecError, WriteError};
pub use node::{NaSplitDir, NodeType, SkipEncoding, SplitKind, LEAF_SENTINEL};
pub use path::{decode_path, encode_path, DecisionPath, MAX_PATH_DEPTH};
pub use writer::{SplitCondition, SplitNode, SplitStats, TreeNode};
