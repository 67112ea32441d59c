//! Categorical split bitsets.
//!
//! A categorical split stores the set of categories that go RIGHT. Categories
//! not in the set go LEFT. Two encodings exist on the wire:
//!
//! - **small**: 4 inline bytes, 32 bits, covering categories `0..32`
//! - **large**: `u16` bit offset, `i32` bit count, then `ceil(nbits / 8)` bytes
//!
//! Bits are packed LSB-first within each byte: bit `i` of the set lives in
//! byte `i >> 3` at position `i & 7`, and represents category `offset + i`.

use super::{ByteCursor, CodecError, SplitKind};

/// Number of categories covered by a small bitset.
pub const SMALL_BITSET_BITS: u32 = 32;

/// Number of bytes needed to hold `n_bits` bits.
#[inline]
pub fn bytes_for_bits(n_bits: u32) -> usize {
    n_bits.div_ceil(8) as usize
}

// =============================================================================
// CategoryBitset
// =============================================================================

/// A borrowed view of one split's category set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryBitset<'a> {
    bits: &'a [u8],
    bit_offset: u32,
    n_bits: u32,
}

impl<'a> CategoryBitset<'a> {
    /// Wrap raw bitset bytes.
    ///
    /// `bits` must hold at least `bytes_for_bits(n_bits)` bytes.
    pub fn new(bits: &'a [u8], bit_offset: u32, n_bits: u32) -> Self {
        debug_assert!(bits.len() >= bytes_for_bits(n_bits));
        Self {
            bits,
            bit_offset,
            n_bits,
        }
    }

    /// Decode the small inline encoding.
    pub fn decode_small(cursor: &mut ByteCursor<'a>) -> Result<Self, CodecError> {
        let bits = cursor.take(bytes_for_bits(SMALL_BITSET_BITS))?;
        Ok(Self::new(bits, 0, SMALL_BITSET_BITS))
    }

    /// Decode the length-prefixed encoding.
    pub fn decode_large(cursor: &mut ByteCursor<'a>) -> Result<Self, CodecError> {
        let bit_offset = u32::from(cursor.read_u16()?);
        let offset = cursor.position();
        let n_bits = cursor.read_i32()?;
        let n_bits = u32::try_from(n_bits).map_err(|_| CodecError::NegativeLength {
            what: "bitset length",
            value: n_bits,
            offset,
        })?;
        let bits = cursor.take(bytes_for_bits(n_bits))?;
        Ok(Self::new(bits, bit_offset, n_bits))
    }

    /// First category covered by the set.
    #[inline]
    pub fn bit_offset(&self) -> u32 {
        self.bit_offset
    }

    /// Number of categories covered by the set.
    #[inline]
    pub fn n_bits(&self) -> u32 {
        self.n_bits
    }

    /// Whether `category` falls inside the encoded range.
    #[inline]
    pub fn in_range(&self, category: i32) -> bool {
        self.index(category).is_some()
    }

    /// Whether `category` is in the set.
    ///
    /// Categories outside the encoded range (including negative ones) are
    /// never members.
    #[inline]
    pub fn contains(&self, category: i32) -> bool {
        match self.index(category) {
            Some(idx) => self.bits[idx >> 3] & (1u8 << (idx & 7)) != 0,
            None => false,
        }
    }

    #[inline]
    fn index(&self, category: i32) -> Option<usize> {
        let idx = i64::from(category) - i64::from(self.bit_offset);
        (idx >= 0 && idx < i64::from(self.n_bits)).then_some(idx as usize)
    }

    /// Iterate the member categories in ascending order.
    pub fn categories(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.n_bits)
            .filter(|&i| self.bits[(i >> 3) as usize] & (1u8 << (i & 7)) != 0)
            .map(|i| i + self.bit_offset)
    }
}

// =============================================================================
// BitsetDecoder
// =============================================================================

/// Bitset semantics plugged into the tree walker.
///
/// Both decoders read the same bytes. They differ in how a category outside
/// the encoded range is routed.
pub trait BitsetDecoder: Send + Sync {
    /// Route out-of-range categories as if the value were missing.
    const OUT_OF_RANGE_IS_MISSING: bool;

    /// Decode the bitset payload of a split, advancing past it.
    #[inline]
    fn decode<'a>(
        kind: SplitKind,
        cursor: &mut ByteCursor<'a>,
    ) -> Result<CategoryBitset<'a>, CodecError> {
        match kind {
            SplitKind::LargeBitset => CategoryBitset::decode_large(cursor),
            _ => CategoryBitset::decode_small(cursor),
        }
    }
}

/// Current semantics: unseen categories follow the NA direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentBitsets;

impl BitsetDecoder for CurrentBitsets {
    const OUT_OF_RANGE_IS_MISSING: bool = true;
}

/// Legacy semantics: unseen categories are simply not members and go left.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyBitsets;

impl BitsetDecoder for LegacyBitsets {
    const OUT_OF_RANGE_IS_MISSING: bool = false;
}

// =============================================================================
// OwnedBitset
// =============================================================================

/// An owned category set, used when writing trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedBitset {
    bits: Vec<u8>,
    bit_offset: u32,
    n_bits: u32,
}

impl OwnedBitset {
    /// Build the tightest set covering `categories`.
    ///
    /// The set starts at the smallest category and ends after the largest.
    pub fn from_categories(categories: &[u32]) -> Self {
        let (Some(&min), Some(&max)) = (categories.iter().min(), categories.iter().max()) else {
            return Self {
                bits: Vec::new(),
                bit_offset: 0,
                n_bits: 0,
            };
        };
        Self::with_range(categories, min, max - min + 1)
    }

    /// Build a set covering exactly `bit_offset..bit_offset + n_bits`.
    ///
    /// Categories outside the range are dropped.
    pub fn with_range(categories: &[u32], bit_offset: u32, n_bits: u32) -> Self {
        let mut bits = vec![0u8; bytes_for_bits(n_bits)];
        for &cat in categories {
            if cat < bit_offset || cat - bit_offset >= n_bits {
                continue;
            }
            let idx = cat - bit_offset;
            bits[(idx >> 3) as usize] |= 1u8 << (idx & 7);
        }
        Self {
            bits,
            bit_offset,
            n_bits,
        }
    }

    /// Whether the set fits the small inline encoding.
    pub fn fits_small(&self) -> bool {
        self.bit_offset == 0 && self.n_bits <= SMALL_BITSET_BITS
    }

    pub fn bit_offset(&self) -> u32 {
        self.bit_offset
    }

    pub fn n_bits(&self) -> u32 {
        self.n_bits
    }

    /// Packed bytes, `bytes_for_bits(n_bits)` long.
    pub fn bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn as_view(&self) -> CategoryBitset<'_> {
        CategoryBitset::new(&self.bits, self.bit_offset, self.n_bits)
    }
}
