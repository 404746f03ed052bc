//! Wire format constants
//!
//! These values are fixed by the wire format and must not change: any drift
//! breaks interoperability with other implementations.

/// Bytes in one word
pub const BYTES_PER_WORD: usize = 8;

/// Bits in one word
pub const BITS_PER_WORD: u64 = 64;

/// Largest magnitude a 30-bit signed pointer offset can hold
pub const MAX_POINTER_OFFSET: i64 = (1 << 29) - 1;

/// Smallest value a 30-bit signed pointer offset can hold
pub const MIN_POINTER_OFFSET: i64 = -(1 << 29);

/// Largest landing-pad offset a far pointer can address (29 bits)
pub const MAX_FAR_OFFSET: u32 = (1 << 29) - 1;

/// Largest element count (or word count for composite lists) in a list pointer
pub const MAX_LIST_ELEMENTS: u32 = (1 << 29) - 1;

/// Root pointer location inside segment 0
pub const ROOT_SEGMENT: u32 = 0;
pub const ROOT_WORD: u32 = 0;
