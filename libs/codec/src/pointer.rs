//! Pointer words
//!
//! Every pointer is one little-endian 64-bit word. The low two bits carry the
//! kind; the rest depends on it:
//!
//! ```text
//! struct  | offset:i30 | 00 |  data words:u16 | pointer count:u16
//! list    | offset:i30 | 01 |  element size:u3 | element count:u29
//! far     | pad:u29 | D:1 | 10 |  segment id:u32
//! other   | 0:u30 | 11 |  capability index:u32
//! ```
//!
//! Offsets are in words and relative to the word after the pointer. The
//! all-zero word is the null pointer.

use crate::constants::{MAX_FAR_OFFSET, MAX_POINTER_OFFSET, MIN_POINTER_OFFSET};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use schema::Type;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PointerKind {
    Struct = 0,
    List = 1,
    Far = 2,
    Other = 3,
}

/// Element size class of a list pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ElementSize {
    Void = 0,
    Bit = 1,
    Byte = 2,
    TwoBytes = 3,
    FourBytes = 4,
    EightBytes = 5,
    Pointer = 6,
    InlineComposite = 7,
}

impl ElementSize {
    /// Data bits per element; composite elements report zero here
    pub fn data_bits(self) -> u64 {
        match self {
            ElementSize::Void | ElementSize::Pointer | ElementSize::InlineComposite => 0,
            ElementSize::Bit => 1,
            ElementSize::Byte => 8,
            ElementSize::TwoBytes => 16,
            ElementSize::FourBytes => 32,
            ElementSize::EightBytes => 64,
        }
    }

    pub fn pointers(self) -> u64 {
        match self {
            ElementSize::Pointer => 1,
            _ => 0,
        }
    }

    /// Encoding used for a list whose elements have the given schema type
    pub fn for_type(ty: &Type) -> ElementSize {
        match ty {
            Type::Struct(_) => ElementSize::InlineComposite,
            other => match other.data_bits() {
                Some(0) => ElementSize::Void,
                Some(1) => ElementSize::Bit,
                Some(8) => ElementSize::Byte,
                Some(16) => ElementSize::TwoBytes,
                Some(32) => ElementSize::FourBytes,
                Some(_) => ElementSize::EightBytes,
                None => ElementSize::Pointer,
            },
        }
    }
}

/// One tagged pointer word
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WirePointer(u64);

impl WirePointer {
    pub const NULL: WirePointer = WirePointer(0);

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn kind(self) -> PointerKind {
        match self.0 & 3 {
            0 => PointerKind::Struct,
            1 => PointerKind::List,
            2 => PointerKind::Far,
            _ => PointerKind::Other,
        }
    }

    /// Signed word offset of a struct or list pointer
    pub fn offset(self) -> i32 {
        (self.0 as u32 as i32) >> 2
    }

    pub fn struct_data_words(self) -> u16 {
        (self.0 >> 32) as u16
    }

    pub fn struct_pointer_count(self) -> u16 {
        (self.0 >> 48) as u16
    }

    pub fn list_element_size(self) -> ElementSize {
        // Three bits always map onto one of the eight classes
        ElementSize::try_from(((self.0 >> 32) & 7) as u8).unwrap_or(ElementSize::Void)
    }

    /// Element count, or total word count (tag excluded) for composite lists
    pub fn list_element_count(self) -> u32 {
        (self.0 >> 35) as u32
    }

    /// Far pointer whose landing pad is two words (far + tag)
    pub fn far_is_double(self) -> bool {
        (self.0 >> 2) & 1 == 1
    }

    pub fn far_pad_offset(self) -> u32 {
        (self.0 as u32) >> 3
    }

    pub fn far_segment(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Index into the message capability table, if this is a capability pointer
    pub fn capability_index(self) -> Option<u32> {
        if self.0 as u32 == 3 {
            Some((self.0 >> 32) as u32)
        } else {
            None
        }
    }

    pub fn new_struct(offset: i32, data_words: u16, pointer_count: u16) -> Self {
        Self(
            ((offset as u32).wrapping_shl(2)) as u64
                | (data_words as u64) << 32
                | (pointer_count as u64) << 48,
        )
    }

    pub fn new_list(offset: i32, size: ElementSize, count: u32) -> Self {
        let size: u8 = size.into();
        Self(
            ((offset as u32).wrapping_shl(2) | 1) as u64
                | (size as u64) << 32
                | (count as u64) << 35,
        )
    }

    pub fn new_far(double: bool, pad_offset: u32, segment: u32) -> Self {
        debug_assert!(pad_offset <= MAX_FAR_OFFSET);
        Self(2 | (double as u64) << 2 | ((pad_offset as u64) << 3) & 0xFFFF_FFF8 | (segment as u64) << 32)
    }

    pub fn new_capability(index: u32) -> Self {
        Self(3 | (index as u64) << 32)
    }

    /// Same struct/list pointer with a different offset
    pub fn with_offset(self, offset: i32) -> Self {
        Self((self.0 & !0xFFFF_FFFC) | ((offset as u32).wrapping_shl(2)) as u64)
    }

    /// Whether `offset` is representable in a 30-bit signed field
    pub fn offset_fits(offset: i64) -> bool {
        (MIN_POINTER_OFFSET..=MAX_POINTER_OFFSET).contains(&offset)
    }
}

impl fmt::Debug for WirePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("WirePointer(null)");
        }
        match self.kind() {
            PointerKind::Struct => write!(
                f,
                "WirePointer(struct offset={} data={} ptrs={})",
                self.offset(),
                self.struct_data_words(),
                self.struct_pointer_count()
            ),
            PointerKind::List => write!(
                f,
                "WirePointer(list offset={} size={:?} count={})",
                self.offset(),
                self.list_element_size(),
                self.list_element_count()
            ),
            PointerKind::Far => write!(
                f,
                "WirePointer(far double={} pad={} segment={})",
                self.far_is_double(),
                self.far_pad_offset(),
                self.far_segment()
            ),
            PointerKind::Other => write!(f, "WirePointer(other {:#018x})", self.0),
        }
    }
}
