//! # Wire Layout - Pointer Resolution and Placement
//!
//! Interprets pointer words into struct and list locations, and writes new
//! pointers when objects are allocated. This is the only module that turns a
//! pointer's offset into a word index, so every resolution step is checked
//! here:
//!
//! - target segment exists
//! - target range `[start, start + size)` lies inside that segment
//! - landing pads of far pointers lie inside their segment and have the
//!   expected shape
//!
//! A failure at any step is a decode error; no partially-valid location is
//! ever returned.
//!
//! ## Far pointers
//!
//! ```text
//! single far:  P --far(seg S, pad k)--> S[k] = struct/list ptr --offset--> content in S
//! double far:  P --far(seg S, pad k, D)--> S[k]   = far(seg T, start j)
//!                                          S[k+1] = tag (struct/list ptr, offset 0)
//!                                          content at T[j]
//! ```

use crate::constants::{BITS_PER_WORD, BYTES_PER_WORD, MAX_FAR_OFFSET, MAX_LIST_ELEMENTS};
use crate::error::{CodecError, CodecResult};
use crate::pointer::{ElementSize, PointerKind, WirePointer};
use crate::segment::{Arena, SegmentId};
use tracing::debug;

/// Location and size of a struct's data and pointer sections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructLoc {
    pub segment: SegmentId,
    /// Word index of the first data word
    pub start: u32,
    pub data_words: u16,
    pub pointer_count: u16,
}

impl StructLoc {
    /// Zero-sized struct: every field reads as its default
    pub const EMPTY: StructLoc = StructLoc {
        segment: 0,
        start: 0,
        data_words: 0,
        pointer_count: 0,
    };

    /// Word index of pointer `index`, `None` past the pointer section
    pub fn pointer_word(&self, index: u32) -> Option<u32> {
        if index < self.pointer_count as u32 {
            Some(self.start + self.data_words as u32 + index)
        } else {
            None
        }
    }

    pub fn data_bits(&self) -> u64 {
        self.data_words as u64 * BITS_PER_WORD
    }

    pub fn size_words(&self) -> u64 {
        self.data_words as u64 + self.pointer_count as u64
    }
}

/// Location and element layout of a list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLoc {
    pub segment: SegmentId,
    /// Word index of the first element (after the tag word for composite lists)
    pub start: u32,
    pub element_size: ElementSize,
    pub count: u32,
    /// Distance between consecutive elements in bits
    pub step_bits: u64,
    /// Per-element section sizes for composite lists
    pub struct_data_words: u16,
    pub struct_pointer_count: u16,
}

impl ListLoc {
    pub fn empty(element_size: ElementSize) -> Self {
        Self {
            segment: 0,
            start: 0,
            element_size,
            count: 0,
            step_bits: 0,
            struct_data_words: 0,
            struct_pointer_count: 0,
        }
    }

    /// Words occupied by the elements (tag excluded)
    pub fn size_words(&self) -> u64 {
        (self.count as u64 * self.step_bits).div_ceil(BITS_PER_WORD)
    }

    /// Words billed to the traversal budget for this list
    ///
    /// Zero-size elements cost a word each so a tiny message cannot
    /// declare an unbounded number of readable elements.
    pub fn traversal_words(&self) -> u64 {
        if self.step_bits == 0 {
            self.count as u64
        } else {
            self.size_words()
        }
    }

    /// Struct location of composite element `index`
    pub fn element_struct(&self, index: u32) -> StructLoc {
        let words = (self.step_bits / BITS_PER_WORD) as u32;
        StructLoc {
            segment: self.segment,
            start: self.start + index * words,
            data_words: self.struct_data_words,
            pointer_count: self.struct_pointer_count,
        }
    }

    /// Word index of pointer element `index`
    pub fn element_pointer(&self, index: u32) -> u32 {
        self.start + index
    }

    pub fn element_bit_offset(&self, index: u32) -> u64 {
        index as u64 * self.step_bits
    }
}

/// Content a pointer word resolves to, after any far indirection
#[derive(Debug, Clone, Copy)]
struct Target {
    segment: SegmentId,
    start: i64,
    /// Pointer carrying the size information (the tag for double-far)
    pointer: WirePointer,
}

fn direct_target(ptr_segment: SegmentId, ptr_word: u32, pointer: WirePointer) -> Target {
    Target {
        segment: ptr_segment,
        start: ptr_word as i64 + 1 + pointer.offset() as i64,
        pointer,
    }
}

/// Follow the pointer at `segment[word]`, resolving far indirection
fn follow(arena: &Arena, segment: SegmentId, word: u32) -> CodecResult<Option<Target>> {
    let pointer = WirePointer::from_raw(arena.read_word(segment, word)?);
    if pointer.is_null() {
        return Ok(None);
    }
    match pointer.kind() {
        PointerKind::Struct | PointerKind::List => Ok(Some(direct_target(segment, word, pointer))),
        PointerKind::Far => {
            let pad_segment = pointer.far_segment();
            let pad_word = pointer.far_pad_offset();
            if !pointer.far_is_double() {
                let pad = WirePointer::from_raw(arena.read_word(pad_segment, pad_word)?);
                match pad.kind() {
                    PointerKind::Struct | PointerKind::List if !pad.is_null() => {
                        Ok(Some(direct_target(pad_segment, pad_word, pad)))
                    }
                    _ => Err(CodecError::invalid_pointer(
                        pad_segment,
                        pad_word,
                        "single-far landing pad is not a struct or list pointer",
                    )),
                }
            } else {
                arena.check_range(pad_segment, pad_word as i64, 2, "double-far landing pad")?;
                let far = WirePointer::from_raw(arena.read_word(pad_segment, pad_word)?);
                let tag = WirePointer::from_raw(arena.read_word(pad_segment, pad_word + 1)?);
                if far.kind() != PointerKind::Far || far.far_is_double() {
                    return Err(CodecError::invalid_pointer(
                        pad_segment,
                        pad_word,
                        "double-far landing pad must start with a single far pointer",
                    ));
                }
                if !matches!(tag.kind(), PointerKind::Struct | PointerKind::List) {
                    return Err(CodecError::invalid_pointer(
                        pad_segment,
                        pad_word + 1,
                        "double-far tag is not a struct or list pointer",
                    ));
                }
                if tag.offset() != 0 {
                    return Err(CodecError::invalid_pointer(
                        pad_segment,
                        pad_word + 1,
                        "double-far tag must have zero offset",
                    ));
                }
                let content_segment = far.far_segment();
                // Validates the segment id before any range check uses it
                arena.segment(content_segment)?;
                Ok(Some(Target {
                    segment: content_segment,
                    start: far.far_pad_offset() as i64,
                    pointer: tag,
                }))
            }
        }
        PointerKind::Other => Err(CodecError::invalid_pointer(
            segment,
            word,
            "expected a struct or list pointer, found a capability/other pointer",
        )),
    }
}

/// Resolve the struct pointer at `segment[word]`; `None` when null
pub fn read_struct(arena: &Arena, segment: SegmentId, word: u32) -> CodecResult<Option<StructLoc>> {
    let Some(target) = follow(arena, segment, word)? else {
        return Ok(None);
    };
    if target.pointer.kind() != PointerKind::Struct {
        return Err(CodecError::invalid_pointer(segment, word, "expected a struct pointer, found a list pointer"));
    }
    let data_words = target.pointer.struct_data_words();
    let pointer_count = target.pointer.struct_pointer_count();
    let size = data_words as u64 + pointer_count as u64;
    arena.check_range(target.segment, target.start, size, "struct")?;
    Ok(Some(StructLoc {
        segment: target.segment,
        start: target.start as u32,
        data_words,
        pointer_count,
    }))
}

/// Resolve the list pointer at `segment[word]`; `None` when null
pub fn read_list(arena: &Arena, segment: SegmentId, word: u32) -> CodecResult<Option<ListLoc>> {
    let Some(target) = follow(arena, segment, word)? else {
        return Ok(None);
    };
    if target.pointer.kind() != PointerKind::List {
        return Err(CodecError::invalid_pointer(segment, word, "expected a list pointer, found a struct pointer"));
    }
    let element_size = target.pointer.list_element_size();
    let declared = target.pointer.list_element_count();

    if element_size == ElementSize::InlineComposite {
        // declared is the word count of all elements, tag excluded
        arena.check_range(target.segment, target.start, 1 + declared as u64, "composite list")?;
        let tag_word = target.start as u32;
        let tag = WirePointer::from_raw(arena.read_word(target.segment, tag_word)?);
        if tag.kind() != PointerKind::Struct {
            return Err(CodecError::invalid_pointer(
                target.segment,
                tag_word,
                "composite list tag is not a struct pointer",
            ));
        }
        if tag.offset() < 0 {
            return Err(CodecError::invalid_pointer(
                target.segment,
                tag_word,
                "composite list tag has a negative element count",
            ));
        }
        let count = tag.offset() as u32;
        let per_element = tag.struct_data_words() as u64 + tag.struct_pointer_count() as u64;
        if count as u64 * per_element > declared as u64 {
            return Err(CodecError::invalid_pointer(
                target.segment,
                tag_word,
                format!(
                    "composite list of {} elements x {} words overruns its {} declared words",
                    count, per_element, declared
                ),
            ));
        }
        return Ok(Some(ListLoc {
            segment: target.segment,
            start: tag_word + 1,
            element_size,
            count,
            step_bits: per_element * BITS_PER_WORD,
            struct_data_words: tag.struct_data_words(),
            struct_pointer_count: tag.struct_pointer_count(),
        }));
    }

    let step_bits = element_size.data_bits() + element_size.pointers() * BITS_PER_WORD;
    let loc = ListLoc {
        segment: target.segment,
        start: 0,
        element_size,
        count: declared,
        step_bits,
        struct_data_words: 0,
        struct_pointer_count: 0,
    };
    arena.check_range(target.segment, target.start, loc.size_words(), "list")?;
    Ok(Some(ListLoc {
        start: target.start as u32,
        ..loc
    }))
}

/// Capability index stored at `segment[word]`; `None` when null
pub fn read_capability(arena: &Arena, segment: SegmentId, word: u32) -> CodecResult<Option<u32>> {
    let pointer = WirePointer::from_raw(arena.read_word(segment, word)?);
    if pointer.is_null() {
        return Ok(None);
    }
    pointer.capability_index().map(Some).ok_or_else(|| {
        CodecError::invalid_pointer(segment, word, "expected a capability pointer")
    })
}

/// Raw pointer word, for opaque fields
pub fn read_pointer(arena: &Arena, segment: SegmentId, word: u32) -> CodecResult<WirePointer> {
    Ok(WirePointer::from_raw(arena.read_word(segment, word)?))
}

/// Bytes of a byte list (text includes its NUL terminator)
pub fn blob<'a>(arena: &'a Arena, list: &ListLoc) -> CodecResult<&'a [u8]> {
    if list.element_size != ElementSize::Byte {
        return Err(CodecError::InvalidElementSize {
            expected: ElementSize::Byte,
            found: list.element_size,
        });
    }
    arena.byte_range(
        list.segment,
        list.start as u64 * BYTES_PER_WORD as u64,
        list.count as usize,
    )
}

/// Decode a text blob: a byte list whose last byte is the NUL terminator
pub fn text(arena: &Arena, list: &ListLoc) -> CodecResult<String> {
    let bytes = blob(arena, list)?;
    match bytes.split_last() {
        Some((0, body)) => String::from_utf8(body.to_vec()).map_err(|e| CodecError::InvalidText {
            segment: list.segment,
            word: list.start,
            reason: e.to_string(),
        }),
        _ => Err(CodecError::InvalidText {
            segment: list.segment,
            word: list.start,
            reason: "missing NUL terminator".to_string(),
        }),
    }
}

/// Allocate `words` words for the object pointed to from `segment[word]`
/// and write the pointer, using a far pointer when the content lands in a
/// different segment. `tag` carries kind and size with a zero offset.
fn allocate_and_point(
    arena: &mut Arena,
    segment: SegmentId,
    word: u32,
    words: u32,
    tag: WirePointer,
) -> CodecResult<(SegmentId, u32)> {
    if let Some(start) = arena.try_allocate_in(segment, words) {
        let offset = start as i64 - (word as i64 + 1);
        if WirePointer::offset_fits(offset) {
            arena.write_word(segment, word, tag.with_offset(offset as i32).raw())?;
            return Ok((segment, start));
        }
    }

    let (content_segment, start) = arena.allocate(words)?;
    if content_segment == segment {
        let offset = start as i64 - (word as i64 + 1);
        if WirePointer::offset_fits(offset) {
            arena.write_word(segment, word, tag.with_offset(offset as i32).raw())?;
            return Ok((segment, start));
        }
    }
    write_far(arena, segment, word, content_segment, start, tag)?;
    Ok((content_segment, start))
}

/// Point `segment[word]` at content in another segment through a landing pad
fn write_far(
    arena: &mut Arena,
    segment: SegmentId,
    word: u32,
    content_segment: SegmentId,
    start: u32,
    tag: WirePointer,
) -> CodecResult<()> {
    if let Some(pad) = arena.try_allocate_in(content_segment, 1) {
        let offset = start as i64 - (pad as i64 + 1);
        if WirePointer::offset_fits(offset) && pad <= MAX_FAR_OFFSET {
            debug!(
                from_segment = segment,
                to_segment = content_segment,
                pad,
                "Writing single-far pointer"
            );
            arena.write_word(content_segment, pad, tag.with_offset(offset as i32).raw())?;
            arena.write_word(segment, word, WirePointer::new_far(false, pad, content_segment).raw())?;
            return Ok(());
        }
    }

    let (pad_segment, pad) = arena.allocate(2)?;
    if pad > MAX_FAR_OFFSET || start > MAX_FAR_OFFSET {
        return Err(CodecError::AllocationTooLarge {
            words: pad.max(start) as u64,
            max: MAX_FAR_OFFSET as u64,
        });
    }
    debug!(
        from_segment = segment,
        to_segment = content_segment,
        pad_segment,
        pad,
        "Writing double-far pointer"
    );
    arena.write_word(pad_segment, pad, WirePointer::new_far(false, start, content_segment).raw())?;
    arena.write_word(pad_segment, pad + 1, tag.with_offset(0).raw())?;
    arena.write_word(segment, word, WirePointer::new_far(true, pad, pad_segment).raw())?;
    Ok(())
}

/// Allocate a zeroed struct and point `segment[word]` at it
pub fn init_struct(
    arena: &mut Arena,
    segment: SegmentId,
    word: u32,
    data_words: u16,
    pointer_count: u16,
) -> CodecResult<StructLoc> {
    let size = data_words as u32 + pointer_count as u32;
    if size == 0 {
        // Offset -1 keeps a zero-sized struct pointer distinct from null
        arena.write_word(segment, word, WirePointer::new_struct(-1, 0, 0).raw())?;
        return Ok(StructLoc {
            segment,
            start: word,
            ..StructLoc::EMPTY
        });
    }
    let tag = WirePointer::new_struct(0, data_words, pointer_count);
    let (seg, start) = allocate_and_point(arena, segment, word, size, tag)?;
    Ok(StructLoc {
        segment: seg,
        start,
        data_words,
        pointer_count,
    })
}

/// Allocate a zeroed list and point `segment[word]` at it
///
/// For composite lists `struct_data_words`/`struct_pointer_count` give the
/// per-element layout; they are ignored otherwise.
pub fn init_list(
    arena: &mut Arena,
    segment: SegmentId,
    word: u32,
    element_size: ElementSize,
    count: u32,
    struct_data_words: u16,
    struct_pointer_count: u16,
) -> CodecResult<ListLoc> {
    if count > MAX_LIST_ELEMENTS {
        return Err(CodecError::AllocationTooLarge {
            words: count as u64,
            max: MAX_LIST_ELEMENTS as u64,
        });
    }

    if element_size == ElementSize::InlineComposite {
        let per_element = struct_data_words as u64 + struct_pointer_count as u64;
        let total = count as u64 * per_element;
        if total > MAX_LIST_ELEMENTS as u64 {
            return Err(CodecError::AllocationTooLarge {
                words: total,
                max: MAX_LIST_ELEMENTS as u64,
            });
        }
        let tag = WirePointer::new_list(0, ElementSize::InlineComposite, total as u32);
        let (seg, start) = allocate_and_point(arena, segment, word, total as u32 + 1, tag)?;
        arena.write_word(
            seg,
            start,
            WirePointer::new_struct(count as i32, struct_data_words, struct_pointer_count).raw(),
        )?;
        return Ok(ListLoc {
            segment: seg,
            start: start + 1,
            element_size,
            count,
            step_bits: per_element * BITS_PER_WORD,
            struct_data_words,
            struct_pointer_count,
        });
    }

    let step_bits = element_size.data_bits() + element_size.pointers() * BITS_PER_WORD;
    let words = (count as u64 * step_bits).div_ceil(BITS_PER_WORD);
    let tag = WirePointer::new_list(0, element_size, count);
    let (seg, start) = allocate_and_point(arena, segment, word, words as u32, tag)?;
    Ok(ListLoc {
        segment: seg,
        start,
        element_size,
        count,
        step_bits,
        struct_data_words: 0,
        struct_pointer_count: 0,
    })
}

/// Write a byte blob, optionally NUL-terminated (text), at `segment[word]`
pub fn write_blob(
    arena: &mut Arena,
    segment: SegmentId,
    word: u32,
    bytes: &[u8],
    nul_terminated: bool,
) -> CodecResult<()> {
    let count = bytes.len() as u64 + nul_terminated as u64;
    if count > MAX_LIST_ELEMENTS as u64 {
        return Err(CodecError::AllocationTooLarge {
            words: count.div_ceil(BYTES_PER_WORD as u64),
            max: MAX_LIST_ELEMENTS as u64,
        });
    }
    let list = init_list(arena, segment, word, ElementSize::Byte, count as u32, 0, 0)?;
    if !bytes.is_empty() {
        arena
            .byte_range_mut(list.segment, list.start as u64 * BYTES_PER_WORD as u64, bytes.len())?
            .copy_from_slice(bytes);
    }
    Ok(())
}

pub fn write_capability(arena: &mut Arena, segment: SegmentId, word: u32, index: u32) -> CodecResult<()> {
    arena.write_word(segment, word, WirePointer::new_capability(index).raw())
}

pub fn clear_pointer(arena: &mut Arena, segment: SegmentId, word: u32) -> CodecResult<()> {
    arena.write_word(segment, word, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuilderOptions;
    use bytes::Bytes;

    fn words(raw: &[u64]) -> Bytes {
        let mut out = Vec::with_capacity(raw.len() * 8);
        for w in raw {
            out.extend_from_slice(&w.to_le_bytes());
        }
        Bytes::from(out)
    }

    #[test]
    fn struct_pointer_resolves_relative_to_next_word() {
        let arena = Arena::for_reading(vec![words(&[
            WirePointer::new_struct(0, 1, 0).raw(),
            42,
        ])]);
        let loc = read_struct(&arena, 0, 0).unwrap().unwrap();
        assert_eq!(loc.start, 1);
        assert_eq!(loc.data_words, 1);
    }

    #[test]
    fn struct_past_segment_end_is_rejected() {
        let arena = Arena::for_reading(vec![words(&[WirePointer::new_struct(0, 2, 0).raw(), 1])]);
        assert!(matches!(
            read_struct(&arena, 0, 0),
            Err(CodecError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn negative_offset_before_segment_start_is_rejected() {
        let arena = Arena::for_reading(vec![words(&[WirePointer::new_struct(-5, 1, 0).raw()])]);
        assert!(matches!(
            read_struct(&arena, 0, 0),
            Err(CodecError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn far_pointer_to_missing_segment_is_rejected() {
        let arena = Arena::for_reading(vec![words(&[WirePointer::new_far(false, 0, 4).raw()])]);
        assert!(matches!(
            read_struct(&arena, 0, 0),
            Err(CodecError::UnknownSegment { segment: 4, .. })
        ));
    }

    #[test]
    fn single_far_resolves_through_landing_pad() {
        let arena = Arena::for_reading(vec![
            words(&[WirePointer::new_far(false, 1, 1).raw()]),
            words(&[7, WirePointer::new_struct(-2, 1, 0).raw()]),
        ]);
        let loc = read_struct(&arena, 0, 0).unwrap().unwrap();
        assert_eq!((loc.segment, loc.start), (1, 0));
    }

    #[test]
    fn double_far_uses_tag_for_size() {
        let arena = Arena::for_reading(vec![
            words(&[WirePointer::new_far(true, 0, 1).raw()]),
            words(&[
                WirePointer::new_far(false, 1, 2).raw(),
                WirePointer::new_list(0, ElementSize::FourBytes, 3).raw(),
            ]),
            words(&[0, 0, 0]),
        ]);
        let list = read_list(&arena, 0, 0).unwrap().unwrap();
        assert_eq!((list.segment, list.start, list.count), (2, 1, 3));
        assert_eq!(list.step_bits, 32);
    }

    #[test]
    fn composite_tag_overrunning_declared_words_is_rejected() {
        let arena = Arena::for_reading(vec![words(&[
            WirePointer::new_list(0, ElementSize::InlineComposite, 2).raw(),
            WirePointer::new_struct(3, 1, 0).raw(),
            0,
            0,
        ])]);
        assert!(matches!(
            read_list(&arena, 0, 0),
            Err(CodecError::InvalidPointer { .. })
        ));
    }

    #[test]
    fn text_requires_nul_terminator() {
        let arena = Arena::for_reading(vec![words(&[
            WirePointer::new_list(0, ElementSize::Byte, 2).raw(),
            u64::from_le_bytes(*b"hi\0\0\0\0\0\0"),
        ])]);
        let list = read_list(&arena, 0, 0).unwrap().unwrap();
        assert!(matches!(
            text(&arena, &list),
            Err(CodecError::InvalidText { .. })
        ));
    }

    #[test]
    fn allocation_in_full_segment_goes_far() {
        let mut arena = Arena::for_building(BuilderOptions {
            first_segment_words: 2,
            max_segment_words: 1024,
        });
        arena.allocate(1).unwrap();
        // segment 1 opens with 4 words: 1 for the struct, 1 for the landing pad
        let loc = init_struct(&mut arena, 0, 0, 1, 0).unwrap();
        assert_eq!(loc.segment, 1);
        let pointer = WirePointer::from_raw(arena.read_word(0, 0).unwrap());
        assert_eq!(pointer.kind(), PointerKind::Far);
        assert!(!pointer.far_is_double());
        assert_eq!(read_struct(&arena, 0, 0).unwrap().unwrap(), loc);
    }

    #[test]
    fn double_far_written_when_target_segment_is_full() {
        let mut arena = Arena::for_building(BuilderOptions {
            first_segment_words: 1,
            max_segment_words: 1024,
        });
        arena.allocate(1).unwrap();
        // 2 words: segment 1 opens at exactly max(2, 2) words, leaving no room for a pad
        let loc = init_struct(&mut arena, 0, 0, 2, 0).unwrap();
        assert_eq!(loc.segment, 1);
        let pointer = WirePointer::from_raw(arena.read_word(0, 0).unwrap());
        assert!(pointer.far_is_double());
        assert_eq!(read_struct(&arena, 0, 0).unwrap().unwrap(), loc);
    }

    #[test]
    fn zero_size_elements_bill_one_word_each() {
        let arena = Arena::for_reading(vec![words(&[
            WirePointer::new_list(0, ElementSize::InlineComposite, 0).raw(),
            WirePointer::new_struct(1000, 0, 0).raw(),
        ])]);
        let loc = read_list(&arena, 0, 0).unwrap().unwrap();
        assert_eq!(loc.count, 1000);
        assert_eq!(loc.size_words(), 0);
        assert_eq!(loc.traversal_words(), 1000);

        let arena = Arena::for_reading(vec![words(&[
            WirePointer::new_list(0, ElementSize::Byte, 20).raw(),
            0,
            0,
            0,
        ])]);
        let loc = read_list(&arena, 0, 0).unwrap().unwrap();
        assert_eq!(loc.traversal_words(), loc.size_words());
    }

    #[test]
    fn zero_sized_struct_is_not_null() {
        let mut arena = Arena::for_building(BuilderOptions::default());
        arena.allocate(1).unwrap();
        init_struct(&mut arena, 0, 0, 0, 0).unwrap();
        assert_ne!(arena.read_word(0, 0).unwrap(), 0);
        let loc = read_struct(&arena, 0, 0).unwrap().unwrap();
        assert_eq!(loc.size_words(), 0);
    }
}
