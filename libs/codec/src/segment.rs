//! # Segment Store and Allocator
//!
//! A message is an ordered set of segments, each a contiguous run of 8-byte
//! words. Read-mode segments are zero-copy `Bytes` views of the received
//! frame; build-mode segments are `BytesMut` buffers with a fixed word
//! capacity that only ever grow at the end, so word offsets handed out by the
//! allocator stay valid for the life of the message.
//!
//! Every word and byte access here is bounds-checked against the segment's
//! current length. Nothing above this module indexes raw buffers directly.

use crate::config::BuilderOptions;
use crate::constants::{BITS_PER_WORD, BYTES_PER_WORD};
use crate::error::{CodecError, CodecResult};
use byteorder::{ByteOrder, LittleEndian};
use bytes::{Bytes, BytesMut};
use tracing::debug;

/// Index of a segment within its message
pub type SegmentId = u32;

#[derive(Debug)]
enum SegmentData {
    Shared(Bytes),
    Owned(BytesMut),
}

/// One fixed-word buffer of a message
#[derive(Debug)]
pub struct Segment {
    data: SegmentData,
    capacity_words: u32,
}

impl Segment {
    fn shared(bytes: Bytes) -> Self {
        let capacity_words = (bytes.len() / BYTES_PER_WORD) as u32;
        Self {
            data: SegmentData::Shared(bytes),
            capacity_words,
        }
    }

    fn owned(capacity_words: u32) -> Self {
        Self {
            data: SegmentData::Owned(BytesMut::with_capacity(
                capacity_words as usize * BYTES_PER_WORD,
            )),
            capacity_words,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.data {
            SegmentData::Shared(b) => b,
            SegmentData::Owned(b) => b,
        }
    }

    /// Words currently in use
    pub fn len_words(&self) -> u32 {
        (self.as_bytes().len() / BYTES_PER_WORD) as u32
    }

    pub fn capacity_words(&self) -> u32 {
        self.capacity_words
    }

    pub fn free_words(&self) -> u32 {
        self.capacity_words.saturating_sub(self.len_words())
    }

    fn bytes_mut(&mut self) -> CodecResult<&mut BytesMut> {
        match &mut self.data {
            SegmentData::Owned(b) => Ok(b),
            SegmentData::Shared(_) => Err(CodecError::ReadOnly),
        }
    }

    /// Append `words` zeroed words if capacity allows, returning the first index
    fn try_allocate(&mut self, words: u32) -> Option<u32> {
        if self.free_words() < words {
            return None;
        }
        let start = self.len_words();
        let buf = self.bytes_mut().ok()?;
        buf.resize((start + words) as usize * BYTES_PER_WORD, 0);
        Some(start)
    }

    /// Snapshot of the used portion, zero-copy for read-mode segments
    fn freeze(&self) -> Bytes {
        match &self.data {
            SegmentData::Shared(b) => b.clone(),
            SegmentData::Owned(b) => Bytes::copy_from_slice(b),
        }
    }
}

/// Segment set plus allocation policy for one message
#[derive(Debug)]
pub struct Arena {
    segments: Vec<Segment>,
    options: BuilderOptions,
}

impl Arena {
    /// Arena over received segments; allocation is refused
    pub fn for_reading(segments: Vec<Bytes>) -> Self {
        Self {
            segments: segments.into_iter().map(Segment::shared).collect(),
            options: BuilderOptions::default(),
        }
    }

    /// Empty builder arena with segment 0 ready for the root pointer
    pub fn for_building(options: BuilderOptions) -> Self {
        Self {
            segments: vec![Segment::owned(options.first_segment_words.max(1))],
            options,
        }
    }

    pub fn segment_count(&self) -> u32 {
        self.segments.len() as u32
    }

    pub fn segment(&self, id: SegmentId) -> CodecResult<&Segment> {
        self.segments
            .get(id as usize)
            .ok_or(CodecError::UnknownSegment {
                segment: id,
                segment_count: self.segment_count(),
            })
    }

    fn segment_mut(&mut self, id: SegmentId) -> CodecResult<&mut Segment> {
        let segment_count = self.segment_count();
        self.segments
            .get_mut(id as usize)
            .ok_or(CodecError::UnknownSegment {
                segment: id,
                segment_count,
            })
    }

    /// Allocate `words` zeroed words
    ///
    /// Appends to the most recently opened segment when it has room,
    /// otherwise opens a new segment. Existing data never moves.
    pub fn allocate(&mut self, words: u32) -> CodecResult<(SegmentId, u32)> {
        if words > self.options.max_segment_words {
            return Err(CodecError::AllocationTooLarge {
                words: words as u64,
                max: self.options.max_segment_words as u64,
            });
        }
        let current = self.segment_count().saturating_sub(1);
        if let Some(seg) = self.segments.last_mut() {
            // Read arenas fail here rather than opening a new segment
            seg.bytes_mut()?;
            if let Some(start) = seg.try_allocate(words) {
                return Ok((current, start));
            }
        }

        let previous = self.segments.last().map(|s| s.capacity_words).unwrap_or(0);
        let capacity = self.options.next_segment_words(previous, words);
        let id = self.segment_count();
        debug!(
            segment = id,
            capacity_words = capacity,
            requested_words = words,
            "Opening new segment"
        );
        let mut seg = Segment::owned(capacity);
        let start = seg.try_allocate(words).ok_or(CodecError::AllocationTooLarge {
            words: words as u64,
            max: capacity as u64,
        })?;
        self.segments.push(seg);
        Ok((id, start))
    }

    /// Allocate inside one specific segment, if it has room
    pub fn try_allocate_in(&mut self, id: SegmentId, words: u32) -> Option<u32> {
        self.segments.get_mut(id as usize)?.try_allocate(words)
    }

    /// Check that `words` words starting at `start` lie inside segment `id`
    pub fn check_range(
        &self,
        id: SegmentId,
        start: i64,
        words: u64,
        context: &'static str,
    ) -> CodecResult<()> {
        let len = self.segment(id)?.len_words();
        let end = (start as i128) + words as i128;
        if start < 0 || end > len as i128 {
            return Err(CodecError::out_of_bounds(id, start, words, len, context));
        }
        Ok(())
    }

    pub fn read_word(&self, id: SegmentId, index: u32) -> CodecResult<u64> {
        let bytes = self.byte_range(id, index as u64 * BYTES_PER_WORD as u64, BYTES_PER_WORD)?;
        Ok(LittleEndian::read_u64(bytes))
    }

    pub fn write_word(&mut self, id: SegmentId, index: u32, value: u64) -> CodecResult<()> {
        let bytes =
            self.byte_range_mut(id, index as u64 * BYTES_PER_WORD as u64, BYTES_PER_WORD)?;
        LittleEndian::write_u64(bytes, value);
        Ok(())
    }

    /// Read a `width`-bit little-endian value at `bit_offset` from the word `start`
    ///
    /// `width` is 0, 1, 8, 16, 32, or 64; multi-byte values are byte aligned.
    pub fn read_bits(&self, id: SegmentId, start: u32, bit_offset: u64, width: u32) -> CodecResult<u64> {
        let base = start as u64 * BITS_PER_WORD + bit_offset;
        Ok(match width {
            0 => 0,
            1 => {
                let byte = self.byte_range(id, base / 8, 1)?[0];
                ((byte >> (base % 8)) & 1) as u64
            }
            8 => self.byte_range(id, base / 8, 1)?[0] as u64,
            16 => LittleEndian::read_u16(self.byte_range(id, base / 8, 2)?) as u64,
            32 => LittleEndian::read_u32(self.byte_range(id, base / 8, 4)?) as u64,
            _ => LittleEndian::read_u64(self.byte_range(id, base / 8, 8)?),
        })
    }

    pub fn write_bits(
        &mut self,
        id: SegmentId,
        start: u32,
        bit_offset: u64,
        width: u32,
        value: u64,
    ) -> CodecResult<()> {
        let base = start as u64 * BITS_PER_WORD + bit_offset;
        match width {
            0 => {}
            1 => {
                let shift = base % 8;
                let bytes = self.byte_range_mut(id, base / 8, 1)?;
                bytes[0] = (bytes[0] & !(1 << shift)) | (((value & 1) as u8) << shift);
            }
            8 => self.byte_range_mut(id, base / 8, 1)?[0] = value as u8,
            16 => LittleEndian::write_u16(self.byte_range_mut(id, base / 8, 2)?, value as u16),
            32 => LittleEndian::write_u32(self.byte_range_mut(id, base / 8, 4)?, value as u32),
            _ => LittleEndian::write_u64(self.byte_range_mut(id, base / 8, 8)?, value),
        }
        Ok(())
    }

    /// Borrow `len` bytes at `byte_offset` of segment `id`
    pub fn byte_range(&self, id: SegmentId, byte_offset: u64, len: usize) -> CodecResult<&[u8]> {
        let seg = self.segment(id)?;
        let bytes = seg.as_bytes();
        let end = byte_offset.checked_add(len as u64);
        match end {
            Some(end) if end <= bytes.len() as u64 => {
                Ok(&bytes[byte_offset as usize..end as usize])
            }
            _ => Err(CodecError::out_of_bounds(
                id,
                (byte_offset / BYTES_PER_WORD as u64) as i64,
                (len as u64).div_ceil(BYTES_PER_WORD as u64),
                seg.len_words(),
                "byte access",
            )),
        }
    }

    pub fn byte_range_mut(
        &mut self,
        id: SegmentId,
        byte_offset: u64,
        len: usize,
    ) -> CodecResult<&mut [u8]> {
        let seg = self.segment_mut(id)?;
        let len_words = seg.len_words();
        let bytes = seg.bytes_mut()?;
        let end = byte_offset.checked_add(len as u64);
        match end {
            Some(end) if end <= bytes.len() as u64 => {
                Ok(&mut bytes[byte_offset as usize..end as usize])
            }
            _ => Err(CodecError::out_of_bounds(
                id,
                (byte_offset / BYTES_PER_WORD as u64) as i64,
                (len as u64).div_ceil(BYTES_PER_WORD as u64),
                len_words,
                "byte write",
            )),
        }
    }

    /// Used portion of every segment, in order
    pub fn freeze(&self) -> Vec<Bytes> {
        self.segments.iter().map(Segment::freeze).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_arena() -> Arena {
        Arena::for_building(BuilderOptions {
            first_segment_words: 4,
            max_segment_words: 64,
        })
    }

    #[test]
    fn allocation_prefers_current_segment() {
        let mut arena = small_arena();
        assert_eq!(arena.allocate(3).unwrap(), (0, 0));
        assert_eq!(arena.allocate(1).unwrap(), (0, 3));
        // segment 0 is full: a new, doubled segment opens
        assert_eq!(arena.allocate(2).unwrap(), (1, 0));
        assert_eq!(arena.segment(1).unwrap().capacity_words(), 8);
    }

    #[test]
    fn oversized_allocation_gets_its_own_segment() {
        let mut arena = small_arena();
        let (seg, start) = arena.allocate(20).unwrap();
        assert_eq!((seg, start), (1, 0));
        assert_eq!(arena.segment(1).unwrap().capacity_words(), 20);
        assert!(matches!(
            arena.allocate(65),
            Err(CodecError::AllocationTooLarge { words: 65, max: 64 })
        ));
    }

    #[test]
    fn bit_and_byte_access() {
        let mut arena = small_arena();
        arena.allocate(2).unwrap();
        arena.write_bits(0, 0, 13, 1, 1).unwrap();
        arena.write_bits(0, 0, 16, 16, 0xBEEF).unwrap();
        arena.write_bits(0, 1, 0, 64, u64::MAX).unwrap();
        assert_eq!(arena.read_bits(0, 0, 13, 1).unwrap(), 1);
        assert_eq!(arena.read_bits(0, 0, 12, 1).unwrap(), 0);
        assert_eq!(arena.read_bits(0, 0, 16, 16).unwrap(), 0xBEEF);
        assert_eq!(arena.read_word(0, 1).unwrap(), u64::MAX);
    }

    #[test]
    fn reads_past_used_words_fail() {
        let mut arena = small_arena();
        arena.allocate(1).unwrap();
        assert!(matches!(
            arena.read_word(0, 1),
            Err(CodecError::OutOfBounds { .. })
        ));
        assert!(matches!(
            arena.read_word(7, 0),
            Err(CodecError::UnknownSegment { segment: 7, .. })
        ));
        assert!(arena.check_range(0, -1, 1, "test").is_err());
        assert!(arena.check_range(0, 0, 2, "test").is_err());
        assert!(arena.check_range(0, 1, 0, "test").is_ok());
    }

    #[test]
    fn read_arena_refuses_writes() {
        let mut arena = Arena::for_reading(vec![Bytes::from(vec![0u8; 16])]);
        assert_eq!(arena.read_word(0, 1).unwrap(), 0);
        assert_eq!(arena.write_word(0, 0, 1), Err(CodecError::ReadOnly));
        assert_eq!(arena.allocate(1), Err(CodecError::ReadOnly));
    }
}
