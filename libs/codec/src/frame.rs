//! # Stream Framing
//!
//! ```text
//! ┌──────────────┬──────────────────────┬─────────┬──────────────────────┐
//! │ count-1: u32 │ words[count]: u32 LE │ pad → 8 │ segment bodies       │
//! └──────────────┴──────────────────────┴─────────┴──────────────────────┘
//! ```
//!
//! Every length read from the table is validated against the buffer before
//! any slicing. Segment bodies are returned as zero-copy views of the input.

use crate::config::ReaderOptions;
use crate::constants::BYTES_PER_WORD;
use crate::error::{CodecError, CodecResult};
use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

/// Bytes of the segment table for `count` segments, padded to a word
fn table_len(count: u64) -> u64 {
    (4 * (count + 1)).div_ceil(BYTES_PER_WORD as u64) * BYTES_PER_WORD as u64
}

/// Frame `segments` into one buffer
pub fn serialize(segments: &[Bytes]) -> Bytes {
    let count = segments.len().max(1);
    let body: usize = segments.iter().map(Bytes::len).sum();
    let mut out = BytesMut::with_capacity(table_len(count as u64) as usize + body);

    out.put_u32_le(count as u32 - 1);
    if segments.is_empty() {
        out.put_u32_le(0);
    }
    for seg in segments {
        out.put_u32_le((seg.len() / BYTES_PER_WORD) as u32);
    }
    if count % 2 == 0 {
        out.put_u32_le(0);
    }
    for seg in segments {
        out.put_slice(seg);
    }
    out.freeze()
}

/// Split one framed message off the front of `buf`
///
/// Returns the segments and the number of bytes consumed, so a stream
/// carrying several messages back to back can be walked.
pub fn decode(buf: &Bytes, options: &ReaderOptions) -> CodecResult<(Vec<Bytes>, usize)> {
    let size = buf.len();
    if size < 4 {
        return Err(CodecError::invalid_frame("truncated segment count", size));
    }
    let count = LittleEndian::read_u32(&buf[..4]) as u64 + 1;
    if count > options.max_segments as u64 {
        warn!(
            segments = count,
            max = options.max_segments,
            "Rejecting frame with too many segments"
        );
        return Err(CodecError::invalid_frame(
            format!("{} segments exceeds limit of {}", count, options.max_segments),
            size,
        ));
    }

    let header = table_len(count);
    if header > size as u64 {
        return Err(CodecError::invalid_frame(
            format!("segment table of {} bytes is truncated", header),
            size,
        ));
    }

    let mut offset = header;
    let mut segments = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let at = 4 + i * 4;
        let words = LittleEndian::read_u32(&buf[at..at + 4]) as u64;
        let end = offset + words * BYTES_PER_WORD as u64;
        if end > size as u64 {
            return Err(CodecError::invalid_frame(
                format!(
                    "segment {} of {} words ends at byte {} past the buffer",
                    i, words, end
                ),
                size,
            ));
        }
        segments.push(buf.slice(offset as usize..end as usize));
        offset = end;
    }
    Ok((segments, offset as usize))
}

/// Decode a buffer holding exactly one framed message
pub fn deserialize(buf: Bytes, options: &ReaderOptions) -> CodecResult<Vec<Bytes>> {
    let (segments, consumed) = decode(&buf, options)?;
    if consumed != buf.len() {
        return Err(CodecError::invalid_frame(
            format!("{} trailing bytes after message", buf.len() - consumed),
            buf.len(),
        ));
    }
    Ok(segments)
}
