//! Codec errors for segment decoding and typed field access
//!
//! Two families share one enum. Decode errors mean the incoming bytes are
//! malformed or hostile: the whole message should be rejected. Type errors
//! mean the caller asked for something the schema does not allow: they are
//! local to the call and never touch the underlying bytes.

use crate::pointer::ElementSize;
use schema::SchemaError;
use thiserror::Error;

/// Errors raised by the wire codec and the object accessor layer
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Pointer resolution would place the referenced range outside its segment
    #[error("Out of bounds: words {start}..{end} in segment {segment} (segment has {segment_len} words, context: {context})")]
    OutOfBounds {
        segment: u32,
        start: i64,
        end: i64,
        segment_len: u32,
        context: &'static str,
    },

    /// Far pointer or accessor names a segment the message does not have
    #[error("Unknown segment {segment}: message has {segment_count} segments")]
    UnknownSegment { segment: u32, segment_count: u32 },

    /// Pointer word is well-formed but not valid where it was found
    #[error("Invalid pointer at segment {segment} word {word}: {reason}")]
    InvalidPointer {
        segment: u32,
        word: u32,
        reason: String,
    },

    /// List encoding does not match the element type the schema declares
    #[error("Invalid list element size: schema expects {expected:?}, wire has {found:?}")]
    InvalidElementSize {
        expected: ElementSize,
        found: ElementSize,
    },

    /// Segment table or body does not fit the supplied buffer
    #[error("Invalid frame: {reason} (buffer: {buffer_size} bytes)")]
    InvalidFrame { reason: String, buffer_size: usize },

    /// Text blob is not NUL-terminated or not UTF-8
    #[error("Invalid text at segment {segment} word {word}: {reason}")]
    InvalidText {
        segment: u32,
        word: u32,
        reason: String,
    },

    /// Read budget for this message is exhausted
    #[error("Traversal limit of {limit} words exceeded")]
    TraversalLimitExceeded { limit: u64 },

    /// Object graph is nested deeper than the reader allows
    #[error("Nesting limit of {limit} exceeded")]
    NestingLimitExceeded { limit: u32 },

    /// Discriminant on the wire names no variant of the union
    #[error("Unknown discriminant {discriminant} for union in {node}")]
    UnknownDiscriminant { node: String, discriminant: u16 },

    /// Requested value type does not match the field's declared type
    #[error("Type mismatch on {field}: declared {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// Union operation on a field or struct that has no union
    #[error("{node}.{field} is not a union member")]
    NotInUnion { node: String, field: String },

    /// Union field read while a different variant is active
    #[error("Union field {field} requested (discriminant {requested}) but variant {active} is active")]
    UnionMismatch {
        field: String,
        requested: u16,
        active: u16,
    },

    /// Write attempted on a message opened for reading
    #[error("Message is read-only")]
    ReadOnly,

    /// List index past the end
    #[error("Index {index} out of range for list of {len} elements")]
    IndexOutOfRange { index: u32, len: u32 },

    /// Allocation request exceeds what a segment or pointer can address
    #[error("Allocation of {words} words exceeds limit of {max} words")]
    AllocationTooLarge { words: u64, max: u64 },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl CodecError {
    pub fn out_of_bounds(
        segment: u32,
        start: i64,
        words: u64,
        segment_len: u32,
        context: &'static str,
    ) -> Self {
        Self::OutOfBounds {
            segment,
            start,
            end: start.saturating_add(words.min(i64::MAX as u64) as i64),
            segment_len,
            context,
        }
    }

    pub fn invalid_pointer(segment: u32, word: u32, reason: impl Into<String>) -> Self {
        Self::InvalidPointer {
            segment,
            word,
            reason: reason.into(),
        }
    }

    pub fn invalid_frame(reason: impl Into<String>, buffer_size: usize) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
            buffer_size,
        }
    }

    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Malformed or hostile input: reject the whole message
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            CodecError::OutOfBounds { .. }
                | CodecError::UnknownSegment { .. }
                | CodecError::InvalidPointer { .. }
                | CodecError::InvalidElementSize { .. }
                | CodecError::InvalidFrame { .. }
                | CodecError::InvalidText { .. }
                | CodecError::TraversalLimitExceeded { .. }
                | CodecError::NestingLimitExceeded { .. }
                | CodecError::UnknownDiscriminant { .. }
        )
    }

    /// Caller asked for something the schema does not allow
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            CodecError::TypeMismatch { .. }
                | CodecError::NotInUnion { .. }
                | CodecError::UnionMismatch { .. }
                | CodecError::ReadOnly
                | CodecError::IndexOutOfRange { .. }
        )
    }
}

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;
