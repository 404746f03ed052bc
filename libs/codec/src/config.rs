//! # Reader and Builder Configuration
//!
//! Limits applied when decoding untrusted bytes, and segment sizing used when
//! building messages. Both deserialize from TOML/JSON with every field
//! defaulted so deployments only override what they need.

use serde::{Deserialize, Serialize};

/// Limits applied to messages opened for reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Total words a reader may resolve before the message is rejected.
    /// Guards against pointer graphs that alias the same bytes many times.
    pub traversal_limit_words: u64,

    /// Maximum depth of nested structs and lists
    pub nesting_limit: u32,

    /// Maximum number of segments accepted from a frame
    pub max_segments: u32,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            traversal_limit_words: 8 * 1024 * 1024, // 64 MiB worth of words
            nesting_limit: 64,
            max_segments: 512,
        }
    }
}

impl ReaderOptions {
    pub fn with_traversal_limit(mut self, words: u64) -> Self {
        self.traversal_limit_words = words;
        self
    }

    pub fn with_nesting_limit(mut self, depth: u32) -> Self {
        self.nesting_limit = depth;
        self
    }
}

/// Segment sizing for messages under construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderOptions {
    /// Capacity of segment 0 in words
    pub first_segment_words: u32,

    /// Upper bound on any one segment; also bounds a single allocation
    pub max_segment_words: u32,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            first_segment_words: 1024,
            max_segment_words: 1 << 28,
        }
    }
}

impl BuilderOptions {
    pub fn with_first_segment_words(mut self, words: u32) -> Self {
        self.first_segment_words = words.max(1);
        self
    }

    /// Capacity for the segment that follows one of `previous` words,
    /// never smaller than the allocation that triggered it
    pub fn next_segment_words(&self, previous: u32, pending: u32) -> u32 {
        previous
            .saturating_mul(2)
            .min(self.max_segment_words)
            .max(pending)
    }
}
