//! # Message - Segment Set, Root, and Capability Table
//!
//! A `Message` owns its segments and capability table and shares its schema.
//! It is a cheap handle: clones refer to the same underlying message, which
//! lets any number of [`Object`] views alias its bytes.
//!
//! ## Lifecycles
//! - **Read**: built from received bytes, immutable, every pointer
//!   resolution charged against the traversal budget
//! - **Build**: segment 0 reserves the root pointer word at creation and
//!   grows on demand; [`Message::to_bytes`] emits the framed form
//!
//! Locks guarding the arena and capability table are held only for the
//! duration of a single accessor call and never across an `.await`.

use crate::captable::{CapHandle, CapTable};
use crate::config::{BuilderOptions, ReaderOptions};
use crate::constants::{BYTES_PER_WORD, ROOT_SEGMENT, ROOT_WORD};
use crate::error::{CodecError, CodecResult};
use crate::frame;
use crate::layout::{self, StructLoc};
use crate::object::Object;
use crate::segment::{Arena, SegmentId};
use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use schema::{NodeId, Schema};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Whether a message accepts writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageMode {
    Read,
    Build,
}

struct MessageInner {
    schema: Arc<Schema>,
    arena: RwLock<Arena>,
    caps: RwLock<CapTable>,
    mode: MessageMode,
    reader_options: ReaderOptions,
    traversal_remaining: AtomicU64,
}

/// Shared handle to one message
#[derive(Clone)]
pub struct Message {
    inner: Arc<MessageInner>,
}

impl Message {
    /// Empty build message with the root pointer word reserved
    pub fn new_builder(schema: Arc<Schema>) -> Self {
        Self::with_options(schema, BuilderOptions::default())
    }

    pub fn with_options(schema: Arc<Schema>, options: BuilderOptions) -> Self {
        let mut arena = Arena::for_building(options);
        // Segment 0 always has room for at least one word
        if let Err(e) = arena.allocate(1) {
            warn!("Root pointer reservation failed: {}", e);
        }
        Self {
            inner: Arc::new(MessageInner {
                schema,
                arena: RwLock::new(arena),
                caps: RwLock::new(CapTable::default()),
                mode: MessageMode::Build,
                reader_options: ReaderOptions::default(),
                traversal_remaining: AtomicU64::new(u64::MAX),
            }),
        }
    }

    /// Read message over already-split segments
    pub fn from_segments(
        schema: Arc<Schema>,
        segments: Vec<Bytes>,
        options: ReaderOptions,
    ) -> CodecResult<Self> {
        let total: usize = segments.iter().map(Bytes::len).sum();
        if segments.is_empty() {
            return Err(CodecError::invalid_frame("message has no segments", total));
        }
        if segments.len() as u64 > options.max_segments as u64 {
            return Err(CodecError::invalid_frame(
                format!(
                    "{} segments exceeds limit of {}",
                    segments.len(),
                    options.max_segments
                ),
                total,
            ));
        }
        if let Some((i, seg)) = segments
            .iter()
            .enumerate()
            .find(|(_, s)| s.len() % BYTES_PER_WORD != 0)
        {
            return Err(CodecError::invalid_frame(
                format!("segment {} length {} is not a whole number of words", i, seg.len()),
                total,
            ));
        }
        if segments[0].len() < BYTES_PER_WORD {
            return Err(CodecError::invalid_frame("segment 0 has no root pointer", total));
        }
        debug!("Opened message for reading: {} segments, {} bytes", segments.len(), total);
        Ok(Self {
            inner: Arc::new(MessageInner {
                schema,
                arena: RwLock::new(Arena::for_reading(segments)),
                caps: RwLock::new(CapTable::default()),
                mode: MessageMode::Read,
                reader_options: options,
                traversal_remaining: AtomicU64::new(options.traversal_limit_words),
            }),
        })
    }

    /// Read message from one framed buffer
    pub fn from_bytes(schema: Arc<Schema>, bytes: Bytes, options: ReaderOptions) -> CodecResult<Self> {
        let segments = frame::deserialize(bytes, &options)?;
        Self::from_segments(schema, segments, options)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    pub fn mode(&self) -> MessageMode {
        self.inner.mode
    }

    pub fn is_builder(&self) -> bool {
        self.inner.mode == MessageMode::Build
    }

    pub fn reader_options(&self) -> &ReaderOptions {
        &self.inner.reader_options
    }

    /// Depth budget for objects reached from the root
    pub fn nesting_limit(&self) -> u32 {
        match self.inner.mode {
            MessageMode::Read => self.inner.reader_options.nesting_limit,
            MessageMode::Build => u32::MAX,
        }
    }

    pub(crate) fn arena(&self) -> RwLockReadGuard<'_, Arena> {
        self.inner.arena.read()
    }

    pub(crate) fn arena_mut(&self) -> CodecResult<RwLockWriteGuard<'_, Arena>> {
        if self.inner.mode == MessageMode::Read {
            return Err(CodecError::ReadOnly);
        }
        Ok(self.inner.arena.write())
    }

    /// Allocate `words` zeroed words in this message
    pub fn allocate(&self, words: u32) -> CodecResult<(SegmentId, u32)> {
        self.arena_mut()?.allocate(words)
    }

    pub fn segment_count(&self) -> u32 {
        self.arena().segment_count()
    }

    /// Used words of every segment, in order
    pub fn segments(&self) -> Vec<Bytes> {
        self.arena().freeze()
    }

    /// Standard stream framing of this message's segments
    pub fn to_bytes(&self) -> Bytes {
        frame::serialize(&self.segments())
    }

    /// Handle stored at `index` in the capability table
    pub fn capability(&self, index: u32) -> Option<Arc<dyn CapHandle>> {
        self.inner.caps.read().get(index)
    }

    /// Add a handle to the capability table, returning its index
    pub fn add_capability(&self, handle: Arc<dyn CapHandle>) -> u32 {
        self.inner.caps.write().insert(handle)
    }

    pub fn capability_count(&self) -> usize {
        self.inner.caps.read().len()
    }

    /// Charge `words` against the traversal budget of a read message
    pub fn charge_traversal(&self, words: u64) -> CodecResult<()> {
        if self.inner.mode == MessageMode::Build {
            return Ok(());
        }
        let cost = words.max(1);
        self.inner
            .traversal_remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| left.checked_sub(cost))
            .map(|_| ())
            .map_err(|_| {
                let limit = self.inner.reader_options.traversal_limit_words;
                warn!("Traversal limit of {} words exceeded, rejecting message", limit);
                CodecError::TraversalLimitExceeded { limit }
            })
    }

    /// Whether two handles name the same message
    pub fn same_message(&self, other: &Message) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Root struct, viewed as `type_id`
    pub fn get_root(&self, type_id: NodeId) -> CodecResult<Object> {
        let node = self.inner.schema.node(type_id)?.clone();
        self.inner.schema.struct_node(type_id)?;
        let loc = {
            let arena = self.arena();
            layout::read_struct(&arena, ROOT_SEGMENT, ROOT_WORD)?
        };
        let nesting = self.nesting_limit();
        match loc {
            Some(loc) => {
                self.charge_traversal(loc.size_words())?;
                Ok(Object::from_struct(self.clone(), node, loc, nesting))
            }
            None => Ok(Object::from_struct(self.clone(), node, StructLoc::EMPTY, nesting)),
        }
    }

    /// Allocate the root struct of a build message
    pub fn init_root(&self, type_id: NodeId) -> CodecResult<Object> {
        let node = self.inner.schema.node(type_id)?.clone();
        let shape = self.inner.schema.struct_node(type_id)?;
        let (data_words, pointer_count) = (shape.data_words, shape.pointer_count);
        let loc = {
            let mut arena = self.arena_mut()?;
            layout::init_struct(&mut arena, ROOT_SEGMENT, ROOT_WORD, data_words, pointer_count)?
        };
        debug!(
            root = %node.display_name,
            data_words,
            pointer_count,
            "Initialized message root"
        );
        Ok(Object::from_struct(self.clone(), node, loc, u32::MAX))
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("mode", &self.inner.mode)
            .field("segments", &self.segment_count())
            .field("capabilities", &self.capability_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{SchemaBuilder, StructBuilder, Type};

    fn schema() -> Arc<Schema> {
        Arc::new(
            SchemaBuilder::new()
                .node(StructBuilder::new(1, "Point", 1, 0).field("x", Type::Int64, 0).build())
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn builder_reserves_root_word() {
        let msg = Message::new_builder(schema());
        assert!(msg.is_builder());
        assert_eq!(msg.segments()[0].len(), 8);
    }

    #[test]
    fn read_messages_refuse_allocation() {
        let msg = Message::from_segments(schema(), vec![Bytes::from(vec![0u8; 8])], ReaderOptions::default())
            .unwrap();
        assert_eq!(msg.allocate(1), Err(CodecError::ReadOnly));
    }

    #[test]
    fn segments_must_be_word_multiples() {
        let err = Message::from_segments(schema(), vec![Bytes::from(vec![0u8; 12])], ReaderOptions::default())
            .unwrap_err();
        assert!(err.is_decode_error());
        assert!(Message::from_segments(schema(), vec![], ReaderOptions::default()).is_err());
    }

    #[test]
    fn traversal_budget_is_consumed() {
        let options = ReaderOptions::default().with_traversal_limit(3);
        let msg = Message::from_segments(schema(), vec![Bytes::from(vec![0u8; 8])], options).unwrap();
        msg.charge_traversal(2).unwrap();
        msg.charge_traversal(0).unwrap();
        assert_eq!(
            msg.charge_traversal(1),
            Err(CodecError::TraversalLimitExceeded { limit: 3 })
        );
    }

    #[test]
    fn null_root_reads_as_defaults() {
        let msg = Message::from_segments(schema(), vec![Bytes::from(vec![0u8; 8])], ReaderOptions::default())
            .unwrap();
        let root = msg.get_root(1).unwrap();
        assert_eq!(root.get("x").unwrap(), crate::Value::Int64(0));
    }
}
