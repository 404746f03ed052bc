//! # capwire Codec - Segments, Pointers, and Typed Object Access
//!
//! ## Purpose
//!
//! The "rules" layer of capwire: everything needed to read and write
//! schema-described messages in the segmented, word-aligned binary format.
//! Reads are zero-copy over the received bytes; writes allocate inside the
//! message's own segments and never move data once placed.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/schema → [codec] → libs/capability
//!     ↑            ↓             ↓
//! Compiled     Wire layout    Actors, requests,
//! descriptors  Object views   promises
//! ```
//!
//! ## Layering
//!
//! ```text
//! Object / List   typed get/set, unions, defaults   (object.rs, list.rs, value.rs)
//!      │
//! layout          pointer resolution, far pointers  (layout.rs, pointer.rs)
//!      │
//! Arena           segments, allocation, bounds      (segment.rs)
//!      │
//! Message         root, capability table, limits    (message.rs, captable.rs, frame.rs)
//! ```
//!
//! ## What This Crate Contains
//! - [`Message`]: read and build lifecycles, framing, traversal budget
//! - [`Object`] / [`List`]: schema-checked field access over any message
//! - [`WirePointer`]: bit-exact pointer words
//! - [`CapHandle`]: the opaque handle type stored in capability tables
//!
//! ## What This Crate Does NOT Contain
//! - Capability dispatch or promises (belongs in `capability`)
//! - Schema compilation (the schema arrives compiled)
//! - Transport: callers supply and consume framed bytes
//!
//! ## Safety Against Hostile Input
//!
//! Every pointer resolution checks its target range against the owning
//! segment before any byte is read. Malformed input surfaces as a decode
//! error ([`CodecError::is_decode_error`]), never as a panic or an
//! out-of-bounds read.

pub mod captable;
pub mod config;
pub mod constants;
pub mod error;
pub mod frame;
pub mod layout;
pub mod list;
pub mod message;
pub mod object;
pub mod pointer;
pub mod segment;
pub mod value;

pub use captable::{CapHandle, CapTable};
pub use config::{BuilderOptions, ReaderOptions};
pub use error::{CodecError, CodecResult};
pub use list::List;
pub use message::{Message, MessageMode};
pub use object::{get_root, set_root, FieldSelector, Object};
pub use pointer::{ElementSize, PointerKind, WirePointer};
pub use segment::SegmentId;
pub use value::{UnionValue, Value};

// Re-export schema types callers need alongside objects
pub use schema::{FieldId, NodeId, Schema};
