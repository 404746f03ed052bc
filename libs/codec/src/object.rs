//! # Object Accessor Layer
//!
//! An [`Object`] is a transient typed view: schema node + location + owning
//! message. It never owns storage, and many objects may alias the same
//! bytes. All field access goes through the schema node, so a request for a
//! field or value the schema does not allow is a type error and leaves the
//! bytes untouched.
//!
//! ## Field Selection
//!
//! Fields are selected by name or by [`FieldId`]. Resolving a name once and
//! reusing the id keeps hot paths free of string comparisons:
//!
//! ```rust,ignore
//! let (x, _) = schema.struct_node(POINT)?.field("x").unwrap();
//! for obj in objects {
//!     obj.set(x, 42i64)?;
//! }
//! ```
//!
//! ## Defaults
//!
//! Primitive reads XOR the stored bits with the declared default and writes
//! XOR before storing, so zeroed storage always reads as the default.

use crate::captable::CapHandle;
use crate::error::{CodecError, CodecResult};
use crate::layout::{self, StructLoc};
use crate::list::List;
use crate::message::Message;
use crate::pointer::{ElementSize, WirePointer};
use crate::segment::SegmentId;
use crate::value::{decode_primitive, encode_primitive, UnionValue, Value};
use bytes::Bytes;
use schema::{
    ConstValue, Field, FieldId, FieldKind, Node, NodeId, Schema, SchemaError, StructNode, Type,
};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Something that names a field of a struct node
pub trait FieldSelector {
    fn select<'n>(&self, node: &'n Node) -> CodecResult<(FieldId, &'n Field)>;
}

fn struct_of(node: &Node) -> CodecResult<&StructNode> {
    node.as_struct()
        .ok_or_else(|| SchemaError::wrong_kind(node.id, "struct", node.kind_name()).into())
}

impl FieldSelector for str {
    fn select<'n>(&self, node: &'n Node) -> CodecResult<(FieldId, &'n Field)> {
        struct_of(node)?
            .field(self)
            .ok_or_else(|| SchemaError::unknown_field(node.display_name.clone(), self).into())
    }
}

impl FieldSelector for String {
    fn select<'n>(&self, node: &'n Node) -> CodecResult<(FieldId, &'n Field)> {
        self.as_str().select(node)
    }
}

impl FieldSelector for FieldId {
    fn select<'n>(&self, node: &'n Node) -> CodecResult<(FieldId, &'n Field)> {
        struct_of(node)?
            .field_by_id(*self)
            .map(|f| (*self, f))
            .ok_or_else(|| SchemaError::unknown_field(node.display_name.clone(), self.to_string()).into())
    }
}

impl<T: FieldSelector + ?Sized> FieldSelector for &T {
    fn select<'n>(&self, node: &'n Node) -> CodecResult<(FieldId, &'n Field)> {
        (**self).select(node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repr {
    Struct(StructLoc),
    /// Index into the message capability table; `None` is a null capability
    Capability(Option<u32>),
}

/// Typed view over a struct, group, or capability in a message
#[derive(Clone)]
pub struct Object {
    message: Message,
    node: Arc<Node>,
    repr: Repr,
    /// Remaining depth before the nesting limit is hit
    nesting: u32,
}

impl Object {
    pub(crate) fn from_struct(message: Message, node: Arc<Node>, loc: StructLoc, nesting: u32) -> Self {
        Self {
            message,
            node,
            repr: Repr::Struct(loc),
            nesting,
        }
    }

    /// Interface-typed view bound to capability-table entry `index`
    pub fn capability(message: Message, interface_id: NodeId, index: Option<u32>) -> CodecResult<Self> {
        let node = message.schema().node(interface_id)?.clone();
        if node.as_interface().is_none() {
            return Err(SchemaError::wrong_kind(interface_id, "interface", node.kind_name()).into());
        }
        Ok(Self {
            message,
            node,
            repr: Repr::Capability(index),
            nesting: 0,
        })
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.message.schema()
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn node_id(&self) -> NodeId {
        self.node.id
    }

    pub fn is_capability(&self) -> bool {
        matches!(self.repr, Repr::Capability(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.repr, Repr::Struct(_))
    }

    pub fn capability_index(&self) -> Option<u32> {
        match self.repr {
            Repr::Capability(index) => index,
            Repr::Struct(_) => None,
        }
    }

    /// Live handle behind a capability view
    pub fn capability_handle(&self) -> Option<Arc<dyn CapHandle>> {
        self.capability_index()
            .and_then(|index| self.message.capability(index))
    }

    /// Struct layout of this view's node
    pub fn struct_node(&self) -> CodecResult<&StructNode> {
        struct_of(&self.node)
    }

    fn loc(&self) -> CodecResult<StructLoc> {
        match self.repr {
            Repr::Struct(loc) => Ok(loc),
            Repr::Capability(_) => Err(CodecError::type_mismatch(
                self.node.display_name.clone(),
                "struct",
                "interface",
            )),
        }
    }

    fn qualified(&self, field: &Field) -> String {
        format!("{}.{}", self.node.display_name, field.name)
    }

    /// Read a field
    pub fn get(&self, field: impl FieldSelector) -> CodecResult<Value> {
        let (_, f) = field.select(&self.node)?;
        if let Some(requested) = f.discriminant {
            let active = self.discriminant()?;
            if active != requested {
                return Err(CodecError::UnionMismatch {
                    field: self.qualified(f),
                    requested,
                    active,
                });
            }
        }
        self.read_field(f)
    }

    /// Write a field; writing a union member also selects it
    pub fn set(&self, field: impl FieldSelector, value: impl Into<Value>) -> CodecResult<()> {
        let (_, f) = field.select(&self.node)?;
        self.write_field(f, value.into())?;
        if let Some(d) = f.discriminant {
            self.write_discriminant(d)?;
        }
        Ok(())
    }

    /// Active variant of this node's union, with its value unless void
    pub fn read_union(&self) -> CodecResult<UnionValue> {
        let node = self.struct_node()?;
        if !node.has_union() {
            return Err(CodecError::NotInUnion {
                node: self.node.display_name.clone(),
                field: "(union)".to_string(),
            });
        }
        let discriminant = self.discriminant()?;
        let (tag, f) = node
            .variant(discriminant)
            .ok_or_else(|| CodecError::UnknownDiscriminant {
                node: self.node.display_name.clone(),
                discriminant,
            })?;
        let value = match f.slot_type() {
            Some(Type::Void) => None,
            _ => Some(self.read_field(f)?),
        };
        Ok(UnionValue {
            tag,
            name: f.name.clone(),
            value,
        })
    }

    /// Select a union variant and write its value (`Value::Void` for void variants)
    pub fn write_union(&self, field: impl FieldSelector, value: impl Into<Value>) -> CodecResult<()> {
        let (id, f) = field.select(&self.node)?;
        if !f.is_union_member() {
            return Err(CodecError::NotInUnion {
                node: self.node.display_name.clone(),
                field: f.name.clone(),
            });
        }
        self.set(id, value)
    }

    /// Allocate a struct field (or select a group) and return a view of it
    pub fn init(&self, field: impl FieldSelector) -> CodecResult<Object> {
        let (_, f) = field.select(&self.node)?;
        let loc = self.loc()?;
        let child = match &f.kind {
            FieldKind::Group { type_id } => {
                if !self.message.is_builder() {
                    return Err(CodecError::ReadOnly);
                }
                let node = self.schema().node(*type_id)?.clone();
                Object::from_struct(self.message.clone(), node, loc, self.nesting)
            }
            FieldKind::Slot {
                offset,
                ty: Type::Struct(type_id),
                ..
            } => {
                let word = self.pointer_word(f, loc, *offset)?;
                init_struct_at(&self.message, loc.segment, word, *type_id)?
            }
            FieldKind::Slot { ty, .. } => {
                return Err(CodecError::type_mismatch(self.qualified(f), ty, "struct"))
            }
        };
        if let Some(d) = f.discriminant {
            self.write_discriminant(d)?;
        }
        Ok(child)
    }

    /// Allocate a list field of `len` elements
    pub fn init_list(&self, field: impl FieldSelector, len: u32) -> CodecResult<List> {
        let (_, f) = field.select(&self.node)?;
        let loc = self.loc()?;
        let list = match &f.kind {
            FieldKind::Slot {
                offset,
                ty: Type::List(element),
                ..
            } => {
                let word = self.pointer_word(f, loc, *offset)?;
                init_list_at(&self.message, loc.segment, word, element, len)?
            }
            FieldKind::Slot { ty, .. } => {
                return Err(CodecError::type_mismatch(self.qualified(f), ty, "list"))
            }
            FieldKind::Group { .. } => {
                return Err(CodecError::type_mismatch(self.qualified(f), "group", "list"))
            }
        };
        if let Some(d) = f.discriminant {
            self.write_discriminant(d)?;
        }
        Ok(list)
    }

    /// Allocate a list field and fill it from `values`
    pub fn set_list<V: Into<Value>>(
        &self,
        field: impl FieldSelector,
        values: impl IntoIterator<Item = V>,
    ) -> CodecResult<List> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let list = self.init_list(field, values.len() as u32)?;
        for (i, value) in values.into_iter().enumerate() {
            list.set(i as u32, value)?;
        }
        Ok(list)
    }

    /// Write an enum field by enumerant name
    pub fn set_enum(&self, field: impl FieldSelector, enumerant: &str) -> CodecResult<()> {
        let (id, f) = field.select(&self.node)?;
        let Some(Type::Enum(enum_id)) = f.slot_type() else {
            let declared = f.slot_type().map(Type::to_string).unwrap_or_else(|| "group".into());
            return Err(CodecError::type_mismatch(self.qualified(f), declared, "enum"));
        };
        let enum_node = self.schema().enum_node(*enum_id)?;
        let ordinal = enum_node
            .ordinal(enumerant)
            .ok_or_else(|| SchemaError::UnknownEnumerant {
                node: self.schema().node(*enum_id).map(|n| n.display_name.clone()).unwrap_or_default(),
                enumerant: enumerant.to_string(),
            })?;
        self.set(id, Value::Enum(ordinal))
    }

    /// Enumerant name of an enum field, `None` for ordinals newer than the schema
    pub fn enumerant(&self, field: impl FieldSelector) -> CodecResult<Option<String>> {
        let (id, f) = field.select(&self.node)?;
        let Some(Type::Enum(enum_id)) = f.slot_type() else {
            let declared = f.slot_type().map(Type::to_string).unwrap_or_else(|| "group".into());
            return Err(CodecError::type_mismatch(self.qualified(f), declared, "enum"));
        };
        let ordinal = match self.get(id)? {
            Value::Enum(o) => o,
            other => return Err(CodecError::type_mismatch(self.qualified(f), "enum", other.kind())),
        };
        Ok(self
            .schema()
            .enum_node(*enum_id)?
            .name_of(ordinal)
            .map(str::to_string))
    }

    /// Store a capability in an interface-typed field
    pub fn set_capability(&self, field: impl FieldSelector, capability: &Object) -> CodecResult<()> {
        self.set(field, Value::Object(capability.clone()))
    }

    /// Whether a pointer field is non-null (union members: whether active)
    pub fn has(&self, field: impl FieldSelector) -> CodecResult<bool> {
        let (_, f) = field.select(&self.node)?;
        if let Some(d) = f.discriminant {
            if self.discriminant()? != d {
                return Ok(false);
            }
        }
        match &f.kind {
            FieldKind::Slot { offset, ty, .. } if ty.is_pointer() => {
                let loc = self.loc()?;
                match loc.pointer_word(*offset) {
                    Some(word) => Ok(!layout::read_pointer(&self.message.arena(), loc.segment, word)?.is_null()),
                    None => Ok(false),
                }
            }
            _ => Ok(true),
        }
    }

    /// Reset a field to its default: pointers become null, primitives zero bits
    pub fn clear(&self, field: impl FieldSelector) -> CodecResult<()> {
        let (_, f) = field.select(&self.node)?;
        let loc = self.loc()?;
        match &f.kind {
            FieldKind::Group { type_id } => {
                let node = self.schema().node(*type_id)?.clone();
                let group = Object::from_struct(self.message.clone(), node, loc, self.nesting);
                let count = group.struct_node()?.fields.len();
                for i in 0..count {
                    group.clear(FieldId(i as u16))?;
                }
                Ok(())
            }
            FieldKind::Slot { offset, ty, .. } => match ty.data_bits() {
                Some(0) => Ok(()),
                Some(bits) => {
                    let bit_offset = *offset as u64 * bits as u64;
                    self.check_data(f, loc, bit_offset, bits)?;
                    self.message
                        .arena_mut()?
                        .write_bits(loc.segment, loc.start, bit_offset, bits, 0)
                }
                None => {
                    let word = self.pointer_word(f, loc, *offset)?;
                    layout::clear_pointer(&mut *self.message.arena_mut()?, loc.segment, word)
                }
            },
        }
    }

    pub(crate) fn discriminant(&self) -> CodecResult<u16> {
        let node = self.struct_node()?;
        let loc = self.loc()?;
        let bit_offset = node.discriminant_offset as u64 * 16;
        if bit_offset + 16 > loc.data_bits() {
            return Ok(0);
        }
        Ok(self.message.arena().read_bits(loc.segment, loc.start, bit_offset, 16)? as u16)
    }

    pub(crate) fn write_discriminant(&self, discriminant: u16) -> CodecResult<()> {
        let node = self.struct_node()?;
        let loc = self.loc()?;
        let bit_offset = node.discriminant_offset as u64 * 16;
        if bit_offset + 16 > loc.data_bits() {
            return Err(CodecError::out_of_bounds(
                loc.segment,
                loc.start as i64,
                loc.data_words as u64,
                loc.data_words as u32,
                "union discriminant",
            ));
        }
        self.message
            .arena_mut()?
            .write_bits(loc.segment, loc.start, bit_offset, 16, discriminant as u64)
    }

    fn pointer_word(&self, f: &Field, loc: StructLoc, index: u32) -> CodecResult<u32> {
        loc.pointer_word(index).ok_or_else(|| {
            debug!(field = %self.qualified(f), "Pointer index past the pointer section");
            CodecError::out_of_bounds(
                loc.segment,
                loc.start as i64 + loc.data_words as i64 + index as i64,
                1,
                loc.pointer_count as u32,
                "pointer section",
            )
        })
    }

    fn check_data(&self, f: &Field, loc: StructLoc, bit_offset: u64, bits: u32) -> CodecResult<()> {
        if bit_offset + bits as u64 > loc.data_bits() {
            debug!(field = %self.qualified(f), "Field lies past the data section");
            return Err(CodecError::out_of_bounds(
                loc.segment,
                loc.start as i64 + (bit_offset / 64) as i64,
                1,
                loc.data_words as u32,
                "data section",
            ));
        }
        Ok(())
    }

    fn read_field(&self, f: &Field) -> CodecResult<Value> {
        let loc = self.loc()?;
        match &f.kind {
            FieldKind::Group { type_id } => {
                let node = self.schema().node(*type_id)?.clone();
                Ok(Value::Object(Object::from_struct(
                    self.message.clone(),
                    node,
                    loc,
                    self.nesting,
                )))
            }
            FieldKind::Slot { offset, ty, default } => match ty.data_bits() {
                Some(bits) => {
                    let bit_offset = *offset as u64 * bits as u64;
                    // Fields past a shorter (older) data section read as zero bits
                    let raw = if bits == 0 || bit_offset + bits as u64 > loc.data_bits() {
                        0
                    } else {
                        self.message
                            .arena()
                            .read_bits(loc.segment, loc.start, bit_offset, bits)?
                    };
                    let mask = default.as_ref().map(|d| d.xor_mask(bits)).unwrap_or(0);
                    decode_primitive(ty, raw ^ mask)
                        .ok_or_else(|| CodecError::type_mismatch(self.qualified(f), ty, "primitive"))
                }
                None => match loc.pointer_word(*offset) {
                    Some(word) => read_pointer_value(
                        &self.message,
                        loc.segment,
                        word,
                        ty,
                        default.as_ref(),
                        self.nesting,
                    ),
                    None => null_pointer_value(&self.message, ty, default.as_ref(), self.nesting),
                },
            },
        }
    }

    fn write_field(&self, f: &Field, value: Value) -> CodecResult<()> {
        let loc = self.loc()?;
        match &f.kind {
            FieldKind::Group { .. } => Err(CodecError::type_mismatch(
                self.qualified(f),
                "group",
                value.kind(),
            )),
            FieldKind::Slot { offset, ty, default } => match ty.data_bits() {
                Some(bits) => {
                    let raw = encode_primitive(&self.qualified(f), ty, &value)?;
                    if bits == 0 {
                        return Ok(());
                    }
                    let mask = default.as_ref().map(|d| d.xor_mask(bits)).unwrap_or(0);
                    let bit_offset = *offset as u64 * bits as u64;
                    self.check_data(f, loc, bit_offset, bits)?;
                    self.message
                        .arena_mut()?
                        .write_bits(loc.segment, loc.start, bit_offset, bits, raw ^ mask)
                }
                None => {
                    let word = self.pointer_word(f, loc, *offset)?;
                    write_pointer_value(&self.message, loc.segment, word, ty, value, &self.qualified(f))
                }
            },
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.message.same_message(&other.message)
            && self.node.id == other.node.id
            && self.repr == other.repr
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr {
            Repr::Struct(loc) => write!(
                f,
                "Object({} @ segment {} word {}, {}+{} words)",
                self.node.display_name, loc.segment, loc.start, loc.data_words, loc.pointer_count
            ),
            Repr::Capability(Some(index)) => {
                write!(f, "Object({} capability #{})", self.node.display_name, index)
            }
            Repr::Capability(None) => write!(f, "Object({} null capability)", self.node.display_name),
        }
    }
}

/// Open a read message over `segments` and view its root as `type_id`
pub fn get_root(type_id: NodeId, schema: Arc<Schema>, segments: Vec<Bytes>) -> CodecResult<Object> {
    Message::from_segments(schema, segments, Default::default())?.get_root(type_id)
}

/// Start a build message whose root is a fresh `type_id` struct
pub fn set_root(type_id: NodeId, schema: Arc<Schema>) -> CodecResult<Object> {
    Message::new_builder(schema).init_root(type_id)
}

fn descend(message: &Message, nesting: u32) -> CodecResult<u32> {
    nesting.checked_sub(1).ok_or(CodecError::NestingLimitExceeded {
        limit: message.nesting_limit(),
    })
}

/// Value of a pointer-typed slot whose pointer is null or absent
pub(crate) fn null_pointer_value(
    message: &Message,
    ty: &Type,
    default: Option<&ConstValue>,
    nesting: u32,
) -> CodecResult<Value> {
    Ok(match ty {
        Type::Text => match default {
            Some(ConstValue::Text(s)) => Value::Text(s.clone()),
            _ => Value::Text(String::new()),
        },
        Type::Data => match default {
            Some(ConstValue::Data(d)) => Value::Data(d.clone()),
            _ => Value::Data(Vec::new()),
        },
        Type::Struct(id) => {
            let node = message.schema().node(*id)?.clone();
            Value::Object(Object::from_struct(message.clone(), node, StructLoc::EMPTY, nesting))
        }
        Type::List(element) => Value::List(List::empty(message.clone(), (**element).clone(), nesting)),
        Type::Interface(id) => Value::Object(Object::capability(message.clone(), *id, None)?),
        Type::AnyPointer => Value::AnyPointer(WirePointer::NULL),
        other => return Err(CodecError::type_mismatch("pointer slot", other, "pointer")),
    })
}

/// Resolve the pointer at `segment[word]` as a value of type `ty`
pub(crate) fn read_pointer_value(
    message: &Message,
    segment: SegmentId,
    word: u32,
    ty: &Type,
    default: Option<&ConstValue>,
    nesting: u32,
) -> CodecResult<Value> {
    let arena = message.arena();
    match ty {
        Type::Text | Type::Data => {
            let Some(list) = layout::read_list(&arena, segment, word)? else {
                return null_pointer_value(message, ty, default, nesting);
            };
            message.charge_traversal(list.traversal_words())?;
            if *ty == Type::Text {
                Ok(Value::Text(layout::text(&arena, &list)?))
            } else {
                Ok(Value::Data(layout::blob(&arena, &list)?.to_vec()))
            }
        }
        Type::Struct(id) => {
            let Some(loc) = layout::read_struct(&arena, segment, word)? else {
                return null_pointer_value(message, ty, default, nesting);
            };
            message.charge_traversal(loc.size_words())?;
            let node = message.schema().node(*id)?.clone();
            Ok(Value::Object(Object::from_struct(
                message.clone(),
                node,
                loc,
                descend(message, nesting)?,
            )))
        }
        Type::List(element) => {
            let Some(loc) = layout::read_list(&arena, segment, word)? else {
                return null_pointer_value(message, ty, default, nesting);
            };
            let expected = ElementSize::for_type(element);
            if loc.element_size != expected {
                return Err(CodecError::InvalidElementSize {
                    expected,
                    found: loc.element_size,
                });
            }
            message.charge_traversal(loc.traversal_words())?;
            Ok(Value::List(List::from_loc(
                message.clone(),
                (**element).clone(),
                loc,
                descend(message, nesting)?,
            )))
        }
        Type::Interface(id) => {
            let index = layout::read_capability(&arena, segment, word)?;
            Ok(Value::Object(Object::capability(message.clone(), *id, index)?))
        }
        Type::AnyPointer => Ok(Value::AnyPointer(layout::read_pointer(&arena, segment, word)?)),
        other => Err(CodecError::type_mismatch("pointer slot", other, "pointer")),
    }
}

/// Write `value` through the pointer at `segment[word]`, allocating as needed
///
/// Structs and lists from any message are deep-copied; capabilities from
/// another message are re-registered in this message's table.
pub(crate) fn write_pointer_value(
    message: &Message,
    segment: SegmentId,
    word: u32,
    ty: &Type,
    value: Value,
    field: &str,
) -> CodecResult<()> {
    match (ty, value) {
        (Type::Text | Type::AnyPointer, Value::Text(s)) => {
            layout::write_blob(&mut *message.arena_mut()?, segment, word, s.as_bytes(), true)
        }
        (Type::Data | Type::AnyPointer, Value::Data(d)) => {
            layout::write_blob(&mut *message.arena_mut()?, segment, word, &d, false)
        }
        (Type::Struct(id), Value::Object(src)) if src.is_struct() && src.node_id() == *id => {
            let dst = init_struct_at(message, segment, word, *id)?;
            copy_struct(&src, &dst)
        }
        (Type::AnyPointer, Value::Object(src)) if src.is_struct() => {
            let dst = init_struct_at(message, segment, word, src.node_id())?;
            copy_struct(&src, &dst)
        }
        (Type::List(element), Value::List(src)) if src.element_type() == &**element => {
            let dst = init_list_at(message, segment, word, element, src.len())?;
            copy_list(&src, &dst)
        }
        (Type::Interface(id), Value::Object(src))
            if src.is_capability() && message.schema().extends(src.node_id(), *id) =>
        {
            write_capability_at(message, segment, word, &src)
        }
        (Type::AnyPointer, Value::Object(src)) if src.is_capability() => {
            write_capability_at(message, segment, word, &src)
        }
        (ty, value) => {
            let actual = match &value {
                Value::Object(o) => o.node.display_name.clone(),
                other => other.kind().to_string(),
            };
            Err(CodecError::type_mismatch(field, ty, actual))
        }
    }
}

fn write_capability_at(message: &Message, segment: SegmentId, word: u32, src: &Object) -> CodecResult<()> {
    let Some(index) = src.capability_index() else {
        return layout::clear_pointer(&mut *message.arena_mut()?, segment, word);
    };
    let index = if src.message.same_message(message) {
        index
    } else {
        let handle = src.message.capability(index).ok_or_else(|| {
            CodecError::invalid_pointer(segment, word, format!("capability #{} missing from source table", index))
        })?;
        message.add_capability(handle)
    };
    layout::write_capability(&mut *message.arena_mut()?, segment, word, index)
}

pub(crate) fn init_struct_at(
    message: &Message,
    segment: SegmentId,
    word: u32,
    type_id: NodeId,
) -> CodecResult<Object> {
    let node = message.schema().node(type_id)?.clone();
    let shape = struct_of(&node)?;
    let (data_words, pointer_count) = (shape.data_words, shape.pointer_count);
    let loc = layout::init_struct(&mut *message.arena_mut()?, segment, word, data_words, pointer_count)?;
    Ok(Object::from_struct(message.clone(), node, loc, u32::MAX))
}

pub(crate) fn init_list_at(
    message: &Message,
    segment: SegmentId,
    word: u32,
    element: &Type,
    len: u32,
) -> CodecResult<List> {
    let size = ElementSize::for_type(element);
    let (data_words, pointer_count) = match element {
        Type::Struct(id) => {
            let shape = message.schema().struct_node(*id)?;
            (shape.data_words, shape.pointer_count)
        }
        _ => (0, 0),
    };
    let loc = layout::init_list(
        &mut *message.arena_mut()?,
        segment,
        word,
        size,
        len,
        data_words,
        pointer_count,
    )?;
    Ok(List::from_loc(message.clone(), element.clone(), loc, u32::MAX))
}

/// Copy every field of `src` into `dst` (same struct node), following the
/// active union variant only
pub(crate) fn copy_struct(src: &Object, dst: &Object) -> CodecResult<()> {
    let node = src.struct_node()?;
    let active = if node.has_union() {
        Some(src.discriminant()?)
    } else {
        None
    };
    for (i, f) in node.fields.iter().enumerate() {
        if f.discriminant.is_some() && f.discriminant != active {
            continue;
        }
        let id = FieldId(i as u16);
        match &f.kind {
            FieldKind::Group { .. } => {
                let from = src.read_field(f)?;
                let to = dst.init(id)?;
                if let Value::Object(from) = from {
                    copy_struct(&from, &to)?;
                }
            }
            FieldKind::Slot { ty, .. } => {
                if ty.is_pointer() && !src.has(id)? {
                    continue;
                }
                let value = src.read_field(f)?;
                dst.write_field(f, value)?;
            }
        }
    }
    if let Some(d) = active {
        dst.write_discriminant(d)?;
    }
    Ok(())
}

pub(crate) fn copy_list(src: &List, dst: &List) -> CodecResult<()> {
    for i in 0..src.len() {
        match src.get(i)? {
            Value::Object(from) if from.is_struct() => {
                let to = dst.init_struct(i)?;
                copy_struct(&from, &to)?;
            }
            value => dst.set(i, value)?,
        }
    }
    Ok(())
}
