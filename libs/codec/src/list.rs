//! Typed list views

use crate::error::{CodecError, CodecResult};
use crate::layout::ListLoc;
use crate::message::Message;
use crate::object::{
    copy_struct, init_list_at, init_struct_at, read_pointer_value, write_pointer_value, Object,
};
use crate::pointer::ElementSize;
use crate::value::{decode_primitive, encode_primitive, Value};
use schema::Type;
use std::fmt;

/// View over a list whose elements have schema type `element`
#[derive(Clone)]
pub struct List {
    message: Message,
    element: Type,
    loc: ListLoc,
    nesting: u32,
}

impl List {
    pub(crate) fn from_loc(message: Message, element: Type, loc: ListLoc, nesting: u32) -> Self {
        Self {
            message,
            element,
            loc,
            nesting,
        }
    }

    /// Zero-length view standing in for a null list pointer
    pub(crate) fn empty(message: Message, element: Type, nesting: u32) -> Self {
        let loc = ListLoc::empty(ElementSize::for_type(&element));
        Self::from_loc(message, element, loc, nesting)
    }

    pub fn len(&self) -> u32 {
        self.loc.count
    }

    pub fn is_empty(&self) -> bool {
        self.loc.count == 0
    }

    pub fn element_type(&self) -> &Type {
        &self.element
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    fn check_index(&self, index: u32) -> CodecResult<()> {
        if index >= self.loc.count {
            return Err(CodecError::IndexOutOfRange {
                index,
                len: self.loc.count,
            });
        }
        Ok(())
    }

    pub fn get(&self, index: u32) -> CodecResult<Value> {
        self.check_index(index)?;
        match &self.element {
            Type::Struct(id) => {
                let node = self.message.schema().node(*id)?.clone();
                Ok(Value::Object(Object::from_struct(
                    self.message.clone(),
                    node,
                    self.loc.element_struct(index),
                    self.nesting,
                )))
            }
            ty => match ty.data_bits() {
                Some(bits) => {
                    let raw = if bits == 0 {
                        0
                    } else {
                        self.message.arena().read_bits(
                            self.loc.segment,
                            self.loc.start,
                            self.loc.element_bit_offset(index),
                            bits,
                        )?
                    };
                    decode_primitive(ty, raw)
                        .ok_or_else(|| CodecError::type_mismatch(format!("[{}]", index), ty, "primitive"))
                }
                None => read_pointer_value(
                    &self.message,
                    self.loc.segment,
                    self.loc.element_pointer(index),
                    ty,
                    None,
                    self.nesting,
                ),
            },
        }
    }

    pub fn set(&self, index: u32, value: impl Into<Value>) -> CodecResult<()> {
        self.check_index(index)?;
        let value = value.into();
        let field = format!("[{}]", index);
        match &self.element {
            Type::Struct(id) => match value {
                Value::Object(src) if src.is_struct() && src.node_id() == *id => {
                    copy_struct(&src, &self.init_struct(index)?)
                }
                other => Err(CodecError::type_mismatch(field, &self.element, other.kind())),
            },
            ty => match ty.data_bits() {
                Some(bits) => {
                    let raw = encode_primitive(&field, ty, &value)?;
                    if bits == 0 {
                        return Ok(());
                    }
                    self.message.arena_mut()?.write_bits(
                        self.loc.segment,
                        self.loc.start,
                        self.loc.element_bit_offset(index),
                        bits,
                        raw,
                    )
                }
                None => write_pointer_value(
                    &self.message,
                    self.loc.segment,
                    self.loc.element_pointer(index),
                    ty,
                    value,
                    &field,
                ),
            },
        }
    }

    /// Writable view of a struct element (composite lists are preallocated)
    pub fn init_struct(&self, index: u32) -> CodecResult<Object> {
        self.check_index(index)?;
        let Type::Struct(id) = &self.element else {
            return Err(CodecError::type_mismatch(format!("[{}]", index), &self.element, "struct"));
        };
        if !self.message.is_builder() {
            return Err(CodecError::ReadOnly);
        }
        let node = self.message.schema().node(*id)?.clone();
        Ok(Object::from_struct(
            self.message.clone(),
            node,
            self.loc.element_struct(index),
            self.nesting,
        ))
    }

    /// Allocate element `index` of a list of lists
    pub fn init_list(&self, index: u32, len: u32) -> CodecResult<List> {
        self.check_index(index)?;
        let Type::List(inner) = &self.element else {
            return Err(CodecError::type_mismatch(format!("[{}]", index), &self.element, "list"));
        };
        init_list_at(&self.message, self.loc.segment, self.loc.element_pointer(index), inner, len)
    }

    /// Allocate a struct behind element `index` of an any-pointer list
    pub fn init_any_struct(&self, index: u32, type_id: schema::NodeId) -> CodecResult<Object> {
        self.check_index(index)?;
        if self.element != Type::AnyPointer {
            return Err(CodecError::type_mismatch(format!("[{}]", index), &self.element, "any_pointer"));
        }
        init_struct_at(&self.message, self.loc.segment, self.loc.element_pointer(index), type_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = CodecResult<Value>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    pub fn to_vec(&self) -> CodecResult<Vec<Value>> {
        self.iter().collect()
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        self.message.same_message(&other.message)
            && self.element == other.element
            && self.loc == other.loc
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "List({} x {} @ segment {} word {})",
            self.loc.count, self.element, self.loc.segment, self.loc.start
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::object::set_root;
    use crate::Value;
    use schema::{NodeId, Schema, SchemaBuilder, StructBuilder, Type};
    use std::sync::Arc;

    const BAG: NodeId = 1;
    const ITEM: NodeId = 2;

    fn schema() -> Arc<Schema> {
        Arc::new(
            SchemaBuilder::new()
                .node(
                    StructBuilder::new(BAG, "Bag", 0, 4)
                        .field("flags", Type::list_of(Type::Bool), 0)
                        .field("items", Type::list_of(Type::Struct(ITEM)), 1)
                        .field("names", Type::list_of(Type::Text), 2)
                        .field("matrix", Type::list_of(Type::list_of(Type::Int16)), 3)
                        .build(),
                )
                .node(
                    StructBuilder::new(ITEM, "Item", 1, 1)
                        .field("qty", Type::UInt32, 0)
                        .field("label", Type::Text, 0)
                        .build(),
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn bit_lists_pack_eight_per_byte() {
        let bag = set_root(BAG, schema()).unwrap();
        let flags = bag.set_list("flags", [true, false, true, true, false, false, false, false, true]).unwrap();
        assert_eq!(flags.len(), 9);
        assert_eq!(flags.get(3).unwrap(), Value::Bool(true));
        assert_eq!(flags.get(8).unwrap(), Value::Bool(true));
        assert!(flags.get(9).is_err());
    }

    #[test]
    fn composite_elements_are_inline_structs() {
        let bag = set_root(BAG, schema()).unwrap();
        let items = bag.init_list("items", 2).unwrap();
        let second = items.init_struct(1).unwrap();
        second.set("qty", 3u32).unwrap();
        second.set("label", "bolts").unwrap();

        let read = bag.get("items").unwrap().into_list().unwrap();
        let item = read.get(1).unwrap().into_object().unwrap();
        assert_eq!(item.get("qty").unwrap(), Value::UInt32(3));
        assert_eq!(item.get("label").unwrap(), Value::Text("bolts".into()));
        assert_eq!(read.get(0).unwrap().into_object().unwrap().get("qty").unwrap(), Value::UInt32(0));
    }

    #[test]
    fn lists_of_text_and_lists() {
        let bag = set_root(BAG, schema()).unwrap();
        bag.set_list("names", ["a", "bc"]).unwrap();
        let matrix = bag.init_list("matrix", 2).unwrap();
        let row = matrix.init_list(1, 3).unwrap();
        row.set(2, -7i16).unwrap();

        let names = bag.get("names").unwrap().into_list().unwrap().to_vec().unwrap();
        assert_eq!(names, vec![Value::from("a"), Value::from("bc")]);
        let matrix = bag.get("matrix").unwrap().into_list().unwrap();
        assert!(matrix.get(0).unwrap().into_list().unwrap().is_empty());
        let row = matrix.get(1).unwrap().into_list().unwrap();
        assert_eq!(row.get(2).unwrap(), Value::Int16(-7));
    }

    #[test]
    fn element_type_is_enforced() {
        let bag = set_root(BAG, schema()).unwrap();
        let flags = bag.init_list("flags", 1).unwrap();
        assert!(flags.set(0, 1u8).unwrap_err().is_type_error());
        assert!(flags.init_struct(0).is_err());
    }
}
