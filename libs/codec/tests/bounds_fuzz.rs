//! Property tests: hostile pointer words never panic or escape their segment,
//! and primitive writes read back unchanged at every width.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use codec::{get_root, set_root, frame, ReaderOptions, Value};
use proptest::prelude::*;
use schema::{ConstValue, NodeId, Schema, SchemaBuilder, StructBuilder, Type};
use std::sync::Arc;

const ROOT: NodeId = 0x200;
const CHILD: NodeId = 0x201;
const PRIMS: NodeId = 0x202;

fn schema() -> Arc<Schema> {
    Arc::new(
        SchemaBuilder::new()
            .node(
                StructBuilder::new(ROOT, "fuzz.Root", 1, 4)
                    .field("n", Type::UInt64, 0)
                    .field("child", Type::Struct(CHILD), 0)
                    .field("items", Type::list_of(Type::Struct(CHILD)), 1)
                    .field("text", Type::Text, 2)
                    .field("nested", Type::list_of(Type::list_of(Type::UInt8)), 3)
                    .build(),
            )
            .node(
                StructBuilder::new(CHILD, "fuzz.Child", 1, 1)
                    .field("v", Type::Int32, 0)
                    .field("name", Type::Text, 0)
                    .build(),
            )
            .node(
                StructBuilder::new(PRIMS, "fuzz.Prims", 6, 0)
                    .field("b", Type::Bool, 3)
                    .field("i8", Type::Int8, 1)
                    .field("u8", Type::UInt8, 2)
                    .field("i16", Type::Int16, 2)
                    .field("u16", Type::UInt16, 3)
                    .field_with_default("i32", Type::Int32, 2, ConstValue::Int(-77))
                    .field("u32", Type::UInt32, 3)
                    .field_with_default("i64", Type::Int64, 2, ConstValue::Int(1 << 40))
                    .field("u64", Type::UInt64, 3)
                    .field("f32", Type::Float32, 8)
                    .field_with_default("f64", Type::Float64, 5, ConstValue::Float64(3.5))
                    .build(),
            )
            .build()
            .unwrap(),
    )
}

fn segment(raw: &[u64]) -> Bytes {
    let mut out = vec![0u8; raw.len() * 8];
    for (i, w) in raw.iter().enumerate() {
        LittleEndian::write_u64(&mut out[i * 8..], *w);
    }
    Bytes::from(out)
}

/// Read every reachable field, ignoring errors: the property is "no panic"
fn walk(segments: Vec<Bytes>) {
    let Ok(root) = get_root(ROOT, schema(), segments) else {
        return;
    };
    let _ = root.get("n");
    let _ = root.get("text");
    if let Ok(Value::Object(child)) = root.get("child") {
        let _ = child.get("v");
        let _ = child.get("name");
    }
    if let Ok(Value::List(items)) = root.get("items") {
        for item in items.iter().take(64).flatten() {
            if let Value::Object(item) = item {
                let _ = item.get("name");
            }
        }
    }
    if let Ok(Value::List(nested)) = root.get("nested") {
        for inner in nested.iter().take(64).flatten() {
            if let Value::List(inner) = inner {
                let _ = inner.iter().take(64).count();
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn random_words_never_panic(raw in prop::collection::vec(any::<u64>(), 1..24)) {
        walk(vec![segment(&raw)]);
    }

    #[test]
    fn random_multi_segment_messages_never_panic(
        a in prop::collection::vec(any::<u64>(), 1..12),
        b in prop::collection::vec(any::<u64>(), 0..12),
    ) {
        walk(vec![segment(&a), segment(&b)]);
    }

    #[test]
    fn random_frames_never_panic(raw in prop::collection::vec(any::<u8>(), 0..128)) {
        let _ = frame::deserialize(Bytes::from(raw), &ReaderOptions::default());
    }

    #[test]
    fn out_of_range_root_offsets_fail_cleanly(offset in 1i32..(1 << 29) - 1, data in 1u16..16) {
        let raw = codec::WirePointer::new_struct(offset, data, 0).raw();
        let err = get_root(ROOT, schema(), vec![segment(&[raw])]).unwrap_err();
        prop_assert!(err.is_decode_error());
    }

    #[test]
    fn primitives_round_trip(
        b in any::<bool>(),
        i8v in any::<i8>(),
        u8v in any::<u8>(),
        i16v in any::<i16>(),
        u16v in any::<u16>(),
        i32v in any::<i32>(),
        u32v in any::<u32>(),
        i64v in any::<i64>(),
        u64v in any::<u64>(),
        f32v in any::<f32>().prop_filter("comparable", |f| !f.is_nan()),
        f64v in any::<f64>().prop_filter("comparable", |f| !f.is_nan()),
    ) {
        let root = set_root(PRIMS, schema()).unwrap();
        let values = [
            ("b", Value::Bool(b)),
            ("i8", Value::Int8(i8v)),
            ("u8", Value::UInt8(u8v)),
            ("i16", Value::Int16(i16v)),
            ("u16", Value::UInt16(u16v)),
            ("i32", Value::Int32(i32v)),
            ("u32", Value::UInt32(u32v)),
            ("i64", Value::Int64(i64v)),
            ("u64", Value::UInt64(u64v)),
            ("f32", Value::Float32(f32v)),
            ("f64", Value::Float64(f64v)),
        ];
        for (name, value) in &values {
            root.set(*name, value.clone()).unwrap();
        }
        let back = get_root(PRIMS, schema(), root.message().segments()).unwrap();
        for (name, value) in &values {
            prop_assert_eq!(&back.get(*name).unwrap(), value);
        }
    }
}
