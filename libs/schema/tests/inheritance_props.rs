//! Property tests for default masks and superclass walks

use proptest::prelude::*;
use schema::{ConstValue, InterfaceBuilder, NodeId, SchemaBuilder, StructBuilder};

const EMPTY: NodeId = 0xD000;
const FIRST_IFACE: NodeId = 0xE000;

proptest! {
    #[test]
    fn xor_mask_fits_declared_width(value in any::<i64>(), bits in prop::sample::select(vec![1u32, 8, 16, 32])) {
        let mask = ConstValue::Int(value).xor_mask(bits);
        prop_assert!(mask < (1u64 << bits));
        prop_assert_eq!(mask, (value as u64) & ((1u64 << bits) - 1));
    }

    #[test]
    fn methods_resolve_through_any_chain_length(depth in 1usize..24) {
        // interface i extends i - 1; only the first declares "base"
        let mut builder = SchemaBuilder::new().node(StructBuilder::new(EMPTY, "p.Empty", 0, 0).build());
        for i in 0..=depth {
            let id = FIRST_IFACE + i as NodeId;
            let mut iface = InterfaceBuilder::new(id, format!("p.Iface{}", i))
                .method(format!("own{}", i), EMPTY, EMPTY);
            if i == 0 {
                iface = iface.method("base", EMPTY, EMPTY);
            } else {
                iface = iface.extends(id - 1);
            }
            builder = builder.node(iface.build());
        }
        let schema = builder.build().unwrap();
        let leaf = FIRST_IFACE + depth as NodeId;

        let base = schema.method(leaf, "base").unwrap();
        prop_assert_eq!(base.interface_id, FIRST_IFACE);
        prop_assert!(schema.extends(leaf, FIRST_IFACE));
        prop_assert!(!schema.extends(FIRST_IFACE, leaf));
        let own_name = format!("own{}", depth);
        prop_assert!(schema.method(FIRST_IFACE, &own_name).is_err());
    }
}
