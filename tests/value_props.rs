use dynjs::gc::{ArenaKind, ArenaPtr, MemoryManager, MemoryTag};
use dynjs::{DynValue, PropKey, RawValue, Runtime, RuntimeConfig};
use proptest::prelude::*;

fn scalar() -> impl Strategy<Value = DynValue> {
    prop_oneof![
        Just(DynValue::Undefined),
        Just(DynValue::Null),
        Just(DynValue::None),
        Just(DynValue::NaN),
        Just(DynValue::PositiveInfinity),
        Just(DynValue::NegativeInfinity),
        any::<bool>().prop_map(DynValue::Boolean),
        any::<i32>().prop_map(DynValue::Int32),
        any::<u32>().prop_map(DynValue::InternalFunction),
    ]
}

proptest! {
    #[test]
    fn test_scalar_encoding_round_trips(v in scalar()) {
        prop_assert_eq!(v.encode().decode(), v);
        prop_assert_eq!(v.encode().type_tag(), v.type_tag());
    }

    #[test]
    fn test_double_encoding_normalises(d in any::<f64>()) {
        let decoded = RawValue::decode(DynValue::Double(d).encode());
        prop_assert_eq!(decoded, DynValue::from_f64(d));
        prop_assert!(!decoded.needs_rc());
    }

    #[test]
    fn test_integer_string_round_trip(i in any::<i32>()) {
        let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
        let s = rt.to_string(DynValue::Int32(i)).unwrap();
        prop_assert_eq!(rt.display_value(DynValue::String(s)), i.to_string());
        let (back, numeric) = rt.string_to_number(s);
        prop_assert!(numeric);
        prop_assert_eq!(back, DynValue::Int32(i));
        rt.release_value(DynValue::String(s));
        prop_assert!(rt.leak_check().is_ok());
    }

    #[test]
    fn test_finite_double_string_round_trip(d in any::<f64>().prop_filter("finite", |d| d.is_finite())) {
        let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
        let s = rt.to_string(DynValue::from_f64(d)).unwrap();
        let (back, numeric) = rt.string_to_number(s);
        prop_assert!(numeric);
        prop_assert_eq!(back.as_f64(), Some(d));
        rt.release_value(DynValue::String(s));
    }

    #[test]
    fn test_refcount_balance(ops in prop::collection::vec((0usize..8, 0usize..8, any::<bool>()), 1..64)) {
        let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
        let objs: Vec<_> = (0..8).map(|_| rt.new_object().unwrap()).collect();
        // Each op stores objs[to] into objs[from] at a slot, or clears it
        for (from, to, clear) in ops {
            let value = if clear { DynValue::Null } else { DynValue::Object(objs[to]) };
            rt.put(objs[from], PropKey::Index(to as u32), value, true).unwrap();
        }
        for &obj in &objs {
            rt.release(obj);
        }
        rt.collect_cycles();
        prop_assert_eq!(rt.live_cells(), 0);
        prop_assert!(rt.leak_check().is_ok());
    }

    #[test]
    fn test_allocations_never_overlap(
        ops in prop::collection::vec((1usize..300, any::<bool>(), any::<bool>()), 1..200)
    ) {
        let config = RuntimeConfig::default();
        let mut mm = MemoryManager::new(&config, false);
        let mut live: Vec<ArenaPtr> = Vec::new();
        for (size, internal, free_one) in ops {
            if free_one && !live.is_empty() {
                let ptr = live.swap_remove(size % live.len());
                mm.free(ptr);
                continue;
            }
            let ptr = if internal {
                mm.allocate_internal(size)
            } else {
                mm.allocate_gc(size, MemoryTag::Any)
            };
            let Ok(ptr) = ptr else { continue };
            prop_assert!(ptr.payload_size() >= size);
            for other in live.iter().filter(|p| p.arena() == ptr.arena()) {
                let disjoint = ptr.offset() + ptr.chunk_size() <= other.offset()
                    || other.offset() + other.chunk_size() <= ptr.offset();
                prop_assert!(disjoint, "{:?} overlaps {:?}", ptr, other);
            }
            live.push(ptr);
        }
        let app: usize = live.iter().filter(|p| p.arena() == ArenaKind::App).map(|p| p.chunk_size()).sum();
        prop_assert_eq!(mm.stats().app_usage, app);
        for ptr in live {
            mm.free(ptr);
        }
        prop_assert_eq!(mm.stats().app_usage, 0);
        prop_assert_eq!(mm.stats().vm_usage, 0);
    }
}
