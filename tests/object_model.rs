use dynjs::runtime::iterator::{ENUMERATE, OWNONLY};
use dynjs::runtime::{StorageMode, return_this};
use dynjs::{DynValue, ErrorKind, GcRef, JsResult, PropKey, PropertyDescriptor, Runtime, RuntimeConfig};

fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig::default()).unwrap()
}

fn put(rt: &mut Runtime, obj: GcRef, name: &str, value: DynValue) {
    let key = rt.key(name).unwrap();
    rt.put(obj, key, value, true).unwrap();
}

fn get(rt: &mut Runtime, obj: GcRef, name: &str) -> DynValue {
    let key = rt.key(name).unwrap();
    rt.get(obj, key).unwrap()
}

fn keys(rt: &mut Runtime, obj: GcRef, flags: u32) -> Vec<String> {
    let it = rt.make_iterator(DynValue::Object(obj), flags).unwrap();
    let keys = rt.collect_keys(it);
    rt.release(it);
    keys
}

#[test]
fn test_concrete_scenario() {
    let mut rt = runtime();
    let obj = rt.new_object().unwrap();
    put(&mut rt, obj, "a", DynValue::Int32(1));
    let proto = rt.new_object().unwrap();
    put(&mut rt, proto, "a", DynValue::Int32(2));
    put(&mut rt, proto, "b", DynValue::Int32(3));
    rt.set_prototype_of(obj, Some(proto)).unwrap();

    assert_eq!(get(&mut rt, obj, "a"), DynValue::Int32(1));
    assert_eq!(get(&mut rt, obj, "b"), DynValue::Int32(3));
    let a = rt.key("a").unwrap();
    assert!(rt.delete(obj, a, true).unwrap());
    assert_eq!(get(&mut rt, obj, "a"), DynValue::Int32(2));

    rt.release(proto);
    rt.release(obj);
    assert!(rt.leak_check().is_ok());
}

#[test]
fn test_shadowing_with_strings() {
    let mut rt = runtime();
    let proto = rt.new_object().unwrap();
    let w = rt.new_string("inherited").unwrap();
    put(&mut rt, proto, "k", w);
    let obj = rt.new_object_with_proto(Some(proto)).unwrap();
    let v = rt.new_string("own").unwrap();
    put(&mut rt, obj, "k", v);

    let got = get(&mut rt, obj, "k");
    assert!(rt.strict_equals(got, v));
    rt.release_value(got);

    let k = rt.key("k").unwrap();
    rt.delete(obj, k, true).unwrap();
    let got = get(&mut rt, obj, "k");
    assert!(rt.strict_equals(got, w));
    rt.release_value(got);

    rt.release_value(v);
    rt.release_value(w);
    rt.release(obj);
    rt.release(proto);
    assert!(rt.leak_check().is_ok());
}

#[test]
fn test_array_demotion_keeps_values() {
    let mut rt = runtime();
    let arr = rt
        .new_array_from(&[DynValue::Int32(1), DynValue::Int32(2), DynValue::Int32(3)])
        .unwrap();
    assert_eq!(rt.storage_of(arr), StorageMode::RegularArray);

    let readonly = PropertyDescriptor::data(DynValue::Int32(2), false, true, true);
    assert!(rt.define_own_property(arr, PropKey::Index(1), readonly, true).unwrap());
    assert_eq!(rt.storage_of(arr), StorageMode::Generic);

    for (i, expected) in [1, 2, 3].into_iter().enumerate() {
        let desc = rt.get_own_property(arr, PropKey::Index(i as u32));
        assert_eq!(desc.value(), DynValue::Int32(expected));
        assert!(desc.enumerable() && desc.configurable());
        assert_eq!(desc.writable(), i != 1);
    }
    assert_eq!(rt.get_length(arr).unwrap(), 3);

    let err = rt.put(arr, PropKey::Index(1), DynValue::Int32(9), true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    rt.put(arr, PropKey::Index(1), DynValue::Int32(9), false).unwrap();
    assert_eq!(rt.get(arr, PropKey::Index(1)).unwrap(), DynValue::Int32(2));

    rt.release(arr);
    assert!(rt.leak_check().is_ok());
}

#[test]
fn test_array_length_truncates() {
    let mut rt = runtime();
    let arr = rt.new_array(0).unwrap();
    for i in 0..10 {
        rt.put(arr, PropKey::Index(i), DynValue::Int32(i as i32), true).unwrap();
    }
    assert_eq!(rt.get_length(arr).unwrap(), 10);
    put(&mut rt, arr, "length", DynValue::Int32(4));
    assert_eq!(rt.get_length(arr).unwrap(), 4);
    assert_eq!(rt.get(arr, PropKey::Index(5)).unwrap(), DynValue::Undefined);
    assert_eq!(keys(&mut rt, arr, ENUMERATE), ["0", "1", "2", "3"]);

    let err = rt.set_length(arr, DynValue::Double(1.5), true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);
    rt.release(arr);
}

fn getter(rt: &mut Runtime, callee: GcRef, this: DynValue, args: &[DynValue]) -> JsResult<DynValue> {
    return_this(rt, callee, this, args)
}

fn setter(rt: &mut Runtime, _callee: GcRef, this: DynValue, args: &[DynValue]) -> JsResult<DynValue> {
    let DynValue::Object(obj) = this else {
        return Ok(DynValue::Undefined);
    };
    let key = rt.key("stored")?;
    rt.put(obj, key, args.first().copied().unwrap_or_default(), true)?;
    Ok(DynValue::Undefined)
}

#[test]
fn test_accessor_uses_receiver() {
    let mut rt = runtime();
    let proto = rt.new_object().unwrap();
    let g = rt.new_function(getter, 0).unwrap();
    let s = rt.new_function(setter, 1).unwrap();
    let key = rt.key("self").unwrap();
    let desc = PropertyDescriptor::accessor(DynValue::Object(g), DynValue::Object(s), true, true);
    rt.define_own_property(proto, key, desc, true).unwrap();
    rt.release(g);
    rt.release(s);

    let child = rt.new_object_with_proto(Some(proto)).unwrap();
    let v = rt.get(child, key).unwrap();
    assert_eq!(v, DynValue::Object(child));
    rt.release_value(v);

    rt.put(child, key, DynValue::Int32(7), true).unwrap();
    assert_eq!(get(&mut rt, child, "stored"), DynValue::Int32(7));
    assert!(!rt.has_own_property(child, key));

    rt.release(child);
    rt.release(proto);
    assert!(rt.leak_check().is_ok());
}

#[test]
fn test_define_rejects_incompatible_changes() {
    let mut rt = runtime();
    let obj = rt.new_object().unwrap();
    let key = rt.key("fixed").unwrap();
    let desc = PropertyDescriptor::data(DynValue::Int32(1), false, false, false);
    rt.define_own_property(obj, key, desc, true).unwrap();

    let change = PropertyDescriptor::vwec(DynValue::Int32(2));
    let err = rt.define_own_property(obj, key, change, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert!(!rt.define_own_property(obj, key, change, false).unwrap());

    // Same value with no attribute changes is allowed
    assert!(rt.define_own_property(obj, key, desc, true).unwrap());
    assert!(!rt.delete(obj, key, false).unwrap());
    assert_eq!(rt.delete(obj, key, true).unwrap_err().kind(), ErrorKind::Type);
    rt.release(obj);
}

#[test]
fn test_non_extensible_rejects_adds() {
    let mut rt = runtime();
    let obj = rt.new_object().unwrap();
    put(&mut rt, obj, "a", DynValue::Int32(1));
    rt.prevent_extensions(obj);
    let key = rt.key("b").unwrap();
    assert_eq!(rt.put(obj, key, DynValue::Int32(2), true).unwrap_err().kind(), ErrorKind::Type);
    rt.put(obj, key, DynValue::Int32(2), false).unwrap();
    assert!(!rt.has_own_property(obj, key));
    put(&mut rt, obj, "a", DynValue::Int32(5));
    assert_eq!(get(&mut rt, obj, "a"), DynValue::Int32(5));

    rt.freeze(obj).unwrap();
    assert!(rt.is_frozen(obj));
    let a = rt.key("a").unwrap();
    assert!(rt.put(obj, a, DynValue::Int32(6), true).is_err());
    rt.release(obj);
}

#[test]
fn test_enumeration_order() {
    let mut rt = runtime();
    let proto = rt.new_object().unwrap();
    put(&mut rt, proto, "inherited", DynValue::Int32(0));
    let obj = rt.new_object_with_proto(Some(proto)).unwrap();
    put(&mut rt, obj, "z", DynValue::Int32(1));
    put(&mut rt, obj, "a", DynValue::Int32(2));
    put(&mut rt, obj, "m", DynValue::Int32(3));
    let hidden = rt.key("hidden").unwrap();
    let desc = PropertyDescriptor::data(DynValue::Null, true, false, true);
    rt.define_own_property(obj, hidden, desc, true).unwrap();

    assert_eq!(keys(&mut rt, obj, ENUMERATE | OWNONLY), ["z", "a", "m"]);
    rt.release(obj);
    rt.release(proto);
}

#[test]
fn test_delete_during_iteration_is_tombstoned() {
    let mut rt = runtime();
    let obj = rt.new_object().unwrap();
    for name in ["a", "b", "c"] {
        put(&mut rt, obj, name, DynValue::Int32(1));
    }
    let it = rt.make_iterator(DynValue::Object(obj), ENUMERATE).unwrap();
    let first = rt.iterator_next(it).unwrap();
    assert_eq!(rt.display_value(first), "a");
    rt.release_value(first);

    let b = rt.key("b").unwrap();
    rt.delete(obj, b, true).unwrap();
    // Re-adding appends a new entry, which the iterator still reaches
    put(&mut rt, obj, "b", DynValue::Int32(2));

    let mut rest = Vec::new();
    while rt.iterator_has_next(it) {
        let k = rt.iterator_next(it).unwrap();
        rest.push(rt.display_value(k));
        rt.release_value(k);
    }
    assert_eq!(rest, ["c", "b"]);
    let done = rt.iterator_next(it).unwrap();
    assert_eq!(rt.display_value(done), "");
    rt.release(it);
    assert_eq!(keys(&mut rt, obj, ENUMERATE), ["a", "c", "b"]);
    rt.release(obj);
}

#[test]
fn test_primitive_get_and_wrappers() {
    let mut rt = runtime();
    let s = rt.new_string("hello").unwrap();
    let len = rt.get_value(s, dynjs::runtime::BuiltinString::Length.into());
    assert_eq!(len.unwrap(), DynValue::Int32(5));

    let e = rt.get_value(s, PropKey::Index(1)).unwrap();
    assert_eq!(rt.display_value(e), "e");
    rt.release_value(e);
    assert_eq!(rt.get_value(s, PropKey::Index(9)).unwrap(), DynValue::Undefined);

    let wrapped = rt.to_object(s).unwrap();
    let len = rt.get_length(wrapped).unwrap();
    assert_eq!(len, 5);
    let prim = rt
        .to_primitive(DynValue::Object(wrapped), dynjs::runtime::PreferredType::Default)
        .unwrap();
    assert!(rt.strict_equals(prim, s));
    rt.release_value(prim);
    rt.release(wrapped);

    assert_eq!(rt.to_object(DynValue::Null).unwrap_err().kind(), ErrorKind::Type);
    rt.release_value(s);
    assert!(rt.leak_check().is_ok());
}

#[test]
fn test_out_of_memory_is_an_error() {
    let config = RuntimeConfig::embedded();
    let mut rt = Runtime::new(config).unwrap();
    let mut held = Vec::new();
    let err = loop {
        match rt.new_object() {
            Ok(obj) => held.push(obj),
            Err(err) => break err,
        }
    };
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);
    let live = rt.live_cells();
    assert_eq!(live, held.len());
    for obj in held {
        rt.release(obj);
    }
    assert!(rt.new_object().is_ok());
}
