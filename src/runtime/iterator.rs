//! Property enumeration (`for-in`)
//!
//! An iterator walks array indices first, then the own property list,
//! then the property list of a materialised builtin prototype once. It is
//! a counted cell holding a reference to the object it walks; while it is
//! active, deletes on that object leave tombstones instead of shifting the
//! list under the cursor.

use crate::context::Runtime;
use crate::error::JsResult;
use crate::gc::{Cell, GcRef, Heap, MemoryTag, Trace, Tracer};
use crate::runtime::object::{ObjectClass, Prototype};
use crate::runtime::ops::LENGTH;
use crate::runtime::property::{PropKey, PropertyDescriptor};
use crate::runtime::string::StrRef;
use crate::value::DynValue;

/// for-in compatible default iterator
pub const ENUMERATE: u32 = 0x1;
/// Yield `[key, value]` pairs rather than keys
pub const FOREACH: u32 = 0x2;
/// Destructuring for-in wants `[key, value]`
pub const KEYVALUE: u32 = 0x4;
/// Own properties only
pub const OWNONLY: u32 = 0x8;
/// Include non-enumerable properties
pub const HIDDEN: u32 = 0x10;
/// Registered with the object; cleared once exhausted
pub const ACTIVE: u32 = 0x1000;
pub const UNREUSABLE: u32 = 0x2000;
/// The prototype list is being (or has been) walked
pub const USEPROTOTYPE: u32 = 0x4000;

/// Bytes charged for an iterator
pub const ITERATOR_RECORD_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Fresh,
    Index(u32),
    Props { pos: usize, in_proto: bool },
    Exhausted,
}

/// An iterator cell
#[derive(Debug)]
pub struct DynIterator {
    obj: Option<GcRef>,
    flags: u32,
    cursor: Cursor,
}

impl DynIterator {
    #[inline]
    pub fn object(&self) -> Option<GcRef> {
        self.obj
    }

    #[inline]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.cursor == Cursor::Exhausted
    }
}

impl Trace for DynIterator {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        if let Some(obj) = self.obj {
            tracer.edge(obj);
        }
    }

    fn finalize(&mut self, heap: &mut Heap) {
        if let Some(obj) = self.obj {
            // In a swept cycle the object may already be gone
            if self.flags & ACTIVE != 0 && heap.contains(obj) {
                let (o, mm) = heap.object_and_memory(obj);
                o.end_iteration(mm);
            }
        }
    }
}

/// Visible to this iterator
fn is_listed(desc: &PropertyDescriptor, flags: u32) -> bool {
    !desc.is_undefined() && (flags & HIDDEN != 0 || desc.enumerable())
}

impl Runtime {
    /// Create an iterator over `value`'s enumerable properties
    ///
    /// Null and undefined give an empty iterator; other primitives are
    /// boxed. Arrays are converted to generic storage first.
    pub fn make_iterator(&mut self, value: DynValue, flags: u32) -> JsResult<GcRef> {
        let flags = flags & !(ACTIVE | USEPROTOTYPE);
        let obj = match value {
            DynValue::Undefined | DynValue::Null | DynValue::None => None,
            other => Some(self.to_object(other)?),
        };
        let obj = match obj {
            Some(obj) => match self.prepare_enumeration(obj) {
                Ok(true) => Some(obj),
                Ok(false) => {
                    self.release(obj);
                    None
                }
                Err(err) => {
                    self.release(obj);
                    return Err(err);
                }
            },
            None => None,
        };
        let mem = match self.heap.mm.allocate_gc(ITERATOR_RECORD_SIZE, MemoryTag::Iterator) {
            Ok(mem) => mem,
            Err(err) => {
                if let Some(obj) = obj {
                    self.release(obj);
                }
                return Err(err.into());
            }
        };
        let mut flags = flags;
        if let Some(obj) = obj {
            self.heap.object_mut(obj).begin_iteration();
            flags |= ACTIVE;
        }
        let it = DynIterator {
            obj,
            flags,
            cursor: Cursor::Fresh,
        };
        Ok(self.publish(Cell::Iterator(it), mem))
    }

    /// Ready an object for enumeration; false if it enumerates nothing
    fn prepare_enumeration(&mut self, obj: GcRef) -> JsResult<bool> {
        let o = self.heap.object(obj);
        if o.class == ObjectClass::Json || o.builtin_id.is_some_and(|id| id.is_opaque()) {
            return Ok(false);
        }
        if o.class == ObjectClass::Array {
            self.convert_to_generic(obj)?;
        }
        Ok(true)
    }

    fn own_length(&self, obj: GcRef) -> u32 {
        let desc = self.get_own_property(obj, LENGTH);
        match desc.value() {
            DynValue::Int32(n) if n > 0 => n as u32,
            DynValue::Double(d) if d > 0.0 => d as u32,
            _ => 0,
        }
    }

    /// The builtin prototype whose list is walked after the own list
    fn enumerated_prototype(&self, obj: GcRef) -> Option<GcRef> {
        match self.heap.object(obj).proto {
            link @ Prototype::Builtin(_) => self.existing_prototype(link),
            _ => None,
        }
    }

    /// Find the next key without moving the cursor
    fn peek_key(&self, it: GcRef) -> (Option<PropKey>, Cursor) {
        let iter = self.heap.iterator(it);
        let flags = iter.flags;
        let Some(obj) = iter.obj else {
            return (None, Cursor::Exhausted);
        };
        let is_array = self.heap.object(obj).class == ObjectClass::Array;
        let mut cursor = iter.cursor;
        loop {
            match cursor {
                Cursor::Fresh => {
                    cursor = if is_array && self.own_length(obj) > 0 {
                        Cursor::Index(0)
                    } else {
                        Cursor::Props {
                            pos: 0,
                            in_proto: false,
                        }
                    };
                }
                Cursor::Index(i) => {
                    if i >= self.own_length(obj) {
                        cursor = Cursor::Props {
                            pos: 0,
                            in_proto: false,
                        };
                        continue;
                    }
                    let key = PropKey::Index(i);
                    if is_listed(&self.get_own_property(obj, key), flags) {
                        return (Some(key), Cursor::Index(i + 1));
                    }
                    cursor = Cursor::Index(i + 1);
                }
                Cursor::Props { pos, in_proto } => {
                    let target = if in_proto {
                        match self.enumerated_prototype(obj) {
                            Some(p) => p,
                            None => return (None, Cursor::Exhausted),
                        }
                    } else {
                        obj
                    };
                    let Some(prop) = self.heap.object(target).props.slot(pos) else {
                        let walk_proto = !in_proto
                            && flags & (OWNONLY | USEPROTOTYPE) == 0
                            && self.enumerated_prototype(obj).is_some();
                        if walk_proto {
                            cursor = Cursor::Props { pos: 0, in_proto: true };
                            continue;
                        }
                        return (None, Cursor::Exhausted);
                    };
                    let next = Cursor::Props { pos: pos + 1, in_proto };
                    // Array indices and length were covered by the index phase
                    let skip_array_key = is_array && !in_proto && (prop.key.is_index() || prop.key == LENGTH);
                    if prop.is_deleted() || skip_array_key || !is_listed(&prop.desc, flags) {
                        cursor = next;
                        continue;
                    }
                    return (Some(prop.key), next);
                }
                Cursor::Exhausted => return (None, Cursor::Exhausted),
            }
        }
    }

    /// Advance and return the next key
    fn advance(&mut self, it: GcRef) -> Option<PropKey> {
        let (key, cursor) = self.peek_key(it);
        let iter = self.heap.iterator_mut(it);
        iter.cursor = cursor;
        if let Cursor::Props { in_proto: true, .. } = cursor {
            iter.flags |= USEPROTOTYPE;
        }
        if cursor == Cursor::Exhausted {
            self.finish_iteration(it);
        }
        key
    }

    /// Unregister from the object so pending tombstones can be compacted
    fn finish_iteration(&mut self, it: GcRef) {
        let iter = self.heap.iterator_mut(it);
        if iter.flags & ACTIVE == 0 {
            return;
        }
        iter.flags &= !ACTIVE;
        if let Some(obj) = iter.obj {
            let (o, mm) = self.heap.object_and_memory(obj);
            o.end_iteration(mm);
        }
    }

    /// Next key as a string; the empty string once exhausted
    ///
    /// The result is owned by the caller.
    pub fn iterator_next(&mut self, it: GcRef) -> JsResult<DynValue> {
        match self.advance(it) {
            Some(key) => self.key_to_value(key),
            None => Ok(DynValue::String(StrRef::EMPTY)),
        }
    }

    /// Whether another key remains; does not advance
    pub fn iterator_has_next(&self, it: GcRef) -> bool {
        self.peek_key(it).0.is_some()
    }

    /// Next key and its current value, both owned by the caller
    pub fn next_entry(&mut self, it: GcRef) -> JsResult<Option<(DynValue, DynValue)>> {
        let Some(key) = self.advance(it) else {
            return Ok(None);
        };
        let Some(obj) = self.heap.iterator(it).obj else {
            return Ok(None);
        };
        let value = self.get(obj, key)?;
        match self.key_to_value(key) {
            Ok(name) => Ok(Some((name, value))),
            Err(err) => {
                self.release_value(value);
                Err(err)
            }
        }
    }

    /// Drain an iterator into Rust strings
    pub fn collect_keys(&mut self, it: GcRef) -> Vec<String> {
        let mut keys = Vec::new();
        while let Some(key) = self.advance(it) {
            keys.push(self.key_to_string(key));
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::runtime::object::BuiltinObjectId;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeConfig::embedded()).unwrap()
    }

    fn put(rt: &mut Runtime, obj: GcRef, name: &str, v: DynValue) {
        let key = rt.key(name).unwrap();
        rt.put(obj, key, v, true).unwrap();
    }

    #[test]
    fn test_empty_for_null() {
        let mut rt = runtime();
        let it = rt.make_iterator(DynValue::Null, ENUMERATE).unwrap();
        assert!(!rt.iterator_has_next(it));
        assert_eq!(rt.iterator_next(it).unwrap(), DynValue::String(StrRef::EMPTY));
        rt.release(it);
        assert_eq!(rt.heap.live_cells(), 0);
    }

    #[test]
    fn test_insertion_order() {
        let mut rt = runtime();
        let obj = rt.new_object().unwrap();
        put(&mut rt, obj, "b", DynValue::Int32(1));
        put(&mut rt, obj, "a", DynValue::Int32(2));
        put(&mut rt, obj, "c", DynValue::Int32(3));
        let it = rt.make_iterator(DynValue::Object(obj), ENUMERATE).unwrap();
        assert_eq!(rt.collect_keys(it), ["b", "a", "c"]);
        rt.release(it);
        rt.release(obj);
    }

    #[test]
    fn test_skips_hidden_unless_requested() {
        let mut rt = runtime();
        let obj = rt.new_object().unwrap();
        put(&mut rt, obj, "shown", DynValue::Int32(1));
        let hidden = rt.key("hidden").unwrap();
        rt.define_own_property(obj, hidden, PropertyDescriptor::data(DynValue::Int32(2), true, false, true), true)
            .unwrap();

        let it = rt.make_iterator(DynValue::Object(obj), ENUMERATE).unwrap();
        assert_eq!(rt.collect_keys(it), ["shown"]);
        rt.release(it);

        let it = rt.make_iterator(DynValue::Object(obj), ENUMERATE | HIDDEN).unwrap();
        assert_eq!(rt.collect_keys(it), ["shown", "hidden"]);
        rt.release(it);
        rt.release(obj);
    }

    #[test]
    fn test_array_indices_then_names() {
        let mut rt = runtime();
        let arr = rt
            .new_array_from(&[DynValue::Int32(1), DynValue::None, DynValue::Int32(3)])
            .unwrap();
        put(&mut rt, arr, "tag", DynValue::Boolean(true));
        let it = rt.make_iterator(DynValue::Object(arr), ENUMERATE).unwrap();
        assert_eq!(rt.collect_keys(it), ["0", "2", "tag"]);
        rt.release(it);
        rt.release(arr);
    }

    #[test]
    fn test_delete_during_iteration() {
        let mut rt = runtime();
        let obj = rt.new_object().unwrap();
        for name in ["a", "b", "c"] {
            put(&mut rt, obj, name, DynValue::Int32(0));
        }
        let it = rt.make_iterator(DynValue::Object(obj), ENUMERATE).unwrap();
        let first = rt.iterator_next(it).unwrap();
        assert_eq!(rt.display_value(first), "a");

        let b = rt.key("b").unwrap();
        rt.delete(obj, b, true).unwrap();
        assert_eq!(rt.heap.object(obj).props.tombstones(), 1);
        assert_eq!(rt.collect_keys(it), ["c"]);

        // Exhaustion unregisters and compacts
        assert!(!rt.heap.object(obj).is_iterating());
        assert_eq!(rt.heap.object(obj).props.tombstones(), 0);
        rt.release(it);
        rt.release(obj);
    }

    #[test]
    fn test_release_unfinished_iterator_compacts() {
        let mut rt = runtime();
        let obj = rt.new_object().unwrap();
        put(&mut rt, obj, "a", DynValue::Int32(0));
        put(&mut rt, obj, "b", DynValue::Int32(0));
        let it = rt.make_iterator(DynValue::Object(obj), ENUMERATE).unwrap();
        assert_eq!(rt.refcount(obj), 2);
        let a = rt.key("a").unwrap();
        rt.delete(obj, a, true).unwrap();
        assert_eq!(rt.heap.object(obj).props.tombstones(), 1);

        rt.release(it);
        assert_eq!(rt.refcount(obj), 1);
        assert_eq!(rt.heap.object(obj).props.tombstones(), 0);
        assert_eq!(rt.heap.object(obj).props.len(), 1);
        rt.release(obj);
    }

    #[test]
    fn test_builtin_prototype_walked_once() {
        let mut rt = runtime();
        let proto = rt.builtin_object(BuiltinObjectId::ObjectPrototype).unwrap();
        let extra = rt.key("extra").unwrap();
        rt.put(proto, extra, DynValue::Int32(1), true).unwrap();

        let obj = rt.new_object().unwrap();
        put(&mut rt, obj, "own", DynValue::Int32(0));
        let it = rt.make_iterator(DynValue::Object(obj), ENUMERATE).unwrap();
        assert_eq!(rt.collect_keys(it), ["own", "extra"]);
        assert_ne!(rt.heap.iterator(it).flags() & USEPROTOTYPE, 0);
        rt.release(it);

        let it = rt.make_iterator(DynValue::Object(obj), ENUMERATE | OWNONLY).unwrap();
        assert_eq!(rt.collect_keys(it), ["own"]);
        rt.release(it);
        rt.release(obj);
    }

    #[test]
    fn test_string_primitive_boxed() {
        let mut rt = runtime();
        let s = rt.new_string("hi").unwrap();
        let it = rt.make_iterator(s, ENUMERATE).unwrap();
        // The boxed `length` is not enumerable
        assert!(!rt.iterator_has_next(it));
        rt.release(it);
        rt.release_value(s);
    }

    #[test]
    fn test_next_entry() {
        let mut rt = runtime();
        let obj = rt.new_object().unwrap();
        put(&mut rt, obj, "x", DynValue::Int32(7));
        let it = rt.make_iterator(DynValue::Object(obj), FOREACH).unwrap();
        let (k, v) = rt.next_entry(it).unwrap().unwrap();
        assert_eq!(rt.display_value(k), "x");
        assert_eq!(v, DynValue::Int32(7));
        assert!(rt.next_entry(it).unwrap().is_none());
        rt.release(it);
        rt.release(obj);
    }

    #[test]
    fn test_opaque_builtins_enumerate_nothing() {
        let mut rt = runtime();
        let json = rt.builtin_object(BuiltinObjectId::Json).unwrap();
        let it = rt.make_iterator(DynValue::Object(json), ENUMERATE).unwrap();
        assert!(rt.heap.iterator(it).object().is_none());
        assert!(!rt.iterator_has_next(it));
        rt.release(it);
    }
}
