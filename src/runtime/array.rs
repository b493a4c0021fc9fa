//! Array storage
//!
//! A regular array keeps its elements packed in one arena block: slot 0
//! holds the length and slots `1..=len` the elements, with `None` marking a
//! hole. Every element is an implicit writable, enumerable, configurable
//! data property and `length` is implicit too. Anything that cannot be
//! expressed that way demotes the array to generic storage first.

use crate::context::Runtime;
use crate::error::{JsResult, RuntimeError};
use crate::gc::{AllocError, ArenaPtr, GcRef, MemoryManager, MemoryTag, Tracer};
use crate::runtime::object::{BuiltinObjectId, ObjectClass, ObjectPayload, Prototype, StorageMode};
use crate::runtime::property::{PropKey, PropertyDescriptor};
use crate::runtime::string::BuiltinString;
use crate::value::DynValue;

/// Longest array kept in regular storage
pub const MAX_FAST_ARRAY_LENGTH: u32 = 1 << 16;

/// Largest integer a `length` may hold after ToLength
pub const MAX_LENGTH_PROPERTY_SIZE: f64 = 9_007_199_254_740_991.0;

/// Packed elements of a regular array
#[derive(Debug)]
pub struct ElementStore {
    mem: ArenaPtr,
    capacity: u32,
}

impl ElementStore {
    /// A block with room for `capacity` elements, all holes, length 0
    pub(crate) fn allocate(mm: &mut MemoryManager, capacity: u32) -> Result<Self, AllocError> {
        let mem = mm.allocate_gc((capacity as usize + 1) * 8, MemoryTag::List)?;
        mm.write_value(mem, 0, DynValue::Int32(0));
        for i in 1..=capacity as usize {
            mm.write_value(mem, i, DynValue::None);
        }
        Ok(ElementStore { mem, capacity })
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn length(&self, mm: &MemoryManager) -> u32 {
        match mm.read_value(self.mem, 0) {
            DynValue::Int32(n) => n as u32,
            DynValue::Double(d) => d as u32,
            _ => 0,
        }
    }

    /// Element `index`; `None` for holes and indices past the length
    pub fn get(&self, mm: &MemoryManager, index: u32) -> DynValue {
        if index >= self.length(mm) {
            return DynValue::None;
        }
        mm.read_value(self.mem, index as usize + 1)
    }

    /// Overwrite a slot below the capacity; counts are the caller's job
    pub(crate) fn set(&mut self, mm: &mut MemoryManager, index: u32, value: DynValue) {
        debug_assert!(index < self.capacity);
        mm.write_value(self.mem, index as usize + 1, value);
    }

    pub(crate) fn set_length(&mut self, mm: &mut MemoryManager, len: u32) {
        debug_assert!(len <= self.capacity);
        mm.write_value(self.mem, 0, DynValue::from_u32(len));
    }

    /// Grow to hold at least `min` elements
    ///
    /// Moves to a fresh block, since the allocator never grows in place.
    pub(crate) fn reserve(&mut self, mm: &mut MemoryManager, min: u32) -> Result<(), AllocError> {
        if min <= self.capacity {
            return Ok(());
        }
        let capacity = min.max(self.capacity.saturating_mul(2)).min(MAX_FAST_ARRAY_LENGTH).max(min);
        let mem = mm.realloc(self.mem, (capacity as usize + 1) * 8)?;
        for i in self.capacity as usize + 1..=capacity as usize {
            mm.write_value(mem, i, DynValue::None);
        }
        self.mem = mem;
        self.capacity = capacity;
        Ok(())
    }

    /// Elements in index order, holes included
    pub fn values<'a>(&'a self, mm: &'a MemoryManager) -> impl Iterator<Item = DynValue> + 'a {
        (1..=self.length(mm) as usize).map(move |i| mm.read_value(self.mem, i))
    }

    pub(crate) fn trace(&self, tracer: &mut Tracer<'_>) {
        let mm = tracer.memory();
        for v in self.values(mm) {
            tracer.value(v);
        }
    }

    pub(crate) fn free(self, mm: &mut MemoryManager) {
        mm.free(self.mem);
    }
}

impl Runtime {
    /// An array of `len` holes
    ///
    /// Lengths past [`MAX_FAST_ARRAY_LENGTH`] start out generic.
    pub fn new_array(&mut self, len: u32) -> JsResult<GcRef> {
        if len > MAX_FAST_ARRAY_LENGTH {
            let proto = Prototype::Builtin(BuiltinObjectId::ArrayPrototype);
            let arr = self.create_object(ObjectClass::Array, proto, StorageMode::Generic, ObjectPayload::None)?;
            let desc = PropertyDescriptor::vwueuc(DynValue::from_u32(len));
            if let Err(err) = self.add_own_property(arr, BuiltinString::Length.into(), desc) {
                self.release(arr);
                return Err(err);
            }
            return Ok(arr);
        }
        let mut store = ElementStore::allocate(&mut self.heap.mm, len)?;
        store.set_length(&mut self.heap.mm, len);
        self.create_object(
            ObjectClass::Array,
            Prototype::Builtin(BuiltinObjectId::ArrayPrototype),
            StorageMode::RegularArray,
            ObjectPayload::Elements(store),
        )
    }

    /// A regular array holding `values`, which are borrowed
    pub fn new_array_from(&mut self, values: &[DynValue]) -> JsResult<GcRef> {
        let len = u32::try_from(values.len())
            .ok()
            .filter(|&n| n <= MAX_FAST_ARRAY_LENGTH)
            .ok_or_else(|| RuntimeError::range_error("array literal too long"))?;
        let mut store = ElementStore::allocate(&mut self.heap.mm, len)?;
        for (i, &v) in values.iter().enumerate() {
            self.retain_value(v);
            store.set(&mut self.heap.mm, i as u32, v);
        }
        store.set_length(&mut self.heap.mm, len);
        self.create_object(
            ObjectClass::Array,
            Prototype::Builtin(BuiltinObjectId::ArrayPrototype),
            StorageMode::RegularArray,
            ObjectPayload::Elements(store),
        )
    }

    /// `ToUint32(obj.length)` for any object
    pub fn get_length(&mut self, obj: GcRef) -> JsResult<u32> {
        if let Some(store) = self.heap.object(obj).elements() {
            return Ok(store.length(&self.heap.mm));
        }
        let v = self.get(obj, BuiltinString::Length.into())?;
        let n = self.to_uint32(v);
        self.release_value(v);
        n
    }

    /// Array `length` assignment
    ///
    /// Truncation deletes index properties from the top down and stops at
    /// the first one that cannot be deleted.
    pub fn set_length(&mut self, obj: GcRef, len: DynValue, throw: bool) -> JsResult<bool> {
        let desc = PropertyDescriptor::generic().with_value(len);
        self.define_array_length(obj, desc, throw)
    }

    /// Regular arrays: write an index in place or append
    ///
    /// Returns `false` when the write needs the generic path.
    pub(crate) fn array_fast_put(&mut self, obj: GcRef, index: u32, value: DynValue) -> JsResult<bool> {
        let (o, mm) = self.heap.object_and_memory(obj);
        let extensible = o.extensible;
        let Some(store) = o.elements() else {
            return Ok(false);
        };
        let len = store.length(mm);
        let old = store.get(mm, index);
        if index < len && !old.is_none() {
            self.retain_value(value);
            self.store_element(obj, index, value);
            self.release_value(old);
            return Ok(true);
        }
        if index > len || !extensible || index >= MAX_FAST_ARRAY_LENGTH {
            return Ok(false);
        }
        // A hole or an append: an inherited setter or read-only index must win
        if !self.inherited_index_is_plain(obj, index) {
            return Ok(false);
        }
        let (o, mm) = self.heap.object_and_memory(obj);
        if let ObjectPayload::Elements(store) = &mut o.payload {
            store.reserve(mm, index + 1)?;
            if index == len {
                store.set_length(mm, len + 1);
            }
        }
        self.retain_value(value);
        self.store_element(obj, index, value);
        Ok(true)
    }

    fn store_element(&mut self, obj: GcRef, index: u32, value: DynValue) {
        let (o, mm) = self.heap.object_and_memory(obj);
        if let ObjectPayload::Elements(store) = &mut o.payload {
            store.set(mm, index, value);
        }
    }

    /// No prototype along the existing chain defines `index`
    fn inherited_index_is_plain(&self, obj: GcRef, index: u32) -> bool {
        let mut link = self.heap.object(obj).proto;
        while let Some(p) = self.existing_prototype(link) {
            let o = self.heap.object(p);
            if o.storage != StorageMode::RegularArray
                && o.props.find(PropKey::Index(index), |a, b| self.string_equals(a, b)).is_some()
            {
                return false;
            }
            link = o.proto;
        }
        true
    }

    /// Resize a regular array in place
    ///
    /// Truncated elements are released. Growth past the fast limit demotes
    /// the array and writes `length` generically.
    pub(crate) fn regular_set_length(&mut self, obj: GcRef, new_len: u32) -> JsResult<()> {
        if new_len > MAX_FAST_ARRAY_LENGTH {
            self.convert_to_generic(obj)?;
            return self.set_own_value(obj, BuiltinString::Length.into(), DynValue::from_u32(new_len));
        }
        let (o, mm) = self.heap.object_and_memory(obj);
        let ObjectPayload::Elements(store) = &mut o.payload else {
            return Ok(());
        };
        let old_len = store.length(mm);
        if new_len >= old_len {
            store.reserve(mm, new_len)?;
            store.set_length(mm, new_len);
            return Ok(());
        }
        let mut dropped = Vec::with_capacity((old_len - new_len) as usize);
        for i in (new_len..old_len).rev() {
            dropped.push(store.get(mm, i));
            store.set(mm, i, DynValue::None);
        }
        store.set_length(mm, new_len);
        for v in dropped {
            self.release_value(v);
        }
        Ok(())
    }

    /// Move regular elements into the property list
    ///
    /// Every record is allocated up front so a failure leaves the array
    /// untouched.
    pub(crate) fn demote_array(&mut self, obj: GcRef) -> JsResult<()> {
        let (o, mm) = self.heap.object_and_memory(obj);
        let Some(store) = o.elements() else {
            return Ok(());
        };
        let len = store.length(mm);
        let values: Vec<(u32, DynValue)> = store
            .values(mm)
            .enumerate()
            .filter(|(_, v)| !v.is_none())
            .map(|(i, v)| (i as u32, v))
            .collect();

        let mut records = Vec::with_capacity(values.len() + 1);
        for _ in 0..=values.len() {
            match self.allocate_prop_record() {
                Ok(mem) => records.push(mem),
                Err(err) => {
                    for mem in records {
                        self.heap.mm.free(mem);
                    }
                    return Err(err.into());
                }
            }
        }

        let (o, mm) = self.heap.object_and_memory(obj);
        let mut records = records.into_iter();
        if let Some(mem) = records.next() {
            let length = PropertyDescriptor::vwueuc(DynValue::from_u32(len));
            o.props.push(BuiltinString::Length.into(), length, mem);
        }
        // Element references move from the block to the list unchanged
        for ((i, v), mem) in values.into_iter().zip(records) {
            o.props.push(PropKey::Index(i), PropertyDescriptor::vwec(v), mem);
        }
        if let ObjectPayload::Elements(store) = std::mem::take(&mut o.payload) {
            store.free(mm);
        }
        o.storage = StorageMode::Generic;
        tracing::trace!(target: "dynjs::object", obj = %obj, len, "array demoted to generic storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeConfig::embedded()).unwrap()
    }

    #[test]
    fn test_new_array_holes() {
        let mut rt = runtime();
        let arr = rt.new_array(3).unwrap();
        assert_eq!(rt.storage_of(arr), StorageMode::RegularArray);
        assert_eq!(rt.get_length(arr).unwrap(), 3);
        assert!(rt.get_own_property(arr, PropKey::Index(1)).is_undefined());
        let len = rt.get_own_property(arr, BuiltinString::Length.into());
        assert_eq!(len, PropertyDescriptor::vwueuc(DynValue::Int32(3)));
    }

    #[test]
    fn test_new_array_from_retains() {
        let mut rt = runtime();
        let s = rt.new_string("x").unwrap();
        let arr = rt.new_array_from(&[DynValue::Int32(1), s]).unwrap();
        let sr = s.heap_ref().unwrap();
        assert_eq!(rt.refcount(sr), 2);
        assert_eq!(rt.get(arr, PropKey::Index(0)).unwrap(), DynValue::Int32(1));
        rt.release(arr);
        assert_eq!(rt.refcount(sr), 1);
    }

    #[test]
    fn test_append_stays_regular() {
        let mut rt = runtime();
        let arr = rt.new_array(0).unwrap();
        for i in 0..10 {
            rt.put(arr, PropKey::Index(i), DynValue::Int32(i as i32), true).unwrap();
        }
        assert_eq!(rt.storage_of(arr), StorageMode::RegularArray);
        assert_eq!(rt.get_length(arr).unwrap(), 10);
        assert_eq!(rt.get(arr, PropKey::Index(9)).unwrap(), DynValue::Int32(9));
    }

    #[test]
    fn test_sparse_write_demotes() {
        let mut rt = runtime();
        let arr = rt.new_array_from(&[DynValue::Int32(1)]).unwrap();
        rt.put(arr, PropKey::Index(5), DynValue::Int32(6), true).unwrap();
        assert_eq!(rt.storage_of(arr), StorageMode::Generic);
        assert_eq!(rt.get_length(arr).unwrap(), 6);
        assert_eq!(rt.get(arr, PropKey::Index(0)).unwrap(), DynValue::Int32(1));
        assert!(rt.get_own_property(arr, PropKey::Index(3)).is_undefined());
    }

    #[test]
    fn test_truncate_releases_elements() {
        let mut rt = runtime();
        let s = rt.new_string("tail").unwrap();
        let arr = rt.new_array_from(&[DynValue::Int32(0), s]).unwrap();
        rt.release_value(s);
        assert!(rt.set_length(arr, DynValue::Int32(1), true).unwrap());
        assert!(!rt.is_live(s.heap_ref().unwrap()));
        assert_eq!(rt.get_length(arr).unwrap(), 1);
        assert_eq!(rt.storage_of(arr), StorageMode::RegularArray);
    }

    #[test]
    fn test_invalid_length_is_range_error() {
        let mut rt = runtime();
        let arr = rt.new_array(0).unwrap();
        let err = rt.set_length(arr, DynValue::Double(1.5), true).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Range);
        let err = rt.set_length(arr, DynValue::Int32(-1), true).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Range);
    }

    #[test]
    fn test_demote_keeps_order() {
        let mut rt = runtime();
        let arr = rt.new_array_from(&[DynValue::Int32(1), DynValue::None, DynValue::Int32(3)]).unwrap();
        rt.convert_to_generic(arr).unwrap();
        let keys = rt.own_keys(arr);
        assert_eq!(
            keys,
            vec![PropKey::Index(0), PropKey::Index(2), BuiltinString::Length.into()]
        );
        let len = rt.get_own_property(arr, BuiltinString::Length.into());
        assert!(len.writable() && !len.enumerable() && !len.configurable());
    }

    #[test]
    fn test_huge_length_is_generic() {
        let mut rt = runtime();
        let arr = rt.new_array(MAX_FAST_ARRAY_LENGTH + 1).unwrap();
        assert_eq!(rt.storage_of(arr), StorageMode::Generic);
        assert_eq!(rt.get_length(arr).unwrap(), MAX_FAST_ARRAY_LENGTH + 1);
    }
}
