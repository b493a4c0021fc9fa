//! Object internal methods
//!
//! Property lookup, assignment, deletion and definition in the ECMA-262
//! §8.12 family, plus the array exotic rules of §15.4.5.1.
//!
//! Descriptors returned by lookups borrow their references from the
//! owning object. Values returned by [`Runtime::get`] are owned by the
//! caller. Bookkeeping is always finished before a getter or setter runs.

use crate::context::Runtime;
use crate::error::{JsResult, RuntimeError};
use crate::gc::GcRef;
use crate::runtime::conversion::PreferredType;
use crate::runtime::object::{ObjectClass, Prototype, StorageMode};
use crate::runtime::property::{Attr, PropKey, PropertyDescriptor};
use crate::runtime::string::BuiltinString;
use crate::value::DynValue;

pub(crate) const LENGTH: PropKey = PropKey::Name(crate::runtime::string::StrRef::Builtin(BuiltinString::Length));

impl Runtime {
    /// Position of a live own property in the list
    pub(crate) fn find_own(&self, obj: GcRef, key: PropKey) -> Option<usize> {
        self.heap
            .object(obj)
            .props
            .find(key, |a, b| self.string_equals(a, b))
    }

    /// Display form of a key for messages
    pub fn key_to_string(&self, key: PropKey) -> String {
        match key {
            PropKey::Index(i) => i.to_string(),
            PropKey::Name(s) => self.to_rust_string(s),
        }
    }

    /// The prototype object if it exists, without creating builtins
    pub(crate) fn existing_prototype(&self, link: Prototype) -> Option<GcRef> {
        match link {
            Prototype::Null => None,
            Prototype::Object(p) => Some(p),
            Prototype::Builtin(id) => self.builtins[id as usize],
        }
    }

    /// The prototype object, creating a builtin prototype on first use
    pub(crate) fn prototype_link(&mut self, obj: GcRef) -> JsResult<Option<GcRef>> {
        match self.heap.object(obj).proto {
            Prototype::Null => Ok(None),
            Prototype::Object(p) => Ok(Some(p)),
            Prototype::Builtin(id) => self.builtin_object(id).map(Some),
        }
    }

    fn reject(&self, throw: bool, msg: impl FnOnce() -> String) -> JsResult<bool> {
        if throw {
            Err(RuntimeError::type_error(msg()))
        } else {
            Ok(false)
        }
    }

    pub(crate) fn retain_descriptor(&mut self, desc: PropertyDescriptor) {
        if desc.has_value() {
            self.retain_value(desc.value());
        }
        if desc.has_get() {
            self.retain_value(desc.getter());
        }
        if desc.has_set() {
            self.retain_value(desc.setter());
        }
    }

    pub(crate) fn release_descriptor(&mut self, desc: PropertyDescriptor) {
        if desc.has_value() {
            self.release_value(desc.value());
        }
        if desc.has_get() {
            self.release_value(desc.getter());
        }
        if desc.has_set() {
            self.release_value(desc.setter());
        }
    }

    /// `[[GetOwnProperty]]`
    pub fn get_own_property(&self, obj: GcRef, key: PropKey) -> PropertyDescriptor {
        let o = self.heap.object(obj);
        if let Some(store) = o.elements() {
            let mm = &self.heap.mm;
            if let PropKey::Index(i) = key {
                let v = store.get(mm, i);
                return if v.is_none() {
                    PropertyDescriptor::undefined()
                } else {
                    PropertyDescriptor::vwec(v)
                };
            }
            if key == LENGTH {
                return PropertyDescriptor::vwueuc(DynValue::from_u32(store.length(mm)));
            }
        }
        match self.find_own(obj, key) {
            Some(pos) => o.props.get(pos).desc,
            None => PropertyDescriptor::undefined(),
        }
    }

    /// `[[GetProperty]]`: own property first, then the prototype chain
    pub fn get_property(&mut self, obj: GcRef, key: PropKey) -> JsResult<PropertyDescriptor> {
        let mut cur = obj;
        let mut depth = 0;
        loop {
            let desc = self.get_own_property(cur, key);
            if !desc.is_undefined() {
                return Ok(desc);
            }
            match self.prototype_link(cur)? {
                Some(p) => cur = p,
                None => return Ok(PropertyDescriptor::undefined()),
            }
            depth += 1;
            if depth > self.config.max_proto_depth {
                return Err(RuntimeError::range_error("prototype chain too long"));
            }
        }
    }

    /// `[[Get]]`; the result is owned by the caller
    pub fn get(&mut self, obj: GcRef, key: PropKey) -> JsResult<DynValue> {
        let desc = self.get_property(obj, key)?;
        self.value_of_descriptor(desc, DynValue::Object(obj))
    }

    fn value_of_descriptor(&mut self, desc: PropertyDescriptor, receiver: DynValue) -> JsResult<DynValue> {
        if desc.is_undefined() {
            return Ok(DynValue::Undefined);
        }
        if desc.is_accessor() {
            let DynValue::Object(getter) = desc.getter() else {
                return Ok(DynValue::Undefined);
            };
            // Keep the getter alive even if it deletes itself
            self.retain(getter);
            let result = self.call(DynValue::Object(getter), receiver, &[]);
            self.release(getter);
            return result;
        }
        let v = desc.value();
        self.retain_value(v);
        Ok(v)
    }

    /// `[[Get]]` on any value; primitives are boxed
    pub fn get_value(&mut self, value: DynValue, key: PropKey) -> JsResult<DynValue> {
        match value {
            DynValue::Object(obj) => return self.get(obj, key),
            DynValue::Undefined | DynValue::Null | DynValue::None => {
                return Err(RuntimeError::type_error(format!(
                    "cannot read property '{}' of {}",
                    self.key_to_string(key),
                    value
                )));
            }
            DynValue::String(s) => {
                let len = self.string_len(s);
                if key == LENGTH {
                    return Ok(DynValue::from_u32(len as u32));
                }
                if let PropKey::Index(i) = key {
                    if (i as usize) < len {
                        let c = self.slice(s, i as usize, i as usize + 1)?;
                        return Ok(DynValue::String(c));
                    }
                }
            }
            _ => {}
        }
        let Some(wrapper) = self.new_wrapper(value)? else {
            return Ok(DynValue::Undefined);
        };
        let result = self
            .get_property(wrapper, key)
            .and_then(|desc| self.value_of_descriptor(desc, value));
        self.release(wrapper);
        result
    }

    /// `[[CanPut]]`
    pub fn can_put(&mut self, obj: GcRef, key: PropKey) -> JsResult<bool> {
        let own = self.get_own_property(obj, key);
        if !own.is_undefined() {
            if own.is_accessor() {
                return Ok(!own.setter().is_undefined());
            }
            return Ok(own.writable());
        }
        let extensible = self.heap.object(obj).extensible;
        let Some(proto) = self.prototype_link(obj)? else {
            return Ok(extensible);
        };
        let inherited = self.get_property(proto, key)?;
        if inherited.is_undefined() {
            return Ok(extensible);
        }
        if inherited.is_accessor() {
            return Ok(!inherited.setter().is_undefined());
        }
        Ok(extensible && inherited.writable())
    }

    /// The whole chain is plain objects whose properties are all defaults
    fn fast_put_allowed(&self, obj: GcRef) -> bool {
        let mut cur = obj;
        for _ in 0..=self.config.max_proto_depth {
            let o = self.heap.object(cur);
            if o.storage != StorageMode::RegularObject
                || !matches!(o.class, ObjectClass::Object | ObjectClass::Error)
            {
                return false;
            }
            match self.existing_prototype(o.proto) {
                Some(p) => cur = p,
                None => return true,
            }
        }
        false
    }

    /// `[[Put]]`
    pub fn put(&mut self, obj: GcRef, key: PropKey, value: DynValue, throw: bool) -> JsResult<()> {
        match self.heap.object(obj).storage {
            StorageMode::RegularArray => {
                if let PropKey::Index(i) = key {
                    if self.array_fast_put(obj, i, value)? {
                        return Ok(());
                    }
                }
                if key != LENGTH {
                    self.convert_to_generic(obj)?;
                }
            }
            StorageMode::RegularObject if self.fast_put_allowed(obj) => {
                if let Some(pos) = self.find_own(obj, key) {
                    self.replace_value_at(obj, pos, value);
                    return Ok(());
                }
                if self.heap.object(obj).extensible {
                    return self.add_own_property(obj, key, PropertyDescriptor::vwec(value));
                }
            }
            _ => {}
        }

        if !self.can_put(obj, key)? {
            self.reject(throw, || {
                format!("cannot assign to read-only property '{}'", self.key_to_string(key))
            })?;
            return Ok(());
        }
        let own = self.get_own_property(obj, key);
        if own.is_data() {
            if key == LENGTH && self.heap.object(obj).class == ObjectClass::Array {
                self.set_length(obj, value, throw)?;
                return Ok(());
            }
            return self.set_own_value(obj, key, value);
        }
        let desc = self.get_property(obj, key)?;
        if desc.is_accessor() {
            if let DynValue::Object(setter) = desc.setter() {
                self.retain(setter);
                let result = self.call(DynValue::Object(setter), DynValue::Object(obj), &[value]);
                self.release(setter);
                self.release_value(result?);
            }
            return Ok(());
        }
        self.define_own_property(obj, key, PropertyDescriptor::vwec(value), throw)?;
        Ok(())
    }

    /// Add a property the object does not have yet; `desc` is borrowed
    pub(crate) fn add_own_property(&mut self, obj: GcRef, key: PropKey, desc: PropertyDescriptor) -> JsResult<()> {
        if self.heap.object(obj).storage == StorageMode::RegularArray {
            self.convert_to_generic(obj)?;
        }
        let mem = self.allocate_prop_record()?;
        // Names are borrowed from the atom table
        let key = match key {
            PropKey::Name(name) => PropKey::Name(self.atomize(name)),
            index => index,
        };
        self.retain_descriptor(desc);
        let o = self.heap.object_mut(obj);
        if o.storage == StorageMode::RegularObject && !desc.is_default() {
            o.storage = StorageMode::Generic;
        }
        o.props.push(key, desc, mem);
        Ok(())
    }

    fn replace_value_at(&mut self, obj: GcRef, pos: usize, value: DynValue) {
        self.retain_value(value);
        let prop = self.heap.object_mut(obj).props.get_mut(pos);
        let old = prop.desc.value();
        prop.desc.set_value(value);
        self.release_value(old);
    }

    fn replace_descriptor(&mut self, obj: GcRef, pos: usize, desc: PropertyDescriptor) {
        self.retain_descriptor(desc);
        let o = self.heap.object_mut(obj);
        let old = std::mem::replace(&mut o.props.get_mut(pos).desc, desc);
        if o.storage == StorageMode::RegularObject && !desc.is_default() {
            o.storage = StorageMode::Generic;
        }
        self.release_descriptor(old);
    }

    /// Overwrite the value of an existing own data property
    pub(crate) fn set_own_value(&mut self, obj: GcRef, key: PropKey, value: DynValue) -> JsResult<()> {
        if let PropKey::Index(i) = key {
            if self.heap.object(obj).is_regular_array() && self.array_fast_put(obj, i, value)? {
                return Ok(());
            }
        }
        if let Some(pos) = self.find_own(obj, key) {
            self.replace_value_at(obj, pos, value);
        }
        Ok(())
    }

    /// `[[Delete]]`
    ///
    /// Unlinks the property, or leaves a tombstone while an iterator walks
    /// the object.
    pub fn delete(&mut self, obj: GcRef, key: PropKey, throw: bool) -> JsResult<bool> {
        let mark = self.heap.object(obj).is_iterating();
        self.delete_with(obj, key, throw, mark)
    }

    /// `[[Delete]]` with an explicit tombstone choice
    pub fn delete_with(&mut self, obj: GcRef, key: PropKey, throw: bool, mark_as_deleted: bool) -> JsResult<bool> {
        self.convert_to_generic(obj)?;
        let Some(pos) = self.find_own(obj, key) else {
            return Ok(true);
        };
        if !self.heap.object(obj).props.get(pos).desc.configurable() {
            return self.reject(throw, || {
                format!("cannot delete non-configurable property '{}'", self.key_to_string(key))
            });
        }
        let (o, mm) = self.heap.object_and_memory(obj);
        let desc = if mark_as_deleted {
            o.props.mark_deleted(pos)
        } else {
            o.props.remove(pos, mm).desc
        };
        self.release_descriptor(desc);
        Ok(true)
    }

    /// `[[DefineOwnProperty]]`
    pub fn define_own_property(
        &mut self,
        obj: GcRef,
        key: PropKey,
        desc: PropertyDescriptor,
        throw: bool,
    ) -> JsResult<bool> {
        if desc.is_data() && desc.is_accessor() {
            return Err(RuntimeError::type_error(
                "property descriptor cannot have both a value and accessors",
            ));
        }
        if self.heap.object(obj).class == ObjectClass::Array {
            if key == LENGTH {
                return self.define_array_length(obj, desc, throw);
            }
            if let PropKey::Index(i) = key {
                return self.define_array_index(obj, i, desc, throw);
            }
        }
        self.ordinary_define(obj, key, desc, throw)
    }

    fn length_of(desc: &PropertyDescriptor) -> u32 {
        desc.value().as_f64().map_or(0, |n| n as u32)
    }

    fn define_array_index(&mut self, obj: GcRef, index: u32, desc: PropertyDescriptor, throw: bool) -> JsResult<bool> {
        let len_desc = self.get_own_property(obj, LENGTH);
        let old_len = Self::length_of(&len_desc);
        if index >= old_len && !len_desc.writable() {
            return self.reject(throw, || format!("cannot add index {}: length is read-only", index));
        }
        if self.heap.object(obj).is_regular_array() {
            let exists = !self.get_own_property(obj, PropKey::Index(index)).is_undefined();
            if fits_fast_slot(&desc, exists) && self.array_fast_put(obj, index, desc.value())? {
                return Ok(true);
            }
            self.convert_to_generic(obj)?;
        }
        if !self.ordinary_define(obj, PropKey::Index(index), desc, throw)? {
            return Ok(false);
        }
        if index >= old_len {
            self.set_own_value(obj, LENGTH, DynValue::from_u32(index + 1))?;
        }
        Ok(true)
    }

    pub(crate) fn define_array_length(&mut self, obj: GcRef, desc: PropertyDescriptor, throw: bool) -> JsResult<bool> {
        let regular = self.heap.object(obj).is_regular_array();
        if !desc.has_value() {
            if regular && desc.is_empty() {
                return Ok(true);
            }
            self.convert_to_generic(obj)?;
            return self.ordinary_define(obj, LENGTH, desc, throw);
        }

        let number = self.to_number(desc.value())?;
        let new_len = self.to_uint32(number)?;
        if number.as_f64() != Some(new_len as f64) {
            return Err(RuntimeError::range_error("invalid array length"));
        }
        let new_desc = desc.with_value(DynValue::from_u32(new_len));
        let len_desc = self.get_own_property(obj, LENGTH);
        let old_len = Self::length_of(&len_desc);

        if new_len >= old_len {
            if regular && fits_fast_length(&desc) {
                self.regular_set_length(obj, new_len)?;
                return Ok(true);
            }
            self.convert_to_generic(obj)?;
            return self.ordinary_define(obj, LENGTH, new_desc, throw);
        }
        if !len_desc.writable() {
            return self.reject(throw, || "cannot shrink array: length is read-only".to_string());
        }
        if regular && fits_fast_length(&desc) {
            self.regular_set_length(obj, new_len)?;
            return Ok(true);
        }
        self.convert_to_generic(obj)?;

        // Writability is dropped only after the elements are gone
        let new_writable = desc.writable != Attr::False;
        let deferred = if new_writable {
            new_desc
        } else {
            new_desc.with_writable(true)
        };
        if !self.ordinary_define(obj, LENGTH, deferred, throw)? {
            return Ok(false);
        }
        let mut doomed: Vec<u32> = self
            .heap
            .object(obj)
            .props
            .iter()
            .filter_map(|p| p.key.as_index())
            .filter(|&i| i >= new_len)
            .collect();
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        for index in doomed {
            if !self.delete(obj, PropKey::Index(index), false)? {
                self.set_own_value(obj, LENGTH, DynValue::from_u32(index + 1))?;
                if !new_writable {
                    self.ordinary_define(obj, LENGTH, PropertyDescriptor::generic().with_writable(false), false)?;
                }
                return self.reject(throw, || format!("cannot delete array index {}", index));
            }
        }
        if !new_writable {
            self.ordinary_define(obj, LENGTH, PropertyDescriptor::generic().with_writable(false), false)?;
        }
        Ok(true)
    }

    /// Every field present in `desc` already holds the same value in `current`
    fn is_unchanged(&self, desc: &PropertyDescriptor, current: &PropertyDescriptor) -> bool {
        let attr_same = |a: Attr, b: Attr| !a.is_set() || a == b;
        (!desc.has_value() || (current.has_value() && self.same_value(desc.value(), current.value())))
            && (!desc.has_get() || (current.has_get() && desc.getter() == current.getter()))
            && (!desc.has_set() || (current.has_set() && desc.setter() == current.setter()))
            && attr_same(desc.writable, current.writable)
            && attr_same(desc.enumerable, current.enumerable)
            && attr_same(desc.configurable, current.configurable)
    }

    /// ECMA-262 8.12.9
    fn ordinary_define(&mut self, obj: GcRef, key: PropKey, desc: PropertyDescriptor, throw: bool) -> JsResult<bool> {
        if self.heap.object(obj).storage == StorageMode::RegularArray {
            self.convert_to_generic(obj)?;
        }
        let Some(pos) = self.find_own(obj, key) else {
            // Steps 3-4
            if !self.heap.object(obj).extensible {
                return self.reject(throw, || {
                    format!("cannot define property '{}': object is not extensible", self.key_to_string(key))
                });
            }
            let new = if desc.is_accessor() {
                PropertyDescriptor::accessor(
                    if desc.has_get() { desc.getter() } else { DynValue::Undefined },
                    if desc.has_set() { desc.setter() } else { DynValue::Undefined },
                    desc.enumerable(),
                    desc.configurable(),
                )
            } else {
                PropertyDescriptor::data(
                    if desc.has_value() { desc.value() } else { DynValue::Undefined },
                    desc.writable(),
                    desc.enumerable(),
                    desc.configurable(),
                )
            };
            self.add_own_property(obj, key, new)?;
            return Ok(true);
        };

        let current = self.heap.object(obj).props.get(pos).desc;
        // Steps 5-6
        if desc.is_empty() || self.is_unchanged(&desc, &current) {
            return Ok(true);
        }
        let key_name = || self.key_to_string(key);
        // Step 7
        if !current.configurable() {
            if desc.configurable.is_true() {
                return self.reject(throw, || format!("cannot redefine non-configurable property '{}'", key_name()));
            }
            if desc.enumerable.is_set() && desc.enumerable() != current.enumerable() {
                return self.reject(throw, || format!("cannot change enumerability of '{}'", key_name()));
            }
        }

        let mut next = current;
        if desc.is_generic() {
            // Step 8
        } else if current.is_data() != desc.is_data() {
            // Step 9
            if !current.configurable() {
                return self.reject(throw, || format!("cannot change kind of property '{}'", key_name()));
            }
            next = if current.is_data() {
                current.into_accessor()
            } else {
                current.into_data()
            };
        } else if current.is_data() {
            // Step 10
            if !current.configurable() && !current.writable() {
                if desc.writable.is_true() {
                    return self.reject(throw, || format!("cannot make '{}' writable", key_name()));
                }
                if desc.has_value() && !self.same_value(desc.value(), current.value()) {
                    return self.reject(throw, || format!("cannot assign to read-only property '{}'", key_name()));
                }
            }
        } else if !current.configurable() {
            // Step 11
            if (desc.has_set() && desc.setter() != current.setter())
                || (desc.has_get() && desc.getter() != current.getter())
            {
                return self.reject(throw, || format!("cannot redefine accessor '{}'", key_name()));
            }
        }

        // Step 12
        if desc.has_value() {
            next.set_value(desc.value());
        }
        if desc.has_get() {
            next.set_getter(desc.getter());
        }
        if desc.has_set() {
            next.set_setter(desc.setter());
        }
        if desc.writable.is_set() {
            next.writable = desc.writable;
        }
        if desc.enumerable.is_set() {
            next.enumerable = desc.enumerable;
        }
        if desc.configurable.is_set() {
            next.configurable = desc.configurable;
        }
        self.replace_descriptor(obj, pos, next);
        Ok(true)
    }

    /// `[[HasProperty]]`
    pub fn has_property(&mut self, obj: GcRef, key: PropKey) -> JsResult<bool> {
        Ok(!self.get_property(obj, key)?.is_undefined())
    }

    pub fn has_own_property(&self, obj: GcRef, key: PropKey) -> bool {
        !self.get_own_property(obj, key).is_undefined()
    }

    /// `[[DefaultValue]]`
    pub fn default_value(&mut self, obj: GcRef, hint: PreferredType) -> JsResult<DynValue> {
        let (class, prim) = {
            let o = self.heap.object(obj);
            (o.class, o.primitive())
        };
        if let (true, Some(prim)) = (class.is_wrapper(), prim) {
            self.retain_value(prim);
            return Ok(prim);
        }
        let hint = match hint {
            PreferredType::Default if class == ObjectClass::Date => PreferredType::String,
            other => other,
        };
        let order = match hint {
            PreferredType::String => [BuiltinString::ToString, BuiltinString::ValueOf],
            _ => [BuiltinString::ValueOf, BuiltinString::ToString],
        };
        for name in order {
            let method = self.get(obj, name.into())?;
            if !self.is_callable(method) {
                self.release_value(method);
                continue;
            }
            let result = self.call(method, DynValue::Object(obj), &[]);
            self.release_value(method);
            let result = result?;
            if result.is_primitive() {
                return Ok(result);
            }
            self.release_value(result);
        }
        Err(RuntimeError::type_error("cannot convert object to primitive value"))
    }

    /// Own keys in enumeration order
    ///
    /// Arrays list indices ascending before names; other objects keep
    /// insertion order. Keys are borrowed from the object.
    pub fn own_keys(&self, obj: GcRef) -> Vec<PropKey> {
        let o = self.heap.object(obj);
        let mut keys = Vec::with_capacity(o.props.len() + 1);
        if let Some(store) = o.elements() {
            keys.extend(
                store
                    .values(&self.heap.mm)
                    .enumerate()
                    .filter(|(_, v)| !v.is_none())
                    .map(|(i, _)| PropKey::Index(i as u32)),
            );
            keys.push(LENGTH);
            return keys;
        }
        if o.class != ObjectClass::Array {
            keys.extend(o.props.iter().map(|p| p.key));
            return keys;
        }
        let mut indices: Vec<u32> = o.props.iter().filter_map(|p| p.key.as_index()).collect();
        indices.sort_unstable();
        keys.extend(indices.into_iter().map(PropKey::Index));
        keys.extend(o.props.iter().map(|p| p.key).filter(|k| !k.is_index()));
        keys
    }

    /// The prototype object, or `None` for null; borrowed
    pub fn get_prototype_of(&mut self, obj: GcRef) -> JsResult<Option<GcRef>> {
        self.prototype_link(obj)
    }

    /// Replace the prototype, rejecting cycles
    pub fn set_prototype_of(&mut self, obj: GcRef, proto: Option<GcRef>) -> JsResult<()> {
        let current = self.heap.object(obj).proto;
        let link = proto.map_or(Prototype::Null, Prototype::Object);
        if current == link {
            return Ok(());
        }
        if !self.heap.object(obj).extensible {
            return Err(RuntimeError::type_error("cannot set prototype of a non-extensible object"));
        }
        let mut cursor = link;
        let mut depth = 0;
        while let Some(p) = self.existing_prototype(cursor) {
            if p == obj {
                return Err(RuntimeError::type_error("cyclic prototype chain"));
            }
            depth += 1;
            if depth > self.config.max_proto_depth {
                return Err(RuntimeError::range_error("prototype chain too long"));
            }
            cursor = self.heap.object(p).proto;
        }
        if let Some(p) = proto {
            self.retain(p);
        }
        self.heap.object_mut(obj).proto = link;
        if let Prototype::Object(old) = current {
            self.release(old);
        }
        Ok(())
    }

    pub fn is_extensible(&self, obj: GcRef) -> bool {
        self.heap.object(obj).extensible
    }

    pub fn prevent_extensions(&mut self, obj: GcRef) {
        self.heap.object_mut(obj).extensible = false;
    }

    /// Make every own property non-configurable and stop extensions
    pub fn seal(&mut self, obj: GcRef) -> JsResult<()> {
        self.convert_to_generic(obj)?;
        let o = self.heap.object_mut(obj);
        for prop in o.props.iter_mut() {
            prop.desc.configurable = Attr::False;
        }
        if o.storage == StorageMode::RegularObject {
            o.storage = StorageMode::Generic;
        }
        o.extensible = false;
        Ok(())
    }

    /// Seal, and make every data property read-only
    pub fn freeze(&mut self, obj: GcRef) -> JsResult<()> {
        self.seal(obj)?;
        for prop in self.heap.object_mut(obj).props.iter_mut() {
            if prop.desc.is_data() {
                prop.desc.writable = Attr::False;
            }
        }
        Ok(())
    }

    pub fn is_sealed(&self, obj: GcRef) -> bool {
        !self.is_extensible(obj)
            && self
                .own_keys(obj)
                .into_iter()
                .all(|k| !self.get_own_property(obj, k).configurable())
    }

    pub fn is_frozen(&self, obj: GcRef) -> bool {
        self.is_sealed(obj)
            && self.own_keys(obj).into_iter().all(|k| {
                let desc = self.get_own_property(obj, k);
                !desc.is_data() || !desc.writable()
            })
    }

    /// Drop fast storage, keeping every own property
    pub fn convert_to_generic(&mut self, obj: GcRef) -> JsResult<()> {
        match self.heap.object(obj).storage {
            StorageMode::RegularArray => self.demote_array(obj),
            StorageMode::RegularObject => {
                self.heap.object_mut(obj).storage = StorageMode::Generic;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// A define that a regular array slot can absorb
fn fits_fast_slot(desc: &PropertyDescriptor, exists: bool) -> bool {
    if desc.is_default() {
        return true;
    }
    exists
        && desc.has_value()
        && !desc.is_accessor()
        && desc.writable != Attr::False
        && desc.enumerable != Attr::False
        && desc.configurable != Attr::False
}

/// A `length` define that keeps the implicit attributes
fn fits_fast_length(desc: &PropertyDescriptor) -> bool {
    !desc.is_accessor()
        && desc.writable != Attr::False
        && desc.enumerable != Attr::True
        && desc.configurable != Attr::True
}
