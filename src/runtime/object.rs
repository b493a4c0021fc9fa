//! Object representation
//!
//! A [`DynObject`] is a counted container cell: an insertion-ordered
//! property list, a prototype link, a class, a storage mode and a
//! class-specific payload. The internal methods that operate on objects are
//! in [`crate::runtime::ops`].

use crate::context::Runtime;
use crate::error::JsResult;
use crate::gc::{AllocError, Cell, GcRef, Heap, MemoryManager, MemoryTag, Trace, Tracer};
use crate::runtime::array::ElementStore;
use crate::runtime::function::FunctionRecord;
use crate::runtime::property::PropertyList;
use crate::value::DynValue;

/// Arena bytes charged per object record
pub const OBJECT_RECORD_SIZE: usize = 28;

/// Object classes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Global = 0,
    Object = 1,
    Function = 2,
    Array = 3,
    String = 4,
    Boolean = 5,
    Number = 6,
    Math = 7,
    Date = 8,
    RegExp = 9,
    Json = 10,
    Error = 11,
    Arguments = 12,
    Intl = 13,
}

impl ObjectClass {
    /// The `[[Class]]` name shown by `Object.prototype.toString`
    pub const fn name(self) -> &'static str {
        match self {
            ObjectClass::Global => "global",
            ObjectClass::Object => "Object",
            ObjectClass::Function => "Function",
            ObjectClass::Array => "Array",
            ObjectClass::String => "String",
            ObjectClass::Boolean => "Boolean",
            ObjectClass::Number => "Number",
            ObjectClass::Math => "Math",
            ObjectClass::Date => "Date",
            ObjectClass::RegExp => "RegExp",
            ObjectClass::Json => "JSON",
            ObjectClass::Error => "Error",
            ObjectClass::Arguments => "Arguments",
            ObjectClass::Intl => "Intl",
        }
    }

    /// String, Boolean and Number objects wrap a primitive
    #[inline]
    pub const fn is_wrapper(self) -> bool {
        matches!(self, ObjectClass::String | ObjectClass::Boolean | ObjectClass::Number)
    }
}

/// How an object's own properties are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Arbitrary descriptors in the property list
    Generic,
    /// Host-managed class objects; treated as generic by the internal methods
    Extern,
    /// Only writable, enumerable, configurable data properties
    RegularObject,
    /// Dense elements in an arena block; `length` is implicit
    RegularArray,
    /// Number wrapper around NaN or an infinity
    SpecialNumberObject,
}

/// Objects owned by the runtime and created on first use
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinObjectId {
    Global = 0,
    ObjectPrototype,
    FunctionPrototype,
    ArrayPrototype,
    StringPrototype,
    BooleanPrototype,
    NumberPrototype,
    ErrorPrototype,
    Math,
    Json,
    NumberConstructor,
    BooleanConstructor,
}

impl BuiltinObjectId {
    pub const COUNT: usize = 12;

    pub const ALL: [BuiltinObjectId; Self::COUNT] = [
        BuiltinObjectId::Global,
        BuiltinObjectId::ObjectPrototype,
        BuiltinObjectId::FunctionPrototype,
        BuiltinObjectId::ArrayPrototype,
        BuiltinObjectId::StringPrototype,
        BuiltinObjectId::BooleanPrototype,
        BuiltinObjectId::NumberPrototype,
        BuiltinObjectId::ErrorPrototype,
        BuiltinObjectId::Math,
        BuiltinObjectId::Json,
        BuiltinObjectId::NumberConstructor,
        BuiltinObjectId::BooleanConstructor,
    ];

    pub const fn class(self) -> ObjectClass {
        match self {
            BuiltinObjectId::Global => ObjectClass::Global,
            BuiltinObjectId::ObjectPrototype => ObjectClass::Object,
            BuiltinObjectId::FunctionPrototype
            | BuiltinObjectId::NumberConstructor
            | BuiltinObjectId::BooleanConstructor => ObjectClass::Function,
            BuiltinObjectId::ArrayPrototype => ObjectClass::Array,
            BuiltinObjectId::StringPrototype => ObjectClass::String,
            BuiltinObjectId::BooleanPrototype => ObjectClass::Boolean,
            BuiltinObjectId::NumberPrototype => ObjectClass::Number,
            BuiltinObjectId::ErrorPrototype => ObjectClass::Error,
            BuiltinObjectId::Math => ObjectClass::Math,
            BuiltinObjectId::Json => ObjectClass::Json,
        }
    }

    /// The prototype a builtin object itself inherits from
    pub const fn prototype(self) -> Prototype {
        match self {
            BuiltinObjectId::ObjectPrototype => Prototype::Null,
            BuiltinObjectId::NumberConstructor | BuiltinObjectId::BooleanConstructor => {
                Prototype::Builtin(BuiltinObjectId::FunctionPrototype)
            }
            _ => Prototype::Builtin(BuiltinObjectId::ObjectPrototype),
        }
    }

    /// Prototype for instances of a class
    pub const fn for_class(class: ObjectClass) -> BuiltinObjectId {
        match class {
            ObjectClass::Function => BuiltinObjectId::FunctionPrototype,
            ObjectClass::Array | ObjectClass::Arguments => BuiltinObjectId::ArrayPrototype,
            ObjectClass::String => BuiltinObjectId::StringPrototype,
            ObjectClass::Boolean => BuiltinObjectId::BooleanPrototype,
            ObjectClass::Number => BuiltinObjectId::NumberPrototype,
            ObjectClass::Error => BuiltinObjectId::ErrorPrototype,
            _ => BuiltinObjectId::ObjectPrototype,
        }
    }

    /// Enumeration yields nothing for these
    pub const fn is_opaque(self) -> bool {
        matches!(
            self,
            BuiltinObjectId::Json | BuiltinObjectId::NumberConstructor | BuiltinObjectId::BooleanConstructor
        )
    }
}

/// Prototype link
///
/// Only `Object` holds a counted reference. A `Builtin` link names a
/// runtime-owned object that may not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prototype {
    #[default]
    Null,
    Object(GcRef),
    Builtin(BuiltinObjectId),
}

/// Class-specific payload
#[derive(Debug, Default)]
pub enum ObjectPayload {
    #[default]
    None,
    Function(FunctionRecord),
    /// The wrapped primitive of a String, Boolean or Number object
    Primitive(DynValue),
    /// Regular array elements
    Elements(ElementStore),
    /// `NaN` or an infinity wrapped by a Number object
    SpecialNumber(DynValue),
}

impl ObjectPayload {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            ObjectPayload::None => {}
            ObjectPayload::Function(f) => f.trace(tracer),
            ObjectPayload::Primitive(v) | ObjectPayload::SpecialNumber(v) => tracer.value(*v),
            ObjectPayload::Elements(store) => store.trace(tracer),
        }
    }

    /// Return the payload's arena blocks
    pub(crate) fn free_storage(self, mm: &mut MemoryManager) {
        match self {
            ObjectPayload::Function(f) => f.free_storage(mm),
            ObjectPayload::Elements(store) => store.free(mm),
            _ => {}
        }
    }
}

/// An object cell
#[derive(Debug)]
pub struct DynObject {
    pub(crate) props: PropertyList,
    pub(crate) proto: Prototype,
    pub(crate) extensible: bool,
    pub(crate) class: ObjectClass,
    pub(crate) storage: StorageMode,
    pub(crate) payload: ObjectPayload,
    pub(crate) builtin_id: Option<BuiltinObjectId>,
    /// Live iterators walking the property list
    pub(crate) iterating: u32,
}

impl DynObject {
    pub fn new(class: ObjectClass, proto: Prototype, storage: StorageMode, payload: ObjectPayload) -> Self {
        DynObject {
            props: PropertyList::new(),
            proto,
            extensible: true,
            class,
            storage,
            payload,
            builtin_id: None,
            iterating: 0,
        }
    }

    #[inline]
    pub fn class(&self) -> ObjectClass {
        self.class
    }

    #[inline]
    pub fn storage(&self) -> StorageMode {
        self.storage
    }

    #[inline]
    pub fn proto(&self) -> Prototype {
        self.proto
    }

    #[inline]
    pub fn is_extensible(&self) -> bool {
        self.extensible
    }

    #[inline]
    pub fn builtin_id(&self) -> Option<BuiltinObjectId> {
        self.builtin_id
    }

    #[inline]
    pub fn props(&self) -> &PropertyList {
        &self.props
    }

    #[inline]
    pub fn payload(&self) -> &ObjectPayload {
        &self.payload
    }

    #[inline]
    pub fn is_callable(&self) -> bool {
        matches!(self.payload, ObjectPayload::Function(_))
    }

    #[inline]
    pub fn is_regular_array(&self) -> bool {
        self.storage == StorageMode::RegularArray
    }

    /// The primitive a wrapper object boxes
    pub fn primitive(&self) -> Option<DynValue> {
        match self.payload {
            ObjectPayload::Primitive(v) | ObjectPayload::SpecialNumber(v) => Some(v),
            _ => None,
        }
    }

    pub fn elements(&self) -> Option<&ElementStore> {
        match &self.payload {
            ObjectPayload::Elements(store) => Some(store),
            _ => None,
        }
    }

    pub fn function(&self) -> Option<&FunctionRecord> {
        match &self.payload {
            ObjectPayload::Function(f) => Some(f),
            _ => None,
        }
    }

    #[inline]
    pub fn is_iterating(&self) -> bool {
        self.iterating > 0
    }

    pub(crate) fn begin_iteration(&mut self) {
        self.iterating += 1;
    }

    /// Tombstones left by deletes during iteration go once the last
    /// iterator is done
    pub(crate) fn end_iteration(&mut self, mm: &mut MemoryManager) {
        self.iterating = self.iterating.saturating_sub(1);
        if self.iterating == 0 {
            self.props.compact(mm);
        }
    }
}

impl Trace for DynObject {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        if let Prototype::Object(p) = self.proto {
            tracer.edge(p);
        }
        self.props.trace(tracer);
        self.payload.trace(tracer);
    }

    fn finalize(&mut self, heap: &mut Heap) {
        self.props.free_storage(&mut heap.mm);
        std::mem::take(&mut self.payload).free_storage(&mut heap.mm);
    }
}

impl Runtime {
    /// Publish an object; the caller owns the single reference
    ///
    /// `payload` references are owned by the new object. A counted `proto`
    /// is borrowed and retained here. On allocation failure the payload is
    /// dropped with its references.
    pub(crate) fn create_object(
        &mut self,
        class: ObjectClass,
        proto: Prototype,
        storage: StorageMode,
        payload: ObjectPayload,
    ) -> JsResult<GcRef> {
        let mem = match self.heap.mm.allocate_gc(OBJECT_RECORD_SIZE, MemoryTag::Object) {
            Ok(mem) => mem,
            Err(err) => {
                self.drop_payload(payload);
                return Err(err.into());
            }
        };
        if let Prototype::Object(p) = proto {
            self.retain(p);
        }
        let obj = DynObject::new(class, proto, storage, payload);
        Ok(self.publish(Cell::Object(obj), mem))
    }

    fn drop_payload(&mut self, payload: ObjectPayload) {
        let mut tracer = Tracer::new(&self.heap.mm);
        payload.trace(&mut tracer);
        let edges = tracer.into_edges();
        payload.free_storage(&mut self.heap.mm);
        for r in edges {
            self.release(r);
        }
    }

    /// A plain extensible object inheriting from `Object.prototype`
    pub fn new_object(&mut self) -> JsResult<GcRef> {
        self.create_object(
            ObjectClass::Object,
            Prototype::Builtin(BuiltinObjectId::ObjectPrototype),
            StorageMode::RegularObject,
            ObjectPayload::None,
        )
    }

    /// A plain object with an explicit prototype, `None` meaning null
    pub fn new_object_with_proto(&mut self, proto: Option<GcRef>) -> JsResult<GcRef> {
        let proto = proto.map_or(Prototype::Null, Prototype::Object);
        self.create_object(ObjectClass::Object, proto, StorageMode::RegularObject, ObjectPayload::None)
    }

    /// A generic object of any class, inheriting from the class prototype
    pub fn new_object_of_class(&mut self, class: ObjectClass) -> JsResult<GcRef> {
        let storage = match class {
            ObjectClass::Date | ObjectClass::RegExp | ObjectClass::Intl => StorageMode::Extern,
            _ => StorageMode::Generic,
        };
        let proto = Prototype::Builtin(BuiltinObjectId::for_class(class));
        self.create_object(class, proto, storage, ObjectPayload::None)
    }

    /// Box a primitive in its wrapper object
    ///
    /// Returns `None` for undefined, null and values that are not
    /// primitives.
    pub fn new_wrapper(&mut self, prim: DynValue) -> JsResult<Option<GcRef>> {
        let (class, storage, payload) = match prim {
            DynValue::Boolean(_) => (ObjectClass::Boolean, StorageMode::Generic, ObjectPayload::Primitive(prim)),
            DynValue::Int32(_) | DynValue::Double(_) => {
                (ObjectClass::Number, StorageMode::Generic, ObjectPayload::Primitive(prim))
            }
            DynValue::NaN | DynValue::PositiveInfinity | DynValue::NegativeInfinity => (
                ObjectClass::Number,
                StorageMode::SpecialNumberObject,
                ObjectPayload::SpecialNumber(prim),
            ),
            DynValue::String(s) => {
                self.share_string(s);
                (ObjectClass::String, StorageMode::Generic, ObjectPayload::Primitive(prim))
            }
            _ => return Ok(None),
        };
        let proto = Prototype::Builtin(BuiltinObjectId::for_class(class));
        let r = self.create_object(class, proto, storage, payload)?;
        if let DynValue::String(s) = prim {
            let len = DynValue::from_u32(self.string_len(s) as u32);
            let desc = crate::runtime::property::PropertyDescriptor::vuwueuc(len);
            if let Err(err) = self.add_own_property(r, crate::runtime::string::BuiltinString::Length.into(), desc) {
                self.release(r);
                return Err(err);
            }
        }
        Ok(Some(r))
    }

    pub fn class_of(&self, obj: GcRef) -> ObjectClass {
        self.heap.object(obj).class
    }

    pub fn storage_of(&self, obj: GcRef) -> StorageMode {
        self.heap.object(obj).storage
    }

    /// Allocate the arena record for one more property
    pub(crate) fn allocate_prop_record(&mut self) -> Result<crate::gc::ArenaPtr, AllocError> {
        PropertyList::allocate_record(&mut self.heap.mm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::runtime::string::BuiltinString;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeConfig::embedded()).unwrap()
    }

    #[test]
    fn test_new_object_defaults() {
        let mut rt = runtime();
        let obj = rt.new_object().unwrap();
        let o = rt.heap.object(obj);
        assert_eq!(o.class(), ObjectClass::Object);
        assert_eq!(o.storage(), StorageMode::RegularObject);
        assert_eq!(o.proto(), Prototype::Builtin(BuiltinObjectId::ObjectPrototype));
        assert!(o.is_extensible());
        assert!(o.props().is_empty());
        assert_eq!(rt.refcount(obj), 1);
    }

    #[test]
    fn test_proto_is_counted() {
        let mut rt = runtime();
        let parent = rt.new_object().unwrap();
        let child = rt.new_object_with_proto(Some(parent)).unwrap();
        assert_eq!(rt.refcount(parent), 2);
        rt.release(child);
        assert_eq!(rt.refcount(parent), 1);
        rt.release(parent);
        assert_eq!(rt.heap.live_cells(), 0);
    }

    #[test]
    fn test_wrappers() {
        let mut rt = runtime();
        let n = rt.new_wrapper(DynValue::Int32(5)).unwrap().unwrap();
        assert_eq!(rt.class_of(n), ObjectClass::Number);
        assert_eq!(rt.heap.object(n).primitive(), Some(DynValue::Int32(5)));

        let nan = rt.new_wrapper(DynValue::NaN).unwrap().unwrap();
        assert_eq!(rt.storage_of(nan), StorageMode::SpecialNumberObject);

        let s = rt.new_string("abc").unwrap();
        let w = rt.new_wrapper(s).unwrap().unwrap();
        let sr = s.heap_ref().unwrap();
        assert_eq!(rt.refcount(sr), 2);
        let len = rt.get(w, BuiltinString::Length.into()).unwrap();
        assert_eq!(len, DynValue::Int32(3));

        assert!(rt.new_wrapper(DynValue::Null).unwrap().is_none());
        rt.release(w);
        assert_eq!(rt.refcount(sr), 1);
    }

    #[test]
    fn test_builtin_ids() {
        assert_eq!(BuiltinObjectId::ALL.len(), BuiltinObjectId::COUNT);
        for (i, id) in BuiltinObjectId::ALL.iter().enumerate() {
            assert_eq!(*id as usize, i);
        }
        assert_eq!(BuiltinObjectId::ObjectPrototype.prototype(), Prototype::Null);
        assert_eq!(BuiltinObjectId::for_class(ObjectClass::Array), BuiltinObjectId::ArrayPrototype);
        assert!(BuiltinObjectId::Json.is_opaque());
        assert_eq!(ObjectClass::Json.name(), "JSON");
    }

    #[test]
    fn test_record_charges_app_arena() {
        let mut rt = runtime();
        let before = rt.memory_stats().app_usage;
        let obj = rt.new_object().unwrap();
        assert!(rt.memory_stats().app_usage >= before + OBJECT_RECORD_SIZE);
        rt.release(obj);
        assert_eq!(rt.memory_stats().app_usage, before);
    }
}
