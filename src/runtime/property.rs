//! Property descriptors and property lists
//!
//! An object's own properties are kept in insertion order. Each property
//! record charges a small block to the application arena. Deleting while an
//! iterator walks the list leaves a tombstone in place instead of shifting
//! later entries; tombstones are compacted once the last iterator is done.

use crate::gc::{ArenaPtr, MemoryManager, MemoryTag, Tracer};
use crate::runtime::string::{BuiltinString, StrRef};
use crate::value::DynValue;

/// Arena bytes charged per property record
pub const PROP_RECORD_SIZE: usize = 24;

/// Property key: an array index or a name, never both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropKey {
    Index(u32),
    Name(StrRef),
}

impl PropKey {
    #[inline]
    pub const fn as_index(self) -> Option<u32> {
        match self {
            PropKey::Index(i) => Some(i),
            PropKey::Name(_) => None,
        }
    }

    #[inline]
    pub const fn is_index(self) -> bool {
        matches!(self, PropKey::Index(_))
    }

    #[inline]
    pub fn is_builtin(self, b: BuiltinString) -> bool {
        self == PropKey::Name(StrRef::Builtin(b))
    }
}

impl From<u32> for PropKey {
    fn from(i: u32) -> Self {
        PropKey::Index(i)
    }
}

impl From<BuiltinString> for PropKey {
    fn from(b: BuiltinString) -> Self {
        PropKey::Name(StrRef::Builtin(b))
    }
}

/// Tri-state attribute
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attr {
    #[default]
    Unset = 0x00,
    False = 0x02,
    True = 0x03,
}

impl Attr {
    /// Bit marking the attribute as present
    pub const HAS_ATTR: u8 = 0x02;

    #[inline]
    pub const fn from_bool(b: bool) -> Self {
        if b { Attr::True } else { Attr::False }
    }

    #[inline]
    pub const fn is_set(self) -> bool {
        self as u8 & Self::HAS_ATTR != 0
    }

    /// Present and true
    #[inline]
    pub const fn is_true(self) -> bool {
        matches!(self, Attr::True)
    }

    #[inline]
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Attr::Unset => None,
            Attr::False => Some(false),
            Attr::True => Some(true),
        }
    }
}

pub const HAS_GET: u8 = 0x01;
pub const HAS_SET: u8 = 0x02;
pub const HAS_VALUE: u8 = 0x04;
pub const UNDEFINED: u8 = 0x40;

/// A property descriptor
///
/// Carries a value or a getter/setter pair, never both. Descriptors handed
/// out by lookups borrow their references from the owning object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyDescriptor {
    fields: u8,
    pub writable: Attr,
    pub enumerable: Attr,
    pub configurable: Attr,
    value: DynValue,
    getter: DynValue,
    setter: DynValue,
}

impl PropertyDescriptor {
    /// The "no such property" sentinel
    pub const fn undefined() -> Self {
        PropertyDescriptor {
            fields: UNDEFINED,
            writable: Attr::Unset,
            enumerable: Attr::Unset,
            configurable: Attr::Unset,
            value: DynValue::Undefined,
            getter: DynValue::Undefined,
            setter: DynValue::Undefined,
        }
    }

    /// A descriptor with no fields
    pub const fn generic() -> Self {
        PropertyDescriptor {
            fields: 0,
            ..Self::undefined()
        }
    }

    /// Data descriptor with every attribute given
    pub const fn data(value: DynValue, writable: bool, enumerable: bool, configurable: bool) -> Self {
        PropertyDescriptor {
            fields: HAS_VALUE,
            writable: Attr::from_bool(writable),
            enumerable: Attr::from_bool(enumerable),
            configurable: Attr::from_bool(configurable),
            value,
            getter: DynValue::Undefined,
            setter: DynValue::Undefined,
        }
    }

    /// Writable, enumerable, configurable: the default for plain adds
    pub const fn vwec(value: DynValue) -> Self {
        Self::data(value, true, true, true)
    }

    /// Writable only: array `length`
    pub const fn vwueuc(value: DynValue) -> Self {
        Self::data(value, true, false, false)
    }

    /// Read-only, hidden, permanent
    pub const fn vuwueuc(value: DynValue) -> Self {
        Self::data(value, false, false, false)
    }

    /// Accessor descriptor; `get`/`set` are functions or undefined
    pub const fn accessor(get: DynValue, set: DynValue, enumerable: bool, configurable: bool) -> Self {
        PropertyDescriptor {
            fields: HAS_GET | HAS_SET,
            writable: Attr::Unset,
            enumerable: Attr::from_bool(enumerable),
            configurable: Attr::from_bool(configurable),
            value: DynValue::Undefined,
            getter: get,
            setter: set,
        }
    }

    /// Assemble from optional parts, as a `defineProperty` caller would
    pub fn from_parts(
        value: Option<DynValue>,
        get: Option<DynValue>,
        set: Option<DynValue>,
        writable: Option<bool>,
        enumerable: Option<bool>,
        configurable: Option<bool>,
    ) -> Self {
        let mut desc = Self::generic();
        if let Some(v) = value {
            desc = desc.with_value(v);
        }
        if let Some(g) = get {
            desc = desc.with_getter(g);
        }
        if let Some(s) = set {
            desc = desc.with_setter(s);
        }
        desc.writable = writable.map_or(Attr::Unset, Attr::from_bool);
        desc.enumerable = enumerable.map_or(Attr::Unset, Attr::from_bool);
        desc.configurable = configurable.map_or(Attr::Unset, Attr::from_bool);
        desc
    }

    pub const fn with_value(mut self, value: DynValue) -> Self {
        self.fields = (self.fields & !UNDEFINED) | HAS_VALUE;
        self.value = value;
        self
    }

    pub const fn with_getter(mut self, get: DynValue) -> Self {
        self.fields = (self.fields & !UNDEFINED) | HAS_GET;
        self.getter = get;
        self
    }

    pub const fn with_setter(mut self, set: DynValue) -> Self {
        self.fields = (self.fields & !UNDEFINED) | HAS_SET;
        self.setter = set;
        self
    }

    pub const fn with_writable(mut self, on: bool) -> Self {
        self.fields &= !UNDEFINED;
        self.writable = Attr::from_bool(on);
        self
    }

    pub const fn with_enumerable(mut self, on: bool) -> Self {
        self.fields &= !UNDEFINED;
        self.enumerable = Attr::from_bool(on);
        self
    }

    pub const fn with_configurable(mut self, on: bool) -> Self {
        self.fields &= !UNDEFINED;
        self.configurable = Attr::from_bool(on);
        self
    }

    #[inline]
    pub const fn is_undefined(&self) -> bool {
        self.fields & UNDEFINED != 0
    }

    #[inline]
    pub const fn fields(&self) -> u8 {
        self.fields
    }

    #[inline]
    pub const fn has_value(&self) -> bool {
        self.fields & HAS_VALUE != 0
    }

    #[inline]
    pub const fn has_get(&self) -> bool {
        self.fields & HAS_GET != 0
    }

    #[inline]
    pub const fn has_set(&self) -> bool {
        self.fields & HAS_SET != 0
    }

    #[inline]
    pub const fn value(&self) -> DynValue {
        self.value
    }

    #[inline]
    pub const fn getter(&self) -> DynValue {
        self.getter
    }

    #[inline]
    pub const fn setter(&self) -> DynValue {
        self.setter
    }

    #[inline]
    pub const fn is_accessor(&self) -> bool {
        !self.is_undefined() && (self.has_get() || self.has_set())
    }

    #[inline]
    pub const fn is_data(&self) -> bool {
        !self.is_undefined() && (self.has_value() || self.writable.is_set())
    }

    #[inline]
    pub const fn is_generic(&self) -> bool {
        !self.is_undefined() && !self.is_accessor() && !self.is_data()
    }

    /// No field and no attribute present
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.fields & (HAS_GET | HAS_SET | HAS_VALUE) == 0
            && !self.writable.is_set()
            && !self.enumerable.is_set()
            && !self.configurable.is_set()
    }

    #[inline]
    pub const fn writable(&self) -> bool {
        self.writable.is_true()
    }

    #[inline]
    pub const fn enumerable(&self) -> bool {
        self.enumerable.is_true()
    }

    #[inline]
    pub const fn configurable(&self) -> bool {
        self.configurable.is_true()
    }

    /// A data property with all three attributes true
    #[inline]
    pub const fn is_default(&self) -> bool {
        self.is_data() && self.writable() && self.enumerable() && self.configurable()
    }

    /// Counted references held through this descriptor
    pub fn trace(&self, tracer: &mut Tracer<'_>) {
        if self.has_value() {
            tracer.value(self.value);
        }
        if self.has_get() {
            tracer.value(self.getter);
        }
        if self.has_set() {
            tracer.value(self.setter);
        }
    }

    /// Drop the value half when turning into an accessor, keeping attributes
    pub(crate) fn into_accessor(self) -> Self {
        PropertyDescriptor {
            fields: HAS_GET | HAS_SET,
            writable: Attr::Unset,
            value: DynValue::Undefined,
            getter: DynValue::Undefined,
            setter: DynValue::Undefined,
            ..self
        }
    }

    /// Drop the accessor half when turning into data, keeping attributes
    pub(crate) fn into_data(self) -> Self {
        PropertyDescriptor {
            fields: HAS_VALUE,
            writable: Attr::False,
            value: DynValue::Undefined,
            getter: DynValue::Undefined,
            setter: DynValue::Undefined,
            ..self
        }
    }

    pub(crate) fn set_value(&mut self, value: DynValue) {
        self.fields = (self.fields & !UNDEFINED) | HAS_VALUE;
        self.value = value;
    }

    pub(crate) fn set_getter(&mut self, get: DynValue) {
        self.fields |= HAS_GET;
        self.getter = get;
    }

    pub(crate) fn set_setter(&mut self, set: DynValue) {
        self.fields |= HAS_SET;
        self.setter = set;
    }
}

impl Default for PropertyDescriptor {
    fn default() -> Self {
        Self::undefined()
    }
}

/// One own property
#[derive(Debug, Clone)]
pub struct DynProp {
    pub key: PropKey,
    pub desc: PropertyDescriptor,
    pub(crate) deleted: bool,
    pub(crate) mem: ArenaPtr,
}

impl DynProp {
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Insertion-ordered own properties
#[derive(Debug, Default)]
pub struct PropertyList {
    props: Vec<DynProp>,
    tombstones: usize,
}

impl PropertyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live properties
    #[inline]
    pub fn len(&self) -> usize {
        self.props.len() - self.tombstones
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots including tombstones; iterator positions index into these
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.props.len()
    }

    #[inline]
    pub fn slot(&self, pos: usize) -> Option<&DynProp> {
        self.props.get(pos)
    }

    #[inline]
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Position of a live property
    ///
    /// `names_equal` compares two name keys by content.
    pub fn find(&self, key: PropKey, names_equal: impl Fn(StrRef, StrRef) -> bool) -> Option<usize> {
        self.props.iter().position(|p| {
            !p.deleted
                && match (p.key, key) {
                    (PropKey::Index(a), PropKey::Index(b)) => a == b,
                    (PropKey::Name(a), PropKey::Name(b)) => a == b || names_equal(a, b),
                    _ => false,
                }
        })
    }

    #[inline]
    pub fn get(&self, pos: usize) -> &DynProp {
        &self.props[pos]
    }

    #[inline]
    pub fn get_mut(&mut self, pos: usize) -> &mut DynProp {
        &mut self.props[pos]
    }

    /// Append a property; its references must already be owned by the list
    pub(crate) fn push(&mut self, key: PropKey, desc: PropertyDescriptor, mem: ArenaPtr) {
        self.props.push(DynProp {
            key,
            desc,
            deleted: false,
            mem,
        });
    }

    /// Unlink a property, shifting later entries down
    pub(crate) fn remove(&mut self, pos: usize, mm: &mut MemoryManager) -> DynProp {
        let prop = self.props.remove(pos);
        mm.free(prop.mem);
        prop
    }

    /// Leave a tombstone in place; returns the dropped descriptor
    pub(crate) fn mark_deleted(&mut self, pos: usize) -> PropertyDescriptor {
        let prop = &mut self.props[pos];
        prop.key = PropKey::Name(StrRef::EMPTY);
        let desc = std::mem::replace(&mut prop.desc, PropertyDescriptor::undefined());
        prop.deleted = true;
        self.tombstones += 1;
        desc
    }

    /// Drop tombstones and return their records
    pub(crate) fn compact(&mut self, mm: &mut MemoryManager) {
        if self.tombstones == 0 {
            return;
        }
        self.props.retain(|p| {
            if p.deleted {
                mm.free(p.mem);
            }
            !p.deleted
        });
        self.tombstones = 0;
    }

    /// Live properties in order
    pub fn iter(&self) -> impl Iterator<Item = &DynProp> {
        self.props.iter().filter(|p| !p.deleted)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut DynProp> {
        self.props.iter_mut().filter(|p| !p.deleted)
    }

    pub fn trace(&self, tracer: &mut Tracer<'_>) {
        // Names are atoms and hold no reference
        for prop in self.iter() {
            prop.desc.trace(tracer);
        }
    }

    /// Return every record block; references were released by the caller
    pub(crate) fn free_storage(&mut self, mm: &mut MemoryManager) {
        for prop in self.props.drain(..) {
            mm.free(prop.mem);
        }
        self.tombstones = 0;
    }

    /// Allocate the arena record for a new property
    pub(crate) fn allocate_record(mm: &mut MemoryManager) -> Result<ArenaPtr, crate::gc::AllocError> {
        mm.allocate_gc(PROP_RECORD_SIZE, MemoryTag::Prop)
    }
}
