//! String representation
//!
//! A [`DynString`] is immutable once published. Its body lives in the
//! cell's arena block as either 8-bit ASCII units or 16-bit UTF-16 units, and
//! its length is limited to 16 bits. Frequently used names are builtin
//! strings: static, never counted, never freed.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::context::Runtime;
use crate::error::{JsResult, RuntimeError};
use crate::gc::{Cell, GcRef, MemoryTag};
use crate::runtime::property::PropKey;
use crate::value::DynValue;

/// Longest string a 16-bit length field can describe
pub const MAX_STRING_LEN: usize = 0xFFFF;

/// Largest valid array index (2^32 - 2)
pub const MAX_ARRAY_INDEX: u32 = u32::MAX - 1;

macro_rules! builtin_strings {
    ($($name:ident => $text:expr),* $(,)?) => {
        /// Statically allocated strings
        #[repr(u16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum BuiltinString {
            $($name),*
        }

        impl BuiltinString {
            pub const ALL: &'static [BuiltinString] = &[$(BuiltinString::$name),*];

            /// Text of the string
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(BuiltinString::$name => $text),*
                }
            }
        }
    };
}

builtin_strings! {
    Empty => "",
    Length => "length",
    Prototype => "prototype",
    Constructor => "constructor",
    Undefined => "undefined",
    Null => "null",
    True => "true",
    False => "false",
    NaN => "NaN",
    Infinity => "Infinity",
    NegativeInfinity => "-Infinity",
    Zero => "0",
    ToString => "toString",
    ValueOf => "valueOf",
    Arguments => "arguments",
    Caller => "caller",
    Callee => "callee",
    ObjectObject => "[object Object]",
    Get => "get",
    Set => "set",
    Value => "value",
    Writable => "writable",
    Enumerable => "enumerable",
    Configurable => "configurable",
    Name => "name",
    Message => "message",
    Error => "Error",
    Comma => ",",
    TypeObject => "object",
    TypeBoolean => "boolean",
    TypeNumber => "number",
    TypeString => "string",
    TypeFunction => "function",
}

impl BuiltinString {
    #[inline]
    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Find the builtin with this text
    pub fn lookup(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.as_str() == s)
    }

    /// Names the global object refuses to rebind
    pub const fn is_readonly(self) -> bool {
        matches!(
            self,
            BuiltinString::NaN
                | BuiltinString::Infinity
                | BuiltinString::Undefined
                | BuiltinString::Arguments
                | BuiltinString::Caller
                | BuiltinString::Callee
        )
    }
}

/// Reference to string content: builtin or a counted heap cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrRef {
    Builtin(BuiltinString),
    Heap(GcRef),
}

impl StrRef {
    pub const EMPTY: StrRef = StrRef::Builtin(BuiltinString::Empty);

    #[inline]
    pub const fn heap_ref(self) -> Option<GcRef> {
        match self {
            StrRef::Heap(r) => Some(r),
            StrRef::Builtin(_) => None,
        }
    }
}

impl From<BuiltinString> for StrRef {
    fn from(b: BuiltinString) -> Self {
        StrRef::Builtin(b)
    }
}

const UNICODE: u8 = 1;
const GENERATED: u8 = 2;

/// String cell header
///
/// The body follows in the cell's arena block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynString {
    flags: u8,
    len: u16,
}

impl DynString {
    pub const fn ascii(len: u16) -> Self {
        DynString { flags: 0, len }
    }

    pub const fn utf16(len: u16) -> Self {
        DynString {
            flags: UNICODE,
            len,
        }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stored as 16-bit units
    #[inline]
    pub const fn is_unicode(&self) -> bool {
        self.flags & UNICODE != 0
    }

    /// Produced by concatenation or slicing rather than from source text
    #[inline]
    pub const fn is_generated(&self) -> bool {
        self.flags & GENERATED != 0
    }

    /// Bytes of body per code unit
    #[inline]
    pub const fn unit_size(&self) -> usize {
        if self.is_unicode() { 2 } else { 1 }
    }

    #[inline]
    pub const fn byte_len(&self) -> usize {
        self.len() * self.unit_size()
    }
}

/// Borrowed view of string content
#[derive(Debug, Clone, Copy)]
pub enum StrView<'a> {
    Ascii(&'a [u8]),
    /// Little-endian UTF-16 units
    Utf16(&'a [u8]),
}

impl<'a> StrView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            StrView::Ascii(b) => b.len(),
            StrView::Utf16(b) => b.len() / 2,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Code unit at `index`
    #[inline]
    pub fn char_at(&self, index: usize) -> Option<u16> {
        match self {
            StrView::Ascii(b) => b.get(index).map(|&c| c as u16),
            StrView::Utf16(b) => {
                let at = index * 2;
                (at + 1 < b.len()).then(|| u16::from_le_bytes([b[at], b[at + 1]]))
            }
        }
    }

    /// Iterate code units
    pub fn units(self) -> Units<'a> {
        Units { view: self, pos: 0 }
    }

    /// Narrow content, if every unit is ASCII
    #[inline]
    pub fn as_ascii(&self) -> Option<&'a [u8]> {
        match *self {
            StrView::Ascii(b) => Some(b),
            StrView::Utf16(_) => None,
        }
    }

    /// Lossy conversion to a Rust string
    pub fn to_rust_string(&self) -> String {
        match self {
            StrView::Ascii(b) => b.iter().map(|&c| c as char).collect(),
            StrView::Utf16(_) => {
                let units: Vec<u16> = self.units().collect();
                String::from_utf16_lossy(&units)
            }
        }
    }

    /// Canonical array index this string spells, if any
    pub fn array_index(&self) -> Option<u32> {
        match self.as_ascii() {
            Some(bytes) => std::str::from_utf8(bytes).ok().and_then(is_array_index),
            None => None,
        }
    }
}

/// Code unit iterator over a [`StrView`]
pub struct Units<'a> {
    view: StrView<'a>,
    pos: usize,
}

impl Iterator for Units<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        let c = self.view.char_at(self.pos)?;
        self.pos += 1;
        Some(c)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.view.len() - self.pos;
        (rest, Some(rest))
    }
}

/// Lexicographic comparison by code unit, shorter prefix first
pub fn compare(a: StrView<'_>, b: StrView<'_>) -> Ordering {
    match (a, b) {
        (StrView::Ascii(x), StrView::Ascii(y)) => x.cmp(y),
        _ => a.units().cmp(b.units()),
    }
}

/// Content equality
pub fn equals(a: StrView<'_>, b: StrView<'_>) -> bool {
    a.len() == b.len() && compare(a, b) == Ordering::Equal
}

/// Check if a string is a canonical array index ("0", "17", not "01")
#[inline]
pub fn is_array_index(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }

    // Fast path for single digits
    if s.len() == 1 {
        let b = s.as_bytes()[0];
        if b.is_ascii_digit() {
            return Some((b - b'0') as u32);
        }
        return None;
    }

    // Leading zeros and signs are not canonical
    if !s.as_bytes()[0].is_ascii_digit() || s.starts_with('0') {
        return None;
    }

    s.parse::<u32>().ok().filter(|&n| n <= MAX_ARRAY_INDEX)
}

/// A string under construction
///
/// Units may be set freely until the builder is published through
/// [`Runtime::publish_string`].
#[derive(Debug, Clone, Default)]
pub struct DynStringBuilder {
    units: Vec<u16>,
    generated: bool,
}

impl DynStringBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder of `len` NUL units
    pub fn with_len(len: usize) -> Self {
        DynStringBuilder {
            units: vec![0; len],
            generated: false,
        }
    }

    pub fn set_char(&mut self, index: usize, c: u16) {
        self.units[index] = c;
    }

    pub fn push(&mut self, c: u16) {
        self.units.push(c);
    }

    pub fn push_view(&mut self, view: StrView<'_>) {
        self.units.extend(view.units());
    }

    pub fn push_str(&mut self, s: &str) {
        self.units.extend(s.encode_utf16());
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Mark the result as produced by a string operation
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }
}

/// Interned names held for the lifetime of the runtime
///
/// Atoms are keyed by their UTF-16 units so any heap string can be looked
/// up without a lossy conversion.
#[derive(Debug, Default)]
pub struct AtomTable {
    atoms: HashMap<Box<[u16]>, GcRef>,
    refs: HashSet<GcRef>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, units: &[u16]) -> Option<GcRef> {
        self.atoms.get(units).copied()
    }

    /// Whether `r` is the atom for its content
    pub fn contains(&self, r: GcRef) -> bool {
        self.refs.contains(&r)
    }

    pub fn insert(&mut self, units: &[u16], r: GcRef) {
        self.atoms.insert(units.into(), r);
        self.refs.insert(r);
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn drain(&mut self) -> Vec<GcRef> {
        self.refs.clear();
        self.atoms.drain().map(|(_, r)| r).collect()
    }
}

impl Runtime {
    /// Publish a finished builder as a new string owned by the caller
    pub fn publish_string(&mut self, builder: DynStringBuilder) -> JsResult<StrRef> {
        let units = builder.units;
        if units.is_empty() {
            return Ok(StrRef::EMPTY);
        }
        if units.len() > MAX_STRING_LEN {
            return Err(RuntimeError::range_error(format!(
                "string length {} exceeds {}",
                units.len(),
                MAX_STRING_LEN
            )));
        }
        let len = units.len() as u16;
        let unicode = units.iter().any(|&c| c >= 0x80);
        let mut header = if unicode {
            DynString::utf16(len)
        } else {
            DynString::ascii(len)
        };
        if builder.generated {
            header.flags |= GENERATED;
        }

        let mem = self.heap.mm.allocate_gc(header.byte_len(), MemoryTag::String)?;
        let body = self.heap.mm.bytes_mut(mem);
        if unicode {
            for (i, c) in units.iter().enumerate() {
                body[i * 2..i * 2 + 2].copy_from_slice(&c.to_le_bytes());
            }
        } else {
            for (i, &c) in units.iter().enumerate() {
                body[i] = c as u8;
            }
        }
        Ok(StrRef::Heap(self.publish(Cell::String(header), mem)))
    }

    /// Create a string value from Rust text
    pub fn new_string(&mut self, s: &str) -> JsResult<DynValue> {
        let mut builder = DynStringBuilder::new();
        builder.push_str(s);
        Ok(DynValue::String(self.publish_string(builder)?))
    }

    /// Create a string value from UTF-16 units
    pub fn new_string_utf16(&mut self, units: &[u16]) -> JsResult<DynValue> {
        let builder = DynStringBuilder {
            units: units.to_vec(),
            generated: false,
        };
        Ok(DynValue::String(self.publish_string(builder)?))
    }

    /// Interned string for a name; the runtime keeps it alive
    ///
    /// The returned reference is borrowed from the atom table and must not
    /// be released.
    pub fn intern(&mut self, s: &str) -> JsResult<StrRef> {
        if let Some(b) = BuiltinString::lookup(s) {
            return Ok(StrRef::Builtin(b));
        }
        let units: Vec<u16> = s.encode_utf16().collect();
        if let Some(r) = self.atoms.get(&units) {
            return Ok(StrRef::Heap(r));
        }
        let mut builder = DynStringBuilder::new();
        builder.push_str(s);
        let atom = self.publish_string(builder)?;
        if let StrRef::Heap(r) = atom {
            self.atoms.insert(&units, r);
        }
        Ok(atom)
    }

    /// The interned form of a name
    ///
    /// A heap string with no atom of the same content becomes the atom
    /// itself; the table takes a reference to it. The result is borrowed.
    pub(crate) fn atomize(&mut self, s: StrRef) -> StrRef {
        let StrRef::Heap(r) = s else {
            return s;
        };
        if self.atoms.contains(r) {
            return s;
        }
        let units: Vec<u16> = self.string_view(s).units().collect();
        if let Some(atom) = self.atoms.get(&units) {
            return StrRef::Heap(atom);
        }
        if let Some(b) = String::from_utf16(&units).ok().and_then(|text| BuiltinString::lookup(&text)) {
            return StrRef::Builtin(b);
        }
        self.retain(r);
        self.atoms.insert(&units, r);
        s
    }

    /// Property key for a name; indices canonicalise to `Index`
    pub fn key(&mut self, name: &str) -> JsResult<PropKey> {
        if let Some(index) = is_array_index(name) {
            return Ok(PropKey::Index(index));
        }
        Ok(PropKey::Name(self.intern(name)?))
    }

    /// Borrow string content
    pub fn string_view(&self, s: StrRef) -> StrView<'_> {
        match s {
            StrRef::Builtin(b) => StrView::Ascii(b.as_str().as_bytes()),
            StrRef::Heap(r) => {
                let (header, mem) = self.heap.string(r);
                let bytes = &self.heap.mm.bytes(mem)[..header.byte_len()];
                if header.is_unicode() {
                    StrView::Utf16(bytes)
                } else {
                    StrView::Ascii(bytes)
                }
            }
        }
    }

    #[inline]
    pub fn string_len(&self, s: StrRef) -> usize {
        self.string_view(s).len()
    }

    #[inline]
    pub fn char_at(&self, s: StrRef, index: usize) -> Option<u16> {
        self.string_view(s).char_at(index)
    }

    pub fn to_rust_string(&self, s: StrRef) -> String {
        self.string_view(s).to_rust_string()
    }

    pub fn string_equals(&self, a: StrRef, b: StrRef) -> bool {
        a == b || equals(self.string_view(a), self.string_view(b))
    }

    pub fn compare_strings(&self, a: StrRef, b: StrRef) -> Ordering {
        compare(self.string_view(a), self.string_view(b))
    }

    /// Share a string: retain heap strings, pass builtins through
    pub(crate) fn share_string(&mut self, s: StrRef) -> StrRef {
        if let StrRef::Heap(r) = s {
            self.retain(r);
        }
        s
    }

    /// Concatenate two strings into a new string owned by the caller
    pub fn concat(&mut self, a: StrRef, b: StrRef) -> JsResult<StrRef> {
        if self.string_len(a) == 0 {
            return Ok(self.share_string(b));
        }
        if self.string_len(b) == 0 {
            return Ok(self.share_string(a));
        }
        let mut builder = DynStringBuilder::new().generated();
        builder.push_view(self.string_view(a));
        builder.push_view(self.string_view(b));
        self.publish_string(builder)
    }

    pub fn concat3(&mut self, a: StrRef, b: StrRef, c: StrRef) -> JsResult<StrRef> {
        let mut builder = DynStringBuilder::new().generated();
        builder.push_view(self.string_view(a));
        builder.push_view(self.string_view(b));
        builder.push_view(self.string_view(c));
        self.publish_string(builder)
    }

    /// Units `[start, end)`, clamped to the string
    pub fn slice(&mut self, s: StrRef, start: usize, end: usize) -> JsResult<StrRef> {
        let view = self.string_view(s);
        let end = end.min(view.len());
        let start = start.min(end);
        if start == 0 && end == view.len() {
            return Ok(self.share_string(s));
        }
        let mut builder = DynStringBuilder::new().generated();
        builder.units.extend(view.units().skip(start).take(end - start));
        self.publish_string(builder)
    }

    /// A copy of `s` with one more unit
    pub fn append_char(&mut self, s: StrRef, c: u16) -> JsResult<StrRef> {
        let mut builder = DynStringBuilder::new().generated();
        builder.push_view(self.string_view(s));
        builder.push(c);
        self.publish_string(builder)
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
    fn test_is_array_index() {
        assert_eq!(is_array_index("0"), Some(0));
        assert_eq!(is_array_index("42"), Some(42));
        assert_eq!(is_array_index("4294967294"), Some(4294967294));
        assert_eq!(is_array_index("4294967295"), None);
        assert_eq!(is_array_index(""), None);
        assert_eq!(is_array_index("01"), None); // Leading zero
        assert_eq!(is_array_index("-1"), None); // Negative
        assert_eq!(is_array_index("+1"), None);
        assert_eq!(is_array_index("1.5"), None);
    }

    #[test]
    fn test_builtin_table() {
        assert_eq!(BuiltinString::from_id(1), Some(BuiltinString::Length));
        assert_eq!(BuiltinString::lookup("prototype"), Some(BuiltinString::Prototype));
        assert_eq!(BuiltinString::lookup("nope"), None);
        assert!(BuiltinString::Callee.is_readonly());
        assert!(!BuiltinString::Length.is_readonly());
    }

    #[test]
    fn test_ascii_and_utf16_storage() {
        let mut rt = runtime();
        let a = rt.new_string("hello").unwrap().as_string().unwrap();
        let b = rt.new_string("héllo").unwrap().as_string().unwrap();
        assert!(rt.string_view(a).as_ascii().is_some());
        assert!(rt.string_view(b).as_ascii().is_none());
        assert_eq!(rt.string_len(b), 5);
        assert_eq!(rt.char_at(b, 1), Some(0xE9));
        assert_eq!(rt.to_rust_string(b), "héllo");
    }

    #[test]
    fn test_length_limit() {
        let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
        let long = "x".repeat(MAX_STRING_LEN + 1);
        let err = rt.new_string(&long).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Range);
        assert!(rt.new_string(&long[1..]).is_ok());
    }

    #[test]
    fn test_concat_and_slice() {
        let mut rt = runtime();
        let a = rt.new_string("foo").unwrap().as_string().unwrap();
        let b = rt.new_string("bar").unwrap().as_string().unwrap();
        let ab = rt.concat(a, b).unwrap();
        assert_eq!(rt.to_rust_string(ab), "foobar");
        let r = ab.heap_ref().unwrap();
        assert!(rt.heap.string(r).0.is_generated());

        let mid = rt.slice(ab, 2, 4).unwrap();
        assert_eq!(rt.to_rust_string(mid), "ob");
        let whole = rt.slice(ab, 0, 100).unwrap();
        assert_eq!(whole, ab);
        assert_eq!(rt.refcount(r), 2);

        let abc = rt.concat3(a, StrRef::Builtin(BuiltinString::Comma), b).unwrap();
        assert_eq!(rt.to_rust_string(abc), "foo,bar");
        let appended = rt.append_char(a, b'!' as u16).unwrap();
        assert_eq!(rt.to_rust_string(appended), "foo!");
    }

    #[test]
    fn test_compare() {
        let mut rt = runtime();
        let a = rt.new_string("abc").unwrap().as_string().unwrap();
        let b = rt.new_string("abd").unwrap().as_string().unwrap();
        let c = rt.new_string("ab").unwrap().as_string().unwrap();
        let wide = rt.new_string("abc\u{100}").unwrap().as_string().unwrap();
        assert_eq!(rt.compare_strings(a, b), Ordering::Less);
        assert_eq!(rt.compare_strings(a, c), Ordering::Greater);
        assert_eq!(rt.compare_strings(a, wide), Ordering::Less);
        let a2 = rt.new_string("abc").unwrap().as_string().unwrap();
        assert!(rt.string_equals(a, a2));
        assert!(!rt.string_equals(a, c));
    }

    #[test]
    fn test_intern_reuses_atoms() {
        let mut rt = runtime();
        let a = rt.intern("width").unwrap();
        let b = rt.intern("width").unwrap();
        assert_eq!(a, b);
        assert_eq!(rt.intern("length").unwrap(), StrRef::Builtin(BuiltinString::Length));
        assert_eq!(rt.key("7").unwrap(), PropKey::Index(7));
    }

    #[test]
    fn test_empty_string_is_builtin() {
        let mut rt = runtime();
        assert_eq!(rt.new_string("").unwrap(), DynValue::String(StrRef::EMPTY));
        assert_eq!(rt.memory_stats().app_usage, 0);
    }

    #[test]
    fn test_builder_set_char() {
        let mut rt = runtime();
        let mut builder = DynStringBuilder::with_len(3);
        builder.set_char(0, b'a' as u16);
        builder.set_char(1, 0x3B1);
        builder.set_char(2, b'z' as u16);
        let s = rt.publish_string(builder).unwrap();
        assert_eq!(rt.to_rust_string(s), "aαz");
    }
}
