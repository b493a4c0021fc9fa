//! Dynamic value representation
//!
//! [`DynValue`] is the tagged union every runtime operation consumes and
//! produces. The tag fully determines the payload. Positive zero is always
//! `Int32(0)` and negative zero is always `Double(-0.0)`, so the two stay
//! distinguishable for `SameValue` while strict equality treats them alike.
//!
//! # Packed encoding (64-bit)
//! [`RawValue`] stores a value in one word for arena storage:
//! - Doubles are kept as their IEEE-754 bits
//! - Every other tag `t` sets the high 16 bits to `0x7FF0 | t` and carries a
//!   48-bit payload (an i32, a bool, or a cell handle)
//! - Builtin strings have their own tag, so a heap handle may use all 48
//!   payload bits
//!
//! The NaN, Infinity and -0 normalisation done by [`DynValue::from_f64`]
//! guarantees no double ever shares a bit pattern with a tagged value.

use std::fmt;

use crate::gc::GcRef;
use crate::runtime::string::{BuiltinString, StrRef};
use crate::util::dtoa;

/// A dynamically typed ECMAScript value
///
/// String and object payloads are handles. Copying a `DynValue` does not
/// touch reference counts. Whoever stores a value into a slot retains it, and
/// whoever overwrites or drops a stored value releases it.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum DynValue {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Int32(i32),
    Double(f64),
    String(StrRef),
    Object(GcRef),
    NaN,
    PositiveInfinity,
    NegativeInfinity,
    /// Uninitialized slot sentinel; also marks holes in array storage
    None,
    InternalFunction(u32),
    SpBase(u32),
    FpBase(u32),
    GpBase(u32),
}

/// Type ids used in the packed encoding
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Infinity = 0,
    Null = 1,
    Boolean = 2,
    Number = 3,
    String = 4,
    Object = 5,
    Env = 6,
    /// A string from the static table; the payload is its id
    BuiltinString = 7,
    Unknown = 8,
    Undefined = 9,
    None = 10,
    NaN = 11,
    SpBase = 12,
    FpBase = 13,
    GpBase = 14,
    Function = 15,
    /// Not stored in the tag bits: doubles are untagged
    Double = 16,
}

impl DynValue {
    /// Convert a float to its canonical representation
    ///
    /// Integral values in i32 range become `Int32` (except -0, which stays a
    /// `Double`), NaN and infinities get their own tags.
    #[inline]
    pub fn from_f64(d: f64) -> Self {
        if d.is_nan() {
            DynValue::NaN
        } else if d == f64::INFINITY {
            DynValue::PositiveInfinity
        } else if d == f64::NEG_INFINITY {
            DynValue::NegativeInfinity
        } else if d == 0.0 {
            if d.is_sign_negative() {
                DynValue::Double(-0.0)
            } else {
                DynValue::Int32(0)
            }
        } else if d.fract() == 0.0 && d >= i32::MIN as f64 && d <= i32::MAX as f64 {
            DynValue::Int32(d as i32)
        } else {
            DynValue::Double(d)
        }
    }

    #[inline]
    pub const fn from_u32(n: u32) -> Self {
        if n <= i32::MAX as u32 {
            DynValue::Int32(n as i32)
        } else {
            DynValue::Double(n as f64)
        }
    }

    #[inline]
    pub const fn negative_zero() -> Self {
        DynValue::Double(-0.0)
    }

    // Type checking

    #[inline]
    pub const fn is_undefined(self) -> bool {
        matches!(self, DynValue::Undefined)
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        matches!(self, DynValue::Null)
    }

    #[inline]
    pub const fn is_null_or_undefined(self) -> bool {
        matches!(self, DynValue::Null | DynValue::Undefined)
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        matches!(self, DynValue::None)
    }

    #[inline]
    pub const fn is_boolean(self) -> bool {
        matches!(self, DynValue::Boolean(_))
    }

    #[inline]
    pub const fn is_int32(self) -> bool {
        matches!(self, DynValue::Int32(_))
    }

    #[inline]
    pub const fn is_double(self) -> bool {
        matches!(self, DynValue::Double(_))
    }

    #[inline]
    pub const fn is_nan(self) -> bool {
        matches!(self, DynValue::NaN)
    }

    #[inline]
    pub const fn is_infinity(self) -> bool {
        matches!(self, DynValue::PositiveInfinity | DynValue::NegativeInfinity)
    }

    /// Int32, Double, NaN or an infinity
    #[inline]
    pub const fn is_number(self) -> bool {
        matches!(
            self,
            DynValue::Int32(_)
                | DynValue::Double(_)
                | DynValue::NaN
                | DynValue::PositiveInfinity
                | DynValue::NegativeInfinity
        )
    }

    #[inline]
    pub fn is_positive_zero(self) -> bool {
        matches!(self, DynValue::Int32(0))
            || matches!(self, DynValue::Double(d) if d == 0.0 && d.is_sign_positive())
    }

    #[inline]
    pub fn is_negative_zero(self) -> bool {
        matches!(self, DynValue::Double(d) if d == 0.0 && d.is_sign_negative())
    }

    #[inline]
    pub const fn is_string(self) -> bool {
        matches!(self, DynValue::String(_))
    }

    #[inline]
    pub const fn is_object(self) -> bool {
        matches!(self, DynValue::Object(_))
    }

    #[inline]
    pub const fn is_primitive(self) -> bool {
        !matches!(self, DynValue::Object(_))
    }

    /// True when the payload is a reference-counted cell
    #[inline]
    pub const fn needs_rc(self) -> bool {
        matches!(self, DynValue::Object(_) | DynValue::String(StrRef::Heap(_)))
    }

    // Value extraction

    /// Numeric value of a number-tagged value
    #[inline]
    pub fn as_f64(self) -> Option<f64> {
        match self {
            DynValue::Int32(i) => Some(i as f64),
            DynValue::Double(d) => Some(d),
            DynValue::NaN => Some(f64::NAN),
            DynValue::PositiveInfinity => Some(f64::INFINITY),
            DynValue::NegativeInfinity => Some(f64::NEG_INFINITY),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_i32(self) -> Option<i32> {
        match self {
            DynValue::Int32(i) => Some(i),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            DynValue::Boolean(b) => Some(b),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_object(self) -> Option<GcRef> {
        match self {
            DynValue::Object(r) => Some(r),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_string(self) -> Option<StrRef> {
        match self {
            DynValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The counted cell behind this value, if any
    #[inline]
    pub const fn heap_ref(self) -> Option<GcRef> {
        match self {
            DynValue::Object(r) | DynValue::String(StrRef::Heap(r)) => Some(r),
            _ => None,
        }
    }

    /// Type id of the packed encoding
    pub const fn type_tag(self) -> TypeTag {
        match self {
            DynValue::Undefined => TypeTag::Undefined,
            DynValue::Null => TypeTag::Null,
            DynValue::Boolean(_) => TypeTag::Boolean,
            DynValue::Int32(_) => TypeTag::Number,
            DynValue::Double(_) => TypeTag::Double,
            DynValue::String(StrRef::Builtin(_)) => TypeTag::BuiltinString,
            DynValue::String(StrRef::Heap(_)) => TypeTag::String,
            DynValue::Object(_) => TypeTag::Object,
            DynValue::NaN => TypeTag::NaN,
            DynValue::PositiveInfinity | DynValue::NegativeInfinity => TypeTag::Infinity,
            DynValue::None => TypeTag::None,
            DynValue::InternalFunction(_) => TypeTag::Function,
            DynValue::SpBase(_) => TypeTag::SpBase,
            DynValue::FpBase(_) => TypeTag::FpBase,
            DynValue::GpBase(_) => TypeTag::GpBase,
        }
    }

    /// Pack into a single word
    pub fn encode(self) -> RawValue {
        match self {
            DynValue::Double(d) => match DynValue::from_f64(d) {
                DynValue::Double(d) => RawValue(d.to_bits()),
                // Only -0 survives as a Double; everything else re-tags
                other => other.encode(),
            },
            DynValue::Undefined => RawValue::tagged(TypeTag::Undefined, 0),
            DynValue::Null => RawValue::tagged(TypeTag::Null, 0),
            DynValue::None => RawValue::tagged(TypeTag::None, 0),
            DynValue::NaN => RawValue::tagged(TypeTag::NaN, 0),
            DynValue::Boolean(b) => RawValue::tagged(TypeTag::Boolean, b as u64),
            DynValue::Int32(i) => RawValue::tagged(TypeTag::Number, i as u32 as u64),
            DynValue::PositiveInfinity => RawValue::tagged(TypeTag::Infinity, 1),
            DynValue::NegativeInfinity => RawValue::tagged(TypeTag::Infinity, (-1i32) as u32 as u64),
            DynValue::String(StrRef::Builtin(id)) => RawValue::tagged(TypeTag::BuiltinString, id as u64),
            DynValue::String(StrRef::Heap(r)) => RawValue::tagged(TypeTag::String, r.to_bits()),
            DynValue::Object(r) => RawValue::tagged(TypeTag::Object, r.to_bits()),
            DynValue::InternalFunction(n) => RawValue::tagged(TypeTag::Function, n as u64),
            DynValue::SpBase(n) => RawValue::tagged(TypeTag::SpBase, n as u64),
            DynValue::FpBase(n) => RawValue::tagged(TypeTag::FpBase, n as u64),
            DynValue::GpBase(n) => RawValue::tagged(TypeTag::GpBase, n as u64),
        }
    }
}

impl From<i32> for DynValue {
    fn from(i: i32) -> Self {
        DynValue::Int32(i)
    }
}

impl From<u32> for DynValue {
    fn from(n: u32) -> Self {
        DynValue::from_u32(n)
    }
}

impl From<f64> for DynValue {
    fn from(d: f64) -> Self {
        DynValue::from_f64(d)
    }
}

impl From<bool> for DynValue {
    fn from(b: bool) -> Self {
        DynValue::Boolean(b)
    }
}

impl From<BuiltinString> for DynValue {
    fn from(s: BuiltinString) -> Self {
        DynValue::String(StrRef::Builtin(s))
    }
}

impl fmt::Display for DynValue {
    /// Display without heap access; heap strings and objects print as placeholders
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DynValue::Undefined | DynValue::None => write!(f, "undefined"),
            DynValue::Null => write!(f, "null"),
            DynValue::Boolean(b) => write!(f, "{}", b),
            DynValue::Int32(i) => write!(f, "{}", i),
            DynValue::Double(d) => write!(f, "{}", dtoa::number_to_string(d)),
            DynValue::NaN => write!(f, "NaN"),
            DynValue::PositiveInfinity => write!(f, "Infinity"),
            DynValue::NegativeInfinity => write!(f, "-Infinity"),
            DynValue::String(StrRef::Builtin(s)) => write!(f, "{}", s.as_str()),
            DynValue::String(StrRef::Heap(r)) => write!(f, "[string {}]", r),
            DynValue::Object(r) => write!(f, "[object {}]", r),
            DynValue::InternalFunction(n) => write!(f, "[internal function {}]", n),
            DynValue::SpBase(n) => write!(f, "[sp {}]", n),
            DynValue::FpBase(n) => write!(f, "[fp {}]", n),
            DynValue::GpBase(n) => write!(f, "[gp {}]", n),
        }
    }
}

/// A packed 64-bit value
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawValue(pub u64);

impl RawValue {
    const TAG_SHIFT: u32 = 48;
    const PAYLOAD_MASK: u64 = (1 << Self::TAG_SHIFT) - 1;
    const TAG_BASE: u64 = 0x7FF0;

    #[inline]
    const fn tagged(tag: TypeTag, payload: u64) -> Self {
        RawValue(((Self::TAG_BASE | tag as u64) << Self::TAG_SHIFT) | (payload & Self::PAYLOAD_MASK))
    }

    /// Check if the word holds a plain double
    #[inline]
    pub const fn is_double(self) -> bool {
        (self.0 >> 52) & 0x7FF != 0x7FF
    }

    /// Type id (`TypeTag::Double` for untagged words)
    #[inline]
    pub fn type_tag(self) -> TypeTag {
        if self.is_double() || self.0 >> 63 != 0 {
            return TypeTag::Double;
        }
        match (self.0 >> Self::TAG_SHIFT) & 0xF {
            0 => TypeTag::Infinity,
            1 => TypeTag::Null,
            2 => TypeTag::Boolean,
            3 => TypeTag::Number,
            4 => TypeTag::String,
            5 => TypeTag::Object,
            6 => TypeTag::Env,
            7 => TypeTag::BuiltinString,
            9 => TypeTag::Undefined,
            10 => TypeTag::None,
            11 => TypeTag::NaN,
            12 => TypeTag::SpBase,
            13 => TypeTag::FpBase,
            14 => TypeTag::GpBase,
            15 => TypeTag::Function,
            _ => TypeTag::Unknown,
        }
    }

    /// String, Object and Env words hold counted handles
    #[inline]
    pub fn needs_rc(self) -> bool {
        matches!(self.type_tag(), TypeTag::String | TypeTag::Object | TypeTag::Env)
    }

    #[inline]
    const fn payload(self) -> u64 {
        self.0 & Self::PAYLOAD_MASK
    }

    /// Unpack into a value; malformed words read as `undefined`
    pub fn decode(self) -> DynValue {
        self.try_decode().unwrap_or_default()
    }

    /// Unpack a word that `encode` could have produced
    ///
    /// Returns `None` for the unused tag, unknown builtin string ids, NaN
    /// bit patterns and payload bits outside the field a tag uses.
    pub fn try_decode(self) -> Option<DynValue> {
        let payload = self.payload();
        let narrow = |bits: u32| payload >> bits == 0;
        Some(match self.type_tag() {
            // NaN and the infinities always travel tagged
            TypeTag::Double => {
                let d = f64::from_bits(self.0);
                if !d.is_finite() {
                    return None;
                }
                DynValue::Double(d)
            }
            TypeTag::Infinity => match payload {
                1 => DynValue::PositiveInfinity,
                0xFFFF_FFFF => DynValue::NegativeInfinity,
                _ => return None,
            },
            TypeTag::Null if payload == 0 => DynValue::Null,
            TypeTag::Undefined if payload == 0 => DynValue::Undefined,
            TypeTag::None if payload == 0 => DynValue::None,
            TypeTag::NaN if payload == 0 => DynValue::NaN,
            TypeTag::Boolean if payload <= 1 => DynValue::Boolean(payload != 0),
            TypeTag::Number if narrow(32) => DynValue::Int32(payload as u32 as i32),
            TypeTag::BuiltinString if narrow(16) => {
                DynValue::String(StrRef::Builtin(BuiltinString::from_id(payload as u16)?))
            }
            TypeTag::String => DynValue::String(StrRef::Heap(GcRef::from_bits(payload))),
            TypeTag::Object | TypeTag::Env => DynValue::Object(GcRef::from_bits(payload)),
            TypeTag::SpBase if narrow(32) => DynValue::SpBase(payload as u32),
            TypeTag::FpBase if narrow(32) => DynValue::FpBase(payload as u32),
            TypeTag::GpBase if narrow(32) => DynValue::GpBase(payload as u32),
            TypeTag::Function if narrow(32) => DynValue::InternalFunction(payload as u32),
            _ => return None,
        })
    }

    pub const UNDEFINED: RawValue = RawValue::tagged(TypeTag::Undefined, 0);
    pub const NONE: RawValue = RawValue::tagged(TypeTag::None, 0);
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawValue(0x{:016x} => {:?})", self.0, self.decode())
    }
}
