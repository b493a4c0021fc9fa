//! Type conversions and equality
//!
//! ECMA-262 §9 conversions and the §11.9 equality algorithms. Conversions
//! that can reach user code (`valueOf`, `toString`) take `&mut self` and
//! return [`JsResult`]; the rest are pure.

use crate::context::Runtime;
use crate::error::{JsResult, RuntimeError};
use crate::gc::GcRef;
use crate::runtime::array::MAX_LENGTH_PROPERTY_SIZE;
use crate::runtime::property::PropKey;
use crate::runtime::string::{BuiltinString, MAX_ARRAY_INDEX, StrRef, StrView, is_array_index};
use crate::util::{dtoa, unicode};
use crate::value::DynValue;

/// Hint for ToPrimitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreferredType {
    #[default]
    Default,
    Number,
    String,
}

/// Parse a string as a Number literal (ECMA-262 9.3.1)
///
/// Returns the value and whether the text was a valid numeric literal.
pub fn parse_number(view: StrView<'_>) -> (DynValue, bool) {
    let units: Vec<u16> = view.units().collect();
    let trimmed = unicode::trim_whitespace(&units);
    if trimmed.is_empty() {
        return (DynValue::Int32(0), true);
    }
    // Anything outside ASCII cannot be part of a literal
    let Some(text) = trimmed
        .iter()
        .map(|&c| u8::try_from(c).ok().filter(u8::is_ascii).map(char::from))
        .collect::<Option<String>>()
    else {
        return (DynValue::NaN, false);
    };

    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return (DynValue::NaN, false);
        }
        let value = hex
            .bytes()
            .fold(0.0f64, |acc, b| acc * 16.0 + (b as char).to_digit(16).unwrap_or(0) as f64);
        return (DynValue::from_f64(value), true);
    }

    let (negative, body) = match text.as_bytes()[0] {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, &text[..]),
    };
    let magnitude = if body == "Infinity" {
        f64::INFINITY
    } else if is_decimal_literal(body) {
        match body.parse::<f64>() {
            Ok(v) => v,
            Err(_) => return (DynValue::NaN, false),
        }
    } else {
        return (DynValue::NaN, false);
    };
    let value = if negative { -magnitude } else { magnitude };
    (DynValue::from_f64(value), true)
}

/// StrUnsignedDecimalLiteral without Infinity
fn is_decimal_literal(s: &str) -> bool {
    let b = s.as_bytes();
    let digits = |mut i: usize| {
        let start = i;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        (i, i - start)
    };
    let (mut i, int_digits) = digits(0);
    let mut frac_digits = 0;
    if i < b.len() && b[i] == b'.' {
        (i, frac_digits) = digits(i + 1);
    }
    if int_digits + frac_digits == 0 {
        return false;
    }
    if i < b.len() && (b[i] == b'e' || b[i] == b'E') {
        i += 1;
        if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
            i += 1;
        }
        let (end, exp_digits) = digits(i);
        if exp_digits == 0 {
            return false;
        }
        i = end;
    }
    i == b.len()
}

/// ToInt32 on a finite or special double
pub fn f64_to_int32(d: f64) -> i32 {
    f64_to_uint32(d) as i32
}

/// ToUint32 on a finite or special double
pub fn f64_to_uint32(d: f64) -> u32 {
    if !d.is_finite() {
        return 0;
    }
    let t = d.trunc().rem_euclid(4_294_967_296.0);
    t as u32
}

/// ToInteger on a double
pub fn f64_to_integer(d: f64) -> f64 {
    if d.is_nan() {
        0.0
    } else if d.is_infinite() {
        d
    } else {
        d.trunc()
    }
}

impl Runtime {
    /// ToBoolean
    pub fn to_boolean(&self, v: DynValue) -> bool {
        match v {
            DynValue::Undefined | DynValue::Null | DynValue::None | DynValue::NaN => false,
            DynValue::Boolean(b) => b,
            DynValue::Int32(i) => i != 0,
            DynValue::Double(d) => d != 0.0 && !d.is_nan(),
            DynValue::String(s) => self.string_len(s) > 0,
            _ => true,
        }
    }

    /// ToNumber, normalised
    pub fn to_number(&mut self, v: DynValue) -> JsResult<DynValue> {
        Ok(self.to_number_checked(v)?.0)
    }

    /// ToNumber plus whether the input was numeric at all
    pub fn to_number_checked(&mut self, v: DynValue) -> JsResult<(DynValue, bool)> {
        Ok(match v {
            DynValue::Undefined | DynValue::None => (DynValue::NaN, false),
            DynValue::Null => (DynValue::Int32(0), true),
            DynValue::Boolean(b) => (DynValue::Int32(b as i32), true),
            DynValue::Int32(_) | DynValue::NaN | DynValue::PositiveInfinity | DynValue::NegativeInfinity => {
                (v, true)
            }
            DynValue::Double(d) => (DynValue::from_f64(d), true),
            DynValue::String(s) => self.string_to_number(s),
            DynValue::Object(obj) => {
                let prim = self.default_value(obj, PreferredType::Number)?;
                let result = self.to_number_checked(prim);
                self.release_value(prim);
                result?
            }
            _ => (DynValue::NaN, false),
        })
    }

    pub fn string_to_number(&self, s: StrRef) -> (DynValue, bool) {
        parse_number(self.string_view(s))
    }

    /// ToNumber as a raw double
    pub fn to_f64(&mut self, v: DynValue) -> JsResult<f64> {
        Ok(self.to_number(v)?.as_f64().unwrap_or(f64::NAN))
    }

    pub fn to_int32(&mut self, v: DynValue) -> JsResult<i32> {
        if let DynValue::Int32(i) = v {
            return Ok(i);
        }
        Ok(f64_to_int32(self.to_f64(v)?))
    }

    pub fn to_uint32(&mut self, v: DynValue) -> JsResult<u32> {
        if let DynValue::Int32(i) = v {
            return Ok(i as u32);
        }
        Ok(f64_to_uint32(self.to_f64(v)?))
    }

    pub fn to_integer(&mut self, v: DynValue) -> JsResult<f64> {
        Ok(f64_to_integer(self.to_f64(v)?))
    }

    /// ToLength: an integer clamped to `[0, 2^53 - 1]`
    pub fn to_length(&mut self, v: DynValue) -> JsResult<f64> {
        let n = self.to_integer(v)?;
        Ok(n.clamp(0.0, MAX_LENGTH_PROPERTY_SIZE))
    }

    /// ToString; the result is owned by the caller
    pub fn to_string(&mut self, v: DynValue) -> JsResult<StrRef> {
        let builtin = |b: BuiltinString| Ok(StrRef::Builtin(b));
        match v {
            DynValue::Undefined | DynValue::None => builtin(BuiltinString::Undefined),
            DynValue::Null => builtin(BuiltinString::Null),
            DynValue::Boolean(true) => builtin(BuiltinString::True),
            DynValue::Boolean(false) => builtin(BuiltinString::False),
            DynValue::Int32(0) => builtin(BuiltinString::Zero),
            DynValue::NaN => builtin(BuiltinString::NaN),
            DynValue::PositiveInfinity => builtin(BuiltinString::Infinity),
            DynValue::NegativeInfinity => builtin(BuiltinString::NegativeInfinity),
            DynValue::Int32(i) => Ok(self.new_string(&i.to_string())?.as_string().unwrap_or(StrRef::EMPTY)),
            DynValue::Double(d) => {
                let text = dtoa::number_to_string(d);
                Ok(self.new_string(&text)?.as_string().unwrap_or(StrRef::EMPTY))
            }
            DynValue::String(s) => Ok(self.share_string(s)),
            DynValue::Object(obj) => {
                let prim = self.default_value(obj, PreferredType::String)?;
                let result = self.to_string(prim);
                self.release_value(prim);
                result
            }
            DynValue::InternalFunction(_) | DynValue::SpBase(_) | DynValue::FpBase(_) | DynValue::GpBase(_) => {
                Err(RuntimeError::type_error("internal value has no string form"))
            }
        }
    }

    /// ToString for display; never runs user code
    pub fn display_value(&self, v: DynValue) -> String {
        match v {
            DynValue::String(s) => self.to_rust_string(s),
            DynValue::Object(obj) => {
                let o = self.heap.object(obj);
                format!("[object {}]", o.class.name())
            }
            other => other.to_string(),
        }
    }

    /// ToObject; the result is owned by the caller
    pub fn to_object(&mut self, v: DynValue) -> JsResult<GcRef> {
        if let DynValue::Object(obj) = v {
            self.retain(obj);
            return Ok(obj);
        }
        match self.new_wrapper(v)? {
            Some(obj) => Ok(obj),
            None => Err(RuntimeError::type_error(format!("cannot convert {} to object", v))),
        }
    }

    /// ToPrimitive; the result is owned by the caller
    pub fn to_primitive(&mut self, v: DynValue, hint: PreferredType) -> JsResult<DynValue> {
        match v {
            DynValue::Object(obj) => self.default_value(obj, hint),
            _ => {
                self.retain_value(v);
                Ok(v)
            }
        }
    }

    /// Canonical property key for a value
    ///
    /// Name keys are interned, so the result borrows from the atom table.
    pub fn to_prop_key(&mut self, v: DynValue) -> JsResult<PropKey> {
        match v {
            DynValue::Int32(i) if i >= 0 => return Ok(PropKey::Index(i as u32)),
            // -0 stringifies to "0" and so lands on index 0
            DynValue::Double(d) if d >= 0.0 && d <= MAX_ARRAY_INDEX as f64 && d.fract() == 0.0 => {
                return Ok(PropKey::Index(d as u32));
            }
            DynValue::String(StrRef::Builtin(b)) => {
                return Ok(match is_array_index(b.as_str()) {
                    Some(i) => PropKey::Index(i),
                    None => PropKey::Name(StrRef::Builtin(b)),
                });
            }
            _ => {}
        }
        let s = self.to_string(v)?;
        let text = self.to_rust_string(s);
        self.release_value(DynValue::String(s));
        match is_array_index(&text) {
            Some(i) => Ok(PropKey::Index(i)),
            None => Ok(PropKey::Name(self.intern(&text)?)),
        }
    }

    /// A key as a string value, owned by the caller
    pub fn key_to_value(&mut self, key: PropKey) -> JsResult<DynValue> {
        match key {
            PropKey::Index(i) => Ok(DynValue::String(self.to_string(DynValue::from_u32(i))?)),
            PropKey::Name(s) => Ok(DynValue::String(self.share_string(s))),
        }
    }

    pub fn is_callable(&self, v: DynValue) -> bool {
        match v {
            DynValue::Object(obj) => self.heap.object(obj).is_callable(),
            _ => false,
        }
    }

    /// The `typeof` operator
    pub fn typeof_name(&self, v: DynValue) -> BuiltinString {
        match v {
            DynValue::Undefined | DynValue::None => BuiltinString::Undefined,
            DynValue::Null => BuiltinString::TypeObject,
            DynValue::Boolean(_) => BuiltinString::TypeBoolean,
            DynValue::String(_) => BuiltinString::TypeString,
            DynValue::Object(_) if self.is_callable(v) => BuiltinString::TypeFunction,
            DynValue::Object(_) => BuiltinString::TypeObject,
            DynValue::InternalFunction(_) => BuiltinString::TypeFunction,
            v if v.is_number() => BuiltinString::TypeNumber,
            _ => BuiltinString::Undefined,
        }
    }

    /// `===`
    pub fn strict_equals(&self, a: DynValue, b: DynValue) -> bool {
        if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
            return x == y;
        }
        match (a, b) {
            (DynValue::Undefined | DynValue::None, DynValue::Undefined | DynValue::None) => true,
            (DynValue::String(x), DynValue::String(y)) => self.string_equals(x, y),
            _ => a == b,
        }
    }

    /// SameValue: NaN equals itself and the zeros differ
    pub fn same_value(&self, a: DynValue, b: DynValue) -> bool {
        if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
            if x.is_nan() && y.is_nan() {
                return true;
            }
            return x == y && x.is_sign_negative() == y.is_sign_negative();
        }
        self.strict_equals(a, b)
    }

    /// `==`
    pub fn abstract_equals(&mut self, a: DynValue, b: DynValue) -> JsResult<bool> {
        let nullish = |v: DynValue| v.is_null_or_undefined() || v.is_none();
        if nullish(a) || nullish(b) {
            return Ok(nullish(a) && nullish(b));
        }
        if (a.is_number() && b.is_number()) || std::mem::discriminant(&a) == std::mem::discriminant(&b) {
            return Ok(self.strict_equals(a, b));
        }
        match (a, b) {
            (DynValue::String(_), _) if b.is_number() => {
                let x = self.to_number(a)?;
                Ok(self.strict_equals(x, b))
            }
            (_, DynValue::String(_)) if a.is_number() => {
                let y = self.to_number(b)?;
                Ok(self.strict_equals(a, y))
            }
            (DynValue::Boolean(_), _) => {
                let x = self.to_number(a)?;
                self.abstract_equals(x, b)
            }
            (_, DynValue::Boolean(_)) => {
                let y = self.to_number(b)?;
                self.abstract_equals(a, y)
            }
            (DynValue::Object(_), _) if b.is_number() || b.is_string() => {
                let x = self.to_primitive(a, PreferredType::Default)?;
                let result = self.abstract_equals(x, b);
                self.release_value(x);
                result
            }
            (_, DynValue::Object(_)) if a.is_number() || a.is_string() => {
                let y = self.to_primitive(b, PreferredType::Default)?;
                let result = self.abstract_equals(a, y);
                self.release_value(y);
                result
            }
            _ => Ok(false),
        }
    }
}
