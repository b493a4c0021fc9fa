//! Arithmetic operators
//!
//! Int32 operands stay on the integer path while the result fits and is
//! not negative zero; everything else goes through IEEE-754 doubles and is
//! normalised with [`DynValue::from_f64`]. Results are owned by the caller.

use crate::context::Runtime;
use crate::error::JsResult;
use crate::runtime::conversion::{PreferredType, f64_to_int32, f64_to_uint32};
use crate::value::DynValue;

/// Numeric binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Sar,
    Shr,
}

/// `a / b` on doubles, spelled out for the zero-divisor signs
pub fn div_f64(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        if a.is_nan() || a == 0.0 {
            return f64::NAN;
        }
        let negative = a.is_sign_negative() != b.is_sign_negative();
        return if negative { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    a / b
}

/// `a % b`; the result takes the sign of the dividend
pub fn rem_f64(a: f64, b: f64) -> f64 {
    if b == 0.0 || a.is_infinite() || a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if b.is_infinite() {
        return a;
    }
    // Rust's `%` is fmod, which already keeps the dividend's sign
    a % b
}

fn int_fast_path(op: BinaryOp, a: i32, b: i32) -> Option<DynValue> {
    let v = match op {
        BinaryOp::Sub => a.checked_sub(b)?,
        BinaryOp::Mul => {
            let r = a.checked_mul(b)?;
            // 0 * -n is -0
            if r == 0 && (a < 0 || b < 0) {
                return None;
            }
            r
        }
        BinaryOp::Rem => {
            if b == 0 || (a == i32::MIN && b == -1) {
                return None;
            }
            let r = a % b;
            if r == 0 && a < 0 {
                return None;
            }
            r
        }
        _ => return None,
    };
    Some(DynValue::Int32(v))
}

fn apply_f64(op: BinaryOp, a: f64, b: f64) -> DynValue {
    let shift = |b: f64| f64_to_uint32(b) & 0x1f;
    match op {
        BinaryOp::Sub => DynValue::from_f64(a - b),
        BinaryOp::Mul => DynValue::from_f64(a * b),
        BinaryOp::Div => DynValue::from_f64(div_f64(a, b)),
        BinaryOp::Rem => DynValue::from_f64(rem_f64(a, b)),
        BinaryOp::BitAnd => DynValue::Int32(f64_to_int32(a) & f64_to_int32(b)),
        BinaryOp::BitOr => DynValue::Int32(f64_to_int32(a) | f64_to_int32(b)),
        BinaryOp::BitXor => DynValue::Int32(f64_to_int32(a) ^ f64_to_int32(b)),
        BinaryOp::Shl => DynValue::Int32(f64_to_int32(a).wrapping_shl(shift(b))),
        BinaryOp::Sar => DynValue::Int32(f64_to_int32(a) >> shift(b)),
        BinaryOp::Shr => DynValue::from_u32(f64_to_uint32(a) >> shift(b)),
    }
}

impl Runtime {
    /// The `+` operator: concatenation if either primitive is a string
    pub fn add(&mut self, a: DynValue, b: DynValue) -> JsResult<DynValue> {
        if let (DynValue::Int32(x), DynValue::Int32(y)) = (a, b) {
            if let Some(r) = x.checked_add(y) {
                return Ok(DynValue::Int32(r));
            }
        }
        let pa = self.to_primitive(a, PreferredType::Default)?;
        let pb = match self.to_primitive(b, PreferredType::Default) {
            Ok(pb) => pb,
            Err(err) => {
                self.release_value(pa);
                return Err(err);
            }
        };
        let result = self.add_primitives(pa, pb);
        self.release_value(pa);
        self.release_value(pb);
        result
    }

    fn add_primitives(&mut self, a: DynValue, b: DynValue) -> JsResult<DynValue> {
        if a.is_string() || b.is_string() {
            let sa = self.to_string(a)?;
            let sb = match self.to_string(b) {
                Ok(sb) => sb,
                Err(err) => {
                    self.release_value(DynValue::String(sa));
                    return Err(err);
                }
            };
            let joined = self.concat(sa, sb);
            self.release_value(DynValue::String(sa));
            self.release_value(DynValue::String(sb));
            return Ok(DynValue::String(joined?));
        }
        let x = self.to_f64(a)?;
        let y = self.to_f64(b)?;
        Ok(DynValue::from_f64(x + y))
    }

    /// Any numeric binary operator
    pub fn binary(&mut self, op: BinaryOp, a: DynValue, b: DynValue) -> JsResult<DynValue> {
        if let (DynValue::Int32(x), DynValue::Int32(y)) = (a, b) {
            if let Some(v) = int_fast_path(op, x, y) {
                return Ok(v);
            }
        }
        let x = self.to_f64(a)?;
        let y = self.to_f64(b)?;
        Ok(apply_f64(op, x, y))
    }

    pub fn sub(&mut self, a: DynValue, b: DynValue) -> JsResult<DynValue> {
        self.binary(BinaryOp::Sub, a, b)
    }

    pub fn mul(&mut self, a: DynValue, b: DynValue) -> JsResult<DynValue> {
        self.binary(BinaryOp::Mul, a, b)
    }

    pub fn div(&mut self, a: DynValue, b: DynValue) -> JsResult<DynValue> {
        self.binary(BinaryOp::Div, a, b)
    }

    pub fn rem(&mut self, a: DynValue, b: DynValue) -> JsResult<DynValue> {
        self.binary(BinaryOp::Rem, a, b)
    }

    /// Unary minus
    pub fn neg(&mut self, v: DynValue) -> JsResult<DynValue> {
        match v {
            DynValue::Int32(0) => Ok(DynValue::negative_zero()),
            DynValue::Int32(i) if i != i32::MIN => Ok(DynValue::Int32(-i)),
            other => Ok(DynValue::from_f64(-self.to_f64(other)?)),
        }
    }

    /// Unary `~`
    pub fn bitwise_not(&mut self, v: DynValue) -> JsResult<DynValue> {
        Ok(DynValue::Int32(!self.to_int32(v)?))
    }

    /// `<`, with `None` standing for undefined (a NaN operand)
    pub fn less_than(&mut self, a: DynValue, b: DynValue) -> JsResult<Option<bool>> {
        let pa = self.to_primitive(a, PreferredType::Number)?;
        let pb = match self.to_primitive(b, PreferredType::Number) {
            Ok(pb) => pb,
            Err(err) => {
                self.release_value(pa);
                return Err(err);
            }
        };
        let result = match (pa, pb) {
            (DynValue::String(x), DynValue::String(y)) => {
                Ok(Some(self.compare_strings(x, y) == std::cmp::Ordering::Less))
            }
            _ => self.to_f64(pa).and_then(|x| {
                let y = self.to_f64(pb)?;
                Ok(if x.is_nan() || y.is_nan() { None } else { Some(x < y) })
            }),
        };
        self.release_value(pa);
        self.release_value(pb);
        result
    }
}
