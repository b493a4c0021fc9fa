//! Builtin objects
//!
//! The global object, the class prototypes and a few constructors are
//! created the first time something reaches them and then stay pinned in
//! the runtime's builtin table. Only the methods the object model itself
//! relies on (`toString`, `valueOf`, `bind`) are provided here.

use crate::context::Runtime;
use crate::error::{JsResult, RuntimeError};
use crate::gc::GcRef;
use crate::runtime::function::NativeFn;
use crate::runtime::object::{BuiltinObjectId, ObjectClass, ObjectPayload, StorageMode};
use crate::runtime::ops::LENGTH;
use crate::runtime::property::{PropKey, PropertyDescriptor};
use crate::runtime::string::{BuiltinString, DynStringBuilder, StrRef};
use crate::util::dtoa;
use crate::value::DynValue;

/// Native that returns its receiver
pub fn return_this(rt: &mut Runtime, _callee: GcRef, this: DynValue, _args: &[DynValue]) -> JsResult<DynValue> {
    rt.retain_value(this);
    Ok(this)
}

fn return_undefined(_rt: &mut Runtime, _callee: GcRef, _this: DynValue, _args: &[DynValue]) -> JsResult<DynValue> {
    Ok(DynValue::Undefined)
}

fn arg(args: &[DynValue], i: usize) -> DynValue {
    args.get(i).copied().unwrap_or(DynValue::Undefined)
}

/// `Object.prototype.toString`
fn object_to_string(rt: &mut Runtime, _callee: GcRef, this: DynValue, _args: &[DynValue]) -> JsResult<DynValue> {
    let class = match this {
        DynValue::Undefined | DynValue::None => "Undefined",
        DynValue::Null => "Null",
        DynValue::Object(obj) => match rt.class_of(obj) {
            ObjectClass::Object => return Ok(BuiltinString::ObjectObject.into()),
            other => other.name(),
        },
        DynValue::String(_) => ObjectClass::String.name(),
        DynValue::Boolean(_) => ObjectClass::Boolean.name(),
        _ => ObjectClass::Number.name(),
    };
    rt.new_string(&format!("[object {}]", class))
}

/// `Object.prototype.valueOf`
fn object_value_of(rt: &mut Runtime, callee: GcRef, this: DynValue, args: &[DynValue]) -> JsResult<DynValue> {
    if this.is_object() {
        return return_this(rt, callee, this, args);
    }
    Ok(DynValue::Object(rt.to_object(this)?))
}

/// `Object.prototype.hasOwnProperty`
fn object_has_own_property(rt: &mut Runtime, _callee: GcRef, this: DynValue, args: &[DynValue]) -> JsResult<DynValue> {
    let key = rt.to_prop_key(arg(args, 0))?;
    let obj = rt.to_object(this)?;
    let found = rt.has_own_property(obj, key);
    rt.release(obj);
    Ok(DynValue::Boolean(found))
}

/// `Function.prototype.bind`
fn function_bind(rt: &mut Runtime, _callee: GcRef, this: DynValue, args: &[DynValue]) -> JsResult<DynValue> {
    let target = match this {
        DynValue::Object(f) if rt.is_callable(this) => f,
        _ => return Err(RuntimeError::type_error("Function.prototype.bind called on a non-function")),
    };
    let rest = args.get(1..).unwrap_or(&[]);
    Ok(DynValue::Object(rt.bind_function(target, arg(args, 0), rest)?))
}

/// `Array.prototype.join`
fn array_join(rt: &mut Runtime, _callee: GcRef, this: DynValue, args: &[DynValue]) -> JsResult<DynValue> {
    let obj = rt.to_object(this)?;
    let result = join_elements(rt, obj, arg(args, 0));
    rt.release(obj);
    result
}

fn join_elements(rt: &mut Runtime, obj: GcRef, separator: DynValue) -> JsResult<DynValue> {
    let len = rt.get_length(obj)?;
    let sep = if separator.is_undefined() {
        StrRef::Builtin(BuiltinString::Comma)
    } else {
        rt.to_string(separator)?
    };
    let mut builder = DynStringBuilder::new().generated();
    let mut result = Ok(());
    for i in 0..len {
        if i > 0 {
            builder.push_view(rt.string_view(sep));
        }
        let v = match rt.get(obj, PropKey::Index(i)) {
            Ok(v) => v,
            Err(err) => {
                result = Err(err);
                break;
            }
        };
        if !v.is_null_or_undefined() {
            let s = rt.to_string(v);
            rt.release_value(v);
            match s {
                Ok(s) => {
                    builder.push_view(rt.string_view(s));
                    rt.release_value(DynValue::String(s));
                }
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
    }
    rt.release_value(DynValue::String(sep));
    result?;
    Ok(DynValue::String(rt.publish_string(builder)?))
}

/// `Array.prototype.toString`
fn array_to_string(rt: &mut Runtime, callee: GcRef, this: DynValue, _args: &[DynValue]) -> JsResult<DynValue> {
    array_join(rt, callee, this, &[])
}

/// `Error.prototype.toString`
fn error_to_string(rt: &mut Runtime, _callee: GcRef, this: DynValue, _args: &[DynValue]) -> JsResult<DynValue> {
    let DynValue::Object(obj) = this else {
        return Err(RuntimeError::type_error("Error.prototype.toString called on a non-object"));
    };
    let name = rt.get(obj, BuiltinString::Name.into())?;
    let name = if name.is_undefined() {
        StrRef::Builtin(BuiltinString::Error)
    } else {
        let s = rt.to_string(name);
        rt.release_value(name);
        s?
    };
    let message = match rt.get(obj, BuiltinString::Message.into()) {
        Ok(m) if m.is_undefined() => StrRef::EMPTY,
        Ok(m) => {
            let s = rt.to_string(m);
            rt.release_value(m);
            match s {
                Ok(s) => s,
                Err(err) => {
                    rt.release_value(DynValue::String(name));
                    return Err(err);
                }
            }
        }
        Err(err) => {
            rt.release_value(DynValue::String(name));
            return Err(err);
        }
    };
    let result = if rt.string_len(name) == 0 {
        Ok(rt.share_string(message))
    } else if rt.string_len(message) == 0 {
        Ok(rt.share_string(name))
    } else {
        let mut builder = DynStringBuilder::new();
        builder.push_view(rt.string_view(name));
        builder.push_str(": ");
        builder.push_view(rt.string_view(message));
        rt.publish_string(builder)
    };
    rt.release_value(DynValue::String(name));
    rt.release_value(DynValue::String(message));
    Ok(DynValue::String(result?))
}

/// The primitive behind `this` for a wrapper method; borrowed
fn this_primitive(rt: &Runtime, this: DynValue, class: ObjectClass) -> JsResult<DynValue> {
    let matches = |v: DynValue| match class {
        ObjectClass::String => v.is_string(),
        ObjectClass::Boolean => v.is_boolean(),
        _ => v.is_number(),
    };
    if matches(this) {
        return Ok(this);
    }
    if let DynValue::Object(obj) = this {
        let o = rt.heap.object(obj);
        if o.class() == class {
            if let Some(prim) = o.primitive() {
                return Ok(prim);
            }
        }
    }
    Err(RuntimeError::type_error(format!(
        "{}.prototype method called on an incompatible receiver",
        class.name()
    )))
}

fn wrapper_value_of(rt: &mut Runtime, class: ObjectClass, this: DynValue) -> JsResult<DynValue> {
    let prim = this_primitive(rt, this, class)?;
    rt.retain_value(prim);
    Ok(prim)
}

fn string_value_of(rt: &mut Runtime, _callee: GcRef, this: DynValue, _args: &[DynValue]) -> JsResult<DynValue> {
    wrapper_value_of(rt, ObjectClass::String, this)
}

fn boolean_value_of(rt: &mut Runtime, _callee: GcRef, this: DynValue, _args: &[DynValue]) -> JsResult<DynValue> {
    wrapper_value_of(rt, ObjectClass::Boolean, this)
}

fn boolean_to_string(rt: &mut Runtime, _callee: GcRef, this: DynValue, _args: &[DynValue]) -> JsResult<DynValue> {
    let prim = this_primitive(rt, this, ObjectClass::Boolean)?;
    Ok(DynValue::String(rt.to_string(prim)?))
}

fn number_value_of(rt: &mut Runtime, _callee: GcRef, this: DynValue, _args: &[DynValue]) -> JsResult<DynValue> {
    wrapper_value_of(rt, ObjectClass::Number, this)
}

/// `Number.prototype.toString(radix)`
fn number_to_string(rt: &mut Runtime, _callee: GcRef, this: DynValue, args: &[DynValue]) -> JsResult<DynValue> {
    let prim = this_primitive(rt, this, ObjectClass::Number)?;
    let radix = match arg(args, 0) {
        DynValue::Undefined => 10.0,
        r => rt.to_integer(r)?,
    };
    if !(2.0..=36.0).contains(&radix) {
        return Err(RuntimeError::range_error("toString() radix must be between 2 and 36"));
    }
    let d = prim.as_f64().unwrap_or(f64::NAN);
    if radix == 10.0 || !d.is_finite() {
        return Ok(DynValue::String(rt.to_string(prim)?));
    }
    let text = format_radix(d, radix as u32);
    rt.new_string(&text)
}

/// Digits of a finite double in a non-decimal radix
fn format_radix(d: f64, radix: u32) -> String {
    let negative = d < 0.0;
    let d = d.abs();
    let int = d.trunc();
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if int < u64::MAX as f64 {
        out.push_str(&dtoa::u64_to_str_radix(int as u64, radix));
    } else {
        return dtoa::number_to_string(if negative { -d } else { d });
    }
    let mut frac = d - int;
    if frac > 0.0 {
        out.push('.');
        // 52 bits of mantissa never need more digits than this in base 2
        for _ in 0..52 {
            frac *= radix as f64;
            let digit = frac.trunc() as u32;
            out.push(std::char::from_digit(digit, radix).unwrap_or('0'));
            frac -= digit as f64;
            if frac == 0.0 {
                break;
            }
        }
    }
    out
}

fn string_to_string(rt: &mut Runtime, callee: GcRef, this: DynValue, args: &[DynValue]) -> JsResult<DynValue> {
    string_value_of(rt, callee, this, args)
}

/// `Number(value)` called as a function
fn number_call(rt: &mut Runtime, _callee: GcRef, _this: DynValue, args: &[DynValue]) -> JsResult<DynValue> {
    match args.first() {
        Some(&v) => rt.to_number(v),
        None => Ok(DynValue::Int32(0)),
    }
}

/// `Boolean(value)` called as a function
fn boolean_call(rt: &mut Runtime, _callee: GcRef, _this: DynValue, args: &[DynValue]) -> JsResult<DynValue> {
    Ok(DynValue::Boolean(rt.to_boolean(arg(args, 0))))
}

/// Non-enumerable method attributes
const fn method(value: DynValue) -> PropertyDescriptor {
    PropertyDescriptor::data(value, true, false, true)
}

impl Runtime {
    /// Create a builtin object; the caller takes the creation reference
    pub(crate) fn materialize_builtin(&mut self, id: BuiltinObjectId) -> JsResult<GcRef> {
        let payload = match id {
            BuiltinObjectId::FunctionPrototype => ObjectPayload::Function(self.native_record(return_undefined, 0, None)?),
            BuiltinObjectId::NumberConstructor => ObjectPayload::Function(self.native_record(number_call, 1, None)?),
            BuiltinObjectId::BooleanConstructor => ObjectPayload::Function(self.native_record(boolean_call, 1, None)?),
            BuiltinObjectId::StringPrototype => ObjectPayload::Primitive(DynValue::String(StrRef::EMPTY)),
            BuiltinObjectId::BooleanPrototype => ObjectPayload::Primitive(DynValue::Boolean(false)),
            BuiltinObjectId::NumberPrototype => ObjectPayload::Primitive(DynValue::Int32(0)),
            _ => ObjectPayload::None,
        };
        let obj = self.create_object(id.class(), id.prototype(), StorageMode::Generic, payload)?;
        self.heap.object_mut(obj).builtin_id = Some(id);
        if let Err(err) = self.populate_builtin(id, obj) {
            self.release(obj);
            return Err(err);
        }
        tracing::debug!(target: "dynjs::object", builtin = ?id, obj = %obj, "materialized builtin");
        Ok(obj)
    }

    fn define_value(&mut self, obj: GcRef, name: &str, desc: PropertyDescriptor) -> JsResult<()> {
        let key = self.key(name)?;
        self.add_own_property(obj, key, desc)
    }

    fn define_method(&mut self, obj: GcRef, name: &str, native: NativeFn, arg_count: u16) -> JsResult<()> {
        let f = self.new_function(native, arg_count)?;
        let result = self.define_value(obj, name, method(DynValue::Object(f)));
        self.release(f);
        result
    }

    /// Define a property whose value is another builtin
    fn define_builtin(&mut self, obj: GcRef, name: &str, target: BuiltinObjectId, desc: PropertyDescriptor) -> JsResult<()> {
        let target = self.builtin_object(target)?;
        self.define_value(obj, name, desc.with_value(DynValue::Object(target)))
    }

    fn populate_builtin(&mut self, id: BuiltinObjectId, obj: GcRef) -> JsResult<()> {
        let constant = PropertyDescriptor::vuwueuc;
        match id {
            BuiltinObjectId::Global => {
                self.define_value(obj, "NaN", constant(DynValue::NaN))?;
                self.define_value(obj, "Infinity", constant(DynValue::PositiveInfinity))?;
                self.define_value(obj, "undefined", constant(DynValue::Undefined))?;
                let hidden = method(DynValue::Undefined);
                self.define_builtin(obj, "Math", BuiltinObjectId::Math, hidden)?;
                self.define_builtin(obj, "JSON", BuiltinObjectId::Json, hidden)?;
                self.define_builtin(obj, "Number", BuiltinObjectId::NumberConstructor, hidden)?;
                self.define_builtin(obj, "Boolean", BuiltinObjectId::BooleanConstructor, hidden)?;
            }
            BuiltinObjectId::ObjectPrototype => {
                self.define_method(obj, "toString", object_to_string, 0)?;
                self.define_method(obj, "valueOf", object_value_of, 0)?;
                self.define_method(obj, "hasOwnProperty", object_has_own_property, 1)?;
            }
            BuiltinObjectId::FunctionPrototype => {
                self.add_own_property(obj, LENGTH, constant(DynValue::Int32(0)))?;
                self.define_method(obj, "bind", function_bind, 1)?;
            }
            BuiltinObjectId::ArrayPrototype => {
                self.add_own_property(obj, LENGTH, PropertyDescriptor::vwueuc(DynValue::Int32(0)))?;
                self.define_method(obj, "toString", array_to_string, 0)?;
                self.define_method(obj, "join", array_join, 1)?;
            }
            BuiltinObjectId::StringPrototype => {
                self.add_own_property(obj, LENGTH, constant(DynValue::Int32(0)))?;
                self.define_method(obj, "toString", string_to_string, 0)?;
                self.define_method(obj, "valueOf", string_value_of, 0)?;
            }
            BuiltinObjectId::BooleanPrototype => {
                self.define_method(obj, "toString", boolean_to_string, 0)?;
                self.define_method(obj, "valueOf", boolean_value_of, 0)?;
            }
            BuiltinObjectId::NumberPrototype => {
                self.define_method(obj, "toString", number_to_string, 1)?;
                self.define_method(obj, "valueOf", number_value_of, 0)?;
            }
            BuiltinObjectId::ErrorPrototype => {
                self.define_value(obj, "name", method(BuiltinString::Error.into()))?;
                self.define_value(obj, "message", method(DynValue::String(StrRef::EMPTY)))?;
                self.define_method(obj, "toString", error_to_string, 0)?;
            }
            BuiltinObjectId::Math => {
                let constants = [
                    ("E", std::f64::consts::E),
                    ("LN10", std::f64::consts::LN_10),
                    ("LN2", std::f64::consts::LN_2),
                    ("LOG2E", std::f64::consts::LOG2_E),
                    ("LOG10E", std::f64::consts::LOG10_E),
                    ("PI", std::f64::consts::PI),
                    ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
                    ("SQRT2", std::f64::consts::SQRT_2),
                ];
                for (name, v) in constants {
                    self.define_value(obj, name, constant(DynValue::from_f64(v)))?;
                }
            }
            BuiltinObjectId::Json => {}
            BuiltinObjectId::NumberConstructor => {
                self.add_own_property(obj, LENGTH, constant(DynValue::Int32(1)))?;
                self.define_value(obj, "MAX_VALUE", constant(DynValue::Double(f64::MAX)))?;
                self.define_value(obj, "MIN_VALUE", constant(DynValue::Double(5e-324)))?;
                self.define_value(obj, "NaN", constant(DynValue::NaN))?;
                self.define_value(obj, "NEGATIVE_INFINITY", constant(DynValue::NegativeInfinity))?;
                self.define_value(obj, "POSITIVE_INFINITY", constant(DynValue::PositiveInfinity))?;
                self.define_builtin(obj, "prototype", BuiltinObjectId::NumberPrototype, constant(DynValue::Undefined))?;
            }
            BuiltinObjectId::BooleanConstructor => {
                self.add_own_property(obj, LENGTH, constant(DynValue::Int32(1)))?;
                self.define_builtin(obj, "prototype", BuiltinObjectId::BooleanPrototype, constant(DynValue::Undefined))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::error::ErrorKind;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeConfig::embedded()).unwrap()
    }

    fn to_text(rt: &mut Runtime, v: DynValue) -> String {
        let s = rt.to_string(v).unwrap();
        let text = rt.to_rust_string(s);
        rt.release_value(DynValue::String(s));
        text
    }

    #[test]
    fn test_builtins_are_lazy_and_pinned() {
        let mut rt = runtime();
        assert_eq!(rt.heap.live_cells(), 0);
        let obj = rt.new_object().unwrap();
        assert!(rt.builtins[BuiltinObjectId::ObjectPrototype as usize].is_none());

        let v = rt.get(obj, BuiltinString::ToString.into()).unwrap();
        assert!(rt.is_callable(v));
        rt.release_value(v);
        let proto = rt.builtins[BuiltinObjectId::ObjectPrototype as usize].unwrap();
        assert_eq!(rt.builtin_object(BuiltinObjectId::ObjectPrototype).unwrap(), proto);
        assert_eq!(rt.heap.object(proto).builtin_id(), Some(BuiltinObjectId::ObjectPrototype));
        rt.release(obj);
    }

    #[test]
    fn test_global_constants() {
        let mut rt = runtime();
        let global = rt.builtin_object(BuiltinObjectId::Global).unwrap();
        let nan = rt.key("NaN").unwrap();
        assert_eq!(rt.get(global, nan).unwrap(), DynValue::NaN);
        let desc = rt.get_own_property(global, nan);
        assert!(!desc.writable() && !desc.enumerable() && !desc.configurable());

        let err = rt.put(global, nan, DynValue::Int32(1), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);

        let number = rt.key("Number").unwrap();
        let ctor = rt.get(global, number).unwrap();
        let r = rt.call(ctor, DynValue::Undefined, &[DynValue::Boolean(true)]).unwrap();
        assert_eq!(r, DynValue::Int32(1));
        rt.release_value(ctor);
    }

    #[test]
    fn test_number_constructor_constants() {
        let mut rt = runtime();
        let ctor = rt.builtin_object(BuiltinObjectId::NumberConstructor).unwrap();
        let max = rt.key("MAX_VALUE").unwrap();
        assert_eq!(rt.get(ctor, max).unwrap(), DynValue::Double(f64::MAX));
        let proto = rt.key("prototype").unwrap();
        let p = rt.get(ctor, proto).unwrap();
        assert_eq!(p.as_object(), rt.builtins[BuiltinObjectId::NumberPrototype as usize]);
        rt.release_value(p);
    }

    #[test]
    fn test_object_to_string_tags() {
        let mut rt = runtime();
        let arr = rt.new_array(0).unwrap();
        let f = rt.new_function(return_this, 0).unwrap();
        let r = object_to_string(&mut rt, f, DynValue::Object(arr), &[]).unwrap();
        assert_eq!(to_text(&mut rt, r), "[object Array]");
        let r = object_to_string(&mut rt, f, DynValue::Null, &[]).unwrap();
        assert_eq!(to_text(&mut rt, r), "[object Null]");
        rt.release(arr);
        rt.release(f);
    }

    #[test]
    fn test_array_to_string_joins() {
        let mut rt = runtime();
        let s = rt.new_string("x").unwrap();
        let arr = rt
            .new_array_from(&[DynValue::Int32(1), DynValue::Null, s, DynValue::Double(2.5)])
            .unwrap();
        assert_eq!(to_text(&mut rt, DynValue::Object(arr)), "1,,x,2.5");
        rt.release(arr);
        rt.release_value(s);
    }

    #[test]
    fn test_wrapper_methods() {
        let mut rt = runtime();
        let n = rt.new_wrapper(DynValue::Int32(255)).unwrap().unwrap();
        let key = rt.key("toString").unwrap();
        let method = rt.get(n, key).unwrap();
        let hex = rt.call(method, DynValue::Object(n), &[DynValue::Int32(16)]).unwrap();
        assert_eq!(to_text(&mut rt, hex), "ff");
        let err = rt.call(method, DynValue::Object(n), &[DynValue::Int32(1)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        let err = rt.call(method, DynValue::Boolean(true), &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        rt.release_value(method);
        assert_eq!(rt.to_number(DynValue::Object(n)).unwrap(), DynValue::Int32(255));
        rt.release(n);

        let b = rt.new_wrapper(DynValue::Boolean(false)).unwrap().unwrap();
        assert_eq!(to_text(&mut rt, DynValue::Object(b)), "false");
        rt.release(b);
    }

    #[test]
    fn test_format_radix() {
        assert_eq!(format_radix(-10.0, 2), "-1010");
        assert_eq!(format_radix(0.5, 2), "0.1");
        assert_eq!(format_radix(255.75, 16), "ff.c");
    }

    #[test]
    fn test_error_to_string() {
        let mut rt = runtime();
        let err = rt.new_object_of_class(ObjectClass::Error).unwrap();
        assert_eq!(to_text(&mut rt, DynValue::Object(err)), "Error");
        let msg = rt.new_string("boom").unwrap();
        rt.put(err, BuiltinString::Message.into(), msg, true).unwrap();
        assert_eq!(to_text(&mut rt, DynValue::Object(err)), "Error: boom");
        rt.release_value(msg);
        rt.release(err);
    }

    #[test]
    fn test_bind_through_prototype() {
        let mut rt = runtime();
        let f = rt.new_function(return_this, 0).unwrap();
        let key = rt.key("bind").unwrap();
        let bind = rt.get(f, key).unwrap();
        let bound = rt.call(bind, DynValue::Object(f), &[DynValue::Int32(3)]).unwrap();
        let r = rt.call(bound, DynValue::Undefined, &[]).unwrap();
        assert_eq!(r, DynValue::Int32(3));
        rt.release_value(bound);
        rt.release_value(bind);
        rt.release(f);
    }

    #[test]
    fn test_has_own_property() {
        let mut rt = runtime();
        let obj = rt.new_object().unwrap();
        let key = rt.key("a").unwrap();
        rt.put(obj, key, DynValue::Int32(1), true).unwrap();
        let name = rt.key_to_value(key).unwrap();
        let f = rt.new_function(object_has_own_property, 1).unwrap();
        let r = rt.call(DynValue::Object(f), DynValue::Object(obj), &[name]).unwrap();
        assert_eq!(r, DynValue::Boolean(true));
        let r = rt.call(DynValue::Object(f), DynValue::Object(obj), &[DynValue::Int32(0)]).unwrap();
        assert_eq!(r, DynValue::Boolean(false));
        rt.release(f);
        rt.release(obj);
    }
}
