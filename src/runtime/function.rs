//! Function objects
//!
//! A function is an object whose payload is a [`FunctionRecord`]. Native
//! functions carry a Rust function pointer and an optional captured
//! environment frame; bound functions carry a target, a fixed `this` and
//! leading arguments.

use std::fmt;

use crate::context::Runtime;
use crate::error::{JsResult, RuntimeError};
use crate::gc::{AllocError, ArenaPtr, GcRef, MemoryManager, MemoryTag, Tracer};
use crate::runtime::object::{BuiltinObjectId, ObjectClass, ObjectPayload, Prototype, StorageMode};
use crate::runtime::property::{PropKey, PropertyDescriptor};
use crate::runtime::string::BuiltinString;
use crate::value::DynValue;

/// Maximum number of declared arguments
pub const MAX_ARGS: u16 = u16::MAX;

/// Bytes charged for a function record
pub const FUNCTION_RECORD_SIZE: usize = 12;

/// Bound-call nesting limit
const MAX_BOUND_DEPTH: usize = 64;

/// Native function signature
///
/// Receives the function object being called, the `this` value and the
/// arguments. Arguments are borrowed; the result is owned by the caller.
pub type NativeFn = fn(rt: &mut Runtime, callee: GcRef, this: DynValue, args: &[DynValue]) -> JsResult<DynValue>;

/// Result of `Function.prototype.bind`
#[derive(Debug, Clone, Copy)]
pub struct BoundFunction {
    pub target: GcRef,
    pub this: DynValue,
    /// Packed leading arguments, if any
    args: Option<ArenaPtr>,
    arg_len: u16,
}

impl BoundFunction {
    pub fn args(&self, mm: &MemoryManager) -> Vec<DynValue> {
        match self.args {
            Some(mem) => (0..self.arg_len as usize).map(|i| mm.read_value(mem, i)).collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Clone, Copy)]
pub enum FunctionKind {
    Native(NativeFn),
    Bound(BoundFunction),
}

impl fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Native(native) => write!(f, "Native({:p})", *native as *const ()),
            FunctionKind::Bound(bound) => f.debug_tuple("Bound").field(bound).finish(),
        }
    }
}

/// Function payload
#[derive(Debug)]
pub struct FunctionRecord {
    kind: FunctionKind,
    env: Option<GcRef>,
    arg_count: u16,
    mem: ArenaPtr,
}

impl FunctionRecord {
    #[inline]
    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    /// Captured environment frame
    #[inline]
    pub fn env(&self) -> Option<GcRef> {
        self.env
    }

    #[inline]
    pub fn arg_count(&self) -> u16 {
        self.arg_count
    }

    pub(crate) fn trace(&self, tracer: &mut Tracer<'_>) {
        if let Some(env) = self.env {
            tracer.edge(env);
        }
        if let FunctionKind::Bound(bound) = self.kind {
            tracer.edge(bound.target);
            tracer.value(bound.this);
            for v in bound.args(tracer.memory()) {
                tracer.value(v);
            }
        }
    }

    pub(crate) fn free_storage(self, mm: &mut MemoryManager) {
        if let FunctionKind::Bound(BoundFunction { args: Some(args), .. }) = self.kind {
            mm.free(args);
        }
        mm.free(self.mem);
    }
}

impl Runtime {
    /// A native function object; the caller owns the reference
    pub fn new_function(&mut self, native: NativeFn, arg_count: u16) -> JsResult<GcRef> {
        self.new_function_with_env(native, arg_count, None)
    }

    /// A native function closing over `env`
    pub fn new_function_with_env(
        &mut self,
        native: NativeFn,
        arg_count: u16,
        env: Option<GcRef>,
    ) -> JsResult<GcRef> {
        let record = self.native_record(native, arg_count, env)?;
        self.publish_function(record)
    }

    /// Allocate a native function payload; `env` is retained
    pub(crate) fn native_record(
        &mut self,
        native: NativeFn,
        arg_count: u16,
        env: Option<GcRef>,
    ) -> JsResult<FunctionRecord> {
        let mem = self.heap.mm.allocate_gc(FUNCTION_RECORD_SIZE, MemoryTag::Function)?;
        if let Some(env) = env {
            self.retain(env);
        }
        Ok(FunctionRecord {
            kind: FunctionKind::Native(native),
            env,
            arg_count,
            mem,
        })
    }

    /// `Function.prototype.bind`
    pub fn bind_function(&mut self, target: GcRef, this: DynValue, args: &[DynValue]) -> JsResult<GcRef> {
        let target_args = match self.heap.object(target).function() {
            Some(f) => f.arg_count,
            None => return Err(RuntimeError::type_error("bind target is not a function")),
        };
        if args.len() > MAX_ARGS as usize {
            return Err(RuntimeError::range_error("too many bound arguments"));
        }
        let mem = self.heap.mm.allocate_gc(FUNCTION_RECORD_SIZE, MemoryTag::Function)?;
        let packed = match self.pack_values(args) {
            Ok(packed) => packed,
            Err(err) => {
                self.heap.mm.free(mem);
                return Err(err.into());
            }
        };
        self.retain(target);
        self.retain_value(this);
        for &v in args {
            self.retain_value(v);
        }
        let record = FunctionRecord {
            kind: FunctionKind::Bound(BoundFunction {
                target,
                this,
                args: packed,
                arg_len: args.len() as u16,
            }),
            env: None,
            arg_count: target_args.saturating_sub(args.len() as u16),
            mem,
        };
        self.publish_function(record)
    }

    fn pack_values(&mut self, values: &[DynValue]) -> Result<Option<ArenaPtr>, AllocError> {
        if values.is_empty() {
            return Ok(None);
        }
        let mem = self.heap.mm.allocate_gc(values.len() * 8, MemoryTag::List)?;
        for (i, &v) in values.iter().enumerate() {
            self.heap.mm.write_value(mem, i, v);
        }
        Ok(Some(mem))
    }

    fn publish_function(&mut self, record: FunctionRecord) -> JsResult<GcRef> {
        let arg_count = record.arg_count;
        let f = self.create_object(
            ObjectClass::Function,
            Prototype::Builtin(BuiltinObjectId::FunctionPrototype),
            StorageMode::Generic,
            ObjectPayload::Function(record),
        )?;
        let length = PropertyDescriptor::vuwueuc(DynValue::Int32(arg_count as i32));
        if let Err(err) = self.add_own_property(f, PropKey::Name(BuiltinString::Length.into()), length) {
            self.release(f);
            return Err(err);
        }
        Ok(f)
    }

    /// Environment captured by a function object
    pub fn function_env(&self, f: GcRef) -> Option<GcRef> {
        self.heap.object(f).function().and_then(FunctionRecord::env)
    }

    /// `[[Call]]`
    ///
    /// `func`, `this` and `args` are borrowed; the result is owned by the
    /// caller.
    pub fn call(&mut self, func: DynValue, this: DynValue, args: &[DynValue]) -> JsResult<DynValue> {
        let mut callee = match func {
            DynValue::Object(f) if self.heap.object(f).is_callable() => f,
            other => {
                return Err(RuntimeError::type_error(format!("{} is not a function", self.display_value(other))));
            }
        };
        let mut this = this;
        let mut args = args.to_vec();
        for _ in 0..MAX_BOUND_DEPTH {
            let kind = match self.heap.object(callee).function() {
                Some(f) => f.kind,
                None => return Err(RuntimeError::type_error("bound target is not a function")),
            };
            match kind {
                FunctionKind::Native(native) => {
                    tracing::trace!(target: "dynjs::call", callee = %callee, argc = args.len(), "call");
                    return native(self, callee, this, &args);
                }
                FunctionKind::Bound(bound) => {
                    let mut full = bound.args(&self.heap.mm);
                    full.extend_from_slice(&args);
                    args = full;
                    this = bound.this;
                    callee = bound.target;
                }
            }
        }
        Err(RuntimeError::range_error("bound function chain too deep"))
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

    fn sum(rt: &mut Runtime, _callee: GcRef, _this: DynValue, args: &[DynValue]) -> JsResult<DynValue> {
        let mut total = 0.0;
        for &a in args {
            total += rt.to_f64(a)?;
        }
        Ok(DynValue::from_f64(total))
    }

    fn this_value(_rt: &mut Runtime, _callee: GcRef, this: DynValue, _args: &[DynValue]) -> JsResult<DynValue> {
        Ok(this)
    }

    fn read_env(rt: &mut Runtime, callee: GcRef, _this: DynValue, _args: &[DynValue]) -> JsResult<DynValue> {
        match rt.function_env(callee) {
            Some(env) => rt.env_get(env, 0),
            None => Ok(DynValue::Undefined),
        }
    }

    #[test]
    fn test_call_native() {
        let mut rt = runtime();
        let f = rt.new_function(sum, 2).unwrap();
        let r = rt.call(DynValue::Object(f), DynValue::Undefined, &[DynValue::Int32(2), DynValue::Double(0.5)]);
        assert_eq!(r.unwrap(), DynValue::Double(2.5));
        assert_eq!(rt.get(f, BuiltinString::Length.into()).unwrap(), DynValue::Int32(2));
        rt.release(f);
        assert_eq!(rt.heap.live_cells(), rt.builtins.iter().flatten().count());
    }

    #[test]
    fn test_call_non_callable() {
        let mut rt = runtime();
        let obj = rt.new_object().unwrap();
        let err = rt.call(DynValue::Object(obj), DynValue::Undefined, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        let err = rt.call(DynValue::Int32(1), DynValue::Undefined, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn test_bind_prepends_args_and_fixes_this() {
        let mut rt = runtime();
        let f = rt.new_function(sum, 3).unwrap();
        let bound = rt.bind_function(f, DynValue::Null, &[DynValue::Int32(10)]).unwrap();
        assert_eq!(rt.refcount(f), 2);
        assert_eq!(rt.get(bound, BuiltinString::Length.into()).unwrap(), DynValue::Int32(2));
        let r = rt.call(DynValue::Object(bound), DynValue::Undefined, &[DynValue::Int32(5)]).unwrap();
        assert_eq!(r, DynValue::Int32(15));

        let g = rt.new_function(this_value, 0).unwrap();
        let bound_this = rt.bind_function(g, DynValue::Boolean(true), &[]).unwrap();
        let r = rt.call(DynValue::Object(bound_this), DynValue::Null, &[]).unwrap();
        assert_eq!(r, DynValue::Boolean(true));

        rt.release(bound);
        assert_eq!(rt.refcount(f), 1);
        rt.release(f);
        rt.release(bound_this);
        rt.release(g);
    }

    #[test]
    fn test_bound_args_retained() {
        let mut rt = runtime();
        let f = rt.new_function(sum, 1).unwrap();
        let arg = rt.new_object().unwrap();
        let bound = rt.bind_function(f, DynValue::Undefined, &[DynValue::Object(arg)]).unwrap();
        assert_eq!(rt.refcount(arg), 2);
        rt.release(bound);
        assert_eq!(rt.refcount(arg), 1);
        rt.release(arg);
        rt.release(f);
    }

    #[test]
    fn test_closure_env() {
        let mut rt = runtime();
        let env = rt.new_env(None, 1).unwrap();
        rt.env_set(env, 0, DynValue::Int32(99)).unwrap();
        let f = rt.new_function_with_env(read_env, 0, Some(env)).unwrap();
        rt.release(env);
        assert!(rt.is_live(env));
        assert_eq!(rt.call(DynValue::Object(f), DynValue::Undefined, &[]).unwrap(), DynValue::Int32(99));
        rt.release(f);
        assert!(!rt.is_live(env));
    }

    #[test]
    fn test_closure_cycle_collected() {
        let mut rt = runtime();
        let env = rt.new_env(None, 1).unwrap();
        let f = rt.new_function_with_env(read_env, 0, Some(env)).unwrap();
        // The frame holds the function that captured it
        rt.env_set(env, 0, DynValue::Object(f)).unwrap();
        rt.release(env);
        rt.release(f);
        assert!(rt.is_live(f));
        rt.collect_cycles();
        assert!(!rt.is_live(f));
        assert!(!rt.is_live(env));
    }

    #[test]
    fn test_bind_non_function() {
        let mut rt = runtime();
        let obj = rt.new_object().unwrap();
        assert_eq!(rt.bind_function(obj, DynValue::Undefined, &[]).unwrap_err().kind(), ErrorKind::Type);
    }
}
