//! Environment frames
//!
//! A frame is the slot array a closure captures. Slots are packed values
//! in the frame's arena block; the frame holds a counted reference to its
//! parent and to every counted slot value.

use crate::context::Runtime;
use crate::error::{JsResult, RuntimeError};
use crate::gc::{ArenaPtr, Cell, GcRef, MemoryTag, Trace, Tracer};
use crate::value::DynValue;

/// An environment cell
#[derive(Debug)]
pub struct EnvFrame {
    parent: Option<GcRef>,
    len: u32,
    /// Slot block; also the cell's charged block
    slots: ArenaPtr,
}

impl EnvFrame {
    #[inline]
    pub fn parent(&self) -> Option<GcRef> {
        self.parent
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Trace for EnvFrame {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        if let Some(p) = self.parent {
            tracer.edge(p);
        }
        let mm = tracer.memory();
        for i in 0..self.len() {
            tracer.value(mm.read_value(self.slots, i));
        }
    }
}

impl Runtime {
    /// A frame of `len` undefined slots; the caller owns the reference
    pub fn new_env(&mut self, parent: Option<GcRef>, len: usize) -> JsResult<GcRef> {
        let mem = self.heap.mm.allocate_gc(len * 8, MemoryTag::Env)?;
        for i in 0..len {
            self.heap.mm.write_value(mem, i, DynValue::Undefined);
        }
        if let Some(p) = parent {
            self.retain(p);
        }
        let frame = EnvFrame {
            parent,
            len: len as u32,
            slots: mem,
        };
        Ok(self.publish(Cell::Env(frame), mem))
    }

    fn env_slot(&self, env: GcRef, index: usize) -> JsResult<ArenaPtr> {
        let (frame, mem) = self.heap.env(env);
        if index >= frame.len() {
            return Err(RuntimeError::range_error(format!(
                "environment slot {} out of range ({} slots)",
                index,
                frame.len()
            )));
        }
        Ok(mem)
    }

    /// Read a slot; the result is owned by the caller
    pub fn env_get(&mut self, env: GcRef, index: usize) -> JsResult<DynValue> {
        let mem = self.env_slot(env, index)?;
        let v = self.heap.mm.read_value(mem, index);
        self.retain_value(v);
        Ok(v)
    }

    /// Store into a slot; `value` is borrowed
    pub fn env_set(&mut self, env: GcRef, index: usize, value: DynValue) -> JsResult<()> {
        let mem = self.env_slot(env, index)?;
        self.retain_value(value);
        let old = self.heap.mm.read_value(mem, index);
        self.heap.mm.write_value(mem, index, value);
        self.release_value(old);
        Ok(())
    }

    pub fn env_parent(&self, env: GcRef) -> Option<GcRef> {
        self.heap.env(env).0.parent()
    }
}
