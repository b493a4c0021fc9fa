//! Edge tracing
//!
//! Class-specific collector behaviour lives behind [`Trace`]: a cell lists
//! the counted references it holds and returns the arena blocks it owns.

use crate::gc::allocator::MemoryManager;
use crate::gc::heap::{GcRef, Heap};
use crate::value::DynValue;

/// Collects the counted edges of one cell
pub struct Tracer<'a> {
    mm: &'a MemoryManager,
    edges: Vec<GcRef>,
}

impl<'a> Tracer<'a> {
    pub fn new(mm: &'a MemoryManager) -> Self {
        Tracer {
            mm,
            edges: Vec::new(),
        }
    }

    /// Arena access for cells whose values live in arena blocks
    #[inline]
    pub fn memory(&self) -> &'a MemoryManager {
        self.mm
    }

    #[inline]
    pub fn edge(&mut self, r: GcRef) {
        self.edges.push(r);
    }

    #[inline]
    pub fn value(&mut self, v: DynValue) {
        if let Some(r) = v.heap_ref() {
            self.edges.push(r);
        }
    }

    pub fn into_edges(self) -> Vec<GcRef> {
        self.edges
    }
}

pub trait Trace {
    /// Report every counted reference this cell holds, once per reference
    fn trace(&self, tracer: &mut Tracer<'_>);

    /// Return owned arena blocks
    ///
    /// Runs after the cell left the slot table. The caller releases the
    /// traced children afterwards.
    fn finalize(&mut self, _heap: &mut Heap) {}
}
