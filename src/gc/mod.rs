//! Memory management
//!
//! Cells are reference counted. A cell is freed as soon as its count drops
//! to zero, and a pluggable cycle collector reclaims groups of cells that
//! only keep each other alive.
//!
//! Every cell charges its bytes to the application arena of the
//! [`MemoryManager`]; runtime bookkeeping uses the separate VM arena.

mod allocator;
mod collector;
mod header;
mod heap;
mod trace;

pub use allocator::{
    AllocError, Arena, ArenaKind, ArenaPtr, BIG_CHUNK_SIZE, MEMHASHTABLESIZE, MemoryChunk,
    MemoryHash, MemoryManager, MemoryStats, bytes4_align,
};
pub use collector::{
    CycleRootCollector, GcPolicy, GcStats, MarkSweepCollector, new_policy, release, retain,
};
pub use header::{MALLOCEXHEADSIZE, MALLOCHEADSIZE, MemHeader, MemoryTag, UINT14_MAX};
pub use heap::{Cell, Entry, GcRef, Heap};
pub use trace::{Trace, Tracer};

impl Heap {
    /// Publish a cell and register it with the collector
    pub fn publish(&mut self, policy: &mut dyn GcPolicy, cell: Cell, mem: ArenaPtr) -> GcRef {
        let r = self.insert(cell, mem);
        policy.on_alloc(self, r);
        r
    }
}
