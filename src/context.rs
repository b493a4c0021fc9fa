//! Runtime context
//!
//! The [`Runtime`] owns both arenas, the cell heap, the cycle collection
//! policy, the atom table and the pinned builtin objects. Every operation
//! on values goes through it, so there is no global state.

use crate::config::RuntimeConfig;
use crate::error::{JsResult, LeakError};
use crate::gc::{
    self, AllocError, ArenaPtr, Cell, GcPolicy, GcRef, GcStats, Heap, MemoryManager, MemoryStats, MemoryTag,
};
use crate::runtime::object::BuiltinObjectId;
use crate::runtime::string::AtomTable;
use crate::value::DynValue;

/// A single-threaded object runtime
///
/// Memory layout: [app arena: small region | big region] [vm arena: small | big]
pub struct Runtime {
    /// Counted cells and the memory manager charging them
    pub(crate) heap: Heap,

    /// Cycle collector backing reference counting
    pub(crate) gc: Box<dyn GcPolicy>,

    pub(crate) config: RuntimeConfig,

    /// Materialized builtin objects; each entry holds one reference
    pub(crate) builtins: [Option<GcRef>; BuiltinObjectId::COUNT],

    /// Interned names; each entry holds one reference
    pub(crate) atoms: AtomTable,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("policy", &self.gc.kind())
            .field("live_cells", &self.heap.live_cells())
            .field("atoms", &self.atoms.len())
            .finish()
    }
}

impl Runtime {
    /// Create a runtime
    ///
    /// Nothing is allocated until the first value is created; builtin
    /// objects appear on first use.
    pub fn new(config: RuntimeConfig) -> JsResult<Self> {
        config.validate()?;
        let gc = gc::new_policy(config.gc_policy);
        let mm = MemoryManager::new(&config, gc.extended_headers());
        tracing::debug!(
            target: "dynjs::gc",
            policy = config.gc_policy.name(),
            app = config.app_heap_size,
            vm = config.vm_heap_size,
            "runtime created"
        );
        Ok(Runtime {
            heap: Heap::new(mm),
            gc,
            config,
            builtins: [None; BuiltinObjectId::COUNT],
            atoms: AtomTable::new(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    pub fn retain(&mut self, r: GcRef) {
        gc::retain(&mut self.heap, r);
    }

    /// Drop a reference; returns the number of cells reclaimed
    #[inline]
    pub fn release(&mut self, r: GcRef) -> usize {
        gc::release(&mut self.heap, self.gc.as_mut(), r)
    }

    #[inline]
    pub fn retain_value(&mut self, v: DynValue) {
        if let Some(r) = v.heap_ref() {
            self.retain(r);
        }
    }

    #[inline]
    pub fn release_value(&mut self, v: DynValue) {
        if let Some(r) = v.heap_ref() {
            self.release(r);
        }
    }

    pub fn refcount(&self, r: GcRef) -> u16 {
        self.heap.refcount(r)
    }

    /// Whether a handle still names a live cell
    pub fn is_live(&self, r: GcRef) -> bool {
        self.heap.contains(r)
    }

    pub fn live_cells(&self) -> usize {
        self.heap.live_cells()
    }

    /// Publish a cell charged to `mem`; the caller owns the reference
    pub(crate) fn publish(&mut self, cell: Cell, mem: ArenaPtr) -> GcRef {
        self.heap.publish(self.gc.as_mut(), cell, mem)
    }

    /// Run the cycle collector
    pub fn collect_cycles(&mut self) -> GcStats {
        self.gc.collect_cycles(&mut self.heap)
    }

    /// Containers buffered or tracked by the collector
    pub fn gc_tracked(&self) -> usize {
        self.gc.tracked()
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.heap.mm
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.heap.mm.stats()
    }

    pub fn usage_summary(&self) -> String {
        format!(
            "{}; {} live cells ({} tracked by {})",
            self.heap.mm.usage_summary(),
            self.heap.live_cells(),
            self.gc.tracked(),
            self.gc.kind().name()
        )
    }

    /// Raw block in the application arena
    pub fn allocate_gc(&mut self, size: usize, tag: MemoryTag) -> Result<ArenaPtr, AllocError> {
        self.heap.mm.allocate_gc(size, tag)
    }

    /// Raw block in the VM arena
    pub fn allocate_internal(&mut self, size: usize) -> Result<ArenaPtr, AllocError> {
        self.heap.mm.allocate_internal(size)
    }

    /// Return a block from either arena
    pub fn free(&mut self, ptr: ArenaPtr) {
        self.heap.mm.free(ptr);
    }

    /// The builtin object for `id`, created on first use
    ///
    /// The returned handle is borrowed; the runtime keeps it alive until
    /// teardown.
    pub fn builtin_object(&mut self, id: BuiltinObjectId) -> JsResult<GcRef> {
        if let Some(r) = self.builtins[id as usize] {
            return Ok(r);
        }
        let r = self.materialize_builtin(id)?;
        self.builtins[id as usize] = Some(r);
        Ok(r)
    }

    /// Tear down and report anything still allocated
    ///
    /// Drops the pinned builtins and atoms, collects cycles, and checks that
    /// the application arena is empty.
    pub fn leak_check(mut self) -> Result<(), LeakError> {
        for id in BuiltinObjectId::ALL {
            if let Some(r) = self.builtins[id as usize].take() {
                self.release(r);
            }
        }
        for r in self.atoms.drain() {
            self.release(r);
        }
        self.collect_cycles();

        let stats = self.heap.mm.stats();
        let cells = self.heap.live_cells();
        if stats.app_usage == 0 && cells == 0 {
            return Ok(());
        }
        for (r, entry) in self.heap.iter() {
            tracing::warn!(
                target: "dynjs::gc",
                cell = %r,
                tag = ?entry.header.tag(),
                refcount = entry.header.refcount(),
                "leaked cell"
            );
        }
        Err(LeakError {
            leaked_bytes: stats.app_usage,
            leaked_cells: cells,
        })
    }

    /// Log the slot table and the arena free lists
    #[cfg(feature = "dump")]
    pub fn dump_heap(&self) {
        for (r, entry) in self.heap.iter() {
            tracing::debug!(
                target: "dynjs::gc",
                cell = %r,
                tag = ?entry.header.tag(),
                refcount = entry.header.refcount(),
                offset = entry.mem.offset(),
                chunk = entry.mem.chunk_size(),
                "cell"
            );
        }
        self.heap.mm.dump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcPolicyKind;
    use crate::error::ErrorKind;

    fn runtime(policy: GcPolicyKind) -> Runtime {
        Runtime::new(RuntimeConfig::embedded().with_policy(policy)).unwrap()
    }

    #[test]
    fn test_new_allocates_nothing() {
        let rt = runtime(GcPolicyKind::CycleRoots);
        assert_eq!(rt.live_cells(), 0);
        assert_eq!(rt.memory_stats().app_usage, 0);
        assert_eq!(rt.memory_stats().app_total, 17 * 1024);
    }

    #[test]
    fn test_invalid_config() {
        let err = Runtime::new(RuntimeConfig::embedded().with_app_heap_size(3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_retain_release() {
        let mut rt = runtime(GcPolicyKind::CycleRoots);
        let obj = rt.new_object().unwrap();
        assert_eq!(rt.refcount(obj), 1);
        rt.retain(obj);
        rt.retain_value(DynValue::Object(obj));
        assert_eq!(rt.refcount(obj), 3);
        assert_eq!(rt.release(obj), 0);
        rt.release_value(DynValue::Object(obj));
        assert!(rt.is_live(obj));
        assert_eq!(rt.release(obj), 1);
        assert!(!rt.is_live(obj));
        assert_eq!(rt.memory_stats().app_usage, 0);
    }

    #[test]
    fn test_builtin_object_pinned_once() {
        let mut rt = runtime(GcPolicyKind::MarkSweep);
        let a = rt.builtin_object(BuiltinObjectId::Math).unwrap();
        let b = rt.builtin_object(BuiltinObjectId::Math).unwrap();
        assert_eq!(a, b);
        assert_eq!(rt.refcount(a), 1);
        rt.collect_cycles();
        assert!(rt.is_live(a));
    }

    #[test]
    fn test_leak_check_clean() {
        for policy in [GcPolicyKind::CycleRoots, GcPolicyKind::MarkSweep] {
            let mut rt = runtime(policy);
            let global = rt.builtin_object(BuiltinObjectId::Global).unwrap();
            let obj = rt.new_object().unwrap();
            let key = rt.key("self").unwrap();
            rt.put(obj, key, DynValue::Object(obj), true).unwrap();
            let key = rt.key("g").unwrap();
            rt.put(obj, key, DynValue::Object(global), true).unwrap();
            rt.release(obj);
            assert_eq!(rt.leak_check(), Ok(()));
        }
    }

    #[test]
    fn test_leak_check_reports() {
        let mut rt = runtime(GcPolicyKind::MarkSweep);
        let obj = rt.new_object().unwrap();
        rt.retain(obj);
        let err = rt.leak_check().unwrap_err();
        assert_eq!(err.leaked_cells, 1);
        assert!(err.leaked_bytes > 0);
    }

    #[test]
    fn test_raw_blocks() {
        let mut rt = runtime(GcPolicyKind::CycleRoots);
        let p = rt.allocate_internal(64).unwrap();
        assert!(rt.memory_stats().vm_usage >= 64);
        rt.free(p);
        assert_eq!(rt.memory_stats().vm_usage, 0);

        let p = rt.allocate_gc(16, MemoryTag::Any).unwrap();
        assert!(rt.memory_stats().app_usage > 16);
        rt.free(p);
        assert_eq!(rt.memory_stats().app_usage, 0);
    }

    #[test]
    fn test_usage_summary_names_policy() {
        let rt = runtime(GcPolicyKind::MarkSweep);
        assert!(rt.usage_summary().contains("mark-sweep"));
        assert!(format!("{:?}", rt).contains("MarkSweep"));
    }
}
