//! Reference counting and cycle collection
//!
//! Every cell is reclaimed the moment its count reaches zero. Reclamation
//! runs off a worklist: the cell leaves the slot table, returns its arena
//! blocks, and its traced children are released in turn.
//!
//! Counting cannot free cycles, so one of two policies backs it:
//! - [`CycleRootCollector`] buffers containers whose count dropped without
//!   reaching zero and runs trial deletion over them:
//!   1. Decrease: subtract every internal edge below the roots
//!   2. Restore: cells still counted from outside get their edges back
//!   3. Collect: cells left at zero become garbage
//!   4. Sweep: garbage is freed; only its leaf children are released since
//!      its edges into survivors were already subtracted
//! - [`MarkSweepCollector`] links every container into a list and computes
//!   `gc_refs` (count minus internal edges) to find external roots, marks
//!   from them, and sweeps the rest.
//!
//! Both run only when [`GcPolicy::collect_cycles`] is called, never while
//! a mutation is in progress.

use crate::config::GcPolicyKind;
use crate::gc::header::MemHeader;
use crate::gc::heap::{GcRef, Heap};
use crate::gc::trace::Trace;

/// Statistics from one cycle collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Live cells before collection
    pub cells_before: usize,
    /// Live cells after collection
    pub cells_after: usize,
    /// Cells freed as cycle garbage (released leaves included)
    pub freed: usize,
    /// Arena bytes returned
    pub bytes_freed: usize,
    /// Candidate roots or tracked containers examined
    pub roots_scanned: usize,
}

/// A cycle collection strategy
///
/// Policies only observe count transitions; the counting itself is done by
/// [`retain`] and [`release`].
pub trait GcPolicy {
    fn kind(&self) -> GcPolicyKind;

    /// Whether container cells are charged the extended header
    fn extended_headers(&self) -> bool {
        false
    }

    /// A cell was published
    fn on_alloc(&mut self, _heap: &mut Heap, _r: GcRef) {}

    /// A container was released and is still referenced
    fn on_release(&mut self, _heap: &mut Heap, _r: GcRef) {}

    /// A cell is about to leave the slot table
    fn on_reclaim(&mut self, _heap: &mut Heap, _r: GcRef) {}

    /// Free unreachable cycles
    fn collect_cycles(&mut self, heap: &mut Heap) -> GcStats;

    /// Containers currently buffered or tracked
    fn tracked(&self) -> usize;
}

/// Build the policy selected by the configuration
pub fn new_policy(kind: GcPolicyKind) -> Box<dyn GcPolicy> {
    match kind {
        GcPolicyKind::CycleRoots => Box::new(CycleRootCollector::new()),
        GcPolicyKind::MarkSweep => Box::new(MarkSweepCollector::new()),
    }
}

/// Add a reference to a cell
pub fn retain(heap: &mut Heap, r: GcRef) {
    let header = heap.header_mut(r);
    if header.inc() {
        tracing::warn!(
            target: "dynjs::gc",
            cell = %r,
            tag = ?header.tag(),
            "reference count saturated; cell will never be freed"
        );
    }
}

/// Drop a reference, reclaiming the cell and anything it alone kept alive
///
/// Returns the number of cells reclaimed.
pub fn release(heap: &mut Heap, policy: &mut dyn GcPolicy, r: GcRef) -> usize {
    let mut work = vec![r];
    let mut freed = 0;
    while let Some(r) = work.pop() {
        let header = heap.header_mut(r);
        let container = header.tag().is_container();
        if header.dec() == 0 {
            let edges = heap.children(r);
            reclaim(heap, policy, r);
            work.extend(edges);
            freed += 1;
        } else if container {
            policy.on_release(heap, r);
        }
    }
    freed
}

/// Remove a cell and return its memory; children are the caller's problem
fn reclaim(heap: &mut Heap, policy: &mut dyn GcPolicy, r: GcRef) -> usize {
    policy.on_reclaim(heap, r);
    let mut entry = heap.remove(r);
    entry.cell.finalize(heap);
    let bytes = entry.mem.chunk_size();
    heap.mm.free(entry.mem);
    tracing::trace!(target: "dynjs::gc", cell = %r, tag = ?entry.header.tag(), "reclaim");
    bytes
}

/// Free a batch of garbage cells
///
/// Edges into other garbage are skipped. Edges into surviving containers
/// are released only when `release_survivors` is set.
fn sweep(
    heap: &mut Heap,
    policy: &mut dyn GcPolicy,
    garbage: &[GcRef],
    is_garbage: fn(&MemHeader) -> bool,
    release_survivors: bool,
    stats: &mut GcStats,
) {
    for &g in garbage {
        if !heap.contains(g) {
            continue;
        }
        let edges = heap.children(g);
        stats.bytes_freed += reclaim(heap, policy, g);
        stats.freed += 1;
        for e in edges {
            if !heap.contains(e) {
                continue;
            }
            let header = heap.header(e);
            if header.tag().is_container() && (is_garbage(header) || !release_survivors) {
                continue;
            }
            stats.freed += release(heap, policy, e);
        }
    }
}

/// Charge the VM arena for a collection's scratch buffers
fn scratch(heap: &mut Heap, entries: usize) -> Option<crate::gc::ArenaPtr> {
    match heap.mm.allocate_internal(entries * 4) {
        Ok(ptr) => Some(ptr),
        Err(err) => {
            tracing::warn!(target: "dynjs::gc", %err, "no vm memory for collector scratch");
            None
        }
    }
}

/// Trial deletion over buffered potential cycle roots
#[derive(Debug, Default)]
pub struct CycleRootCollector {
    roots: Vec<GcRef>,
    stale: usize,
}

impl CycleRootCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn mark_gray(heap: &mut Heap, root: GcRef, touched: &mut Vec<GcRef>) {
        heap.header_mut(root).set_decreased(true);
        touched.push(root);
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            for c in heap.container_children(n) {
                let h = heap.header_mut(c);
                h.trial_dec();
                if !h.is_decreased() {
                    h.set_decreased(true);
                    touched.push(c);
                    stack.push(c);
                }
            }
        }
    }

    fn scan(heap: &mut Heap, root: GcRef) {
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            let h = heap.header(n);
            if !h.is_decreased() || h.need_restore() || h.is_collected() {
                continue;
            }
            if h.refcount() > 0 {
                Self::scan_black(heap, n);
            } else {
                heap.header_mut(n).set_collected(true);
                stack.extend(heap.container_children(n));
            }
        }
    }

    fn scan_black(heap: &mut Heap, n: GcRef) {
        let h = heap.header_mut(n);
        h.set_need_restore(true);
        h.set_collected(false);
        let mut stack = vec![n];
        while let Some(m) = stack.pop() {
            for c in heap.container_children(m) {
                let h = heap.header_mut(c);
                h.trial_inc();
                if !h.need_restore() {
                    h.set_need_restore(true);
                    h.set_collected(false);
                    stack.push(c);
                }
            }
        }
    }

    fn collect_white(heap: &mut Heap, root: GcRef, garbage: &mut Vec<GcRef>) {
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            let h = heap.header_mut(n);
            if !h.is_collected() || h.is_marked() {
                continue;
            }
            h.set_marked(true);
            garbage.push(n);
            stack.extend(heap.container_children(n));
        }
    }
}

impl GcPolicy for CycleRootCollector {
    fn kind(&self) -> GcPolicyKind {
        GcPolicyKind::CycleRoots
    }

    fn on_release(&mut self, heap: &mut Heap, r: GcRef) {
        let h = heap.header_mut(r);
        if !h.is_root() && !h.is_saturated() {
            h.set_root(true);
            self.roots.push(r);
        }
    }

    fn on_reclaim(&mut self, heap: &mut Heap, r: GcRef) {
        if heap.header(r).is_root() {
            self.stale += 1;
            if self.stale > 64 && self.stale * 2 > self.roots.len() {
                self.roots.retain(|&root| root != r && heap.contains(root));
                self.stale = 0;
            }
        }
    }

    fn collect_cycles(&mut self, heap: &mut Heap) -> GcStats {
        let mut stats = GcStats {
            cells_before: heap.live_cells(),
            ..GcStats::default()
        };
        let mut roots = std::mem::take(&mut self.roots);
        self.stale = 0;
        roots.retain(|&r| heap.contains(r));
        for &r in &roots {
            heap.header_mut(r).set_root(false);
        }
        stats.roots_scanned = roots.len();

        // Phase 1: Decrease
        let mut touched = Vec::new();
        for &r in &roots {
            if !heap.header(r).is_decreased() {
                Self::mark_gray(heap, r, &mut touched);
            }
        }
        let scratch = scratch(heap, touched.len());

        // Phase 2: Restore
        for &r in &roots {
            Self::scan(heap, r);
        }

        // Phase 3: Collect
        let mut garbage = Vec::new();
        for &r in &roots {
            Self::collect_white(heap, r, &mut garbage);
        }

        // Phase 4: Sweep
        sweep(heap, self, &garbage, MemHeader::is_collected, false, &mut stats);

        // Phase 5: Reset
        for r in touched {
            if heap.contains(r) {
                heap.header_mut(r).reset_colours();
            }
        }
        if let Some(ptr) = scratch {
            heap.mm.free(ptr);
        }

        stats.cells_after = heap.live_cells();
        tracing::debug!(
            target: "dynjs::gc",
            policy = "cycle-roots",
            roots = stats.roots_scanned,
            freed = stats.freed,
            bytes = stats.bytes_freed,
            "collected cycles"
        );
        stats
    }

    fn tracked(&self) -> usize {
        self.roots.len() - self.stale.min(self.roots.len())
    }
}

/// Mark-and-sweep over an intrusive list of every container cell
#[derive(Debug, Default)]
pub struct MarkSweepCollector {
    head: Option<u32>,
    len: usize,
}

impl MarkSweepCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Containers in list order
    fn objects(&self, heap: &Heap) -> Vec<GcRef> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let Some(r) = heap.ref_at(index) else {
                break;
            };
            out.push(r);
            cursor = heap.header(r).next;
        }
        out
    }

    fn mark_from(heap: &mut Heap, root: GcRef) {
        heap.header_mut(root).set_marked(true);
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            for c in heap.container_children(n) {
                let h = heap.header_mut(c);
                if !h.is_marked() {
                    h.set_marked(true);
                    stack.push(c);
                }
            }
        }
    }
}

impl GcPolicy for MarkSweepCollector {
    fn kind(&self) -> GcPolicyKind {
        GcPolicyKind::MarkSweep
    }

    fn extended_headers(&self) -> bool {
        true
    }

    fn on_alloc(&mut self, heap: &mut Heap, r: GcRef) {
        if !heap.is_container(r) {
            return;
        }
        if let Some(old) = self.head.and_then(|i| heap.ref_at(i)) {
            heap.header_mut(old).prev = Some(r.index());
        }
        let h = heap.header_mut(r);
        h.next = self.head;
        h.prev = None;
        self.head = Some(r.index());
        self.len += 1;
    }

    fn on_reclaim(&mut self, heap: &mut Heap, r: GcRef) {
        if !heap.is_container(r) {
            return;
        }
        let (prev, next) = {
            let h = heap.header(r);
            (h.prev, h.next)
        };
        match prev.and_then(|i| heap.ref_at(i)) {
            Some(p) => heap.header_mut(p).next = next,
            None => self.head = next,
        }
        if let Some(n) = next.and_then(|i| heap.ref_at(i)) {
            heap.header_mut(n).prev = prev;
        }
        self.len -= 1;
    }

    fn collect_cycles(&mut self, heap: &mut Heap) -> GcStats {
        let mut stats = GcStats {
            cells_before: heap.live_cells(),
            ..GcStats::default()
        };
        let objects = self.objects(heap);
        stats.roots_scanned = objects.len();
        let scratch = scratch(heap, objects.len());

        // Phase 1: Copy counts
        for &r in &objects {
            let h = heap.header_mut(r);
            let rc = h.refcount();
            h.set_gc_refs(rc);
        }

        // Phase 2: Subtract internal edges
        for &r in &objects {
            for c in heap.container_children(r) {
                heap.header_mut(c).dec_gc_refs();
            }
        }

        // Phase 3: Mark from external roots
        for &r in &objects {
            let h = heap.header(r);
            if h.gc_refs() > 0 && !h.is_marked() {
                Self::mark_from(heap, r);
            }
        }

        // Phase 4: Sweep
        let garbage: Vec<GcRef> = objects
            .iter()
            .copied()
            .filter(|&r| !heap.header(r).is_marked())
            .collect();
        sweep(heap, self, &garbage, |h| !h.is_marked(), true, &mut stats);

        // Phase 5: Clear marks
        for &r in &objects {
            if heap.contains(r) {
                let h = heap.header_mut(r);
                h.set_marked(false);
                h.set_gc_refs(0);
            }
        }
        if let Some(ptr) = scratch {
            heap.mm.free(ptr);
        }

        stats.cells_after = heap.live_cells();
        tracing::debug!(
            target: "dynjs::gc",
            policy = "mark-sweep",
            tracked = stats.roots_scanned,
            freed = stats.freed,
            bytes = stats.bytes_freed,
            "collected cycles"
        );
        stats
    }

    fn tracked(&self) -> usize {
        self.len
    }
}
