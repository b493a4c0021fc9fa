//! Cell slot table
//!
//! Counted cells live in a slot table and are addressed by
//! generation-checked [`GcRef`] handles. The header sits next to the cell in
//! its slot; the cell's arena block only carries the bytes it charges.

use std::fmt;

use crate::gc::allocator::{ArenaPtr, MemoryManager};
use crate::gc::header::{MemHeader, MemoryTag};
use crate::gc::trace::{Trace, Tracer};
use crate::runtime::env::EnvFrame;
use crate::runtime::iterator::DynIterator;
use crate::runtime::object::DynObject;
use crate::runtime::string::DynString;

/// Handle to a counted cell
///
/// Packs into 48 bits: a 32-bit slot index and a 16-bit generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct GcRef {
    index: u32,
    generation: u16,
}

impl GcRef {
    #[inline]
    pub const fn new(index: u32, generation: u16) -> Self {
        GcRef { index, generation }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u16 {
        self.generation
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.index as u64) << 16) | self.generation as u64
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        GcRef {
            index: (bits >> 16) as u32,
            generation: bits as u16,
        }
    }
}

impl fmt::Display for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// A counted cell
#[derive(Debug)]
pub enum Cell {
    String(DynString),
    Object(DynObject),
    Env(EnvFrame),
    Iterator(DynIterator),
}

impl Cell {
    pub fn tag(&self) -> MemoryTag {
        match self {
            Cell::String(_) => MemoryTag::String,
            Cell::Object(_) => MemoryTag::Object,
            Cell::Env(_) => MemoryTag::Env,
            Cell::Iterator(_) => MemoryTag::Iterator,
        }
    }
}

impl Trace for Cell {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            Cell::String(_) => {}
            Cell::Object(obj) => obj.trace(tracer),
            Cell::Env(env) => env.trace(tracer),
            Cell::Iterator(it) => it.trace(tracer),
        }
    }

    fn finalize(&mut self, heap: &mut Heap) {
        match self {
            Cell::String(_) => {}
            Cell::Object(obj) => obj.finalize(heap),
            Cell::Env(env) => env.finalize(heap),
            Cell::Iterator(it) => it.finalize(heap),
        }
    }
}

/// An occupied slot
#[derive(Debug)]
pub struct Entry {
    pub header: MemHeader,
    /// Arena block charged for the cell record
    pub mem: ArenaPtr,
    pub cell: Cell,
}

#[derive(Debug)]
struct Slot {
    generation: u16,
    entry: Option<Entry>,
}

/// The cell heap
#[derive(Debug)]
pub struct Heap {
    pub(crate) mm: MemoryManager,
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    live: usize,
}

impl Heap {
    pub fn new(mm: MemoryManager) -> Self {
        Heap {
            mm,
            slots: Vec::new(),
            free_slots: Vec::new(),
            live: 0,
        }
    }

    /// Publish a cell. The creator owns the single initial reference.
    pub(crate) fn insert(&mut self, cell: Cell, mem: ArenaPtr) -> GcRef {
        let entry = Entry {
            header: MemHeader::new(cell.tag()),
            mem,
            cell,
        };
        self.live += 1;
        if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return GcRef::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        GcRef::new(index, 0)
    }

    /// Unpublish a cell; its handle becomes stale
    pub(crate) fn remove(&mut self, r: GcRef) -> Entry {
        let slot = &mut self.slots[r.index as usize];
        assert_eq!(slot.generation, r.generation, "stale handle {}", r);
        let Some(entry) = slot.entry.take() else {
            panic!("stale handle {}", r);
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(r.index);
        self.live -= 1;
        entry
    }

    /// Check whether a handle still refers to a live cell
    #[inline]
    pub fn contains(&self, r: GcRef) -> bool {
        self.slots
            .get(r.index as usize)
            .is_some_and(|s| s.generation == r.generation && s.entry.is_some())
    }

    /// The current handle for a slot index, if occupied
    pub(crate) fn ref_at(&self, index: u32) -> Option<GcRef> {
        let slot = self.slots.get(index as usize)?;
        slot.entry.as_ref().map(|_| GcRef::new(index, slot.generation))
    }

    #[inline]
    pub fn entry(&self, r: GcRef) -> &Entry {
        match self.slots.get(r.index as usize) {
            Some(Slot {
                generation,
                entry: Some(entry),
            }) if *generation == r.generation => entry,
            _ => panic!("stale handle {}", r),
        }
    }

    #[inline]
    pub fn entry_mut(&mut self, r: GcRef) -> &mut Entry {
        match self.slots.get_mut(r.index as usize) {
            Some(Slot {
                generation,
                entry: Some(entry),
            }) if *generation == r.generation => entry,
            _ => panic!("stale handle {}", r),
        }
    }

    #[inline]
    pub fn header(&self, r: GcRef) -> &MemHeader {
        &self.entry(r).header
    }

    #[inline]
    pub fn header_mut(&mut self, r: GcRef) -> &mut MemHeader {
        &mut self.entry_mut(r).header
    }

    #[inline]
    pub fn refcount(&self, r: GcRef) -> u16 {
        self.header(r).refcount()
    }

    #[inline]
    pub fn is_container(&self, r: GcRef) -> bool {
        self.header(r).tag().is_container()
    }

    pub fn object(&self, r: GcRef) -> &DynObject {
        match &self.entry(r).cell {
            Cell::Object(obj) => obj,
            other => panic!("{} is a {:?} cell, not an object", r, other.tag()),
        }
    }

    pub fn object_mut(&mut self, r: GcRef) -> &mut DynObject {
        match &mut self.entry_mut(r).cell {
            Cell::Object(obj) => obj,
            other => panic!("{} is a {:?} cell, not an object", r, other.tag()),
        }
    }

    /// An object together with the memory manager, for operations that
    /// allocate or free on the object's behalf
    pub(crate) fn object_and_memory(&mut self, r: GcRef) -> (&mut DynObject, &mut MemoryManager) {
        let Heap { slots, mm, .. } = self;
        let entry = match slots.get_mut(r.index as usize) {
            Some(Slot {
                generation,
                entry: Some(entry),
            }) if *generation == r.generation => entry,
            _ => panic!("stale handle {}", r),
        };
        match &mut entry.cell {
            Cell::Object(obj) => (obj, mm),
            other => panic!("{} is a {:?} cell, not an object", r, other.tag()),
        }
    }

    pub fn string(&self, r: GcRef) -> (&DynString, ArenaPtr) {
        let entry = self.entry(r);
        match &entry.cell {
            Cell::String(s) => (s, entry.mem),
            other => panic!("{} is a {:?} cell, not a string", r, other.tag()),
        }
    }

    pub fn env(&self, r: GcRef) -> (&EnvFrame, ArenaPtr) {
        let entry = self.entry(r);
        match &entry.cell {
            Cell::Env(env) => (env, entry.mem),
            other => panic!("{} is a {:?} cell, not an environment", r, other.tag()),
        }
    }

    pub fn iterator(&self, r: GcRef) -> &DynIterator {
        match &self.entry(r).cell {
            Cell::Iterator(it) => it,
            other => panic!("{} is a {:?} cell, not an iterator", r, other.tag()),
        }
    }

    pub fn iterator_mut(&mut self, r: GcRef) -> &mut DynIterator {
        match &mut self.entry_mut(r).cell {
            Cell::Iterator(it) => it,
            other => panic!("{} is a {:?} cell, not an iterator", r, other.tag()),
        }
    }

    /// Counted references held by a cell
    pub fn children(&self, r: GcRef) -> Vec<GcRef> {
        let mut tracer = Tracer::new(&self.mm);
        self.entry(r).cell.trace(&mut tracer);
        tracer.into_edges()
    }

    /// Counted container cells referenced by a cell
    pub fn container_children(&self, r: GcRef) -> Vec<GcRef> {
        let mut edges = self.children(r);
        edges.retain(|&c| self.is_container(c));
        edges
    }

    /// Number of live cells
    #[inline]
    pub fn live_cells(&self) -> usize {
        self.live
    }

    /// All live cells
    pub fn iter(&self) -> impl Iterator<Item = (GcRef, &Entry)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.entry
                .as_ref()
                .map(|e| (GcRef::new(i as u32, slot.generation), e))
        })
    }

    #[inline]
    pub fn memory(&self) -> &MemoryManager {
        &self.mm
    }

    #[inline]
    pub fn memory_mut(&mut self) -> &mut MemoryManager {
        &mut self.mm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::gc::header::MemoryTag;
    use crate::runtime::string::DynString;

    fn heap() -> Heap {
        Heap::new(MemoryManager::new(&RuntimeConfig::embedded(), false))
    }

    fn string_cell(heap: &mut Heap) -> GcRef {
        let mem = heap.mm.allocate_gc(4, MemoryTag::String).unwrap();
        heap.insert(Cell::String(DynString::ascii(4)), mem)
    }

    #[test]
    fn test_handle_bits() {
        let r = GcRef::new(0xDEAD_BEEF, 0x1234);
        assert_eq!(GcRef::from_bits(r.to_bits()), r);
        assert!(r.to_bits() < 1 << 48);
        assert_eq!(r.to_string(), "#3735928559.4660");
    }

    #[test]
    fn test_insert_and_remove() {
        let mut heap = heap();
        let r = string_cell(&mut heap);
        assert!(heap.contains(r));
        assert_eq!(heap.refcount(r), 1);
        assert_eq!(heap.live_cells(), 1);

        let entry = heap.remove(r);
        heap.mm.free(entry.mem);
        assert!(!heap.contains(r));
        assert_eq!(heap.live_cells(), 0);
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut heap = heap();
        let a = string_cell(&mut heap);
        let entry = heap.remove(a);
        heap.mm.free(entry.mem);
        let b = string_cell(&mut heap);
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(!heap.contains(a));
        assert_eq!(heap.ref_at(a.index()), Some(b));
    }

    #[test]
    #[should_panic(expected = "stale handle")]
    fn test_stale_handle_panics() {
        let mut heap = heap();
        let a = string_cell(&mut heap);
        let entry = heap.remove(a);
        heap.mm.free(entry.mem);
        heap.header(a);
    }
}
