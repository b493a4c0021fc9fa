//! Two-arena size-class allocator
//!
//! Memory layout of one arena:
//! ```text
//! +------------------+  <- 0
//! |  small region    |  bump allocated, exact-size free lists
//! |       ...        |  <- small_offset
//! +------------------+  <- small_size == big_base
//! |  big region      |  bump allocated, coalescing first-fit free list
//! |       ...        |  <- big_offset
//! +------------------+  <- total_size
//! ```
//!
//! The application arena holds reference-counted cells and splits at half
//! its size. The VM arena holds runtime bookkeeping and is never scanned by
//! the collector. All chunk sizes are 4-byte aligned. Each application
//! allocation starts with a header word recording its tag and chunk size.

use thiserror::Error;

use crate::config::RuntimeConfig;
use crate::gc::header::{MALLOCEXHEADSIZE, MALLOCHEADSIZE, MemoryTag};
use crate::value::{DynValue, RawValue};

/// Number of free-list buckets
pub const MEMHASHTABLESIZE: usize = 0x100;

/// Bucket holding every chunk too big for an exact-size bucket
const BIG_BUCKET: usize = MEMHASHTABLESIZE - 1;

/// Smallest chunk served from the big region
pub const BIG_CHUNK_SIZE: usize = MEMHASHTABLESIZE * 4;

/// Round up to a 4-byte boundary
#[inline]
pub const fn bytes4_align(size: usize) -> usize {
    (size + 3) & !3
}

/// Allocation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("application heap exhausted allocating {requested} bytes")]
    AppHeapExhausted { requested: usize },

    #[error("vm heap exhausted allocating {requested} bytes")]
    VmHeapExhausted { requested: usize },
}

/// A free byte range within an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryChunk {
    pub offset: u32,
    pub size: u32,
}

impl MemoryChunk {
    #[inline]
    pub const fn end(&self) -> u32 {
        self.offset + self.size
    }
}

/// Size-class free lists
///
/// Bucket `size / 4 - 1` holds chunks of exactly that size and is used
/// LIFO. The last bucket holds all larger chunks sorted by offset so that
/// neighbours can be merged.
#[derive(Debug)]
pub struct MemoryHash {
    buckets: Vec<Vec<MemoryChunk>>,
    free_bytes: usize,
}

impl MemoryHash {
    pub fn new() -> Self {
        MemoryHash {
            buckets: vec![Vec::new(); MEMHASHTABLESIZE],
            free_bytes: 0,
        }
    }

    #[inline]
    fn bucket_of(size: usize) -> usize {
        let index = size >> 2;
        if (1..MEMHASHTABLESIZE).contains(&index) {
            index - 1
        } else {
            BIG_BUCKET
        }
    }

    /// Add a free chunk
    pub fn put(&mut self, chunk: MemoryChunk) {
        self.free_bytes += chunk.size as usize;
        let bucket = Self::bucket_of(chunk.size as usize);
        if bucket != BIG_BUCKET {
            self.buckets[bucket].push(chunk);
            return;
        }
        let list = &mut self.buckets[BIG_BUCKET];
        let at = list.partition_point(|c| c.offset < chunk.offset);
        list.insert(at, chunk);
    }

    /// Take a chunk of exactly `size` bytes, returning its offset
    ///
    /// Small sizes pop their exact bucket. Big sizes take the first chunk
    /// that fits, splitting off the remainder in place.
    pub fn take(&mut self, size: usize) -> Option<u32> {
        let bucket = Self::bucket_of(size);
        if bucket != BIG_BUCKET {
            let chunk = self.buckets[bucket].pop()?;
            self.free_bytes -= chunk.size as usize;
            return Some(chunk.offset);
        }

        let list = &mut self.buckets[BIG_BUCKET];
        let pos = list.iter().position(|c| c.size as usize >= size)?;
        let chunk = list[pos];
        if chunk.size as usize == size {
            list.remove(pos);
        } else {
            // Remainder keeps its position: its offset only grew
            list[pos] = MemoryChunk {
                offset: chunk.offset + size as u32,
                size: chunk.size - size as u32,
            };
        }
        self.free_bytes -= size;
        Some(chunk.offset)
    }

    /// Coalesce adjacent big chunks, returning how many merges happened
    ///
    /// Overlapping chunks mean a block was freed twice; that panics.
    pub fn merge_big_free_chunks(&mut self) -> usize {
        let list = &mut self.buckets[BIG_BUCKET];
        if list.len() < 2 {
            return 0;
        }
        let mut merged: Vec<MemoryChunk> = Vec::with_capacity(list.len());
        let mut merges = 0;
        for chunk in list.drain(..) {
            match merged.last_mut() {
                Some(last) if last.end() == chunk.offset => {
                    last.size += chunk.size;
                    merges += 1;
                }
                Some(last) if last.end() > chunk.offset => {
                    panic!("overlapping free chunks {:?} and {:?}", last, chunk);
                }
                _ => merged.push(chunk),
            }
        }
        *list = merged;
        merges
    }

    /// Number of free chunks across all buckets
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    #[inline]
    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    /// Chunks in the big bucket, sorted by offset
    pub fn big_chunks(&self) -> &[MemoryChunk] {
        &self.buckets[BIG_BUCKET]
    }

    /// Check that no two free chunks overlap
    pub fn verify(&self) {
        let mut all: Vec<MemoryChunk> = self.buckets.iter().flatten().copied().collect();
        all.sort_by_key(|c| c.offset);
        for pair in all.windows(2) {
            assert!(
                pair[0].end() <= pair[1].offset,
                "overlapping free chunks {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }
}

impl Default for MemoryHash {
    fn default() -> Self {
        Self::new()
    }
}

/// Which arena a block came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArenaKind {
    App,
    Vm,
}

/// One arena with its small and big regions
#[derive(Debug)]
pub struct Arena {
    kind: ArenaKind,
    buffer: Vec<u8>,
    small_size: usize,
    small_offset: usize,
    big_base: usize,
    big_offset: usize,
    growth: usize,
    free: MemoryHash,
}

impl Arena {
    fn new(kind: ArenaKind, total_size: usize, small_size: usize, growth: usize) -> Self {
        Arena {
            kind,
            buffer: vec![0u8; total_size],
            small_size,
            small_offset: 0,
            big_base: small_size,
            big_offset: small_size,
            growth,
            free: MemoryHash::new(),
        }
    }

    #[inline]
    pub fn total_size(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn small_size(&self) -> usize {
        self.small_size
    }

    #[inline]
    pub fn small_offset(&self) -> usize {
        self.small_offset
    }

    #[inline]
    pub fn big_base(&self) -> usize {
        self.big_base
    }

    #[inline]
    pub fn big_offset(&self) -> usize {
        self.big_offset
    }

    /// Bytes between region starts and frontiers
    #[inline]
    pub fn frontier_usage(&self) -> usize {
        self.small_offset + (self.big_offset - self.big_base)
    }

    pub fn free_list(&self) -> &MemoryHash {
        &self.free
    }

    /// Allocate a zero-filled chunk of `size` bytes (already aligned)
    fn malloc(&mut self, size: usize) -> Option<usize> {
        let offset = self.take_or_bump(size)?;
        self.buffer[offset..offset + size].fill(0);
        Some(offset)
    }

    fn take_or_bump(&mut self, size: usize) -> Option<usize> {
        if let Some(offset) = self.free.take(size) {
            return Some(offset as usize);
        }

        if size >= BIG_CHUNK_SIZE {
            // Coalesce before touching the frontier
            if self.free.merge_big_free_chunks() > 0 {
                if let Some(offset) = self.free.take(size) {
                    return Some(offset as usize);
                }
            }
            if self.big_offset + size > self.total_size() {
                return None;
            }
            let offset = self.big_offset;
            self.big_offset += size;
            return Some(offset);
        }

        if self.small_offset + size > self.small_size {
            // Grow the small region while the big region is still untouched
            if self.growth == 0
                || self.big_offset != self.big_base
                || self.big_base + self.growth >= self.total_size()
            {
                return None;
            }
            self.small_size += self.growth;
            self.big_base += self.growth;
            self.big_offset = self.big_base;
            tracing::info!(
                target: "dynjs::alloc",
                arena = ?self.kind,
                small_size = self.small_size,
                "grew small region"
            );
            if self.small_offset + size > self.small_size {
                return None;
            }
        }
        let offset = self.small_offset;
        self.small_offset += size;
        Some(offset)
    }

    fn release(&mut self, offset: usize, size: usize) {
        debug_assert!(offset + size <= self.total_size());
        self.free.put(MemoryChunk {
            offset: offset as u32,
            size: size as u32,
        });
        #[cfg(feature = "debug-gc")]
        self.free.verify();
    }
}

/// A live allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaPtr {
    arena: ArenaKind,
    tag: MemoryTag,
    head: u8,
    offset: u32,
    chunk: u32,
}

impl ArenaPtr {
    #[inline]
    pub const fn arena(&self) -> ArenaKind {
        self.arena
    }

    #[inline]
    pub const fn tag(&self) -> MemoryTag {
        self.tag
    }

    /// Offset of the chunk (header included) within its arena
    #[inline]
    pub const fn offset(&self) -> usize {
        self.offset as usize
    }

    /// Bytes charged for this allocation, header included
    #[inline]
    pub const fn chunk_size(&self) -> usize {
        self.chunk as usize
    }

    /// Usable bytes after the header
    #[inline]
    pub const fn payload_size(&self) -> usize {
        (self.chunk - self.head as u32) as usize
    }

    #[inline]
    fn payload_range(&self) -> std::ops::Range<usize> {
        let start = self.offset as usize + self.head as usize;
        start..self.offset as usize + self.chunk as usize
    }
}

/// Allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Size of the application arena
    pub app_total: usize,
    /// Bytes currently allocated in the application arena
    pub app_usage: usize,
    /// High-water mark of `app_usage`
    pub app_peak: usize,
    /// Total bytes ever allocated in the application arena
    pub app_allocated: usize,
    /// Total bytes ever returned to the application arena
    pub app_released: usize,
    /// Application small-region frontier
    pub app_small_offset: usize,
    /// Application big-region frontier
    pub app_big_offset: usize,
    /// Size of the VM arena
    pub vm_total: usize,
    /// Bytes currently allocated in the VM arena
    pub vm_usage: usize,
    /// VM frontier usage across both regions
    pub vm_frontier: usize,
    /// Free chunks waiting for reuse across both arenas
    pub free_chunks: usize,
}

/// Memory manager owning both arenas
#[derive(Debug)]
pub struct MemoryManager {
    app: Arena,
    vm: Arena,
    extended_headers: bool,
    stats: MemoryStats,
}

impl MemoryManager {
    /// Create both arenas
    ///
    /// `extended_headers` charges container cells the larger header used by
    /// the mark-and-sweep collector.
    pub fn new(config: &RuntimeConfig, extended_headers: bool) -> Self {
        let app_small = (config.app_heap_size / 2) & !3;
        MemoryManager {
            app: Arena::new(
                ArenaKind::App,
                config.app_heap_size,
                app_small,
                config.small_region_growth,
            ),
            vm: Arena::new(ArenaKind::Vm, config.vm_heap_size, config.vm_small_size, 0),
            extended_headers,
            stats: MemoryStats {
                app_total: config.app_heap_size,
                vm_total: config.vm_heap_size,
                ..MemoryStats::default()
            },
        }
    }

    /// Header bytes charged for a block with this tag
    #[inline]
    pub fn header_size(&self, tag: MemoryTag) -> usize {
        if self.extended_headers && tag.is_container() {
            MALLOCEXHEADSIZE
        } else {
            MALLOCHEADSIZE
        }
    }

    /// Allocate a zero-filled block in the application arena
    pub fn allocate_gc(&mut self, size: usize, tag: MemoryTag) -> Result<ArenaPtr, AllocError> {
        let head = self.header_size(tag);
        let chunk = bytes4_align(size) + head;
        let offset = self
            .app
            .malloc(chunk)
            .ok_or(AllocError::AppHeapExhausted { requested: size })?;

        // Header word: tag in the low 3 bits, chunk size above
        let word = (tag as u32) | ((chunk as u32) << 3);
        self.app.buffer[offset..offset + 4].copy_from_slice(&word.to_le_bytes());

        self.stats.app_usage += chunk;
        self.stats.app_allocated += chunk;
        self.stats.app_peak = self.stats.app_peak.max(self.stats.app_usage);
        tracing::trace!(target: "dynjs::alloc", ?tag, offset, chunk, "allocate");

        Ok(ArenaPtr {
            arena: ArenaKind::App,
            tag,
            head: head as u8,
            offset: offset as u32,
            chunk: chunk as u32,
        })
    }

    /// Allocate a zero-filled block in the VM arena
    pub fn allocate_internal(&mut self, size: usize) -> Result<ArenaPtr, AllocError> {
        let chunk = bytes4_align(size).max(4);
        let offset = self
            .vm
            .malloc(chunk)
            .ok_or(AllocError::VmHeapExhausted { requested: size })?;
        self.stats.vm_usage += chunk;
        tracing::trace!(target: "dynjs::alloc", offset, chunk, "allocate internal");
        Ok(ArenaPtr {
            arena: ArenaKind::Vm,
            tag: MemoryTag::Any,
            head: 0,
            offset: offset as u32,
            chunk: chunk as u32,
        })
    }

    /// Return a block to its arena's free lists
    pub fn free(&mut self, ptr: ArenaPtr) {
        let (offset, chunk) = (ptr.offset(), ptr.chunk_size());
        match ptr.arena {
            ArenaKind::App => {
                self.stats.app_usage -= chunk;
                self.stats.app_released += chunk;
                self.app.release(offset, chunk);
            }
            ArenaKind::Vm => {
                self.stats.vm_usage -= chunk;
                self.vm.release(offset, chunk);
            }
        }
        tracing::trace!(target: "dynjs::alloc", tag = ?ptr.tag, offset, chunk, "free");
    }

    /// Move a block to a fresh allocation of `new_size` payload bytes
    ///
    /// Never grows in place. The common prefix is copied and any growth is
    /// zero-filled.
    pub fn realloc(&mut self, ptr: ArenaPtr, new_size: usize) -> Result<ArenaPtr, AllocError> {
        let new_ptr = match ptr.arena {
            ArenaKind::App => self.allocate_gc(new_size, ptr.tag)?,
            ArenaKind::Vm => self.allocate_internal(new_size)?,
        };
        let copy = ptr.payload_size().min(new_ptr.payload_size());
        let src = ptr.payload_range().start;
        let dst = new_ptr.payload_range().start;
        let arena = self.arena_mut(ptr.arena);
        arena.buffer.copy_within(src..src + copy, dst);
        self.free(ptr);
        Ok(new_ptr)
    }

    #[inline]
    fn arena_ref(&self, kind: ArenaKind) -> &Arena {
        match kind {
            ArenaKind::App => &self.app,
            ArenaKind::Vm => &self.vm,
        }
    }

    #[inline]
    fn arena_mut(&mut self, kind: ArenaKind) -> &mut Arena {
        match kind {
            ArenaKind::App => &mut self.app,
            ArenaKind::Vm => &mut self.vm,
        }
    }

    /// Payload bytes of a block
    pub fn bytes(&self, ptr: ArenaPtr) -> &[u8] {
        &self.arena_ref(ptr.arena).buffer[ptr.payload_range()]
    }

    pub fn bytes_mut(&mut self, ptr: ArenaPtr) -> &mut [u8] {
        let range = ptr.payload_range();
        &mut self.arena_mut(ptr.arena).buffer[range]
    }

    /// Read the tag recorded in an application block's header word
    pub fn header_tag(&self, ptr: ArenaPtr) -> MemoryTag {
        let off = ptr.offset();
        let buf = &self.arena_ref(ptr.arena).buffer;
        let word = u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
        MemoryTag::from_bits(word)
    }

    /// Read the `index`th packed value of a value-array block
    #[inline]
    pub fn read_value(&self, ptr: ArenaPtr, index: usize) -> DynValue {
        let bytes = self.bytes(ptr);
        let at = index * 8;
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[at..at + 8]);
        RawValue(u64::from_le_bytes(word)).decode()
    }

    /// Store a packed value into a value-array block
    #[inline]
    pub fn write_value(&mut self, ptr: ArenaPtr, index: usize, value: DynValue) {
        let at = index * 8;
        let word = value.encode().0.to_le_bytes();
        self.bytes_mut(ptr)[at..at + 8].copy_from_slice(&word);
    }

    pub fn app_arena(&self) -> &Arena {
        &self.app
    }

    pub fn vm_arena(&self) -> &Arena {
        &self.vm
    }

    /// Current counters
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            app_small_offset: self.app.small_offset,
            app_big_offset: self.app.big_offset,
            vm_frontier: self.vm.frontier_usage(),
            free_chunks: self.app.free.len() + self.vm.free.len(),
            ..self.stats
        }
    }

    /// Human readable usage report
    pub fn usage_summary(&self) -> String {
        let s = self.stats();
        format!(
            "app: {} / {} bytes in use (peak {}, allocated {}, released {}), \
             small frontier {}, big frontier {}; vm: {} / {} bytes in use, frontier {}; \
             {} free chunks",
            s.app_usage,
            s.app_total,
            s.app_peak,
            s.app_allocated,
            s.app_released,
            s.app_small_offset,
            s.app_big_offset,
            s.vm_usage,
            s.vm_total,
            s.vm_frontier,
            s.free_chunks
        )
    }

    /// Check both free lists for overlapping chunks
    pub fn verify(&self) {
        self.app.free.verify();
        self.vm.free.verify();
    }

    #[cfg(feature = "dump")]
    pub fn dump(&self) {
        for (name, arena) in [("app", &self.app), ("vm", &self.vm)] {
            tracing::debug!(
                target: "dynjs::alloc",
                arena = name,
                small_offset = arena.small_offset,
                small_size = arena.small_size,
                big_offset = arena.big_offset,
                free_chunks = arena.free.len(),
                free_bytes = arena.free.free_bytes(),
                big = ?arena.free.big_chunks(),
                "arena"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> MemoryManager {
        let config = RuntimeConfig::default()
            .with_app_heap_size(64 * 1024)
            .with_vm_heap_size(64 * 1024, 16 * 1024);
        MemoryManager::new(&config, false)
    }

    #[test]
    fn test_align() {
        assert_eq!(bytes4_align(0), 0);
        assert_eq!(bytes4_align(1), 4);
        assert_eq!(bytes4_align(8), 8);
        assert_eq!(bytes4_align(13), 16);
    }

    #[test]
    fn test_alloc() {
        let mut mm = manager();
        let ptr = mm.allocate_gc(10, MemoryTag::String).unwrap();
        assert_eq!(ptr.chunk_size(), 12 + MALLOCHEADSIZE);
        assert_eq!(ptr.payload_size(), 12);
        assert_eq!(mm.header_tag(ptr), MemoryTag::String);
        assert_eq!(mm.stats().app_usage, 16);
        assert!(mm.bytes(ptr).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_extended_headers() {
        let config = RuntimeConfig::default();
        let mm = MemoryManager::new(&config, true);
        assert_eq!(mm.header_size(MemoryTag::Object), MALLOCEXHEADSIZE);
        assert_eq!(mm.header_size(MemoryTag::String), MALLOCHEADSIZE);
    }

    #[test]
    fn test_small_chunk_reuse_is_lifo() {
        let mut mm = manager();
        let a = mm.allocate_gc(16, MemoryTag::Prop).unwrap();
        let b = mm.allocate_gc(16, MemoryTag::Prop).unwrap();
        let frontier = mm.app_arena().small_offset();
        mm.free(a);
        mm.free(b);
        let c = mm.allocate_gc(16, MemoryTag::Prop).unwrap();
        assert_eq!(c.offset(), b.offset());
        let d = mm.allocate_gc(16, MemoryTag::Prop).unwrap();
        assert_eq!(d.offset(), a.offset());
        assert_eq!(mm.app_arena().small_offset(), frontier);
    }

    #[test]
    fn test_reuse_zero_fills() {
        let mut mm = manager();
        let a = mm.allocate_gc(8, MemoryTag::Any).unwrap();
        mm.bytes_mut(a).copy_from_slice(&[0xAB; 8]);
        mm.free(a);
        let b = mm.allocate_gc(8, MemoryTag::Any).unwrap();
        assert_eq!(a.offset(), b.offset());
        assert!(mm.bytes(b).iter().all(|&x| x == 0));
    }

    #[test]
    fn test_big_coalescing_keeps_frontier() {
        let mut mm = manager();
        let a = mm.allocate_gc(2048, MemoryTag::List).unwrap();
        let b = mm.allocate_gc(2048, MemoryTag::List).unwrap();
        let _c = mm.allocate_gc(2048, MemoryTag::List).unwrap();
        let frontier = mm.app_arena().big_offset();

        mm.free(a);
        mm.free(b);
        let combined = a.chunk_size() + b.chunk_size();
        let d = mm.allocate_gc(combined - MALLOCHEADSIZE, MemoryTag::List).unwrap();

        assert_eq!(d.offset(), a.offset());
        assert_eq!(d.chunk_size(), combined);
        assert_eq!(mm.app_arena().big_offset(), frontier);
        assert!(mm.app_arena().free_list().big_chunks().is_empty());
    }

    #[test]
    fn test_big_first_fit_splits() {
        let mut mm = manager();
        let a = mm.allocate_internal(4096).unwrap();
        let _guard = mm.allocate_internal(1024).unwrap();
        mm.free(a);
        let b = mm.allocate_internal(1024).unwrap();
        assert_eq!(b.offset(), a.offset());
        let rest = mm.vm_arena().free_list().big_chunks();
        assert_eq!(rest, &[MemoryChunk { offset: (a.offset() + 1024) as u32, size: 3072 }]);
    }

    #[test]
    #[should_panic(expected = "overlapping")]
    fn test_double_free_detected_on_merge() {
        let mut hash = MemoryHash::new();
        hash.put(MemoryChunk { offset: 4096, size: 2048 });
        hash.put(MemoryChunk { offset: 4096, size: 2048 });
        hash.merge_big_free_chunks();
    }

    #[test]
    fn test_bucket_layout() {
        let mut hash = MemoryHash::new();
        hash.put(MemoryChunk { offset: 0, size: 8 });
        hash.put(MemoryChunk { offset: 64, size: 1020 });
        hash.put(MemoryChunk { offset: 9000, size: 1024 });
        hash.put(MemoryChunk { offset: 5000, size: 4000 });
        assert_eq!(hash.len(), 4);
        assert_eq!(hash.free_bytes(), 8 + 1020 + 1024 + 4000);
        assert_eq!(hash.big_chunks()[0].offset, 5000);
        assert_eq!(hash.take(12), None);
        assert_eq!(hash.take(1020), Some(64));
        assert_eq!(hash.take(1024), Some(5000));
    }

    #[test]
    fn test_realloc_copies_and_frees() {
        let mut mm = manager();
        let a = mm.allocate_gc(8, MemoryTag::List).unwrap();
        mm.bytes_mut(a).copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let b = mm.realloc(a, 16).unwrap();
        assert_ne!(a.offset(), b.offset());
        assert_eq!(&mm.bytes(b)[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(mm.bytes(b)[8..].iter().all(|&x| x == 0));
        assert_eq!(mm.stats().app_usage, b.chunk_size());
    }

    #[test]
    fn test_values_round_trip_through_arena() {
        let mut mm = manager();
        let block = mm.allocate_gc(24, MemoryTag::List).unwrap();
        mm.write_value(block, 0, DynValue::Int32(3));
        mm.write_value(block, 2, DynValue::Double(-0.0));
        assert_eq!(mm.read_value(block, 0), DynValue::Int32(3));
        assert!(mm.read_value(block, 2).is_negative_zero());
    }

    #[test]
    fn test_out_of_memory() {
        let mut mm = manager();
        let err = mm.allocate_gc(1 << 20, MemoryTag::Any).unwrap_err();
        assert_eq!(err, AllocError::AppHeapExhausted { requested: 1 << 20 });
        assert!(mm.allocate_internal(1 << 20).is_err());
    }

    #[test]
    fn test_small_region_growth() {
        let config = RuntimeConfig::default()
            .with_app_heap_size(4 * 1024 * 1024)
            .with_vm_heap_size(64 * 1024, 16 * 1024);
        let mut mm = MemoryManager::new(&config, false);
        let half = mm.app_arena().small_size();
        let mut total = 0;
        while total <= half {
            mm.allocate_gc(1000, MemoryTag::Any).unwrap();
            total += 1004;
        }
        assert_eq!(mm.app_arena().small_size(), half + 1024 * 1024);
        assert_eq!(mm.app_arena().big_base(), mm.app_arena().small_size());
    }

    #[test]
    fn test_usage_summary_mentions_counters() {
        let mut mm = manager();
        mm.allocate_gc(100, MemoryTag::Any).unwrap();
        let summary = mm.usage_summary();
        assert!(summary.contains("104 / 65536"));
    }
}
