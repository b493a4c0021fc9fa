//! Cell headers
//!
//! Every counted cell carries a [`MemHeader`] in its slot. The header holds
//! a saturating 14-bit reference count, the memory tag, the trial-deletion
//! colour bits used by the cycle-root collector, and the list links and
//! scratch count used by mark-and-sweep.

/// Memory block tags
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryTag {
    /// Untyped block
    Any = 0,
    /// Function record
    Function = 1,
    /// Object record
    Object = 2,
    /// String header and body
    String = 3,
    /// Property record
    Prop = 4,
    /// Value array (array elements)
    List = 5,
    /// Environment frame
    Env = 6,
    /// Iterator state
    Iterator = 7,
}

impl MemoryTag {
    pub const COUNT: usize = 8;

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0x7 {
            1 => MemoryTag::Function,
            2 => MemoryTag::Object,
            3 => MemoryTag::String,
            4 => MemoryTag::Prop,
            5 => MemoryTag::List,
            6 => MemoryTag::Env,
            7 => MemoryTag::Iterator,
            _ => MemoryTag::Any,
        }
    }

    /// Cells that may hold counted references and so take part in cycles
    #[inline]
    pub const fn is_container(self) -> bool {
        matches!(self, MemoryTag::Object | MemoryTag::Env | MemoryTag::Iterator)
    }
}

/// Largest representable reference count; a count that reaches it is pinned
pub const UINT14_MAX: u16 = 0x3FFF;

/// Arena bytes charged for a plain header
pub const MALLOCHEADSIZE: usize = 4;

/// Arena bytes charged for a header with list links and a scratch count
pub const MALLOCEXHEADSIZE: usize = 12;

const IS_ROOT: u8 = 1 << 0;
const IS_DECREASED: u8 = 1 << 1;
const NEED_RESTORE: u8 = 1 << 2;
const IS_COLLECTED: u8 = 1 << 3;
const MARKED: u8 = 1 << 4;
const SATURATED_LOGGED: u8 = 1 << 5;

/// Cell header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemHeader {
    refcount: u16,
    tag: MemoryTag,
    flags: u8,
    gc_refs: u16,
    /// Previous cell in the collector's object list
    pub prev: Option<u32>,
    /// Next cell in the collector's object list
    pub next: Option<u32>,
}

impl MemHeader {
    /// A new header owned by its creator
    #[inline]
    pub const fn new(tag: MemoryTag) -> Self {
        MemHeader {
            refcount: 1,
            tag,
            flags: 0,
            gc_refs: 0,
            prev: None,
            next: None,
        }
    }

    #[inline]
    pub const fn tag(&self) -> MemoryTag {
        self.tag
    }

    #[inline]
    pub const fn refcount(&self) -> u16 {
        self.refcount
    }

    #[inline]
    pub const fn is_saturated(&self) -> bool {
        self.refcount == UINT14_MAX
    }

    /// Increment the count. Returns true when this call saturated it.
    #[inline]
    pub fn inc(&mut self) -> bool {
        if self.refcount < UINT14_MAX {
            self.refcount += 1;
            if self.refcount == UINT14_MAX && self.flags & SATURATED_LOGGED == 0 {
                self.flags |= SATURATED_LOGGED;
                return true;
            }
        }
        false
    }

    /// Decrement the count and return the new value
    ///
    /// A saturated count stays pinned. Decrementing a zero count is an
    /// ownership bug and panics.
    #[inline]
    pub fn dec(&mut self) -> u16 {
        assert!(self.refcount > 0, "reference count underflow on {:?} cell", self.tag);
        if self.refcount < UINT14_MAX {
            self.refcount -= 1;
        }
        self.refcount
    }

    /// Trial-deletion decrement; does not respect saturation or zero
    #[inline]
    pub(crate) fn trial_dec(&mut self) {
        if self.refcount > 0 && self.refcount < UINT14_MAX {
            self.refcount -= 1;
        }
    }

    #[inline]
    pub(crate) fn trial_inc(&mut self) {
        if self.refcount < UINT14_MAX {
            self.refcount += 1;
        }
    }

    #[inline]
    fn flag(&self, bit: u8) -> bool {
        self.flags & bit != 0
    }

    #[inline]
    fn set_flag(&mut self, bit: u8, on: bool) {
        if on {
            self.flags |= bit;
        } else {
            self.flags &= !bit;
        }
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.flag(IS_ROOT)
    }

    #[inline]
    pub fn set_root(&mut self, on: bool) {
        self.set_flag(IS_ROOT, on)
    }

    #[inline]
    pub fn is_decreased(&self) -> bool {
        self.flag(IS_DECREASED)
    }

    #[inline]
    pub fn set_decreased(&mut self, on: bool) {
        self.set_flag(IS_DECREASED, on)
    }

    #[inline]
    pub fn need_restore(&self) -> bool {
        self.flag(NEED_RESTORE)
    }

    #[inline]
    pub fn set_need_restore(&mut self, on: bool) {
        self.set_flag(NEED_RESTORE, on)
    }

    #[inline]
    pub fn is_collected(&self) -> bool {
        self.flag(IS_COLLECTED)
    }

    #[inline]
    pub fn set_collected(&mut self, on: bool) {
        self.set_flag(IS_COLLECTED, on)
    }

    #[inline]
    pub fn is_marked(&self) -> bool {
        self.flag(MARKED)
    }

    #[inline]
    pub fn set_marked(&mut self, on: bool) {
        self.set_flag(MARKED, on)
    }

    /// Clear all collector colour bits
    #[inline]
    pub fn reset_colours(&mut self) {
        self.flags &= IS_ROOT | SATURATED_LOGGED;
    }

    #[inline]
    pub const fn gc_refs(&self) -> u16 {
        self.gc_refs
    }

    #[inline]
    pub fn set_gc_refs(&mut self, n: u16) {
        self.gc_refs = n & UINT14_MAX;
    }

    #[inline]
    pub fn dec_gc_refs(&mut self) {
        self.gc_refs = self.gc_refs.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_counts() {
        let mut h = MemHeader::new(MemoryTag::Object);
        assert_eq!(h.refcount(), 1);
        h.inc();
        assert_eq!(h.dec(), 1);
        assert_eq!(h.dec(), 0);
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn test_header_underflow_panics() {
        let mut h = MemHeader::new(MemoryTag::String);
        h.dec();
        h.dec();
    }

    #[test]
    fn test_header_saturation_pins() {
        let mut h = MemHeader::new(MemoryTag::Object);
        let mut saturated = 0;
        for _ in 0..UINT14_MAX as usize + 10 {
            if h.inc() {
                saturated += 1;
            }
        }
        assert_eq!(saturated, 1);
        assert!(h.is_saturated());
        assert_eq!(h.dec(), UINT14_MAX);
        assert_eq!(h.refcount(), UINT14_MAX);
    }

    #[test]
    fn test_colour_bits() {
        let mut h = MemHeader::new(MemoryTag::Env);
        h.set_root(true);
        h.set_decreased(true);
        h.set_marked(true);
        assert!(h.is_root() && h.is_decreased() && h.is_marked());
        h.reset_colours();
        assert!(h.is_root());
        assert!(!h.is_decreased() && !h.is_marked());
        assert!(MemoryTag::Env.is_container());
        assert!(!MemoryTag::String.is_container());
    }
}
