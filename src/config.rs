//! Runtime configuration
//!
//! Arena sizes and the cycle collection policy are fixed when a
//! [`Runtime`](crate::Runtime) is created.

use crate::error::{JsResult, RuntimeError};

/// Which cycle collector backs reference counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcPolicyKind {
    /// Buffer potential cycle roots on release and run trial deletion over them
    #[default]
    CycleRoots,
    /// Track every container cell in a list and run a mark-and-sweep pass
    MarkSweep,
}

impl GcPolicyKind {
    pub fn name(self) -> &'static str {
        match self {
            GcPolicyKind::CycleRoots => "cycle-roots",
            GcPolicyKind::MarkSweep => "mark-sweep",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "cycle-roots" | "roots" | "a" => Some(GcPolicyKind::CycleRoots),
            "mark-sweep" | "marksweep" | "b" => Some(GcPolicyKind::MarkSweep),
            _ => None,
        }
    }
}

/// One mebibyte
pub const MIB: usize = 1024 * 1024;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Size of the application arena (reference-counted cells)
    pub app_heap_size: usize,
    /// Size of the VM-internal arena
    pub vm_heap_size: usize,
    /// Small region of the VM-internal arena; the big region follows it
    pub vm_small_size: usize,
    /// Cycle collection policy
    pub gc_policy: GcPolicyKind,
    /// Step by which the application small region may grow into an unused big region
    pub small_region_growth: usize,
    /// Longest prototype chain a lookup will follow
    pub max_proto_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            app_heap_size: 8 * MIB,
            vm_heap_size: 8 * MIB,
            vm_small_size: 2 * MIB,
            gc_policy: GcPolicyKind::default(),
            small_region_growth: MIB,
            max_proto_depth: 10_000,
        }
    }
}

impl RuntimeConfig {
    /// Sizes for small embedded targets
    pub fn embedded() -> Self {
        RuntimeConfig {
            app_heap_size: 17 * 1024,
            vm_heap_size: 32 * 1024,
            vm_small_size: 8 * 1024,
            ..RuntimeConfig::default()
        }
    }

    pub fn with_policy(mut self, policy: GcPolicyKind) -> Self {
        self.gc_policy = policy;
        self
    }

    pub fn with_app_heap_size(mut self, size: usize) -> Self {
        self.app_heap_size = size;
        self
    }

    pub fn with_vm_heap_size(mut self, size: usize, small: usize) -> Self {
        self.vm_heap_size = size;
        self.vm_small_size = small;
        self
    }

    /// Check sizes before any arena is built
    pub fn validate(&self) -> JsResult<()> {
        if self.app_heap_size == 0 || self.app_heap_size % 4 != 0 {
            return Err(RuntimeError::Config(format!(
                "application heap size {} must be a non-zero multiple of 4",
                self.app_heap_size
            )));
        }
        if self.vm_heap_size == 0 || self.vm_heap_size % 4 != 0 {
            return Err(RuntimeError::Config(format!(
                "vm heap size {} must be a non-zero multiple of 4",
                self.vm_heap_size
            )));
        }
        if self.vm_small_size == 0
            || self.vm_small_size % 4 != 0
            || self.vm_small_size >= self.vm_heap_size
        {
            return Err(RuntimeError::Config(format!(
                "vm small region {} must be aligned and smaller than the vm heap {}",
                self.vm_small_size, self.vm_heap_size
            )));
        }
        if self.app_heap_size > u32::MAX as usize || self.vm_heap_size > u32::MAX as usize {
            return Err(RuntimeError::Config("arenas are limited to 4 GiB".into()));
        }
        if self.small_region_growth % 4 != 0 {
            return Err(RuntimeError::Config(
                "small region growth must be a multiple of 4".into(),
            ));
        }
        if self.max_proto_depth == 0 {
            return Err(RuntimeError::Config("prototype depth must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(RuntimeConfig::default().validate().is_ok());
        assert!(RuntimeConfig::embedded().validate().is_ok());
        assert_eq!(RuntimeConfig::embedded().app_heap_size, 17 * 1024);
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(RuntimeConfig::default().with_app_heap_size(0).validate().is_err());
        assert!(RuntimeConfig::default().with_app_heap_size(1022).validate().is_err());
        assert!(
            RuntimeConfig::default()
                .with_vm_heap_size(4096, 4096)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_policy_names() {
        assert_eq!(GcPolicyKind::parse("mark-sweep"), Some(GcPolicyKind::MarkSweep));
        assert_eq!(GcPolicyKind::parse(GcPolicyKind::CycleRoots.name()), Some(GcPolicyKind::CycleRoots));
        assert_eq!(GcPolicyKind::parse("refcount"), None);
    }
}
