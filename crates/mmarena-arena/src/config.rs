//! Arena configuration parameters.

use crate::provider::Access;

/// Configuration for a [`MemoryArena`](crate::MemoryArena).
///
/// Fixed at allocation time; an arena never grows or changes access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Upper bound on `record_size * record_count`, in bytes.
    ///
    /// Default: `isize::MAX`, the largest object Rust can address.
    pub max_total_bytes: usize,

    /// Access of the arena after its records are initialized.
    ///
    /// Default: [`Access::ReadWrite`]. A read-only arena is filled with its
    /// template and then sealed; writes are refused.
    pub access: Access,
}

impl ArenaConfig {
    /// Default byte limit.
    pub const DEFAULT_MAX_TOTAL_BYTES: usize = isize::MAX as usize;

    /// Default access.
    pub const DEFAULT_ACCESS: Access = Access::ReadWrite;

    /// A config with default values.
    pub const fn new() -> Self {
        Self {
            max_total_bytes: Self::DEFAULT_MAX_TOTAL_BYTES,
            access: Self::DEFAULT_ACCESS,
        }
    }

    /// Set the byte limit.
    pub const fn with_max_total_bytes(mut self, max_total_bytes: usize) -> Self {
        self.max_total_bytes = max_total_bytes;
        self
    }

    /// Set the access.
    pub const fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Bytes needed for `count` slots of `stride` bytes, if within the limit.
    pub fn total_bytes(&self, stride: usize, count: usize) -> Option<usize> {
        stride
            .checked_mul(count)
            .filter(|&total| total <= self.max_total_bytes)
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new()
    }
}
