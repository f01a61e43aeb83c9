//! Anonymous private memory mappings, the default provider.

#![allow(unsafe_code)]

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::provider::{Access, MemoryProvider, ProviderError, RawBuffer};

/// Reserves buffers as anonymous private mappings through `memmap2`.
///
/// Mappings are zero-filled by the kernel and unmapped when released.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnonMmap {
    populate: bool,
}

impl AnonMmap {
    /// A provider that maps lazily.
    pub const fn new() -> Self {
        Self { populate: false }
    }

    /// Pre-fault the pages of every mapping at reservation time.
    ///
    /// Only honoured where the platform supports it.
    pub const fn populate(mut self, populate: bool) -> Self {
        self.populate = populate;
        self
    }

    /// Whether mappings are pre-faulted.
    pub const fn populates(&self) -> bool {
        self.populate
    }
}

/// A buffer reserved by [`AnonMmap`].
#[derive(Debug)]
pub struct AnonBuffer {
    map: Mapping,
}

#[derive(Debug)]
enum Mapping {
    Writable(MmapMut),
    ReadOnly(Mmap),
}

impl AnonBuffer {
    /// Access rights of the mapping.
    pub fn access(&self) -> Access {
        match self.map {
            Mapping::Writable(_) => Access::ReadWrite,
            Mapping::ReadOnly(_) => Access::ReadOnly,
        }
    }
}

// SAFETY: a mapping stays at one address until it is dropped, and moving
// the memmap2 handle does not move the pages. Anonymous mappings are
// zero-filled.
unsafe impl RawBuffer for AnonBuffer {
    fn as_ptr(&self) -> *const u8 {
        match &self.map {
            Mapping::Writable(m) => m.as_ptr(),
            Mapping::ReadOnly(m) => m.as_ptr(),
        }
    }

    fn as_mut_ptr(&mut self) -> Option<*mut u8> {
        match &mut self.map {
            Mapping::Writable(m) => Some(m.as_mut_ptr()),
            Mapping::ReadOnly(_) => None,
        }
    }

    fn len(&self) -> usize {
        match &self.map {
            Mapping::Writable(m) => m.len(),
            Mapping::ReadOnly(m) => m.len(),
        }
    }
}

impl MemoryProvider for AnonMmap {
    type Buffer = AnonBuffer;

    fn reserve(&self, len: usize, access: Access) -> Result<AnonBuffer, ProviderError> {
        if len == 0 {
            return Err(ProviderError::ZeroLength);
        }
        let mut options = MmapOptions::new();
        options.len(len);
        if self.populate {
            options.populate();
        }
        let map = options.map_anon()?;
        tracing::trace!(len, ?access, populate = self.populate, "mapped anonymous region");
        let map = match access {
            Access::ReadWrite => Mapping::Writable(map),
            Access::ReadOnly => Mapping::ReadOnly(map.make_read_only()?),
        };
        Ok(AnonBuffer { map })
    }

    fn release(&self, buffer: AnonBuffer) -> Result<(), ProviderError> {
        tracing::trace!(len = buffer.len(), "unmapping anonymous region");
        drop(buffer);
        Ok(())
    }

    fn seal(&self, buffer: AnonBuffer) -> Result<AnonBuffer, ProviderError> {
        // A failed make_read_only unmaps the consumed mapping.
        let map = match buffer.map {
            Mapping::Writable(m) => Mapping::ReadOnly(m.make_read_only()?),
            sealed @ Mapping::ReadOnly(_) => sealed,
        };
        Ok(AnonBuffer { map })
    }
}
