//! Mock memory providers.
//!
//! All three delegate real allocation to [`HeapProvider`], so buffers are
//! genuine and released buffers are genuinely freed.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mmarena_arena::{Access, HeapBuffer, HeapProvider, MemoryProvider, ProviderError};

/// Reservation and release counters shared with a [`TrackingProvider`].
#[derive(Debug, Default)]
pub struct Counts {
    reserved: AtomicUsize,
    released: AtomicUsize,
    live_bytes: AtomicUsize,
}

impl Counts {
    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Bytes reserved and not yet released.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::SeqCst)
    }
}

/// Counts every reserve and release.
///
/// Clones share their counters, so a test can keep one clone after moving
/// the other into an arena.
#[derive(Clone, Debug, Default)]
pub struct TrackingProvider {
    inner: HeapProvider,
    counts: Arc<Counts>,
}

impl TrackingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> &Counts {
        &self.counts
    }
}

impl MemoryProvider for TrackingProvider {
    type Buffer = HeapBuffer;

    fn reserve(&self, len: usize, access: Access) -> Result<HeapBuffer, ProviderError> {
        let buffer = self.inner.reserve(len, access)?;
        self.counts.reserved.fetch_add(1, Ordering::SeqCst);
        self.counts.live_bytes.fetch_add(len, Ordering::SeqCst);
        Ok(buffer)
    }

    fn release(&self, buffer: HeapBuffer) -> Result<(), ProviderError> {
        let len = mmarena_arena::RawBuffer::len(&buffer);
        self.inner.release(buffer)?;
        self.counts.released.fetch_add(1, Ordering::SeqCst);
        self.counts.live_bytes.fetch_sub(len, Ordering::SeqCst);
        Ok(())
    }

    fn seal(&self, buffer: HeapBuffer) -> Result<HeapBuffer, ProviderError> {
        self.inner.seal(buffer)
    }
}

/// Fails reservations, releases or seals on demand.
#[derive(Clone, Debug, Default)]
pub struct FailingProvider {
    inner: TrackingProvider,
    fail_reserve: bool,
    fail_release: bool,
    fail_seal: bool,
    release_attempts: Arc<AtomicUsize>,
}

impl FailingProvider {
    /// Every reservation fails with an out-of-memory OS error.
    pub fn on_reserve() -> Self {
        Self {
            fail_reserve: true,
            ..Self::default()
        }
    }

    /// Reservations succeed; every release fails after freeing the memory.
    pub fn on_release() -> Self {
        Self {
            fail_release: true,
            ..Self::default()
        }
    }

    /// Reservations succeed; every seal releases the buffer and fails.
    pub fn on_seal() -> Self {
        Self {
            fail_seal: true,
            ..Self::default()
        }
    }

    pub fn counts(&self) -> &Counts {
        self.inner.counts()
    }

    /// Number of times `release` was called.
    pub fn release_attempts(&self) -> usize {
        self.release_attempts.load(Ordering::SeqCst)
    }
}

impl MemoryProvider for FailingProvider {
    type Buffer = HeapBuffer;

    fn reserve(&self, len: usize, access: Access) -> Result<HeapBuffer, ProviderError> {
        if self.fail_reserve {
            return Err(ProviderError::Os(io::Error::from(io::ErrorKind::OutOfMemory)));
        }
        self.inner.reserve(len, access)
    }

    fn release(&self, buffer: HeapBuffer) -> Result<(), ProviderError> {
        self.release_attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.release(buffer)?;
        if self.fail_release {
            return Err(ProviderError::Os(io::Error::other("release refused")));
        }
        Ok(())
    }

    fn seal(&self, buffer: HeapBuffer) -> Result<HeapBuffer, ProviderError> {
        if self.fail_seal {
            self.release(buffer)?;
            return Err(ProviderError::Os(io::Error::other("seal refused")));
        }
        self.inner.seal(buffer)
    }
}

/// Hands out buffers one byte shorter than requested.
#[derive(Clone, Debug, Default)]
pub struct ShortProvider {
    inner: TrackingProvider,
}

impl ShortProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> &Counts {
        self.inner.counts()
    }
}

impl MemoryProvider for ShortProvider {
    type Buffer = HeapBuffer;

    fn reserve(&self, len: usize, access: Access) -> Result<HeapBuffer, ProviderError> {
        self.inner.reserve(len.saturating_sub(1).max(1), access)
    }

    fn release(&self, buffer: HeapBuffer) -> Result<(), ProviderError> {
        self.inner.release(buffer)
    }
}
