//! Emulated accelerator memory and streams.
//!
//! `HostDevice` stands in for a discrete accelerator. Device memory is a
//! zero-initialized array of 32-bit words (`AtomicU32`), so kernels can use
//! atomic counters and flag writes on shared buffers while host code moves
//! data only through stream-ordered copies. Device and pinned host memory
//! are drawn from separate accounted pools; every buffer returns its bytes
//! to its pool when the last handle is dropped.

mod buffers;
mod stream;

pub use buffers::DecodeBuffers;
pub use stream::Stream;

use crate::trace::trace_warn;
use crate::util::{DecodeError, DecodeResult};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Size of one device word in bytes.
pub const WORD_BYTES: usize = std::mem::size_of::<u32>();

/// Capacity limits for an emulated device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Device memory budget in bytes (`None` = unbounded).
    pub memory_limit: Option<usize>,
    /// Pinned host memory budget in bytes (`None` = unbounded).
    pub pinned_limit: Option<usize>,
}

#[derive(Debug)]
struct MemoryPool {
    name: &'static str,
    limit: Option<usize>,
    in_use: AtomicUsize,
}

impl MemoryPool {
    fn new(name: &'static str, limit: Option<usize>) -> Self {
        Self {
            name,
            limit,
            in_use: AtomicUsize::new(0),
        }
    }

    fn reserve(&self, bytes: usize) -> DecodeResult<()> {
        let limit = self.limit.unwrap_or(usize::MAX);
        self.in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(bytes).filter(|total| *total <= limit)
            })
            .map(|_| ())
            .map_err(|used| DecodeError::OutOfMemory {
                pool: self.name,
                requested: bytes,
                available: limit.saturating_sub(used),
            })
    }

    fn release(&self, bytes: usize) {
        self.in_use.fetch_sub(bytes, Ordering::SeqCst);
    }
}

struct Allocation {
    words: Box<[AtomicU32]>,
    bytes: usize,
    pool: Arc<MemoryPool>,
}

impl Allocation {
    fn new(pool: &Arc<MemoryPool>, len: usize) -> DecodeResult<Self> {
        let bytes = len.checked_mul(WORD_BYTES).ok_or(DecodeError::OutOfMemory {
            pool: pool.name,
            requested: usize::MAX,
            available: 0,
        })?;
        pool.reserve(bytes)?;
        let mut words = Vec::new();
        if words.try_reserve_exact(len).is_err() {
            pool.release(bytes);
            // The pool had room but the host could not back the request.
            return Err(DecodeError::OutOfMemory {
                pool: pool.name,
                requested: bytes,
                available: 0,
            });
        }
        words.extend((0..len).map(|_| AtomicU32::new(0)));
        Ok(Self {
            words: words.into_boxed_slice(),
            bytes,
            pool: Arc::clone(pool),
        })
    }
}

impl std::fmt::Debug for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocation")
            .field("pool", &self.pool.name)
            .field("words", &self.words.len())
            .finish()
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.pool.release(self.bytes);
    }
}

/// Handle to a device-resident buffer of 32-bit words.
///
/// Cloning yields another handle to the same allocation; the memory is
/// released once every handle is gone.
#[derive(Clone, Debug)]
pub struct DeviceBuffer {
    alloc: Arc<Allocation>,
}

impl DeviceBuffer {
    /// Length in words.
    pub fn len(&self) -> usize {
        self.alloc.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alloc.words.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.alloc.bytes
    }

    /// Device-side access for kernels.
    pub fn as_words(&self) -> &[AtomicU32] {
        &self.alloc.words
    }
}

/// Page-locked host buffer, the target of device-to-host copies.
#[derive(Debug)]
pub struct PinnedBuffer {
    alloc: Arc<Allocation>,
}

impl PinnedBuffer {
    /// Length in words.
    pub fn len(&self) -> usize {
        self.alloc.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alloc.words.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.alloc.bytes
    }

    /// Snapshot of the buffer contents.
    ///
    /// Only meaningful after the stream that writes it has been synchronized.
    pub fn read_words(&self) -> Vec<u32> {
        self.alloc
            .words
            .iter()
            .map(|word| word.load(Ordering::Relaxed))
            .collect()
    }

    fn share(&self) -> Arc<Allocation> {
        Arc::clone(&self.alloc)
    }
}

#[derive(Debug)]
struct DeviceInner {
    device_pool: Arc<MemoryPool>,
    pinned_pool: Arc<MemoryPool>,
    live_streams: AtomicUsize,
    next_stream_id: AtomicU64,
}

/// Emulated accelerator backed by host memory.
///
/// Cloning returns another handle to the same device and pools.
#[derive(Clone, Debug)]
pub struct HostDevice {
    inner: Arc<DeviceInner>,
}

impl HostDevice {
    /// Creates a device with unbounded pools.
    pub fn new() -> Self {
        Self::with_config(DeviceConfig::default())
    }

    pub fn with_config(cfg: DeviceConfig) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                device_pool: Arc::new(MemoryPool::new("device", cfg.memory_limit)),
                pinned_pool: Arc::new(MemoryPool::new("pinned", cfg.pinned_limit)),
                live_streams: AtomicUsize::new(0),
                next_stream_id: AtomicU64::new(0),
            }),
        }
    }

    /// Allocates `len` zeroed words of device memory.
    pub fn alloc(&self, len: usize) -> DecodeResult<DeviceBuffer> {
        let alloc = logged("alloc_device", Allocation::new(&self.inner.device_pool, len))?;
        Ok(DeviceBuffer {
            alloc: Arc::new(alloc),
        })
    }

    /// Allocates `len` zeroed words of pinned host memory.
    pub fn alloc_pinned(&self, len: usize) -> DecodeResult<PinnedBuffer> {
        let alloc = logged("alloc_pinned", Allocation::new(&self.inner.pinned_pool, len))?;
        Ok(PinnedBuffer {
            alloc: Arc::new(alloc),
        })
    }

    /// Creates a new stream with its own worker.
    pub fn create_stream(&self) -> DecodeResult<Stream> {
        let id = self.inner.next_stream_id.fetch_add(1, Ordering::Relaxed);
        logged("create_stream", Stream::spawn(id, Arc::clone(&self.inner)))
    }

    /// Device bytes currently allocated.
    pub fn bytes_in_use(&self) -> usize {
        self.inner.device_pool.in_use.load(Ordering::SeqCst)
    }

    /// Pinned host bytes currently allocated.
    pub fn pinned_bytes_in_use(&self) -> usize {
        self.inner.pinned_pool.in_use.load(Ordering::SeqCst)
    }

    /// Streams created and not yet destroyed.
    pub fn live_streams(&self) -> usize {
        self.inner.live_streams.load(Ordering::SeqCst)
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs a failed resource step before handing the result back.
pub(crate) fn logged<T>(step: &'static str, result: DecodeResult<T>) -> DecodeResult<T> {
    if let Err(err) = &result {
        let reason = err.to_string();
        trace_warn!("device_step_failed", step = step, reason = reason.as_str());
    }
    result
}
