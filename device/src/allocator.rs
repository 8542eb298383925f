use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{OutOfMemorySnafu, Result};

/// Which side of the host/accelerator boundary a buffer lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum MemorySide {
    Host,
    Accelerator,
}

/// Opaque handle to allocated memory.
///
/// Uses `RefCell` for interior mutability with runtime borrow checking.
/// Safe for single-threaded use (Buffer is !Send + !Sync).
#[derive(Debug)]
pub enum RawBuffer {
    Host { data: RefCell<Box<[u8]>> },
    Accelerator { words: RefCell<Box<[f32]>>, device_id: usize },
}

impl RawBuffer {
    /// Size of the allocation in bytes.
    pub fn size(&self) -> usize {
        match self {
            RawBuffer::Host { data } => data.borrow().len(),
            RawBuffer::Accelerator { words, .. } => words.borrow().len() * 4,
        }
    }

    pub fn side(&self) -> MemorySide {
        match self {
            RawBuffer::Host { .. } => MemorySide::Host,
            RawBuffer::Accelerator { .. } => MemorySide::Accelerator,
        }
    }

    fn clear(&self) {
        match self {
            RawBuffer::Host { data } => data.borrow_mut().fill(0),
            RawBuffer::Accelerator { words, .. } => words.borrow_mut().fill(0.0),
        }
    }
}

pub trait Allocator: Send + Sync + std::fmt::Debug {
    /// Allocate `size` zeroed bytes.
    fn alloc(&self, size: usize) -> Result<RawBuffer>;
    fn free(&self, _buffer: RawBuffer) {}
    fn synchronize(&self) -> Result<()> {
        Ok(())
    }
    fn side(&self) -> MemorySide;
    fn name(&self) -> &str;
}

/// Host allocator using system memory.
#[derive(Debug, Clone)]
pub struct HostAllocator;

impl Allocator for HostAllocator {
    fn alloc(&self, size: usize) -> Result<RawBuffer> {
        let data = vec![0u8; size].into_boxed_slice();
        Ok(RawBuffer::Host { data: RefCell::new(data) })
    }

    fn side(&self) -> MemorySide {
        MemorySide::Host
    }

    fn name(&self) -> &str {
        "HOST"
    }
}

/// Emulated accelerator memory with a fixed capacity.
///
/// Allocations are `f32` word arrays; requests are rounded up to whole words.
#[derive(Debug)]
pub struct AcceleratorAllocator {
    device_id: usize,
    capacity: usize,
    allocated: AtomicUsize,
    name: String,
}

impl AcceleratorAllocator {
    pub fn new(device_id: usize, capacity: usize) -> Self {
        Self { device_id, capacity, allocated: AtomicUsize::new(0), name: format!("ACCEL:{device_id}") }
    }

    pub fn device_id(&self) -> usize {
        self.device_id
    }

    /// Bytes currently allocated.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }
}

impl Allocator for AcceleratorAllocator {
    fn alloc(&self, size: usize) -> Result<RawBuffer> {
        let words = size.div_ceil(4);
        let bytes = words * 4;
        let previous = self.allocated.fetch_add(bytes, Ordering::AcqRel);
        if previous + bytes > self.capacity {
            self.allocated.fetch_sub(bytes, Ordering::AcqRel);
            return OutOfMemorySnafu { requested: bytes, available: self.capacity.saturating_sub(previous) }.fail();
        }

        Ok(RawBuffer::Accelerator { words: RefCell::new(vec![0.0f32; words].into_boxed_slice()), device_id: self.device_id })
    }

    fn free(&self, buffer: RawBuffer) {
        self.allocated.fetch_sub(buffer.size(), Ordering::AcqRel);
    }

    fn side(&self) -> MemorySide {
        MemorySide::Accelerator
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// LRU allocator that caches freed buffers for reuse.
///
/// Reused buffers are cleared, so callers always observe zeroed memory.
#[derive(Debug)]
pub struct LruAllocator {
    inner: Box<dyn Allocator>,
    cache: Mutex<HashMap<usize, Vec<RawBuffer>>>,
    max_buffers_per_size: usize,
    name: String,
}

impl LruAllocator {
    pub fn new(inner: Box<dyn Allocator>) -> Self {
        Self::with_capacity(inner, 32)
    }

    pub fn with_capacity(inner: Box<dyn Allocator>, max_buffers_per_size: usize) -> Self {
        let name = inner.name().to_string();
        Self { inner, cache: Mutex::new(HashMap::new()), max_buffers_per_size, name }
    }

    /// Number of buffers held for reuse.
    pub fn cached(&self) -> usize {
        self.cache.lock().values().map(Vec::len).sum()
    }
}

impl Allocator for LruAllocator {
    fn alloc(&self, size: usize) -> Result<RawBuffer> {
        let key = match self.inner.side() {
            MemorySide::Host => size,
            MemorySide::Accelerator => size.div_ceil(4) * 4,
        };

        // Try cache first
        {
            let mut cache = self.cache.lock();
            if let Some(buffers) = cache.get_mut(&key)
                && let Some(buffer) = buffers.pop()
            {
                if buffers.is_empty() {
                    cache.remove(&key);
                }
                buffer.clear();
                return Ok(buffer);
            }
        } // Drop lock before expensive allocation

        // Cache miss - allocate from inner
        match self.inner.alloc(size) {
            Ok(buffer) => Ok(buffer),
            Err(e) => {
                // On allocation failure, release the cache and retry
                let drained: Vec<RawBuffer> = self.cache.lock().drain().flat_map(|(_, buffers)| buffers).collect();
                for buffer in drained {
                    self.inner.free(buffer);
                }
                self.inner.alloc(size).map_err(|_| e)
            }
        }
    }

    fn free(&self, buffer: RawBuffer) {
        let key = buffer.size();

        let mut cache = self.cache.lock();
        let buffers = cache.entry(key).or_default();
        if buffers.len() < self.max_buffers_per_size {
            buffers.push(buffer);
        } else {
            drop(cache);
            self.inner.free(buffer);
        }
    }

    fn synchronize(&self) -> Result<()> {
        self.inner.synchronize()
    }

    fn side(&self) -> MemorySide {
        self.inner.side()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

