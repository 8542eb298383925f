use std::cell::{Ref, RefMut};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::{Arc, OnceLock};

use snafu::ensure;

use crate::allocator::{Allocator, MemorySide, RawBuffer};
use crate::error::{BorrowedSnafu, Result, SizeMismatchSnafu, WrongSideSnafu};

/// How a buffer's scalar words are encoded in memory.
///
/// Accelerator buffers always hold `f32` words. Host buffers hold either
/// little-endian `f32` words or one byte per word for pixel data, which the
/// accelerator sees normalised to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    F32,
    U8Normalized,
}

impl Encoding {
    pub const fn bytes_per_word(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::U8Normalized => 1,
        }
    }

    fn encode(&self, value: f32, out: &mut [u8]) {
        match self {
            Self::F32 => out.copy_from_slice(&value.to_le_bytes()),
            Self::U8Normalized => out[0] = (value.clamp(0.0, 1.0) * 255.0).round() as u8,
        }
    }

    fn decode(&self, bytes: &[u8]) -> f32 {
        match self {
            Self::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::U8Normalized => bytes[0] as f32 / 255.0,
        }
    }
}

/// Shared buffer data.
#[derive(Debug)]
struct BufferData {
    /// Lazily-initialized raw buffer.
    raw: OnceLock<RawBuffer>,
    allocator: Arc<dyn Allocator>,
}

impl BufferData {
    fn new(allocator: Arc<dyn Allocator>) -> Self {
        Self { raw: OnceLock::new(), allocator }
    }

    fn ensure_allocated(&self, size: usize) -> Result<&RawBuffer> {
        if let Some(raw) = self.raw.get() {
            return Ok(raw);
        }
        let raw = self.allocator.alloc(size)?;
        Ok(self.raw.get_or_init(|| raw))
    }

    fn is_allocated(&self) -> bool {
        self.raw.get().is_some()
    }
}

impl Drop for BufferData {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.allocator.free(raw);
        }
    }
}

/// A block of host or accelerator memory holding `len` scalar words.
///
/// This type is `!Send + !Sync`: a kernel circuit and its buffers live on the
/// thread that steps it.
#[derive(Debug, Clone)]
pub struct Buffer {
    data: Rc<BufferData>,
    /// Number of scalar words.
    len: usize,
    encoding: Encoding,
    side: MemorySide,
    _not_send_sync: PhantomData<Rc<()>>,
}

impl Buffer {
    /// Create a new buffer with lazy allocation.
    ///
    /// Accelerator buffers always use the `F32` encoding regardless of `encoding`.
    pub fn new(allocator: Arc<dyn Allocator>, len: usize, encoding: Encoding) -> Self {
        let side = allocator.side();
        let encoding = match side {
            MemorySide::Accelerator => Encoding::F32,
            MemorySide::Host => encoding,
        };
        Self { data: Rc::new(BufferData::new(allocator)), len, encoding, side, _not_send_sync: PhantomData }
    }

    /// Create a new buffer with immediate allocation.
    pub fn allocate(allocator: Arc<dyn Allocator>, len: usize, encoding: Encoding) -> Result<Self> {
        let buffer = Self::new(allocator, len, encoding);
        buffer.ensure_allocated()?;
        Ok(buffer)
    }

    pub fn ensure_allocated(&self) -> Result<()> {
        self.raw().map(|_| ())
    }

    pub fn is_allocated(&self) -> bool {
        self.data.is_allocated()
    }

    /// Number of scalar words.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.len * self.encoding.bytes_per_word()
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn side(&self) -> MemorySide {
        self.side
    }

    pub fn allocator(&self) -> &dyn Allocator {
        &*self.data.allocator
    }

    fn raw(&self) -> Result<&RawBuffer> {
        self.data.ensure_allocated(self.size())
    }

    /// Accelerator words for reading by a kernel program.
    pub fn words(&self) -> Result<Ref<'_, [f32]>> {
        match self.raw()? {
            RawBuffer::Accelerator { words, .. } => {
                let borrowed = words.try_borrow().map_err(|e| BorrowedSnafu { reason: e.to_string() }.build())?;
                Ok(Ref::map(borrowed, |w| &w[..self.len]))
            }
            RawBuffer::Host { .. } => {
                WrongSideSnafu { operation: "words", expected: MemorySide::Accelerator, actual: MemorySide::Host }
                    .fail()
            }
        }
    }

    /// Accelerator words for writing by a kernel program.
    pub fn words_mut(&self) -> Result<RefMut<'_, [f32]>> {
        match self.raw()? {
            RawBuffer::Accelerator { words, .. } => {
                let borrowed = words.try_borrow_mut().map_err(|e| BorrowedSnafu { reason: e.to_string() }.build())?;
                Ok(RefMut::map(borrowed, |w| &mut w[..self.len]))
            }
            RawBuffer::Host { .. } => {
                WrongSideSnafu { operation: "words_mut", expected: MemorySide::Accelerator, actual: MemorySide::Host }
                    .fail()
            }
        }
    }

    /// Write scalar values, encoding them for this buffer.
    pub fn write_f32(&mut self, values: &[f32]) -> Result<()> {
        let expected = self.len;
        let actual = values.len();
        ensure!(expected == actual, SizeMismatchSnafu { expected, actual });

        match self.raw()? {
            RawBuffer::Host { data } => {
                let mut data = data.borrow_mut();
                let width = self.encoding.bytes_per_word();
                for (value, bytes) in values.iter().zip(data.chunks_exact_mut(width)) {
                    self.encoding.encode(*value, bytes);
                }
            }
            RawBuffer::Accelerator { words, .. } => words.borrow_mut()[..expected].copy_from_slice(values),
        }
        Ok(())
    }

    /// Read scalar values, decoding them from this buffer.
    pub fn read_f32(&self) -> Result<Vec<f32>> {
        match self.raw()? {
            RawBuffer::Host { data } => {
                let data = data.borrow();
                let width = self.encoding.bytes_per_word();
                Ok(data.chunks_exact(width).take(self.len).map(|bytes| self.encoding.decode(bytes)).collect())
            }
            RawBuffer::Accelerator { words, .. } => Ok(words.borrow()[..self.len].to_vec()),
        }
    }

    /// Copy the contents of another buffer into this one.
    ///
    /// This is the only path across the host/accelerator boundary; pixel data is
    /// normalised on upload and quantised on download.
    pub fn copy_from(&mut self, src: &Buffer) -> Result<()> {
        let expected = self.len;
        let actual = src.len;
        ensure!(expected == actual, SizeMismatchSnafu { expected, actual });
        if self.same_allocation(src) {
            return Ok(());
        }

        let dst_raw = self.raw()?;
        let src_raw = src.raw()?;

        match (dst_raw, src_raw) {
            (RawBuffer::Accelerator { words: dst, .. }, RawBuffer::Accelerator { words: src_words, .. }) => {
                let src_words = src_words.borrow();
                dst.borrow_mut()[..expected].copy_from_slice(&src_words[..expected]);
            }
            (RawBuffer::Accelerator { words: dst, .. }, RawBuffer::Host { data }) => {
                let data = data.borrow();
                let width = src.encoding.bytes_per_word();
                for (word, bytes) in dst.borrow_mut().iter_mut().zip(data.chunks_exact(width)) {
                    *word = src.encoding.decode(bytes);
                }
            }
            (RawBuffer::Host { data }, RawBuffer::Accelerator { words, .. }) => {
                let words = words.borrow();
                let width = self.encoding.bytes_per_word();
                for (bytes, word) in data.borrow_mut().chunks_exact_mut(width).zip(words.iter()) {
                    self.encoding.encode(*word, bytes);
                }
            }
            (RawBuffer::Host { data: dst }, RawBuffer::Host { .. }) => {
                let values = src.read_f32()?;
                let mut dst = dst.borrow_mut();
                let width = self.encoding.bytes_per_word();
                for (bytes, value) in dst.chunks_exact_mut(width).zip(values) {
                    self.encoding.encode(value, bytes);
                }
            }
        }
        Ok(())
    }

    /// Wait for pending operations on this buffer's memory.
    pub fn synchronize(&self) -> Result<()> {
        self.data.allocator.synchronize()
    }

    /// Whether two handles share the same allocation.
    pub fn same_allocation(&self, other: &Buffer) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}
