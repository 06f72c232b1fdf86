//! Fixed-size, fixed-count buffer pools with aligned storage
//!
//! A pool pre-allocates its whole budget when it is opened. Buffers are handed
//! out by value, so whichever side holds a `Buffer` owns it exclusively.
//! Dropping a buffer returns its storage to the pool it came from.

use crate::error::LinkError;
use crate::types::{PoolId, BUF_ALIGN};
use parking_lot::{Mutex, RwLock};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, Weak};

/// One aligned, zero-initialised allocation
struct Block {
    ptr: NonNull<u8>,
    layout: Layout,
}

// The block is uniquely owned; no aliasing pointer escapes it.
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    fn new(size: usize) -> Option<Self> {
        let layout = Layout::from_size_align(size, BUF_ALIGN).ok()?;
        // SAFETY: layout has non-zero size, checked by the pool before calling.
        let ptr = unsafe { alloc_zeroed(layout) };
        NonNull::new(ptr).map(|ptr| Block { ptr, layout })
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for layout.size() bytes for the life of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: allocated in Block::new with this exact layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// Pool creation attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAttrs {
    pub buffer_size: usize,
    pub num_buffers: usize,
}

struct PoolInner {
    id: PoolId,
    buffer_size: usize,
    capacity: usize,
    free: Mutex<Vec<Block>>,
}

impl PoolInner {
    fn give_back(&self, block: Block) {
        self.free.lock().push(block);
    }
}

/// A buffer lent out by a pool
///
/// `len` is the number of valid bytes; `capacity` the pool's buffer size.
pub struct Buffer {
    pool: PoolId,
    block: Option<Block>,
    len: usize,
    home: Weak<PoolInner>,
}

impl Buffer {
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn capacity(&self) -> usize {
        self.block.as_ref().map_or(0, |b| b.layout.size())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the number of valid bytes, capped at the capacity
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.capacity());
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.storage().as_ptr()
    }

    /// The valid bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.storage()[..self.len]
    }

    /// The valid bytes, mutably
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut self.storage_mut()[..len]
    }

    /// The whole allocation, regardless of `len`
    pub fn storage(&self) -> &[u8] {
        match self.block.as_ref() {
            Some(block) => block.as_slice(),
            None => &[],
        }
    }

    pub fn storage_mut(&mut self) -> &mut [u8] {
        match self.block.as_mut() {
            Some(block) => block.as_mut_slice(),
            None => &mut [],
        }
    }

    /// Copy `src` into the front of the buffer and make it the valid region
    ///
    /// Copies at most `capacity` bytes and returns how many were copied.
    pub fn fill_from(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.capacity());
        self.storage_mut()[..n].copy_from_slice(&src[..n]);
        self.len = n;
        n
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            if let Some(home) = self.home.upgrade() {
                home.give_back(block);
            }
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("pool", &self.pool)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Fixed-size, fixed-count allocator
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool and pre-allocate its whole budget
    pub fn new(id: PoolId, attrs: PoolAttrs) -> Result<Self, LinkError> {
        if attrs.buffer_size == 0 {
            return Err(LinkError::InvalidPoolAttrs("buffer size must be non-zero"));
        }
        if attrs.num_buffers == 0 {
            return Err(LinkError::InvalidPoolAttrs("buffer count must be non-zero"));
        }

        let mut free = Vec::with_capacity(attrs.num_buffers);
        for _ in 0..attrs.num_buffers {
            free.push(Block::new(attrs.buffer_size).ok_or(LinkError::PoolExhausted(id))?);
        }

        log::debug!(
            "{}: {} x {} bytes allocated",
            id,
            attrs.num_buffers,
            attrs.buffer_size
        );

        Ok(BufferPool {
            inner: Arc::new(PoolInner {
                id,
                buffer_size: attrs.buffer_size,
                capacity: attrs.num_buffers,
                free: Mutex::new(free),
            }),
        })
    }

    pub fn id(&self) -> PoolId {
        self.inner.id
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Take a buffer from the pool with `size` valid bytes
    pub fn allocate(&self, size: usize) -> Result<Buffer, LinkError> {
        let id = self.inner.id;
        if size == 0 {
            return Err(LinkError::ZeroSize(id));
        }
        if size > self.inner.buffer_size {
            return Err(LinkError::TooLarge {
                pool: id,
                requested: size,
                buffer_size: self.inner.buffer_size,
            });
        }

        let mut block = self
            .inner
            .free
            .lock()
            .pop()
            .ok_or(LinkError::PoolExhausted(id))?;
        block.as_mut_slice().fill(0);

        Ok(Buffer {
            pool: id,
            block: Some(block),
            len: size,
            home: Arc::downgrade(&self.inner),
        })
    }

    /// Return a buffer to the pool
    ///
    /// A buffer from another pool is refused; dropping it still returns it to
    /// the pool it came from.
    pub fn release(&self, buffer: Buffer) -> Result<(), LinkError> {
        if buffer.pool != self.inner.id {
            return Err(LinkError::ForeignBuffer {
                expected: self.inner.id,
                actual: buffer.pool,
            });
        }
        drop(buffer);
        Ok(())
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let available = self.inner.free.lock().len();

        PoolStats {
            capacity: self.inner.capacity,
            in_use: self.inner.capacity - available,
            available,
        }
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("id", &self.inner.id)
            .field("buffer_size", &self.inner.buffer_size)
            .field("stats", &self.stats())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub in_use: usize,
    pub available: usize,
}

/// Open pools, keyed by pool id
///
/// An id can be open at most once; a second session asking for the same id is
/// refused until the first one closes it.
#[derive(Default)]
pub struct PoolTable {
    pools: RwLock<HashMap<PoolId, Arc<BufferPool>>>,
}

impl PoolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, id: PoolId, attrs: PoolAttrs) -> Result<Arc<BufferPool>, LinkError> {
        let mut pools = self.pools.write();
        if pools.contains_key(&id) {
            return Err(LinkError::PoolInUse(id));
        }

        let pool = Arc::new(BufferPool::new(id, attrs)?);
        pools.insert(id, pool.clone());
        Ok(pool)
    }

    pub fn get(&self, id: PoolId) -> Result<Arc<BufferPool>, LinkError> {
        self.pools
            .read()
            .get(&id)
            .cloned()
            .ok_or(LinkError::UnknownPool(id))
    }

    pub fn allocate(&self, id: PoolId, size: usize) -> Result<Buffer, LinkError> {
        self.get(id)?.allocate(size)
    }

    pub fn release(&self, id: PoolId, buffer: Buffer) -> Result<(), LinkError> {
        self.get(id)?.release(buffer)
    }

    /// Close a pool; refused while any of its buffers is still lent out
    pub fn close(&self, id: PoolId) -> Result<(), LinkError> {
        let mut pools = self.pools.write();
        let pool = pools.get(&id).ok_or(LinkError::UnknownPool(id))?;

        let outstanding = pool.stats().in_use;
        if outstanding > 0 {
            return Err(LinkError::PoolBusy {
                pool: id,
                outstanding,
            });
        }

        pools.remove(&id);
        log::debug!("{} closed", id);
        Ok(())
    }

    pub fn is_open(&self, id: PoolId) -> bool {
        self.pools.read().contains_key(&id)
    }
}
