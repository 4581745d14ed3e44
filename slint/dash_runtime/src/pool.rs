//! Byte budget shared by glyph bitmaps and image buffers.
//!
//! Every large buffer the engine holds is acquired from one [`BufferPool`] and
//! gives its bytes back when released or dropped, so a flood of icons or
//! images fails an individual operation instead of the whole device.

use std::cell::Cell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::error::AllocError;

struct PoolInner {
    capacity: usize,
    in_use: Cell<usize>,
}

/// Cheaply clonable handle to the shared budget.
#[derive(Clone)]
pub struct BufferPool {
    inner: Rc<PoolInner>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Rc::new(PoolInner {
                capacity,
                in_use: Cell::new(0),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn in_use(&self) -> usize {
        self.inner.in_use.get()
    }

    pub fn available(&self) -> usize {
        self.inner.capacity.saturating_sub(self.in_use())
    }

    /// Reserve `len` zeroed bytes against the budget.
    pub fn acquire(&self, len: usize) -> Result<PooledBuffer, AllocError> {
        let available = self.available();
        if len > available {
            return Err(AllocError::Exhausted {
                requested: len,
                available,
                capacity: self.inner.capacity,
            });
        }

        self.inner.in_use.set(self.in_use() + len);
        Ok(PooledBuffer {
            bytes: vec![0_u8; len].into_boxed_slice(),
            pool: Rc::clone(&self.inner),
        })
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .finish()
    }
}

/// A buffer whose bytes are charged to a [`BufferPool`] until it is released.
pub struct PooledBuffer {
    bytes: Box<[u8]>,
    pool: Rc<PoolInner>,
}

impl PooledBuffer {
    /// Give the bytes back to the pool. Same as dropping, but explicit at the
    /// call site.
    pub fn release(self) {}
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let in_use = self.pool.in_use.get();
        self.pool.in_use.set(in_use.saturating_sub(self.bytes.len()));
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.bytes.len())
            .finish()
    }
}
