//! Fixed-capacity circular sample store.
//!
//! The ring owns no cursor: callers keep their own read/write indices and the
//! ring maps any index onto storage modulo its capacity. Capacity is always a
//! power of two so wrapping is a mask. Storage is allocated once in
//! [`RingBuffer::new`]; nothing here allocates afterwards.
//!
//! Used three times per channel: input delay line, sidechain delay line and
//! the overlap-add output accumulator.

use alloc::vec;
use alloc::vec::Vec;
use core::ops::AddAssign;

use num_traits::Zero;

#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    buf: Vec<T>,
    mask: usize,
}

impl<T: Copy + Zero + AddAssign> RingBuffer<T> {
    /// Allocate a zeroed ring holding at least `min_capacity` samples.
    pub fn new(min_capacity: usize) -> Self {
        let cap = min_capacity.max(1).next_power_of_two();
        Self { buf: vec![T::zero(); cap], mask: cap - 1 }
    }

    #[inline] pub fn capacity(&self) -> usize { self.buf.len() }

    /// Map an arbitrary (possibly already wrapped) index onto storage.
    #[inline] pub fn wrap(&self, index: usize) -> usize { index & self.mask }

    #[inline]
    pub fn get(&self, index: usize) -> T {
        self.buf[index & self.mask]
    }

    /// Overwrite the sample at `index`.
    #[inline]
    pub fn set(&mut self, index: usize, value: T) {
        self.buf[index & self.mask] = value;
    }

    /// Same as [`set`](Self::set); reads better at delay-line call sites.
    #[inline]
    pub fn write(&mut self, index: usize, value: T) {
        self.set(index, value);
    }

    /// Add into the current contents (overlap-add).
    #[inline]
    pub fn accumulate(&mut self, index: usize, value: T) {
        self.buf[index & self.mask] += value;
    }

    /// Sample written `delay` steps before `write_index`.
    /// `delay == 0` returns the sample at `write_index` itself.
    #[inline]
    pub fn read_delayed(&self, write_index: usize, delay: usize) -> T {
        let idx = write_index.wrapping_sub(delay) & self.mask;
        self.buf[idx]
    }

    /// Read then clear: the accumulator slot is zeroed as it is consumed so
    /// stale overlap-add energy never comes around again.
    #[inline]
    pub fn take(&mut self, index: usize) -> T {
        let idx = index & self.mask;
        let v = self.buf[idx];
        self.buf[idx] = T::zero();
        v
    }

    /// Zero `len` samples starting at `start` (wrapping).
    pub fn clear_range(&mut self, start: usize, len: usize) {
        for i in 0..len.min(self.buf.len()) {
            self.buf[(start + i) & self.mask] = T::zero();
        }
    }

    pub fn clear(&mut self) {
        for s in &mut self.buf {
            *s = T::zero();
        }
    }

    /// Copy the `out.len()` samples ending at `write_index` (inclusive) into `out`,
    /// oldest first.
    pub fn copy_recent(&self, write_index: usize, out: &mut [T]) {
        let len = out.len();
        for (i, o) in out.iter_mut().enumerate() {
            *o = self.read_delayed(write_index, len - 1 - i);
        }
    }
}
