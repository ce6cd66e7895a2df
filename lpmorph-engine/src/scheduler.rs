//! Hop cadence and overlap-add bookkeeping for one channel.
//!
//! Cursors (all modulo the ring capacity):
//! - `position`: where the current input sample is written; the output
//!   accumulator is read (and cleared) at the same index.
//! - `write`: start of the next synthesized frame. When a frame triggers,
//!   `write == position`, i.e. the frame begins with the next sample due out.
//!
//! Overlap-add rule: the first `hop` samples of a frame are added onto the
//! accumulator (the tail of the previous frame); the rest overwrite it, so
//! stale samples from a longer previous frame are never summed twice.
//!
//! A frame-length change keeps `write` where it is, so the first new frame
//! still lands on the previous frame's tail, and zeroes whatever part of that
//! tail reaches past the new frame. `reach` records how far past `write`
//! emitted samples actually extend, so several changes before the next frame
//! still clear everything the new frame cannot overwrite.

use lpmorph_core::ring::RingBuffer;

#[derive(Clone, Debug)]
pub struct FrameScheduler {
    mask: usize,
    position: usize,
    write: usize,
    until_frame: usize,
    /// Samples past `write` still holding frame output.
    reach: usize,
    frame_len: usize,
    hop: usize,
}

impl FrameScheduler {
    /// `capacity` must be the (power-of-two) ring capacity the channel uses.
    pub fn new(capacity: usize, frame_len: usize) -> Self {
        let hop = (frame_len / 2).max(1);
        Self {
            mask: capacity - 1,
            position: 0,
            write: hop & (capacity - 1),
            until_frame: hop,
            reach: 0,
            frame_len,
            hop,
        }
    }

    #[inline] pub fn position(&self) -> usize { self.position }
    #[inline] pub fn frame_start(&self) -> usize { self.write }
    #[inline] pub fn frame_length(&self) -> usize { self.frame_len }
    #[inline] pub fn hop(&self) -> usize { self.hop }
    #[inline] pub fn reach(&self) -> usize { self.reach }

    /// Step past the current sample. Returns `true` when a frame is due.
    #[inline]
    pub fn advance(&mut self) -> bool {
        self.position = (self.position + 1) & self.mask;
        self.until_frame -= 1;
        if self.until_frame == 0 {
            self.until_frame = self.hop;
            return true;
        }
        false
    }

    /// Write sample `n` of the current frame into the accumulator.
    #[inline]
    pub fn emit(&mut self, out: &mut RingBuffer<f64>, n: usize, value: f64) {
        self.reach = self.reach.max(n + 1);
        let idx = self.write + n;
        if n < self.hop {
            out.accumulate(idx, value);
        } else {
            out.set(idx, value);
        }
    }

    /// Move on to the next frame slot (called whether or not a frame was written).
    #[inline]
    pub fn commit_frame(&mut self) {
        self.reach = self.reach.saturating_sub(self.hop);
        self.write = (self.write + self.hop) & self.mask;
    }

    /// Switch to `frame_len` at a block boundary.
    pub fn retime(&mut self, frame_len: usize, out: &mut RingBuffer<f64>) {
        if frame_len == self.frame_len {
            return;
        }
        if self.reach > frame_len {
            out.clear_range(self.write + frame_len, self.reach - frame_len);
            self.reach = frame_len;
        }
        self.frame_len = frame_len;
        self.hop = (frame_len / 2).max(1);
        self.until_frame = self.write.wrapping_sub(self.position) & self.mask;
        if self.until_frame == 0 {
            self.until_frame = self.hop;
        }
    }

    pub fn reset(&mut self) {
        self.position = 0;
        self.write = self.hop & self.mask;
        self.until_frame = self.hop;
        self.reach = 0;
    }
}
