//! Excitation read cursor with loop window and start offset.
//!
//! Per sample: read `ex[cursor]`, advance the cursor and an intra-loop counter.
//! When the counter reaches the loop length the cursor jumps back to the start
//! offset; whenever the cursor runs off the buffer end it wraps to 0, loop
//! window or not.

/// Loop length in samples for a loop fraction of a `len`-sample buffer.
/// Always in `[1, len]` for a non-empty buffer.
#[inline]
pub fn loop_length(len: usize, fraction: f64) -> usize {
    if len == 0 {
        return 0;
    }
    let f = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 1.0 };
    ((f * len as f64) as usize).clamp(1, len)
}

/// Start index for a start-offset fraction of a `len`-sample buffer.
/// Always in `[0, len)` for a non-empty buffer.
#[inline]
pub fn start_index(len: usize, fraction: f64) -> usize {
    if len == 0 {
        return 0;
    }
    let f = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
    ((f * len as f64) as usize).min(len - 1)
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ExcitationCursor {
    cursor: usize,
    count: usize,
}

impl ExcitationCursor {
    pub const fn new() -> Self {
        Self { cursor: 0, count: 0 }
    }

    /// Next sample to be read.
    #[inline] pub fn position(&self) -> usize { self.cursor }

    /// Samples read since the last loop restart.
    #[inline] pub fn loop_count(&self) -> usize { self.count }

    /// Jump to `start` and restart the loop window.
    #[inline]
    pub fn reset(&mut self, start: usize) {
        self.cursor = start;
        self.count = 0;
    }

    /// Read one excitation sample. `loop_len` and `start` come from
    /// [`loop_length`] / [`start_index`] for the same buffer.
    #[inline]
    pub fn next(&mut self, buf: &[f64], loop_len: usize, start: usize) -> f64 {
        let len = buf.len();
        if len == 0 {
            return 0.0;
        }
        if self.cursor >= len {
            self.cursor = 0;
        }
        let x = buf[self.cursor];
        self.cursor += 1;
        self.count += 1;
        if self.count >= loop_len {
            self.cursor = start;
            self.count = 0;
        }
        if self.cursor >= len {
            self.cursor = 0;
        }
        x
    }

    /// Fill `out` from `buf`, looping as configured.
    pub fn fill(&mut self, buf: &[f64], loop_len: usize, start: usize, out: &mut [f64]) {
        for o in out.iter_mut() {
            *o = self.next(buf, loop_len, start);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_loop_never_passes_midpoint() {
        let buf: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let loop_len = loop_length(buf.len(), 0.5);
        let start = start_index(buf.len(), 0.0);
        assert_eq!(loop_len, 500);

        let mut c = ExcitationCursor::new();
        let mut restarts = 0;
        for _ in 0..10_000 {
            let before = c.position();
            let x = c.next(&buf, loop_len, start);
            // the sample read is the sample at the cursor
            assert_eq!(x, before as f64);
            assert!(before < 500, "cursor reached {before}");
            if c.position() == start {
                restarts += 1;
            }
        }
        assert_eq!(restarts, 20);
    }

    #[test]
    fn restart_goes_to_start_offset() {
        let buf: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let loop_len = loop_length(buf.len(), 0.1);
        let start = start_index(buf.len(), 0.25);
        let mut c = ExcitationCursor::new();
        c.reset(start);
        let mut out = [0.0; 25];
        c.fill(&buf, loop_len, start, &mut out);
        assert_eq!(out[0], 25.0);
        assert_eq!(out[9], 34.0);
        assert_eq!(out[10], 25.0);
        assert_eq!(out[20], 25.0);
        assert_eq!(c.loop_count(), 5);
    }

    #[test]
    fn safety_wrap_at_buffer_end() {
        // start near the end with a full-length loop window: the cursor must
        // wrap to 0 when it runs off the buffer, before the loop restarts.
        let buf = [1.0, 2.0, 3.0, 4.0];
        let start = start_index(buf.len(), 0.75);
        let mut c = ExcitationCursor::new();
        c.reset(start);
        let got: Vec<f64> = (0..6).map(|_| c.next(&buf, 4, start)).collect();
        assert_eq!(got, vec![4.0, 1.0, 2.0, 3.0, 4.0, 1.0]);
        assert!(c.position() < buf.len());
    }

    #[test]
    fn shrinking_buffer_never_indexes_out_of_range() {
        let long = vec![0.5; 64];
        let short = [0.25; 8];
        let mut c = ExcitationCursor::new();
        for _ in 0..40 {
            c.next(&long, 64, 0);
        }
        assert_eq!(c.next(&short, 8, 0), 0.25);
    }

    #[test]
    fn loop_length_and_start_are_bounded() {
        assert_eq!(loop_length(1000, 0.0001), 1);
        assert_eq!(loop_length(1000, 2.0), 1000);
        assert_eq!(loop_length(1000, f64::NAN), 1000);
        assert_eq!(loop_length(0, 0.5), 0);
        assert_eq!(start_index(1000, 1.0), 999);
        assert_eq!(start_index(1000, -1.0), 0);
        assert_eq!(start_index(0, 0.5), 0);
    }

    #[test]
    fn empty_buffer_reads_silence() {
        let mut c = ExcitationCursor::new();
        assert_eq!(c.next(&[], 0, 0), 0.0);
        assert_eq!(c.position(), 0);
    }
}
