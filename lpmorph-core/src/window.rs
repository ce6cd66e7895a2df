//! Analysis window and windowed autocorrelation.
//!
//! The window table is allocated once for the largest supported frame and
//! recomputed in place when the frame length changes, so a live frame-length
//! change costs `len` cosines and no allocation.
//!
//! `w[i] = 0.5 (1 - cos(2π i / (L-1)))`
//!
//! `autocorrelate(x, lag) = Σ_{n=0}^{L-lag-1} x[n] x[n+lag]`

use alloc::vec;
use alloc::vec::Vec;

use cfg_if::cfg_if;

use crate::dsp::{m_cos, TAU};

/// Symmetric Hann coefficient `i` of an `len`-point window.
#[inline]
pub fn hann(i: usize, len: usize) -> f64 {
    if len < 2 {
        return 1.0;
    }
    0.5 * (1.0 - m_cos(TAU * i as f64 / (len - 1) as f64))
}

/// Precomputed Hann window of runtime-changeable length.
#[derive(Clone, Debug)]
pub struct AnalysisWindow {
    table: Vec<f64>,
    len: usize,
}

impl AnalysisWindow {
    /// Allocate for frames up to `max_len` samples and compute a full-length window.
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        let mut w = Self { table: vec![0.0; max_len], len: 0 };
        w.set_length(max_len);
        w
    }

    #[inline] pub fn len(&self) -> usize { self.len }
    #[inline] pub fn is_empty(&self) -> bool { self.len == 0 }
    #[inline] pub fn max_len(&self) -> usize { self.table.len() }

    /// Recompute the table for a new frame length (clamped to capacity).
    /// Returns the length actually in effect.
    pub fn set_length(&mut self, len: usize) -> usize {
        let len = len.clamp(1, self.table.len());
        if len != self.len {
            for (i, w) in self.table[..len].iter_mut().enumerate() {
                *w = hann(i, len);
            }
            self.len = len;
        }
        len
    }

    #[inline]
    pub fn coefficients(&self) -> &[f64] {
        &self.table[..self.len]
    }

    /// Multiply `frame[..len]` by the window.
    #[inline]
    pub fn apply(&self, frame: &mut [f64]) {
        for (s, w) in frame.iter_mut().zip(self.coefficients()) {
            *s *= *w;
        }
    }
}

// ------------------------------- Autocorrelation ---------------------------------

/// Autocorrelation of `x` at a single `lag`. Lags at or past the frame end are 0.
#[inline]
pub fn autocorrelate(x: &[f64], lag: usize) -> f64 {
    if lag >= x.len() {
        return 0.0;
    }
    dot(&x[..x.len() - lag], &x[lag..])
}

/// Fill `phi[0..=order]` with the autocorrelation of `x` (`order = phi.len() - 1`).
pub fn autocorrelation(x: &[f64], phi: &mut [f64]) {
    for (lag, p) in phi.iter_mut().enumerate() {
        *p = autocorrelate(x, lag);
    }
}

cfg_if! {
    if #[cfg(feature = "simd")] {
        #[inline]
        fn dot(a: &[f64], b: &[f64]) -> f64 {
            use wide::f64x4;

            let n = a.len().min(b.len());
            let chunks = n / 4;
            let mut acc = f64x4::splat(0.0);
            for c in 0..chunks {
                let i = c * 4;
                let va = f64x4::from([a[i], a[i + 1], a[i + 2], a[i + 3]]);
                let vb = f64x4::from([b[i], b[i + 1], b[i + 2], b[i + 3]]);
                acc += va * vb;
            }
            let lanes = acc.to_array();
            let mut res = lanes[0] + lanes[1] + lanes[2] + lanes[3];
            for i in chunks * 4..n {
                res += a[i] * b[i];
            }
            res
        }
    } else {
        #[inline]
        fn dot(a: &[f64], b: &[f64]) -> f64 {
            let mut res = 0.0;
            for (x, y) in a.iter().zip(b) {
                res += x * y;
            }
            res
        }
    }
}
