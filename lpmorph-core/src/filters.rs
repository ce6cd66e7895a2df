//! Filters: the one-pole high-pass used to pre-emphasise analysis frames.
//!
//! The analysis frame is high-passed before autocorrelation so DC offset and
//! sub-audio rumble do not dominate the all-pole model. The filter keeps its
//! previous input/output across frames.
//!
//! Notes
//! - Uses the “RC” discretisation `y[n] = α (y[n-1] + x[n] - x[n-1])`
//!   with `α = RC / (RC + dt)`, `RC = 1 / (2π fc)`, `dt = 1 / sr`.

use crate::dsp::{kill_denormals, TAU};

/// Default pre-emphasis cutoff.
pub const PRE_EMPHASIS_HZ: f64 = 60.0;

/// One-pole high-pass, RC style.
#[derive(Copy, Clone, Debug)]
pub struct OnePoleHP {
    alpha: f64,
    x1: f64,
    y1: f64,
}

impl OnePoleHP {
    #[inline]
    pub fn new(cut_hz: f64, sr: f64) -> Self {
        let dt = 1.0 / sr.max(1.0);
        let rc = 1.0 / (TAU * cut_hz.max(1e-3));
        Self { alpha: rc / (rc + dt), x1: 0.0, y1: 0.0 }
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.alpha * (self.y1 + x - self.x1);
        self.x1 = x;
        self.y1 = kill_denormals(y);
        self.y1
    }

    /// Filter a whole frame in place.
    #[inline]
    pub fn process_in_place(&mut self, frame: &mut [f64]) {
        for s in frame.iter_mut() {
            *s = self.process(*s);
        }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }

    #[inline] pub fn value(&self) -> f64 { self.y1 }
    #[inline] pub fn alpha(&self) -> f64 { self.alpha }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_pole_hp_blocks_dc() {
        let sr = 48000.0;
        let mut hp = OnePoleHP::new(PRE_EMPHASIS_HZ, sr);
        let mut y = 0.0;
        for _ in 0..(sr as usize) {
            y = hp.process(1.0);
        }
        assert!(y.abs() < 1e-6, "y={}", y);
    }

    #[test]
    fn one_pole_hp_passes_high_frequencies() {
        let sr = 48000.0;
        let mut hp = OnePoleHP::new(PRE_EMPHASIS_HZ, sr);
        // Nyquist-rate alternation is almost untouched by a 60 Hz high-pass.
        let mut peak: f64 = 0.0;
        for n in 0..4800 {
            let x = if n % 2 == 0 { 1.0 } else { -1.0 };
            let y = hp.process(x);
            if n > 4000 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak > 0.99, "peak={}", peak);
    }

    #[test]
    fn silence_stays_exactly_silent() {
        let mut hp = OnePoleHP::new(PRE_EMPHASIS_HZ, 44100.0);
        let mut frame = [0.0f64; 64];
        hp.process_in_place(&mut frame);
        assert!(frame.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn alpha_matches_rc_formula() {
        let hp = OnePoleHP::new(60.0, 44100.0);
        let rc = 1.0 / (TAU * 60.0);
        let dt = 1.0 / 44100.0;
        assert!((hp.alpha() - rc / (rc + dt)).abs() < 1e-15);
    }
}
