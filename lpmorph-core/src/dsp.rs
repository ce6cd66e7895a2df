//! Math backend and small numeric helpers shared by the analysis and synthesis code.
//!
//! Design goals:
//! - `no_std` ready (guarded by the crate feature `no-std`)
//! - Math backend selection that works in both `std` and `no_std` contexts
//! - Everything in `f64`: the Levinson-Durbin recursion and the recursive
//!   synthesis filters are too sensitive for single precision at high orders
//!
//! Conventions:
//! - All functions are `#[inline]` where useful to help the optimizer.
//! - Argument and return domains are documented per function.

#![allow(clippy::excessive_precision)]

use core::f64::consts::PI;

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    // libm (C math) in no_std
    if #[cfg(feature = "no-std")] {
        #[inline] pub(crate) fn m_cos(x: f64) -> f64 { libm::cos(x) }
        #[inline] pub(crate) fn m_sqrt(x: f64) -> f64 { libm::sqrt(x) }
        #[inline] pub(crate) fn m_exp(x: f64) -> f64 { libm::exp(x) }
        #[inline] pub(crate) fn m_abs(x: f64) -> f64 { libm::fabs(x) }
    // std backend
    } else {
        #[inline] pub(crate) fn m_cos(x: f64) -> f64 { x.cos() }
        #[inline] pub(crate) fn m_sqrt(x: f64) -> f64 { x.sqrt() }
        #[inline] pub(crate) fn m_exp(x: f64) -> f64 { x.exp() }
        #[inline] pub(crate) fn m_abs(x: f64) -> f64 { x.abs() }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π (commonly useful)
pub const TAU: f64 = 2.0 * PI;

/// A very small epsilon used in denormal handling and safe divisions.
pub const EPS_SMALL: f64 = 1.0e-30;

// --------------------------------- Utilities -------------------------------------

#[inline]
pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    if x < lo { lo } else if x > hi { hi } else { x }
}

#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Kill denormal/subnormal values. Returns 0.0 if |x| < EPS_SMALL.
#[inline]
pub fn kill_denormals(x: f64) -> f64 {
    if m_abs(x) < EPS_SMALL { 0.0 } else { x }
}

/// Square root that maps negative (rounding-noise) inputs to zero.
#[inline]
pub fn safe_sqrt(x: f64) -> f64 {
    if x > 0.0 { m_sqrt(x) } else { 0.0 }
}

/// Root mean square; 0 for an empty slice.
#[inline]
pub fn rms(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    safe_sqrt(x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64)
}

// --------------------------------- dB / linear -----------------------------------

/// Convert dB to linear gain: lin = 10^(db/20).
#[inline]
pub fn db_to_lin(db: f64) -> f64 {
    if db <= -120.0 { 0.0 } else { m_exp(0.11512925464970229_f64 * db) } // ln(10)/20 ≈ 0.115129...
}

/// Convert a frame duration in milliseconds to a whole number of samples.
#[inline]
pub fn ms_to_samples(ms: f64, sr: f64) -> usize {
    let n = ms * sr / 1000.0;
    if n.is_finite() && n > 0.0 { n as usize } else { 0 }
}

// --------------------------------- Tests (std only) ------------------------------
