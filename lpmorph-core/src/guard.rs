//! Block gain ramp, wet/dry mix and output sanitization.
//!
//! The guard never fails: NaN becomes silence, anything past full scale is
//! folded down to ±0.5, and each case raises a bit in [`Warnings`] for the
//! caller to publish.

use core::ops::{BitOr, BitOrAssign};

use crate::dsp::m_abs;

/// Warning bits raised by the real-time path.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Warnings(u32);

impl Warnings {
    pub const NONE: Self = Self(0);
    /// An output sample was NaN and was replaced by 0.
    pub const NAN: Self = Self(1 << 0);
    /// An output sample exceeded full scale and was attenuated.
    pub const CLIP: Self = Self(1 << 1);
    /// `process` was called with a channel index the engine does not have.
    pub const BAD_CHANNEL: Self = Self(1 << 2);

    #[inline] pub const fn bits(self) -> u32 { self.0 }
    #[inline] pub const fn from_bits(bits: u32) -> Self { Self(bits & 0b111) }
    #[inline] pub const fn is_empty(self) -> bool { self.0 == 0 }
    #[inline] pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }
    #[inline] pub fn insert(&mut self, other: Self) { self.0 |= other.0; }
}

impl BitOr for Warnings {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

impl BitOrAssign for Warnings {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) { self.0 |= rhs.0; }
}

/// Linear gain interpolation across one block: `gain(s) = prev + slope·s`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GainRamp {
    start: f64,
    slope: f64,
}

impl GainRamp {
    /// Ramp from `previous` to `current` over `samples` samples.
    #[inline]
    pub fn new(previous: f64, current: f64, samples: usize) -> Self {
        let slope = if samples > 0 { (current - previous) / samples as f64 } else { 0.0 };
        Self { start: previous, slope }
    }

    /// Constant gain.
    #[inline]
    pub fn flat(gain: f64) -> Self {
        Self { start: gain, slope: 0.0 }
    }

    #[inline]
    pub fn at(&self, s: usize) -> f64 {
        self.start + self.slope * s as f64
    }
}

/// `mix·gain·wet + (1-mix)·dry`
#[inline]
pub fn mix(mix: f64, gain: f64, wet: f64, dry: f64) -> f64 {
    mix * gain * wet + (1.0 - mix) * dry
}

/// Sanitize one output sample, recording what was corrected.
#[inline]
pub fn guard(x: f64, warnings: &mut Warnings) -> f64 {
    if x.is_nan() {
        warnings.insert(Warnings::NAN);
        return 0.0;
    }
    let mag = m_abs(x);
    if mag > 1.0 {
        warnings.insert(Warnings::CLIP);
        // x / (2|x|), written so ±inf lands on ±0.5 as well
        return if x > 0.0 { 0.5 } else { -0.5 };
    }
    x
}
