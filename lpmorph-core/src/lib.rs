#![cfg_attr(not(feature = "std"), no_std)]
//! LPMorph Core: no_std-ready LPC analysis/resynthesis primitives.
//!
//! Features
//! - `std`      : (default) use the Rust standard library
//! - `no-std`   : build with `#![no_std]` + `alloc` and use the `libm` math backend
//! - `simd`     : autocorrelation inner product on `wide::f64x4` lanes
//!
//! Modules
//! - [`dsp`]        : math backend, small numeric helpers (db/lin, denormals)
//! - [`ring`]       : power-of-two circular sample store
//! - [`filters`]    : one-pole pre-emphasis high-pass
//! - [`window`]     : Hann analysis window, autocorrelation
//! - [`levinson`]   : Levinson-Durbin recursion, step-up
//! - [`synth`]      : direct-form and lattice all-pole filters
//! - [`excitation`] : looping excitation cursor
//! - [`guard`]      : gain ramp, wet/dry mix, NaN/clip guard
//!
//! Design
//! - Everything allocates in `new` and never again
//! - All arithmetic in `f64`
//! - No panics on bad data; degenerate input degrades to silence

extern crate alloc;

pub mod dsp;
pub mod excitation;
pub mod filters;
pub mod guard;
pub mod levinson;
pub mod ring;
pub mod synth;
pub mod window;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::dsp::{clamp, db_to_lin, kill_denormals, lerp, ms_to_samples, TAU};
    pub use crate::excitation::{loop_length, start_index, ExcitationCursor};
    pub use crate::filters::{OnePoleHP, PRE_EMPHASIS_HZ};
    pub use crate::guard::{guard, mix, GainRamp, Warnings};
    pub use crate::levinson::{LevinsonDurbin, REFLECTION_LIMIT, REFLECTION_MAX};
    pub use crate::ring::RingBuffer;
    pub use crate::synth::{AllPole, FilterForm, SynthesisFilter};
    pub use crate::window::{autocorrelation, AnalysisWindow};
}
