//! Excitation buffers: immutable, shared sample data the engine drives its
//! all-pole filters with.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ConfigError, ConfigResult};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one constructed excitation. Clones keep it, so reposting the
/// same buffer is recognisable as "no change".
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExcitationId(u64);

impl ExcitationId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Immutable excitation samples plus a display name.
///
/// Cloning is cheap (the samples live behind an `Arc`); the engine only ever
/// reads them.
#[derive(Clone)]
pub struct Excitation {
    id: ExcitationId,
    name: String,
    samples: Arc<[f64]>,
}

impl fmt::Debug for Excitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Excitation")
            .field("id", &self.id.0)
            .field("name", &self.name)
            .field("len", &self.samples.len())
            .finish()
    }
}

impl Excitation {
    /// Take ownership of `samples`. Non-finite values are replaced by 0.
    pub fn from_samples(name: impl Into<String>, mut samples: Vec<f64>) -> ConfigResult<Self> {
        if samples.is_empty() {
            return Err(ConfigError::EmptyExcitation);
        }
        for s in &mut samples {
            if !s.is_finite() {
                *s = 0.0;
            }
        }
        Ok(Self { id: ExcitationId::next(), name: name.into(), samples: samples.into() })
    }

    pub fn from_f32(name: impl Into<String>, samples: &[f32]) -> ConfigResult<Self> {
        Self::from_samples(name, samples.iter().map(|&s| f64::from(s)).collect())
    }

    /// 16-bit PCM, scaled by 1/32768.
    pub fn from_i16(name: impl Into<String>, samples: &[i16]) -> ConfigResult<Self> {
        Self::from_samples(name, samples.iter().map(|&s| f64::from(s) / 32_768.0).collect())
    }

    /// Uniform white noise in `[-1, 1)`, reproducible for a given seed.
    pub fn white_noise(len: usize, seed: u64) -> ConfigResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let samples = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Self::from_samples("white noise", samples)
    }

    /// Unit impulses every `period` samples.
    pub fn pulse_train(len: usize, period: usize) -> ConfigResult<Self> {
        let period = period.max(1);
        let samples = (0..len).map(|n| if n % period == 0 { 1.0 } else { 0.0 }).collect();
        Self::from_samples("pulse train", samples)
    }

    /// Naive rising sawtooth in `[-1, 1)` with a `period`-sample cycle.
    pub fn sawtooth(len: usize, period: usize) -> ConfigResult<Self> {
        let period = period.max(1);
        let samples = (0..len).map(|n| 2.0 * (n % period) as f64 / period as f64 - 1.0).collect();
        Self::from_samples("sawtooth", samples)
    }

    #[inline] pub fn id(&self) -> ExcitationId { self.id }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Another handle onto the same sample data.
    pub fn shared(&self) -> Arc<[f64]> {
        Arc::clone(&self.samples)
    }
}
