//! The selectable excitation list: a few generated factory sources followed
//! by whatever the host adds.
//!
//! The bank lives on the control side. Selecting an entry hands a clone (same
//! [`ExcitationId`](crate::excitation::ExcitationId)) to the audio thread, so
//! reselecting the current entry never restarts playback.

use lpmorph_core::dsp::ms_to_samples;

use crate::error::{ConfigError, ConfigResult};
use crate::excitation::Excitation;

/// Length of each generated factory source.
pub const FACTORY_MS: f64 = 1000.0;
pub const FACTORY_NOISE_SEED: u64 = 0x1a2b_3c4d;
pub const PULSE_HZ: f64 = 100.0;
pub const SAW_HZ: f64 = 110.0;

#[derive(Clone, Debug, Default)]
pub struct ExcitationBank {
    entries: Vec<Excitation>,
    factory: usize,
    selected: Option<usize>,
}

fn factory_entries(sample_rate: f64) -> Vec<Excitation> {
    let len = ms_to_samples(FACTORY_MS, sample_rate).max(1);
    let period = |hz: f64| ms_to_samples(1000.0 / hz, sample_rate).max(1);
    [
        Excitation::white_noise(len, FACTORY_NOISE_SEED),
        Excitation::pulse_train(len, period(PULSE_HZ)),
        Excitation::sawtooth(len, period(SAW_HZ)),
    ]
    .into_iter()
    .filter_map(Result::ok)
    .collect()
}

impl ExcitationBank {
    /// Factory sources generated for `sample_rate`, nothing selected.
    pub fn factory(sample_rate: f64) -> Self {
        let entries = factory_entries(sample_rate);
        Self { factory: entries.len(), entries, selected: None }
    }

    #[inline] pub fn len(&self) -> usize { self.entries.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    #[inline] pub fn factory_count(&self) -> usize { self.factory }

    /// Index of the entry last handed to the engine, if it came from the bank.
    #[inline] pub fn selected(&self) -> Option<usize> { self.selected }

    pub fn get(&self, index: usize) -> Option<&Excitation> {
        self.entries.get(index)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(Excitation::name)
    }

    /// Append a custom excitation; returns its index.
    pub fn add(&mut self, excitation: Excitation) -> usize {
        self.entries.push(excitation);
        self.entries.len() - 1
    }

    /// Select `index` (`None` selects no excitation). Returns what the engine
    /// should now play.
    pub fn select(&mut self, index: Option<usize>) -> ConfigResult<Option<Excitation>> {
        let chosen = match index {
            Some(i) => {
                let ex = self.entries.get(i).ok_or(ConfigError::ExcitationIndexOutOfRange { index: i, len: self.len() })?;
                Some(ex.clone())
            }
            None => None,
        };
        self.selected = index;
        Ok(chosen)
    }

    /// The current excitation came from outside the bank.
    pub(crate) fn deselect(&mut self) {
        self.selected = None;
    }

    /// Regenerate the factory sources for a new sample rate. Custom entries
    /// are kept. Returns the replacement if a factory entry is selected.
    pub fn retune(&mut self, sample_rate: f64) -> Option<Excitation> {
        let fresh = factory_entries(sample_rate);
        if fresh.len() != self.factory {
            return None;
        }
        for (slot, ex) in self.entries.iter_mut().zip(fresh) {
            *slot = ex;
        }
        self.selected.filter(|&i| i < self.factory).and_then(|i| self.entries.get(i).cloned())
    }
}
