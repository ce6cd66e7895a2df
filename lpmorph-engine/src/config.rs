//! Static engine configuration and the per-block parameter snapshot.

use lpmorph_core::dsp::ms_to_samples;
pub use lpmorph_core::synth::FilterForm;

use crate::error::{ConfigError, ConfigResult};

/// Shortest frame the scheduler accepts (hop of 2).
pub const MIN_FRAME_LENGTH: usize = 4;

/// Largest frame any configuration may ask for (about 23 s at 44.1 kHz).
pub const MAX_FRAME_LENGTH: usize = 1 << 20;

/// Default (and the plugin's) prediction-order ceiling.
pub const DEFAULT_MAX_ORDER: usize = 100;

/// Hard upper bound for `max_order`.
pub const ORDER_LIMIT: usize = 1024;

pub const DEFAULT_SAMPLE_RATE: f64 = 44_100.0;

/// Frame-duration control range, milliseconds.
pub const MIN_FRAME_MS: f64 = 0.1;
pub const MAX_FRAME_MS: f64 = 50.0;
pub const DEFAULT_FRAME_MS: f64 = 50.0;

/// What happens to the synthesis filter state after each frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum HistoryPolicy {
    /// Zero the history after every synthesized frame.
    #[default]
    ResetEachHop,
    /// Carry the history into the next frame (continuous resonance).
    Persist,
}

/// Everything that needs a `configure` call to change.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: f64,
    pub channels: usize,
    pub max_frame_length: usize,
    pub max_order: usize,
    pub filter_form: FilterForm,
    pub history: HistoryPolicy,
    pub pre_emphasis: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::for_sample_rate(DEFAULT_SAMPLE_RATE, 2)
    }
}

impl EngineConfig {
    pub fn new(sample_rate: f64, channels: usize, max_frame_length: usize) -> Self {
        Self {
            sample_rate,
            channels,
            max_frame_length,
            max_order: DEFAULT_MAX_ORDER,
            filter_form: FilterForm::default(),
            history: HistoryPolicy::default(),
            pre_emphasis: true,
        }
    }

    /// Configuration whose largest frame is the longest frame duration
    /// (50 ms) at `sample_rate`.
    pub fn for_sample_rate(sample_rate: f64, channels: usize) -> Self {
        let max = if sample_rate.is_finite() && sample_rate > 0.0 {
            ms_to_samples(MAX_FRAME_MS, sample_rate).max(MIN_FRAME_LENGTH)
        } else {
            MIN_FRAME_LENGTH
        };
        Self::new(sample_rate, channels, max)
    }

    pub fn with_max_order(mut self, max_order: usize) -> Self {
        self.max_order = max_order;
        self
    }

    pub fn with_filter_form(mut self, form: FilterForm) -> Self {
        self.filter_form = form;
        self
    }

    pub fn with_history(mut self, history: HistoryPolicy) -> Self {
        self.history = history;
        self
    }

    pub fn with_pre_emphasis(mut self, on: bool) -> Self {
        self.pre_emphasis = on;
        self
    }

    /// Samples the delay lines and accumulator must hold: the dry path looks
    /// back one frame and overlap-add writes reach one hop past a frame.
    pub fn required_capacity(&self) -> usize {
        self.max_frame_length.saturating_add(self.max_frame_length / 2)
    }

    /// Power-of-two ring size, twice the largest frame.
    pub fn ring_capacity(&self) -> ConfigResult<usize> {
        let required = self.required_capacity();
        let capacity = self
            .max_frame_length
            .checked_mul(2)
            .and_then(usize::checked_next_power_of_two)
            .unwrap_or(0);
        if capacity < required {
            return Err(ConfigError::CapacityTooSmall { capacity, required });
        }
        Ok(capacity)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        if !(MIN_FRAME_LENGTH..=MAX_FRAME_LENGTH).contains(&self.max_frame_length) {
            return Err(ConfigError::FrameLengthOutOfRange {
                requested: self.max_frame_length,
                min: MIN_FRAME_LENGTH,
                max: MAX_FRAME_LENGTH,
            });
        }
        if !(1..=ORDER_LIMIT).contains(&self.max_order) {
            return Err(ConfigError::OrderOutOfRange { requested: self.max_order, max: ORDER_LIMIT });
        }
        self.ring_capacity().map(|_| ())
    }

    /// Frame length for `ms` milliseconds at this sample rate, clamped to what
    /// the engine can hold.
    pub fn frame_length_for_ms(&self, ms: f64) -> usize {
        let ms = if ms.is_finite() { ms.clamp(MIN_FRAME_MS, MAX_FRAME_MS) } else { DEFAULT_FRAME_MS };
        ms_to_samples(ms, self.sample_rate).clamp(MIN_FRAME_LENGTH, self.max_frame_length)
    }

    pub fn default_frame_length(&self) -> usize {
        self.frame_length_for_ms(DEFAULT_FRAME_MS)
    }

    pub fn default_order(&self) -> usize {
        DEFAULT_MAX_ORDER.min(self.max_order)
    }
}

/// Per-block values passed into `process`; constant for the whole block.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BlockParams {
    /// Wet/dry ratio, 0 = dry only.
    pub mix: f64,
    /// Fraction of the excitation buffer to loop over.
    pub excitation_loop: f64,
    /// Loop restart point as a fraction of the excitation length.
    pub excitation_start: f64,
    /// Linear wet gain at the start of the block.
    pub previous_gain: f64,
    /// Linear wet gain reached at the end of the block.
    pub current_gain: f64,
    /// Rescale each wet frame to the input frame's RMS.
    pub level_match: bool,
}

impl Default for BlockParams {
    fn default() -> Self {
        Self { mix: 1.0, excitation_loop: 1.0, excitation_start: 0.0, previous_gain: 1.0, current_gain: 1.0, level_match: false }
    }
}
