//! Thread-safe engine controls.
//!
//! Control threads write through `&self` setters; the audio thread copies
//! everything once per block in [`Controls::snapshot`]. Floats are stored as
//! bit patterns in `AtomicU64`. The audio thread never locks; only the
//! excitation bank sits behind a mutex, and only control threads touch it.
//!
//! The same struct carries audio-thread observability back out: a warning
//! counter, the last warning bits and the channel-0 excitation cursor.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use lpmorph_core::dsp::db_to_lin;
use lpmorph_core::guard::Warnings;

use crate::bank::ExcitationBank;
use crate::config::{EngineConfig, MIN_FRAME_LENGTH};
use crate::error::{ConfigError, ConfigResult};
use crate::excitation::Excitation;
use crate::mailbox::ExcitationMailbox;

pub const MIN_WET_GAIN_DB: f64 = -40.0;
pub const MAX_WET_GAIN_DB: f64 = 20.0;
pub const MIN_EXCITATION_LOOP: f64 = 0.0001;

/// `f64` in an `AtomicU64`.
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

/// Values read by the audio thread at block start.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ControlSnapshot {
    pub order: usize,
    pub frame_length: usize,
    pub mix: f64,
    pub excitation_loop: f64,
    pub excitation_start: f64,
    /// Linear, already converted from dB.
    pub wet_gain: f64,
    pub sidechain: bool,
    pub level_match: bool,
}

pub struct Controls {
    // limits, updated on reconfigure
    max_order: AtomicUsize,
    max_frame_length: AtomicUsize,
    sample_rate: AtomicF64,

    order: AtomicUsize,
    frame_length: AtomicUsize,
    mix: AtomicF64,
    excitation_loop: AtomicF64,
    excitation_start: AtomicF64,
    wet_gain_db: AtomicF64,
    sidechain: AtomicBool,
    level_match: AtomicBool,
    mailbox: ExcitationMailbox,
    bank: Mutex<ExcitationBank>,

    warning_count: AtomicU64,
    last_warnings: AtomicU32,
    cursor: AtomicUsize,
}

impl Controls {
    /// Controls with the plugin defaults for `config`.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_order: AtomicUsize::new(config.max_order),
            max_frame_length: AtomicUsize::new(config.max_frame_length),
            sample_rate: AtomicF64::new(config.sample_rate),
            order: AtomicUsize::new(config.default_order()),
            frame_length: AtomicUsize::new(config.default_frame_length()),
            mix: AtomicF64::new(1.0),
            excitation_loop: AtomicF64::new(1.0),
            excitation_start: AtomicF64::new(0.0),
            wet_gain_db: AtomicF64::new(0.0),
            sidechain: AtomicBool::new(false),
            level_match: AtomicBool::new(false),
            mailbox: ExcitationMailbox::new(),
            bank: Mutex::new(ExcitationBank::factory(config.sample_rate)),
            warning_count: AtomicU64::new(0),
            last_warnings: AtomicU32::new(0),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Adopt new limits after a reconfigure, pulling stored values into range.
    pub(crate) fn apply_limits(&self, config: &EngineConfig) {
        self.max_order.store(config.max_order, Ordering::Relaxed);
        self.max_frame_length.store(config.max_frame_length, Ordering::Relaxed);
        if self.sample_rate.load() != config.sample_rate {
            if let Some(ex) = self.bank().retune(config.sample_rate) {
                debug!("regenerated '{}' for {} Hz", ex.name(), config.sample_rate);
                self.mailbox.post(Some(ex));
            }
        }
        self.sample_rate.store(config.sample_rate);
        let order = self.order.load(Ordering::Relaxed).clamp(1, config.max_order);
        self.order.store(order, Ordering::Relaxed);
        let frame = self.frame_length.load(Ordering::Relaxed).clamp(MIN_FRAME_LENGTH, config.max_frame_length);
        self.frame_length.store(frame, Ordering::Relaxed);
    }

    // ---- parameters ------------------------------------------------------------

    pub fn set_order(&self, order: usize) -> ConfigResult<()> {
        let max = self.max_order.load(Ordering::Relaxed);
        if !(1..=max).contains(&order) {
            warn!("rejected prediction order {order} (max {max})");
            return Err(ConfigError::OrderOutOfRange { requested: order, max });
        }
        self.order.store(order, Ordering::Relaxed);
        Ok(())
    }

    pub fn set_frame_length(&self, samples: usize) -> ConfigResult<()> {
        let max = self.max_frame_length.load(Ordering::Relaxed);
        if !(MIN_FRAME_LENGTH..=max).contains(&samples) {
            warn!("rejected frame length {samples} (range {MIN_FRAME_LENGTH}..={max})");
            return Err(ConfigError::FrameLengthOutOfRange { requested: samples, min: MIN_FRAME_LENGTH, max });
        }
        self.frame_length.store(samples, Ordering::Relaxed);
        Ok(())
    }

    /// Frame duration control. Durations outside 0.1..=50 ms are clamped, as
    /// is the resulting length. Returns the frame length in samples.
    pub fn set_frame_duration_ms(&self, ms: f64) -> ConfigResult<usize> {
        let sample_rate = self.sample_rate.load();
        let max = self.max_frame_length.load(Ordering::Relaxed);
        let samples = EngineConfig::new(sample_rate, 1, max).frame_length_for_ms(ms);
        self.set_frame_length(samples)?;
        Ok(samples)
    }

    pub fn set_mix(&self, mix: f64) {
        if mix.is_finite() {
            self.mix.store(mix.clamp(0.0, 1.0));
        }
    }

    pub fn set_excitation_loop(&self, fraction: f64) {
        if fraction.is_finite() {
            self.excitation_loop.store(fraction.clamp(MIN_EXCITATION_LOOP, 1.0));
        }
    }

    pub fn set_excitation_start(&self, fraction: f64) {
        if fraction.is_finite() {
            self.excitation_start.store(fraction.clamp(0.0, 1.0));
        }
    }

    pub fn set_wet_gain_db(&self, db: f64) {
        if db.is_finite() {
            self.wet_gain_db.store(db.clamp(MIN_WET_GAIN_DB, MAX_WET_GAIN_DB));
        }
    }

    pub fn set_sidechain(&self, enabled: bool) {
        self.sidechain.store(enabled, Ordering::Relaxed);
    }

    /// Scale each wet frame to the RMS of the frame it was analysed from.
    pub fn set_level_match(&self, enabled: bool) {
        self.level_match.store(enabled, Ordering::Relaxed);
    }

    // ---- excitation -----------------------------------------------------------

    fn bank(&self) -> MutexGuard<'_, ExcitationBank> {
        self.bank.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a new excitation buffer to the audio thread, bypassing the bank.
    /// Posting a clone of the playing excitation changes nothing.
    pub fn set_excitation(&self, excitation: Excitation) {
        debug!("posting excitation '{}' ({} samples)", excitation.name(), excitation.len());
        self.bank().deselect();
        self.mailbox.post(Some(excitation));
    }

    /// Remove the excitation; without sidechain the engine then passes input through.
    pub fn clear_excitation(&self) {
        debug!("clearing excitation");
        self.bank().deselect();
        self.mailbox.post(None);
    }

    /// Play bank entry `index`, or nothing for `None`. Reselecting the
    /// current entry keeps the excitation cursor where it is.
    pub fn select_excitation(&self, index: Option<usize>) -> ConfigResult<()> {
        let mut bank = self.bank();
        let chosen = bank.select(index).inspect_err(|e| warn!("rejected excitation selection: {e}"))?;
        match &chosen {
            Some(ex) => debug!("selected excitation {} '{}'", index.unwrap_or_default(), ex.name()),
            None => debug!("selected no excitation"),
        }
        self.mailbox.post(chosen);
        Ok(())
    }

    /// Add a custom excitation to the bank without selecting it.
    pub fn add_excitation(&self, excitation: Excitation) -> usize {
        let index = self.bank().add(excitation);
        debug!("excitation bank entry {index} added");
        index
    }

    /// Bank entry currently selected; `None` after `set_excitation`,
    /// `clear_excitation` or `select_excitation(None)`.
    pub fn selected_excitation(&self) -> Option<usize> {
        self.bank().selected()
    }

    pub fn excitation_names(&self) -> Vec<String> {
        self.bank().names().map(str::to_owned).collect()
    }

    /// Free buffers the audio thread has swapped out.
    pub fn collect_garbage(&self) -> bool {
        self.mailbox.collect()
    }

    pub fn order(&self) -> usize { self.order.load(Ordering::Relaxed) }
    pub fn frame_length(&self) -> usize { self.frame_length.load(Ordering::Relaxed) }
    pub fn mix(&self) -> f64 { self.mix.load() }
    pub fn excitation_loop(&self) -> f64 { self.excitation_loop.load() }
    pub fn excitation_start(&self) -> f64 { self.excitation_start.load() }
    pub fn wet_gain_db(&self) -> f64 { self.wet_gain_db.load() }
    pub fn sidechain(&self) -> bool { self.sidechain.load(Ordering::Relaxed) }
    pub fn level_match(&self) -> bool { self.level_match.load(Ordering::Relaxed) }

    // ---- audio thread ---------------------------------------------------------

    pub(crate) fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            order: self.order(),
            frame_length: self.frame_length(),
            mix: self.mix(),
            excitation_loop: self.excitation_loop(),
            excitation_start: self.excitation_start(),
            wet_gain: db_to_lin(self.wet_gain_db()),
            sidechain: self.sidechain(),
            level_match: self.level_match(),
        }
    }

    pub(crate) fn mailbox(&self) -> &ExcitationMailbox {
        &self.mailbox
    }

    pub(crate) fn record_warnings(&self, w: Warnings) {
        if !w.is_empty() {
            self.warning_count.fetch_add(1, Ordering::Relaxed);
            self.last_warnings.store(w.bits(), Ordering::Relaxed);
        }
    }

    pub(crate) fn publish_cursor(&self, position: usize) {
        self.cursor.store(position, Ordering::Relaxed);
    }

    // ---- observability --------------------------------------------------------

    /// Number of `process` calls that raised a warning.
    pub fn warning_count(&self) -> u64 {
        self.warning_count.load(Ordering::Relaxed)
    }

    pub fn last_warnings(&self) -> Warnings {
        Warnings::from_bits(self.last_warnings.load(Ordering::Relaxed))
    }

    /// Channel-0 excitation read position, for a waveform playhead.
    pub fn excitation_cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}
