//! Per-channel state and the per-sample / per-hop processing loop.

use lpmorph_core::dsp::rms;
use lpmorph_core::excitation::ExcitationCursor;
use lpmorph_core::filters::{OnePoleHP, PRE_EMPHASIS_HZ};
use lpmorph_core::guard::{guard, mix, GainRamp, Warnings};
use lpmorph_core::levinson::LevinsonDurbin;
use lpmorph_core::ring::RingBuffer;
use lpmorph_core::synth::{AllPole, SynthesisFilter};
use lpmorph_core::window::{autocorrelation, AnalysisWindow};

use crate::config::{BlockParams, EngineConfig, HistoryPolicy};
use crate::scheduler::FrameScheduler;

/// Scratch shared by all channels: the analysis window and the transient
/// prediction model. One per engine, sized for the configured maxima.
#[derive(Clone, Debug)]
pub struct FrameAnalyzer {
    window: AnalysisWindow,
    frame: Vec<f64>,
    excitation: Vec<f64>,
    phi: Vec<f64>,
    model: LevinsonDurbin,
    order: usize,
}

impl FrameAnalyzer {
    pub fn new(config: &EngineConfig, frame_len: usize, order: usize) -> Self {
        let mut window = AnalysisWindow::new(config.max_frame_length);
        window.set_length(frame_len);
        Self {
            window,
            frame: vec![0.0; config.max_frame_length],
            excitation: vec![0.0; config.max_frame_length],
            phi: vec![0.0; config.max_order + 1],
            model: LevinsonDurbin::new(config.max_order),
            order: order.min(config.max_order),
        }
    }

    #[inline] pub fn frame_length(&self) -> usize { self.window.len() }
    #[inline] pub fn order(&self) -> usize { self.order }

    pub(crate) fn set_order(&mut self, order: usize) {
        self.order = order.clamp(1, self.model.max_order());
    }

    pub(crate) fn set_frame_length(&mut self, len: usize) -> usize {
        self.window.set_length(len)
    }
}

/// Where a frame's excitation comes from.
#[derive(Copy, Clone, Debug)]
pub enum Source<'a> {
    /// Stored buffer read through the looping cursor.
    Buffer { samples: &'a [f64], loop_len: usize, start: usize },
    /// The sidechain samples aligned with the analysed frame.
    Sidechain,
}

/// Settings fixed at configure time that the inner loop needs.
#[derive(Copy, Clone, Debug)]
pub struct ChannelOptions {
    pub pre_emphasis: bool,
    pub history: HistoryPolicy,
}

impl From<&EngineConfig> for ChannelOptions {
    fn from(c: &EngineConfig) -> Self {
        Self { pre_emphasis: c.pre_emphasis, history: c.history }
    }
}

pub struct ChannelState {
    input: RingBuffer<f64>,
    sidechain: RingBuffer<f64>,
    output: RingBuffer<f64>,
    scheduler: FrameScheduler,
    pre_emphasis: OnePoleHP,
    filter: SynthesisFilter,
    cursor: ExcitationCursor,
    /// Wet scale from level matching, updated per frame.
    level: f64,
}

impl ChannelState {
    pub fn new(config: &EngineConfig, capacity: usize, frame_len: usize) -> Self {
        Self {
            input: RingBuffer::new(capacity),
            sidechain: RingBuffer::new(capacity),
            output: RingBuffer::new(capacity),
            scheduler: FrameScheduler::new(capacity, frame_len),
            pre_emphasis: OnePoleHP::new(PRE_EMPHASIS_HZ, config.sample_rate),
            filter: SynthesisFilter::new(config.filter_form, config.max_order),
            cursor: ExcitationCursor::new(),
            level: 1.0,
        }
    }

    #[inline] pub fn excitation_cursor(&self) -> usize { self.cursor.position() }
    #[inline] pub fn scheduler(&self) -> &FrameScheduler { &self.scheduler }

    /// Excitation changed: restart the cursor at `start` and drop the filter history.
    pub fn restart_excitation(&mut self, start: usize) {
        self.cursor.reset(start);
        self.filter.reset();
    }

    pub fn reset_history(&mut self) {
        self.filter.reset();
    }

    pub fn retime(&mut self, frame_len: usize) {
        self.scheduler.retime(frame_len, &mut self.output);
    }

    /// Clear every buffer and cursor.
    pub fn reset(&mut self) {
        self.input.clear();
        self.sidechain.clear();
        self.output.clear();
        self.scheduler.reset();
        self.pre_emphasis.reset();
        self.filter.reset();
        self.cursor.reset(0);
        self.level = 1.0;
    }

    /// Nothing drives the filter: copy `input` to `output` while keeping the
    /// delay line filled and the hop cadence running, so the dry path and
    /// the frame grid are current when an excitation arrives.
    pub fn bypass(&mut self, input: &[f32], output: &mut [f32]) {
        let n = input.len().min(output.len());
        for s in 0..n {
            let pos = self.scheduler.position();
            let x = f64::from(input[s]);
            self.input.write(pos, if x.is_finite() { x } else { 0.0 });
            self.sidechain.write(pos, 0.0);
            self.output.take(pos);
            output[s] = input[s];
            if self.scheduler.advance() {
                self.pre_emphasis.reset();
                self.scheduler.commit_frame();
            }
        }
    }

    /// Run one block. `input` and `output` are processed up to the shorter of
    /// the two; a missing or short sidechain reads as silence.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        analyzer: &mut FrameAnalyzer,
        source: Source<'_>,
        opts: ChannelOptions,
        input: &[f32],
        output: &mut [f32],
        sidechain: Option<&[f32]>,
        params: &BlockParams,
    ) -> Warnings {
        let mut warnings = Warnings::NONE;
        let n = input.len().min(output.len());
        let ramp = GainRamp::new(params.previous_gain, params.current_gain, n);
        let frame_len = analyzer.frame_length();

        for s in 0..n {
            let pos = self.scheduler.position();
            let x = f64::from(input[s]);
            self.input.write(pos, if x.is_finite() { x } else { 0.0 });
            let sc = sidechain.and_then(|sc| sc.get(s)).map_or(0.0, |&v| f64::from(v));
            self.sidechain.write(pos, if sc.is_finite() { sc } else { 0.0 });

            let wet = self.output.take(pos);
            let dry = self.input.read_delayed(pos, frame_len);
            let gain = if params.level_match { ramp.at(s) * self.level } else { ramp.at(s) };
            let y = guard(mix(params.mix, gain, wet, dry), &mut warnings);
            output[s] = y as f32;

            if self.scheduler.advance() {
                self.synthesize_frame(analyzer, source, opts, pos, params.level_match);
            }
        }
        warnings
    }

    /// Analyse the `frame_len` samples ending at `newest` and overlap-add one
    /// resynthesized frame.
    ///
    /// With `level_match` the frame is synthesized at unit gain and the wet
    /// scale becomes the windowed input RMS over the RMS of the accumulated
    /// output across the new frame.
    fn synthesize_frame(
        &mut self,
        an: &mut FrameAnalyzer,
        source: Source<'_>,
        opts: ChannelOptions,
        newest: usize,
        level_match: bool,
    ) {
        let len = an.window.len();
        let frame = &mut an.frame[..len];
        self.input.copy_recent(newest, frame);
        if frame.iter().all(|&x| x == 0.0) {
            // silence: leave the accumulator alone and flush the high-pass
            self.pre_emphasis.reset();
            self.scheduler.commit_frame();
            return;
        }
        an.window.apply(frame);
        let rms_in = if level_match { rms(frame) } else { 0.0 };
        if opts.pre_emphasis {
            self.pre_emphasis.process_in_place(frame);
            if !self.pre_emphasis.value().is_finite() {
                self.pre_emphasis.reset();
            }
        }

        let phi = &mut an.phi[..=an.order];
        autocorrelation(frame, phi);
        if phi[0] == 0.0 {
            self.scheduler.commit_frame();
            return;
        }

        an.model.solve(phi);
        self.filter.load(&an.model);
        let g = if level_match { 1.0 } else { an.model.gain() };

        match source {
            Source::Buffer { samples, loop_len, start } => {
                for n in 0..len {
                    let ex = self.cursor.next(samples, loop_len, start);
                    let y = self.filter.tick(g * ex);
                    self.scheduler.emit(&mut self.output, n, y);
                }
            }
            Source::Sidechain => {
                let ex = &mut an.excitation[..len];
                self.sidechain.copy_recent(newest, ex);
                for (n, &e) in ex.iter().enumerate() {
                    let y = self.filter.tick(g * e);
                    self.scheduler.emit(&mut self.output, n, y);
                }
            }
        }

        match opts.history {
            HistoryPolicy::ResetEachHop => self.filter.reset(),
            HistoryPolicy::Persist => self.filter.sanitize(),
        }
        if level_match {
            let start = self.scheduler.frame_start();
            let out = &mut an.excitation[..len];
            for (n, o) in out.iter_mut().enumerate() {
                *o = self.output.get(start + n);
            }
            let rms_out = rms(out);
            self.level = if rms_out > 0.0 && rms_in.is_finite() && (rms_in / rms_out).is_finite() {
                rms_in / rms_out
            } else {
                1.0
            };
        }
        self.scheduler.commit_frame();
    }
}
