//! LPMorph CLI: offline LPC resynthesis renderer with optional audition.
//!
//! `lpmorph-cli --input=voice.wav --output=out.wav --excitation=saw.wav --order=40 --frame-ms=20`

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, info, warn, Level, LevelFilter, Log, Metadata, Record};
use lpmorph_engine::{BlockRenderer, EngineConfig, Excitation, FilterForm, HistoryPolicy, LpcEngine};

#[derive(Debug)]
struct Args {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    excitation: Option<PathBuf>,
    factory: Option<usize>,
    sidechain: Option<PathBuf>,
    order: Option<usize>,
    frame_ms: Option<f64>,
    mix: Option<f64>,
    ex_len: Option<f64>,
    ex_start: Option<f64>,
    gain_db: Option<f64>,
    block: usize,
    form: FilterForm,
    history: HistoryPolicy,
    pre_emphasis: bool,
    match_level: bool,
    seed: u64,
    play: bool,
    device_name: Option<String>,
    list_devices: bool,
    verbose: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            excitation: None,
            factory: None,
            sidechain: None,
            order: None,
            frame_ms: None,
            mix: None,
            ex_len: None,
            ex_start: None,
            gain_db: None,
            block: 512,
            form: FilterForm::Direct,
            history: HistoryPolicy::ResetEachHop,
            pre_emphasis: true,
            match_level: false,
            seed: 0x1BC,
            play: false,
            device_name: None,
            list_devices: false,
            verbose: false,
        }
    }
}

fn parse_args() -> Result<Args> {
    let mut a = Args::default();
    for s in std::env::args().skip(1) {
        match s.as_str() {
            "--list-devices"     => { a.list_devices = true; continue; }
            "--play"             => { a.play = true; continue; }
            "--verbose" | "-v"   => { a.verbose = true; continue; }
            "--no-pre-emphasis"  => { a.pre_emphasis = false; continue; }
            "--match-level"      => { a.match_level = true; continue; }
            _ => {}
        }
        if let Some(rest) = s.strip_prefix("--input=")      { a.input = Some(rest.into()); continue; }
        if let Some(rest) = s.strip_prefix("--output=")     { a.output = Some(rest.into()); continue; }
        if let Some(rest) = s.strip_prefix("--excitation=") { a.excitation = Some(rest.into()); continue; }
        if let Some(rest) = s.strip_prefix("--factory=")    { a.factory = Some(number(&s, rest)?); continue; }
        if let Some(rest) = s.strip_prefix("--sidechain=")  { a.sidechain = Some(rest.into()); continue; }
        if let Some(rest) = s.strip_prefix("--order=")      { a.order = Some(number(&s, rest)?); continue; }
        if let Some(rest) = s.strip_prefix("--frame-ms=")   { a.frame_ms = Some(number(&s, rest)?); continue; }
        if let Some(rest) = s.strip_prefix("--mix=")        { a.mix = Some(number(&s, rest)?); continue; }
        if let Some(rest) = s.strip_prefix("--ex-len=")     { a.ex_len = Some(number(&s, rest)?); continue; }
        if let Some(rest) = s.strip_prefix("--ex-start=")   { a.ex_start = Some(number(&s, rest)?); continue; }
        if let Some(rest) = s.strip_prefix("--gain-db=")    { a.gain_db = Some(number(&s, rest)?); continue; }
        if let Some(rest) = s.strip_prefix("--block=")      { a.block = number(&s, rest)?; continue; }
        if let Some(rest) = s.strip_prefix("--seed=")       { a.seed = number(&s, rest)?; continue; }
        if let Some(rest) = s.strip_prefix("--device=")     { a.device_name = Some(rest.to_string()); continue; }
        if let Some(rest) = s.strip_prefix("--form=") {
            a.form = match rest {
                "direct" => FilterForm::Direct,
                "lattice" => FilterForm::Lattice,
                other => bail!("--form must be direct or lattice, got {other:?}"),
            };
            continue;
        }
        if let Some(rest) = s.strip_prefix("--history=") {
            a.history = match rest {
                "reset" => HistoryPolicy::ResetEachHop,
                "persist" => HistoryPolicy::Persist,
                other => bail!("--history must be reset or persist, got {other:?}"),
            };
            continue;
        }
        eprintln!("[warn] unknown arg: {s}");
    }
    Ok(a)
}

fn number<T: std::str::FromStr>(arg: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| anyhow!("invalid value in {arg}"))
}

// ---- logging ----------------------------------------------------------------

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let tag = match record.level() {
                Level::Error => "error",
                Level::Warn => "warn",
                Level::Info => "info",
                Level::Debug => "debug",
                Level::Trace => "trace",
            };
            eprintln!("[{tag}] {}", record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: bool) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(if verbose { LevelFilter::Debug } else { LevelFilter::Info });
    }
}

// ---- WAV I/O ----------------------------------------------------------------

/// Planar f32 channels plus the file's sample rate.
struct Audio {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl Audio {
    fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Average of all channels.
    fn mono(&self) -> Vec<f32> {
        let n = self.channels.len().max(1) as f32;
        (0..self.frames())
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n)
            .collect()
    }
}

fn read_wav(path: &Path) -> Result<Audio> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open WAV '{}'", path.display()))?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .with_context(|| format!("failed to decode '{}'", path.display()))?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .with_context(|| format!("failed to decode '{}'", path.display()))?
        }
    };
    let ch = usize::from(spec.channels.max(1));
    let mut channels = vec![Vec::with_capacity(interleaved.len() / ch); ch];
    for frame in interleaved.chunks_exact(ch) {
        for (c, &v) in frame.iter().enumerate() {
            channels[c].push(v);
        }
    }
    Ok(Audio { sample_rate: spec.sample_rate, channels })
}

fn write_wav(path: &Path, audio: &Audio) -> Result<()> {
    let spec = hound::WavSpec {
        channels: u16::try_from(audio.channels.len()).context("too many channels for WAV")?,
        sample_rate: audio.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create '{}'", path.display()))?;
    for i in 0..audio.frames() {
        for c in &audio.channels {
            writer.write_sample(c[i])?;
        }
    }
    writer.finalize().with_context(|| format!("failed to finalize '{}'", path.display()))?;
    Ok(())
}

// ---- rendering --------------------------------------------------------------

fn build_engine(args: &Args, sample_rate: f64, channels: usize) -> Result<LpcEngine> {
    let config = EngineConfig::for_sample_rate(sample_rate, channels)
        .with_filter_form(args.form)
        .with_history(args.history)
        .with_pre_emphasis(args.pre_emphasis);
    let engine = LpcEngine::new(config).context("invalid engine configuration")?;

    if let Some(order) = args.order {
        engine.set_order(order).context("--order rejected")?;
    }
    if let Some(ms) = args.frame_ms {
        let len = engine.set_frame_duration_ms(ms).context("--frame-ms rejected")?;
        debug!("frame length {len} samples");
    }
    let c = engine.controls();
    if let Some(v) = args.mix { c.set_mix(v); }
    if let Some(v) = args.ex_len { c.set_excitation_loop(v); }
    if let Some(v) = args.ex_start { c.set_excitation_start(v); }
    if let Some(v) = args.gain_db { c.set_wet_gain_db(v); }
    c.set_level_match(args.match_level);
    c.set_sidechain(args.sidechain.is_some());
    Ok(engine)
}

fn load_excitation(args: &Args, sample_rate: u32) -> Result<Excitation> {
    match &args.excitation {
        Some(path) => {
            let audio = read_wav(path)?;
            if audio.sample_rate != sample_rate {
                warn!("excitation is {} Hz, input is {} Hz; using it unresampled", audio.sample_rate, sample_rate);
            }
            let name = path.file_stem().map_or_else(|| "excitation".into(), |s| s.to_string_lossy().into_owned());
            Excitation::from_f32(name, &audio.mono()).with_context(|| format!("'{}' has no samples", path.display()))
        }
        None => Ok(Excitation::white_noise(sample_rate as usize, args.seed)?),
    }
}

fn render(args: &Args, input: &Audio) -> Result<Audio> {
    let engine = build_engine(args, f64::from(input.sample_rate), input.channels.len())?;
    let sidechain = match &args.sidechain {
        Some(path) => Some(read_wav(path)?),
        None if args.excitation.is_none() && args.factory.is_some() => {
            let controls = engine.controls();
            controls.select_excitation(args.factory).context("--factory rejected")?;
            let names = controls.excitation_names();
            info!("excitation: factory '{}'", args.factory.and_then(|i| names.get(i)).map_or("?", String::as_str));
            None
        }
        None => {
            let ex = load_excitation(args, input.sample_rate)?;
            info!("excitation: {} ({} samples)", ex.name(), ex.len());
            engine.set_excitation_buffer(ex);
            None
        }
    };
    let controls = engine.controls();
    info!(
        "rendering {} frames x {} ch: order {}, frame {} samples, block {}",
        input.frames(),
        input.channels.len(),
        controls.order(),
        controls.frame_length(),
        args.block
    );

    let mut renderer = BlockRenderer::new(engine, args.block);
    let channels = renderer.render(&input.channels, sidechain.as_ref().map(|s| s.channels.as_slice()));

    let count = controls.warning_count();
    if count > 0 {
        warn!("{count} block(s) raised warnings (last: {:#05b})", controls.last_warnings().bits());
    } else {
        info!("rendered {} blocks without warnings", renderer.blocks());
    }
    Ok(Audio { sample_rate: input.sample_rate, channels })
}

// ---- audition ---------------------------------------------------------------

fn list_output_devices() -> Result<()> {
    let host = cpal::default_host();
    println!("Available output devices:");
    for dev in host.output_devices()? {
        println!("- {}", dev.name()?);
    }
    Ok(())
}

fn pick_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        for d in host.output_devices()? {
            if d.name()? == name {
                return Ok(d);
            }
        }
        bail!("requested device not found: {name}");
    }
    host.default_output_device().ok_or_else(|| anyhow!("no default output device"))
}

fn choose_config(device: &cpal::Device, req_sr: u32, req_ch: u16) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(u64, cpal::SupportedStreamConfigRange)> = None;
    for range in device.supported_output_configs()? {
        let ch_pen = u64::from(range.channels().abs_diff(req_ch));
        let (lo, hi) = (range.min_sample_rate().0, range.max_sample_rate().0);
        let sr_pen = if (lo..=hi).contains(&req_sr) { 0 } else { u64::from(lo.abs_diff(req_sr).min(hi.abs_diff(req_sr))) };
        let score = sr_pen.saturating_mul(1000) + ch_pen;
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, range));
        }
    }
    let (_, range) = best.ok_or_else(|| anyhow!("no supported output configs"))?;
    let sr = req_sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0);
    if sr != req_sr {
        warn!("device does not support {req_sr} Hz; playing at {sr} Hz");
    }
    Ok(range.with_sample_rate(cpal::SampleRate(sr)))
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    audio: Arc<Audio>,
    done: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let out_ch = usize::from(cfg.channels);
    let src_ch = audio.channels.len();
    let mut pos = 0usize;

    let stream = device.build_output_stream(
        cfg,
        move |output: &mut [T], _| {
            for frame in output.chunks_mut(out_ch) {
                for (c, slot) in frame.iter_mut().enumerate() {
                    let s = audio.channels[c % src_ch].get(pos).copied().unwrap_or(0.0);
                    *slot = T::from_sample(s);
                }
                pos += 1;
            }
            if pos >= audio.frames() {
                done.store(true, Ordering::Release);
            }
        },
        |e| eprintln!("[cpal] stream error: {e}"),
        None,
    )?;
    Ok(stream)
}

fn play(audio: Audio, device_name: Option<&str>) -> Result<()> {
    if audio.channels.is_empty() {
        return Ok(());
    }
    let device = pick_device(device_name)?;
    let channels = u16::try_from(audio.channels.len()).unwrap_or(u16::MAX);
    let sup_cfg = choose_config(&device, audio.sample_rate, channels)?;
    let sample_format = sup_cfg.sample_format();
    let cfg = sup_cfg.config();
    info!("playing on {} ({:?}, {:?})", device.name()?, cfg, sample_format);

    let audio = Arc::new(audio);
    let done = Arc::new(AtomicBool::new(false));
    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &cfg, Arc::clone(&audio), Arc::clone(&done))?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &cfg, Arc::clone(&audio), Arc::clone(&done))?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &cfg, Arc::clone(&audio), Arc::clone(&done))?,
        other => bail!("unsupported device sample format: {other:?}"),
    };
    stream.play()?;
    while !done.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(50));
    }
    // let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(200));
    Ok(())
}

fn main() -> Result<()> {
    let args = parse_args()?;
    init_logging(args.verbose);

    if args.list_devices {
        return list_output_devices();
    }

    let input_path = args.input.as_deref().ok_or_else(|| anyhow!("--input=<wav> is required"))?;
    let input = read_wav(input_path)?;
    info!(
        "input '{}': {} Hz, {} ch, {} frames",
        input_path.display(),
        input.sample_rate,
        input.channels.len(),
        input.frames()
    );

    let rendered = render(&args, &input)?;

    if let Some(path) = &args.output {
        write_wav(path, &rendered)?;
        info!("wrote '{}'", path.display());
    } else if !args.play {
        warn!("no --output and no --play; the render was discarded");
    }

    if args.play {
        play(rendered, args.device_name.as_deref())?;
    }
    Ok(())
}
