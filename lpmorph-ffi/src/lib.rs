//! C ABI wrapper for the LPMorph engine.
//!
//! Mirrors the engine contract one-to-one: create/configure off the audio
//! thread, then per host callback call `lpmorph_begin_block` once and
//! `lpmorph_process` once per channel.
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`.
//! - Opaque handle type: `LpmorphEngine` (heap-allocated; you own/delete it).
//! - Status codes: `0` ok, negative on a null pointer or a rejected value.
//!   Rejected values leave the previous setting in force.
//! - Audio is planar f32, one buffer per channel.
//!
//! Threading
//! - `lpmorph_begin_block` / `lpmorph_process` must run on one thread.
//! - The `lpmorph_set_*` mutators only touch atomics and may be called from
//!   any thread while audio is running; they take effect at the next block.
//!   The excitation bank calls take a lock the audio thread never uses.
//! - `lpmorph_create` / `lpmorph_configure` / `lpmorph_destroy` allocate and
//!   must not overlap with processing.

use std::ptr;
use std::slice;

use lpmorph_engine::{BlockParams, EngineConfig, Excitation, LpcEngine, Warnings};

pub const LPMORPH_OK: i32 = 0;
pub const LPMORPH_ERR_NULL: i32 = -1;
pub const LPMORPH_ERR_CONFIG: i32 = -2;

/// Opaque engine wrapper handed to C.
pub struct LpmorphEngine {
    inner: LpcEngine,
    params: BlockParams,
    // Copy of the input for in-place processing (input == output).
    scratch: Box<[f32]>,
}

/// In-place blocks longer than this are processed in pieces.
const SCRATCH_FRAMES: usize = 8192;

impl LpmorphEngine {
    fn new(config: EngineConfig) -> Option<Self> {
        let inner = LpcEngine::new(config).ok()?;
        Some(Self { inner, params: BlockParams::default(), scratch: vec![0.0; SCRATCH_FRAMES].into_boxed_slice() })
    }

    /// Process `buf` in place, at most `SCRATCH_FRAMES` at a time. Each piece
    /// gets the matching stretch of the block's gain ramp.
    fn process_in_place(&mut self, channel: usize, buf: &mut [f32], sidechain: Option<&[f32]>) -> Warnings {
        let params = self.params;
        let total = buf.len() as f64;
        let ramp_at = |s: usize| params.previous_gain + (params.current_gain - params.previous_gain) * (s as f64 / total);
        let mut warnings = Warnings::NONE;
        for (i, chunk) in buf.chunks_mut(SCRATCH_FRAMES).enumerate() {
            let start = i * SCRATCH_FRAMES;
            let end = start + chunk.len();
            let scratch = &mut self.scratch[..chunk.len()];
            scratch.copy_from_slice(chunk);
            let sc = sidechain.map(|s| s.get(start..end.min(s.len())).unwrap_or(&[]));
            let piece = BlockParams { previous_gain: ramp_at(start), current_gain: ramp_at(end), ..params };
            warnings |= self.inner.process(channel, scratch, chunk, sc, &piece);
        }
        warnings
    }
}

#[inline]
fn handle<'a>(engine: *mut LpmorphEngine) -> Option<&'a mut LpmorphEngine> {
    // Null or a pointer returned by `lpmorph_create`.
    unsafe { engine.as_mut() }
}

#[inline]
fn status(r: Result<(), lpmorph_engine::ConfigError>) -> i32 {
    if r.is_ok() { LPMORPH_OK } else { LPMORPH_ERR_CONFIG }
}

// --- Creation / destruction -------------------------------------------------------

/// Create an engine. Returns null if the configuration is invalid.
#[no_mangle]
pub extern "C" fn lpmorph_create(sample_rate: f64, channels: u32, max_frame_length: u32) -> *mut LpmorphEngine {
    let config = EngineConfig::new(sample_rate, channels as usize, max_frame_length as usize);
    match LpmorphEngine::new(config) {
        Some(e) => Box::into_raw(Box::new(e)),
        None => ptr::null_mut(),
    }
}

/// Destroy an engine previously returned by `lpmorph_create`.
#[no_mangle]
pub extern "C" fn lpmorph_destroy(engine: *mut LpmorphEngine) {
    if !engine.is_null() {
        unsafe { drop(Box::from_raw(engine)); }
    }
}

/// Resize for a new sample rate / channel count / maximum frame length.
/// Resets all channel state.
#[no_mangle]
pub extern "C" fn lpmorph_configure(
    engine: *mut LpmorphEngine,
    sample_rate: f64,
    channels: u32,
    max_frame_length: u32,
) -> i32 {
    let Some(e) = handle(engine) else { return LPMORPH_ERR_NULL };
    status(e.inner.configure(sample_rate, channels as usize, max_frame_length as usize))
}

// --- Parameters -------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn lpmorph_set_order(engine: *mut LpmorphEngine, order: u32) -> i32 {
    let Some(e) = handle(engine) else { return LPMORPH_ERR_NULL };
    status(e.inner.set_order(order as usize))
}

#[no_mangle]
pub extern "C" fn lpmorph_set_frame_length(engine: *mut LpmorphEngine, samples: u32) -> i32 {
    let Some(e) = handle(engine) else { return LPMORPH_ERR_NULL };
    status(e.inner.set_frame_length(samples as usize))
}

/// Frame length from a duration; returns the resulting length in samples,
/// or a negative status.
#[no_mangle]
pub extern "C" fn lpmorph_set_frame_duration_ms(engine: *mut LpmorphEngine, ms: f64) -> i64 {
    let Some(e) = handle(engine) else { return i64::from(LPMORPH_ERR_NULL) };
    match e.inner.set_frame_duration_ms(ms) {
        Ok(len) => i64::try_from(len).unwrap_or(i64::MAX),
        Err(_) => i64::from(LPMORPH_ERR_CONFIG),
    }
}

/// Wet/dry ratio, clamped to 0..1.
#[no_mangle]
pub extern "C" fn lpmorph_set_mix(engine: *mut LpmorphEngine, mix: f64) -> i32 {
    let Some(e) = handle(engine) else { return LPMORPH_ERR_NULL };
    e.inner.controls().set_mix(mix);
    LPMORPH_OK
}

#[no_mangle]
pub extern "C" fn lpmorph_set_excitation_loop(engine: *mut LpmorphEngine, fraction: f64) -> i32 {
    let Some(e) = handle(engine) else { return LPMORPH_ERR_NULL };
    e.inner.controls().set_excitation_loop(fraction);
    LPMORPH_OK
}

#[no_mangle]
pub extern "C" fn lpmorph_set_excitation_start(engine: *mut LpmorphEngine, fraction: f64) -> i32 {
    let Some(e) = handle(engine) else { return LPMORPH_ERR_NULL };
    e.inner.controls().set_excitation_start(fraction);
    LPMORPH_OK
}

/// Wet gain in dB, clamped to -40..+20.
#[no_mangle]
pub extern "C" fn lpmorph_set_wet_gain_db(engine: *mut LpmorphEngine, db: f64) -> i32 {
    let Some(e) = handle(engine) else { return LPMORPH_ERR_NULL };
    e.inner.controls().set_wet_gain_db(db);
    LPMORPH_OK
}

#[no_mangle]
pub extern "C" fn lpmorph_set_sidechain(engine: *mut LpmorphEngine, enabled: bool) -> i32 {
    let Some(e) = handle(engine) else { return LPMORPH_ERR_NULL };
    e.inner.controls().set_sidechain(enabled);
    LPMORPH_OK
}

/// Replace the excitation buffer. The samples are copied; the caller keeps
/// ownership of `samples`.
#[no_mangle]
pub extern "C" fn lpmorph_set_excitation(engine: *mut LpmorphEngine, samples: *const f32, len: usize) -> i32 {
    let Some(e) = handle(engine) else { return LPMORPH_ERR_NULL };
    if samples.is_null() {
        return LPMORPH_ERR_NULL;
    }
    let data = unsafe { slice::from_raw_parts(samples, len) };
    match Excitation::from_f32("host", data) {
        Ok(ex) => {
            e.inner.set_excitation_buffer(ex);
            LPMORPH_OK
        }
        Err(_) => LPMORPH_ERR_CONFIG,
    }
}

/// Scale the wet signal to the input level frame by frame.
#[no_mangle]
pub extern "C" fn lpmorph_set_level_match(engine: *mut LpmorphEngine, enabled: bool) -> i32 {
    let Some(e) = handle(engine) else { return LPMORPH_ERR_NULL };
    e.inner.controls().set_level_match(enabled);
    LPMORPH_OK
}

/// Select excitation bank entry `index`; a negative index selects none.
/// Reselecting the playing entry does not restart it.
#[no_mangle]
pub extern "C" fn lpmorph_select_excitation(engine: *mut LpmorphEngine, index: i32) -> i32 {
    let Some(e) = handle(engine) else { return LPMORPH_ERR_NULL };
    let index = usize::try_from(index).ok();
    status(e.inner.controls().select_excitation(index))
}

/// Copy `samples` into a new bank entry. Returns its index or a negative status.
#[no_mangle]
pub extern "C" fn lpmorph_add_excitation(engine: *mut LpmorphEngine, samples: *const f32, len: usize) -> i64 {
    let Some(e) = handle(engine) else { return i64::from(LPMORPH_ERR_NULL) };
    if samples.is_null() {
        return i64::from(LPMORPH_ERR_NULL);
    }
    let data = unsafe { slice::from_raw_parts(samples, len) };
    match Excitation::from_f32("custom", data) {
        Ok(ex) => i64::try_from(e.inner.controls().add_excitation(ex)).unwrap_or(i64::MAX),
        Err(_) => i64::from(LPMORPH_ERR_CONFIG),
    }
}

/// Number of bank entries, factory sources first.
#[no_mangle]
pub extern "C" fn lpmorph_excitation_count(engine: *mut LpmorphEngine) -> u32 {
    handle(engine).map_or(0, |e| u32::try_from(e.inner.controls().excitation_names().len()).unwrap_or(u32::MAX))
}

// --- Processing -------------------------------------------------------------------

/// Snapshot parameters for the next block. Call once per host callback.
#[no_mangle]
pub extern "C" fn lpmorph_begin_block(engine: *mut LpmorphEngine) -> i32 {
    let Some(e) = handle(engine) else { return LPMORPH_ERR_NULL };
    e.params = e.inner.begin_block();
    LPMORPH_OK
}

/// Process `frames` samples of `channel`. `input` and `output` may be the
/// same buffer; `sidechain` may be null. Returns warning bits
/// (1 = NaN, 2 = clip, 4 = bad channel or null buffer).
#[no_mangle]
pub extern "C" fn lpmorph_process(
    engine: *mut LpmorphEngine,
    channel: u32,
    input: *const f32,
    output: *mut f32,
    sidechain: *const f32,
    frames: u32,
) -> u32 {
    let Some(e) = handle(engine) else { return Warnings::BAD_CHANNEL.bits() };
    if input.is_null() || output.is_null() {
        return Warnings::BAD_CHANNEL.bits();
    }
    let n = frames as usize;
    let sc = if sidechain.is_null() { None } else { Some(unsafe { slice::from_raw_parts(sidechain, n) }) };

    let params = e.params;
    if ptr::eq(input, output) {
        let buf = unsafe { slice::from_raw_parts_mut(output, n) };
        e.process_in_place(channel as usize, buf, sc).bits()
    } else {
        let inp = unsafe { slice::from_raw_parts(input, n) };
        let out = unsafe { slice::from_raw_parts_mut(output, n) };
        e.inner.process(channel as usize, inp, out, sc, &params).bits()
    }
}

// --- Observability ----------------------------------------------------------------

/// Excitation read position of `channel`, or a negative status.
#[no_mangle]
pub extern "C" fn lpmorph_excitation_cursor(engine: *mut LpmorphEngine, channel: u32) -> i64 {
    let Some(e) = handle(engine) else { return i64::from(LPMORPH_ERR_NULL) };
    match e.inner.excitation_cursor(channel as usize) {
        Ok(c) => i64::try_from(c).unwrap_or(i64::MAX),
        Err(_) => i64::from(LPMORPH_ERR_CONFIG),
    }
}

/// Number of `lpmorph_process` calls that raised any warning.
#[no_mangle]
pub extern "C" fn lpmorph_warning_count(engine: *mut LpmorphEngine) -> u64 {
    handle(engine).map_or(0, |e| e.inner.controls().warning_count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(n: usize) -> Vec<f32> {
        (0..n).map(|i| 0.3 * (i as f32 * 0.07).sin()).collect()
    }

    #[test]
    fn create_rejects_bad_config() {
        assert!(lpmorph_create(0.0, 1, 512).is_null());
        assert!(lpmorph_create(44_100.0, 0, 512).is_null());
        let e = lpmorph_create(44_100.0, 1, 512);
        assert!(!e.is_null());
        lpmorph_destroy(e);
    }

    #[test]
    fn null_handle_is_tolerated() {
        let null = ptr::null_mut();
        assert_eq!(lpmorph_set_order(null, 10), LPMORPH_ERR_NULL);
        assert_eq!(lpmorph_begin_block(null), LPMORPH_ERR_NULL);
        assert_eq!(lpmorph_excitation_cursor(null, 0), i64::from(LPMORPH_ERR_NULL));
        assert_eq!(lpmorph_warning_count(null), 0);
        let x = [0.0f32; 4];
        let mut y = [0.0f32; 4];
        assert_eq!(lpmorph_process(null, 0, x.as_ptr(), y.as_mut_ptr(), ptr::null(), 4), 4);
        lpmorph_destroy(null);
    }

    #[test]
    fn rejected_values_report_config_error() {
        let e = lpmorph_create(44_100.0, 1, 512);
        assert_eq!(lpmorph_set_order(e, 0), LPMORPH_ERR_CONFIG);
        assert_eq!(lpmorph_set_frame_length(e, 100_000), LPMORPH_ERR_CONFIG);
        assert_eq!(lpmorph_set_excitation(e, [0.0f32; 0].as_ptr(), 0), LPMORPH_ERR_CONFIG);
        assert_eq!(lpmorph_configure(e, 44_100.0, 0, 512), LPMORPH_ERR_CONFIG);
        assert_eq!(lpmorph_excitation_cursor(e, 3), i64::from(LPMORPH_ERR_CONFIG));
        assert_eq!(lpmorph_set_frame_duration_ms(e, 5.0), 220);
        lpmorph_destroy(e);
    }

    #[test]
    fn in_place_matches_separate_buffers() {
        let a = lpmorph_create(44_100.0, 1, 512);
        let b = lpmorph_create(44_100.0, 1, 512);
        let noise: Vec<f32> = (0..1000).map(|i| ((i * 7919) % 200) as f32 / 100.0 - 1.0).collect();
        for e in [a, b] {
            assert_eq!(lpmorph_set_order(e, 20), LPMORPH_OK);
            assert_eq!(lpmorph_set_frame_length(e, 256), LPMORPH_OK);
            assert_eq!(lpmorph_set_wet_gain_db(e, -20.0), LPMORPH_OK);
            assert_eq!(lpmorph_set_excitation(e, noise.as_ptr(), noise.len()), LPMORPH_OK);
        }
        let input = sine(4096);
        let mut sep = vec![0.0f32; 4096];
        let mut inplace = input.clone();
        for start in (0..4096).step_by(128) {
            lpmorph_begin_block(a);
            lpmorph_process(a, 0, input[start..].as_ptr(), sep[start..].as_mut_ptr(), ptr::null(), 128);
            lpmorph_begin_block(b);
            let p = inplace[start..].as_mut_ptr();
            lpmorph_process(b, 0, p, p, ptr::null(), 128);
        }
        assert_eq!(sep, inplace);
        assert!(sep[1024..].iter().any(|&y| y != 0.0));
        assert!(lpmorph_excitation_cursor(a, 0) > 0);
        lpmorph_destroy(a);
        lpmorph_destroy(b);
    }

    #[test]
    fn long_in_place_block_matches_separate_buffers() {
        let a = lpmorph_create(44_100.0, 1, 512);
        let b = lpmorph_create(44_100.0, 1, 512);
        for e in [a, b] {
            assert_eq!(lpmorph_set_frame_length(e, 256), LPMORPH_OK);
            assert_eq!(lpmorph_select_excitation(e, 0), LPMORPH_OK);
        }
        let frames = SCRATCH_FRAMES + 1808;
        let input = sine(frames);
        let mut sep = vec![0.0f32; frames];
        let mut inplace = input.clone();
        lpmorph_begin_block(a);
        lpmorph_process(a, 0, input.as_ptr(), sep.as_mut_ptr(), ptr::null(), frames as u32);
        lpmorph_begin_block(b);
        lpmorph_process(b, 0, inplace.as_mut_ptr(), inplace.as_mut_ptr(), ptr::null(), frames as u32);
        assert_eq!(sep, inplace);
        assert!(sep[SCRATCH_FRAMES..].iter().any(|&y| y != 0.0));
        lpmorph_destroy(a);
        lpmorph_destroy(b);
    }

    #[test]
    fn in_place_chunks_follow_the_gain_ramp() {
        let a = lpmorph_create(44_100.0, 1, 512);
        let b = lpmorph_create(44_100.0, 1, 512);
        for e in [a, b] {
            assert_eq!(lpmorph_set_frame_length(e, 256), LPMORPH_OK);
            assert_eq!(lpmorph_select_excitation(e, 0), LPMORPH_OK);
            // ramps from 0 dB down to -12 dB across the next block
            assert_eq!(lpmorph_set_wet_gain_db(e, -12.0), LPMORPH_OK);
        }
        let frames = 2 * SCRATCH_FRAMES + 100;
        let input = sine(frames);
        let mut sep = vec![0.0f32; frames];
        let mut inplace = input.clone();
        lpmorph_begin_block(a);
        lpmorph_process(a, 0, input.as_ptr(), sep.as_mut_ptr(), ptr::null(), frames as u32);
        lpmorph_begin_block(b);
        lpmorph_process(b, 0, inplace.as_mut_ptr(), inplace.as_mut_ptr(), ptr::null(), frames as u32);
        for (i, (x, y)) in sep.iter().zip(&inplace).enumerate() {
            assert!((x - y).abs() < 1e-6, "frame {i}: {x} vs {y}");
        }
        lpmorph_destroy(a);
        lpmorph_destroy(b);
    }

    #[test]
    fn bank_calls() {
        let e = lpmorph_create(44_100.0, 1, 512);
        assert_eq!(lpmorph_excitation_count(e), 3);
        let click = [1.0f32, 0.0, 0.0, 0.0];
        assert_eq!(lpmorph_add_excitation(e, click.as_ptr(), click.len()), 3);
        assert_eq!(lpmorph_excitation_count(e), 4);
        assert_eq!(lpmorph_select_excitation(e, 3), LPMORPH_OK);
        assert_eq!(lpmorph_select_excitation(e, 4), LPMORPH_ERR_CONFIG);
        assert_eq!(lpmorph_select_excitation(e, -1), LPMORPH_OK);
        assert_eq!(lpmorph_set_level_match(e, true), LPMORPH_OK);
        assert_eq!(lpmorph_add_excitation(e, ptr::null(), 4), i64::from(LPMORPH_ERR_NULL));
        assert_eq!(lpmorph_select_excitation(ptr::null_mut(), 0), LPMORPH_ERR_NULL);
        lpmorph_destroy(e);
    }

    #[test]
    fn bad_channel_passes_through_and_counts() {
        let e = lpmorph_create(48_000.0, 2, 256);
        let input = sine(64);
        let mut out = vec![0.0f32; 64];
        lpmorph_begin_block(e);
        let w = lpmorph_process(e, 9, input.as_ptr(), out.as_mut_ptr(), ptr::null(), 64);
        assert_eq!(w, 4);
        assert_eq!(out, input);
        assert_eq!(lpmorph_warning_count(e), 1);
        lpmorph_destroy(e);
    }
}
