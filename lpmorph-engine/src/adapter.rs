//! Host-facing block adapter.
//!
//! This module defines the minimal `BlockProcessor` trait and a lightweight
//! `BlockRenderer<P>` wrapper that owns a processor and drives it over planar
//! multi-channel buffers: one `begin_block`, then one `process_channel` per
//! channel, exactly the call pattern a host callback follows.
//!
//! Design goals
//! - No allocation in `render_block`
//! - Generic over the processor, so hosts and tests can swap it without trait objects
//! - Offline rendering (`render`) chunks whole signals into host-sized blocks

use lpmorph_core::guard::Warnings;

use crate::config::BlockParams;
use crate::engine::LpcEngine;

/// Anything that processes audio in per-channel blocks.
pub trait BlockProcessor {
    fn channel_count(&self) -> usize;

    /// Snapshot parameters for the next block.
    fn begin_block(&mut self) -> BlockParams;

    /// Process one channel of the current block.
    fn process_channel(
        &mut self,
        channel: usize,
        input: &[f32],
        output: &mut [f32],
        sidechain: Option<&[f32]>,
        params: &BlockParams,
    ) -> Warnings;
}

impl BlockProcessor for LpcEngine {
    #[inline]
    fn channel_count(&self) -> usize {
        LpcEngine::channel_count(self)
    }

    #[inline]
    fn begin_block(&mut self) -> BlockParams {
        LpcEngine::begin_block(self)
    }

    #[inline]
    fn process_channel(
        &mut self,
        channel: usize,
        input: &[f32],
        output: &mut [f32],
        sidechain: Option<&[f32]>,
        params: &BlockParams,
    ) -> Warnings {
        self.process(channel, input, output, sidechain, params)
    }
}

/// Drives a [`BlockProcessor`] over planar buffers.
pub struct BlockRenderer<P: BlockProcessor> {
    processor: P,
    block_size: usize,
    blocks: u64,
    warnings: Warnings,
}

impl<P: BlockProcessor> BlockRenderer<P> {
    pub fn new(processor: P, block_size: usize) -> Self {
        Self { processor, block_size: block_size.max(1), blocks: 0, warnings: Warnings::NONE }
    }

    #[inline] pub fn block_size(&self) -> usize { self.block_size }

    /// Blocks rendered so far.
    #[inline] pub fn blocks(&self) -> u64 { self.blocks }

    /// Every warning raised so far.
    #[inline] pub fn warnings(&self) -> Warnings { self.warnings }

    #[inline] pub fn processor(&self) -> &P { &self.processor }
    #[inline] pub fn processor_mut(&mut self) -> &mut P { &mut self.processor }
    pub fn into_inner(self) -> P { self.processor }

    /// Render one block. A sidechain with fewer channels than the input is
    /// reused round-robin (a mono sidechain feeds every channel).
    pub fn render_block(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        sidechain: Option<&[&[f32]]>,
    ) -> Warnings {
        let params = self.processor.begin_block();
        let mut w = Warnings::NONE;
        for (ch, (input, output)) in inputs.iter().zip(outputs.iter_mut()).enumerate() {
            let sc = sidechain.filter(|s| !s.is_empty()).map(|s| s[ch % s.len()]);
            w |= self.processor.process_channel(ch, input, output, sc, &params);
        }
        self.blocks += 1;
        self.warnings |= w;
        w
    }

    /// Render whole planar signals offline, `block_size` samples at a time.
    pub fn render(&mut self, inputs: &[Vec<f32>], sidechain: Option<&[Vec<f32>]>) -> Vec<Vec<f32>> {
        let len = inputs.iter().map(Vec::len).min().unwrap_or(0);
        let mut outputs: Vec<Vec<f32>> = inputs.iter().map(|_| vec![0.0; len]).collect();
        let mut start = 0;
        while start < len {
            let end = (start + self.block_size).min(len);
            let ins: Vec<&[f32]> = inputs.iter().map(|c| &c[start..end]).collect();
            let scs: Option<Vec<&[f32]>> =
                sidechain.map(|sc| sc.iter().map(|c| c.get(start..end.min(c.len())).unwrap_or(&[])).collect());
            let mut outs: Vec<&mut [f32]> = outputs.iter_mut().map(|c| &mut c[start..end]).collect();
            self.render_block(&ins, &mut outs, scs.as_deref());
            start = end;
        }
        outputs
    }
}
