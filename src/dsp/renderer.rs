//! Offline renderer — runs synthesis passes against a virtual clock.
//!
//! Same code path as live streaming, minus the ring buffer and sink, so the
//! output is reproducible for tests and the WASM bindings.

use super::pcm;
use crate::params::Parameters;
use crate::sequencer::{ManualClock, TickSource};
use crate::synth::SynthCore;

/// Frames per synthesis pass when rendering offline.
pub const DEFAULT_BLOCK_FRAMES: usize = 1024;

/// Length of one full loop in seconds. Swing pairs keep the same total.
pub fn loop_duration(params: &Parameters) -> f64 {
    params.total_steps() as f64 * params.seconds_per_beat() / 4.0
}

pub struct OfflineRenderer {
    core: SynthCore,
    clock: ManualClock,
    frames: usize,
    block_frames: usize,
}

impl OfflineRenderer {
    pub fn new(core: SynthCore) -> Self {
        OfflineRenderer {
            core,
            clock: ManualClock::new(0.0),
            frames: 0,
            block_frames: DEFAULT_BLOCK_FRAMES,
        }
    }

    pub fn with_block_frames(mut self, frames: usize) -> Self {
        self.block_frames = frames.max(1);
        self
    }

    pub fn core(&self) -> &SynthCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut SynthCore {
        &mut self.core
    }

    /// Seconds rendered so far.
    pub fn position(&self) -> f64 {
        self.clock.now()
    }

    /// Render `frames` stereo frames as PCM bytes.
    pub fn render_frames(&mut self, frames: usize) -> Vec<u8> {
        let sample_rate = self.core.sample_rate();
        let mut out = Vec::with_capacity(frames * pcm::FRAME_BYTES);
        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(self.block_frames);
            out.extend(self.core.render(self.clock.now(), n));
            // Derive time from the frame count so it never accumulates error.
            self.frames += n;
            self.clock.set(self.frames as f64 / sample_rate);
            remaining -= n;
        }
        out
    }

    pub fn render_seconds(&mut self, seconds: f64) -> Vec<u8> {
        let frames = (seconds.max(0.0) * self.core.sample_rate()).round() as usize;
        self.render_frames(frames)
    }

    /// Render exactly one pass through the loop.
    pub fn render_loop(&mut self) -> Vec<u8> {
        let seconds = loop_duration(self.core.parameters());
        self.render_seconds(seconds)
    }
}

/// Render `seconds` of audio for `params` in one call.
pub fn render_pcm(params: Parameters, sample_rate: u32, seconds: f64, seed: Option<u64>) -> Vec<u8> {
    let sr = sample_rate as f64;
    let core = match seed {
        Some(seed) => SynthCore::seeded(params, sr, seed),
        None => SynthCore::new(params, sr),
    };
    OfflineRenderer::new(core).render_seconds(seconds)
}
