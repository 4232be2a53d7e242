//! Synth core — one synthesis pass from step clock to PCM bytes.
//!
//! Parameter changes are queued with [`SynthCore::queue_change`] and applied
//! together at the start of the next [`SynthCore::render`]. The pass itself
//! then runs against that fixed parameter snapshot.

use crate::dsp::compressor::{Compressor, CompressorConfig};
use crate::dsp::mixer::{ChannelId, ChannelState, Mixer};
use crate::dsp::pcm;
use crate::params::{InsertMode, KeyChangePolicy, ParameterChange, Parameters};
use crate::sequencer::pattern::{DrumKind, NoteEvent, PatternSet, quantize_step};
use crate::sequencer::{GenerationMode, PatternGenerator, Sequencer, StepClock};
use crate::theory::NotePicker;
use rand::Rng;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info};

/// What the UI needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visualization {
    /// Step currently sounding.
    pub step: usize,
    pub total_steps: usize,
    pub bar: usize,
    pub step_in_bar: usize,
    pub channels: [ChannelState; 4],
}

pub struct SynthCore {
    params: Parameters,
    pending: VecDeque<ParameterChange>,
    patterns: PatternSet,
    generator: PatternGenerator,
    picker: NotePicker,
    sequencer: Sequencer,
    mixer: Mixer,
    compressor: Compressor,
    sample_rate: f64,
    started: bool,
    playing_step: usize,
    buffer: Vec<f32>,
}

impl SynthCore {
    pub fn new(params: Parameters, sample_rate: f64) -> Self {
        let generator = PatternGenerator::new(GenerationMode::Procedural);
        let picker = NotePicker::new(params.key, params.scale);
        Self::build(params, sample_rate, generator, picker)
    }

    /// Deterministic core: pattern generation and note picks come from `seed`.
    pub fn seeded(params: Parameters, sample_rate: f64, seed: u64) -> Self {
        let generator = PatternGenerator::seeded(GenerationMode::Procedural, seed);
        let picker = NotePicker::seeded(params.key, params.scale, seed.wrapping_add(1));
        Self::build(params, sample_rate, generator, picker)
    }

    fn build(
        params: Parameters,
        sample_rate: f64,
        mut generator: PatternGenerator,
        picker: NotePicker,
    ) -> Self {
        let params = params.sanitized();
        let patterns = generator.generate(&params);

        let mut clock = StepClock::new(params.tempo, params.total_steps());
        clock.set_swing(params.swing);
        clock.set_swing_ratio(params.swing_ratio);
        clock.set_steps_per_bar(params.time_signature.steps_per_bar());

        let mut mixer = Mixer::new(sample_rate);
        mixer.set_master_volume(params.master_volume);

        SynthCore {
            params,
            pending: VecDeque::new(),
            patterns,
            generator,
            picker,
            sequencer: Sequencer::new(clock),
            mixer,
            compressor: Compressor::new(sample_rate),
            sample_rate,
            started: false,
            playing_step: 0,
            buffer: Vec::new(),
        }
    }

    pub fn with_compressor(mut self, config: CompressorConfig) -> Self {
        self.compressor = Compressor::with_config(self.sample_rate, config);
        self
    }

    /// Switch generation mode and rebuild the patterns.
    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.generator.mode = mode;
        self.regenerate();
        self
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }

    pub fn clock(&self) -> &StepClock {
        self.sequencer.clock()
    }

    /// Queue a change for the next pass.
    pub fn queue_change(&mut self, change: ParameterChange) {
        self.pending.push_back(change);
    }

    pub fn pending_changes(&self) -> usize {
        self.pending.len()
    }

    /// Rebuild every pattern from the current parameters.
    pub fn regenerate(&mut self) {
        self.patterns = self.generator.generate(&self.params);
    }

    /// Rewind to step 0; the next pass starts the loop again.
    pub fn restart(&mut self) {
        self.started = false;
        self.playing_step = 0;
        self.sequencer.clock_mut().reset(0.0);
        self.mixer.silence_all();
        self.compressor.reset();
    }

    /// Synthesize `frames` stereo frames starting at `now` seconds.
    ///
    /// Step boundaries falling inside the pass are honoured sample-exactly.
    pub fn render(&mut self, now: f64, frames: usize) -> Vec<u8> {
        self.apply_pending();

        if !self.started {
            self.sequencer.clock_mut().start(now);
            self.started = true;
        }

        let seconds_per_beat = self.params.seconds_per_beat();
        self.buffer.resize(frames, 0.0);

        let mut offset = 0;
        while offset < frames {
            let t = now + offset as f64 / self.sample_rate;
            while let Some(events) = self.sequencer.poll(&self.patterns, t) {
                self.playing_step = events.step;
                self.mixer.apply_step(&events, seconds_per_beat);
                self.vary_at(events.step);
            }

            let clock = self.sequencer.clock();
            let next = clock.last_boundary() + clock.current_step_duration();
            let until = ((next - t) * self.sample_rate).ceil().max(1.0) as usize;
            let end = (offset + until).min(frames);
            self.mixer.mix_into(&mut self.buffer[offset..end]);
            offset = end;
        }

        self.compressor.process(&mut self.buffer[..frames]);
        pcm::encode_stereo(&self.buffer[..frames])
    }

    /// Let the generator vary the loop when `step` starts a bar.
    fn vary_at(&mut self, step: usize) {
        let steps_per_bar = self.sequencer.clock().steps_per_bar();
        if step % steps_per_bar == 0 {
            self.generator
                .vary(&mut self.patterns, &self.params, step / steps_per_bar);
        }
    }

    fn apply_pending(&mut self) {
        while let Some(change) = self.pending.pop_front() {
            self.apply_change(change);
        }
    }

    fn apply_change(&mut self, change: ParameterChange) {
        debug!(?change, "applying parameter change");
        match change {
            ParameterChange::ChannelVolume { channel, volume } => {
                self.mixer.set_volume(channel, volume);
                return;
            }
            ParameterChange::ChannelEnabled { channel, enabled } => {
                self.mixer.set_enabled(channel, enabled);
                return;
            }
            _ => {}
        }

        let previous = self.params.clone();
        if !self.params.apply(&change) {
            return;
        }

        let clock = self.sequencer.clock_mut();
        match change {
            ParameterChange::Tempo(_) => clock.set_tempo(self.params.tempo),
            ParameterChange::Genre(genre) => {
                clock.set_tempo(self.params.tempo);
                self.regenerate();
                info!(genre = %genre, tempo = self.params.tempo, "genre changed");
            }
            ParameterChange::Key(key) => {
                if self.params.key_change == KeyChangePolicy::Transpose {
                    let semitones = key.pitch_class() - previous.key.pitch_class();
                    self.patterns.transpose_tonal(semitones);
                }
                self.picker.set_scale(self.params.key, self.params.scale);
                info!(key = %key, policy = ?self.params.key_change, "key changed");
            }
            ParameterChange::Scale(_) => {
                self.picker.set_scale(self.params.key, self.params.scale);
            }
            ParameterChange::TimeSignature(ts) => clock.set_steps_per_bar(ts.steps_per_bar()),
            ParameterChange::Swing(on) => clock.set_swing(on),
            ParameterChange::LoopBars(_) => {
                self.patterns.resize(self.params.loop_bars);
                clock.set_total_steps(self.params.total_steps());
                if self.playing_step >= self.params.total_steps() {
                    self.playing_step %= self.params.total_steps();
                }
            }
            ParameterChange::MasterVolume(_) => {
                self.mixer.set_master_volume(self.params.master_volume);
            }
            ParameterChange::KeyChangePolicy(_)
            | ParameterChange::ChannelVolume { .. }
            | ParameterChange::ChannelEnabled { .. } => {}
        }
    }

    /// Read-only snapshot for the UI.
    pub fn visualization(&self) -> Visualization {
        let steps_per_bar = self.sequencer.clock().steps_per_bar();
        Visualization {
            step: self.playing_step,
            total_steps: self.patterns.len(),
            bar: self.playing_step / steps_per_bar,
            step_in_bar: self.playing_step % steps_per_bar,
            channels: self.mixer.snapshot(),
        }
    }

    fn insert_position(&self, mode: InsertMode) -> usize {
        match mode {
            InsertMode::Direct => self.playing_step,
            InsertMode::Quantized => quantize_step(self.playing_step, self.patterns.len()),
        }
    }

    /// Place `event` at the playing step (or the nearest beat). Returns the slot used.
    pub fn insert_note(&mut self, channel: ChannelId, event: NoteEvent, mode: InsertMode) -> usize {
        let step = self.insert_position(mode);
        self.patterns[channel].insert(step, event)
    }

    /// Insert a weighted scale note (or a drum hit on the percussion channel).
    pub fn add_weighted_note(&mut self, channel: ChannelId, mode: InsertMode) -> usize {
        let event = if channel == ChannelId::Percussion {
            let rng = self.picker.rng();
            let drum = if rng.gen_bool(0.5) {
                DrumKind::Kick
            } else {
                DrumKind::Snare
            };
            let velocity = rng.gen_range(80..=100);
            NoteEvent::drum(drum, velocity, 0.2)
        } else {
            let picked = self.picker.pick();
            let velocity = self.picker.rng().gen_range(60..=90);
            NoteEvent::tone(picked.frequency, picked.note, velocity, 0.5)
        };
        let label = event.label();
        let step = self.insert_note(channel, event, mode);
        debug!(%channel, step, note = %label, "added note");
        step
    }

    /// Empty one slot. Out-of-range steps wrap.
    pub fn clear_step(&mut self, channel: ChannelId, step: usize) -> Option<NoteEvent> {
        self.patterns[channel].clear(step)
    }

    /// Empty every slot on one channel.
    pub fn clear_channel(&mut self, channel: ChannelId) {
        self.patterns[channel].clear_all();
    }
}
