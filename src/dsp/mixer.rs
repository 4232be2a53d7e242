//! Mixer — four fixed channels summed with master volume and soft clipping.

use super::envelope::Envelope;
use super::filter::OnePole;
use super::oscillator::Oscillator;
use crate::sequencer::pattern::NoteEvent;
use crate::sequencer::StepEvents;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Default master volume.
pub const DEFAULT_MASTER_VOLUME: f32 = 0.5;

/// The four logical channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    /// Pulse, 50% duty.
    Lead,
    /// Pulse, 25% duty.
    Harmony,
    /// Triangle.
    Bass,
    /// LFSR noise.
    Percussion,
}

impl ChannelId {
    pub const ALL: [ChannelId; 4] = [
        ChannelId::Lead,
        ChannelId::Harmony,
        ChannelId::Bass,
        ChannelId::Percussion,
    ];

    /// Channels that play pitched notes.
    pub const TONAL: [ChannelId; 3] = [ChannelId::Lead, ChannelId::Harmony, ChannelId::Bass];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<ChannelId> {
        ChannelId::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelId::Lead => "lead",
            ChannelId::Harmony => "harmony",
            ChannelId::Bass => "bass",
            ChannelId::Percussion => "percussion",
        }
    }

    fn default_oscillator(self, sample_rate: f64) -> Oscillator {
        match self {
            ChannelId::Lead => Oscillator::square(0.5, sample_rate),
            ChannelId::Harmony => Oscillator::square(0.25, sample_rate),
            ChannelId::Bass => Oscillator::triangle(sample_rate),
            ChannelId::Percussion => Oscillator::noise(1, sample_rate),
        }
    }

    fn default_volume(self) -> f32 {
        match self {
            ChannelId::Percussion => 0.15,
            _ => 0.25,
        }
    }

    /// Warmth filter cutoff; `None` leaves the channel raw.
    fn default_warmth(self) -> Option<f64> {
        match self {
            ChannelId::Lead | ChannelId::Harmony => Some(6000.0),
            ChannelId::Bass | ChannelId::Percussion => None,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only view of a channel for visualization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    pub id: ChannelId,
    pub active: bool,
    pub note: Option<String>,
    /// 0..=127
    pub velocity: u8,
}

/// One voice: oscillator, optional envelope and warmth filter, and note timing.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: ChannelId,
    oscillator: Oscillator,
    frequency: f64,
    volume: f32,
    enabled: bool,
    active: bool,
    velocity: f32,
    shaped: bool,
    envelope: Option<Envelope>,
    filter: Option<OnePole>,
    remaining: usize,
    note: Option<String>,
    sample_rate: f64,
    scratch: Vec<f32>,
}

impl Channel {
    pub fn new(id: ChannelId, sample_rate: f64) -> Self {
        Channel {
            id,
            oscillator: id.default_oscillator(sample_rate),
            frequency: 0.0,
            volume: id.default_volume(),
            enabled: true,
            active: false,
            velocity: 0.0,
            shaped: true,
            envelope: None,
            filter: id.default_warmth().map(|fc| OnePole::new(fc, sample_rate)),
            remaining: 0,
            note: None,
            sample_rate,
            scratch: Vec::new(),
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Velocity in `0..=1`.
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Turn envelope shaping on or off. Unshaped notes are gated hard.
    pub fn set_shaped(&mut self, shaped: bool) {
        self.shaped = shaped;
        if !shaped {
            self.envelope = None;
        }
    }

    /// Set (or remove) the warmth filter cutoff.
    pub fn set_warmth(&mut self, cutoff: Option<f64>) {
        self.filter = cutoff.map(|fc| OnePole::new(fc, self.sample_rate));
    }

    pub fn set_duty(&mut self, duty: f32) {
        self.oscillator.set_duty(duty);
    }

    /// Start a note or drum hit. Drum events on pitched channels are ignored.
    pub fn trigger(&mut self, event: &NoteEvent, seconds_per_beat: f64) {
        let samples =
            (event.duration_beats().max(0.0) * seconds_per_beat * self.sample_rate).round() as usize;
        match event {
            NoteEvent::Tone { frequency, .. } => {
                if self.oscillator.is_noise() {
                    self.oscillator.reset();
                }
                self.frequency = *frequency;
                // Reusing the envelope retriggers from its current level.
                let env = match self.envelope.take() {
                    Some(env) if !self.oscillator.is_noise() => env,
                    _ => Envelope::tone(self.sample_rate),
                };
                self.envelope = self.shaped.then_some(env);
            }
            NoteEvent::Drum {
                drum, noise_period, ..
            } => {
                if !self.oscillator.is_noise() {
                    warn!(channel = %self.id, "drum event on a pitched channel, ignored");
                    return;
                }
                self.oscillator.set_period(*noise_period);
                self.oscillator.reset();
                self.frequency = 0.0;
                self.envelope = self
                    .shaped
                    .then(|| Envelope::percussive(self.sample_rate, drum.decay()));
            }
        }
        if let Some(env) = self.envelope.as_mut() {
            env.gate_on();
        }
        self.velocity = event.gain();
        self.remaining = samples.max(1);
        self.note = Some(event.label());
        self.active = true;
    }

    /// Cut the channel immediately.
    pub fn silence(&mut self) {
        self.active = false;
        self.remaining = 0;
        self.envelope = None;
        self.note = None;
    }

    /// Add this channel's output for `out.len()` samples into `out`.
    pub fn render_add(&mut self, out: &mut [f32]) {
        if !self.enabled || !self.active {
            return;
        }
        let n = out.len();
        self.scratch.resize(n, 0.0);
        self.oscillator.generate_into(self.frequency, &mut self.scratch[..n]);

        let gain = self.volume * self.velocity;
        let mut end = n;
        for i in 0..n {
            if self.remaining == 0 {
                match self.envelope.as_mut() {
                    Some(env) => env.gate_off(),
                    None => {
                        end = i;
                        break;
                    }
                }
            } else {
                self.remaining -= 1;
            }

            let mut s = self.scratch[i];
            if let Some(env) = self.envelope.as_mut() {
                s *= env.next_sample() as f32;
                if env.is_finished() {
                    end = i + 1;
                    self.scratch[i] = s;
                    break;
                }
            }
            self.scratch[i] = s;
        }

        for (o, s) in out[..end].iter_mut().zip(self.scratch[..end].iter_mut()) {
            if let Some(f) = self.filter.as_mut() {
                *s = f.process(*s);
            }
            *o += *s * gain;
        }

        if end < n {
            self.active = false;
            self.note = None;
        }
    }

    pub fn state(&self) -> ChannelState {
        ChannelState {
            id: self.id,
            active: self.active,
            note: self.note.clone(),
            velocity: (self.velocity * 127.0).round() as u8,
        }
    }
}

/// Four enum-keyed channels plus master gain.
#[derive(Debug, Clone)]
pub struct Mixer {
    channels: [Channel; 4],
    pub master_volume: f32,
    sample_rate: f64,
}

impl Mixer {
    pub fn new(sample_rate: f64) -> Self {
        Mixer {
            channels: ChannelId::ALL.map(|id| Channel::new(id, sample_rate)),
            master_volume: DEFAULT_MASTER_VOLUME,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> &mut Channel {
        &mut self.channels[id.index()]
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_volume(&mut self, id: ChannelId, volume: f32) {
        self.channel_mut(id).set_volume(volume);
    }

    pub fn set_enabled(&mut self, id: ChannelId, enabled: bool) {
        self.channel_mut(id).set_enabled(enabled);
    }

    /// Volume change addressed by raw index. Out-of-range indices are ignored.
    pub fn set_volume_at(&mut self, index: usize, volume: f32) {
        match ChannelId::from_index(index) {
            Some(id) => self.set_volume(id, volume),
            None => warn!(index, "volume change for unknown channel ignored"),
        }
    }

    /// Enable/disable by raw index. Out-of-range indices are ignored.
    pub fn set_enabled_at(&mut self, index: usize, enabled: bool) {
        match ChannelId::from_index(index) {
            Some(id) => self.set_enabled(id, enabled),
            None => warn!(index, "enable change for unknown channel ignored"),
        }
    }

    /// Start an event on a channel.
    pub fn apply(&mut self, id: ChannelId, event: &NoteEvent, seconds_per_beat: f64) {
        self.channel_mut(id).trigger(event, seconds_per_beat);
    }

    /// Start every event due on a step.
    pub fn apply_step(&mut self, events: &StepEvents, seconds_per_beat: f64) {
        for (id, event) in events.iter() {
            self.apply(id, event, seconds_per_beat);
        }
    }

    /// Mix `num_samples` samples of all enabled, active channels.
    pub fn mix(&mut self, num_samples: usize) -> Vec<f32> {
        let mut out = vec![0.0; num_samples];
        self.mix_into(&mut out);
        out
    }

    /// Like [`mix`](Self::mix) but overwrites an existing buffer.
    pub fn mix_into(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        for channel in self.channels.iter_mut() {
            channel.render_add(out);
        }
        for s in out.iter_mut() {
            *s = soft_clip(*s * self.master_volume);
        }
    }

    /// Cut every channel.
    pub fn silence_all(&mut self) {
        for c in self.channels.iter_mut() {
            c.silence();
        }
    }

    pub fn snapshot(&self) -> [ChannelState; 4] {
        ChannelId::ALL.map(|id| self.channel(id).state())
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::pattern::DrumKind;

    const SR: f64 = 44100.0;

    fn tone(freq: f64, velocity: u8, beats: f64) -> NoteEvent {
        NoteEvent::tone(freq, "A4", velocity, beats)
    }

    #[test]
    fn idle_mixer_is_silent() {
        let mut m = Mixer::new(SR);
        let out = m.mix(512);
        assert_eq!(out.len(), 512);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn channel_defaults() {
        let m = Mixer::new(SR);
        assert_eq!(m.channel(ChannelId::Lead).volume(), 0.25);
        assert_eq!(m.channel(ChannelId::Percussion).volume(), 0.15);
        assert_eq!(m.master_volume, 0.5);
        assert!(m.channels().all(|c| c.is_enabled() && !c.is_active()));
    }

    #[test]
    fn active_channel_is_audible() {
        let mut m = Mixer::new(SR);
        m.apply(ChannelId::Lead, &tone(440.0, 127, 1.0), 0.5);
        let out = m.mix(4410);
        let peak = out.iter().fold(0.0f32, |a, s| a.max(s.abs()));
        assert!(peak > 0.01, "peak {peak}");
        assert!(m.channel(ChannelId::Lead).is_active());
    }

    #[test]
    fn disabled_channel_is_silent_and_read_at_mix_time() {
        let mut m = Mixer::new(SR);
        m.apply(ChannelId::Bass, &tone(110.0, 127, 4.0), 0.5);
        m.set_enabled(ChannelId::Bass, false);
        assert!(m.mix(1024).iter().all(|&s| s == 0.0));
        m.set_enabled(ChannelId::Bass, true);
        assert!(m.mix(1024).iter().any(|&s| s != 0.0));
    }

    #[test]
    fn volume_scales_output() {
        let mut loud = Mixer::new(SR);
        let mut quiet = Mixer::new(SR);
        for m in [&mut loud, &mut quiet] {
            m.set_master_volume(1.0);
            m.channel_mut(ChannelId::Lead).set_shaped(false);
            m.channel_mut(ChannelId::Lead).set_warmth(None);
            m.apply(ChannelId::Lead, &tone(441.0, 127, 1.0), 0.5);
        }
        quiet.set_volume(ChannelId::Lead, 0.1);
        let a = loud.mix(100);
        let b = quiet.mix(100);
        // tanh(0.25 * 0.5) vs tanh(0.1 * 0.5)
        assert!((a[0] - (0.125f32).tanh()).abs() < 1e-6, "got {}", a[0]);
        assert!((b[0] - (0.05f32).tanh()).abs() < 1e-6, "got {}", b[0]);
    }

    #[test]
    fn volume_is_clamped() {
        let mut m = Mixer::new(SR);
        m.set_volume(ChannelId::Harmony, 3.0);
        assert_eq!(m.channel(ChannelId::Harmony).volume(), 1.0);
        m.set_volume(ChannelId::Harmony, -1.0);
        assert_eq!(m.channel(ChannelId::Harmony).volume(), 0.0);
    }

    #[test]
    fn unknown_channel_index_is_a_no_op() {
        let mut m = Mixer::new(SR);
        let before = m.snapshot();
        m.set_volume_at(9, 0.9);
        m.set_enabled_at(4, false);
        assert_eq!(m.snapshot(), before);
        m.set_volume_at(1, 0.9);
        assert_eq!(m.channel(ChannelId::Harmony).volume(), 0.9);
    }

    #[test]
    fn unshaped_note_is_gated_hard() {
        let mut m = Mixer::new(SR);
        m.set_master_volume(1.0);
        let lead = m.channel_mut(ChannelId::Lead);
        lead.set_shaped(false);
        lead.set_warmth(None);
        // 0.01 beats at 1 s/beat = 441 samples
        m.apply(ChannelId::Lead, &tone(441.0, 127, 0.01), 1.0);
        let out = m.mix(1000);
        assert!(out[..441].iter().all(|&s| s != 0.0));
        assert!(out[441..].iter().all(|&s| s == 0.0));
        assert!(!m.channel(ChannelId::Lead).is_active());
    }

    #[test]
    fn shaped_note_releases_then_goes_inactive() {
        let mut m = Mixer::new(SR);
        m.apply(ChannelId::Harmony, &tone(330.0, 100, 0.1), 0.5);
        // 0.05 s of note + 0.04 s release < 0.2 s
        m.mix(8820);
        let ch = m.channel(ChannelId::Harmony);
        assert!(!ch.is_active());
        assert_eq!(ch.note(), None);
    }

    #[test]
    fn drum_hit_decays_to_silence() {
        let mut m = Mixer::new(SR);
        m.apply(ChannelId::Percussion, &NoteEvent::drum(DrumKind::Snare, 120, 1.0), 0.5);
        let out = m.mix(SR as usize / 5);
        assert!(out[..100].iter().any(|&s| s != 0.0));
        assert!(out[out.len() - 100..].iter().all(|&s| s == 0.0));
        assert!(!m.channel(ChannelId::Percussion).is_active());
    }

    #[test]
    fn drum_on_pitched_channel_is_ignored() {
        let mut m = Mixer::new(SR);
        m.apply(ChannelId::Bass, &NoteEvent::drum(DrumKind::Kick, 100, 0.5), 0.5);
        assert!(!m.channel(ChannelId::Bass).is_active());
    }

    #[test]
    fn output_is_soft_clipped() {
        let mut m = Mixer::new(SR);
        m.set_master_volume(1.0);
        for id in ChannelId::ALL {
            m.set_volume(id, 1.0);
        }
        for id in ChannelId::TONAL {
            m.apply(id, &tone(220.0, 127, 2.0), 0.5);
        }
        m.apply(ChannelId::Percussion, &NoteEvent::drum(DrumKind::Kick, 127, 2.0), 0.5);
        for s in m.mix(22050) {
            assert!(s.abs() < 1.0, "soft clip keeps |s| < 1, got {s}");
        }
    }

    #[test]
    fn snapshot_reports_notes() {
        let mut m = Mixer::new(SR);
        m.apply(ChannelId::Lead, &NoteEvent::tone(523.25, "C5", 127, 1.0), 0.5);
        let snap = m.snapshot();
        assert_eq!(snap[0].id, ChannelId::Lead);
        assert!(snap[0].active);
        assert_eq!(snap[0].note.as_deref(), Some("C5"));
        assert_eq!(snap[0].velocity, 127);
        assert!(!snap[3].active);
    }
}
