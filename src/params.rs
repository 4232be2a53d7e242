//! Playback parameters and the change notifications that update them.

use crate::dsp::mixer::ChannelId;
use crate::error::EngineError;
use crate::theory::{Key, ScaleKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

pub const MIN_TEMPO: u32 = 30;
pub const MAX_TEMPO: u32 = 300;
pub const MAX_LOOP_BARS: usize = 64;

/// Musical style; selects rhythm tables, progressions and a tempo range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Genre {
    Soft,
    #[default]
    Rock,
    Bossa,
}

impl Genre {
    pub const ALL: [Genre; 3] = [Genre::Soft, Genre::Rock, Genre::Bossa];

    /// Inclusive tempo range in BPM.
    pub fn tempo_range(self) -> (u32, u32) {
        match self {
            Genre::Rock => (100, 140),
            Genre::Soft => (60, 100),
            Genre::Bossa => (80, 120),
        }
    }

    /// Keep `tempo` if it fits the genre, otherwise jump to the middle of the range.
    pub fn fit_tempo(self, tempo: u32) -> u32 {
        let (lo, hi) = self.tempo_range();
        if (lo..=hi).contains(&tempo) {
            tempo
        } else {
            (lo + hi) / 2
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Genre::Soft => "soft",
            Genre::Rock => "rock",
            Genre::Bossa => "bossa",
        }
    }

    pub fn parse(name: &str) -> Genre {
        let lower = name.trim().to_ascii_lowercase();
        Genre::ALL
            .into_iter()
            .find(|g| g.name() == lower)
            .unwrap_or_else(|| {
                warn!(genre = name, "unknown genre, falling back to rock");
                Genre::Rock
            })
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Supported meters. The denominator is always a quarter note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeSignature {
    #[serde(rename = "3/4")]
    ThreeFour,
    #[default]
    #[serde(rename = "4/4")]
    FourFour,
}

impl TimeSignature {
    pub fn beats_per_bar(self) -> usize {
        match self {
            TimeSignature::ThreeFour => 3,
            TimeSignature::FourFour => 4,
        }
    }

    /// Sixteenth-note steps per bar.
    pub fn steps_per_bar(self) -> usize {
        self.beats_per_bar() * 4
    }

    pub fn parse(text: &str) -> TimeSignature {
        match text.trim() {
            "3/4" => TimeSignature::ThreeFour,
            "4/4" => TimeSignature::FourFour,
            other => {
                warn!(time_signature = other, "unsupported time signature, using 4/4");
                TimeSignature::FourFour
            }
        }
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/4", self.beats_per_bar())
    }
}

/// What happens to already-placed tonal notes when the key changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyChangePolicy {
    /// Existing notes keep their pitch; only new notes follow the key.
    #[default]
    Keep,
    /// Shift every tonal note by the key interval.
    Transpose,
}

/// Where an inserted note lands relative to the playing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
    /// Snap to the nearest beat.
    Quantized,
    /// Exactly the current step.
    #[default]
    Direct,
}

/// Full set of user-facing playback parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub tempo: u32,
    pub genre: Genre,
    pub key: Key,
    pub scale: ScaleKind,
    pub time_signature: TimeSignature,
    pub swing: bool,
    pub swing_ratio: f64,
    pub loop_bars: usize,
    pub master_volume: f32,
    pub key_change: KeyChangePolicy,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            tempo: 120,
            genre: Genre::Rock,
            key: Key::C,
            scale: ScaleKind::Major,
            time_signature: TimeSignature::FourFour,
            swing: false,
            swing_ratio: 0.67,
            loop_bars: 8,
            master_volume: 0.5,
            key_change: KeyChangePolicy::Keep,
        }
    }
}

impl Parameters {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let params: Parameters = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidConfig(format!("parameters: {e}")))?;
        Ok(params.sanitized())
    }

    /// Clamp every field into its supported range.
    pub fn sanitized(mut self) -> Self {
        self.tempo = self.tempo.clamp(MIN_TEMPO, MAX_TEMPO);
        self.loop_bars = self.loop_bars.clamp(1, MAX_LOOP_BARS);
        self.master_volume = self.master_volume.clamp(0.0, 1.0);
        self.swing_ratio = self.swing_ratio.clamp(0.5, 0.9);
        self
    }

    /// Total sixteenth steps in the loop.
    pub fn total_steps(&self) -> usize {
        self.loop_bars * crate::sequencer::pattern::STEPS_PER_BAR
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.tempo as f64
    }

    /// Apply a change that belongs to the parameter set.
    ///
    /// Channel-level changes are not parameters and are ignored here.
    /// Returns whether anything changed.
    pub fn apply(&mut self, change: &ParameterChange) -> bool {
        let before = self.clone();
        match *change {
            ParameterChange::Tempo(bpm) => self.tempo = bpm.clamp(MIN_TEMPO, MAX_TEMPO),
            ParameterChange::Genre(genre) => {
                self.genre = genre;
                self.tempo = genre.fit_tempo(self.tempo);
            }
            ParameterChange::Key(key) => self.key = key,
            ParameterChange::Scale(scale) => self.scale = scale,
            ParameterChange::TimeSignature(ts) => self.time_signature = ts,
            ParameterChange::Swing(on) => self.swing = on,
            ParameterChange::LoopBars(bars) => self.loop_bars = bars.clamp(1, MAX_LOOP_BARS),
            ParameterChange::MasterVolume(v) => self.master_volume = v.clamp(0.0, 1.0),
            ParameterChange::KeyChangePolicy(policy) => self.key_change = policy,
            ParameterChange::ChannelVolume { .. } | ParameterChange::ChannelEnabled { .. } => {}
        }
        *self != before
    }
}

/// A single change notification from the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParameterChange {
    Tempo(u32),
    Genre(Genre),
    Key(Key),
    Scale(ScaleKind),
    TimeSignature(TimeSignature),
    Swing(bool),
    LoopBars(usize),
    MasterVolume(f32),
    KeyChangePolicy(KeyChangePolicy),
    ChannelVolume { channel: ChannelId, volume: f32 },
    ChannelEnabled { channel: ChannelId, enabled: bool },
}
