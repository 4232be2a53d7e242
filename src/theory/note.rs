//! Note names, pitch classes and MIDI/frequency conversion.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Concert pitch for A4.
pub const A4_TUNING: f64 = 440.0;

/// Pitch-class names, sharps only.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One of the twelve chromatic keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Key {
    #[default]
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl Key {
    pub const ALL: [Key; 12] = [
        Key::C,
        Key::CSharp,
        Key::D,
        Key::DSharp,
        Key::E,
        Key::F,
        Key::FSharp,
        Key::G,
        Key::GSharp,
        Key::A,
        Key::ASharp,
        Key::B,
    ];

    /// Semitones above C.
    pub fn pitch_class(self) -> i32 {
        self as i32
    }

    pub fn from_pitch_class(pc: i32) -> Key {
        Key::ALL[pc.rem_euclid(12) as usize]
    }

    pub fn name(self) -> &'static str {
        NOTE_NAMES[self as usize]
    }

    /// Parse a key name such as `"F#"` or `"Bb"`.
    pub fn try_parse(name: &str) -> Option<Key> {
        let name = name.trim();
        let mut chars = name.chars();
        let base = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let offset = match chars.as_str() {
            "" => 0,
            "#" => 1,
            "b" => -1,
            _ => return None,
        };
        Some(Key::from_pitch_class(base + offset))
    }

    /// Parse a key name, falling back to C for anything unrecognized.
    pub fn parse(name: &str) -> Key {
        Key::try_parse(name).unwrap_or_else(|| {
            warn!(key = name, "unknown key, falling back to C");
            Key::C
        })
    }

    /// Transpose by a number of semitones (wraps around the octave).
    pub fn transpose(self, semitones: i32) -> Key {
        Key::from_pitch_class(self.pitch_class() + semitones)
    }

    /// Shortest signed distance from `self` to `other`, in `-6..=6`.
    pub fn interval_to(self, other: Key) -> i32 {
        let up = (other.pitch_class() - self.pitch_class()).rem_euclid(12);
        if up > 6 { up - 12 } else { up }
    }

    /// MIDI number of this key in the given octave (C4 = 60).
    pub fn midi(self, octave: i32) -> i32 {
        (octave + 1) * 12 + self.pitch_class()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Key> for String {
    fn from(key: Key) -> String {
        key.name().to_string()
    }
}

impl From<String> for Key {
    fn from(name: String) -> Key {
        Key::parse(&name)
    }
}

/// Parse a note name like `C4`, `F#3`, `Bb2` or `C-1` into a MIDI number.
pub fn note_to_midi(note: &str) -> Option<i32> {
    let bytes = note.as_bytes();
    if bytes.is_empty() {
        return None;
    }

    let base_semitone = match bytes[0] as char {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let mut idx = 1;
    let mut semitone = base_semitone;
    if idx < bytes.len() {
        match bytes[idx] as char {
            '#' => {
                semitone += 1;
                idx += 1;
            }
            'b' => {
                semitone -= 1;
                idx += 1;
            }
            _ => {}
        }
    }

    let octave: i32 = note[idx..].parse().ok()?;
    Some((octave + 1) * 12 + semitone)
}

/// Equal-tempered frequency of a MIDI note.
pub fn midi_to_frequency(midi: i32, tuning_pitch: f64) -> f64 {
    tuning_pitch * 2.0_f64.powf((midi - 69) as f64 / 12.0)
}

/// Nearest MIDI note for a frequency.
pub fn frequency_to_midi(frequency: f64, tuning_pitch: f64) -> i32 {
    (69.0 + 12.0 * (frequency / tuning_pitch).log2()).round() as i32
}

/// Sharp-spelled note name with octave, e.g. 61 -> `C#4`.
pub fn midi_to_note_name(midi: i32) -> String {
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", NOTE_NAMES[midi.rem_euclid(12) as usize], octave)
}

/// Frequency of a named note at A4 = 440 Hz.
pub fn note_to_frequency(note: &str) -> Option<f64> {
    note_to_midi(note).map(|m| midi_to_frequency(m, A4_TUNING))
}

/// Frequency multiplier for a shift of `semitones`.
pub fn semitone_ratio(semitones: i32) -> f64 {
    2.0_f64.powf(semitones as f64 / 12.0)
}
