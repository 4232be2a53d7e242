//! Chords, Roman-numeral degrees and progressions.

use super::note::{A4_TUNING, Key, midi_to_frequency, midi_to_note_name};
use super::scale::{Scale, ScaleKind};
use crate::params::Genre;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Chord qualities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordKind {
    #[default]
    Major,
    Minor,
    Diminished,
    Augmented,
    Major7,
    Minor7,
    Dominant7,
    Diminished7,
    Sus2,
    Sus4,
    Add9,
    Power,
}

impl ChordKind {
    pub const ALL: [ChordKind; 12] = [
        ChordKind::Major,
        ChordKind::Minor,
        ChordKind::Diminished,
        ChordKind::Augmented,
        ChordKind::Major7,
        ChordKind::Minor7,
        ChordKind::Dominant7,
        ChordKind::Diminished7,
        ChordKind::Sus2,
        ChordKind::Sus4,
        ChordKind::Add9,
        ChordKind::Power,
    ];

    /// Semitones above the chord root.
    pub fn intervals(self) -> &'static [i32] {
        match self {
            ChordKind::Major => &[0, 4, 7],
            ChordKind::Minor => &[0, 3, 7],
            ChordKind::Diminished => &[0, 3, 6],
            ChordKind::Augmented => &[0, 4, 8],
            ChordKind::Major7 => &[0, 4, 7, 11],
            ChordKind::Minor7 => &[0, 3, 7, 10],
            ChordKind::Dominant7 => &[0, 4, 7, 10],
            ChordKind::Diminished7 => &[0, 3, 6, 9],
            ChordKind::Sus2 => &[0, 2, 7],
            ChordKind::Sus4 => &[0, 5, 7],
            ChordKind::Add9 => &[0, 4, 7, 14],
            ChordKind::Power => &[0, 7],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChordKind::Major => "major",
            ChordKind::Minor => "minor",
            ChordKind::Diminished => "diminished",
            ChordKind::Augmented => "augmented",
            ChordKind::Major7 => "major7",
            ChordKind::Minor7 => "minor7",
            ChordKind::Dominant7 => "dominant7",
            ChordKind::Diminished7 => "diminished7",
            ChordKind::Sus2 => "sus2",
            ChordKind::Sus4 => "sus4",
            ChordKind::Add9 => "add9",
            ChordKind::Power => "power",
        }
    }

    /// Parse a chord-type name, falling back to a major triad.
    pub fn parse(name: &str) -> ChordKind {
        let lower = name.trim().to_ascii_lowercase();
        let kind = match lower.as_str() {
            "dim" => Some(ChordKind::Diminished),
            "aug" | "+" => Some(ChordKind::Augmented),
            "maj7" => Some(ChordKind::Major7),
            "m7" | "min7" => Some(ChordKind::Minor7),
            "7" | "dom7" => Some(ChordKind::Dominant7),
            "dim7" => Some(ChordKind::Diminished7),
            "5" => Some(ChordKind::Power),
            other => ChordKind::ALL.into_iter().find(|k| k.name() == other),
        };
        kind.unwrap_or_else(|| {
            warn!(chord = name, "unknown chord type, falling back to major");
            ChordKind::Major
        })
    }
}

impl fmt::Display for ChordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single chord tone with its octave already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordTone {
    pub key: Key,
    pub octave: i32,
    pub midi: i32,
}

impl ChordTone {
    fn from_midi(midi: i32) -> Self {
        ChordTone {
            key: Key::from_pitch_class(midi),
            octave: midi.div_euclid(12) - 1,
            midi,
        }
    }

    /// Full note name, e.g. `E4`.
    pub fn name(&self) -> String {
        midi_to_note_name(self.midi)
    }

    pub fn frequency(&self) -> f64 {
        midi_to_frequency(self.midi, A4_TUNING)
    }
}

/// A chord rooted on a key in a given octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chord {
    pub root: Key,
    pub kind: ChordKind,
    pub octave: i32,
}

impl Chord {
    pub fn new(root: Key, kind: ChordKind, octave: i32) -> Self {
        Chord { root, kind, octave }
    }

    /// Chord tones, rolling into the next octave when an interval passes B.
    pub fn tones(&self) -> Vec<ChordTone> {
        let base = self.root.midi(self.octave);
        self.kind
            .intervals()
            .iter()
            .map(|&i| ChordTone::from_midi(base + i))
            .collect()
    }

    /// Pitch classes of the chord tones.
    pub fn keys(&self) -> Vec<Key> {
        self.tones().into_iter().map(|t| t.key).collect()
    }

    /// Note names without octave.
    pub fn notes(&self) -> Vec<&'static str> {
        self.tones().into_iter().map(|t| t.key.name()).collect()
    }

    pub fn frequencies(&self) -> Vec<f64> {
        self.tones().iter().map(ChordTone::frequency).collect()
    }

    pub fn root_frequency(&self) -> f64 {
        midi_to_frequency(self.root.midi(self.octave), A4_TUNING)
    }

    /// Rotate the lowest `n` tones up an octave.
    pub fn inversion(&self, n: usize) -> Vec<ChordTone> {
        let mut tones = self.tones();
        if tones.is_empty() {
            return tones;
        }
        for _ in 0..n {
            let first = tones.remove(0);
            tones.push(ChordTone::from_midi(first.midi + 12));
        }
        tones
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.root, self.kind)
    }
}

const NUMERALS: [&str; 7] = ["VII", "III", "VI", "IV", "II", "V", "I"];

fn numeral_value(numeral: &str) -> usize {
    match numeral {
        "I" => 1,
        "II" => 2,
        "III" => 3,
        "IV" => 4,
        "V" => 5,
        "VI" => 6,
        _ => 7,
    }
}

/// A parsed Roman-numeral chord symbol such as `IIM7`, `bVII` or `vi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Degree {
    /// 1-based scale degree.
    pub degree: usize,
    pub kind: ChordKind,
    /// Root lowered by one semitone.
    pub flat: bool,
}

impl Default for Degree {
    fn default() -> Self {
        Degree {
            degree: 1,
            kind: ChordKind::Major,
            flat: false,
        }
    }
}

impl Degree {
    /// Parse a Roman-numeral token. A lowercase numeral makes the chord minor.
    /// Unrecognized tokens become a major triad on the first degree.
    pub fn parse(token: &str) -> Degree {
        Degree::try_parse(token).unwrap_or_else(|| {
            warn!(token, "unparseable chord degree, using I");
            Degree::default()
        })
    }

    pub fn try_parse(token: &str) -> Option<Degree> {
        let token = token.trim();
        let (flat, rest) = match token.strip_prefix('b') {
            Some(rest) if rest.starts_with(['I', 'V', 'i', 'v']) => (true, rest),
            _ => (false, token),
        };

        let upper = rest.to_ascii_uppercase();
        // Longest numerals first so "VII" is not read as "V".
        let numeral = NUMERALS.into_iter().find(|n| upper.starts_with(n))?;
        let lowercase = rest.starts_with(['i', 'v']);
        let suffix = &rest[numeral.len()..];

        let kind = match suffix {
            "" => {
                if lowercase {
                    ChordKind::Minor
                } else {
                    ChordKind::Major
                }
            }
            "M7" | "maj7" => {
                if lowercase {
                    ChordKind::Minor7
                } else {
                    ChordKind::Major7
                }
            }
            "m7" => ChordKind::Minor7,
            "7" => {
                if lowercase {
                    ChordKind::Minor7
                } else {
                    ChordKind::Dominant7
                }
            }
            "dim" | "o" => ChordKind::Diminished,
            "dim7" | "o7" => ChordKind::Diminished7,
            "aug" | "+" => ChordKind::Augmented,
            "sus2" => ChordKind::Sus2,
            "sus4" => ChordKind::Sus4,
            "add9" => ChordKind::Add9,
            "5" => ChordKind::Power,
            _ => return None,
        };

        Some(Degree {
            degree: numeral_value(numeral),
            kind,
            flat,
        })
    }

    /// Build the chord for this degree in `scale`, rooted in `octave`.
    pub fn chord(&self, scale: &Scale, octave: i32) -> Chord {
        let mut root = scale.note_at_degree(self.degree);
        if self.flat {
            root = root.transpose(-1);
        }
        Chord::new(root, self.kind, octave)
    }
}

/// An ordered list of chords built from Roman-numeral tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct Progression {
    pub scale: Scale,
    pub degrees: Vec<Degree>,
    pub octave: i32,
}

impl Progression {
    pub fn new(key: Key, scale: ScaleKind, tokens: &[&str]) -> Self {
        let degrees = if tokens.is_empty() {
            DEFAULT_PROGRESSION.iter().map(|t| Degree::parse(t)).collect()
        } else {
            tokens.iter().map(|t| Degree::parse(t)).collect()
        };
        Progression {
            scale: Scale::new(key, scale),
            degrees,
            octave: 3,
        }
    }

    pub fn len(&self) -> usize {
        self.degrees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.degrees.is_empty()
    }

    /// Chord at `index`, wrapping around the progression.
    pub fn chord_at(&self, index: usize) -> Chord {
        let degree = self.degrees[index % self.degrees.len()];
        degree.chord(&self.scale, self.octave)
    }

    /// Chord sounding on `beat` when each chord lasts `beats_per_chord`.
    pub fn chord_at_beat(&self, beat: usize, beats_per_chord: usize) -> Chord {
        self.chord_at(beat / beats_per_chord.max(1))
    }

    pub fn chords(&self) -> Vec<Chord> {
        (0..self.len()).map(|i| self.chord_at(i)).collect()
    }
}

/// Used when a progression is built from an empty token list.
pub const DEFAULT_PROGRESSION: [&str; 4] = ["I", "V", "vi", "IV"];

type NamedProgression = (&'static str, &'static [&'static str]);

const ROCK_PROGRESSIONS: &[NamedProgression] = &[
    ("basic", &["I", "V", "vi", "IV"]),
    (
        "blues",
        &["I", "I", "I", "I", "IV", "IV", "I", "I", "V", "IV", "I", "V"],
    ),
    ("power", &["I", "bVII", "IV", "I"]),
    ("classic", &["I", "vi", "IV", "V"]),
];

const SOFT_PROGRESSIONS: &[NamedProgression] = &[
    ("jazz", &["IIM7", "V7", "IM7", "VIM7"]),
    ("smooth", &["IM7", "VIM7", "IIM7", "V7"]),
    ("ballad", &["I", "V", "vi", "iii", "IV", "I", "IV", "V"]),
    ("ambient", &["I", "IV", "I", "IV"]),
];

const BOSSA_PROGRESSIONS: &[NamedProgression] = &[
    ("classic", &["IIM7", "V7", "IM7", "IM7"]),
    (
        "extended",
        &["IM7", "I7", "IVM7", "IVm7", "IM7", "V7", "IM7", "IM7"],
    ),
    ("samba", &["IM7", "VIM7", "IIM7", "V7"]),
];

/// Named progressions available for a genre.
pub fn named_progressions(genre: Genre) -> &'static [NamedProgression] {
    match genre {
        Genre::Rock => ROCK_PROGRESSIONS,
        Genre::Soft => SOFT_PROGRESSIONS,
        Genre::Bossa => BOSSA_PROGRESSIONS,
    }
}

/// Look up a named progression for a genre.
pub fn progression_tokens(genre: Genre, name: &str) -> Option<&'static [&'static str]> {
    named_progressions(genre)
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, tokens)| *tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major7_on_first_degree_of_c_major() {
        let scale = Scale::new(Key::C, ScaleKind::Major);
        let chord = Degree::parse("IM7").chord(&scale, 4);
        assert_eq!(chord.kind, ChordKind::Major7);
        assert_eq!(chord.notes(), vec!["C", "E", "G", "B"]);
    }

    #[test]
    fn octave_rolls_over() {
        let chord = Chord::new(Key::A, ChordKind::Major, 3);
        let tones = chord.tones();
        let names: Vec<String> = tones.iter().map(ChordTone::name).collect();
        assert_eq!(names, vec!["A3", "C#4", "E4"]);

        let add9 = Chord::new(Key::C, ChordKind::Add9, 4);
        assert_eq!(add9.tones()[3].name(), "D5");
    }

    #[test]
    fn inversion_moves_root_up() {
        let chord = Chord::new(Key::C, ChordKind::Major, 4);
        let first = chord.inversion(1);
        let names: Vec<String> = first.iter().map(ChordTone::name).collect();
        assert_eq!(names, vec!["E4", "G4", "C5"]);
    }

    #[test]
    fn frequencies_match_tones() {
        let chord = Chord::new(Key::A, ChordKind::Power, 4);
        let f = chord.frequencies();
        assert!((f[0] - 440.0).abs() < 1e-9);
        assert!((f[1] - 659.255).abs() < 0.01);
        assert!((chord.root_frequency() - 440.0).abs() < 1e-9);
    }

    #[test]
    fn degree_parsing() {
        assert_eq!(
            Degree::parse("IIM7"),
            Degree {
                degree: 2,
                kind: ChordKind::Major7,
                flat: false
            }
        );
        assert_eq!(
            Degree::parse("bVII"),
            Degree {
                degree: 7,
                kind: ChordKind::Major,
                flat: true
            }
        );
        assert_eq!(Degree::parse("vi").kind, ChordKind::Minor);
        assert_eq!(Degree::parse("vi").degree, 6);
        assert_eq!(Degree::parse("V7").kind, ChordKind::Dominant7);
        assert_eq!(Degree::parse("ii7").kind, ChordKind::Minor7);
        assert_eq!(Degree::parse("viidim").kind, ChordKind::Diminished);
        assert_eq!(Degree::parse("IVsus4").kind, ChordKind::Sus4);
    }

    #[test]
    fn unknown_degree_falls_back_to_tonic_major() {
        for token in ["", "X", "IIQ", "hello"] {
            assert_eq!(Degree::parse(token), Degree::default(), "{token:?}");
        }
    }

    #[test]
    fn flat_degree_lowers_root() {
        let scale = Scale::new(Key::C, ScaleKind::Major);
        let chord = Degree::parse("bVII").chord(&scale, 3);
        assert_eq!(chord.root, Key::ASharp);
    }

    #[test]
    fn progression_wraps() {
        let p = Progression::new(Key::C, ScaleKind::Major, &["I", "V", "vi", "IV"]);
        let roots: Vec<Key> = (0..6).map(|i| p.chord_at(i).root).collect();
        assert_eq!(roots, vec![Key::C, Key::G, Key::A, Key::F, Key::C, Key::G]);
        assert_eq!(p.chord_at(2).kind, ChordKind::Minor);
        assert_eq!(p.chord_at_beat(5, 4).root, Key::G);
    }

    #[test]
    fn every_genre_progression_parses() {
        for genre in Genre::ALL {
            for (name, tokens) in named_progressions(genre) {
                for token in tokens.iter() {
                    assert!(Degree::try_parse(token).is_some(), "{genre:?}/{name}: {token}");
                }
            }
        }
        assert!(progression_tokens(Genre::Rock, "power").is_some());
        assert!(progression_tokens(Genre::Rock, "jazz").is_none());
    }

    #[test]
    fn chord_kind_parse() {
        assert_eq!(ChordKind::parse("major7"), ChordKind::Major7);
        assert_eq!(ChordKind::parse("dim"), ChordKind::Diminished);
        assert_eq!(ChordKind::parse("weird"), ChordKind::Major);
    }
}
