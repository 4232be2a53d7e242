//! Scales: named interval sets rooted on a key.

use super::note::{A4_TUNING, Key, midi_to_frequency};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Named scale interval sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    #[default]
    Major,
    Minor,
    Blues,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Pentatonic,
    HarmonicMinor,
    Chromatic,
}

impl ScaleKind {
    pub const ALL: [ScaleKind; 10] = [
        ScaleKind::Major,
        ScaleKind::Minor,
        ScaleKind::Blues,
        ScaleKind::Dorian,
        ScaleKind::Phrygian,
        ScaleKind::Lydian,
        ScaleKind::Mixolydian,
        ScaleKind::Pentatonic,
        ScaleKind::HarmonicMinor,
        ScaleKind::Chromatic,
    ];

    /// Semitone offsets from the root, sorted ascending.
    pub fn intervals(self) -> &'static [i32] {
        match self {
            ScaleKind::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleKind::Minor => &[0, 2, 3, 5, 7, 8, 10],
            ScaleKind::Blues => &[0, 3, 5, 6, 7, 10],
            ScaleKind::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            ScaleKind::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            ScaleKind::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            ScaleKind::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            ScaleKind::Pentatonic => &[0, 2, 4, 7, 9],
            ScaleKind::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            ScaleKind::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScaleKind::Major => "major",
            ScaleKind::Minor => "minor",
            ScaleKind::Blues => "blues",
            ScaleKind::Dorian => "dorian",
            ScaleKind::Phrygian => "phrygian",
            ScaleKind::Lydian => "lydian",
            ScaleKind::Mixolydian => "mixolydian",
            ScaleKind::Pentatonic => "pentatonic",
            ScaleKind::HarmonicMinor => "harmonic_minor",
            ScaleKind::Chromatic => "chromatic",
        }
    }

    pub fn try_parse(name: &str) -> Option<ScaleKind> {
        let normalized = name.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        ScaleKind::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
    }

    /// Parse a scale name, falling back to major.
    pub fn parse(name: &str) -> ScaleKind {
        ScaleKind::try_parse(name).unwrap_or_else(|| {
            warn!(scale = name, "unknown scale, falling back to major");
            ScaleKind::Major
        })
    }
}

impl fmt::Display for ScaleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scale rooted on a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    pub root: Key,
    pub kind: ScaleKind,
}

impl Scale {
    pub fn new(root: Key, kind: ScaleKind) -> Self {
        Scale { root, kind }
    }

    /// Number of degrees per octave.
    pub fn len(&self) -> usize {
        self.kind.intervals().len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Pitch classes of the scale, root first.
    pub fn keys(&self) -> Vec<Key> {
        self.kind
            .intervals()
            .iter()
            .map(|&i| self.root.transpose(i))
            .collect()
    }

    /// Ordered note names without octave.
    pub fn notes(&self) -> Vec<&'static str> {
        self.keys().into_iter().map(Key::name).collect()
    }

    /// Semitone offset of a zero-based degree index, counting whole octaves
    /// for indices past the end (index 7 of a major scale is 12).
    pub fn semitones_at(&self, index: i32) -> i32 {
        let intervals = self.kind.intervals();
        let len = intervals.len() as i32;
        intervals[index.rem_euclid(len) as usize] + 12 * index.div_euclid(len)
    }

    /// Note at a 1-based degree; wraps past the end of the scale.
    pub fn note_at_degree(&self, degree: usize) -> Key {
        let index = degree.max(1) - 1;
        self.keys()[index % self.len()]
    }

    /// Whether a note (with or without an octave suffix) belongs to the scale.
    pub fn contains(&self, note: &str) -> bool {
        let name = note.trim_end_matches(|c: char| c.is_ascii_digit() || c == '-');
        Key::try_parse(name).is_some_and(|key| self.keys().contains(&key))
    }

    /// MIDI number of a 1-based degree in the octave of the root.
    pub fn midi(&self, degree: usize, octave: i32) -> i32 {
        self.root.midi(octave) + self.semitones_at(degree.max(1) as i32 - 1)
    }

    /// Frequency of a 1-based degree, with the root placed in `octave`.
    pub fn frequency(&self, degree: usize, octave: i32) -> f64 {
        midi_to_frequency(self.midi(degree, octave), A4_TUNING)
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.root, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_major_notes() {
        let scale = Scale::new(Key::C, ScaleKind::Major);
        assert_eq!(scale.notes(), vec!["C", "D", "E", "F", "G", "A", "B"]);
    }

    #[test]
    fn scales_are_sorted_and_rooted() {
        for kind in ScaleKind::ALL {
            let iv = kind.intervals();
            assert_eq!(iv[0], 0, "{kind} must start at the root");
            assert!(iv.windows(2).all(|w| w[0] < w[1]), "{kind} not sorted");
            assert!(*iv.last().unwrap() < 12);
        }
    }

    #[test]
    fn other_roots() {
        let scale = Scale::new(Key::A, ScaleKind::Minor);
        assert_eq!(scale.notes(), vec!["A", "B", "C", "D", "E", "F", "G"]);
        let blues = Scale::new(Key::E, ScaleKind::Blues);
        assert_eq!(blues.notes(), vec!["E", "G", "A", "A#", "B", "D"]);
    }

    #[test]
    fn degree_wraps() {
        let scale = Scale::new(Key::C, ScaleKind::Major);
        assert_eq!(scale.note_at_degree(1), Key::C);
        assert_eq!(scale.note_at_degree(5), Key::G);
        assert_eq!(scale.note_at_degree(8), Key::C);
        assert_eq!(scale.semitones_at(7), 12);
        assert_eq!(scale.semitones_at(-1), -1);
    }

    #[test]
    fn contains_ignores_octave() {
        let scale = Scale::new(Key::G, ScaleKind::Major);
        assert!(scale.contains("F#4"));
        assert!(scale.contains("G"));
        assert!(!scale.contains("F3"));
        assert!(!scale.contains("nonsense"));
    }

    #[test]
    fn frequencies() {
        let scale = Scale::new(Key::A, ScaleKind::Major);
        assert!((scale.frequency(1, 4) - 440.0).abs() < 1e-9);
        assert!((scale.frequency(8, 3) - 440.0).abs() < 1e-9);
    }

    #[test]
    fn parse_with_fallback() {
        assert_eq!(ScaleKind::parse("harmonic-minor"), ScaleKind::HarmonicMinor);
        assert_eq!(ScaleKind::parse("Dorian"), ScaleKind::Dorian);
        assert_eq!(ScaleKind::parse("klingon"), ScaleKind::Major);
    }
}
