//! Initial pattern generation from genre rhythm tables and chord progressions.

use super::pattern::{DrumKind, NoteEvent, PatternSet, STEPS_PER_BAR};
use crate::dsp::mixer::ChannelId;
use crate::params::{Genre, Parameters};
use crate::theory::note::{A4_TUNING, midi_to_frequency, midi_to_note_name};
use crate::theory::scale::Scale;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Probability that a melody note is a chord tone rather than a passing tone.
pub const CHORD_TONE_PROBABILITY: f64 = 0.7;

/// Per-step probability of flipping the melody rhythm.
pub const RHYTHM_VARIATION: f64 = 0.1;

/// Velocity boost on the first step of a bar.
pub const ACCENT: u8 = 12;

/// Patterns are varied on every bar that is a multiple of this.
pub const VARIATION_BARS: usize = 4;

/// Chance that a variation touches the melody tail at all.
pub const MELODY_VARIATION: f64 = 0.3;

/// Chance for each tail note to be re-picked once the tail is touched.
pub const NOTE_REPICK: f64 = 0.5;

/// Melody steps at the end of the loop that variations may re-pick.
const MELODY_TAIL: usize = 8;

/// Every this many variations a snare fill closes the loop.
const FILL_EVERY: u8 = 8;

/// One bar of onsets per voice plus a per-bar chord progression given as
/// zero-based scale degree indices.
#[derive(Debug, Clone, PartialEq)]
pub struct RhythmTable {
    pub melody: [u8; 16],
    pub bass: [u8; 16],
    pub kick: [u8; 16],
    pub snare: [u8; 16],
    pub hihat: [u8; 16],
    pub progression: [usize; 8],
}

const ROCK: RhythmTable = RhythmTable {
    melody: [1, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0],
    bass: [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0],
    kick: [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0],
    snare: [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    hihat: [1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0],
    progression: [0, 0, 5, 5, 0, 0, 4, 4],
};

const SOFT: RhythmTable = RhythmTable {
    melody: [1, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0],
    bass: [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0],
    kick: [1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0],
    snare: [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    hihat: [0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0],
    progression: [0, 3, 4, 0, 0, 3, 4, 4],
};

const BOSSA: RhythmTable = RhythmTable {
    melody: [0, 0, 1, 0, 0, 1, 0, 1, 0, 0, 1, 0, 0, 0, 1, 0],
    bass: [1, 0, 0, 1, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 0, 0],
    kick: [1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 0],
    snare: [0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 0, 0],
    hihat: [1, 1, 0, 1, 1, 0, 1, 1, 0, 1, 1, 0, 1, 1, 0, 0],
    progression: [0, 0, 1, 4, 0, 0, 1, 4],
};

pub fn rhythm_table(genre: Genre) -> &'static RhythmTable {
    match genre {
        Genre::Rock => &ROCK,
        Genre::Soft => &SOFT,
        Genre::Bossa => &BOSSA,
    }
}

/// How the initial patterns are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Genre rhythms with chord-aware melody, harmony and bass.
    #[default]
    Procedural,
    /// The key root on every tonal step, no percussion.
    Drone,
}

/// Builds [`PatternSet`]s for the current parameters.
#[derive(Debug, Clone)]
pub struct PatternGenerator {
    pub mode: GenerationMode,
    rng: StdRng,
    variation: u8,
}

impl PatternGenerator {
    pub fn new(mode: GenerationMode) -> Self {
        PatternGenerator {
            mode,
            rng: StdRng::from_entropy(),
            variation: 0,
        }
    }

    pub fn seeded(mode: GenerationMode, seed: u64) -> Self {
        PatternGenerator {
            mode,
            rng: StdRng::seed_from_u64(seed),
            variation: 0,
        }
    }

    pub fn generate(&mut self, params: &Parameters) -> PatternSet {
        let set = match self.mode {
            GenerationMode::Procedural => self.procedural(params),
            GenerationMode::Drone => drone(params),
        };
        debug!(
            mode = ?self.mode,
            genre = %params.genre,
            bars = params.loop_bars,
            "generated patterns"
        );
        set
    }

    /// Vary a playing loop at the start of `bar`. Only bars that are a
    /// multiple of [`VARIATION_BARS`] count.
    ///
    /// Sometimes re-picks notes in the last [`MELODY_TAIL`] lead steps, and
    /// every eighth variation writes a snare fill on the last two steps.
    /// Drone patterns are left alone. Returns whether any slot changed.
    pub fn vary(&mut self, set: &mut PatternSet, params: &Parameters, bar: usize) -> bool {
        if self.mode == GenerationMode::Drone || bar % VARIATION_BARS != 0 || set.is_empty() {
            return false;
        }
        let total = set.len();
        let mut changed = false;

        if self.rng.gen_bool(MELODY_VARIATION) {
            let scale = Scale::new(params.key, params.scale);
            for step in total.saturating_sub(MELODY_TAIL)..total {
                let Some(NoteEvent::Tone {
                    velocity,
                    duration_beats,
                    ..
                }) = set[ChannelId::Lead].get(step).cloned()
                else {
                    continue;
                };
                if !self.rng.gen_bool(NOTE_REPICK) {
                    continue;
                }
                let index = self.rng.gen_range(0..scale.len());
                let midi = scale.root.midi(5) + scale.semitones_at(index as i32);
                let event = NoteEvent::tone(
                    midi_to_frequency(midi, A4_TUNING),
                    midi_to_note_name(midi),
                    velocity,
                    duration_beats,
                );
                changed |= set[ChannelId::Lead].get(step) != Some(&event);
                set[ChannelId::Lead].insert(step, event);
            }
        }

        self.variation = (self.variation + 1) % FILL_EVERY;
        if self.variation == 0 {
            for step in total.saturating_sub(2)..total {
                let velocity = self.velocity(70, 10);
                set[ChannelId::Percussion].insert(step, NoteEvent::drum(DrumKind::Snare, velocity, 0.25));
            }
            changed = true;
        }

        debug!(bar, changed, variation = self.variation, "pattern variation");
        changed
    }

    fn velocity(&mut self, base: u8, spread: u8) -> u8 {
        base.saturating_add(self.rng.gen_range(0..=spread)).min(127)
    }

    fn tone(&mut self, midi: i32, base: u8, spread: u8, beats: f64, accent: bool) -> NoteEvent {
        let mut velocity = self.velocity(base, spread);
        if accent {
            velocity = velocity.saturating_add(ACCENT).min(127);
        }
        NoteEvent::tone(
            midi_to_frequency(midi, A4_TUNING),
            midi_to_note_name(midi),
            velocity,
            beats,
        )
    }

    fn procedural(&mut self, params: &Parameters) -> PatternSet {
        let table = rhythm_table(params.genre);
        let scale = Scale::new(params.key, params.scale);
        let degrees = scale.len();
        let steps_per_bar = params.time_signature.steps_per_bar();
        let total = params.loop_bars.max(1) * STEPS_PER_BAR;

        let mut melody = table.melody;
        for onset in melody.iter_mut() {
            if self.rng.gen_bool(RHYTHM_VARIATION) {
                *onset ^= 1;
            }
        }

        // MIDI for a zero-based degree index, wrapped inside one octave.
        let degree_midi = |index: usize, octave: i32| {
            scale.root.midi(octave) + scale.semitones_at((index % degrees) as i32)
        };

        let mut set = PatternSet::new(params.loop_bars);
        for step in 0..total {
            let bar = step / steps_per_bar;
            let in_bar = step % steps_per_bar;
            let slot = in_bar % STEPS_PER_BAR;
            let downbeat = in_bar == 0;
            let chord = table.progression[bar % table.progression.len()] % degrees;

            if melody[slot] == 1 {
                let index = if self.rng.gen_bool(CHORD_TONE_PROBABILITY) {
                    chord + 2 * self.rng.gen_range(0..3usize)
                } else {
                    self.rng.gen_range(0..degrees)
                };
                let event = self.tone(degree_midi(index, 5), 60, 20, 1.0, downbeat);
                set[ChannelId::Lead].insert(step, event);
            }

            if in_bar % 4 == 2 {
                let event = self.tone(degree_midi(chord + 2, 4), 50, 20, 0.75, false);
                set[ChannelId::Harmony].insert(step, event);
            }

            if table.bass[slot] == 1 {
                let event = self.tone(degree_midi(chord, 3), 70, 20, 2.0, downbeat);
                set[ChannelId::Bass].insert(step, event);
            }

            let drum = if table.kick[slot] == 1 {
                Some((DrumKind::Kick, self.velocity(80, 10), 0.5))
            } else if table.snare[slot] == 1 {
                Some((DrumKind::Snare, self.velocity(70, 10), 0.25))
            } else if table.hihat[slot] == 1 {
                Some((DrumKind::HiHat, self.velocity(40, 15), 0.25))
            } else {
                None
            };
            if let Some((kind, mut velocity, beats)) = drum {
                if downbeat {
                    velocity = velocity.saturating_add(ACCENT).min(127);
                }
                set[ChannelId::Percussion].insert(step, NoteEvent::drum(kind, velocity, beats));
            }
        }
        set
    }
}

/// Root at octave 4 on every step of every tonal channel.
fn drone(params: &Parameters) -> PatternSet {
    let midi = params.key.midi(4);
    let event = NoteEvent::tone(
        midi_to_frequency(midi, A4_TUNING),
        midi_to_note_name(midi),
        70,
        0.25,
    );
    let mut set = PatternSet::new(params.loop_bars);
    let total = set.len();
    for id in ChannelId::TONAL {
        for step in 0..total {
            set[id].insert(step, event.clone());
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::TimeSignature;
    use crate::theory::{Key, ScaleKind};

    fn params(genre: Genre) -> Parameters {
        Parameters {
            genre,
            ..Parameters::default()
        }
    }

    #[test]
    fn patterns_have_loop_length() {
        let mut generator = PatternGenerator::seeded(GenerationMode::Procedural, 1);
        for bars in [1, 4, 8] {
            let p = Parameters {
                loop_bars: bars,
                ..Parameters::default()
            };
            let set = generator.generate(&p);
            for (_, pattern) in set.iter() {
                assert_eq!(pattern.len(), bars * 16);
            }
        }
    }

    #[test]
    fn rock_drums_follow_table() {
        let mut generator = PatternGenerator::seeded(GenerationMode::Procedural, 2);
        let set = generator.generate(&params(Genre::Rock));
        let drums = &set[ChannelId::Percussion];
        for step in 0..16 {
            let expected = if ROCK.kick[step] == 1 {
                Some(DrumKind::Kick)
            } else if ROCK.snare[step] == 1 {
                Some(DrumKind::Snare)
            } else if ROCK.hihat[step] == 1 {
                Some(DrumKind::HiHat)
            } else {
                None
            };
            let got = match drums.get(step) {
                Some(NoteEvent::Drum { drum, .. }) => Some(*drum),
                _ => None,
            };
            assert_eq!(got, expected, "step {step}");
        }
    }

    #[test]
    fn kick_and_snare_take_precedence_over_hihat() {
        let mut generator = PatternGenerator::seeded(GenerationMode::Procedural, 2);
        let set = generator.generate(&params(Genre::Rock));
        // Step 4 has kick, snare and hi-hat in the rock table.
        match set[ChannelId::Percussion].get(4) {
            Some(NoteEvent::Drum {
                drum, noise_period, ..
            }) => {
                assert_eq!(*drum, DrumKind::Kick);
                assert_eq!(*noise_period, 15);
            }
            other => panic!("expected kick, got {other:?}"),
        }
    }

    #[test]
    fn harmony_on_offbeat_eighths() {
        let mut generator = PatternGenerator::seeded(GenerationMode::Procedural, 3);
        let set = generator.generate(&params(Genre::Soft));
        let harmony = &set[ChannelId::Harmony];
        for step in 0..harmony.len() {
            assert_eq!(harmony.get(step).is_some(), step % 4 == 2, "step {step}");
        }
    }

    #[test]
    fn bass_plays_chord_root_an_octave_down() {
        let mut generator = PatternGenerator::seeded(GenerationMode::Procedural, 4);
        let p = Parameters {
            key: Key::A,
            scale: ScaleKind::Minor,
            ..params(Genre::Rock)
        };
        let set = generator.generate(&p);
        // Bar 2 of the rock progression sits on scale index 5: F above the A3 root.
        match set[ChannelId::Bass].get(32) {
            Some(NoteEvent::Tone { note, .. }) => assert_eq!(note, "F4"),
            other => panic!("expected bass note, got {other:?}"),
        }
        match set[ChannelId::Bass].get(0) {
            Some(NoteEvent::Tone { note, .. }) => assert_eq!(note, "A3"),
            other => panic!("expected bass note, got {other:?}"),
        }
    }

    #[test]
    fn melody_notes_are_in_scale() {
        let mut generator = PatternGenerator::seeded(GenerationMode::Procedural, 5);
        let p = Parameters {
            key: Key::D,
            scale: ScaleKind::Blues,
            ..params(Genre::Bossa)
        };
        let set = generator.generate(&p);
        let scale = Scale::new(p.key, p.scale);
        let lead = &set[ChannelId::Lead];
        assert!(lead.event_count() > 0);
        for (_, event) in lead.iter() {
            assert!(scale.contains(&event.label()), "{} not in {scale}", event.label());
        }
    }

    #[test]
    fn same_seed_same_patterns() {
        let p = params(Genre::Bossa);
        let a = PatternGenerator::seeded(GenerationMode::Procedural, 9).generate(&p);
        let b = PatternGenerator::seeded(GenerationMode::Procedural, 9).generate(&p);
        assert_eq!(a, b);
    }

    #[test]
    fn three_four_changes_chord_every_twelve_steps() {
        let mut generator = PatternGenerator::seeded(GenerationMode::Procedural, 6);
        let p = Parameters {
            time_signature: TimeSignature::ThreeFour,
            ..params(Genre::Rock)
        };
        let set = generator.generate(&p);
        // Bars 0 and 1 are on I (C), bar 2 on vi (A): in 3/4 bar 2 starts at step 24.
        match set[ChannelId::Bass].get(24) {
            Some(NoteEvent::Tone { note, .. }) => assert_eq!(note, "A3"),
            other => panic!("expected bass note, got {other:?}"),
        }
    }

    #[test]
    fn variation_touches_only_melody_tail_and_fill() {
        let p = params(Genre::Rock);
        let mut generator = PatternGenerator::seeded(GenerationMode::Procedural, 21);
        let mut set = generator.generate(&p);
        let total = set.len();
        set[ChannelId::Lead].insert(total - 1, NoteEvent::named("C5", 80, 1.0).unwrap());
        let before = set.clone();

        assert!(!generator.vary(&mut set, &p, 3), "off-cycle bars are skipped");
        assert_eq!(set, before);

        for n in 0..200 {
            generator.vary(&mut set, &p, n * VARIATION_BARS);
            if n == 6 {
                assert_eq!(set[ChannelId::Percussion], before[ChannelId::Percussion]);
            }
            if n == 7 {
                for step in [total - 2, total - 1] {
                    assert!(matches!(
                        set[ChannelId::Percussion].get(step),
                        Some(NoteEvent::Drum { drum: DrumKind::Snare, .. })
                    ));
                }
            }
        }
        assert_ne!(set[ChannelId::Lead], before[ChannelId::Lead], "melody tail never re-picked");

        let scale = Scale::new(p.key, p.scale);
        for (id, pattern) in set.iter() {
            for step in 0..total {
                let (now, then) = (pattern.get(step), before[id].get(step));
                if now == then {
                    continue;
                }
                match id {
                    ChannelId::Lead => {
                        assert!(step >= total - 8, "lead step {step} changed");
                        let (now, then) = (now.unwrap(), then.unwrap());
                        assert_eq!(now.velocity(), then.velocity());
                        assert!(scale.contains(&now.label()), "{}", now.label());
                    }
                    ChannelId::Percussion => assert!(step >= total - 2, "drum step {step} changed"),
                    other => panic!("{other} changed at step {step}"),
                }
            }
        }
    }

    #[test]
    fn drone_patterns_never_vary() {
        let p = params(Genre::Rock);
        let mut generator = PatternGenerator::seeded(GenerationMode::Drone, 5);
        let mut set = generator.generate(&p);
        let before = set.clone();
        for n in 0..16 {
            assert!(!generator.vary(&mut set, &p, n * VARIATION_BARS));
        }
        assert_eq!(set, before);
    }

    #[test]
    fn drone_fills_tonal_channels() {
        let mut generator = PatternGenerator::seeded(GenerationMode::Drone, 0);
        let p = Parameters {
            key: Key::G,
            loop_bars: 2,
            ..Parameters::default()
        };
        let set = generator.generate(&p);
        for id in ChannelId::TONAL {
            assert_eq!(set[id].event_count(), 32);
            assert_eq!(set[id].get(7).map(NoteEvent::label), Some("G4".to_string()));
        }
        assert!(set[ChannelId::Percussion].is_empty());
    }
}
