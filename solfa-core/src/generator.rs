//! Constrained random melody generation
//!
//! A question is a random walk over the allowed scale degrees. Each step
//! picks a degree uniformly, then takes whichever octave transposition of
//! it lies closest to the previous note, provided that distance is within
//! `max_jump`. Steps that cannot satisfy the bound are rejected and retried
//! with a fresh degree. If the attempt budget runs out the melody is padded
//! by repeating its last note, so generation never fails.

use crate::theory::pitch_of;
use crate::types::{DrillSettings, Fraction, Pitch, ScaleDegree, SetParameters};
use rand::seq::SliceRandom;
use rand::Rng;

/// Total rejection-sampling attempts for one question
pub const MAX_ATTEMPTS: usize = 2000;

/// Octave transpositions searched on each side of a degree's base pitch
pub const OCTAVE_WINDOW: i32 = 4;

/// One note of a question
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QuestionNote {
    pub degree: ScaleDegree,
    pub pitch: Pitch,
    /// Duration as a fraction of a whole note
    pub fraction: Fraction,
}

/// A generated melody to be identified degree by degree
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Question {
    notes: Vec<QuestionNote>,
    /// Index of the first note added by fallback padding
    padded_from: Option<usize>,
}

impl Question {
    pub fn notes(&self) -> &[QuestionNote] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn degrees(&self) -> Vec<ScaleDegree> {
        self.notes.iter().map(|n| n.degree).collect()
    }

    pub fn pitches(&self) -> Vec<Pitch> {
        self.notes.iter().map(|n| n.pitch).collect()
    }

    pub fn degree_at(&self, position: usize) -> Option<ScaleDegree> {
        self.notes.get(position).map(|n| n.degree)
    }

    /// Where fallback padding started, if the walk ran out of attempts
    pub fn padded_from(&self) -> Option<usize> {
        self.padded_from
    }

    pub fn used_fallback(&self) -> bool {
        self.padded_from.is_some()
    }
}

/// Transposition of `base` nearest to `previous` within `max_jump` semitones.
///
/// Candidates are visited from the lowest octave up and only a strictly
/// closer candidate replaces the current best, so ties go to the lower pitch.
pub fn nearest_within_jump(base: Pitch, previous: Pitch, max_jump: u8) -> Option<Pitch> {
    let mut best: Option<(Pitch, Pitch)> = None;
    for k in -OCTAVE_WINDOW..=OCTAVE_WINDOW {
        let candidate = base + 12 * k;
        let distance = (candidate - previous).abs();
        if distance > max_jump as Pitch {
            continue;
        }
        if best.map_or(true, |(_, best_distance)| distance < best_distance) {
            best = Some((candidate, distance));
        }
    }
    best.map(|(pitch, _)| pitch)
}

/// Generate a question of exactly `settings.num_notes` notes (at least one).
///
/// # Panics
/// If `settings` has no degrees or no rhythms. Settings are validated
/// before a session starts, so this only fires on a caller bug.
pub fn generate<R: Rng + ?Sized>(
    settings: &DrillSettings,
    params: &SetParameters,
    rng: &mut R,
) -> Question {
    assert!(
        !settings.degrees.is_empty(),
        "cannot generate a question with no allowed degrees"
    );
    assert!(
        !settings.rhythms.is_empty(),
        "cannot generate a question with no allowed rhythms"
    );

    let target = settings.num_notes.max(1);
    let mut notes = Vec::with_capacity(target);

    let pick_degree = |rng: &mut R| -> ScaleDegree {
        *settings.degrees.choose(rng).expect("degrees checked above")
    };
    let pick_fraction = |rng: &mut R| -> Fraction {
        settings
            .rhythms
            .choose(rng)
            .expect("rhythms checked above")
            .fraction()
    };

    let first = pick_degree(rng);
    notes.push(QuestionNote {
        degree: first,
        pitch: pitch_of(params.key, params.mode, first),
        fraction: pick_fraction(rng),
    });

    let mut attempts = 0;
    while notes.len() < target && attempts < MAX_ATTEMPTS {
        attempts += 1;
        let previous = notes[notes.len() - 1].pitch;
        let degree = pick_degree(rng);
        let base = pitch_of(params.key, params.mode, degree);

        let Some(pitch) = nearest_within_jump(base, previous, settings.max_jump) else {
            continue;
        };
        notes.push(QuestionNote {
            degree,
            pitch,
            fraction: pick_fraction(rng),
        });
    }

    let mut padded_from = None;
    if notes.len() < target {
        log::debug!(
            "melody walk stopped at {}/{} notes after {} attempts (max jump {}), padding",
            notes.len(),
            target,
            attempts,
            settings.max_jump
        );
        padded_from = Some(notes.len());
        let last = notes[notes.len() - 1];
        notes.resize(target, last);
    }

    Question { notes, padded_from }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Mode, RhythmValue, ScaleKey};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn degrees(ds: &[u8]) -> Vec<ScaleDegree> {
        ds.iter().map(|&d| ScaleDegree::new(d).unwrap()).collect()
    }

    fn c_major() -> SetParameters {
        SetParameters::new(ScaleKey::C, Mode::Major, 90)
    }

    #[test]
    fn test_nearest_prefers_closest_octave() {
        // G (67) from E5 (76): 79 is 3 away, 67 is 9 away
        assert_eq!(nearest_within_jump(67, 76, 7), Some(79));
        assert_eq!(nearest_within_jump(67, 76, 2), None);
    }

    #[test]
    fn test_nearest_tie_takes_lower_candidate() {
        // F#-ish base 66 from 60: 54 and 66 are both 6 away
        assert_eq!(nearest_within_jump(66, 60, 6), Some(54));
    }

    #[test]
    fn test_nearest_same_pitch_class_is_zero_jump() {
        assert_eq!(nearest_within_jump(72, 60, 0), Some(60));
    }

    #[test]
    fn test_length_always_matches() {
        let mut rng = StdRng::seed_from_u64(11);
        for num_notes in 1..=12 {
            let settings = DrillSettings {
                num_notes,
                ..DrillSettings::default()
            };
            let q = generate(&settings, &c_major(), &mut rng);
            assert_eq!(q.len(), num_notes);
        }
    }

    #[test]
    fn test_jumps_bounded_without_fallback() {
        let mut rng = StdRng::seed_from_u64(42);
        for max_jump in 1..=12 {
            let settings = DrillSettings {
                num_notes: 16,
                max_jump,
                ..DrillSettings::default()
            };
            let q = generate(&settings, &c_major(), &mut rng);
            let end = q.padded_from().unwrap_or(q.len());
            for pair in q.notes()[..end].windows(2) {
                assert!(
                    (pair[1].pitch - pair[0].pitch).abs() <= max_jump as Pitch,
                    "jump {} -> {} exceeds {}",
                    pair[0].pitch,
                    pair[1].pitch,
                    max_jump
                );
            }
        }
    }

    #[test]
    fn test_pitch_class_matches_degree() {
        let mut rng = StdRng::seed_from_u64(5);
        let params = SetParameters::new(ScaleKey::Eb, Mode::Minor, 60);
        let settings = DrillSettings {
            num_notes: 20,
            ..DrillSettings::default()
        };
        let q = generate(&settings, &params, &mut rng);
        for note in q.notes() {
            let base = pitch_of(params.key, params.mode, note.degree);
            assert_eq!((note.pitch - base).rem_euclid(12), 0);
        }
    }

    #[test]
    fn test_single_note_question() {
        let mut rng = StdRng::seed_from_u64(1);
        let settings = DrillSettings {
            num_notes: 1,
            degrees: degrees(&[3]),
            ..DrillSettings::default()
        };
        let q = generate(&settings, &c_major(), &mut rng);
        assert_eq!(q.pitches(), vec![64]);
        assert!(!q.used_fallback());
    }

    #[test]
    fn test_single_degree_repeats_without_fallback() {
        let mut rng = StdRng::seed_from_u64(2);
        let settings = DrillSettings {
            num_notes: 5,
            degrees: degrees(&[1]),
            ..DrillSettings::default()
        };
        let q = generate(&settings, &c_major(), &mut rng);
        assert_eq!(q.degrees(), degrees(&[1, 1, 1, 1, 1]));
        assert_eq!(q.pitches(), vec![60; 5]);
        assert!(!q.used_fallback());
    }

    #[test]
    fn test_unreachable_degrees_fall_back_to_repeating_first_note() {
        // With a zero jump only the first note's own degree could follow it
        // and degree 1 vs 5 never share a pitch class.
        let settings = DrillSettings {
            num_notes: 6,
            degrees: degrees(&[1, 5]),
            max_jump: 0,
            ..DrillSettings::default()
        };
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let q = generate(&settings, &c_major(), &mut rng);
            assert_eq!(q.len(), 6);
            let first = q.notes()[0];
            // Any accepted step repeats the same degree, so the melody is constant.
            assert!(q.notes().iter().all(|n| n.degree == first.degree));
            assert!(q.notes().iter().all(|n| n.pitch == first.pitch));
        }
    }

    /// Picks index 0 for the first `leading` draws, then index 1 of any
    /// two-element slice forever.
    struct ScriptedRng {
        leading: usize,
        drawn: usize,
    }

    impl rand::RngCore for ScriptedRng {
        fn next_u32(&mut self) -> u32 {
            self.drawn += 1;
            if self.drawn <= self.leading {
                0
            } else {
                0x8000_0000
            }
        }

        fn next_u64(&mut self) -> u64 {
            self.next_u32() as u64
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn test_budget_exhaustion_pads_with_first_note() {
        // First degree and rhythm draw index 0 (degree 1, minim); every later
        // draw asks for degree 5, which is never within a zero jump of C.
        let settings = DrillSettings {
            num_notes: 5,
            degrees: degrees(&[1, 5]),
            rhythms: vec![RhythmValue::Minim, RhythmValue::Quaver],
            max_jump: 0,
            ..DrillSettings::default()
        };
        let mut rng = ScriptedRng {
            leading: 2,
            drawn: 0,
        };
        let q = generate(&settings, &c_major(), &mut rng);

        assert_eq!(q.padded_from(), Some(1));
        assert_eq!(q.degrees(), degrees(&[1, 1, 1, 1, 1]));
        assert_eq!(q.pitches(), vec![60; 5]);
        assert!(q
            .notes()
            .iter()
            .all(|n| n.fraction == RhythmValue::Minim.fraction()));
        // one draw each for the first degree and rhythm, then one per attempt
        assert_eq!(rng.drawn, 2 + MAX_ATTEMPTS);
    }

    #[test]
    fn test_padding_repeats_last_accepted_note() {
        // Two notes succeed (degree 1 twice), then degree 5 stalls the walk.
        let settings = DrillSettings {
            num_notes: 4,
            degrees: degrees(&[1, 5]),
            rhythms: vec![RhythmValue::Crotchet, RhythmValue::Quaver],
            max_jump: 2,
            ..DrillSettings::default()
        };
        let mut rng = ScriptedRng {
            leading: 4,
            drawn: 0,
        };
        let q = generate(&settings, &c_major(), &mut rng);
        assert_eq!(q.padded_from(), Some(2));
        assert_eq!(q.len(), 4);
        assert!(q.notes()[2..].iter().all(|n| *n == q.notes()[1]));
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let settings = DrillSettings::default();
        let a = generate(&settings, &c_major(), &mut StdRng::seed_from_u64(77));
        let b = generate(&settings, &c_major(), &mut StdRng::seed_from_u64(77));
        assert_eq!(a, b);
    }

    #[test]
    #[should_panic(expected = "no allowed degrees")]
    fn test_empty_degrees_panics() {
        let settings = DrillSettings {
            degrees: vec![],
            ..DrillSettings::default()
        };
        generate(&settings, &c_major(), &mut StdRng::seed_from_u64(0));
    }
}
