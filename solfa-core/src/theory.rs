//! Scale-degree to pitch mapping and the calibration cadence

use crate::types::{Mode, Pitch, ScaleDegree, ScaleKey};

/// Degrees of the calibration progression: I-IV-V-I
pub const CADENCE_DEGREES: [u8; 4] = [1, 4, 5, 1];

/// A diatonic triad, lowest pitch first
pub type Triad = [Pitch; 3];

/// Semitones from the tonic of the reference octave to `degree`
pub fn degree_to_semitones(degree: ScaleDegree, mode: Mode) -> Pitch {
    let d0 = degree.zero_based();
    let octave = (d0 / 7) as Pitch;
    let index = d0 % 7;
    mode.intervals()[index] as Pitch + 12 * octave
}

/// Absolute pitch of a scale degree in the given key and mode
pub fn pitch_of(key: ScaleKey, mode: Mode, degree: ScaleDegree) -> Pitch {
    key.tonic() + degree_to_semitones(degree, mode)
}

/// Diatonic triad rooted on `root`: the root plus the degrees two and four steps up
pub fn triad(key: ScaleKey, mode: Mode, root: ScaleDegree) -> Triad {
    [
        pitch_of(key, mode, root),
        pitch_of(key, mode, root.above(2)),
        pitch_of(key, mode, root.above(4)),
    ]
}

/// Tonic, subdominant, dominant, tonic triads that establish the key before a drill
pub fn calibration_cadence(key: ScaleKey, mode: Mode) -> [Triad; 4] {
    CADENCE_DEGREES.map(|d| triad(key, mode, ScaleDegree(d)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deg(d: u8) -> ScaleDegree {
        ScaleDegree::new(d).unwrap()
    }

    #[test]
    fn test_c_major_triad_degrees() {
        let pitches: Vec<Pitch> = [1, 3, 5]
            .iter()
            .map(|&d| pitch_of(ScaleKey::C, Mode::Major, deg(d)))
            .collect();
        assert_eq!(pitches, vec![60, 64, 67]);
    }

    #[test]
    fn test_octave_wrap() {
        for key in ScaleKey::ALL {
            for mode in Mode::ALL {
                for d in 1..=14 {
                    assert_eq!(
                        pitch_of(key, mode, deg(d + 7)),
                        pitch_of(key, mode, deg(d)) + 12,
                        "{} {} degree {}",
                        key,
                        mode,
                        d
                    );
                }
            }
        }
    }

    #[test]
    fn test_degree_eight_is_tonic_an_octave_up() {
        assert_eq!(pitch_of(ScaleKey::G, Mode::Minor, deg(8)), 67 + 12);
    }

    #[test]
    fn test_c_major_cadence() {
        assert_eq!(
            calibration_cadence(ScaleKey::C, Mode::Major),
            [[60, 64, 67], [65, 69, 72], [67, 71, 74], [60, 64, 67]]
        );
    }

    #[test]
    fn test_a_minor_cadence_is_i_iv_v_i() {
        // i = A C E, iv = D F A, v = E G B
        assert_eq!(
            calibration_cadence(ScaleKey::A, Mode::Minor),
            [[69, 72, 76], [74, 77, 81], [76, 79, 83], [69, 72, 76]]
        );
    }

    #[test]
    fn test_cadence_chords_ascend() {
        for key in ScaleKey::ALL {
            for mode in Mode::ALL {
                let cadence = calibration_cadence(key, mode);
                assert_eq!(cadence.len(), 4);
                for chord in cadence {
                    assert!(chord[0] <= chord[1] && chord[1] <= chord[2]);
                }
            }
        }
    }
}
