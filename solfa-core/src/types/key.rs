use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

/// Absolute pitch number (MIDI numbering, 60 = middle C)
pub type Pitch = i32;

/// Pitch of C in the reference octave every key's tonic is placed in
pub const REFERENCE_TONIC: Pitch = 60;

/// Tonal root of a drill set, one of the 12 chromatic pitch classes.
/// Black keys are named with flats, matching how the keys are offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScaleKey {
    C,
    Db,
    D,
    Eb,
    E,
    F,
    Gb,
    G,
    Ab,
    A,
    Bb,
    B,
}

impl ScaleKey {
    /// All twelve keys in chromatic order starting from C
    pub const ALL: [ScaleKey; 12] = [
        ScaleKey::C,
        ScaleKey::Db,
        ScaleKey::D,
        ScaleKey::Eb,
        ScaleKey::E,
        ScaleKey::F,
        ScaleKey::Gb,
        ScaleKey::G,
        ScaleKey::Ab,
        ScaleKey::A,
        ScaleKey::Bb,
        ScaleKey::B,
    ];

    /// Chromatic pitch class (0-11), 0=C
    pub fn pitch_class(self) -> u8 {
        self as u8
    }

    /// Create a key from a pitch class (0-11)
    pub fn from_pitch_class(pitch_class: u8) -> Result<Self> {
        Self::ALL
            .get(pitch_class as usize)
            .copied()
            .ok_or_else(|| anyhow!("Pitch class must be 0-11, got {}", pitch_class))
    }

    /// Tonic pitch of this key, placed at or just above middle C
    pub fn tonic(self) -> Pitch {
        REFERENCE_TONIC + self.pitch_class() as Pitch
    }

    pub fn name(self) -> &'static str {
        match self {
            ScaleKey::C => "C",
            ScaleKey::Db => "Db",
            ScaleKey::D => "D",
            ScaleKey::Eb => "Eb",
            ScaleKey::E => "E",
            ScaleKey::F => "F",
            ScaleKey::Gb => "Gb",
            ScaleKey::G => "G",
            ScaleKey::Ab => "Ab",
            ScaleKey::A => "A",
            ScaleKey::Bb => "Bb",
            ScaleKey::B => "B",
        }
    }
}

impl fmt::Display for ScaleKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ScaleKey {
    type Err = anyhow::Error;

    /// Parse a key name. Accepts flats ("Eb") and their sharp spellings ("D#").
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars
            .next()
            .ok_or_else(|| anyhow!("Empty key name"))?
            .to_ascii_uppercase();

        let natural: i8 = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(anyhow!("Invalid key name: {}", s)),
        };

        let offset: i8 = match chars.as_str() {
            "" => 0,
            "b" | "♭" => -1,
            "#" | "♯" => 1,
            _ => return Err(anyhow!("Invalid accidental in key name: {}", s)),
        };

        Self::from_pitch_class((natural + offset).rem_euclid(12) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_classes_are_chromatic() {
        for (i, key) in ScaleKey::ALL.iter().enumerate() {
            assert_eq!(key.pitch_class() as usize, i);
        }
    }

    #[test]
    fn test_tonic_reference_octave() {
        assert_eq!(ScaleKey::C.tonic(), 60);
        assert_eq!(ScaleKey::A.tonic(), 69);
        assert_eq!(ScaleKey::B.tonic(), 71);
    }

    #[test]
    fn test_parse_flats_and_sharps() {
        assert_eq!("Eb".parse::<ScaleKey>().unwrap(), ScaleKey::Eb);
        assert_eq!("D#".parse::<ScaleKey>().unwrap(), ScaleKey::Eb);
        assert_eq!("f".parse::<ScaleKey>().unwrap(), ScaleKey::F);
        assert_eq!("Cb".parse::<ScaleKey>().unwrap(), ScaleKey::B);
        assert!("H".parse::<ScaleKey>().is_err());
        assert!("Cx".parse::<ScaleKey>().is_err());
        assert!("".parse::<ScaleKey>().is_err());
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for key in ScaleKey::ALL {
            assert_eq!(key.to_string().parse::<ScaleKey>().unwrap(), key);
        }
    }
}
