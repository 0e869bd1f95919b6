//! Rhythm values as exact fractions of a whole note
//!
//! Durations stay rational until the moment they are turned into seconds,
//! so chained notes land exactly on the beat grid.

use anyhow::{anyhow, Result};
use num_rational::Ratio;
use std::fmt;
use std::str::FromStr;

/// Duration as a fraction of a whole note
pub type Fraction = Ratio<u32>;

/// Note length choices offered by the drill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RhythmValue {
    Semibreve,
    Minim,
    Crotchet,
    Quaver,
    Semiquaver,
}

impl RhythmValue {
    pub const ALL: [RhythmValue; 5] = [
        RhythmValue::Semibreve,
        RhythmValue::Minim,
        RhythmValue::Crotchet,
        RhythmValue::Quaver,
        RhythmValue::Semiquaver,
    ];

    /// Fraction of a whole note
    pub fn fraction(self) -> Fraction {
        match self {
            RhythmValue::Semibreve => Ratio::from_integer(1),
            RhythmValue::Minim => Ratio::new(1, 2),
            RhythmValue::Crotchet => Ratio::new(1, 4),
            RhythmValue::Quaver => Ratio::new(1, 8),
            RhythmValue::Semiquaver => Ratio::new(1, 16),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RhythmValue::Semibreve => "semibreve",
            RhythmValue::Minim => "minim",
            RhythmValue::Crotchet => "crotchet",
            RhythmValue::Quaver => "quaver",
            RhythmValue::Semiquaver => "semiquaver",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RhythmValue::Semibreve => "𝅝",
            RhythmValue::Minim => "𝅗𝅥",
            RhythmValue::Crotchet => "♩",
            RhythmValue::Quaver => "♪",
            RhythmValue::Semiquaver => "♬",
        }
    }
}

impl fmt::Display for RhythmValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({}) {}", self.name(), self.symbol(), self.fraction())
    }
}

impl FromStr for RhythmValue {
    type Err = anyhow::Error;

    /// Parse British or American names ("quaver", "eighth", "1/8")
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "semibreve" | "whole" | "1" => Ok(RhythmValue::Semibreve),
            "minim" | "half" | "1/2" => Ok(RhythmValue::Minim),
            "crotchet" | "quarter" | "1/4" => Ok(RhythmValue::Crotchet),
            "quaver" | "eighth" | "1/8" => Ok(RhythmValue::Quaver),
            "semiquaver" | "sixteenth" | "1/16" => Ok(RhythmValue::Semiquaver),
            other => Err(anyhow!("Unknown rhythm value: {}", other)),
        }
    }
}

/// Length of a whole note in seconds when `bpm` counts quarter notes
#[inline]
pub fn seconds_per_whole_note(bpm: f64) -> f64 {
    4.0 * 60.0 / bpm
}

/// Convert a whole-note fraction to seconds at the given tempo
#[inline]
pub fn fraction_to_seconds(fraction: Fraction, bpm: f64) -> f64 {
    let ratio = *fraction.numer() as f64 / *fraction.denom() as f64;
    ratio * seconds_per_whole_note(bpm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fractions_halve() {
        for pair in RhythmValue::ALL.windows(2) {
            assert_eq!(pair[0].fraction(), pair[1].fraction() * 2);
        }
    }

    #[test]
    fn test_crotchet_is_one_beat() {
        let quarter = RhythmValue::Crotchet.fraction();
        assert!((fraction_to_seconds(quarter, 60.0) - 1.0).abs() < 1e-12);
        assert!((fraction_to_seconds(quarter, 120.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_whole_note_at_90_bpm() {
        assert!((seconds_per_whole_note(90.0) - 8.0 / 3.0).abs() < 1e-12);
        let whole = RhythmValue::Semibreve.fraction();
        assert!((fraction_to_seconds(whole, 90.0) - 8.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("eighth".parse::<RhythmValue>().unwrap(), RhythmValue::Quaver);
        assert_eq!("1/16".parse::<RhythmValue>().unwrap(), RhythmValue::Semiquaver);
        assert_eq!("Minim".parse::<RhythmValue>().unwrap(), RhythmValue::Minim);
        assert!("dotted".parse::<RhythmValue>().is_err());
    }
}
