use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

/// Scale quality of a drill set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Mode {
    /// Ionian
    #[default]
    Major,
    /// Natural minor (aeolian)
    Minor,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Major, Mode::Minor];

    /// Semitone offsets from the tonic for degrees 1-7.
    /// Strictly increasing, first element 0.
    pub fn intervals(self) -> [u8; 7] {
        match self {
            Mode::Major => [0, 2, 4, 5, 7, 9, 11],
            Mode::Minor => [0, 2, 3, 5, 7, 8, 10],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Major => "major",
            Mode::Minor => "minor",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Mode::Major => write!(f, "Major"),
            Mode::Minor => write!(f, "Minor"),
        }
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "major" | "maj" | "ionian" => Ok(Mode::Major),
            "minor" | "min" | "aeolian" => Ok(Mode::Minor),
            other => Err(anyhow!("Unknown mode: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervals_strictly_increasing_from_zero() {
        for mode in Mode::ALL {
            let intervals = mode.intervals();
            assert_eq!(intervals[0], 0);
            assert!(intervals.windows(2).all(|w| w[0] < w[1]), "{:?}", mode);
            assert!(intervals[6] < 12);
        }
    }

    #[test]
    fn test_minor_third_and_sixth() {
        assert_eq!(Mode::Minor.intervals()[2], 3);
        assert_eq!(Mode::Minor.intervals()[5], 8);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("Major".parse::<Mode>().unwrap(), Mode::Major);
        assert_eq!("aeolian".parse::<Mode>().unwrap(), Mode::Minor);
        assert!("dorian".parse::<Mode>().is_err());
    }
}
