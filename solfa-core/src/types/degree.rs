use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

/// 1-based position within a diatonic scale. Degrees above 7 continue
/// into the next octave (8 is the tonic an octave up).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct ScaleDegree(pub(crate) u8);

impl ScaleDegree {
    pub const TONIC: ScaleDegree = ScaleDegree(1);

    /// Create a degree, rejecting 0
    pub fn new(degree: u8) -> Result<Self> {
        if degree == 0 {
            return Err(anyhow!("Scale degree must be at least 1"));
        }
        Ok(ScaleDegree(degree))
    }

    /// The seven degrees of one octave
    pub fn diatonic() -> impl Iterator<Item = ScaleDegree> {
        (1..=7).map(ScaleDegree)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based index counted from the tonic of the reference octave
    pub fn zero_based(self) -> usize {
        self.0 as usize - 1
    }

    /// The degree `steps` scale steps above this one
    pub fn above(self, steps: u8) -> ScaleDegree {
        ScaleDegree(self.0.saturating_add(steps))
    }

    /// Solfège syllable of the degree within its octave
    pub fn solfege(self) -> &'static str {
        match self.zero_based() % 7 {
            0 => "do",
            1 => "re",
            2 => "mi",
            3 => "fa",
            4 => "so",
            5 => "la",
            _ => "ti",
        }
    }

    /// Label shown when a position is answered, e.g. "3 (mi)"
    pub fn label(self) -> String {
        format!("{} ({})", self.0, self.solfege())
    }
}

impl fmt::Display for ScaleDegree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for ScaleDegree {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        ScaleDegree::new(value)
    }
}

impl From<ScaleDegree> for u8 {
    fn from(degree: ScaleDegree) -> u8 {
        degree.0
    }
}

impl FromStr for ScaleDegree {
    type Err = anyhow::Error;

    /// Parse a number ("5") or a solfège syllable ("so", "sol")
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if let Ok(n) = s.parse::<u8>() {
            return ScaleDegree::new(n);
        }
        let degree = match s.as_str() {
            "do" => 1,
            "re" => 2,
            "mi" => 3,
            "fa" => 4,
            "so" | "sol" => 5,
            "la" => 6,
            "ti" | "si" => 7,
            _ => return Err(anyhow!("Not a scale degree: {}", s)),
        };
        Ok(ScaleDegree(degree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rejected() {
        assert!(ScaleDegree::new(0).is_err());
        assert_eq!(ScaleDegree::new(1).unwrap(), ScaleDegree::TONIC);
    }

    #[test]
    fn test_solfege_wraps_octaves() {
        assert_eq!(ScaleDegree::new(5).unwrap().solfege(), "so");
        assert_eq!(ScaleDegree::new(8).unwrap().solfege(), "do");
        assert_eq!(ScaleDegree::new(3).unwrap().label(), "3 (mi)");
    }

    #[test]
    fn test_parse_numbers_and_syllables() {
        assert_eq!("4".parse::<ScaleDegree>().unwrap().get(), 4);
        assert_eq!("Sol".parse::<ScaleDegree>().unwrap().get(), 5);
        assert!("0".parse::<ScaleDegree>().is_err());
        assert!("xyz".parse::<ScaleDegree>().is_err());
    }
}
