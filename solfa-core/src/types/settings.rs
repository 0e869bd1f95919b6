//! Drill configuration
//!
//! `DrillSettings` is the snapshot a settings provider hands to a session.
//! `SetParameters` are the per-set choices (key, mode, tempo) drawn from it.

use super::{Mode, RhythmValue, ScaleDegree, ScaleKey};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use thiserror::Error;

/// Lowest and highest custom tempo accepted
pub const MIN_CUSTOM_BPM: u16 = 30;
pub const MAX_CUSTOM_BPM: u16 = 240;

/// Tempo selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TempoChoice {
    Slow,
    #[default]
    Medium,
    Fast,
    Custom(u16),
}

impl TempoChoice {
    /// Quarter notes per minute
    pub fn bpm(self) -> u16 {
        match self {
            TempoChoice::Slow => 60,
            TempoChoice::Medium => 90,
            TempoChoice::Fast => 120,
            TempoChoice::Custom(bpm) => bpm,
        }
    }

    /// Parse "slow", "medium", "fast" or a plain BPM number
    pub fn parse(s: &str) -> Option<TempoChoice> {
        match s.trim().to_lowercase().as_str() {
            "slow" => Some(TempoChoice::Slow),
            "medium" => Some(TempoChoice::Medium),
            "fast" => Some(TempoChoice::Fast),
            other => other.parse::<u16>().ok().map(TempoChoice::Custom),
        }
    }
}

/// A rule broken by a settings snapshot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("Select at least one key")]
    NoKeys,
    #[error("Select at least one scale degree")]
    NoDegrees,
    #[error("Select at least one rhythm value")]
    NoRhythms,
    #[error("Select at least one mode")]
    NoModes,
    #[error("Custom BPM must be between 30 and 240, got {0}")]
    CustomBpmOutOfRange(u16),
    #[error("Number of notes must be at least 1")]
    NoNotes,
    #[error("Largest jump must be at least 1 semitone")]
    NoJump,
    #[error("Questions per set must be at least 1")]
    NoQuestions,
}

/// Immutable-per-session drill configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DrillSettings {
    pub keys: Vec<ScaleKey>,
    pub degrees: Vec<ScaleDegree>,
    pub rhythms: Vec<RhythmValue>,
    pub modes: Vec<Mode>,
    pub tempo: TempoChoice,
    pub num_notes: usize,
    /// Largest allowed semitone distance between consecutive notes
    pub max_jump: u8,
    /// Move on to the next question automatically once one is answered
    pub auto_proceed: bool,
    pub questions_per_set: usize,
}

impl Default for DrillSettings {
    fn default() -> Self {
        Self {
            keys: vec![
                ScaleKey::C,
                ScaleKey::D,
                ScaleKey::E,
                ScaleKey::F,
                ScaleKey::G,
                ScaleKey::A,
                ScaleKey::B,
            ],
            degrees: ScaleDegree::diatonic().collect(),
            rhythms: vec![RhythmValue::Crotchet, RhythmValue::Quaver],
            modes: vec![Mode::Major],
            tempo: TempoChoice::Medium,
            num_notes: 5,
            max_jump: 7,
            auto_proceed: true,
            questions_per_set: 10,
        }
    }
}

impl DrillSettings {
    /// Check every rule and report all that are broken
    pub fn validate(&self) -> Result<(), Vec<SettingsError>> {
        let mut errors = Vec::new();
        if self.keys.is_empty() {
            errors.push(SettingsError::NoKeys);
        }
        if self.degrees.is_empty() {
            errors.push(SettingsError::NoDegrees);
        }
        if self.rhythms.is_empty() {
            errors.push(SettingsError::NoRhythms);
        }
        if self.modes.is_empty() {
            errors.push(SettingsError::NoModes);
        }
        if let TempoChoice::Custom(bpm) = self.tempo {
            if !(MIN_CUSTOM_BPM..=MAX_CUSTOM_BPM).contains(&bpm) {
                errors.push(SettingsError::CustomBpmOutOfRange(bpm));
            }
        }
        if self.num_notes < 1 {
            errors.push(SettingsError::NoNotes);
        }
        if self.max_jump < 1 {
            errors.push(SettingsError::NoJump);
        }
        if self.questions_per_set < 1 {
            errors.push(SettingsError::NoQuestions);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Effective tempo in BPM
    pub fn bpm(&self) -> u16 {
        self.tempo.bpm()
    }
}

/// Key, mode and tempo fixed for the lifetime of one drill set
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SetParameters {
    pub key: ScaleKey,
    pub mode: Mode,
    pub tempo_bpm: u16,
}

impl SetParameters {
    pub fn new(key: ScaleKey, mode: Mode, tempo_bpm: u16) -> Self {
        Self {
            key,
            mode,
            tempo_bpm,
        }
    }

    /// Draw a key and mode uniformly from the settings
    ///
    /// # Panics
    /// If the settings have no keys or no modes.
    pub fn choose<R: Rng + ?Sized>(settings: &DrillSettings, rng: &mut R) -> Self {
        let key = *settings
            .keys
            .choose(rng)
            .expect("settings must allow at least one key");
        let mode = *settings
            .modes
            .choose(rng)
            .expect("settings must allow at least one mode");
        Self::new(key, mode, settings.bpm())
    }

    pub fn bpm(&self) -> f64 {
        self.tempo_bpm as f64
    }
}

impl fmt::Display for SetParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} at {} BPM", self.key, self.mode, self.tempo_bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_defaults_are_valid() {
        let settings = DrillSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.bpm(), 90);
        assert_eq!(settings.degrees.len(), 7);
    }

    #[test]
    fn test_validate_reports_every_violation() {
        let settings = DrillSettings {
            keys: vec![],
            rhythms: vec![],
            tempo: TempoChoice::Custom(300),
            num_notes: 0,
            ..DrillSettings::default()
        };
        let errors = settings.validate().unwrap_err();
        assert_eq!(
            errors,
            vec![
                SettingsError::NoKeys,
                SettingsError::NoRhythms,
                SettingsError::CustomBpmOutOfRange(300),
                SettingsError::NoNotes,
            ]
        );
        assert_eq!(
            errors[2].to_string(),
            "Custom BPM must be between 30 and 240, got 300"
        );
    }

    #[test]
    fn test_tempo_presets() {
        assert_eq!(TempoChoice::Slow.bpm(), 60);
        assert_eq!(TempoChoice::Fast.bpm(), 120);
        assert_eq!(TempoChoice::parse("104"), Some(TempoChoice::Custom(104)));
        assert_eq!(TempoChoice::parse("Medium"), Some(TempoChoice::Medium));
        assert_eq!(TempoChoice::parse("allegro"), None);
    }

    #[test]
    fn test_choose_stays_within_settings() {
        let settings = DrillSettings {
            keys: vec![ScaleKey::Eb, ScaleKey::A],
            modes: vec![Mode::Minor],
            tempo: TempoChoice::Fast,
            ..DrillSettings::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let params = SetParameters::choose(&settings, &mut rng);
            assert!(settings.keys.contains(&params.key));
            assert_eq!(params.mode, Mode::Minor);
            assert_eq!(params.tempo_bpm, 120);
        }
    }
}
