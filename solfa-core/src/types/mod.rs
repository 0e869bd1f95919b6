// solfa-core/src/types/mod.rs

pub mod degree;
pub mod key;
pub mod mode;
pub mod rhythm;
pub mod settings;

pub use degree::ScaleDegree;
pub use key::{Pitch, ScaleKey, REFERENCE_TONIC};
pub use mode::Mode;
pub use rhythm::{fraction_to_seconds, seconds_per_whole_note, Fraction, RhythmValue};
pub use settings::{DrillSettings, SetParameters, SettingsError, TempoChoice};
