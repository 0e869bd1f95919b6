//! # Solfa Core
//!
//! Audio-free core of the Solfa ear-training drill: scale-degree pitch
//! mapping, constrained random melody generation, playback scheduling
//! against an abstract clock, and the drill session state machine.
//!
//! ## Features
//!
//! - **serde**: Enable (de)serialisation of settings and generated questions
//!
//! ## Example
//!
//! ```ignore
//! use solfa_core::{ManualClock, Session, SessionInput, DrillSettings};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut session = Session::new(ManualClock::new(), DrillSettings::default(), StdRng::seed_from_u64(1))?;
//! for event in session.handle(SessionInput::StartSet)? {
//!     println!("{:?}", event);
//! }
//! ```

pub mod clock;
pub mod completion;
pub mod generator;
pub mod scheduler;
pub mod session;
pub mod theory;
pub mod types;

// Re-export commonly used types
pub use clock::{ClockAdapter, ManualClock, NoopStop, VoiceRecord, VoiceStop};
pub use completion::{Completer, Completion, CompletionError, SingleFlight};
pub use generator::{generate, Question, QuestionNote};
pub use scheduler::{
    calibration_events, melody_events, schedule, CancelHandle, PlaybackEvent, ScheduleOptions,
    ScheduledPlayback, CALIBRATION_BPM,
};
pub use session::{Session, SessionError, SessionEvent, SessionInput, SessionState};
pub use theory::{calibration_cadence, pitch_of};
pub use types::{
    DrillSettings, Mode, Pitch, RhythmValue, ScaleDegree, ScaleKey, SetParameters, SettingsError,
    TempoChoice,
};
