//! Turning musical events into absolute-time voice triggers
//!
//! `schedule` walks a list of events with a cursor that starts at the given
//! offset from the clock's current time. Each event's pitches are triggered
//! at the cursor and held for a slightly trimmed length, so repeated notes
//! stay audibly separate, while the cursor itself advances by the full
//! untrimmed length to keep later events on the grid.
//!
//! The cursor is kept as an exact whole-note fraction and converted to
//! seconds per event. Chaining two schedules through `total_duration`
//! therefore lands the second one exactly where the first one ends.

use crate::clock::{ClockAdapter, VoiceStop};
use crate::generator::Question;
use crate::theory::calibration_cadence;
use crate::types::{fraction_to_seconds, Fraction, Mode, Pitch, RhythmValue, ScaleKey};
use std::sync::atomic::{AtomicBool, Ordering};

/// Tempo at which the calibration cadence is always played
pub const CALIBRATION_BPM: f64 = 90.0;

/// One step of scheduled material: a single note or a chord
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEvent {
    pub pitches: Vec<Pitch>,
    pub fraction: Fraction,
}

impl PlaybackEvent {
    pub fn note(pitch: Pitch, fraction: Fraction) -> Self {
        Self {
            pitches: vec![pitch],
            fraction,
        }
    }

    pub fn chord(pitches: &[Pitch], fraction: Fraction) -> Self {
        Self {
            pitches: pitches.to_vec(),
            fraction,
        }
    }
}

/// How voices are shaped when scheduled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleOptions {
    /// Share of the nominal length a voice is held for
    pub trim: f64,
    /// Shortest hold in seconds, whatever the tempo
    pub min_duration: f64,
    pub velocity: u8,
}

impl ScheduleOptions {
    pub fn melody() -> Self {
        Self {
            trim: 0.98,
            min_duration: 0.08,
            velocity: 90,
        }
    }

    pub fn calibration() -> Self {
        Self {
            trim: 0.95,
            min_duration: 0.05,
            velocity: 100,
        }
    }

    /// Seconds a voice of nominal length `duration` is held for
    pub fn hold(&self, duration: f64) -> f64 {
        (duration * self.trim).max(self.min_duration)
    }
}

/// Stops every voice of one `schedule` call.
///
/// Cancelling twice, or after everything has finished, is harmless.
/// Dropping the handle leaves the voices playing.
pub struct CancelHandle {
    voices: Vec<Box<dyn VoiceStop>>,
    cancelled: AtomicBool,
}

impl CancelHandle {
    fn new(voices: Vec<Box<dyn VoiceStop>>) -> Self {
        Self {
            voices,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        for voice in &self.voices {
            voice.stop();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("voices", &self.voices.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Result of one `schedule` call
#[derive(Debug)]
pub struct ScheduledPlayback {
    pub cancel: CancelHandle,
    /// Final cursor in seconds, measured from the clock time of the call.
    /// Includes the start offset.
    pub total_duration: f64,
    /// Clock time at which the last event finishes
    pub ends_at: f64,
}

/// Schedule `events` on `clock` starting `start_offset` seconds from now.
///
/// Returns immediately; nothing waits for the audio.
pub fn schedule<C: ClockAdapter + ?Sized>(
    clock: &C,
    events: &[PlaybackEvent],
    bpm: f64,
    start_offset: f64,
    options: ScheduleOptions,
) -> ScheduledPlayback {
    let origin = clock.now();
    let mut elapsed = Fraction::from_integer(0);
    let mut voices = Vec::with_capacity(events.iter().map(|e| e.pitches.len()).sum());

    for event in events {
        let at = origin + start_offset + fraction_to_seconds(elapsed, bpm);
        let hold = options.hold(fraction_to_seconds(event.fraction, bpm));
        for &pitch in &event.pitches {
            voices.push(clock.trigger_voice(pitch, at, hold, options.velocity));
        }
        elapsed += event.fraction;
    }

    let total_duration = start_offset + fraction_to_seconds(elapsed, bpm);
    log::trace!(
        "scheduled {} events ({} voices) at {} BPM, offset {:.3}s, total {:.3}s",
        events.len(),
        voices.len(),
        bpm,
        start_offset,
        total_duration
    );

    ScheduledPlayback {
        cancel: CancelHandle::new(voices),
        total_duration,
        ends_at: origin + total_duration,
    }
}

/// A question's notes as single-pitch events
pub fn melody_events(question: &Question) -> Vec<PlaybackEvent> {
    question
        .notes()
        .iter()
        .map(|n| PlaybackEvent::note(n.pitch, n.fraction))
        .collect()
}

/// The I-IV-V-I cadence as four crotchet chords
pub fn calibration_events(key: ScaleKey, mode: Mode) -> Vec<PlaybackEvent> {
    calibration_cadence(key, mode)
        .iter()
        .map(|chord| PlaybackEvent::chord(chord, RhythmValue::Crotchet.fraction()))
        .collect()
}
