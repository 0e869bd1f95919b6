//! The audio clock seen from the core
//!
//! Everything that makes sound sits behind [`ClockAdapter`]: a monotonic
//! clock in seconds, a process-wide pause toggle, and "start this pitch at
//! time T for D seconds". The core never renders audio itself.
//!
//! [`ManualClock`] is a deterministic substrate whose time only moves when
//! told to. It records every trigger and stop, which makes it the backend of
//! choice for tests and for headless runs.

use crate::completion::Completion;
use crate::types::Pitch;
use std::sync::{Arc, Mutex, MutexGuard};

/// Stops one triggered voice. Calling `stop` more than once, or after the
/// voice already finished, does nothing.
pub trait VoiceStop: Send {
    fn stop(&self);
}

/// A voice that was never started
pub struct NoopStop;

impl VoiceStop for NoopStop {
    fn stop(&self) {}
}

/// Real-time scheduling substrate
pub trait ClockAdapter {
    /// Make sure the voice engine is loaded. Nothing should be scheduled
    /// before this has succeeded.
    fn ensure_ready(&self) -> Completion {
        Completion::ready()
    }

    /// Current clock time in seconds. Frozen while suspended.
    fn now(&self) -> f64;

    /// Resume the clock. Pending triggers continue from where they froze.
    fn resume(&self) -> Completion;

    /// Suspend the clock and everything scheduled against it
    fn suspend(&self) -> Completion;

    fn is_suspended(&self) -> bool;

    /// Start `pitch` at absolute clock time `at` and hold it for `duration`
    /// seconds. `velocity` follows MIDI (1-127).
    fn trigger_voice(&self, pitch: Pitch, at: f64, duration: f64, velocity: u8)
        -> Box<dyn VoiceStop>;
}

impl<C: ClockAdapter + ?Sized> ClockAdapter for &C {
    fn ensure_ready(&self) -> Completion {
        (**self).ensure_ready()
    }

    fn now(&self) -> f64 {
        (**self).now()
    }

    fn resume(&self) -> Completion {
        (**self).resume()
    }

    fn suspend(&self) -> Completion {
        (**self).suspend()
    }

    fn is_suspended(&self) -> bool {
        (**self).is_suspended()
    }

    fn trigger_voice(
        &self,
        pitch: Pitch,
        at: f64,
        duration: f64,
        velocity: u8,
    ) -> Box<dyn VoiceStop> {
        (**self).trigger_voice(pitch, at, duration, velocity)
    }
}

/// A voice as recorded by [`ManualClock`]
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceRecord {
    pub pitch: Pitch,
    pub at: f64,
    pub duration: f64,
    pub velocity: u8,
    /// Set once the voice's stop handle has been used
    pub stopped: bool,
}

impl VoiceRecord {
    pub fn ends_at(&self) -> f64 {
        self.at + self.duration
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: f64,
    suspended: bool,
    voices: Vec<VoiceRecord>,
    /// Bumped by `clear_voices` so older stop handles go stale
    generation: u64,
}

/// Deterministic clock that advances only through [`ManualClock::advance`].
/// Clones share the same timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move time forward. Time stands still while suspended.
    pub fn advance(&self, seconds: f64) {
        let mut state = self.lock();
        if !state.suspended {
            state.now += seconds.max(0.0);
        }
    }

    /// Every voice triggered so far, in trigger order
    pub fn voices(&self) -> Vec<VoiceRecord> {
        self.lock().voices.clone()
    }

    /// Voices not stopped through their handle
    pub fn live_voices(&self) -> Vec<VoiceRecord> {
        self.lock()
            .voices
            .iter()
            .filter(|v| !v.stopped)
            .cloned()
            .collect()
    }

    /// Voices that are not stopped and have not yet finished sounding
    pub fn pending_voices(&self) -> Vec<VoiceRecord> {
        let state = self.lock();
        state
            .voices
            .iter()
            .filter(|v| !v.stopped && v.ends_at() > state.now)
            .cloned()
            .collect()
    }

    /// Forget recorded voices; outstanding stop handles become no-ops
    pub fn clear_voices(&self) {
        let mut state = self.lock();
        state.voices.clear();
        state.generation += 1;
    }
}

struct ManualStop {
    state: Arc<Mutex<ManualState>>,
    index: usize,
    generation: u64,
}

impl VoiceStop for ManualStop {
    fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.generation != self.generation {
            return;
        }
        if let Some(voice) = state.voices.get_mut(self.index) {
            voice.stopped = true;
        }
    }
}

impl ClockAdapter for ManualClock {
    fn now(&self) -> f64 {
        self.lock().now
    }

    fn resume(&self) -> Completion {
        self.lock().suspended = false;
        Completion::ready()
    }

    fn suspend(&self) -> Completion {
        self.lock().suspended = true;
        Completion::ready()
    }

    fn is_suspended(&self) -> bool {
        self.lock().suspended
    }

    fn trigger_voice(
        &self,
        pitch: Pitch,
        at: f64,
        duration: f64,
        velocity: u8,
    ) -> Box<dyn VoiceStop> {
        let mut state = self.lock();
        let index = state.voices.len();
        let generation = state.generation;
        state.voices.push(VoiceRecord {
            pitch,
            at,
            duration,
            velocity,
            stopped: false,
        });
        Box::new(ManualStop {
            state: self.state.clone(),
            index,
            generation,
        })
    }
}
