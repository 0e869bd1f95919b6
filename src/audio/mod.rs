pub mod adsr;
pub mod context;
pub mod midi;
pub mod synth;

pub use context::AudioContext;
pub use midi::MidiClock;

use solfa_core::{ClockAdapter, Completion, Pitch, VoiceStop};

/// The voice engine a session plays through
pub enum Backend {
    Synth(AudioContext),
    Midi(MidiClock),
}

impl Backend {
    pub fn describe(&self) -> String {
        match self {
            Backend::Synth(ctx) if ctx.sample_rate() > 0 => {
                format!("built-in synth ({} Hz)", ctx.sample_rate())
            }
            Backend::Synth(_) => "built-in synth (not loaded)".to_string(),
            Backend::Midi(midi) => format!(
                "MIDI '{}' channel {}{}",
                midi.port(),
                midi.channel() + 1,
                if midi.is_connected() { "" } else { " (not connected)" }
            ),
        }
    }
}

impl ClockAdapter for Backend {
    fn ensure_ready(&self) -> Completion {
        match self {
            Backend::Synth(ctx) => ctx.ensure_ready(),
            Backend::Midi(midi) => midi.ensure_ready(),
        }
    }

    fn now(&self) -> f64 {
        match self {
            Backend::Synth(ctx) => ctx.now(),
            Backend::Midi(midi) => midi.now(),
        }
    }

    fn resume(&self) -> Completion {
        match self {
            Backend::Synth(ctx) => ctx.resume(),
            Backend::Midi(midi) => midi.resume(),
        }
    }

    fn suspend(&self) -> Completion {
        match self {
            Backend::Synth(ctx) => ctx.suspend(),
            Backend::Midi(midi) => midi.suspend(),
        }
    }

    fn is_suspended(&self) -> bool {
        match self {
            Backend::Synth(ctx) => ctx.is_suspended(),
            Backend::Midi(midi) => midi.is_suspended(),
        }
    }

    fn trigger_voice(
        &self,
        pitch: Pitch,
        at: f64,
        duration: f64,
        velocity: u8,
    ) -> Box<dyn VoiceStop> {
        match self {
            Backend::Synth(ctx) => ctx.trigger_voice(pitch, at, duration, velocity),
            Backend::Midi(midi) => midi.trigger_voice(pitch, at, duration, velocity),
        }
    }
}
