//! Voice rendering for the built-in synth
//!
//! A [`VoiceTable`] holds every voice the scheduler has handed over, each
//! with an absolute start and release frame. The audio callback asks the
//! table for one mixed sample per frame; voices start and release themselves
//! when the frame counter reaches them.

use super::adsr::{AdsrEnvelope, AdsrParams};
use anyhow::{anyhow, Result};
use solfa_core::Pitch;
use std::f32::consts::PI;

/// Overall output level before soft clipping
const MASTER_GAIN: f32 = 0.3;

/// Frequency of a MIDI-numbered pitch, A4 = 440 Hz
pub fn pitch_to_frequency(pitch: Pitch) -> f32 {
    440.0 * 2f32.powf((pitch as f32 - 69.0) / 12.0)
}

/// One scheduled note
pub struct Voice {
    pub id: u64,
    frequency: f32,
    phase: f32,
    gain: f32,
    envelope: AdsrEnvelope,
    start_frame: u64,
    release_frame: u64,
    started: bool,
    released: bool,
}

impl Voice {
    pub fn new(
        id: u64,
        pitch: Pitch,
        velocity: u8,
        start_frame: u64,
        hold_frames: u64,
        sample_rate: f32,
    ) -> Self {
        Self {
            id,
            frequency: pitch_to_frequency(pitch),
            phase: 0.0,
            gain: velocity.min(127) as f32 / 127.0,
            envelope: AdsrEnvelope::new(AdsrParams::piano(), sample_rate),
            start_frame,
            release_frame: start_frame + hold_frames.max(1),
            started: false,
            released: false,
        }
    }

    /// Sample for absolute frame `frame`
    fn render(&mut self, frame: u64, sample_rate: f32) -> f32 {
        if frame < self.start_frame {
            return 0.0;
        }
        if !self.started {
            self.started = true;
            self.envelope.trigger();
        }
        if !self.released && frame >= self.release_frame {
            self.released = true;
            self.envelope.release();
        }

        // fundamental plus two softer partials
        let p = 2.0 * PI * self.phase;
        let tone = (p.sin() + 0.4 * (2.0 * p).sin() + 0.15 * (3.0 * p).sin()) / 1.55;

        self.phase += self.frequency / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        tone * self.envelope.next_sample() * self.gain
    }

    fn is_finished(&self) -> bool {
        self.started && self.envelope.is_finished()
    }

    /// Release now, or drop the voice entirely if it has not started yet
    fn stop(&mut self, frame: u64) -> bool {
        if frame < self.start_frame && !self.started {
            return false;
        }
        self.release_frame = self.release_frame.min(frame);
        true
    }
}

/// Voices waiting, sounding, or releasing
#[derive(Default)]
pub struct VoiceTable {
    voices: Vec<Voice>,
}

impl VoiceTable {
    pub fn add(&mut self, voice: Voice) {
        self.voices.push(voice);
    }

    /// Stop voice `id` as of `frame`. Unknown or finished ids are ignored.
    pub fn stop(&mut self, id: u64, frame: u64) {
        if let Some(index) = self.voices.iter().position(|v| v.id == id) {
            if !self.voices[index].stop(frame) {
                self.voices.swap_remove(index);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Mixed, soft-clipped sample for `frame`
    pub fn render(&mut self, frame: u64, sample_rate: f32) -> f32 {
        let mixed: f32 = self
            .voices
            .iter_mut()
            .map(|v| v.render(frame, sample_rate))
            .sum();
        (mixed * MASTER_GAIN).tanh()
    }

    /// Drop voices whose release has faded out
    pub fn prune(&mut self) {
        self.voices.retain(|v| !v.is_finished());
    }
}

/// Small feedback-comb reverb that adds a sense of room
pub struct Reverb {
    combs: Vec<Comb>,
    mix: f32,
}

struct Comb {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
}

impl Comb {
    fn process(&mut self, input: f32) -> f32 {
        let out = self.buffer[self.index];
        self.buffer[self.index] = input + out * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        out
    }
}

/// Comb delays in milliseconds, mutually prime-ish to avoid ringing
const COMB_DELAYS_MS: [f32; 4] = [29.7, 37.1, 41.1, 43.7];

impl Reverb {
    pub fn new(sample_rate: u32) -> Result<Self> {
        if !(8_000..=384_000).contains(&sample_rate) {
            return Err(anyhow!("unsupported sample rate {} Hz", sample_rate));
        }
        let combs = COMB_DELAYS_MS
            .iter()
            .map(|ms| Comb {
                buffer: vec![0.0; (ms * sample_rate as f32 / 1000.0) as usize],
                index: 0,
                feedback: 0.72,
            })
            .collect();
        Ok(Self { combs, mix: 0.18 })
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let wet: f32 = self.combs.iter_mut().map(|c| c.process(input)).sum::<f32>()
            / self.combs.len() as f32;
        input * (1.0 - self.mix) + wet * self.mix
    }
}
