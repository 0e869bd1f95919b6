//! ADSR amplitude envelope for synth voices
//!
//! Exponential segments, sample-accurate, with times given in seconds so the
//! shape does not depend on the output device's sample rate.

/// Envelope stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Envelope shape
///
/// - `attack`: seconds from silence to peak
/// - `decay`: seconds from peak towards the sustain level
/// - `sustain`: level held until release (0.0-1.0, not a time)
/// - `release`: seconds from release to silence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrParams {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl AdsrParams {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.max(0.001), // anything shorter clicks
            decay: decay.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(0.001),
        }
    }

    /// Struck-string shape: instant attack, long fall to a quiet sustain
    pub fn piano() -> Self {
        Self::new(0.004, 0.9, 0.3, 0.25)
    }
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self::piano()
    }
}

/// Per-sample envelope generator
#[derive(Debug, Clone)]
pub struct AdsrEnvelope {
    params: AdsrParams,
    stage: EnvelopeStage,
    level: f32,
    attack_coeff: f32,
    decay_coeff: f32,
    release_coeff: f32,
}

/// Coefficient that covers 99.9% of a segment in `seconds`
fn coefficient(seconds: f32, sample_rate: f32) -> f32 {
    // ln(1000)
    const TIME_CONSTANT: f32 = 6.9;
    if seconds > 0.0 {
        1.0 - (-TIME_CONSTANT / (seconds * sample_rate)).exp()
    } else {
        1.0
    }
}

impl AdsrEnvelope {
    pub fn new(params: AdsrParams, sample_rate: f32) -> Self {
        Self {
            params,
            stage: EnvelopeStage::Idle,
            level: 0.0,
            attack_coeff: coefficient(params.attack, sample_rate),
            decay_coeff: coefficient(params.decay, sample_rate),
            release_coeff: coefficient(params.release, sample_rate),
        }
    }

    /// Start the attack
    pub fn trigger(&mut self) {
        self.stage = EnvelopeStage::Attack;
    }

    /// Start the release from wherever the envelope is
    pub fn release(&mut self) {
        if self.stage != EnvelopeStage::Idle {
            self.stage = EnvelopeStage::Release;
        }
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_finished(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    /// Advance one sample and return the amplitude (0.0-1.0)
    pub fn next_sample(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => self.level = 0.0,
            EnvelopeStage::Attack => {
                self.level += (1.0 - self.level) * self.attack_coeff;
                if self.level >= 0.999 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                let target = self.params.sustain;
                self.level += (target - self.level) * self.decay_coeff;
                if (self.level - target).abs() < 0.001 {
                    self.level = target;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => self.level = self.params.sustain,
            EnvelopeStage::Release => {
                self.level -= self.level * self.release_coeff;
                if self.level < 0.0001 {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }
        self.level
    }
}
