//! Monophonic oscillator + envelope voice.

use std::any::Any;

use crate::envelope::Envelope;
use crate::node::{AudioNode, Instrument};
use crate::oscillator::{Oscillator, Waveform};

/// The stock instrument: one oscillator shaped by one ADSR envelope.
/// Velocity maps linearly onto output gain.
pub struct Synth {
    oscillator: Oscillator,
    envelope: Envelope,
    amp: f32,
    active: bool,
}

impl Synth {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            oscillator: Oscillator::new(sample_rate),
            envelope: Envelope::new(sample_rate),
            amp: 0.0,
            active: true,
        }
    }

    pub fn with_waveform(sample_rate: u32, waveform: Waveform) -> Self {
        let mut synth = Self::new(sample_rate);
        synth.oscillator.set_waveform(waveform);
        synth
    }

    pub fn oscillator(&self) -> &Oscillator {
        &self.oscillator
    }

    pub fn oscillator_mut(&mut self) -> &mut Oscillator {
        &mut self.oscillator
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }
}

impl AudioNode for Synth {
    fn output(&mut self) -> f32 {
        if !self.active {
            return 0.0;
        }
        self.oscillator.output() * self.envelope.output() * self.amp
    }

    fn is_active(&self) -> bool {
        if !self.active {
            return false;
        }
        // A released voice stays live through its envelope tail, then drops
        // out once the envelope goes idle. With the envelope disabled the
        // voice sounds whenever enabled.
        if self.envelope.is_active() {
            !self.envelope.is_idle()
        } else {
            true
        }
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}

impl Instrument for Synth {
    fn play(&mut self, note: f32, velocity: f32) {
        self.oscillator.set_note(note);
        self.amp = (velocity / 127.0).clamp(0.0, 1.0);
        self.envelope.start();
    }

    fn stop(&mut self, _note: f32) {
        self.envelope.stop();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
