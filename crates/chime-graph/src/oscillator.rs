//! Band-limited oscillator with a polyBLEP residual on the discontinuous
//! waveforms.

use std::f32::consts::TAU;

use crate::node::AudioNode;
use crate::params::{ParamId, ParameterHost, ParameterRange, ParameterSet};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Waveform {
    #[default]
    Saw,
    Sine,
    Square,
}

const NOTE_RANGE: ParameterRange = ParameterRange::new(0.0, 127.0, 69.0);
const FREQUENCY_RANGE: ParameterRange = ParameterRange::new(20.0, 20_000.0, 440.0);

/// Phase-accumulator oscillator. Note and frequency are two views of the
/// same pitch: writing either updates the other.
pub struct Oscillator {
    params: ParameterSet,
    sample_rate: u32,
    waveform: Waveform,
    phase: f32,
    phase_step: f32,
    amplitude: f32,
    active: bool,
}

impl Oscillator {
    pub const NOTE: ParamId = ParamId(0);
    pub const FREQUENCY: ParamId = ParamId(1);

    pub fn new(sample_rate: u32) -> Self {
        let mut params = ParameterSet::new();
        params.add("note", NOTE_RANGE);
        params.add("frequency", FREQUENCY_RANGE);
        let mut osc = Self {
            params,
            sample_rate,
            waveform: Waveform::default(),
            phase: 0.0,
            phase_step: 0.0,
            amplitude: 1.0,
            active: true,
        };
        osc.update_phase_step();
        osc
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn note(&self) -> f32 {
        self.parameter(Self::NOTE)
    }

    /// Set the pitch in semitones (69 = A4). Clamped to `0..=127`.
    pub fn set_note(&mut self, note: f32) {
        self.set_parameter(Self::NOTE, note);
    }

    pub fn frequency(&self) -> f32 {
        self.parameter(Self::FREQUENCY)
    }

    /// Set the pitch in Hz. Clamped to the audible 20 Hz–20 kHz band.
    pub fn set_frequency(&mut self, frequency: f32) {
        self.set_parameter(Self::FREQUENCY, frequency);
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.amplitude = amplitude;
    }

    fn update_phase_step(&mut self) {
        self.phase_step = self.parameter(Self::FREQUENCY) / self.sample_rate as f32;
    }
}

impl AudioNode for Oscillator {
    fn output(&mut self) -> f32 {
        let t = self.phase;
        let dt = self.phase_step;
        let sample = match self.waveform {
            Waveform::Sine => (TAU * t).sin(),
            Waveform::Saw => 2.0 * t - 1.0 - poly_blep(t, dt),
            Waveform::Square => {
                let naive = if t < 0.5 { 1.0 } else { -1.0 };
                naive + poly_blep(t, dt) - poly_blep((t + 0.5) % 1.0, dt)
            }
        };
        self.phase += dt;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        sample * self.amplitude
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}

impl ParameterHost for Oscillator {
    fn params(&self) -> &ParameterSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    fn on_parameter_update(&mut self, id: ParamId) {
        // Keep the other pitch view in sync. Stored directly so the sync
        // write cannot re-enter this hook.
        match id {
            Self::NOTE => {
                let freq = frequency_from_note(self.parameter(Self::NOTE));
                self.params.store(Self::FREQUENCY, freq);
            }
            Self::FREQUENCY => {
                let note = note_from_frequency(self.parameter(Self::FREQUENCY));
                self.params.store(Self::NOTE, note);
            }
            _ => {}
        }
        self.update_phase_step();
    }
}

/// 12-TET conversion, A4 = note 69 = 440 Hz.
pub fn frequency_from_note(note: f32) -> f32 {
    440.0 * ((note - 69.0) / 12.0).exp2()
}

pub fn note_from_frequency(frequency: f32) -> f32 {
    69.0 + 12.0 * (frequency / 440.0).log2()
}

/// Polynomial band-limited step residual, subtracted around each waveform
/// discontinuity to suppress aliasing. `t` is the normalized phase, `dt`
/// the per-sample phase step.
fn poly_blep(t: f32, dt: f32) -> f32 {
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44_100;

    #[test]
    fn a4_is_440() {
        assert!((frequency_from_note(69.0) - 440.0).abs() < 1.0e-3);
        assert!((note_from_frequency(440.0) - 69.0).abs() < 1.0e-3);
    }

    #[test]
    fn octave_doubles_frequency() {
        assert!((frequency_from_note(81.0) - 880.0).abs() < 1.0e-2);
        assert!((frequency_from_note(57.0) - 220.0).abs() < 1.0e-2);
    }

    #[test]
    fn conversions_round_trip() {
        for note in [0.0, 21.0, 60.0, 69.0, 100.0, 127.0] {
            let back = note_from_frequency(frequency_from_note(note));
            assert!((back - note).abs() < 1.0e-3, "note {note} came back {back}");
        }
    }

    #[test]
    fn set_note_updates_frequency() {
        let mut osc = Oscillator::new(SR);
        osc.set_note(81.0);
        assert!((osc.frequency() - 880.0).abs() < 0.1);
    }

    #[test]
    fn set_frequency_updates_note() {
        let mut osc = Oscillator::new(SR);
        osc.set_frequency(220.0);
        assert!((osc.note() - 57.0).abs() < 1.0e-2);
    }

    #[test]
    fn frequency_clamps_to_audible_band() {
        let mut osc = Oscillator::new(SR);
        osc.set_frequency(5.0);
        assert_eq!(osc.frequency(), 20.0);
        osc.set_frequency(1.0e6);
        assert_eq!(osc.frequency(), 20_000.0);
    }

    #[test]
    fn defaults_to_a4() {
        let osc = Oscillator::new(SR);
        assert_eq!(osc.note(), 69.0);
        assert_eq!(osc.frequency(), 440.0);
    }

    #[test]
    fn sine_starts_at_zero_and_stays_bounded() {
        let mut osc = Oscillator::new(SR);
        osc.set_waveform(Waveform::Sine);
        let first = osc.output();
        assert!(first.abs() < 1.0e-6);
        for _ in 0..SR {
            let s = osc.output();
            assert!(s.abs() <= 1.0 + 1.0e-5);
        }
    }

    #[test]
    fn sine_period_matches_frequency() {
        let mut osc = Oscillator::new(SR);
        osc.set_waveform(Waveform::Sine);
        osc.set_frequency(441.0);
        // One second of output contains ~441 rising zero crossings.
        let mut crossings = 0;
        let mut prev = osc.output();
        for _ in 0..SR {
            let s = osc.output();
            if prev < 0.0 && s >= 0.0 {
                crossings += 1;
            }
            prev = s;
        }
        assert!((440..=442).contains(&crossings), "saw {crossings} crossings");
    }

    #[test]
    fn saw_sweeps_full_range() {
        let mut osc = Oscillator::new(SR);
        osc.set_frequency(100.0);
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for _ in 0..SR {
            let s = osc.output();
            min = min.min(s);
            max = max.max(s);
        }
        assert!(min < -0.95 && max > 0.95);
    }

    #[test]
    fn saw_and_square_stay_bounded_at_high_frequencies() {
        // The blep residual is largest when dt approaches the edge-region
        // width, so the corrected discontinuity samples are stressed
        // hardest near the top of the audible band.
        for freq in [1000.0, 5000.0, 15_000.0, 19_000.0] {
            for waveform in [Waveform::Saw, Waveform::Square] {
                let mut osc = Oscillator::new(SR);
                osc.set_waveform(waveform);
                osc.set_frequency(freq);
                for _ in 0..SR {
                    let s = osc.output();
                    assert!(
                        s.abs() <= 1.0 + 1.0e-3,
                        "{waveform:?} at {freq} Hz produced {s}"
                    );
                }
            }
        }
    }

    #[test]
    fn square_alternates_signs() {
        let mut osc = Oscillator::new(SR);
        osc.set_waveform(Waveform::Square);
        osc.set_frequency(100.0);
        let mut saw_high = false;
        let mut saw_low = false;
        for _ in 0..1000 {
            let s = osc.output();
            if s > 0.5 {
                saw_high = true;
            }
            if s < -0.5 {
                saw_low = true;
            }
        }
        assert!(saw_high && saw_low);
    }

    #[test]
    fn pitch_change_preserves_phase() {
        let mut osc = Oscillator::new(SR);
        osc.set_waveform(Waveform::Sine);
        for _ in 0..100 {
            osc.output();
        }
        let before = osc.phase;
        osc.set_frequency(880.0);
        assert_eq!(osc.phase, before);
    }

    #[test]
    fn amplitude_scales_output() {
        let mut osc = Oscillator::new(SR);
        osc.set_waveform(Waveform::Sine);
        osc.set_amplitude(0.5);
        for _ in 0..1000 {
            assert!(osc.output().abs() <= 0.5 + 1.0e-5);
        }
    }

    #[test]
    fn blep_is_zero_away_from_edges() {
        assert_eq!(poly_blep(0.5, 0.01), 0.0);
        assert!(poly_blep(0.005, 0.01) != 0.0);
        assert!(poly_blep(0.995, 0.01) != 0.0);
    }
}
