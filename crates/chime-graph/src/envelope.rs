//! ADSR amplitude envelope with exponential segments.
//!
//! Each timed segment (attack, decay, release) is rendered by repeatedly
//! multiplying the level by a per-segment factor, which traces an
//! exponential curve between the segment's start and target levels. The
//! level therefore never touches zero; [`LEVEL_FLOOR`] stands in for
//! silence at both ends of the curve.

use crate::node::AudioNode;
use crate::params::{ParamId, ParameterHost, ParameterRange, ParameterSet};

/// Smallest envelope level. Doubles as the attack start level and the
/// release target, since a multiplicative update cannot reach 0.
pub const LEVEL_FLOOR: f32 = 1.0e-4;

/// Envelope segment. `Off` and `Sustain` hold a constant level; the other
/// three run for a sample count derived from their time parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeState {
    Off,
    Attack,
    Decay,
    Sustain,
    Release,
}

impl EnvelopeState {
    /// Next segment in the fixed Off → A → D → S → R → Off cycle.
    fn next(self) -> Self {
        match self {
            EnvelopeState::Off => EnvelopeState::Attack,
            EnvelopeState::Attack => EnvelopeState::Decay,
            EnvelopeState::Decay => EnvelopeState::Sustain,
            EnvelopeState::Sustain => EnvelopeState::Release,
            EnvelopeState::Release => EnvelopeState::Off,
        }
    }

    fn is_timed(self) -> bool {
        !matches!(self, EnvelopeState::Off | EnvelopeState::Sustain)
    }
}

/// ADSR envelope. Produces a gain in `[0, 1]` (exactly 0 when off); when
/// disabled it outputs a constant 1.0 so it can sit in a signal chain
/// unconditionally.
pub struct Envelope {
    params: ParameterSet,
    sample_rate: u32,
    active: bool,
    state: EnvelopeState,
    value: f32,
    multiplier: f32,
    elapsed: u32,
    segment_len: u32,
}

const TIME_RANGE: ParameterRange = ParameterRange::new(1.0e-3, 10.0, 0.0);
const SUSTAIN_RANGE: ParameterRange = ParameterRange::new(LEVEL_FLOOR, 1.0, 0.7);

impl Envelope {
    pub const ATTACK: ParamId = ParamId(0);
    pub const DECAY: ParamId = ParamId(1);
    pub const SUSTAIN: ParamId = ParamId(2);
    pub const RELEASE: ParamId = ParamId(3);

    pub fn new(sample_rate: u32) -> Self {
        let mut params = ParameterSet::new();
        params.add("attack", ParameterRange { default: 0.01, ..TIME_RANGE });
        params.add("decay", ParameterRange { default: 0.1, ..TIME_RANGE });
        params.add("sustain", SUSTAIN_RANGE);
        params.add("release", ParameterRange { default: 0.3, ..TIME_RANGE });
        Self {
            params,
            sample_rate,
            active: true,
            state: EnvelopeState::Off,
            value: LEVEL_FLOOR,
            multiplier: 1.0,
            elapsed: 0,
            segment_len: 0,
        }
    }

    /// Begin the attack segment, restarting from the floor even if a
    /// previous note is still releasing.
    pub fn start(&mut self) {
        self.state = EnvelopeState::Off;
        self.advance_state();
    }

    /// Begin the release segment from the current level, whatever segment
    /// is running.
    pub fn stop(&mut self) {
        self.state = EnvelopeState::Sustain;
        self.advance_state();
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// Whether the envelope has fully released (or never started).
    pub fn is_idle(&self) -> bool {
        self.state == EnvelopeState::Off
    }

    pub fn set_attack_time(&mut self, seconds: f32) {
        self.set_parameter(Self::ATTACK, seconds);
    }

    pub fn set_decay_time(&mut self, seconds: f32) {
        self.set_parameter(Self::DECAY, seconds);
    }

    pub fn set_sustain_level(&mut self, level: f32) {
        self.set_parameter(Self::SUSTAIN, level);
    }

    pub fn set_release_time(&mut self, seconds: f32) {
        self.set_parameter(Self::RELEASE, seconds);
    }

    pub fn set_adsr(&mut self, attack: f32, decay: f32, sustain: f32, release: f32) {
        self.set_attack_time(attack);
        self.set_decay_time(decay);
        self.set_sustain_level(sustain);
        self.set_release_time(release);
    }

    /// Move to the next segment and set up its level trajectory.
    fn advance_state(&mut self) {
        self.state = self.state.next();
        self.elapsed = 0;
        let sustain = self.parameter(Self::SUSTAIN);
        match self.state {
            EnvelopeState::Off => {
                self.value = LEVEL_FLOOR;
            }
            EnvelopeState::Attack => {
                self.value = LEVEL_FLOOR;
                self.begin_segment(Self::ATTACK, 1.0);
            }
            EnvelopeState::Decay => {
                self.value = 1.0;
                self.begin_segment(Self::DECAY, sustain);
            }
            EnvelopeState::Sustain => {
                self.value = sustain;
            }
            EnvelopeState::Release => {
                // Release starts from wherever the level currently is.
                self.begin_segment(Self::RELEASE, LEVEL_FLOOR);
            }
        }
    }

    fn begin_segment(&mut self, time_param: ParamId, target: f32) {
        let seconds = self.parameter(time_param);
        let len = (seconds * self.sample_rate as f32).max(1.0);
        self.segment_len = len as u32;
        self.multiplier = segment_multiplier(self.value, target, len);
    }
}

/// Per-sample factor that carries `start` to `end` over `length` samples of
/// repeated multiplication. First-order approximation of
/// `(end / start).powf(1 / length)`, accurate for the per-sample step sizes
/// audio rates produce.
fn segment_multiplier(start: f32, end: f32, length: f32) -> f32 {
    let start = start.max(LEVEL_FLOOR);
    let end = end.max(LEVEL_FLOOR);
    1.0 + (end.ln() - start.ln()) / length
}

impl AudioNode for Envelope {
    fn output(&mut self) -> f32 {
        if !self.active {
            return 1.0;
        }
        if self.state.is_timed() {
            if self.elapsed >= self.segment_len {
                self.advance_state();
            }
            if self.state.is_timed() {
                self.elapsed += 1;
                self.value *= self.multiplier;
            }
        }
        // The internal level bottoms out at the floor so the
        // multiplicative update can restart, but a fully released
        // envelope is silent, not -80 dB.
        if self.state == EnvelopeState::Off {
            return 0.0;
        }
        self.value.min(1.0)
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}

impl ParameterHost for Envelope {
    fn params(&self) -> &ParameterSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44_100;

    fn run(env: &mut Envelope, samples: usize) -> f32 {
        let mut last = 0.0;
        for _ in 0..samples {
            last = env.output();
        }
        last
    }

    #[test]
    fn state_cycle_order() {
        let mut state = EnvelopeState::Off;
        let expected = [
            EnvelopeState::Attack,
            EnvelopeState::Decay,
            EnvelopeState::Sustain,
            EnvelopeState::Release,
            EnvelopeState::Off,
        ];
        for want in expected {
            state = state.next();
            assert_eq!(state, want);
        }
    }

    #[test]
    fn disabled_envelope_is_unity() {
        let mut env = Envelope::new(SR);
        env.set_active(false);
        env.start();
        for _ in 0..100 {
            assert_eq!(env.output(), 1.0);
        }
    }

    #[test]
    fn idle_envelope_outputs_zero() {
        let mut env = Envelope::new(SR);
        assert!(env.is_idle());
        assert_eq!(env.output(), 0.0);
    }

    #[test]
    fn output_is_zero_again_after_full_release() {
        let mut env = Envelope::new(SR);
        env.set_adsr(0.001, 0.001, 0.7, 0.005);
        env.start();
        run(&mut env, SR as usize / 10);
        env.stop();
        run(&mut env, SR as usize / 10);
        assert!(env.is_idle());
        for _ in 0..100 {
            assert_eq!(env.output(), 0.0);
        }
    }

    #[test]
    fn attack_reaches_peak_then_decays_to_sustain() {
        let mut env = Envelope::new(SR);
        env.set_adsr(0.01, 0.01, 0.5, 0.01);
        env.start();
        assert_eq!(env.state(), EnvelopeState::Attack);

        let attack_len = (0.01 * SR as f32) as usize;
        let peak = run(&mut env, attack_len);
        assert!(peak > 0.9, "attack should approach 1.0, got {peak}");
        assert!(peak <= 1.0);

        // One more sample rolls into decay.
        env.output();
        assert_eq!(env.state(), EnvelopeState::Decay);

        let decay_len = (0.01 * SR as f32) as usize;
        run(&mut env, decay_len + 1);
        assert_eq!(env.state(), EnvelopeState::Sustain);
        let sustain = env.output();
        assert!((sustain - 0.5).abs() < 0.05, "sustain level was {sustain}");
    }

    #[test]
    fn sustain_holds_until_stop() {
        let mut env = Envelope::new(SR);
        env.set_adsr(0.001, 0.001, 0.6, 0.001);
        env.start();
        run(&mut env, SR as usize / 10);
        assert_eq!(env.state(), EnvelopeState::Sustain);
        let held = run(&mut env, 1000);
        assert_eq!(env.state(), EnvelopeState::Sustain);
        assert!((held - 0.6).abs() < 0.05);
    }

    #[test]
    fn release_decays_and_goes_idle() {
        let mut env = Envelope::new(SR);
        env.set_adsr(0.001, 0.001, 0.7, 0.01);
        env.start();
        run(&mut env, SR as usize / 10);
        env.stop();
        assert_eq!(env.state(), EnvelopeState::Release);

        let release_len = (0.01 * SR as f32) as usize;
        let tail = run(&mut env, release_len + 2);
        assert!(env.is_idle());
        assert_eq!(tail, 0.0);
    }

    #[test]
    fn stop_during_attack_releases_from_current_level() {
        let mut env = Envelope::new(SR);
        env.set_adsr(0.1, 0.1, 0.7, 0.01);
        env.start();
        // Partway through the attack.
        let mid = run(&mut env, (0.05 * SR as f32) as usize);
        assert!(mid < 0.9 && mid > LEVEL_FLOOR);
        env.stop();
        assert_eq!(env.state(), EnvelopeState::Release);
        // Level only falls from here.
        let mut prev = env.output();
        for _ in 0..100 {
            let v = env.output();
            assert!(v <= prev);
            prev = v;
        }
    }

    #[test]
    fn restart_during_release_begins_new_attack() {
        let mut env = Envelope::new(SR);
        env.set_adsr(0.01, 0.01, 0.7, 0.5);
        env.start();
        run(&mut env, SR as usize / 10);
        env.stop();
        run(&mut env, 100);
        env.start();
        assert_eq!(env.state(), EnvelopeState::Attack);
        let v = env.output();
        assert!(v < 0.01, "attack restarts near the floor, got {v}");
    }

    #[test]
    fn output_never_exceeds_one() {
        let mut env = Envelope::new(SR);
        env.set_adsr(0.001, 0.001, 1.0, 0.001);
        env.start();
        for _ in 0..(SR as usize / 4) {
            assert!(env.output() <= 1.0);
        }
    }

    #[test]
    fn each_parameter_sets_its_own_slot() {
        let mut env = Envelope::new(SR);
        env.set_release_time(2.0);
        assert_eq!(env.parameter(Envelope::RELEASE), 2.0);
        assert_eq!(env.parameter(Envelope::DECAY), 0.1);
        assert_eq!(env.parameter(Envelope::SUSTAIN), 0.7);

        env.set_attack_time(0.5);
        assert_eq!(env.parameter(Envelope::ATTACK), 0.5);
        assert_eq!(env.parameter(Envelope::DECAY), 0.1);
    }

    #[test]
    fn times_clamp_to_range() {
        let mut env = Envelope::new(SR);
        env.set_attack_time(-1.0);
        assert_eq!(env.parameter(Envelope::ATTACK), 1.0e-3);
        env.set_decay_time(100.0);
        assert_eq!(env.parameter(Envelope::DECAY), 10.0);
        env.set_sustain_level(0.0);
        assert_eq!(env.parameter(Envelope::SUSTAIN), LEVEL_FLOOR);
    }

    #[test]
    fn multiplier_traces_segment() {
        // 0.0001 -> 1.0 over 1000 steps of repeated multiplication.
        let m = segment_multiplier(LEVEL_FLOOR, 1.0, 1000.0);
        let mut v = LEVEL_FLOOR;
        for _ in 0..1000 {
            v *= m;
        }
        assert!(v > 0.9 && v < 1.1, "landed at {v}");
    }
}
