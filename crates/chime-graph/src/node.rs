//! Node traits for the pull-based render graph.

use std::any::Any;

/// A mono sample source pulled once per output frame.
///
/// `output` both computes the current sample and advances internal state,
/// so it must be called exactly once per frame per node.
pub trait AudioNode: Send {
    /// Produce the next sample and advance one frame.
    fn output(&mut self) -> f32;

    /// Whether the node currently contributes signal. Inactive nodes are
    /// skipped by the channel render loop.
    fn is_active(&self) -> bool {
        true
    }

    fn set_active(&mut self, _active: bool) {}
}

/// A playable note source: an [`AudioNode`] with note-on/note-off control.
pub trait Instrument: AudioNode {
    /// Begin sounding `note` (semitones, 69 = A4 = 440 Hz) at `velocity`
    /// in `0..=127`.
    fn play(&mut self, note: f32, velocity: f32);

    /// Release `note`. Sound may continue through a release tail; the node
    /// reports that through [`AudioNode::is_active`].
    fn stop(&mut self, note: f32);

    /// Typed access for callers that registered a concrete instrument.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// An in-place sample processor chained after a channel's summed input.
pub trait Effect: Send {
    fn process(&mut self, input: f32) -> f32;

    /// Inactive effects pass their input through untouched.
    fn is_active(&self) -> bool {
        true
    }

    fn set_active(&mut self, _active: bool) {}
}
