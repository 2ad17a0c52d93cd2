//! Signal-graph layer for the chime sonification engine.
//!
//! Defines the pull-based node abstraction, the parameter registry with
//! range clamping, the ADSR envelope, the band-limited oscillator, and the
//! channel tree that the mixer renders. Everything here is single-threaded
//! data; the engine crate owns the locking discipline around it.

mod channel;
mod envelope;
mod graph;
mod node;
mod oscillator;
mod params;
mod synth;

pub use channel::{Channel, ChannelKey, EffectKey, InstrumentKey, RoutingGroup};
pub use envelope::{Envelope, EnvelopeState, LEVEL_FLOOR};
pub use graph::Graph;
pub use node::{AudioNode, Effect, Instrument};
pub use oscillator::{Oscillator, Waveform};
pub use params::{ParamId, ParameterHost, ParameterRange, ParameterSet};
pub use synth::Synth;
