//! Render engine for the chime sonification library.
//!
//! A [`Mixer`] ties together the signal graph, the tempo-driven
//! [`Sequencer`], and the [`TickClock`] that lets caller threads block on
//! musical time. The audio backend drives everything by calling
//! [`Mixer::fill`] once per output buffer.

mod clock;
mod mixer;
mod sequencer;

pub use clock::TickClock;
pub use mixer::{ChannelRef, EffectRef, InstrumentRef, Mixer, SCALE};
pub use sequencer::{EventCallback, EventId, NoteScale, Sequencer};

// The graph types callers need to build instruments and effects.
pub use chime_graph::{
    AudioNode, Channel, ChannelKey, Effect, EffectKey, Envelope, EnvelopeState, Graph,
    Instrument, InstrumentKey, Oscillator, ParamId, ParameterHost, ParameterRange,
    ParameterSet, Synth, Waveform,
};
