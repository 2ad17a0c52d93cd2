//! Desktop audio output for the chime engine.
//!
//! [`CpalSink`] pulls samples from a [`chime_engine::Mixer`] on a
//! dedicated render thread and hands them to the platform stream through
//! a ring buffer, keeping the engine off the device callback.

mod cpal_backend;
mod sink;

pub use cpal_backend::CpalSink;
pub use sink::{AudioSink, SinkError};
