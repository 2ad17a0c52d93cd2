//! Audio sink trait and error types.

use thiserror::Error;

/// Error type for sink operations. Setup failures are fatal to the
/// caller; there is no internal retry.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no audio device available")]
    NoDevice,
    #[error("device init error: {0}")]
    DeviceInit(String),
    #[error("stream create error: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
}

/// An output device boundary the engine renders into.
pub trait AudioSink {
    /// Sample rate the device runs at.
    fn sample_rate(&self) -> u32;

    /// Begin pulling audio.
    fn start(&mut self) -> Result<(), SinkError>;

    /// Pause output. Rendering state is kept; `start` resumes.
    fn stop(&mut self) -> Result<(), SinkError>;
}
