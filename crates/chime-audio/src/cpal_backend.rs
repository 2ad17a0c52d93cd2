//! CPAL-based audio sink.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::warn;

use chime_engine::Mixer;

use crate::sink::{AudioSink, SinkError};

/// Samples rendered per `Mixer::fill` call on the render thread.
const RENDER_CHUNK: usize = 256;

/// Audio sink backed by the default CPAL output device.
///
/// A dedicated render thread fills a ring buffer from the mixer; the
/// device callback only pops, so the engine's locks never appear on the
/// device's real-time path. Underruns zero-fill and are counted, not
/// retried.
pub struct CpalSink {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
    underruns: Arc<AtomicU64>,
    alive: Arc<AtomicBool>,
    render_thread: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// Open the default output device. Fails when no device exists or its
    /// configuration cannot be read.
    pub fn open() -> Result<Self, SinkError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(SinkError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| SinkError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        // Force stereo — the stream callback assumes 2-channel interleaving.
        config.channels = 2;

        Ok(Self {
            device,
            config,
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
            underruns: Arc::new(AtomicU64::new(0)),
            alive: Arc::new(AtomicBool::new(true)),
            render_thread: None,
        })
    }

    /// Connect `mixer` to the device: spawn the render thread and build
    /// the output stream. The stream starts paused; call
    /// [`AudioSink::start`].
    pub fn attach(&mut self, mixer: Mixer) -> Result<(), SinkError> {
        // About 100 ms of mono engine output.
        let buffer_size = self.config.sample_rate.0 as usize / 10;
        let rb = HeapRb::<i16>::new(buffer_size);
        let (producer, mut consumer) = rb.split();

        let alive = Arc::clone(&self.alive);
        let underruns = Arc::clone(&self.underruns);
        self.render_thread = Some(std::thread::spawn(move || {
            render_loop(mixer, producer, alive, underruns);
        }));

        let running = Arc::clone(&self.running);
        let underruns = Arc::clone(&self.underruns);
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    for chunk in data.chunks_mut(channels) {
                        if let Some(sample) = consumer.try_pop() {
                            let value = sample as f32 / 32768.0;
                            // Mono engine output duplicated across channels.
                            for slot in chunk.iter_mut() {
                                *slot = value;
                            }
                        } else {
                            underruns.fetch_add(1, Ordering::Relaxed);
                            for slot in chunk.iter_mut() {
                                *slot = 0.0;
                            }
                        }
                    }
                },
                |err| warn!(error = %err, "audio stream error"),
                None,
            )
            .map_err(|e| SinkError::StreamCreate(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    /// Device frames the callback had to zero-fill so far.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

/// Tracks the device callback's underrun counter and reports increases,
/// so logging happens off the real-time path and at most once per
/// observation.
struct UnderrunReporter {
    last: u64,
}

impl UnderrunReporter {
    fn new() -> Self {
        Self { last: 0 }
    }

    /// Underruns accumulated since the previous observation, if any.
    fn observe(&mut self, count: u64) -> Option<u64> {
        if count > self.last {
            let new = count - self.last;
            self.last = count;
            Some(new)
        } else {
            None
        }
    }
}

/// Fill the ring buffer from the mixer until the sink is dropped,
/// spinning when the buffer is full. Underruns counted by the device
/// callback are logged here, once per render chunk at most.
fn render_loop(
    mixer: Mixer,
    mut producer: HeapProd<i16>,
    alive: Arc<AtomicBool>,
    underruns: Arc<AtomicU64>,
) {
    let mut buf = [0i16; RENDER_CHUNK];
    let mut reporter = UnderrunReporter::new();
    'outer: while alive.load(Ordering::Relaxed) {
        mixer.fill(&mut buf);
        for &sample in &buf {
            while producer.try_push(sample).is_err() {
                if !alive.load(Ordering::Relaxed) {
                    break 'outer;
                }
                std::hint::spin_loop();
            }
        }
        if let Some(new) = reporter.observe(underruns.load(Ordering::Relaxed)) {
            warn!(new, total = reporter.last, "output stream underrun");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UnderrunReporter;

    #[test]
    fn reporter_fires_only_on_rising_count() {
        let mut reporter = UnderrunReporter::new();
        assert_eq!(reporter.observe(0), None);
        assert_eq!(reporter.observe(3), Some(3));
        assert_eq!(reporter.observe(3), None);
        assert_eq!(reporter.observe(5), Some(2));
        assert_eq!(reporter.observe(5), None);
    }

    #[test]
    fn reporter_accumulates_total() {
        let mut reporter = UnderrunReporter::new();
        reporter.observe(4);
        reporter.observe(10);
        assert_eq!(reporter.last, 10);
    }
}

impl AudioSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn start(&mut self) -> Result<(), SinkError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream
                .play()
                .map_err(|e| SinkError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream
                .pause()
                .map_err(|e| SinkError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        if let Some(handle) = self.render_thread.take() {
            let _ = handle.join();
        }
    }
}
