//! Engine instance and the handles callers use to drive it.
//!
//! The [`Mixer`] owns the graph, sequencer, and tick clock behind an
//! `Arc`; cloning it (or any handle) is cheap. The render side takes each
//! mutex exactly once per [`Mixer::fill`] call, so caller-side lock holds
//! are bounded by one buffer's render time. Event callbacks receive the
//! graph directly and must never touch engine handles, which would
//! re-enter the locks.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chime_graph::{
    ChannelKey, Effect, EffectKey, Graph, Instrument, InstrumentKey,
};
use tracing::debug;

use crate::clock::TickClock;
use crate::sequencer::{EventCallback, EventId, NoteScale, Sequencer};

/// Full-scale factor for the sink's 16-bit integer sample format.
pub const SCALE: f32 = i16::MAX as f32;

struct Shared {
    graph: Mutex<Graph>,
    sequencer: Mutex<Sequencer>,
    clock: TickClock,
    sample_rate: u32,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A complete engine instance. Independent instances share nothing, so
/// tests can run several side by side.
#[derive(Clone)]
pub struct Mixer {
    shared: Arc<Shared>,
    master: ChannelKey,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        let graph = Graph::new();
        let master = graph.master();
        debug!(sample_rate, "mixer created");
        Self {
            shared: Arc::new(Shared {
                graph: Mutex::new(graph),
                sequencer: Mutex::new(Sequencer::new(sample_rate)),
                clock: TickClock::new(),
                sample_rate,
            }),
            master,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    /// Handle to the always-present root channel.
    pub fn master(&self) -> ChannelRef {
        ChannelRef {
            shared: Arc::clone(&self.shared),
            key: self.master,
        }
    }

    /// Create a channel routed into the master.
    pub fn create_channel(&self) -> ChannelRef {
        let key = {
            let mut graph = lock(&self.shared.graph);
            let key = graph.create_channel();
            let master = graph.master();
            graph.add_channel(master, key);
            key
        };
        ChannelRef {
            shared: Arc::clone(&self.shared),
            key,
        }
    }

    /// Register an instrument and route it into the master channel.
    pub fn register<I: Instrument + 'static>(&self, instrument: I) -> InstrumentRef {
        self.master().add_instrument(instrument)
    }

    /// Register an effect at the end of the master channel's chain.
    pub fn register_effect<E: Effect + 'static>(&self, effect: E) -> EffectRef {
        self.master().add_effect(effect)
    }

    pub fn set_bpm(&self, bpm: u32) {
        lock(&self.shared.sequencer).set_bpm(bpm);
    }

    pub fn set_ppq(&self, ppq: u32) {
        lock(&self.shared.sequencer).set_ppq(ppq);
    }

    /// Schedule a one-shot callback `count` notes of `scale` from now.
    /// The callback runs on the render thread; keep it short and do not
    /// call back into engine handles from inside it.
    pub fn schedule(
        &self,
        callback: EventCallback,
        scale: NoteScale,
        count: u64,
    ) -> EventId {
        lock(&self.shared.sequencer).schedule(&self.shared.clock, callback, scale, count)
    }

    /// Schedule a callback to repeat every `count` notes of `scale`.
    pub fn schedule_repeating(
        &self,
        callback: EventCallback,
        scale: NoteScale,
        count: u64,
    ) -> EventId {
        lock(&self.shared.sequencer).schedule_repeating(
            &self.shared.clock,
            callback,
            scale,
            count,
        )
    }

    /// Remove a pending event before it fires. Returns whether it was
    /// still pending.
    pub fn cancel(&self, id: EventId) -> bool {
        lock(&self.shared.sequencer).cancel(id)
    }

    pub fn current_tick(&self) -> u64 {
        self.shared.clock.now()
    }

    /// Block the calling thread until the render path has advanced the
    /// clock to `tick`. Never call this from the render thread.
    pub fn wait_for_tick(&self, tick: u64) {
        self.shared.clock.wait_for_tick(tick);
    }

    /// Bounded-wait variant of [`Mixer::wait_for_tick`]. Returns whether
    /// the target was reached.
    pub fn wait_for_tick_timeout(&self, tick: u64, timeout: Duration) -> bool {
        self.shared.clock.wait_for_tick_timeout(tick, timeout)
    }

    /// Render `out.len()` samples. Each sample advances the sequencer by
    /// one sample of musical time, pulls the master channel, and scales to
    /// 16-bit full range (saturating at the rails).
    pub fn fill(&self, out: &mut [i16]) {
        let mut sequencer = lock(&self.shared.sequencer);
        let mut graph = lock(&self.shared.graph);
        for sample in out.iter_mut() {
            sequencer.tick(&mut graph, &self.shared.clock);
            *sample = (graph.master_output() * SCALE) as i16;
        }
    }
}

/// Handle to one channel in a mixer's graph.
#[derive(Clone)]
pub struct ChannelRef {
    shared: Arc<Shared>,
    key: ChannelKey,
}

impl ChannelRef {
    pub fn key(&self) -> ChannelKey {
        self.key
    }

    /// Create a subchannel routed into this one.
    pub fn create_subchannel(&self) -> ChannelRef {
        let key = {
            let mut graph = lock(&self.shared.graph);
            let key = graph.create_channel();
            graph.add_channel(self.key, key);
            key
        };
        ChannelRef {
            shared: Arc::clone(&self.shared),
            key,
        }
    }

    /// Route an existing channel under this one. Rejected (returns false)
    /// if the link would create a cycle.
    pub fn add_channel(&self, child: &ChannelRef) -> bool {
        lock(&self.shared.graph).add_channel(self.key, child.key)
    }

    /// Unlink a subchannel, leaving it intact but unrendered.
    pub fn remove_channel(&self, child: &ChannelRef) {
        lock(&self.shared.graph).remove_channel(self.key, child.key);
    }

    /// Register an instrument and route it into this channel.
    pub fn add_instrument<I: Instrument + 'static>(&self, instrument: I) -> InstrumentRef {
        let key = {
            let mut graph = lock(&self.shared.graph);
            let key = graph.insert_instrument(Box::new(instrument));
            graph.add_instrument(self.key, key);
            key
        };
        InstrumentRef {
            shared: Arc::clone(&self.shared),
            key,
        }
    }

    pub fn remove_instrument(&self, instrument: &InstrumentRef) {
        lock(&self.shared.graph).remove_instrument(self.key, instrument.key);
    }

    /// Register an effect at the end of this channel's chain.
    pub fn add_effect<E: Effect + 'static>(&self, effect: E) -> EffectRef {
        let key = {
            let mut graph = lock(&self.shared.graph);
            let key = graph.insert_effect(Box::new(effect));
            graph.add_effect(self.key, key);
            key
        };
        EffectRef {
            shared: Arc::clone(&self.shared),
            key,
        }
    }

    pub fn remove_effect(&self, effect: &EffectRef) {
        lock(&self.shared.graph).remove_effect(self.key, effect.key);
    }

    pub fn set_gain(&self, gain: f32) {
        if let Some(ch) = lock(&self.shared.graph).channel_mut(self.key) {
            ch.set_gain(gain);
        }
    }

    pub fn gain(&self) -> f32 {
        lock(&self.shared.graph)
            .channel(self.key)
            .map(|ch| ch.gain())
            .unwrap_or(0.0)
    }

    pub fn set_active(&self, active: bool) {
        if let Some(ch) = lock(&self.shared.graph).channel_mut(self.key) {
            ch.set_active(active);
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.shared.graph)
            .channel(self.key)
            .is_some_and(|ch| ch.is_active())
    }

    pub fn instrument_count(&self) -> usize {
        lock(&self.shared.graph)
            .channel(self.key)
            .map(|ch| ch.instruments().len())
            .unwrap_or(0)
    }

    pub fn subchannel_count(&self) -> usize {
        lock(&self.shared.graph)
            .channel(self.key)
            .map(|ch| ch.subchannels().len())
            .unwrap_or(0)
    }

    /// Unlink this channel from its parent without destroying it.
    pub fn detach(&self) {
        lock(&self.shared.graph).detach_channel(self.key);
    }

    /// Destroy the channel, orphaning members. No-op for the master.
    pub fn destroy(&self) {
        lock(&self.shared.graph).destroy_channel(self.key);
    }
}

/// Handle to one registered instrument.
#[derive(Clone)]
pub struct InstrumentRef {
    shared: Arc<Shared>,
    key: InstrumentKey,
}

impl InstrumentRef {
    pub fn key(&self) -> InstrumentKey {
        self.key
    }

    /// Begin sounding `note` (semitones, 69 = A4) at `velocity` in
    /// `0..=127`.
    pub fn play(&self, note: f32, velocity: f32) {
        if let Some(node) = lock(&self.shared.graph).instrument_mut(self.key) {
            node.play(note, velocity);
        }
    }

    /// Release `note`; any envelope tail keeps sounding until it decays.
    pub fn stop(&self, note: f32) {
        if let Some(node) = lock(&self.shared.graph).instrument_mut(self.key) {
            node.stop(note);
        }
    }

    pub fn set_active(&self, active: bool) {
        if let Some(node) = lock(&self.shared.graph).instrument_mut(self.key) {
            node.set_active(active);
        }
    }

    pub fn is_active(&self) -> bool {
        let mut graph = lock(&self.shared.graph);
        graph
            .instrument_mut(self.key)
            .map(|node| node.is_active())
            .unwrap_or(false)
    }

    /// Run `f` against the concrete instrument type it was registered
    /// with. Returns `None` if the instrument is gone or is not a `T`.
    pub fn with<T: Instrument + 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut graph = lock(&self.shared.graph);
        let node = graph.instrument_mut(self.key)?;
        let concrete = node.as_any_mut().downcast_mut::<T>()?;
        Some(f(concrete))
    }

    /// Play `note` and block the calling thread until `count` notes of
    /// `scale` have been rendered, then release it. This is the bridge
    /// between a caller's program order and audio time; never call it
    /// from the render thread.
    pub fn play_for(&self, note: f32, velocity: f32, scale: NoteScale, count: u64) {
        let target = {
            let sequencer = lock(&self.shared.sequencer);
            self.shared.clock.now() + sequencer.ticks_in_note(scale, count)
        };
        self.play(note, velocity);
        self.shared.clock.wait_for_tick(target);
        self.stop(note);
    }

    /// Remove the instrument from the graph entirely.
    pub fn destroy(&self) {
        lock(&self.shared.graph).destroy_instrument(self.key);
    }
}

/// Handle to one registered effect.
#[derive(Clone)]
pub struct EffectRef {
    shared: Arc<Shared>,
    key: EffectKey,
}

impl EffectRef {
    pub fn key(&self) -> EffectKey {
        self.key
    }

    pub fn set_active(&self, active: bool) {
        if let Some(node) = lock(&self.shared.graph).effect_mut(self.key) {
            node.set_active(active);
        }
    }

    /// Remove the effect from the graph entirely.
    pub fn destroy(&self) {
        lock(&self.shared.graph).destroy_effect(self.key);
    }
}
