//! Tempo-driven tick accumulator and event scheduler.
//!
//! The sequencer converts the sample stream into musical ticks (PPQ
//! resolution at the current BPM) and fires scheduled callbacks as their
//! tick comes due. Callbacks run on the render thread with direct graph
//! access, so they must stay short.

use chime_graph::{Graph, ParameterRange};
use tracing::debug;

use crate::clock::TickClock;

/// Note duration relative to a quarter note.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteScale {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl NoteScale {
    /// Length of this note value in ticks at `ppq` ticks per quarter.
    pub fn ticks(self, ppq: u32) -> u64 {
        let divisor = match self {
            NoteScale::Whole => 1,
            NoteScale::Half => 2,
            NoteScale::Quarter => 4,
            NoteScale::Eighth => 8,
            NoteScale::Sixteenth => 16,
            NoteScale::ThirtySecond => 32,
        };
        (ppq as u64 * 4) / divisor
    }
}

/// Handle for cancelling a scheduled event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventId(u64);

/// Scheduled work, invoked on the render thread when its tick arrives.
pub type EventCallback = Box<dyn FnMut(&mut Graph) + Send>;

struct ScheduledEvent {
    id: EventId,
    fire_tick: u64,
    period: Option<u64>,
    callback: EventCallback,
}

const BPM_RANGE: ParameterRange<u32> = ParameterRange::new(1, 1000, 60);
const PPQ_RANGE: ParameterRange<u32> = ParameterRange::new(24, 960, 240);

/// Converts samples to ticks and dispatches due events.
pub struct Sequencer {
    sample_rate: u32,
    bpm: u32,
    ppq: u32,
    samples_per_tick: f64,
    sample_time: f64,
    events: Vec<ScheduledEvent>,
    next_event_id: u64,
    // Scratch list reused across dispatches.
    due: Vec<ScheduledEvent>,
}

impl Sequencer {
    pub fn new(sample_rate: u32) -> Self {
        let mut seq = Self {
            sample_rate,
            bpm: BPM_RANGE.default,
            ppq: PPQ_RANGE.default,
            samples_per_tick: 0.0,
            sample_time: 0.0,
            events: Vec::new(),
            next_event_id: 0,
            due: Vec::new(),
        };
        seq.update_samples_per_tick();
        seq
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Set the tempo, clamped to `1..=1000` BPM. Takes effect from the
    /// next sample.
    pub fn set_bpm(&mut self, bpm: u32) {
        self.bpm = BPM_RANGE.clamp(bpm);
        self.update_samples_per_tick();
    }

    pub fn ppq(&self) -> u32 {
        self.ppq
    }

    /// Set the tick resolution, clamped to `24..=960` ticks per quarter.
    pub fn set_ppq(&mut self, ppq: u32) {
        self.ppq = PPQ_RANGE.clamp(ppq);
        self.update_samples_per_tick();
    }

    pub fn samples_per_tick(&self) -> f64 {
        self.samples_per_tick
    }

    /// Length of `count` notes of the given value, in ticks, at the
    /// current resolution.
    pub fn ticks_in_note(&self, scale: NoteScale, count: u64) -> u64 {
        scale.ticks(self.ppq) * count
    }

    fn update_samples_per_tick(&mut self) {
        self.samples_per_tick =
            self.sample_rate as f64 * 60.0 / (self.bpm as f64 * self.ppq as f64);
    }

    /// Schedule `callback` to fire once, `count` notes of `scale` from now.
    pub fn schedule(
        &mut self,
        clock: &TickClock,
        callback: EventCallback,
        scale: NoteScale,
        count: u64,
    ) -> EventId {
        let fire_tick = clock.now() + self.ticks_in_note(scale, count);
        self.push_event(fire_tick, None, callback)
    }

    /// Schedule `callback` to fire every `count` notes of `scale`,
    /// starting one period from now.
    pub fn schedule_repeating(
        &mut self,
        clock: &TickClock,
        callback: EventCallback,
        scale: NoteScale,
        count: u64,
    ) -> EventId {
        let period = self.ticks_in_note(scale, count).max(1);
        let fire_tick = clock.now() + period;
        self.push_event(fire_tick, Some(period), callback)
    }

    fn push_event(
        &mut self,
        fire_tick: u64,
        period: Option<u64>,
        callback: EventCallback,
    ) -> EventId {
        let id = EventId(self.next_event_id);
        self.next_event_id += 1;
        self.events.push(ScheduledEvent {
            id,
            fire_tick,
            period,
            callback,
        });
        debug!(id = id.0, fire_tick, ?period, "event scheduled");
        id
    }

    /// Drop a pending event. Returns whether it was still pending.
    pub fn cancel(&mut self, id: EventId) -> bool {
        let before = self.events.len();
        self.events.retain(|event| event.id != id);
        let removed = self.events.len() != before;
        if removed {
            debug!(id = id.0, "event cancelled");
        }
        removed
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Account for one rendered sample: advance the clock across any tick
    /// boundaries crossed and fire events that came due.
    pub fn tick(&mut self, graph: &mut Graph, clock: &TickClock) {
        self.sample_time += 1.0;
        while self.sample_time >= self.samples_per_tick {
            self.sample_time -= self.samples_per_tick;
            let now = clock.advance(1);
            self.fire_due(now, graph);
        }
    }

    fn fire_due(&mut self, now: u64, graph: &mut Graph) {
        if self.events.iter().all(|event| event.fire_tick > now) {
            return;
        }
        let mut due = std::mem::take(&mut self.due);
        let mut i = 0;
        while i < self.events.len() {
            if self.events[i].fire_tick <= now {
                due.push(self.events.swap_remove(i));
            } else {
                i += 1;
            }
        }
        for mut event in due.drain(..) {
            (event.callback)(graph);
            if let Some(period) = event.period {
                event.fire_tick += period;
                self.events.push(event);
            }
        }
        self.due = due;
    }
}
