//! Channels and the membership lists that route nodes into them.

use slotmap::new_key_type;

new_key_type! {
    pub struct ChannelKey;
    pub struct InstrumentKey;
    pub struct EffectKey;
}

/// Ordered, duplicate-free membership list. Order is insertion order; for
/// effects it is also the processing order.
#[derive(Clone, Debug)]
pub struct RoutingGroup<K> {
    members: Vec<K>,
}

impl<K: PartialEq + Copy> RoutingGroup<K> {
    pub fn new() -> Self {
        Self { members: Vec::new() }
    }

    /// Append `key` unless already present. Returns whether it was added.
    pub fn add(&mut self, key: K) -> bool {
        if self.members.contains(&key) {
            return false;
        }
        self.members.push(key);
        true
    }

    /// Remove `key` if present; absent keys are a no-op.
    pub fn remove(&mut self, key: K) -> bool {
        let before = self.members.len();
        self.members.retain(|k| *k != key);
        self.members.len() != before
    }

    pub fn contains(&self, key: K) -> bool {
        self.members.contains(&key)
    }

    /// Member at position `index`, if still in range. The render loop
    /// re-fetches by index each iteration so concurrent-looking removal
    /// within a callback cannot leave it holding a stale reference.
    pub fn get(&self, index: usize) -> Option<K> {
        self.members.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = K> + '_ {
        self.members.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<K: PartialEq + Copy> Default for RoutingGroup<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// A mixing bus: sums its instruments and subchannels, runs the sum through
/// its effect chain, and applies its gain.
#[derive(Clone, Debug)]
pub struct Channel {
    active: bool,
    gain: f32,
    parent: Option<ChannelKey>,
    instruments: RoutingGroup<InstrumentKey>,
    subchannels: RoutingGroup<ChannelKey>,
    effects: RoutingGroup<EffectKey>,
}

impl Channel {
    pub fn new() -> Self {
        Self {
            active: true,
            gain: 1.0,
            parent: None,
            instruments: RoutingGroup::new(),
            subchannels: RoutingGroup::new(),
            effects: RoutingGroup::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// The channel this one feeds into, if routed.
    pub fn parent(&self) -> Option<ChannelKey> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<ChannelKey>) {
        self.parent = parent;
    }

    pub fn instruments(&self) -> &RoutingGroup<InstrumentKey> {
        &self.instruments
    }

    pub(crate) fn instruments_mut(&mut self) -> &mut RoutingGroup<InstrumentKey> {
        &mut self.instruments
    }

    pub fn subchannels(&self) -> &RoutingGroup<ChannelKey> {
        &self.subchannels
    }

    pub(crate) fn subchannels_mut(&mut self) -> &mut RoutingGroup<ChannelKey> {
        &mut self.subchannels
    }

    pub fn effects(&self) -> &RoutingGroup<EffectKey> {
        &self.effects
    }

    pub(crate) fn effects_mut(&mut self) -> &mut RoutingGroup<EffectKey> {
        &mut self.effects
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}
