//! Arena-backed channel tree and its depth-first render walk.

use slotmap::SlotMap;

use crate::channel::{Channel, ChannelKey, EffectKey, InstrumentKey};
use crate::node::{Effect, Instrument};

struct InstrumentSlot {
    node: Box<dyn Instrument>,
    parent: Option<ChannelKey>,
}

struct EffectSlot {
    node: Box<dyn Effect>,
    parent: Option<ChannelKey>,
}

/// Owns every channel, instrument, and effect, plus the routing between
/// them. The master channel always exists and is the render root.
///
/// Keys stay valid until the entity is destroyed; looking up a destroyed
/// key yields `None` rather than aliasing a reused slot.
pub struct Graph {
    channels: SlotMap<ChannelKey, Channel>,
    instruments: SlotMap<InstrumentKey, InstrumentSlot>,
    effects: SlotMap<EffectKey, EffectSlot>,
    master: ChannelKey,
}

impl Graph {
    pub fn new() -> Self {
        let mut channels = SlotMap::with_key();
        let master = channels.insert(Channel::new());
        Self {
            channels,
            instruments: SlotMap::with_key(),
            effects: SlotMap::with_key(),
            master,
        }
    }

    pub fn master(&self) -> ChannelKey {
        self.master
    }

    /// Create a detached channel. Route it with [`Graph::add_channel`].
    pub fn create_channel(&mut self) -> ChannelKey {
        self.channels.insert(Channel::new())
    }

    /// Store an instrument, detached from any channel.
    pub fn insert_instrument(&mut self, node: Box<dyn Instrument>) -> InstrumentKey {
        self.instruments.insert(InstrumentSlot { node, parent: None })
    }

    /// Store an effect, detached from any channel.
    pub fn insert_effect(&mut self, node: Box<dyn Effect>) -> EffectKey {
        self.effects.insert(EffectSlot { node, parent: None })
    }

    pub fn channel(&self, key: ChannelKey) -> Option<&Channel> {
        self.channels.get(key)
    }

    pub fn channel_mut(&mut self, key: ChannelKey) -> Option<&mut Channel> {
        self.channels.get_mut(key)
    }

    pub fn instrument_mut(&mut self, key: InstrumentKey) -> Option<&mut (dyn Instrument + '_)> {
        Some(self.instruments.get_mut(key)?.node.as_mut())
    }

    pub fn instrument_parent(&self, key: InstrumentKey) -> Option<ChannelKey> {
        self.instruments.get(key).and_then(|slot| slot.parent)
    }

    pub fn effect_mut(&mut self, key: EffectKey) -> Option<&mut (dyn Effect + '_)> {
        Some(self.effects.get_mut(key)?.node.as_mut())
    }

    /// Route `child` into `parent`'s subchannel list. Fails (returns false)
    /// when either key is dead or when the link would make `child` its own
    /// ancestor. A child already routed elsewhere is moved.
    pub fn add_channel(&mut self, parent: ChannelKey, child: ChannelKey) -> bool {
        if !self.channels.contains_key(parent) || !self.channels.contains_key(child) {
            return false;
        }
        if self.is_routed_above(child, parent) {
            return false;
        }
        self.detach_channel(child);
        self.channels[parent].subchannels_mut().add(child);
        self.channels[child].set_parent(Some(parent));
        true
    }

    /// Unlink `child` from `parent`. Absent links are a no-op.
    pub fn remove_channel(&mut self, parent: ChannelKey, child: ChannelKey) {
        let Some(p) = self.channels.get_mut(parent) else {
            return;
        };
        if p.subchannels_mut().remove(child) {
            if let Some(c) = self.channels.get_mut(child) {
                c.set_parent(None);
            }
        }
    }

    /// Route an instrument into `channel`, moving it if already routed.
    pub fn add_instrument(&mut self, channel: ChannelKey, key: InstrumentKey) -> bool {
        if !self.channels.contains_key(channel) || !self.instruments.contains_key(key) {
            return false;
        }
        if let Some(old) = self.instruments[key].parent {
            if let Some(ch) = self.channels.get_mut(old) {
                ch.instruments_mut().remove(key);
            }
        }
        self.channels[channel].instruments_mut().add(key);
        self.instruments[key].parent = Some(channel);
        true
    }

    pub fn remove_instrument(&mut self, channel: ChannelKey, key: InstrumentKey) {
        let Some(ch) = self.channels.get_mut(channel) else {
            return;
        };
        if ch.instruments_mut().remove(key) {
            if let Some(slot) = self.instruments.get_mut(key) {
                slot.parent = None;
            }
        }
    }

    /// Append an effect to `channel`'s chain, moving it if already routed.
    pub fn add_effect(&mut self, channel: ChannelKey, key: EffectKey) -> bool {
        if !self.channels.contains_key(channel) || !self.effects.contains_key(key) {
            return false;
        }
        if let Some(old) = self.effects[key].parent {
            if let Some(ch) = self.channels.get_mut(old) {
                ch.effects_mut().remove(key);
            }
        }
        self.channels[channel].effects_mut().add(key);
        self.effects[key].parent = Some(channel);
        true
    }

    pub fn remove_effect(&mut self, channel: ChannelKey, key: EffectKey) {
        let Some(ch) = self.channels.get_mut(channel) else {
            return;
        };
        if ch.effects_mut().remove(key) {
            if let Some(slot) = self.effects.get_mut(key) {
                slot.parent = None;
            }
        }
    }

    /// Unlink `channel` from its parent, leaving it and its subtree intact
    /// but unrendered.
    pub fn detach_channel(&mut self, channel: ChannelKey) {
        let Some(parent) = self.channels.get(channel).and_then(Channel::parent) else {
            return;
        };
        self.remove_channel(parent, channel);
    }

    /// Destroy a channel: detach it, orphan its subchannels and members,
    /// and free the slot. The master channel cannot be destroyed.
    pub fn destroy_channel(&mut self, channel: ChannelKey) {
        if channel == self.master {
            return;
        }
        self.detach_channel(channel);
        let Some(ch) = self.channels.remove(channel) else {
            return;
        };
        for sub in ch.subchannels().iter() {
            if let Some(c) = self.channels.get_mut(sub) {
                c.set_parent(None);
            }
        }
        for key in ch.instruments().iter() {
            if let Some(slot) = self.instruments.get_mut(key) {
                slot.parent = None;
            }
        }
        for key in ch.effects().iter() {
            if let Some(slot) = self.effects.get_mut(key) {
                slot.parent = None;
            }
        }
    }

    pub fn destroy_instrument(&mut self, key: InstrumentKey) {
        if let Some(slot) = self.instruments.remove(key) {
            if let Some(channel) = slot.parent {
                if let Some(ch) = self.channels.get_mut(channel) {
                    ch.instruments_mut().remove(key);
                }
            }
        }
    }

    pub fn destroy_effect(&mut self, key: EffectKey) {
        if let Some(slot) = self.effects.remove(key) {
            if let Some(channel) = slot.parent {
                if let Some(ch) = self.channels.get_mut(channel) {
                    ch.effects_mut().remove(key);
                }
            }
        }
    }

    /// Whether `ancestor` is `key` or appears on `key`'s parent chain.
    fn is_routed_above(&self, ancestor: ChannelKey, key: ChannelKey) -> bool {
        let mut cursor = Some(key);
        while let Some(k) = cursor {
            if k == ancestor {
                return true;
            }
            cursor = self.channels.get(k).and_then(Channel::parent);
        }
        false
    }

    /// Render one master sample, advancing every active node a frame.
    pub fn master_output(&mut self) -> f32 {
        self.channel_output(self.master)
    }

    fn channel_output(&mut self, key: ChannelKey) -> f32 {
        let Some(channel) = self.channels.get(key) else {
            return 0.0;
        };
        if !channel.is_active() {
            return 0.0;
        }
        let gain = channel.gain();

        // Members are re-fetched by index each iteration: pulling a
        // subchannel recurses into `self`, so no borrow of this channel's
        // lists can be held across the call.
        let mut sum = 0.0;
        let mut i = 0;
        loop {
            let Some(k) = self.channels[key].instruments().get(i) else {
                break;
            };
            if let Some(slot) = self.instruments.get_mut(k) {
                if slot.node.is_active() {
                    sum += slot.node.output();
                }
            }
            i += 1;
        }

        let mut i = 0;
        loop {
            let Some(sub) = self.channels[key].subchannels().get(i) else {
                break;
            };
            sum += self.channel_output(sub);
            i += 1;
        }

        let mut i = 0;
        loop {
            let Some(k) = self.channels[key].effects().get(i) else {
                break;
            };
            if let Some(slot) = self.effects.get_mut(k) {
                if slot.node.is_active() {
                    sum = slot.node.process(sum);
                }
            }
            i += 1;
        }

        sum * gain
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::AudioNode;
    use std::any::Any;

    /// Constant-valued stand-in instrument.
    struct Dc {
        level: f32,
        active: bool,
    }

    impl Dc {
        fn new(level: f32) -> Self {
            Self { level, active: true }
        }
    }

    impl AudioNode for Dc {
        fn output(&mut self) -> f32 {
            self.level
        }
        fn is_active(&self) -> bool {
            self.active
        }
        fn set_active(&mut self, active: bool) {
            self.active = active;
        }
    }

    impl Instrument for Dc {
        fn play(&mut self, note: f32, _velocity: f32) {
            self.level = note;
        }
        fn stop(&mut self, _note: f32) {
            self.level = 0.0;
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct Scaler(f32);

    impl Effect for Scaler {
        fn process(&mut self, input: f32) -> f32 {
            input * self.0
        }
    }

    fn dc(graph: &mut Graph, channel: ChannelKey, level: f32) -> InstrumentKey {
        let key = graph.insert_instrument(Box::new(Dc::new(level)));
        assert!(graph.add_instrument(channel, key));
        key
    }

    #[test]
    fn empty_graph_is_silent() {
        let mut graph = Graph::new();
        assert_eq!(graph.master_output(), 0.0);
    }

    #[test]
    fn master_sums_instruments() {
        let mut graph = Graph::new();
        let master = graph.master();
        dc(&mut graph, master, 0.25);
        dc(&mut graph, master, 0.5);
        assert_eq!(graph.master_output(), 0.75);
    }

    #[test]
    fn subchannel_output_feeds_parent_through_gain() {
        let mut graph = Graph::new();
        let sub = graph.create_channel();
        assert!(graph.add_channel(graph.master(), sub));
        dc(&mut graph, sub, 0.5);
        graph.channel_mut(sub).unwrap().set_gain(0.5);
        assert_eq!(graph.master_output(), 0.25);
    }

    #[test]
    fn inactive_channel_is_silent_including_subtree() {
        let mut graph = Graph::new();
        let sub = graph.create_channel();
        let leaf = graph.create_channel();
        graph.add_channel(graph.master(), sub);
        graph.add_channel(sub, leaf);
        dc(&mut graph, leaf, 1.0);
        assert_eq!(graph.master_output(), 1.0);
        graph.channel_mut(sub).unwrap().set_active(false);
        assert_eq!(graph.master_output(), 0.0);
    }

    #[test]
    fn inactive_instrument_is_skipped() {
        let mut graph = Graph::new();
        let master = graph.master();
        let key = dc(&mut graph, master, 1.0);
        if let Some(node) = graph.instrument_mut(key) {
            node.set_active(false);
        }
        assert_eq!(graph.master_output(), 0.0);
    }

    #[test]
    fn effects_run_in_insertion_order_after_summing() {
        let mut graph = Graph::new();
        let master = graph.master();
        dc(&mut graph, master, 0.5);
        dc(&mut graph, master, 0.5);
        let double = graph.insert_effect(Box::new(Scaler(2.0)));
        let halve = graph.insert_effect(Box::new(Scaler(0.5)));
        graph.add_effect(master, double);
        graph.add_effect(master, halve);
        // (0.5 + 0.5) * 2 * 0.5
        assert_eq!(graph.master_output(), 1.0);
    }

    #[test]
    fn channel_gain_applies_after_effects() {
        let mut graph = Graph::new();
        let master = graph.master();
        dc(&mut graph, master, 1.0);
        let plus = graph.insert_effect(Box::new(Scaler(3.0)));
        graph.add_effect(master, plus);
        graph.channel_mut(master).unwrap().set_gain(0.5);
        assert_eq!(graph.master_output(), 1.5);
    }

    #[test]
    fn self_routing_is_rejected() {
        let mut graph = Graph::new();
        let ch = graph.create_channel();
        graph.add_channel(graph.master(), ch);
        assert!(!graph.add_channel(ch, ch));
        assert!(!graph.add_channel(ch, graph.master()));
    }

    #[test]
    fn deep_cycle_is_rejected() {
        let mut graph = Graph::new();
        let a = graph.create_channel();
        let b = graph.create_channel();
        let c = graph.create_channel();
        assert!(graph.add_channel(graph.master(), a));
        assert!(graph.add_channel(a, b));
        assert!(graph.add_channel(b, c));
        assert!(!graph.add_channel(c, a));
    }

    #[test]
    fn reparenting_moves_the_channel() {
        let mut graph = Graph::new();
        let a = graph.create_channel();
        let b = graph.create_channel();
        let child = graph.create_channel();
        graph.add_channel(graph.master(), a);
        graph.add_channel(graph.master(), b);
        assert!(graph.add_channel(a, child));
        assert!(graph.add_channel(b, child));
        assert!(!graph.channel(a).unwrap().subchannels().contains(child));
        assert!(graph.channel(b).unwrap().subchannels().contains(child));
        assert_eq!(graph.channel(child).unwrap().parent(), Some(b));
    }

    #[test]
    fn detached_subtree_is_not_rendered() {
        let mut graph = Graph::new();
        let sub = graph.create_channel();
        graph.add_channel(graph.master(), sub);
        dc(&mut graph, sub, 1.0);
        assert_eq!(graph.master_output(), 1.0);
        graph.detach_channel(sub);
        assert_eq!(graph.master_output(), 0.0);
        // Subtree is intact; rerouting brings it back.
        assert!(graph.add_channel(graph.master(), sub));
        assert_eq!(graph.master_output(), 1.0);
    }

    #[test]
    fn destroy_channel_orphans_members() {
        let mut graph = Graph::new();
        let sub = graph.create_channel();
        let leaf = graph.create_channel();
        graph.add_channel(graph.master(), sub);
        graph.add_channel(sub, leaf);
        let inst = dc(&mut graph, sub, 1.0);
        graph.destroy_channel(sub);
        assert!(graph.channel(sub).is_none());
        assert_eq!(graph.channel(leaf).unwrap().parent(), None);
        assert_eq!(graph.instrument_parent(inst), None);
        // The instrument itself survives.
        assert!(graph.instrument_mut(inst).is_some());
        assert_eq!(graph.master_output(), 0.0);
    }

    #[test]
    fn master_cannot_be_destroyed() {
        let mut graph = Graph::new();
        let master = graph.master();
        graph.destroy_channel(master);
        assert!(graph.channel(master).is_some());
    }

    #[test]
    fn destroy_instrument_unroutes_it() {
        let mut graph = Graph::new();
        let master = graph.master();
        let key = dc(&mut graph, master, 1.0);
        graph.destroy_instrument(key);
        assert!(graph.instrument_mut(key).is_none());
        assert!(graph.channel(master).unwrap().instruments().is_empty());
        assert_eq!(graph.master_output(), 0.0);
    }

    #[test]
    fn destroyed_key_lookup_is_none_after_slot_reuse() {
        let mut graph = Graph::new();
        let master = graph.master();
        let old = dc(&mut graph, master, 1.0);
        graph.destroy_instrument(old);
        let new = dc(&mut graph, master, 0.5);
        assert!(graph.instrument_mut(old).is_none());
        assert!(graph.instrument_mut(new).is_some());
    }

    #[test]
    fn duplicate_instrument_routing_is_rejected() {
        let mut graph = Graph::new();
        let master = graph.master();
        let key = dc(&mut graph, master, 0.5);
        assert!(graph.add_instrument(master, key));
        assert_eq!(graph.channel(master).unwrap().instruments().len(), 1);
        assert_eq!(graph.master_output(), 0.5);
    }
}
