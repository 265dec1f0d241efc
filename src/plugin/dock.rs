use std::collections::HashMap;

use super::decorator::PluginDecorator;
use super::hosted::{HostedPlugin, PluginLoader, ProcessContext};
use crate::buffer::{AudioBuffer, MidiBuffer};
use crate::config::RenderConfig;
use crate::graph::NodeId;
use crate::graph::PluginState;
use crate::{GraphError, Result};

#[derive(Debug)]
struct DockSlot {
    decorator: PluginDecorator,
    bypassed: bool,
}

/// Ordered effect chain of one track. Every slot processes the track's full
/// bus (main plus side-chains) in place.
#[derive(Debug)]
pub struct PluginDock {
    slots: Vec<DockSlot>,
    bus_channels: usize,
    buses: usize,
}

impl PluginDock {
    pub fn new(bus_channels: usize) -> Self {
        Self {
            slots: Vec::new(),
            bus_channels,
            buses: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn buses(&self) -> usize {
        self.buses
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut DockSlot> {
        let len = self.slots.len();
        self.slots
            .get_mut(index)
            .ok_or(GraphError::index("plugin", index, len))
    }

    /// Insert an empty slot at `index`; later slots shift down the chain.
    pub fn insert_plugin(&mut self, index: usize, render: &RenderConfig) -> Result<()> {
        if index > self.slots.len() {
            return Err(GraphError::index("plugin", index, self.slots.len()));
        }
        let mut decorator = PluginDecorator::new(self.bus_channels, self.buses);
        decorator.prepare(render);
        self.slots.insert(
            index,
            DockSlot {
                decorator,
                bypassed: false,
            },
        );
        Ok(())
    }

    pub fn remove_plugin(&mut self, index: usize) -> Result<PluginDecorator> {
        if index >= self.slots.len() {
            return Err(GraphError::index("plugin", index, self.slots.len()));
        }
        Ok(self.slots.remove(index).decorator)
    }

    /// Hot-swap the handle in slot `index`, returning the previous one.
    pub fn set_plugin(
        &mut self,
        index: usize,
        plugin: Option<Box<dyn HostedPlugin>>,
        render: &RenderConfig,
    ) -> Result<Option<Box<dyn HostedPlugin>>> {
        let buses = self.buses;
        let slot = self.slot_mut(index)?;
        let previous = slot.decorator.set_plugin(plugin, render);
        slot.decorator.clamp_to_plugin(buses);
        slot.decorator.prepare(render);
        Ok(previous)
    }

    pub fn set_bypass(&mut self, index: usize, bypassed: bool) -> Result<()> {
        self.slot_mut(index)?.bypassed = bypassed;
        Ok(())
    }

    pub fn is_bypassed(&self, index: usize) -> Option<bool> {
        self.slots.get(index).map(|s| s.bypassed)
    }

    pub fn decorator_mut(&mut self, index: usize) -> Result<&mut PluginDecorator> {
        Ok(&mut self.slot_mut(index)?.decorator)
    }

    pub fn decorator(&self, index: usize) -> Option<&PluginDecorator> {
        self.slots.get(index).map(|s| &s.decorator)
    }

    /// Track side-chain count changed: every slot re-clamps to the new width.
    pub fn set_buses(&mut self, buses: usize, render: &RenderConfig) {
        self.buses = buses;
        for slot in &mut self.slots {
            slot.decorator.clamp_to_plugin(buses);
            slot.decorator.prepare(render);
        }
    }

    pub fn prepare(&mut self, render: &RenderConfig) {
        for slot in &mut self.slots {
            slot.decorator.prepare(render);
        }
    }

    pub(crate) fn process(&self, audio: &mut AudioBuffer, midi: &mut MidiBuffer, ctx: &ProcessContext) {
        for slot in self.slots.iter().filter(|s| !s.bypassed) {
            slot.decorator.process(audio, midi, ctx);
        }
    }

    pub fn serialize(&self) -> Vec<PluginState> {
        self.slots
            .iter()
            .map(|s| s.decorator.serialize(s.bypassed))
            .collect()
    }

    /// Rebuild the chain from saved slots. Plugin identifiers are resolved
    /// through `loader`; any identifier it cannot load fails the whole parse.
    pub fn parse(
        &mut self,
        states: &[PluginState],
        loader: Option<&dyn PluginLoader>,
        render: &RenderConfig,
    ) -> Result<()> {
        let mut slots = Vec::with_capacity(states.len());
        for state in states {
            let mut decorator = PluginDecorator::new(self.bus_channels, self.buses);
            if let Some(id) = &state.identifier {
                let mut plugin = loader
                    .and_then(|l| l.load(id))
                    .ok_or_else(|| GraphError::PluginUnavailable(id.clone()))?;
                plugin.set_state(&state.state);
                decorator.set_plugin(Some(plugin), render);
            }
            decorator.parse(state);
            decorator.fit_plugin_to_decorator();
            decorator.prepare(render);
            slots.push(DockSlot {
                decorator,
                bypassed: state.bypassed,
            });
        }
        self.slots = slots;
        Ok(())
    }
}

/// Plugin docks of every track, keyed by track id. Guarded by the plugin
/// lock.
#[derive(Debug, Default)]
pub struct PluginRack {
    docks: HashMap<NodeId, PluginDock>,
}

impl PluginRack {
    pub fn get(&self, track: NodeId) -> Option<&PluginDock> {
        self.docks.get(&track)
    }

    pub fn get_mut(&mut self, track: NodeId) -> Option<&mut PluginDock> {
        self.docks.get_mut(&track)
    }

    pub(crate) fn insert(&mut self, track: NodeId, dock: PluginDock) {
        self.docks.insert(track, dock);
    }

    pub(crate) fn remove(&mut self, track: NodeId) -> Option<PluginDock> {
        self.docks.remove(&track)
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(NodeId) -> bool) {
        self.docks.retain(|id, _| keep(*id));
    }

    pub(crate) fn prepare(&mut self, render: &RenderConfig) {
        for dock in self.docks.values_mut() {
            dock.prepare(render);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MidiEvent, MidiMessage};

    struct Gain(f32);

    impl HostedPlugin for Gain {
        fn identifier(&self) -> String {
            format!("gain:{}", self.0)
        }
        fn input_buses(&self) -> usize {
            1
        }
        fn output_buses(&self) -> usize {
            1
        }
        fn prepare(&mut self, _sample_rate: f64, _block_size: usize) {}
        fn process(&mut self, audio: &mut AudioBuffer, _midi: &mut MidiBuffer, _ctx: &ProcessContext) {
            for ch in 0..audio.num_channels() {
                audio.apply_gain(ch, self.0);
            }
        }
    }

    struct Loader;

    impl PluginLoader for Loader {
        fn load(&self, identifier: &str) -> Option<Box<dyn HostedPlugin>> {
            let gain = identifier.strip_prefix("gain:")?.parse().ok()?;
            Some(Box::new(Gain(gain)))
        }
    }

    fn ctx() -> ProcessContext {
        ProcessContext {
            sample_rate: 48000.0,
            block_size: 4,
            realtime: true,
            play_head: Default::default(),
        }
    }

    fn run(dock: &PluginDock) -> f32 {
        let mut audio = AudioBuffer::new(1, 4);
        audio.channel_mut(0).fill(1.0);
        let mut midi = MidiBuffer::new();
        dock.process(&mut audio, &mut midi, &ctx());
        audio.channel(0)[0]
    }

    fn dock_with(gains: &[f32]) -> PluginDock {
        let render = RenderConfig::default();
        let mut dock = PluginDock::new(1);
        for (i, g) in gains.iter().enumerate() {
            dock.insert_plugin(i, &render).unwrap();
            dock.set_plugin(i, Some(Box::new(Gain(*g))), &render).unwrap();
        }
        dock
    }

    #[test]
    fn chain_applies_in_order_and_bypass_skips() {
        let mut dock = dock_with(&[2.0, 3.0]);
        assert_eq!(run(&dock), 6.0);
        dock.set_bypass(0, true).unwrap();
        assert_eq!(run(&dock), 3.0);
        assert_eq!(dock.is_bypassed(0), Some(true));
        assert_eq!(dock.len(), 2);
    }

    #[test]
    fn insert_and_remove_rewire_the_chain() {
        let render = RenderConfig::default();
        let mut dock = dock_with(&[2.0, 3.0]);
        dock.insert_plugin(1, &render).unwrap();
        dock.set_plugin(1, Some(Box::new(Gain(0.5))), &render).unwrap();
        assert_eq!(run(&dock), 3.0);
        dock.remove_plugin(0).unwrap();
        assert_eq!(run(&dock), 1.5);
        assert!(dock.remove_plugin(5).is_err());
        assert!(dock.insert_plugin(9, &render).is_err());
    }

    #[test]
    fn empty_slot_passes_midi_through() {
        let render = RenderConfig::default();
        let mut dock = PluginDock::new(2);
        dock.insert_plugin(0, &render).unwrap();
        let mut audio = AudioBuffer::new(2, 4);
        let mut midi = MidiBuffer::new();
        midi.add(MidiEvent::new(1, MidiMessage::Start));
        dock.process(&mut audio, &mut midi, &ctx());
        assert_eq!(midi.len(), 1);
    }

    #[test]
    fn parse_restores_plugins_and_bypass() {
        let mut dock = dock_with(&[2.0, 0.25]);
        dock.set_bypass(1, true).unwrap();
        let states = dock.serialize();

        let mut restored = PluginDock::new(1);
        restored
            .parse(&states, Some(&Loader), &RenderConfig::default())
            .unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.is_bypassed(1), Some(true));
        assert_eq!(run(&restored), 2.0);

        let mut missing = PluginDock::new(1);
        assert!(matches!(
            missing.parse(&states, None, &RenderConfig::default()),
            Err(GraphError::PluginUnavailable(_))
        ));
        assert!(missing.is_empty());
    }
}
