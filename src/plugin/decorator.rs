//! Thread-safe wrapper around one hosted plugin.
//!
//! Structural state (bus counts, MIDI settings) only changes through `&mut`
//! access, which the graph grants under the plugin write lock. The render
//! thread reaches the handle and the CC-learn state through `try_lock` and
//! passes the block through untouched when it cannot get them. Readers on
//! the control thread lock the handle only for as long as a query takes.

use parking_lot::Mutex;

use super::hosted::{HostedPlugin, ProcessContext, buses};
use crate::buffer::{AudioBuffer, MidiBuffer};
use crate::config::RenderConfig;
use crate::events::MidiMessage;
use crate::graph::PluginState;

pub const CC_COUNT: usize = 128;

struct DecoratorCore {
    plugin: Option<Box<dyn HostedPlugin>>,
    cc_links: [Option<usize>; CC_COUNT],
    listening: Option<usize>,
    staged: Vec<(usize, f32)>,
    scratch: AudioBuffer,
}

pub struct PluginDecorator {
    core: Mutex<DecoratorCore>,
    bus_channels: usize,
    input_buses: usize,
    output_buses: usize,
    midi_channel: u8,
    strip_cc: bool,
    strip_midi_output: bool,
}

impl std::fmt::Debug for PluginDecorator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDecorator")
            .field("bus_channels", &self.bus_channels)
            .field("input_buses", &self.input_buses)
            .field("output_buses", &self.output_buses)
            .field("midi_channel", &self.midi_channel)
            .finish_non_exhaustive()
    }
}

impl PluginDecorator {
    pub fn new(bus_channels: usize, input_buses: usize) -> Self {
        Self {
            core: Mutex::new(DecoratorCore {
                plugin: None,
                cc_links: [None; CC_COUNT],
                listening: None,
                staged: Vec::with_capacity(CC_COUNT),
                scratch: AudioBuffer::default(),
            }),
            bus_channels,
            input_buses,
            output_buses: 1,
            midi_channel: 0,
            strip_cc: false,
            strip_midi_output: false,
        }
    }

    pub fn has_plugin(&self) -> bool {
        self.core.lock().plugin.is_some()
    }

    pub fn plugin_identifier(&self) -> Option<String> {
        self.core.lock().plugin.as_ref().map(|p| p.identifier())
    }

    pub fn input_buses(&self) -> usize {
        self.input_buses
    }

    pub fn output_buses(&self) -> usize {
        self.output_buses
    }

    fn buses_mut(&mut self, is_input: bool) -> &mut usize {
        if is_input {
            &mut self.input_buses
        } else {
            &mut self.output_buses
        }
    }

    /// Replace the hosted handle. The new plugin is prepared before it becomes
    /// visible and the decorator's buses follow its native layout.
    pub fn set_plugin(
        &mut self,
        plugin: Option<Box<dyn HostedPlugin>>,
        render: &RenderConfig,
    ) -> Option<Box<dyn HostedPlugin>> {
        let mut plugin = plugin;
        if let Some(p) = plugin.as_mut() {
            p.prepare(render.sample_rate, render.block_size);
            p.set_realtime(render.realtime);
        }
        let core = self.core.get_mut();
        let previous = std::mem::replace(&mut core.plugin, plugin);
        core.staged.clear();
        self.follow_plugin_buses();
        self.prepare(render);
        previous
    }

    pub fn prepare(&mut self, render: &RenderConfig) {
        let channels = self.input_buses.max(self.output_buses) * self.bus_channels;
        let core = self.core.get_mut();
        core.scratch.set_size(channels, render.block_size);
        if let Some(plugin) = core.plugin.as_mut() {
            plugin.prepare(render.sample_rate, render.block_size);
            plugin.set_realtime(render.realtime);
        }
    }

    /// Pull the plugin toward the decorator's bus counts, one bus at a time.
    /// Returns whether the plugin now matches in both directions.
    pub fn fit_plugin_to_decorator(&mut self) -> bool {
        let (inputs, outputs) = (self.input_buses, self.output_buses);
        let Some(plugin) = self.core.get_mut().plugin.as_mut() else {
            return true;
        };
        for (is_input, want) in [(true, inputs), (false, outputs)] {
            loop {
                let have = buses(plugin.as_ref(), is_input);
                if have == want {
                    break;
                }
                let accepted = if have < want {
                    plugin.add_bus(is_input)
                } else {
                    plugin.remove_bus(is_input)
                };
                if !accepted || buses(plugin.as_ref(), is_input) == have {
                    break;
                }
            }
        }
        plugin.input_buses() == inputs && plugin.output_buses() == outputs
    }

    /// Adopt the plugin's native bus counts.
    pub fn follow_plugin_buses(&mut self) {
        let Some((inputs, outputs)) = self
            .core
            .get_mut()
            .plugin
            .as_ref()
            .map(|p| (p.input_buses(), p.output_buses()))
        else {
            return;
        };
        for (is_input, target) in [(true, inputs), (false, outputs)] {
            *self.buses_mut(is_input) = target;
        }
    }

    /// Move the input bus count toward `wanted` one bus at a time, asking the
    /// plugin to follow each step. Stops where the plugin refuses, leaving the
    /// decorator clamped to what the plugin supports.
    pub fn clamp_to_plugin(&mut self, wanted: usize) {
        while self.input_buses != wanted {
            let previous = self.input_buses;
            if previous < wanted {
                self.input_buses += 1;
            } else {
                self.input_buses -= 1;
            }
            if !self.fit_plugin_to_decorator() {
                self.input_buses = previous;
                self.fit_plugin_to_decorator();
                break;
            }
        }
    }

    pub fn set_bus_channels(&mut self, channels: usize) {
        self.bus_channels = channels;
    }

    pub fn midi_channel(&self) -> u8 {
        self.midi_channel
    }

    /// 0 passes every channel, 1..=16 restricts to that channel.
    pub fn set_midi_channel(&mut self, channel: u8) {
        self.midi_channel = channel.min(16);
    }

    pub fn set_strip_cc(&mut self, strip: bool) {
        self.strip_cc = strip;
    }

    pub fn set_strip_midi_output(&mut self, strip: bool) {
        self.strip_midi_output = strip;
    }

    pub fn cc_link(&self, controller: u8) -> Option<usize> {
        self.core.lock().cc_links[(controller & 0x7f) as usize]
    }

    pub fn set_cc_link(&mut self, controller: u8, parameter: Option<usize>) {
        self.core.get_mut().cc_links[(controller & 0x7f) as usize] = parameter;
    }

    /// Bind `parameter` to the next CC that reaches this decorator.
    pub fn listen_cc(&mut self, parameter: usize) {
        self.core.get_mut().listening = Some(parameter);
    }

    pub fn is_listening(&self) -> bool {
        self.core.lock().listening.is_some()
    }

    pub(crate) fn process(
        &self,
        audio: &mut AudioBuffer,
        midi: &mut MidiBuffer,
        ctx: &ProcessContext,
    ) {
        if self.midi_channel != 0 {
            let channel = self.midi_channel;
            midi.retain(|e| e.message.channel().is_none_or(|c| c == channel));
        }

        let Some(mut guard) = self.core.try_lock() else {
            if self.strip_cc {
                midi.retain(|e| !e.message.is_control_change());
            }
            return;
        };
        let DecoratorCore {
            plugin,
            cc_links,
            listening,
            staged,
            scratch,
        } = &mut *guard;

        staged.clear();
        for event in midi.iter() {
            if let MidiMessage::ControlChange {
                controller, value, ..
            } = event.message
            {
                let cc = (controller & 0x7f) as usize;
                if let Some(parameter) = listening.take() {
                    cc_links[cc] = Some(parameter);
                }
                if let Some(parameter) = cc_links[cc] {
                    if staged.len() < staged.capacity() {
                        staged.push((parameter, value as f32 / 127.0));
                    }
                }
            }
        }

        if self.strip_cc {
            midi.retain(|e| !e.message.is_control_change());
        }

        let Some(plugin) = plugin.as_mut() else {
            return;
        };

        let parameters = plugin.parameter_count();
        for &(index, value) in staged.iter().filter(|(i, _)| *i < parameters) {
            plugin.begin_gesture(index);
            plugin.set_parameter(index, value);
        }

        let in_channels = self.input_buses * self.bus_channels;
        let out_channels = self.output_buses * self.bus_channels;
        let plugin_channels = in_channels.max(out_channels);
        if plugin_channels == audio.num_channels() {
            plugin.process(audio, midi, ctx);
        } else {
            scratch.set_size(plugin_channels, audio.num_frames());
            for ch in 0..in_channels.min(audio.num_channels()) {
                scratch.copy_from(ch, 0, audio.channel(ch));
            }
            plugin.process(scratch, midi, ctx);
            for ch in 0..out_channels.min(audio.num_channels()) {
                audio.copy_from(ch, 0, scratch.channel(ch));
            }
        }

        for &(index, _) in staged.iter().filter(|(i, _)| *i < parameters) {
            plugin.end_gesture(index);
        }

        if self.strip_midi_output {
            midi.clear();
        }
    }

    pub fn serialize(&self, bypassed: bool) -> PluginState {
        let core = self.core.lock();
        PluginState {
            identifier: core.plugin.as_ref().map(|p| p.identifier()),
            state: core.plugin.as_ref().map(|p| p.state()).unwrap_or_default(),
            bypassed,
            input_buses: self.input_buses,
            output_buses: self.output_buses,
            midi_channel: self.midi_channel,
            strip_cc: self.strip_cc,
            strip_midi_output: self.strip_midi_output,
            cc_links: core
                .cc_links
                .iter()
                .enumerate()
                .filter_map(|(cc, p)| p.map(|p| (cc as u8, p)))
                .collect(),
        }
    }

    /// Apply everything but the plugin handle, which the caller resolves.
    pub fn parse(&mut self, state: &PluginState) {
        self.input_buses = state.input_buses;
        self.output_buses = state.output_buses;
        self.midi_channel = state.midi_channel.min(16);
        self.strip_cc = state.strip_cc;
        self.strip_midi_output = state.strip_midi_output;
        let core = self.core.get_mut();
        core.cc_links = [None; CC_COUNT];
        for &(cc, parameter) in &state.cc_links {
            core.cc_links[(cc & 0x7f) as usize] = Some(parameter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MidiEvent;
    use std::sync::Arc;

    #[derive(Default)]
    struct Log {
        gestures: Vec<String>,
        seen: Vec<MidiMessage>,
        channels: usize,
    }

    struct Probe {
        log: Arc<Mutex<Log>>,
        inputs: usize,
        outputs: usize,
        max_inputs: usize,
    }

    impl Probe {
        fn new(inputs: usize, outputs: usize, max_inputs: usize) -> (Self, Arc<Mutex<Log>>) {
            let log = Arc::new(Mutex::new(Log::default()));
            (
                Self {
                    log: log.clone(),
                    inputs,
                    outputs,
                    max_inputs,
                },
                log,
            )
        }
    }

    impl HostedPlugin for Probe {
        fn identifier(&self) -> String {
            "probe".into()
        }
        fn input_buses(&self) -> usize {
            self.inputs
        }
        fn output_buses(&self) -> usize {
            self.outputs
        }
        fn add_bus(&mut self, is_input: bool) -> bool {
            if is_input && self.inputs < self.max_inputs {
                self.inputs += 1;
                true
            } else {
                false
            }
        }
        fn remove_bus(&mut self, is_input: bool) -> bool {
            if is_input && self.inputs > 1 {
                self.inputs -= 1;
                true
            } else {
                false
            }
        }
        fn prepare(&mut self, _sample_rate: f64, _block_size: usize) {}
        fn parameter_count(&self) -> usize {
            4
        }
        fn begin_gesture(&mut self, index: usize) {
            self.log.lock().gestures.push(format!("begin {index}"));
        }
        fn set_parameter(&mut self, index: usize, value: f32) {
            self.log.lock().gestures.push(format!("set {index} {value:.3}"));
        }
        fn end_gesture(&mut self, index: usize) {
            self.log.lock().gestures.push(format!("end {index}"));
        }
        fn process(&mut self, audio: &mut AudioBuffer, midi: &mut MidiBuffer, _ctx: &ProcessContext) {
            let mut log = self.log.lock();
            log.channels = audio.num_channels();
            log.seen.extend(midi.iter().map(|e| e.message));
            midi.add(MidiEvent::new(0, MidiMessage::Continue));
        }
    }

    fn ctx() -> ProcessContext {
        ProcessContext {
            sample_rate: 48000.0,
            block_size: 16,
            realtime: true,
            play_head: Default::default(),
        }
    }

    fn cc(channel: u8, controller: u8, value: u8) -> MidiEvent {
        MidiEvent::new(
            0,
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            },
        )
    }

    #[test]
    fn channel_filter_and_cc_learn() {
        let (probe, log) = Probe::new(1, 1, 1);
        let mut deco = PluginDecorator::new(2, 1);
        deco.set_plugin(Some(Box::new(probe)), &RenderConfig::default());
        deco.set_midi_channel(2);
        deco.listen_cc(3);

        let mut audio = AudioBuffer::new(2, 16);
        let mut midi = MidiBuffer::new();
        midi.add(cc(1, 10, 127));
        midi.add(cc(2, 11, 127));
        midi.add(cc(2, 12, 0));
        deco.process(&mut audio, &mut midi, &ctx());

        assert_eq!(deco.cc_link(11), Some(3));
        assert_eq!(deco.cc_link(10), None);
        assert_eq!(deco.cc_link(12), None);
        assert!(!deco.is_listening());
        let log = log.lock();
        assert_eq!(log.gestures, vec!["begin 3", "set 3 1.000", "end 3"]);
        assert_eq!(log.seen.len(), 2);
    }

    #[test]
    fn strips_cc_and_plugin_output() {
        let (probe, log) = Probe::new(1, 1, 1);
        let mut deco = PluginDecorator::new(2, 1);
        deco.set_plugin(Some(Box::new(probe)), &RenderConfig::default());
        deco.set_strip_cc(true);
        deco.set_strip_midi_output(true);

        let mut audio = AudioBuffer::new(2, 16);
        let mut midi = MidiBuffer::new();
        midi.add(cc(1, 7, 64));
        midi.add(MidiEvent::new(
            3,
            MidiMessage::NoteOn {
                channel: 1,
                pitch: 60,
                velocity: 90,
            },
        ));
        deco.process(&mut audio, &mut midi, &ctx());

        assert_eq!(log.lock().seen.len(), 1);
        assert!(midi.is_empty());
    }

    #[test]
    fn contention_skips_the_plugin() {
        let (probe, log) = Probe::new(1, 1, 1);
        let mut deco = PluginDecorator::new(2, 1);
        deco.set_plugin(Some(Box::new(probe)), &RenderConfig::default());

        let held = deco.core.lock();
        let mut audio = AudioBuffer::new(2, 16);
        let mut midi = MidiBuffer::new();
        midi.add(cc(1, 7, 64));
        deco.process(&mut audio, &mut midi, &ctx());
        drop(held);

        assert!(log.lock().seen.is_empty());
        assert_eq!(midi.len(), 1);
    }

    #[test]
    fn set_plugin_follows_native_buses() {
        let (probe, _) = Probe::new(3, 2, 3);
        let mut deco = PluginDecorator::new(2, 1);
        deco.set_plugin(Some(Box::new(probe)), &RenderConfig::default());
        assert_eq!((deco.input_buses(), deco.output_buses()), (3, 2));
    }

    #[test]
    fn clamp_stops_at_plugin_capability() {
        let (probe, log) = Probe::new(1, 1, 2);
        let mut deco = PluginDecorator::new(2, 1);
        deco.set_plugin(Some(Box::new(probe)), &RenderConfig::default());

        deco.clamp_to_plugin(4);
        assert_eq!(deco.input_buses(), 2);

        let mut audio = AudioBuffer::new(8, 16);
        let mut midi = MidiBuffer::new();
        deco.process(&mut audio, &mut midi, &ctx());
        assert_eq!(log.lock().channels, 4);

        deco.clamp_to_plugin(1);
        assert_eq!(deco.input_buses(), 1);
    }

    #[test]
    fn empty_decorator_takes_any_bus_count() {
        let mut deco = PluginDecorator::new(2, 1);
        deco.clamp_to_plugin(3);
        assert_eq!(deco.input_buses(), 3);
    }

    #[test]
    fn serialize_keeps_links() {
        let mut deco = PluginDecorator::new(2, 1);
        deco.set_cc_link(74, Some(2));
        deco.set_midi_channel(5);
        let state = deco.serialize(true);
        assert!(state.bypassed);
        assert_eq!(state.cc_links, vec![(74, 2)]);

        let mut other = PluginDecorator::new(2, 1);
        other.parse(&state);
        assert_eq!(other.cc_link(74), Some(2));
        assert_eq!(other.midi_channel(), 5);
    }
}
