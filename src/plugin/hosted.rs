use crate::buffer::{AudioBuffer, MidiBuffer};

/// Transport view handed to plugins with every block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayHead {
    pub position: i64,
    pub seconds: f64,
    pub playing: bool,
    pub recording: bool,
    pub looping: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessContext {
    pub sample_rate: f64,
    pub block_size: usize,
    pub realtime: bool,
    pub play_head: PlayHead,
}

/// An instantiated effect or instrument, supplied already loaded by the
/// plugin catalog.
///
/// Bus counts are in buses of the owning track's width. Hosts are not
/// required to let the engine resize them; the `add_bus`/`remove_bus`
/// defaults refuse.
pub trait HostedPlugin: Send {
    fn identifier(&self) -> String;

    fn input_buses(&self) -> usize;

    fn output_buses(&self) -> usize;

    fn add_bus(&mut self, _is_input: bool) -> bool {
        false
    }

    fn remove_bus(&mut self, _is_input: bool) -> bool {
        false
    }

    fn prepare(&mut self, sample_rate: f64, block_size: usize);

    fn set_realtime(&mut self, _realtime: bool) {}

    fn parameter_count(&self) -> usize {
        0
    }

    fn begin_gesture(&mut self, _index: usize) {}

    fn set_parameter(&mut self, _index: usize, _value: f32) {}

    fn end_gesture(&mut self, _index: usize) {}

    fn process(&mut self, audio: &mut AudioBuffer, midi: &mut MidiBuffer, ctx: &ProcessContext);

    fn state(&self) -> Vec<u8> {
        Vec::new()
    }

    fn set_state(&mut self, _state: &[u8]) {}
}

/// Resolves plugin identifiers when a project is parsed.
pub trait PluginLoader {
    fn load(&self, identifier: &str) -> Option<Box<dyn HostedPlugin>>;
}

pub(crate) fn buses(plugin: &dyn HostedPlugin, is_input: bool) -> usize {
    if is_input {
        plugin.input_buses()
    } else {
        plugin.output_buses()
    }
}
