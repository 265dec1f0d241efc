//! The six independent locks shared by the render callback and the control
//! thread.
//!
//! Each lock owns the data of one concern. The control thread takes them as
//! blocking reads or writes, one at a time. The render callback only ever
//! tries them and drops the whole block when any attempt fails. A busy level
//! lock only skips that block's meter update.

use parking_lot::RwLock;

use crate::audio::ControlParams;
use crate::buffer::AudioBuffer;
use crate::graph::Topology;
use crate::plugin::PluginRack;
use crate::timing::SourceLists;
use crate::transport::TransportState;

/// Per-output-channel RMS of the most recent rendered block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelSnapshot {
    rms: Vec<f32>,
}

impl LevelSnapshot {
    pub fn new(channels: usize) -> Self {
        Self {
            rms: vec![0.0; channels],
        }
    }

    pub fn channels(&self) -> usize {
        self.rms.len()
    }

    pub fn rms(&self, channel: usize) -> Option<f32> {
        self.rms.get(channel).copied()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.rms
    }

    pub(crate) fn resize(&mut self, channels: usize) {
        self.rms.clear();
        self.rms.resize(channels, 0.0);
    }

    pub(crate) fn update(&mut self, audio: &AudioBuffer) {
        for (ch, level) in self.rms.iter_mut().enumerate() {
            *level = audio.rms(ch);
        }
    }

    pub(crate) fn silence(&mut self) {
        self.rms.fill(0.0);
    }
}

#[derive(Debug)]
pub struct LockDomain {
    graph: RwLock<Topology>,
    sources: RwLock<SourceLists>,
    plugins: RwLock<PluginRack>,
    position: RwLock<TransportState>,
    control: RwLock<ControlParams>,
    levels: RwLock<LevelSnapshot>,
}

impl LockDomain {
    pub(crate) fn new(topology: Topology, transport: TransportState) -> Self {
        let outputs = topology.output_channels();
        Self {
            graph: RwLock::new(topology),
            sources: RwLock::new(SourceLists::default()),
            plugins: RwLock::new(PluginRack::default()),
            position: RwLock::new(transport),
            control: RwLock::new(ControlParams::default()),
            levels: RwLock::new(LevelSnapshot::new(outputs)),
        }
    }

    /// Node arena, connections and record tasks.
    pub fn graph(&self) -> &RwLock<Topology> {
        &self.graph
    }

    /// Scheduled blocks of every source.
    pub fn sources(&self) -> &RwLock<SourceLists> {
        &self.sources
    }

    /// Plugin docks of every track.
    pub fn plugins(&self) -> &RwLock<PluginRack> {
        &self.plugins
    }

    /// Transport play-head.
    pub fn position(&self) -> &RwLock<TransportState> {
        &self.position
    }

    /// Track fader settings.
    pub fn control(&self) -> &RwLock<ControlParams> {
        &self.control
    }

    pub fn levels(&self) -> &RwLock<LevelSnapshot> {
        &self.levels
    }
}
