use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audio::{SequencerSourceNode, TrackNode};

/// Stable node identity. Never reused within one graph, so a connection
/// keeps naming the same node however positions shift around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) const AUDIO_IN: NodeId = NodeId(0);
    pub(crate) const AUDIO_OUT: NodeId = NodeId(1);
    pub(crate) const MIDI_IN: NodeId = NodeId(2);
    pub(crate) const MIDI_OUT: NodeId = NodeId(3);
    pub(crate) const RECORDER: NodeId = NodeId(4);
    /// First id handed out to sources and tracks.
    pub(crate) const FIRST_DYNAMIC: u32 = 5;

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Channel layout of a node: a main bus plus side-chain buses of the same
/// width. Outputs only carry the main bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusShape {
    pub channels: usize,
    pub sidechains: usize,
}

impl BusShape {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            sidechains: 0,
        }
    }

    #[inline]
    pub fn buses(&self) -> usize {
        1 + self.sidechains
    }

    #[inline]
    pub fn input_channels(&self) -> usize {
        self.channels * self.buses()
    }

    #[inline]
    pub fn output_channels(&self) -> usize {
        self.channels
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    AudioInput,
    AudioOutput,
    MidiInput,
    MidiOutput,
}

/// Device-side endpoint. MIDI endpoints have a single channel 0.
#[derive(Debug, Clone)]
pub struct IoNode {
    pub(crate) id: NodeId,
    pub(crate) kind: IoKind,
    pub(crate) channels: usize,
}

impl IoNode {
    pub(crate) fn new(id: NodeId, kind: IoKind, channels: usize) -> Self {
        Self { id, kind, channels }
    }

    pub fn kind(&self) -> IoKind {
        self.kind
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

#[derive(Debug)]
pub enum Node {
    Source(SequencerSourceNode),
    Track(TrackNode),
    Io(IoNode),
    /// Capture point fed from the audio input.
    Recorder { id: NodeId, channels: usize },
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Node::Source(source) => source.id(),
            Node::Track(track) => track.id(),
            Node::Io(io) => io.id,
            Node::Recorder { id, .. } => *id,
        }
    }

    pub fn shape(&self) -> BusShape {
        match self {
            Node::Source(source) => BusShape::new(source.channels()),
            Node::Track(track) => track.shape(),
            Node::Io(io) => BusShape::new(io.channels),
            Node::Recorder { channels, .. } => BusShape::new(*channels),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Source(_) => "source",
            Node::Track(_) => "track",
            Node::Io(_) => "io",
            Node::Recorder { .. } => "recorder",
        }
    }
}
