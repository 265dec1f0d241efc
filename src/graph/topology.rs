//! Node arena and connection set, guarded by the graph-structure lock.

use std::collections::HashMap;

use super::connection::{Connection, ConnectionKind, Endpoint, Link};
use super::node::{BusShape, IoKind, IoNode, Node, NodeId};
use crate::audio::{RecordingPipeline, SequencerSourceNode, TrackNode};
use crate::config::RenderConfig;
use crate::{GraphError, Result};

#[derive(Debug)]
pub struct Topology {
    nodes: HashMap<NodeId, Node>,
    sources: Vec<NodeId>,
    tracks: Vec<NodeId>,
    connections: Vec<Connection>,
    /// Tracks in dependency order along track-to-track edges.
    order: Vec<NodeId>,
    recorder: RecordingPipeline,
    render: RenderConfig,
}

impl Topology {
    pub(crate) fn new(inputs: usize, outputs: usize, render: RenderConfig) -> Self {
        let mut nodes = HashMap::new();
        for (id, kind, channels) in [
            (NodeId::AUDIO_IN, IoKind::AudioInput, inputs),
            (NodeId::AUDIO_OUT, IoKind::AudioOutput, outputs),
            (NodeId::MIDI_IN, IoKind::MidiInput, 1),
            (NodeId::MIDI_OUT, IoKind::MidiOutput, 1),
        ] {
            nodes.insert(id, Node::Io(IoNode::new(id, kind, channels)));
        }
        nodes.insert(
            NodeId::RECORDER,
            Node::Recorder {
                id: NodeId::RECORDER,
                channels: inputs,
            },
        );
        Self {
            nodes,
            sources: Vec::new(),
            tracks: Vec::new(),
            connections: Vec::new(),
            order: Vec::new(),
            recorder: RecordingPipeline::default(),
            render,
        }
    }

    pub fn render_config(&self) -> &RenderConfig {
        &self.render
    }

    pub(crate) fn set_render_config(&mut self, render: RenderConfig) {
        self.render = render;
    }

    pub fn input_channels(&self) -> usize {
        self.io_channels(NodeId::AUDIO_IN)
    }

    pub fn output_channels(&self) -> usize {
        self.io_channels(NodeId::AUDIO_OUT)
    }

    fn io_channels(&self, id: NodeId) -> usize {
        self.nodes.get(&id).map_or(0, |n| n.shape().channels)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn source(&self, id: NodeId) -> Option<&SequencerSourceNode> {
        match self.nodes.get(&id) {
            Some(Node::Source(source)) => Some(source),
            _ => None,
        }
    }

    pub fn track(&self, id: NodeId) -> Option<&TrackNode> {
        match self.nodes.get(&id) {
            Some(Node::Track(track)) => Some(track),
            _ => None,
        }
    }

    fn track_mut(&mut self, id: NodeId) -> Option<&mut TrackNode> {
        match self.nodes.get_mut(&id) {
            Some(Node::Track(track)) => Some(track),
            _ => None,
        }
    }

    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    pub fn tracks(&self) -> &[NodeId] {
        &self.tracks
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn render_order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn recorder(&self) -> &RecordingPipeline {
        &self.recorder
    }

    pub(crate) fn recorder_mut(&mut self) -> &mut RecordingPipeline {
        &mut self.recorder
    }

    pub fn source_at(&self, index: usize) -> Result<NodeId> {
        self.sources
            .get(index)
            .copied()
            .ok_or(GraphError::index("source", index, self.sources.len()))
    }

    pub fn track_at(&self, index: usize) -> Result<NodeId> {
        self.tracks
            .get(index)
            .copied()
            .ok_or(GraphError::index("track", index, self.tracks.len()))
    }

    pub(crate) fn insert_source(&mut self, index: usize, source: SequencerSourceNode) -> Result<()> {
        if index > self.sources.len() {
            return Err(GraphError::index("source", index, self.sources.len()));
        }
        self.sources.insert(index, source.id());
        self.nodes.insert(source.id(), Node::Source(source));
        Ok(())
    }

    pub(crate) fn insert_track(&mut self, index: usize, track: TrackNode) -> Result<()> {
        if index > self.tracks.len() {
            return Err(GraphError::index("track", index, self.tracks.len()));
        }
        self.tracks.insert(index, track.id());
        self.nodes.insert(track.id(), Node::Track(track));
        self.resort();
        Ok(())
    }

    pub(crate) fn remove_source(&mut self, index: usize) -> Result<NodeId> {
        let id = self.source_at(index)?;
        self.sources.remove(index);
        self.detach(id);
        Ok(id)
    }

    pub(crate) fn remove_track(&mut self, index: usize) -> Result<NodeId> {
        let id = self.track_at(index)?;
        self.tracks.remove(index);
        self.detach(id);
        self.resort();
        Ok(id)
    }

    /// Swap in a re-shaped source under the same id. Edges that no longer fit
    /// are dropped.
    pub(crate) fn replace_source(&mut self, source: SequencerSourceNode) -> usize {
        if !self.sources.contains(&source.id()) {
            return 0;
        }
        self.nodes.insert(source.id(), Node::Source(source));
        self.prune()
    }

    fn detach(&mut self, id: NodeId) {
        self.nodes.remove(&id);
        self.connections.retain(|c| !c.touches(id));
    }

    fn endpoint_id(&self, endpoint: Endpoint, index: usize) -> Result<NodeId> {
        match endpoint {
            Endpoint::Source => self.source_at(index),
            Endpoint::Track => self.track_at(index),
            device => {
                if index != 0 {
                    return Err(GraphError::index("device endpoint", index, 1));
                }
                Ok(match device {
                    Endpoint::AudioInput => NodeId::AUDIO_IN,
                    Endpoint::AudioOutput => NodeId::AUDIO_OUT,
                    Endpoint::MidiInput => NodeId::MIDI_IN,
                    _ => NodeId::MIDI_OUT,
                })
            }
        }
    }

    fn endpoint_index(&self, endpoint: Endpoint, id: NodeId) -> Option<usize> {
        match endpoint {
            Endpoint::Source => self.sources.iter().position(|s| *s == id),
            Endpoint::Track => self.tracks.iter().position(|t| *t == id),
            _ => Some(0),
        }
    }

    /// Turn a positional link into a stored connection, checking that both
    /// channels fit the current bus shapes.
    pub fn resolve(&self, link: &Link) -> Result<Connection> {
        let (src_kind, dst_kind) = link.kind.endpoints();
        let connection = Connection {
            kind: link.kind,
            src: self.endpoint_id(src_kind, link.src)?,
            src_channel: link.src_channel,
            dst: self.endpoint_id(dst_kind, link.dst)?,
            dst_channel: link.dst_channel,
        };
        self.validate(&connection)?;
        Ok(connection)
    }

    /// Positional view of a stored connection.
    pub fn link_of(&self, connection: &Connection) -> Option<Link> {
        let (src_kind, dst_kind) = connection.kind.endpoints();
        Some(Link {
            kind: connection.kind,
            src: self.endpoint_index(src_kind, connection.src)?,
            src_channel: connection.src_channel,
            dst: self.endpoint_index(dst_kind, connection.dst)?,
            dst_channel: connection.dst_channel,
        })
    }

    pub fn links(&self) -> Vec<Link> {
        self.connections
            .iter()
            .filter_map(|c| self.link_of(c))
            .collect()
    }

    /// Output and input channel counts the given edge kind can address.
    fn channel_limits(&self, connection: &Connection) -> Option<(usize, usize)> {
        if connection.kind.is_midi() {
            self.nodes.get(&connection.src)?;
            self.nodes.get(&connection.dst)?;
            return Some((1, 1));
        }
        let src = self.nodes.get(&connection.src)?.shape().output_channels();
        let dst = match self.nodes.get(&connection.dst)? {
            Node::Track(track) => track.shape().input_channels(),
            other => other.shape().channels,
        };
        Some((src, dst))
    }

    pub(crate) fn validate(&self, connection: &Connection) -> Result<()> {
        let Some((src, dst)) = self.channel_limits(connection) else {
            return Err(GraphError::index("node", connection.src.0 as usize, self.nodes.len()));
        };
        if connection.src_channel >= src {
            return Err(GraphError::InvalidChannel {
                channel: connection.src_channel,
                available: src,
            });
        }
        if connection.dst_channel >= dst {
            return Err(GraphError::InvalidChannel {
                channel: connection.dst_channel,
                available: dst,
            });
        }
        Ok(())
    }

    /// Add `connection` unless already present. Returns whether it was new.
    pub(crate) fn connect(&mut self, connection: Connection) -> Result<bool> {
        self.validate(&connection)?;
        if self.connections.contains(&connection) {
            return Ok(false);
        }
        self.connections.push(connection);
        if connection.kind == ConnectionKind::AudioTrackToTrack {
            match self.sort() {
                Ok(order) => self.order = order,
                Err(err) => {
                    self.connections.pop();
                    return Err(err);
                }
            }
        }
        Ok(true)
    }

    /// Returns whether anything was removed.
    pub(crate) fn disconnect(&mut self, connection: &Connection) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c != connection);
        let removed = self.connections.len() != before;
        if removed && connection.kind == ConnectionKind::AudioTrackToTrack {
            self.resort();
        }
        removed
    }

    /// Drop every connection that no longer fits. Returns how many went.
    pub(crate) fn prune(&mut self) -> usize {
        let before = self.connections.len();
        let valid: Vec<bool> = self
            .connections
            .iter()
            .map(|c| self.validate(c).is_ok())
            .collect();
        let mut keep = valid.into_iter();
        self.connections.retain(|_| keep.next().unwrap_or(false));
        let pruned = before - self.connections.len();
        if pruned > 0 {
            self.resort();
        }
        pruned
    }

    pub(crate) fn set_io_layout(&mut self, inputs: usize, outputs: usize) -> usize {
        for (id, channels) in [(NodeId::AUDIO_IN, inputs), (NodeId::AUDIO_OUT, outputs)] {
            if let Some(Node::Io(io)) = self.nodes.get_mut(&id) {
                io.channels = channels;
            }
        }
        if let Some(Node::Recorder { channels, .. }) = self.nodes.get_mut(&NodeId::RECORDER) {
            *channels = inputs;
        }
        self.prune()
    }

    pub(crate) fn add_sidechain(&mut self, id: NodeId) -> Option<BusShape> {
        Some(self.track_mut(id)?.add_sidechain())
    }

    pub(crate) fn remove_sidechain(&mut self, id: NodeId) -> Option<BusShape> {
        let shape = self.track_mut(id)?.remove_sidechain()?;
        self.prune();
        Some(shape)
    }

    pub(crate) fn set_track_shape(&mut self, id: NodeId, shape: BusShape) {
        if let Some(track) = self.track_mut(id) {
            track.set_shape(shape);
        }
    }

    fn resort(&mut self) {
        // Removing edges or nodes cannot introduce a cycle.
        if let Ok(order) = self.sort() {
            self.order = order;
        }
    }

    /// Kahn's algorithm over the track-to-track edges.
    fn sort(&self) -> Result<Vec<NodeId>> {
        let mut in_degree: HashMap<NodeId, usize> =
            self.tracks.iter().map(|id| (*id, 0)).collect();

        let edges: Vec<&Connection> = self
            .connections
            .iter()
            .filter(|c| c.kind == ConnectionKind::AudioTrackToTrack)
            .collect();
        for edge in &edges {
            if let Some(degree) = in_degree.get_mut(&edge.dst) {
                *degree += 1;
            }
        }

        let mut queue: Vec<NodeId> = self
            .tracks
            .iter()
            .rev()
            .filter(|id| in_degree.get(*id) == Some(&0))
            .copied()
            .collect();

        let mut sorted = Vec::with_capacity(self.tracks.len());
        while let Some(id) = queue.pop() {
            sorted.push(id);
            for edge in edges.iter().filter(|e| e.src == id) {
                if let Some(degree) = in_degree.get_mut(&edge.dst) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push(edge.dst);
                    }
                }
            }
        }

        if sorted.len() != self.tracks.len() {
            return Err(GraphError::Cycle);
        }
        Ok(sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(tracks: usize) -> Topology {
        let mut topology = Topology::new(2, 2, RenderConfig::default());
        for i in 0..tracks {
            let id = NodeId(NodeId::FIRST_DYNAMIC + i as u32);
            topology.insert_track(i, TrackNode::new(id, 2)).unwrap();
        }
        topology
    }

    fn connect(topology: &mut Topology, link: Link) -> Result<bool> {
        let connection = topology.resolve(&link)?;
        topology.connect(connection)
    }

    #[test]
    fn duplicate_connect_keeps_one_edge() {
        let mut t = topology(1);
        assert!(connect(&mut t, Link::audio_track_to_output(0, 0, 0)).unwrap());
        assert!(!connect(&mut t, Link::audio_track_to_output(0, 0, 0)).unwrap());
        assert_eq!(t.connections().len(), 1);
    }

    #[test]
    fn rejects_channels_outside_bus() {
        let mut t = topology(1);
        assert!(matches!(
            connect(&mut t, Link::audio_track_to_output(0, 2, 0)),
            Err(GraphError::InvalidChannel { channel: 2, available: 2 })
        ));
        assert!(connect(&mut t, Link::audio_input_to_track(0, 0, 2)).is_err());
        assert!(connect(&mut t, Link::audio_input_to_track(0, 3, 0)).is_err());
    }

    #[test]
    fn track_cycle_is_rejected() {
        let mut t = topology(3);
        connect(&mut t, Link::audio_track_to_track(0, 0, 1, 0)).unwrap();
        connect(&mut t, Link::audio_track_to_track(1, 0, 2, 0)).unwrap();
        assert!(matches!(
            connect(&mut t, Link::audio_track_to_track(2, 0, 0, 0)),
            Err(GraphError::Cycle)
        ));
        assert!(connect(&mut t, Link::audio_track_to_track(1, 1, 1, 1)).is_err());
        assert_eq!(t.connections().len(), 2);
    }

    #[test]
    fn render_order_follows_edges() {
        let mut t = topology(3);
        connect(&mut t, Link::audio_track_to_track(2, 0, 0, 0)).unwrap();
        let order = t.render_order();
        let pos = |i: usize| order.iter().position(|id| *id == t.tracks()[i]).unwrap();
        assert!(pos(2) < pos(0));
    }

    #[test]
    fn removal_drops_edges_and_shifts_links() {
        let mut t = topology(3);
        connect(&mut t, Link::audio_track_to_track(0, 0, 1, 0)).unwrap();
        connect(&mut t, Link::audio_track_to_output(2, 1, 1)).unwrap();
        t.remove_track(0).unwrap();
        assert_eq!(t.links(), vec![Link::audio_track_to_output(1, 1, 1)]);
        assert!(t.remove_track(5).is_err());
    }

    #[test]
    fn layout_change_prunes_edges() {
        let mut t = topology(1);
        connect(&mut t, Link::audio_track_to_output(0, 0, 1)).unwrap();
        connect(&mut t, Link::audio_input_to_track(1, 0, 1)).unwrap();
        assert_eq!(t.set_io_layout(1, 1), 2);
        assert!(t.connections().is_empty());
    }

    #[test]
    fn sidechain_removal_prunes_sidechain_edges() {
        let mut t = topology(2);
        let id = t.tracks()[1];
        t.add_sidechain(id).unwrap();
        connect(&mut t, Link::audio_track_to_track(0, 0, 1, 3)).unwrap();
        t.remove_sidechain(id).unwrap();
        assert!(t.connections().is_empty());
        assert!(t.remove_sidechain(id).is_none());
    }
}
