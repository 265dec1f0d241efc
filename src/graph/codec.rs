//! Project state messages and the graph's serialize/parse.
//!
//! Messages are plain serde structs; [`GraphState::to_ron`] and
//! [`GraphState::from_ron`] are the only byte encoding provided. Content and
//! plugins are referenced by key and resolved through the [`CodecConfig`]
//! collaborators when parsing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{AudioGraph, BusShape, Link, NodeId, Topology};
use crate::audio::{MixerParams, SequencerSourceNode, TrackNode};
use crate::config::RenderConfig;
use crate::content::ContentCatalog;
use crate::plugin::{PluginDock, PluginLoader};
use crate::timing::{ScheduledBlock, SourceList};
use crate::{GraphError, Result};

/// Saved decorator slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginState {
    pub identifier: Option<String>,
    /// Opaque plugin chunk from [`HostedPlugin::state`](crate::plugin::HostedPlugin::state).
    pub state: Vec<u8>,
    pub bypassed: bool,
    pub input_buses: usize,
    pub output_buses: usize,
    pub midi_channel: u8,
    pub strip_cc: bool,
    pub strip_midi_output: bool,
    pub cc_links: Vec<(u8, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockState {
    pub start: f64,
    pub end: f64,
    pub offset: f64,
    /// Catalog key of the content, `None` for an empty block.
    pub content: Option<String>,
    pub content_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceState {
    pub channels: usize,
    pub blocks: Vec<BlockState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    pub shape: BusShape,
    pub mixer: MixerParams,
    pub plugins: Vec<PluginState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    pub input_channels: usize,
    pub output_channels: usize,
    pub sources: Vec<SourceState>,
    pub tracks: Vec<TrackState>,
    pub connections: Vec<Link>,
}

impl GraphState {
    pub fn empty(input_channels: usize, output_channels: usize) -> Self {
        Self {
            input_channels,
            output_channels,
            sources: Vec::new(),
            tracks: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }
}

/// State of a single node, for per-node save and restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeMessage {
    Source(SourceState),
    Track(TrackState),
}

impl NodeMessage {
    fn kind_name(&self) -> &'static str {
        match self {
            NodeMessage::Source(_) => "source",
            NodeMessage::Track(_) => "track",
        }
    }

    pub fn as_source(&self) -> Result<&SourceState> {
        match self {
            NodeMessage::Source(state) => Ok(state),
            other => Err(GraphError::SerializationMismatch {
                expected: "source",
                found: other.kind_name(),
            }),
        }
    }

    pub fn as_track(&self) -> Result<&TrackState> {
        match self {
            NodeMessage::Track(state) => Ok(state),
            other => Err(GraphError::SerializationMismatch {
                expected: "track",
                found: other.kind_name(),
            }),
        }
    }
}

/// Collaborators used to turn handles into keys and back.
#[derive(Clone, Copy, Default)]
pub struct CodecConfig<'a> {
    pub content: Option<&'a dyn ContentCatalog>,
    pub plugins: Option<&'a dyn PluginLoader>,
}

impl<'a> CodecConfig<'a> {
    pub fn with_content(mut self, catalog: &'a dyn ContentCatalog) -> Self {
        self.content = Some(catalog);
        self
    }

    pub fn with_plugins(mut self, loader: &'a dyn PluginLoader) -> Self {
        self.plugins = Some(loader);
        self
    }
}

/// Blocks whose content has been dropped save without it. Live content the
/// catalog has no key for fails the save.
fn encode_block(block: &ScheduledBlock, catalog: Option<&dyn ContentCatalog>) -> Result<BlockState> {
    let content = match block.content() {
        Some(handle) => Some(
            catalog
                .and_then(|c| c.key_of(&handle))
                .ok_or_else(|| GraphError::MissingContent(format!("block at {}s", block.start)))?,
        ),
        None => None,
    };
    Ok(BlockState {
        start: block.start,
        end: block.end,
        offset: block.offset,
        content,
        content_index: block.content_index,
    })
}

fn decode_block(state: &BlockState, catalog: Option<&dyn ContentCatalog>) -> Result<ScheduledBlock> {
    let block = ScheduledBlock::new(state.start, state.end, state.offset);
    let Some(key) = &state.content else {
        return Ok(block);
    };
    let content = catalog
        .and_then(|c| c.resolve(key))
        .ok_or_else(|| GraphError::MissingContent(key.clone()))?;
    Ok(block.with_content(&content, state.content_index))
}

pub(crate) fn encode_source(
    list: Option<&SourceList>,
    channels: usize,
    catalog: Option<&dyn ContentCatalog>,
) -> Result<SourceState> {
    let blocks = match list {
        Some(list) => list
            .iter()
            .map(|b| encode_block(b, catalog))
            .collect::<Result<_>>()?,
        None => Vec::new(),
    };
    Ok(SourceState { channels, blocks })
}

pub(crate) fn decode_source(
    state: &SourceState,
    catalog: Option<&dyn ContentCatalog>,
) -> Result<SourceList> {
    let mut list = SourceList::new();
    for block in &state.blocks {
        list.add(decode_block(block, catalog)?)?;
    }
    Ok(list)
}

pub(crate) fn decode_track(
    state: &TrackState,
    loader: Option<&dyn PluginLoader>,
    render: &RenderConfig,
) -> Result<PluginDock> {
    let mut dock = PluginDock::new(state.shape.channels);
    dock.set_buses(state.shape.buses(), render);
    dock.parse(&state.plugins, loader, render)?;
    Ok(dock)
}

impl AudioGraph {
    /// Snapshot the whole graph. Locks are visited one after another, never
    /// nested, and only for reading.
    pub fn serialize(&self, codec: &CodecConfig<'_>) -> Result<GraphState> {
        let (inputs, outputs, sources, tracks, connections) = {
            let graph = self.locks.graph().read();
            let sources: Vec<(NodeId, usize)> = graph
                .sources()
                .iter()
                .map(|id| (*id, graph.source(*id).map_or(0, |s| s.channels())))
                .collect();
            let tracks: Vec<(NodeId, BusShape)> = graph
                .tracks()
                .iter()
                .filter_map(|id| graph.track(*id).map(|t| (*id, t.shape())))
                .collect();
            (
                graph.input_channels(),
                graph.output_channels(),
                sources,
                tracks,
                graph.links(),
            )
        };

        let source_states = {
            let lists = self.locks.sources().read();
            sources
                .iter()
                .map(|(id, channels)| encode_source(lists.get(*id), *channels, codec.content))
                .collect::<Result<Vec<_>>>()?
        };

        let plugin_states: Vec<_> = {
            let rack = self.locks.plugins().read();
            tracks
                .iter()
                .map(|(id, _)| rack.get(*id).map(PluginDock::serialize).unwrap_or_default())
                .collect()
        };

        let mixers: Vec<MixerParams> = {
            let control = self.locks.control().read();
            tracks
                .iter()
                .map(|(id, _)| control.get(*id).copied().unwrap_or_default())
                .collect()
        };

        let track_states = tracks
            .iter()
            .zip(mixers)
            .zip(plugin_states)
            .map(|(((_, shape), mixer), plugins)| TrackState {
                shape: *shape,
                mixer,
                plugins,
            })
            .collect();

        Ok(GraphState {
            input_channels: inputs,
            output_channels: outputs,
            sources: source_states,
            tracks: track_states,
            connections,
        })
    }

    /// Replace the whole graph with `state`. Everything is built and checked
    /// before the first lock is taken for writing; on error the current graph
    /// is untouched. Record tasks of the old graph are finished.
    pub fn parse(&self, state: &GraphState, codec: &CodecConfig<'_>) -> Result<()> {
        let render = *self.locks.graph().read().render_config();
        let mut topology = Topology::new(state.input_channels, state.output_channels, render);

        let mut lists = Vec::with_capacity(state.sources.len());
        for (index, source) in state.sources.iter().enumerate() {
            let id = self.allocate_id();
            topology.insert_source(index, SequencerSourceNode::new(id, source.channels))?;
            lists.push((id, decode_source(source, codec.content)?));
        }

        let mut docks = Vec::with_capacity(state.tracks.len());
        for (index, track) in state.tracks.iter().enumerate() {
            let id = self.allocate_id();
            let mut node = TrackNode::new(id, track.shape.channels);
            node.set_shape(track.shape);
            topology.insert_track(index, node)?;
            docks.push((id, decode_track(track, codec.plugins, &render)?, track.mixer));
        }

        for link in &state.connections {
            let connection = topology.resolve(link)?;
            topology.connect(connection)?;
        }

        let keep: HashSet<NodeId> = lists
            .iter()
            .map(|(id, _)| *id)
            .chain(docks.iter().map(|(id, _, _)| *id))
            .collect();
        let ids: Vec<NodeId> = keep.iter().copied().collect();
        let connection_count = topology.connections().len();

        {
            let mut sources = self.locks.sources().write();
            for (id, list) in lists {
                sources.insert(id, list);
            }
        }
        let mixers: Vec<_> = {
            let mut rack = self.locks.plugins().write();
            docks
                .into_iter()
                .map(|(id, dock, mixer)| {
                    rack.insert(id, dock);
                    (id, mixer)
                })
                .collect()
        };
        {
            let mut control = self.locks.control().write();
            for (id, mixer) in mixers {
                control.insert(id, mixer);
            }
        }

        let mut previous = {
            let mut graph = self.locks.graph().write();
            std::mem::replace(&mut *graph, topology)
        };
        previous.recorder_mut().finish_all();

        self.locks.sources().write().retain(|id| keep.contains(&id));
        self.locks.plugins().write().retain(|id| keep.contains(&id));
        self.locks.control().write().retain(|id| keep.contains(&id));
        self.locks.levels().write().resize(state.output_channels);
        self.render.lock().retain(&ids);
        self.reset_length();

        info!(
            sources = state.sources.len(),
            tracks = state.tracks.len(),
            connections = connection_count,
            "graph parsed"
        );
        Ok(())
    }

    pub fn serialize_source(&self, index: usize, codec: &CodecConfig<'_>) -> Result<NodeMessage> {
        let (id, channels) = {
            let graph = self.locks.graph().read();
            let id = graph.source_at(index)?;
            (id, graph.source(id).map_or(0, |s| s.channels()))
        };
        let lists = self.locks.sources().read();
        Ok(NodeMessage::Source(encode_source(
            lists.get(id),
            channels,
            codec.content,
        )?))
    }

    /// Restore the blocks and width of the source at `index`.
    pub fn parse_source(
        &self,
        index: usize,
        message: &NodeMessage,
        codec: &CodecConfig<'_>,
    ) -> Result<()> {
        let state = message.as_source()?;
        let list = decode_source(state, codec.content)?;
        let id = self.locks.graph().read().source_at(index)?;

        self.locks.sources().write().insert(id, list);
        {
            let mut graph = self.locks.graph().write();
            if graph.source(id).is_some_and(|s| s.channels() != state.channels) {
                graph.replace_source(SequencerSourceNode::new(id, state.channels));
            }
        }
        debug!(%id, blocks = state.blocks.len(), "source parsed");
        Ok(())
    }

    pub fn serialize_track(&self, index: usize) -> Result<NodeMessage> {
        let (id, shape) = {
            let graph = self.locks.graph().read();
            let id = graph.track_at(index)?;
            (id, graph.track(id).map(|t| t.shape()).unwrap_or(BusShape::new(0)))
        };
        let plugins = self
            .locks
            .plugins()
            .read()
            .get(id)
            .map(PluginDock::serialize)
            .unwrap_or_default();
        let mixer = self.locks.control().read().get(id).copied().unwrap_or_default();
        Ok(NodeMessage::Track(TrackState {
            shape,
            mixer,
            plugins,
        }))
    }

    /// Restore bus shape, fader settings and plugin chain of the track at
    /// `index`. Plugins are loaded before anything is replaced.
    pub fn parse_track(
        &self,
        index: usize,
        message: &NodeMessage,
        codec: &CodecConfig<'_>,
    ) -> Result<()> {
        let state = message.as_track()?;
        let (id, render) = {
            let graph = self.locks.graph().read();
            (graph.track_at(index)?, *graph.render_config())
        };
        let dock = decode_track(state, codec.plugins, &render)?;

        self.locks.plugins().write().insert(id, dock);
        self.locks.control().write().insert(id, state.mixer);
        let pruned = {
            let mut graph = self.locks.graph().write();
            graph.set_track_shape(id, state.shape);
            graph.prune()
        };
        debug!(%id, plugins = state.plugins.len(), pruned, "track parsed");
        Ok(())
    }
}
