//! Root of the engine: owns the lock domain, the render scratch and the
//! real-time to control-thread message queue.
//!
//! Structural edits (`insert_*`, `remove_*`, `connect`, ...) run on the
//! control thread and take the six locks one at a time. Side data for a new
//! node (block list, plugin dock, fader) is published before the node joins
//! the topology, and torn down after it leaves, so the render callback never
//! sees a node without its data.

mod blocks;
mod codec;
mod connection;
mod node;
mod render;
mod topology;
mod tracks;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

pub use codec::{
    BlockState, CodecConfig, GraphState, NodeMessage, PluginState, SourceState, TrackState,
};
pub use connection::{Connection, ConnectionKind, Link};
pub use node::{BusShape, IoKind, IoNode, Node, NodeId};
pub use topology::Topology;

use crate::audio::{MixerParams, RecorderTask, SequencerSourceNode, TrackNode};
use crate::config::{EngineConfig, RenderConfig};
use crate::events::{AsyncMessage, MidiEvent, TransportCommand};
use crate::lock::{LevelSnapshot, LockDomain};
use crate::plugin::PluginDock;
use crate::timing::SourceList;
use crate::transport::{TransportControl, TransportState};
use crate::{GraphError, Result};
use render::RenderState;

/// Observer for MIDI seen by the render callback, run on the control thread.
pub type MidiHook = Box<dyn Fn(&MidiEvent) + Send + Sync>;

pub struct AudioGraph {
    config: EngineConfig,
    locks: LockDomain,
    render: Mutex<RenderState>,
    async_tx: Sender<AsyncMessage>,
    async_rx: Receiver<AsyncMessage>,
    hook: ArcSwapOption<MidiHook>,
    next_id: AtomicU32,
    dropouts: AtomicU64,
    dropped_messages: AtomicU64,
    /// Longest project length seen so far, as `f64` bits.
    max_length: AtomicU64,
}

impl AudioGraph {
    pub fn new(config: EngineConfig) -> Self {
        let render = config.render();
        let topology = Topology::new(config.input_channels, config.output_channels, render);
        let transport = TransportState::new(config.sample_rate);
        let (async_tx, async_rx) = crossbeam::channel::bounded(config.async_queue_capacity.max(1));

        let mut scratch = RenderState::default();
        scratch.prepare_input(config.input_channels, config.block_size);

        Self {
            locks: LockDomain::new(topology, transport),
            render: Mutex::new(scratch),
            async_tx,
            async_rx,
            hook: ArcSwapOption::empty(),
            next_id: AtomicU32::new(NodeId::FIRST_DYNAMIC),
            dropouts: AtomicU64::new(0),
            dropped_messages: AtomicU64::new(0),
            max_length: AtomicU64::new(0f64.to_bits()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn locks(&self) -> &LockDomain {
        &self.locks
    }

    pub fn render_config(&self) -> RenderConfig {
        *self.locks.graph().read().render_config()
    }

    fn allocate_id(&self) -> NodeId {
        NodeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Channel count each node's render buffer needs.
    fn buffer_layout(graph: &Topology) -> Vec<(NodeId, usize)> {
        let sources = graph
            .sources()
            .iter()
            .filter_map(|id| graph.source(*id).map(|s| (*id, s.channels())));
        let tracks = graph
            .tracks()
            .iter()
            .filter_map(|id| graph.track(*id).map(|t| (*id, t.shape().input_channels())));
        sources.chain(tracks).collect()
    }

    pub fn prepare_to_play(&self, sample_rate: f64, block_size: usize) {
        let (render, inputs, layout) = {
            let mut graph = self.locks.graph().write();
            let mut render = *graph.render_config();
            render.sample_rate = sample_rate;
            render.block_size = block_size;
            graph.set_render_config(render);
            graph
                .recorder()
                .prepare(&render, |id| graph.source(id).map_or(0, |s| s.channels()));
            (render, graph.input_channels(), Self::buffer_layout(&graph))
        };
        self.locks.position().write().set_sample_rate(sample_rate);
        self.locks.plugins().write().prepare(&render);
        let mut scratch = self.render.lock();
        scratch.prepare(&layout, block_size);
        scratch.prepare_input(inputs, block_size);
        drop(scratch);
        info!(sample_rate, block_size, "prepared to play");
    }

    /// Resize the device buses. Connections that no longer fit are dropped.
    pub fn set_audio_layout(&self, inputs: usize, outputs: usize) {
        let (pruned, block_size) = {
            let mut graph = self.locks.graph().write();
            (graph.set_io_layout(inputs, outputs), graph.render_config().block_size)
        };
        self.locks.levels().write().resize(outputs);
        self.render.lock().prepare_input(inputs, block_size);
        debug!(inputs, outputs, pruned, "audio layout changed");
    }

    /// Switch between real-time and offline rendering.
    pub fn set_realtime(&self, realtime: bool) {
        let render = {
            let mut graph = self.locks.graph().write();
            let mut render = *graph.render_config();
            render.realtime = realtime;
            graph.set_render_config(render);
            render
        };
        self.locks.plugins().write().prepare(&render);
    }

    pub fn source_count(&self) -> usize {
        self.locks.graph().read().sources().len()
    }

    pub fn track_count(&self) -> usize {
        self.locks.graph().read().tracks().len()
    }

    pub fn source_id(&self, index: usize) -> Result<NodeId> {
        self.locks.graph().read().source_at(index)
    }

    pub fn track_id(&self, index: usize) -> Result<NodeId> {
        self.locks.graph().read().track_at(index)
    }

    pub fn insert_source(&self, index: usize, channels: usize) -> Result<NodeId> {
        let (len, block_size) = {
            let graph = self.locks.graph().read();
            (graph.sources().len(), graph.render_config().block_size)
        };
        if index > len {
            return Err(GraphError::index("source", index, len));
        }
        let id = self.allocate_id();
        self.locks.sources().write().insert(id, SourceList::new());
        self.render.lock().prepare(&[(id, channels)], block_size);
        self.locks
            .graph()
            .write()
            .insert_source(index, SequencerSourceNode::new(id, channels))?;
        debug!(%id, index, channels, "source inserted");
        Ok(id)
    }

    pub fn remove_source(&self, index: usize) -> Result<()> {
        let id = {
            let mut graph = self.locks.graph().write();
            let id = graph.remove_source(index)?;
            graph.recorder_mut().remove_source(id);
            id
        };
        self.locks.sources().write().remove(id);
        self.render.lock().forget(id);
        debug!(%id, index, "source removed");
        Ok(())
    }

    pub fn insert_track(&self, index: usize, channels: usize) -> Result<NodeId> {
        let (len, block_size) = {
            let graph = self.locks.graph().read();
            (graph.tracks().len(), graph.render_config().block_size)
        };
        if index > len {
            return Err(GraphError::index("track", index, len));
        }
        let id = self.allocate_id();
        self.locks.control().write().insert(id, MixerParams::default());
        self.locks.plugins().write().insert(id, PluginDock::new(channels));
        self.render.lock().prepare(&[(id, channels)], block_size);
        self.locks
            .graph()
            .write()
            .insert_track(index, TrackNode::new(id, channels))?;
        debug!(%id, index, channels, "track inserted");
        Ok(id)
    }

    pub fn remove_track(&self, index: usize) -> Result<()> {
        let id = self.locks.graph().write().remove_track(index)?;
        self.locks.plugins().write().remove(id);
        self.locks.control().write().remove(id);
        self.render.lock().forget(id);
        debug!(%id, index, "track removed");
        Ok(())
    }

    /// Add an edge. Connecting an existing edge again is a no-op.
    pub fn connect(&self, link: Link) -> Result<()> {
        let mut graph = self.locks.graph().write();
        let connection = graph.resolve(&link)?;
        match graph.connect(connection) {
            Ok(added) => {
                debug!(?link, added, "connect");
                Ok(())
            }
            Err(err) => {
                warn!(?link, %err, "connect rejected");
                Err(err)
            }
        }
    }

    /// Remove an edge. Removing an absent edge is a no-op.
    pub fn disconnect(&self, link: Link) -> Result<()> {
        let mut graph = self.locks.graph().write();
        let connection = graph.resolve(&link)?;
        let removed = graph.disconnect(&connection);
        debug!(?link, removed, "disconnect");
        Ok(())
    }

    pub fn links(&self) -> Vec<Link> {
        self.locks.graph().read().links()
    }

    pub fn connection_count(&self) -> usize {
        self.locks.graph().read().connections().len()
    }

    /// Register a record task at `index`, replacing any task that writes to
    /// the same target.
    pub fn insert_record_task(&self, task: RecorderTask, index: usize) -> Result<()> {
        let mut graph = self.locks.graph().write();
        let source = graph.source_at(task.source_index)?;
        let channels = graph.source(source).map_or(0, |s| s.channels());
        let render = *graph.render_config();
        graph
            .recorder_mut()
            .insert(index, task, source, channels, &render)
    }

    pub fn remove_record_task(&self, index: usize) -> Result<RecorderTask> {
        self.locks.graph().write().recorder_mut().remove(index)
    }

    pub fn record_task_count(&self) -> usize {
        self.locks.graph().read().recorder().len()
    }

    /// Every source releases its sounding notes on its next block.
    pub fn close_all_notes(&self) {
        let graph = self.locks.graph().read();
        for id in graph.sources() {
            if let Some(source) = graph.source(*id) {
                source.request_flush();
            }
        }
    }

    pub fn output_levels(&self) -> LevelSnapshot {
        self.locks.levels().read().clone()
    }

    pub fn transport(&self) -> TransportControl<'_> {
        TransportControl::new(self.locks.position())
    }

    pub fn set_midi_hook<F>(&self, hook: F)
    where
        F: Fn(&MidiEvent) + Send + Sync + 'static,
    {
        let hook: MidiHook = Box::new(hook);
        self.hook.store(Some(Arc::new(hook)));
    }

    pub fn clear_midi_hook(&self) {
        self.hook.store(None);
    }

    pub fn apply_transport(&self, command: TransportCommand) {
        let transport = self.transport();
        match command {
            TransportCommand::Play => {
                transport.play();
            }
            TransportCommand::Pause => {
                transport.pause();
            }
            TransportCommand::Stop => {
                transport.stop();
                self.close_all_notes();
            }
            TransportCommand::Rewind => {
                transport.rewind();
            }
            TransportCommand::Restart => {
                transport.rewind().play();
            }
            TransportCommand::Record(recording) => {
                transport.record(recording);
            }
        }
    }

    /// Drain messages queued by the render callback: run the MIDI hook and
    /// apply transport requests. Returns how many messages were handled.
    pub fn dispatch_pending(&self) -> usize {
        let mut handled = 0;
        for message in self.async_rx.try_iter() {
            match message {
                AsyncMessage::Midi(event) => {
                    if let Some(hook) = self.hook.load().as_ref() {
                        (**hook)(&event);
                    }
                }
                AsyncMessage::Transport(command) => {
                    debug!(?command, "transport request");
                    self.apply_transport(command);
                }
            }
            handled += 1;
        }
        handled
    }

    /// Blocks rendered as silence because a lock was busy.
    pub fn dropout_count(&self) -> u64 {
        self.dropouts.load(Ordering::Relaxed)
    }

    /// Messages lost to a full queue.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Remove every source, track, connection and record task.
    pub fn clear(&self) -> Result<()> {
        let (inputs, outputs) = {
            let graph = self.locks.graph().read();
            (graph.input_channels(), graph.output_channels())
        };
        self.parse(&GraphState::empty(inputs, outputs), &CodecConfig::default())
    }
}

impl std::fmt::Debug for AudioGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGraph")
            .field("config", &self.config)
            .field("dropouts", &self.dropout_count())
            .finish_non_exhaustive()
    }
}
