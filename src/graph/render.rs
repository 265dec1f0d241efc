//! The real-time block callback.
//!
//! Every lock is tried, never waited on: a block that cannot take all of
//! them renders as silence and counts as a dropout.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use super::{AudioGraph, ConnectionKind, NodeId, Topology};
use crate::audio::{ActiveNotes, capture, render_track};
use crate::buffer::{AudioBuffer, MidiBuffer};
use crate::events::AsyncMessage;
use crate::plugin::{PlayHead, ProcessContext};

/// Per-node scratch owned by the render callback. Preallocated on the
/// control thread; the callback only allocates for nodes it has never seen.
#[derive(Debug, Default)]
pub(crate) struct RenderState {
    audio: HashMap<NodeId, AudioBuffer>,
    midi: HashMap<NodeId, MidiBuffer>,
    notes: HashMap<NodeId, ActiveNotes>,
    input: AudioBuffer,
    input_midi: MidiBuffer,
    record_audio: AudioBuffer,
    record_midi: MidiBuffer,
}

const MIDI_CAPACITY: usize = 256;

impl RenderState {
    pub(crate) fn prepare(&mut self, ids: &[(NodeId, usize)], block_size: usize) {
        for &(id, channels) in ids {
            self.audio
                .entry(id)
                .or_default()
                .set_size(channels, block_size);
            self.midi
                .entry(id)
                .or_insert_with(|| MidiBuffer::with_capacity(MIDI_CAPACITY));
            self.notes.entry(id).or_default();
        }
    }

    pub(crate) fn prepare_input(&mut self, inputs: usize, block_size: usize) {
        self.input.set_size(inputs, block_size);
        self.record_audio.set_size(inputs, block_size);
    }

    pub(crate) fn retain(&mut self, ids: &[NodeId]) {
        self.audio.retain(|id, _| ids.contains(id));
        self.midi.retain(|id, _| ids.contains(id));
        self.notes.retain(|id, _| ids.contains(id));
    }

    pub(crate) fn forget(&mut self, id: NodeId) {
        self.audio.remove(&id);
        self.midi.remove(&id);
        self.notes.remove(&id);
    }

    /// Take a node's buffers out of the maps so other entries stay readable
    /// while it renders.
    fn take(&mut self, id: NodeId, channels: usize, frames: usize) -> (AudioBuffer, MidiBuffer) {
        let mut audio = self.audio.remove(&id).unwrap_or_default();
        audio.set_size(channels, frames);
        let mut midi = self.midi.remove(&id).unwrap_or_default();
        midi.clear();
        (audio, midi)
    }

    fn put(&mut self, id: NodeId, audio: AudioBuffer, midi: MidiBuffer) {
        self.audio.insert(id, audio);
        self.midi.insert(id, midi);
    }
}

impl AudioGraph {
    /// Render one block. On entry `audio` holds the device input in its first
    /// channels and `midi` the incoming events; on return they hold the
    /// output.
    pub fn process_block(&self, audio: &mut AudioBuffer, midi: &mut MidiBuffer) {
        let locks = &self.locks;
        let (Some(graph), Some(sources), Some(plugins), Some(control)) = (
            locks.graph().try_read(),
            locks.sources().try_read(),
            locks.plugins().try_read(),
            locks.control().try_read(),
        ) else {
            return self.drop_block(audio, midi);
        };
        let Some(mut transport) = locks.position().try_write() else {
            return self.drop_block(audio, midi);
        };
        let Some(mut render) = self.render.try_lock() else {
            return self.drop_block(audio, midi);
        };
        let state = &mut *render;
        let frames = audio.num_frames();

        let inputs = graph.input_channels();
        state.input.set_size(inputs, frames);
        for ch in 0..inputs.min(audio.num_channels()) {
            state.input.copy_from(ch, 0, audio.channel(ch));
        }
        state.input_midi.clear();
        state.input_midi.add_events(midi, 0);
        self.forward_midi(midi);

        let config = *graph.render_config();
        let position = transport.position();
        let playing = transport.is_playing();
        let ctx = ProcessContext {
            sample_rate: config.sample_rate,
            block_size: frames,
            realtime: config.realtime,
            play_head: PlayHead {
                position,
                seconds: transport.position_seconds(),
                playing,
                recording: transport.is_recording(),
                looping: transport.is_looping(),
            },
        };

        if playing && transport.is_recording() {
            record_inputs(&graph, state, position, frames);
        }

        for &id in graph.sources() {
            let Some(node) = graph.source(id) else {
                continue;
            };
            let (mut buffer, mut events) = state.take(id, node.channels(), frames);
            let notes = state.notes.entry(id).or_default();
            node.render(
                sources.get(id),
                notes,
                playing,
                position,
                config.sample_rate,
                &mut buffer,
                &mut events,
            );
            state.put(id, buffer, events);
        }

        for &id in graph.render_order() {
            let Some(track) = graph.track(id) else {
                continue;
            };
            let shape = track.shape();
            let (mut buffer, mut events) = state.take(id, shape.input_channels(), frames);
            gather_track_input(&graph, state, id, &mut buffer, &mut events);
            render_track(
                shape,
                plugins.get(id),
                control.get(id),
                &mut buffer,
                &mut events,
                &ctx,
            );
            state.put(id, buffer, events);
        }

        audio.clear();
        midi.clear();
        for connection in graph.connections() {
            match connection.kind {
                ConnectionKind::AudioTrackToOutput => {
                    if let Some(src) = state.audio.get(&connection.src) {
                        audio.add_from(
                            connection.dst_channel,
                            0,
                            src.channel(connection.src_channel),
                            1.0,
                        );
                    }
                }
                ConnectionKind::MidiTrackToOutput => {
                    if let Some(src) = state.midi.get(&connection.src) {
                        midi.add_events(src, 0);
                    }
                }
                _ => {}
            }
        }

        // A meter reader holding the lock costs one missed update, not a dropout.
        if let Some(mut levels) = locks.levels().try_write() {
            levels.update(audio);
        }
        transport.advance(frames);
    }

    fn drop_block(&self, audio: &mut AudioBuffer, midi: &mut MidiBuffer) {
        audio.clear();
        midi.clear();
        if let Some(mut levels) = self.locks.levels().try_write() {
            levels.silence();
        }
        self.dropouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Queue hook copies and transport requests for the control thread. A
    /// full queue drops the newest message.
    fn forward_midi(&self, midi: &MidiBuffer) {
        let hooked = self.hook.load().is_some();
        for event in midi {
            if hooked && self.async_tx.try_send(AsyncMessage::Midi(*event)).is_err() {
                self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            }
            if let Some(command) = event.message.transport_command() {
                if self
                    .async_tx
                    .try_send(AsyncMessage::Transport(command))
                    .is_err()
                {
                    self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Assemble each record task's input from the edges feeding its source and
/// hand it over.
fn record_inputs(graph: &Topology, state: &mut RenderState, position: i64, frames: usize) {
    let render = *graph.render_config();
    for entry in graph.recorder().entries() {
        let Some(source) = graph.source(entry.source) else {
            continue;
        };
        state.record_audio.set_size(source.channels(), frames);
        state.record_midi.clear();
        for connection in graph.connections().iter().filter(|c| c.dst == entry.source) {
            match connection.kind {
                ConnectionKind::AudioInputToSource => state.record_audio.add_from(
                    connection.dst_channel,
                    0,
                    state.input.channel(connection.src_channel),
                    1.0,
                ),
                ConnectionKind::MidiInputToSource => {
                    state.record_midi.add_events(&state.input_midi, 0)
                }
                _ => {}
            }
        }
        capture(entry, &state.record_audio, &state.record_midi, position, &render);
    }
}

/// Sum everything routed into track `id`. Upstream tracks have already
/// rendered, so their main bus is final.
fn gather_track_input(
    graph: &Topology,
    state: &RenderState,
    id: NodeId,
    audio: &mut AudioBuffer,
    midi: &mut MidiBuffer,
) {
    for connection in graph.connections().iter().filter(|c| c.dst == id) {
        let (src_ch, dst_ch) = (connection.src_channel, connection.dst_channel);
        match connection.kind {
            ConnectionKind::AudioInputToTrack => {
                audio.add_from(dst_ch, 0, state.input.channel(src_ch), 1.0);
            }
            ConnectionKind::MidiInputToTrack => midi.add_events(&state.input_midi, 0),
            ConnectionKind::AudioSourceToTrack | ConnectionKind::AudioTrackToTrack => {
                if let Some(src) = state.audio.get(&connection.src) {
                    audio.add_from(dst_ch, 0, src.channel(src_ch), 1.0);
                }
            }
            ConnectionKind::MidiSourceToTrack => {
                if let Some(src) = state.midi.get(&connection.src) {
                    midi.add_events(src, 0);
                }
            }
            _ => {}
        }
    }
}
