//! Control-thread host.
//!
//! `spawn_engine` moves the control side of an [`AudioGraph`] onto its own
//! thread. Commands arrive over a crossbeam channel; every tick the thread
//! drains what the render callback queued (MIDI hook copies, transport
//! requests) and reports transport and dropout changes back.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::events::TransportCommand;
use crate::graph::AudioGraph;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Play,
    Pause,
    Stop,
    Rewind,
    Record(bool),
    /// Move the play-head, in seconds.
    Seek(f64),
    /// Loop range in seconds.
    SetLoop {
        start: f64,
        end: f64,
        enabled: bool,
    },
    CloseAllNotes,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineUpdate {
    PlaybackState { playing: bool, recording: bool },
    Dropouts { total: u64 },
    Error { message: String },
}

pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn send(&self, command: EngineCommand) -> bool {
        self.command_tx.send(command).is_ok()
    }

    /// Stop the control thread and wait for it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("engine thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn spawn_engine(graph: Arc<AudioGraph>) -> EngineHandle {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    let thread = std::thread::Builder::new()
        .name("engine-control".into())
        .spawn(move || engine_thread(graph, command_rx, update_tx));

    let thread = match thread {
        Ok(thread) => Some(thread),
        Err(err) => {
            warn!(%err, "failed to spawn engine thread");
            None
        }
    };

    EngineHandle {
        command_tx,
        update_rx,
        thread,
    }
}

struct EngineState {
    playing: bool,
    recording: bool,
    dropouts: u64,
}

fn engine_thread(
    graph: Arc<AudioGraph>,
    command_rx: Receiver<EngineCommand>,
    update_tx: Sender<EngineUpdate>,
) {
    let tick = graph.config().tick();
    let mut state = EngineState {
        playing: false,
        recording: false,
        dropouts: graph.dropout_count(),
    };
    info!(?tick, "engine thread started");

    loop {
        match command_rx.recv_timeout(tick) {
            Ok(EngineCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(command) => {
                debug!(?command, "engine command");
                if let Err(message) = apply(&graph, command) {
                    let _ = update_tx.send(EngineUpdate::Error { message });
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        graph.dispatch_pending();
        report(&graph, &mut state, &update_tx);
    }

    info!("engine thread stopped");
}

fn apply(graph: &AudioGraph, command: EngineCommand) -> Result<(), String> {
    match command {
        EngineCommand::Play => graph.apply_transport(TransportCommand::Play),
        EngineCommand::Pause => graph.apply_transport(TransportCommand::Pause),
        EngineCommand::Stop => graph.apply_transport(TransportCommand::Stop),
        EngineCommand::Rewind => graph.apply_transport(TransportCommand::Rewind),
        EngineCommand::Record(recording) => {
            graph.apply_transport(TransportCommand::Record(recording))
        }
        EngineCommand::Seek(seconds) => {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(format!("cannot seek to {seconds} s"));
            }
            graph.transport().seek_seconds(seconds);
        }
        EngineCommand::SetLoop {
            start,
            end,
            enabled,
        } => {
            if !(end > start) {
                return Err(format!("empty loop range [{start}, {end})"));
            }
            let sample_rate = graph.transport().snapshot().sample_rate();
            let to_samples = |s: f64| (s * sample_rate).round() as i64;
            graph
                .transport()
                .loop_range(to_samples(start), to_samples(end))
                .looping(enabled);
        }
        EngineCommand::CloseAllNotes => graph.close_all_notes(),
        EngineCommand::Shutdown => {}
    }
    Ok(())
}

fn report(graph: &AudioGraph, state: &mut EngineState, update_tx: &Sender<EngineUpdate>) {
    let transport = graph.transport().snapshot();
    if transport.is_playing() != state.playing || transport.is_recording() != state.recording {
        state.playing = transport.is_playing();
        state.recording = transport.is_recording();
        let _ = update_tx.send(EngineUpdate::PlaybackState {
            playing: state.playing,
            recording: state.recording,
        });
    }

    let dropouts = graph.dropout_count();
    if dropouts != state.dropouts {
        warn!(new = dropouts - state.dropouts, total = dropouts, "render dropouts");
        state.dropouts = dropouts;
        let _ = update_tx.send(EngineUpdate::Dropouts { total: dropouts });
    }
}
