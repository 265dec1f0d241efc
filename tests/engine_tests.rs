//! Control-thread host driven alongside a simulated audio callback.

mod helpers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use helpers::*;
use tessitura::buffer::{AudioBuffer, MidiBuffer};
use tessitura::events::{MidiEvent, MidiMessage, MmcCommand};
use tessitura::{EngineCommand, EngineHandle, EngineUpdate, spawn_engine};

fn expect_update(handle: &EngineHandle, wanted: impl Fn(&EngineUpdate) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if let Ok(update) = handle.update_rx.recv_timeout(Duration::from_millis(20)) {
            if wanted(&update) {
                return;
            }
        }
    }
    panic!("expected update never arrived");
}

#[test]
fn mmc_from_the_callback_reaches_the_transport() {
    let graph = Arc::new(test_graph());
    let handle = spawn_engine(graph.clone());

    let mut audio = AudioBuffer::new(2, TEST_BLOCK_SIZE);
    let mut midi = MidiBuffer::new();
    midi.add(MidiEvent::new(0, MidiMessage::Mmc(MmcCommand::Play)));
    graph.process_block(&mut audio, &mut midi);

    expect_update(&handle, |u| {
        matches!(u, EngineUpdate::PlaybackState { playing: true, .. })
    });
    handle.shutdown();
}

#[test]
fn hook_runs_on_the_control_thread() {
    let graph = Arc::new(test_graph());
    let (seen_tx, seen_rx) = crossbeam::channel::unbounded();
    graph.set_midi_hook(move |event| {
        let _ = seen_tx.send((std::thread::current().name().map(String::from), event.message));
    });
    let handle = spawn_engine(graph.clone());

    let mut audio = AudioBuffer::new(2, TEST_BLOCK_SIZE);
    let mut midi = MidiBuffer::new();
    midi.add(MidiEvent::new(5, MidiMessage::note_off(1, 40)));
    graph.process_block(&mut audio, &mut midi);

    let (thread, message) = seen_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(thread.as_deref(), Some("engine-control"));
    assert_eq!(message, MidiMessage::note_off(1, 40));
    handle.shutdown();
}

#[test]
fn dropouts_are_reported() {
    let graph = Arc::new(test_graph());
    let handle = spawn_engine(graph.clone());

    let mut audio = AudioBuffer::new(2, TEST_BLOCK_SIZE);
    let mut midi = MidiBuffer::new();
    {
        let _held = graph.locks().control().write();
        graph.process_block(&mut audio, &mut midi);
        graph.process_block(&mut audio, &mut midi);
    }

    expect_update(&handle, |u| matches!(u, EngineUpdate::Dropouts { total: 2 }));
    handle.shutdown();
}

#[test]
fn commands_drive_transport_and_rejects_are_reported() {
    let graph = Arc::new(test_graph());
    let handle = spawn_engine(graph.clone());

    handle.send(EngineCommand::Seek(1.5));
    handle.send(EngineCommand::Record(true));
    handle.send(EngineCommand::Play);
    expect_update(&handle, |u| {
        matches!(u, EngineUpdate::PlaybackState { playing: true, recording: true })
    });
    assert_eq!(graph.transport().position(), 72000);

    handle.send(EngineCommand::SetLoop {
        start: 2.0,
        end: 1.0,
        enabled: true,
    });
    expect_update(&handle, |u| matches!(u, EngineUpdate::Error { .. }));
    assert!(!graph.transport().is_looping());

    handle.send(EngineCommand::Pause);
    handle.shutdown();
    assert!(!graph.transport().is_playing());
    assert_eq!(graph.transport().position(), 72000);
}

#[test]
fn dropping_the_handle_stops_the_thread() {
    let graph = Arc::new(test_graph());
    let handle = spawn_engine(graph.clone());
    assert_eq!(Arc::strong_count(&graph), 2);
    drop(handle);
    assert_eq!(Arc::strong_count(&graph), 1);
}
