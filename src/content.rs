//! Interfaces to the externally owned content store.
//!
//! Scheduled blocks keep only a weak reference plus an index into a
//! [`ContentSource`]; loading, saving and fork-on-write stay outside the
//! engine.

use std::sync::Arc;

use crate::buffer::{AudioBuffer, MidiBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Audio,
    /// Audio produced by a synth from stored MIDI.
    Synth,
    Midi,
}

pub trait ContentSource: Send + Sync {
    fn kind(&self, index: usize) -> ContentKind;

    fn length_seconds(&self, index: usize) -> f64;

    /// Mix `frames` frames starting at content frame `from` into `out`
    /// beginning at frame `out_offset`. Content is delivered at the engine
    /// sample rate.
    fn read_audio(
        &self,
        _index: usize,
        _out: &mut AudioBuffer,
        _out_offset: usize,
        _from: u64,
        _frames: usize,
    ) {
    }

    /// Add the events in content time `[from, to)` seconds to `out`, shifted
    /// so that `from` lands on frame `out_offset`.
    fn read_midi(
        &self,
        _index: usize,
        _out: &mut MidiBuffer,
        _out_offset: usize,
        _from: f64,
        _to: f64,
        _sample_rate: f64,
    ) {
    }
}

/// Destination of a recording task.
///
/// Called on the render thread; implementations must not block.
pub trait RecordTarget: Send + Sync {
    fn prepare_record(&self, channels: usize, sample_rate: f64, block_size: usize);

    /// Write `audio[start_frame..]` so that `start_frame` lands on content
    /// frame `at`.
    fn write_audio(&self, audio: &AudioBuffer, start_frame: usize, at: u64);

    fn write_midi(&self, midi: &MidiBuffer, start_frame: usize, at: u64);

    fn finish_record(&self);
}

/// Maps content handles to stable keys for the project codec.
pub trait ContentCatalog {
    fn key_of(&self, content: &Arc<dyn ContentSource>) -> Option<String>;

    fn resolve(&self, key: &str) -> Option<Arc<dyn ContentSource>>;
}
