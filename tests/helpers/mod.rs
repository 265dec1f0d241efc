//! Fixtures for tessitura integration tests: in-memory content, a recording
//! sink, a content catalog and a gain plugin with its loader.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tessitura::buffer::{AudioBuffer, MidiBuffer};
use tessitura::content::{ContentCatalog, ContentKind, ContentSource, RecordTarget};
use tessitura::events::{MidiEvent, MidiMessage};
use tessitura::plugin::{HostedPlugin, PluginLoader, ProcessContext};
use tessitura::{AudioGraph, EngineConfig};

pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// 10 ms blocks at 48 kHz.
pub const TEST_BLOCK_SIZE: usize = 480;

/// Route engine logs to the test writer; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Graph with stereo device buses, prepared at the test rate.
pub fn test_graph() -> AudioGraph {
    init_tracing();
    let graph = AudioGraph::new(EngineConfig {
        sample_rate: TEST_SAMPLE_RATE,
        block_size: TEST_BLOCK_SIZE,
        ..Default::default()
    });
    graph.prepare_to_play(TEST_SAMPLE_RATE, TEST_BLOCK_SIZE);
    graph
}

/// Render `blocks` blocks with silent input, returning every output block.
pub fn render(graph: &AudioGraph, blocks: usize) -> Vec<AudioBuffer> {
    let outputs = graph.locks().graph().read().output_channels();
    let mut midi = MidiBuffer::new();
    (0..blocks)
        .map(|_| {
            let mut audio = AudioBuffer::new(outputs, TEST_BLOCK_SIZE);
            midi.clear();
            graph.process_block(&mut audio, &mut midi);
            audio
        })
        .collect()
}

/// Audio content holding one constant level per channel.
pub struct ConstantClip {
    pub levels: Vec<f32>,
    pub frames: u64,
    pub sample_rate: f64,
}

impl ConstantClip {
    pub fn stereo(level: f32, seconds: f64) -> Arc<dyn ContentSource> {
        Arc::new(Self {
            levels: vec![level, level],
            frames: (seconds * TEST_SAMPLE_RATE) as u64,
            sample_rate: TEST_SAMPLE_RATE,
        })
    }
}

impl ContentSource for ConstantClip {
    fn kind(&self, _index: usize) -> ContentKind {
        ContentKind::Audio
    }

    fn length_seconds(&self, _index: usize) -> f64 {
        self.frames as f64 / self.sample_rate
    }

    fn read_audio(
        &self,
        _index: usize,
        out: &mut AudioBuffer,
        out_offset: usize,
        from: u64,
        frames: usize,
    ) {
        let available = self.frames.saturating_sub(from) as usize;
        let len = frames.min(available);
        for (ch, level) in self.levels.iter().enumerate() {
            out.add_from(ch, out_offset, &vec![*level; len], 1.0);
        }
    }
}

/// MIDI content: events placed at content time in seconds.
pub struct NoteClip {
    pub events: Vec<(f64, MidiMessage)>,
    pub seconds: f64,
}

impl ContentSource for NoteClip {
    fn kind(&self, _index: usize) -> ContentKind {
        ContentKind::Midi
    }

    fn length_seconds(&self, _index: usize) -> f64 {
        self.seconds
    }

    fn read_midi(
        &self,
        _index: usize,
        out: &mut MidiBuffer,
        out_offset: usize,
        from: f64,
        to: f64,
        sample_rate: f64,
    ) {
        for (at, message) in self.events.iter().filter(|(t, _)| *t >= from && *t < to) {
            let frame = ((at - from) * sample_rate).round() as usize;
            out.add(MidiEvent::new(out_offset + frame, *message));
        }
    }
}

#[derive(Debug, Default)]
pub struct Recording {
    pub channels: usize,
    pub audio: Vec<Vec<f32>>,
    pub midi: Vec<(u64, MidiMessage)>,
    pub finished: usize,
}

/// Record target that appends into memory.
#[derive(Debug, Default)]
pub struct MemoryRecording(pub Mutex<Recording>);

impl MemoryRecording {
    pub fn frames(&self) -> usize {
        self.0.lock().audio.first().map_or(0, Vec::len)
    }
}

impl RecordTarget for MemoryRecording {
    fn prepare_record(&self, channels: usize, _sample_rate: f64, _block_size: usize) {
        let mut rec = self.0.lock();
        rec.channels = channels;
        rec.audio.resize(channels, Vec::new());
    }

    fn write_audio(&self, audio: &AudioBuffer, start_frame: usize, at: u64) {
        let mut rec = self.0.lock();
        let at = at as usize;
        for (ch, data) in rec.audio.iter_mut().enumerate() {
            if ch >= audio.num_channels() {
                break;
            }
            let samples = &audio.channel(ch)[start_frame..];
            if data.len() < at + samples.len() {
                data.resize(at + samples.len(), 0.0);
            }
            data[at..at + samples.len()].copy_from_slice(samples);
        }
    }

    fn write_midi(&self, midi: &MidiBuffer, start_frame: usize, at: u64) {
        let mut rec = self.0.lock();
        for event in midi.iter().filter(|e| e.sample_offset >= start_frame) {
            rec.midi
                .push((at + (event.sample_offset - start_frame) as u64, event.message));
        }
    }

    fn finish_record(&self) {
        self.0.lock().finished += 1;
    }
}

/// Content catalog over a fixed key map.
#[derive(Default)]
pub struct Catalog {
    entries: HashMap<String, Arc<dyn ContentSource>>,
}

impl Catalog {
    pub fn with(mut self, key: &str, content: &Arc<dyn ContentSource>) -> Self {
        self.entries.insert(key.to_string(), content.clone());
        self
    }
}

impl ContentCatalog for Catalog {
    fn key_of(&self, content: &Arc<dyn ContentSource>) -> Option<String> {
        let wanted = Arc::as_ptr(content) as *const ();
        self.entries
            .iter()
            .find(|(_, c)| Arc::as_ptr(c) as *const () == wanted)
            .map(|(k, _)| k.clone())
    }

    fn resolve(&self, key: &str) -> Option<Arc<dyn ContentSource>> {
        self.entries.get(key).cloned()
    }
}

pub const GAIN_ID: &str = "test.gain";

/// Scales every channel by a fixed factor. Parameter 0 is the factor.
pub struct GainPlugin {
    pub gain: f32,
}

impl HostedPlugin for GainPlugin {
    fn identifier(&self) -> String {
        GAIN_ID.to_string()
    }

    fn input_buses(&self) -> usize {
        1
    }

    fn output_buses(&self) -> usize {
        1
    }

    fn prepare(&mut self, _sample_rate: f64, _block_size: usize) {}

    fn parameter_count(&self) -> usize {
        1
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        if index == 0 {
            self.gain = value;
        }
    }

    fn process(&mut self, audio: &mut AudioBuffer, _midi: &mut MidiBuffer, _ctx: &ProcessContext) {
        for ch in 0..audio.num_channels() {
            audio.apply_gain(ch, self.gain);
        }
    }

    fn state(&self) -> Vec<u8> {
        self.gain.to_le_bytes().to_vec()
    }

    fn set_state(&mut self, state: &[u8]) {
        if let Ok(bytes) = <[u8; 4]>::try_from(state) {
            self.gain = f32::from_le_bytes(bytes);
        }
    }
}

pub struct GainLoader;

impl PluginLoader for GainLoader {
    fn load(&self, identifier: &str) -> Option<Box<dyn HostedPlugin>> {
        (identifier == GAIN_ID).then(|| Box::new(GainPlugin { gain: 1.0 }) as Box<dyn HostedPlugin>)
    }
}
