use std::fmt;
use std::sync::Arc;

use crate::buffer::{AudioBuffer, MidiBuffer};
use crate::config::RenderConfig;
use crate::content::RecordTarget;
use crate::graph::NodeId;
use crate::{GraphError, Result};

/// One capture job: record the input routed to a source into `target`.
#[derive(Clone)]
pub struct RecorderTask {
    pub target: Arc<dyn RecordTarget>,
    pub source_index: usize,
    pub offset_seconds: f64,
    /// Whole blocks of device latency to compensate for.
    pub compensation_blocks: usize,
}

impl fmt::Debug for RecorderTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecorderTask")
            .field("source_index", &self.source_index)
            .field("offset_seconds", &self.offset_seconds)
            .field("compensation_blocks", &self.compensation_blocks)
            .finish_non_exhaustive()
    }
}

impl RecorderTask {
    pub fn new(target: Arc<dyn RecordTarget>, source_index: usize) -> Self {
        Self {
            target,
            source_index,
            offset_seconds: 0.0,
            compensation_blocks: 0,
        }
    }

    pub fn with_offset(mut self, seconds: f64) -> Self {
        self.offset_seconds = seconds;
        self
    }

    pub fn with_compensation(mut self, blocks: usize) -> Self {
        self.compensation_blocks = blocks;
        self
    }

    /// First content frame this task writes for a block at `position`, or
    /// `None` when the whole block precedes the recording start.
    fn placement(&self, position: i64, frames: usize, render: &RenderConfig) -> Option<(usize, u64)> {
        let offset = i128::from(position)
            - (self.offset_seconds * render.sample_rate).round() as i128
            - (self.compensation_blocks as i128) * (render.block_size as i128);
        if offset + frames as i128 <= 0 {
            return None;
        }
        if offset < 0 {
            Some((usize::try_from(-offset).ok()?, 0))
        } else {
            Some((0, u64::try_from(offset).ok()?))
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordEntry {
    pub(crate) task: RecorderTask,
    /// Resolved when the task is inserted, so later source reordering does
    /// not redirect it.
    pub(crate) source: NodeId,
}

/// Ordered record tasks fed from the audio and MIDI inputs.
#[derive(Debug, Default)]
pub struct RecordingPipeline {
    entries: Vec<RecordEntry>,
}

impl RecordingPipeline {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn task(&self, index: usize) -> Option<&RecorderTask> {
        self.entries.get(index).map(|e| &e.task)
    }

    pub(crate) fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    /// Insert at `index`, first dropping any task that already records into
    /// the same target. The target is prepared for `channels` channels.
    pub(crate) fn insert(
        &mut self,
        index: usize,
        task: RecorderTask,
        source: NodeId,
        channels: usize,
        render: &RenderConfig,
    ) -> Result<()> {
        if index > self.entries.len() {
            return Err(GraphError::index("record task", index, self.entries.len()));
        }
        let mut index = index;
        if let Some(existing) = self
            .entries
            .iter()
            .position(|e| Arc::ptr_eq(&e.task.target, &task.target))
        {
            self.entries.remove(existing);
            if existing < index {
                index -= 1;
            }
        }
        task.target
            .prepare_record(channels, render.sample_rate, render.block_size);
        self.entries.insert(index, RecordEntry { task, source });
        Ok(())
    }

    pub(crate) fn remove(&mut self, index: usize) -> Result<RecorderTask> {
        if index >= self.entries.len() {
            return Err(GraphError::index("record task", index, self.entries.len()));
        }
        let entry = self.entries.remove(index);
        entry.task.target.finish_record();
        Ok(entry.task)
    }

    /// Re-prepare every target after a sample rate or block size change.
    pub(crate) fn prepare(&self, render: &RenderConfig, channels: impl Fn(NodeId) -> usize) {
        for entry in &self.entries {
            entry.task.target.prepare_record(
                channels(entry.source),
                render.sample_rate,
                render.block_size,
            );
        }
    }

    /// Finish and drop the tasks recording into `source`.
    pub(crate) fn remove_source(&mut self, source: NodeId) {
        self.entries.retain(|e| {
            if e.source == source {
                e.task.target.finish_record();
            }
            e.source != source
        });
    }

    pub(crate) fn finish_all(&mut self) {
        for entry in self.entries.drain(..) {
            entry.task.target.finish_record();
        }
    }
}

/// Hand one block of gathered input to `entry`'s target.
pub(crate) fn capture(
    entry: &RecordEntry,
    audio: &AudioBuffer,
    midi: &MidiBuffer,
    position: i64,
    render: &RenderConfig,
) {
    let Some((start_frame, at)) = entry.task.placement(position, audio.num_frames(), render) else {
        return;
    };
    entry.task.target.write_audio(audio, start_frame, at);
    entry.task.target.write_midi(midi, start_frame, at);
}
