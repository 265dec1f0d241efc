use std::sync::atomic::{AtomicBool, Ordering};

use crate::buffer::{AudioBuffer, MidiBuffer};
use crate::content::ContentKind;
use crate::graph::NodeId;
use crate::timing::SourceList;

use super::ActiveNotes;

/// Plays the scheduled blocks of one [`SourceList`] into its own audio and
/// MIDI buffers. The block list itself sits under the source-list lock.
#[derive(Debug)]
pub struct SequencerSourceNode {
    id: NodeId,
    channels: usize,
    flush_notes: AtomicBool,
}

impl SequencerSourceNode {
    pub fn new(id: NodeId, channels: usize) -> Self {
        Self {
            id,
            channels,
            flush_notes: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Ask the next rendered block to release every sounding note.
    pub fn request_flush(&self) {
        self.flush_notes.store(true, Ordering::Release);
    }

    pub(crate) fn take_flush(&self) -> bool {
        self.flush_notes.swap(false, Ordering::AcqRel)
    }

    /// Render one block starting at transport sample `position`. `audio` and
    /// `midi` are expected to arrive cleared.
    pub(crate) fn render(
        &self,
        list: Option<&SourceList>,
        notes: &mut ActiveNotes,
        playing: bool,
        position: i64,
        sample_rate: f64,
        audio: &mut AudioBuffer,
        midi: &mut MidiBuffer,
    ) {
        if self.take_flush() {
            notes.release_all(midi, 0);
        }
        if playing {
            if let Some(list) = list {
                render_blocks(list, position, sample_rate, audio, midi);
            }
        }
        notes.track(midi);
    }
}

/// Copy the content under the window `[position, position + frames)` into
/// the buffers. Only the part of each block where its content has data is
/// read.
pub(crate) fn render_blocks(
    list: &SourceList,
    position: i64,
    sample_rate: f64,
    audio: &mut AudioBuffer,
    midi: &mut MidiBuffer,
) {
    let frames = audio.num_frames();
    let Some(end) = i64::try_from(frames)
        .ok()
        .and_then(|frames| position.checked_add(frames))
    else {
        return;
    };
    let window_start = position as f64 / sample_rate;
    let window_end = end as f64 / sample_rate;
    let Some((first, last)) = list.match_range(window_start, window_end) else {
        return;
    };

    for block in (first..=last).filter_map(|i| list.get(i)) {
        let Some(content) = block.content() else {
            continue;
        };
        let index = block.content_index;
        let (visible_start, visible_end) = block.visible_range(content.length_seconds(index));
        let from = visible_start.max(window_start);
        let to = visible_end.min(window_end);
        if !(to > from) {
            continue;
        }

        let dst = ((from - window_start) * sample_rate).round() as usize;
        let dst_end = (((to - window_start) * sample_rate).round() as usize).min(frames);
        if dst >= dst_end {
            continue;
        }
        let content_from = from - block.start - block.offset;

        match content.kind(index) {
            ContentKind::Audio | ContentKind::Synth => {
                let from_frame = (content_from * sample_rate).round().max(0.0) as u64;
                content.read_audio(index, audio, dst, from_frame, dst_end - dst);
            }
            ContentKind::Midi => {
                let content_to = to - block.start - block.offset;
                content.read_midi(index, midi, dst, content_from, content_to, sample_rate);
            }
        }
    }
}
