//! Planar audio and timestamped MIDI buffers.
//!
//! Both types keep their allocation when resized downward or cleared, so the
//! render path only allocates when a block outgrows everything seen before.

use crate::events::MidiEvent;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl AudioBuffer {
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channels],
            frames,
        }
    }

    pub fn from_channels(channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        let mut buffer = Self { channels, frames };
        for ch in &mut buffer.channels {
            ch.truncate(frames);
        }
        buffer
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index][..self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        let frames = self.frames;
        &mut self.channels[index][..frames]
    }

    /// Resize to `channels` x `frames` and zero the contents.
    pub fn set_size(&mut self, channels: usize, frames: usize) {
        self.channels.truncate(channels);
        while self.channels.len() < channels {
            self.channels.push(Vec::with_capacity(frames));
        }
        for ch in &mut self.channels {
            ch.clear();
            ch.resize(frames, 0.0);
        }
        self.frames = frames;
    }

    pub fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.fill(0.0);
        }
    }

    pub fn clear_channel(&mut self, index: usize) {
        if index < self.channels.len() {
            self.channel_mut(index).fill(0.0);
        }
    }

    /// Mix `src` into `channel` starting at frame `offset`, scaled by `gain`.
    pub fn add_from(&mut self, channel: usize, offset: usize, src: &[f32], gain: f32) {
        if channel >= self.channels.len() || offset >= self.frames {
            return;
        }
        let len = src.len().min(self.frames - offset);
        for (dst, s) in self.channels[channel][offset..offset + len]
            .iter_mut()
            .zip(&src[..len])
        {
            *dst += s * gain;
        }
    }

    pub fn copy_from(&mut self, channel: usize, offset: usize, src: &[f32]) {
        if channel >= self.channels.len() || offset >= self.frames {
            return;
        }
        let len = src.len().min(self.frames - offset);
        self.channels[channel][offset..offset + len].copy_from_slice(&src[..len]);
    }

    pub fn apply_gain(&mut self, channel: usize, gain: f32) {
        if channel < self.channels.len() && gain != 1.0 {
            for s in self.channel_mut(channel) {
                *s *= gain;
            }
        }
    }

    pub fn rms(&self, channel: usize) -> f32 {
        if channel >= self.channels.len() || self.frames == 0 {
            return 0.0;
        }
        let sum_sq: f32 = self.channel(channel).iter().map(|s| s * s).sum();
        (sum_sq / self.frames as f32).sqrt()
    }

    pub fn is_silent(&self) -> bool {
        self.channels
            .iter()
            .all(|ch| ch[..self.frames].iter().all(|s| *s == 0.0))
    }
}

/// MIDI events of one block, ordered by `sample_offset`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MidiBuffer {
    events: Vec<MidiEvent>,
}

impl MidiBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Insert keeping the buffer ordered; events at equal offsets stay in
    /// insertion order.
    pub fn add(&mut self, event: MidiEvent) {
        let at = self
            .events
            .partition_point(|e| e.sample_offset <= event.sample_offset);
        self.events.insert(at, event);
    }

    /// Merge `other` into this buffer, shifting its events by `offset` frames.
    pub fn add_events(&mut self, other: &MidiBuffer, offset: usize) {
        for event in &other.events {
            self.add(MidiEvent::new(event.sample_offset + offset, event.message));
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn retain(&mut self, f: impl FnMut(&MidiEvent) -> bool) {
        self.events.retain(f);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MidiEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<'a> IntoIterator for &'a MidiBuffer {
    type Item = &'a MidiEvent;
    type IntoIter = std::slice::Iter<'a, MidiEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
