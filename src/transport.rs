//! Shared play-head state and its control handle.
//!
//! `TransportState` lives under the position lock of the [`LockDomain`].
//! The render callback advances it once per block; the control thread drives
//! it through [`TransportControl`].
//!
//! [`LockDomain`]: crate::LockDomain

use parking_lot::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct TransportState {
    position: i64,
    sample_rate: f64,
    playing: bool,
    recording: bool,
    looping: bool,
    loop_start: i64,
    loop_end: i64,
    overflow: bool,
}

/// What [`TransportState::advance`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved,
    Looped,
    Overflowed,
    Stopped,
}

impl TransportState {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            position: 0,
            sample_rate,
            playing: false,
            recording: false,
            looping: false,
            loop_start: 0,
            loop_end: 0,
            overflow: false,
        }
    }

    #[inline]
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn position_seconds(&self) -> f64 {
        self.position as f64 / self.sample_rate
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    #[inline]
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn loop_bounds(&self) -> (i64, i64) {
        (self.loop_start, self.loop_end)
    }

    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    pub(crate) fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    pub fn play(&mut self) {
        self.playing = true;
        self.overflow = false;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn stop(&mut self) {
        self.playing = false;
        self.recording = false;
        self.position = 0;
    }

    pub fn rewind(&mut self) {
        self.position = if self.looping { self.loop_start } else { 0 };
        self.overflow = false;
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    pub fn set_position(&mut self, samples: i64) {
        self.position = samples;
        self.overflow = false;
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Loop range in samples. An empty or inverted range disables looping.
    pub fn set_loop(&mut self, start: i64, end: i64) {
        self.loop_start = start;
        self.loop_end = end;
        if end <= start {
            self.looping = false;
        }
    }

    pub fn mark_overflow(&mut self) {
        self.overflow = true;
        self.playing = false;
        self.recording = false;
    }

    /// Move the play-head forward by one processed block.
    pub fn advance(&mut self, frames: usize) -> Advance {
        if !self.playing {
            return Advance::Stopped;
        }
        let Some(next) = i64::try_from(frames)
            .ok()
            .and_then(|f| self.position.checked_add(f))
        else {
            self.mark_overflow();
            return Advance::Overflowed;
        };
        if self.looping
            && self.loop_end > self.loop_start
            && self.position < self.loop_end
            && next >= self.loop_end
        {
            self.position = self.loop_start;
            return Advance::Looped;
        }
        self.position = next;
        Advance::Moved
    }
}

/// Control-thread handle over the transport state. Every call takes the
/// position lock as a blocking read or write.
pub struct TransportControl<'a> {
    state: &'a RwLock<TransportState>,
}

impl<'a> TransportControl<'a> {
    pub(crate) fn new(state: &'a RwLock<TransportState>) -> Self {
        Self { state }
    }

    pub fn snapshot(&self) -> TransportState {
        self.state.read().clone()
    }

    pub fn is_playing(&self) -> bool {
        self.state.read().is_playing()
    }

    pub fn is_recording(&self) -> bool {
        self.state.read().is_recording()
    }

    pub fn is_looping(&self) -> bool {
        self.state.read().is_looping()
    }

    pub fn position(&self) -> i64 {
        self.state.read().position()
    }

    pub fn position_seconds(&self) -> f64 {
        self.state.read().position_seconds()
    }

    pub fn play(&self) -> &Self {
        self.state.write().play();
        self
    }

    pub fn pause(&self) -> &Self {
        self.state.write().pause();
        self
    }

    pub fn stop(&self) -> &Self {
        self.state.write().stop();
        self
    }

    pub fn rewind(&self) -> &Self {
        self.state.write().rewind();
        self
    }

    pub fn record(&self, recording: bool) -> &Self {
        self.state.write().set_recording(recording);
        self
    }

    pub fn seek(&self, samples: i64) -> &Self {
        self.state.write().set_position(samples);
        self
    }

    pub fn seek_seconds(&self, seconds: f64) -> &Self {
        let mut state = self.state.write();
        let samples = (seconds * state.sample_rate()).round() as i64;
        state.set_position(samples);
        self
    }

    pub fn loop_range(&self, start: i64, end: i64) -> &Self {
        self.state.write().set_loop(start, end);
        self
    }

    pub fn looping(&self, enabled: bool) -> &Self {
        self.state.write().set_looping(enabled);
        self
    }

    pub fn advance(&self, frames: usize) -> Advance {
        self.state.write().advance(frames)
    }

    pub fn mark_overflow(&self) -> &Self {
        self.state.write().mark_overflow();
        self
    }
}
