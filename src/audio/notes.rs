use crate::buffer::MidiBuffer;
use crate::events::{MidiEvent, MidiMessage};

/// Set of sounding notes, one bit per (channel, pitch). Fixed size, so
/// tracking never allocates on the render thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveNotes {
    bits: [u128; 16],
}

impl ActiveNotes {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn slot(channel: u8) -> usize {
        (channel.clamp(1, 16) - 1) as usize
    }

    pub fn note_on(&mut self, channel: u8, pitch: u8) {
        self.bits[Self::slot(channel)] |= 1u128 << (pitch & 0x7f);
    }

    pub fn note_off(&mut self, channel: u8, pitch: u8) {
        self.bits[Self::slot(channel)] &= !(1u128 << (pitch & 0x7f));
    }

    pub fn contains(&self, channel: u8, pitch: u8) -> bool {
        self.bits[Self::slot(channel)] & (1u128 << (pitch & 0x7f)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    pub fn len(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Follow note on/off messages in `midi`. A note-on with zero velocity
    /// counts as a note-off.
    pub fn track(&mut self, midi: &MidiBuffer) {
        for event in midi {
            match event.message {
                MidiMessage::NoteOn {
                    channel,
                    pitch,
                    velocity,
                } if velocity > 0 => self.note_on(channel, pitch),
                MidiMessage::NoteOn { channel, pitch, .. }
                | MidiMessage::NoteOff { channel, pitch, .. } => self.note_off(channel, pitch),
                _ => {}
            }
        }
    }

    /// Emit a note-off at `sample_offset` for every sounding note, then forget
    /// them all.
    pub fn release_all(&mut self, midi: &mut MidiBuffer, sample_offset: usize) {
        for (slot, bits) in self.bits.iter_mut().enumerate() {
            let mut remaining = *bits;
            while remaining != 0 {
                let pitch = remaining.trailing_zeros() as u8;
                remaining &= remaining - 1;
                midi.add(MidiEvent::new(
                    sample_offset,
                    MidiMessage::note_off(slot as u8 + 1, pitch),
                ));
            }
            *bits = 0;
        }
    }
}
