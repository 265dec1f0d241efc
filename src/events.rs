use serde::{Deserialize, Serialize};

/// A MIDI message stamped with its frame offset inside the current block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MidiEvent {
    pub sample_offset: usize,
    pub message: MidiMessage,
}

impl MidiEvent {
    pub fn new(sample_offset: usize, message: MidiMessage) -> Self {
        Self {
            sample_offset,
            message,
        }
    }
}

/// MIDI Machine Control transport commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MmcCommand {
    Stop,
    Play,
    DeferredPlay,
    FastForward,
    Rewind,
    RecordStrobe,
    RecordExit,
    Pause,
}

/// Channels are 1-based (1..=16) to match the decorator channel filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MidiMessage {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    PitchBend { channel: u8, value: u16 },
    ProgramChange { channel: u8, program: u8 },
    Start,
    Continue,
    Stop,
    Mmc(MmcCommand),
}

impl MidiMessage {
    pub fn note_off(channel: u8, pitch: u8) -> Self {
        MidiMessage::NoteOff {
            channel,
            pitch,
            velocity: 0,
        }
    }

    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::PitchBend { channel, .. }
            | MidiMessage::ProgramChange { channel, .. } => Some(channel),
            _ => None,
        }
    }

    pub fn is_control_change(&self) -> bool {
        matches!(self, MidiMessage::ControlChange { .. })
    }

    /// Transport command carried by this message, if any.
    pub fn transport_command(&self) -> Option<TransportCommand> {
        match self {
            MidiMessage::Start => Some(TransportCommand::Restart),
            MidiMessage::Continue => Some(TransportCommand::Play),
            MidiMessage::Stop => Some(TransportCommand::Stop),
            MidiMessage::Mmc(cmd) => match cmd {
                MmcCommand::Play | MmcCommand::DeferredPlay => Some(TransportCommand::Play),
                MmcCommand::Pause => Some(TransportCommand::Pause),
                MmcCommand::Stop => Some(TransportCommand::Stop),
                MmcCommand::Rewind => Some(TransportCommand::Rewind),
                MmcCommand::RecordStrobe => Some(TransportCommand::Record(true)),
                MmcCommand::RecordExit => Some(TransportCommand::Record(false)),
                MmcCommand::FastForward => None,
            },
            _ => None,
        }
    }
}

/// Transport request queued by the real-time thread and applied later on the
/// control thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    Play,
    Pause,
    Stop,
    Rewind,
    /// Rewind, then play.
    Restart,
    Record(bool),
}

/// Everything the real-time thread hands off to the control thread.
#[derive(Debug, Clone)]
pub(crate) enum AsyncMessage {
    Midi(MidiEvent),
    Transport(TransportCommand),
}
