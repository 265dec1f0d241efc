use serde::{Deserialize, Serialize};

use super::NodeId;

/// The nine legal edge categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionKind {
    MidiInputToSource,
    AudioInputToSource,
    MidiSourceToTrack,
    AudioSourceToTrack,
    MidiInputToTrack,
    AudioInputToTrack,
    AudioTrackToTrack,
    AudioTrackToOutput,
    MidiTrackToOutput,
}

/// Which family of nodes an endpoint position indexes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    AudioInput,
    AudioOutput,
    MidiInput,
    MidiOutput,
    Source,
    Track,
}

impl ConnectionKind {
    pub const ALL: [ConnectionKind; 9] = [
        ConnectionKind::MidiInputToSource,
        ConnectionKind::AudioInputToSource,
        ConnectionKind::MidiSourceToTrack,
        ConnectionKind::AudioSourceToTrack,
        ConnectionKind::MidiInputToTrack,
        ConnectionKind::AudioInputToTrack,
        ConnectionKind::AudioTrackToTrack,
        ConnectionKind::AudioTrackToOutput,
        ConnectionKind::MidiTrackToOutput,
    ];

    pub fn is_midi(self) -> bool {
        matches!(
            self,
            ConnectionKind::MidiInputToSource
                | ConnectionKind::MidiSourceToTrack
                | ConnectionKind::MidiInputToTrack
                | ConnectionKind::MidiTrackToOutput
        )
    }

    pub(crate) fn endpoints(self) -> (Endpoint, Endpoint) {
        use ConnectionKind::*;
        match self {
            MidiInputToSource => (Endpoint::MidiInput, Endpoint::Source),
            AudioInputToSource => (Endpoint::AudioInput, Endpoint::Source),
            MidiSourceToTrack => (Endpoint::Source, Endpoint::Track),
            AudioSourceToTrack => (Endpoint::Source, Endpoint::Track),
            MidiInputToTrack => (Endpoint::MidiInput, Endpoint::Track),
            AudioInputToTrack => (Endpoint::AudioInput, Endpoint::Track),
            AudioTrackToTrack => (Endpoint::Track, Endpoint::Track),
            AudioTrackToOutput => (Endpoint::Track, Endpoint::AudioOutput),
            MidiTrackToOutput => (Endpoint::Track, Endpoint::MidiOutput),
        }
    }
}

/// Connection as seen by callers: endpoints are positions in the source or
/// track list (0 for device endpoints), channels are bus channels (0 for MIDI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub kind: ConnectionKind,
    pub src: usize,
    pub src_channel: usize,
    pub dst: usize,
    pub dst_channel: usize,
}

impl Link {
    pub fn new(
        kind: ConnectionKind,
        src: usize,
        src_channel: usize,
        dst: usize,
        dst_channel: usize,
    ) -> Self {
        Self {
            kind,
            src,
            src_channel,
            dst,
            dst_channel,
        }
    }

    pub fn midi_input_to_source(source: usize) -> Self {
        Self::new(ConnectionKind::MidiInputToSource, 0, 0, source, 0)
    }

    pub fn audio_input_to_source(input_channel: usize, source: usize, channel: usize) -> Self {
        Self::new(
            ConnectionKind::AudioInputToSource,
            0,
            input_channel,
            source,
            channel,
        )
    }

    pub fn midi_source_to_track(source: usize, track: usize) -> Self {
        Self::new(ConnectionKind::MidiSourceToTrack, source, 0, track, 0)
    }

    pub fn audio_source_to_track(
        source: usize,
        source_channel: usize,
        track: usize,
        track_channel: usize,
    ) -> Self {
        Self::new(
            ConnectionKind::AudioSourceToTrack,
            source,
            source_channel,
            track,
            track_channel,
        )
    }

    pub fn midi_input_to_track(track: usize) -> Self {
        Self::new(ConnectionKind::MidiInputToTrack, 0, 0, track, 0)
    }

    pub fn audio_input_to_track(input_channel: usize, track: usize, track_channel: usize) -> Self {
        Self::new(
            ConnectionKind::AudioInputToTrack,
            0,
            input_channel,
            track,
            track_channel,
        )
    }

    pub fn audio_track_to_track(
        src: usize,
        src_channel: usize,
        dst: usize,
        dst_channel: usize,
    ) -> Self {
        Self::new(
            ConnectionKind::AudioTrackToTrack,
            src,
            src_channel,
            dst,
            dst_channel,
        )
    }

    pub fn audio_track_to_output(track: usize, track_channel: usize, output_channel: usize) -> Self {
        Self::new(
            ConnectionKind::AudioTrackToOutput,
            track,
            track_channel,
            0,
            output_channel,
        )
    }

    pub fn midi_track_to_output(track: usize) -> Self {
        Self::new(ConnectionKind::MidiTrackToOutput, track, 0, 0, 0)
    }
}

/// Stored edge, addressed by node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub kind: ConnectionKind,
    pub src: NodeId,
    pub src_channel: usize,
    pub dst: NodeId,
    pub dst_channel: usize,
}

impl Connection {
    pub fn touches(&self, id: NodeId) -> bool {
        self.src == id || self.dst == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midi_kinds() {
        let midi: Vec<_> = ConnectionKind::ALL
            .into_iter()
            .filter(|k| k.is_midi())
            .collect();
        assert_eq!(midi.len(), 4);
        assert!(!ConnectionKind::AudioTrackToTrack.is_midi());
    }

    #[test]
    fn device_endpoints_use_position_zero() {
        let link = Link::audio_track_to_output(3, 1, 0);
        assert_eq!((link.src, link.dst), (3, 0));
        let link = Link::midi_input_to_track(2);
        assert_eq!((link.src, link.src_channel, link.dst_channel), (0, 0, 0));
    }
}
