mod notes;
mod recorder;
mod source;
mod track;

pub use notes::ActiveNotes;
pub use recorder::{RecorderTask, RecordingPipeline};
pub use source::SequencerSourceNode;
pub use track::{ControlParams, MixerParams, PanLaw, TrackNode, db_to_gain};

pub(crate) use recorder::capture;
pub(crate) use track::render_track;
