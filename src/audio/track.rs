use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::buffer::{AudioBuffer, MidiBuffer};
use crate::graph::{BusShape, NodeId};
use crate::plugin::{PluginDock, ProcessContext};

/// Mixer channel node. Its plugin chain lives in the [`PluginRack`] and its
/// fader settings in [`ControlParams`], both keyed by this node's id.
///
/// [`PluginRack`]: crate::plugin::PluginRack
#[derive(Debug, Clone)]
pub struct TrackNode {
    id: NodeId,
    shape: BusShape,
}

impl TrackNode {
    pub fn new(id: NodeId, channels: usize) -> Self {
        Self {
            id,
            shape: BusShape::new(channels),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn shape(&self) -> BusShape {
        self.shape
    }

    pub(crate) fn set_shape(&mut self, shape: BusShape) {
        self.shape = shape;
    }

    pub(crate) fn add_sidechain(&mut self) -> BusShape {
        self.shape.sidechains += 1;
        self.shape
    }

    pub(crate) fn remove_sidechain(&mut self) -> Option<BusShape> {
        self.shape.sidechains = self.shape.sidechains.checked_sub(1)?;
        Some(self.shape)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PanLaw {
    /// Unity at centre, the far side fades out linearly.
    #[default]
    Balanced,
    /// Equal power: -3 dB per side at centre.
    ConstantPower,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixerParams {
    pub gain_db: f32,
    /// -1.0 (left) to 1.0 (right).
    pub pan: f32,
    pub pan_law: PanLaw,
    /// Post-fader level.
    pub slider_db: f32,
    pub muted: bool,
}

impl Default for MixerParams {
    fn default() -> Self {
        Self {
            gain_db: 0.0,
            pan: 0.0,
            pan_law: PanLaw::Balanced,
            slider_db: 0.0,
            muted: false,
        }
    }
}

pub fn db_to_gain(db: f32) -> f32 {
    if db <= -100.0 {
        0.0
    } else {
        10f32.powf(db / 20.0)
    }
}

fn pan_to_gains(pan: f32, law: PanLaw) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    match law {
        PanLaw::Balanced => ((1.0 - pan).min(1.0), (1.0 + pan).min(1.0)),
        PanLaw::ConstantPower => {
            let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
            (angle.cos(), angle.sin())
        }
    }
}

impl MixerParams {
    /// Gain, pan, slider and mute over the first `channels` channels. Pan only
    /// applies to stereo tracks.
    pub fn apply(&self, audio: &mut AudioBuffer, channels: usize) {
        let channels = channels.min(audio.num_channels());
        if self.muted {
            for ch in 0..channels {
                audio.clear_channel(ch);
            }
            return;
        }
        let level = db_to_gain(self.gain_db) * db_to_gain(self.slider_db);
        if channels == 2 {
            let (left, right) = pan_to_gains(self.pan, self.pan_law);
            audio.apply_gain(0, level * left);
            audio.apply_gain(1, level * right);
        } else {
            for ch in 0..channels {
                audio.apply_gain(ch, level);
            }
        }
    }
}

/// Fader settings of every track. Guarded by the audio-control lock.
#[derive(Debug, Default, Clone)]
pub struct ControlParams {
    mixers: HashMap<NodeId, MixerParams>,
}

impl ControlParams {
    pub fn get(&self, track: NodeId) -> Option<&MixerParams> {
        self.mixers.get(&track)
    }

    pub fn get_mut(&mut self, track: NodeId) -> Option<&mut MixerParams> {
        self.mixers.get_mut(&track)
    }

    pub(crate) fn insert(&mut self, track: NodeId, params: MixerParams) {
        self.mixers.insert(track, params);
    }

    pub(crate) fn remove(&mut self, track: NodeId) -> Option<MixerParams> {
        self.mixers.remove(&track)
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(NodeId) -> bool) {
        self.mixers.retain(|id, _| keep(*id));
    }
}

/// Run one track over its gathered input: plugin chain on the whole bus,
/// then the fader stage on the main bus. The main bus is left in the first
/// `shape.channels` channels of `audio`.
pub(crate) fn render_track(
    shape: BusShape,
    dock: Option<&PluginDock>,
    mixer: Option<&MixerParams>,
    audio: &mut AudioBuffer,
    midi: &mut MidiBuffer,
    ctx: &ProcessContext,
) {
    if let Some(dock) = dock {
        dock.process(audio, midi, ctx);
    }
    if let Some(mixer) = mixer {
        mixer.apply(audio, shape.channels);
    }
}
