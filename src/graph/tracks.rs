//! Fader, side-chain and plugin chain operations, addressed by track
//! position.

use tracing::debug;

use super::{AudioGraph, BusShape, NodeId};
use crate::audio::{MixerParams, PanLaw};
use crate::config::RenderConfig;
use crate::plugin::{HostedPlugin, PluginDecorator, PluginDock};
use crate::{GraphError, Result};

impl AudioGraph {
    /// Resolve `track` along with the track count seen under the same lock.
    fn locate_track(&self, track: usize) -> Result<(NodeId, usize)> {
        let graph = self.locks.graph().read();
        Ok((graph.track_at(track)?, graph.tracks().len()))
    }

    pub fn mixer(&self, track: usize) -> Result<MixerParams> {
        let (id, len) = self.locate_track(track)?;
        self.locks
            .control()
            .read()
            .get(id)
            .copied()
            .ok_or(GraphError::index("track", track, len))
    }

    fn edit_mixer(&self, track: usize, f: impl FnOnce(&mut MixerParams)) -> Result<()> {
        let (id, len) = self.locate_track(track)?;
        let mut control = self.locks.control().write();
        let mixer = control
            .get_mut(id)
            .ok_or(GraphError::index("track", track, len))?;
        f(mixer);
        Ok(())
    }

    pub fn set_track_gain(&self, track: usize, db: f32) -> Result<()> {
        self.edit_mixer(track, |m| m.gain_db = db)
    }

    pub fn set_track_pan(&self, track: usize, pan: f32) -> Result<()> {
        self.edit_mixer(track, |m| m.pan = pan.clamp(-1.0, 1.0))
    }

    pub fn set_track_pan_law(&self, track: usize, law: PanLaw) -> Result<()> {
        self.edit_mixer(track, |m| m.pan_law = law)
    }

    pub fn set_track_slider(&self, track: usize, db: f32) -> Result<()> {
        self.edit_mixer(track, |m| m.slider_db = db)
    }

    pub fn set_track_mute(&self, track: usize, muted: bool) -> Result<()> {
        self.edit_mixer(track, |m| m.muted = muted)
    }

    pub fn track_shape(&self, track: usize) -> Result<BusShape> {
        let graph = self.locks.graph().read();
        let id = graph.track_at(track)?;
        graph
            .track(id)
            .map(|t| t.shape())
            .ok_or(GraphError::index("track", track, graph.tracks().len()))
    }

    /// Add one side-chain bus to a track; its plugins are re-fitted to the
    /// wider input.
    pub fn add_track_sidechain(&self, track: usize) -> Result<BusShape> {
        let (id, shape, render) = {
            let mut graph = self.locks.graph().write();
            let id = graph.track_at(track)?;
            let len = graph.tracks().len();
            let shape = graph
                .add_sidechain(id)
                .ok_or(GraphError::index("track", track, len))?;
            (id, shape, *graph.render_config())
        };
        self.refit_dock(id, shape, &render);
        Ok(shape)
    }

    /// Remove the last side-chain bus. Edges into it are dropped.
    pub fn remove_track_sidechain(&self, track: usize) -> Result<BusShape> {
        let (id, shape, render) = {
            let mut graph = self.locks.graph().write();
            let id = graph.track_at(track)?;
            let Some(sidechains) = graph.track(id).map(|t| t.shape().sidechains) else {
                return Err(GraphError::index("track", track, graph.tracks().len()));
            };
            // Fails only when the track has no side-chain left.
            let shape = graph
                .remove_sidechain(id)
                .ok_or(GraphError::index("sidechain", sidechains, sidechains))?;
            (id, shape, *graph.render_config())
        };
        self.refit_dock(id, shape, &render);
        Ok(shape)
    }

    fn refit_dock(&self, id: NodeId, shape: BusShape, render: &RenderConfig) {
        if let Some(dock) = self.locks.plugins().write().get_mut(id) {
            dock.set_buses(shape.buses(), render);
        }
        self.render
            .lock()
            .prepare(&[(id, shape.input_channels())], render.block_size);
        debug!(%id, sidechains = shape.sidechains, "track buses changed");
    }

    /// Run `f` on a track's plugin dock under the plugin write lock.
    pub fn with_dock<R>(
        &self,
        track: usize,
        f: impl FnOnce(&mut PluginDock, &RenderConfig) -> Result<R>,
    ) -> Result<R> {
        let (id, len, render) = {
            let graph = self.locks.graph().read();
            (graph.track_at(track)?, graph.tracks().len(), *graph.render_config())
        };
        let mut rack = self.locks.plugins().write();
        let dock = rack
            .get_mut(id)
            .ok_or(GraphError::index("track", track, len))?;
        f(dock, &render)
    }

    pub fn with_decorator<R>(
        &self,
        track: usize,
        slot: usize,
        f: impl FnOnce(&mut PluginDecorator) -> R,
    ) -> Result<R> {
        self.with_dock(track, |dock, _| Ok(f(dock.decorator_mut(slot)?)))
    }

    pub fn plugin_count(&self, track: usize) -> Result<usize> {
        self.with_dock(track, |dock, _| Ok(dock.len()))
    }

    pub fn insert_plugin(&self, track: usize, slot: usize) -> Result<()> {
        self.with_dock(track, |dock, render| dock.insert_plugin(slot, render))?;
        debug!(track, slot, "plugin slot inserted");
        Ok(())
    }

    pub fn remove_plugin(&self, track: usize, slot: usize) -> Result<()> {
        self.with_dock(track, |dock, _| dock.remove_plugin(slot).map(|_| ()))?;
        debug!(track, slot, "plugin slot removed");
        Ok(())
    }

    /// Hot-swap the handle in a slot. The previous handle is returned once the
    /// render callback can no longer reach it.
    pub fn set_plugin(
        &self,
        track: usize,
        slot: usize,
        plugin: Option<Box<dyn HostedPlugin>>,
    ) -> Result<Option<Box<dyn HostedPlugin>>> {
        self.with_dock(track, |dock, render| dock.set_plugin(slot, plugin, render))
    }

    pub fn set_plugin_bypass(&self, track: usize, slot: usize, bypassed: bool) -> Result<()> {
        self.with_dock(track, |dock, _| dock.set_bypass(slot, bypassed))
    }

    pub fn is_plugin_bypassed(&self, track: usize, slot: usize) -> Result<bool> {
        self.with_dock(track, |dock, _| {
            dock.is_bypassed(slot)
                .ok_or(GraphError::index("plugin", slot, dock.len()))
        })
    }

    pub fn set_plugin_midi_channel(&self, track: usize, slot: usize, channel: u8) -> Result<()> {
        self.with_decorator(track, slot, |d| d.set_midi_channel(channel))
    }

    pub fn set_plugin_cc_link(
        &self,
        track: usize,
        slot: usize,
        controller: u8,
        parameter: Option<usize>,
    ) -> Result<()> {
        self.with_decorator(track, slot, |d| d.set_cc_link(controller, parameter))
    }

    /// Bind `parameter` to the next CC the slot receives.
    pub fn listen_plugin_cc(&self, track: usize, slot: usize, parameter: usize) -> Result<()> {
        self.with_decorator(track, slot, |d| d.listen_cc(parameter))
    }

    pub fn set_plugin_strip_cc(&self, track: usize, slot: usize, strip: bool) -> Result<()> {
        self.with_decorator(track, slot, |d| d.set_strip_cc(strip))
    }

    pub fn set_plugin_strip_midi_output(&self, track: usize, slot: usize, strip: bool) -> Result<()> {
        self.with_decorator(track, slot, |d| d.set_strip_midi_output(strip))
    }
}

#[cfg(test)]
mod tests {
    use crate::audio::PanLaw;
    use crate::config::EngineConfig;
    use crate::graph::{AudioGraph, Link};

    #[test]
    fn mixer_edits_land_on_the_right_track() {
        let graph = AudioGraph::new(EngineConfig::default());
        graph.insert_track(0, 2).unwrap();
        graph.insert_track(1, 2).unwrap();
        graph.set_track_gain(1, -6.0).unwrap();
        graph.set_track_pan(1, 3.0).unwrap();
        graph.set_track_pan_law(1, PanLaw::ConstantPower).unwrap();
        graph.set_track_mute(0, true).unwrap();

        let mixer = graph.mixer(1).unwrap();
        assert_eq!(mixer.gain_db, -6.0);
        assert_eq!(mixer.pan, 1.0);
        assert_eq!(mixer.pan_law, PanLaw::ConstantPower);
        assert!(graph.mixer(0).unwrap().muted);
        assert!(graph.set_track_slider(2, 0.0).is_err());
    }

    #[test]
    fn sidechains_widen_track_input() {
        let graph = AudioGraph::new(EngineConfig::default());
        graph.insert_track(0, 2).unwrap();
        graph.insert_track(1, 2).unwrap();
        assert!(graph.connect(Link::audio_track_to_track(0, 0, 1, 2)).is_err());

        assert_eq!(graph.add_track_sidechain(1).unwrap().input_channels(), 4);
        graph.connect(Link::audio_track_to_track(0, 0, 1, 2)).unwrap();

        graph.remove_track_sidechain(1).unwrap();
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.remove_track_sidechain(1).is_err());
    }

    #[test]
    fn plugin_slots_and_bypass() {
        let graph = AudioGraph::new(EngineConfig::default());
        graph.insert_track(0, 2).unwrap();
        graph.insert_plugin(0, 0).unwrap();
        graph.insert_plugin(0, 1).unwrap();
        graph.set_plugin_bypass(0, 1, true).unwrap();
        assert_eq!(graph.plugin_count(0).unwrap(), 2);
        assert!(graph.is_plugin_bypassed(0, 1).unwrap());
        graph.remove_plugin(0, 0).unwrap();
        assert!(graph.is_plugin_bypassed(0, 0).unwrap());
        assert!(graph.set_plugin_bypass(0, 4, true).is_err());
        graph.set_plugin_midi_channel(0, 0, 3).unwrap();
        assert_eq!(graph.with_decorator(0, 0, |d| d.midi_channel()).unwrap(), 3);
    }
}
