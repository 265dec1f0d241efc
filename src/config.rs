use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Result;

/// Engine construction parameters.
///
/// Every field has a default, so a RON document only needs to name what it
/// overrides:
///
/// ```ignore
/// let config = EngineConfig::from_ron("(sample_rate: 44100.0, block_size: 256)")?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: f64,
    pub block_size: usize,
    pub input_channels: usize,
    pub output_channels: usize,
    /// Capacity of the real-time → control thread message queue.
    pub async_queue_capacity: usize,
    /// Engine host poll interval in milliseconds.
    pub tick_ms: u64,
    pub realtime: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 512,
            input_channels: 2,
            output_channels: 2,
            async_queue_capacity: 1024,
            tick_ms: 5,
            realtime: true,
        }
    }
}

impl EngineConfig {
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn render(&self) -> RenderConfig {
        RenderConfig {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            realtime: self.realtime,
        }
    }
}

/// The part of the configuration every processing node is prepared with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
    pub sample_rate: f64,
    pub block_size: usize,
    pub realtime: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        EngineConfig::default().render()
    }
}
