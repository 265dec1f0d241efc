//! Real-time core of a multitrack audio engine.
//!
//! An [`AudioGraph`] routes sequencer sources (scheduled audio and MIDI
//! blocks), tracks (plugin chain plus fader) and the device buses. The
//! control thread edits it through blocking locks; the audio callback calls
//! [`AudioGraph::process_block`], which only ever tries them and renders
//! silence when it cannot get all of them.

pub mod audio;
pub mod buffer;
pub mod config;
pub mod content;
pub mod engine;
mod error;
pub mod events;
pub mod graph;
mod lock;
pub mod plugin;
pub mod timing;
pub mod transport;

pub use config::{EngineConfig, RenderConfig};
pub use engine::{EngineCommand, EngineHandle, EngineUpdate, spawn_engine};
pub use error::{GraphError, Result};
pub use graph::{AudioGraph, CodecConfig, GraphState, Link, NodeId};
pub use lock::{LevelSnapshot, LockDomain};
