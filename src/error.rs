//! Error types for control-thread graph operations.
//!
//! The real-time path never produces these; it degrades to silence instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("{what} index {index} out of range (len {len})")]
    InvalidIndex {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("channel {channel} outside bus of {available} channels")]
    InvalidChannel { channel: usize, available: usize },

    #[error("block [{start}, {end}) overlaps a scheduled block")]
    OverlapRejected { start: f64, end: f64 },

    #[error("split time {time} is not strictly inside [{start}, {end})")]
    NotInterior { time: f64, start: f64, end: f64 },

    #[error("block {index} cannot be joined with its successor")]
    NotAdjacent { index: usize },

    #[error("connection would create a track cycle")]
    Cycle,

    #[error("expected {expected} message, found {found}")]
    SerializationMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("content '{0}' could not be resolved")]
    MissingContent(String),

    #[error("plugin '{0}' could not be loaded")]
    PluginUnavailable(String),

    #[error("RON encode failed: {0}")]
    Ron(#[from] ron::Error),

    #[error("RON decode failed: {0}")]
    RonParse(#[from] ron::error::SpannedError),
}

pub type Result<T> = std::result::Result<T, GraphError>;

impl GraphError {
    pub(crate) fn index(what: &'static str, index: usize, len: usize) -> Self {
        GraphError::InvalidIndex { what, index, len }
    }
}
