//! Block scheduling on sequencer sources, addressed by source position.

use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use super::{AudioGraph, NodeId};
use crate::timing::{ScheduledBlock, SourceList};
use crate::{GraphError, Result};

impl AudioGraph {
    fn locate_source(&self, source: usize) -> Result<(NodeId, usize)> {
        let graph = self.locks.graph().read();
        Ok((graph.source_at(source)?, graph.sources().len()))
    }

    /// Run `f` on the block list of the source at `source` under the
    /// source-list write lock.
    fn edit_list<R>(&self, source: usize, f: impl FnOnce(&mut SourceList) -> Result<R>) -> Result<R> {
        let (id, len) = self.locate_source(source)?;
        let mut lists = self.locks.sources().write();
        let list = lists
            .get_mut(id)
            .ok_or(GraphError::index("source", source, len))?;
        f(list)
    }

    fn read_list<R>(&self, source: usize, f: impl FnOnce(&SourceList) -> R) -> Result<R> {
        let (id, len) = self.locate_source(source)?;
        let lists = self.locks.sources().read();
        let list = lists
            .get(id)
            .ok_or(GraphError::index("source", source, len))?;
        Ok(f(list))
    }

    /// Schedule `block` on a source. Returns the index it landed at.
    pub fn add_block(&self, source: usize, block: ScheduledBlock) -> Result<usize> {
        let (start, end) = (block.start, block.end);
        let result = self.edit_list(source, |list| list.add(block));
        match &result {
            Ok(index) => debug!(source, index, start, end, "block added"),
            Err(err) => warn!(source, start, end, %err, "block rejected"),
        }
        result
    }

    pub fn remove_block(&self, source: usize, index: usize) -> Result<ScheduledBlock> {
        self.edit_list(source, |list| list.remove(index))
    }

    /// Cut a block in two at `time`.
    pub fn split_block(&self, source: usize, index: usize, time: f64) -> Result<()> {
        self.edit_list(source, |list| list.split(index, time))
    }

    /// Join a block with its successor when they continue the same content.
    pub fn stick_with_next(&self, source: usize, index: usize) -> Result<()> {
        self.edit_list(source, |list| list.stick_with_next(index))
    }

    pub fn blocks(&self, source: usize) -> Result<Vec<ScheduledBlock>> {
        self.read_list(source, |list| list.iter().cloned().collect())
    }

    /// Inclusive index range of the blocks intersecting `[start, end)`.
    pub fn match_blocks(&self, source: usize, start: f64, end: f64) -> Result<Option<(usize, usize)>> {
        self.read_list(source, |list| list.match_range(start, end))
    }

    pub fn source_tail_seconds(&self, source: usize) -> Result<f64> {
        self.read_list(source, SourceList::tail_seconds)
    }

    /// Project length: the latest block end over all sources. The value only
    /// grows until the graph is parsed or cleared.
    pub fn total_length_seconds(&self) -> f64 {
        let tail = self.locks.sources().read().max_tail_seconds();
        let previous = self
            .max_length
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (tail > f64::from_bits(bits)).then_some(tail.to_bits())
            })
            .unwrap_or_else(|bits| bits);
        f64::from_bits(previous).max(tail)
    }

    pub(crate) fn reset_length(&self) {
        let tail = self.locks.sources().read().max_tail_seconds();
        self.max_length.store(tail.to_bits(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::graph::AudioGraph;
    use crate::timing::ScheduledBlock;

    #[test]
    fn length_is_sticky_until_clear() {
        let graph = AudioGraph::new(EngineConfig::default());
        graph.insert_source(0, 2).unwrap();
        graph.add_block(0, ScheduledBlock::new(0.0, 4.0, 0.0)).unwrap();
        graph.add_block(0, ScheduledBlock::new(6.0, 9.0, 0.0)).unwrap();
        assert_eq!(graph.total_length_seconds(), 9.0);

        graph.remove_block(0, 1).unwrap();
        assert_eq!(graph.source_tail_seconds(0).unwrap(), 4.0);
        assert_eq!(graph.total_length_seconds(), 9.0);

        graph.clear().unwrap();
        assert_eq!(graph.total_length_seconds(), 0.0);
    }

    #[test]
    fn bad_source_index_is_reported() {
        let graph = AudioGraph::new(EngineConfig::default());
        assert!(graph.add_block(0, ScheduledBlock::new(0.0, 1.0, 0.0)).is_err());
        assert!(graph.blocks(3).is_err());
    }
}
