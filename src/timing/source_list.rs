use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::ScheduledBlock;
use crate::graph::NodeId;
use crate::{GraphError, Result};

/// Sorted, non-overlapping blocks of one sequencer source.
///
/// Lookups remember the index they resolved to, so consecutive playback
/// windows are answered without a fresh binary search. The cursor is atomic
/// because the render thread queries under a shared read lock.
#[derive(Debug, Default)]
pub struct SourceList {
    blocks: Vec<ScheduledBlock>,
    cursor: AtomicUsize,
    steps: AtomicUsize,
}

impl Clone for SourceList {
    fn clone(&self) -> Self {
        Self {
            blocks: self.blocks.clone(),
            cursor: AtomicUsize::new(0),
            steps: AtomicUsize::new(0),
        }
    }
}

impl SourceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ScheduledBlock> {
        self.blocks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScheduledBlock> {
        self.blocks.iter()
    }

    /// Insert by start time. Returns the index the block landed at.
    pub fn add(&mut self, block: ScheduledBlock) -> Result<usize> {
        if !(block.end > block.start) {
            return Err(GraphError::OverlapRejected {
                start: block.start,
                end: block.end,
            });
        }
        let at = self.blocks.partition_point(|b| b.start < block.start);
        let hits_prev = at > 0 && self.blocks[at - 1].end > block.start;
        let hits_next = at < self.blocks.len() && self.blocks[at].start < block.end;
        if hits_prev || hits_next {
            return Err(GraphError::OverlapRejected {
                start: block.start,
                end: block.end,
            });
        }
        self.blocks.insert(at, block);
        self.reset_cursor();
        Ok(at)
    }

    pub fn remove(&mut self, index: usize) -> Result<ScheduledBlock> {
        if index >= self.blocks.len() {
            return Err(GraphError::index("block", index, self.blocks.len()));
        }
        self.reset_cursor();
        Ok(self.blocks.remove(index))
    }

    /// Cut block `index` at `time`, which must lie strictly inside it.
    pub fn split(&mut self, index: usize, time: f64) -> Result<()> {
        let len = self.blocks.len();
        let block = self
            .blocks
            .get_mut(index)
            .ok_or(GraphError::index("block", index, len))?;
        if !(time > block.start && time < block.end) {
            return Err(GraphError::NotInterior {
                time,
                start: block.start,
                end: block.end,
            });
        }
        let mut tail = block.clone();
        tail.start = time;
        tail.offset = block.offset - (time - block.start);
        block.end = time;
        self.blocks.insert(index + 1, tail);
        self.reset_cursor();
        Ok(())
    }

    /// Merge block `index` with its successor when the two are an exact
    /// continuation of the same content.
    pub fn stick_with_next(&mut self, index: usize) -> Result<()> {
        let len = self.blocks.len();
        if index.checked_add(1).is_none_or(|next| next >= len) {
            return Err(GraphError::index("block", index, len));
        }
        let (a, b) = (&self.blocks[index], &self.blocks[index + 1]);
        let continuous = a.end == b.start
            && a.same_content(b)
            && b.offset == a.offset - (b.start - a.start);
        if !continuous {
            return Err(GraphError::NotAdjacent { index });
        }
        let end = b.end;
        self.blocks[index].end = end;
        self.blocks.remove(index + 1);
        self.reset_cursor();
        Ok(())
    }

    /// Inclusive index range of blocks intersecting `[start, end)`.
    pub fn match_range(&self, start: f64, end: f64) -> Option<(usize, usize)> {
        if !(end > start) || self.blocks.is_empty() {
            self.steps.store(0, Ordering::Relaxed);
            return None;
        }
        let first = self.first_ending_after(start);
        if first >= self.blocks.len() || self.blocks[first].start >= end {
            return None;
        }
        let mut last = first;
        while last + 1 < self.blocks.len() && self.blocks[last + 1].start < end {
            last += 1;
        }
        Some((first, last))
    }

    /// Search steps spent by the most recent [`match_range`](Self::match_range).
    pub fn last_search_steps(&self) -> usize {
        self.steps.load(Ordering::Relaxed)
    }

    pub fn tail_seconds(&self) -> f64 {
        self.blocks.last().map_or(0.0, |b| b.end)
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.reset_cursor();
    }

    fn reset_cursor(&mut self) {
        *self.cursor.get_mut() = 0;
    }

    fn is_first_ending_after(&self, index: usize, time: f64) -> bool {
        let len = self.blocks.len();
        index <= len
            && (index == 0 || self.blocks[index - 1].end <= time)
            && (index == len || self.blocks[index].end > time)
    }

    /// Index of the first block whose end lies after `time`.
    fn first_ending_after(&self, time: f64) -> usize {
        let cached = self.cursor.load(Ordering::Relaxed);
        for (probe, candidate) in [cached, cached + 1].into_iter().enumerate() {
            if self.is_first_ending_after(candidate, time) {
                self.steps.store(probe + 1, Ordering::Relaxed);
                self.cursor.store(candidate, Ordering::Relaxed);
                return candidate;
            }
        }

        let (mut lo, mut hi) = (0, self.blocks.len());
        let mut steps = 2;
        while lo < hi {
            steps += 1;
            let mid = lo + (hi - lo) / 2;
            if self.blocks[mid].end <= time {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        self.steps.store(steps, Ordering::Relaxed);
        self.cursor.store(lo, Ordering::Relaxed);
        lo
    }
}

/// Block lists of every sequencer source, keyed by node id. Guarded by the
/// source-list lock.
#[derive(Debug, Default, Clone)]
pub struct SourceLists {
    lists: HashMap<NodeId, SourceList>,
}

impl SourceLists {
    pub fn get(&self, id: NodeId) -> Option<&SourceList> {
        self.lists.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SourceList> {
        self.lists.get_mut(&id)
    }

    pub(crate) fn insert(&mut self, id: NodeId, list: SourceList) {
        self.lists.insert(id, list);
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<SourceList> {
        self.lists.remove(&id)
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(NodeId) -> bool) {
        self.lists.retain(|id, _| keep(*id));
    }

    pub fn max_tail_seconds(&self) -> f64 {
        self.lists
            .values()
            .map(SourceList::tail_seconds)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(blocks: &[(f64, f64, f64)]) -> SourceList {
        let mut list = SourceList::new();
        for &(s, e, o) in blocks {
            list.add(ScheduledBlock::new(s, e, o)).unwrap();
        }
        list
    }

    #[test]
    fn match_finds_intersecting_range() {
        let list = list(&[(0.0, 5.0, 0.0), (5.0, 10.0, 0.0), (12.0, 15.0, 2.0)]);
        assert_eq!(list.match_range(6.0, 13.0), Some((1, 2)));
        assert_eq!(list.match_range(16.0, 20.0), None);
        assert_eq!(list.match_range(10.0, 12.0), None);
        assert_eq!(list.match_range(0.0, 0.5), Some((0, 0)));
        assert_eq!(list.match_range(3.0, 3.0), None);
    }

    #[test]
    fn sequential_match_uses_cached_index() {
        let blocks: Vec<_> = (0..1000)
            .map(|i| (i as f64, i as f64 + 1.0, 0.0))
            .collect();
        let list = list(&blocks);

        assert_eq!(list.match_range(700.25, 700.5), Some((700, 700)));
        assert!(list.last_search_steps() > 2);

        assert_eq!(list.match_range(700.5, 700.75), Some((700, 700)));
        assert_eq!(list.last_search_steps(), 1);

        assert_eq!(list.match_range(701.0, 701.25), Some((701, 701)));
        assert!(list.last_search_steps() <= 2);
    }

    #[test]
    fn seek_falls_back_to_binary_search() {
        let blocks: Vec<_> = (0..64).map(|i| (i as f64, i as f64 + 1.0, 0.0)).collect();
        let list = list(&blocks);
        list.match_range(10.0, 10.5);
        assert_eq!(list.match_range(50.0, 50.5), Some((50, 50)));
        assert!(list.last_search_steps() > 2);
    }

    #[test]
    fn overlapping_insert_is_rejected() {
        let mut list = list(&[(0.0, 5.0, 0.0), (10.0, 15.0, 0.0)]);
        assert!(matches!(
            list.add(ScheduledBlock::new(4.0, 6.0, 0.0)),
            Err(GraphError::OverlapRejected { .. })
        ));
        assert!(list.add(ScheduledBlock::new(9.0, 11.0, 0.0)).is_err());
        assert!(list.add(ScheduledBlock::new(1.0, 2.0, 0.0)).is_err());
        assert!(list.add(ScheduledBlock::new(6.0, 6.0, 0.0)).is_err());
        assert_eq!(list.add(ScheduledBlock::new(5.0, 10.0, 0.0)).unwrap(), 1);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn split_then_stick_restores_block() {
        let mut list = list(&[(0.0, 10.0, -1.0)]);
        assert!(list.split(0, 0.0).is_err());
        assert!(list.split(0, 10.0).is_err());
        list.split(0, 4.0).unwrap();
        assert_eq!(list.len(), 2);
        let tail = list.get(1).unwrap();
        assert_eq!((tail.start, tail.end, tail.offset), (4.0, 10.0, -5.0));

        list.stick_with_next(0).unwrap();
        let merged = list.get(0).unwrap();
        assert_eq!((merged.start, merged.end, merged.offset), (0.0, 10.0, -1.0));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn stick_requires_continuous_offsets() {
        let mut list = list(&[(0.0, 5.0, 0.0), (5.0, 10.0, 0.0), (12.0, 15.0, 0.0)]);
        assert!(matches!(
            list.stick_with_next(0),
            Err(GraphError::NotAdjacent { index: 0 })
        ));
        assert!(list.stick_with_next(1).is_err());
        assert!(list.stick_with_next(2).is_err());
        assert!(matches!(
            list.stick_with_next(usize::MAX),
            Err(GraphError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn tail_is_last_end() {
        assert_eq!(SourceList::new().tail_seconds(), 0.0);
        assert_eq!(list(&[(1.0, 2.0, 0.0), (3.0, 7.5, 0.0)]).tail_seconds(), 7.5);
    }
}
