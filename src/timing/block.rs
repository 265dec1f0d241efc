use std::sync::{Arc, Weak};

use crate::content::ContentSource;

/// Placement of content inside a sequencer source's timeline. Times are in
/// seconds.
///
/// Content time `c` plays at timeline time `start + offset + c`, so a
/// negative offset skips the head of the content and a positive one delays
/// it inside the block.
#[derive(Debug, Clone)]
pub struct ScheduledBlock {
    pub start: f64,
    pub end: f64,
    pub offset: f64,
    pub content: Option<Weak<dyn ContentSource>>,
    pub content_index: usize,
}

impl ScheduledBlock {
    pub fn new(start: f64, end: f64, offset: f64) -> Self {
        Self {
            start,
            end,
            offset,
            content: None,
            content_index: 0,
        }
    }

    pub fn with_content(mut self, content: &Arc<dyn ContentSource>, index: usize) -> Self {
        self.content = Some(Arc::downgrade(content));
        self.content_index = index;
        self
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    #[inline]
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start < end && self.end > start
    }

    /// Timeline range in which content data actually exists.
    pub fn visible_range(&self, content_length: f64) -> (f64, f64) {
        let from = self.start + self.offset.max(0.0);
        let to = self.end.min(self.start + self.offset + content_length);
        (from, to)
    }

    pub fn content(&self) -> Option<Arc<dyn ContentSource>> {
        self.content.as_ref().and_then(Weak::upgrade)
    }

    pub fn same_content(&self, other: &ScheduledBlock) -> bool {
        let same_ref = match (&self.content, &other.content) {
            (Some(a), Some(b)) => Weak::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_ref && self.content_index == other.content_index
    }
}
