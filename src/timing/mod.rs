mod block;
mod source_list;

pub use block::ScheduledBlock;
pub use source_list::{SourceList, SourceLists};
