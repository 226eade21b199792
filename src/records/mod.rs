//! Item log implementation.
//!
//! Items are stored as `Put`/`Delete` entries in an append-only log, with
//! an in-memory index from id to the offset of each item's latest version.

mod index;
mod log;

pub use index::ItemIndex;
pub use log::{EntryIterator, ItemLog, LogEntry};
