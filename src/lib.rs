//! # Stockroom
//!
//! A local inventory tracker: named items with quantities in an embedded,
//! file-backed store, a stock view filtered by a live search term, and a
//! controller that validates every mutation before it reaches the store.
//!
//! ## Core Concepts
//!
//! - **Record store**: append-only item log with an id index and
//!   secondary indexes on name and quantity
//! - **Store service**: worker threads that run store operations and
//!   report completion through callbacks
//! - **Event loop**: one thread that handles UI events and store
//!   continuations in turn
//! - **Mutation controller / stock view**: validation, confirmation and
//!   re-rendering on top of the above
//!
//! ## Example
//!
//! ```ignore
//! use stockroom::{ItemFilter, Pending, RecordStore, StoreConfig, StoreService, ServiceConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(RecordStore::open_or_create(StoreConfig {
//!     path: "./my-stock".into(),
//!     ..Default::default()
//! })?);
//!
//! // Synchronous access
//! let id = store.create("Widget", 10)?;
//! store.update(id, 12)?;
//!
//! // Asynchronous access
//! let service = StoreService::start(store, ServiceConfig::default())?;
//! let (pending, done) = Pending::pair();
//! service.list(ItemFilter::name_contains("wid"), done);
//! let items = pending.wait()?;
//! ```

pub mod app;
pub mod controller;
pub mod error;
pub mod events;
pub mod records;
pub mod service;
pub mod store;
pub mod types;
pub mod view;

// Re-exports
pub use app::{Mutation, StockApp};
pub use controller::{
    validate_new_item, validate_quantity, MutationController, NewItem, Outcome, Prompt,
    ScriptedPrompt,
};
pub use error::{ErrorClass, Result, StoreError, ValidationError};
pub use events::{EventLoop, LoopHandle, UiEvent};
pub use records::{ItemIndex, ItemLog, LogEntry};
pub use service::{Pending, ServiceConfig, StoreService};
pub use store::{CompactionSummary, ItemCursor, RecordStore, StoreConfig};
pub use types::*;
pub use view::{RowAction, StockRow, StockSurface, StockView, TextSurface};
