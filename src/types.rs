//! Core types for the item store.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Unique identifier for an item, assigned by the store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl ItemId {
    /// The id after this one. Only a damaged log can carry an id with no
    /// successor.
    pub fn next(self) -> Result<Self> {
        self.0
            .checked_add(1)
            .map(ItemId)
            .ok_or_else(|| StoreError::Corruption(format!("item id {} has no successor", self.0)))
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single inventory entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier (assigned by store).
    pub id: ItemId,

    /// Display label.
    pub name: String,

    /// Units in stock.
    pub quantity: u64,
}

/// Selects which items a listing yields.
#[derive(Clone, Default)]
pub enum ItemFilter {
    /// Every item.
    #[default]
    All,

    /// Items whose name contains the term, ignoring case.
    /// The term is stored lower-cased.
    NameContains(String),

    /// Arbitrary caller-supplied predicate.
    Predicate(Arc<dyn Fn(&Item) -> bool + Send + Sync>),
}

impl ItemFilter {
    /// Case-insensitive substring match on the name. An empty (or
    /// whitespace-only) term matches everything.
    pub fn name_contains(term: &str) -> Self {
        let term = term.trim();
        if term.is_empty() {
            ItemFilter::All
        } else {
            ItemFilter::NameContains(term.to_lowercase())
        }
    }

    pub fn predicate(f: impl Fn(&Item) -> bool + Send + Sync + 'static) -> Self {
        ItemFilter::Predicate(Arc::new(f))
    }

    pub fn matches(&self, item: &Item) -> bool {
        match self {
            ItemFilter::All => true,
            ItemFilter::NameContains(term) => item.name.to_lowercase().contains(term.as_str()),
            ItemFilter::Predicate(f) => f(item),
        }
    }
}

impl fmt::Debug for ItemFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemFilter::All => write!(f, "All"),
            ItemFilter::NameContains(term) => f.debug_tuple("NameContains").field(term).finish(),
            ItemFilter::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StoreStats {
    pub item_count: u64,
    pub total_quantity: u64,
    pub log_entries: u64,
    pub log_size_bytes: u64,
    pub next_id: u64,
}
