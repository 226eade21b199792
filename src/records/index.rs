//! Item indices for efficient lookups.
//!
//! Indices are derived from the log on open and never written to disk.

use crate::types::{Item, ItemId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::RangeBounds;

/// Index mapping item ids to log offsets, plus non-unique secondary
/// indices on name and quantity.
pub struct ItemIndex {
    /// Item ID to offset of its latest `Put`, ascending by id.
    offsets: RwLock<BTreeMap<ItemId, u64>>,

    /// Exact name to item IDs.
    by_name: RwLock<HashMap<String, BTreeSet<ItemId>>>,

    /// Quantity to item IDs.
    by_quantity: RwLock<BTreeMap<u64, BTreeSet<ItemId>>>,
}

impl ItemIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            offsets: RwLock::new(BTreeMap::new()),
            by_name: RwLock::new(HashMap::new()),
            by_quantity: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add an item written at `offset`.
    ///
    /// The caller removes the previous version first when overwriting.
    pub fn insert(&self, item: &Item, offset: u64) {
        self.offsets.write().insert(item.id, offset);

        self.by_name
            .write()
            .entry(item.name.clone())
            .or_default()
            .insert(item.id);

        self.by_quantity
            .write()
            .entry(item.quantity)
            .or_default()
            .insert(item.id);
    }

    /// Drop an item from every index.
    pub fn remove(&self, item: &Item) {
        self.offsets.write().remove(&item.id);

        let mut by_name = self.by_name.write();
        if let Some(ids) = by_name.get_mut(&item.name) {
            ids.remove(&item.id);
            if ids.is_empty() {
                by_name.remove(&item.name);
            }
        }
        drop(by_name);

        let mut by_quantity = self.by_quantity.write();
        if let Some(ids) = by_quantity.get_mut(&item.quantity) {
            ids.remove(&item.id);
            if ids.is_empty() {
                by_quantity.remove(&item.quantity);
            }
        }
    }

    /// Get offset for an item ID.
    pub fn offset(&self, id: ItemId) -> Option<u64> {
        self.offsets.read().get(&id).copied()
    }

    /// All live IDs in ascending order.
    pub fn ids(&self) -> Vec<ItemId> {
        self.offsets.read().keys().copied().collect()
    }

    /// IDs of items with exactly this name.
    pub fn ids_named(&self, name: &str) -> Vec<ItemId> {
        self.by_name
            .read()
            .get(name)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// IDs of items whose quantity falls in `range`, ordered by quantity then id.
    pub fn ids_with_quantity(&self, range: impl RangeBounds<u64>) -> Vec<ItemId> {
        self.by_quantity
            .read()
            .range(range)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// Sum of all quantities.
    pub fn total_quantity(&self) -> u64 {
        self.by_quantity
            .read()
            .iter()
            .map(|(quantity, ids)| quantity.saturating_mul(ids.len() as u64))
            .fold(0u64, |acc, q| acc.saturating_add(q))
    }

    /// Get count of items.
    pub fn count(&self) -> usize {
        self.offsets.read().len()
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.offsets.write().clear();
        self.by_name.write().clear();
        self.by_quantity.write().clear();
    }
}

impl Default for ItemIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, name: &str, quantity: u64) -> Item {
        Item {
            id: ItemId(id),
            name: name.to_string(),
            quantity,
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let index = ItemIndex::new();

        index.insert(&item(1, "Widget", 10), 0);

        assert_eq!(index.offset(ItemId(1)), Some(0));
        assert_eq!(index.offset(ItemId(2)), None);
    }

    #[test]
    fn test_ids_ascending() {
        let index = ItemIndex::new();

        index.insert(&item(3, "c", 1), 200);
        index.insert(&item(1, "a", 1), 0);
        index.insert(&item(2, "b", 1), 100);

        assert_eq!(index.ids(), vec![ItemId(1), ItemId(2), ItemId(3)]);
    }

    #[test]
    fn test_name_index_is_not_unique() {
        let index = ItemIndex::new();

        index.insert(&item(1, "Bolt", 3), 0);
        index.insert(&item(2, "Bolt", 7), 100);
        index.insert(&item(3, "Nut", 7), 200);

        assert_eq!(index.ids_named("Bolt"), vec![ItemId(1), ItemId(2)]);
        assert!(index.ids_named("bolt").is_empty());
    }

    #[test]
    fn test_quantity_range() {
        let index = ItemIndex::new();

        index.insert(&item(1, "a", 0), 0);
        index.insert(&item(2, "b", 5), 100);
        index.insert(&item(3, "c", 2), 200);
        index.insert(&item(4, "d", 9), 300);

        assert_eq!(index.ids_with_quantity(..=2), vec![ItemId(1), ItemId(3)]);
        assert_eq!(index.total_quantity(), 16);
    }

    #[test]
    fn test_remove_cleans_secondary_indices() {
        let index = ItemIndex::new();

        let old = item(1, "Bolt", 3);
        index.insert(&old, 0);
        index.remove(&old);
        index.insert(&item(1, "Bolt", 8), 100);

        assert_eq!(index.offset(ItemId(1)), Some(100));
        assert!(index.ids_with_quantity(3..=3).is_empty());
        assert_eq!(index.ids_with_quantity(8..=8), vec![ItemId(1)]);
        assert_eq!(index.count(), 1);

        index.remove(&item(1, "Bolt", 8));
        assert!(index.ids_named("Bolt").is_empty());
        assert_eq!(index.count(), 0);
    }
}
