//! Per-project property map.

use crate::model::project::ProjectName;
use crate::property::cell::{LocalLookup, PropertyCell};
use crate::property::value::PropertyValue;
use std::collections::BTreeMap;

/// Key to cell mapping owned by exactly one project.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyStore {
    owner: ProjectName,
    cells: BTreeMap<String, PropertyCell>,
}

impl PropertyStore {
    pub fn new(owner: ProjectName) -> Self {
        Self {
            owner,
            cells: BTreeMap::new(),
        }
    }

    pub fn owner(&self) -> &ProjectName {
        &self.owner
    }

    pub fn get(&self, key: &str) -> Option<&PropertyCell> {
        self.cells.get(key)
    }

    /// Whether a cell exists for `key`, explicit or not.
    pub fn contains(&self, key: &str) -> bool {
        self.cells.contains_key(key)
    }

    pub fn get_or_create(&mut self, key: &str) -> &mut PropertyCell {
        let owner = &self.owner;
        self.cells
            .entry(key.to_string())
            .or_insert_with(|| PropertyCell::new(key, owner.clone()))
    }

    pub fn set(&mut self, key: &str, value: PropertyValue) {
        self.get_or_create(key).set(value);
    }

    pub fn clear(&mut self, key: &str) {
        self.get_or_create(key).clear();
    }

    /// Returns the cell to the inherited state. Returns `false` when no cell
    /// existed.
    pub fn reset(&mut self, key: &str) -> bool {
        match self.cells.get_mut(key) {
            Some(cell) => {
                cell.reset();
                true
            }
            None => false,
        }
    }

    /// Adds a restored cell without binding its value; `bind_values` runs
    /// once loading completes.
    pub fn restore_cell(&mut self, cell: PropertyCell) {
        self.cells.insert(cell.key().to_string(), cell);
    }

    /// Adds a cell taken from another store, rebinding it to this store.
    pub fn insert_cell(&mut self, mut cell: PropertyCell) {
        cell.rebind(&self.owner);
        self.cells.insert(cell.key().to_string(), cell);
    }

    pub fn lookup(&self, key: &str) -> LocalLookup {
        self.cells
            .get(key)
            .map_or(LocalLookup::Inherit, PropertyCell::lookup)
    }

    /// Imports every cell of `other`.
    ///
    /// With `overwrite == false`, explicit local cells are kept; inherited
    /// or missing ones are replaced. Returns the number of cells written.
    pub fn merge(&mut self, other: &PropertyStore, overwrite: bool) -> usize {
        let mut written = 0;
        for (key, cell) in &other.cells {
            let keep_local = self
                .cells
                .get(key)
                .is_some_and(|local| local.is_explicit() && !overwrite);
            if keep_local {
                continue;
            }
            self.insert_cell(cell.clone());
            written += 1;
        }
        written
    }

    /// Rebinds every step-bearing value to the owner.
    pub fn bind_values(&mut self) {
        let owner = self.owner.clone();
        for cell in self.cells.values_mut() {
            cell.rebind(&owner);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyCell> {
        self.cells.values()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::PropertyStore;
    use crate::model::project::ProjectName;
    use crate::property::cell::LocalLookup;
    use crate::property::value::PropertyValue;

    fn text(value: &str) -> PropertyValue {
        PropertyValue::Text(value.to_string())
    }

    fn store(owner: &str) -> PropertyStore {
        PropertyStore::new(ProjectName::parse(owner).unwrap())
    }

    #[test]
    fn get_or_create_starts_inherited() {
        let mut store = store("app");
        assert!(!store.contains("k"));
        assert!(!store.get_or_create("k").is_explicit());
        assert!(store.contains("k"));
        assert_eq!(store.lookup("k"), LocalLookup::Inherit);
    }

    #[test]
    fn merge_without_overwrite_only_fills_gaps() {
        let mut target = store("app");
        target.set("kept", text("local"));
        target.get_or_create("inherited");

        let mut source = store("legacy");
        source.set("kept", text("incoming"));
        source.set("inherited", text("incoming"));
        source.set("new", text("incoming"));

        assert_eq!(target.merge(&source, false), 2);
        assert_eq!(target.lookup("kept"), LocalLookup::Value(text("local")));
        assert_eq!(target.lookup("inherited"), LocalLookup::Value(text("incoming")));
        assert_eq!(target.lookup("new"), LocalLookup::Value(text("incoming")));
        assert!(target.iter().all(|cell| cell.owner().as_str() == "app"));
    }

    #[test]
    fn merge_with_overwrite_replaces_explicit_cells() {
        let mut target = store("app");
        target.set("kept", text("local"));
        let mut source = store("other");
        source.clear("kept");

        assert_eq!(target.merge(&source, true), 1);
        assert_eq!(target.lookup("kept"), LocalLookup::NoValue);
    }

    #[test]
    fn reset_reports_missing_cells() {
        let mut store = store("app");
        assert!(!store.reset("nothing"));
        store.set("k", PropertyValue::Flag(true));
        assert!(store.reset("k"));
        assert_eq!(store.lookup("k"), LocalLookup::Inherit);
    }
}
