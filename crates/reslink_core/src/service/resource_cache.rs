//! Session-local mirror of one resource table.
//!
//! # Invariants
//! - Rows are ordered most-recent-first; imports and creates are prepended.
//! - Mutations only follow a successful repository call.
//! - Fan-out merges never touch a sibling's `is_return`.

use crate::model::resource::{ItemId, Resource, ResourceChanges, ResourceId};

/// In-memory collection of resources for one kind.
#[derive(Debug, Clone, Default)]
pub struct ResourceCollection {
    rows: Vec<Resource>,
}

impl ResourceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn all(&self) -> &[Resource] {
        &self.rows
    }

    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn by_owner(&self, owner_item_id: ItemId) -> Vec<&Resource> {
        self.rows
            .iter()
            .filter(|row| row.owner_item_id == owner_item_id)
            .collect()
    }

    pub fn lineage_group(&self, root_id: ResourceId) -> Vec<&Resource> {
        self.rows
            .iter()
            .filter(|row| row.in_lineage_of(root_id))
            .collect()
    }

    /// Inserts at the front, replacing any stale copy with the same id.
    pub fn prepend(&mut self, resource: Resource) {
        self.rows.retain(|row| row.id != resource.id);
        self.rows.insert(0, resource);
    }

    /// Replaces the whole collection with freshly loaded rows.
    pub fn replace_all(&mut self, rows: Vec<Resource>) {
        self.rows = rows;
    }

    /// Replaces the rows owned by one item, keeping everything else.
    pub fn replace_owner(&mut self, owner_item_id: ItemId, rows: Vec<Resource>) {
        self.rows.retain(|row| row.owner_item_id != owner_item_id);
        let mut merged = rows;
        merged.append(&mut self.rows);
        self.rows = merged;
    }

    /// Applies the full change set to the edited row.
    ///
    /// `fallback` is the repository snapshot used when the row was not cached.
    pub fn apply_primary(&mut self, fallback: &Resource, changes: &ResourceChanges) {
        match self.rows.iter().position(|row| row.id == fallback.id) {
            Some(index) => self.rows[index].apply_changes(changes),
            None => {
                let mut row = fallback.clone();
                row.apply_changes(changes);
                self.rows.insert(0, row);
            }
        }
    }

    /// Merges shared fields into every other cached lineage member.
    ///
    /// Returns the number of cached rows touched.
    pub fn apply_fan_out(
        &mut self,
        root_id: ResourceId,
        edited_id: ResourceId,
        changes: &ResourceChanges,
    ) -> usize {
        let mut touched = 0;
        for row in self
            .rows
            .iter_mut()
            .filter(|row| row.id != edited_id && row.in_lineage_of(root_id))
        {
            row.apply_shared(changes);
            touched += 1;
        }
        touched
    }

    /// Overwrites cached rows with freshly read copies. Uncached rows are
    /// skipped.
    pub fn sync_rows(&mut self, fresh: Vec<Resource>) {
        for row in fresh {
            if let Some(index) = self.rows.iter().position(|cached| cached.id == row.id) {
                self.rows[index] = row;
            }
        }
    }

    /// Removes one row. Returns whether it was cached.
    pub fn remove(&mut self, id: ResourceId) -> bool {
        let before = self.rows.len();
        self.rows.retain(|row| row.id != id);
        before != self.rows.len()
    }

    /// Removes every import pointing at `root_id`, keeping the root.
    pub fn remove_imports_of(&mut self, root_id: ResourceId) -> usize {
        let before = self.rows.len();
        self.rows
            .retain(|row| !(row.is_imported && row.source_id == Some(root_id)));
        before - self.rows.len()
    }

    /// Removes a root and every import pointing at it.
    ///
    /// Returns the number of cached rows removed.
    pub fn remove_lineage(&mut self, root_id: ResourceId) -> usize {
        let before = self.rows.len();
        self.rows
            .retain(|row| row.id != root_id && !(row.is_imported && row.source_id == Some(root_id)));
        before - self.rows.len()
    }
}
