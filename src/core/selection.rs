//! Row selection for bulk operations

use indexmap::IndexSet;
use serde_json::Value;

use crate::core::value::{ItemId, item_id};

/// Selected row identities, in selection order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    selected: IndexSet<ItemId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, id: impl Into<ItemId>) {
        self.selected.insert(id.into());
    }

    pub fn unselect(&mut self, id: &str) {
        self.selected.shift_remove(id);
    }

    pub fn toggle(&mut self, id: impl Into<ItemId>) {
        let id = id.into();
        if !self.selected.shift_remove(&id) {
            self.selected.insert(id);
        }
    }

    /// Replace the selection with every id in `ids`
    pub fn select_all<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        self.selected = ids.into_iter().map(Into::into).collect();
    }

    /// Select every id in `ids`, or clear when they are all selected already
    pub fn toggle_all(&mut self, ids: &[ItemId]) {
        if self.is_all_selected(ids) {
            self.clear();
        } else {
            self.select_all(ids.iter().cloned());
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    /// Whether `ids` is non-empty and fully selected
    pub fn is_all_selected(&self, ids: &[ItemId]) -> bool {
        !ids.is_empty() && ids.iter().all(|id| self.selected.contains(id))
    }

    /// Whether some, but not all, of `ids` are selected
    pub fn is_some_selected(&self, ids: &[ItemId]) -> bool {
        let count = ids.iter().filter(|id| self.selected.contains(*id)).count();
        count > 0 && count < ids.len()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.selected.iter()
    }

    /// Items of `items` whose identity is selected, in collection order
    pub fn selected_items<'a>(&self, items: &'a [Value], id_field: Option<&str>) -> Vec<&'a Value> {
        items
            .iter()
            .enumerate()
            .filter(|(index, item)| self.selected.contains(&item_id(item, id_field, *index)))
            .map(|(_, item)| item)
            .collect()
    }

    /// Keep only ids still present in `ids`
    pub fn retain_existing(&mut self, ids: &[ItemId]) {
        self.selected.retain(|id| ids.contains(id));
    }
}
