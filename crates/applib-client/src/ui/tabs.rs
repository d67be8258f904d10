//! Left and right tab strips.

use super::sort::{Sorter, Weighted};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabEntry {
    pub label: String,
    pub weight: i64,
    pub action: String,
    pub focused: bool,
}

impl Weighted for TabEntry {
    fn weight(&self) -> i64 {
        self.weight
    }
}

/// One tab container plus the URL its content area currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabStrip {
    entries: Vec<TabEntry>,
    active_url: Option<String>,
}

impl TabStrip {
    pub fn entries(&self) -> &[TabEntry] {
        &self.entries
    }

    pub fn focused(&self) -> Option<&TabEntry> {
        self.entries.iter().find(|e| e.focused)
    }

    pub fn active_url(&self) -> Option<&str> {
        self.active_url.as_deref()
    }

    /// Append an entry; labels are not deduplicated.
    pub(crate) fn push(&mut self, entry: TabEntry, sorter: &Sorter<'_>) {
        if entry.focused {
            self.clear_focus();
        }
        self.entries.push(entry);
        sorter.arrange(&mut self.entries);
    }

    /// Focus the entry at `index`, returning its action.
    pub(crate) fn focus(&mut self, index: usize) -> Option<String> {
        if index >= self.entries.len() {
            return None;
        }
        self.clear_focus();
        let entry = &mut self.entries[index];
        entry.focused = true;
        Some(entry.action.clone())
    }

    pub(crate) fn set_active_url(&mut self, url: &str) {
        self.active_url = Some(url.to_string());
    }

    fn clear_focus(&mut self) {
        for entry in &mut self.entries {
            entry.focused = false;
        }
    }
}
