use crate::locale::Locale;
use crate::model::PageIndex;
use crate::navigator::{key_for, NavigationKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarEntry {
    pub text: String,
    pub key: NavigationKey,
}

/// Table of contents mirroring the page index.
#[derive(Debug, Clone, Default)]
pub struct Sidebar {
    entries: Vec<SidebarEntry>,
    open: bool,
    selected: usize,
    scroll_offset: usize,
}

impl Sidebar {
    pub fn build(index: &PageIndex, locale: Locale) -> Self {
        let entries = index
            .iter()
            .enumerate()
            .filter_map(|(position, page)| {
                Some(SidebarEntry {
                    text: locale.title(page),
                    key: key_for(index, position)?,
                })
            })
            .collect();
        Self {
            entries,
            open: false,
            selected: 0,
            scroll_offset: 0,
        }
    }

    pub fn entries(&self) -> &[SidebarEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Flips between open and closed; returns the new state.
    pub fn toggle(&mut self) -> bool {
        self.open = !self.open;
        self.open
    }

    /// Closing, whether through the toggle or a click outside the panel.
    pub fn close(&mut self) -> bool {
        std::mem::replace(&mut self.open, false)
    }

    pub fn selected_key(&self) -> Option<&NavigationKey> {
        self.entries.get(self.selected).map(|entry| &entry.key)
    }

    pub fn select(&mut self, position: usize) {
        if !self.entries.is_empty() {
            self.selected = position.min(self.entries.len() - 1);
        }
    }

    pub fn move_selection(&mut self, delta: isize) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let len = self.entries.len() as isize;
        let next = (self.selected as isize + delta).clamp(0, len - 1) as usize;
        if next != self.selected {
            self.selected = next;
            true
        } else {
            false
        }
    }

    /// Adjusts the scroll offset so the selection fits in `height` rows.
    pub fn ensure_visible(&mut self, height: usize) {
        if height == 0 || self.entries.is_empty() {
            self.scroll_offset = 0;
            return;
        }
        let max_offset = self.entries.len().saturating_sub(height);
        self.scroll_offset = self.scroll_offset.min(max_offset);
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + height {
            self.scroll_offset = self.selected + 1 - height;
        }
    }
}
