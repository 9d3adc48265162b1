use std::collections::BTreeSet;

use tracing::debug;

use crate::locale::Locale;
use crate::model::PageIndex;
use crate::observer::{IntersectionEntry, IntersectionObserver, Layout, ObserverOptions, Viewport};
use crate::render::{Card, CardId};

pub const DEFAULT_INDICATOR_THRESHOLD: f32 = 0.6;

/// Follows which card dominates the viewport and keeps the page indicator in
/// sync with it.
///
/// Every card at or above the threshold is tracked; the topmost of them is
/// the current card. When nothing meets the threshold the last indicator is
/// kept.
#[derive(Debug, Clone)]
pub struct ViewportTracker {
    observer: IntersectionObserver,
    above_threshold: BTreeSet<CardId>,
    current: Option<CardId>,
    indicator: String,
}

impl ViewportTracker {
    pub fn new(threshold: f32) -> Self {
        Self {
            observer: IntersectionObserver::new(ObserverOptions {
                threshold,
                root_margin: 0.0,
            }),
            above_threshold: BTreeSet::new(),
            current: None,
            indicator: String::new(),
        }
    }

    /// Starts watching every card of the current render pass. Any previous
    /// subscription is dropped first.
    pub fn attach(&mut self, cards: &[Card]) {
        self.detach();
        for card in cards {
            self.observer.observe(card.id);
        }
    }

    pub fn detach(&mut self) {
        self.observer.disconnect();
        self.above_threshold.clear();
        self.current = None;
    }

    pub fn is_attached(&self) -> bool {
        !self.observer.is_empty()
    }

    pub fn current(&self) -> Option<CardId> {
        self.current
    }

    pub fn indicator(&self) -> &str {
        &self.indicator
    }

    /// Runs the observer against the new geometry. Returns the new indicator
    /// text when it changed.
    pub fn observe(
        &mut self,
        layout: &Layout,
        viewport: &Viewport,
        index: &PageIndex,
        locale: Locale,
    ) -> Option<String> {
        let entries = self.observer.process(layout, viewport);
        self.handle_entries(&entries, index, locale)
    }

    /// Applies one batch of observation entries.
    pub fn handle_entries(
        &mut self,
        entries: &[IntersectionEntry],
        index: &PageIndex,
        locale: Locale,
    ) -> Option<String> {
        let mut changed = false;
        for entry in entries {
            if !self.observer.is_observing(entry.card) {
                continue;
            }
            changed |= if entry.is_intersecting {
                self.above_threshold.insert(entry.card)
            } else {
                self.above_threshold.remove(&entry.card)
            };
        }
        // A quiet batch keeps whatever card was last made current, including
        // one pinned by a jump.
        if !changed {
            return None;
        }

        let topmost = self.above_threshold.iter().next().copied()?;
        self.set_current(topmost, index, locale)
    }

    /// Forces the current card, as done after a navigator jump.
    pub fn set_current(
        &mut self,
        card: CardId,
        index: &PageIndex,
        locale: Locale,
    ) -> Option<String> {
        let page = index.get(card.position)?;
        self.current = Some(card);
        let indicator = locale.indicator(page);
        if indicator == self.indicator {
            return None;
        }
        debug!(card = card.position, %indicator, "indicator changed");
        self.indicator = indicator.clone();
        Some(indicator)
    }
}

impl Default for ViewportTracker {
    fn default() -> Self {
        Self::new(DEFAULT_INDICATOR_THRESHOLD)
    }
}
