//! Viewport geometry and intersection watches.
//!
//! Cards are stacked vertically in row units. An [`IntersectionObserver`]
//! watches a set of cards and, each time [`IntersectionObserver::process`] is
//! called with the current layout and viewport, reports the cards whose
//! intersecting state flipped since the previous call. The first call after
//! `observe` always reports the target, mirroring how a browser delivers the
//! initial state of a freshly observed element.

use std::collections::BTreeMap;

use crate::render::CardId;

/// Rows every card spends on its title and open affordance lines.
pub const CARD_CHROME_ROWS: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardGeometry {
    pub card: CardId,
    /// Distance from the top of the document, in rows.
    pub top: f32,
    pub height: f32,
}

impl CardGeometry {
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }
}

#[derive(Debug, Clone, Default)]
pub struct Layout {
    cards: Vec<CardGeometry>,
    total_height: f32,
}

impl Layout {
    /// Stacks cards of `image_rows` image height separated by `gap` rows.
    pub fn stack(cards: impl IntoIterator<Item = CardId>, image_rows: f32, gap: f32) -> Self {
        let height = (image_rows.max(1.0) + CARD_CHROME_ROWS).round();
        let gap = gap.max(0.0);
        let mut top = 0.0;
        let mut geometry = Vec::new();
        for card in cards {
            if !geometry.is_empty() {
                top += gap;
            }
            geometry.push(CardGeometry { card, top, height });
            top += height;
        }
        Self {
            cards: geometry,
            total_height: top,
        }
    }

    pub fn cards(&self) -> &[CardGeometry] {
        &self.cards
    }

    pub fn geometry(&self, card: CardId) -> Option<&CardGeometry> {
        self.cards
            .get(card.position)
            .filter(|geometry| geometry.card == card)
    }

    pub fn total_height(&self) -> f32 {
        self.total_height
    }
}

/// Visible window over the stacked cards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub offset: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(height: f32) -> Self {
        Self {
            offset: 0.0,
            height: height.max(1.0),
        }
    }

    pub fn max_offset(&self, layout: &Layout) -> f32 {
        (layout.total_height() - self.height).max(0.0)
    }

    /// Moves to `offset`, clamped to the document. Returns whether it moved.
    pub fn scroll_to(&mut self, offset: f32, layout: &Layout) -> bool {
        let next = offset.clamp(0.0, self.max_offset(layout));
        if (next - self.offset).abs() > f32::EPSILON {
            self.offset = next;
            true
        } else {
            false
        }
    }

    pub fn scroll_by(&mut self, delta: f32, layout: &Layout) -> bool {
        self.scroll_to(self.offset + delta, layout)
    }

    pub fn resize(&mut self, height: f32, layout: &Layout) {
        self.height = height.max(1.0);
        self.scroll_to(self.offset, layout);
    }

    /// Rows of `geometry` inside the viewport grown by `margin` on both ends.
    pub fn visible_rows(&self, geometry: &CardGeometry, margin: f32) -> f32 {
        let top = self.offset - margin;
        let bottom = self.offset + self.height + margin;
        (geometry.bottom().min(bottom) - geometry.top.max(top)).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub card: CardId,
    /// Visible share of the card, measured against the smaller of the card and
    /// the (margin-expanded) viewport so that tall cards can reach 1.0.
    pub ratio: f32,
    /// Card top relative to the viewport top, in rows.
    pub top: f32,
    pub is_intersecting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserverOptions {
    pub threshold: f32,
    pub root_margin: f32,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            root_margin: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntersectionObserver {
    options: ObserverOptions,
    targets: BTreeMap<CardId, Option<bool>>,
}

impl IntersectionObserver {
    pub fn new(options: ObserverOptions) -> Self {
        Self {
            options,
            targets: BTreeMap::new(),
        }
    }

    pub fn observe(&mut self, card: CardId) {
        self.targets.entry(card).or_insert(None);
    }

    pub fn unobserve(&mut self, card: CardId) {
        self.targets.remove(&card);
    }

    pub fn disconnect(&mut self) {
        self.targets.clear();
    }

    pub fn is_observing(&self, card: CardId) -> bool {
        self.targets.contains_key(&card)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Reports targets whose intersecting state changed, in document order.
    /// Targets missing from `layout` are skipped.
    pub fn process(&mut self, layout: &Layout, viewport: &Viewport) -> Vec<IntersectionEntry> {
        let margin = self.options.root_margin.max(0.0);
        let threshold = self.options.threshold.clamp(0.0, 1.0);
        let window = viewport.height + 2.0 * margin;
        let mut entries = Vec::new();

        for (card, last) in self.targets.iter_mut() {
            let Some(geometry) = layout.geometry(*card) else {
                continue;
            };
            let visible = viewport.visible_rows(geometry, margin);
            let denominator = geometry.height.min(window);
            let ratio = if denominator > 0.0 {
                (visible / denominator).min(1.0)
            } else {
                0.0
            };
            let is_intersecting = if threshold > 0.0 {
                visible > 0.0 && ratio >= threshold
            } else {
                visible > 0.0
            };

            if *last != Some(is_intersecting) {
                *last = Some(is_intersecting);
                entries.push(IntersectionEntry {
                    card: *card,
                    ratio,
                    top: geometry.top - viewport.offset,
                    is_intersecting,
                });
            }
        }

        entries
    }
}
