use std::collections::HashSet;

use tracing::trace;

use crate::observer::{IntersectionObserver, Layout, ObserverOptions, Viewport};
use crate::render::{Card, CardId};

pub const DEFAULT_LAZY_MARGIN_ROWS: f32 = 8.0;

/// Defers image fetches until a card comes within `margin` rows of the
/// viewport. Each watch fires once and then retires, so a card's image is
/// handed out at most once per render pass.
#[derive(Debug, Clone)]
pub struct LazyImageLoader {
    observer: IntersectionObserver,
    released: HashSet<CardId>,
}

impl LazyImageLoader {
    pub fn new(margin: f32) -> Self {
        Self {
            observer: IntersectionObserver::new(ObserverOptions {
                threshold: 0.0,
                root_margin: margin,
            }),
            released: HashSet::new(),
        }
    }

    /// Watches every card whose image has not been fetched yet.
    pub fn attach(&mut self, cards: &[Card]) {
        self.detach();
        for card in cards.iter().filter(|card| card.image.is_pending()) {
            self.observer.observe(card.id);
        }
    }

    pub fn detach(&mut self) {
        self.observer.disconnect();
        self.released.clear();
    }

    pub fn pending(&self) -> usize {
        self.observer.len()
    }

    pub fn was_released(&self, card: CardId) -> bool {
        self.released.contains(&card)
    }

    /// Returns the cards whose image should be fetched now, in document order.
    pub fn poll(&mut self, layout: &Layout, viewport: &Viewport) -> Vec<CardId> {
        let mut due = Vec::new();
        for entry in self.observer.process(layout, viewport) {
            if !entry.is_intersecting {
                continue;
            }
            self.observer.unobserve(entry.card);
            if self.released.insert(entry.card) {
                trace!(card = entry.card.position, "image due");
                due.push(entry.card);
            }
        }
        due
    }
}

impl Default for LazyImageLoader {
    fn default() -> Self {
        Self::new(DEFAULT_LAZY_MARGIN_ROWS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::Locale;
    use crate::manifest::Manifest;
    use crate::render::render_cards;

    fn cards(count: usize) -> Vec<Card> {
        let pages: Vec<String> = (0..count).map(|i| format!("\"p{i}.png\"")).collect();
        let payload = format!(r#"{{"title":"T","pages":[{}]}}"#, pages.join(","));
        let index = Manifest::from_json(&payload).unwrap().index;
        render_cards(&index, 0, Locale::En)
    }

    #[test]
    fn releases_only_cards_near_the_viewport() {
        let cards = cards(5);
        let layout = Layout::stack(cards.iter().map(|c| c.id), 8.0, 0.0);
        let viewport = Viewport::new(10.0);
        let mut loader = LazyImageLoader::new(2.0);
        loader.attach(&cards);

        let due = loader.poll(&layout, &viewport);
        let positions: Vec<_> = due.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1]);
        assert_eq!(loader.pending(), 3);
    }

    #[test]
    fn each_card_is_released_once() {
        let cards = cards(3);
        let layout = Layout::stack(cards.iter().map(|c| c.id), 8.0, 0.0);
        let mut viewport = Viewport::new(10.0);
        let mut loader = LazyImageLoader::new(0.0);
        loader.attach(&cards);

        assert_eq!(loader.poll(&layout, &viewport).len(), 1);
        viewport.scroll_to(10.0, &layout);
        assert_eq!(loader.poll(&layout, &viewport).len(), 1);
        viewport.scroll_to(0.0, &layout);
        assert!(loader.poll(&layout, &viewport).is_empty());
        assert!(loader.was_released(cards[0].id));
        assert!(!loader.was_released(cards[2].id));
    }

    #[test]
    fn far_away_cards_are_never_released() {
        let cards = cards(20);
        let layout = Layout::stack(cards.iter().map(|c| c.id), 8.0, 0.0);
        let viewport = Viewport::new(10.0);
        let mut loader = LazyImageLoader::default();
        loader.attach(&cards);
        loader.poll(&layout, &viewport);
        assert!(!loader.was_released(cards[19].id));
        assert_eq!(loader.pending(), 18);
    }
}
