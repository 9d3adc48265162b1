use std::sync::Arc;

use anyhow::Result;

use crate::locale::Locale;
use crate::model::PageIndex;

/// Identity of a rendered card. `pass` changes every time the cards are
/// rebuilt, so entries from a stale render can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CardId {
    pub pass: u32,
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Decodes a page image given its (already resolved) manifest source.
pub trait ImageLoader: Send + Sync {
    fn load(&self, source: &str) -> Result<RenderImage>;
}

#[derive(Debug, Clone)]
pub enum ImageSlot {
    /// Not fetched yet; the source is only handed out once the card nears the
    /// viewport.
    Pending,
    Loaded(Arc<RenderImage>),
    Broken { reason: String },
}

impl ImageSlot {
    pub fn is_pending(&self) -> bool {
        matches!(self, ImageSlot::Pending)
    }
}

/// Visual projection of one descriptor.
#[derive(Debug, Clone)]
pub struct Card {
    pub id: CardId,
    pub title: String,
    pub source: String,
    pub image: ImageSlot,
    pub open_label: &'static str,
}

impl Card {
    /// Index of the descriptor this card was built from.
    pub fn descriptor(&self) -> usize {
        self.id.position
    }
}

/// Builds one card per descriptor in index order. Calling it again for a new
/// pass yields a full replacement set.
pub fn render_cards(index: &PageIndex, pass: u32, locale: Locale) -> Vec<Card> {
    index
        .iter()
        .enumerate()
        .map(|(position, page)| Card {
            id: CardId { pass, position },
            title: locale.title(page),
            source: page.image_source().to_string(),
            image: ImageSlot::Pending,
            open_label: locale.open_label(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;

    fn index() -> PageIndex {
        Manifest::from_json(
            r#"{"title":"T","pages":[
                {"label":"Intro","start":null,"end":null,"src":"a.png"},
                {"label":"Ch1","start":1,"end":3,"src":"b.png"},
                {"label":"Ch2","start":4,"end":4,"src":"c.png"}
            ]}"#,
        )
        .unwrap()
        .index
    }

    #[test]
    fn one_card_per_descriptor_in_order() {
        let cards = render_cards(&index(), 0, Locale::En);
        let titles: Vec<_> = cards.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Intro", "Ch1 · page 1–3", "Ch2 · page 4"]);
        assert!(cards.iter().all(|c| c.image.is_pending()));
        assert_eq!(cards[1].descriptor(), 1);
        assert_eq!(cards[2].source, "c.png");
        assert_eq!(cards[0].open_label, "Open");
    }

    #[test]
    fn rerender_replaces_cards_with_new_pass() {
        let index = index();
        let first = render_cards(&index, 0, Locale::En);
        let second = render_cards(&index, 1, Locale::En);
        assert_eq!(first.len(), second.len());
        assert!(first.iter().zip(&second).all(|(a, b)| a.id != b.id));
        assert!(first
            .iter()
            .zip(&second)
            .all(|(a, b)| a.title == b.title && a.descriptor() == b.descriptor()));
    }
}
