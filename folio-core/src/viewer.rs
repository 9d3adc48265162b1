use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::ViewerConfig;
use crate::controls::{ThemeMode, ViewControls};
use crate::lazy::LazyImageLoader;
use crate::manifest::ManifestSource;
use crate::model::PageIndex;
use crate::navigator::{self, LocateError, Located};
use crate::observer::{Layout, Viewport};
use crate::render::{render_cards, Card, CardId, ImageLoader, ImageSlot};
use crate::sidebar::Sidebar;
use crate::store::{PreferenceStore, Preferences};
use crate::tracker::ViewportTracker;

#[derive(Debug, Clone)]
pub enum Command {
    ScrollBy { rows: f32 },
    ScrollToTop,
    ScrollToBottom,
    Locate { query: String },
    ToggleSidebar,
    CloseSidebar,
    SidebarMove { delta: isize },
    SidebarActivate,
    ZoomIn,
    ZoomOut,
    SetZoom { scale: f32 },
    FitWidth,
    ToggleFullscreen,
    ToggleTheme,
    Resize { rows: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    TitleChanged(String),
    CardsRendered { pass: u32, count: usize },
    SidebarBuilt { entries: usize },
    IndicatorChanged(String),
    ScrollTo { card: CardId, smooth: bool },
    Notice(String),
    ImageLoaded(CardId),
    ImageFailed { card: CardId, reason: String },
    ThemeChanged(ThemeMode),
    ZoomChanged(f32),
    FullscreenChanged(bool),
    SidebarToggled(bool),
    LoadFailed(String),
    RedrawNeeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Empty,
    Ready,
    Failed(String),
}

/// Owns every piece of viewer state and routes commands to the components.
pub struct Viewer {
    config: ViewerConfig,
    state: LoadState,
    title: Option<String>,
    index: PageIndex,
    cards: Vec<Card>,
    pass: Option<u32>,
    layout: Layout,
    viewport: Viewport,
    tracker: ViewportTracker,
    lazy: LazyImageLoader,
    sidebar: Sidebar,
    controls: ViewControls,
    preferences: Arc<dyn PreferenceStore>,
    images: Arc<dyn ImageLoader>,
    events: Arc<Mutex<Vec<ViewerEvent>>>,
}

impl Viewer {
    /// Creates an empty viewer. The persisted theme is applied here, before
    /// any content exists.
    pub fn new(
        config: ViewerConfig,
        preferences: Arc<dyn PreferenceStore>,
        images: Arc<dyn ImageLoader>,
        viewport_rows: f32,
    ) -> Self {
        let theme = match preferences.load() {
            Ok(stored) => stored.unwrap_or_default().theme,
            Err(err) => {
                warn!(?err, "failed to read stored preferences; using defaults");
                ThemeMode::default()
            }
        };
        Self {
            tracker: ViewportTracker::new(config.indicator_threshold),
            lazy: LazyImageLoader::new(config.lazy_margin_rows),
            controls: ViewControls::new(theme, config.fullscreen),
            config,
            state: LoadState::Empty,
            title: None,
            index: PageIndex::default(),
            cards: Vec::new(),
            pass: None,
            layout: Layout::default(),
            viewport: Viewport::new(viewport_rows),
            sidebar: Sidebar::default(),
            preferences,
            images,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<ViewerEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, LoadState::Ready)
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn index(&self) -> &PageIndex {
        &self.index
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn card(&self, id: CardId) -> Option<&Card> {
        self.cards.get(id.position).filter(|card| card.id == id)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn sidebar(&self) -> &Sidebar {
        &self.sidebar
    }

    /// Scrolls the sidebar list so its selection fits in `rows` lines.
    pub fn fit_sidebar(&mut self, rows: usize) {
        self.sidebar.ensure_visible(rows);
    }

    pub fn controls(&self) -> &ViewControls {
        &self.controls
    }

    pub fn indicator(&self) -> &str {
        self.tracker.indicator()
    }

    pub fn current_card(&self) -> Option<&Card> {
        self.tracker.current().and_then(|id| self.card(id))
    }

    /// Fetches the manifest once and builds every dependent view: cards
    /// first, then the sidebar, then the observers that need the cards.
    #[instrument(skip(self, source), fields(source = %source.describe()))]
    pub async fn load_with<S: ManifestSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        if self.state != LoadState::Empty {
            bail!("a manifest was already loaded into this viewer");
        }

        let manifest = match source.fetch().await {
            Ok(manifest) => manifest,
            Err(err) => {
                let message = format!(
                    "{}: {}",
                    self.config.locale.load_failed(),
                    error_chain(&err)
                );
                warn!(%message, "manifest load failed");
                self.state = LoadState::Failed(message.clone());
                self.push(ViewerEvent::LoadFailed(message));
                return Err(err.into());
            }
        };

        info!(title = %manifest.title, pages = manifest.index.len(), "manifest loaded");
        self.title = Some(manifest.title.clone());
        self.push(ViewerEvent::TitleChanged(manifest.title));
        self.index = manifest.index;
        self.state = LoadState::Ready;

        self.render();
        self.sidebar = Sidebar::build(&self.index, self.config.locale);
        self.push(ViewerEvent::SidebarBuilt {
            entries: self.sidebar.entries().len(),
        });
        self.attach_observers();
        self.refresh(None);
        Ok(())
    }

    /// Rebuilds all cards from the index, replacing the previous pass and
    /// re-attaching the observers to the new cards.
    pub fn rerender(&mut self) {
        if !self.is_ready() {
            return;
        }
        self.render();
        self.attach_observers();
        self.refresh(None);
    }

    fn render(&mut self) {
        self.tracker.detach();
        self.lazy.detach();
        let pass = self.pass.map_or(0, |pass| pass.wrapping_add(1));
        self.pass = Some(pass);
        self.cards = render_cards(&self.index, pass, self.config.locale);
        self.relayout();
        debug!(pass, cards = self.cards.len(), "cards rendered");
        self.push(ViewerEvent::CardsRendered {
            pass,
            count: self.cards.len(),
        });
    }

    fn attach_observers(&mut self) {
        self.tracker.attach(&self.cards);
        self.lazy.attach(&self.cards);
    }

    fn relayout(&mut self) {
        let previous_total = self.layout.total_height();
        let image_rows = self.config.card_rows * self.controls.scale();
        self.layout = Layout::stack(
            self.cards.iter().map(|card| card.id),
            image_rows,
            self.config.card_gap,
        );
        let offset = if previous_total > 0.0 {
            self.viewport.offset * self.layout.total_height() / previous_total
        } else {
            0.0
        };
        self.viewport.offset = 0.0;
        self.viewport.scroll_to(offset, &self.layout);
    }

    /// Runs the viewport observers against the current geometry. `target`
    /// pins the indicator to a card the navigator just jumped to.
    fn refresh(&mut self, target: Option<CardId>) {
        let before = self.tracker.indicator().to_string();
        self.tracker.observe(
            &self.layout,
            &self.viewport,
            &self.index,
            self.config.locale,
        );
        if let Some(card) = target {
            self.tracker.set_current(card, &self.index, self.config.locale);
        }
        if self.tracker.indicator() != before {
            self.push(ViewerEvent::IndicatorChanged(
                self.tracker.indicator().to_string(),
            ));
        }
        if self.sidebar.is_open() {
            if let Some(current) = self.tracker.current() {
                self.sidebar.select(current.position);
            }
        }

        for card in self.lazy.poll(&self.layout, &self.viewport) {
            self.fetch_image(card);
        }
    }

    #[instrument(skip(self))]
    fn fetch_image(&mut self, id: CardId) {
        let Some(card) = self.cards.get(id.position).filter(|card| card.id == id) else {
            return;
        };
        let event = match self.images.load(&card.source) {
            Ok(image) => {
                debug!(source = %card.source, "image loaded");
                self.cards[id.position].image = ImageSlot::Loaded(Arc::new(image));
                ViewerEvent::ImageLoaded(id)
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(source = %card.source, %reason, "image failed to load");
                self.cards[id.position].image = ImageSlot::Broken {
                    reason: reason.clone(),
                };
                ViewerEvent::ImageFailed { card: id, reason }
            }
        };
        self.push(event);
    }

    /// Resolves `query` and scrolls its card to the top of the viewport. On a
    /// miss a notice is raised and nothing else changes.
    pub fn locate(&mut self, query: &str) -> Result<Located, LocateError> {
        let result = if self.is_ready() {
            navigator::locate(&self.index, query)
        } else {
            Err(LocateError::NotFound {
                query: query.trim().to_string(),
            })
        };

        match result {
            Ok(hit) => {
                let card = self.cards[hit.position].id;
                let top = self.layout.geometry(card).map_or(0.0, |g| g.top);
                self.viewport.scroll_to(top, &self.layout);
                debug!(query, position = hit.position, kind = ?hit.kind, "located");
                self.push(ViewerEvent::ScrollTo { card, smooth: true });
                self.refresh(Some(card));
                self.push(ViewerEvent::RedrawNeeded);
                Ok(hit)
            }
            Err(err) => {
                if matches!(err, LocateError::NotFound { .. }) {
                    self.push(ViewerEvent::Notice(
                        self.config.locale.not_found().to_string(),
                    ));
                }
                Err(err)
            }
        }
    }

    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::ToggleTheme => {
                let theme = self.controls.toggle_theme();
                self.push(ViewerEvent::ThemeChanged(theme));
                if let Err(err) = self.preferences.save(&Preferences { theme }) {
                    warn!(error = %format!("{err:#}"), "theme preference not saved");
                    self.push(ViewerEvent::Notice(
                        self.config.locale.theme_not_saved().to_string(),
                    ));
                }
                return Ok(());
            }
            Command::ToggleFullscreen => {
                if self.controls.toggle_fullscreen() {
                    self.push(ViewerEvent::FullscreenChanged(
                        self.controls.is_fullscreen(),
                    ));
                }
                return Ok(());
            }
            Command::Resize { rows } => {
                self.viewport.resize(rows, &self.layout);
                if self.is_ready() {
                    self.refresh(None);
                }
                self.push(ViewerEvent::RedrawNeeded);
                return Ok(());
            }
            _ if !self.is_ready() => {
                debug!(?command, "ignoring command before a manifest is loaded");
                return Ok(());
            }
            _ => {}
        }

        match command {
            Command::ScrollBy { rows } => {
                if self.viewport.scroll_by(rows, &self.layout) {
                    self.after_scroll();
                }
            }
            Command::ScrollToTop => {
                if self.viewport.scroll_to(0.0, &self.layout) {
                    self.after_scroll();
                }
            }
            Command::ScrollToBottom => {
                let bottom = self.viewport.max_offset(&self.layout);
                if self.viewport.scroll_to(bottom, &self.layout) {
                    self.after_scroll();
                }
            }
            Command::Locate { query } => {
                if let Err(err) = self.locate(&query) {
                    debug!(%err, "locate failed");
                }
            }
            Command::ToggleSidebar => {
                let open = self.sidebar.toggle();
                if open {
                    if let Some(current) = self.tracker.current() {
                        self.sidebar.select(current.position);
                    }
                }
                self.push(ViewerEvent::SidebarToggled(open));
            }
            Command::CloseSidebar => {
                if self.sidebar.close() {
                    self.push(ViewerEvent::SidebarToggled(false));
                }
            }
            Command::SidebarMove { delta } => {
                if self.sidebar.move_selection(delta) {
                    self.push(ViewerEvent::RedrawNeeded);
                }
            }
            Command::SidebarActivate => {
                if let Some(key) = self.sidebar.selected_key().cloned() {
                    if let Err(err) = self.locate(&key.to_string()) {
                        debug!(%err, "sidebar entry did not resolve");
                    }
                    if self.sidebar.close() {
                        self.push(ViewerEvent::SidebarToggled(false));
                    }
                }
            }
            Command::ZoomIn => {
                let changed = self.controls.zoom_in();
                self.after_zoom(changed);
            }
            Command::ZoomOut => {
                let changed = self.controls.zoom_out();
                self.after_zoom(changed);
            }
            Command::SetZoom { scale } => {
                let changed = self.controls.set_zoom(scale);
                self.after_zoom(changed);
            }
            Command::FitWidth => {
                let changed = self.controls.fit_width();
                self.after_zoom(changed);
            }
            Command::ToggleTheme | Command::ToggleFullscreen | Command::Resize { .. } => {}
        }
        Ok(())
    }

    fn after_scroll(&mut self) {
        self.refresh(None);
        self.push(ViewerEvent::RedrawNeeded);
    }

    fn after_zoom(&mut self, changed: bool) {
        if !changed {
            return;
        }
        self.relayout();
        self.refresh(None);
        self.push(ViewerEvent::ZoomChanged(self.controls.scale()));
    }

    fn push(&self, event: ViewerEvent) {
        self.events.lock().push(event);
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::anyhow;
    use async_trait::async_trait;

    use crate::manifest::{Manifest, ManifestError};
    use crate::render::RenderImage;
    use crate::store::MemoryPreferenceStore;

    const BOOK: &str = r#"{"title":"T","pages":[
        {"label":"Intro","start":null,"end":null,"src":"a.png"},
        {"label":"Ch1","start":1,"end":3,"src":"b.png"}
    ]}"#;

    struct StaticSource(&'static str);

    #[async_trait]
    impl ManifestSource for StaticSource {
        fn describe(&self) -> String {
            "static".to_string()
        }

        async fn fetch(&self) -> Result<Manifest, ManifestError> {
            Manifest::from_json(self.0)
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        calls: Mutex<Vec<String>>,
    }

    impl ImageLoader for CountingLoader {
        fn load(&self, source: &str) -> Result<RenderImage> {
            self.calls.lock().push(source.to_string());
            if source.starts_with("broken") {
                return Err(anyhow!("decode error"));
            }
            Ok(RenderImage {
                width: 1,
                height: 1,
                pixels: vec![0, 0, 0, 255],
            })
        }
    }

    fn config() -> ViewerConfig {
        ViewerConfig {
            card_rows: 8.0,
            card_gap: 0.0,
            lazy_margin_rows: 0.0,
            ..ViewerConfig::default()
        }
    }

    fn viewer_with(store: Arc<MemoryPreferenceStore>, loader: Arc<CountingLoader>) -> Viewer {
        Viewer::new(config(), store, loader, 10.0)
    }

    async fn loaded(payload: &'static str) -> (Viewer, Arc<CountingLoader>) {
        let loader = Arc::new(CountingLoader::default());
        let mut viewer = viewer_with(Arc::new(MemoryPreferenceStore::new()), loader.clone());
        viewer.load_with(&StaticSource(payload)).await.unwrap();
        (viewer, loader)
    }

    fn drain(viewer: &Viewer) -> Vec<ViewerEvent> {
        std::mem::take(&mut *viewer.events().lock())
    }

    #[tokio::test]
    async fn end_to_end_indicator_and_locate() {
        let (mut viewer, _) = loaded(BOOK).await;
        assert_eq!(viewer.title(), Some("T"));
        assert_eq!(viewer.indicator(), "front matter");

        let hit = viewer.locate("2").unwrap();
        assert_eq!(hit.position, 1);
        assert_eq!(viewer.indicator(), "page 1–3");

        let hit = viewer.locate("intro").unwrap();
        assert_eq!(hit.position, 0);
        assert_eq!(viewer.indicator(), "front matter");
        assert_eq!(viewer.viewport().offset, 0.0);
    }

    #[tokio::test]
    async fn startup_order_is_title_cards_sidebar_indicator() {
        let (viewer, _) = loaded(BOOK).await;
        let events = drain(&viewer);
        let kinds: Vec<_> = events
            .iter()
            .map(|event| match event {
                ViewerEvent::TitleChanged(_) => "title",
                ViewerEvent::CardsRendered { .. } => "cards",
                ViewerEvent::SidebarBuilt { .. } => "sidebar",
                ViewerEvent::IndicatorChanged(_) => "indicator",
                ViewerEvent::ImageLoaded(_) => "image",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["title", "cards", "sidebar", "indicator", "image"]);
    }

    #[tokio::test]
    async fn not_found_leaves_position_and_indicator() {
        let (mut viewer, _) = loaded(BOOK).await;
        viewer.locate("2").unwrap();
        drain(&viewer);
        let offset = viewer.viewport().offset;

        let err = viewer.locate("99").unwrap_err();
        assert!(matches!(err, LocateError::NotFound { .. }));
        assert_eq!(viewer.viewport().offset, offset);
        assert_eq!(viewer.indicator(), "page 1–3");
        assert_eq!(
            drain(&viewer),
            vec![ViewerEvent::Notice("page not found".to_string())]
        );
    }

    #[tokio::test]
    async fn failed_load_leaves_viewer_empty() {
        let loader = Arc::new(CountingLoader::default());
        let mut viewer = viewer_with(Arc::new(MemoryPreferenceStore::new()), loader.clone());
        let err = viewer
            .load_with(&StaticSource(r#"{"title":"T","pages":[{"label":"","src":"x.png"}]}"#))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ManifestError>().is_some());
        assert!(matches!(viewer.state(), LoadState::Failed(msg) if msg.contains("empty label")));
        assert!(viewer.cards().is_empty());
        assert!(viewer.sidebar().is_empty());
        assert!(loader.calls.lock().is_empty());
        assert!(drain(&viewer)
            .iter()
            .any(|event| matches!(event, ViewerEvent::LoadFailed(_))));

        viewer.apply(Command::ScrollBy { rows: 5.0 }).unwrap();
        assert_eq!(viewer.viewport().offset, 0.0);
    }

    #[tokio::test]
    async fn manifest_is_loaded_once() {
        let (mut viewer, _) = loaded(BOOK).await;
        assert!(viewer.load_with(&StaticSource(BOOK)).await.is_err());
        assert_eq!(viewer.cards().len(), 2);
    }

    #[tokio::test]
    async fn images_load_lazily_and_once() {
        let (mut viewer, loader) = loaded(
            r#"{"title":"T","pages":["p1.png","p2.png","broken3.png","p4.png","p5.png"]}"#,
        )
        .await;
        assert_eq!(loader.calls.lock().clone(), vec!["p1.png".to_string()]);

        viewer.apply(Command::ScrollBy { rows: 15.0 }).unwrap();
        viewer.apply(Command::ScrollToTop).unwrap();
        viewer.apply(Command::ScrollBy { rows: 15.0 }).unwrap();
        viewer.apply(Command::ScrollBy { rows: 10.0 }).unwrap();
        let calls = loader.calls.lock().clone();
        assert_eq!(calls, vec!["p1.png", "p2.png", "broken3.png", "p4.png"]);
        assert!(!calls.contains(&"p5.png".to_string()));

        assert!(matches!(viewer.cards()[0].image, ImageSlot::Loaded(_)));
        assert!(matches!(viewer.cards()[2].image, ImageSlot::Broken { .. }));
        assert!(viewer.cards()[4].image.is_pending());
    }

    #[tokio::test]
    async fn rerender_starts_a_new_pass() {
        let (mut viewer, loader) = loaded(BOOK).await;
        let first = viewer.cards()[0].id;
        viewer.rerender();
        assert_ne!(viewer.cards()[0].id, first);
        assert_eq!(viewer.cards().len(), 2);
        assert_eq!(loader.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn sidebar_activation_locates_and_closes() {
        let (mut viewer, _) = loaded(BOOK).await;
        viewer.apply(Command::ToggleSidebar).unwrap();
        assert!(viewer.sidebar().is_open());
        viewer.apply(Command::SidebarMove { delta: 1 }).unwrap();
        viewer.apply(Command::SidebarActivate).unwrap();
        assert!(!viewer.sidebar().is_open());
        assert_eq!(viewer.indicator(), "page 1–3");
        assert_eq!(viewer.current_card().map(|c| c.descriptor()), Some(1));
    }

    #[tokio::test]
    async fn zoom_is_clamped_and_relayouts() {
        let (mut viewer, _) = loaded(BOOK).await;
        let height = viewer.layout().total_height();
        viewer.apply(Command::SetZoom { scale: 9.0 }).unwrap();
        assert_eq!(viewer.controls().scale(), 2.0);
        assert!(viewer.layout().total_height() > height);
        viewer.apply(Command::SetZoom { scale: -1.0 }).unwrap();
        assert_eq!(viewer.controls().scale(), 0.5);
        viewer.apply(Command::FitWidth).unwrap();
        assert_eq!(viewer.controls().scale(), 1.0);
        assert_eq!(viewer.layout().total_height(), height);
    }

    #[tokio::test]
    async fn theme_survives_double_toggle_and_reload() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let loader = Arc::new(CountingLoader::default());
        store
            .save(&Preferences {
                theme: ThemeMode::Dark,
            })
            .unwrap();

        let mut viewer = viewer_with(store.clone(), loader.clone());
        assert_eq!(viewer.controls().theme(), ThemeMode::Dark);
        viewer.apply(Command::ToggleTheme).unwrap();
        assert_eq!(store.load().unwrap().unwrap().theme, ThemeMode::Light);
        viewer.apply(Command::ToggleTheme).unwrap();

        let reloaded = viewer_with(store, loader);
        assert_eq!(reloaded.controls().theme(), ThemeMode::Dark);
    }

    struct FailingStore;

    impl PreferenceStore for FailingStore {
        fn load(&self) -> Result<Option<Preferences>> {
            Ok(None)
        }

        fn save(&self, _: &Preferences) -> Result<()> {
            bail!("disk full")
        }
    }

    #[tokio::test]
    async fn theme_toggles_even_when_it_cannot_be_saved() {
        let loader = Arc::new(CountingLoader::default());
        let mut viewer = Viewer::new(config(), Arc::new(FailingStore), loader, 10.0);
        viewer.load_with(&StaticSource(BOOK)).await.unwrap();
        drain(&viewer);

        viewer.apply(Command::ToggleTheme).unwrap();
        assert_eq!(viewer.controls().theme(), ThemeMode::Dark);
        let events = drain(&viewer);
        assert!(events.contains(&ViewerEvent::ThemeChanged(ThemeMode::Dark)));
        assert!(events.contains(&ViewerEvent::Notice("theme not saved".to_string())));

        viewer.apply(Command::ToggleTheme).unwrap();
        assert_eq!(viewer.controls().theme(), ThemeMode::Light);
    }
}
