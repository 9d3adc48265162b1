pub mod config;
pub mod controls;
pub mod lazy;
pub mod locale;
pub mod manifest;
pub mod model;
pub mod navigator;
pub mod observer;
pub mod render;
pub mod sidebar;
pub mod store;
pub mod tracker;
pub mod viewer;

pub use config::{project_dirs, ViewerConfig};
pub use controls::{ThemeMode, TransformOrigin, ViewControls, ZoomTransform, MAX_ZOOM, MIN_ZOOM};
pub use lazy::LazyImageLoader;
pub use locale::Locale;
pub use manifest::{is_url, FileManifestSource, Manifest, ManifestError, ManifestSource};
pub use model::{PageDescriptor, PageIndex, PageRange};
pub use navigator::{locate, LocateError, Located, MatchKind, NavigationKey};
pub use observer::{
    CardGeometry, IntersectionEntry, IntersectionObserver, Layout, ObserverOptions, Viewport,
    CARD_CHROME_ROWS,
};
pub use render::{render_cards, Card, CardId, ImageLoader, ImageSlot, RenderImage};
pub use sidebar::{Sidebar, SidebarEntry};
pub use store::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore, Preferences};
pub use tracker::ViewportTracker;
pub use viewer::{Command, LoadState, Viewer, ViewerEvent};
