use serde::{Deserialize, Serialize};

pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 2.0;
pub const ZOOM_STEP: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }

    pub fn is_dark(self) -> bool {
        matches!(self, ThemeMode::Dark)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOrigin {
    TopCenter,
}

/// Explicit scale transform applied to the card column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomTransform {
    pub scale: f32,
    pub origin: TransformOrigin,
}

/// Presentation state that is independent of the page index.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewControls {
    transform: Option<ZoomTransform>,
    theme: ThemeMode,
    fullscreen: bool,
    fullscreen_available: bool,
}

impl ViewControls {
    pub fn new(theme: ThemeMode, fullscreen_available: bool) -> Self {
        Self {
            transform: None,
            theme,
            fullscreen: false,
            fullscreen_available,
        }
    }

    pub fn scale(&self) -> f32 {
        self.transform.map_or(1.0, |t| t.scale)
    }

    pub fn transform(&self) -> Option<ZoomTransform> {
        self.transform
    }

    /// Clamps `requested` to the zoom bounds and anchors the transform at the
    /// top center. Returns whether the scale changed.
    pub fn set_zoom(&mut self, requested: f32) -> bool {
        let requested = if requested.is_finite() {
            requested
        } else {
            1.0
        };
        let scale = round_scale(requested.clamp(MIN_ZOOM, MAX_ZOOM));
        let changed = (scale - self.scale()).abs() > f32::EPSILON;
        self.transform = Some(ZoomTransform {
            scale,
            origin: TransformOrigin::TopCenter,
        });
        changed
    }

    pub fn zoom_in(&mut self) -> bool {
        self.set_zoom(self.scale() + ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.set_zoom(self.scale() - ZOOM_STEP)
    }

    /// Back to natural width with no explicit transform.
    pub fn fit_width(&mut self) -> bool {
        let changed = (self.scale() - 1.0).abs() > f32::EPSILON;
        self.transform = None;
        changed
    }

    pub fn theme(&self) -> ThemeMode {
        self.theme
    }

    pub fn toggle_theme(&mut self) -> ThemeMode {
        self.theme = self.theme.toggled();
        self.theme
    }

    pub fn fullscreen_available(&self) -> bool {
        self.fullscreen_available
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// Flips fullscreen presentation. A no-op where fullscreen is unavailable.
    pub fn toggle_fullscreen(&mut self) -> bool {
        if !self.fullscreen_available {
            return false;
        }
        self.fullscreen = !self.fullscreen;
        true
    }
}

impl Default for ViewControls {
    fn default() -> Self {
        Self::new(ThemeMode::default(), true)
    }
}

fn round_scale(scale: f32) -> f32 {
    (scale * 100.0).round() / 100.0
}
