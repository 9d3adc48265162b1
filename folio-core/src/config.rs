use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::lazy::DEFAULT_LAZY_MARGIN_ROWS;
use crate::locale::Locale;
use crate::tracker::DEFAULT_INDICATOR_THRESHOLD;

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("net", "folio", "folio")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub locale: Locale,
    /// Share of a card that must be visible before it drives the indicator.
    pub indicator_threshold: f32,
    /// Rows of look-ahead before a card's image is fetched.
    pub lazy_margin_rows: f32,
    /// Image rows of a card at zoom 1.0.
    pub card_rows: f32,
    pub card_gap: f32,
    /// Whether the fullscreen control is offered at all.
    pub fullscreen: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            indicator_threshold: DEFAULT_INDICATOR_THRESHOLD,
            lazy_margin_rows: DEFAULT_LAZY_MARGIN_ROWS,
            card_rows: 24.0,
            card_gap: 1.0,
            fullscreen: true,
        }
    }
}

impl ViewerConfig {
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn from_toml(payload: &str) -> Result<Self> {
        let config: Self = toml::from_str(payload).context("invalid viewer configuration")?;
        Ok(config.sanitized())
    }

    /// Reads `path`, falling back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let payload = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {:?}", path))?;
        Self::from_toml(&payload).with_context(|| format!("in config {:?}", path))
    }

    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.indicator_threshold.is_finite() && (0.0..=1.0).contains(&self.indicator_threshold))
        {
            self.indicator_threshold = defaults.indicator_threshold;
        }
        if !self.lazy_margin_rows.is_finite() || self.lazy_margin_rows < 0.0 {
            self.lazy_margin_rows = defaults.lazy_margin_rows;
        }
        if !self.card_rows.is_finite() || self.card_rows < 1.0 {
            self.card_rows = defaults.card_rows;
        }
        if !self.card_gap.is_finite() || self.card_gap < 0.0 {
            self.card_gap = defaults.card_gap;
        }
        self
    }
}
