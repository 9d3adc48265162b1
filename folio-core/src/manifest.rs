use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::model::{PageDescriptor, PageIndex, PageRange};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest is not valid JSON")]
    Json(#[from] serde_json::Error),
    #[error("page entry {position} is malformed")]
    InvalidEntry {
        position: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("page entry {position} has an empty label")]
    EmptyLabel { position: usize },
    #[error("page entry {position} has an empty image source")]
    EmptySource { position: usize },
    #[error("page entry {position} sets only one of start/end")]
    HalfRange { position: usize },
    #[error("page entry {position} has start {start} after end {end}")]
    InvertedRange { position: usize, start: u32, end: u32 },
    #[error("page entries {first} and {second} cover overlapping page numbers")]
    OverlappingRanges { first: usize, second: usize },
    #[error("manifest lists no pages")]
    NoPages,
}

/// A parsed, validated manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub title: String,
    pub index: PageIndex,
}

#[derive(Deserialize)]
struct RawManifest {
    title: String,
    pages: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Path(String),
    Record(RawRecord),
}

#[derive(Deserialize)]
struct RawRecord {
    label: Option<String>,
    start: Option<u32>,
    end: Option<u32>,
    number: Option<u32>,
    src: Option<String>,
}

impl Manifest {
    /// Parses the JSON payload. Accepts `{label,start,end,src}`,
    /// `{label,number,src}` and bare image path entries.
    pub fn from_json(payload: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_str(payload)?;
        if raw.pages.is_empty() {
            return Err(ManifestError::NoPages);
        }

        let mut pages = Vec::with_capacity(raw.pages.len());
        for (idx, value) in raw.pages.into_iter().enumerate() {
            let position = idx + 1;
            let entry = RawEntry::deserialize(value)
                .map_err(|source| ManifestError::InvalidEntry { position, source })?;
            pages.push(entry.into_descriptor(position)?);
        }

        Ok(Self {
            title: raw.title,
            index: PageIndex::new(pages)?,
        })
    }

    /// Rewrites relative image paths so they resolve against `base`. URLs and
    /// absolute paths are left untouched.
    pub fn resolve_sources(self, base: &Path) -> Self {
        let index = self.index.map_sources(|page| {
            let src = page.image_source();
            if is_url(src) || Path::new(src).is_absolute() {
                page
            } else {
                let resolved = base.join(src).to_string_lossy().into_owned();
                page.with_image_source(resolved)
            }
        });
        Self {
            title: self.title,
            index,
        }
    }
}

impl RawEntry {
    fn into_descriptor(self, position: usize) -> Result<PageDescriptor, ManifestError> {
        match self {
            RawEntry::Path(src) => {
                let number = u32::try_from(position).unwrap_or(u32::MAX);
                PageDescriptor::new(
                    position,
                    number.to_string(),
                    Some(PageRange::single(number)),
                    src,
                )
            }
            RawEntry::Record(record) => {
                let range = match (record.number, record.start, record.end) {
                    (Some(number), None, None) => Some(PageRange::single(number)),
                    (None, None, None) => None,
                    (None, Some(start), Some(end)) => Some(
                        PageRange::new(start, end).ok_or(ManifestError::InvertedRange {
                            position,
                            start,
                            end,
                        })?,
                    ),
                    _ => return Err(ManifestError::HalfRange { position }),
                };
                PageDescriptor::new(
                    position,
                    record.label.unwrap_or_default(),
                    range,
                    record.src.unwrap_or_default(),
                )
            }
        }
    }
}

pub fn is_url(src: &str) -> bool {
    src.contains("://")
}

/// Where a manifest comes from. Fetched once per viewer.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    fn describe(&self) -> String;
    async fn fetch(&self) -> Result<Manifest, ManifestError>;
}

pub struct FileManifestSource {
    path: PathBuf,
}

impl FileManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ManifestSource for FileManifestSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch(&self) -> Result<Manifest, ManifestError> {
        let payload = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ManifestError::Io {
                path: self.path.clone(),
                source,
            })?;
        let manifest = Manifest::from_json(&payload)?;
        debug!(pages = manifest.index.len(), "manifest parsed");
        let base = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(manifest.resolve_sources(&base))
    }
}
