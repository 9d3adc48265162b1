use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use folio_core::{ImageLoader, RenderImage};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

/// Remote images larger than this are refused rather than buffered.
const MAX_REMOTE_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to read image {source_ref}")]
    Read {
        source_ref: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch image {source_ref}: {reason}")]
    Fetch { source_ref: String, reason: String },
    #[error("unsupported image source {0}")]
    Unsupported(String),
    #[error("failed to decode image {source_ref}")]
    Decode {
        source_ref: String,
        #[source]
        source: image::ImageError,
    },
}

/// Decodes page images with the `image` crate. Plain paths and `file://`
/// URLs are read from disk, `http(s)://` sources are fetched.
#[derive(Debug, Default, Clone)]
pub struct FileImageLoader {
    /// Upper bound on the decoded width; wider images are scaled down.
    max_width: Option<u32>,
}

impl FileImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_width(max_width: u32) -> Self {
        Self {
            max_width: Some(max_width.max(1)),
        }
    }

    fn read_bytes(&self, source: &str) -> Result<Vec<u8>, ImageError> {
        match Url::parse(source) {
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| ImageError::Unsupported(source.to_string()))?;
                read_file(source, &path)
            }
            Ok(url) if matches!(url.scheme(), "http" | "https") => fetch_remote(source),
            // Windows drive letters parse as a one-letter scheme.
            Ok(url) if url.scheme().len() > 1 => Err(ImageError::Unsupported(source.to_string())),
            _ => read_file(source, Path::new(source)),
        }
    }

    fn decode(&self, source: &str, bytes: &[u8]) -> Result<RenderImage, ImageError> {
        let decoded = image::load_from_memory(bytes).map_err(|err| ImageError::Decode {
            source_ref: source.to_string(),
            source: err,
        })?;
        let decoded = match self.max_width {
            Some(max) if decoded.width() > max => {
                let height = scaled_height(decoded.width(), decoded.height(), max);
                decoded.resize_exact(max, height, image::imageops::FilterType::Triangle)
            }
            _ => decoded,
        };
        let rgba = decoded.to_rgba8();
        Ok(RenderImage {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        })
    }
}

impl ImageLoader for FileImageLoader {
    #[instrument(skip(self))]
    fn load(&self, source: &str) -> Result<RenderImage> {
        let bytes = self.read_bytes(source)?;
        let image = self.decode(source, &bytes)?;
        debug!(width = image.width, height = image.height, "decoded page image");
        Ok(image)
    }
}

fn read_file(source: &str, path: &Path) -> Result<Vec<u8>, ImageError> {
    fs::read(path).map_err(|err| ImageError::Read {
        source_ref: source.to_string(),
        source: err,
    })
}

fn fetch_remote(source: &str) -> Result<Vec<u8>, ImageError> {
    let fetch_error = |reason: String| ImageError::Fetch {
        source_ref: source.to_string(),
        reason,
    };
    let response = ureq::get(source)
        .call()
        .map_err(|err| fetch_error(err.to_string()))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_REMOTE_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(|err| fetch_error(err.to_string()))?;
    if bytes.len() as u64 > MAX_REMOTE_BYTES {
        return Err(fetch_error(format!(
            "larger than {} bytes",
            MAX_REMOTE_BYTES
        )));
    }
    Ok(bytes)
}

fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let ratio = target_width as f64 / width.max(1) as f64;
    ((height as f64 * ratio).round() as u32).max(1)
}

/// Turns a card source into something a browser can open.
pub fn source_url(source: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(source) {
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }
    let path = PathBuf::from(source);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .context("failed to resolve working directory")?
            .join(path)
    };
    Url::from_file_path(&absolute)
        .map_err(|_| anyhow::anyhow!("cannot express {:?} as a file URL", absolute))
}
