use std::fmt;

use crate::manifest::ManifestError;

/// Inclusive range of printed page numbers covered by one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    start: u32,
    end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single(page: u32) -> Self {
        Self {
            start: page,
            end: page,
        }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn contains(&self, page: u32) -> bool {
        self.start <= page && page <= self.end
    }

    pub fn overlaps(&self, other: &PageRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}–{}", self.start, self.end)
        }
    }
}

/// One logical unit of the document: a chapter, a section or a single page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor {
    label: String,
    range: Option<PageRange>,
    image_source: String,
    search_key: String,
}

impl PageDescriptor {
    /// Builds a descriptor, rejecting empty labels and empty image sources.
    /// `position` is the 1-based manifest entry used in diagnostics.
    pub fn new(
        position: usize,
        label: impl Into<String>,
        range: Option<PageRange>,
        image_source: impl Into<String>,
    ) -> Result<Self, ManifestError> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(ManifestError::EmptyLabel { position });
        }
        let image_source = image_source.into();
        if image_source.trim().is_empty() {
            return Err(ManifestError::EmptySource { position });
        }
        let search_key = label.to_lowercase();
        Ok(Self {
            label,
            range,
            image_source,
            search_key,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn range(&self) -> Option<PageRange> {
        self.range
    }

    pub fn image_source(&self) -> &str {
        &self.image_source
    }

    pub fn search_key(&self) -> &str {
        &self.search_key
    }

    pub fn is_front_matter(&self) -> bool {
        self.range.is_none()
    }

    pub(crate) fn with_image_source(mut self, image_source: String) -> Self {
        self.image_source = image_source;
        self
    }
}

/// Ordered, read-only list of descriptors. Index order is document order and
/// scroll order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageIndex {
    pages: Vec<PageDescriptor>,
}

impl PageIndex {
    /// Takes ownership of the descriptors, refusing overlapping numeric ranges
    /// so that numeric lookups are unambiguous.
    pub fn new(pages: Vec<PageDescriptor>) -> Result<Self, ManifestError> {
        let mut numbered: Vec<(usize, PageRange)> = pages
            .iter()
            .enumerate()
            .filter_map(|(idx, page)| page.range.map(|range| (idx + 1, range)))
            .collect();
        numbered.sort_by_key(|(_, range)| range.start);
        for pair in numbered.windows(2) {
            let (first_pos, first) = pair[0];
            let (second_pos, second) = pair[1];
            if first.overlaps(&second) {
                let (first_pos, second_pos) = if first_pos < second_pos {
                    (first_pos, second_pos)
                } else {
                    (second_pos, first_pos)
                };
                return Err(ManifestError::OverlappingRanges {
                    first: first_pos,
                    second: second_pos,
                });
            }
        }
        Ok(Self { pages })
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PageDescriptor> {
        self.pages.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageDescriptor> {
        self.pages.iter()
    }

    pub(crate) fn map_sources(self, f: impl FnMut(PageDescriptor) -> PageDescriptor) -> Self {
        Self {
            pages: self.pages.into_iter().map(f).collect(),
        }
    }
}
