use crate::{config::Config, glossary::GlossaryEntry};
use tracing::{debug, warn};

/// Fixed markup around each entry on a page.
const ENTRY_OVERHEAD: usize = 160;
/// Markup around each lookup form.
const INFLECTION_OVERHEAD: usize = 32;

/// One XHTML page of dictionary entries.
#[derive(Debug, Clone)]
pub struct Page {
    /// Sequential page index (0-based)
    pub index: usize,

    /// Entries on this page, in dictionary order
    pub entries: Vec<GlossaryEntry>,

    /// Estimated rendered size in bytes
    pub approx_bytes: usize,
}

impl Page {
    /// Creates a new page.
    #[must_use]
    pub fn new(index: usize, entries: Vec<GlossaryEntry>, approx_bytes: usize) -> Self {
        Self {
            index,
            entries,
            approx_bytes,
        }
    }

    /// Returns the number of entries on this page.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if this page is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Headwords of the first and last entry.
    #[must_use]
    pub fn range(&self) -> Option<(&str, &str)> {
        let first = self.entries.first()?;
        let last = self.entries.last()?;
        Some((&first.headword, &last.headword))
    }

    /// Returns the fill ratio against a byte limit (0.0 to 1.0+).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self, max_bytes: usize) -> f64 {
        if max_bytes == 0 {
            return 0.0;
        }
        self.approx_bytes as f64 / max_bytes as f64
    }
}

/// Rough size of an entry once rendered into the page template.
#[must_use]
pub fn estimate_entry_bytes(entry: &GlossaryEntry) -> usize {
    let inflections: usize = entry
        .inflections
        .iter()
        .map(|form| form.len() + INFLECTION_OVERHEAD)
        .sum();

    entry.headword.len() * 2 + entry.definition.len() + inflections + ENTRY_OVERHEAD
}

/// Distributes sorted entries over pages.
pub struct Splitter {
    max_entries: usize,
    max_bytes: usize,
}

impl Splitter {
    /// Creates a new splitter from configuration.
    #[must_use]
    pub const fn new(config: &Config) -> Self {
        Self::with_limits(config.entries_per_page, config.max_page_bytes)
    }

    /// Creates a splitter with explicit limits.
    #[must_use]
    pub const fn with_limits(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            max_entries,
            max_bytes,
        }
    }

    /// Splits entries into pages respecting both limits.
    ///
    /// Entries are never divided. An entry larger than the byte limit on its
    /// own gets a page to itself.
    #[must_use]
    pub fn split(&self, entries: Vec<GlossaryEntry>) -> Vec<Page> {
        if entries.is_empty() {
            return Vec::new();
        }

        let mut pages = Vec::new();
        let mut current_builder = PageBuilder::new(0, self.max_entries, self.max_bytes);

        for entry in entries {
            let bytes = estimate_entry_bytes(&entry);

            if bytes > self.max_bytes {
                warn!(
                    "Entry '{}' is about {} bytes, over the page limit of {}; giving it its own page",
                    entry.headword, bytes, self.max_bytes
                );
            }

            if !current_builder.can_fit(bytes) {
                if let Some(page) = current_builder.build() {
                    pages.push(page);
                }
                current_builder = PageBuilder::new(pages.len(), self.max_entries, self.max_bytes);
            }

            current_builder.add_entry(entry, bytes);
        }

        if let Some(page) = current_builder.build() {
            pages.push(page);
        }

        self.log_split_results(&pages);

        pages
    }

    #[allow(clippy::cast_precision_loss)]
    fn log_split_results(&self, pages: &[Page]) {
        if pages.is_empty() {
            return;
        }

        let total_entries: usize = pages.iter().map(Page::entry_count).sum();
        let avg_utilization = pages
            .iter()
            .map(|p| p.utilization(self.max_bytes))
            .sum::<f64>()
            / pages.len() as f64;

        debug!(
            "Created {} pages from {} entries (avg fill: {:.1}%)",
            pages.len(),
            total_entries,
            avg_utilization * 100.0
        );
    }
}

/// Builder for constructing pages incrementally.
struct PageBuilder {
    index: usize,
    entries: Vec<GlossaryEntry>,
    current_bytes: usize,
    max_entries: usize,
    max_bytes: usize,
}

impl PageBuilder {
    const fn new(index: usize, max_entries: usize, max_bytes: usize) -> Self {
        Self {
            index,
            entries: Vec::new(),
            current_bytes: 0,
            max_entries,
            max_bytes,
        }
    }

    /// An empty page accepts anything.
    fn can_fit(&self, bytes: usize) -> bool {
        self.entries.is_empty()
            || (self.entries.len() < self.max_entries && self.current_bytes + bytes <= self.max_bytes)
    }

    fn add_entry(&mut self, entry: GlossaryEntry, bytes: usize) {
        self.current_bytes += bytes;
        self.entries.push(entry);
    }

    fn build(self) -> Option<Page> {
        if self.entries.is_empty() {
            None
        } else {
            Some(Page::new(self.index, self.entries, self.current_bytes))
        }
    }
}
