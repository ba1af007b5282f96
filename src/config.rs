use crate::error::{Error, Result};
use crate::filter::DocumentFilterConfig;
use crate::inflect::InflectionConfig;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::PathBuf;

const DEFAULT_ENTRIES_PER_PAGE: usize = 2_000;
const DEFAULT_MAX_PAGE_BYTES: usize = 256 * 1024;
const MIN_PAGE_BYTES: usize = 1024;
const DEFAULT_PAGE_PATTERN: &str = "entries_{index:03}.{ext}";
const DEFAULT_ENTRY_SELECTOR: &str = "p";
const DEFAULT_HEADWORD_SELECTOR: &str = "b, strong";

/// `{index}` or a zero-padded `{index:03}`.
static INDEX_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{index(?::0?([1-9]))?\}").expect("index placeholder regex is valid"));

/// Expands a page pattern for the page with the 1-based `number`.
pub(crate) fn expand_page_pattern(pattern: &str, number: usize, extension: &str) -> String {
    INDEX_PLACEHOLDER
        .replace_all(pattern, |caps: &Captures<'_>| {
            let width = caps
                .get(1)
                .and_then(|w| w.as_str().parse::<usize>().ok())
                .unwrap_or(0);
            format!("{number:0width$}")
        })
        .replace("{ext}", extension)
}

/// How dictionary entries are laid out in the EPUB content documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryLayout {
    /// One block element per entry, opened by a bold headword.
    ///
    /// Blocks that do not open with a headword continue the previous entry.
    Paragraph {
        /// Selector for entry blocks (e.g. `p`)
        entry_selector: String,
        /// Selector the first child must match to start an entry
        headword_selector: String,
    },
    /// `<dl>` lists with `dt` headwords and `dd` definitions.
    DefinitionList,
}

impl Default for EntryLayout {
    fn default() -> Self {
        Self::Paragraph {
            entry_selector: DEFAULT_ENTRY_SELECTOR.to_string(),
            headword_selector: DEFAULT_HEADWORD_SELECTOR.to_string(),
        }
    }
}

/// Configuration for the conversion pipeline.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// EPUB dictionary to convert
    pub input: PathBuf,

    /// Directory receiving the Kindle source directory and the `.mobi`
    pub output_dir: PathBuf,

    /// Base name of the generated dictionary (defaults to the input file stem)
    pub output_name: Option<String>,

    /// Entry page filename pattern (supports {index}, {index:02}, {index:03}, {ext})
    pub page_pattern: String,

    /// Maximum entries per XHTML page
    pub entries_per_page: usize,

    /// Approximate upper bound of a page's size in bytes
    pub max_page_bytes: usize,

    /// Entry layout of the source EPUB
    pub layout: EntryLayout,

    /// Lookup form generation
    pub inflection: InflectionConfig,

    /// Which content documents to read
    pub document_filter: DocumentFilterConfig,

    /// Dictionary title override
    pub title: Option<String>,

    /// Author override
    pub author: Option<String>,

    /// Description override
    pub description: Option<String>,

    /// Language of the headwords (BCP 47)
    pub in_language: Option<String>,

    /// Language of the definitions (BCP 47)
    pub out_language: Option<String>,

    /// Mark inflections as exact matches
    pub exact_inflections: bool,

    /// Let headwords take part in spell-checking suggestions
    pub spellcheck: bool,

    /// Cover image to embed instead of the EPUB's own
    pub cover_path: Option<PathBuf>,

    /// External template replacing the built-in entry page template
    pub page_template: Option<PathBuf>,

    /// Path to the kindlegen binary
    pub kindlegen_path: Option<PathBuf>,

    /// Write the source directory but do not run kindlegen
    pub source_only: bool,

    /// Keep the source directory after packing
    pub keep_source: bool,

    /// Dry run mode (no file writes, no packing)
    pub dry_run: bool,

    /// Create backups of existing files
    pub backup_existing: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lexicon_mobi::Config;
    ///
    /// let config = Config::builder()
    ///     .input("lexicon-urthus.epub")
    ///     .output_dir("out")
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input EPUB doesn't exist
    /// - Page limits are invalid
    /// - The page pattern or output name is invalid
    /// - A referenced cover or page template is missing
    ///
    /// kindlegen is located by the pipeline, not here.
    pub fn validate(&self) -> Result<()> {
        if !self.input.exists() {
            return Err(Error::config(format!(
                "Input EPUB does not exist: {}",
                self.input.display()
            )));
        }

        if !self.input.is_file() {
            return Err(Error::config(format!(
                "Input path is not a file: {}",
                self.input.display()
            )));
        }

        let is_epub = self
            .input
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("epub"));
        if !is_epub {
            tracing::warn!(
                "Input does not have an .epub extension: {}",
                self.input.display()
            );
        }

        if self.entries_per_page == 0 {
            return Err(Error::config("entries_per_page must be greater than 0"));
        }

        if self.max_page_bytes < MIN_PAGE_BYTES {
            return Err(Error::config(format!(
                "max_page_bytes ({}) must be at least {}",
                self.max_page_bytes, MIN_PAGE_BYTES
            )));
        }

        if !INDEX_PLACEHOLDER.is_match(&self.page_pattern) {
            return Err(Error::invalid_pattern(
                &self.page_pattern,
                "Pattern must contain {index} or {index:03} placeholder",
            ));
        }

        if INDEX_PLACEHOLDER
            .replace_all(&self.page_pattern, "")
            .contains("{index")
        {
            return Err(Error::invalid_pattern(
                &self.page_pattern,
                "Unsupported index placeholder; use {index} or {index:0N} with N from 1 to 9",
            ));
        }

        if !self.page_pattern.contains("{ext}") {
            return Err(Error::invalid_pattern(
                &self.page_pattern,
                "Pattern must contain {ext} placeholder",
            ));
        }

        if self.page_pattern.contains('/') || self.page_pattern.contains('\\') {
            return Err(Error::invalid_pattern(
                &self.page_pattern,
                "Pattern must be a plain file name",
            ));
        }

        if let Some(ref name) = self.output_name {
            if name.trim().is_empty() || name.contains('/') || name.contains('\\') {
                return Err(Error::config(format!(
                    "Output name must be a non-empty file stem: '{name}'"
                )));
            }
        }

        for (label, lang) in [
            ("in_language", &self.in_language),
            ("out_language", &self.out_language),
        ] {
            if let Some(lang) = lang {
                if lang.is_empty() || lang.contains(char::is_whitespace) {
                    return Err(Error::config(format!(
                        "{label} must be a language tag such as 'en', got '{lang}'"
                    )));
                }
            }
        }

        if let EntryLayout::Paragraph {
            ref entry_selector,
            ref headword_selector,
        } = self.layout
        {
            if entry_selector.trim().is_empty() || headword_selector.trim().is_empty() {
                return Err(Error::config("Entry and headword selectors must not be empty"));
            }
        }

        if let Some(ref cover) = self.cover_path {
            if !cover.is_file() {
                return Err(Error::config(format!(
                    "Cover image does not exist: {}",
                    cover.display()
                )));
            }
        }

        if let Some(ref template_path) = self.page_template {
            crate::template_validator::TemplateValidator::validate_template(template_path)?;
        }

        if self.dry_run && !self.keep_source {
            tracing::warn!("keep_source has no effect in dry run mode");
        }

        Ok(())
    }

    /// Returns the dictionary base name: the configured name or the input stem.
    #[must_use]
    pub fn dictionary_name(&self) -> String {
        self.output_name.clone().unwrap_or_else(|| {
            self.input
                .file_stem()
                .map_or_else(|| "dictionary".to_string(), |s| s.to_string_lossy().into_owned())
        })
    }

    /// Directory holding the generated Kindle source files.
    #[must_use]
    pub fn source_dir(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}-source", self.dictionary_name()))
    }

    /// Final location of the packed dictionary.
    #[must_use]
    pub fn mobi_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.mobi", self.dictionary_name()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output_dir: PathBuf::from("out"),
            output_name: None,
            page_pattern: DEFAULT_PAGE_PATTERN.to_string(),
            entries_per_page: DEFAULT_ENTRIES_PER_PAGE,
            max_page_bytes: DEFAULT_MAX_PAGE_BYTES,
            layout: EntryLayout::default(),
            inflection: InflectionConfig::default(),
            document_filter: DocumentFilterConfig::default(),
            title: None,
            author: None,
            description: None,
            in_language: None,
            out_language: None,
            exact_inflections: false,
            spellcheck: true,
            cover_path: None,
            page_template: None,
            kindlegen_path: None,
            source_only: false,
            keep_source: true,
            dry_run: false,
            backup_existing: true,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    input: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    output_name: Option<String>,
    page_pattern: Option<String>,
    entries_per_page: Option<usize>,
    max_page_bytes: Option<usize>,
    layout: Option<EntryLayout>,
    inflection: Option<InflectionConfig>,
    document_filter: Option<DocumentFilterConfig>,
    title: Option<String>,
    author: Option<String>,
    description: Option<String>,
    in_language: Option<String>,
    out_language: Option<String>,
    exact_inflections: bool,
    spellcheck: Option<bool>,
    cover_path: Option<PathBuf>,
    page_template: Option<PathBuf>,
    kindlegen_path: Option<PathBuf>,
    source_only: bool,
    keep_source: Option<bool>,
    dry_run: bool,
    backup_existing: Option<bool>,
}

impl ConfigBuilder {
    /// Sets the EPUB to convert.
    #[must_use]
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(path.into());
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Sets the dictionary base name used for the `.mobi` and source directory.
    #[must_use]
    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    /// Sets the entry page filename pattern.
    ///
    /// Pattern must contain `{index}` and `{ext}` placeholders.
    #[must_use]
    pub fn page_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.page_pattern = Some(pattern.into());
        self
    }

    /// Sets the maximum number of entries per page.
    #[must_use]
    pub fn entries_per_page(mut self, entries: usize) -> Self {
        self.entries_per_page = Some(entries);
        self
    }

    /// Sets the approximate maximum page size in bytes.
    #[must_use]
    pub fn max_page_bytes(mut self, bytes: usize) -> Self {
        self.max_page_bytes = Some(bytes);
        self
    }

    /// Sets the entry layout.
    #[must_use]
    pub fn layout(mut self, layout: EntryLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Sets the inflection rules.
    #[must_use]
    pub fn inflection(mut self, config: InflectionConfig) -> Self {
        self.inflection = Some(config);
        self
    }

    /// Sets the content document filter.
    #[must_use]
    pub fn document_filter(mut self, config: DocumentFilterConfig) -> Self {
        self.document_filter = Some(config);
        self
    }

    /// Overrides the dictionary title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Overrides the author.
    #[must_use]
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Overrides the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the headword language.
    #[must_use]
    pub fn in_language(mut self, lang: impl Into<String>) -> Self {
        self.in_language = Some(lang.into());
        self
    }

    /// Sets the definition language.
    #[must_use]
    pub fn out_language(mut self, lang: impl Into<String>) -> Self {
        self.out_language = Some(lang.into());
        self
    }

    /// Marks inflections as exact matches.
    #[must_use]
    pub fn exact_inflections(mut self, enabled: bool) -> Self {
        self.exact_inflections = enabled;
        self
    }

    /// Enables or disables spell-check participation.
    #[must_use]
    pub fn spellcheck(mut self, enabled: bool) -> Self {
        self.spellcheck = Some(enabled);
        self
    }

    /// Sets a cover image to embed.
    #[must_use]
    pub fn cover_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cover_path = Some(path.into());
        self
    }

    /// Sets an external entry page template.
    ///
    /// The template file must exist and contain valid Tera syntax.
    #[must_use]
    pub fn page_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.page_template = Some(path.into());
        self
    }

    /// Sets the kindlegen binary.
    #[must_use]
    pub fn kindlegen_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.kindlegen_path = Some(path.into());
        self
    }

    /// Writes the source directory without packing.
    #[must_use]
    pub fn source_only(mut self, enabled: bool) -> Self {
        self.source_only = enabled;
        self
    }

    /// Keeps or removes the source directory after packing.
    #[must_use]
    pub fn keep_source(mut self, enabled: bool) -> Self {
        self.keep_source = Some(enabled);
        self
    }

    /// Enables dry run mode (no file writes).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Enables or disables backup creation.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = Some(enabled);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no input was given or validation fails.
    pub fn build(self) -> Result<Config> {
        let input = self
            .input
            .ok_or_else(|| Error::config("An input EPUB is required"))?;

        let config = Config {
            input,
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from("out")),
            output_name: self.output_name,
            page_pattern: self
                .page_pattern
                .unwrap_or_else(|| DEFAULT_PAGE_PATTERN.to_string()),
            entries_per_page: self.entries_per_page.unwrap_or(DEFAULT_ENTRIES_PER_PAGE),
            max_page_bytes: self.max_page_bytes.unwrap_or(DEFAULT_MAX_PAGE_BYTES),
            layout: self.layout.unwrap_or_default(),
            inflection: self.inflection.unwrap_or_default(),
            document_filter: self.document_filter.unwrap_or_default(),
            title: self.title,
            author: self.author,
            description: self.description,
            in_language: self.in_language,
            out_language: self.out_language,
            exact_inflections: self.exact_inflections,
            spellcheck: self.spellcheck.unwrap_or(true),
            cover_path: self.cover_path,
            page_template: self.page_template,
            kindlegen_path: self.kindlegen_path,
            source_only: self.source_only,
            keep_source: self.keep_source.unwrap_or(true),
            dry_run: self.dry_run,
            backup_existing: self.backup_existing.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}
