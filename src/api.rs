//! # Fluent API
//!
//! High-level entry point for converting a dictionary without assembling a
//! [`Config`] by hand.
//!
//! ## Examples
//!
//! ```no_run
//! use lexicon_mobi::api::{Convert, Layout};
//!
//! // Convert with defaults, kindlegen taken from PATH
//! Convert::epub("lexicon-urthus.epub").run()?;
//!
//! // Only produce the Kindle source directory
//! Convert::epub("lexicon-urthus.epub")
//!     .output("./kindle")
//!     .title("Lexicon Urthus")
//!     .languages("en", "en")
//!     .layout(Layout::DefinitionList)
//!     .source_only()
//!     .run()?;
//! # Ok::<(), lexicon_mobi::Error>(())
//! ```

use crate::{
    Config, DocumentFilterConfig, EntryLayout, InflectionConfig, Pipeline, PipelineStats, Result,
};
use std::path::{Path, PathBuf};

// ============================================================================
// Core API
// ============================================================================

/// Builder for a single EPUB conversion.
///
/// # Examples
///
/// ```no_run
/// use lexicon_mobi::api::Convert;
///
/// let stats = Convert::epub("lexicon-urthus.epub")
///     .author("Michael Andre-Driussi")
///     .dry_run()
///     .run()?;
/// println!("{} entries", stats.total_entries);
/// # Ok::<(), lexicon_mobi::Error>(())
/// ```
#[derive(Debug, Clone)]
#[must_use = "call .run() to execute the conversion"]
pub struct Convert {
    input: PathBuf,
    output: PathBuf,
    name: Option<String>,
    title: Option<String>,
    author: Option<String>,
    description: Option<String>,
    in_language: Option<String>,
    out_language: Option<String>,
    layout: EntryLayout,
    inflection: InflectionConfig,
    excludes: Vec<String>,
    includes: Vec<String>,
    kindlegen: Option<PathBuf>,
    mode: OutputMode,
    keep_source: bool,
}

/// How far the conversion goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Pack,
    SourceOnly,
    DryRun,
}

impl Convert {
    /// Start a conversion of the given EPUB.
    pub fn epub(path: impl Into<PathBuf>) -> Self {
        Self {
            input: path.into(),
            output: PathBuf::from("./out"),
            name: None,
            title: None,
            author: None,
            description: None,
            in_language: None,
            out_language: None,
            layout: EntryLayout::default(),
            inflection: InflectionConfig::default(),
            excludes: Vec::new(),
            includes: Vec::new(),
            kindlegen: None,
            mode: OutputMode::Pack,
            keep_source: true,
        }
    }

    /// Set the output directory.
    ///
    /// Default: `./out`
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = path.into();
        self
    }

    /// Set the base name of the source directory and `.mobi`.
    ///
    /// Default: the EPUB file stem
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the dictionary title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Override the dictionary author.
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Override the dictionary description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the headword and definition languages.
    pub fn languages(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.in_language = Some(input.into());
        self.out_language = Some(output.into());
        self
    }

    /// Choose how entries are laid out in the EPUB.
    ///
    /// Default: `Layout::Paragraph`
    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout.into();
        self
    }

    /// Paragraph layout with custom CSS selectors.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lexicon_mobi::api::Convert;
    ///
    /// Convert::epub("glossary.epub")
    ///     .selectors("p.entry", "span.term")
    ///     .run()?;
    /// # Ok::<(), lexicon_mobi::Error>(())
    /// ```
    pub fn selectors(mut self, entry: impl Into<String>, headword: impl Into<String>) -> Self {
        self.layout = EntryLayout::Paragraph {
            entry_selector: entry.into(),
            headword_selector: headword.into(),
        };
        self
    }

    /// Replace the inflection settings.
    pub fn inflection(mut self, config: InflectionConfig) -> Self {
        self.inflection = config;
        self
    }

    /// Index headwords only, without generated forms.
    pub fn without_inflections(self) -> Self {
        self.inflection(InflectionConfig::none())
    }

    /// Skip content documents matching these globs.
    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Read only content documents matching these globs.
    pub fn include_only<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.includes.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Use this kindlegen binary instead of searching `PATH`.
    pub fn kindlegen(mut self, path: impl Into<PathBuf>) -> Self {
        self.kindlegen = Some(path.into());
        self
    }

    /// Write the Kindle source directory without running kindlegen.
    pub fn source_only(mut self) -> Self {
        self.mode = OutputMode::SourceOnly;
        self
    }

    /// Extract and lay out entries without writing anything.
    pub fn dry_run(mut self) -> Self {
        self.mode = OutputMode::DryRun;
        self
    }

    /// Remove the source directory once the `.mobi` is built.
    pub fn discard_source(mut self) -> Self {
        self.keep_source = false;
        self
    }

    /// Execute the conversion and return statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The EPUB doesn't exist or cannot be read
    /// - No entries are found
    /// - Configuration is invalid
    /// - kindlegen is missing or fails
    pub fn run(self) -> Result<PipelineStats> {
        let config = self.build_config()?;
        Pipeline::new(config)?.run()
    }

    fn build_config(self) -> Result<Config> {
        let mut builder = Config::builder()
            .input(self.input)
            .output_dir(self.output)
            .layout(self.layout)
            .inflection(self.inflection)
            .document_filter(
                DocumentFilterConfig::new()
                    .exclude(self.excludes)
                    .include_only(self.includes),
            )
            .source_only(self.mode == OutputMode::SourceOnly)
            .dry_run(self.mode == OutputMode::DryRun)
            .keep_source(self.keep_source);

        if let Some(name) = self.name {
            builder = builder.output_name(name);
        }
        if let Some(title) = self.title {
            builder = builder.title(title);
        }
        if let Some(author) = self.author {
            builder = builder.author(author);
        }
        if let Some(description) = self.description {
            builder = builder.description(description);
        }
        if let Some(lang) = self.in_language {
            builder = builder.in_language(lang);
        }
        if let Some(lang) = self.out_language {
            builder = builder.out_language(lang);
        }
        if let Some(kindlegen) = self.kindlegen {
            builder = builder.kindlegen_path(kindlegen);
        }

        builder.build()
    }
}

// ============================================================================
// Type-safe enums for common options
// ============================================================================

/// Where headwords live in the EPUB markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One `<p>` per entry opening with a bold headword (default)
    Paragraph,
    /// `<dl>` lists of `<dt>` headwords and `<dd>` definitions
    DefinitionList,
}

impl From<Layout> for EntryLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Paragraph => Self::default(),
            Layout::DefinitionList => Self::DefinitionList,
        }
    }
}

// ============================================================================
// Convenience functions
// ============================================================================

/// Convert an EPUB with default settings.
///
/// # Examples
///
/// ```no_run
/// use lexicon_mobi::api::convert;
///
/// let stats = convert("lexicon-urthus.epub")?;
/// println!("Wrote {:?}", stats.mobi_path);
/// # Ok::<(), lexicon_mobi::Error>(())
/// ```
pub fn convert(path: impl AsRef<Path>) -> Result<PipelineStats> {
    Convert::epub(path.as_ref()).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EpubFixture;

    #[test]
    fn convert_builder_has_sensible_defaults() {
        let convert = Convert::epub("book.epub");
        assert_eq!(convert.input, PathBuf::from("book.epub"));
        assert_eq!(convert.output, PathBuf::from("./out"));
        assert_eq!(convert.mode, OutputMode::Pack);
        assert!(convert.keep_source);
        assert_eq!(convert.layout, EntryLayout::default());
    }

    #[test]
    fn convert_builder_is_fluent() {
        let convert = Convert::epub("book.epub")
            .output("./kindle")
            .name("urth")
            .languages("en", "fr")
            .layout(Layout::DefinitionList)
            .source_only()
            .discard_source();

        assert_eq!(convert.output, PathBuf::from("./kindle"));
        assert_eq!(convert.name.as_deref(), Some("urth"));
        assert_eq!(convert.in_language.as_deref(), Some("en"));
        assert_eq!(convert.out_language.as_deref(), Some("fr"));
        assert_eq!(convert.layout, EntryLayout::DefinitionList);
        assert_eq!(convert.mode, OutputMode::SourceOnly);
        assert!(!convert.keep_source);
    }

    #[test]
    fn last_mode_wins() {
        let convert = Convert::epub("book.epub").source_only().dry_run();
        assert_eq!(convert.mode, OutputMode::DryRun);
    }

    #[test]
    fn globs_are_additive() {
        let convert = Convert::epub("book.epub")
            .exclude(["**/front.xhtml"])
            .exclude(["**/index.xhtml", "**/notes.xhtml"]);

        assert_eq!(convert.excludes.len(), 3);
        assert!(convert.excludes.contains(&"**/notes.xhtml".to_string()));
    }

    #[test]
    fn selectors_set_paragraph_layout() {
        let convert = Convert::epub("book.epub")
            .layout(Layout::DefinitionList)
            .selectors("p.entry", "span.term");

        assert_eq!(
            convert.layout,
            EntryLayout::Paragraph {
                entry_selector: "p.entry".to_string(),
                headword_selector: "span.term".to_string(),
            }
        );
    }

    #[test]
    fn build_config_carries_overrides() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = EpubFixture::new("Lexicon")
            .document("a.xhtml", "<p><b>AUTARCH</b> ruler.</p>")
            .write(temp.path());

        let config = Convert::epub(&input)
            .output(temp.path().join("out"))
            .title("Lexicon Urthus")
            .without_inflections()
            .dry_run()
            .build_config()
            .unwrap();

        assert_eq!(config.input, input);
        assert_eq!(config.title.as_deref(), Some("Lexicon Urthus"));
        assert_eq!(config.inflection, InflectionConfig::none());
        assert!(config.dry_run);
        assert!(!config.source_only);
    }

    #[test]
    fn run_dry_run() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = EpubFixture::new("Lexicon")
            .document("a.xhtml", "<p><b>AUTARCH</b> ruler.</p><p><b>CACOGEN</b> alien.</p>")
            .write(temp.path());

        let stats = Convert::epub(input)
            .output(temp.path().join("out"))
            .dry_run()
            .run()
            .unwrap();

        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.files_written, 0);
    }
}
