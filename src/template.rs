use crate::{
    config::Config,
    epub::{BookMetadata, CoverImage},
    error::{Error, Result},
    markup,
    splitter::Page,
};
use serde::Serialize;
use std::{collections::HashMap, fs};
use tera::{Context, Tera, Value};
use tracing::debug;

/// Stylesheet copied into every source directory.
pub(crate) const STYLESHEET: &str = include_str!("../templates/style.css");

const DEFAULT_LANGUAGE: &str = "en";

/// Dictionary metadata as rendered into the OPF and title page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DictionaryInfo {
    /// Title
    pub title: String,
    /// Author, if known
    pub author: Option<String>,
    /// Description, if known
    pub description: Option<String>,
    /// Language of the headwords
    pub in_language: String,
    /// Language of the definitions
    pub out_language: String,
    /// Unique identifier of the package
    pub identifier: String,
    /// Conversion date (`YYYY-MM-DD`)
    pub date: String,
    /// Number of entries
    pub entry_count: usize,
}

impl DictionaryInfo {
    /// Resolves metadata: configured overrides first, then the EPUB's own
    /// metadata, then defaults derived from the input file.
    #[must_use]
    pub fn resolve(config: &Config, book: &BookMetadata, entry_count: usize) -> Self {
        let title = config
            .title
            .clone()
            .or_else(|| book.title.clone())
            .unwrap_or_else(|| config.dictionary_name());

        let author = config.author.clone().or_else(|| {
            if book.creators.is_empty() {
                None
            } else {
                Some(book.creators.join(", "))
            }
        });

        let in_language = config
            .in_language
            .clone()
            .or_else(|| book.language.clone())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let out_language = config
            .out_language
            .clone()
            .unwrap_or_else(|| in_language.clone());

        let identifier = book
            .identifier
            .clone()
            .unwrap_or_else(|| format!("urn:lexicon-mobi:{}", config.dictionary_name()));

        Self {
            title,
            author,
            description: config.description.clone().or_else(|| book.description.clone()),
            in_language,
            out_language,
            identifier,
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            entry_count,
        }
    }
}

#[derive(Serialize)]
struct PackageContext<'a> {
    dictionary: &'a DictionaryInfo,
    pages: Vec<PageRef<'a>>,
    first_page: Option<&'a str>,
    cover: Option<CoverView<'a>>,
}

#[derive(Serialize)]
struct PageRef<'a> {
    id: String,
    file: &'a str,
}

#[derive(Serialize)]
struct CoverView<'a> {
    file_name: &'a str,
    media_type: &'a str,
}

#[derive(Serialize)]
struct PageContext<'a> {
    page_index: usize,
    total_pages: usize,
    dictionary: &'a DictionaryInfo,
    spellcheck: bool,
    exact: bool,
    entries: Vec<EntryView<'a>>,
}

#[derive(Serialize)]
struct EntryView<'a> {
    id: &'a str,
    headword: &'a str,
    inflections: &'a [String],
    definition: &'a str,
}

#[derive(Serialize)]
struct FrontmatterContext<'a> {
    dictionary: &'a DictionaryInfo,
    total_pages: usize,
}

/// Template engine rendering the Kindle source files.
pub(crate) struct TemplateEngine {
    tera: Tera,
    spellcheck: bool,
    exact: bool,
}

impl TemplateEngine {
    /// Creates a new template engine from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if template registration fails or the configured
    /// page template cannot be read.
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let mut tera = Tera::default();

        Self::register_builtin_templates(&mut tera)?;

        if let Some(ref path) = config.page_template {
            let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
            tera.add_raw_template("page", &content)
                .map_err(|e| Error::template(path.display().to_string(), e))?;
            debug!("Using custom page template {}", path.display());
        }

        tera.register_filter("xml_escape", Self::xml_escape_filter);

        Ok(Self {
            tera,
            spellcheck: config.spellcheck,
            exact: config.exact_inflections,
        })
    }

    fn register_builtin_templates(tera: &mut Tera) -> Result<()> {
        tera.add_raw_template("opf", include_str!("../templates/opf.tera"))
            .map_err(|e| Error::template("opf", e))?;

        tera.add_raw_template("page", include_str!("../templates/page.tera"))
            .map_err(|e| Error::template("page", e))?;

        tera.add_raw_template("frontmatter", include_str!("../templates/frontmatter.tera"))
            .map_err(|e| Error::template("frontmatter", e))?;

        Ok(())
    }

    /// XML escape filter implementation.
    fn xml_escape_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
        Ok(value
            .as_str()
            .map_or_else(|| value.clone(), |s| Value::String(markup::xml_escape(s))))
    }

    fn render_with<T: Serialize>(&self, name: &str, ctx: &T) -> Result<String> {
        let mut tera_context = Context::new();
        tera_context.insert("ctx", ctx);

        self.tera
            .render(name, &tera_context)
            .map_err(|e| Error::template(name, e))
    }

    /// Renders `content.opf`.
    ///
    /// # Errors
    ///
    /// Returns an error if template rendering fails.
    pub(crate) fn render_opf(
        &self,
        info: &DictionaryInfo,
        page_files: &[String],
        cover: Option<&CoverImage>,
    ) -> Result<String> {
        let context = PackageContext {
            dictionary: info,
            pages: page_files
                .iter()
                .enumerate()
                .map(|(i, file)| PageRef {
                    id: format!("page{}", i + 1),
                    file,
                })
                .collect(),
            first_page: page_files.first().map(String::as_str),
            cover: cover.map(|c| CoverView {
                file_name: &c.file_name,
                media_type: &c.media_type,
            }),
        };

        self.render_with("opf", &context)
    }

    /// Renders one entry page.
    ///
    /// # Errors
    ///
    /// Returns an error if template rendering fails.
    pub(crate) fn render_page(
        &self,
        page: &Page,
        total_pages: usize,
        info: &DictionaryInfo,
    ) -> Result<String> {
        let context = PageContext {
            page_index: page.index + 1,
            total_pages,
            dictionary: info,
            spellcheck: self.spellcheck,
            exact: self.exact,
            entries: page
                .entries
                .iter()
                .map(|e| EntryView {
                    id: &e.id,
                    headword: &e.headword,
                    inflections: &e.inflections,
                    definition: &e.definition,
                })
                .collect(),
        };

        self.render_with("page", &context)
    }

    /// Renders the title page.
    ///
    /// # Errors
    ///
    /// Returns an error if template rendering fails.
    pub(crate) fn render_frontmatter(&self, info: &DictionaryInfo, total_pages: usize) -> Result<String> {
        self.render_with(
            "frontmatter",
            &FrontmatterContext {
                dictionary: info,
                total_pages,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glossary::GlossaryEntry;
    use assert_fs::prelude::*;

    fn create_test_config(temp: &assert_fs::TempDir) -> crate::config::ConfigBuilder {
        let input = temp.child("lexicon-urthus.epub");
        input.write_binary(b"PK").unwrap();

        Config::builder()
            .input(input.path())
            .output_dir(temp.path().join("out"))
    }

    fn info() -> DictionaryInfo {
        DictionaryInfo {
            title: "Lexicon Urthus".to_string(),
            author: Some("Michael Andre-Driussi".to_string()),
            description: None,
            in_language: "en".to_string(),
            out_language: "en".to_string(),
            identifier: "urn:isbn:0964279515".to_string(),
            date: "2026-01-01".to_string(),
            entry_count: 1,
        }
    }

    fn create_test_page() -> Page {
        Page::new(
            0,
            vec![GlossaryEntry {
                id: "e1".to_string(),
                headword: "Ash & Oak".to_string(),
                inflections: vec!["Ash & Oaks".to_string()],
                definition: "a <i>tree</i> pair".to_string(),
                sources: vec!["a.xhtml".to_string()],
                anchors: Vec::new(),
            }],
            0,
        )
    }

    #[test]
    fn test_render_page() {
        let temp = assert_fs::TempDir::new().unwrap();
        let engine = TemplateEngine::new(&create_test_config(&temp).build().unwrap()).unwrap();

        let rendered = engine.render_page(&create_test_page(), 1, &info()).unwrap();

        assert!(rendered.contains("<mbp:frameset>"));
        assert!(rendered.contains("<idx:entry name=\"default\" scriptable=\"yes\" spell=\"yes\">"));
        assert!(rendered.contains("<idx:orth value=\"Ash &amp; Oak\">"));
        assert!(rendered.contains("<idx:iform value=\"Ash &amp; Oaks\"/>"));
        assert!(rendered.contains("<a id=\"e1\"></a>"));
        assert!(rendered.contains("<div class=\"definition\">a <i>tree</i> pair</div>"));
    }

    #[test]
    fn test_render_page_exact_without_spellcheck() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = create_test_config(&temp)
            .exact_inflections(true)
            .spellcheck(false)
            .build()
            .unwrap();
        let engine = TemplateEngine::new(&config).unwrap();

        let rendered = engine.render_page(&create_test_page(), 1, &info()).unwrap();

        assert!(rendered.contains("<idx:entry name=\"default\" scriptable=\"yes\">"));
        assert!(rendered.contains("exact=\"yes\""));
    }

    #[test]
    fn test_render_opf() {
        let temp = assert_fs::TempDir::new().unwrap();
        let engine = TemplateEngine::new(&create_test_config(&temp).build().unwrap()).unwrap();
        let cover = CoverImage {
            file_name: "cover.jpg".to_string(),
            media_type: "image/jpeg".to_string(),
            data: Vec::new(),
        };

        let pages = vec!["entries_001.html".to_string(), "entries_002.html".to_string()];
        let rendered = engine.render_opf(&info(), &pages, Some(&cover)).unwrap();

        assert!(rendered.contains("<dc:Title>Lexicon Urthus</dc:Title>"));
        assert!(rendered.contains("<dc:Creator opf:role=\"aut\">Michael Andre-Driussi</dc:Creator>"));
        assert!(rendered.contains("<DictionaryInLanguage>en</DictionaryInLanguage>"));
        assert!(rendered.contains("<DefaultLookupIndex>default</DefaultLookupIndex>"));
        assert!(rendered.contains("<EmbeddedCover>cover.jpg</EmbeddedCover>"));
        assert!(rendered.contains("<itemref idref=\"page2\"/>"));
        assert!(rendered.contains("href=\"entries_001.html\""));
        assert!(!rendered.contains("<dc:Description>"));
    }

    #[test]
    fn test_render_frontmatter() {
        let temp = assert_fs::TempDir::new().unwrap();
        let engine = TemplateEngine::new(&create_test_config(&temp).build().unwrap()).unwrap();

        let rendered = engine.render_frontmatter(&info(), 3).unwrap();
        assert!(rendered.contains("<h1>Lexicon Urthus</h1>"));
        assert!(rendered.contains("1 entries on 3 pages."));
    }

    #[test]
    fn test_custom_page_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("page.tera");
        template
            .write_str("{% for entry in ctx.entries %}[{{ entry.headword }}]{% endfor %}")
            .unwrap();

        let config = create_test_config(&temp)
            .page_template(template.path())
            .build()
            .unwrap();
        let engine = TemplateEngine::new(&config).unwrap();

        let rendered = engine.render_page(&create_test_page(), 1, &info()).unwrap();
        assert_eq!(rendered, "[Ash & Oak]");
    }

    #[test]
    fn test_resolve_info_precedence() {
        let temp = assert_fs::TempDir::new().unwrap();
        let book = BookMetadata {
            title: Some("Lexicon Urthus".to_string()),
            creators: vec!["M. Andre-Driussi".to_string()],
            language: Some("en-US".to_string()),
            description: None,
            identifier: None,
        };

        let config = create_test_config(&temp)
            .title("Urth Dictionary")
            .out_language("en")
            .build()
            .unwrap();
        let info = DictionaryInfo::resolve(&config, &book, 42);

        assert_eq!(info.title, "Urth Dictionary");
        assert_eq!(info.author.as_deref(), Some("M. Andre-Driussi"));
        assert_eq!(info.in_language, "en-US");
        assert_eq!(info.out_language, "en");
        assert_eq!(info.identifier, "urn:lexicon-mobi:lexicon-urthus");
        assert_eq!(info.entry_count, 42);

        let fallback = DictionaryInfo::resolve(&config, &BookMetadata::default(), 0);
        assert_eq!(fallback.in_language, "en");
        assert!(fallback.author.is_none());
    }

    #[test]
    fn test_xml_escape_filter() {
        let value = Value::String("<test & \"quotes\">".to_string());
        let result = TemplateEngine::xml_escape_filter(&value, &HashMap::new()).unwrap();

        assert_eq!(result.as_str().unwrap(), "&lt;test &amp; &quot;quotes&quot;&gt;");
    }
}
