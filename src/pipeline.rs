use crate::{
    config::Config,
    epub::{ContentDocument, CoverImage, EpubBook},
    error::{Error, Result},
    extract::{Entry, Extractor},
    filter::DocumentFilter,
    glossary::Glossary,
    inflect::Inflector,
    kindlegen::Packer,
    links::LinkResolver,
    splitter::{Page, Splitter},
    template::DictionaryInfo,
    writer::SourceWriter,
};
use serde::Serialize;
use std::{
    fs,
    path::Path,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

const TOTAL_STAGES: usize = 6;

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    /// Content documents scanned for entries
    pub documents_read: usize,

    /// Content documents excluded by the document filter
    pub documents_skipped: usize,

    /// Entries found in the documents
    pub entries_extracted: usize,

    /// Entries merged into an earlier entry with the same headword
    pub entries_merged: usize,

    /// Entries in the finished dictionary
    pub total_entries: usize,

    /// Lookup forms attached to entries
    pub inflections: usize,

    /// Lookup forms dropped because another entry owns the word
    pub dropped_conflicts: usize,

    /// Distinct terms in the lookup index
    pub lookup_terms: usize,

    /// Entry pages created
    pub pages: usize,

    /// Cross-references re-targeted at entries
    pub links_resolved: usize,

    /// Cross-references unwrapped to plain text
    pub links_unresolved: usize,

    /// Number of files written
    pub files_written: usize,

    /// Kindle source directory
    pub source_directory: String,

    /// Whether the source directory was removed after packing
    pub source_removed: bool,

    /// The packed dictionary, when kindlegen ran
    pub mobi_path: Option<String>,

    /// Warnings reported by kindlegen
    pub packer_warnings: usize,

    /// Total execution time
    pub duration: Duration,

    /// Time spent reading the EPUB
    pub read_duration: Duration,

    /// Time spent extracting entries
    pub extract_duration: Duration,

    /// Time spent building the glossary and laying out pages
    pub build_duration: Duration,

    /// Time spent writing the source directory
    pub write_duration: Duration,

    /// Time spent in kindlegen
    pub pack_duration: Duration,
}

impl PipelineStats {
    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║            Conversion Summary                         ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Documents Read:       {:>8}                        ║",
            self.documents_read
        );
        println!(
            "║   - Skipped:          {:>8}                        ║",
            self.documents_skipped
        );
        println!("║                                                       ║");
        println!(
            "║ Entries Extracted:    {:>8}                        ║",
            self.entries_extracted
        );
        println!(
            "║   - Merged:           {:>8}                        ║",
            self.entries_merged
        );
        println!(
            "║ Dictionary Entries:   {:>8}                        ║",
            self.total_entries
        );
        println!(
            "║ Inflections:          {:>8}                        ║",
            self.inflections
        );
        println!(
            "║   - Conflicts Dropped:{:>8}                        ║",
            self.dropped_conflicts
        );
        println!(
            "║ Lookup Terms:         {:>8}                        ║",
            self.lookup_terms
        );
        println!(
            "║ Pages:                {:>8}                        ║",
            self.pages
        );
        println!(
            "║ Links Resolved:       {:>8} ({} unresolved)          ║",
            self.links_resolved, self.links_unresolved
        );
        println!("║                                                       ║");
        println!(
            "║ Files Written:        {:>8}                        ║",
            self.files_written
        );
        println!("║ Source Directory:                                     ║");
        println!(
            "║   {}{}",
            self.source_directory,
            if self.source_removed { " (removed)" } else { "" }
        );
        if let Some(ref mobi) = self.mobi_path {
            println!("║ Dictionary:                                           ║");
            println!("║   {mobi}");
            println!(
                "║   - kindlegen warnings: {:>6}                        ║",
                self.packer_warnings
            );
        }
        println!("║                                                       ║");
        println!("║ Timing Breakdown:                                     ║");
        println!(
            "║   - Reading:          {:>8.2}s                     ║",
            self.read_duration.as_secs_f64()
        );
        println!(
            "║   - Extracting:       {:>8.2}s                     ║",
            self.extract_duration.as_secs_f64()
        );
        println!(
            "║   - Building:         {:>8.2}s                     ║",
            self.build_duration.as_secs_f64()
        );
        println!(
            "║   - Writing:          {:>8.2}s                     ║",
            self.write_duration.as_secs_f64()
        );
        println!(
            "║   - Packing:          {:>8.2}s                     ║",
            self.pack_duration.as_secs_f64()
        );
        println!(
            "║   - Total:            {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        println!(
            "║   - Throughput:       {:>8.0} entries/s            ║",
            self.entries_per_sec()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }

    /// Returns the throughput in entries per second.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn entries_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.total_entries as f64 / secs
    }
}

/// Main pipeline orchestrator converting an EPUB dictionary for Kindle.
pub struct Pipeline {
    config: Config,
    filter: DocumentFilter,
    extractor: Extractor,
    inflector: Inflector,
    splitter: Splitter,
    writer: SourceWriter,
    packer: Option<Packer>,
}

impl Pipeline {
    /// Creates a new pipeline with the given configuration.
    ///
    /// kindlegen is located up front unless nothing will be packed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - A glob or selector does not compile
    /// - Template initialization fails
    /// - kindlegen is needed but cannot be found
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let filter = DocumentFilter::new(&config.document_filter)?;
        let extractor = Extractor::new(&config.layout)?;
        let inflector = Inflector::new(config.inflection);
        let splitter = Splitter::new(&config);
        let writer = SourceWriter::new(&config)?;

        let packer = if config.dry_run || config.source_only {
            None
        } else {
            let packer = Packer::locate(config.kindlegen_path.as_deref())?;
            debug!("Using kindlegen at {}", packer.binary().display());
            Some(packer)
        };

        Ok(Self {
            config,
            filter,
            extractor,
            inflector,
            splitter,
            writer,
            packer,
        })
    }

    /// Executes the complete pipeline and returns statistics.
    ///
    /// # Process
    ///
    /// 1. **Read**: Opens the EPUB and loads the selected content documents
    /// 2. **Extract**: Finds headwords and definitions
    /// 3. **Build**: Merges, inflects, sorts and indexes the entries
    /// 4. **Lay out**: Splits entries into pages and resolves cross-references
    /// 5. **Write**: Renders the Kindle source directory
    /// 6. **Pack**: Runs kindlegen to produce the `.mobi`
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails, or [`Error::NoEntries`] when the
    /// layout matches nothing.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lexicon_mobi::{Config, Pipeline};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::builder()
    ///     .input("lexicon-urthus.epub")
    ///     .source_only(true)
    ///     .build()?;
    ///
    /// let stats = Pipeline::new(config)?.run()?;
    /// stats.print_summary();
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(input = %self.config.input.display()))]
    pub fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let mut stats = PipelineStats {
            source_directory: self.writer.source_dir().display().to_string(),
            ..PipelineStats::default()
        };

        info!("Starting conversion");

        info!("Stage 1/{TOTAL_STAGES}: Reading EPUB...");
        let read_start = Instant::now();
        let mut book = EpubBook::open(&self.config.input)?;
        let documents = self.read_documents(&mut book, &mut stats)?;
        stats.read_duration = read_start.elapsed();

        info!(
            "✓ Read {} documents ({} skipped) in {:.2}s",
            stats.documents_read,
            stats.documents_skipped,
            stats.read_duration.as_secs_f64()
        );

        info!("Stage 2/{TOTAL_STAGES}: Extracting entries...");
        let extract_start = Instant::now();
        let entries: Vec<Entry> = documents
            .iter()
            .flat_map(|doc| self.extractor.extract(doc))
            .collect();
        stats.extract_duration = extract_start.elapsed();
        stats.entries_extracted = entries.len();

        if entries.is_empty() {
            return Err(Error::no_entries(&self.config.input));
        }

        info!(
            "✓ Extracted {} entries in {:.2}s",
            entries.len(),
            stats.extract_duration.as_secs_f64()
        );

        info!("Stage 3/{TOTAL_STAGES}: Building lookup index...");
        let build_start = Instant::now();
        let glossary = Glossary::build(entries, &self.inflector);
        let glossary_stats = glossary.stats();
        stats.entries_merged = glossary_stats.merged;
        stats.total_entries = glossary.len();
        stats.inflections = glossary_stats.inflections;
        stats.dropped_conflicts = glossary_stats.dropped_conflicts;
        stats.lookup_terms = glossary_stats.lookup_terms;

        info!(
            "✓ {} entries, {} inflections, {} lookup terms",
            stats.total_entries, stats.inflections, stats.lookup_terms
        );

        info!("Stage 4/{TOTAL_STAGES}: Laying out pages...");
        let mut pages = self.splitter.split(glossary.into_entries());
        let resolver = LinkResolver::new(&pages, |index| self.writer.page_file_name(index));
        let link_stats = resolver.resolve(&mut pages);
        stats.pages = pages.len();
        stats.links_resolved = link_stats.resolved;
        stats.links_unresolved = link_stats.unresolved;
        stats.build_duration = build_start.elapsed();

        info!(
            "✓ Created {} pages, resolved {} links in {:.2}s",
            pages.len(),
            link_stats.resolved,
            stats.build_duration.as_secs_f64()
        );
        self.log_page_distribution(&pages);

        let dictionary = DictionaryInfo::resolve(&self.config, book.metadata(), stats.total_entries);

        if self.config.dry_run {
            warn!("Dry run mode enabled - skipping file writes and packing");
            self.print_dry_run_summary(&pages, &dictionary);
            stats.duration = start_time.elapsed();
            return Ok(stats);
        }

        info!("Stage 5/{TOTAL_STAGES}: Writing Kindle source...");
        let write_start = Instant::now();
        let cover = self.cover(&mut book)?;
        let written = self.writer.write_source(&pages, &dictionary, cover.as_ref())?;
        self.writer
            .write_summary(&pages, &dictionary, start_time.elapsed())?;
        stats.files_written = written.files.len() + 1;
        stats.write_duration = write_start.elapsed();

        info!(
            "✓ Wrote {} files in {:.2}s",
            stats.files_written,
            stats.write_duration.as_secs_f64()
        );

        if let Some(ref packer) = self.packer {
            info!("Stage 6/{TOTAL_STAGES}: Packing with kindlegen...");
            let pack_start = Instant::now();
            let outcome = packer.pack(&written.opf_path, &self.config.mobi_path())?;
            stats.pack_duration = pack_start.elapsed();
            stats.packer_warnings = outcome.warnings.len();
            stats.mobi_path = Some(outcome.mobi_path.display().to_string());

            info!(
                "✓ Packed {} in {:.2}s",
                outcome.mobi_path.display(),
                stats.pack_duration.as_secs_f64()
            );

            if !self.config.keep_source {
                remove_source(self.writer.source_dir())?;
                stats.source_removed = true;
            }
        } else {
            info!("Stage 6/{TOTAL_STAGES}: Skipping kindlegen (source only)");
        }

        stats.duration = start_time.elapsed();

        info!(
            "✓ Conversion completed successfully in {:.2}s ({:.0} entries/s)",
            stats.duration.as_secs_f64(),
            stats.entries_per_sec()
        );

        Ok(stats)
    }

    fn read_documents(
        &self,
        book: &mut EpubBook,
        stats: &mut PipelineStats,
    ) -> Result<Vec<ContentDocument>> {
        let mut documents = Vec::new();

        for path in book.document_paths() {
            if !self.filter.should_read(&path) {
                debug!("Skipping {}", path);
                stats.documents_skipped += 1;
                continue;
            }
            documents.push(book.read_document(&path)?);
        }

        stats.documents_read = documents.len();
        Ok(documents)
    }

    /// The configured cover image, else the EPUB's own.
    fn cover(&self, book: &mut EpubBook) -> Result<Option<CoverImage>> {
        if let Some(ref path) = self.config.cover_path {
            let data = fs::read(path).map_err(|e| Error::io(path, e))?;
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("jpg")
                .to_ascii_lowercase();

            return Ok(Some(CoverImage {
                media_type: image_media_type(&extension).to_string(),
                file_name: format!("cover.{extension}"),
                data,
            }));
        }

        match book.cover() {
            Ok(cover) => Ok(cover),
            Err(e) => {
                warn!("Ignoring unreadable cover image: {}", e);
                Ok(None)
            }
        }
    }

    /// Logs information about page distribution.
    fn log_page_distribution(&self, pages: &[Page]) {
        if pages.is_empty() {
            return;
        }

        let total_bytes: usize = pages.iter().map(|p| p.approx_bytes).sum();
        let max_bytes = pages.iter().map(|p| p.approx_bytes).max().unwrap_or(0);
        let min_bytes = pages.iter().map(|p| p.approx_bytes).min().unwrap_or(0);

        info!(
            "  Page stats: avg={}, min={}, max={} bytes",
            total_bytes / pages.len(),
            min_bytes,
            max_bytes
        );

        let oversized = pages
            .iter()
            .filter(|p| p.approx_bytes > self.config.max_page_bytes)
            .count();

        if oversized > 0 {
            warn!(
                "  {} page(s) exceed the byte limit because of single large entries",
                oversized
            );
        }
    }

    /// Prints a summary for dry run mode.
    fn print_dry_run_summary(&self, pages: &[Page], dictionary: &DictionaryInfo) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║                 Dry Run Summary                       ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!("║ Title:                                                ║");
        println!("║   {}", dictionary.title);
        println!(
            "║ Entries:              {:>8}                        ║",
            dictionary.entry_count
        );
        println!(
            "║ Pages:                {:>8}                        ║",
            pages.len()
        );
        if let Some((first, _)) = pages.first().and_then(Page::range) {
            let last = pages
                .last()
                .and_then(Page::range)
                .map_or(first, |(_, last)| last);
            println!("║ Range:                                                ║");
            println!("║   {first} … {last}");
        }
        println!("║ Would write:                                          ║");
        println!("║   {}", self.writer.source_dir().display());
        if self.config.source_only {
            println!("║ kindlegen would be skipped (source only)              ║");
        } else {
            println!("║ Would pack:                                           ║");
            println!("║   {}", self.config.mobi_path().display());
        }
        println!("║                                                       ║");
        println!("║ ⚠ No files were written (dry run mode)               ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

fn image_media_type(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "image/jpeg",
    }
}

fn remove_source(dir: &Path) -> Result<()> {
    fs::remove_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    info!("Removed source directory {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DocumentFilterConfig;
    use crate::test_support::EpubFixture;
    use assert_fs::prelude::*;
    use std::path::PathBuf;

    fn lexicon(temp: &assert_fs::TempDir) -> PathBuf {
        EpubFixture::new("Lexicon Urthus")
            .creator("Michael Andre-Driussi")
            .cover(b"\xFF\xD8jpeg")
            .document("front.xhtml", "<h1>Lexicon Urthus</h1><p>A dictionary.</p>")
            .document(
                "a.xhtml",
                "<p><b id=\"abacinate\">ABACINATE</b>, to blind with a hot plate.</p>\
                 <p><b>AUTARCH</b>: the ruler of the Commonwealth; \
                 see <a href=\"c.xhtml#carnifex\">carnifex</a>.</p>",
            )
            .document(
                "c.xhtml",
                "<p><b id=\"carnifex\">CARNIFEX</b> an executioner.</p>\
                 <p>Severian is one; compare <a href=\"a.xhtml#abacinate\">abacination</a>.</p>\
                 <p><b>AUTARCH</b> also the title of Severian.</p>",
            )
            .write(temp.path())
    }

    fn builder(temp: &assert_fs::TempDir) -> crate::config::ConfigBuilder {
        Config::builder()
            .input(lexicon(temp))
            .output_dir(temp.path().join("out"))
            .output_name("urth")
    }

    #[test]
    fn test_pipeline_source_only() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = builder(&temp).source_only(true).build().unwrap();

        let stats = Pipeline::new(config).unwrap().run().unwrap();

        assert_eq!(stats.documents_read, 3);
        assert_eq!(stats.entries_extracted, 4);
        assert_eq!(stats.entries_merged, 1);
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.links_resolved, 2);
        assert!(stats.mobi_path.is_none());

        let source = temp.child("out").child("urth-source");
        let page = fs::read_to_string(source.child("entries_001.html").path()).unwrap();
        assert!(page.contains("<idx:orth value=\"CARNIFEX\">"));
        assert!(page.contains("<idx:iform value=\"CARNIFICES\"/>"));
        assert!(page.contains("<a href=\"entries_001.html#e3\">carnifex</a>"));

        let opf = fs::read_to_string(source.child("content.opf").path()).unwrap();
        assert!(opf.contains("<dc:Title>Lexicon Urthus</dc:Title>"));
        assert!(opf.contains("<EmbeddedCover>cover.jpg</EmbeddedCover>"));
        assert!(source.child("cover.jpg").path().exists());
        assert!(source.child("summary.json").path().exists());
    }

    #[test]
    fn test_pipeline_dry_run() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = builder(&temp).dry_run(true).build().unwrap();

        let stats = Pipeline::new(config).unwrap().run().unwrap();

        assert_eq!(stats.files_written, 0);
        assert_eq!(stats.total_entries, 3);
        assert!(!temp.child("out").path().exists());
    }

    #[test]
    fn test_pipeline_document_filter() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = builder(&temp)
            .document_filter(DocumentFilterConfig::new().exclude(vec!["**/c.xhtml".to_string()]))
            .dry_run(true)
            .build()
            .unwrap();

        let stats = Pipeline::new(config).unwrap().run().unwrap();

        assert_eq!(stats.documents_read, 2);
        assert_eq!(stats.documents_skipped, 1);
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.links_unresolved, 1);
    }

    #[test]
    fn test_pipeline_resolves_percent_encoded_fragments() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = EpubFixture::new("Cafés")
            .document(
                "a.xhtml",
                "<p><b id=\"café\">CAFÉ</b> a house of refreshment.</p>\
                 <p><b>BUS</b> a carriage; stops at the <a href=\"a.xhtml#caf%C3%A9\">café</a>.</p>",
            )
            .write(temp.path());

        let config = Config::builder()
            .input(input)
            .output_dir(temp.path().join("out"))
            .dry_run(true)
            .build()
            .unwrap();
        let stats = Pipeline::new(config).unwrap().run().unwrap();

        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.links_resolved, 1);
        assert_eq!(stats.links_unresolved, 0);
    }

    #[test]
    fn test_pipeline_epub2_cover() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = EpubFixture::new("Urth")
            .cover_meta(b"\x89PNG-ish")
            .document("a.xhtml", "<p><b>ZAK</b> a shape-shifter.</p>")
            .write(temp.path());

        let config = Config::builder()
            .input(input)
            .output_dir(temp.path().join("out"))
            .output_name("urth")
            .source_only(true)
            .build()
            .unwrap();
        Pipeline::new(config).unwrap().run().unwrap();

        let source = temp.child("out").child("urth-source");
        assert_eq!(
            fs::read(source.child("cover.png").path()).unwrap(),
            b"\x89PNG-ish"
        );
        let opf = fs::read_to_string(source.child("content.opf").path()).unwrap();
        assert!(opf.contains("<EmbeddedCover>cover.png</EmbeddedCover>"));
    }

    #[test]
    fn test_pipeline_no_entries() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = EpubFixture::new("Empty")
            .document("a.xhtml", "<p>Nothing bold here.</p>")
            .write(temp.path());

        let config = Config::builder()
            .input(input)
            .output_dir(temp.path().join("out"))
            .source_only(true)
            .build()
            .unwrap();

        let err = Pipeline::new(config).unwrap().run().unwrap_err();
        assert!(matches!(err, Error::NoEntries { .. }));
    }

    #[test]
    fn test_pipeline_missing_kindlegen() {
        let temp = assert_fs::TempDir::new().unwrap();
        let missing = temp.path().join("missing-kindlegen");
        let config = builder(&temp).kindlegen_path(&missing).build().unwrap();

        match Pipeline::new(config) {
            Err(Error::PackerNotFound { searched }) => {
                assert!(searched.contains("missing-kindlegen"));
            }
            Err(other) => panic!("expected PackerNotFound, got {other:?}"),
            Ok(_) => panic!("expected PackerNotFound, got a pipeline"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_pipeline_packs_and_discards_source() {
        use std::os::unix::fs::PermissionsExt;

        let temp = assert_fs::TempDir::new().unwrap();
        let script = temp.child("kindlegen");
        script
            .write_str("#!/bin/sh\nprintf 'MOBI' > \"$6\"\nexit 0\n")
            .unwrap();
        fs::set_permissions(script.path(), fs::Permissions::from_mode(0o755)).unwrap();

        let config = builder(&temp)
            .kindlegen_path(script.path())
            .keep_source(false)
            .build()
            .unwrap();

        let stats = Pipeline::new(config).unwrap().run().unwrap();

        let mobi = temp.child("out").child("urth.mobi");
        assert!(mobi.path().exists());
        assert_eq!(stats.mobi_path, Some(mobi.path().display().to_string()));
        assert!(stats.source_removed);
        assert!(!temp.child("out").child("urth-source").path().exists());
    }

    #[test]
    fn test_entries_per_sec() {
        let stats = PipelineStats {
            total_entries: 100,
            duration: Duration::from_secs(2),
            ..PipelineStats::default()
        };
        assert!((stats.entries_per_sec() - 50.0).abs() < f64::EPSILON);
        assert!(PipelineStats::default().entries_per_sec().abs() < f64::EPSILON);
    }
}
