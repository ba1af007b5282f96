use crate::{
    config::{expand_page_pattern, Config},
    epub::CoverImage,
    error::{Error, Result},
    splitter::Page,
    template::{DictionaryInfo, TemplateEngine, STYLESHEET},
};
use serde::Serialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tracing::{debug, info};

const PAGE_EXTENSION: &str = "html";
const OPF_FILE: &str = "content.opf";
const FRONTMATTER_FILE: &str = "frontmatter.html";
const STYLESHEET_FILE: &str = "style.css";
const ENTRIES_FILE: &str = "entries.json";
const SUMMARY_FILE: &str = "summary.json";

/// Summary of a written source directory.
#[derive(Debug, Serialize)]
pub(crate) struct WriteSummary<'a> {
    /// Dictionary metadata
    pub dictionary: &'a DictionaryInfo,

    /// Total number of entry pages
    pub total_pages: usize,

    /// Total number of entries
    pub total_entries: usize,

    /// Total number of lookup forms
    pub total_inflections: usize,

    /// Execution duration in seconds
    pub duration_secs: f64,

    /// Source directory path
    pub source_directory: String,

    /// Individual page summaries
    pub pages: Vec<PageSummary<'a>>,

    /// Generation timestamp
    pub generated_at: String,
}

/// Summary of a single page.
#[derive(Debug, Serialize)]
pub(crate) struct PageSummary<'a> {
    /// Page index (1-based for user display)
    pub index: usize,

    /// Number of entries on the page
    pub entries: usize,

    /// First headword
    pub first: &'a str,

    /// Last headword
    pub last: &'a str,

    /// Estimated size in bytes
    pub approx_bytes: usize,

    /// Output filename
    pub filename: String,
}

#[derive(Serialize)]
struct EntryRecord<'a> {
    id: &'a str,
    headword: &'a str,
    inflections: &'a [String],
    definition: &'a str,
    sources: &'a [String],
    page: String,
}

/// Files produced by [`SourceWriter::write_source`].
#[derive(Debug, Clone)]
pub(crate) struct WrittenSource {
    /// The package document kindlegen is pointed at
    pub opf_path: PathBuf,

    /// Every file written, package document included
    pub files: Vec<PathBuf>,
}

/// Writes the Kindle source directory with atomic file operations.
pub(crate) struct SourceWriter {
    source_dir: PathBuf,
    page_pattern: String,
    backup_existing: bool,
    template_engine: TemplateEngine,
}

impl SourceWriter {
    /// Creates a new writer from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if template engine initialization fails.
    pub(crate) fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            source_dir: config.source_dir(),
            page_pattern: config.page_pattern.clone(),
            backup_existing: config.backup_existing,
            template_engine: TemplateEngine::new(config)?,
        })
    }

    /// Directory the source files are written to.
    pub(crate) fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// File name of the page with the given 0-based index.
    pub(crate) fn page_file_name(&self, index: usize) -> String {
        expand_page_pattern(&self.page_pattern, index + 1, PAGE_EXTENSION)
    }

    /// Writes the complete source directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The source directory cannot be created
    /// - Template rendering fails
    /// - File write operations fail
    pub(crate) fn write_source(
        &self,
        pages: &[Page],
        info: &DictionaryInfo,
        cover: Option<&CoverImage>,
    ) -> Result<WrittenSource> {
        fs::create_dir_all(&self.source_dir).map_err(|e| Error::io(&self.source_dir, e))?;

        info!(
            "Writing {} pages to {}",
            pages.len(),
            self.source_dir.display()
        );

        let mut files = Vec::with_capacity(pages.len() + 5);
        let page_files: Vec<String> = pages.iter().map(|p| self.page_file_name(p.index)).collect();

        for (page, file_name) in pages.iter().zip(&page_files) {
            let content = self.template_engine.render_page(page, pages.len(), info)?;
            let path = self.source_dir.join(file_name);
            self.write_file_atomic(&path, content.as_bytes())?;

            debug!(
                "Wrote page {}/{} ({} entries, ~{} bytes) to {}",
                page.index + 1,
                pages.len(),
                page.entry_count(),
                page.approx_bytes,
                path.display()
            );
            files.push(path);
        }

        let frontmatter = self.template_engine.render_frontmatter(info, pages.len())?;
        files.push(self.write_named(FRONTMATTER_FILE, frontmatter.as_bytes())?);
        files.push(self.write_named(STYLESHEET_FILE, STYLESHEET.as_bytes())?);

        if let Some(cover) = cover {
            files.push(self.write_named(&cover.file_name, &cover.data)?);
            debug!("Embedded cover {}", cover.file_name);
        }

        files.push(self.write_entries(pages, &page_files)?);

        let opf = self.template_engine.render_opf(info, &page_files, cover)?;
        let opf_path = self.write_named(OPF_FILE, opf.as_bytes())?;
        files.push(opf_path.clone());

        info!("Successfully wrote {} source files", files.len());
        Ok(WrittenSource { opf_path, files })
    }

    fn write_named(&self, file_name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.source_dir.join(file_name);
        self.write_file_atomic(&path, content)?;
        Ok(path)
    }

    /// Writes `entries.json` with the final, link-resolved definitions.
    fn write_entries(&self, pages: &[Page], page_files: &[String]) -> Result<PathBuf> {
        let records: Vec<EntryRecord<'_>> = pages
            .iter()
            .zip(page_files)
            .flat_map(|(page, file)| {
                page.entries.iter().map(move |e| EntryRecord {
                    id: &e.id,
                    headword: &e.headword,
                    inflections: &e.inflections,
                    definition: &e.definition,
                    sources: &e.sources,
                    page: file.clone(),
                })
            })
            .collect();

        let json = serde_json::to_vec_pretty(&records)?;
        self.write_named(ENTRIES_FILE, &json)
    }

    /// Writes a file atomically with optional backup.
    ///
    /// # Process
    ///
    /// 1. Creates backup if file exists and backup is enabled
    /// 2. Writes content to temporary file
    /// 3. Syncs temporary file to disk
    /// 4. Atomically renames temporary file to target path
    fn write_file_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        if path.exists() && self.backup_existing {
            self.backup_file(path)?;
        }

        let mut temp_name = path.as_os_str().to_os_string();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

        temp_file
            .write_all(content)
            .map_err(|e| Error::io(&temp_path, e))?;

        temp_file
            .sync_all()
            .map_err(|e| Error::io(&temp_path, e))?;

        drop(temp_file);

        fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;

        Ok(())
    }

    /// Creates a timestamped backup of an existing file.
    fn backup_file(&self, path: &Path) -> Result<()> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_nanos();

        let filename = path
            .file_name()
            .ok_or_else(|| Error::config("Invalid file path"))?
            .to_string_lossy();

        let backup_path = self.source_dir.join(format!("{filename}.backup.{timestamp}"));

        fs::copy(path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;

        debug!("Created backup: {}", backup_path.display());
        Ok(())
    }

    /// Writes `summary.json` describing the source directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the summary file cannot be written.
    pub(crate) fn write_summary(
        &self,
        pages: &[Page],
        info: &DictionaryInfo,
        duration: Duration,
    ) -> Result<PathBuf> {
        let summary = WriteSummary {
            dictionary: info,
            total_pages: pages.len(),
            total_entries: pages.iter().map(Page::entry_count).sum(),
            total_inflections: pages
                .iter()
                .flat_map(|p| &p.entries)
                .map(|e| e.inflections.len())
                .sum(),
            duration_secs: duration.as_secs_f64(),
            source_directory: self.source_dir.display().to_string(),
            pages: pages
                .iter()
                .map(|p| {
                    let (first, last) = p.range().unwrap_or_default();
                    PageSummary {
                        index: p.index + 1,
                        entries: p.entry_count(),
                        first,
                        last,
                        approx_bytes: p.approx_bytes,
                        filename: self.page_file_name(p.index),
                    }
                })
                .collect(),
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };

        let json = serde_json::to_vec_pretty(&summary)?;
        let path = self.write_named(SUMMARY_FILE, &json)?;

        info!("Wrote summary to {}", path.display());
        Ok(path)
    }
}
