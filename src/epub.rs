//! EPUB container access.
//!
//! Opens the book with the `epub` crate and hands out its metadata, spine
//! content documents in reading order and cover image.

use crate::error::{Error, Result};
use epub::doc::EpubDoc;
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use url::Url;

const DOCUMENT_TYPES: &[&str] = &[
    "application/xhtml+xml",
    "text/html",
    "application/x-dtbook+xml",
];

static ARCHIVE_ROOT: Lazy<Url> =
    Lazy::new(|| Url::parse("epub://book/").expect("archive root url is valid"));

/// Dublin Core metadata of the source book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    /// `dc:title`
    pub title: Option<String>,
    /// Every `dc:creator`, in document order
    pub creators: Vec<String>,
    /// `dc:language`
    pub language: Option<String>,
    /// `dc:description`
    pub description: Option<String>,
    /// `dc:identifier`
    pub identifier: Option<String>,
}

impl BookMetadata {
    fn from_doc<R: std::io::Read + std::io::Seek>(doc: &EpubDoc<R>) -> Self {
        let first = |name: &str| {
            doc.metadata
                .get(name)
                .into_iter()
                .flatten()
                .map(|v| collapse_whitespace(v))
                .find(|v| !v.is_empty())
        };

        Self {
            title: first("title"),
            creators: doc
                .metadata
                .get("creator")
                .into_iter()
                .flatten()
                .map(|v| collapse_whitespace(v))
                .filter(|v| !v.is_empty())
                .collect(),
            language: first("language"),
            description: first("description"),
            identifier: first("identifier"),
        }
    }
}

/// A spine document with its archive path and text.
#[derive(Debug, Clone)]
pub struct ContentDocument {
    /// Path of the document inside the archive
    pub path: String,
    /// Document markup
    pub html: String,
}

/// The book's cover image.
#[derive(Debug, Clone)]
pub struct CoverImage {
    /// File name to use in the Kindle source directory
    pub file_name: String,
    /// Image media type
    pub media_type: String,
    /// Raw image bytes
    pub data: Vec<u8>,
}

/// An opened EPUB file.
pub struct EpubBook {
    path: PathBuf,
    doc: EpubDoc<BufReader<File>>,
    metadata: BookMetadata,
}

impl std::fmt::Debug for EpubBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpubBook")
            .field("path", &self.path)
            .field("metadata", &self.metadata)
            .field("spine", &self.doc.spine.len())
            .finish_non_exhaustive()
    }
}

impl EpubBook {
    /// Opens an EPUB and parses its package document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened as an EPUB or its spine
    /// is empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "EPUB file not found"),
            ));
        }

        let doc = EpubDoc::new(&path).map_err(|e| Error::epub(&path, e.to_string()))?;

        if doc.spine.is_empty() {
            return Err(Error::epub(&path, "package spine is empty"));
        }

        debug!(
            "Opened EPUB with {} resources and {} spine entries",
            doc.resources.len(),
            doc.spine.len()
        );

        let metadata = BookMetadata::from_doc(&doc);
        Ok(Self {
            path,
            doc,
            metadata,
        })
    }

    /// Returns the book's metadata.
    #[must_use]
    pub const fn metadata(&self) -> &BookMetadata {
        &self.metadata
    }

    /// Returns the path the book was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Archive paths of the spine's content documents, in reading order.
    #[must_use]
    pub fn document_paths(&self) -> Vec<String> {
        self.doc
            .spine
            .iter()
            .filter_map(|idref| match self.doc.resources.get(idref) {
                Some((path, mime)) if DOCUMENT_TYPES.contains(&mime.as_str()) => {
                    Some(archive_path(path))
                }
                Some((_, mime)) => {
                    trace!("Spine item '{}' is {}, skipping", idref, mime);
                    None
                }
                None => {
                    warn!("Spine references unknown manifest id '{}'", idref);
                    None
                }
            })
            .collect()
    }

    /// Reads one content document as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the member is missing from the archive.
    pub fn read_document(&mut self, archive_path: &str) -> Result<ContentDocument> {
        let bytes = self.doc.get_resource_by_path(archive_path).ok_or_else(|| {
            Error::epub(&self.path, format!("cannot read '{archive_path}'"))
        })?;

        Ok(ContentDocument {
            path: archive_path.to_string(),
            html: decode_text(bytes, archive_path),
        })
    }

    /// Reads every spine content document, in reading order.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced document is missing from the archive.
    pub fn documents(&mut self) -> Result<Vec<ContentDocument>> {
        self.document_paths()
            .iter()
            .map(|p| self.read_document(p))
            .collect()
    }

    /// Extracts the cover image, if the package declares one.
    ///
    /// Falls back to an image resource named like a cover when the package
    /// has no cover declaration.
    ///
    /// # Errors
    ///
    /// Returns an error if the declared image is missing from the archive.
    pub fn cover(&mut self) -> Result<Option<CoverImage>> {
        let Some(id) = self.cover_id() else {
            return Ok(None);
        };
        let Some((path, media_type)) = self.doc.resources.get(&id).cloned() else {
            return Ok(None);
        };
        if !media_type.starts_with("image/") {
            debug!("Cover '{}' is {}, ignoring", id, media_type);
            return Ok(None);
        }

        let data = self.doc.get_resource(&id).map(|(data, _)| data).ok_or_else(|| {
            Error::epub(&self.path, format!("cannot read cover '{}'", path.display()))
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg")
            .to_ascii_lowercase();

        debug!("Found cover image {} ({} bytes)", path.display(), data.len());

        Ok(Some(CoverImage {
            file_name: format!("cover.{extension}"),
            media_type,
            data,
        }))
    }

    fn cover_id(&self) -> Option<String> {
        self.doc.get_cover_id().or_else(|| {
            self.doc
                .resources
                .iter()
                .filter(|(_, (_, mime))| mime.starts_with("image/"))
                .find(|(id, (path, _))| {
                    id.to_lowercase().contains("cover")
                        || archive_path(path).to_lowercase().contains("cover")
                })
                .map(|(id, _)| id.clone())
        })
    }
}

fn archive_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_text(bytes: Vec<u8>, member: &str) -> String {
    let text = String::from_utf8(bytes).unwrap_or_else(|e| {
        warn!("'{}' is not valid UTF-8, decoding lossily", member);
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    });

    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// Archive key of `href` as seen from the document `base_file`.
///
/// The key is the decoded archive path, followed by `#fragment` when the
/// href has one. Returns `None` for hrefs that are not valid URL references.
pub(crate) fn archive_key(base_file: &str, href: &str) -> Option<String> {
    let url = ARCHIVE_ROOT.join(base_file).ok()?.join(href).ok()?;
    let path = decode(url.path().trim_start_matches('/'));

    match url.fragment().filter(|f| !f.is_empty()) {
        Some(fragment) => Some(format!("{path}#{}", decode(fragment))),
        None => Some(path),
    }
}

fn decode(text: &str) -> String {
    percent_decode_str(text).decode_utf8_lossy().into_owned()
}
