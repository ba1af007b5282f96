//! # lexicon-mobi
//!
//! Converts EPUB dictionaries such as the *Lexicon Urthus* into Kindle
//! dictionaries with a working lookup index.
//!
//! ## Features
//!
//! - Headword and definition extraction from paragraph or `<dl>` layouts
//! - Lookup forms for folded diacritics, plurals and possessives
//! - Cross-references re-targeted at the generated entry pages
//! - Atomic file operations with automatic backups
//! - Packing with Amazon's `kindlegen`
//!
//! ## Quick Start
//!
//! ```no_run
//! use lexicon_mobi::{Config, Pipeline};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .input("lexicon-urthus.epub")
//!     .output_dir("./kindle")
//!     .in_language("en")
//!     .build()?;
//!
//! Pipeline::new(config)?.run()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library follows a pipeline architecture:
//! 1. **Reader**: Opens the EPUB and loads its content documents in spine order
//! 2. **Extractor**: Finds headwords and sanitizes definitions
//! 3. **Glossary**: Merges duplicates, adds lookup forms and sorts
//! 4. **Splitter**: Divides entries into pages, then links are resolved
//! 5. **Writer**: Renders the OPF package and entry pages
//! 6. **Packer**: Runs `kindlegen` on the source directory

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod epub;
mod error;
mod extract;
mod filter;
mod glossary;
mod inflect;
mod kindlegen;
mod links;
mod markup;
mod pipeline;
mod splitter;
mod template;
mod template_validator;
mod writer;

#[cfg(test)]
mod test_support;

pub mod api;

pub use config::{Config, ConfigBuilder, EntryLayout};
pub use epub::{BookMetadata, ContentDocument, CoverImage, EpubBook};
pub use error::{Error, Result};
pub use extract::{Entry, Headword, parse_headword};
pub use filter::DocumentFilterConfig;
pub use glossary::{Glossary, GlossaryEntry, GlossaryStats, LookupIndex};
pub use inflect::{InflectionConfig, Inflector, fold};
pub use links::LinkStats;
pub use markup::xml_escape;
pub use pipeline::{Pipeline, PipelineStats};
pub use splitter::{Page, Splitter, estimate_entry_bytes};
pub use template::DictionaryInfo;

/// Runs the complete conversion pipeline with the given configuration.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The EPUB doesn't exist or is malformed
/// - No entries are found
/// - Output files cannot be written
/// - kindlegen is missing or fails
///
/// # Examples
///
/// ```no_run
/// use lexicon_mobi::{Config, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .input("lexicon-urthus.epub")
///     .source_only(true)
///     .build()?;
///
/// run(config)?;
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<PipelineStats> {
    Pipeline::new(config)?.run()
}
