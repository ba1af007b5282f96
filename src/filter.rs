//! Content document selection.
//!
//! Dictionaries usually ship a cover, a table of contents and a preface
//! next to the entry documents. Glob patterns over archive paths decide
//! which spine documents are scanned for entries.

use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

/// Configuration for content document filtering with glob patterns.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilterConfig {
    exclude: Vec<String>,
    include_only: Vec<String>,
}

impl DocumentFilterConfig {
    /// Creates an empty configuration that reads every document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips documents matching any of these patterns.
    #[must_use]
    pub fn exclude(mut self, patterns: Vec<String>) -> Self {
        self.exclude = patterns;
        self
    }

    /// Reads only documents matching one of these patterns.
    #[must_use]
    pub fn include_only(mut self, patterns: Vec<String>) -> Self {
        self.include_only = patterns;
        self
    }

    /// Returns true if no pattern is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exclude.is_empty() && self.include_only.is_empty()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DocumentFilter {
    exclude: GlobSet,
    include: Option<GlobSet>,
}

impl DocumentFilter {
    /// Compiles the configured patterns.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid glob.
    pub(crate) fn new(config: &DocumentFilterConfig) -> Result<Self> {
        if config.is_empty() {
            debug!("No document filter configured; reading every spine document");
            return Ok(Self {
                exclude: GlobSet::empty(),
                include: None,
            });
        }

        let exclude = Self::build_globset(&config.exclude)?;

        let include = if config.include_only.is_empty() {
            None
        } else {
            Some(Self::build_globset(&config.include_only)?)
        };

        Ok(Self { exclude, include })
    }

    fn build_globset(patterns: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::config(format!("Invalid glob pattern '{pattern}': {e}")))?;
            builder.add(glob);
        }

        builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build glob set: {e}")))
    }

    /// Decides whether a content document at `archive_path` is read.
    pub(crate) fn should_read(&self, archive_path: &str) -> bool {
        if let Some(ref include) = self.include {
            if !include.is_match(archive_path) {
                return false;
            }
        }

        !self.exclude.is_match(archive_path)
    }
}
