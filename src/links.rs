//! Cross-reference resolution.
//!
//! Definitions link to each other through anchors of the source EPUB
//! (`OEBPS/Text/b.xhtml#wolf`). Once entries are laid out on pages those
//! links are re-targeted at `entries_002.html#e417`.

use crate::markup::is_external;
use crate::splitter::Page;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, trace};

static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<a href="([^"]*)">(.*?)</a>"#).expect("link regex is valid"));

/// Outcome of link resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Links pointing at another entry
    pub resolved: usize,
    /// Internal links whose target is not an entry; unwrapped to text
    pub unresolved: usize,
    /// Links leaving the book, kept as they are
    pub external: usize,
}

/// Maps source anchors to their place in the paged output.
#[derive(Debug, Default)]
pub(crate) struct LinkResolver {
    targets: HashMap<String, String>,
}

impl LinkResolver {
    /// Indexes every anchor recorded on the pages' entries.
    ///
    /// A link to a whole document lands on the first entry read from it.
    pub(crate) fn new(pages: &[Page], page_name: impl Fn(usize) -> String) -> Self {
        let mut targets = HashMap::new();

        for page in pages {
            let file = page_name(page.index);

            for entry in &page.entries {
                let target = format!("{file}#{}", entry.id);

                for anchor in &entry.anchors {
                    targets.entry(anchor.clone()).or_insert_with(|| target.clone());
                }
                for source in &entry.sources {
                    targets.entry(source.clone()).or_insert_with(|| target.clone());
                }
            }
        }

        debug!("Indexed {} link targets", targets.len());
        Self { targets }
    }

    /// Output location of an archive key, if it belongs to an entry.
    pub(crate) fn target(&self, key: &str) -> Option<&str> {
        self.targets.get(key).map(String::as_str)
    }

    /// Rewrites the links of one definition.
    pub(crate) fn rewrite(&self, html: &str, stats: &mut LinkStats) -> String {
        LINK.replace_all(html, |caps: &Captures<'_>| {
            let href = &caps[1];
            let text = &caps[2];
            let key = quick_xml::escape::unescape(href).map_or_else(|_| href.into(), |k| k);

            if is_external(&key) {
                stats.external += 1;
                return caps[0].to_string();
            }

            if let Some(target) = self.target(&key) {
                stats.resolved += 1;
                return format!("<a href=\"{target}\">{text}</a>");
            }

            trace!("Unresolved link to '{}'", key);
            stats.unresolved += 1;
            text.to_string()
        })
        .into_owned()
    }

    /// Rewrites every definition on the pages in place.
    pub(crate) fn resolve(&self, pages: &mut [Page]) -> LinkStats {
        let mut stats = LinkStats::default();

        for page in pages.iter_mut() {
            for entry in &mut page.entries {
                if entry.definition.contains("<a ") {
                    entry.definition = self.rewrite(&entry.definition, &mut stats);
                }
            }
        }

        debug!(
            "Links: {} resolved, {} unresolved, {} external",
            stats.resolved, stats.unresolved, stats.external
        );
        stats
    }
}
