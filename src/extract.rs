//! Headword and definition extraction from content documents.

use crate::config::EntryLayout;
use crate::epub::ContentDocument;
use crate::error::{Error, Result};
use crate::markup::{trim_leading_separators, Sanitized, Sanitizer};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, trace};

static ALTERNATE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(?:,|/|\bor\b)\s*").expect("separator regex is valid"));

const TRAILING_SEPARATORS: &[char] = &[',', '.', ':', ';', '-', '\u{2013}', '\u{2014}'];

/// A dictionary entry as found in the source book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// Display form of the headword
    pub headword: String,
    /// Alternate spellings given next to the headword
    pub alternates: Vec<String>,
    /// Sanitized XHTML definition
    pub definition: String,
    /// Archive path of the document the entry came from
    pub source: String,
    /// Anchor keys (`doc#id`) pointing into this entry
    #[serde(skip)]
    pub anchors: Vec<String>,
}

/// A headword split into its display form and alternates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headword {
    /// First form
    pub text: String,
    /// Remaining forms
    pub alternates: Vec<String>,
}

/// Parses raw headword text.
///
/// `"ABACINATE (ABBACINATE), ABACINATION."` yields `ABACINATE` with the
/// alternates `ABBACINATE` and `ABACINATION`. Returns `None` when nothing
/// usable is left.
#[must_use]
pub fn parse_headword(raw: &str) -> Option<Headword> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut outside = String::new();
    let mut bracketed = Vec::new();
    let mut rest = collapsed.as_str();

    while let Some(open) = rest.find('(') {
        outside.push_str(&rest[..open]);
        let inner = &rest[open + 1..];
        match inner.find(')') {
            Some(close) => {
                bracketed.push(&inner[..close]);
                rest = &inner[close + 1..];
            }
            None => {
                bracketed.push(inner);
                rest = "";
            }
        }
    }
    outside.push_str(rest);

    let mut forms = split_forms(&outside);
    if forms.is_empty() {
        return None;
    }
    let text = forms.remove(0);

    for part in bracketed {
        forms.extend(split_forms(part).into_iter().filter(|f| is_word_like(f)));
    }

    let mut alternates: Vec<String> = Vec::new();
    for form in forms {
        if !form.eq_ignore_ascii_case(&text) && !alternates.iter().any(|a| a.eq_ignore_ascii_case(&form)) {
            alternates.push(form);
        }
    }

    Some(Headword { text, alternates })
}

fn split_forms(text: &str) -> Vec<String> {
    ALTERNATE_SEPARATOR
        .split(text)
        .map(strip_separators)
        .filter(|f| !f.is_empty())
        .collect()
}

fn strip_separators(form: &str) -> String {
    form.trim()
        .trim_end_matches(|c: char| c.is_whitespace() || TRAILING_SEPARATORS.contains(&c))
        .trim_start_matches(|c: char| c.is_whitespace() || TRAILING_SEPARATORS.contains(&c))
        .to_string()
}

/// Parenthesized grammar notes such as `(n.)` are not spellings.
fn is_word_like(form: &str) -> bool {
    form.chars().filter(|c| c.is_alphabetic()).count() >= 2
}

enum Compiled {
    Paragraph { entry: Selector, headword: Selector },
    DefinitionList { items: Selector },
}

/// Applies an [`EntryLayout`] to content documents.
pub(crate) struct Extractor {
    compiled: Compiled,
}

impl Extractor {
    /// Compiles the layout's selectors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Selector`] for a selector that does not parse.
    pub(crate) fn new(layout: &EntryLayout) -> Result<Self> {
        let compiled = match layout {
            EntryLayout::Paragraph {
                entry_selector,
                headword_selector,
            } => Compiled::Paragraph {
                entry: parse_selector(entry_selector)?,
                headword: parse_selector(headword_selector)?,
            },
            EntryLayout::DefinitionList => Compiled::DefinitionList {
                items: parse_selector("dt, dd")?,
            },
        };

        Ok(Self { compiled })
    }

    /// Extracts the entries of one document, in document order.
    pub(crate) fn extract(&self, document: &ContentDocument) -> Vec<Entry> {
        let html = Html::parse_document(&document.html);
        let mut collector = Collector::new(&document.path);

        match self.compiled {
            Compiled::Paragraph {
                ref entry,
                ref headword,
            } => {
                for element in html.select(entry) {
                    if has_matching_ancestor(element, entry) {
                        continue;
                    }
                    self.paragraph(element, headword, &mut collector);
                }
            }
            Compiled::DefinitionList { ref items } => {
                for element in html.select(items) {
                    Self::definition_item(element, &mut collector);
                }
            }
        }

        let entries = collector.finish();
        debug!("{}: {} entries", document.path, entries.len());
        entries
    }

    fn paragraph(&self, element: ElementRef<'_>, headword: &Selector, collector: &mut Collector<'_>) {
        let sanitizer = Sanitizer::new(collector.doc_path);

        let head = first_significant_child(element).filter(|child| headword.matches(child));

        match head {
            Some(head) => {
                let raw = head.text().collect::<String>();
                let body = sanitizer.children(element, Some(head.id()));
                collector.start(&raw, body);
            }
            None => {
                let body = sanitizer.children(element, None);
                collector.continue_with(body);
            }
        }
    }

    fn definition_item(element: ElementRef<'_>, collector: &mut Collector<'_>) {
        let sanitizer = Sanitizer::new(collector.doc_path);
        let body = sanitizer.children(element, None);

        if element.value().name().eq_ignore_ascii_case("dt") {
            let raw = element.text().collect::<String>();
            collector.start(
                &raw,
                Sanitized {
                    html: String::new(),
                    anchors: body.anchors,
                },
            );
        } else {
            collector.continue_with(body);
        }
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| Error::selector(selector, e))
}

fn has_matching_ancestor(element: ElementRef<'_>, selector: &Selector) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| selector.matches(&ancestor))
}

/// First child that is an element or non-blank text.
fn first_significant_child(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    for child in element.children() {
        match child.value() {
            Node::Text(text) if text.trim().is_empty() => {}
            Node::Comment(_) => {}
            Node::Element(_) => return ElementRef::wrap(child),
            _ => return None,
        }
    }
    None
}

/// Groups entry blocks of one document into entries.
struct Collector<'a> {
    doc_path: &'a str,
    entries: Vec<Entry>,
    current: Option<Entry>,
    orphaned: usize,
}

impl<'a> Collector<'a> {
    const fn new(doc_path: &'a str) -> Self {
        Self {
            doc_path,
            entries: Vec::new(),
            current: None,
            orphaned: 0,
        }
    }

    fn start(&mut self, raw_headword: &str, body: Sanitized) {
        self.flush();

        let Some(headword) = parse_headword(raw_headword) else {
            trace!("Skipping empty headword in {}", self.doc_path);
            return;
        };

        trace!("Entry '{}'", headword.text);
        self.current = Some(Entry {
            headword: headword.text,
            alternates: headword.alternates,
            definition: trim_leading_separators(&body.html).to_string(),
            source: self.doc_path.to_string(),
            anchors: body.anchors,
        });
    }

    fn continue_with(&mut self, body: Sanitized) {
        let Some(ref mut entry) = self.current else {
            self.orphaned += 1;
            return;
        };

        entry.anchors.extend(body.anchors);
        if body.html.is_empty() {
            return;
        }

        if entry.definition.is_empty() {
            entry.definition = body.html;
        } else {
            entry.definition.push_str("<p>");
            entry.definition.push_str(&body.html);
            entry.definition.push_str("</p>");
        }
    }

    fn flush(&mut self) {
        if let Some(entry) = self.current.take() {
            self.entries.push(entry);
        }
    }

    fn finish(mut self) -> Vec<Entry> {
        self.flush();
        if self.orphaned > 0 {
            trace!(
                "{}: ignored {} blocks before the first headword",
                self.doc_path,
                self.orphaned
            );
        }
        self.entries
    }
}
