//! Definition markup sanitizing.
//!
//! EPUB content is arbitrary XHTML; Kindle dictionary pages want a small,
//! well-formed subset. The sanitizer walks the parsed tree, keeps inline and
//! simple block formatting, unwraps everything else and records the `id`
//! anchors it passes so cross-references can be re-targeted later.

use crate::epub::archive_key;
use ego_tree::{NodeId, NodeRef};
use scraper::node::Node;
use scraper::ElementRef;

const KEPT_TAGS: &[&str] = &[
    "b", "i", "em", "strong", "u", "sup", "sub", "small", "span", "br", "hr", "p", "div",
    "a", "blockquote", "ul", "ol", "li", "table", "thead", "tbody", "tr", "td", "th", "cite",
];

const DROPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "img", "svg", "math", "head", "title",
];

const VOID_TAGS: &[&str] = &["br", "hr"];

/// Sanitized markup plus the anchors found while producing it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Sanitized {
    pub html: String,
    pub anchors: Vec<String>,
}

/// Serializes parts of one content document into Kindle-safe XHTML.
pub(crate) struct Sanitizer<'a> {
    doc_path: &'a str,
}

impl<'a> Sanitizer<'a> {
    pub(crate) const fn new(doc_path: &'a str) -> Self {
        Self { doc_path }
    }

    /// Sanitizes the children of `element`, leaving out the node `skip`.
    pub(crate) fn children(&self, element: ElementRef<'_>, skip: Option<NodeId>) -> Sanitized {
        let mut ctx = Sanitized::default();

        if let Some(id) = element.value().attr("id") {
            ctx.anchors.push(self.anchor_key(id));
        }

        for child in element.children() {
            if Some(child.id()) == skip {
                self.collect_anchors(child, &mut ctx);
                continue;
            }
            self.visit_node(child, &mut ctx);
        }

        ctx.html = ctx.html.trim().to_string();
        ctx
    }

    fn anchor_key(&self, id: &str) -> String {
        format!("{}#{}", self.doc_path, id.trim())
    }

    fn collect_anchors(&self, node: NodeRef<'_, Node>, ctx: &mut Sanitized) {
        for descendant in node.descendants() {
            if let Node::Element(element) = descendant.value() {
                if let Some(id) = element.attr("id") {
                    ctx.anchors.push(self.anchor_key(id));
                }
            }
        }
    }

    fn visit_node(&self, node: NodeRef<'_, Node>, ctx: &mut Sanitized) {
        match node.value() {
            Node::Text(text) => push_text(&mut ctx.html, text),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(node) {
                    self.visit_element(element, ctx);
                }
            }
            Node::Comment(_) | Node::ProcessingInstruction(_) | Node::Doctype(_) => {}
            _ => {
                for child in node.children() {
                    self.visit_node(child, ctx);
                }
            }
        }
    }

    fn visit_element(&self, element: ElementRef<'_>, ctx: &mut Sanitized) {
        let tag = element.value().name().to_ascii_lowercase();

        if let Some(id) = element.value().attr("id") {
            ctx.anchors.push(self.anchor_key(id));
        }

        if DROPPED_TAGS.contains(&tag.as_str()) {
            return;
        }

        if tag == "a" {
            self.visit_anchor(element, ctx);
            return;
        }

        if !KEPT_TAGS.contains(&tag.as_str()) {
            self.visit_children(element, ctx);
            return;
        }

        if VOID_TAGS.contains(&tag.as_str()) {
            ctx.html.push('<');
            ctx.html.push_str(&tag);
            ctx.html.push_str("/>");
            return;
        }

        ctx.html.push('<');
        ctx.html.push_str(&tag);
        ctx.html.push('>');
        self.visit_children(element, ctx);
        ctx.html.push_str("</");
        ctx.html.push_str(&tag);
        ctx.html.push('>');
    }

    fn visit_anchor(&self, element: ElementRef<'_>, ctx: &mut Sanitized) {
        if let Some(name) = element.value().attr("name") {
            ctx.anchors.push(self.anchor_key(name));
        }

        let Some(href) = element
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty())
        else {
            self.visit_children(element, ctx);
            return;
        };

        let target = self.link_target(href);
        ctx.html.push_str("<a href=\"");
        push_escaped(&mut ctx.html, &target, true);
        ctx.html.push_str("\">");
        self.visit_children(element, ctx);
        ctx.html.push_str("</a>");
    }

    fn visit_children(&self, element: ElementRef<'_>, ctx: &mut Sanitized) {
        for child in element.children() {
            self.visit_node(child, ctx);
        }
    }

    /// Turns an href into an archive key (`path#fragment`) unless it is external.
    fn link_target(&self, href: &str) -> String {
        if is_external(href) {
            return href.to_string();
        }

        archive_key(self.doc_path, href).unwrap_or_else(|| href.to_string())
    }
}

/// Returns true for links leaving the book.
pub(crate) fn is_external(href: &str) -> bool {
    href.contains("://") || href.starts_with("mailto:")
}

/// Collapses whitespace runs and escapes text content.
fn push_text(out: &mut String, text: &str) {
    let mut last_was_space = out.is_empty() || out.ends_with(' ');

    for c in text.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
            continue;
        }
        last_was_space = false;
        push_escaped_char(out, c, false);
    }
}

pub(crate) fn push_escaped(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        push_escaped_char(out, c, attribute);
    }
}

fn push_escaped_char(out: &mut String, c: char, attribute: bool) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' if attribute => out.push_str("&quot;"),
        c => out.push(c),
    }
}

/// Escapes text for XML content or attribute values.
#[must_use]
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Strips separator punctuation left in front of a definition once the
/// headword element has been removed.
pub(crate) fn trim_leading_separators(html: &str) -> &str {
    html.trim_start_matches(|c: char| {
        c.is_whitespace() || matches!(c, ',' | ':' | ';' | '.' | '-' | '\u{2013}' | '\u{2014}')
    })
}
