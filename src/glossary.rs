//! The dictionary's lookup structure.
//!
//! Extracted entries are merged by headword, given their lookup forms, sorted
//! the way a reader browses a dictionary and indexed by every term that should
//! resolve to them.

use crate::extract::Entry;
use crate::inflect::{fold, Inflector};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

/// A merged dictionary entry ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlossaryEntry {
    /// Stable id (`e1`, `e2`, …), also the XHTML anchor of the entry
    pub id: String,
    /// Display form of the headword
    pub headword: String,
    /// Lookup forms that resolve to this entry
    pub inflections: Vec<String>,
    /// XHTML definition
    pub definition: String,
    /// Source documents the entry was assembled from
    pub sources: Vec<String>,
    /// Anchor keys pointing into this entry
    #[serde(skip)]
    pub anchors: Vec<String>,
}

/// Lowercased term → positions of the entries it resolves to.
#[derive(Debug, Clone, Default)]
pub struct LookupIndex {
    terms: BTreeMap<String, Vec<usize>>,
}

impl LookupIndex {
    fn insert(&mut self, term: &str, position: usize) {
        let positions = self.terms.entry(term.to_lowercase()).or_default();
        if !positions.contains(&position) {
            positions.push(position);
        }
    }

    /// Positions of the entries `term` resolves to.
    #[must_use]
    pub fn get(&self, term: &str) -> &[usize] {
        self.terms
            .get(&term.trim().to_lowercase())
            .map_or(&[], Vec::as_slice)
    }

    /// Number of distinct lookup terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Returns true if no term is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Counters collected while building a glossary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GlossaryStats {
    /// Entries handed to the builder
    pub extracted: usize,
    /// Entries folded into an earlier entry with the same headword
    pub merged: usize,
    /// Lookup forms attached to entries
    pub inflections: usize,
    /// Lookup forms dropped because they are another entry's headword
    pub dropped_conflicts: usize,
    /// Distinct terms in the lookup index
    pub lookup_terms: usize,
}

/// Sorted, merged and indexed dictionary entries.
#[derive(Debug, Clone, Default)]
pub struct Glossary {
    entries: Vec<GlossaryEntry>,
    index: LookupIndex,
    stats: GlossaryStats,
}

struct Merged {
    headword: String,
    alternates: Vec<String>,
    definitions: Vec<String>,
    sources: Vec<String>,
    anchors: Vec<String>,
}

impl Glossary {
    /// Builds the glossary from extracted entries.
    #[must_use]
    pub fn build(entries: Vec<Entry>, inflector: &Inflector) -> Self {
        let mut stats = GlossaryStats {
            extracted: entries.len(),
            ..GlossaryStats::default()
        };

        let merged = merge(entries);
        stats.merged = stats.extracted - merged.len();
        if stats.merged > 0 {
            debug!("Merged {} duplicate headwords", stats.merged);
        }

        let headwords: HashSet<String> = merged.iter().map(|m| m.headword.to_lowercase()).collect();

        let mut entries: Vec<GlossaryEntry> = merged
            .into_iter()
            .map(|m| {
                let (inflections, dropped) = lookup_forms(&m, inflector, &headwords);
                stats.dropped_conflicts += dropped;
                stats.inflections += inflections.len();

                GlossaryEntry {
                    id: String::new(),
                    headword: m.headword,
                    inflections,
                    definition: join_definitions(m.definitions),
                    sources: m.sources,
                    anchors: m.anchors,
                }
            })
            .collect();

        entries.sort_by_cached_key(|e| fold(&e.headword).to_lowercase());

        let mut index = LookupIndex::default();
        for (position, entry) in entries.iter_mut().enumerate() {
            entry.id = format!("e{}", position + 1);
            index.insert(&entry.headword, position);
            for form in &entry.inflections {
                index.insert(form, position);
            }
        }
        stats.lookup_terms = index.len();

        debug!(
            "Glossary: {} entries, {} inflections, {} lookup terms",
            entries.len(),
            stats.inflections,
            stats.lookup_terms
        );

        Self {
            entries,
            index,
            stats,
        }
    }

    /// Entries `term` resolves to, by headword or lookup form.
    #[must_use]
    pub fn lookup(&self, term: &str) -> Vec<&GlossaryEntry> {
        self.index
            .get(term)
            .iter()
            .filter_map(|&position| self.entries.get(position))
            .collect()
    }

    /// Entries in dictionary order.
    #[must_use]
    pub fn entries(&self) -> &[GlossaryEntry] {
        &self.entries
    }

    /// Consumes the glossary, returning its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<GlossaryEntry> {
        self.entries
    }

    /// The lookup index.
    #[must_use]
    pub const fn index(&self) -> &LookupIndex {
        &self.index
    }

    /// Build statistics.
    #[must_use]
    pub const fn stats(&self) -> GlossaryStats {
        self.stats
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn merge(entries: Vec<Entry>) -> Vec<Merged> {
    let mut merged: Vec<Merged> = Vec::with_capacity(entries.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let key = entry.headword.to_lowercase();

        if let Some(&position) = positions.get(&key) {
            trace!("Merging duplicate headword '{}'", entry.headword);
            let target = &mut merged[position];
            for alternate in entry.alternates {
                if !target.alternates.contains(&alternate) {
                    target.alternates.push(alternate);
                }
            }
            if !entry.definition.is_empty() {
                target.definitions.push(entry.definition);
            }
            if !target.sources.contains(&entry.source) {
                target.sources.push(entry.source);
            }
            target.anchors.extend(entry.anchors);
            continue;
        }

        positions.insert(key, merged.len());
        merged.push(Merged {
            headword: entry.headword,
            alternates: entry.alternates,
            definitions: if entry.definition.is_empty() {
                Vec::new()
            } else {
                vec![entry.definition]
            },
            sources: vec![entry.source],
            anchors: entry.anchors,
        });
    }

    merged
}

/// Alternates plus generated forms, minus anything that is another
/// entry's headword. Returns the forms and the number dropped.
fn lookup_forms(
    entry: &Merged,
    inflector: &Inflector,
    headwords: &HashSet<String>,
) -> (Vec<String>, usize) {
    let own = entry.headword.to_lowercase();
    let mut candidates: Vec<String> = entry.alternates.clone();
    candidates.extend(inflector.forms(&entry.headword));
    for alternate in &entry.alternates {
        candidates.extend(inflector.forms(alternate));
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut forms = Vec::new();
    let mut dropped = 0;

    for candidate in candidates {
        let key = candidate.to_lowercase();
        if key == own || !seen.insert(key.clone()) {
            continue;
        }
        if headwords.contains(&key) {
            trace!(
                "Dropping '{}' from '{}': it is a headword of its own",
                candidate,
                entry.headword
            );
            dropped += 1;
            continue;
        }
        forms.push(candidate);
    }

    (forms, dropped)
}

fn join_definitions(definitions: Vec<String>) -> String {
    if definitions.len() <= 1 {
        return definitions.into_iter().next().unwrap_or_default();
    }

    definitions
        .into_iter()
        .map(|d| format!("<div>{d}</div>"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inflect::InflectionConfig;

    fn entry(headword: &str, definition: &str) -> Entry {
        Entry {
            headword: headword.to_string(),
            alternates: Vec::new(),
            definition: definition.to_string(),
            source: "OEBPS/Text/a.xhtml".to_string(),
            anchors: Vec::new(),
        }
    }

    fn plain() -> Inflector {
        Inflector::new(InflectionConfig::none())
    }

    #[test]
    fn test_sorted_with_ids() {
        let glossary = Glossary::build(
            vec![
                entry("Zak", "a creature"),
                entry("Ælfgifu", "a name"),
                entry("autarch", "a ruler"),
            ],
            &plain(),
        );

        let headwords: Vec<_> = glossary.entries().iter().map(|e| e.headword.as_str()).collect();
        assert_eq!(headwords, vec!["Ælfgifu", "autarch", "Zak"]);

        let ids: Vec<_> = glossary.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn test_duplicates_merged() {
        let mut second = entry("ABRAXAS", "second sense");
        second.source = "OEBPS/Text/b.xhtml".to_string();
        second.alternates = vec!["ABRASAX".to_string()];

        let glossary = Glossary::build(vec![entry("Abraxas", "first sense"), second], &plain());

        assert_eq!(glossary.len(), 1);
        let merged = &glossary.entries()[0];
        assert_eq!(merged.headword, "Abraxas");
        assert_eq!(
            merged.definition,
            "<div>first sense</div><div>second sense</div>"
        );
        assert_eq!(merged.sources.len(), 2);
        assert_eq!(merged.inflections, vec!["ABRASAX"]);
        assert_eq!(glossary.stats().merged, 1);
    }

    #[test]
    fn test_inflection_conflicting_with_headword_dropped() {
        let inflector = Inflector::new(InflectionConfig {
            english_plurals: true,
            ..InflectionConfig::none()
        });
        let glossary = Glossary::build(
            vec![entry("exultant", "a noble"), entry("exultants", "the class")],
            &inflector,
        );

        let exultant = glossary.lookup("exultant");
        assert_eq!(exultant.len(), 1);
        assert!(exultant[0].inflections.is_empty());
        assert_eq!(glossary.stats().dropped_conflicts, 1);

        let plural = glossary.lookup("EXULTANTS");
        assert_eq!(plural.len(), 1);
        assert_eq!(plural[0].headword, "exultants");
    }

    #[test]
    fn test_lookup_by_inflection() {
        let glossary = Glossary::build(
            vec![entry("magus", "a wizard"), entry("torch", "a light")],
            &Inflector::default(),
        );

        assert_eq!(glossary.lookup("magi")[0].headword, "magus");
        assert_eq!(glossary.lookup(" Torches ")[0].headword, "torch");
        assert!(glossary.lookup("unknown").is_empty());
        assert_eq!(glossary.stats().lookup_terms, glossary.index().len());
    }

    #[test]
    fn test_empty() {
        let glossary = Glossary::build(Vec::new(), &plain());
        assert!(glossary.is_empty());
        assert!(glossary.index().is_empty());
    }
}
