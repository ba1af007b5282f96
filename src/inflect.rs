//! Lookup forms for headwords.
//!
//! The Kindle lookup index only matches the exact word under the cursor, so
//! each headword carries the spellings a reader is likely to tap: folded
//! diacritics, plurals and possessives.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Which families of lookup forms to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct InflectionConfig {
    /// `Æ` → `AE`, `é` → `e`
    pub fold_diacritics: bool,
    /// `-s`, `-es`, `-ies`
    pub english_plurals: bool,
    /// `-us` → `-i`, `-um` → `-a` and friends
    pub learned_plurals: bool,
    /// `'s` and `s'`
    pub possessives: bool,
}

impl Default for InflectionConfig {
    fn default() -> Self {
        Self::all()
    }
}

impl InflectionConfig {
    /// Every rule family enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            fold_diacritics: true,
            english_plurals: true,
            learned_plurals: true,
            possessives: true,
        }
    }

    /// No generated forms; only alternates given in the book are indexed.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            fold_diacritics: false,
            english_plurals: false,
            learned_plurals: false,
            possessives: false,
        }
    }
}

const LEARNED_PLURALS: &[(&str, &str)] = &[
    ("us", "i"),
    ("um", "a"),
    ("on", "a"),
    ("is", "es"),
    ("ex", "ices"),
    ("ix", "ices"),
    ("a", "ae"),
];

/// Folds ligatures and strips diacritics.
///
/// ```
/// assert_eq!(lexicon_mobi::fold("Ælfgifu"), "AElfgifu");
/// assert_eq!(lexicon_mobi::fold("Thecla née"), "Thecla nee");
/// ```
#[must_use]
pub fn fold(text: &str) -> String {
    let mut expanded = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'æ' => expanded.push_str("ae"),
            'Æ' => expanded.push_str("AE"),
            'œ' => expanded.push_str("oe"),
            'Œ' => expanded.push_str("OE"),
            'ß' => expanded.push_str("ss"),
            'þ' => expanded.push_str("th"),
            'Þ' => expanded.push_str("TH"),
            'ð' => expanded.push('d'),
            'Ð' => expanded.push('D'),
            c => expanded.push(c),
        }
    }

    expanded.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Generates lookup forms according to an [`InflectionConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Inflector {
    config: InflectionConfig,
}

impl Inflector {
    /// Creates an inflector.
    #[must_use]
    pub const fn new(config: InflectionConfig) -> Self {
        Self { config }
    }

    /// Lookup forms of `headword`, deduplicated, never the headword itself.
    #[must_use]
    pub fn forms(&self, headword: &str) -> Vec<String> {
        let headword = headword.trim();
        let mut forms: Vec<String> = Vec::new();
        let mut bases = vec![headword.to_string()];

        if self.config.fold_diacritics {
            let folded = fold(headword);
            if folded != headword {
                forms.push(folded.clone());
                bases.push(folded);
            }
        }

        for base in &bases {
            let (prefix, last) = split_last_word(base);
            if !last.chars().any(char::is_alphabetic) {
                continue;
            }

            let mut plurals = Vec::new();
            if self.config.english_plurals {
                plurals.extend(english_plurals(last));
            }
            if self.config.learned_plurals {
                plurals.extend(learned_plurals(last));
            }
            forms.extend(plurals.into_iter().map(|p| format!("{prefix}{p}")));

            if self.config.possessives {
                forms.push(possessive(base));
            }
        }

        let mut unique: Vec<String> = Vec::with_capacity(forms.len());
        for form in forms {
            let is_headword = form.to_lowercase() == headword.to_lowercase();
            if !is_headword && !form.trim().is_empty() && !unique.contains(&form) {
                unique.push(form);
            }
        }
        unique
    }
}

fn split_last_word(phrase: &str) -> (&str, &str) {
    match phrase.rfind(' ') {
        Some(pos) => (&phrase[..=pos], &phrase[pos + 1..]),
        None => ("", phrase),
    }
}

fn is_upper(word: &str) -> bool {
    word.chars().any(char::is_alphabetic)
        && word
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(char::is_uppercase)
}

/// Matches the suffix's case to an all-caps word.
fn with_suffix(stem: &str, suffix: &str, upper: bool) -> String {
    if upper {
        format!("{stem}{}", suffix.to_uppercase())
    } else {
        format!("{stem}{suffix}")
    }
}

fn english_plurals(word: &str) -> Vec<String> {
    let lower = word.to_lowercase();
    let upper = is_upper(word);

    // A consonant before a final `s` usually marks a plural already; `-as`,
    // `-os` and `-us` are singulars taking `-es` (bus, atlas). `-is` is left
    // to the learned rules (analysis, analyses).
    if lower.ends_with('s') && !lower.ends_with("ss") {
        let before = lower.chars().rev().nth(1);
        if !matches!(before, Some('a' | 'o' | 'u')) {
            return Vec::new();
        }
    }

    let sibilant = ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s));
    if sibilant {
        return vec![with_suffix(word, "es", upper)];
    }

    let mut chars = lower.chars().rev();
    if let (Some('y'), Some(before)) = (chars.next(), chars.next()) {
        if !"aeiou".contains(before) {
            let stem = &word[..word.len() - 1];
            return vec![with_suffix(stem, "ies", upper)];
        }
    }

    vec![with_suffix(word, "s", upper)]
}

fn learned_plurals(word: &str) -> Vec<String> {
    let lower = word.to_lowercase();
    let upper = is_upper(word);

    LEARNED_PLURALS
        .iter()
        .filter(|(singular, _)| lower.len() > singular.len() + 1 && lower.ends_with(singular))
        .filter_map(|(singular, plural)| {
            let stem = word.get(..word.len() - singular.len())?;
            Some(with_suffix(stem, plural, upper))
        })
        .take(1)
        .collect()
}

fn possessive(phrase: &str) -> String {
    let upper = is_upper(phrase);
    if phrase.to_lowercase().ends_with('s') {
        format!("{phrase}'")
    } else {
        with_suffix(phrase, "'s", upper)
    }
}
