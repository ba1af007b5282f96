use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tera::Tera;
use tracing::{debug, warn};

/// Maximum template file size (1MB)
const MAX_TEMPLATE_SIZE: u64 = 1024 * 1024;

/// Context variables a page template has to use
const REQUIRED_VARIABLES: &[&str] = &["entries"];

/// Context variables a page template may use
const OPTIONAL_VARIABLES: &[&str] = &[
    "page_index",
    "total_pages",
    "dictionary",
    "spellcheck",
    "exact",
];

/// Markup without which kindlegen builds a book with no lookup index
const KINDLE_MARKUP: &[&str] = &["idx:entry", "idx:orth"];

/// Validates an external entry page template
pub(crate) struct TemplateValidator;

impl TemplateValidator {
    /// Validates a page template file.
    ///
    /// The file must exist, be at most 1 MiB, not be blank, compile with
    /// Tera and loop over `ctx.entries`. Missing Kindle index markup only
    /// produces a warning.
    ///
    /// # Errors
    ///
    /// Returns an IO error for a missing file and a validation error for
    /// every other failed check.
    pub(crate) fn validate_template(path: &Path) -> Result<()> {
        let content = Self::read_checked(path)?;
        let display = path.to_string_lossy().to_string();

        Tera::default()
            .add_raw_template("validation", &content)
            .map_err(|e| Error::template_validation(&display, format!("Template syntax error: {e}")))?;

        let missing: Vec<&str> = REQUIRED_VARIABLES
            .iter()
            .copied()
            .filter(|var| !Self::references(&content, var))
            .collect();

        if !missing.is_empty() {
            return Err(Error::template_validation(
                display,
                format!(
                    "Template may be missing required variables: {}. \
                     Page templates should loop over ctx.entries; see templates/page.tera.",
                    missing.join(", ")
                ),
            ));
        }

        for var in OPTIONAL_VARIABLES {
            if !Self::references(&content, var) {
                debug!("Template does not use optional variable: {}", var);
            }
        }

        for tag in KINDLE_MARKUP {
            if !content.contains(tag) {
                warn!(
                    "Template {} has no <{}>; the dictionary will not support lookups",
                    path.display(),
                    tag
                );
            }
        }

        Ok(())
    }

    fn read_checked(path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "Template file not found"),
            ));
        }

        let display = path.to_string_lossy().to_string();
        if !path.is_file() {
            return Err(Error::template_validation(display, "Path is not a file"));
        }

        let size = fs::metadata(path).map_err(|e| Error::io(path, e))?.len();
        if size > MAX_TEMPLATE_SIZE {
            return Err(Error::template_validation(
                display,
                format!("Template file too large: {size} bytes (max: {MAX_TEMPLATE_SIZE} bytes)"),
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        if content.trim().is_empty() {
            return Err(Error::template_validation(display, "Template file is empty"));
        }

        Ok(content)
    }

    /// Heuristic: `ctx.var`, `{{ var` or `in var` somewhere in the source.
    fn references(content: &str, var: &str) -> bool {
        [
            format!("ctx.{var}"),
            format!("{{{{ {var}"),
            format!("{{{{{var}"),
            format!("in {var}"),
        ]
        .iter()
        .any(|pattern| content.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_validate_valid_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("page.tera");
        template_file
            .write_str(
                "<mbp:frameset>{% for entry in ctx.entries %}\
                 <idx:entry><idx:orth value=\"{{ entry.headword }}\"/>{{ entry.definition }}</idx:entry>\
                 {% endfor %}</mbp:frameset>",
            )
            .unwrap();

        assert!(TemplateValidator::validate_template(template_file.path()).is_ok());
    }

    #[test]
    fn test_validate_nonexistent_file() {
        let err = TemplateValidator::validate_template(Path::new("/nonexistent/page.tera")).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_validate_directory() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = TemplateValidator::validate_template(temp.path()).unwrap_err();
        assert!(err.to_string().contains("not a file"));
    }

    #[test]
    fn test_validate_empty_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("empty.tera");
        template_file.write_str("   \n  \n  ").unwrap();

        let err = TemplateValidator::validate_template(template_file.path()).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_validate_syntax_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("invalid.tera");
        template_file
            .write_str("{% for entry in ctx.entries %}\nUnclosed loop")
            .unwrap();

        let err = TemplateValidator::validate_template(template_file.path()).unwrap_err();
        assert!(err.to_string().contains("Template syntax error"));
    }

    #[test]
    fn test_validate_missing_entries() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("incomplete.tera");
        template_file
            .write_str("<h1>{{ ctx.dictionary.title }}</h1>")
            .unwrap();

        let err = TemplateValidator::validate_template(template_file.path()).unwrap_err();
        assert!(err.to_string().contains("missing required variables: entries"));
    }

    #[test]
    fn test_validate_file_too_large() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("large.tera");
        template_file
            .write_str(&"x".repeat(usize::try_from(MAX_TEMPLATE_SIZE).unwrap() + 1))
            .unwrap();

        let err = TemplateValidator::validate_template(template_file.path()).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_references() {
        assert!(TemplateValidator::references("{{ ctx.entries | length }}", "entries"));
        assert!(TemplateValidator::references("{% for e in entries %}", "entries"));
        assert!(!TemplateValidator::references("{{ ctx.entry_count }}", "entries"));
    }
}
