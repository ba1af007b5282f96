use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the lexicon-mobi library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// The EPUB container or its package document is unusable.
    #[error("Invalid EPUB '{path}': {message}")]
    Epub {
        /// Path to the EPUB file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Malformed XML inside the EPUB.
    #[error("Malformed XML in '{member}': {message}")]
    Xml {
        /// Archive member that failed to parse
        member: String,
        /// Error message
        message: String,
    },

    /// A CSS selector used for entry extraction does not parse.
    #[error("Invalid selector '{selector}': {message}")]
    Selector {
        /// The offending selector
        selector: String,
        /// Parser message
        message: String,
    },

    /// Template rendering error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// External template failed validation.
    #[error("Invalid template '{path}': {reason}")]
    TemplateValidation {
        /// Template path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// No dictionary entries could be extracted.
    #[error("No dictionary entries found in '{path}'. Check the entry layout and selectors.")]
    NoEntries {
        /// EPUB that was read
        path: PathBuf,
    },

    /// The kindlegen binary could not be located.
    #[error("kindlegen not found (looked for '{searched}'). Pass --kindlegen or use --source-only.")]
    PackerNotFound {
        /// What was searched for
        searched: String,
    },

    /// kindlegen ran but did not produce a dictionary.
    #[error("kindlegen failed (exit code {code:?}): {message}")]
    Packer {
        /// Process exit code, if any
        code: Option<i32>,
        /// Tail of the packer output
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// System time error.
    #[error("System time error: {message}")]
    SystemTime {
        /// Error message
        message: String,
    },

    /// Invalid output pattern.
    #[error("Invalid output pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The invalid pattern
        pattern: String,
        /// Reason why it's invalid
        reason: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates an EPUB container error.
    #[must_use]
    pub fn epub(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Epub {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an XML error for an archive member.
    #[must_use]
    pub fn xml(member: impl Into<String>, message: impl ToString) -> Self {
        Self::Xml {
            member: member.into(),
            message: message.to_string(),
        }
    }

    /// Creates a selector error.
    #[must_use]
    pub fn selector(selector: impl Into<String>, message: impl ToString) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: tera::Error) -> Self {
        Self::Template {
            template: template.into(),
            message: source.to_string(),
        }
    }

    /// Creates a template validation error.
    #[must_use]
    pub fn template_validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TemplateValidation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a no entries error.
    #[must_use]
    pub fn no_entries(path: impl Into<PathBuf>) -> Self {
        Self::NoEntries { path: path.into() }
    }

    /// Creates an invalid pattern error.
    #[must_use]
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if the EPUB itself could not be read.
    #[must_use]
    pub const fn is_epub(&self) -> bool {
        matches!(self, Self::Epub { .. } | Self::Xml { .. })
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(e: std::time::SystemTimeError) -> Self {
        Self::SystemTime {
            message: e.to_string(),
        }
    }
}

impl From<tera::Error> for Error {
    fn from(e: tera::Error) -> Self {
        Self::Template {
            template: "unknown".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}
