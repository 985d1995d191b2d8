use std::path::PathBuf;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Result type for template operations (boxed to reduce size on stack)
pub type Result<T> = std::result::Result<T, Box<Error>>;

/// Source context for error reporting.
///
/// Holds the (line-ending normalized) source text and the name it is reported
/// under, so error factories don't need both passed around.
#[derive(Debug, Clone)]
pub struct SourceContext {
    src: String,
    name: String,
}

impl SourceContext {
    pub fn new(src: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            name: name.into(),
        }
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a NamedSource for miette error reporting.
    pub fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(&self.name, self.src.clone())
    }

    /// Create an indentation error for the physical line at `span`.
    pub fn indentation_error(
        &self,
        line: usize,
        expected: impl Into<String>,
        found: impl Into<String>,
        span: impl Into<SourceSpan>,
    ) -> Box<Error> {
        Box::new(Error::Indentation {
            src: self.named_source(),
            span: Some(span.into()),
            line,
            expected: expected.into(),
            found: found.into(),
        })
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("failed to read template '{path}'")]
    #[diagnostic(code(quill::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("expected line {line} to start with {expected} spaces, but got '{found}'")]
    #[diagnostic(
        code(quill::indentation),
        help("indent children further than their parent and dedent back to an open level")
    )]
    Indentation {
        #[source_code]
        src: NamedSource<String>,
        #[label("inconsistent indentation")]
        span: Option<SourceSpan>,
        line: usize,
        expected: String,
        found: String,
    },

    #[error("unable to interpolate '{text}': {reason} at offset {offset}")]
    #[diagnostic(code(quill::interpolation))]
    Interpolation {
        #[source_code]
        text: String,
        #[label("{reason}")]
        span: SourceSpan,
        reason: String,
        offset: usize,
    },

    #[error("invalid delimiters: '{delimiters}' ({reason})")]
    #[diagnostic(
        code(quill::delimiters),
        help("delimiters are given as an opening and a closing token, e.g. '{{ }}' or '<% %>'")
    )]
    InvalidDelimiters { delimiters: String, reason: String },
}

impl Error {
    /// Create an interpolation error pointing at `offset` in `text`.
    pub fn interpolation(text: &str, reason: impl Into<String>, offset: usize) -> Box<Self> {
        let width = text[offset..].chars().next().map_or(0, char::len_utf8);
        Box::new(Error::Interpolation {
            text: text.to_string(),
            span: (offset, width).into(),
            reason: reason.into(),
            offset,
        })
    }

    pub fn invalid_delimiters(delimiters: &str, reason: impl Into<String>) -> Box<Self> {
        Box::new(Error::InvalidDelimiters {
            delimiters: delimiters.to_string(),
            reason: reason.into(),
        })
    }
}
