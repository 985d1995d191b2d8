use std::{
    fs,
    path::{Path, PathBuf},
};

use miette::{NamedSource, SourceSpan};

use crate::{
    Lines,
    error::{Error, Result, SourceContext},
    lines::{normalize, parse},
};

/// A parsed template.
///
/// The text is kept alongside the tree so diagnostics can quote and label
/// the original lines.
#[derive(Debug, Clone)]
pub struct Template {
    source: SourceContext,
    path: Option<PathBuf>,
    lines: Lines,
    skipped: usize,
}

impl Template {
    /// Parse template text.
    pub fn parse(text: &str) -> Result<Self> {
        Self::build(normalize(text), None)
    }

    /// Read and parse a template file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| {
            Box::new(Error::Io {
                path: path.to_path_buf(),
                source,
            })
        })?;
        tracing::debug!(path = %path.display(), "opened template");
        Self::build(normalize(&text), Some(path.to_path_buf()))
    }

    fn build(text: String, path: Option<PathBuf>) -> Result<Self> {
        let name = path
            .as_ref()
            .map_or_else(|| "<string>".to_string(), |path| path.display().to_string());
        let source = SourceContext::new(text, name);
        let parsed = parse(&source)?;
        Ok(Self {
            source,
            path,
            lines: parsed.lines,
            skipped: parsed.skipped,
        })
    }

    pub fn text(&self) -> &str {
        self.source.src()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The file path, or `<string>` for templates parsed from text.
    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// The directory relative includes are resolved against.
    pub fn directory(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }

    pub fn lines(&self) -> &Lines {
        &self.lines
    }

    /// Whether both templates come from the same source.
    pub fn is_same(&self, other: &Template) -> bool {
        self.path == other.path && self.text() == other.text()
    }

    /// The raw text of template line `number`, indentation included.
    pub fn line_text(&self, number: usize) -> Option<&str> {
        let index = self.physical_index(number)?;
        self.text().split('\n').nth(index)
    }

    /// The byte span of template line `number`.
    pub fn line_span(&self, number: usize) -> Option<SourceSpan> {
        let index = self.physical_index(number)?;
        let mut offset = 0;
        for (current, line) in self.text().split('\n').enumerate() {
            if current == index {
                return Some((offset, line.len()).into());
            }
            offset += line.len() + 1;
        }
        None
    }

    pub fn named_source(&self) -> NamedSource<String> {
        self.source.named_source()
    }

    fn physical_index(&self, number: usize) -> Option<usize> {
        number.checked_sub(1).map(|index| index + self.skipped)
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other)
    }
}
