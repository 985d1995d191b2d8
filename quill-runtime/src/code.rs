//! Generated code and its provenance.

use std::{fmt, fs, path::PathBuf, str::FromStr};

use quill_core::Origin;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ExecutionError};

/// Prefix of the header comment written by [`Code::serialize`].
pub const HEADER_PREFIX: &str = "# quill: ";

/// One indentation level of generated code.
pub const INDENT: &str = "    ";

/// Identifies the generation context that produced a code line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(usize);

impl ContextId {
    /// The context of the template generation started from.
    pub const ROOT: Self = Self(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Where the lines of one generation context come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Template text, kept for templates that don't live in a file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub origin: Origin,
}

impl Provenance {
    pub fn file(path: impl Into<PathBuf>, origin: Origin) -> Self {
        Self {
            path: Some(path.into()),
            text: None,
            origin,
        }
    }

    pub fn text(text: impl Into<String>, origin: Origin) -> Self {
        Self {
            path: None,
            text: Some(text.into()),
            origin,
        }
    }

    /// The name template lines are reported under.
    pub fn name(&self) -> String {
        self.path
            .as_ref()
            .map_or_else(|| "<string>".to_string(), |path| path.display().to_string())
    }

    /// Resolve template line `number` against the template as it is now.
    ///
    /// File-backed templates are re-read, so an excerpt may be unavailable if
    /// the file was deleted or truncated since generation.
    pub fn excerpt(&self, number: usize) -> Excerpt {
        let name = self.name();
        let text = match (&self.path, &self.text) {
            (Some(path), _) => match fs::read_to_string(path) {
                Ok(text) => text.replace("\r\n", "\n"),
                Err(_) => return Excerpt::Unavailable(format!("template {name} does not exist")),
            },
            (None, Some(text)) => text.clone(),
            (None, None) => return Excerpt::Unavailable(format!("template {name} is unknown")),
        };

        let lines: Vec<&str> = text
            .split('\n')
            .skip_while(|line| line.trim().is_empty())
            .collect();
        match number.checked_sub(1).and_then(|index| lines.get(index)) {
            Some(line) => Excerpt::Line {
                location: name,
                number,
                text: line.to_string(),
            },
            None => {
                let count = lines.len()
                    - lines
                        .iter()
                        .rev()
                        .take_while(|line| line.trim().is_empty())
                        .count();
                Excerpt::Unavailable(format!(
                    "template {name} has only {count} lines, unable to find line {number}"
                ))
            }
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "template {} at {}", path.display(), self.origin),
            None => write!(f, "template at {}", self.origin),
        }
    }
}

/// A template line quoted in an error report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Excerpt {
    Line {
        location: String,
        number: usize,
        text: String,
    },
    /// The line can no longer be found; holds the reason.
    Unavailable(String),
}

/// One generated statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    pub indent: usize,
    pub content: String,
    pub template_line: usize,
    pub context: ContextId,
}

impl fmt::Display for CodeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", INDENT.repeat(self.indent), self.content)
    }
}

#[derive(Serialize, Deserialize)]
struct Header {
    intro: usize,
    lines: Vec<(usize, ContextId)>,
    contexts: Vec<Provenance>,
}

/// An append-only sequence of generated code lines.
///
/// Lines are pushed at the current indentation level, which generation
/// raises and lowers around blocks.
///
/// ```
/// use quill_core::Origin;
/// use quill_runtime::{Code, Provenance};
///
/// let mut code = Code::new();
/// let context = code.register(Provenance::text("!for i in range(3):", Origin::caller()));
/// code.push_line("for i in range(3):", 1, context)
///     .push_indent()
///     .push_line("emit(0, i)", 2, context)
///     .push_dedent();
/// assert_eq!(code.to_string(), "for i in range(3):\n    emit(0, i)");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Code {
    intro: Vec<String>,
    lines: Vec<CodeLine>,
    contexts: Vec<Provenance>,
    indent_level: usize,
}

impl Code {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generation context, returning the id its lines are tagged with.
    pub fn register(&mut self, provenance: Provenance) -> ContextId {
        self.contexts.push(provenance);
        ContextId(self.contexts.len() - 1)
    }

    pub fn provenance(&self, context: ContextId) -> Option<&Provenance> {
        self.contexts.get(context.0)
    }

    pub fn contexts(&self) -> &[Provenance] {
        &self.contexts
    }

    /// Add a line of code with the current indentation.
    pub fn push_line(
        &mut self,
        content: impl Into<String>,
        template_line: usize,
        context: ContextId,
    ) -> &mut Self {
        self.lines.push(CodeLine {
            indent: self.indent_level,
            content: content.into(),
            template_line,
            context,
        });
        self
    }

    /// Add a preamble line, executed before the generated lines.
    pub fn push_intro(&mut self, line: impl Into<String>) -> &mut Self {
        let line = line.into();
        if !self.intro.contains(&line) {
            self.intro.push(line);
        }
        self
    }

    /// Increase indentation level.
    pub fn push_indent(&mut self) -> &mut Self {
        self.indent_level += 1;
        self
    }

    /// Decrease indentation level.
    pub fn push_dedent(&mut self) -> &mut Self {
        self.indent_level = self.indent_level.saturating_sub(1);
        self
    }

    pub fn indent_level(&self) -> usize {
        self.indent_level
    }

    pub fn set_indent_level(&mut self, level: usize) -> &mut Self {
        self.indent_level = level;
        self
    }

    pub fn intro(&self) -> &[String] {
        &self.intro
    }

    pub fn lines(&self) -> &[CodeLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Drop every line after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.lines.truncate(len);
    }

    /// Render with a header from which [`Code::restore`] rebuilds every line's
    /// provenance.
    pub fn serialize(&self) -> String {
        let header = Header {
            intro: self.intro.len(),
            lines: self
                .lines
                .iter()
                .map(|line| (line.template_line, line.context))
                .collect(),
            contexts: self.contexts.clone(),
        };
        // a header of plain data always serializes
        let header = serde_json::to_string(&header).unwrap_or_default();
        let body = self.to_string();
        if body.is_empty() {
            format!("{HEADER_PREFIX}{header}")
        } else {
            format!("{HEADER_PREFIX}{header}\n{body}")
        }
    }

    /// Rebuild code from its serialized text.
    ///
    /// Text without a header is restored as plain code: every line maps to
    /// its own line number in an anonymous context.
    pub fn restore(text: &str) -> Result<Self, Box<ExecutionError>> {
        let text = text.replace("\r\n", "\n");
        let Some(rest) = text.strip_prefix(HEADER_PREFIX) else {
            return Ok(Self::restore_plain(&text));
        };
        let (header, body) = rest.split_once('\n').unwrap_or((rest, ""));
        let header: Header = serde_json::from_str(header).map_err(|error| {
            ExecutionError::standalone(ErrorKind::Restore, format!("invalid header: {error}"))
        })?;

        let body: Vec<&str> = if body.is_empty() {
            Vec::new()
        } else {
            body.split('\n').collect()
        };
        if body.len() != header.intro + header.lines.len() {
            return Err(ExecutionError::standalone(
                ErrorKind::Restore,
                format!(
                    "header describes {} lines, but the code has {}",
                    header.intro + header.lines.len(),
                    body.len()
                ),
            ));
        }

        let (intro, lines) = body.split_at(header.intro);
        let lines = lines
            .iter()
            .zip(header.lines)
            .map(|(line, (template_line, context))| {
                let (indent, content) = split_indent(line);
                CodeLine {
                    indent,
                    content: content.to_string(),
                    template_line,
                    context,
                }
            })
            .collect();
        Ok(Self {
            intro: intro.iter().map(|line| line.to_string()).collect(),
            lines,
            contexts: header.contexts,
            indent_level: 0,
        })
    }

    fn restore_plain(text: &str) -> Self {
        let mut code = Self::new();
        let context = code.register(Provenance::text(text, Origin::new("<code>", 1)));
        for (index, line) in text.split('\n').enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (indent, content) = split_indent(line);
            code.lines.push(CodeLine {
                indent,
                content: content.to_string(),
                template_line: index + 1,
                context,
            });
        }
        code
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for line in &self.intro {
            if !first {
                f.write_str("\n")?;
            }
            f.write_str(line)?;
            first = false;
        }
        for line in &self.lines {
            if !first {
                f.write_str("\n")?;
            }
            write!(f, "{line}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Code {
    type Err = Box<ExecutionError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::restore(s)
    }
}

fn split_indent(line: &str) -> (usize, &str) {
    let content = line.trim_start_matches(' ');
    ((line.len() - content.len()) / INDENT.len(), content)
}
