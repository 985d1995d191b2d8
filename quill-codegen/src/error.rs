use std::fmt;

use miette::{Diagnostic, LabeledSpan, NamedSource, Severity, SourceCode, SourceSpan};
use quill_runtime::ExecutionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Box<GenerationError>>;

/// What went wrong while generating a template.
#[derive(Debug, Error)]
pub enum GenerationErrorKind {
    #[error("unable to generate line {line} (considered {considered})")]
    NoHandler { line: usize, considered: String },

    #[error("unknown macro '{name}' on line {line} (available macros are {available})")]
    UnknownMacro {
        name: String,
        line: usize,
        available: String,
    },

    #[error(
        "expected macro on line {line} to be '<macro> [argument]', '<macro>: <arguments>' or '<macro>:: <invocation>', but got '{content}'"
    )]
    InvalidMacro { line: usize, content: String },

    #[error("%{name} macro must have children")]
    MissingChildren { name: String },

    #[error("%{name} macro must not have children{condition}")]
    UnexpectedChildren { name: String, condition: String },

    #[error(
        "missing required definition '{name}' on line {line} (available definitions are {available})"
    )]
    MissingDefinition {
        name: String,
        line: usize,
        available: String,
    },

    #[error("%{name} macro on line {line} {problem}")]
    InvalidArguments {
        name: String,
        line: usize,
        problem: String,
    },

    #[error("unable to evaluate on line {line}: {message}")]
    Evaluation { line: usize, message: String },

    #[error("could not load '{target}' ({reason})")]
    Load { target: String, reason: String },

    #[error("generation already ran")]
    AlreadyGenerated,

    #[error(transparent)]
    Template(Box<quill_template::Error>),

    /// A failure reported by a plugin.
    #[error("{0}")]
    Custom(String),
}

/// A generation failure, labelled with the template line being generated.
#[derive(Debug, Error, Diagnostic)]
#[error("failed to generate {context}: {kind}")]
#[diagnostic(code(quill::generate))]
pub struct GenerationError {
    context: String,
    kind: GenerationErrorKind,
    #[source_code]
    src: NamedSource<String>,
    #[label("while generating this line")]
    span: Option<SourceSpan>,
}

impl GenerationError {
    pub fn new(
        context: impl Into<String>,
        kind: GenerationErrorKind,
        src: NamedSource<String>,
        span: Option<SourceSpan>,
    ) -> Box<Self> {
        Box::new(Self {
            context: context.into(),
            kind,
            src,
            span,
        })
    }

    /// The generation context, e.g. `template base.txt at main.rs:12`.
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn kind(&self) -> &GenerationErrorKind {
        &self.kind
    }

    pub fn span(&self) -> Option<SourceSpan> {
        self.span
    }
}

/// Any failure of the generate/execute API.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Template(#[from] Box<quill_template::Error>),

    #[error(transparent)]
    Generation(#[from] Box<GenerationError>),

    #[error(transparent)]
    Execution(#[from] Box<ExecutionError>),

    #[error("could not load '{target}' ({reason})")]
    Load { target: String, reason: String },
}

impl Error {
    fn inner(&self) -> Option<&dyn Diagnostic> {
        match self {
            Error::Template(error) => Some(error.as_ref()),
            Error::Generation(error) => Some(error.as_ref()),
            Error::Execution(error) => Some(error.as_ref()),
            Error::Load { .. } => None,
        }
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self.inner() {
            Some(inner) => inner.code(),
            None => Some(Box::new("quill::load")),
        }
    }

    fn severity(&self) -> Option<Severity> {
        self.inner().and_then(|inner| inner.severity())
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.inner().and_then(|inner| inner.help())
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.inner().and_then(|inner| inner.source_code())
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.inner().and_then(|inner| inner.labels())
    }
}
