use std::fmt::{self, Write as _};

use miette::Diagnostic;
use thiserror::Error;

use crate::code::Excerpt;

/// Result type for execution (boxed to reduce size on stack)
pub type Result<T> = std::result::Result<T, Box<ExecutionError>>;

/// What went wrong while running generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A generated line is not a valid statement.
    Syntax,
    /// An expression referenced something undefined.
    Undefined,
    /// An expression failed to evaluate.
    Evaluation,
    /// A `param` without default was not supplied.
    MissingParameter,
    /// An `append` targets a bookmark that was never declared.
    MissingBookmark,
    /// A plugin command failed.
    Command,
    /// Serialized code could not be restored.
    Restore,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntax => "SyntaxError",
            Self::Undefined => "UndefinedError",
            Self::Evaluation => "EvaluationError",
            Self::MissingParameter => "ParameterError",
            Self::MissingBookmark => "BookmarkError",
            Self::Command => "CommandError",
            Self::Restore => "RestoreError",
        })
    }
}

/// One entry of an execution traceback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A generated code line, with the template line it came from.
    Code {
        /// 1-based line number in the rendered code, intro included.
        number: usize,
        code: String,
        template: Excerpt,
    },
    /// A plugin command called from generated code.
    Command { name: String },
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Code {
                number,
                code,
                template,
            } => {
                writeln!(f, "  code line {number}")?;
                write!(f, "    > {}", code.trim_start())?;
                match template {
                    Excerpt::Line {
                        location,
                        number,
                        text,
                    } => write!(f, "\n    @ {location}:{number}\n        {}", text.trim()),
                    Excerpt::Unavailable(reason) => write!(f, "\n    ? ({reason})"),
                }
            }
            Frame::Command { name } => write!(f, "  in command {name}"),
        }
    }
}

/// A failure while running generated code.
///
/// The message names the execution that failed; [`ExecutionError::traceback`]
/// maps the failure back through the generated code to template lines, and
/// [`ExecutionError::report`] adds the variables in scope when it failed.
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("failed to execute {context}: {message}")]
#[diagnostic(code(quill::execution))]
pub struct ExecutionError {
    context: String,
    kind: ErrorKind,
    message: String,
    frames: Vec<Frame>,
    variables: Vec<(String, String)>,
    #[help]
    help: Option<String>,
}

impl ExecutionError {
    pub fn new(
        context: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
        frames: Vec<Frame>,
    ) -> Box<Self> {
        let mut error = Self {
            context: context.into(),
            kind,
            message: message.into(),
            frames,
            variables: Vec::new(),
            help: None,
        };
        error.update_help();
        Box::new(error)
    }

    /// Attach the variables in scope, as `(name, value)` pairs.
    pub fn with_variables(mut self: Box<Self>, variables: Vec<(String, String)>) -> Box<Self> {
        self.variables = variables;
        self.update_help();
        self
    }

    fn update_help(&mut self) {
        self.help = if self.frames.is_empty() && self.variables.is_empty() {
            None
        } else {
            Some(self.report())
        };
    }

    /// An error that happened outside any generated line.
    pub(crate) fn standalone(kind: ErrorKind, message: impl Into<String>) -> Box<Self> {
        Self::new("standalone code", kind, message, Vec::new())
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Frames, outermost first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn variables(&self) -> &[(String, String)] {
        &self.variables
    }

    /// The variables in scope followed by the traceback.
    pub fn report(&self) -> String {
        let mut out = String::new();
        if !self.variables.is_empty() {
            out.push_str("Context:\n");
            for (name, value) in &self.variables {
                let _ = writeln!(out, "  {name}: {value}");
            }
        }
        out.push_str(&self.traceback());
        out
    }

    /// Render the frames and the failure, most recent call last.
    pub fn traceback(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        for frame in &self.frames {
            let _ = writeln!(out, "{frame}");
        }
        let _ = write!(out, "{}: {}", self.kind, self.message);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traceback() {
        let error = ExecutionError::new(
            "template at main.rs:3",
            ErrorKind::Undefined,
            "undefined value `j`",
            vec![
                Frame::Code {
                    number: 2,
                    code: "    emit(0, \"line \", j)".to_string(),
                    template: Excerpt::Line {
                        location: "<string>".to_string(),
                        number: 2,
                        text: "    line {j}".to_string(),
                    },
                },
                Frame::Command {
                    name: "greet".to_string(),
                },
                Frame::Code {
                    number: 1,
                    code: "emit(0, x)".to_string(),
                    template: Excerpt::Unavailable("template a.txt does not exist".to_string()),
                },
            ],
        );
        assert_eq!(
            error.to_string(),
            "failed to execute template at main.rs:3: undefined value `j`"
        );
        assert_eq!(
            error.traceback(),
            "Traceback (most recent call last):
  code line 2
    > emit(0, \"line \", j)
    @ <string>:2
        line {j}
  in command greet
  code line 1
    > emit(0, x)
    ? (template a.txt does not exist)
UndefinedError: undefined value `j`"
        );
    }

    #[test]
    fn test_report_lists_variables() {
        let variables = vec![
            ("n".to_string(), "3".to_string()),
            ("s".to_string(), "\"a\"".to_string()),
        ];
        let error = ExecutionError::new(
            "code",
            ErrorKind::MissingParameter,
            "missing required parameter 'y'",
            Vec::new(),
        )
        .with_variables(variables);
        assert_eq!(
            error.report(),
            "Context:
  n: 3
  s: \"a\"
Traceback (most recent call last):
ParameterError: missing required parameter 'y'"
        );
        assert_eq!(error.help.as_deref(), Some(error.report().as_str()));
    }

    #[test]
    fn test_no_help_without_frames() {
        let error = ExecutionError::standalone(ErrorKind::Restore, "invalid header");
        assert!(error.help.is_none());
        assert_eq!(
            error.to_string(),
            "failed to execute standalone code: invalid header"
        );
    }
}
