//! Running generated code.

use std::{collections::BTreeMap, sync::Arc};

use indexmap::IndexMap;
use minijinja::Value;
use quill_core::and_list;

use crate::{
    code::{Code, ContextId, INDENT},
    error::{ErrorKind, ExecutionError, Frame, Result},
    evaluator::{EvaluationError, Evaluator, Helper, literal, render},
    library,
    output::Output,
    script::{self, LineRef, SourceLine, Statement, StatementKind},
};

/// The error type plugin commands return.
pub type CommandError = Box<dyn std::error::Error + Send + Sync>;

/// A runtime command: a statement-level function with access to the output.
pub type Command =
    Arc<dyn Fn(&mut Runtime, &[Value]) -> std::result::Result<(), CommandError> + Send + Sync>;

/// Names handled by the runtime itself.
const DIRECTIVES: &[&str] = &["emit", "bookmark", "param", "strip", "load"];
const BLOCK_DIRECTIVES: &[&str] = &["append", "assign", "inline"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Normal,
    Break,
    Continue,
}

/// Why a statement failed, before it is mapped back to template lines.
#[derive(Debug)]
struct Failure {
    kind: ErrorKind,
    message: String,
    line: Option<LineRef>,
    nested: Vec<Frame>,
}

impl Failure {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            nested: Vec::new(),
        }
    }

    fn at(mut self, line: LineRef) -> Self {
        self.line.get_or_insert(line);
        self
    }
}

impl From<EvaluationError> for Failure {
    fn from(error: EvaluationError) -> Self {
        Self::new(error.kind(), error.message())
    }
}

type Flow = std::result::Result<Signal, Failure>;

/// Executes [`Code`] against a namespace.
///
/// ```
/// use quill_runtime::{Code, Runtime};
///
/// let code: Code = "for i in range(n):\n    emit(0, \"line \", i)".parse().unwrap();
/// let mut runtime = Runtime::new();
/// runtime.set("n", 2);
/// assert_eq!(runtime.execute(&code).unwrap(), "line 0\nline 1");
/// ```
pub struct Runtime {
    evaluator: Evaluator,
    commands: IndexMap<String, Command>,
    output: Output,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_evaluator(Evaluator::new())
    }

    /// A runtime over an existing namespace and its helpers.
    pub fn with_evaluator(evaluator: Evaluator) -> Self {
        Self {
            evaluator,
            commands: IndexMap::new(),
            output: Output::new(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.evaluator.set(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.evaluator.get(name)
    }

    pub fn extend(&mut self, variables: &BTreeMap<String, Value>) {
        for (name, value) in variables {
            self.evaluator.set(name.clone(), value.clone());
        }
    }

    pub fn register_helper(&mut self, name: &str, helper: Helper) {
        self.evaluator.register(name, helper);
    }

    pub fn register_command(&mut self, name: &str, command: Command) {
        self.commands.insert(name.to_string(), command);
    }

    /// Write a line of output, as generated `emit` calls do.
    pub fn emit(&mut self, indent: usize, text: &str) {
        self.output.emit(indent, text);
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Run `code` to completion and return its output.
    pub fn execute(self, code: &Code) -> Result<String> {
        let context = code
            .provenance(ContextId::ROOT)
            .map_or_else(|| "code".to_string(), ToString::to_string);
        self.execute_as(code, &context)
    }

    /// Like [`Runtime::execute`], reporting failures as coming from `context`.
    pub fn execute_as(mut self, code: &Code, context: &str) -> Result<String> {
        tracing::debug!(lines = code.len(), "executing code");
        match self.run(code) {
            Ok(()) => Ok(self.output.finish()),
            Err(failure) => {
                let variables = self
                    .evaluator
                    .namespace()
                    .iter()
                    .map(|(name, value)| (name.clone(), literal(value)))
                    .collect();
                Err(report(code, context, failure).with_variables(variables))
            }
        }
    }

    /// Run `code` and keep the namespace, discarding output.
    pub fn run_for_namespace(mut self, code: &Code) -> std::result::Result<Evaluator, String> {
        match self.run(code) {
            Ok(()) => Ok(self.evaluator),
            Err(failure) => Err(failure.message),
        }
    }

    fn run(&mut self, code: &Code) -> std::result::Result<(), Failure> {
        let intro: Vec<SourceLine<'_>> = code
            .intro()
            .iter()
            .enumerate()
            .map(|(index, line)| (LineRef::Intro(index), 0, line.as_str()))
            .collect();
        let body: Vec<SourceLine<'_>> = code
            .lines()
            .iter()
            .enumerate()
            .map(|(index, line)| (LineRef::Body(index), line.indent, line.content.as_str()))
            .collect();
        for lines in [intro, body] {
            let program = script::parse(&lines).map_err(|error| {
                Failure::new(ErrorKind::Syntax, error.message).at(error.line)
            })?;
            match self.block(&program)? {
                Signal::Normal => {}
                Signal::Break | Signal::Continue => {
                    return Err(Failure::new(
                        ErrorKind::Syntax,
                        "'break' or 'continue' outside a loop",
                    ));
                }
            }
        }

        if let Some((name, append)) = self.output.dangling() {
            let line = match append.line {
                LineRef::Body(index) => code.lines()[index].template_line,
                LineRef::Intro(index) => index + 1,
            };
            let message = format!(
                "missing bookmark '{name}' referenced on line {line} (available bookmarks are {})",
                and_list(self.output.bookmarks())
            );
            return Err(Failure::new(ErrorKind::MissingBookmark, message).at(append.line));
        }
        Ok(())
    }

    fn block(&mut self, statements: &[Statement]) -> Flow {
        for statement in statements {
            match self.statement(statement).map_err(|failure| failure.at(statement.line))? {
                Signal::Normal => {}
                signal => return Ok(signal),
            }
        }
        Ok(Signal::Normal)
    }

    fn statement(&mut self, statement: &Statement) -> Flow {
        match &statement.kind {
            StatementKind::Pass => Ok(Signal::Normal),
            StatementKind::Break => Ok(Signal::Break),
            StatementKind::Continue => Ok(Signal::Continue),
            StatementKind::Expression(expression) => {
                self.evaluator.eval(expression)?;
                Ok(Signal::Normal)
            }
            StatementKind::Assign {
                target,
                operator,
                value,
            } => {
                let value = match operator {
                    None => self.evaluator.eval(value)?,
                    Some(operator) => self
                        .evaluator
                        .eval(&format!("({target}) {operator} ({value})"))?,
                };
                self.evaluator.set(target.clone(), value);
                Ok(Signal::Normal)
            }
            StatementKind::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    if self.evaluator.truthy(condition)? {
                        return self.block(body);
                    }
                }
                match otherwise {
                    Some(body) => self.block(body),
                    None => Ok(Signal::Normal),
                }
            }
            StatementKind::While { condition, body } => {
                while self.evaluator.truthy(condition)? {
                    if self.block(body)? == Signal::Break {
                        break;
                    }
                }
                Ok(Signal::Normal)
            }
            StatementKind::For {
                targets,
                iterable,
                body,
            } => {
                let iterable = self.evaluator.eval(iterable)?;
                let items: Vec<Value> = iterable
                    .try_iter()
                    .map_err(|error| {
                        Failure::new(ErrorKind::Evaluation, format!("cannot iterate: {error}"))
                    })?
                    .collect();
                for item in items {
                    self.bind(targets, item)?;
                    if self.block(body)? == Signal::Break {
                        break;
                    }
                }
                Ok(Signal::Normal)
            }
            StatementKind::With {
                name,
                arguments,
                body,
            } => self.with(statement.line, name, arguments, body),
            StatementKind::Call {
                name,
                arguments,
                source,
            } => {
                if DIRECTIVES.contains(&name.as_str()) {
                    self.directive(name, arguments)?;
                } else if let Some(command) = self.commands.get(name).cloned() {
                    let arguments = self.arguments(arguments)?;
                    command(self, &arguments).map_err(|error| command_failure(name, error))?;
                } else {
                    self.evaluator.eval(source)?;
                }
                Ok(Signal::Normal)
            }
        }
    }

    fn bind(&mut self, targets: &[String], item: Value) -> std::result::Result<(), Failure> {
        if let [target] = targets {
            self.evaluator.set(target.clone(), item);
            return Ok(());
        }
        let values: Vec<Value> = item
            .try_iter()
            .map(|values| values.collect())
            .unwrap_or_default();
        if values.len() != targets.len() {
            return Err(Failure::new(
                ErrorKind::Evaluation,
                format!(
                    "cannot unpack {} values into {} names",
                    values.len(),
                    targets.len()
                ),
            ));
        }
        for (target, value) in targets.iter().zip(values) {
            self.evaluator.set(target.clone(), value);
        }
        Ok(())
    }

    fn arguments(&self, arguments: &[String]) -> std::result::Result<Vec<Value>, Failure> {
        arguments
            .iter()
            .map(|argument| Ok(self.evaluator.eval(argument)?))
            .collect()
    }

    fn directive(&mut self, name: &str, arguments: &[String]) -> std::result::Result<(), Failure> {
        let values = self.arguments(arguments)?;
        match (name, values.as_slice()) {
            ("emit", [indent, parts @ ..]) => {
                let indent = as_indent(indent)?;
                let text: String = parts.iter().map(render).collect();
                self.output.emit(indent, &text);
            }
            ("bookmark", [bookmark, indent]) => {
                let indent = as_indent(indent)?;
                self.output
                    .bookmark(&as_name(bookmark)?, indent)
                    .map_err(|message| Failure::new(ErrorKind::Evaluation, message))?;
            }
            ("param", [param]) => {
                let param = as_name(param)?;
                if !self.evaluator.contains(&param) {
                    return Err(Failure::new(
                        ErrorKind::MissingParameter,
                        format!("missing required parameter '{param}'"),
                    ));
                }
            }
            ("param", [param, default]) => {
                let param = as_name(param)?;
                if !self.evaluator.contains(&param) {
                    self.evaluator.set(param, default.clone());
                }
            }
            ("strip", [token]) => self.output.strip(&as_name(token)?),
            ("load", [library]) => {
                let name = as_name(library)?;
                let Some(library) = library::builtin(&name) else {
                    return Err(Failure::new(
                        ErrorKind::Evaluation,
                        format!(
                            "unknown runtime library '{name}' (available libraries are {})",
                            and_list(library::names())
                        ),
                    ));
                };
                for (helper, function) in library.helpers() {
                    self.evaluator.register(helper, function);
                }
            }
            _ => {
                return Err(Failure::new(
                    ErrorKind::Evaluation,
                    format!("invalid arguments for {name}: {}", arguments.join(", ")),
                ));
            }
        }
        Ok(())
    }

    fn with(
        &mut self,
        line: LineRef,
        name: &str,
        arguments: &[String],
        body: &[Statement],
    ) -> Flow {
        let values = self.arguments(arguments)?;
        let capture = match (name, values.as_slice()) {
            ("append", [bookmark]) => {
                self.output.begin_append(&as_name(bookmark)?, line);
                None
            }
            ("assign", [variable]) => {
                self.output.begin_capture();
                Some(as_name(variable)?)
            }
            ("inline", []) => {
                self.output.begin_inline();
                None
            }
            _ if BLOCK_DIRECTIVES.contains(&name) => {
                return Err(Failure::new(
                    ErrorKind::Evaluation,
                    format!("invalid arguments for {name}: {}", arguments.join(", ")),
                ));
            }
            _ => {
                return Err(Failure::new(
                    ErrorKind::Syntax,
                    format!(
                        "unknown block directive '{name}' (available directives are {})",
                        and_list(BLOCK_DIRECTIVES)
                    ),
                ));
            }
        };

        let signal = self.block(body);
        let captured = self.output.end();
        if let (Some(variable), Some(text)) = (capture, captured) {
            self.evaluator.set(variable, text);
        }
        signal
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

fn as_indent(value: &Value) -> std::result::Result<usize, Failure> {
    usize::try_from(value.clone()).map_err(|_| {
        Failure::new(
            ErrorKind::Evaluation,
            format!("expected an indentation, got {value}"),
        )
    })
}

fn as_name(value: &Value) -> std::result::Result<String, Failure> {
    value.as_str().map(str::to_string).ok_or_else(|| {
        Failure::new(
            ErrorKind::Evaluation,
            format!("expected a string, got {value}"),
        )
    })
}

fn command_failure(name: &str, error: CommandError) -> Failure {
    let mut nested = vec![Frame::Command {
        name: name.to_string(),
    }];
    match error.downcast::<ExecutionError>() {
        Ok(inner) => {
            nested.extend(inner.frames().iter().cloned());
            Failure {
                kind: inner.kind(),
                message: inner.message().to_string(),
                line: None,
                nested,
            }
        }
        Err(error) => Failure {
            kind: ErrorKind::Command,
            message: error.to_string(),
            line: None,
            nested,
        },
    }
}

fn report(code: &Code, context: &str, failure: Failure) -> Box<ExecutionError> {
    let mut frames = Vec::new();
    if let Some(line) = failure.line {
        frames.push(code_frame(code, line));
    }
    frames.extend(failure.nested);
    ExecutionError::new(context, failure.kind, failure.message, frames)
}

fn code_frame(code: &Code, line: LineRef) -> Frame {
    match line {
        LineRef::Intro(index) => Frame::Code {
            number: index + 1,
            code: code.intro().get(index).cloned().unwrap_or_default(),
            template: crate::code::Excerpt::Unavailable("code preamble".to_string()),
        },
        LineRef::Body(index) => {
            let line = &code.lines()[index];
            let template = code
                .provenance(line.context)
                .map(|provenance| provenance.excerpt(line.template_line))
                .unwrap_or_else(|| {
                    crate::code::Excerpt::Unavailable(format!(
                        "unknown context {}",
                        line.context.index()
                    ))
                });
            Frame::Code {
                number: code.intro().len() + index + 1,
                code: format!("{}{}", INDENT.repeat(line.indent), line.content),
                template,
            }
        }
    }
}
