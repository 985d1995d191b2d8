//! The generation context: the state of generating one template.
//!
//! A context walks its template's line tree depth-first and appends code to
//! a [`Code`] stream. Contexts derived for `%include` and `%extend` borrow
//! the stream from their parent and hand it back when they are done, so all
//! templates of one generation end up in a single program.

use std::{fmt, mem, path::PathBuf, sync::Arc};

use indexmap::{IndexMap, IndexSet};
use quill_core::{Origin, and_list, split_arguments, split_keyword, split_words};
use quill_runtime::{
    Code, Command, ContextId, Evaluator, Helper, Provenance, Runtime, Value,
    evaluator::{quote, render},
    library,
};
use quill_template::{Delimiters, Line, Lines, Segment, Template, interpolate};

use crate::{
    arguments::{Arguments, MacroArgs, parse_invocation},
    diagnostic::Diagnostic,
    error::{GenerationError, GenerationErrorKind, Result},
    handler::{Flow, LineHandler, LineHandlers},
    macros,
    plugin::{Plugin, PluginSource},
};

/// A macro implementation.
pub type MacroFn = Arc<dyn Fn(&mut GenerationContext, &MacroArgs) -> Result<Flow> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Generating,
    Done,
}

/// A `%define`d block.
#[derive(Debug, Clone)]
pub struct Definition {
    lines: Lines,
    template: Arc<Template>,
    context: ContextId,
}

impl Definition {
    pub fn lines(&self) -> &Lines {
        &self.lines
    }

    /// The template the block was defined in.
    pub fn template(&self) -> &Template {
        &self.template
    }
}

/// What loaded plugins contribute to execution.
#[derive(Clone, Default)]
pub struct RuntimeSupport {
    helpers: IndexMap<String, Helper>,
    commands: IndexMap<String, Command>,
    libraries: IndexSet<String>,
}

impl RuntimeSupport {
    pub fn add_plugin(&mut self, plugin: &Plugin) {
        for (name, helper) in plugin.helpers() {
            self.helpers.insert(name.clone(), Arc::clone(helper));
        }
        for (name, command) in plugin.commands() {
            self.commands.insert(name.clone(), Arc::clone(command));
        }
        self.libraries.extend(plugin.libraries().iter().cloned());
    }

    /// Register everything with `runtime`.
    pub fn install(&self, runtime: &mut Runtime) {
        for name in &self.libraries {
            let helpers = library::builtin(name).map(|library| library.helpers());
            for (helper_name, helper) in helpers.unwrap_or_default() {
                runtime.register_helper(helper_name, helper);
            }
        }
        for (name, helper) in &self.helpers {
            runtime.register_helper(name, Arc::clone(helper));
        }
        for (name, command) in &self.commands {
            runtime.register_command(name, Arc::clone(command));
        }
    }

    pub fn libraries(&self) -> impl Iterator<Item = &str> {
        self.libraries.iter().map(String::as_str)
    }

    /// Whether code relying on this support can run without the plugins,
    /// i.e. nothing but builtin libraries is needed.
    pub fn is_portable(&self) -> bool {
        self.helpers.is_empty() && self.commands.is_empty()
    }

    fn merge(&mut self, other: RuntimeSupport) {
        self.helpers.extend(other.helpers);
        self.commands.extend(other.commands);
        self.libraries.extend(other.libraries);
    }
}

impl fmt::Debug for RuntimeSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeSupport")
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("libraries", &self.libraries)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct Cursor {
    line: Line,
    siblings: Lines,
    index: usize,
}

/// The state of generating one template.
pub struct GenerationContext {
    template: Arc<Template>,
    origin: Origin,
    id: ContextId,
    state: State,
    cursor: Option<Cursor>,
    code: Code,
    start: usize,
    meta: Evaluator,
    handlers: LineHandlers,
    macros: IndexMap<String, MacroFn>,
    delimiters: Delimiters,
    definitions: IndexMap<String, Definition>,
    loaded: IndexSet<String>,
    support: RuntimeSupport,
    diagnostics: Vec<Diagnostic>,
    tolerant: bool,
}

impl GenerationContext {
    pub fn new(template: Arc<Template>, origin: Origin) -> Self {
        Self::with_code(template, origin, Code::new())
    }

    fn with_code(template: Arc<Template>, origin: Origin, mut code: Code) -> Self {
        let id = code.register(provenance(&template, origin.clone()));
        let mut loaded = IndexSet::new();
        loaded.insert(PluginSource::Builtin("core".to_string()).id());
        Self {
            template,
            origin,
            id,
            state: State::Idle,
            cursor: None,
            start: code.len(),
            code,
            meta: Evaluator::new(),
            handlers: LineHandlers::new(),
            macros: macros::core()
                .into_iter()
                .map(|(name, function)| (name.to_string(), function))
                .collect(),
            delimiters: Delimiters::default(),
            definitions: IndexMap::new(),
            loaded,
            support: RuntimeSupport::default(),
            diagnostics: Vec::new(),
            tolerant: false,
        }
    }

    /// Generate the whole template.
    pub fn generate(&mut self) -> Result<()> {
        self.generate_at(0)
    }

    /// Generate the template with its top-level lines at `indent`.
    pub(crate) fn generate_at(&mut self, indent: usize) -> Result<()> {
        if self.state != State::Idle {
            return Err(self.error(GenerationErrorKind::AlreadyGenerated));
        }
        self.state = State::Generating;
        self.start = self.code.len();
        tracing::debug!(template = self.template.name(), indent, "generating template");

        let lines = self.template.lines().snapped(indent);
        let result = self.generate_lines(&lines);
        self.state = State::Done;
        result.map(|_| ())
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn into_code(self) -> Code {
        self.code
    }

    /// Drop code generated after the first `len` lines.
    pub fn truncate_code(&mut self, len: usize) {
        self.code.truncate(len);
    }

    /// Number of code lines that existed when the template being generated
    /// started, which for in-place generation is the nested template.
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn support(&self) -> &RuntimeSupport {
        &self.support
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The generation-time namespace.
    pub fn meta(&self) -> &Evaluator {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Evaluator {
        &mut self.meta
    }

    pub fn handlers(&self) -> &LineHandlers {
        &self.handlers
    }

    pub fn handlers_mut(&mut self) -> &mut LineHandlers {
        &mut self.handlers
    }

    pub fn register_macro(&mut self, name: impl Into<String>, function: MacroFn) {
        self.macros.insert(name.into(), function);
    }

    /// Names of the available macros, sorted.
    pub fn macro_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.macros.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Replace the active delimiters, returning the previous pair.
    pub fn set_delimiters(&mut self, delimiters: Delimiters) -> Delimiters {
        mem::replace(&mut self.delimiters, delimiters)
    }

    /// Make unknown macros warnings instead of failures, returning the
    /// previous setting.
    pub fn set_tolerant(&mut self, tolerant: bool) -> bool {
        mem::replace(&mut self.tolerant, tolerant)
    }

    pub fn definitions(&self) -> &IndexMap<String, Definition> {
        &self.definitions
    }

    pub fn definition(&self, name: &str) -> Option<&Definition> {
        self.definitions.get(name)
    }

    /// Record `lines` as the definition of `name`, replacing any earlier one.
    pub fn define(&mut self, name: impl Into<String>, lines: Lines) {
        let definition = Definition {
            lines,
            template: Arc::clone(&self.template),
            context: self.id,
        };
        self.definitions.insert(name.into(), definition);
    }

    /// Names of the known definitions, sorted.
    pub fn definition_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn cursor(&self) -> Result<&Cursor> {
        self.cursor.as_ref().ok_or_else(|| {
            self.error(GenerationErrorKind::Custom("no line is being generated".to_string()))
        })
    }

    /// The line being generated.
    pub fn line(&self) -> Result<&Line> {
        self.cursor().map(|cursor| &cursor.line)
    }

    /// Number of the line being generated, or 0 outside generation.
    pub fn line_number(&self) -> usize {
        self.cursor.as_ref().map_or(0, |cursor| cursor.line.number())
    }

    /// `template:line` of the line being generated.
    pub fn location(&self) -> String {
        match &self.cursor {
            Some(cursor) => format!("{}:{}", self.template.name(), cursor.line.number()),
            None => self.template.name().to_string(),
        }
    }

    /// The current line's children, snapped to its indentation.
    pub fn children(&self) -> Result<Lines> {
        let line = self.line()?;
        Ok(line.children().snapped(line.indent()))
    }

    /// The siblings after the current line.
    pub fn remaining(&self) -> Result<Lines> {
        let cursor = self.cursor()?;
        Ok(cursor.siblings.tail(cursor.index + 1))
    }

    /// The lines a block macro applies to: its children, or the remaining
    /// siblings when it has none. The flow tells the caller which one.
    pub fn block(&self) -> Result<(Lines, Flow)> {
        if self.line()?.has_children() {
            Ok((self.children()?, Flow::Continue))
        } else {
            Ok((self.remaining()?, Flow::Consumed))
        }
    }

    /// Describe this context as error messages do.
    pub fn describe(&self) -> String {
        match self.template.path() {
            Some(path) => format!("template {} at {}", path.display(), self.origin),
            None => format!("template at {}", self.origin),
        }
    }

    /// An error at the line being generated.
    pub fn error(&self, kind: GenerationErrorKind) -> Box<GenerationError> {
        let span = self
            .cursor
            .as_ref()
            .and_then(|cursor| self.template.line_span(cursor.line.number()));
        GenerationError::new(self.describe(), kind, self.template.named_source(), span)
    }

    pub fn invalid_arguments(
        &self,
        name: &str,
        problem: impl Into<String>,
    ) -> Box<GenerationError> {
        self.error(GenerationErrorKind::InvalidArguments {
            name: name.to_string(),
            line: self.line_number(),
            problem: problem.into(),
        })
    }

    fn evaluation_error(&self, message: impl Into<String>) -> Box<GenerationError> {
        self.error(GenerationErrorKind::Evaluation {
            line: self.line_number(),
            message: message.into(),
        })
    }

    /// Generate sibling lines in order.
    pub fn generate_lines(&mut self, lines: &Lines) -> Result<Flow> {
        for (index, line) in lines.iter().enumerate() {
            let cursor = Cursor {
                line: line.clone(),
                siblings: lines.clone(),
                index,
            };
            let previous = self.cursor.replace(cursor);
            let flow = self.generate_line(line);
            self.cursor = previous;
            match flow? {
                Flow::Continue => {}
                Flow::Consumed => return Ok(Flow::Continue),
                Flow::Stop => return Ok(Flow::Stop),
            }
        }
        Ok(Flow::Continue)
    }

    /// Generate one line with the handler its prefix selects.
    pub fn generate_line(&mut self, line: &Line) -> Result<Flow> {
        if line.is_blank() {
            return Ok(Flow::Continue);
        }
        let Some(handler) = self.handlers.resolve(line.content()).cloned() else {
            return Err(self.error(GenerationErrorKind::NoHandler {
                line: line.number(),
                considered: self.handlers.considered(),
            }));
        };
        match handler {
            LineHandler::Code => self.generate_code(line),
            LineHandler::Macro => self.generate_macro(line),
            LineHandler::Text => self.generate_text(line),
            LineHandler::Custom(handler) => handler(self, line),
        }
    }

    /// Plain text: one `emit` call, then the children as they are indented.
    pub fn generate_text(&mut self, line: &Line) -> Result<Flow> {
        if line.is_blank() {
            return Ok(Flow::Continue);
        }
        self.add_text(line.indent(), line.content())?;
        self.generate_lines(line.children())
    }

    /// `!statement`, `!# comment` and `!` verbatim blocks.
    pub fn generate_code(&mut self, line: &Line) -> Result<Flow> {
        let content = line.content();
        let content = content.strip_prefix('!').unwrap_or(content).trim();
        if content.starts_with('#') {
            return Ok(Flow::Continue);
        }
        if content.is_empty() {
            self.add_verbatim(line.children());
            return Ok(Flow::Continue);
        }

        let children = line.children().snapped(line.indent());
        if content.ends_with(':') {
            self.code_block(content, |ctx| ctx.generate_lines(&children))
        } else {
            self.add_code(content);
            self.generate_lines(&children)
        }
    }

    /// `%macro` lines, `%!` meta code and the bare `%` empty line.
    pub fn generate_macro(&mut self, line: &Line) -> Result<Flow> {
        let content = line.content();
        let body = content.strip_prefix('%').unwrap_or(content);
        if body.is_empty() {
            self.add_literal(line.indent(), "");
            return Ok(Flow::Continue);
        }
        if let Some(statement) = body.strip_prefix('!') {
            return self.generate_meta(line, statement);
        }

        let Some((name, args)) = parse_invocation(body) else {
            return Err(self.error(GenerationErrorKind::InvalidMacro {
                line: line.number(),
                content: body.to_string(),
            }));
        };
        let Some(function) = self.macros.get(name).cloned() else {
            let error = self.error(GenerationErrorKind::UnknownMacro {
                name: name.to_string(),
                line: line.number(),
                available: and_list(self.macro_names()),
            });
            if !self.tolerant {
                return Err(error);
            }
            tracing::warn!(name, location = %self.location(), "skipping unknown macro");
            let diagnostic = Diagnostic::warning(error.kind().to_string()).at(self.location());
            self.diagnostics.push(diagnostic);
            return Ok(Flow::Continue);
        };

        tracing::debug!(name, line = line.number(), "dispatching macro");
        function(self, &args)
    }

    fn generate_meta(&mut self, line: &Line, statement: &str) -> Result<Flow> {
        let statement = statement.trim();
        let mut statements = Vec::new();
        let depth = if statement.is_empty() {
            0
        } else {
            statements.push((0, line.number(), statement.to_string()));
            1
        };
        nested(line.children(), depth, &mut statements);
        self.run_meta(&statements)?;
        Ok(Flow::Continue)
    }

    /// Run `(depth, template line, statement)` triples in the meta namespace.
    pub fn run_meta(&mut self, statements: &[(usize, usize, String)]) -> Result<()> {
        let mut code = Code::new();
        let context = code.register(provenance(&self.template, self.origin.clone()));
        for (depth, number, statement) in statements {
            code.set_indent_level(*depth)
                .push_line(statement.clone(), *number, context);
        }
        let runtime = Runtime::with_evaluator(self.meta.clone());
        self.meta = runtime
            .run_for_namespace(&code)
            .map_err(|message| self.evaluation_error(message))?;
        Ok(())
    }

    fn add_verbatim(&mut self, lines: &Lines) {
        let level = self.code.indent_level();
        let mut statements = Vec::new();
        nested(lines, 0, &mut statements);
        for (depth, number, statement) in statements {
            self.code.set_indent_level(level + depth);
            self.add_code_at(number, statement);
        }
        self.code.set_indent_level(level);
    }

    /// Append a code line for the line being generated.
    pub fn add_code(&mut self, content: impl Into<String>) -> &mut Self {
        self.add_code_at(self.line_number(), content)
    }

    fn add_code_at(&mut self, number: usize, content: impl Into<String>) -> &mut Self {
        let content = content.into();
        tracing::trace!(line = number, code = %content, "generated code");
        self.code.push_line(content, number, self.id);
        self
    }

    /// Append `header` and generate its body one level deeper.
    ///
    /// An empty body becomes `pass`.
    pub fn code_block<F>(&mut self, header: impl Into<String>, body: F) -> Result<Flow>
    where
        F: FnOnce(&mut Self) -> Result<Flow>,
    {
        self.add_code(header);
        self.code.push_indent();
        let mark = self.code.len();
        let result = body(self);
        if result.is_ok() && self.code.len() == mark {
            self.add_code("pass");
        }
        self.code.push_dedent();
        result
    }

    /// Append an `emit` call writing `text`, interpolated with the active
    /// delimiters, at `indent`.
    pub fn add_text(&mut self, indent: usize, text: &str) -> Result<()> {
        let mut parts = Vec::new();
        for segment in interpolate(text, &self.delimiters) {
            match segment.map_err(|error| self.error(GenerationErrorKind::Template(error)))? {
                Segment::Text(text) => parts.push(quote(&text)),
                Segment::Expression(expression) => parts.push(emit_argument(expression)),
            }
        }
        if parts.is_empty() {
            parts.push(quote(""));
        }
        self.add_code(format!("emit({indent}, {})", parts.join(", ")));
        Ok(())
    }

    /// Append an `emit` call writing `text` as is.
    pub fn add_literal(&mut self, indent: usize, text: &str) -> &mut Self {
        self.add_code(format!("emit({indent}, {})", quote(text)))
    }

    /// Interpolate `text` now, evaluating expressions in the meta namespace.
    pub fn meta_interpolate(&self, text: &str) -> Result<String> {
        let mut out = String::new();
        for segment in interpolate(text, &self.delimiters) {
            match segment.map_err(|error| self.error(GenerationErrorKind::Template(error)))? {
                Segment::Text(text) => out.push_str(&text),
                Segment::Expression(expression) => {
                    out.push_str(&render(&self.evaluate_meta(expression)?));
                }
            }
        }
        Ok(out)
    }

    /// Compile interpolated `text` into a runtime string expression.
    pub fn runtime_expression(&self, text: &str) -> Result<String> {
        let mut parts = Vec::new();
        for segment in interpolate(text, &self.delimiters) {
            match segment.map_err(|error| self.error(GenerationErrorKind::Template(error)))? {
                Segment::Text(text) => parts.push(quote(&text)),
                Segment::Expression(expression) => parts.push(format!("({expression})")),
            }
        }
        if parts.is_empty() {
            return Ok(quote(""));
        }
        Ok(parts.join(" ~ "))
    }

    /// Evaluate `expression` in the meta namespace.
    pub fn evaluate_meta(&self, expression: &str) -> Result<Value> {
        self.meta
            .eval(expression)
            .map_err(|error| self.evaluation_error(error.message()))
    }

    /// Evaluate macro arguments.
    ///
    /// Bare arguments are meta-interpolated and split on whitespace; plain
    /// words stay strings and only `key=value` values are evaluated.
    pub fn arguments(&self, args: &MacroArgs) -> Result<Arguments> {
        let mut arguments = Arguments::default();
        match args {
            MacroArgs::None => {}
            MacroArgs::Bare(text) => {
                arguments.bare = true;
                let text = self.meta_interpolate(text)?;
                for word in split_words(&text) {
                    match split_keyword(word) {
                        Some((name, value)) => {
                            arguments
                                .keywords
                                .insert(name.to_string(), self.evaluate_meta(value)?);
                        }
                        None => arguments.positional.push(Value::from(word)),
                    }
                }
            }
            MacroArgs::Words(text) | MacroArgs::Call(text) => {
                let parts = match args {
                    MacroArgs::Words(_) => split_words(text),
                    _ => split_arguments(text),
                };
                for part in parts {
                    match split_keyword(part) {
                        Some((name, value)) => {
                            arguments
                                .keywords
                                .insert(name.to_string(), self.evaluate_meta(value)?);
                        }
                        None => arguments.positional.push(self.evaluate_meta(part)?),
                    }
                }
            }
        }
        Ok(arguments)
    }

    /// The first positional argument of macro `name`, which must be a
    /// non-empty string.
    pub fn required_name(&self, name: &str, arguments: &Arguments) -> Result<String> {
        arguments
            .string(0)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| self.invalid_arguments(name, "expects a name"))
    }

    fn with_source<T>(
        &mut self,
        template: Arc<Template>,
        id: ContextId,
        generate: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let template = mem::replace(&mut self.template, template);
        let id = mem::replace(&mut self.id, id);
        let start = mem::replace(&mut self.start, self.code.len());
        let result = generate(self);
        self.template = template;
        self.id = id;
        self.start = start;
        result
    }

    /// Generate a definition in place, its lines snapped to `indent`.
    pub fn generate_definition(&mut self, definition: &Definition, indent: usize) -> Result<Flow> {
        let lines = definition.lines.snapped(indent);
        self.with_source(Arc::clone(&definition.template), definition.context, |ctx| {
            ctx.generate_lines(&lines)
        })
    }

    /// Generate another template inside this context, sharing its macros,
    /// handlers and definitions.
    pub fn generate_in_place(&mut self, template: Arc<Template>, indent: usize) -> Result<Flow> {
        let origin = self.derived_origin();
        let id = self.code.register(provenance(&template, origin));
        let lines = template.lines().snapped(indent);
        self.with_source(template, id, |ctx| ctx.generate_lines(&lines))?;
        Ok(Flow::Continue)
    }

    /// Generate another template in a fresh context derived from this one.
    pub fn generate_included(
        &mut self,
        template: Arc<Template>,
        indent: usize,
        plugin: Option<PluginSource>,
    ) -> Result<()> {
        let mut child = self.derive(template);
        let result = match plugin {
            Some(plugin) => child.load(plugin),
            None => Ok(()),
        }
        .and_then(|()| child.generate_at(indent));
        self.absorb(child);
        result
    }

    /// Generate `base` in a derived context that shares this context's
    /// definitions.
    pub fn generate_extension(&mut self, base: Arc<Template>, indent: usize) -> Result<()> {
        let mut child = self.derive(base);
        child.definitions = mem::take(&mut self.definitions);
        let result = child.generate_at(indent);
        self.definitions = mem::take(&mut child.definitions);
        self.absorb(child);
        result
    }

    /// A fresh context for `template` that writes to this context's code.
    ///
    /// The meta namespace is copied; macros, handlers and delimiters start
    /// from the defaults. Hand the context back with
    /// [`GenerationContext::absorb`].
    pub fn derive(&mut self, template: Arc<Template>) -> GenerationContext {
        let origin = self.derived_origin();
        let code = mem::take(&mut self.code);
        let mut child = Self::with_code(template, origin, code);
        child.meta = self.meta.clone();
        child
    }

    /// Take back the code of a derived context, with what its plugins
    /// contribute to execution.
    pub fn absorb(&mut self, child: GenerationContext) {
        self.code = child.code;
        self.support.merge(child.support);
        self.diagnostics.extend(child.diagnostics);
    }

    fn derived_origin(&self) -> Origin {
        Origin::derived(self.template.name(), self.line_number(), self.origin.clone())
    }

    /// Resolve a template reference: a path relative to this template's
    /// directory or the working directory, or else template text.
    pub fn resolve_template(&self, target: &str) -> Result<Arc<Template>> {
        let path = PathBuf::from(target);
        let candidates = [
            self.template.directory().map(|directory| directory.join(&path)),
            Some(path),
        ];
        let found = candidates
            .into_iter()
            .flatten()
            .find(|candidate| candidate.is_file());
        let template = match found {
            Some(path) => Template::open(path),
            None => Template::parse(target),
        };
        template
            .map(Arc::new)
            .map_err(|error| self.error(GenerationErrorKind::Template(error)))
    }

    /// Load the plugin called `target`, resolved against this template's
    /// directory.
    pub fn load_named(&mut self, target: &str) -> Result<()> {
        let source = self.locate_plugin(target)?;
        self.load(source)
    }

    pub fn locate_plugin(&self, target: &str) -> Result<PluginSource> {
        PluginSource::locate(target, self.template.directory()).map_err(|reason| {
            self.error(GenerationErrorKind::Load {
                target: target.to_string(),
                reason,
            })
        })
    }

    /// Load a plugin once; loading the same plugin again does nothing.
    pub fn load(&mut self, source: PluginSource) -> Result<()> {
        let id = source.id();
        if self.loaded.contains(&id) {
            tracing::debug!(plugin = %source, "plugin already loaded");
            return Ok(());
        }
        let plugin = source.resolve().map_err(|reason| {
            self.error(GenerationErrorKind::Load {
                target: source.to_string(),
                reason,
            })
        })?;
        self.loaded.insert(id);
        tracing::debug!(plugin = plugin.name(), "loading plugin");
        let diagnostic =
            Diagnostic::info(format!("loaded plugin {}", plugin.name())).at(self.location());
        self.diagnostics.push(diagnostic);
        self.install(&plugin)
    }

    fn install(&mut self, plugin: &Plugin) -> Result<()> {
        for dependency in plugin.dependencies() {
            self.load(dependency.clone())?;
        }
        for (name, function) in plugin.macros() {
            self.macros.insert(name.clone(), Arc::clone(function));
        }
        for (prefix, handler) in plugin.handlers() {
            self.handlers.register(prefix.clone(), handler.clone());
        }
        for (name, helper) in plugin.helpers() {
            self.meta.register(name, Arc::clone(helper));
        }
        for name in plugin.libraries() {
            let Some(library) = library::builtin(name) else {
                return Err(self.error(GenerationErrorKind::Load {
                    target: plugin.name().to_string(),
                    reason: format!(
                        "unknown runtime library '{name}' (available libraries are {})",
                        and_list(library::names())
                    ),
                }));
            };
            for (helper_name, helper) in library.helpers() {
                self.meta.register(helper_name, helper);
            }
            self.code.push_intro(format!("load({})", quote(name)));
        }
        self.support.add_plugin(plugin);
        if let Some(delimiters) = plugin.delimiters() {
            self.delimiters = delimiters.clone();
        }
        if let Some(hook) = plugin.hook() {
            hook(self)?;
        }
        Ok(())
    }
}

impl fmt::Debug for GenerationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationContext")
            .field("template", &self.template.name())
            .field("origin", &self.origin)
            .field("state", &self.state)
            .field("macros", &self.macro_names())
            .field("handlers", &self.handlers)
            .field("delimiters", &self.delimiters)
            .field("definitions", &self.definition_names())
            .finish_non_exhaustive()
    }
}

fn provenance(template: &Template, origin: Origin) -> Provenance {
    match template.path() {
        Some(path) => Provenance::file(path, origin),
        None => Provenance::text(template.text(), origin),
    }
}

/// Expression segments with top-level commas are parenthesized so they stay
/// one `emit` argument.
fn emit_argument(expression: &str) -> String {
    let expression = expression.trim();
    if split_arguments(expression).len() > 1 {
        format!("({expression})")
    } else {
        expression.to_string()
    }
}

/// Non-blank lines below `lines` with their nesting depth.
fn nested(lines: &Lines, depth: usize, out: &mut Vec<(usize, usize, String)>) {
    for line in lines {
        if !line.is_blank() {
            out.push((depth, line.number(), line.content().to_string()));
        }
        nested(line.children(), depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(text: &str) -> GenerationContext {
        let template = Template::parse(text).unwrap();
        GenerationContext::new(Arc::new(template), Origin::new("test.rs", 1))
    }

    fn generated(text: &str) -> String {
        let mut ctx = context(text);
        ctx.generate().unwrap();
        ctx.into_code().to_string()
    }

    #[test]
    fn test_text_line() {
        assert_eq!(generated("    line {i}"), "emit(0, \"line \", i)");
        assert_eq!(
            generated("a:\n    b {x}"),
            "emit(0, \"a:\")\nemit(4, \"b \", x)"
        );
    }

    #[test]
    fn test_code_block_children_are_snapped() {
        assert_eq!(
            generated("!for i in range(2):\n    line {i}"),
            "for i in range(2):\n    emit(0, \"line \", i)"
        );
    }

    #[test]
    fn test_empty_code_block_gets_pass() {
        assert_eq!(generated("!if x:"), "if x:\n    pass");
    }

    #[test]
    fn test_verbatim_block() {
        assert_eq!(
            generated("!\n    for i in range(2):\n        emit(0, i)\n    x = 1\nend"),
            "for i in range(2):\n    emit(0, i)\nx = 1\nemit(0, \"end\")"
        );
    }

    #[test]
    fn test_comments_are_dropped() {
        assert_eq!(generated("!# note\n!#\n    dropped\nkept"), "emit(0, \"kept\")");
    }

    #[test]
    fn test_bare_percent_emits_empty_line() {
        assert_eq!(generated("a\n%\nb"), "emit(0, \"a\")\nemit(0, \"\")\nemit(0, \"b\")");
    }

    #[test]
    fn test_comma_expression_is_one_argument() {
        assert_eq!(generated("{a, b}"), "emit(0, (a, b))");
    }

    #[test]
    fn test_code_lines_are_tagged() {
        let mut ctx = context("a\n!x = 1");
        ctx.generate().unwrap();
        let code = ctx.into_code();
        let tags: Vec<_> = code
            .lines()
            .iter()
            .map(|line| (line.template_line, line.context))
            .collect();
        assert_eq!(tags, [(1, ContextId::ROOT), (2, ContextId::ROOT)]);
    }

    #[test]
    fn test_generate_twice_fails() {
        let mut ctx = context("a");
        ctx.generate().unwrap();
        assert_eq!(ctx.state(), State::Done);
        let error = ctx.generate().unwrap_err();
        assert!(matches!(error.kind(), GenerationErrorKind::AlreadyGenerated));
    }

    #[test]
    fn test_no_handler() {
        let mut ctx = context("a\nb");
        ctx.handlers_mut().remove("");
        let error = ctx.generate().unwrap_err();
        assert_eq!(
            error.kind().to_string(),
            "unable to generate line 1 (considered code (!) and macro (%))"
        );
        assert_eq!(error.span(), Some((0, 1).into()));
    }

    #[test]
    fn test_meta_statements() {
        let mut ctx = context("%!x = 2\n%!\n    y = x * 3\n%emit {y}");
        ctx.generate().unwrap();
        assert_eq!(ctx.meta().get("y"), Some(&Value::from(6)));
        assert_eq!(ctx.into_code().to_string(), "emit(0, \"6\")");
    }

    #[test]
    fn test_meta_interpolate_and_runtime_expression() {
        let mut ctx = context("a");
        ctx.meta_mut().set("name", "quill");
        assert_eq!(ctx.meta_interpolate("hi {name}, {{x}}").unwrap(), "hi quill, {x}");
        assert_eq!(
            ctx.runtime_expression("id_{n + 1}").unwrap(),
            "\"id_\" ~ (n + 1)"
        );
        assert_eq!(ctx.runtime_expression("").unwrap(), "\"\"");
    }

    #[test]
    fn test_arguments() {
        let mut ctx = context("a");
        ctx.meta_mut().set("name", "block");

        let arguments = ctx
            .arguments(&MacroArgs::Bare("{name} required=True".to_string()))
            .unwrap();
        assert!(arguments.is_bare());
        assert_eq!(arguments.string(0).as_deref(), Some("block"));
        assert!(arguments.flag("required", false));

        let arguments = ctx
            .arguments(&MacroArgs::Words("name 'x y' n=2".to_string()))
            .unwrap();
        assert_eq!(arguments.positional(), [Value::from("block"), Value::from("x y")]);
        assert_eq!(arguments.keyword("n"), Some(&Value::from(2)));

        let arguments = ctx
            .arguments(&MacroArgs::Call("name ~ '!', n=1 + 1".to_string()))
            .unwrap();
        assert_eq!(arguments.positional(), [Value::from("block!")]);
        assert_eq!(arguments.keyword("n"), Some(&Value::from(2)));
    }

    #[test]
    fn test_derived_context_shares_code() {
        let mut ctx = context("a");
        ctx.add_code("x = 1");
        let child_template = Arc::new(Template::parse("b").unwrap());
        ctx.generate_included(child_template, 4, None).unwrap();
        let code = ctx.into_code();
        assert_eq!(code.to_string(), "x = 1\nemit(4, \"b\")");
        assert_eq!(code.contexts().len(), 2);
        assert_eq!(code.lines()[1].context.index(), 1);
    }
}
