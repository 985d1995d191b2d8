//! Entry points: generate code from a template, execute it, or both.
//!
//! Every entry point records where it was called from, so errors can name
//! the host call site that started a generation.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use quill_core::Origin;
use quill_runtime::{Code, Runtime, Value};
use quill_template::Template;

use crate::{
    context::{GenerationContext, RuntimeSupport},
    error::Error,
    plugin::PluginSource,
};

pub type Result<T> = std::result::Result<T, Error>;

/// Variables and plugins for one generation or execution.
#[derive(Debug, Clone, Default)]
pub struct Context {
    variables: BTreeMap<String, Value>,
    meta: BTreeMap<String, Value>,
    plugins: Vec<PluginSource>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a runtime variable.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Add a variable visible to generation-time expressions.
    pub fn with_meta(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_meta(name, value);
        self
    }

    /// Load a plugin before the template is generated.
    pub fn with_plugin(mut self, plugin: impl Into<PluginSource>) -> Self {
        self.add_plugin(plugin);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn set_meta(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.meta.insert(name.into(), value.into());
    }

    pub fn add_plugin(&mut self, plugin: impl Into<PluginSource>) {
        self.plugins.push(plugin.into());
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    pub fn meta(&self) -> &BTreeMap<String, Value> {
        &self.meta
    }

    pub fn plugins(&self) -> &[PluginSource] {
        &self.plugins
    }
}

/// A template given as text, a file path, or already parsed.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    Text(String),
    Path(PathBuf),
    Parsed(Arc<Template>),
}

impl TemplateSource {
    pub fn load(self) -> Result<Arc<Template>> {
        let template = match self {
            TemplateSource::Text(text) => Template::parse(&text)?,
            TemplateSource::Path(path) => Template::open(path)?,
            TemplateSource::Parsed(template) => return Ok(template),
        };
        Ok(Arc::new(template))
    }
}

impl From<&str> for TemplateSource {
    fn from(text: &str) -> Self {
        TemplateSource::Text(text.to_string())
    }
}

impl From<String> for TemplateSource {
    fn from(text: String) -> Self {
        TemplateSource::Text(text)
    }
}

impl From<&Path> for TemplateSource {
    fn from(path: &Path) -> Self {
        TemplateSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for TemplateSource {
    fn from(path: PathBuf) -> Self {
        TemplateSource::Path(path)
    }
}

impl From<Arc<Template>> for TemplateSource {
    fn from(template: Arc<Template>) -> Self {
        TemplateSource::Parsed(template)
    }
}

impl From<Template> for TemplateSource {
    fn from(template: Template) -> Self {
        TemplateSource::Parsed(Arc::new(template))
    }
}

fn prepare(
    template: TemplateSource,
    context: &Context,
    origin: Origin,
) -> Result<GenerationContext> {
    let template = template.load()?;
    let mut generation = GenerationContext::new(template, origin);
    for (name, value) in &context.meta {
        generation.meta_mut().set(name.as_str(), value.clone());
    }
    for plugin in &context.plugins {
        generation.load(plugin.clone())?;
    }
    generation.generate()?;
    let warnings = generation
        .diagnostics()
        .iter()
        .filter(|diagnostic| diagnostic.severity.is_warning());
    for diagnostic in warnings {
        tracing::warn!("{diagnostic}");
    }
    Ok(generation)
}

fn run(
    code: &Code,
    support: &RuntimeSupport,
    context: &Context,
    label: Option<&str>,
) -> Result<String> {
    let mut runtime = Runtime::new();
    support.install(&mut runtime);
    runtime.extend(&context.variables);
    let output = match label {
        Some(label) => runtime.execute_as(code, label)?,
        None => runtime.execute(code)?,
    };
    Ok(output)
}

/// Compile a template into code.
#[track_caller]
pub fn generate(template: impl Into<TemplateSource>, context: &Context) -> Result<Code> {
    let generation = prepare(template.into(), context, Origin::caller())?;
    Ok(generation.into_code())
}

/// Generate a template and execute the code.
#[track_caller]
pub fn execute(template: impl Into<TemplateSource>, context: &Context) -> Result<String> {
    let generation = prepare(template.into(), context, Origin::caller())?;
    run(generation.code(), generation.support(), context, None)
}

/// Same as [`execute`].
#[track_caller]
pub fn render(template: impl Into<TemplateSource>, context: &Context) -> Result<String> {
    execute(template, context)
}

/// Execute code generated earlier, with the plugins of `context` providing
/// runtime helpers and commands.
#[track_caller]
pub fn execute_code(code: &Code, context: &Context) -> Result<String> {
    let origin = Origin::caller();
    let mut support = RuntimeSupport::default();
    for source in &context.plugins {
        collect_support(source, &mut support)?;
    }
    if code.contexts().is_empty() {
        run(code, &support, context, Some(&format!("code at {origin}")))
    } else {
        run(code, &support, context, None)
    }
}

fn collect_support(source: &PluginSource, support: &mut RuntimeSupport) -> Result<()> {
    let plugin = source.resolve().map_err(|reason| Error::Load {
        target: source.to_string(),
        reason,
    })?;
    for dependency in plugin.dependencies() {
        collect_support(dependency, support)?;
    }
    support.add_plugin(&plugin);
    Ok(())
}

/// Generate code that `quill-runtime` can execute on its own, in its
/// serialized form.
#[track_caller]
pub fn generate_standalone(
    template: impl Into<TemplateSource>,
    context: &Context,
) -> Result<String> {
    let generation = prepare(template.into(), context, Origin::caller())?;
    if !generation.support().is_portable() {
        tracing::warn!(
            template = generation.template().name(),
            "standalone code calls plugin helpers or commands that are not builtin runtime libraries"
        );
    }
    Ok(generation.code().serialize())
}

/// Restore serialized code and execute it.
#[track_caller]
pub fn execute_standalone(text: &str, context: &Context) -> Result<String> {
    let code = Code::restore(text)?;
    execute_code(&code, context)
}
