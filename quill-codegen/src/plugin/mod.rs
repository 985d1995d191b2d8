//! Plugins extend generation with macros, line handlers and runtime helpers.
//!
//! Plugins come from three places: builtins (`core` and `common`), TOML
//! manifests on disk, and [`Plugin`] values built in memory.

mod manifest;

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexMap;
use quill_core::and_list;
use quill_runtime::{Command, CommandError, Helper, Runtime, Value};
use quill_template::Delimiters;

use crate::{
    arguments::MacroArgs,
    context::{GenerationContext, MacroFn},
    error::Result,
    handler::{Flow, LineHandler},
    macros,
};

pub use manifest::{load_manifest, parse_manifest};

/// A setup hook, run when the plugin is loaded into a context.
pub type Hook = Arc<dyn Fn(&mut GenerationContext) -> Result<()> + Send + Sync>;

const BUILTINS: &[&str] = &["common", "core"];

/// A set of generation and runtime extensions.
///
/// ```
/// use quill_codegen::{Flow, Plugin};
///
/// let plugin = Plugin::new("greeting").with_macro("hello", |ctx, _args| {
///     let indent = ctx.line()?.indent();
///     ctx.add_literal(indent, "hello");
///     Ok(Flow::Continue)
/// });
/// assert_eq!(plugin.name(), "greeting");
/// ```
#[derive(Clone, Default)]
pub struct Plugin {
    name: String,
    dependencies: Vec<PluginSource>,
    macros: IndexMap<String, MacroFn>,
    handlers: IndexMap<String, LineHandler>,
    helpers: IndexMap<String, Helper>,
    commands: IndexMap<String, Command>,
    libraries: Vec<String>,
    delimiters: Option<Delimiters>,
    hook: Option<Hook>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Load `source` before this plugin.
    pub fn with_dependency(mut self, source: PluginSource) -> Self {
        self.dependencies.push(source);
        self
    }

    pub fn with_macro<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&mut GenerationContext, &MacroArgs) -> Result<Flow> + Send + Sync + 'static,
    {
        self.macros.insert(name.to_string(), Arc::new(function));
        self
    }

    pub(crate) fn with_macro_fn(mut self, name: &str, function: MacroFn) -> Self {
        self.macros.insert(name.to_string(), function);
        self
    }

    /// Handle lines starting with `prefix`; the empty prefix replaces the
    /// text fallback.
    pub fn with_handler(mut self, prefix: &str, handler: LineHandler) -> Self {
        self.handlers.insert(prefix.to_string(), handler);
        self
    }

    /// A function available to expressions at generation and run time.
    pub fn with_helper(mut self, name: &str, helper: Helper) -> Self {
        self.helpers.insert(name.to_string(), helper);
        self
    }

    /// A statement-level runtime command.
    pub fn with_command<F>(mut self, name: &str, command: F) -> Self
    where
        F: Fn(&mut Runtime, &[Value]) -> std::result::Result<(), CommandError>
            + Send
            + Sync
            + 'static,
    {
        self.commands.insert(name.to_string(), Arc::new(command));
        self
    }

    /// Depend on a builtin runtime library.
    pub fn with_library(mut self, name: &str) -> Self {
        self.libraries.push(name.to_string());
        self
    }

    /// Switch the loading context to other interpolation delimiters.
    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = Some(delimiters);
        self
    }

    pub fn on_load<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut GenerationContext) -> Result<()> + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[PluginSource] {
        &self.dependencies
    }

    pub fn macros(&self) -> &IndexMap<String, MacroFn> {
        &self.macros
    }

    pub fn handlers(&self) -> &IndexMap<String, LineHandler> {
        &self.handlers
    }

    pub fn helpers(&self) -> &IndexMap<String, Helper> {
        &self.helpers
    }

    pub fn commands(&self) -> &IndexMap<String, Command> {
        &self.commands
    }

    pub fn libraries(&self) -> &[String] {
        &self.libraries
    }

    pub fn delimiters(&self) -> Option<&Delimiters> {
        self.delimiters.as_ref()
    }

    pub fn hook(&self) -> Option<&Hook> {
        self.hook.as_ref()
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("macros", &self.macros.keys().collect::<Vec<_>>())
            .field("handlers", &self.handlers)
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("libraries", &self.libraries)
            .field("delimiters", &self.delimiters)
            .finish_non_exhaustive()
    }
}

/// The builtin plugin called `name`.
pub fn builtin(name: &str) -> Option<Plugin> {
    match name {
        "core" => Some(
            macros::core()
                .into_iter()
                .fold(Plugin::new("core"), |plugin, (name, function)| {
                    plugin.with_macro_fn(name, function)
                }),
        ),
        "common" => Some(Plugin::new("common").with_library("common")),
        _ => None,
    }
}

/// Where a plugin comes from.
#[derive(Clone, Debug)]
pub enum PluginSource {
    Builtin(String),
    /// A TOML manifest.
    Path(PathBuf),
    Plugin(Arc<Plugin>),
}

impl PluginSource {
    /// Find the plugin called `target`: a builtin name, or a manifest path
    /// resolved against `directory`.
    pub fn locate(target: &str, directory: Option<&Path>) -> std::result::Result<Self, String> {
        if BUILTINS.contains(&target) {
            return Ok(Self::Builtin(target.to_string()));
        }
        let path = Path::new(target);
        let candidates = [
            directory.map(|directory| directory.join(path)),
            Some(path.to_path_buf()),
        ];
        candidates
            .into_iter()
            .flatten()
            .find(|candidate| candidate.is_file())
            .map(Self::Path)
            .ok_or_else(|| {
                format!(
                    "{target} does not exist, and available builtins are {}",
                    and_list(BUILTINS)
                )
            })
    }

    /// Identity used to load a plugin at most once per context.
    pub fn id(&self) -> String {
        match self {
            PluginSource::Builtin(name) => format!("builtin:{name}"),
            PluginSource::Path(path) => {
                let path = fs::canonicalize(path).unwrap_or_else(|_| path.clone());
                format!("path:{}", path.display())
            }
            PluginSource::Plugin(plugin) => format!("plugin:{:p}", Arc::as_ptr(plugin)),
        }
    }

    pub fn resolve(&self) -> std::result::Result<Arc<Plugin>, String> {
        match self {
            PluginSource::Builtin(name) => builtin(name)
                .map(Arc::new)
                .ok_or_else(|| format!("{name} is not a builtin plugin")),
            PluginSource::Path(path) => load_manifest(path).map(Arc::new),
            PluginSource::Plugin(plugin) => Ok(Arc::clone(plugin)),
        }
    }
}

impl From<Plugin> for PluginSource {
    fn from(plugin: Plugin) -> Self {
        Self::Plugin(Arc::new(plugin))
    }
}

impl From<Arc<Plugin>> for PluginSource {
    fn from(plugin: Arc<Plugin>) -> Self {
        Self::Plugin(plugin)
    }
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginSource::Builtin(name) => f.write_str(name),
            PluginSource::Path(path) => write!(f, "{}", path.display()),
            PluginSource::Plugin(plugin) => f.write_str(plugin.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_plugins() {
        let core = builtin("core").unwrap();
        assert!(core.macros().contains_key("define"));
        assert!(core.macros().contains_key("include"));
        assert!(core.libraries().is_empty());

        let common = builtin("common").unwrap();
        assert!(common.macros().is_empty());
        assert_eq!(common.libraries(), ["common"]);

        assert!(builtin("shell").is_none());
    }

    #[test]
    fn test_locate_builtin_and_missing() {
        assert!(matches!(
            PluginSource::locate("common", None),
            Ok(PluginSource::Builtin(name)) if name == "common"
        ));
        assert_eq!(
            PluginSource::locate("nope.toml", None).unwrap_err(),
            "nope.toml does not exist, and available builtins are common and core"
        );
    }

    #[test]
    fn test_locate_relative_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("plugin.toml"), "").unwrap();

        let source = PluginSource::locate("plugin.toml", Some(dir.path())).unwrap();
        assert!(matches!(&source, PluginSource::Path(path) if path.ends_with("plugin.toml")));
        assert!(source.id().starts_with("path:"));
    }

    #[test]
    fn test_plugin_identity() {
        let plugin = Arc::new(Plugin::new("mine"));
        let first = PluginSource::from(Arc::clone(&plugin));
        let second = PluginSource::from(plugin);
        assert_eq!(first.id(), second.id());
        assert_ne!(first.id(), PluginSource::from(Plugin::new("mine")).id());
        assert_eq!(first.to_string(), "mine");
    }
}
