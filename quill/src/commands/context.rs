use std::{fs, path::PathBuf};

use clap::Args;
use eyre::{Result, WrapErr, bail, eyre};
use quill_codegen::{Context, PluginSource};
use quill_runtime::Value;

/// Prefix of variables that go to the generation-time namespace.
const META_PREFIX: &str = "g_";

/// Context options shared by all subcommands.
#[derive(Args, Debug, Default)]
pub struct ContextArgs {
    /// Variables as <key>=<value>; values are parsed as JSON, or taken as strings
    #[arg(value_name = "KEY=VALUE")]
    pub variables: Vec<String>,

    /// JSON file with an object of variables
    #[arg(short, long = "context", value_name = "FILE")]
    pub context_files: Vec<PathBuf>,

    /// Plugin to load first: a builtin name or a manifest path
    #[arg(short, long = "plugin", value_name = "PLUGIN")]
    pub plugins: Vec<String>,
}

impl ContextArgs {
    /// Build the context. Files are read first so that arguments override them.
    pub fn build(&self) -> Result<Context> {
        let mut context = Context::new();
        for path in &self.context_files {
            let text = fs::read_to_string(path)
                .wrap_err_with(|| format!("Failed to read context file {}", path.display()))?;
            let values: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text)
                .wrap_err_with(|| format!("Invalid context file {}", path.display()))?;
            for (key, value) in values {
                insert(&mut context, &key, Value::from_serialize(&value));
            }
        }
        for argument in &self.variables {
            let (key, value) = parse_variable(argument)?;
            insert(&mut context, key, value);
        }
        for plugin in &self.plugins {
            let source = PluginSource::locate(plugin, None)
                .map_err(|reason| eyre!("could not load '{plugin}' ({reason})"))?;
            context.add_plugin(source);
        }
        Ok(context)
    }
}

/// Split `key=value`, parsing the value as JSON when possible.
pub fn parse_variable(argument: &str) -> Result<(&str, Value)> {
    let Some((key, value)) = argument.split_once('=').filter(|(key, _)| !key.is_empty()) else {
        bail!("invalid argument: {argument} (expected <key>=<value>)");
    };
    let value = match serde_json::from_str::<serde_json::Value>(value) {
        Ok(json) => Value::from_serialize(&json),
        Err(_) => Value::from(value),
    };
    Ok((key, value))
}

fn insert(context: &mut Context, key: &str, value: Value) {
    match key.strip_prefix(META_PREFIX) {
        Some(name) => context.set_meta(name, value),
        None => context.set(key, value),
    }
}
