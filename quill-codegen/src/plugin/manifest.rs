//! TOML plugin manifests.
//!
//! ```toml
//! load = ["common"]
//! interpolate = "<% %>"
//!
//! [macros.greet]
//! params = ["name"]
//! template = "hello <%name%>"
//! ```

use std::{collections::BTreeMap, fs, path::Path, sync::Arc};

use quill_template::{Delimiters, Template};
use serde::Deserialize;

use super::{Plugin, PluginSource};
use crate::{
    arguments::MacroArgs,
    context::GenerationContext,
    error::{GenerationErrorKind, Result},
    handler::Flow,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    name: Option<String>,
    #[serde(default)]
    load: Vec<String>,
    interpolate: Option<String>,
    #[serde(default)]
    macros: BTreeMap<String, MacroManifest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MacroManifest {
    #[serde(default)]
    params: Vec<String>,
    template: String,
}

/// Read the manifest at `path`.
pub fn load_manifest(path: &Path) -> std::result::Result<Plugin, String> {
    let text = fs::read_to_string(path)
        .map_err(|error| format!("unable to read {}: {error}", path.display()))?;
    tracing::debug!(path = %path.display(), "read plugin manifest");
    parse_manifest(&text, path)
}

/// Build a plugin from manifest text; `path` names the plugin and anchors
/// relative `load` entries.
pub fn parse_manifest(text: &str, path: &Path) -> std::result::Result<Plugin, String> {
    let manifest: Manifest =
        toml::from_str(text).map_err(|error| format!("invalid manifest: {}", error.message()))?;

    let name = manifest.name.unwrap_or_else(|| {
        path.file_stem()
            .map_or_else(|| path.display().to_string(), |stem| stem.to_string_lossy().into_owned())
    });
    let mut plugin = Plugin::new(name);

    for target in &manifest.load {
        plugin = plugin.with_dependency(PluginSource::locate(target, path.parent())?);
    }
    if let Some(pair) = &manifest.interpolate {
        let delimiters = Delimiters::parse(pair).map_err(|error| error.to_string())?;
        plugin = plugin.with_delimiters(delimiters);
    }
    for (name, definition) in manifest.macros {
        let function = template_macro(name.clone(), definition);
        plugin = plugin.with_macro(&name, function);
    }
    Ok(plugin)
}

/// A macro that binds its parameters in the meta namespace, then generates
/// its meta-interpolated template in place.
fn template_macro(
    name: String,
    definition: MacroManifest,
) -> impl Fn(&mut GenerationContext, &MacroArgs) -> Result<Flow> + Send + Sync + 'static {
    move |ctx, args| {
        let arguments = ctx.arguments(args)?;
        let mut bound = Vec::with_capacity(definition.params.len());
        for (index, param) in definition.params.iter().enumerate() {
            let value = arguments
                .keyword(param)
                .or_else(|| arguments.get(index))
                .cloned()
                .ok_or_else(|| {
                    ctx.invalid_arguments(&name, format!("expects argument '{param}'"))
                })?;
            bound.push((param.clone(), value));
        }

        let previous: Vec<_> = bound
            .iter()
            .map(|(param, _)| (param.clone(), ctx.meta().get(param).cloned()))
            .collect();
        for (param, value) in bound {
            ctx.meta_mut().set(param, value);
        }

        let result = expand(ctx, &definition.template);

        for (param, value) in previous {
            match value {
                Some(value) => ctx.meta_mut().set(param, value),
                None => {
                    ctx.meta_mut().remove(&param);
                }
            }
        }
        result
    }
}

fn expand(ctx: &mut GenerationContext, template: &str) -> Result<Flow> {
    let text = ctx.meta_interpolate(template)?;
    let template = Template::parse(&text)
        .map_err(|error| ctx.error(GenerationErrorKind::Template(error)))?;
    let indent = ctx.line()?.indent();
    ctx.generate_in_place(Arc::new(template), indent)
}
