//! Plugins loaded from manifests and built in memory.

use std::{fs, sync::Arc};

use quill_codegen::{
    Context, Error, Flow, LineHandler, Plugin, PluginSource, execute, generate, render,
};
use quill_runtime::{Value, minijinja};

#[test]
fn test_manifest_plugin() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("greet.toml"),
        r#"
load = ["common"]

[macros.greet]
params = ["name"]
template = "hello {name}, {{snake_case(who)}}"
"#,
    )
    .unwrap();
    let template = dir.path().join("page.txt");
    fs::write(&template, "%load greet.toml\n%greet World\nitems:\n    %greet: 'nested'").unwrap();

    let context = Context::new().with("who", "BigFriend");
    let output = execute(template.as_path(), &context).unwrap();
    insta::assert_snapshot!(output, @r"
    hello World, big_friend
    items:
        hello nested, big_friend
    ");
}

#[test]
fn test_manifest_macro_requires_params() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("greet.toml"),
        "[macros.greet]\nparams = [\"name\"]\ntemplate = \"hello {name}\"\n",
    )
    .unwrap();
    let template = dir.path().join("page.txt");
    fs::write(&template, "%load greet.toml\n%greet").unwrap();

    let error = execute(template.as_path(), &Context::new()).unwrap_err();
    let Error::Generation(error) = error else {
        panic!("expected a generation error, got {error:?}");
    };
    assert_eq!(error.kind().to_string(), "%greet macro on line 2 expects argument 'name'");
}

#[test]
fn test_manifest_delimiters() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("angle.toml"), "interpolate = \"<% %>\"\n").unwrap();
    let template = dir.path().join("page.txt");
    fs::write(&template, "%load angle.toml\n{literal} <%value%>").unwrap();

    let code = generate(template.as_path(), &Context::new()).unwrap();
    assert_eq!(code.to_string(), "emit(0, \"{literal} \", value)");
}

#[test]
fn test_plugin_macro_and_handler() {
    let plugin = Plugin::new("markup")
        .with_macro("rule", |ctx, _args| {
            let indent = ctx.line()?.indent();
            ctx.add_literal(indent, "----");
            Ok(Flow::Continue)
        })
        .with_handler(
            "#",
            LineHandler::custom(|ctx, line| {
                let title = line.content().trim_start_matches('#').trim();
                ctx.add_text(line.indent(), &format!("<h1>{title}</h1>"))?;
                Ok(Flow::Continue)
            }),
        );
    let context = Context::new().with_plugin(plugin).with("name", "quill");
    let output = render("# {name}\n%rule\nbody", &context).unwrap();
    insta::assert_snapshot!(output, @r"
    <h1>quill</h1>
    ----
    body
    ");
}

#[test]
fn test_plugin_helpers_at_generation_and_run_time() {
    let double: quill_runtime::Helper = Arc::new(|args: &[Value]| match args {
        [value] => Ok(Value::from(value.as_i64().unwrap_or_default() * 2)),
        _ => Err(minijinja::Error::new(
            minijinja::ErrorKind::InvalidOperation,
            "double expects one argument",
        )),
    });
    let plugin = Plugin::new("math").with_helper("double", double);
    let context = Context::new().with_plugin(plugin).with("n", 4);
    assert_eq!(render("%emit {double(2)} {{double(n)}}", &context).unwrap(), "4 8");
}

#[test]
fn test_plugin_load_hook_runs_once() {
    let plugin = Arc::new(Plugin::new("banner").on_load(|ctx| {
        ctx.add_literal(0, "generated by quill");
        Ok(())
    }));
    let context = Context::new()
        .with_plugin(PluginSource::from(Arc::clone(&plugin)))
        .with_plugin(PluginSource::from(plugin));
    assert_eq!(render("body", &context).unwrap(), "generated by quill\nbody");
}

#[test]
fn test_include_with_plugin() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("shout.toml"),
        "[macros.shout]\nparams = [\"text\"]\ntemplate = \"{text|upper}!\"\n",
    )
    .unwrap();
    fs::write(dir.path().join("part.txt"), "%shout hey").unwrap();
    let template = dir.path().join("page.txt");
    fs::write(&template, "%include part.txt load=\"shout.toml\"\n%shout again").unwrap();

    let error = execute(template.as_path(), &Context::new()).unwrap_err();
    let Error::Generation(error) = error else {
        panic!("expected a generation error, got {error:?}");
    };
    assert!(error.kind().to_string().starts_with("unknown macro 'shout' on line 2"));

    fs::write(&template, "%include part.txt load=\"shout.toml\"").unwrap();
    assert_eq!(execute(template.as_path(), &Context::new()).unwrap(), "HEY!");
}

#[test]
fn test_unknown_plugin() {
    let error = render("%load missing.toml", &Context::new()).unwrap_err();
    let message = error.to_string();
    assert!(message.starts_with("failed to generate template at "), "{message}");
    assert!(
        message.ends_with(
            "could not load 'missing.toml' (missing.toml does not exist, and available builtins are common and core)"
        ),
        "{message}"
    );

    let context = Context::new().with_plugin(PluginSource::Path("missing.toml".into()));
    let error = render("a", &context).unwrap_err();
    assert!(error.to_string().contains("could not load"), "{error}");
}
