//! Macros composing templates: definitions, inheritance, inclusion and
//! plugin loading.

use quill_core::and_list;
use quill_runtime::Value;

use crate::{
    arguments::MacroArgs,
    context::GenerationContext,
    error::{GenerationErrorKind, Result},
    handler::Flow,
};

/// `%define name`: remember the children for `%insert name`.
pub(super) fn define(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    let arguments = ctx.arguments(args)?;
    let name = ctx.required_name("define", &arguments)?;
    let lines = ctx.line()?.children().clone();
    ctx.define(name, lines);
    Ok(Flow::Continue)
}

/// `%insert name [required=False]`: generate a definition, or the children
/// when there is none.
pub(super) fn insert(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    let arguments = ctx.arguments(args)?;
    let name = ctx.required_name("insert", &arguments)?;
    let required = arguments.flag("required", false);
    let line = ctx.line()?.clone();
    if required && line.has_children() {
        return Err(ctx.error(GenerationErrorKind::UnexpectedChildren {
            name: "insert".to_string(),
            condition: " when required=True".to_string(),
        }));
    }

    if let Some(definition) = ctx.definition(&name).cloned() {
        return ctx.generate_definition(&definition, line.indent());
    }
    if required {
        return Err(ctx.error(GenerationErrorKind::MissingDefinition {
            name,
            line: line.number(),
            available: and_list(ctx.definition_names()),
        }));
    }
    let children = ctx.children()?;
    ctx.generate_lines(&children)
}

pub(super) fn ifdef(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    conditional(ctx, args, "ifdef", true)
}

pub(super) fn ifndef(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    conditional(ctx, args, "ifndef", false)
}

fn conditional(
    ctx: &mut GenerationContext,
    args: &MacroArgs,
    macro_name: &str,
    defined: bool,
) -> Result<Flow> {
    let arguments = ctx.arguments(args)?;
    let name = ctx.required_name(macro_name, &arguments)?;
    if !ctx.line()?.has_children() {
        return Err(ctx.error(GenerationErrorKind::MissingChildren {
            name: macro_name.to_string(),
        }));
    }
    if ctx.definition(&name).is_some() != defined {
        return Ok(Flow::Continue);
    }
    let children = ctx.children()?;
    ctx.generate_lines(&children)
}

/// `%extend base`: generate `base` with the definitions of this template.
///
/// With children, only the children are scanned for definitions. Without,
/// the remaining siblings are, and everything this template generated is
/// replaced by the base.
pub(super) fn extend(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    let arguments = ctx.arguments(args)?;
    let target = ctx.required_name("extend", &arguments)?;
    let base = ctx.resolve_template(&target)?;
    let line = ctx.line()?.clone();

    if line.has_children() {
        let mark = ctx.code().len();
        let children = ctx.children()?;
        ctx.generate_lines(&children)?;
        ctx.truncate_code(mark);
        ctx.generate_extension(base, line.indent())?;
        return Ok(Flow::Continue);
    }

    let start = ctx.start();
    ctx.truncate_code(start);
    let remaining = ctx.remaining()?;
    ctx.generate_lines(&remaining)?;
    ctx.truncate_code(start);
    ctx.generate_extension(base, line.indent())?;
    Ok(Flow::Stop)
}

/// `%include target [load=] [generate=True] [interpolate=True]
/// [continue_generation=False]`
pub(super) fn include(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    let arguments = ctx.arguments(args)?;
    let target = ctx.required_name("include", &arguments)?;
    let line = ctx.line()?.clone();
    if line.has_children() {
        return Err(ctx.error(GenerationErrorKind::UnexpectedChildren {
            name: "include".to_string(),
            condition: String::new(),
        }));
    }
    let plugin = match arguments.keyword("load") {
        Some(source) => Some(ctx.locate_plugin(&string(source))?),
        None => None,
    };
    let template = ctx.resolve_template(&target)?;

    if !arguments.flag("generate", true) {
        let interpolate = arguments.flag("interpolate", true);
        let lines = template.lines().snapped(line.indent());
        for included in lines.flatten() {
            if interpolate && !included.is_blank() {
                ctx.add_text(included.indent(), included.content())?;
            } else {
                ctx.add_literal(included.indent(), included.content());
            }
        }
        return Ok(Flow::Continue);
    }

    if arguments.flag("continue_generation", false) {
        if let Some(plugin) = plugin {
            ctx.load(plugin)?;
        }
        let tolerant = ctx.set_tolerant(true);
        let result = ctx.generate_in_place(template, line.indent());
        ctx.set_tolerant(tolerant);
        return result;
    }

    ctx.generate_included(template, line.indent(), plugin)?;
    Ok(Flow::Continue)
}

/// `%load source`: a builtin plugin or a plugin manifest.
pub(super) fn load(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    let arguments = ctx.arguments(args)?;
    let target = ctx.required_name("load", &arguments)?;
    ctx.load_named(&target)?;
    Ok(Flow::Continue)
}

fn string(value: &Value) -> String {
    match value.as_str() {
        Some(text) => text.to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use quill_core::Origin;
    use quill_template::Template;

    use super::*;
    use crate::error::GenerationError;

    fn context(text: &str) -> GenerationContext {
        let template = Arc::new(Template::parse(text).unwrap());
        GenerationContext::new(template, Origin::new("test.rs", 1))
    }

    fn generate(text: &str) -> std::result::Result<String, Box<GenerationError>> {
        let mut ctx = context(text);
        ctx.generate()?;
        Ok(ctx.into_code().to_string())
    }

    #[test]
    fn test_define_and_insert() {
        assert_eq!(
            generate("%define greeting\n    hello {name}\nbody:\n    %insert greeting").unwrap(),
            "emit(0, \"body:\")\nemit(4, \"hello \", name)"
        );
    }

    #[test]
    fn test_insert_default_children() {
        assert_eq!(
            generate("%insert missing\n    fallback").unwrap(),
            "emit(0, \"fallback\")"
        );
    }

    #[test]
    fn test_insert_required() {
        let error = generate("%define a\n%define b\n%insert block required=True").unwrap_err();
        assert_eq!(
            error.kind().to_string(),
            "missing required definition 'block' on line 3 (available definitions are a and b)"
        );

        let error = generate("%insert block required=True\n    x").unwrap_err();
        assert_eq!(
            error.kind().to_string(),
            "%insert macro must not have children when required=True"
        );
    }

    #[test]
    fn test_ifdef_and_ifndef() {
        assert_eq!(
            generate("%define a\n%ifdef a\n    yes\n%ifndef a\n    no").unwrap(),
            "emit(0, \"yes\")"
        );
        let error = generate("%ifdef a").unwrap_err();
        assert_eq!(error.kind().to_string(), "%ifdef macro must have children");
    }

    #[test]
    fn test_definition_lines_keep_their_context() {
        let mut ctx = context("%define a\n    !x = 1\n%insert a");
        ctx.generate().unwrap();
        let code = ctx.into_code();
        assert_eq!(code.to_string(), "x = 1");
        assert_eq!(code.lines()[0].template_line, 2);
    }

    #[test]
    fn test_extend_without_children() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("base.txt"),
            "<html>\n    %insert body required=True\n</html>",
        )
        .unwrap();
        fs::write(
            dir.path().join("page.txt"),
            "dropped\n%extend base.txt\n%define body\n    <p>{text}</p>\nalso dropped",
        )
        .unwrap();

        let template = Arc::new(Template::open(dir.path().join("page.txt")).unwrap());
        let mut ctx = GenerationContext::new(template, Origin::new("test.rs", 1));
        ctx.generate().unwrap();
        assert_eq!(
            ctx.into_code().to_string(),
            "emit(0, \"<html>\")\nemit(4, \"<p>\", text, \"</p>\")\nemit(0, \"</html>\")"
        );
    }

    #[test]
    fn test_extend_with_children() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("base.txt"), "[%insert body]\n%insert body").unwrap();
        fs::write(
            dir.path().join("page.txt"),
            "before\n%extend base.txt\n    %define body\n        b\nafter",
        )
        .unwrap();

        let template = Arc::new(Template::open(dir.path().join("page.txt")).unwrap());
        let mut ctx = GenerationContext::new(template, Origin::new("test.rs", 1));
        ctx.generate().unwrap();
        assert_eq!(
            ctx.into_code().to_string(),
            "emit(0, \"before\")\nemit(0, \"[%insert body]\")\nemit(0, \"b\")\nemit(0, \"after\")"
        );
    }

    #[test]
    fn test_extend_missing_definition_names_base() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("base.txt"), "%insert body required=True").unwrap();
        fs::write(dir.path().join("page.txt"), "%extend base.txt\n%define head").unwrap();

        let template = Arc::new(Template::open(dir.path().join("page.txt")).unwrap());
        let mut ctx = GenerationContext::new(template, Origin::new("test.rs", 1));
        let error = ctx.generate().unwrap_err();
        assert!(error.context().contains("base.txt at "), "{error}");
        assert!(error.context().ends_with("page.txt:1"), "{error}");
        assert_eq!(
            error.kind().to_string(),
            "missing required definition 'body' on line 1 (available definitions are head)"
        );
    }

    #[test]
    fn test_include_generated() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("item.txt"), "- {item}").unwrap();
        fs::write(
            dir.path().join("list.txt"),
            "!for item in items:\n    %include item.txt",
        )
        .unwrap();

        let template = Arc::new(Template::open(dir.path().join("list.txt")).unwrap());
        let mut ctx = GenerationContext::new(template, Origin::new("test.rs", 1));
        ctx.generate().unwrap();
        let code = ctx.into_code();
        assert_eq!(code.to_string(), "for item in items:\n    emit(0, \"- \", item)");
        assert_eq!(code.contexts().len(), 2);
    }

    #[test]
    fn test_include_text_without_generation() {
        assert_eq!(
            generate("%include:: '%stop\\n{x}', generate=False").unwrap(),
            "emit(0, \"%stop\")\nemit(0, x)"
        );
        assert_eq!(
            generate("%include:: '{x}', generate=False, interpolate=False").unwrap(),
            "emit(0, \"{x}\")"
        );
    }

    #[test]
    fn test_include_rejects_children() {
        let error = generate("%include x\n    y").unwrap_err();
        assert_eq!(error.kind().to_string(), "%include macro must not have children");
    }

    #[test]
    fn test_include_continue_generation() {
        let mut ctx = context("%include:: 'a\\n%hello\\nb', continue_generation=True\nc");
        ctx.generate().unwrap();
        assert_eq!(ctx.diagnostics().len(), 1);
        assert!(ctx.diagnostics()[0].message.starts_with("unknown macro 'hello' on line 2"));
        assert_eq!(
            ctx.into_code().to_string(),
            "emit(0, \"a\")\nemit(0, \"b\")\nemit(0, \"c\")"
        );

        let error = generate("%include:: 'a\\n%hello'").unwrap_err();
        assert!(error.kind().to_string().starts_with("unknown macro 'hello' on line 2"));
    }

    #[test]
    fn test_extend_inside_continued_include_keeps_includer_code() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("base.txt"), "[%insert body]\n%insert body").unwrap();
        fs::write(dir.path().join("page.txt"), "%extend base.txt\n%define body\n    B").unwrap();
        fs::write(
            dir.path().join("main.txt"),
            "keep me 1\nkeep me 2\n%include:: 'page.txt', continue_generation=True\nafter",
        )
        .unwrap();

        let template = Arc::new(Template::open(dir.path().join("main.txt")).unwrap());
        let mut ctx = GenerationContext::new(template, Origin::new("test.rs", 1));
        ctx.generate().unwrap();
        assert_eq!(
            ctx.into_code().to_string(),
            "emit(0, \"keep me 1\")\nemit(0, \"keep me 2\")\nemit(0, \"[%insert body]\")\nemit(0, \"B\")\nemit(0, \"after\")"
        );
    }

    #[test]
    fn test_load_unknown() {
        let error = generate("%load nope").unwrap_err();
        assert_eq!(
            error.kind().to_string(),
            "could not load 'nope' (nope does not exist, and available builtins are common and core)"
        );
    }

    #[test]
    fn test_load_common_is_idempotent() {
        let mut ctx = context("%load common\n%load common\n%emit {snake_case('HelloWorld')}");
        ctx.generate().unwrap();
        assert_eq!(ctx.diagnostics().len(), 1);
        let code = ctx.into_code();
        assert_eq!(code.intro(), ["load(\"common\")"]);
        assert_eq!(code.to_string(), "load(\"common\")\nemit(0, \"hello_world\")");
    }
}
