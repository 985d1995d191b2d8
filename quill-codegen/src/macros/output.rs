//! Macros that emit single statements.

use quill_runtime::evaluator::{literal, quote, render};

use crate::{
    arguments::MacroArgs,
    context::GenerationContext,
    error::{GenerationErrorKind, Result},
    handler::Flow,
};

/// `%bookmark name`: a place `%append` blocks write to. Children are
/// generated at the bookmark, ahead of anything appended to it.
pub(super) fn bookmark(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    let arguments = ctx.arguments(args)?;
    let name = ctx.required_name("bookmark", &arguments)?;
    let indent = ctx.line()?.indent();
    let children = ctx.children()?;
    let flow = ctx.generate_lines(&children)?;
    ctx.add_code(format!("bookmark({}, {indent})", quote(&name)));
    Ok(flow)
}

/// `%emit text`: a text line whose text is interpolated at generation time
/// first.
pub(super) fn emit(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    let text = match args {
        MacroArgs::None => String::new(),
        MacroArgs::Bare(text) => ctx.meta_interpolate(text)?,
        _ => {
            let arguments = ctx.arguments(args)?;
            let parts: Vec<String> = arguments.positional().iter().map(render).collect();
            parts.join(" ")
        }
    };
    let line = ctx.line()?.clone();
    if text.is_empty() {
        ctx.add_literal(line.indent(), "");
    } else {
        ctx.add_text(line.indent(), &text)?;
    }
    ctx.generate_lines(line.children())
}

/// `%eval statement`: a code line built at generation time.
pub(super) fn eval(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    let Some(text) = args.raw() else {
        return Err(ctx.invalid_arguments("eval", "expects a statement"));
    };
    let statement = ctx.meta_interpolate(text)?;
    let line = ctx.line()?.with_content(format!("!{statement}"));
    ctx.generate_code(&line)
}

/// `%param name [default]`
pub(super) fn param(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    let arguments = ctx.arguments(args)?;
    let name = quote(&ctx.required_name("param", &arguments)?);
    if ctx.line()?.has_children() {
        return Err(ctx.error(GenerationErrorKind::UnexpectedChildren {
            name: "param".to_string(),
            condition: String::new(),
        }));
    }
    let default = match (arguments.get(1), arguments.keyword("default")) {
        (_, Some(default)) => Some(literal(default)),
        (Some(_), None) if arguments.is_bare() => arguments.string(1),
        (Some(default), None) => Some(literal(default)),
        (None, None) => None,
    };
    match default {
        Some(default) => ctx.add_code(format!("param({name}, {default})")),
        None => ctx.add_code(format!("param({name})")),
    };
    Ok(Flow::Continue)
}

/// `%stop`
pub(super) fn stop(_ctx: &mut GenerationContext, _args: &MacroArgs) -> Result<Flow> {
    Ok(Flow::Stop)
}

/// `%strip token`: drop a trailing `token` from the output so far.
pub(super) fn strip(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    let token = match args {
        MacroArgs::Bare(text) => text.clone(),
        _ => ctx.arguments(args)?.string(0).unwrap_or_default(),
    };
    if token.is_empty() {
        return Err(ctx.invalid_arguments("strip", "expects a token"));
    }
    ctx.add_code(format!("strip({})", quote(&token)));
    Ok(Flow::Continue)
}
