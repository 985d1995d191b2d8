//! Macros that wrap a block of lines.

use quill_runtime::evaluator::{quote, render};
use quill_template::Delimiters;

use crate::{
    arguments::MacroArgs,
    context::GenerationContext,
    error::{GenerationErrorKind, Result},
    handler::Flow,
};

/// `%append name`: generate the children where `%bookmark name` is.
pub(super) fn append(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    redirect(ctx, args, "append")
}

/// `%assign name`: bind the children's output to `name` instead of writing it.
pub(super) fn assign(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    redirect(ctx, args, "assign")
}

fn redirect(ctx: &mut GenerationContext, args: &MacroArgs, directive: &str) -> Result<Flow> {
    let arguments = ctx.arguments(args)?;
    let name = ctx.required_name(directive, &arguments)?;
    let line = ctx.line()?;
    if !line.has_children() {
        return Err(ctx.error(GenerationErrorKind::MissingChildren {
            name: directive.to_string(),
        }));
    }
    let children = line.children().snapped(0);
    ctx.code_block(format!("with {directive}({}):", quote(&name)), |ctx| {
        ctx.generate_lines(&children)
    })
}

/// `%inline`: join the output of the block into one line.
pub(super) fn inline(ctx: &mut GenerationContext, _args: &MacroArgs) -> Result<Flow> {
    let (lines, flow) = ctx.block()?;
    let inner = ctx.code_block("with inline():", |ctx| ctx.generate_lines(&lines))?;
    Ok(flow.after(inner))
}

/// `%interpolate open close`: other delimiters for the block.
pub(super) fn interpolate(ctx: &mut GenerationContext, args: &MacroArgs) -> Result<Flow> {
    let pair = match args {
        MacroArgs::None => return Err(ctx.invalid_arguments("interpolate", "expects delimiters")),
        MacroArgs::Bare(text) => text.clone(),
        _ => {
            let arguments = ctx.arguments(args)?;
            let parts: Vec<String> = arguments.positional().iter().map(render).collect();
            parts.join(" ")
        }
    };
    let delimiters = Delimiters::parse(&pair)
        .map_err(|error| ctx.error(GenerationErrorKind::Template(error)))?;

    let (lines, flow) = ctx.block()?;
    let previous = ctx.set_delimiters(delimiters);
    let inner = ctx.generate_lines(&lines);
    ctx.set_delimiters(previous);
    Ok(flow.after(inner?))
}

/// `%raw`: the block's text as is.
pub(super) fn raw(ctx: &mut GenerationContext, _args: &MacroArgs) -> Result<Flow> {
    let (lines, flow) = ctx.block()?;
    for line in lines.flatten() {
        ctx.add_literal(line.indent(), line.content());
    }
    Ok(flow)
}
