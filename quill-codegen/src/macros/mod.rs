//! The builtin macro library, loaded into every context as the `core`
//! plugin.

mod blocks;
mod composition;
mod output;

use std::sync::Arc;

use crate::{
    arguments::MacroArgs,
    context::{GenerationContext, MacroFn},
    error::Result,
    handler::Flow,
};

type Builtin = fn(&mut GenerationContext, &MacroArgs) -> Result<Flow>;

const BUILTINS: &[(&str, Builtin)] = &[
    ("append", blocks::append),
    ("assign", blocks::assign),
    ("bookmark", output::bookmark),
    ("define", composition::define),
    ("emit", output::emit),
    ("eval", output::eval),
    ("extend", composition::extend),
    ("ifdef", composition::ifdef),
    ("ifndef", composition::ifndef),
    ("include", composition::include),
    ("inline", blocks::inline),
    ("insert", composition::insert),
    ("interpolate", blocks::interpolate),
    ("load", composition::load),
    ("param", output::param),
    ("raw", blocks::raw),
    ("stop", output::stop),
    ("strip", output::strip),
];

pub(crate) fn core() -> Vec<(&'static str, MacroFn)> {
    BUILTINS
        .iter()
        .map(|&(name, function)| (name, Arc::new(function) as MacroFn))
        .collect()
}
