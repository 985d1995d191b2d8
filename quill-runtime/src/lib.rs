//! Generated code and the runtime that executes it.
//!
//! # Module Organization
//!
//! - [`code`]: [`Code`] / [`CodeLine`] and their serialized form
//! - [`evaluator`]: expression evaluation over a namespace
//! - [`library`]: builtin runtime libraries loadable with `load("name")`
//! - `runtime`: the statement interpreter and output assembly
//!
//! Generated code is a small indentation-based statement language (`for`,
//! `if`/`elif`/`else`, `while`, assignments, and directive calls such as
//! `emit`) whose expressions are evaluated by minijinja.

pub mod code;
mod error;
pub mod evaluator;
pub mod library;
mod output;
mod runtime;
mod script;
mod standalone;

pub use code::{Code, CodeLine, ContextId, Excerpt, Provenance};
pub use error::{ErrorKind, ExecutionError, Frame, Result};
pub use evaluator::{EvaluationError, Evaluator, Helper};
pub use minijinja::{self, Value};
pub use runtime::{Command, CommandError, Runtime};
pub use standalone::execute_standalone;
