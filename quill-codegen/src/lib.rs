//! Generation engine for quill templates.
//!
//! A template is compiled line by line into [`Code`](quill_runtime::Code):
//! text lines become `emit` calls, `!` lines are copied as code, and `%`
//! lines dispatch to macros. The code is then executed by `quill-runtime`.
//!
//! # Module Organization
//!
//! - [`api`] - Entry points ([`generate`], [`execute`], [`render`], standalone mode)
//! - [`context`] - [`GenerationContext`], the state of one generation
//! - [`handler`] - Line handler registry ([`LineHandlers`], [`Flow`])
//! - [`arguments`] - Macro invocation grammar and argument values
//! - [`plugin`] - In-memory, builtin and TOML manifest plugins
//! - [`diagnostic`] - Non-fatal notes collected while generating
//!
//! ```
//! use quill_codegen::{Context, render};
//!
//! let context = Context::new().with("n", 3);
//! let output = render("!for i in range(n):\n    line {i}", &context).unwrap();
//! assert_eq!(output, "line 0\nline 1\nline 2");
//! ```

pub mod api;
pub mod arguments;
pub mod context;
pub mod diagnostic;
mod error;
pub mod handler;
mod macros;
pub mod plugin;

pub use api::{
    Context, TemplateSource, execute, execute_code, execute_standalone, generate,
    generate_standalone, render,
};
pub use arguments::{Arguments, MacroArgs};
pub use context::{Definition, GenerationContext, MacroFn, RuntimeSupport, State};
pub use diagnostic::{Diagnostic, Severity};
pub use error::{Error, GenerationError, GenerationErrorKind, Result};
pub use handler::{Flow, HandlerFn, LineHandler, LineHandlers};
pub use plugin::{Hook, Plugin, PluginSource, builtin};
