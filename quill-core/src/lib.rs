//! Core utilities shared across the quill crates.
//!
//! This crate has no knowledge of templates or generated code. It provides
//! the small building blocks the other crates agree on:
//!
//! - [`Origin`]: the host-program location a generation or execution was
//!   requested from.
//! - Argument splitting helpers used both for macro arguments and for the
//!   directive calls of generated code.
//! - String helpers for diagnostics and the `common` runtime library.

mod args;
mod origin;
mod utils;

pub use args::{split_arguments, split_keyword, split_words};
pub use origin::Origin;
pub use utils::{
    and_list, is_identifier, or_list, to_camel_case, to_kebab_case, to_pascal_case,
    to_snake_case,
};
