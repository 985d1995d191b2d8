//! Template parsing for quill.
//!
//! A template is indentation-structured text. This crate turns it into a
//! tree of [`Line`]s and splits line content into literal and expression
//! [`Segment`]s. It knows nothing about what the lines mean; that is the
//! business of `quill-codegen`.

mod error;
mod interpolate;
mod lines;
mod template;

pub use error::{Error, Result, SourceContext};
pub use interpolate::{Delimiters, Interpolation, Segment, interpolate};
pub use lines::{Line, Lines};
pub use template::Template;
