//! Macro invocation syntax.
//!
//! A macro line is one of
//!
//! - `%name` without arguments,
//! - `%name argument text`, passed raw to the macro,
//! - `%name: a b key=value`, whitespace separated expressions,
//! - `%name:: a, b, key=value`, a call-style argument list.

use indexmap::IndexMap;
use quill_runtime::Value;

/// The arguments of a macro line, before evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroArgs {
    None,
    Bare(String),
    Words(String),
    Call(String),
}

impl MacroArgs {
    /// The argument text as written.
    pub fn raw(&self) -> Option<&str> {
        match self {
            MacroArgs::None => None,
            MacroArgs::Bare(text) | MacroArgs::Words(text) | MacroArgs::Call(text) => Some(text),
        }
    }
}

/// Split the content of a macro line (without the `%`) into the macro name
/// and its arguments. Returns `None` for malformed invocations.
pub fn parse_invocation(body: &str) -> Option<(&str, MacroArgs)> {
    let end = body
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(body.len());
    let (name, rest) = body.split_at(end);
    if name.is_empty() {
        return None;
    }

    let args = if rest.is_empty() {
        MacroArgs::None
    } else if let Some(call) = rest.strip_prefix(":: ") {
        MacroArgs::Call(call.trim().to_string())
    } else if let Some(words) = rest.strip_prefix(": ") {
        MacroArgs::Words(words.trim().to_string())
    } else if let Some(bare) = rest.strip_prefix(' ') {
        MacroArgs::Bare(bare.trim().to_string())
    } else {
        return None;
    };
    Some((name, args))
}

/// Evaluated macro arguments.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    pub(crate) positional: Vec<Value>,
    pub(crate) keywords: IndexMap<String, Value>,
    pub(crate) bare: bool,
}

impl Arguments {
    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords.get(name)
    }

    pub fn keywords(&self) -> &IndexMap<String, Value> {
        &self.keywords
    }

    /// Whether positional arguments are raw words rather than evaluated
    /// expressions.
    pub fn is_bare(&self) -> bool {
        self.bare
    }

    /// Positional argument `index` as a string.
    pub fn string(&self, index: usize) -> Option<String> {
        self.get(index).map(|value| match value.as_str() {
            Some(text) => text.to_string(),
            None => value.to_string(),
        })
    }

    /// The truthiness of keyword `name`, or `default` if it wasn't given.
    pub fn flag(&self, name: &str, default: bool) -> bool {
        self.keyword(name).map_or(default, Value::is_true)
    }
}
