//! Line handlers: how each template line is turned into code.
//!
//! A handler is picked by the longest registered prefix of the line's
//! content. The empty key is the fallback for lines no prefix matches.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use quill_core::and_list;
use quill_template::Line;

use crate::{context::GenerationContext, error::Result};

/// A plugin-provided line handler.
pub type HandlerFn = Arc<dyn Fn(&mut GenerationContext, &Line) -> Result<Flow> + Send + Sync>;

/// What generation does after a line has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Go on with the next sibling.
    Continue,
    /// The handler generated the remaining siblings itself.
    Consumed,
    /// Stop generating the current template.
    Stop,
}

impl Flow {
    /// This flow, unless the lines generated on the way stopped.
    pub fn after(self, inner: Flow) -> Flow {
        if inner == Flow::Stop { Flow::Stop } else { self }
    }
}

#[derive(Clone)]
pub enum LineHandler {
    /// `!statement` lines and `!` verbatim blocks.
    Code,
    /// `%macro` lines.
    Macro,
    /// Plain text, interpolated into an `emit` call.
    Text,
    Custom(HandlerFn),
}

impl LineHandler {
    pub fn custom<F>(handler: F) -> Self
    where
        F: Fn(&mut GenerationContext, &Line) -> Result<Flow> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(handler))
    }

    fn describe(&self) -> &'static str {
        match self {
            LineHandler::Code => "code",
            LineHandler::Macro => "macro",
            LineHandler::Text => "text",
            LineHandler::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for LineHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// The ordered, mutable registry of line handlers.
#[derive(Debug, Clone)]
pub struct LineHandlers {
    handlers: IndexMap<String, LineHandler>,
}

impl Default for LineHandlers {
    fn default() -> Self {
        let mut handlers = Self::empty();
        handlers.register("!", LineHandler::Code);
        handlers.register("%", LineHandler::Macro);
        handlers.register("", LineHandler::Text);
        handlers
    }
}

impl LineHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry without any handler, not even the text fallback.
    pub fn empty() -> Self {
        Self {
            handlers: IndexMap::new(),
        }
    }

    /// Register `handler` for lines starting with `prefix`, returning the
    /// handler it replaces.
    pub fn register(
        &mut self,
        prefix: impl Into<String>,
        handler: LineHandler,
    ) -> Option<LineHandler> {
        self.handlers.insert(prefix.into(), handler)
    }

    pub fn remove(&mut self, prefix: &str) -> Option<LineHandler> {
        self.handlers.shift_remove(prefix)
    }

    pub fn get(&self, prefix: &str) -> Option<&LineHandler> {
        self.handlers.get(prefix)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// The handler for a line with `content`.
    pub fn resolve(&self, content: &str) -> Option<&LineHandler> {
        self.handlers
            .iter()
            .filter(|(prefix, _)| !prefix.is_empty() && content.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, handler)| handler)
            .or_else(|| self.handlers.get(""))
    }

    /// The prefixed handlers, as reported when no handler applies.
    pub fn considered(&self) -> String {
        and_list(
            self.handlers
                .iter()
                .filter(|(prefix, _)| !prefix.is_empty())
                .map(|(prefix, handler)| format!("{} ({prefix})", handler.describe())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handlers() {
        let handlers = LineHandlers::new();
        assert!(matches!(handlers.resolve("!x = 1"), Some(LineHandler::Code)));
        assert!(matches!(handlers.resolve("%define x"), Some(LineHandler::Macro)));
        assert!(matches!(handlers.resolve("line {i}"), Some(LineHandler::Text)));
        assert_eq!(handlers.considered(), "code (!) and macro (%)");
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut handlers = LineHandlers::new();
        handlers.register("!!", LineHandler::Text);
        assert!(matches!(handlers.resolve("!!x"), Some(LineHandler::Text)));
        assert!(matches!(handlers.resolve("!x"), Some(LineHandler::Code)));
    }

    #[test]
    fn test_without_fallback() {
        let mut handlers = LineHandlers::new();
        handlers.remove("");
        assert!(handlers.resolve("line").is_none());
        assert_eq!(handlers.prefixes().collect::<Vec<_>>(), ["!", "%"]);

        let handlers = LineHandlers::empty();
        assert_eq!(handlers.considered(), "<none>");
    }

    #[test]
    fn test_flow_after() {
        assert_eq!(Flow::Consumed.after(Flow::Continue), Flow::Consumed);
        assert_eq!(Flow::Continue.after(Flow::Stop), Flow::Stop);
    }
}
