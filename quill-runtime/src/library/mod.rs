//! Builtin runtime libraries.
//!
//! A library is a named set of helpers that generated code can pull in with
//! `load("name")`, so standalone code doesn't depend on the plugin that
//! needed the helpers at generation time.

mod common;

use crate::evaluator::Helper;

/// A named set of runtime helpers.
pub struct Library {
    name: &'static str,
    helpers: fn() -> Vec<(&'static str, Helper)>,
}

impl Library {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn helpers(&self) -> Vec<(&'static str, Helper)> {
        (self.helpers)()
    }
}

static LIBRARIES: &[Library] = &[Library {
    name: "common",
    helpers: common::helpers,
}];

/// Look up a builtin library by name.
pub fn builtin(name: &str) -> Option<&'static Library> {
    LIBRARIES.iter().find(|library| library.name == name)
}

/// Names of all builtin libraries.
pub fn names() -> impl Iterator<Item = &'static str> {
    LIBRARIES.iter().map(Library::name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin() {
        assert!(builtin("common").is_some());
        assert!(builtin("missing").is_none());
        assert_eq!(names().collect::<Vec<_>>(), ["common"]);
    }
}
