use std::{fmt, panic::Location};

use serde::{Deserialize, Serialize};

/// Where a generation or execution was requested from.
///
/// Entry points capture the host call site with [`Origin::caller`]. Contexts
/// derived while generating another template (`%extend`, `%include`) record
/// the template line that triggered them and keep the parent origin, so a
/// diagnostic can walk the whole chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    path: String,
    line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<Box<Origin>>,
}

impl Origin {
    pub fn new(path: impl Into<String>, line: usize) -> Self {
        Self {
            path: path.into(),
            line,
            parent: None,
        }
    }

    /// The location of the caller of the enclosing `#[track_caller]` function.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self::new(location.file(), location.line() as usize)
    }

    /// An origin inside a template, chained to the origin of the context
    /// that is generating it.
    pub fn derived(path: impl Into<String>, line: usize, parent: Origin) -> Self {
        Self {
            path: path.into(),
            line,
            parent: Some(Box::new(parent)),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn parent(&self) -> Option<&Origin> {
        self.parent.as_deref()
    }

    /// The outermost origin of the chain, usually a host call site.
    pub fn root(&self) -> &Origin {
        let mut origin = self;
        while let Some(parent) = origin.parent() {
            origin = parent;
        }
        origin
    }
}

impl fmt::Display for Origin {
    /// `path:line`; the alternate form appends the parent chain.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.line)?;
        if f.alternate() {
            let mut parent = self.parent();
            while let Some(origin) = parent {
                write!(f, " (from {}:{})", origin.path, origin.line)?;
                parent = origin.parent();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_records_this_file() {
        let origin = Origin::caller();
        assert!(origin.path().ends_with("origin.rs"));
        assert_eq!(origin.line(), line!() as usize - 2);
    }

    #[test]
    fn test_display() {
        let host = Origin::new("src/main.rs", 10);
        let derived = Origin::derived("base.txt", 3, host.clone());
        assert_eq!(derived.to_string(), "base.txt:3");
        assert_eq!(format!("{derived:#}"), "base.txt:3 (from src/main.rs:10)");
        assert_eq!(derived.root(), &host);
    }

    #[test]
    fn test_serde_round_trip() {
        let origin = Origin::derived("a.txt", 1, Origin::new("b.rs", 2));
        let json = serde_json::to_string(&origin).unwrap();
        assert_eq!(serde_json::from_str::<Origin>(&json).unwrap(), origin);
    }
}
