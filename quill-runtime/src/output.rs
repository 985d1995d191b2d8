//! Where emitted text goes.
//!
//! Text is written to a stack of sinks. The root sink is the final output;
//! `append`, `assign` and `inline` blocks push their own sink for the
//! duration of the block. Bookmarks stay placeholders until the output is
//! assembled, so appends may come before or after the bookmark, and
//! bookmarks declared inside appended or inlined text still collect their
//! own appends.

use indexmap::{IndexMap, IndexSet};

use crate::script::LineRef;

#[derive(Debug)]
enum Chunk {
    Text(String),
    Bookmark { name: String, indent: usize },
}

#[derive(Debug)]
enum SinkKind {
    Root,
    Append { name: String, line: LineRef },
    Capture,
    Inline,
}

#[derive(Debug)]
struct Sink {
    kind: SinkKind,
    chunks: Vec<Chunk>,
}

impl Sink {
    fn new(kind: SinkKind) -> Self {
        Self {
            kind,
            chunks: Vec::new(),
        }
    }
}

/// Content appended to a bookmark, with the statement that appended it.
#[derive(Debug)]
pub(crate) struct Append {
    pub line: LineRef,
    chunks: Vec<Chunk>,
}

#[derive(Debug)]
pub(crate) struct Output {
    sinks: Vec<Sink>,
    bookmarks: IndexSet<String>,
    appends: IndexMap<String, Vec<Append>>,
}

impl Output {
    pub fn new() -> Self {
        Self {
            sinks: vec![Sink::new(SinkKind::Root)],
            bookmarks: IndexSet::new(),
            appends: IndexMap::new(),
        }
    }

    fn top(&mut self) -> &mut Sink {
        let last = self.sinks.len() - 1;
        &mut self.sinks[last]
    }

    /// Write one line of text at `indent`.
    ///
    /// Inside an inline block only the first write keeps its indentation and
    /// no line break is added.
    pub fn emit(&mut self, indent: usize, text: &str) {
        let top = self.top();
        let chunk = match top.kind {
            SinkKind::Inline if top.chunks.is_empty() => format!("{}{text}", " ".repeat(indent)),
            SinkKind::Inline => text.to_string(),
            _ if text.is_empty() => "\n".to_string(),
            _ => format!("{}{text}\n", " ".repeat(indent)),
        };
        top.chunks.push(Chunk::Text(chunk));
    }

    /// Declare a bookmark at the current position.
    ///
    /// Captured text is a plain string once its block ends, so a bookmark
    /// that would land in it is refused.
    pub fn bookmark(&mut self, name: &str, indent: usize) -> Result<(), String> {
        for sink in self.sinks.iter().rev() {
            match sink.kind {
                SinkKind::Inline => continue,
                SinkKind::Capture => {
                    return Err(format!(
                        "bookmark '{name}' cannot be declared inside an assign block"
                    ));
                }
                SinkKind::Root | SinkKind::Append { .. } => break,
            }
        }
        self.bookmarks.insert(name.to_string());
        self.top().chunks.push(Chunk::Bookmark {
            name: name.to_string(),
            indent,
        });
        Ok(())
    }

    /// Remove a trailing `token` (after trailing whitespace) from the last
    /// text emitted; leaves the text unchanged if it doesn't end with it.
    pub fn strip(&mut self, token: &str) {
        let chunks = &mut self.top().chunks;
        let Some(index) = chunks
            .iter()
            .rposition(|chunk| matches!(chunk, Chunk::Text(text) if !text.trim_end().is_empty()))
        else {
            return;
        };
        let Chunk::Text(text) = &chunks[index] else {
            return;
        };
        let Some(stripped) = text.trim_end().strip_suffix(token) else {
            return;
        };
        let newline = if text.ends_with('\n') { "\n" } else { "" };
        chunks[index] = Chunk::Text(format!("{stripped}{newline}"));
    }

    pub fn begin_append(&mut self, name: &str, line: LineRef) {
        self.sinks.push(Sink::new(SinkKind::Append {
            name: name.to_string(),
            line,
        }));
    }

    pub fn begin_capture(&mut self) {
        self.sinks.push(Sink::new(SinkKind::Capture));
    }

    pub fn begin_inline(&mut self) {
        self.sinks.push(Sink::new(SinkKind::Inline));
    }

    /// Close the innermost block sink, returning captured text for `assign`.
    pub fn end(&mut self) -> Option<String> {
        if self.sinks.len() < 2 {
            return None;
        }
        let sink = self.sinks.pop()?;
        match sink.kind {
            SinkKind::Root => None,
            SinkKind::Append { name, line } => {
                self.appends.entry(name).or_default().push(Append {
                    line,
                    chunks: sink.chunks,
                });
                None
            }
            SinkKind::Capture => {
                let text = self.resolve(&sink.chunks, &mut Vec::new());
                Some(text.strip_suffix('\n').unwrap_or(&text).to_string())
            }
            SinkKind::Inline => {
                if !sink.chunks.is_empty() {
                    let top = self.top();
                    let nested = matches!(top.kind, SinkKind::Inline);
                    top.chunks.extend(sink.chunks);
                    if !nested {
                        top.chunks.push(Chunk::Text("\n".to_string()));
                    }
                }
                None
            }
        }
    }

    /// The first append whose bookmark was never declared.
    pub fn dangling(&self) -> Option<(&str, &Append)> {
        self.appends
            .iter()
            .find(|(name, _)| !self.bookmarks.contains(name.as_str()))
            .and_then(|(name, appends)| Some((name.as_str(), appends.first()?)))
    }

    pub fn bookmarks(&self) -> impl Iterator<Item = &str> {
        self.bookmarks.iter().map(String::as_str)
    }

    /// Assemble the final text, without a trailing line break.
    pub fn finish(mut self) -> String {
        while self.sinks.len() > 1 {
            self.end();
        }
        let root = self.sinks.pop().map(|sink| sink.chunks).unwrap_or_default();
        let mut text = self.resolve(&root, &mut Vec::new());
        if text.ends_with('\n') {
            text.pop();
        }
        text
    }

    /// Render chunks, filling each bookmark with its appends. `active` holds
    /// the bookmarks being filled; a bookmark inside its own appends is left
    /// empty.
    fn resolve<'a>(&'a self, chunks: &'a [Chunk], active: &mut Vec<&'a str>) -> String {
        let mut out = String::new();
        for chunk in chunks {
            match chunk {
                Chunk::Text(text) => out.push_str(text),
                Chunk::Bookmark { name, indent } => {
                    if active.contains(&name.as_str()) {
                        continue;
                    }
                    active.push(name.as_str());
                    for append in self.appends.get(name).into_iter().flatten() {
                        let text = self.resolve(&append.chunks, active);
                        for line in text.lines() {
                            if !line.is_empty() {
                                out.push_str(&" ".repeat(*indent));
                                out.push_str(line);
                            }
                            out.push('\n');
                        }
                    }
                    active.pop();
                }
            }
        }
        out
    }
}
