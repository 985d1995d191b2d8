//! The indentation tree of a template.

use std::{fmt, sync::Arc};

use quill_core::or_list;

use crate::error::{Result, SourceContext};

/// A single structural line.
///
/// `number` is 1-based and counts from the first non-blank line of the
/// template. `indent` is relative to the template's base indentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    number: usize,
    indent: usize,
    content: String,
    children: Lines,
}

impl Line {
    pub fn new(number: usize, indent: usize, content: impl Into<String>) -> Self {
        Self {
            number,
            indent,
            content: content.into(),
            children: Lines::default(),
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn children(&self) -> &Lines {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.content.is_empty()
    }

    /// The same line with its content replaced.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }

    /// The line's text as it would appear in a template.
    pub fn text(&self) -> String {
        if self.content.is_empty() {
            String::new()
        } else {
            format!("{}{}", " ".repeat(self.indent), self.content)
        }
    }

    /// The line and all its descendants, depth-first.
    pub fn flatten(&self) -> impl Iterator<Item = &Line> + '_ {
        std::iter::once(self).chain(self.children.flatten())
    }

    fn last_number(&self) -> usize {
        self.children
            .lines
            .last()
            .map_or(self.number, Line::last_number)
    }

    fn shift(&mut self, delta: isize) {
        self.indent = self.indent.saturating_add_signed(delta);
        self.children.shift(delta);
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}", self.number)
    }
}

/// An ordered collection of sibling lines.
///
/// Cloning is cheap: the lines are shared until one of the copies is
/// re-indented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lines {
    lines: Arc<Vec<Line>>,
    parent: Option<usize>,
}

impl Lines {
    pub fn new(lines: Vec<Line>) -> Self {
        Self {
            lines: Arc::new(lines),
            parent: None,
        }
    }

    /// Parse template text into a tree of lines.
    pub fn parse(text: &str) -> Result<Self> {
        let source = SourceContext::new(normalize(text), "<string>");
        Ok(parse(&source)?.lines)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Line> {
        self.lines.iter()
    }

    /// The number of the line owning these lines, if they are children.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// The siblings following `index`.
    pub fn tail(&self, index: usize) -> Lines {
        Self {
            lines: Arc::new(self.lines.get(index..).unwrap_or_default().to_vec()),
            parent: self.parent,
        }
    }

    /// All lines and their descendants, depth-first.
    pub fn flatten(&self) -> Box<dyn Iterator<Item = &Line> + '_> {
        Box::new(self.lines.iter().flat_map(|line| line.flatten()))
    }

    /// Re-indent so that the shallowest line sits at `to`, keeping relative
    /// nesting.
    pub fn snap(&mut self, to: usize) {
        let min = self
            .lines
            .iter()
            .filter(|line| !line.is_blank())
            .map(Line::indent)
            .min()
            .or_else(|| self.lines.iter().map(Line::indent).min());
        if let Some(min) = min {
            self.shift(to as isize - min as isize);
        }
    }

    /// A re-indented copy, see [`Lines::snap`].
    pub fn snapped(&self, to: usize) -> Lines {
        let mut lines = self.clone();
        lines.snap(to);
        lines
    }

    /// Serialize back to template text.
    pub fn to_text(&self) -> String {
        self.flatten().map(Line::text).collect::<Vec<_>>().join("\n")
    }

    fn shift(&mut self, delta: isize) {
        if delta == 0 || self.lines.is_empty() {
            return;
        }
        for line in Arc::make_mut(&mut self.lines) {
            line.shift(delta);
        }
    }
}

impl<'a> IntoIterator for &'a Lines {
    type Item = &'a Line;
    type IntoIter = std::slice::Iter<'a, Line>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Lines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (Some(first), Some(last)) = (self.lines.first(), self.lines.last()) else {
            return f.write_str("no lines");
        };
        let (first, last) = (first.number, last.last_number());
        match self.parent {
            Some(parent) if first == last => write!(f, "child {first} of line {parent}"),
            Some(parent) => write!(f, "children {first}-{last} of line {parent}"),
            None if first == last => write!(f, "line {first}"),
            None => write!(f, "lines {first}-{last}"),
        }
    }
}

/// Parsed lines plus the number of blank lines stripped from the top.
pub(crate) struct Parsed {
    pub lines: Lines,
    pub skipped: usize,
}

pub(crate) fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// A logical line: backslash continuations already joined.
struct Logical {
    number: usize,
    indent: usize,
    content: String,
    raw: usize,
}

struct Frame {
    indent: usize,
    lines: Vec<Line>,
    parent: Option<usize>,
}

pub(crate) fn parse(source: &SourceContext) -> Result<Parsed> {
    let raw: Vec<&str> = source.src().split('\n').collect();
    let offsets: Vec<usize> = raw
        .iter()
        .scan(0, |offset, line| {
            let start = *offset;
            *offset += line.len() + 1;
            Some(start)
        })
        .collect();
    let span = |index: usize| (offsets[index], raw[index].len());

    let is_blank = |line: &str| line.trim().is_empty();
    let skipped = raw.iter().take_while(|line| is_blank(line)).count();
    let end = raw.len() - raw.iter().rev().take_while(|line| is_blank(line)).count();
    if skipped >= end {
        return Ok(Parsed {
            lines: Lines::default(),
            skipped,
        });
    }
    let base = indentation(raw[skipped]);

    let mut logical = Vec::new();
    let mut index = skipped;
    while index < end {
        let number = index - skipped + 1;
        let line = raw[index];
        if is_blank(line) {
            logical.push(Logical {
                number,
                indent: 0,
                content: String::new(),
                raw: index,
            });
            index += 1;
            continue;
        }
        let indent = indentation(line);
        if indent < base {
            return Err(source.indentation_error(number, base.to_string(), line, span(index)));
        }
        let mut content = line[indent..].to_string();
        let start = index;
        while let Some(joined) = content.trim_end().strip_suffix('\\') {
            content = joined.trim_end().to_string();
            let Some(next) = (index + 1..end).find(|&i| !is_blank(raw[i])) else {
                index = end - 1;
                break;
            };
            content.push(' ');
            content.push_str(raw[next].trim());
            index = next;
        }
        logical.push(Logical {
            number,
            indent: indent - base,
            content,
            raw: start,
        });
        index += 1;
    }

    let mut stack = vec![Frame {
        indent: 0,
        lines: Vec::new(),
        parent: None,
    }];
    for line in logical {
        if line.content.is_empty() {
            let top = last_frame(&mut stack);
            let blank = Line::new(line.number, top.indent, "");
            top.lines.push(blank);
            continue;
        }

        let top = last_frame(&mut stack);
        if line.indent > top.indent {
            let owner = top.lines.iter().rposition(|line| !line.is_blank());
            if let Some(owner) = owner {
                let mut moved: Vec<Line> = top.lines.drain(owner + 1..).collect();
                for blank in &mut moved {
                    blank.indent = line.indent;
                }
                let parent = Some(top.lines[owner].number);
                stack.push(Frame {
                    indent: line.indent,
                    lines: moved,
                    parent,
                });
            } else {
                top.indent = line.indent;
            }
        } else if line.indent < top.indent {
            let open: Vec<usize> = stack.iter().map(|frame| frame.indent + base).collect();
            while stack.len() > 1 && last_frame(&mut stack).indent > line.indent {
                close_frame(&mut stack);
            }
            if last_frame(&mut stack).indent != line.indent {
                let found = raw[line.raw];
                return Err(source.indentation_error(
                    line.number,
                    or_list(open),
                    found,
                    span(line.raw),
                ));
            }
        }
        let top = last_frame(&mut stack);
        top.lines.push(Line::new(line.number, line.indent, line.content));
    }
    while stack.len() > 1 {
        close_frame(&mut stack);
    }

    let root = stack.pop().map(|frame| frame.lines).unwrap_or_default();
    Ok(Parsed {
        lines: Lines::new(root),
        skipped,
    })
}

fn last_frame(stack: &mut [Frame]) -> &mut Frame {
    let last = stack.len() - 1;
    &mut stack[last]
}

/// Pop the innermost frame and attach its lines to their owner.
fn close_frame(stack: &mut Vec<Frame>) {
    let Some(frame) = stack.pop() else {
        return;
    };
    let children = Lines {
        lines: Arc::new(frame.lines),
        parent: frame.parent,
    };
    if let Some(owner) = last_frame(stack)
        .lines
        .iter_mut()
        .rev()
        .find(|line| Some(line.number) == frame.parent)
    {
        owner.children = children;
    }
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}
