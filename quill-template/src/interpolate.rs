//! Splitting text into literal and expression segments.
//!
//! ```
//! use quill_template::{Delimiters, Segment, interpolate};
//!
//! let delimiters = Delimiters::default();
//! let segments: Vec<_> = interpolate("x = {x}", &delimiters)
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(segments, [Segment::text("x = "), Segment::Expression("x")]);
//! ```

use std::{borrow::Cow, fmt, str::FromStr};

use crate::error::{Error, Result};

/// An opening and closing delimiter, `{ }` by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    open: String,
    close: String,
}

impl Delimiters {
    /// Parse a space-separated pair, e.g. `<% %>`.
    pub fn parse(pair: &str) -> Result<Self> {
        let parts: Vec<&str> = pair.split(' ').collect();
        let [open, close] = parts.as_slice() else {
            return Err(Error::invalid_delimiters(
                pair,
                "expected a space-separated pair",
            ));
        };
        if open.is_empty() || close.is_empty() || open == close {
            return Err(Error::invalid_delimiters(
                pair,
                "delimiters must be non-empty and distinct",
            ));
        }
        Ok(Self {
            open: open.to_string(),
            close: close.to_string(),
        })
    }

    pub fn open(&self) -> &str {
        &self.open
    }

    pub fn close(&self) -> &str {
        &self.close
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            open: "{".to_string(),
            close: "}".to_string(),
        }
    }
}

impl FromStr for Delimiters {
    type Err = Box<Error>;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Delimiters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.open, self.close)
    }
}

/// A run of interpolated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal text, with escaped delimiters already collapsed.
    Text(Cow<'a, str>),
    /// Expression source between a pair of delimiters, trimmed.
    Expression(&'a str),
}

impl<'a> Segment<'a> {
    pub fn text(text: impl Into<Cow<'a, str>>) -> Self {
        Segment::Text(text.into())
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, Segment::Expression(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Segment::Text(text) => text.as_ref(),
            Segment::Expression(expression) => expression,
        }
    }
}

/// Lazily split `text` into segments.
pub fn interpolate<'a>(text: &'a str, delimiters: &'a Delimiters) -> Interpolation<'a> {
    Interpolation {
        text,
        delimiters,
        position: 0,
        done: false,
    }
}

/// Iterator returned by [`interpolate`].
///
/// Stops after the first error.
#[derive(Debug, Clone)]
pub struct Interpolation<'a> {
    text: &'a str,
    delimiters: &'a Delimiters,
    position: usize,
    done: bool,
}

impl<'a> Interpolation<'a> {
    fn open(&self) -> &'a str {
        let delimiters: &'a Delimiters = self.delimiters;
        delimiters.open.as_str()
    }

    fn close(&self) -> &'a str {
        let delimiters: &'a Delimiters = self.delimiters;
        delimiters.close.as_str()
    }

    fn at(&self, index: usize, token: &str) -> bool {
        self.text[index..].starts_with(token)
    }

    fn doubled(&self, index: usize, token: &str) -> bool {
        self.at(index, token) && self.at(index + token.len(), token)
    }

    /// Scan literal text from the current position up to the next expression.
    fn literal(&mut self) -> Result<Option<Segment<'a>>> {
        let (text, open, close) = (self.text, self.open(), self.close());
        let start = self.position;
        let mut unescaped: Option<String> = None;
        let mut index = start;
        let mut run = start;

        while index < text.len() {
            let token = if self.doubled(index, open) {
                open
            } else if self.doubled(index, close) {
                close
            } else if self.at(index, open) {
                break;
            } else if self.at(index, close) {
                let offset = text.rfind(close).unwrap_or(index);
                return Err(Error::interpolation(
                    text,
                    format!("unmatched '{close}'"),
                    offset,
                ));
            } else {
                index += text[index..].chars().next().map_or(1, char::len_utf8);
                continue;
            };
            let buffer = unescaped.get_or_insert_with(String::new);
            buffer.push_str(&text[run..index]);
            buffer.push_str(token);
            index += token.len() * 2;
            run = index;
        }

        self.position = index;
        let segment = match unescaped {
            Some(mut buffer) => {
                buffer.push_str(&text[run..index]);
                Segment::Text(Cow::Owned(buffer))
            }
            None if index > start => Segment::Text(Cow::Borrowed(&text[start..index])),
            None => return Ok(None),
        };
        Ok(Some(segment))
    }

    /// Scan an expression starting at an opening delimiter.
    fn expression(&mut self) -> Result<Segment<'a>> {
        let (text, open, close) = (self.text, self.open(), self.close());
        let start = self.position + open.len();
        let mut depth = 1usize;
        let mut index = start;

        while index < text.len() {
            let c = text[index..].chars().next().unwrap_or_default();
            if c == '\'' || c == '"' {
                index = closing_quote(text, index, c)
                    .ok_or_else(|| Error::interpolation(text, "unterminated quote", index))?;
                index += 1;
            } else if self.at(index, open) {
                depth += 1;
                index += open.len();
            } else if self.at(index, close) {
                depth -= 1;
                if depth == 0 {
                    self.position = index + close.len();
                    return Ok(Segment::Expression(text[start..index].trim()));
                }
                index += close.len();
            } else {
                index += c.len_utf8();
            }
        }

        let offset = text.rfind(open).unwrap_or(self.position);
        Err(Error::interpolation(
            text,
            format!("unmatched '{open}'"),
            offset,
        ))
    }
}

impl<'a> Iterator for Interpolation<'a> {
    type Item = Result<Segment<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        // empty text and a lone delimiter are plain text
        if self.position == 0
            && (self.text.is_empty() || self.text == self.open() || self.text == self.close())
        {
            self.done = true;
            return Some(Ok(Segment::Text(Cow::Borrowed(self.text))));
        }
        if self.position >= self.text.len() {
            self.done = true;
            return None;
        }

        let result = match self.literal() {
            Ok(Some(segment)) => Ok(segment),
            Ok(None) => self.expression(),
            Err(error) => Err(error),
        };
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

/// Index of the quote closing the string opened at `start`.
fn closing_quote(text: &str, start: usize, quote: char) -> Option<usize> {
    let mut escaped = false;
    for (offset, c) in text[start + 1..].char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(start + 1 + offset);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(text: &str, delimiters: &str) -> Vec<(String, bool)> {
        let delimiters = Delimiters::parse(delimiters).unwrap();
        interpolate(text, &delimiters)
            .map(|segment| {
                let segment = segment.unwrap();
                (segment.as_str().to_string(), segment.is_expression())
            })
            .collect()
    }

    fn error(text: &str) -> String {
        let delimiters = Delimiters::default();
        interpolate(text, &delimiters)
            .find_map(Result::err)
            .unwrap()
            .to_string()
    }

    fn owned(expected: &[(&str, bool)]) -> Vec<(String, bool)> {
        expected
            .iter()
            .map(|(text, expression)| (text.to_string(), *expression))
            .collect()
    }

    #[test]
    fn test_interpolate() {
        assert_eq!(
            segments("{x} + {y} = {x + y}", "{ }"),
            owned(&[
                ("x", true),
                (" + ", false),
                ("y", true),
                (" = ", false),
                ("x + y", true),
            ])
        );
    }

    #[test]
    fn test_other_delimiters() {
        assert_eq!(
            segments("<% x %> and <%y%>", "<% %>"),
            owned(&[("x", true), (" and ", false), ("y", true)])
        );
    }

    #[test]
    fn test_nested_delimiters() {
        assert_eq!(
            segments("{ {'x': 1, 'y': 2}['x'] }", "{ }"),
            owned(&[("{'x': 1, 'y': 2}['x']", true)])
        );
    }

    #[test]
    fn test_quoted_delimiters() {
        assert_eq!(
            segments(r#"{ '}' ~ "{" ~ 'it\'s }' }"#, "{ }"),
            owned(&[(r#"'}' ~ "{" ~ 'it\'s }'"#, true)])
        );
    }

    #[test]
    fn test_edge_cases() {
        for text in ["", "{", "}", "a"] {
            assert_eq!(segments(text, "{ }"), owned(&[(text, false)]));
        }
    }

    #[test]
    fn test_segments_rebuild_the_input() {
        let cases = [
            ("{x} + {y} = {x + y}", "{ }"),
            ("a{b}c{d}", "{ }"),
            ("<%x%> and <%y%>!", "<% %>"),
            ("{{{x}}} and {{y}}", "{ }"),
            ("(|(| x |)|) (|z|)", "(| |)"),
            ("{'}' ~ x}", "{ }"),
            ("no expressions", "{ }"),
        ];
        for (text, pair) in cases {
            let delimiters = Delimiters::parse(pair).unwrap();
            let (open, close) = (delimiters.open(), delimiters.close());
            let rebuilt: String = interpolate(text, &delimiters)
                .map(|segment| match segment.unwrap() {
                    Segment::Text(text) => text
                        .replace(open, &open.repeat(2))
                        .replace(close, &close.repeat(2)),
                    Segment::Expression(expression) => format!("{open}{expression}{close}"),
                })
                .collect();
            assert_eq!(rebuilt, text);
        }
    }

    #[test]
    fn test_escaping() {
        assert_eq!(segments("{{x}}", "{ }"), owned(&[("{x}", false)]));
        assert_eq!(
            segments("{{{x}}}", "{ }"),
            owned(&[("{", false), ("x", true), ("}", false)])
        );
        assert_eq!(segments("{{{{x}}}}", "{ }"), owned(&[("{{x}}", false)]));
        assert_eq!(
            segments("(|(| x |)|)", "(| |)"),
            owned(&[("(| x |)", false)])
        );
    }

    #[test]
    fn test_plain_text_is_borrowed() {
        let delimiters = Delimiters::default();
        let first = interpolate("plain {x}", &delimiters).next().unwrap().unwrap();
        assert!(matches!(first, Segment::Text(Cow::Borrowed("plain "))));
    }

    #[test]
    fn test_unmatched_open() {
        assert_eq!(
            error("{x} + {y} = {x + y"),
            "unable to interpolate '{x} + {y} = {x + y': unmatched '{' at offset 12"
        );
    }

    #[test]
    fn test_unmatched_close() {
        assert_eq!(
            error("{x} + {y} = x + y}"),
            "unable to interpolate '{x} + {y} = x + y}': unmatched '}' at offset 17"
        );
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(
            error("{'hello}"),
            "unable to interpolate '{'hello}': unterminated quote at offset 1"
        );
    }

    #[test]
    fn test_error_stops_iteration() {
        let delimiters = Delimiters::default();
        let mut segments = interpolate("a } b", &delimiters);
        assert!(segments.next().unwrap().is_err());
        assert!(segments.next().is_none());
    }

    #[test]
    fn test_invalid_delimiters() {
        for pair in ["<%", "{}", "<% %> <%>"] {
            assert_eq!(
                Delimiters::parse(pair).unwrap_err().to_string(),
                format!("invalid delimiters: '{pair}' (expected a space-separated pair)")
            );
        }
        for pair in ["{ ", " }", "| |"] {
            assert_eq!(
                Delimiters::parse(pair).unwrap_err().to_string(),
                format!("invalid delimiters: '{pair}' (delimiters must be non-empty and distinct)")
            );
        }
    }

    #[test]
    fn test_default_delimiters() {
        assert_eq!(Delimiters::default(), "{ }".parse().unwrap());
        assert_eq!(Delimiters::default().to_string(), "{ }");
    }
}
