//! Quote- and bracket-aware argument splitting.
//!
//! Separators only count at the top level: inside a quoted string (single or
//! double quotes, backslash escapes honoured) or inside `()`, `[]` or `{}`
//! they are part of the argument.

/// Split a call-style argument list on top-level commas.
///
/// Empty arguments are dropped and every argument is trimmed.
pub fn split_arguments(text: &str) -> Vec<&str> {
    split_top_level(text, |c| c == ',')
}

/// Split a space-separated argument list on top-level whitespace.
pub fn split_words(text: &str) -> Vec<&str> {
    split_top_level(text, char::is_whitespace)
}

/// Split a `name=value` argument into its name and value.
///
/// Returns `None` when the argument is not a keyword argument, including
/// comparisons such as `a == b`.
pub fn split_keyword(argument: &str) -> Option<(&str, &str)> {
    let (name, value) = argument.split_once('=')?;
    let name = name.trim();
    if value.starts_with('=') || !crate::is_identifier(name) {
        return None;
    }
    Some((name, value.trim()))
}

fn split_top_level(text: &str, is_separator: impl Fn(char) -> bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (index, c) in text.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if depth == 0 && is_separator(c) => {
                parts.push(&text[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_words() {
        assert_eq!(
            split_words("flag key=value key='quoted value'"),
            ["flag", "key=value", "key='quoted value'"]
        );
        assert_eq!(split_words("  a   b  "), ["a", "b"]);
        assert!(split_words("").is_empty());
    }

    #[test]
    fn test_split_words_keeps_brackets_together() {
        assert_eq!(split_words("f(a, b) [1, 2]"), ["f(a, b)", "[1, 2]"]);
    }

    #[test]
    fn test_split_arguments() {
        assert_eq!(
            split_arguments(r#"0, "a, b", f(x, y), {'k': 1, 'v': 2}"#),
            ["0", r#""a, b""#, "f(x, y)", "{'k': 1, 'v': 2}"]
        );
        assert_eq!(split_arguments(r#""it\"s, fine", 1"#), [r#""it\"s, fine""#, "1"]);
        assert!(split_arguments("").is_empty());
    }

    #[test]
    fn test_split_keyword() {
        assert_eq!(split_keyword("required=True"), Some(("required", "True")));
        assert_eq!(split_keyword("key = 'a=b'"), Some(("key", "'a=b'")));
        assert_eq!(split_keyword("a == b"), None);
        assert_eq!(split_keyword("'x=1'"), None);
        assert_eq!(split_keyword("x"), None);
    }
}
