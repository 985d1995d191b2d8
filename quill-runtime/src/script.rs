//! Parsing generated code into statements.

use quill_core::{is_identifier, split_arguments};

/// Which generated line a statement comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineRef {
    Intro(usize),
    Body(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub line: LineRef,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StatementKind {
    For {
        targets: Vec<String>,
        iterable: String,
        body: Vec<Statement>,
    },
    If {
        branches: Vec<(String, Vec<Statement>)>,
        otherwise: Option<Vec<Statement>>,
    },
    While {
        condition: String,
        body: Vec<Statement>,
    },
    Break,
    Continue,
    Pass,
    Assign {
        target: String,
        operator: Option<char>,
        value: String,
    },
    /// `name(arguments)`: a directive or command if `name` is one, an
    /// expression otherwise.
    Call {
        name: String,
        arguments: Vec<String>,
        source: String,
    },
    /// `with name(arguments):` around a block.
    With {
        name: String,
        arguments: Vec<String>,
        body: Vec<Statement>,
    },
    Expression(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SyntaxError {
    pub line: LineRef,
    pub message: String,
}

/// A line ready for parsing: its reference, indentation level and text.
pub(crate) type SourceLine<'a> = (LineRef, usize, &'a str);

pub(crate) fn parse(lines: &[SourceLine<'_>]) -> Result<Vec<Statement>, SyntaxError> {
    let lines: Vec<SourceLine<'_>> = lines
        .iter()
        .map(|&(line, indent, text)| (line, indent, text.trim()))
        .filter(|(_, _, text)| !text.is_empty() && !text.starts_with('#'))
        .collect();
    let mut position = 0;
    let base = lines.first().map_or(0, |line| line.1);
    let block = parse_block(&lines, &mut position, base)?;
    if let Some(&(line, _, _)) = lines.get(position) {
        return Err(SyntaxError {
            line,
            message: "unexpected indentation".to_string(),
        });
    }
    Ok(block)
}

fn parse_block(
    lines: &[SourceLine<'_>],
    position: &mut usize,
    indent: usize,
) -> Result<Vec<Statement>, SyntaxError> {
    let mut block: Vec<Statement> = Vec::new();
    while let Some(&(line, level, text)) = lines.get(*position) {
        if level < indent {
            break;
        }
        if level > indent {
            return Err(SyntaxError {
                line,
                message: "unexpected indentation".to_string(),
            });
        }
        *position += 1;

        if let Some(condition) = header(text, "elif") {
            let body = parse_body(lines, position, line, indent)?;
            match block.last_mut().map(|statement| &mut statement.kind) {
                Some(StatementKind::If {
                    branches,
                    otherwise: None,
                }) => branches.push((condition.to_string(), body)),
                _ => return Err(unexpected(line, "elif")),
            }
            continue;
        }
        if text == "else:" {
            let body = parse_body(lines, position, line, indent)?;
            match block.last_mut().map(|statement| &mut statement.kind) {
                Some(StatementKind::If { otherwise, .. }) if otherwise.is_none() => {
                    *otherwise = Some(body)
                }
                _ => return Err(unexpected(line, "else")),
            }
            continue;
        }

        let kind = if let Some(condition) = header(text, "if") {
            StatementKind::If {
                branches: vec![(condition.to_string(), parse_body(lines, position, line, indent)?)],
                otherwise: None,
            }
        } else if let Some(condition) = header(text, "while") {
            StatementKind::While {
                condition: condition.to_string(),
                body: parse_body(lines, position, line, indent)?,
            }
        } else if let Some(rest) = header(text, "for") {
            let Some((targets, iterable)) = rest.split_once(" in ") else {
                return Err(SyntaxError {
                    line,
                    message: format!("expected 'for <name> in <expression>:', but got '{text}'"),
                });
            };
            let targets: Vec<String> = targets.split(',').map(|t| t.trim().to_string()).collect();
            if !targets.iter().all(|target| is_identifier(target)) {
                return Err(SyntaxError {
                    line,
                    message: format!("invalid loop target in '{text}'"),
                });
            }
            StatementKind::For {
                targets,
                iterable: iterable.trim().to_string(),
                body: parse_body(lines, position, line, indent)?,
            }
        } else if let Some(call) = header(text, "with") {
            let Some((name, arguments)) = call_parts(call) else {
                return Err(SyntaxError {
                    line,
                    message: format!("expected 'with <directive>(<arguments>):', but got '{text}'"),
                });
            };
            StatementKind::With {
                name: name.to_string(),
                arguments,
                body: parse_body(lines, position, line, indent)?,
            }
        } else {
            simple(text)
        };
        block.push(Statement { line, kind });
    }
    Ok(block)
}

fn parse_body(
    lines: &[SourceLine<'_>],
    position: &mut usize,
    line: LineRef,
    indent: usize,
) -> Result<Vec<Statement>, SyntaxError> {
    match lines.get(*position) {
        Some(&(_, level, _)) if level > indent => parse_block(lines, position, level),
        _ => Err(SyntaxError {
            line,
            message: "expected an indented block".to_string(),
        }),
    }
}

fn unexpected(line: LineRef, keyword: &str) -> SyntaxError {
    SyntaxError {
        line,
        message: format!("'{keyword}' without a matching 'if'"),
    }
}

/// The text between `keyword ` and the trailing colon of a block header.
fn header<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(keyword)?;
    if !rest.starts_with([' ', '(']) {
        return None;
    }
    rest.strip_suffix(':').map(str::trim)
}

fn simple(text: &str) -> StatementKind {
    match text {
        "break" => return StatementKind::Break,
        "continue" => return StatementKind::Continue,
        "pass" => return StatementKind::Pass,
        _ => {}
    }
    if let Some((target, operator, value)) = assignment(text) {
        return StatementKind::Assign {
            target: target.to_string(),
            operator,
            value: value.to_string(),
        };
    }
    if let Some((name, arguments)) = call_parts(text) {
        return StatementKind::Call {
            name: name.to_string(),
            arguments,
            source: text.to_string(),
        };
    }
    StatementKind::Expression(text.to_string())
}

fn assignment(text: &str) -> Option<(&str, Option<char>, &str)> {
    let (target, value) = text.split_once('=')?;
    if value.starts_with('=') {
        return None;
    }
    let target = target.trim_end();
    if is_identifier(target) {
        return Some((target, None, value.trim()));
    }
    let operator = target.chars().last()?;
    let name = target[..target.len() - operator.len_utf8()].trim_end();
    if matches!(operator, '+' | '-' | '*' | '/' | '~') && is_identifier(name) {
        return Some((name, Some(operator), value.trim()));
    }
    None
}

/// Split `name(arguments)` when the parenthesis opened after `name` closes at
/// the very end of `text`.
fn call_parts(text: &str) -> Option<(&str, Vec<String>)> {
    let open = text.find('(')?;
    let name = text[..open].trim();
    if !is_identifier(name) || !text.ends_with(')') {
        return None;
    }
    let inner = &text[open + 1..text.len() - 1];
    if !balanced(inner) {
        return None;
    }
    let arguments = split_arguments(inner)
        .into_iter()
        .map(str::to_string)
        .collect();
    Some((name, arguments))
}

/// Whether parentheses in `text` never close below depth zero.
fn balanced(text: &str) -> bool {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
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
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(text: &str) -> Vec<(LineRef, usize, String)> {
        text.lines()
            .enumerate()
            .map(|(index, line)| {
                let content = line.trim_start();
                let indent = (line.len() - content.len()) / 4;
                (LineRef::Body(index), indent, content.to_string())
            })
            .collect()
    }

    fn parse_text(text: &str) -> Result<Vec<Statement>, SyntaxError> {
        let lines = source(text);
        let lines: Vec<SourceLine<'_>> = lines
            .iter()
            .map(|(line, indent, text)| (*line, *indent, text.as_str()))
            .collect();
        parse(&lines)
    }

    #[test]
    fn test_for_loop() {
        let program = parse_text("for i in range(n):\n    emit(0, \"line \", i)").unwrap();
        let [Statement { kind: StatementKind::For { targets, iterable, body }, .. }] =
            program.as_slice()
        else {
            panic!("expected a for loop, got {program:?}");
        };
        assert_eq!(targets, &["i"]);
        assert_eq!(iterable, "range(n)");
        assert_eq!(
            body[0].kind,
            StatementKind::Call {
                name: "emit".to_string(),
                arguments: vec!["0".to_string(), "\"line \"".to_string(), "i".to_string()],
                source: "emit(0, \"line \", i)".to_string(),
            }
        );
    }

    #[test]
    fn test_if_chain() {
        let program = parse_text("if a:\n    pass\nelif b:\n    pass\nelse:\n    break").unwrap();
        let StatementKind::If { branches, otherwise } = &program[0].kind else {
            panic!("expected an if statement");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].0, "b");
        assert_eq!(otherwise.as_deref(), Some(&[Statement {
            line: LineRef::Body(5),
            kind: StatementKind::Break,
        }][..]));
    }

    #[test]
    fn test_assignment() {
        assert_eq!(simple("x = 1"), StatementKind::Assign {
            target: "x".to_string(),
            operator: None,
            value: "1".to_string(),
        });
        assert_eq!(simple("total += x"), StatementKind::Assign {
            target: "total".to_string(),
            operator: Some('+'),
            value: "x".to_string(),
        });
        assert_eq!(simple("x == 1"), StatementKind::Expression("x == 1".to_string()));
        assert_eq!(simple("x <= 1"), StatementKind::Expression("x <= 1".to_string()));
        assert_eq!(simple("f(a='=')"), StatementKind::Call {
            name: "f".to_string(),
            arguments: vec!["a='='".to_string()],
            source: "f(a='=')".to_string(),
        });
    }

    #[test]
    fn test_call_requires_whole_line() {
        assert!(matches!(simple("f(a)(b)"), StatementKind::Expression(_)));
        assert!(matches!(simple("f(a) + g(b)"), StatementKind::Expression(_)));
        assert!(matches!(simple("emit(0, \")\")"), StatementKind::Call { .. }));
    }

    #[test]
    fn test_with_block() {
        let program = parse_text("with append(\"x\"):\n    emit(0, \"a\")").unwrap();
        let StatementKind::With { name, arguments, body } = &program[0].kind else {
            panic!("expected a with block");
        };
        assert_eq!(name, "append");
        assert_eq!(arguments, &["\"x\""]);
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_comments_are_skipped() {
        let program = parse_text("# header\nx = 1\n# trailing").unwrap();
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn test_missing_block() {
        let error = parse_text("for i in x:\nemit(0, i)").unwrap_err();
        assert_eq!(error.message, "expected an indented block");
        assert_eq!(error.line, LineRef::Body(0));
    }

    #[test]
    fn test_unexpected_indentation() {
        let error = parse_text("x = 1\n    y = 2").unwrap_err();
        assert_eq!(error.message, "unexpected indentation");
        assert_eq!(error.line, LineRef::Body(1));
    }

    #[test]
    fn test_dangling_else() {
        let error = parse_text("x = 1\nelse:\n    pass").unwrap_err();
        assert_eq!(error.message, "'else' without a matching 'if'");
    }
}
