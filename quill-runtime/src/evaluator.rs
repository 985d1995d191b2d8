//! Expression evaluation.
//!
//! Expressions of generated code (and of generation-time macros) are
//! evaluated by minijinja against a mutable namespace. Undefined results are
//! errors rather than empty strings.

use std::{collections::BTreeMap, fmt, sync::Arc};

use minijinja::{
    Environment, Error as JinjaError, ErrorKind as JinjaErrorKind, UndefinedBehavior, Value,
    value::{Rest, ValueKind},
};
use thiserror::Error;

use crate::error::ErrorKind;

/// A runtime helper: a pure function callable from expressions.
pub type Helper = Arc<dyn Fn(&[Value]) -> Result<Value, JinjaError> + Send + Sync>;

/// Wrap a string-to-string function as a one-argument [`Helper`].
pub fn string_helper(f: fn(&str) -> String) -> Helper {
    Arc::new(move |args: &[Value]| match args {
        [value] => match value.as_str() {
            Some(text) => Ok(Value::from(f(text))),
            None => Ok(Value::from(f(&value.to_string()))),
        },
        _ => Err(JinjaError::new(
            JinjaErrorKind::InvalidOperation,
            format!("expected 1 argument, got {}", args.len()),
        )),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvaluationError {
    kind: ErrorKind,
    message: String,
}

impl EvaluationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn from_jinja(expression: &str, error: &JinjaError) -> Self {
        let kind = match error.kind() {
            JinjaErrorKind::UndefinedError => ErrorKind::Undefined,
            JinjaErrorKind::SyntaxError => ErrorKind::Syntax,
            _ => ErrorKind::Evaluation,
        };
        let message = match error.detail() {
            Some(detail) => format!("{}: {detail} in `{expression}`", error.kind()),
            None => format!("{} in `{expression}`", error.kind()),
        };
        Self { kind, message }
    }
}

/// A namespace plus the environment its expressions are evaluated in.
#[derive(Clone)]
pub struct Evaluator {
    env: Environment<'static>,
    namespace: BTreeMap<String, Value>,
}

impl Evaluator {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_global("True", Value::from(true));
        env.add_global("False", Value::from(false));
        env.add_global("None", Value::from(()));
        env.add_function("len", |value: Value| {
            value.len().ok_or_else(|| {
                JinjaError::new(
                    JinjaErrorKind::InvalidOperation,
                    format!("{} has no length", value.kind()),
                )
            })
        });
        env.add_function("str", |value: Value| value.to_string());
        Self {
            env,
            namespace: BTreeMap::new(),
        }
    }

    /// Make `helper` callable as `name(...)`.
    pub fn register(&mut self, name: &str, helper: Helper) {
        self.env
            .add_function(name.to_string(), move |args: Rest<Value>| helper(&args));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.namespace.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.namespace.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.namespace.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.namespace.remove(name)
    }

    pub fn namespace(&self) -> &BTreeMap<String, Value> {
        &self.namespace
    }

    /// Evaluate `expression`, failing if the result is undefined.
    pub fn eval(&self, expression: &str) -> Result<Value, EvaluationError> {
        let compiled = self
            .env
            .compile_expression_owned(expression.to_string())
            .map_err(|error| EvaluationError::from_jinja(expression, &error))?;
        let value = compiled
            .eval(&self.namespace)
            .map_err(|error| EvaluationError::from_jinja(expression, &error))?;
        if value.is_undefined() {
            return Err(EvaluationError::new(
                ErrorKind::Undefined,
                format!("undefined value `{expression}`"),
            ));
        }
        Ok(value)
    }

    /// Evaluate `expression` for its truth value.
    pub fn truthy(&self, expression: &str) -> Result<bool, EvaluationError> {
        Ok(self.eval(expression)?.is_true())
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Quote `text` as a string literal.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render a value as an expression that evaluates back to it.
pub fn literal(value: &Value) -> String {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => "none".to_string(),
        ValueKind::Bool => if value.is_true() { "true" } else { "false" }.to_string(),
        ValueKind::Number => value.to_string(),
        ValueKind::Seq => {
            let items: Vec<String> = value
                .try_iter()
                .map(|items| items.map(|item| literal(&item)).collect())
                .unwrap_or_default();
            format!("[{}]", items.join(", "))
        }
        ValueKind::Map => {
            let entries: Vec<String> = value
                .try_iter()
                .map(|keys| {
                    keys.map(|key| {
                        let item = value.get_item(&key).unwrap_or_default();
                        format!("{}: {}", literal(&key), literal(&item))
                    })
                    .collect()
                })
                .unwrap_or_default();
            format!("{{{}}}", entries.join(", "))
        }
        _ => quote(&value.to_string()),
    }
}

/// Render a value as output text.
pub fn render(value: &Value) -> String {
    match value.kind() {
        ValueKind::None | ValueKind::Undefined => String::new(),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval() {
        let mut evaluator = Evaluator::new();
        evaluator.set("x", 2);
        assert_eq!(evaluator.eval("x + 1").unwrap(), Value::from(3));
        assert_eq!(evaluator.eval("'a' ~ x").unwrap(), Value::from("a2"));
        assert_eq!(evaluator.eval("{'x': 1, 'y': 2}['x']").unwrap(), Value::from(1));
        assert!(evaluator.truthy("x == 2 and True").unwrap());
    }

    #[test]
    fn test_undefined() {
        let evaluator = Evaluator::new();
        let error = evaluator.eval("j").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Undefined);
        assert_eq!(error.message(), "undefined value `j`");
        assert!(evaluator.eval("j + 1").is_err());
    }

    #[test]
    fn test_syntax_error() {
        let error = Evaluator::new().eval("1 +").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Syntax);
        assert!(error.message().ends_with("in `1 +`"));
    }

    #[test]
    fn test_builtins() {
        let mut evaluator = Evaluator::new();
        evaluator.set("items", vec![1, 2, 3]);
        assert_eq!(evaluator.eval("len(items)").unwrap(), Value::from(3));
        assert_eq!(evaluator.eval("str(1) ~ 'x'").unwrap(), Value::from("1x"));
        assert_eq!(
            evaluator.eval("range(3)|list").unwrap(),
            Value::from(vec![0, 1, 2])
        );
    }

    #[test]
    fn test_register_helper() {
        let mut evaluator = Evaluator::new();
        evaluator.register("shout", string_helper(|s| s.to_uppercase()));
        assert_eq!(evaluator.eval("shout('hi')").unwrap(), Value::from("HI"));
        let error = evaluator.eval("shout('a', 'b')").unwrap_err();
        assert!(error.message().contains("expected 1 argument, got 2"));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("line "), r#""line ""#);
        assert_eq!(quote("a\"b\\c\nd"), r#""a\"b\\c\nd""#);
    }

    #[test]
    fn test_literal_round_trip() {
        let evaluator = Evaluator::new();
        let values = [
            Value::from(1),
            Value::from("it's \"quoted\""),
            Value::from(true),
            Value::from(()),
            Value::from(vec![Value::from(1), Value::from("a")]),
            Value::from_iter([("k", 1)]),
        ];
        for value in values {
            assert_eq!(evaluator.eval(&literal(&value)).unwrap(), value);
        }
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&Value::from("x")), "x");
        assert_eq!(render(&Value::from(1.5)), "1.5");
        assert_eq!(render(&Value::from(())), "");
    }
}
