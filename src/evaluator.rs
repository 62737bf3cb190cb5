//! Expression evaluation against a [`ScopeChain`].
//!
//! The runtime talks to an [`Evaluator`] trait object, so hosts can plug in a real
//! expression language. [`SimpleEvaluator`] covers what directives need out of the
//! box:
//!
//! ```text
//! 'text' / JSON literals      "a", 1, true, null, [1, 2], {"a": 1}
//! undefined                   null
//! paths                       item.id, items[0], row['name'], $event.detail
//! negation                    !open
//! equality                    a == b, a === b, a != b, a !== b
//! assignment (execute only)   open = !open; count = 2
//! scoped ids                  $id('tab'), $id('tab', item.id)
//! ```

use crate::directives::id::element_id;
use crate::error::{DirectiveError, Result};
use crate::scope::ScopeChain;
use crate::types::{is_truthy, value_to_attribute_string, Value};

/// Evaluates textual expressions.
pub trait Evaluator {
    /// Evaluate an expression to a value.
    fn evaluate(&self, expression: &str, scope: &ScopeChain) -> Result<Value>;

    /// Run a statement (event handlers, `init`). Defaults to evaluation.
    fn execute(&self, expression: &str, scope: &ScopeChain) -> Result<Value> {
        self.evaluate(expression, scope)
    }
}

/// Small built-in expression language.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleEvaluator;

impl Evaluator for SimpleEvaluator {
    fn evaluate(&self, expression: &str, scope: &ScopeChain) -> Result<Value> {
        eval_expression(expression.trim(), scope)
    }

    fn execute(&self, expression: &str, scope: &ScopeChain) -> Result<Value> {
        let mut last = Value::Null;
        for statement in split_top_level(expression, ';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            last = match find_assignment(statement) {
                Some(position) => {
                    let target = statement[..position].trim();
                    if !is_identifier(target) {
                        return Err(DirectiveError::parse(statement, "can only assign to a name"));
                    }
                    let value = eval_expression(statement[position + 1..].trim(), scope)?;
                    if !scope.assign(target, value.clone()) {
                        return Err(DirectiveError::Assignment(target.to_string()));
                    }
                    value
                }
                None => eval_expression(statement, scope)?,
            };
        }
        Ok(last)
    }
}

// =============================================================================
// Expressions
// =============================================================================

fn eval_expression(expression: &str, scope: &ScopeChain) -> Result<Value> {
    if expression.is_empty() {
        return Ok(Value::Null);
    }

    for operator in ["===", "!==", "==", "!="] {
        if let Some(position) = find_top_level(expression, operator) {
            let left = eval_expression(expression[..position].trim(), scope)?;
            let right = eval_expression(expression[position + operator.len()..].trim(), scope)?;
            let equal = loose_equals(&left, &right);
            return Ok(Value::Bool(if operator.starts_with('!') { !equal } else { equal }));
        }
    }

    if let Some(rest) = expression.strip_prefix('!') {
        let value = eval_expression(rest.trim(), scope)?;
        return Ok(Value::Bool(!is_truthy(&value)));
    }

    if let Some(inner) = strip_wrapping(expression, '(', ')') {
        return eval_expression(inner.trim(), scope);
    }

    if expression == "undefined" {
        return Ok(Value::Null);
    }

    if let Some(text) = single_quoted(expression) {
        return Ok(Value::String(text.to_string()));
    }

    if let Ok(value) = serde_json::from_str::<Value>(expression) {
        return Ok(value);
    }

    if let Some(arguments) = expression.strip_prefix("$id").and_then(|rest| strip_wrapping(rest, '(', ')')) {
        return eval_id(expression, arguments, scope);
    }

    eval_path(expression, scope)
}

/// `$id(name[, key])` against the node the chain belongs to.
fn eval_id(expression: &str, arguments: &str, scope: &ScopeChain) -> Result<Value> {
    let node = scope.node().ok_or_else(|| DirectiveError::parse(expression, "$id needs a node"))?;
    let arguments = split_top_level(arguments, ',');
    let name = match arguments.first().map(|name| name.trim()) {
        Some(name) if !name.is_empty() => value_to_attribute_string(&eval_expression(name, scope)?),
        _ => return Err(DirectiveError::parse(expression, "$id needs a name")),
    };
    let key = match arguments.get(1) {
        Some(key) => eval_expression(key.trim(), scope)?,
        None => Value::Null,
    };
    let key = is_truthy(&key).then(|| value_to_attribute_string(&key));
    Ok(Value::String(element_id(node, &name, key.as_deref())))
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn single_quoted(expression: &str) -> Option<&str> {
    let inner = expression.strip_prefix('\'')?.strip_suffix('\'')?;
    (!inner.contains('\'')).then_some(inner)
}

fn strip_wrapping(expression: &str, open: char, close: char) -> Option<&str> {
    let inner = expression.strip_prefix(open)?.strip_suffix(close)?;
    // `(a) == (b)` must not be unwrapped into `a) == (b`
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    (depth == 0).then_some(inner)
}

// =============================================================================
// Paths
// =============================================================================

enum Segment {
    Field(String),
    Index(usize),
}

fn eval_path(expression: &str, scope: &ScopeChain) -> Result<Value> {
    let (root, segments) = parse_path(expression)?;
    let mut value = scope
        .lookup(&root)
        .ok_or_else(|| DirectiveError::UndefinedVariable(root.clone()))?;

    for segment in segments {
        value = match (segment, value) {
            (Segment::Field(name), Value::Object(mut map)) => map.remove(&name).unwrap_or(Value::Null),
            (Segment::Field(name), Value::Array(items)) if name == "length" => Value::from(items.len()),
            (Segment::Field(name), Value::String(text)) if name == "length" => {
                Value::from(text.chars().count())
            }
            (Segment::Index(i), Value::Array(mut items)) if i < items.len() => items.swap_remove(i),
            (Segment::Index(i), Value::Object(mut map)) => map.remove(&i.to_string()).unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    Ok(value)
}

fn parse_path(expression: &str) -> Result<(String, Vec<Segment>)> {
    let chars: Vec<char> = expression.chars().collect();
    let mut i = 0;
    let root = read_identifier(&chars, &mut i)
        .ok_or_else(|| DirectiveError::parse(expression, "expected a name"))?;

    let mut segments = Vec::new();
    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                let field = read_identifier(&chars, &mut i)
                    .ok_or_else(|| DirectiveError::parse(expression, "expected a field after `.`"))?;
                segments.push(Segment::Field(field));
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|p| p + i)
                    .ok_or_else(|| DirectiveError::parse(expression, "unclosed `[`"))?;
                let inner: String = chars[i + 1..close].iter().collect();
                let inner = inner.trim();
                let segment = if let Ok(index) = inner.parse::<usize>() {
                    Segment::Index(index)
                } else if let Some(text) = single_quoted(inner) {
                    Segment::Field(text.to_string())
                } else if let Ok(Value::String(text)) = serde_json::from_str::<Value>(inner) {
                    Segment::Field(text)
                } else {
                    return Err(DirectiveError::parse(expression, "unsupported index"));
                };
                segments.push(segment);
                i = close + 1;
            }
            c if c.is_whitespace() => i += 1,
            c => {
                return Err(DirectiveError::parse(expression, format!("unexpected `{c}`")));
            }
        }
    }
    Ok((root, segments))
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn read_identifier(chars: &[char], i: &mut usize) -> Option<String> {
    let start = *i;
    if start >= chars.len() || chars[start].is_ascii_digit() {
        return None;
    }
    while *i < chars.len() && is_identifier_char(chars[*i]) {
        *i += 1;
    }
    (*i > start).then(|| chars[start..*i].iter().collect())
}

pub(crate) fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if !first.is_ascii_digit() && is_identifier_char(first) => {
            chars.all(is_identifier_char)
        }
        _ => false,
    }
}

// =============================================================================
// Top-level scanning
// =============================================================================

/// Byte offsets of characters outside quotes and brackets.
fn top_level_positions(text: &str) -> Vec<(usize, char)> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (position, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ if depth == 0 => out.push((position, c)),
                _ => {}
            },
        }
    }
    out
}

fn find_top_level(text: &str, operator: &str) -> Option<usize> {
    top_level_positions(text)
        .into_iter()
        .map(|(position, _)| position)
        .find(|&position| {
            text[position..].starts_with(operator)
                // `==` must not match inside `===` / `!==`
                && !(operator.len() == 2
                    && (text[position + 2..].starts_with('=')
                        || (operator == "==" && text[..position].ends_with('!'))))
        })
}

/// Position of a bare `=` (not part of `==`, `!=`, `<=`, `>=`).
fn find_assignment(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    top_level_positions(text).into_iter().find_map(|(position, c)| {
        if c != '=' {
            return None;
        }
        let before = position.checked_sub(1).map(|p| bytes[p]);
        let after = bytes.get(position + 1).copied();
        let compound = matches!(before, Some(b'=' | b'!' | b'<' | b'>')) || after == Some(b'=');
        (!compound).then_some(position)
    })
}

/// Split on `separator` outside quotes and brackets.
pub(crate) fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (position, c) in top_level_positions(text) {
        if c == separator {
            parts.push(&text[start..position]);
            start = position + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ReactiveScope;
    use serde_json::json;

    fn chain(value: Value) -> ScopeChain {
        let scope = match value {
            Value::Object(map) => map,
            _ => Default::default(),
        };
        ScopeChain::new(vec![ReactiveScope::new(scope)], Default::default())
    }

    #[test]
    fn test_literals() {
        let scope = chain(json!({}));
        let eval = SimpleEvaluator;
        assert_eq!(eval.evaluate("", &scope).unwrap(), json!(null));
        assert_eq!(eval.evaluate("'hi'", &scope).unwrap(), json!("hi"));
        assert_eq!(eval.evaluate("\"hi\"", &scope).unwrap(), json!("hi"));
        assert_eq!(eval.evaluate("[1, 2, 3]", &scope).unwrap(), json!([1, 2, 3]));
        assert_eq!(eval.evaluate("{\"a\": 1}", &scope).unwrap(), json!({"a": 1}));
        assert_eq!(eval.evaluate("undefined", &scope).unwrap(), json!(null));
    }

    #[test]
    fn test_paths() {
        let scope = chain(json!({"item": {"id": 7, "tags": ["a", "b"]}, "rows": [{"name": "r"}]}));
        let eval = SimpleEvaluator;
        assert_eq!(eval.evaluate("item.id", &scope).unwrap(), json!(7));
        assert_eq!(eval.evaluate("item.tags[1]", &scope).unwrap(), json!("b"));
        assert_eq!(eval.evaluate("item.tags.length", &scope).unwrap(), json!(2));
        assert_eq!(eval.evaluate("rows[0]['name']", &scope).unwrap(), json!("r"));
        assert_eq!(eval.evaluate("item.missing", &scope).unwrap(), json!(null));
        assert!(matches!(
            eval.evaluate("nope", &scope),
            Err(DirectiveError::UndefinedVariable(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_operators() {
        let scope = chain(json!({"open": false, "n": 1, "s": "x"}));
        let eval = SimpleEvaluator;
        assert_eq!(eval.evaluate("!open", &scope).unwrap(), json!(true));
        assert_eq!(eval.evaluate("n == 1", &scope).unwrap(), json!(true));
        assert_eq!(eval.evaluate("n === 1.0", &scope).unwrap(), json!(true));
        assert_eq!(eval.evaluate("s !== 'x'", &scope).unwrap(), json!(false));
        assert_eq!(eval.evaluate("s != 'y'", &scope).unwrap(), json!(true));
        assert_eq!(eval.evaluate("(n == 1)", &scope).unwrap(), json!(true));
    }

    #[test]
    fn test_execute_assignment() {
        let scope = chain(json!({"open": false, "count": 0}));
        let eval = SimpleEvaluator;
        eval.execute("open = !open; count = 2", &scope).unwrap();
        assert_eq!(scope.lookup("open"), Some(json!(true)));
        assert_eq!(scope.lookup("count"), Some(json!(2)));

        assert!(matches!(
            eval.execute("missing = 1", &scope),
            Err(DirectiveError::Assignment(_))
        ));
        assert_eq!(eval.execute("open == true", &scope).unwrap(), json!(true));
    }

    #[test]
    fn test_id_needs_a_node() {
        let scope = chain(json!({}));
        assert!(matches!(
            SimpleEvaluator.evaluate("$id('tab')", &scope),
            Err(DirectiveError::Parse { .. })
        ));
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_top_level("a, [b, c], {d: e}", ','), vec!["a", " [b, c]", " {d: e}"]);
        assert_eq!(split_top_level("'a;b'; c", ';'), vec!["'a;b'", " c"]);
    }
}
