//! Expression parsing.
//!
//! Turns the inner text of a marker into a chain of calls and typed
//! arguments. Splitting respects quote state and bracket nesting, so commas
//! inside strings, lists or nested calls never split an argument.

use crate::error::ExpressionError;
use std::collections::HashMap;
use std::fmt;

/// A numeric argument, keeping track of the range it was written in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i32),
    /// Wider than `i32`, or written with an `L` suffix
    Long(i64),
    Double(f64),
}

impl Number {
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Number::Int(v) => Some(i64::from(v)),
            Number::Long(v) => Some(v),
            Number::Double(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Some(v as i64),
            Number::Double(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Int(v) => f64::from(v),
            Number::Long(v) => v as f64,
            Number::Double(v) => v,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(v) => write!(f, "{}", v),
            Number::Long(v) => write!(f, "{}", v),
            Number::Double(v) => write!(f, "{}", v),
        }
    }
}

/// A typed expression argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionArgument {
    String(String),
    Number(Number),
    Boolean(bool),
    List(Vec<ExpressionArgument>),
}

impl ExpressionArgument {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExpressionArgument::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Integer value; numeric strings are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ExpressionArgument::Number(n) => n.as_i64(),
            ExpressionArgument::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ExpressionArgument::Number(n) => Some(n.as_f64()),
            ExpressionArgument::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ExpressionArgument::Boolean(b) => Some(*b),
            ExpressionArgument::String(s) => parse_bool(s),
            _ => None,
        }
    }
}

impl fmt::Display for ExpressionArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionArgument::String(s) => f.write_str(s),
            ExpressionArgument::Number(n) => write!(f, "{}", n),
            ExpressionArgument::Boolean(b) => write!(f, "{}", b),
            ExpressionArgument::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// One evaluation request for a handler. Positional arguments are keyed by
/// their index (`"0"`, `"1"`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionInput {
    pub identifier: String,
    pub arguments: HashMap<String, ExpressionArgument>,
}

impl ExpressionInput {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            arguments: HashMap::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: ExpressionArgument) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Build the input for a parsed call.
    pub fn from_call(call: &Call<'_>) -> Result<Self, ExpressionError> {
        let mut input = Self::new(call.name);
        for (i, raw) in split_arguments(call.args)?.into_iter().enumerate() {
            match split_named(raw) {
                Some((name, value)) => {
                    input.arguments.insert(name.to_string(), parse_value(value)?);
                }
                None => {
                    input.arguments.insert(i.to_string(), parse_value(raw)?);
                }
            }
        }
        Ok(input)
    }

    pub fn get(&self, name: &str) -> Option<&ExpressionArgument> {
        self.arguments.get(name)
    }

    /// Named argument, falling back to the positional one.
    pub fn lookup(&self, name: &str, position: usize) -> Option<&ExpressionArgument> {
        self.arguments
            .get(name)
            .or_else(|| self.arguments.get(&position.to_string()))
    }

    /// Positional arguments in order, stopping at the first gap.
    pub fn positional(&self) -> Vec<&ExpressionArgument> {
        (0..)
            .map_while(|i: usize| self.arguments.get(&i.to_string()))
            .collect()
    }
}

/// A single `name(args)` link of a call chain; `args` is the raw text
/// between the parentheses.
#[derive(Debug, Clone, PartialEq)]
pub struct Call<'a> {
    pub name: &'a str,
    pub args: &'a str,
}

/// Parse `a(x).b(y, z)` into its calls. A bare identifier is a call with no
/// arguments.
pub fn parse_chain(text: &str) -> Result<Vec<Call<'_>>, ExpressionError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ExpressionError::Malformed("empty expression".into()));
    }

    let bytes = text.as_bytes();
    let mut calls = Vec::new();
    let mut pos = 0;

    loop {
        let start = pos;
        while pos < bytes.len() && is_identifier_byte(bytes[pos]) {
            pos += 1;
        }
        if pos == start {
            return Err(ExpressionError::Malformed(format!(
                "expected identifier at offset {} in '{}'",
                start, text
            )));
        }
        let name = &text[start..pos];

        let args = if bytes.get(pos) == Some(&b'(') {
            let close = find_closing_paren(text, pos)?;
            let args = &text[pos + 1..close];
            pos = close + 1;
            args
        } else {
            ""
        };
        calls.push(Call { name, args });

        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        match bytes.get(pos) {
            None => break,
            Some(b'.') => {
                pos += 1;
                while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
            }
            Some(_) => {
                return Err(ExpressionError::Malformed(format!(
                    "unexpected '{}' in '{}'",
                    &text[pos..],
                    text
                )))
            }
        }
    }

    Ok(calls)
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Index of the `)` matching the `(` at `open`.
fn find_closing_paren(text: &str, open: usize) -> Result<usize, ExpressionError> {
    let mut scanner = Scanner::default();
    for (i, ch) in text[open..].char_indices() {
        if scanner.step(ch) && ch == ')' && scanner.depth == 0 {
            return Ok(open + i);
        }
    }
    Err(ExpressionError::Malformed(format!(
        "unbalanced parentheses in '{}'",
        text
    )))
}

/// Tracks quote state and bracket depth while walking text.
#[derive(Default)]
struct Scanner {
    quote: Option<char>,
    escaped: bool,
    depth: usize,
}

impl Scanner {
    /// Feed one character. Returns true when the character is structural,
    /// i.e. outside any quoted string.
    fn step(&mut self, ch: char) -> bool {
        if let Some(q) = self.quote {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == q {
                self.quote = None;
            }
            return false;
        }
        match ch {
            '"' | '\'' => {
                self.quote = Some(ch);
                false
            }
            '(' | '[' | '{' => {
                self.depth += 1;
                true
            }
            ')' | ']' | '}' => {
                self.depth = self.depth.saturating_sub(1);
                true
            }
            _ => true,
        }
    }
}

/// Split an argument list on top-level commas.
pub fn split_arguments(raw: &str) -> Result<Vec<&str>, ExpressionError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut scanner = Scanner::default();
    let mut parts = Vec::new();
    let mut start = 0;

    for (i, ch) in raw.char_indices() {
        if scanner.step(ch) && ch == ',' && scanner.depth == 0 {
            parts.push(raw[start..i].trim());
            start = i + 1;
        }
    }
    if scanner.quote.is_some() {
        return Err(ExpressionError::Malformed(format!(
            "unterminated string in '{}'",
            raw
        )));
    }
    parts.push(raw[start..].trim());

    if parts.iter().any(|p| p.is_empty()) {
        return Err(ExpressionError::Malformed(format!(
            "empty argument in '{}'",
            raw
        )));
    }
    Ok(parts)
}

/// Split `name=value` when `name` is a plain identifier and the `=` is
/// outside quotes and brackets.
fn split_named(raw: &str) -> Option<(&str, &str)> {
    let mut scanner = Scanner::default();
    for (i, ch) in raw.char_indices() {
        if scanner.step(ch) && ch == '=' && scanner.depth == 0 {
            let name = raw[..i].trim();
            if !name.is_empty() && name.bytes().all(is_identifier_byte) {
                return Some((name, raw[i + 1..].trim()));
            }
            return None;
        }
    }
    None
}

/// Parse a single argument token into a typed value.
pub fn parse_value(raw: &str) -> Result<ExpressionArgument, ExpressionError> {
    let raw = raw.trim();

    if let Some(quoted) = strip_quotes(raw) {
        return Ok(ExpressionArgument::String(unescape(quoted)));
    }
    if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let items = split_arguments(inner)?
            .into_iter()
            .map(parse_value)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(ExpressionArgument::List(items));
    }
    if let Some(b) = parse_bool(raw) {
        return Ok(ExpressionArgument::Boolean(b));
    }
    if let Some(n) = parse_number(raw) {
        return Ok(ExpressionArgument::Number(n));
    }
    Ok(ExpressionArgument::String(raw.to_string()))
}

fn strip_quotes(raw: &str) -> Option<&str> {
    let first = raw.chars().next()?;
    if (first == '"' || first == '\'') && raw.len() >= 2 && raw.ends_with(first) {
        Some(&raw[1..raw.len() - 1])
    } else {
        None
    }
}

/// Only quotes and backslashes are escapable; any other backslash is kept
/// verbatim.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(c @ ('"' | '\'' | '\\')) => out.push(c),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    let first = raw.chars().next()?;
    if !(first.is_ascii_digit() || first == '-' || first == '+' || first == '.') {
        return None;
    }

    if let Some(digits) = raw.strip_suffix('L').or_else(|| raw.strip_suffix('l')) {
        return digits.parse::<i64>().ok().map(Number::Long);
    }
    if let Ok(v) = raw.parse::<i32>() {
        return Some(Number::Int(v));
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Some(Number::Long(v));
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Number::Double)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chain() {
        let calls = parse_chain("name().fullName()").unwrap();
        assert_eq!(
            calls,
            vec![
                Call { name: "name", args: "" },
                Call { name: "fullName", args: "" }
            ]
        );

        let calls = parse_chain("RANDOM_INTEGER(min=1, max=(2))").unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, "min=1, max=(2)");

        let calls = parse_chain("RANDOM_UUID").unwrap();
        assert_eq!(calls, vec![Call { name: "RANDOM_UUID", args: "" }]);
    }

    #[test]
    fn test_parse_chain_respects_quotes() {
        let calls = parse_chain(r#"FAKER(api="address().city()", locale='fr')"#).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, r#"api="address().city()", locale='fr'"#);
    }

    #[test]
    fn test_parse_chain_errors() {
        assert!(parse_chain("").is_err());
        assert!(parse_chain("a(").is_err());
        assert!(parse_chain("a() b()").is_err());
        assert!(parse_chain("a().").is_err());
        assert!(parse_chain("(1)").is_err());
    }

    #[test]
    fn test_split_arguments() {
        let parts = split_arguments(r#"'a, b', f(1, 2), [3, 4], "x\"y,z""#).unwrap();
        assert_eq!(parts, vec!["'a, b'", "f(1, 2)", "[3, 4]", r#""x\"y,z""#]);
        assert!(split_arguments("   ").unwrap().is_empty());
        assert!(split_arguments("1,,2").is_err());
        assert!(split_arguments("'open").is_err());
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(
            parse_value("'FL'").unwrap(),
            ExpressionArgument::String("FL".into())
        );
        assert_eq!(
            parse_value(r#""say \"hi\"""#).unwrap(),
            ExpressionArgument::String("say \"hi\"".into())
        );
        assert_eq!(parse_value("TRUE").unwrap(), ExpressionArgument::Boolean(true));
        assert_eq!(
            parse_value("42").unwrap(),
            ExpressionArgument::Number(Number::Int(42))
        );
        assert_eq!(
            parse_value("2147483647000L").unwrap(),
            ExpressionArgument::Number(Number::Long(2147483647000))
        );
        assert_eq!(
            parse_value("5L").unwrap(),
            ExpressionArgument::Number(Number::Long(5))
        );
        assert_eq!(
            parse_value("3000000000").unwrap(),
            ExpressionArgument::Number(Number::Long(3000000000))
        );
        assert_eq!(
            parse_value("10.5").unwrap(),
            ExpressionArgument::Number(Number::Double(10.5))
        );
        assert_eq!(
            parse_value("DAYS").unwrap(),
            ExpressionArgument::String("DAYS".into())
        );
        assert_eq!(
            parse_value("['a', 2, [true]]").unwrap(),
            ExpressionArgument::List(vec![
                ExpressionArgument::String("a".into()),
                ExpressionArgument::Number(Number::Int(2)),
                ExpressionArgument::List(vec![ExpressionArgument::Boolean(true)]),
            ])
        );
    }

    #[test]
    fn test_input_from_call_mixes_named_and_positional() {
        let calls = parse_chain(r#"DATE(7, unit="days", pattern="%Y-%m-%d")"#).unwrap();
        let input = ExpressionInput::from_call(&calls[0]).unwrap();

        assert_eq!(input.identifier, "DATE");
        assert_eq!(input.lookup("offset", 0).and_then(|a| a.as_i64()), Some(7));
        assert_eq!(input.get("unit").and_then(|a| a.as_str()), Some("days"));
        assert_eq!(input.get("pattern").and_then(|a| a.as_str()), Some("%Y-%m-%d"));
        assert_eq!(input.positional().len(), 1);
    }

    #[test]
    fn test_equals_inside_string_is_not_named() {
        let calls = parse_chain(r#"BODY_REGEX("a=(\d+)")"#).unwrap();
        let input = ExpressionInput::from_call(&calls[0]).unwrap();
        assert_eq!(input.get("0").and_then(|a| a.as_str()), Some(r"a=(\d+)"));
    }

    #[test]
    fn test_argument_coercions() {
        assert_eq!(ExpressionArgument::String(" 12 ".into()).as_i64(), Some(12));
        assert_eq!(ExpressionArgument::Number(Number::Double(4.0)).as_i64(), Some(4));
        assert_eq!(ExpressionArgument::Number(Number::Double(4.5)).as_i64(), None);
        assert_eq!(ExpressionArgument::String("false".into()).as_bool(), Some(false));
        assert_eq!(
            ExpressionArgument::List(vec![
                ExpressionArgument::Number(Number::Int(1)),
                ExpressionArgument::String("b".into()),
            ])
            .to_string(),
            "[1, b]"
        );
    }
}
