//! Value extraction from inbound requests: JSONPath, XPath, regex, headers
//! and query parameters.
//!
//! Used both by match expressions during response selection and by the
//! body-extraction expressions of the template engine.

use crate::config::{MatchExpression, MatchKind};
use crate::error::ExpressionError;
use crate::request::MockRequest;
use jsonpath_rust::JsonPath;
use regex::Regex;
use serde_json::Value;

/// Compile a JSONPath expression.
pub fn compile_json_path(expression: &str) -> Result<JsonPath, String> {
    JsonPath::try_from(expression).map_err(|e| e.to_string())
}

/// Extract the first value selected by a JSONPath expression.
pub fn json_path(body: &str, expression: &str) -> Result<String, ExpressionError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| ExpressionError::Malformed(format!("request body is not JSON: {}", e)))?;
    let path = compile_json_path(expression)
        .map_err(|reason| ExpressionError::invalid("expression", reason))?;

    let first = match path.find(&json) {
        Value::Array(mut found) => {
            if found.is_empty() {
                None
            } else {
                Some(found.swap_remove(0))
            }
        }
        Value::Null => None,
        other => Some(other),
    };

    first.map(json_to_text).ok_or(ExpressionError::NoValue)
}

fn json_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Extract a value using XPath. Node sets yield their first node in
/// document order.
pub fn xpath(body: &str, expression: &str) -> Result<String, ExpressionError> {
    use sxd_document::parser;
    use sxd_xpath::{evaluate_xpath, Value};

    let package = parser::parse(body)
        .map_err(|e| ExpressionError::Malformed(format!("request body is not XML: {:?}", e)))?;
    let document = package.as_document();

    match evaluate_xpath(&document, expression) {
        Ok(Value::String(s)) => Ok(s),
        Ok(Value::Number(n)) => Ok(n.to_string()),
        Ok(Value::Boolean(b)) => Ok(b.to_string()),
        Ok(Value::Nodeset(nodes)) => nodes
            .document_order_first()
            .map(|n| n.string_value())
            .ok_or(ExpressionError::NoValue),
        Err(e) => Err(ExpressionError::invalid("expression", e.to_string())),
    }
}

/// Extract with a regular expression: the first capture group if the
/// pattern has one, otherwise the whole match.
pub fn regex(body: &str, pattern: &str) -> Result<String, ExpressionError> {
    let re = Regex::new(pattern).map_err(|e| ExpressionError::invalid("pattern", e.to_string()))?;
    let caps = re.captures(body).ok_or(ExpressionError::NoValue)?;
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().to_string())
        .ok_or(ExpressionError::NoValue)
}

/// Evaluate a match expression against a request, yielding the value to
/// compare with the expected one.
pub fn evaluate_match(
    expr: &MatchExpression,
    request: &MockRequest,
) -> Result<String, ExpressionError> {
    match expr.kind {
        MatchKind::Header => request
            .header(&expr.expression)
            .map(str::to_string)
            .ok_or(ExpressionError::NoValue),
        MatchKind::Query => request
            .query
            .first(&expr.expression)
            .map(str::to_string)
            .ok_or(ExpressionError::NoValue),
        kind => {
            let body = request
                .body_str()
                .ok_or_else(|| ExpressionError::Malformed("request body is not UTF-8".into()))?;
            match kind {
                MatchKind::JsonPath => json_path(body, &expr.expression),
                MatchKind::XPath => xpath(body, &expr.expression),
                _ => regex(body, &expr.expression),
            }
        }
    }
}
