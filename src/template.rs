//! Expression engine for dynamic response bodies and headers.
//!
//! Text between `{{` and `}}` is an expression: either a handler call such
//! as `RANDOM_INTEGER(min=1, max=10)` or a fake data chain such as
//! `name().firstName()`, which is shorthand for
//! `FAKER(api="name().firstName()")`. Everything else is copied through.
//!
//! Rendering never fails. An expression that cannot be parsed or evaluated
//! renders as the empty string and the rest of the template is unaffected.

pub mod faker;
pub mod handlers;
pub mod parser;

use crate::error::ExpressionError;
use crate::request::MockRequest;
use handlers::Handler;
use parser::{ExpressionArgument, ExpressionInput};
use std::collections::HashMap;
use tracing::debug;

pub const MARKER_START: &str = "{{";
pub const MARKER_END: &str = "}}";

/// Request-scoped data available to expressions.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub request: &'a MockRequest,
    pub path_params: &'a HashMap<String, String>,
    /// Fallback locale for fake data
    pub locale: &'a str,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        request: &'a MockRequest,
        path_params: &'a HashMap<String, String>,
        locale: &'a str,
    ) -> Self {
        Self {
            request,
            path_params,
            locale,
        }
    }
}

/// Renders templates containing `{{ }}` expressions.
#[derive(Debug, Clone, Default)]
pub struct TemplateEngine {
    _private: (),
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a template, replacing each expression with its value.
    pub fn render(&self, template: &str, ctx: &RenderContext<'_>) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find(MARKER_START) {
            out.push_str(&rest[..start]);
            let inner_start = start + MARKER_START.len();
            match find_marker_end(&rest[inner_start..]) {
                Some(len) => {
                    let expression = &rest[inner_start..inner_start + len];
                    out.push_str(&self.evaluate_marker(expression, ctx));
                    rest = &rest[inner_start + len + MARKER_END.len()..];
                }
                None => {
                    // Unterminated: copy verbatim
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }

        out.push_str(rest);
        out
    }

    /// Render a map of header values.
    pub fn render_headers(
        &self,
        headers: &HashMap<String, String>,
        ctx: &RenderContext<'_>,
    ) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| (name.clone(), self.render(value, ctx)))
            .collect()
    }

    /// Evaluate the text of a single marker.
    pub fn evaluate(
        &self,
        expression: &str,
        ctx: &RenderContext<'_>,
    ) -> Result<String, ExpressionError> {
        let input = to_input(expression)?;
        let handler = Handler::from_identifier(&input.identifier)
            .ok_or_else(|| ExpressionError::UnknownIdentifier(input.identifier.clone()))?;
        handler.evaluate(&input, ctx)
    }

    fn evaluate_marker(&self, expression: &str, ctx: &RenderContext<'_>) -> String {
        match self.evaluate(expression, ctx) {
            Ok(value) => value,
            Err(e) => {
                debug!(expression = %expression.trim(), error = %e, "Expression rendered empty");
                String::new()
            }
        }
    }
}

/// Turn marker text into handler input. A chain of two or more calls is
/// fake data shorthand.
fn to_input(expression: &str) -> Result<ExpressionInput, ExpressionError> {
    let expression = expression.trim();
    let calls = parser::parse_chain(expression)?;
    match calls.as_slice() {
        [call] => ExpressionInput::from_call(call),
        [] => Err(ExpressionError::Malformed("empty expression".into())),
        _ => Ok(ExpressionInput::new(Handler::Faker.identifier())
            .with_argument("api", ExpressionArgument::String(expression.to_string()))),
    }
}

/// Byte length of the marker body, finding the first `}}` that is not
/// inside a quoted string.
fn find_marker_end(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if bytes[i..].starts_with(MARKER_END.as_bytes()) => return Some(i),
            None => {}
        }
        i += 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(template: &str, request: &MockRequest) -> String {
        let params = HashMap::from([("id".to_string(), "17".to_string())]);
        let ctx = RenderContext::new(request, &params, "en");
        TemplateEngine::new().render(template, &ctx)
    }

    fn request() -> MockRequest {
        MockRequest::new("p", "a", "GET", "/users/17")
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(render("hello world", &request()), "hello world");
        assert_eq!(render("{ \"a\": 1 }", &request()), "{ \"a\": 1 }");
        assert_eq!(render("", &request()), "");
    }

    #[test]
    fn test_mixed_text_and_expressions() {
        let out = render(
            r#"{"id": "{{PATH_PARAMETER(parameter='id')}}", "method": "{{REQUEST_METHOD()}}"}"#,
            &request(),
        );
        assert_eq!(out, r#"{"id": "17", "method": "GET"}"#);
    }

    #[test]
    fn test_whitespace_inside_marker() {
        assert_eq!(render("{{ REQUEST_PATH() }}", &request()), "/users/17");
    }

    #[test]
    fn test_unknown_chain_renders_empty() {
        assert_eq!(render("{{notExisting().notExisting()}}", &request()), "");
        assert_eq!(render("[{{NOT_A_HANDLER()}}]", &request()), "[]");
    }

    #[test]
    fn test_failure_does_not_abort_rest() {
        let out = render(
            "a={{QUERY_STRING(query='missing')}} b={{REQUEST_METHOD()}} c={{BROKEN(}}",
            &request(),
        );
        assert_eq!(out, "a= b=GET c=");
    }

    #[test]
    fn test_closing_marker_inside_quotes() {
        let req = request().with_query("a}}b=v");
        let out = render("<{{QUERY_STRING(query='a}}b')}}>", &req);
        assert_eq!(out, "<v>");
    }

    #[test]
    fn test_unterminated_marker_is_verbatim() {
        assert_eq!(render("before {{REQUEST_METHOD()", &request()), "before {{REQUEST_METHOD()");
        assert_eq!(
            render("{{REQUEST_METHOD()}} and {{ oops", &request()),
            "GET and {{ oops"
        );
    }

    #[test]
    fn test_non_ascii_inside_marker() {
        let out = render("<{{RANDOM_ENUM(values=[café, thé])}}>", &request());
        assert!(out == "<café>" || out == "<thé>", "got {}", out);

        let out = render("{{ prix à définir }} reste", &request());
        assert_eq!(out, " reste");
    }

    #[test]
    fn test_non_ascii_after_unterminated_marker() {
        assert_eq!(render("Prix: {{ à définir", &request()), "Prix: {{ à définir");
        assert_eq!(render("{{ 日本語", &request()), "{{ 日本語");
    }

    #[test]
    fn test_chain_shorthand_generates_fake_data() {
        let out = render("{{name().firstName()}}", &request());
        assert!(!out.is_empty());
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_render_headers() {
        let req = request().with_header("X-Request-Id", "r-9");
        let params = HashMap::new();
        let ctx = RenderContext::new(&req, &params, "en");
        let headers = HashMap::from([
            ("X-Echo".to_string(), "{{REQUEST_HEADER(name='x-request-id')}}".to_string()),
            ("Content-Type".to_string(), "text/plain".to_string()),
        ]);

        let rendered = TemplateEngine::new().render_headers(&headers, &ctx);
        assert_eq!(rendered["X-Echo"], "r-9");
        assert_eq!(rendered["Content-Type"], "text/plain");
    }

    #[test]
    fn test_evaluate_reports_errors() {
        let req = request();
        let params = HashMap::new();
        let ctx = RenderContext::new(&req, &params, "en");
        let engine = TemplateEngine::new();

        assert_eq!(
            engine.evaluate("NOPE()", &ctx),
            Err(ExpressionError::UnknownIdentifier("NOPE".to_string()))
        );
        assert!(matches!(engine.evaluate("", &ctx), Err(ExpressionError::Malformed(_))));
    }
}
