//! Configuration for the mock engine.
//!
//! Defines projects, applications, endpoints, candidate responses, and
//! serving settings. This is the shape consumed from the definition store.

use crate::error::ConfigError;
use crate::matcher::UriTemplate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Main configuration for the mock engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// Mocked projects
    #[serde(default)]
    pub projects: Vec<ProjectDefinition>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,

    /// Fallback used when a project has no default response of its own
    #[serde(default)]
    pub default_response: Option<DefaultResponse>,
}

impl MockServerConfig {
    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut endpoint_ids = HashSet::new();
        let mut projects = HashSet::new();

        for project in &self.projects {
            if project.id.is_empty() {
                return Err(ConfigError::invalid("project id cannot be empty"));
            }
            if !projects.insert(project.id.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate project id '{}'",
                    project.id
                )));
            }
            if let Some(default) = &project.default_response {
                validate_status(default.status)
                    .map_err(|e| e.context(format!("project '{}'", project.id)))?;
            }

            let mut applications = HashSet::new();
            for application in &project.applications {
                if !applications.insert(application.id.as_str()) {
                    return Err(ConfigError::invalid(format!(
                        "project '{}': duplicate application id '{}'",
                        project.id, application.id
                    )));
                }
                for endpoint in &application.endpoints {
                    endpoint.validate().map_err(|e| {
                        e.context(format!(
                            "project '{}', application '{}'",
                            project.id, application.id
                        ))
                    })?;
                    if !endpoint_ids.insert(endpoint.id.as_str()) {
                        return Err(ConfigError::invalid(format!(
                            "duplicate endpoint id '{}'",
                            endpoint.id
                        )));
                    }
                }
            }
        }

        if let Some(default) = &self.default_response {
            validate_status(default.status)?;
        }
        Ok(())
    }

    /// Count endpoints across all projects.
    pub fn endpoint_count(&self) -> usize {
        self.projects
            .iter()
            .flat_map(|p| &p.applications)
            .map(|a| a.endpoints.len())
            .sum()
    }
}

/// A project groups applications and owns the "not matched" response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectDefinition {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub applications: Vec<ApplicationDefinition>,

    /// Returned when resolution or selection yields no candidate
    #[serde(default)]
    pub default_response: Option<DefaultResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationDefinition {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub endpoints: Vec<EndpointDefinition>,
}

/// One (verb, URI template) pair and its candidate responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointDefinition {
    /// Unique identifier, also keys the sequence cursor
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    pub method: HttpMethod,

    /// URI template, e.g. `/users/{id}` or `/files/*`
    pub uri: String,

    #[serde(default)]
    pub strategy: ResponseStrategy,

    #[serde(default)]
    pub status: EndpointStatus,

    /// Latency simulation
    #[serde(default)]
    pub delay: Option<DelayConfig>,

    /// Candidate responses in definition order
    #[serde(default)]
    pub responses: Vec<ResponseDefinition>,
}

impl EndpointDefinition {
    /// Validate the endpoint definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::invalid("endpoint id cannot be empty"));
        }
        UriTemplate::parse(&self.uri)
            .map_err(|e| e.context(format!("endpoint '{}'", self.id)))?;

        for response in &self.responses {
            response
                .validate()
                .map_err(|e| e.context(format!("endpoint '{}'", self.id)))?;
        }
        Ok(())
    }

    /// Responses currently eligible for selection, in definition order.
    pub fn enabled_responses(&self) -> Vec<&ResponseDefinition> {
        self.responses.iter().filter(|r| r.enabled).collect()
    }
}

/// HTTP verbs an endpoint can be mocked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            "TRACE" => Ok(HttpMethod::Trace),
            other => Err(ConfigError::invalid(format!("unsupported method '{}'", other))),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy for choosing among candidate responses at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStrategy {
    /// Round-robin over enabled responses
    #[default]
    Sequence,
    /// Uniform random choice per dispatch
    Random,
    /// First response whose match expression holds against the request
    RequestBodyMatch,
    /// Response whose status equals the status requested by the client
    StatusCodeEcho,
}

/// Serving mode of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    #[default]
    Mocked,
    /// Treated as if the endpoint did not exist
    Disabled,
    /// Reflect the request body back to the caller
    Echo,
}

/// A candidate response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    pub id: String,

    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Body template
    #[serde(default)]
    pub body: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Used only by the request-body-match strategy
    #[serde(default, rename = "match")]
    pub match_expression: Option<MatchExpression>,

    /// Whether the body and headers contain expression markers
    #[serde(default, rename = "expressions")]
    pub uses_expressions: bool,
}

fn default_status() -> u16 {
    200
}

fn default_true() -> bool {
    true
}

impl ResponseDefinition {
    /// Validate the response definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_status(self.status).map_err(|e| e.context(format!("response '{}'", self.id)))?;
        if let Some(expr) = &self.match_expression {
            expr.validate()
                .map_err(|e| e.context(format!("response '{}'", self.id)))?;
        }
        Ok(())
    }
}

fn validate_status(status: u16) -> Result<(), ConfigError> {
    if !(100..=599).contains(&status) {
        return Err(ConfigError::invalid(format!("invalid status code: {}", status)));
    }
    Ok(())
}

/// An expression evaluated against the request plus the value it must yield.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchExpression {
    #[serde(rename = "type")]
    pub kind: MatchKind,

    /// Path expression, regex pattern, or header/query name depending on `kind`
    pub expression: String,

    pub expected: String,
}

impl MatchExpression {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.kind {
            MatchKind::Regex => {
                regex::Regex::new(&self.expression)
                    .map_err(|e| ConfigError::invalid(format!("invalid regex: {}", e)))?;
            }
            MatchKind::JsonPath => {
                crate::extract::compile_json_path(&self.expression)
                    .map_err(|e| ConfigError::invalid(format!("invalid JSON path: {}", e)))?;
            }
            MatchKind::XPath => {
                sxd_xpath::Factory::new()
                    .build(&self.expression)
                    .map_err(|e| ConfigError::invalid(format!("invalid XPath: {}", e)))?;
            }
            MatchKind::Header | MatchKind::Query => {
                if self.expression.is_empty() {
                    return Err(ConfigError::invalid("match expression name cannot be empty"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    JsonPath,
    #[serde(rename = "xpath")]
    XPath,
    Regex,
    Header,
    Query,
}

/// Static response emitted when nothing matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultResponse {
    #[serde(default = "default_not_found_status")]
    pub status: u16,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub body: String,
}

fn default_not_found_status() -> u16 {
    404
}

impl Default for DefaultResponse {
    fn default() -> Self {
        Self {
            status: 404,
            headers: HashMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]),
            body: r#"{"error": "not_found", "message": "No matching mock response found"}"#
                .to_string(),
        }
    }
}

/// Delay/latency simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    /// Fixed delay in milliseconds
    #[serde(default)]
    pub fixed_ms: u64,

    /// Minimum delay for random range (ms)
    #[serde(default)]
    pub min_ms: u64,

    /// Maximum delay for random range (ms)
    #[serde(default)]
    pub max_ms: u64,
}

impl DelayConfig {
    /// Calculate the actual delay to apply.
    pub fn calculate(&self) -> u64 {
        if self.fixed_ms > 0 {
            return self.fixed_ms;
        }
        if self.max_ms > self.min_ms {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            return rng.gen_range(self.min_ms..=self.max_ms);
        }
        self.min_ms
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log all matched endpoints
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Content type used when a response sets none
    #[serde(default = "default_content_type")]
    pub default_content_type: String,

    /// Locale for fake data when an expression names none
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Header carrying the requested status for status-code-echo endpoints
    #[serde(default = "default_status_hint_header")]
    pub status_hint_header: String,

    /// Query parameter carrying the requested status
    #[serde(default = "default_status_hint_query")]
    pub status_hint_query: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            default_content_type: default_content_type(),
            default_locale: default_locale(),
            status_hint_header: default_status_hint_header(),
            status_hint_query: default_status_hint_query(),
        }
    }
}

fn default_content_type() -> String {
    "application/json".to_string()
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_status_hint_header() -> String {
    "x-mock-status".to_string()
}

fn default_status_hint_query() -> String {
    "mockStatus".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PETSTORE: &str = r#"
projects:
  - id: petstore
    applications:
      - id: v1
        endpoints:
          - id: get-pet
            method: GET
            uri: /pets/{id}
            strategy: sequence
            responses:
              - id: ok
                status: 200
                body: |
                  {"id": "{{PATH_PARAMETER(parameter='id')}}"}
                expressions: true
              - id: gone
                status: 410
                enabled: false
"#;

    #[test]
    fn test_parse_simple_endpoint() {
        let config = MockServerConfig::from_yaml(PETSTORE).unwrap();
        assert_eq!(config.projects.len(), 1);
        let endpoint = &config.projects[0].applications[0].endpoints[0];
        assert_eq!(endpoint.id, "get-pet");
        assert_eq!(endpoint.method, HttpMethod::Get);
        assert_eq!(endpoint.strategy, ResponseStrategy::Sequence);
        assert_eq!(endpoint.status, EndpointStatus::Mocked);
        assert!(endpoint.responses[0].uses_expressions);
        assert_eq!(endpoint.enabled_responses().len(), 1);
        assert_eq!(config.endpoint_count(), 1);
    }

    #[test]
    fn test_parse_match_expression() {
        let yaml = r#"
projects:
  - id: p
    applications:
      - id: a
        endpoints:
          - id: classify
            method: POST
            uri: /animals
            strategy: request_body_match
            responses:
              - id: dog
                match:
                  type: json_path
                  expression: "$.kind"
                  expected: dog
              - id: cat
                match:
                  type: xpath
                  expression: "/animal/kind"
                  expected: cat
              - id: fallback
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        let endpoint = &config.projects[0].applications[0].endpoints[0];
        assert_eq!(endpoint.strategy, ResponseStrategy::RequestBodyMatch);
        let dog = endpoint.responses[0].match_expression.as_ref().unwrap();
        assert_eq!(dog.kind, MatchKind::JsonPath);
        assert_eq!(dog.expected, "dog");
        assert_eq!(
            endpoint.responses[1].match_expression.as_ref().unwrap().kind,
            MatchKind::XPath
        );
        assert!(endpoint.responses[2].match_expression.is_none());
    }

    #[test]
    fn test_parse_delay_config() {
        let yaml = r#"
projects:
  - id: p
    applications:
      - id: a
        endpoints:
          - id: slow
            method: GET
            uri: /slow
            delay:
              fixed_ms: 1000
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        let endpoint = &config.projects[0].applications[0].endpoints[0];
        assert_eq!(endpoint.delay.as_ref().unwrap().fixed_ms, 1000);
    }

    #[test]
    fn test_reject_duplicate_endpoint_ids() {
        let yaml = r#"
projects:
  - id: p
    applications:
      - id: a
        endpoints:
          - id: same
            method: GET
            uri: /a
          - id: same
            method: GET
            uri: /b
"#;
        let err = MockServerConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate endpoint id"));
    }

    #[test]
    fn test_reject_invalid_status() {
        let yaml = r#"
projects:
  - id: p
    applications:
      - id: a
        endpoints:
          - id: bad
            method: GET
            uri: /a
            responses:
              - id: r
                status: 999
"#;
        let err = MockServerConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("invalid status code"));
    }

    #[test]
    fn test_reject_misplaced_wildcard() {
        let yaml = r#"
projects:
  - id: p
    applications:
      - id: a
        endpoints:
          - id: bad
            method: GET
            uri: /files/*/meta
"#;
        assert!(MockServerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_reject_invalid_regex_match() {
        let expr = MatchExpression {
            kind: MatchKind::Regex,
            expression: "(".to_string(),
            expected: "x".to_string(),
        };
        assert!(expr.validate().is_err());
    }

    #[test]
    fn test_reject_unknown_fields() {
        let yaml = r#"
projects:
  - id: p
    colour: blue
"#;
        assert!(MockServerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("PATCH".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("CONNECT".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_delay_calculation() {
        let fixed = DelayConfig {
            fixed_ms: 100,
            min_ms: 0,
            max_ms: 0,
        };
        assert_eq!(fixed.calculate(), 100);

        let range = DelayConfig {
            fixed_ms: 0,
            min_ms: 50,
            max_ms: 150,
        };
        let delay = range.calculate();
        assert!((50..=150).contains(&delay));
    }

    #[test]
    fn test_default_settings() {
        let settings = GlobalSettings::default();
        assert_eq!(settings.default_locale, "en");
        assert_eq!(settings.status_hint_header, "x-mock-status");
        assert_eq!(settings.default_content_type, "application/json");
    }

    #[test]
    fn test_demo_config_is_valid() {
        let yaml = include_str!("../demos/default-config.yaml");
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.projects.len(), 1);
        assert_eq!(config.endpoint_count(), 6);
        assert!(config.default_response.is_some());
    }
}
