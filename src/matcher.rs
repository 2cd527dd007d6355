//! Request resolution.
//!
//! Maps an inbound verb and path to an endpoint definition and extracts the
//! path variables bound by its URI template.

use crate::config::{EndpointDefinition, EndpointStatus, HttpMethod, MockServerConfig};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Key under which an anonymous trailing wildcard is captured.
pub const WILDCARD_KEY: &str = "*";

/// Result of resolving a request against the index.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The matched endpoint
    pub endpoint: Arc<EndpointDefinition>,
    /// Path variables extracted from template matching
    pub path_params: HashMap<String, String>,
}

/// A compiled URI template.
#[derive(Debug, Clone, PartialEq)]
pub struct UriTemplate {
    segments: Vec<TemplateSegment>,
}

#[derive(Debug, Clone, PartialEq)]
enum TemplateSegment {
    Literal(String),
    Param(String),
    /// Matches the remaining suffix, one or more segments
    Wildcard(String),
}

impl UriTemplate {
    /// Compile a template such as `/users/{id}/files/{rest*}`.
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let trimmed = template.strip_prefix('/').unwrap_or(template);
        let raw: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };

        let mut segments = Vec::with_capacity(raw.len());
        let mut names = HashSet::new();

        for (i, part) in raw.iter().enumerate() {
            let last = i + 1 == raw.len();
            let segment = if *part == "*" || *part == "**" {
                TemplateSegment::Wildcard(WILDCARD_KEY.to_string())
            } else if let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                match inner.strip_suffix('*') {
                    Some(name) => TemplateSegment::Wildcard(name.to_string()),
                    None => TemplateSegment::Param(inner.to_string()),
                }
            } else if part.contains('{') || part.contains('}') {
                return Err(ConfigError::invalid(format!(
                    "invalid template segment '{}' in '{}'",
                    part, template
                )));
            } else {
                TemplateSegment::Literal(part.to_string())
            };

            match &segment {
                TemplateSegment::Param(name) | TemplateSegment::Wildcard(name) => {
                    if name.is_empty() {
                        return Err(ConfigError::invalid(format!(
                            "empty variable name in '{}'",
                            template
                        )));
                    }
                    if !names.insert(name.clone()) {
                        return Err(ConfigError::invalid(format!(
                            "duplicate variable '{}' in '{}'",
                            name, template
                        )));
                    }
                    if matches!(segment, TemplateSegment::Wildcard(_)) && !last {
                        return Err(ConfigError::invalid(format!(
                            "wildcard must be the final segment in '{}'",
                            template
                        )));
                    }
                }
                TemplateSegment::Literal(_) => {}
            }
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    /// Number of literal segments; higher is more specific.
    pub fn specificity(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, TemplateSegment::Literal(_)))
            .count()
    }

    /// Names of the variables this template binds, in order.
    pub fn variables(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                TemplateSegment::Param(name) | TemplateSegment::Wildcard(name) => {
                    Some(name.as_str())
                }
                TemplateSegment::Literal(_) => None,
            })
            .collect()
    }

    /// Match a request path, returning the bound variables.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let parts: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };

        let mut params = HashMap::new();
        let mut idx = 0;

        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(lit) => {
                    if parts.get(idx) != Some(&lit.as_str()) {
                        return None;
                    }
                    idx += 1;
                }
                TemplateSegment::Param(name) => {
                    let value = parts.get(idx).filter(|v| !v.is_empty())?;
                    params.insert(name.clone(), (*value).to_string());
                    idx += 1;
                }
                TemplateSegment::Wildcard(name) => {
                    if idx >= parts.len() {
                        return None;
                    }
                    let rest = parts[idx..].join("/");
                    if rest.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), rest);
                    idx = parts.len();
                }
            }
        }

        // Must consume entire path
        if idx == parts.len() {
            Some(params)
        } else {
            None
        }
    }
}

struct CompiledRoute {
    template: UriTemplate,
    specificity: usize,
    endpoint: Arc<EndpointDefinition>,
}

/// Routes for one application, grouped by verb in definition order.
#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<HttpMethod, Vec<CompiledRoute>>,
}

impl RouteTable {
    /// Register an endpoint. Registration order breaks specificity ties.
    pub fn insert(&mut self, endpoint: EndpointDefinition) -> Result<(), ConfigError> {
        let template = UriTemplate::parse(&endpoint.uri)?;
        let specificity = template.specificity();
        self.routes
            .entry(endpoint.method)
            .or_default()
            .push(CompiledRoute {
                template,
                specificity,
                endpoint: Arc::new(endpoint),
            });
        Ok(())
    }

    /// Resolve a verb and path to the most specific matching endpoint.
    pub fn resolve(&self, method: HttpMethod, path: &str) -> Option<Resolution> {
        let candidates = self.routes.get(&method)?;
        let mut best: Option<(&CompiledRoute, HashMap<String, String>)> = None;

        for route in candidates {
            if route.endpoint.status == EndpointStatus::Disabled {
                continue;
            }
            if let Some((current, _)) = &best {
                // Strictly greater keeps the earliest registration on ties
                if route.specificity <= current.specificity {
                    continue;
                }
            }
            if let Some(params) = route.template.matches(path) {
                best = Some((route, params));
            }
        }

        best.map(|(route, path_params)| Resolution {
            endpoint: Arc::clone(&route.endpoint),
            path_params,
        })
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable snapshot of every route, keyed by project and application.
#[derive(Default)]
pub struct MatchIndex {
    tables: HashMap<(String, String), RouteTable>,
}

impl MatchIndex {
    /// Build a complete index from configuration.
    pub fn build(config: &MockServerConfig) -> Result<Self, ConfigError> {
        let mut tables = HashMap::new();
        for project in &config.projects {
            for application in &project.applications {
                let mut table = RouteTable::default();
                for endpoint in &application.endpoints {
                    table.insert(endpoint.clone())?;
                }
                tables.insert((project.id.clone(), application.id.clone()), table);
            }
        }
        Ok(Self { tables })
    }

    /// Resolve a request. Unknown verbs never match.
    pub fn resolve(
        &self,
        project: &str,
        application: &str,
        method: &str,
        path: &str,
    ) -> Option<Resolution> {
        let method: HttpMethod = method.parse().ok()?;
        self.tables
            .get(&(project.to_string(), application.to_string()))?
            .resolve(method, path)
    }

    pub fn endpoint_count(&self) -> usize {
        self.tables.values().map(RouteTable::len).sum()
    }
}
