//! Mock serving pipeline.
//!
//! Composes resolution, response selection, artificial delay and rendering.
//! Every failure is recovered locally: a dispatch always produces a
//! well-formed response.

use crate::config::{
    DefaultResponse, EndpointDefinition, EndpointStatus, GlobalSettings, MockServerConfig,
    ResponseDefinition,
};
use crate::error::ConfigError;
use crate::matcher::{MatchIndex, Resolution};
use crate::request::MockRequest;
use crate::selector::{ResponseSelector, StatusHint};
use crate::source::DefinitionSource;
use crate::template::{RenderContext, TemplateEngine};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A configured response was selected and rendered
    Mocked,
    /// The endpoint echoed the request body back
    Echoed,
    /// No endpoint matched the request
    NotFound,
    /// The endpoint matched but no response could be selected
    NoResponse,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Mocked => "mocked",
            DispatchOutcome::Echoed => "echoed",
            DispatchOutcome::NotFound => "not_found",
            DispatchOutcome::NoResponse => "no_response",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response handed back to the transport layer.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    /// Content-Type first, the rest ordered by name
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub outcome: DispatchOutcome,
    pub endpoint_id: Option<String>,
    pub response_id: Option<String>,
}

impl MockResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub total: u64,
    pub matched: u64,
    pub not_found: u64,
    pub no_response: u64,
}

/// Everything derived from one configuration version. Swapped as a whole on
/// reload.
struct Snapshot {
    index: MatchIndex,
    selector: ResponseSelector,
    project_defaults: HashMap<String, DefaultResponse>,
    default_response: DefaultResponse,
    settings: GlobalSettings,
}

impl Snapshot {
    fn build(config: MockServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let index = MatchIndex::build(&config)?;
        let selector = ResponseSelector::new(StatusHint {
            header: config.settings.status_hint_header.clone(),
            query: config.settings.status_hint_query.clone(),
        });
        let project_defaults = config
            .projects
            .iter()
            .filter_map(|p| p.default_response.clone().map(|d| (p.id.clone(), d)))
            .collect();

        Ok(Self {
            index,
            selector,
            project_defaults,
            default_response: config.default_response.unwrap_or_default(),
            settings: config.settings,
        })
    }

    /// Project default, then the global one.
    fn fallback_for(&self, project: &str) -> &DefaultResponse {
        self.project_defaults
            .get(project)
            .unwrap_or(&self.default_response)
    }
}

/// The mock engine.
pub struct MockServer {
    snapshot: RwLock<Arc<Snapshot>>,
    engine: TemplateEngine,
    requests_total: AtomicU64,
    requests_matched: AtomicU64,
    requests_not_found: AtomicU64,
    requests_no_response: AtomicU64,
}

impl MockServer {
    /// Create a server from a configuration, validating it first.
    pub fn new(config: MockServerConfig) -> Result<Self, ConfigError> {
        let snapshot = Snapshot::build(config)?;

        info!(
            endpoints = snapshot.index.endpoint_count(),
            project_defaults = snapshot.project_defaults.len(),
            "Mock server initialized"
        );

        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            engine: TemplateEngine::new(),
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_not_found: AtomicU64::new(0),
            requests_no_response: AtomicU64::new(0),
        })
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Self::new(MockServerConfig::from_yaml(yaml)?)
    }

    /// Load a definition source and create a server from it.
    pub async fn from_source(source: &dyn DefinitionSource) -> Result<Self, ConfigError> {
        Self::new(source.load().await?)
    }

    /// Replace the served definitions. The new index is fully built before
    /// it becomes visible; sequence cursors start over.
    pub fn reload(&self, config: MockServerConfig) -> Result<(), ConfigError> {
        let snapshot = Arc::new(Snapshot::build(config)?);
        let endpoints = snapshot.index.endpoint_count();
        *self.snapshot.write() = snapshot;
        info!(endpoints = endpoints, "Mock definitions reloaded");
        Ok(())
    }

    /// Pull fresh definitions from a source and reload. On error the
    /// current definitions stay in place.
    pub async fn reload_from(&self, source: &dyn DefinitionSource) -> Result<(), ConfigError> {
        let config = source.load().await?;
        self.reload(config)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            total: self.requests_total.load(Ordering::Relaxed),
            matched: self.requests_matched.load(Ordering::Relaxed),
            not_found: self.requests_not_found.load(Ordering::Relaxed),
            no_response: self.requests_no_response.load(Ordering::Relaxed),
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.current().index.endpoint_count()
    }

    /// Raw sequence cursor of an endpoint in the current snapshot.
    pub fn cursor(&self, endpoint_id: &str) -> u64 {
        self.current().selector.cursor(endpoint_id)
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Run one request through resolve, select, delay and render.
    pub async fn dispatch(&self, request: &MockRequest) -> MockResponse {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.current();

        let Some(resolution) = snapshot.index.resolve(
            &request.project,
            &request.application,
            &request.method,
            &request.path,
        ) else {
            self.requests_not_found.fetch_add(1, Ordering::Relaxed);
            if snapshot.settings.log_unmatched {
                warn!(
                    project = %request.project,
                    application = %request.application,
                    method = %request.method,
                    path = %request.path,
                    "No matching endpoint found"
                );
            }
            return fallback(&snapshot, request, DispatchOutcome::NotFound, None);
        };

        let endpoint = Arc::clone(&resolution.endpoint);

        if endpoint.status == EndpointStatus::Echo {
            self.requests_matched.fetch_add(1, Ordering::Relaxed);
            debug!(endpoint_id = %endpoint.id, "Echoing request body");
            return echo(&snapshot, &endpoint, request);
        }

        let Some(response) = snapshot.selector.select(&endpoint, request) else {
            self.requests_no_response.fetch_add(1, Ordering::Relaxed);
            if snapshot.settings.log_unmatched {
                warn!(
                    endpoint_id = %endpoint.id,
                    strategy = ?endpoint.strategy,
                    "No enabled response could be selected"
                );
            }
            return fallback(
                &snapshot,
                request,
                DispatchOutcome::NoResponse,
                Some(endpoint.id.clone()),
            );
        };

        self.requests_matched.fetch_add(1, Ordering::Relaxed);
        if snapshot.settings.log_matches {
            info!(
                endpoint_id = %endpoint.id,
                response_id = %response.id,
                method = %request.method,
                path = %request.path,
                "Request matched endpoint"
            );
        }

        if let Some(delay) = &endpoint.delay {
            let delay_ms = delay.calculate();
            if delay_ms > 0 {
                debug!(endpoint_id = %endpoint.id, delay_ms = delay_ms, "Delaying response");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }

        self.render(&snapshot, &endpoint, response, &resolution, request)
    }

    fn render(
        &self,
        snapshot: &Snapshot,
        endpoint: &EndpointDefinition,
        response: &ResponseDefinition,
        resolution: &Resolution,
        request: &MockRequest,
    ) -> MockResponse {
        let (headers, body) = if response.uses_expressions {
            let ctx = RenderContext::new(
                request,
                &resolution.path_params,
                &snapshot.settings.default_locale,
            );
            (
                self.engine.render_headers(&response.headers, &ctx),
                self.engine.render(&response.body, &ctx),
            )
        } else {
            (response.headers.clone(), response.body.clone())
        };

        MockResponse {
            status: response.status,
            headers: ordered_headers(headers, &snapshot.settings.default_content_type),
            body: body.into_bytes(),
            outcome: DispatchOutcome::Mocked,
            endpoint_id: Some(endpoint.id.clone()),
            response_id: Some(response.id.clone()),
        }
    }
}

fn fallback(
    snapshot: &Snapshot,
    request: &MockRequest,
    outcome: DispatchOutcome,
    endpoint_id: Option<String>,
) -> MockResponse {
    let default = snapshot.fallback_for(&request.project);
    MockResponse {
        status: default.status,
        headers: ordered_headers(
            default.headers.clone(),
            &snapshot.settings.default_content_type,
        ),
        body: default.body.clone().into_bytes(),
        outcome,
        endpoint_id,
        response_id: None,
    }
}

fn echo(snapshot: &Snapshot, endpoint: &EndpointDefinition, request: &MockRequest) -> MockResponse {
    let content_type = request
        .header("content-type")
        .unwrap_or(snapshot.settings.default_content_type.as_str())
        .to_string();

    MockResponse {
        status: 200,
        headers: vec![("Content-Type".to_string(), content_type)],
        body: request.body.clone(),
        outcome: DispatchOutcome::Echoed,
        endpoint_id: Some(endpoint.id.clone()),
        response_id: None,
    }
}

/// Order headers and make sure a Content-Type is present.
fn ordered_headers(
    headers: HashMap<String, String>,
    default_content_type: &str,
) -> Vec<(String, String)> {
    let mut content_type = None;
    let mut rest = Vec::with_capacity(headers.len());

    for (name, value) in headers {
        if name.eq_ignore_ascii_case("content-type") {
            content_type = Some(value);
        } else {
            rest.push((name, value));
        }
    }
    rest.sort();

    let mut ordered = Vec::with_capacity(rest.len() + 1);
    ordered.push((
        "Content-Type".to_string(),
        content_type.unwrap_or_else(|| default_content_type.to_string()),
    ));
    ordered.extend(rest);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn test_config() -> &'static str {
        r#"
settings:
  log_matches: false
default_response:
  status: 418
  body: "global fallback"
projects:
  - id: shop
    default_response:
      status: 404
      headers:
        Content-Type: text/plain
      body: "shop: not mocked"
    applications:
      - id: api
        endpoints:
          - id: list-orders
            method: GET
            uri: /orders
            responses:
              - id: first
                body: "one"
              - id: second
                status: 201
                body: "two"
              - id: off
                enabled: false
                body: "never"
              - id: third
                status: 202
                body: "three"

          - id: get-order
            method: GET
            uri: /orders/{id}
            responses:
              - id: order
                headers:
                  X-Order: "{{PATH_PARAMETER(parameter='id')}}"
                body: >-
                  {"id": "{{PATH_PARAMETER(parameter='id')}}",
                  "method": "{{REQUEST_METHOD()}}"}
                expressions: true

          - id: raw-order
            method: GET
            uri: /raw/{id}
            responses:
              - id: raw
                body: "{{PATH_PARAMETER(parameter='id')}}"

          - id: silent
            method: DELETE
            uri: /orders/{id}
            responses:
              - id: gone
                enabled: false

          - id: echo
            method: POST
            uri: /echo
            status: echo

          - id: slow
            method: GET
            uri: /slow
            delay:
              fixed_ms: 50
            responses:
              - id: eventually
                body: "done"

  - id: other
    applications:
      - id: api
        endpoints: []
"#
    }

    fn server() -> MockServer {
        MockServer::from_yaml(test_config()).unwrap()
    }

    fn get(path: &str) -> MockRequest {
        MockRequest::new("shop", "api", "GET", path)
    }

    #[tokio::test]
    async fn test_sequence_dispatch_cycles() {
        let server = server();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let response = server.dispatch(&get("/orders")).await;
            assert_eq!(response.outcome, DispatchOutcome::Mocked);
            ids.push(response.response_id.unwrap());
        }
        assert_eq!(ids, vec!["first", "second", "third", "first"]);
        assert_eq!(server.cursor("list-orders"), 4);
    }

    #[tokio::test]
    async fn test_rendered_body_and_headers() {
        let server = server();
        let response = server.dispatch(&get("/orders/77")).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body_text(), r#"{"id": "77", "method": "GET"}"#);
        assert_eq!(response.header("x-order"), Some("77"));
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.headers[0].0, "Content-Type");
    }

    #[tokio::test]
    async fn test_expressions_disabled_returns_raw_body() {
        let server = server();
        let response = server.dispatch(&get("/raw/5")).await;
        assert_eq!(response.body_text(), "{{PATH_PARAMETER(parameter='id')}}");
    }

    #[tokio::test]
    async fn test_not_found_uses_project_default() {
        let server = server();
        let response = server.dispatch(&get("/nothing/here")).await;

        assert_eq!(response.outcome, DispatchOutcome::NotFound);
        assert_eq!(response.status, 404);
        assert_eq!(response.body_text(), "shop: not mocked");
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert!(response.endpoint_id.is_none());
    }

    #[tokio::test]
    async fn test_not_found_uses_global_default() {
        let server = server();
        let response = server
            .dispatch(&MockRequest::new("other", "api", "GET", "/x"))
            .await;
        assert_eq!(response.status, 418);
        assert_eq!(response.body_text(), "global fallback");

        let response = server
            .dispatch(&MockRequest::new("unknown", "api", "GET", "/x"))
            .await;
        assert_eq!(response.status, 418);
    }

    #[tokio::test]
    async fn test_zero_enabled_responses_yield_fallback() {
        let server = server();
        let request = MockRequest::new("shop", "api", "DELETE", "/orders/1");

        for _ in 0..3 {
            let response = server.dispatch(&request).await;
            assert_eq!(response.outcome, DispatchOutcome::NoResponse);
            assert_eq!(response.status, 404);
            assert_eq!(response.endpoint_id.as_deref(), Some("silent"));
        }
        assert_eq!(server.stats().no_response, 3);
    }

    #[tokio::test]
    async fn test_echo_endpoint() {
        let server = server();
        let request = MockRequest::new("shop", "api", "POST", "/echo")
            .with_header("Content-Type", "application/xml")
            .with_body("<ping/>");

        let response = server.dispatch(&request).await;
        assert_eq!(response.outcome, DispatchOutcome::Echoed);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"<ping/>");
        assert_eq!(response.header("content-type"), Some("application/xml"));
    }

    #[tokio::test]
    async fn test_delay_is_applied() {
        let server = server();
        let start = Instant::now();
        let response = server.dispatch(&get("/slow")).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(response.body_text(), "done");
    }

    #[tokio::test]
    async fn test_stats() {
        let server = server();
        server.dispatch(&get("/orders")).await;
        server.dispatch(&get("/orders/1")).await;
        server.dispatch(&get("/missing")).await;

        let stats = server.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.matched, 2);
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.no_response, 0);
    }

    #[tokio::test]
    async fn test_reload_swaps_definitions_and_resets_cursors() {
        let server = server();
        server.dispatch(&get("/orders")).await;
        server.dispatch(&get("/orders")).await;
        assert_eq!(server.cursor("list-orders"), 2);

        let mut config = MockServerConfig::from_yaml(test_config()).unwrap();
        config.projects[0].applications[0].endpoints.retain(|e| e.id != "get-order");
        server.reload(config).unwrap();

        assert_eq!(server.cursor("list-orders"), 0);
        let response = server.dispatch(&get("/orders")).await;
        assert_eq!(response.response_id.as_deref(), Some("first"));

        let response = server.dispatch(&get("/orders/3")).await;
        assert_eq!(response.outcome, DispatchOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_invalid_reload_keeps_current() {
        let server = server();
        let mut config = MockServerConfig::from_yaml(test_config()).unwrap();
        config.projects[0].applications[0].endpoints[0].uri = "/a/*/b".to_string();

        assert!(server.reload(config).is_err());
        let response = server.dispatch(&get("/orders")).await;
        assert_eq!(response.outcome, DispatchOutcome::Mocked);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_is_round_robin() {
        let server = Arc::new(server());
        let mut handles = Vec::new();

        for _ in 0..60 {
            let server = Arc::clone(&server);
            handles.push(tokio::spawn(async move {
                server.dispatch(&get("/orders")).await.response_id
            }));
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            let id = handle.await.unwrap().unwrap();
            *counts.entry(id).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&c| c == 20));
        assert_eq!(server.cursor("list-orders"), 60);
    }

    #[test]
    fn test_ordered_headers_defaults_content_type() {
        let headers = HashMap::from([
            ("X-B".to_string(), "2".to_string()),
            ("X-A".to_string(), "1".to_string()),
        ]);
        let ordered = ordered_headers(headers, "text/html");
        assert_eq!(
            ordered,
            vec![
                ("Content-Type".to_string(), "text/html".to_string()),
                ("X-A".to_string(), "1".to_string()),
                ("X-B".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(DispatchOutcome::NoResponse.to_string(), "no_response");
    }
}
