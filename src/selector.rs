//! Response selection.
//!
//! Picks exactly one candidate response for a resolved endpoint according to
//! its configured strategy. Only the sequence strategy carries state: one
//! atomic cursor per endpoint, created lazily and dropped with the selector.

use crate::config::{EndpointDefinition, ResponseDefinition, ResponseStrategy};
use crate::extract;
use crate::request::MockRequest;
use parking_lot::{RwLock, RwLockWriteGuard};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Where a status-code-echo endpoint reads the requested status from.
#[derive(Debug, Clone)]
pub struct StatusHint {
    pub header: String,
    pub query: String,
}

impl Default for StatusHint {
    fn default() -> Self {
        Self {
            header: "x-mock-status".to_string(),
            query: "mockStatus".to_string(),
        }
    }
}

/// Chooses responses and owns the per-endpoint selection cursors.
pub struct ResponseSelector {
    cursors: RwLock<HashMap<String, AtomicU64>>,
    status_hint: StatusHint,
}

impl Default for ResponseSelector {
    fn default() -> Self {
        Self::new(StatusHint::default())
    }
}

impl ResponseSelector {
    pub fn new(status_hint: StatusHint) -> Self {
        Self {
            cursors: RwLock::new(HashMap::new()),
            status_hint,
        }
    }

    /// Select a response, or `None` when the strategy yields no candidate.
    pub fn select<'a>(
        &self,
        endpoint: &'a EndpointDefinition,
        request: &MockRequest,
    ) -> Option<&'a ResponseDefinition> {
        let enabled = endpoint.enabled_responses();
        if enabled.is_empty() {
            return None;
        }

        match endpoint.strategy {
            ResponseStrategy::Sequence => {
                let index = self.next_index(&endpoint.id, enabled.len());
                Some(enabled[index])
            }
            ResponseStrategy::Random => {
                let index = rand::thread_rng().gen_range(0..enabled.len());
                Some(enabled[index])
            }
            ResponseStrategy::RequestBodyMatch => select_by_match(&endpoint.id, &enabled, request),
            ResponseStrategy::StatusCodeEcho => {
                let requested = self.requested_status(request);
                requested
                    .and_then(|status| enabled.iter().copied().find(|r| r.status == status))
                    .or(Some(enabled[0]))
            }
        }
    }

    /// Atomically advance the endpoint's cursor and map it onto `len`.
    fn next_index(&self, endpoint_id: &str, len: usize) -> usize {
        let mut state = self.cursors.read();
        // Opportunistically use the read lock; insert under the write lock
        // and downgrade when the cursor does not exist yet
        let cursor = if let Some(cursor) = state.get(endpoint_id) {
            cursor
        } else {
            drop(state);
            let mut write = self.cursors.write();
            write.entry(endpoint_id.to_string()).or_default();
            state = RwLockWriteGuard::downgrade(write);
            match state.get(endpoint_id) {
                Some(cursor) => cursor,
                None => return 0,
            }
        };
        let tick = cursor.fetch_add(1, Ordering::Relaxed);
        (tick % len as u64) as usize
    }

    /// Current raw cursor value for an endpoint (0 if never dispatched).
    pub fn cursor(&self, endpoint_id: &str) -> u64 {
        self.cursors
            .read()
            .get(endpoint_id)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Drop all cursors; the next sequence dispatch starts from the first response.
    pub fn reset(&self) {
        self.cursors.write().clear();
    }

    fn requested_status(&self, request: &MockRequest) -> Option<u16> {
        request
            .header(&self.status_hint.header)
            .or_else(|| request.query.first(&self.status_hint.query))
            .and_then(|raw| raw.trim().parse().ok())
    }
}

fn select_by_match<'a>(
    endpoint_id: &str,
    enabled: &[&'a ResponseDefinition],
    request: &MockRequest,
) -> Option<&'a ResponseDefinition> {
    for &response in enabled {
        let Some(expr) = &response.match_expression else {
            continue;
        };
        match extract::evaluate_match(expr, request) {
            Ok(actual) if actual == expr.expected => return Some(response),
            Ok(actual) => {
                debug!(
                    endpoint_id = %endpoint_id,
                    response_id = %response.id,
                    actual = %actual,
                    "Match expression did not match"
                );
            }
            Err(e) => {
                debug!(
                    endpoint_id = %endpoint_id,
                    response_id = %response.id,
                    error = %e,
                    "Match expression could not be evaluated"
                );
            }
        }
    }

    // Fall back to the first response without a match expression
    enabled
        .iter()
        .copied()
        .find(|r| r.match_expression.is_none())
}
