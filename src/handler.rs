//! Per-request mock pipeline.
//!
//! For one endpoint: select the response source, resolve behavior, wait,
//! maybe inject a fault, then render headers, body and status.

use crate::behavior::{self, EffectiveBehavior};
use crate::config::{Endpoint, MockSpec, ResponseSource};
use crate::matcher::{matches, MockRequest};
use crate::template::{render, render_string, RenderContext, RenderError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Body message for requests no variant or endpoint rule accepts.
pub const NO_MATCH_MESSAGE: &str = "No matching mock for request";

/// Response produced by the pipeline, before the HTTP layer encodes it.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: u16,
    /// Rendered header values, in no particular order
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl MockResponse {
    fn no_match() -> Self {
        Self {
            status: 404,
            headers: Vec::new(),
            body: json!({ "error": NO_MATCH_MESSAGE }),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Handler bound to one endpoint of a loaded spec.
#[derive(Debug, Clone)]
pub struct MockHandler {
    spec: Arc<MockSpec>,
    index: usize,
}

impl MockHandler {
    /// Handler for `spec.endpoints[index]`.
    pub fn new(spec: Arc<MockSpec>, index: usize) -> Self {
        debug_assert!(index < spec.endpoints.len());
        Self { spec, index }
    }

    /// One handler per endpoint, in declaration order.
    pub fn for_spec(spec: &Arc<MockSpec>) -> Vec<Self> {
        (0..spec.endpoints.len())
            .map(|index| Self::new(Arc::clone(spec), index))
            .collect()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.spec.endpoints[self.index]
    }

    /// Run the pipeline for one request.
    ///
    /// Render failures are spec errors and are returned to the caller
    /// rather than turned into a response here.
    pub async fn handle(&self, request: &MockRequest) -> Result<MockResponse, RenderError> {
        let settings = &self.spec.settings;
        let endpoint = self.endpoint();

        let Some(chosen) = select(endpoint, request) else {
            warn!(
                method = %endpoint.method,
                path = %endpoint.path,
                url_path = %request.path,
                "No matching mock for request"
            );
            return Ok(MockResponse::no_match());
        };

        let EffectiveBehavior {
            delay_ms,
            error_rate,
            error_status,
            error_response,
        } = behavior::resolve(settings, endpoint, chosen);

        if delay_ms > 0 {
            debug!(delay_ms, path = %endpoint.path, "Delaying response");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let mut ctx = RenderContext::new(
            request.params_json(),
            request.query.to_json(),
            request.body.clone().unwrap_or(Value::Null),
            settings.faker_seed,
        );

        if behavior::should_fail(error_rate) {
            debug!(
                status = error_status,
                error_rate,
                path = %endpoint.path,
                "Injecting fault"
            );
            return Ok(MockResponse {
                status: error_status,
                headers: Vec::new(),
                body: render(error_response, &mut ctx)?,
            });
        }

        // Source headers replace endpoint headers wholesale
        let headers = chosen
            .headers()
            .or(endpoint.headers.as_ref())
            .map(|headers| {
                headers
                    .iter()
                    .map(|(name, value)| (name.clone(), render_string(value, &ctx)))
                    .collect()
            })
            .unwrap_or_default();

        let body = render(chosen.response(), &mut ctx)?;
        let status = chosen.status().unwrap_or(endpoint.status);

        Ok(MockResponse {
            status,
            headers,
            body,
        })
    }
}

/// First matching variant, else the endpoint if its own rule holds.
pub fn select<'a>(endpoint: &'a Endpoint, request: &MockRequest) -> Option<ResponseSource<'a>> {
    if let Some((i, variant)) = endpoint
        .variants
        .iter()
        .enumerate()
        .find(|(_, v)| matches(request, v.match_rule.as_ref()))
    {
        debug!(
            path = %endpoint.path,
            variant = variant.name.as_deref().unwrap_or("-"),
            index = i,
            "Variant selected"
        );
        return Some(ResponseSource::Variant(variant));
    }

    matches(request, endpoint.match_rule.as_ref()).then_some(ResponseSource::Endpoint(endpoint))
}
