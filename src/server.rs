//! HTTP server setup.
//!
//! # Responsibilities
//! - Register one axum route per spec endpoint
//! - Decode request bodies, cookies and headers into a [`MockRequest`]
//! - Encode [`MockResponse`] values, answering render failures with a 500
//! - Record every mock request into the shared [`HistoryRecorder`]
//! - Serve the admin routes (`/health`, `/__spec`, `/__history`)
//! - Bind, serve and gracefully stop one listener ([`ServerHandle`])

use crate::config::{CorsConfig, CorsOrigin, HttpMethod, MockSpec};
use crate::handler::{MockHandler, MockResponse};
use crate::history::{HistoryEntry, HistoryFilter, HistoryRecorder, NewEntry};
use crate::matcher::{parse_cookies, MockRequest, QueryParams};
use crate::validation::{routes_conflict, RESERVED_PATHS};
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Query, RawPathParams, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, MethodFilter, MethodRouter},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Largest request body accepted (1 MiB).
pub const BODY_LIMIT: usize = 1024 * 1024;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Where the active spec came from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecMeta {
    pub spec_path: String,
    pub loaded_at: DateTime<Utc>,
}

impl SpecMeta {
    pub fn new(spec_path: impl Into<String>) -> Self {
        Self {
            spec_path: spec_path.into(),
            loaded_at: Utc::now(),
        }
    }
}

/// State shared by the admin routes.
#[derive(Clone)]
struct AppState {
    spec: Arc<MockSpec>,
    meta: Arc<SpecMeta>,
    history: Arc<HistoryRecorder>,
}

/// Error starting or running a listener.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server task failed: {0}")]
    Task(String),

    #[error("Route {path} conflicts with {existing}")]
    RouteConflict { path: String, existing: String },
}

/// Build the complete router for one spec.
///
/// Fails instead of panicking when two endpoint paths cannot be registered
/// together.
pub fn build_router(
    spec: Arc<MockSpec>,
    meta: SpecMeta,
    history: Arc<HistoryRecorder>,
) -> Result<Router, ServerError> {
    check_route_conflicts(&spec)?;

    let mut routes: BTreeMap<String, MethodRouter<AppState>> = BTreeMap::new();

    for mock in MockHandler::for_spec(&spec) {
        let endpoint = mock.endpoint();
        let path = to_router_path(&endpoint.path);
        debug!(method = %endpoint.method, path = %endpoint.path, "Registering mock route");

        let filter = method_filter(endpoint.method);
        let route_handler = move |params: RawPathParams, request: Request| {
            let mock = mock.clone();
            async move { serve_mock(mock, params, request).await }
        };

        let existing = routes.remove(&path).unwrap_or_else(MethodRouter::new);
        routes.insert(path, existing.on(filter, route_handler));
    }

    let state = AppState {
        spec: Arc::clone(&spec),
        meta: Arc::new(meta),
        history: Arc::clone(&history),
    };

    let mut router = routes
        .into_iter()
        .fold(Router::new(), |router, (path, methods)| router.route(&path, methods))
        .route("/health", get(health))
        .route("/__spec", get(get_spec))
        .route("/__history", get(get_history).delete(clear_history))
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn_with_state(history, record_history));

    if let Some(cors) = spec.settings.cors.as_ref().and_then(cors_layer) {
        router = router.layer(cors);
    }

    Ok(router.layer(TraceLayer::new_for_http()))
}

fn check_route_conflicts(spec: &MockSpec) -> Result<(), ServerError> {
    let mut registered: Vec<&str> = RESERVED_PATHS.to_vec();

    for endpoint in &spec.endpoints {
        let path = endpoint.path.as_str();
        if RESERVED_PATHS.contains(&path) {
            return Err(ServerError::RouteConflict {
                path: path.to_string(),
                existing: path.to_string(),
            });
        }
        if let Some(existing) = registered.iter().find(|seen| routes_conflict(seen, path)) {
            return Err(ServerError::RouteConflict {
                path: path.to_string(),
                existing: existing.to_string(),
            });
        }
        if !registered.contains(&path) {
            registered.push(path);
        }
    }
    Ok(())
}

/// `/users/:id/*rest` becomes `/users/{id}/{*rest}`.
pub fn to_router_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{}}}", name)
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{*{}}}", name)
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Delete => MethodFilter::DELETE,
        HttpMethod::Patch => MethodFilter::PATCH,
    }
}

async fn serve_mock(mock: MockHandler, params: RawPathParams, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match to_bytes(body, BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(_) => return error_body(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large"),
    };
    let body = match decode_body(&parts.headers, &bytes) {
        Ok(body) => body,
        Err(InvalidJsonBody) => return error_body(StatusCode::BAD_REQUEST, "Invalid JSON body"),
    };

    let request = MockRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        params: params
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        query: QueryParams::parse(parts.uri.query().unwrap_or_default()),
        headers: flatten_headers(&parts.headers).into_iter().collect(),
        cookies: request_cookies(&parts.headers),
        body,
    };

    match mock.handle(&request).await {
        Ok(response) => encode_response(response),
        Err(err) => {
            let endpoint = mock.endpoint();
            error!(
                method = %endpoint.method,
                path = %endpoint.path,
                error = %err,
                "Failed to render mock response"
            );
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// Marker for a JSON body that failed to parse.
#[derive(Debug, PartialEq, Eq)]
struct InvalidJsonBody;

/// Empty is no body; JSON types must parse; untyped bodies try JSON first.
fn decode_body(headers: &HeaderMap, bytes: &Bytes) -> Result<Option<Value>, InvalidJsonBody> {
    if bytes.is_empty() {
        return Ok(None);
    }

    let text = || Value::String(String::from_utf8_lossy(bytes).into_owned());
    match headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        Some(content_type) if is_json_content_type(content_type) => serde_json::from_slice(bytes)
            .map(Some)
            .map_err(|_| InvalidJsonBody),
        Some(_) => Ok(Some(text())),
        None => Ok(Some(serde_json::from_slice(bytes).unwrap_or_else(|_| text()))),
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Flatten multi-valued headers into one comma-joined string per name.
fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            (name.as_str().to_string(), joined)
        })
        .collect()
}

fn request_cookies(headers: &HeaderMap) -> Option<HashMap<String, String>> {
    let mut values = headers.get_all(header::COOKIE).iter().peekable();
    values.peek()?;

    let mut cookies = HashMap::new();
    for value in values {
        for (name, value) in parse_cookies(&String::from_utf8_lossy(value.as_bytes())) {
            cookies.entry(name).or_insert(value);
        }
    }
    Some(cookies)
}

fn encode_response(response: MockResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid response header"),
        }
    }

    let explicit_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = match (&response.body, explicit_type) {
        (Value::String(text), Some(content_type)) if !is_json_content_type(&content_type) => {
            Body::from(text.clone())
        }
        (body, explicit_type) => {
            if explicit_type.is_none() {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            }
            Body::from(body.to_string())
        }
    };

    let mut http_response = Response::new(body);
    *http_response.status_mut() = status;
    *http_response.headers_mut() = headers;
    http_response
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn not_found(method: Method, uri: Uri) -> Response {
    let body = json!({
        "error": "Not Found",
        "message": format!("Route {}:{} not found", method, uri.path()),
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

#[derive(Serialize)]
struct SpecSnapshot<'a> {
    spec: &'a MockSpec,
    meta: &'a SpecMeta,
}

async fn get_spec(State(state): State<AppState>) -> Response {
    Json(SpecSnapshot {
        spec: &state.spec,
        meta: &state.meta,
    })
    .into_response()
}

#[derive(Serialize)]
struct HistoryPage {
    entries: Vec<HistoryEntry>,
    total: usize,
}

async fn get_history(
    State(state): State<AppState>,
    Query(filter): Query<HistoryFilter>,
) -> Json<HistoryPage> {
    Json(HistoryPage {
        entries: state.history.query(&filter).await,
        total: state.history.count().await,
    })
}

async fn clear_history(State(state): State<AppState>) -> StatusCode {
    state.history.clear().await;
    StatusCode::NO_CONTENT
}

fn is_admin_path(path: &str) -> bool {
    path == "/__history" || path == "/__spec"
}

/// Record each non-admin exchange once the response is produced.
async fn record_history(
    State(history): State<Arc<HistoryRecorder>>,
    request: Request,
    next: Next,
) -> Response {
    if is_admin_path(request.uri().path()) {
        return next.run(request).await;
    }

    let started = Instant::now();
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(_) => return error_body(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large"),
    };

    let method = parts.method.to_string();
    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let path = parts.uri.path().to_string();
    let query = QueryParams::parse(parts.uri.query().unwrap_or_default()).to_json();
    let headers = flatten_headers(&parts.headers);
    let body = decode_body(&parts.headers, &bytes).ok().flatten();

    let response = next
        .run(Request::from_parts(parts, Body::from(bytes)))
        .await;

    history
        .record(NewEntry {
            method,
            url,
            path,
            query,
            headers,
            body,
            status_code: response.status().as_u16(),
            response_time_ms: started.elapsed().as_millis() as u64,
        })
        .await;

    response
}

/// CORS layer for the configured policy; `origin: false` disables it.
fn cors_layer(config: &CorsConfig) -> Option<CorsLayer> {
    let origin = match &config.origin {
        CorsOrigin::Reflect(false) => return None,
        CorsOrigin::Reflect(true) => AllowOrigin::mirror_request(),
        CorsOrigin::Single(origin) => wildcard_or_list(std::slice::from_ref(origin), config.credentials),
        CorsOrigin::List(origins) => wildcard_or_list(origins, config.credentials),
    };

    let methods = match &config.methods {
        Some(methods) => AllowMethods::list(
            methods
                .iter()
                .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok()),
        ),
        None => AllowMethods::list([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ]),
    };

    let allowed_headers = match &config.allowed_headers {
        Some(names) => AllowHeaders::list(header_names(names)),
        None => AllowHeaders::mirror_request(),
    };

    let mut layer = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(allowed_headers)
        .allow_credentials(config.credentials);

    if let Some(exposed) = &config.exposed_headers {
        layer = layer.expose_headers(ExposeHeaders::list(header_names(exposed)));
    }
    if let Some(max_age) = config.max_age {
        layer = layer.max_age(Duration::from_secs(max_age));
    }
    Some(layer)
}

/// A literal `*` cannot be combined with credentials, so it mirrors instead.
fn wildcard_or_list(origins: &[String], credentials: bool) -> AllowOrigin {
    if origins.iter().any(|o| o == "*") {
        if credentials {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::any()
        }
    } else {
        AllowOrigin::list(header_values(origins))
    }
}

fn header_values(values: &[String]) -> Vec<HeaderValue> {
    values
        .iter()
        .filter_map(|v| match HeaderValue::from_str(v) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %v, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

fn header_names(names: &[String]) -> Vec<HeaderName> {
    names
        .iter()
        .filter_map(|n| HeaderName::from_bytes(n.as_bytes()).ok())
        .collect()
}

/// A running listener serving one router.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    /// Bind `addr` and serve `router` in a background task.
    pub async fn start(addr: SocketAddr, router: Router) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await
        });

        info!(address = %local_addr, "Mock server listening");
        Ok(Self {
            local_addr,
            shutdown: Some(shutdown),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drain in-flight requests and release the port.
    pub async fn stop(mut self) -> Result<(), ServerError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let result = match (&mut self.task).await {
            Ok(result) => result.map_err(ServerError::Io),
            Err(err) => Err(ServerError::Task(err.to_string())),
        };
        info!(address = %self.local_addr, "Mock server stopped");
        result
    }
}
