//! Mock specification model.
//!
//! The spec file is parsed once per load into an immutable [`MockSpec`] tree.
//! A reload builds a brand-new tree; nothing here is ever mutated after
//! [`parse_spec`] returns.

use crate::template::{stringify_value, TemplateValue};
use crate::validation::{validate, ValidationIssue};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default body returned when a fault is injected and nothing overrides it.
pub const DEFAULT_ERROR_MESSAGE: &str = "Mock error";

/// Validated mock specification.
#[derive(Debug, Clone, Serialize)]
pub struct MockSpec {
    /// Spec format version (always 1)
    pub version: u32,

    /// Global behavior settings
    pub settings: GlobalSettings,

    /// Endpoint definitions, in declaration order
    pub endpoints: Vec<Endpoint>,
}

/// Global settings, the bottom of the behavior precedence chain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Fixed delay applied to every response (ms)
    pub delay_ms: u64,

    /// Probability in `[0, 1]` of answering with the error response
    pub error_rate: f64,

    /// Status used for injected errors
    pub error_status: u16,

    /// Body used for injected errors
    pub error_response: TemplateValue,

    /// Seed making fake data reproducible across requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faker_seed: Option<i64>,

    /// Cross-origin settings for the HTTP layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsConfig>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            error_rate: 0.0,
            error_status: 500,
            error_response: default_error_response(),
            faker_seed: None,
            cors: None,
        }
    }
}

/// `{"error": "Mock error"}`
pub fn default_error_response() -> TemplateValue {
    TemplateValue::Object(vec![(
        "error".to_string(),
        TemplateValue::String(DEFAULT_ERROR_MESSAGE.to_string()),
    )])
}

/// HTTP methods an endpoint can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }

    /// Parse an exact, upper-case method name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single route definition with a default response and optional variants.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub method: HttpMethod,

    /// Route pattern with named segments (`/users/:id`)
    pub path: String,

    /// Request predicate guarding the endpoint's own response
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_rule: Option<MatchRule>,

    /// Alternative responses, evaluated in declaration order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Variant>,

    /// Status code (200..=599)
    pub status: u16,

    /// Response body template
    pub response: TemplateValue,

    /// Response header templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,

    /// Delay drawn per request; wins over every `delayMs`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<DelayRange>,

    #[serde(flatten)]
    pub behavior: BehaviorOverrides,
}

/// An alternative response for an endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_rule: Option<MatchRule>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    pub response: TemplateValue,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<DelayRange>,

    #[serde(flatten)]
    pub behavior: BehaviorOverrides,
}

/// Optional delay/error settings; `None` falls through to the next level.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_status: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_response: Option<TemplateValue>,
}

/// The response source picked for a request: a matched variant, or the
/// endpoint itself when no variant applies.
#[derive(Debug, Clone, Copy)]
pub enum ResponseSource<'a> {
    Endpoint(&'a Endpoint),
    Variant(&'a Variant),
}

impl<'a> ResponseSource<'a> {
    pub fn behavior(&self) -> &'a BehaviorOverrides {
        match self {
            ResponseSource::Endpoint(e) => &e.behavior,
            ResponseSource::Variant(v) => &v.behavior,
        }
    }

    pub fn delay(&self) -> Option<&'a DelayRange> {
        match self {
            ResponseSource::Endpoint(e) => e.delay.as_ref(),
            ResponseSource::Variant(v) => v.delay.as_ref(),
        }
    }

    pub fn headers(&self) -> Option<&'a HashMap<String, String>> {
        match self {
            ResponseSource::Endpoint(e) => e.headers.as_ref(),
            ResponseSource::Variant(v) => v.headers.as_ref(),
        }
    }

    pub fn response(&self) -> &'a TemplateValue {
        match self {
            ResponseSource::Endpoint(e) => &e.response,
            ResponseSource::Variant(v) => &v.response,
        }
    }

    /// Own status if the source declares one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ResponseSource::Endpoint(e) => Some(e.status),
            ResponseSource::Variant(v) => v.status,
        }
    }

    /// Variant name, for logging.
    pub fn label(&self) -> Option<&'a str> {
        match self {
            ResponseSource::Endpoint(_) => None,
            ResponseSource::Variant(v) => v.name.as_deref(),
        }
    }
}

/// Conjunctive request predicate. An absent sub-rule always holds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<HashMap<String, Primitive>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<HashMap<String, Primitive>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<HashMap<String, String>>,
}

/// A scalar used as an expected value in match rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Primitive {
    String(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl Primitive {
    /// Canonical string form used for comparisons.
    pub fn coerce(&self) -> String {
        match self {
            Primitive::String(s) => s.clone(),
            Primitive::Number(n) => stringify_value(&serde_json::Value::Number(n.clone())),
            Primitive::Bool(b) => b.to_string(),
        }
    }
}

/// Per-request delay: fixed, or uniform over an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DelayRange {
    Fixed(u64),
    Range { min: u64, max: u64 },
}

impl DelayRange {
    /// Resolve to a concrete number of milliseconds.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        match self {
            DelayRange::Fixed(ms) => *ms,
            DelayRange::Range { min, max } if max > min => rng.gen_range(*min..=*max),
            DelayRange::Range { min, .. } => *min,
        }
    }
}

/// Cross-origin resource sharing settings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfig {
    pub origin: CorsOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_headers: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposed_headers: Option<Vec<String>>,

    pub credentials: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
}

/// Which origins may access the mock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// `true` reflects the request origin, `false` disables CORS
    Reflect(bool),
    /// `"*"` or a single origin
    Single(String),
    List(Vec<String>),
}

/// Error loading a spec file.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("Failed to read spec file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse spec file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid spec file {}:{}", path.display(), format_issues(issues))]
    Invalid {
        path: PathBuf,
        issues: Vec<ValidationIssue>,
    },
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues.iter().map(|i| format!("\n- {}", i)).collect()
}

/// Read, parse and validate a spec file.
pub fn load_spec(path: &Path) -> Result<MockSpec, SpecError> {
    let content = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_spec(&content).map_err(|e| e.with_path(path))
}

/// Parse and validate spec JSON text.
///
/// Errors carry an empty path; [`load_spec`] fills it in.
pub fn parse_spec(content: &str) -> Result<MockSpec, SpecError> {
    let raw: serde_json::Value =
        serde_json::from_str(content).map_err(|source| SpecError::Parse {
            path: PathBuf::new(),
            source,
        })?;
    validate(&raw).map_err(|issues| SpecError::Invalid {
        path: PathBuf::new(),
        issues,
    })
}

impl SpecError {
    fn with_path(self, path: &Path) -> Self {
        match self {
            SpecError::Io { source, .. } => SpecError::Io {
                path: path.to_path_buf(),
                source,
            },
            SpecError::Parse { source, .. } => SpecError::Parse {
                path: path.to_path_buf(),
                source,
            },
            SpecError::Invalid { issues, .. } => SpecError::Invalid {
                path: path.to_path_buf(),
                issues,
            },
        }
    }

    /// Schema violations, if this is a validation failure.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            SpecError::Invalid { issues, .. } => issues,
            _ => &[],
        }
    }
}

impl MockSpec {
    /// Total number of variants across all endpoints.
    pub fn variant_count(&self) -> usize {
        self.endpoints.iter().map(|e| e.variants.len()).sum()
    }
}
