//! Structural validation of spec JSON.
//!
//! Walks the raw document, applies defaults and builds the typed
//! [`MockSpec`]. Every violated field yields one [`ValidationIssue`] with a
//! dotted path (`endpoints.0.variants.1.status`).

use crate::config::{
    BehaviorOverrides, CorsConfig, CorsOrigin, DelayRange, Endpoint, GlobalSettings, HttpMethod,
    MatchRule, MockSpec, Primitive, Variant,
};
use crate::template::{FakerDirective, RepeatDirective, TemplateValue, FAKER_KEY, REPEAT_KEY};
use axum::http::HeaderName;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Paths served by the built-in admin routes.
pub const RESERVED_PATHS: [&str; 3] = ["/__history", "/__spec", "/health"];

/// A single violated field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Dotted location; empty for the document root
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "(root)" } else { &self.path };
        write!(f, "{}: {}", path, self.message)
    }
}

/// Validate a parsed spec document.
pub fn validate(raw: &Value) -> Result<MockSpec, Vec<ValidationIssue>> {
    let mut validator = Validator::default();
    let spec = validator.spec(raw);
    match spec {
        Some(spec) if validator.issues.is_empty() => Ok(spec),
        _ => Err(validator.issues),
    }
}

/// Parse a template value, recording malformed directives.
pub fn parse_template(value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) -> TemplateValue {
    match value {
        Value::Null => TemplateValue::Null,
        Value::Bool(b) => TemplateValue::Bool(*b),
        Value::Number(n) => TemplateValue::Number(n.clone()),
        Value::String(s) => TemplateValue::String(s.clone()),
        Value::Array(items) => TemplateValue::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_template(item, &join(path, i), issues))
                .collect(),
        ),
        Value::Object(obj) => {
            if let Some(inner) = obj.get(FAKER_KEY) {
                return parse_faker(inner, &join(path, FAKER_KEY), issues);
            }
            if let Some(inner) = obj.get(REPEAT_KEY) {
                return parse_repeat(inner, &join(path, REPEAT_KEY), issues);
            }
            TemplateValue::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), parse_template(v, &join(path, k), issues)))
                    .collect(),
            )
        }
    }
}

fn parse_faker(inner: &Value, path: &str, issues: &mut Vec<ValidationIssue>) -> TemplateValue {
    let directive = match inner {
        Value::String(method) if !method.is_empty() => Some(FakerDirective {
            method: method.clone(),
            args: Vec::new(),
        }),
        Value::Object(obj) => match obj.get("method") {
            Some(Value::String(method)) if !method.is_empty() => {
                let args = match obj.get("args") {
                    None => Some(Vec::new()),
                    Some(Value::Array(args)) => Some(
                        args.iter()
                            .enumerate()
                            .map(|(i, arg)| parse_template(arg, &join(&join(path, "args"), i), issues))
                            .collect(),
                    ),
                    Some(_) => {
                        issues.push(issue(join(path, "args"), "must be an array"));
                        None
                    }
                };
                args.map(|args| FakerDirective {
                    method: method.clone(),
                    args,
                })
            }
            _ => {
                issues.push(issue(join(path, "method"), "must be a non-empty string"));
                None
            }
        },
        _ => {
            issues.push(issue(path, "must be a method name or {method, args}"));
            None
        }
    };
    directive.map(TemplateValue::Faker).unwrap_or(TemplateValue::Null)
}

fn parse_repeat(inner: &Value, path: &str, issues: &mut Vec<ValidationIssue>) -> TemplateValue {
    let Some(obj) = inner.as_object() else {
        issues.push(issue(path, "must be an object with a template"));
        return TemplateValue::Null;
    };

    let mut bound = |key: &str| -> Option<u64> {
        let value = obj.get(key)?;
        let n = as_integer(value).filter(|n| *n >= 0).map(|n| n as u64);
        if n.is_none() {
            issues.push(issue(join(path, key), "must be a non-negative integer"));
        }
        n
    };
    let min = bound("min");
    let max = bound("max");
    let count = bound("count");

    match obj.get("template") {
        Some(template) => TemplateValue::Repeat(RepeatDirective {
            min,
            max,
            count,
            template: Box::new(parse_template(template, &join(path, "template"), issues)),
        }),
        None => {
            issues.push(issue(join(path, "template"), "is required"));
            TemplateValue::Null
        }
    }
}

#[derive(Default)]
struct Validator {
    issues: Vec<ValidationIssue>,
}

impl Validator {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(issue(path, message));
    }

    fn spec(&mut self, raw: &Value) -> Option<MockSpec> {
        let Some(root) = raw.as_object() else {
            self.push("", "must be an object");
            return None;
        };

        if root.get("version").and_then(as_integer) != Some(1) {
            self.push("version", "must equal 1");
        }

        let settings = match root.get("settings") {
            None => GlobalSettings::default(),
            Some(value) => self.settings(value, "settings"),
        };

        let endpoints = match root.get("endpoints") {
            Some(Value::Array(items)) if !items.is_empty() => items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| self.endpoint(item, &join("endpoints", i)))
                .collect::<Vec<_>>(),
            _ => {
                self.push("endpoints", "must be a non-empty array");
                Vec::new()
            }
        };

        self.check_routes(&endpoints);

        Some(MockSpec {
            version: 1,
            settings,
            endpoints,
        })
    }

    fn settings(&mut self, value: &Value, path: &str) -> GlobalSettings {
        let mut settings = GlobalSettings::default();
        let Some(obj) = self.object(value, path) else {
            return settings;
        };

        if let Some(ms) = self.non_negative(obj, "delayMs", path) {
            settings.delay_ms = ms;
        }
        if let Some(rate) = self.rate(obj, "errorRate", path) {
            settings.error_rate = rate;
        }
        if let Some(status) = self.status(obj, "errorStatus", path, 100) {
            settings.error_status = status;
        }
        if let Some(response) = obj.get("errorResponse").filter(|v| !v.is_null()) {
            settings.error_response = self.template(response, &join(path, "errorResponse"));
        }
        if let Some(seed) = obj.get("fakerSeed") {
            settings.faker_seed = as_integer(seed);
            if settings.faker_seed.is_none() {
                self.push(join(path, "fakerSeed"), "must be an integer");
            }
        }
        if let Some(cors) = obj.get("cors") {
            settings.cors = self.cors(cors, &join(path, "cors"));
        }
        settings
    }

    fn endpoint(&mut self, value: &Value, path: &str) -> Option<Endpoint> {
        let obj = self.object(value, path)?;

        let method = match obj.get("method") {
            Some(Value::String(m)) => HttpMethod::parse(m),
            _ => None,
        };
        if method.is_none() {
            self.push(join(path, "method"), "must be one of GET, POST, PUT, DELETE, PATCH");
        }

        let route = match obj.get("path") {
            Some(Value::String(p)) if !p.is_empty() => {
                if let Err(message) = check_route_syntax(p) {
                    self.push(join(path, "path"), message);
                }
                Some(p.clone())
            }
            _ => {
                self.push(join(path, "path"), "must be a non-empty string");
                None
            }
        };

        let variants = match obj.get("variants") {
            None => Vec::new(),
            Some(Value::Array(items)) if !items.is_empty() => items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| self.variant(item, &join(&join(path, "variants"), i)))
                .collect(),
            Some(_) => {
                self.push(join(path, "variants"), "must be a non-empty array");
                Vec::new()
            }
        };

        // Check every field before bailing on a bad method or path
        let match_rule = self.match_rule(obj, path);
        let status = self.status(obj, "status", path, 200).unwrap_or(200);
        let response = self.response(obj, path);
        let headers = self.headers(obj, path);
        let delay = self.delay(obj, path);
        let behavior = self.behavior(obj, path);

        Some(Endpoint {
            method: method?,
            path: route?,
            match_rule,
            variants,
            status,
            response,
            headers,
            delay,
            behavior,
        })
    }

    fn variant(&mut self, value: &Value, path: &str) -> Option<Variant> {
        let obj = self.object(value, path)?;

        let name = match obj.get("name") {
            None => None,
            Some(Value::String(name)) => Some(name.clone()),
            Some(_) => {
                self.push(join(path, "name"), "must be a string");
                None
            }
        };

        Some(Variant {
            name,
            match_rule: self.match_rule(obj, path),
            status: self.status(obj, "status", path, 200),
            response: self.response(obj, path),
            headers: self.headers(obj, path),
            delay: self.delay(obj, path),
            behavior: self.behavior(obj, path),
        })
    }

    fn behavior(&mut self, obj: &Map<String, Value>, path: &str) -> BehaviorOverrides {
        BehaviorOverrides {
            delay_ms: self.non_negative(obj, "delayMs", path),
            error_rate: self.rate(obj, "errorRate", path),
            error_status: self.status(obj, "errorStatus", path, 100),
            // null falls through to the next level
            error_response: obj
                .get("errorResponse")
                .filter(|v| !v.is_null())
                .map(|v| self.template(v, &join(path, "errorResponse"))),
        }
    }

    fn response(&mut self, obj: &Map<String, Value>, path: &str) -> TemplateValue {
        obj.get("response")
            .map(|v| self.template(v, &join(path, "response")))
            .unwrap_or(TemplateValue::Null)
    }

    fn template(&mut self, value: &Value, path: &str) -> TemplateValue {
        parse_template(value, path, &mut self.issues)
    }

    fn match_rule(&mut self, obj: &Map<String, Value>, path: &str) -> Option<MatchRule> {
        let path = join(path, "match");
        let rule = self.object(obj.get("match")?, &path)?;

        Some(MatchRule {
            query: rule.get("query").and_then(|v| self.primitives(v, &join(&path, "query"))),
            body: rule.get("body").and_then(|v| self.primitives(v, &join(&path, "body"))),
            headers: rule
                .get("headers")
                .and_then(|v| self.strings(v, &join(&path, "headers"))),
            cookies: rule
                .get("cookies")
                .and_then(|v| self.strings(v, &join(&path, "cookies"))),
        })
    }

    fn headers(&mut self, obj: &Map<String, Value>, path: &str) -> Option<HashMap<String, String>> {
        let path = join(path, "headers");
        let headers = self.strings(obj.get("headers")?, &path)?;
        for name in headers.keys() {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                self.push(join(&path, name), "is not a valid header name");
            }
        }
        Some(headers)
    }

    fn delay(&mut self, obj: &Map<String, Value>, path: &str) -> Option<DelayRange> {
        let path = join(path, "delay");
        match obj.get("delay")? {
            Value::Object(range) => {
                let min = range.get("min").and_then(as_integer).filter(|n| *n >= 0);
                let max = range.get("max").and_then(as_integer).filter(|n| *n >= 0);
                if min.is_none() {
                    self.push(join(&path, "min"), "must be a non-negative integer");
                }
                if max.is_none() {
                    self.push(join(&path, "max"), "must be a non-negative integer");
                }
                let (min, max) = (min? as u64, max? as u64);
                if max < min {
                    self.push(join(&path, "max"), "must be greater than or equal to min");
                    return None;
                }
                Some(DelayRange::Range { min, max })
            }
            value => match as_integer(value).filter(|n| *n >= 0) {
                Some(ms) => Some(DelayRange::Fixed(ms as u64)),
                None => {
                    self.push(path, "must be a non-negative integer or {min, max}");
                    None
                }
            },
        }
    }

    fn cors(&mut self, value: &Value, path: &str) -> Option<CorsConfig> {
        let obj = self.object(value, path)?;

        let origin = match obj.get("origin") {
            None => CorsOrigin::Single("*".to_string()),
            Some(Value::Bool(b)) => CorsOrigin::Reflect(*b),
            Some(Value::String(s)) if !s.is_empty() => CorsOrigin::Single(s.clone()),
            Some(v @ Value::Array(_)) => {
                CorsOrigin::List(self.string_list(v, &join(path, "origin")).unwrap_or_default())
            }
            Some(_) => {
                self.push(join(path, "origin"), "must be a boolean, a string or an array of strings");
                CorsOrigin::Reflect(false)
            }
        };

        let credentials = match obj.get("credentials") {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                self.push(join(path, "credentials"), "must be a boolean");
                false
            }
        };

        Some(CorsConfig {
            origin,
            methods: obj
                .get("methods")
                .and_then(|v| self.string_list(v, &join(path, "methods"))),
            allowed_headers: obj
                .get("allowedHeaders")
                .and_then(|v| self.string_list(v, &join(path, "allowedHeaders"))),
            exposed_headers: obj
                .get("exposedHeaders")
                .and_then(|v| self.string_list(v, &join(path, "exposedHeaders"))),
            credentials,
            max_age: self.non_negative(obj, "maxAge", path),
        })
    }

    /// Duplicate `(method, path)` pairs and paths the router cannot tell apart.
    fn check_routes(&mut self, endpoints: &[Endpoint]) {
        let mut seen: HashMap<(HttpMethod, &str), usize> = HashMap::new();

        for (i, endpoint) in endpoints.iter().enumerate() {
            let path = join(&join("endpoints", i), "path");

            if RESERVED_PATHS.contains(&endpoint.path.as_str()) {
                self.push(&path, "is reserved for the admin API");
                continue;
            }
            if let Some(admin) = RESERVED_PATHS
                .iter()
                .find(|reserved| routes_conflict(reserved, &endpoint.path))
            {
                self.push(&path, format!("conflicts with the admin route {}", admin));
                continue;
            }

            if let Some(first) = seen.insert((endpoint.method, endpoint.path.as_str()), i) {
                self.push(
                    &path,
                    format!(
                        "duplicate route {} {} (already declared by endpoints.{})",
                        endpoint.method, endpoint.path, first
                    ),
                );
                seen.insert((endpoint.method, endpoint.path.as_str()), first);
                continue;
            }

            if let Some(first) = endpoints[..i]
                .iter()
                .position(|other| routes_conflict(&other.path, &endpoint.path))
            {
                let message = format!(
                    "route conflicts with endpoints.{}.path ({})",
                    first, endpoints[first].path
                );
                self.push(&path, message);
            }
        }
    }

    fn object<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a Map<String, Value>> {
        let obj = value.as_object();
        if obj.is_none() {
            self.push(path, "must be an object");
        }
        obj
    }

    fn non_negative(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Option<u64> {
        let value = obj.get(key)?;
        let n = as_integer(value).filter(|n| *n >= 0).map(|n| n as u64);
        if n.is_none() {
            self.push(join(path, key), "must be a non-negative integer");
        }
        n
    }

    fn rate(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Option<f64> {
        let value = obj.get(key)?;
        let rate = value.as_f64().filter(|r| (0.0..=1.0).contains(r));
        if rate.is_none() {
            self.push(join(path, key), "must be between 0 and 1");
        }
        rate
    }

    fn status(&mut self, obj: &Map<String, Value>, key: &str, path: &str, min: i64) -> Option<u16> {
        let value = obj.get(key)?;
        let status = as_integer(value)
            .filter(|s| (min..=599).contains(s))
            .map(|s| s as u16);
        if status.is_none() {
            self.push(join(path, key), format!("must be an integer between {} and 599", min));
        }
        status
    }

    fn primitives(&mut self, value: &Value, path: &str) -> Option<HashMap<String, Primitive>> {
        let obj = self.object(value, path)?;
        let mut out = HashMap::new();
        for (key, v) in obj {
            let primitive = match v {
                Value::String(s) => Primitive::String(s.clone()),
                Value::Number(n) => Primitive::Number(n.clone()),
                Value::Bool(b) => Primitive::Bool(*b),
                _ => {
                    self.push(join(path, key), "must be a string, number or boolean");
                    continue;
                }
            };
            out.insert(key.clone(), primitive);
        }
        Some(out)
    }

    fn strings(&mut self, value: &Value, path: &str) -> Option<HashMap<String, String>> {
        let obj = self.object(value, path)?;
        let mut out = HashMap::new();
        for (key, v) in obj {
            match v.as_str() {
                Some(s) => {
                    out.insert(key.clone(), s.to_string());
                }
                None => self.push(join(path, key), "must be a string"),
            }
        }
        Some(out)
    }

    fn string_list(&mut self, value: &Value, path: &str) -> Option<Vec<String>> {
        let Some(items) = value.as_array() else {
            self.push(path, "must be an array of strings");
            return None;
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match item.as_str() {
                Some(s) => out.push(s.to_string()),
                None => self.push(join(path, i), "must be a string"),
            }
        }
        Some(out)
    }
}

/// Check `:name` / `*name` route syntax.
fn check_route_syntax(path: &str) -> Result<(), String> {
    if !path.starts_with('/') {
        return Err("must start with '/'".to_string());
    }

    let segments: Vec<&str> = path[1..].split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        if segment.contains('{') || segment.contains('}') {
            return Err("must not contain '{' or '}'".to_string());
        }
        let name = match segment.chars().next() {
            Some(':') => &segment[1..],
            Some('*') => {
                if i + 1 != segments.len() {
                    return Err("wildcard '*' is only allowed in the last segment".to_string());
                }
                &segment[1..]
            }
            _ => continue,
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid route parameter '{}'", segment));
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
    Wildcard(&'a str),
}

fn segments(path: &str) -> impl Iterator<Item = Segment<'_>> {
    path.split('/').map(|segment| {
        if let Some(name) = segment.strip_prefix(':') {
            Segment::Param(name)
        } else if let Some(name) = segment.strip_prefix('*') {
            Segment::Wildcard(name)
        } else {
            Segment::Static(segment)
        }
    })
}

/// Whether two distinct route patterns cannot be registered side by side.
///
/// Walking both paths, the first differing segment decides: two statics or
/// a static against a named parameter may coexist; any other pairing
/// (renamed parameter, parameter against wildcard, wildcard against
/// anything) is rejected by the router. Identical paths never conflict.
pub(crate) fn routes_conflict(a: &str, b: &str) -> bool {
    for (left, right) in segments(a).zip(segments(b)) {
        if left == right {
            continue;
        }
        return !matches!(
            (left, right),
            (Segment::Static(_), Segment::Static(_))
                | (Segment::Static(_), Segment::Param(_))
                | (Segment::Param(_), Segment::Static(_))
        );
    }
    false
}

/// Integral JSON number; `200.0` counts.
fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15)
            .map(|f| f as i64)
    })
}

fn join(path: &str, key: impl fmt::Display) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn issue(path: impl Into<String>, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        path: path.into(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn messages(raw: Value) -> Vec<String> {
        validate(&raw)
            .unwrap_err()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn endpoint(extra: Value) -> Value {
        let mut base = json!({"method": "GET", "path": "/x", "response": {"ok": true}});
        for (k, v) in extra.as_object().unwrap() {
            base[k] = v.clone();
        }
        json!({"version": 1, "endpoints": [base]})
    }

    #[test]
    fn test_minimal_spec() {
        let spec = validate(&endpoint(json!({}))).unwrap();
        assert_eq!(spec.endpoints.len(), 1);
        assert_eq!(spec.endpoints[0].method, HttpMethod::Get);
        assert!(spec.endpoints[0].match_rule.is_none());
    }

    #[test]
    fn test_root_must_be_object() {
        assert_eq!(messages(json!([1, 2])), vec!["(root): must be an object"]);
    }

    #[test]
    fn test_version_and_endpoints_required() {
        let msgs = messages(json!({"version": 2}));
        assert_eq!(
            msgs,
            vec!["version: must equal 1", "endpoints: must be a non-empty array"]
        );
    }

    #[test]
    fn test_settings_ranges() {
        let msgs = messages(json!({
            "version": 1,
            "settings": {"delayMs": -1, "errorRate": 1.5, "errorStatus": 99, "fakerSeed": "x"},
            "endpoints": [{"method": "GET", "path": "/x"}]
        }));
        assert!(msgs.contains(&"settings.delayMs: must be a non-negative integer".to_string()));
        assert!(msgs.contains(&"settings.errorRate: must be between 0 and 1".to_string()));
        assert!(msgs.contains(&"settings.errorStatus: must be an integer between 100 and 599".to_string()));
        assert!(msgs.contains(&"settings.fakerSeed: must be an integer".to_string()));
    }

    #[test]
    fn test_endpoint_fields() {
        let msgs = messages(json!({
            "version": 1,
            "endpoints": [
                {"method": "TRACE", "path": "", "status": 600},
                {"method": "GET", "path": "/ok", "variants": [], "errorStatus": 600}
            ]
        }));
        assert!(msgs.contains(&"endpoints.0.method: must be one of GET, POST, PUT, DELETE, PATCH".to_string()));
        assert!(msgs.contains(&"endpoints.0.path: must be a non-empty string".to_string()));
        assert!(msgs.contains(&"endpoints.0.status: must be an integer between 200 and 599".to_string()));
        assert!(msgs.contains(&"endpoints.1.variants: must be a non-empty array".to_string()));
        assert!(msgs.contains(&"endpoints.1.errorStatus: must be an integer between 100 and 599".to_string()));
    }

    #[test]
    fn test_integral_floats_accepted() {
        let spec = validate(&endpoint(json!({"status": 201.0}))).unwrap();
        assert_eq!(spec.endpoints[0].status, 201);

        let msgs = messages(endpoint(json!({"status": 201.5})));
        assert_eq!(msgs, vec!["endpoints.0.status: must be an integer between 200 and 599"]);
    }

    #[test]
    fn test_variant_fields() {
        let msgs = messages(endpoint(json!({
            "variants": [{"name": 3, "status": 700, "match": {"query": {"a": [1]}}, "response": {}}]
        })));
        assert!(msgs.contains(&"endpoints.0.variants.0.name: must be a string".to_string()));
        assert!(msgs.contains(&"endpoints.0.variants.0.status: must be an integer between 200 and 599".to_string()));
        assert!(msgs.contains(&"endpoints.0.variants.0.match.query.a: must be a string, number or boolean".to_string()));
    }

    #[test]
    fn test_match_rule_parsing() {
        let spec = validate(&endpoint(json!({
            "match": {
                "query": {"type": "premium", "page": 2},
                "body": {"admin": true},
                "headers": {"X-Token": "abc"},
                "cookies": {"session": "s1"}
            }
        })))
        .unwrap();
        let rule = spec.endpoints[0].match_rule.as_ref().unwrap();
        assert_eq!(rule.query.as_ref().unwrap()["page"], Primitive::Number(2.into()));
        assert_eq!(rule.body.as_ref().unwrap()["admin"], Primitive::Bool(true));
        assert_eq!(rule.headers.as_ref().unwrap()["X-Token"], "abc");
        assert_eq!(rule.cookies.as_ref().unwrap()["session"], "s1");
    }

    #[test]
    fn test_delay_forms() {
        let spec = validate(&endpoint(json!({"delay": 120}))).unwrap();
        assert_eq!(spec.endpoints[0].delay, Some(DelayRange::Fixed(120)));

        let spec = validate(&endpoint(json!({"delay": {"min": 10, "max": 20}}))).unwrap();
        assert_eq!(spec.endpoints[0].delay, Some(DelayRange::Range { min: 10, max: 20 }));

        let msgs = messages(endpoint(json!({"delay": {"min": 30, "max": 20}})));
        assert_eq!(msgs, vec!["endpoints.0.delay.max: must be greater than or equal to min"]);

        let msgs = messages(endpoint(json!({"delay": "slow"})));
        assert_eq!(msgs, vec!["endpoints.0.delay: must be a non-negative integer or {min, max}"]);
    }

    #[test]
    fn test_malformed_directives() {
        let msgs = messages(endpoint(json!({
            "response": {
                "a": {"__faker": 5},
                "b": {"__faker": {"args": []}},
                "c": {"__repeat": {"count": -1, "template": 1}},
                "d": {"__repeat": {"min": 1}}
            }
        })));
        assert!(msgs.contains(&"endpoints.0.response.a.__faker: must be a method name or {method, args}".to_string()));
        assert!(msgs.contains(&"endpoints.0.response.b.__faker.method: must be a non-empty string".to_string()));
        assert!(msgs.contains(&"endpoints.0.response.c.__repeat.count: must be a non-negative integer".to_string()));
        assert!(msgs.contains(&"endpoints.0.response.d.__repeat.template: is required".to_string()));
    }

    #[test]
    fn test_repeat_bounds_checked_at_render_time() {
        // max < min is a render failure, not a load failure
        let spec = validate(&endpoint(json!({
            "response": {"items": {"__repeat": {"min": 5, "max": 2, "template": {"id": 1}}}}
        })));
        assert!(spec.is_ok());
    }

    #[test]
    fn test_duplicate_routes_rejected() {
        let msgs = messages(json!({
            "version": 1,
            "endpoints": [
                {"method": "GET", "path": "/users/:id"},
                {"method": "POST", "path": "/users/:id"},
                {"method": "GET", "path": "/users/:id"}
            ]
        }));
        assert_eq!(
            msgs,
            vec!["endpoints.2.path: duplicate route GET /users/:id (already declared by endpoints.0)"]
        );
    }

    #[test]
    fn test_parameter_name_conflicts_rejected() {
        let msgs = messages(json!({
            "version": 1,
            "endpoints": [
                {"method": "GET", "path": "/users/:id"},
                {"method": "DELETE", "path": "/users/:userId"}
            ]
        }));
        assert_eq!(
            msgs,
            vec!["endpoints.1.path: route conflicts with endpoints.0.path (/users/:id)"]
        );
    }

    #[test]
    fn test_param_and_wildcard_at_same_position_rejected() {
        let msgs = messages(json!({
            "version": 1,
            "endpoints": [
                {"method": "GET", "path": "/u/:id"},
                {"method": "GET", "path": "/u/*rest"}
            ]
        }));
        assert_eq!(msgs, vec!["endpoints.1.path: route conflicts with endpoints.0.path (/u/:id)"]);

        let msgs = messages(json!({
            "version": 1,
            "endpoints": [
                {"method": "GET", "path": "/u/:id/posts/:postId"},
                {"method": "POST", "path": "/u/:id/posts/:slug"}
            ]
        }));
        assert_eq!(
            msgs,
            vec!["endpoints.1.path: route conflicts with endpoints.0.path (/u/:id/posts/:postId)"]
        );
    }

    #[test]
    fn test_static_and_param_routes_coexist() {
        let spec = validate(&json!({
            "version": 1,
            "endpoints": [
                {"method": "GET", "path": "/users/me"},
                {"method": "GET", "path": "/users/:id"},
                {"method": "GET", "path": "/users/:id/files/*path"},
                {"method": "GET", "path": "/users"}
            ]
        }));
        assert!(spec.is_ok());
    }

    #[test]
    fn test_wildcard_shadowing_admin_route_rejected() {
        let msgs = messages(json!({
            "version": 1,
            "endpoints": [{"method": "GET", "path": "/*rest"}]
        }));
        assert_eq!(msgs, vec!["endpoints.0.path: conflicts with the admin route /__history"]);
    }

    #[test]
    fn test_routes_conflict() {
        assert!(routes_conflict("/u/:id", "/u/*rest"));
        assert!(routes_conflict("/u/:id", "/u/:name"));
        assert!(routes_conflict("/files/*a", "/files/*b"));
        assert!(routes_conflict("/files/readme", "/files/*path"));
        assert!(!routes_conflict("/u/:id", "/u/:id"));
        assert!(!routes_conflict("/u/me", "/u/:id"));
        assert!(!routes_conflict("/u/:id", "/u/:id/posts"));
        assert!(!routes_conflict("/a/:id", "/b/*rest"));
    }

    #[test]
    fn test_route_syntax() {
        assert!(check_route_syntax("/users/:id/posts/:post_id").is_ok());
        assert!(check_route_syntax("/files/*rest").is_ok());
        assert!(check_route_syntax("/").is_ok());
        assert!(check_route_syntax("users").is_err());
        assert!(check_route_syntax("/files/*rest/more").is_err());
        assert!(check_route_syntax("/users/:").is_err());
        assert!(check_route_syntax("/users/{id}").is_err());
    }

    #[test]
    fn test_reserved_paths() {
        let msgs = messages(json!({
            "version": 1,
            "endpoints": [{"method": "GET", "path": "/__history"}]
        }));
        assert_eq!(msgs, vec!["endpoints.0.path: is reserved for the admin API"]);
    }

    #[test]
    fn test_invalid_header_name() {
        let msgs = messages(endpoint(json!({"headers": {"Bad Header": "x"}})));
        assert_eq!(msgs, vec!["endpoints.0.headers.Bad Header: is not a valid header name"]);
    }

    #[test]
    fn test_cors_parsing() {
        let spec = validate(&json!({
            "version": 1,
            "settings": {"cors": {"origin": ["https://a.com"], "methods": ["GET"], "credentials": true, "maxAge": 60}},
            "endpoints": [{"method": "GET", "path": "/x"}]
        }))
        .unwrap();
        let cors = spec.settings.cors.unwrap();
        assert_eq!(cors.origin, CorsOrigin::List(vec!["https://a.com".to_string()]));
        assert!(cors.credentials);
        assert_eq!(cors.max_age, Some(60));
    }
}
