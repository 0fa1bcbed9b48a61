//! Request matching logic.
//!
//! Evaluates an incoming request against a [`MatchRule`]. Every present
//! sub-rule must hold; values are compared by their canonical string form.

use crate::config::{MatchRule, Primitive};
use crate::template::stringify_value;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// The parts of an HTTP request the mock engine looks at.
#[derive(Debug, Clone, Default)]
pub struct MockRequest {
    pub method: String,
    pub path: String,
    /// Route parameters extracted by the router
    pub params: HashMap<String, String>,
    pub query: QueryParams,
    /// Header values keyed by lower-cased name; repeats joined with `", "`
    pub headers: HashMap<String, String>,
    /// Parsed cookies, `None` when the request carried no `Cookie` header
    pub cookies: Option<HashMap<String, String>>,
    /// Decoded body, `None` when empty
    pub body: Option<Value>,
}

impl MockRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_query(mut self, raw: &str) -> Self {
        self.query = QueryParams::parse(raw);
        self
    }

    /// Add a header; a repeated name is joined like a proxy would.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
        if name.eq_ignore_ascii_case("cookie") {
            let parsed = parse_cookies(value);
            self.cookies.get_or_insert_with(HashMap::new).extend(parsed);
        }
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Route parameters as a JSON object for templates.
    pub fn params_json(&self) -> Value {
        Value::Object(
            self.params
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

/// Decoded query string, keeping repeated keys and their order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Parse `a=1&b=2` form encoding (`+` is a space).
    pub fn parse(raw: &str) -> Self {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        Self(
            url::form_urlencoded::parse(raw.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All values for a key, in order of appearance.
    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// JSON object form: single values are strings, repeated keys arrays.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for (key, value) in &self.0 {
            let value = Value::String(value.clone());
            match out.get_mut(key) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    out.insert(key.clone(), value);
                }
            }
        }
        Value::Object(out)
    }
}

/// Evaluate a request against an optional rule. No rule always matches.
pub fn matches(request: &MockRequest, rule: Option<&MatchRule>) -> bool {
    let Some(rule) = rule else {
        return true;
    };

    rule.query
        .as_ref()
        .map_or(true, |expected| matches_query(&request.query, expected))
        && rule
            .body
            .as_ref()
            .map_or(true, |expected| matches_body(request.body.as_ref(), expected))
        && rule
            .headers
            .as_ref()
            .map_or(true, |expected| matches_headers(request, expected))
        && rule
            .cookies
            .as_ref()
            .map_or(true, |expected| matches_cookies(request.cookies.as_ref(), expected))
}

fn matches_query(query: &QueryParams, expected: &HashMap<String, Primitive>) -> bool {
    expected.iter().all(|(key, value)| {
        let mut values = query.values(key);
        match (values.next(), values.next()) {
            // A repeated key never satisfies a rule
            (Some(_), Some(_)) => false,
            (actual, None) => actual.unwrap_or_default() == value.coerce(),
            (None, Some(_)) => false,
        }
    })
}

fn matches_body(body: Option<&Value>, expected: &HashMap<String, Primitive>) -> bool {
    let Some(Value::Object(body)) = body else {
        return false;
    };
    expected.iter().all(|(key, value)| {
        let actual = body.get(key).map(stringify_value).unwrap_or_default();
        actual == value.coerce()
    })
}

fn matches_headers(request: &MockRequest, expected: &HashMap<String, String>) -> bool {
    expected
        .iter()
        .all(|(name, value)| request.header(name) == Some(value.as_str()))
}

fn matches_cookies(
    cookies: Option<&HashMap<String, String>>,
    expected: &HashMap<String, String>,
) -> bool {
    let Some(cookies) = cookies else {
        return false;
    };
    expected
        .iter()
        .all(|(name, value)| cookies.get(name) == Some(value))
}

/// Parse a `Cookie` header (`a=1; b=2`). The first occurrence of a name wins.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();

    for pair in header.split(';') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        let decoded = urlencoding::decode(value)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string());

        cookies.entry(name.to_string()).or_insert(decoded);
    }

    cookies
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(value: Value) -> MatchRule {
        let raw = json!({
            "version": 1,
            "endpoints": [{"method": "GET", "path": "/x", "match": value}]
        });
        let spec = crate::validation::validate(&raw).unwrap();
        spec.endpoints[0].match_rule.clone().unwrap()
    }

    #[test]
    fn test_no_rule_matches() {
        assert!(matches(&MockRequest::new("GET", "/x"), None));
        assert!(matches(&MockRequest::new("GET", "/x"), Some(&MatchRule::default())));
    }

    #[test]
    fn test_query_matching() {
        let rule = rule(json!({"query": {"type": "premium", "page": 2}}));

        let req = MockRequest::new("GET", "/x").with_query("type=premium&page=2");
        assert!(matches(&req, Some(&rule)));

        let req = MockRequest::new("GET", "/x").with_query("type=basic&page=2");
        assert!(!matches(&req, Some(&rule)));

        let req = MockRequest::new("GET", "/x").with_query("type=premium");
        assert!(!matches(&req, Some(&rule)));
    }

    #[test]
    fn test_repeated_query_key_fails() {
        let rule = rule(json!({"query": {"type": "premium"}}));
        let req = MockRequest::new("GET", "/x").with_query("type=premium&type=basic");
        assert!(!matches(&req, Some(&rule)));
    }

    #[test]
    fn test_query_values_are_decoded() {
        let rule = rule(json!({"query": {"name": "John Doe"}}));
        let req = MockRequest::new("GET", "/x").with_query("name=John%20Doe");
        assert!(matches(&req, Some(&rule)));
        let req = MockRequest::new("GET", "/x").with_query("name=John+Doe");
        assert!(matches(&req, Some(&rule)));
    }

    #[test]
    fn test_body_matching() {
        let rule = rule(json!({"body": {"role": "admin", "level": 3, "active": true}}));

        let req = MockRequest::new("POST", "/x")
            .with_body(json!({"role": "admin", "level": 3, "active": true, "extra": 1}));
        assert!(matches(&req, Some(&rule)));

        // Coerced comparison: "3" equals 3
        let req = MockRequest::new("POST", "/x")
            .with_body(json!({"role": "admin", "level": "3", "active": "true"}));
        assert!(matches(&req, Some(&rule)));

        let req = MockRequest::new("POST", "/x").with_body(json!({"role": "user", "level": 3, "active": true}));
        assert!(!matches(&req, Some(&rule)));
    }

    #[test]
    fn test_body_rule_requires_object() {
        let rule = rule(json!({"body": {"role": "admin"}}));
        assert!(!matches(&MockRequest::new("POST", "/x"), Some(&rule)));
        let req = MockRequest::new("POST", "/x").with_body(json!([{"role": "admin"}]));
        assert!(!matches(&req, Some(&rule)));
        let req = MockRequest::new("POST", "/x").with_body(json!("role=admin"));
        assert!(!matches(&req, Some(&rule)));
    }

    #[test]
    fn test_header_matching_is_case_insensitive() {
        let rule = rule(json!({"headers": {"X-Api-Key": "secret"}}));

        let req = MockRequest::new("GET", "/x").with_header("x-api-key", "secret");
        assert!(matches(&req, Some(&rule)));

        let req = MockRequest::new("GET", "/x").with_header("X-API-KEY", "Secret");
        assert!(!matches(&req, Some(&rule)));

        assert!(!matches(&MockRequest::new("GET", "/x"), Some(&rule)));
    }

    #[test]
    fn test_cookie_matching() {
        let rule = rule(json!({"cookies": {"session": "abc 123"}}));

        let req = MockRequest::new("GET", "/x").with_header("Cookie", "theme=dark; session=abc%20123");
        assert!(matches(&req, Some(&rule)));

        let req = MockRequest::new("GET", "/x").with_header("Cookie", "theme=dark");
        assert!(!matches(&req, Some(&rule)));

        // No Cookie header at all
        assert!(!matches(&MockRequest::new("GET", "/x"), Some(&rule)));
    }

    #[test]
    fn test_sub_rules_are_conjunctive() {
        let full = rule(json!({"query": {"a": "1"}, "headers": {"x-b": "2"}}));
        let partial = rule(json!({"query": {"a": "1"}}));

        let req = MockRequest::new("GET", "/x").with_query("a=1").with_header("X-B", "2");
        assert!(matches(&req, Some(&full)));
        assert!(matches(&req, Some(&partial)));

        let req = MockRequest::new("GET", "/x").with_query("a=1");
        assert!(!matches(&req, Some(&full)));
        assert!(matches(&req, Some(&partial)));
    }

    #[test]
    fn test_query_to_json() {
        let query = QueryParams::parse("?tag=a&page=1&tag=b&tag=c");
        assert_eq!(query.to_json(), json!({"tag": ["a", "b", "c"], "page": "1"}));
        assert!(QueryParams::parse("").is_empty());
    }

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies(r#"a=1; b="quoted"; c=x%3Dy; a=2; broken; =nameless"#);
        assert_eq!(cookies.get("a").map(String::as_str), Some("1"));
        assert_eq!(cookies.get("b").map(String::as_str), Some("quoted"));
        assert_eq!(cookies.get("c").map(String::as_str), Some("x=y"));
        assert_eq!(cookies.len(), 3);
    }

    #[test]
    fn test_repeated_headers_are_joined() {
        let req = MockRequest::new("GET", "/x")
            .with_header("Accept", "text/html")
            .with_header("accept", "application/json");
        assert_eq!(req.header("ACCEPT"), Some("text/html, application/json"));
    }
}
