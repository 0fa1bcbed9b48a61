//! Template engine for dynamic responses.
//!
//! A [`TemplateValue`] is a JSON-like tree that may embed `{{root.path}}`
//! string interpolation, `__faker` fake-data directives and `__repeat`
//! directives. [`render`] turns it into plain JSON for one request.

use crate::faker::FakeGenerator;
use regex::{Captures, Regex};
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::sync::OnceLock;

/// Key marking a fake-data directive object.
pub const FAKER_KEY: &str = "__faker";

/// Key marking a repeat directive object.
pub const REPEAT_KEY: &str = "__repeat";

/// Tokens like `{{params.id}}`, `{{ query.type }}` or `{{body.profile.name}}`.
static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();

fn token_regex() -> &'static Regex {
    TOKEN_REGEX.get_or_init(|| {
        Regex::new(r"\{\{\s*([a-zA-Z]+)\.([a-zA-Z0-9_.]+)\s*\}\}").expect("valid token regex")
    })
}

/// Typed response template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<TemplateValue>),
    /// Key/value pairs in declaration order
    Object(Vec<(String, TemplateValue)>),
    Faker(FakerDirective),
    Repeat(RepeatDirective),
}

/// Calls a registered fake-data generator.
#[derive(Debug, Clone, PartialEq)]
pub struct FakerDirective {
    /// Dotted generator name, e.g. `person.firstName`
    pub method: String,
    /// Arguments, rendered before the call
    pub args: Vec<TemplateValue>,
}

/// Expands into an array of independently rendered items.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatDirective {
    pub min: Option<u64>,
    pub max: Option<u64>,
    pub count: Option<u64>,
    pub template: Box<TemplateValue>,
}

/// Error rendering a template. These are spec errors, not request errors.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Faker method not found: {0}")]
    UnknownFakerMethod(String),

    #[error("Invalid arguments for faker method {method}: {reason}")]
    InvalidFakerArgs { method: String, reason: String },

    #[error("Repeat max must be >= min (min={min}, max={max})")]
    InvalidRepeatBounds { min: u64, max: u64 },
}

/// Per-request rendering inputs.
pub struct RenderContext {
    /// Route parameters
    pub params: Value,
    /// Query parameters (repeated keys become arrays)
    pub query: Value,
    /// Parsed request body, `Null` when absent
    pub body: Value,
    /// Fake-data generator for this request
    pub faker: FakeGenerator,
}

impl RenderContext {
    /// Build a context; a configured seed makes fake data reproducible.
    pub fn new(params: Value, query: Value, body: Value, faker_seed: Option<i64>) -> Self {
        Self {
            params,
            query,
            body,
            faker: FakeGenerator::new(faker_seed),
        }
    }

    fn source(&self, root: &str) -> Option<&Value> {
        match root {
            "params" => Some(&self.params),
            "query" => Some(&self.query),
            "body" => Some(&self.body),
            _ => None,
        }
    }
}

/// Render a template value into concrete JSON.
pub fn render(value: &TemplateValue, ctx: &mut RenderContext) -> Result<Value, RenderError> {
    match value {
        TemplateValue::Null => Ok(Value::Null),
        TemplateValue::Bool(b) => Ok(Value::Bool(*b)),
        TemplateValue::Number(n) => Ok(Value::Number(n.clone())),
        TemplateValue::String(s) => Ok(Value::String(render_string(s, ctx))),
        TemplateValue::Array(items) => items
            .iter()
            .map(|item| render(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        TemplateValue::Object(entries) => {
            let mut rendered = Map::new();
            for (key, item) in entries {
                rendered.insert(key.clone(), render(item, ctx)?);
            }
            Ok(Value::Object(rendered))
        }
        TemplateValue::Faker(directive) => render_faker(directive, ctx),
        TemplateValue::Repeat(directive) => render_repeat(directive, ctx),
    }
}

/// Substitute every `{{root.path}}` token in a string.
///
/// Unknown roots and unresolvable paths substitute an empty string.
pub fn render_string(input: &str, ctx: &RenderContext) -> String {
    if !input.contains("{{") {
        return input.to_string();
    }

    token_regex()
        .replace_all(input, |caps: &Captures| {
            ctx.source(&caps[1])
                .and_then(|source| lookup_path(source, &caps[2]))
                .map(stringify_value)
                .unwrap_or_default()
        })
        .into_owned()
}

fn render_faker(directive: &FakerDirective, ctx: &mut RenderContext) -> Result<Value, RenderError> {
    let args = directive
        .args
        .iter()
        .map(|arg| render(arg, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    ctx.faker.call(&directive.method, &args)
}

fn render_repeat(directive: &RepeatDirective, ctx: &mut RenderContext) -> Result<Value, RenderError> {
    let total = match directive.count {
        Some(count) => count,
        None => {
            let min = directive.min.unwrap_or(0);
            let max = directive.max.unwrap_or(min);
            if max < min {
                return Err(RenderError::InvalidRepeatBounds { min, max });
            }
            ctx.faker.int_between(min, max)
        }
    };

    (0..total)
        .map(|_| render(&directive.template, ctx))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Resolve a dot-separated path; numeric segments index into arrays.
pub fn lookup_path<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    path.split('.').try_fold(source, |current, part| match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Canonical string form of a JSON value.
///
/// `null` is empty, strings are verbatim, integral floats drop their
/// fraction (`3.0` is `"3"`), containers are JSON text.
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

impl TemplateValue {
    /// Plain JSON form, with directives written back as `__faker`/`__repeat`.
    pub fn to_json(&self) -> Value {
        match self {
            TemplateValue::Null => Value::Null,
            TemplateValue::Bool(b) => Value::Bool(*b),
            TemplateValue::Number(n) => Value::Number(n.clone()),
            TemplateValue::String(s) => Value::String(s.clone()),
            TemplateValue::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            TemplateValue::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            TemplateValue::Faker(directive) => {
                let inner = if directive.args.is_empty() {
                    Value::String(directive.method.clone())
                } else {
                    serde_json::json!({
                        "method": directive.method,
                        "args": directive.args.iter().map(Self::to_json).collect::<Vec<_>>(),
                    })
                };
                serde_json::json!({ FAKER_KEY: inner })
            }
            TemplateValue::Repeat(directive) => {
                let mut inner = Map::new();
                if let Some(min) = directive.min {
                    inner.insert("min".into(), min.into());
                }
                if let Some(max) = directive.max {
                    inner.insert("max".into(), max.into());
                }
                if let Some(count) = directive.count {
                    inner.insert("count".into(), count.into());
                }
                inner.insert("template".into(), directive.template.to_json());
                serde_json::json!({ REPEAT_KEY: inner })
            }
        }
    }

    /// Fake-data method names used anywhere in this template.
    pub fn faker_methods(&self) -> Vec<&str> {
        let mut methods = Vec::new();
        self.collect_faker_methods(&mut methods);
        methods
    }

    fn collect_faker_methods<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TemplateValue::Array(items) => items.iter().for_each(|i| i.collect_faker_methods(out)),
            TemplateValue::Object(entries) => {
                entries.iter().for_each(|(_, v)| v.collect_faker_methods(out))
            }
            TemplateValue::Faker(directive) => {
                out.push(&directive.method);
                directive.args.iter().for_each(|a| a.collect_faker_methods(out));
            }
            TemplateValue::Repeat(directive) => directive.template.collect_faker_methods(out),
            _ => {}
        }
    }
}

impl Serialize for TemplateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
