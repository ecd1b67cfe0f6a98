//! Heuristic tool-argument extraction from free text.
//!
//! Each detector looks for one well-known argument (`timeframe`, `metric`,
//! `service`, `environment`). Only keys declared in the tool schema's
//! `properties` are kept.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Warning attached when no argument could be inferred and defaults apply.
pub const DEFAULTS_WARNING: &str = "Could not infer tool arguments from query; using defaults.";

static TIMEFRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:last|past)?\s*(\d+)\s*(h|hr|hrs|hour|hours|d|day|days)\b")
        .expect("timeframe regex is valid")
});

static SERVICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bservice\s+([a-zA-Z0-9_-]+)\b").expect("service regex is valid")
});

static ENVIRONMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:sandbox|env|environment)\s+([a-zA-Z0-9_-]+)\b")
        .expect("environment regex is valid")
});

const KNOWN_ENVIRONMENTS: &[&str] = &["prod", "production", "staging", "stage", "dev", "sandbox", "test"];

const DETECTED_KEYS: &[&str] = &["timeframe", "metric", "service", "environment"];

/// Result of [`extract_tool_args`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedArgs {
    pub args: Map<String, Value>,
    pub warnings: Vec<String>,
}

/// `"24h"`, `"7d"`, or `"<N>h"`/`"<N>d"` from phrases like "last 3 days".
pub fn detect_timeframe(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    if lower.contains("24h") || lower.contains("24 h") {
        return Some("24h".to_string());
    }
    if lower.contains("7d") || lower.contains("7 d") || lower.contains("7 days") {
        return Some("7d".to_string());
    }

    let caps = TIMEFRAME_RE.captures(message)?;
    let digits = caps.get(1)?.as_str();
    let number = digits
        .parse::<u64>()
        .map(|n| n.to_string())
        .unwrap_or_else(|_| digits.to_string());
    let unit = if caps.get(2)?.as_str().to_lowercase().starts_with('h') {
        'h'
    } else {
        'd'
    };
    Some(format!("{number}{unit}"))
}

pub fn detect_metric(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    if lower.contains("p95") && lower.contains("latency") {
        Some("p95_latency")
    } else if lower.contains("latency") {
        Some("latency")
    } else if lower.contains("error") {
        Some("errors")
    } else if ["volume", "traffic", "request", "count"]
        .iter()
        .any(|term| lower.contains(term))
    {
        Some("request_volume")
    } else {
        None
    }
}

pub fn detect_service(message: &str) -> Option<String> {
    SERVICE_RE
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn detect_environment(message: &str) -> Option<String> {
    if let Some(m) = ENVIRONMENT_RE.captures(message).and_then(|caps| caps.get(1)) {
        return Some(m.as_str().to_string());
    }
    let lower = message.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();
    KNOWN_ENVIRONMENTS
        .iter()
        .find(|env| words.contains(*env))
        .map(|env| env.to_string())
}

/// Extract arguments for a tool with `schema` from `message`.
///
/// Detected values win over `defaults`; defaults for keys no detector
/// handles are carried along. When nothing at all is found the declared
/// defaults are used and [`DEFAULTS_WARNING`] is attached.
pub fn extract_tool_args(message: &str, schema: &Value, defaults: &Map<String, Value>) -> ExtractedArgs {
    let declared = |key: &str| {
        schema
            .get("properties")
            .and_then(Value::as_object)
            .is_some_and(|props| props.contains_key(key))
    };

    let detected = [
        ("timeframe", detect_timeframe(message)),
        ("metric", detect_metric(message).map(str::to_string)),
        ("service", detect_service(message)),
        ("environment", detect_environment(message)),
    ];

    let mut args = Map::new();
    for (key, value) in detected {
        if let Some(value) = value
            && declared(key)
        {
            args.insert(key.to_string(), Value::String(value));
        }
    }
    for (key, value) in defaults {
        if !DETECTED_KEYS.contains(&key.as_str()) && declared(key.as_str()) {
            args.insert(key.clone(), value.clone());
        }
    }

    let mut warnings = Vec::new();
    if args.is_empty() && !defaults.is_empty() {
        args.extend(
            defaults
                .iter()
                .filter(|(key, _)| declared(key.as_str()))
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        if !args.is_empty() {
            warnings.push(DEFAULTS_WARNING.to_string());
        }
    }

    ExtractedArgs { args, warnings }
}
