//! Built-in demo pack with two mocked metric tools.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use super::Pack;
use crate::tools::{Connector, ToolDef};

pub const PACK_ID: &str = "sample_service";
pub const REQUEST_VOLUME_TOOL: &str = "sample.stats.request_volume_24h";
pub const P95_LATENCY_TOOL: &str = "sample.stats.p95_latency_24h";

const REQUEST_VOLUME: u64 = 128_734;
const P95_LATENCY_MS: f64 = 82.4;

pub fn pack() -> Pack {
    Pack::new(PACK_ID, "Sample Service Pack")
        .with_keywords(["api key", "rate limit", "request volume", "latency", "sample service"])
        .with_doc_globs(["howto/**/*.md", "howto/**/*.txt"])
        .with_tool(
            ToolDef::new(REQUEST_VOLUME_TOOL, Connector::mock(request_volume))
                .with_description("Total requests served by the sample service.")
                .with_schema(stats_schema())
                .with_keywords(["request volume", "traffic", "requests"])
                .with_default_arg("timeframe", json!("24h")),
        )
        .with_tool(
            ToolDef::new(P95_LATENCY_TOOL, Connector::mock(p95_latency))
                .with_description("95th percentile request latency of the sample service.")
                .with_schema(stats_schema())
                .with_keywords(["p95", "latency"])
                .with_default_arg("timeframe", json!("24h")),
        )
}

fn stats_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "timeframe": {"type": "string", "description": "Window such as 24h or 7d"},
            "service": {"type": "string"},
            "environment": {"type": "string"},
            "metric": {"type": "string"}
        },
        "additionalProperties": false
    })
}

struct Scope<'a> {
    timeframe: &'a str,
    service: Option<&'a str>,
    environment: Option<&'a str>,
}

impl<'a> Scope<'a> {
    fn from_args(args: &'a Map<String, Value>) -> Self {
        Self {
            timeframe: args.get("timeframe").and_then(Value::as_str).unwrap_or("24h"),
            service: args.get("service").and_then(Value::as_str),
            environment: args.get("environment").and_then(Value::as_str),
        }
    }

    fn describe(&self, as_of: &str) -> String {
        let mut out = format!("(timeframe: {}", self.timeframe);
        if let Some(service) = self.service {
            out.push_str(&format!(", service: {service}"));
        }
        if let Some(env) = self.environment {
            out.push_str(&format!(", environment: {env}"));
        }
        out.push_str(&format!("; as of {as_of})"));
        out
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn request_volume(args: &Map<String, Value>) -> Result<Value, String> {
    let scope = Scope::from_args(args);
    let as_of = now();
    Ok(json!({
        "data": {
            "value": REQUEST_VOLUME,
            "timeframe": scope.timeframe,
            "as_of": as_of,
            "service": scope.service,
            "environment": scope.environment,
        },
        "rendered": format!(
            "- Tool `{REQUEST_VOLUME_TOOL}` reported **{}** requests {}",
            thousands(REQUEST_VOLUME),
            scope.describe(&as_of)
        ),
        "source": "sample_service_metrics",
    }))
}

fn p95_latency(args: &Map<String, Value>) -> Result<Value, String> {
    let scope = Scope::from_args(args);
    let as_of = now();
    Ok(json!({
        "data": {
            "value": P95_LATENCY_MS,
            "unit": "ms",
            "timeframe": scope.timeframe,
            "as_of": as_of,
            "service": scope.service,
            "environment": scope.environment,
        },
        "rendered": format!(
            "- Tool `{P95_LATENCY_TOOL}` reported **{P95_LATENCY_MS} ms** p95 latency {}",
            scope.describe(&as_of)
        ),
        "source": "sample_service_metrics",
    }))
}

/// `128734` as `128,734`.
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolRegistry, ToolRunner};
    use std::sync::Arc;

    fn runner() -> ToolRunner {
        let registry = Arc::new(ToolRegistry::new());
        for tool in pack().tools {
            registry.register(tool);
        }
        ToolRunner::new(registry)
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(128_734), "128,734");
        assert_eq!(thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn test_pack_shape() {
        let pack = pack();
        assert_eq!(pack.pack_id, PACK_ID);
        assert_eq!(pack.tool_names(), vec![REQUEST_VOLUME_TOOL, P95_LATENCY_TOOL]);
        assert_eq!(pack.doc_globs, vec!["howto/**/*.md", "howto/**/*.txt"]);
    }

    #[test]
    fn test_request_volume_renders_scope() {
        let result = runner()
            .call(REQUEST_VOLUME_TOOL, Map::new(), Some("request volume for service checkout in prod"))
            .unwrap();
        assert_eq!(result.data["value"], json!(128_734));
        assert_eq!(result.meta.source, "sample_service_metrics");
        assert!(result.rendered.contains("**128,734** requests"));
        assert!(result.rendered.contains("service: checkout, environment: prod"));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_latency_defaults_to_24h() {
        let result = runner().call(P95_LATENCY_TOOL, Map::new(), Some("how slow is it")).unwrap();
        assert_eq!(result.data["value"], json!(82.4));
        assert_eq!(result.args["timeframe"], json!("24h"));
        assert!(result.rendered.contains("**82.4 ms** p95 latency (timeframe: 24h;"));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_unknown_argument_rejected() {
        let mut args = Map::new();
        args.insert("region".into(), json!("eu"));
        assert!(runner().call(P95_LATENCY_TOOL, args, None).is_err());
    }
}
