//! Tool registry and runner.
//!
//! Tools are read-only actions (metric lookups) exposed by packs. Each tool
//! has a dotted name, a JSON-Schema-like argument schema and a connector.
//! The runner resolves arguments, validates them against the schema, and
//! dispatches to the connector.
//!
//! Argument precedence on [`ToolRunner::call`]:
//!
//! 1. explicit `args` keys
//! 2. values extracted from the free-text query
//! 3. the tool's `default_args`, only when extraction found nothing

pub mod args;
pub mod connector;
pub mod schema;

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

pub use args::{DEFAULTS_WARNING, ExtractedArgs, extract_tool_args};
pub use connector::{Connector, ConnectorOutput, MockHandler};
pub use schema::validate_args;

/// Failures of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolExecutionError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool {0} is not read-only and is blocked")]
    NotReadOnly(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool {tool} failed: {reason}")]
    ConnectorFailure { tool: String, reason: String },
}

impl ToolExecutionError {
    /// Name of the tool the error concerns.
    pub fn tool(&self) -> &str {
        match self {
            Self::UnknownTool(tool) | Self::NotReadOnly(tool) => tool,
            Self::InvalidArguments { tool, .. } | Self::ConnectorFailure { tool, .. } => tool,
        }
    }
}

/// A tool definition.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub connector: Connector,
    pub read_only: bool,
    pub keywords: Vec<String>,
    pub default_args: Map<String, Value>,
}

impl ToolDef {
    /// A read-only tool with a closed, empty schema.
    pub fn new(name: impl Into<String>, connector: Connector) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            schema: json!({"type": "object", "properties": {}, "additionalProperties": false}),
            connector,
            read_only: true,
            keywords: Vec::new(),
            default_args: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.default_args.insert(key.into(), value);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// Metadata reported alongside a tool result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolMeta {
    pub duration_ms: u64,
    pub source: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of a successful tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub tool: String,
    pub data: Value,
    pub rendered: String,
    pub meta: ToolMeta,
    /// Arguments the tool actually ran with.
    pub args: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Registry of tools keyed by name.
///
/// Registration replaces an existing tool with the same name.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, ToolDef>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: ToolDef) {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        debug!(tool = %tool.name, connector = tool.connector.kind(), "tool registered");
        tools.insert(tool.name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<ToolDef> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools.get(name).cloned()
    }

    /// All tools, sorted by name.
    pub fn list(&self) -> Vec<ToolDef> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools.values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Executes tools from a shared registry.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    registry: Arc<ToolRegistry>,
}

impl ToolRunner {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Resolve arguments, validate, and run `name`.
    pub fn call(
        &self,
        name: &str,
        args: Map<String, Value>,
        query: Option<&str>,
    ) -> Result<ToolResult, ToolExecutionError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolExecutionError::UnknownTool(name.to_string()))?;
        if !tool.read_only {
            return Err(ToolExecutionError::NotReadOnly(name.to_string()));
        }

        let mut input = args;
        let mut warnings = Vec::new();
        if let Some(query) = query.filter(|q| !q.trim().is_empty()) {
            let extracted = extract_tool_args(query, &tool.schema, &tool.default_args);
            warnings.extend(extracted.warnings);
            for (key, value) in extracted.args {
                input.entry(key).or_insert(value);
            }
        }

        validate_args(&tool.schema, &input).map_err(|reason| {
            ToolExecutionError::InvalidArguments {
                tool: name.to_string(),
                reason,
            }
        })?;

        let output = tool
            .connector
            .run(name, &input)
            .map_err(|reason| ToolExecutionError::ConnectorFailure {
                tool: name.to_string(),
                reason,
            })?;
        info!(
            tool = name,
            connector = tool.connector.kind(),
            duration_ms = output.duration_ms,
            "tool call completed"
        );

        Ok(ToolResult {
            tool: name.to_string(),
            data: output.data,
            rendered: output.rendered,
            meta: ToolMeta {
                duration_ms: output.duration_ms,
                source: output.source,
                extra: output.extra,
            },
            args: input,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stats_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "timeframe": {"type": "string"},
                "metric": {"type": "string"}
            },
            "additionalProperties": false
        })
    }

    fn echo_tool(name: &str) -> ToolDef {
        ToolDef::new(
            name,
            Connector::mock(|args| {
                Ok(json!({"data": {"args": Value::Object(args.clone())}, "rendered": "ok"}))
            }),
        )
        .with_schema(stats_schema())
        .with_default_arg("timeframe", json!("24h"))
    }

    fn runner(tools: Vec<ToolDef>) -> ToolRunner {
        let registry = Arc::new(ToolRegistry::new());
        for tool in tools {
            registry.register(tool);
        }
        ToolRunner::new(registry)
    }

    #[test]
    fn test_registry_register_replace_and_list() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(echo_tool("b.stats"));
        registry.register(echo_tool("a.stats"));
        registry.register(echo_tool("a.stats").with_description("replaced"));

        assert_eq!(registry.names(), vec!["a.stats", "b.stats"]);
        assert_eq!(registry.get("a.stats").unwrap().description, "replaced");
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_unknown_tool() {
        let err = runner(vec![]).call("nope", Map::new(), None).unwrap_err();
        assert_eq!(err, ToolExecutionError::UnknownTool("nope".into()));
        assert_eq!(err.to_string(), "Unknown tool: nope");
    }

    #[test]
    fn test_write_tool_blocked() {
        let r = runner(vec![echo_tool("svc.write").read_only(false)]);
        let err = r.call("svc.write", Map::new(), None).unwrap_err();
        assert!(matches!(err, ToolExecutionError::NotReadOnly(_)));
        assert_eq!(err.tool(), "svc.write");
    }

    #[test]
    fn test_explicit_args_win_over_extraction() {
        let r = runner(vec![echo_tool("svc.stats")]);
        let mut args = Map::new();
        args.insert("timeframe".into(), json!("7d"));
        let result = r.call("svc.stats", args, Some("latency in the last 24h")).unwrap();
        assert_eq!(
            Value::Object(result.args),
            json!({"timeframe": "7d", "metric": "latency"})
        );
        assert!(result.warnings.is_empty());
        assert_eq!(result.rendered, "ok");
        assert_eq!(result.meta.source, "mock");
    }

    #[test]
    fn test_defaults_used_with_warning() {
        let r = runner(vec![echo_tool("svc.stats")]);
        let result = r.call("svc.stats", Map::new(), Some("tell me something")).unwrap();
        assert_eq!(Value::Object(result.args), json!({"timeframe": "24h"}));
        assert_eq!(result.warnings, vec![DEFAULTS_WARNING.to_string()]);
    }

    #[test]
    fn test_no_query_means_no_extraction() {
        let r = runner(vec![echo_tool("svc.stats")]);
        let result = r.call("svc.stats", Map::new(), None).unwrap();
        assert!(result.args.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_invalid_arguments_rejected_before_dispatch() {
        let r = runner(vec![echo_tool("svc.stats")]);
        let mut args = Map::new();
        args.insert("bogus".into(), json!(1));
        let err = r.call("svc.stats", args, None).unwrap_err();
        assert!(matches!(err, ToolExecutionError::InvalidArguments { .. }));
        assert!(err.to_string().starts_with("Invalid arguments for svc.stats:"));
    }

    #[test]
    fn test_connector_failure_is_wrapped() {
        let failing = ToolDef::new("svc.fail", Connector::mock(|_| Err("boom".to_string())));
        let err = runner(vec![failing]).call("svc.fail", Map::new(), None).unwrap_err();
        assert_eq!(err.to_string(), "Tool svc.fail failed: boom");
    }

    #[test]
    fn test_stub_connectors_return_envelopes() {
        let r = runner(vec![
            ToolDef::new("svc.http", Connector::http("http://example.invalid")),
            ToolDef::new("svc.sql", Connector::sql_readonly("SELECT 1")),
        ]);
        let http = r.call("svc.http", Map::new(), None).unwrap();
        assert_eq!(http.data["stub"], json!(true));
        assert_eq!(http.meta.source, "http_stub");
        let sql = r.call("svc.sql", Map::new(), None).unwrap();
        assert_eq!(sql.meta.source, "sql_stub");
    }

    #[test]
    fn test_result_serializes_flat_meta() {
        let tool = ToolDef::new(
            "svc.meta",
            Connector::mock(|_| Ok(json!({"data": 1, "meta": {"region": "eu"}}))),
        );
        let result = runner(vec![tool]).call("svc.meta", Map::new(), None).unwrap();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["meta"]["region"], json!("eu"));
        assert_eq!(value["meta"]["source"], json!("mock"));
        assert!(value.get("warnings").is_none());
    }
}
