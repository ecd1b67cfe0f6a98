//! Connector backends that execute a tool call.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value, json};

/// Handler behind a mock connector. Receives the validated arguments and
/// returns either a bare payload or an object with `data`, `rendered`,
/// `source` and `meta` fields.
pub type MockHandler = Arc<dyn Fn(&Map<String, Value>) -> Result<Value, String> + Send + Sync>;

/// Where a tool call is dispatched.
#[derive(Clone)]
pub enum Connector {
    /// In-process handler.
    Mock { handler: MockHandler },
    /// HTTP backend. Not wired yet; returns a stub envelope.
    Http { endpoint: String },
    /// Read-only SQL backend. Not wired yet; returns a stub envelope.
    SqlReadonly { query: String },
}

/// Normalised connector result.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorOutput {
    pub data: Value,
    pub rendered: String,
    pub source: String,
    pub duration_ms: u64,
    /// Additional metadata reported by the backend.
    pub extra: Map<String, Value>,
}

impl Connector {
    pub fn mock<F>(handler: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self::Mock {
            handler: Arc::new(handler),
        }
    }

    pub fn http(endpoint: impl Into<String>) -> Self {
        Self::Http {
            endpoint: endpoint.into(),
        }
    }

    pub fn sql_readonly(query: impl Into<String>) -> Self {
        Self::SqlReadonly {
            query: query.into(),
        }
    }

    /// Connector type tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mock { .. } => "mock",
            Self::Http { .. } => "http",
            Self::SqlReadonly { .. } => "sql_readonly",
        }
    }

    /// Execute `tool` with `args`. Errors carry the backend's message.
    pub fn run(&self, tool: &str, args: &Map<String, Value>) -> Result<ConnectorOutput, String> {
        let start = Instant::now();
        let args_json = Value::Object(args.clone());
        let mut output = match self {
            Self::Mock { handler } => normalize_mock(handler(args)?),
            Self::Http { endpoint } => ConnectorOutput {
                data: json!({"stub": true, "endpoint": endpoint, "args": args_json}),
                rendered: format!("HTTP connector stub for {tool} at {endpoint} with args={args_json}"),
                source: "http_stub".to_string(),
                duration_ms: 0,
                extra: Map::new(),
            },
            Self::SqlReadonly { query } => ConnectorOutput {
                data: json!({"stub": true, "query": query, "args": args_json}),
                rendered: format!(
                    "SQL readonly connector stub for {tool}: {query} args={args_json}"
                ),
                source: "sql_stub".to_string(),
                duration_ms: 0,
                extra: Map::new(),
            },
        };
        output.duration_ms = start.elapsed().as_millis() as u64;
        Ok(output)
    }
}

fn normalize_mock(result: Value) -> ConnectorOutput {
    let field = |name: &str| result.as_object().and_then(|obj| obj.get(name));

    let data = field("data").cloned().unwrap_or_else(|| result.clone());
    let rendered = field("rendered")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| data.to_string());
    let source = field("source")
        .and_then(Value::as_str)
        .unwrap_or("mock")
        .to_string();
    let mut extra = field("meta")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    extra.remove("duration_ms");
    extra.remove("source");

    ConnectorOutput {
        data,
        rendered,
        source,
        duration_ms: 0,
        extra,
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mock { .. } => f.debug_struct("Mock").finish_non_exhaustive(),
            Self::Http { endpoint } => f.debug_struct("Http").field("endpoint", endpoint).finish(),
            Self::SqlReadonly { query } => {
                f.debug_struct("SqlReadonly").field("query", query).finish()
            }
        }
    }
}
