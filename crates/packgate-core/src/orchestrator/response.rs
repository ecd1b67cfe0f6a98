//! Request and response types of the orchestrator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::intent::Intent;
use crate::tools::ToolMeta;

/// Identity of the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub org_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserContext {
    pub fn new<I, S>(org_id: impl Into<String>, user_id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            org_id: org_id.into(),
            user_id: user_id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user: UserContext,
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub pack_hint: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl ChatRequest {
    pub fn new(user: UserContext, message: impl Into<String>) -> Self {
        Self {
            user,
            message: message.into(),
            session_id: None,
            pack_hint: None,
            metadata: None,
        }
    }

    pub fn with_pack_hint(mut self, pack_hint: impl Into<String>) -> Self {
        self.pack_hint = Some(pack_hint.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A document the answer draws on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
    pub source: String,
    pub score: f32,
}

/// A tool invocation that contributed to the answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    pub tool: String,
    pub args: Map<String, Value>,
    pub result_meta: ToolMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalMeta {
    pub backend: String,
    pub alpha: f32,
    pub top_k: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMeta {
    pub trace_id: String,
    pub intent: Intent,
    pub packs_used: Vec<String>,
    pub latency_ms: u64,
    pub retrieval: RetrievalMeta,
    pub tool_calls: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub actions: Vec<ActionRecord>,
    pub warnings: Vec<String>,
    pub meta: ChatMeta,
}

/// Outcome of [`Orchestrator::reindex`](super::Orchestrator::reindex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub org_id: String,
    pub packs: Vec<String>,
    pub removed_docs: usize,
    pub indexed_docs: usize,
}
