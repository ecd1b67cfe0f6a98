#![deny(unsafe_code)]

//! Packgate core: policy-gated retrieval and tool orchestration.
//!
//! Given a user message, organisation and role set, the [`Orchestrator`]
//! decides what is permitted, retrieves relevant document snippets,
//! optionally invokes a read-only tool, and assembles a redacted answer
//! with a full audit trail. Policy evaluation lives in `packgate-config`;
//! everything downstream of it lives here.

/// Audit events, sinks and trace lookup.
pub mod audit;
/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Markdown-aware text chunking.
pub mod chunking;
/// Embedding capability and model-free embedders.
pub mod embedder;
/// In-memory hybrid vector/lexical document index.
pub mod index;
/// Keyword intent classifier.
pub mod intent;
/// Request sequencing, lazy ingestion and reindexing.
pub mod orchestrator;
/// Product packs, routing and the built-in sample pack.
pub mod packs;
/// Answer-text redaction.
pub mod redaction;
/// Document sources producing chunk records.
pub mod source;
/// Tool registry, argument extraction, schema validation and connectors.
pub mod tools;

pub use audit::{AuditError, AuditEvent, AuditKind, AuditSink, FileAuditSink, InMemoryAuditSink};
pub use embedder::{Embedder, HashEmbedder, TermHashEmbedder};
pub use index::{Chunk, DocIndex, Filters, Hit, RetrievalMode};
pub use intent::{Intent, classify};
pub use orchestrator::{
    ChatRequest, ChatResponse, Orchestrator, OrchestratorBuilder, OrchestratorError, ReindexReport,
    UserContext,
};
pub use packs::{Pack, PackRegistry, PackSummary};
pub use source::{DocumentSource, FilesystemSource, IngestError, StaticSource};
pub use tools::{Connector, ToolDef, ToolExecutionError, ToolRegistry, ToolResult, ToolRunner};
