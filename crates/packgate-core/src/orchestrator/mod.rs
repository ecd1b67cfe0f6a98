//! Request orchestration.
//!
//! The orchestrator sequences one chat request:
//!
//! ```text
//! received ──deny pattern──▶ denied
//!    │
//!    ▼
//! classify intent ─▶ route packs ∩ role grants ─▶ lazy ingestion
//!    │
//!    ├─ security ─▶ access summary
//!    ├─ how_to / mixed ─▶ hybrid retrieval ─▶ citations + snippets
//!    └─ stats / mixed ─▶ tool selection ─▶ tool call ─▶ stats block
//!    │
//!    ▼
//! redaction ─▶ response
//! ```
//!
//! Every step is recorded in the audit sink under a fresh trace id. Tool
//! failures, missing documents and inaccessible packs degrade to warnings;
//! `handle_chat` never fails.
//!
//! Documents are ingested at most once per `(org, pack)`. The memo table
//! maps each key to its own mutex, so concurrent first requests for the
//! same key serialise on the ingest while other keys proceed.

mod response;
pub mod select;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use packgate_config::PolicyEngine;
use packgate_config::policy::matches_any;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::audit::{AuditError, AuditEvent, AuditKind, AuditSink, InMemoryAuditSink};
use crate::embedder::HashEmbedder;
use crate::index::{DEFAULT_ALPHA, DocIndex, Filters, Hit};
use crate::intent::{Intent, classify};
use crate::packs::{Pack, PackRegistry, PackSummary};
use crate::redaction::apply_redaction;
use crate::source::{DocumentSource, IngestError, StaticSource};
use crate::tools::{ToolDef, ToolRegistry, ToolRunner};

pub use response::{
    ActionRecord, ChatMeta, ChatRequest, ChatResponse, Citation, ReindexReport, RetrievalMeta,
    UserContext,
};

pub const DENIED_ANSWER: &str = "I cannot help with exporting or listing raw identifiers. \
     I can provide aggregate stats and how-to guidance instead.";
pub const DENIED_WARNING: &str = "Request blocked by policy (deny_patterns).";
pub const FALLBACK_ANSWER: &str = "I am not sure how to answer that yet.";
pub const NO_PACKS_WARNING: &str = "No packs are accessible for your current roles.";
pub const NO_DOCS_WARNING: &str = "No relevant docs found (add docs under data/<org>/<pack>/...).";
pub const NO_TOOL_WARNING: &str = "No permitted stats tool matched your request.";

const PREVIEW_CHARS: usize = 180;
const SNIPPET_CHARS: usize = 260;
const MAX_RETRIEVAL_PACKS: usize = 3;
const HITS_PER_PACK: usize = 4;
const MAX_CITATIONS: usize = 3;
const MIN_SCORE_WITHOUT_LEXICAL: f32 = 0.2;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Unknown pack_id: {0}")]
    UnknownPack(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Builder for [`Orchestrator`].
///
/// Unset parts default to an empty static document source, an in-memory
/// audit sink, a hybrid index over [`HashEmbedder`] and an empty tool
/// registry.
pub struct OrchestratorBuilder {
    packs: PackRegistry,
    policy: Arc<PolicyEngine>,
    index: Option<Arc<DocIndex>>,
    source: Option<Arc<dyn DocumentSource>>,
    audit: Option<Arc<dyn AuditSink>>,
    tools: Option<Arc<ToolRegistry>>,
    top_k: usize,
}

impl OrchestratorBuilder {
    pub fn index(mut self, index: Arc<DocIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn source(mut self, source: Arc<dyn DocumentSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Maximum number of retrieval hits kept per request.
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Assemble the orchestrator and register every pack's tools.
    pub fn build(self) -> Orchestrator {
        let tools = self.tools.unwrap_or_default();
        for pack in self.packs.list() {
            for tool in &pack.tools {
                tools.register(tool.clone());
            }
        }

        Orchestrator {
            packs: Arc::new(self.packs),
            policy: self.policy,
            index: self.index.unwrap_or_else(|| {
                Arc::new(DocIndex::hybrid(Arc::new(HashEmbedder::default()), DEFAULT_ALPHA))
            }),
            source: self.source.unwrap_or_else(|| Arc::new(StaticSource::new())),
            audit: self.audit.unwrap_or_else(|| Arc::new(InMemoryAuditSink::new())),
            runner: ToolRunner::new(tools),
            top_k: self.top_k,
            ingested: Mutex::new(HashMap::new()),
        }
    }
}

/// Policy-gated retrieval and tool orchestration core.
pub struct Orchestrator {
    packs: Arc<PackRegistry>,
    policy: Arc<PolicyEngine>,
    index: Arc<DocIndex>,
    source: Arc<dyn DocumentSource>,
    audit: Arc<dyn AuditSink>,
    runner: ToolRunner,
    top_k: usize,
    ingested: Mutex<HashMap<String, Arc<Mutex<bool>>>>,
}

/// Per-request accumulator for answer parts.
#[derive(Default)]
struct Draft {
    parts: Vec<String>,
    citations: Vec<Citation>,
    actions: Vec<ActionRecord>,
    warnings: Vec<String>,
}

impl Orchestrator {
    pub fn builder(packs: PackRegistry, policy: Arc<PolicyEngine>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            packs,
            policy,
            index: None,
            source: None,
            audit: None,
            tools: None,
            top_k: 5,
        }
    }

    pub fn packs(&self) -> &PackRegistry {
        &self.packs
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn index(&self) -> &DocIndex {
        &self.index
    }

    pub fn tool_registry(&self) -> &ToolRegistry {
        self.runner.registry()
    }

    pub fn catalog(&self) -> Vec<PackSummary> {
        self.packs.catalog()
    }

    /// Audit events recorded for `trace_id`.
    pub fn trace(&self, trace_id: &str) -> Result<Vec<AuditEvent>, AuditError> {
        self.audit.get(trace_id)
    }

    pub fn retrieval_meta(&self) -> RetrievalMeta {
        let mode = self.index.mode();
        RetrievalMeta {
            backend: mode.backend().to_string(),
            alpha: mode.alpha(),
            top_k: self.top_k,
        }
    }

    /// Answer one chat request. Never fails; degraded paths add warnings.
    pub fn handle_chat(&self, request: &ChatRequest) -> ChatResponse {
        let started = Instant::now();
        let trace_id = uuid::Uuid::new_v4().to_string();
        let user = &request.user;
        let redaction = self.policy.redaction();
        let message_preview = apply_redaction(&preview(&request.message), redaction);

        self.emit(
            &trace_id,
            AuditKind::RequestReceived,
            json!({
                "org_id": user.org_id,
                "user_id": user.user_id,
                "roles": user.roles,
                "session_id": request.session_id,
                "pack_hint": request.pack_hint,
                "message_preview": message_preview,
                "metadata": request.metadata.clone().unwrap_or_else(|| json!({})),
            }),
        );

        if self.policy.is_denied(&request.message) {
            return self.deny(&trace_id, &message_preview, started);
        }

        let intent = classify(&request.message);
        self.emit(&trace_id, AuditKind::IntentClassified, json!({"intent": intent}));

        let allowed = self.policy.allowed_packs(&user.roles);
        let routed: Vec<&Pack> = self
            .packs
            .route(&request.message, request.pack_hint.as_deref())
            .into_iter()
            .filter(|p| matches_any(&p.pack_id, &allowed))
            .collect();
        let packs_used: Vec<String> = routed.iter().map(|p| p.pack_id.clone()).collect();
        self.emit(
            &trace_id,
            AuditKind::PacksSelected,
            json!({"packs_used": packs_used, "pack_hint": request.pack_hint}),
        );
        info!(trace_id = %trace_id, org_id = %user.org_id, intent = %intent, packs = ?packs_used, "request routed");

        let mut draft = Draft::default();

        for pack in &routed {
            if let Err(err) = self.ensure_ingested(&user.org_id, &pack.pack_id) {
                warn!(org_id = %user.org_id, pack_id = %pack.pack_id, error = %err, "document ingestion failed");
                draft.warnings.push(format!(
                    "Documents for pack '{}' could not be loaded: {err}",
                    pack.pack_id
                ));
            }
        }

        if let Some(hint) = request.pack_hint.as_deref() {
            if self.packs.get(hint).is_none() {
                draft.warnings.push(format!("Pack hint '{hint}' was not found."));
            } else if !packs_used.iter().any(|p| p == hint) && intent != Intent::Security {
                draft.warnings.push(format!(
                    "Pack hint '{hint}' is not accessible with your current roles."
                ));
            }
        }

        if intent == Intent::Security {
            draft.parts.extend(self.access_summary(&user.roles));
        } else {
            if routed.is_empty() {
                draft.warnings.push(NO_PACKS_WARNING.to_string());
                draft.parts.extend(self.access_summary(&user.roles));
            }
            if intent.wants_docs() && !routed.is_empty() {
                self.retrieve(&trace_id, &user.org_id, &request.message, &message_preview, &routed, &mut draft);
            }
            if intent.wants_stats() && !routed.is_empty() {
                self.run_stats_tool(&trace_id, &request.message, &user.roles, &routed, &mut draft);
            }
        }

        let citations = dedupe_citations(draft.citations);
        let warnings: Vec<String> = draft
            .warnings
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let joined = draft.parts.join("\n");
        let answer = match joined.trim() {
            "" => FALLBACK_ANSWER,
            text => text,
        };
        let answer = apply_redaction(answer, redaction);
        let tool_calls = draft.actions.len();

        self.emit(
            &trace_id,
            AuditKind::ResponseReturned,
            json!({
                "intent": intent,
                "citations": citations.len(),
                "tool_calls": tool_calls,
                "warnings": warnings,
            }),
        );

        ChatResponse {
            answer,
            citations,
            actions: draft.actions,
            warnings,
            meta: ChatMeta {
                trace_id,
                intent,
                packs_used,
                latency_ms: started.elapsed().as_millis() as u64,
                retrieval: self.retrieval_meta(),
                tool_calls,
            },
        }
    }

    /// Ingest documents for `(org_id, pack_id)` unless already done.
    ///
    /// Returns the number of chunks added by this call, zero when the key
    /// was already ingested. A failed load leaves the key unmarked.
    pub fn ensure_ingested(&self, org_id: &str, pack_id: &str) -> Result<usize, OrchestratorError> {
        let slot = self.slot(org_id, pack_id);
        let mut done = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if *done {
            return Ok(0);
        }
        let added = self.ingest(org_id, pack_id)?;
        *done = true;
        Ok(added)
    }

    /// Whether `(org_id, pack_id)` has been ingested.
    pub fn is_ingested(&self, org_id: &str, pack_id: &str) -> bool {
        let slot = {
            let table = self.ingested.lock().unwrap_or_else(PoisonError::into_inner);
            table.get(&memo_key(org_id, pack_id)).cloned()
        };
        slot.is_some_and(|slot| *slot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Drop and re-ingest documents of `org_id` for one pack or all packs.
    pub fn reindex(&self, org_id: &str, pack_id: Option<&str>) -> Result<ReindexReport, OrchestratorError> {
        let targets: Vec<String> = match pack_id {
            Some(id) => {
                if self.packs.get(id).is_none() {
                    return Err(OrchestratorError::UnknownPack(id.to_string()));
                }
                vec![id.to_string()]
            }
            None => self.packs.ids(),
        };

        let mut removed_docs = 0;
        let mut indexed_docs = 0;
        for target in &targets {
            let slot = self.slot(org_id, target);
            let mut done = slot.lock().unwrap_or_else(PoisonError::into_inner);
            *done = false;
            let scope = Filters::scope(org_id, target);
            removed_docs += self.index.clear(&scope);
            self.ingest(org_id, target)?;
            *done = true;
            indexed_docs += self.index.count(&scope);
        }
        info!(org_id, packs = ?targets, removed_docs, indexed_docs, "reindex complete");

        Ok(ReindexReport {
            org_id: org_id.to_string(),
            packs: targets,
            removed_docs,
            indexed_docs,
        })
    }

    fn slot(&self, org_id: &str, pack_id: &str) -> Arc<Mutex<bool>> {
        let mut table = self.ingested.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(table.entry(memo_key(org_id, pack_id)).or_default())
    }

    /// Load and index one partition. The caller holds the key's lock.
    fn ingest(&self, org_id: &str, pack_id: &str) -> Result<usize, OrchestratorError> {
        let pack = self
            .packs
            .get(pack_id)
            .ok_or_else(|| OrchestratorError::UnknownPack(pack_id.to_string()))?;
        let mut chunks = self.source.load(org_id, pack_id, &pack.doc_globs)?;
        // Chunks always belong to the partition they were loaded for.
        for chunk in &mut chunks {
            chunk.org_id = org_id.to_string();
            chunk.pack_id = pack_id.to_string();
        }
        let added = self.index.ingest(chunks);
        info!(org_id, pack_id, chunks = added, "documents ingested");
        Ok(added)
    }

    fn deny(&self, trace_id: &str, message_preview: &str, started: Instant) -> ChatResponse {
        let warnings = vec![DENIED_WARNING.to_string()];
        self.emit(
            trace_id,
            AuditKind::Denied,
            json!({"reason": "deny_patterns", "message_preview": message_preview}),
        );
        self.emit(
            trace_id,
            AuditKind::ResponseReturned,
            json!({
                "intent": Intent::Security,
                "citations": 0,
                "tool_calls": 0,
                "warnings": warnings,
            }),
        );
        info!(trace_id, "request denied by policy");

        ChatResponse {
            answer: apply_redaction(DENIED_ANSWER, self.policy.redaction()),
            citations: Vec::new(),
            actions: Vec::new(),
            warnings,
            meta: ChatMeta {
                trace_id: trace_id.to_string(),
                intent: Intent::Security,
                packs_used: Vec::new(),
                latency_ms: started.elapsed().as_millis() as u64,
                retrieval: self.retrieval_meta(),
                tool_calls: 0,
            },
        }
    }

    fn access_summary(&self, roles: &[String]) -> Vec<String> {
        let list = |items: Vec<String>| {
            if items.is_empty() {
                "(none)".to_string()
            } else {
                items.join(", ")
            }
        };
        vec![
            "### Access summary".to_string(),
            format!("- Roles: **{}**", list(roles.to_vec())),
            format!(
                "- Allowed packs: **{}**",
                list(self.policy.allowed_packs(roles).into_iter().collect())
            ),
            format!(
                "- Allowed tools: **{}**",
                list(self.policy.allowed_tools(roles).into_iter().collect())
            ),
        ]
    }

    fn retrieve(
        &self,
        trace_id: &str,
        org_id: &str,
        message: &str,
        message_preview: &str,
        routed: &[&Pack],
        draft: &mut Draft,
    ) {
        let mut hits: Vec<Hit> = routed
            .iter()
            .take(MAX_RETRIEVAL_PACKS)
            .flat_map(|pack| {
                self.index
                    .search(message, &Filters::scope(org_id, &pack.pack_id), HITS_PER_PACK)
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        let top: Vec<Hit> = hits
            .into_iter()
            .filter(|h| h.lexical_score > 0.0 || h.score > MIN_SCORE_WITHOUT_LEXICAL)
            .take(self.top_k)
            .collect();

        let top_sources: Vec<Value> = top
            .iter()
            .map(|h| {
                json!({
                    "title": h.title,
                    "url": h.url,
                    "source": h.source,
                    "score": (h.score * 10_000.0).round() / 10_000.0,
                })
            })
            .collect();
        self.emit(
            trace_id,
            AuditKind::RetrievalPerformed,
            json!({"query_preview": message_preview, "top_sources": top_sources}),
        );

        if top.is_empty() {
            draft.warnings.push(NO_DOCS_WARNING.to_string());
            return;
        }

        draft.parts.push("### How-to".to_string());
        draft.parts.push("Here's what I found in the docs:".to_string());
        for (i, hit) in top.iter().take(MAX_CITATIONS).enumerate() {
            draft.citations.push(Citation {
                title: hit.title.clone(),
                url: hit.url.clone(),
                source: hit.source.clone(),
                score: hit.score,
            });
            let snippet: String = collapse_whitespace(&hit.text).chars().take(SNIPPET_CHARS).collect();
            draft.parts.push(format!("{}. {snippet}", i + 1));
        }
    }

    fn run_stats_tool(
        &self,
        trace_id: &str,
        message: &str,
        roles: &[String],
        routed: &[&Pack],
        draft: &mut Draft,
    ) {
        let names: Vec<String> = routed.iter().flat_map(|p| p.tool_names()).collect();
        let permitted: HashSet<String> = self
            .policy
            .filter_allowed_tools(&names, roles)
            .into_iter()
            .collect();
        let candidates: Vec<&ToolDef> = routed
            .iter()
            .flat_map(|p| p.tools.iter())
            .filter(|t| permitted.contains(&t.name))
            .collect();

        let Some(tool) = select::select_tool(message, &candidates) else {
            draft.warnings.push(NO_TOOL_WARNING.to_string());
            return;
        };

        let started = Instant::now();
        let outcome = self.runner.call(&tool.name, Map::new(), Some(message));
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                self.emit(
                    trace_id,
                    AuditKind::ToolCalled,
                    json!({
                        "tool": tool.name,
                        "args_summary": result.args,
                        "status": "ok",
                        "duration_ms": duration_ms,
                    }),
                );
                draft.parts.push("### Stats".to_string());
                draft.parts.push(apply_redaction(&result.rendered, self.policy.redaction()));
                draft.warnings.extend(result.warnings);
                draft.actions.push(ActionRecord {
                    tool: result.tool,
                    args: result.args,
                    result_meta: result.meta,
                });
            }
            Err(err) => {
                warn!(trace_id, tool = %tool.name, error = %err, "tool call failed");
                self.emit(
                    trace_id,
                    AuditKind::ToolCalled,
                    json!({
                        "tool": tool.name,
                        "args_summary": {},
                        "status": "error",
                        "duration_ms": duration_ms,
                        "error": err.to_string(),
                    }),
                );
                draft.warnings.push(err.to_string());
            }
        }
    }

    /// Record an audit event. Sink failures are logged, never propagated.
    fn emit(&self, trace_id: &str, kind: AuditKind, data: Value) {
        if let Err(err) = self.audit.log(AuditEvent::new(trace_id, kind, data)) {
            warn!(trace_id, kind = %kind, error = %err, "audit sink write failed");
        }
    }
}

fn memo_key(org_id: &str, pack_id: &str) -> String {
    format!("{org_id}:{pack_id}")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-collapsed message truncated to [`PREVIEW_CHARS`].
fn preview(message: &str) -> String {
    let compact = collapse_whitespace(message);
    if compact.chars().count() <= PREVIEW_CHARS {
        return compact;
    }
    let mut out: String = compact.chars().take(PREVIEW_CHARS - 3).collect();
    out.push_str("...");
    out
}

fn dedupe_citations(citations: Vec<Citation>) -> Vec<Citation> {
    let mut seen = HashSet::new();
    citations
        .into_iter()
        .filter(|c| seen.insert((c.title.clone(), c.url.clone(), c.source.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn citation(title: &str) -> Citation {
        Citation {
            title: title.to_string(),
            url: format!("data/demo/p/{title}"),
            source: "p docs".to_string(),
            score: 0.5,
        }
    }

    #[test]
    fn test_preview_collapses_and_truncates() {
        assert_eq!(preview("  a \n\t b  "), "a b");
        let long = "x".repeat(500);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS);
        assert!(p.ends_with("..."));
    }

    #[test]
    fn test_dedupe_citations_keeps_first() {
        let mut second = citation("a.md");
        second.score = 0.1;
        let out = dedupe_citations(vec![citation("a.md"), citation("b.md"), second]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].score, 0.5);
    }

    #[test]
    fn test_access_summary_lines() {
        let policy = PolicyEngine::parse(
            r#"
            [roles.Viewer]
            allowed_packs = ["sample_service"]
            allowed_tools = ["sample.stats.*"]
            "#,
        )
        .unwrap();
        let orchestrator = Orchestrator::builder(PackRegistry::new(), Arc::new(policy)).build();

        assert_eq!(
            orchestrator.access_summary(&["Viewer".to_string()]),
            vec![
                "### Access summary",
                "- Roles: **Viewer**",
                "- Allowed packs: **sample_service**",
                "- Allowed tools: **sample.stats.***",
            ]
        );
        assert_eq!(
            orchestrator.access_summary(&[]),
            vec![
                "### Access summary",
                "- Roles: **(none)**",
                "- Allowed packs: **(none)**",
                "- Allowed tools: **(none)**",
            ]
        );
    }

    #[test]
    fn test_builder_registers_pack_tools() {
        let orchestrator =
            Orchestrator::builder(PackRegistry::with_builtin(), Arc::new(PolicyEngine::default()))
                .build();
        assert_eq!(orchestrator.tool_registry().len(), 2);
        assert_eq!(orchestrator.retrieval_meta().backend, "hybrid");
        assert_eq!(orchestrator.retrieval_meta().alpha, DEFAULT_ALPHA);
    }
}
